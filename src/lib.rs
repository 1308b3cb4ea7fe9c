//! # tpslite - TopSpeed to SQLite Conversion Core
//!
//! tpslite reads legacy TopSpeed database files (`.tps`, `.phd`, `.mod`)
//! and projects them into a typed SQLite database, streaming records under
//! a bounded memory budget so databases larger than host RAM convert
//! without incident. This crate is the decoding and schema-projection
//! core; the CLI, progress reporting, logging setup, `.phz` unpacking,
//! and the reverse SQLite-to-TopSpeed writer are external collaborators.
//!
//! ## Quick Start
//!
//! ```ignore
//! use tpslite::{Config, ConversionEngine, SourceFile};
//!
//! let engine = ConversionEngine::new(Config::default());
//! let report = engine.convert(
//!     &[
//!         SourceFile::new("TxWells.phd"),
//!         SourceFile::new("TxWells.mod"),
//!     ],
//!     std::path::Path::new("out.db"),
//! )?;
//! println!("{}", report);
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │        ConversionEngine (engine)          │
//! ├──────────────┬───────────────────────────┤
//! │  Resilience  │      SQLite Writer        │
//! │  Governor    │  (pragmas, batches, WAL)  │
//! ├──────────────┴───────────────────────────┤
//! │  RecordDecoder │ SchemaProjector │ Arrays │
//! ├──────────────────────────────────────────┤
//! │   TableDefinitionParser (w/ fallbacks)    │
//! ├──────────────────────────────────────────┤
//! │   PageReader (mmap, RLE, record split)    │
//! └──────────────────────────────────────────┘
//! ```
//!
//! ## Resilience Model
//!
//! - Corrupt pages are skipped with counters, never fatal.
//! - Unparseable table definitions degrade to tolerant and then to opaque
//!   raw-record preservation.
//! - Row decode failures follow the configured policy: skip, partial
//!   insert, or abandon the table.
//! - Batch sizes adapt to observed process RSS inside [5, 400]; sustained
//!   overrun of the memory limit is the only fatal memory condition.
//! - Cancellation commits in-flight work and records `_resume` markers;
//!   a resumed run converges on the same content as an uninterrupted one.
//!
//! ## Module Overview
//!
//! - [`tps`]: TopSpeed binary layer (header, pages, records, definitions)
//! - [`arrays`]: single-field and multi-field array detection
//! - [`decode`]: typed record decoding, code pages, Clarion temporal, BCD
//! - [`schema`]: name sanitization, DDL projection, column planning
//! - [`sqlite`]: output connection, batched writes, writer thread
//! - [`governor`]: size profiles and adaptive batch sizing
//! - [`engine`]: orchestration, cancellation, resume, backup/checkpoint
//!   recovery, reporting
//! - [`validate`]: post-conversion validation and database comparison
//! - [`config`]: the explicit configuration value and shared constants

pub mod arrays;
pub mod config;
pub mod decode;
pub mod engine;
pub mod governor;
pub mod schema;
pub mod sqlite;
pub mod tps;
pub mod types;
pub mod validate;

pub use config::{Config, ProfileChoice, RowErrorPolicy};
pub use decode::CodePage;
pub use engine::{
    CancelToken, ConversionEngine, ConversionReport, RecoveryStore, SourceFile, SourcePrefix,
};
pub use governor::{MemoryProbe, Profile};
pub use types::Value;
pub use validate::{compare_databases, ConversionValidator, ValidationLevel, ValidationReport};
