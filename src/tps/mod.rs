//! # TopSpeed Binary Layer
//!
//! Everything that touches TopSpeed bytes lives here: the 512-byte file
//! header, page walking and RLE decompression, record splitting, and table
//! definition parsing with its fallback ladder.
//!
//! ## Module Organization
//!
//! - `header`: file header parsing and validation
//! - `page`: page headers, structural validation, RLE
//! - `record`: record-kind dispatch within a page
//! - `reader`: [`PageReader`], the lazy page/record iterators
//! - `tabledef`: strict/enhanced/minimal table definition parsing
//!
//! ## Failure Discipline
//!
//! Header failures are fatal for the file. Page failures are never fatal:
//! they are counted, logged, and skipped. Definition failures degrade to
//! tolerant and then to opaque parsing, never to data loss.

mod header;
mod page;
mod reader;
mod record;
mod tabledef;

pub use header::{FileHeader, TOPSPEED_MAGIC};
pub use page::{decompress_rle, CorruptPage, Page, PageHeader};
pub use reader::{PageReader, Pages, Records, TableRecords};
pub use record::{
    PageRecords, Record, RECORD_KIND_DATA, RECORD_KIND_MEMO, RECORD_KIND_TABLE_DEF,
    RECORD_KIND_TABLE_NAME,
};
pub use tabledef::{
    encode as encode_table_definition, parse as parse_table_definition, parse_with_fallback,
    FieldDef, FieldKind, IndexDef, MemoDef, MemoKind, TableDef, RAW_RECORD_FIELD,
};
