//! # Conversion Constants
//!
//! This module centralizes the constants of the conversion core, grouping
//! interdependent values together. Constants that depend on each other are
//! co-located to prevent mismatch bugs.
//!
//! ## Dependency Graph
//!
//! ```text
//! TPS_HEADER_SIZE (0x200)
//!       │
//!       └─> first page offset: pages start immediately after the header
//!
//! PAGE_ALIGN (0x100)
//!       │
//!       └─> page walk stride: every page begins on a 0x100 boundary, so a
//!           corrupt page header can be skipped by resyncing to the next
//!           boundary
//!
//! MIN_BATCH_SIZE (5) ── MAX_BATCH_SIZE (400)
//!       │
//!       ├─> every profile's initial batch size must fall inside this range
//!       │
//!       └─> the adaptive rule halves toward MIN and grows by 3/2 toward MAX
//!
//! RSS_HIGH_WATER_PERCENT (85) ── RSS_LOW_WATER_PERCENT (40)
//!       │
//!       └─> must satisfy LOW < HIGH or the governor would both grow and
//!           shrink on the same reading
//! ```
//!
//! ## Critical Invariants
//!
//! Enforced by compile-time assertions below:
//!
//! 1. `MIN_BATCH_SIZE <= profile batch sizes <= MAX_BATCH_SIZE`
//! 2. `RSS_LOW_WATER_PERCENT < RSS_HIGH_WATER_PERCENT`
//! 3. profile size thresholds are strictly increasing

// ============================================================================
// TOPSPEED FILE GEOMETRY
// ============================================================================

/// Size of the TopSpeed file header in bytes.
/// The first page begins immediately after it.
pub const TPS_HEADER_SIZE: usize = 0x200;

/// Page alignment boundary. Pages are laid out on 0x100 boundaries; the page
/// walk advances by the on-disk size rounded up to this alignment.
pub const PAGE_ALIGN: usize = 0x100;

/// Size of a page header in bytes.
pub const PAGE_HEADER_SIZE: usize = 13;

/// Each record inside a decompressed page is prefixed with its payload
/// length as a little-endian u16.
pub const RECORD_SIZE_PREFIX: usize = 2;

// ============================================================================
// TABLE DEFINITION PARSING
// ============================================================================

/// Strict-parser field count ceiling. Definitions declaring more fields are
/// handed to the tolerant fallback parser.
pub const STRICT_FIELD_LIMIT: usize = 30;

/// Longest field name the tolerant parser will accept before assuming the
/// terminator was lost to corruption.
pub const MAX_FIELD_NAME_LEN: usize = 64;

// ============================================================================
// BATCH SIZING
// The governor keeps the batch size inside [MIN, MAX] at all times
// ============================================================================

/// Hard floor for the adaptive batch size.
pub const MIN_BATCH_SIZE: usize = 5;

/// Hard ceiling for the adaptive batch size.
pub const MAX_BATCH_SIZE: usize = 400;

/// RSS percentage of the memory limit above which the batch size is halved
/// and a release sweep is requested.
pub const RSS_HIGH_WATER_PERCENT: u64 = 85;

/// RSS percentage of the memory limit below which consecutive readings count
/// toward batch growth.
pub const RSS_LOW_WATER_PERCENT: u64 = 40;

/// Number of consecutive low-water readings required before the batch size
/// grows by [`BATCH_GROWTH_NUM`]/[`BATCH_GROWTH_DEN`].
pub const LOW_WATER_STREAK: u32 = 3;

/// Batch growth factor numerator (growth is 3/2 = 1.5x).
pub const BATCH_GROWTH_NUM: usize = 3;

/// Batch growth factor denominator.
pub const BATCH_GROWTH_DEN: usize = 2;

/// Default release-sweep cadence in records. At each point the engine
/// returns transient buffers to the allocator.
pub const DEFAULT_RELEASE_INTERVAL: u64 = 1000;

/// Row errors tolerated back-to-back before the table is abandoned as
/// partial. Guards against a mis-parsed definition turning every record
/// into a logged failure.
pub const MAX_CONSECUTIVE_ROW_ERRORS: u64 = 100;

const _: () = assert!(
    RSS_LOW_WATER_PERCENT < RSS_HIGH_WATER_PERCENT,
    "low water must sit below high water or the governor oscillates"
);

// ============================================================================
// SIZE PROFILES
// Thresholds select a profile from the estimated on-disk table size
// ============================================================================

/// Tables up to this size use the `small` profile.
pub const SMALL_TABLE_LIMIT: u64 = 10 * 1024 * 1024;

/// Tables up to this size use the `medium` profile.
pub const MEDIUM_TABLE_LIMIT: u64 = 1024 * 1024 * 1024;

/// Tables up to this size use the `large` profile; beyond it, `enterprise`.
pub const LARGE_TABLE_LIMIT: u64 = 10 * 1024 * 1024 * 1024;

/// Initial batch size per profile.
pub const SMALL_BATCH_SIZE: usize = 200;
pub const MEDIUM_BATCH_SIZE: usize = 100;
pub const LARGE_BATCH_SIZE: usize = 50;
pub const ENTERPRISE_BATCH_SIZE: usize = 25;

/// Default memory limit per profile.
pub const SMALL_MEMORY_LIMIT: u64 = 200 * 1024 * 1024;
pub const MEDIUM_MEMORY_LIMIT: u64 = 500 * 1024 * 1024;
pub const LARGE_MEMORY_LIMIT: u64 = 1024 * 1024 * 1024;
pub const ENTERPRISE_MEMORY_LIMIT: u64 = 2 * 1024 * 1024 * 1024;

const _: () = assert!(SMALL_TABLE_LIMIT < MEDIUM_TABLE_LIMIT);
const _: () = assert!(MEDIUM_TABLE_LIMIT < LARGE_TABLE_LIMIT);

const _: () = assert!(
    MIN_BATCH_SIZE <= ENTERPRISE_BATCH_SIZE && SMALL_BATCH_SIZE <= MAX_BATCH_SIZE,
    "profile batch sizes must fall inside the adaptive range"
);

// ============================================================================
// VALIDATION
// ============================================================================

/// Records per table the validator re-decodes and diffs against the
/// output at the `standard` and `full` levels.
pub const VALIDATION_SAMPLE_RECORDS: usize = 100;

/// Row cap per table for database-to-database comparison, keeping the
/// diff bounded on large outputs.
pub const DB_COMPARE_ROW_CAP: usize = 1000;

// ============================================================================
// SQLITE OUTPUT
// ============================================================================

/// Fraction of the memory limit handed to the SQLite page cache:
/// cache = memory_limit / SQLITE_CACHE_DIVISOR (25%).
pub const SQLITE_CACHE_DIVISOR: u64 = 4;

/// Floor for the SQLite cache in KiB so tiny memory limits still leave a
/// usable cache.
pub const SQLITE_CACHE_FLOOR_KIB: u64 = 1024;
