//! # Table Definition Parsing
//!
//! A table's metadata lives in definition records reassembled by the
//! reader. The strict layout is:
//!
//! ```text
//! record_length: u16
//! field_count:   u16
//! memo_count:    u16
//! index_count:   u16
//! fields[field_count]:
//!     kind: u8, offset: u16, name: cstring,
//!     element_count: u16, length: u16,
//!     decimals: u8 (DECIMAL only)
//! memos[memo_count]:
//!     name: cstring, kind: u8 (0 = memo, 1 = blob)
//! indexes[index_count]:
//!     name: cstring, field_count: u8, field ordinals: u16 each
//! ```
//!
//! ## Fallback Ladder
//!
//! Real corpora contain definitions the strict parser must reject: more
//! than [`STRICT_FIELD_LIMIT`] fields, offsets past the record length,
//! truncated memo/index sections. Parsing then degrades in two steps:
//!
//! 1. **Enhanced**: rescan the blob tolerantly — NUL-pad truncated names,
//!    clamp extents to the record length, drop fields that overlap an
//!    already accepted field, salvage memo/index sections or drop them.
//! 2. **Minimal**: when no field survives, a single opaque pseudo-field
//!    covers the full record and the schema stores raw bytes
//!    base64-encoded in JSON. Data preservation supersedes schema
//!    fidelity.
//!
//! The raw definition bytes are retained verbatim on every [`TableDef`]
//! so a later pass can re-parse with improved heuristics.

use eyre::{bail, ensure, Result};
use smallvec::SmallVec;
use tracing::{debug, warn};

use crate::config::{MAX_FIELD_NAME_LEN, STRICT_FIELD_LIMIT};

/// Name given to the single pseudo-field of a minimal definition.
pub const RAW_RECORD_FIELD: &str = "RAW_RECORD";

/// Clarion field kind bytes as they appear on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
    Byte,
    Short,
    UShort,
    Date,
    Time,
    Long,
    ULong,
    SReal,
    Double,
    Decimal,
    String,
    CString,
    PString,
    Group,
}

impl FieldKind {
    pub fn from_byte(b: u8) -> Option<FieldKind> {
        match b {
            0x01 => Some(FieldKind::Byte),
            0x02 => Some(FieldKind::Short),
            0x03 => Some(FieldKind::UShort),
            0x04 => Some(FieldKind::Date),
            0x05 => Some(FieldKind::Time),
            0x06 => Some(FieldKind::Long),
            0x07 => Some(FieldKind::ULong),
            0x08 => Some(FieldKind::SReal),
            0x09 => Some(FieldKind::Double),
            0x0A => Some(FieldKind::Decimal),
            0x12 => Some(FieldKind::String),
            0x13 => Some(FieldKind::CString),
            0x14 => Some(FieldKind::PString),
            0x16 => Some(FieldKind::Group),
            _ => None,
        }
    }

    pub fn as_byte(&self) -> u8 {
        match self {
            FieldKind::Byte => 0x01,
            FieldKind::Short => 0x02,
            FieldKind::UShort => 0x03,
            FieldKind::Date => 0x04,
            FieldKind::Time => 0x05,
            FieldKind::Long => 0x06,
            FieldKind::ULong => 0x07,
            FieldKind::SReal => 0x08,
            FieldKind::Double => 0x09,
            FieldKind::Decimal => 0x0A,
            FieldKind::String => 0x12,
            FieldKind::CString => 0x13,
            FieldKind::PString => 0x14,
            FieldKind::Group => 0x16,
        }
    }

    /// Intrinsic element width; `None` for length-driven kinds.
    pub fn fixed_width(&self) -> Option<u32> {
        match self {
            FieldKind::Byte => Some(1),
            FieldKind::Short | FieldKind::UShort => Some(2),
            FieldKind::Date | FieldKind::Time | FieldKind::Long | FieldKind::ULong => Some(4),
            FieldKind::SReal => Some(4),
            FieldKind::Double => Some(8),
            FieldKind::Decimal
            | FieldKind::String
            | FieldKind::CString
            | FieldKind::PString
            | FieldKind::Group => None,
        }
    }

    /// SQLite column type for a scalar of this kind.
    pub fn affinity(&self) -> &'static str {
        match self {
            FieldKind::Byte
            | FieldKind::Short
            | FieldKind::UShort
            | FieldKind::Long
            | FieldKind::ULong => "INTEGER",
            FieldKind::SReal | FieldKind::Double | FieldKind::Decimal => "REAL",
            FieldKind::Date
            | FieldKind::Time
            | FieldKind::String
            | FieldKind::CString
            | FieldKind::PString => "TEXT",
            FieldKind::Group => "BLOB",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            FieldKind::Byte => "BYTE",
            FieldKind::Short => "SHORT",
            FieldKind::UShort => "USHORT",
            FieldKind::Date => "DATE",
            FieldKind::Time => "TIME",
            FieldKind::Long => "LONG",
            FieldKind::ULong => "ULONG",
            FieldKind::SReal => "SREAL",
            FieldKind::Double => "DOUBLE",
            FieldKind::Decimal => "DECIMAL",
            FieldKind::String => "STRING",
            FieldKind::CString => "CSTRING",
            FieldKind::PString => "PSTRING",
            FieldKind::Group => "GROUP",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldDef {
    pub name: String,
    pub kind: FieldKind,
    pub offset: u32,
    pub length: u32,
    pub element_count: u32,
    pub decimals: Option<u8>,
}

impl FieldDef {
    pub fn element_width(&self) -> u32 {
        self.length / self.element_count.max(1)
    }

    pub fn extent(&self) -> u32 {
        self.offset + self.length
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoKind {
    Memo,
    Blob,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MemoDef {
    pub name: String,
    pub kind: MemoKind,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndexDef {
    pub name: String,
    pub fields: SmallVec<[u16; 4]>,
}

/// Immutable table description, produced once per table at conversion
/// start.
#[derive(Debug, Clone)]
pub struct TableDef {
    pub table_number: u8,
    pub record_length: u32,
    pub fields: Vec<FieldDef>,
    pub memos: Vec<MemoDef>,
    pub indexes: Vec<IndexDef>,
    pub raw_definition: Vec<u8>,
    /// True when the tolerant rescan produced this definition.
    pub enhanced: bool,
    /// True when only the opaque single-BLOB fallback survived.
    pub minimal: bool,
}

impl TableDef {
    pub fn is_minimal(&self) -> bool {
        self.minimal
    }
}

struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    fn u8(&mut self) -> Result<u8> {
        ensure!(self.remaining() >= 1, "definition truncated at {}", self.pos);
        let v = self.bytes[self.pos];
        self.pos += 1;
        Ok(v)
    }

    fn u16(&mut self) -> Result<u16> {
        ensure!(self.remaining() >= 2, "definition truncated at {}", self.pos);
        let v = u16::from_le_bytes([self.bytes[self.pos], self.bytes[self.pos + 1]]);
        self.pos += 2;
        Ok(v)
    }

    fn cstring(&mut self) -> Result<String> {
        let start = self.pos;
        let end = self.bytes[start..]
            .iter()
            .position(|&b| b == 0)
            .map(|i| start + i)
            .ok_or_else(|| eyre::eyre!("unterminated name at {}", start))?;
        self.pos = end + 1;
        Ok(String::from_utf8_lossy(&self.bytes[start..end]).into_owned())
    }

    /// Tolerant name read: accepts a missing terminator by capping the
    /// length, as truncated definitions lose trailing NULs.
    fn cstring_lossy(&mut self) -> String {
        let start = self.pos;
        let limit = (start + MAX_FIELD_NAME_LEN).min(self.bytes.len());
        let end = self.bytes[start..limit]
            .iter()
            .position(|&b| b == 0)
            .map(|i| start + i);

        match end {
            Some(end) => {
                self.pos = end + 1;
                String::from_utf8_lossy(&self.bytes[start..end]).into_owned()
            }
            None => {
                self.pos = limit;
                String::from_utf8_lossy(&self.bytes[start..limit]).into_owned()
            }
        }
    }
}

/// Strict parse. Any deviation from the standard layout fails; callers that
/// must make progress use [`parse_with_fallback`].
pub fn parse(table_number: u8, bytes: &[u8]) -> Result<TableDef> {
    let mut cur = Cursor::new(bytes);

    let record_length = cur.u16()? as u32;
    let field_count = cur.u16()? as usize;
    let memo_count = cur.u16()? as usize;
    let index_count = cur.u16()? as usize;

    ensure!(record_length > 0, "zero record length");
    ensure!(
        field_count <= STRICT_FIELD_LIMIT,
        "field count {} exceeds strict parser limit {}",
        field_count,
        STRICT_FIELD_LIMIT
    );

    let mut fields = Vec::with_capacity(field_count);
    for i in 0..field_count {
        let kind_byte = cur.u8()?;
        let kind = FieldKind::from_byte(kind_byte)
            .ok_or_else(|| eyre::eyre!("field {}: unknown kind {:#04x}", i, kind_byte))?;
        let offset = cur.u16()? as u32;
        let name = cur.cstring()?;
        ensure!(!name.is_empty(), "field {}: empty name", i);
        let element_count = cur.u16()? as u32;
        ensure!(element_count >= 1, "field {}: zero element count", i);
        let length = cur.u16()? as u32;
        ensure!(length > 0, "field {} ({}): zero length", i, name);
        let decimals = if kind == FieldKind::Decimal {
            Some(cur.u8()?)
        } else {
            None
        };

        ensure!(
            offset + length <= record_length,
            "field {} ({}) extends past record length {}",
            i,
            name,
            record_length
        );
        if element_count > 1 {
            ensure!(
                length % element_count == 0,
                "field {} ({}): length {} not divisible by element count {}",
                i,
                name,
                length,
                element_count
            );
        }

        fields.push(FieldDef {
            name,
            kind,
            offset,
            length,
            element_count,
            decimals,
        });
    }

    let mut memos = Vec::with_capacity(memo_count);
    for i in 0..memo_count {
        let name = cur.cstring()?;
        ensure!(!name.is_empty(), "memo {}: empty name", i);
        let kind = match cur.u8()? {
            0 => MemoKind::Memo,
            1 => MemoKind::Blob,
            other => bail!("memo {} ({}): unknown kind {:#04x}", i, name, other),
        };
        memos.push(MemoDef { name, kind });
    }

    let mut indexes = Vec::with_capacity(index_count);
    for i in 0..index_count {
        let name = cur.cstring()?;
        ensure!(!name.is_empty(), "index {}: empty name", i);
        let count = cur.u8()? as usize;
        ensure!(count >= 1, "index {} ({}): no fields", i, name);
        let mut index_fields = SmallVec::new();
        for _ in 0..count {
            let ordinal = cur.u16()?;
            ensure!(
                (ordinal as usize) < fields.len(),
                "index {} ({}): field ordinal {} out of range",
                i,
                name,
                ordinal
            );
            index_fields.push(ordinal);
        }
        indexes.push(IndexDef {
            name,
            fields: index_fields,
        });
    }

    ensure!(
        cur.remaining() == 0,
        "definition section length check failed: {} trailing bytes",
        cur.remaining()
    );

    Ok(TableDef {
        table_number,
        record_length,
        fields,
        memos,
        indexes,
        raw_definition: bytes.to_vec(),
        enhanced: false,
        minimal: false,
    })
}

/// Strict parse, then the tolerant rescan, then the minimal single-BLOB
/// definition. Never fails: data preservation supersedes schema fidelity.
pub fn parse_with_fallback(table_number: u8, bytes: &[u8]) -> TableDef {
    match parse(table_number, bytes) {
        Ok(def) => def,
        Err(strict_err) => {
            debug!(table = table_number, error = %strict_err, "strict definition parse failed");
            match parse_enhanced(table_number, bytes) {
                Some(def) => {
                    warn!(
                        table = table_number,
                        fields = def.fields.len(),
                        "recovered table definition with tolerant rescan"
                    );
                    def
                }
                None => {
                    warn!(
                        table = table_number,
                        "no field recoverable, storing raw records"
                    );
                    minimal_def(table_number, bytes)
                }
            }
        }
    }
}

/// Tolerant rescan of the definition blob. Returns `None` when no field
/// can be safely recovered.
fn parse_enhanced(table_number: u8, bytes: &[u8]) -> Option<TableDef> {
    let mut cur = Cursor::new(bytes);

    let record_length = cur.u16().ok()? as u32;
    let field_count = cur.u16().ok()? as usize;
    let memo_count = cur.u16().ok()? as usize;
    let index_count = cur.u16().ok()? as usize;

    if record_length == 0 {
        return None;
    }

    let mut fields: Vec<FieldDef> = Vec::new();

    for _ in 0..field_count {
        if cur.remaining() < 1 {
            break;
        }
        let kind_byte = match cur.u8() {
            Ok(b) => b,
            Err(_) => break,
        };
        // an unknown kind byte means the scan lost sync; keep what we have
        let kind = match FieldKind::from_byte(kind_byte) {
            Some(k) => k,
            None => break,
        };
        let Ok(raw_offset) = cur.u16() else { break };
        let name = cur.cstring_lossy();
        let Ok(element_count) = cur.u16() else { break };
        let Ok(raw_length) = cur.u16() else { break };
        let decimals = if kind == FieldKind::Decimal {
            match cur.u8() {
                Ok(d) => Some(d),
                Err(_) => break,
            }
        } else {
            None
        };

        let offset = (raw_offset as u32).min(record_length);
        let length = (raw_length as u32).min(record_length - offset);
        if length == 0 || name.is_empty() {
            continue;
        }

        let overlaps = fields
            .iter()
            .any(|f| offset < f.extent() && f.offset < offset + length);
        if overlaps {
            debug!(
                table = table_number,
                field = %name,
                "dropping field overlapping a recovered field"
            );
            continue;
        }

        fields.push(FieldDef {
            name,
            kind,
            offset,
            length,
            element_count: element_count.max(1) as u32,
            decimals,
        });
    }

    if fields.is_empty() {
        return None;
    }

    // memo and index sections are salvaged only if they read cleanly from
    // the current position; otherwise the definition keeps fields alone
    let salvage = salvage_tail(&mut cur, fields.len(), memo_count, index_count);
    let (memos, indexes) = salvage.unwrap_or_default();

    Some(TableDef {
        table_number,
        record_length,
        fields,
        memos,
        indexes,
        raw_definition: bytes.to_vec(),
        enhanced: true,
        minimal: false,
    })
}

#[allow(clippy::type_complexity)]
fn salvage_tail(
    cur: &mut Cursor<'_>,
    field_count: usize,
    memo_count: usize,
    index_count: usize,
) -> Option<(Vec<MemoDef>, Vec<IndexDef>)> {
    // implausible declared counts mean the header itself is damaged
    if memo_count > 255 || index_count > 255 {
        return None;
    }

    let mut memos = Vec::with_capacity(memo_count);
    for _ in 0..memo_count {
        let name = cur.cstring().ok()?;
        if name.is_empty() {
            return None;
        }
        let kind = match cur.u8().ok()? {
            0 => MemoKind::Memo,
            1 => MemoKind::Blob,
            _ => return None,
        };
        memos.push(MemoDef { name, kind });
    }

    let mut indexes = Vec::with_capacity(index_count);
    for _ in 0..index_count {
        let name = cur.cstring().ok()?;
        if name.is_empty() {
            return None;
        }
        let count = cur.u8().ok()? as usize;
        if count == 0 {
            return None;
        }
        let mut index_fields = SmallVec::new();
        for _ in 0..count {
            let ordinal = cur.u16().ok()?;
            if (ordinal as usize) >= field_count {
                return None;
            }
            index_fields.push(ordinal);
        }
        indexes.push(IndexDef {
            name,
            fields: index_fields,
        });
    }

    Some((memos, indexes))
}

/// The last resort: a single opaque pseudo-field covering the full record.
/// Downstream the schema stores raw record bytes base64-encoded in JSON,
/// preserving the data for later recovery.
fn minimal_def(table_number: u8, bytes: &[u8]) -> TableDef {
    let record_length = if bytes.len() >= 2 {
        u16::from_le_bytes([bytes[0], bytes[1]]) as u32
    } else {
        0
    };

    TableDef {
        table_number,
        record_length,
        fields: vec![FieldDef {
            name: RAW_RECORD_FIELD.to_string(),
            kind: FieldKind::Group,
            offset: 0,
            length: record_length,
            element_count: 1,
            decimals: None,
        }],
        memos: Vec::new(),
        indexes: Vec::new(),
        raw_definition: bytes.to_vec(),
        enhanced: false,
        minimal: true,
    }
}

/// Serializes a [`TableDef`] back to the strict on-disk layout. The engine
/// does not use this; it exists for fixtures and definition round-trips.
pub fn encode(def: &TableDef) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&(def.record_length as u16).to_le_bytes());
    out.extend_from_slice(&(def.fields.len() as u16).to_le_bytes());
    out.extend_from_slice(&(def.memos.len() as u16).to_le_bytes());
    out.extend_from_slice(&(def.indexes.len() as u16).to_le_bytes());

    for field in &def.fields {
        out.push(field.kind.as_byte());
        out.extend_from_slice(&(field.offset as u16).to_le_bytes());
        out.extend_from_slice(field.name.as_bytes());
        out.push(0);
        out.extend_from_slice(&(field.element_count as u16).to_le_bytes());
        out.extend_from_slice(&(field.length as u16).to_le_bytes());
        if field.kind == FieldKind::Decimal {
            out.push(field.decimals.unwrap_or(0));
        }
    }
    for memo in &def.memos {
        out.extend_from_slice(memo.name.as_bytes());
        out.push(0);
        out.push(match memo.kind {
            MemoKind::Memo => 0,
            MemoKind::Blob => 1,
        });
    }
    for index in &def.indexes {
        out.extend_from_slice(index.name.as_bytes());
        out.push(0);
        out.push(index.fields.len() as u8);
        for ordinal in &index.fields {
            out.extend_from_slice(&ordinal.to_le_bytes());
        }
    }
    out
}
