//! # Record Decoding
//!
//! [`RecordDecoder`] turns raw record bytes into a row of [`Value`]s laid
//! out by the table's [`ColumnPlan`]. Decoding is pure byte slicing by
//! field offset and width; nothing here touches SQLite.
//!
//! ## Noteworthy Semantics
//!
//! - A DOUBLE whose eight bytes are all `0xFF` is the missing-value
//!   sentinel and decodes to NULL. A DOUBLE decoding to `0.0` stays `0.0`;
//!   the two are never conflated.
//! - STRING is fixed-width with trailing blanks and NULs trimmed; CSTRING
//!   stops at the first NUL; PSTRING carries a leading length byte.
//! - DATE and TIME decode through the Clarion epoch conversions to
//!   ISO-8601 text, with zero meaning NULL.
//! - Arrays serialize to a JSON array string. BYTE elements become JSON
//!   booleans; DOUBLE sentinel slots become JSON null. The JSON layout is
//!   an interchange contract shared with the `_schema` table.
//! - Minimal-fallback tables store the whole record as
//!   `{"raw_data": "<base64>"}`, preserving bytes no schema could be
//!   recovered for.
//!
//! ## Failure Carrier
//!
//! A failed cell produces a [`RowDecodeError`] naming the column and the
//! record; the engine decides between skip, partial insert, and abort.
//! [`RecordDecoder::decode_partial`] supports the partial policy by
//! substituting NULL for the cells that failed.

mod codepage;
mod decimal;
mod temporal;

pub use codepage::CodePage;
pub use decimal::{decode_decimal, encode_decimal};
pub use temporal::{decode_date, decode_time, encode_date, encode_time};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

use crate::arrays::ArrayFieldInfo;
use crate::schema::{ColumnPlan, ColumnSource};
use crate::tps::{FieldDef, FieldKind, TableDef};
use crate::types::Value;

/// Record-local decode failure. Absorbed by the engine according to the
/// configured row-error policy.
#[derive(Debug, Clone)]
pub struct RowDecodeError {
    pub table_number: u8,
    pub record_number: u32,
    pub column: String,
    pub reason: String,
}

impl std::fmt::Display for RowDecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "table {} record {} column {}: {}",
            self.table_number, self.record_number, self.column, self.reason
        )
    }
}

impl std::error::Error for RowDecodeError {}

pub struct RecordDecoder<'a> {
    def: &'a TableDef,
    arrays: &'a [ArrayFieldInfo],
    plan: &'a ColumnPlan,
    code_page: CodePage,
}

impl<'a> RecordDecoder<'a> {
    pub fn new(
        def: &'a TableDef,
        arrays: &'a [ArrayFieldInfo],
        plan: &'a ColumnPlan,
        code_page: CodePage,
    ) -> Self {
        Self {
            def,
            arrays,
            plan,
            code_page,
        }
    }

    /// Decodes one record into a full row. `memo_slots` holds the memo
    /// payloads for this record, indexed by memo ordinal.
    pub fn decode(
        &self,
        record_number: u32,
        payload: &[u8],
        memo_slots: &[Option<Vec<u8>>],
    ) -> Result<Vec<Value>, RowDecodeError> {
        let mut row = Vec::with_capacity(self.plan.len());
        for column in &self.plan.columns {
            let value = self
                .decode_column(column.source, payload, memo_slots)
                .map_err(|reason| RowDecodeError {
                    table_number: self.def.table_number,
                    record_number,
                    column: column.name.clone(),
                    reason,
                })?;
            row.push(value);
        }
        Ok(row)
    }

    /// Lossy variant for the `partial` row-error policy: cells that fail
    /// become NULL, and the first failure is reported alongside the row.
    pub fn decode_partial(
        &self,
        record_number: u32,
        payload: &[u8],
        memo_slots: &[Option<Vec<u8>>],
    ) -> (Vec<Value>, Option<RowDecodeError>) {
        let mut row = Vec::with_capacity(self.plan.len());
        let mut first_error = None;

        for column in &self.plan.columns {
            match self.decode_column(column.source, payload, memo_slots) {
                Ok(value) => row.push(value),
                Err(reason) => {
                    if first_error.is_none() {
                        first_error = Some(RowDecodeError {
                            table_number: self.def.table_number,
                            record_number,
                            column: column.name.clone(),
                            reason,
                        });
                    }
                    row.push(Value::Null);
                }
            }
        }
        (row, first_error)
    }

    fn decode_column(
        &self,
        source: ColumnSource,
        payload: &[u8],
        memo_slots: &[Option<Vec<u8>>],
    ) -> Result<Value, String> {
        match source {
            ColumnSource::Scalar(fi) => {
                let field = &self.def.fields[fi];
                let bytes = self.field_bytes(field, payload)?;
                self.decode_scalar(field.kind, field.decimals, bytes)
            }
            ColumnSource::Array(ai) => self.decode_array(&self.arrays[ai], payload),
            ColumnSource::Memo(mi) => Ok(match memo_slots.get(mi) {
                Some(Some(bytes)) => Value::Blob(bytes.clone()),
                _ => Value::Null,
            }),
            ColumnSource::RawRecord => {
                let envelope = serde_json::json!({ "raw_data": BASE64.encode(payload) });
                Ok(Value::Text(envelope.to_string()))
            }
        }
    }

    fn field_bytes<'p>(&self, field: &FieldDef, payload: &'p [u8]) -> Result<&'p [u8], String> {
        let start = field.offset as usize;
        let end = start + field.length as usize;
        payload.get(start..end).ok_or_else(|| {
            format!(
                "field extent {}..{} outside record of {} bytes",
                start,
                end,
                payload.len()
            )
        })
    }

    fn decode_scalar(
        &self,
        kind: FieldKind,
        decimals: Option<u8>,
        bytes: &[u8],
    ) -> Result<Value, String> {
        let need = |n: usize| -> Result<(), String> {
            if bytes.len() < n {
                Err(format!("{} needs {} bytes, got {}", kind.name(), n, bytes.len()))
            } else {
                Ok(())
            }
        };

        match kind {
            FieldKind::Byte => {
                need(1)?;
                Ok(Value::Int(bytes[0] as i64))
            }
            FieldKind::Short => {
                need(2)?;
                Ok(Value::Int(i16::from_le_bytes([bytes[0], bytes[1]]) as i64))
            }
            FieldKind::UShort => {
                need(2)?;
                Ok(Value::Int(u16::from_le_bytes([bytes[0], bytes[1]]) as i64))
            }
            FieldKind::Long => {
                need(4)?;
                Ok(Value::Int(
                    i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as i64,
                ))
            }
            FieldKind::ULong => {
                need(4)?;
                Ok(Value::Int(
                    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as i64,
                ))
            }
            FieldKind::SReal => {
                need(4)?;
                Ok(Value::Real(
                    f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as f64,
                ))
            }
            FieldKind::Double => {
                need(8)?;
                let raw: [u8; 8] = bytes[..8].try_into().map_err(|_| "bad DOUBLE slice")?;
                if raw == [0xFF; 8] {
                    Ok(Value::Null)
                } else {
                    Ok(Value::Real(f64::from_le_bytes(raw)))
                }
            }
            FieldKind::Decimal => decode_decimal(bytes, decimals.unwrap_or(0)).map(Value::Real),
            FieldKind::Date => {
                need(4)?;
                let days = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
                Ok(decode_date(days).map(Value::Text).unwrap_or(Value::Null))
            }
            FieldKind::Time => {
                need(4)?;
                let centis = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
                Ok(decode_time(centis).map(Value::Text).unwrap_or(Value::Null))
            }
            FieldKind::String => {
                let text = self.code_page.decode(bytes);
                Ok(Value::Text(
                    text.trim_end_matches(['\0', ' ']).to_string(),
                ))
            }
            FieldKind::CString => {
                let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
                Ok(Value::Text(self.code_page.decode(&bytes[..end])))
            }
            FieldKind::PString => {
                need(1)?;
                let len = (bytes[0] as usize).min(bytes.len() - 1);
                Ok(Value::Text(self.code_page.decode(&bytes[1..1 + len])))
            }
            FieldKind::Group => Ok(Value::Blob(bytes.to_vec())),
        }
    }

    /// Extracts and serializes one array column as a JSON array string.
    /// Missing-vs-zero is preserved per element; BYTE elements become
    /// booleans.
    fn decode_array(&self, info: &ArrayFieldInfo, payload: &[u8]) -> Result<Value, String> {
        let width = info.element_width as usize;
        let decimals = info.decimals(self.def);
        let mut elements = Vec::with_capacity(info.element_offsets.len());

        for (i, &offset) in info.element_offsets.iter().enumerate() {
            let start = offset as usize;
            let end = start + width;
            let bytes = payload.get(start..end).ok_or_else(|| {
                format!(
                    "array {} element {} extent {}..{} outside record of {} bytes",
                    info.column_name,
                    i,
                    start,
                    end,
                    payload.len()
                )
            })?;

            let value = self.decode_scalar(info.element_kind, decimals, bytes)?;
            let json = if info.element_kind == FieldKind::Byte {
                match value {
                    Value::Int(v) => serde_json::Value::Bool(v != 0),
                    other => other.to_json(),
                }
            } else {
                value.to_json()
            };
            elements.push(json);
        }

        Ok(Value::Text(serde_json::Value::Array(elements).to_string()))
    }
}
