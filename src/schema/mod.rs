//! # Schema Projection
//!
//! Maps a (possibly array-annotated) [`TableDef`] onto SQLite DDL and a
//! [`ColumnPlan`] the decoder shares.
//!
//! ## Projection Rules
//!
//! | TopSpeed | SQLite column |
//! |----------|---------------|
//! | BYTE, SHORT, USHORT, LONG, ULONG | INTEGER |
//! | DOUBLE, SREAL, DECIMAL | REAL |
//! | STRING, CSTRING, PSTRING | TEXT |
//! | DATE, TIME | TEXT (ISO-8601) |
//! | GROUP | BLOB (raw bytes) |
//! | memo | BLOB |
//! | any array | TEXT (JSON array) |
//!
//! An array column sits at the position of its first member; the remaining
//! members disappear from the plan. Memo columns follow the fields. A
//! minimal definition projects to the single raw-record TEXT column.
//!
//! ## Prefix Invariant
//!
//! The projected table name is `<prefix><sanitized name>` and **every**
//! index name starts with the projected table name, so indexes inherit the
//! table's `phd_`/`mod_` prefix by construction. Merged databases rely on
//! this to keep the two namespaces from colliding.
//!
//! ## `_schema` Bookkeeping
//!
//! Each table contributes a row `(table_name, array_fields JSON,
//! source_prefix)` so consumers can reverse the array flattening without
//! re-reading TopSpeed bytes.

pub mod names;

pub use names::{sanitize_field_name, sanitize_table_name};

use hashbrown::HashMap;
use serde::Serialize;

use crate::arrays::{ArrayFieldInfo, ArrayKind};
use crate::tps::TableDef;

/// Where a column's value comes from during decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnSource {
    /// Scalar field, by index into `TableDef::fields`.
    Scalar(usize),
    /// Array descriptor, by index into the analyzer's output.
    Array(usize),
    /// Memo, by index into `TableDef::memos`.
    Memo(usize),
    /// Whole-record base64 envelope of a minimal definition.
    RawRecord,
}

#[derive(Debug, Clone)]
pub struct Column {
    pub name: String,
    pub decl_type: &'static str,
    pub source: ColumnSource,
}

/// Ordered column layout shared by the projector, the decoder, and the
/// writer.
#[derive(Debug, Clone, Default)]
pub struct ColumnPlan {
    pub columns: Vec<Column>,
}

impl ColumnPlan {
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

#[derive(Serialize)]
struct ArrayFieldMeta<'a> {
    column: &'a str,
    kind: &'static str,
    element_type: &'static str,
    element_count: u32,
}

/// Everything the engine needs to create and fill one SQLite table.
#[derive(Debug, Clone)]
pub struct TableSchema {
    /// Original TopSpeed table name.
    pub source_name: String,
    /// Projected (prefixed, sanitized) SQLite table name.
    pub table_name: String,
    pub create_table: String,
    pub create_indexes: Vec<String>,
    pub plan: ColumnPlan,
    pub array_fields_json: String,
    pub source_prefix: String,
}

/// Projects one table definition. `prefix` is `""`, `"phd_"`, or `"mod_"`
/// by source context.
pub fn project(
    source_name: &str,
    prefix: &str,
    def: &TableDef,
    arrays: &[ArrayFieldInfo],
) -> TableSchema {
    let table_name = format!("{}{}", prefix, sanitize_table_name(source_name));

    let mut columns = Vec::new();
    if def.is_minimal() {
        columns.push(Column {
            name: "RAW_RECORD".to_string(),
            decl_type: "TEXT",
            source: ColumnSource::RawRecord,
        });
    } else {
        let mut array_of_field: HashMap<usize, usize> = HashMap::new();
        for (ai, info) in arrays.iter().enumerate() {
            for &fi in &info.members {
                array_of_field.insert(fi, ai);
            }
        }

        for (fi, field) in def.fields.iter().enumerate() {
            match array_of_field.get(&fi) {
                Some(&ai) => {
                    // the array column sits where the series starts
                    if arrays[ai].members[0] == fi {
                        columns.push(Column {
                            name: arrays[ai].column_name.clone(),
                            decl_type: "TEXT",
                            source: ColumnSource::Array(ai),
                        });
                    }
                }
                None => columns.push(Column {
                    name: sanitize_field_name(&field.name),
                    decl_type: field.kind.affinity(),
                    source: ColumnSource::Scalar(fi),
                }),
            }
        }

        for (mi, memo) in def.memos.iter().enumerate() {
            columns.push(Column {
                name: sanitize_field_name(&memo.name),
                decl_type: "BLOB",
                source: ColumnSource::Memo(mi),
            });
        }
    }

    dedupe_column_names(&mut columns);

    let column_sql: Vec<String> = columns
        .iter()
        .map(|c| format!("\"{}\" {}", c.name, c.decl_type))
        .collect();
    let create_table = format!(
        "CREATE TABLE IF NOT EXISTS \"{}\" ({})",
        table_name,
        column_sql.join(", ")
    );

    let create_indexes = project_indexes(&table_name, def, arrays, &columns);

    let metas: Vec<ArrayFieldMeta<'_>> = arrays
        .iter()
        .map(|info| ArrayFieldMeta {
            column: &info.column_name,
            kind: match info.kind {
                ArrayKind::SingleField => "single_field",
                ArrayKind::MultiField => "multi_field",
            },
            element_type: info.element_kind.name(),
            element_count: info.element_count,
        })
        .collect();
    let array_fields_json =
        serde_json::to_string(&metas).unwrap_or_else(|_| String::from("[]"));

    TableSchema {
        source_name: source_name.to_string(),
        table_name,
        create_table,
        create_indexes,
        plan: ColumnPlan { columns },
        array_fields_json,
        source_prefix: prefix.to_string(),
    }
}

/// Index DDL. Field ordinals resolve to plan columns; an ordinal claimed
/// by an array resolves to the array column. Empty or unresolvable
/// indexes are dropped.
fn project_indexes(
    table_name: &str,
    def: &TableDef,
    arrays: &[ArrayFieldInfo],
    columns: &[Column],
) -> Vec<String> {
    let mut column_of_field: HashMap<usize, &str> = HashMap::new();
    for column in columns {
        match column.source {
            ColumnSource::Scalar(fi) => {
                column_of_field.insert(fi, column.name.as_str());
            }
            ColumnSource::Array(ai) => {
                for &fi in &arrays[ai].members {
                    column_of_field.insert(fi, column.name.as_str());
                }
            }
            ColumnSource::Memo(_) | ColumnSource::RawRecord => {}
        }
    }

    def.indexes
        .iter()
        .filter_map(|index| {
            let mut seen = Vec::new();
            for &ordinal in &index.fields {
                if let Some(&name) = column_of_field.get(&(ordinal as usize)) {
                    if !seen.contains(&name) {
                        seen.push(name);
                    }
                }
            }
            if seen.is_empty() {
                return None;
            }
            let index_name = format!("{}_{}", table_name, sanitize_field_name(&index.name));
            let cols = seen
                .iter()
                .map(|n| format!("\"{}\"", n))
                .collect::<Vec<_>>()
                .join(", ");
            Some(format!(
                "CREATE INDEX IF NOT EXISTS \"{}\" ON \"{}\" ({})",
                index_name, table_name, cols
            ))
        })
        .collect()
}

/// SQLite identifiers inside one table must be unique; duplicate
/// sanitized names get a numeric suffix in definition order.
fn dedupe_column_names(columns: &mut [Column]) {
    let mut seen: HashMap<String, usize> = HashMap::new();
    for column in columns.iter_mut() {
        let key = column.name.to_ascii_lowercase();
        if !seen.contains_key(&key) {
            seen.insert(key, 1);
            continue;
        }
        let mut suffix = seen[&key] + 1;
        let mut candidate = format!("{}_{}", column.name, suffix);
        while seen.contains_key(&candidate.to_ascii_lowercase()) {
            suffix += 1;
            candidate = format!("{}_{}", column.name, suffix);
        }
        seen.insert(key, suffix);
        seen.insert(candidate.to_ascii_lowercase(), 1);
        column.name = candidate;
    }
}
