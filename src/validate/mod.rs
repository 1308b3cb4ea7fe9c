//! # Post-Conversion Validation
//!
//! Verifies that an SQLite output faithfully mirrors its TopSpeed
//! sources. The validator is a read-only collaborator: it opens its own
//! source readers and a read-only output connection, re-derives the same
//! table plans the engine used, and never mutates anything.
//!
//! ## Validation Levels
//!
//! | Level    | Checks |
//! |----------|--------|
//! | basic    | structure: planned tables vs `sqlite_master`, per-table record counts |
//! | standard | basic + sampled record diffing, column by column |
//! | full     | standard + per-column statistics over the output |
//!
//! Record diffing re-decodes the first N records of each table from the
//! source with the same decoder and column plan the conversion used and
//! compares them against the output rows in insertion (rowid) order.
//! Values are normalized first — trailing NULs and blanks trimmed from
//! text, integers and reals compared numerically — so representation
//! noise does not read as corruption.
//!
//! Unreadable inputs are recorded as validation errors on the report
//! with `success = false`; the validator only returns `Err` for its own
//! internal failures.
//!
//! ## Database Comparison
//!
//! [`compare_databases`] diffs two SQLite files directly: schema
//! differences (tables present on one side only, column name/type
//! mismatches) and, for common tables, record-count deltas plus
//! row-level difference counts in rowid order, capped to keep the diff
//! bounded.

use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;
use std::time::Instant;

use eyre::{Result, WrapErr};
use hashbrown::{HashMap, HashSet};
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags};
use tracing::debug;

use crate::arrays::{analyze, ArrayFieldInfo};
use crate::config::{Config, DB_COMPARE_ROW_CAP, VALIDATION_SAMPLE_RECORDS};
use crate::decode::RecordDecoder;
use crate::engine::SourceFile;
use crate::schema::{project, TableSchema};
use crate::tps::{parse_with_fallback, PageReader, Record, TableDef};
use crate::types::Value;

/// How deep the validation digs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum ValidationLevel {
    Basic,
    #[default]
    Standard,
    Full,
}

impl FromStr for ValidationLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "basic" => Ok(ValidationLevel::Basic),
            "standard" => Ok(ValidationLevel::Standard),
            "full" => Ok(ValidationLevel::Full),
            other => Err(format!("unknown validation level: {}", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RecordCountDiff {
    pub table: String,
    pub source_records: u64,
    pub sqlite_records: u64,
}

#[derive(Debug, Clone, Default)]
pub struct StructureValidation {
    pub tables_match: bool,
    pub record_counts_match: bool,
    pub missing_tables: Vec<String>,
    pub extra_tables: Vec<String>,
    pub record_count_differences: Vec<RecordCountDiff>,
}

/// One cell where the re-decoded source and the output disagree.
#[derive(Debug, Clone)]
pub struct DataInconsistency {
    pub table: String,
    pub record_number: u32,
    pub column: String,
    pub source_value: String,
    pub sqlite_value: String,
}

#[derive(Debug, Clone, Default)]
pub struct ColumnStats {
    pub column: String,
    pub total_values: u64,
    pub null_count: u64,
    pub unique_count: u64,
    pub min_value: Option<f64>,
    pub max_value: Option<f64>,
    pub avg_value: Option<f64>,
    pub min_length: Option<u64>,
    pub max_length: Option<u64>,
    pub avg_length: Option<f64>,
}

#[derive(Debug, Clone, Default)]
pub struct TableColumnStats {
    pub table: String,
    pub columns: Vec<ColumnStats>,
}

#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    pub success: bool,
    pub total_tables: u64,
    pub total_records: u64,
    pub structure: StructureValidation,
    pub inconsistencies: Vec<DataInconsistency>,
    pub column_stats: Vec<TableColumnStats>,
    pub errors: Vec<String>,
    pub elapsed_seconds: f64,
}

impl std::fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "{}", "=".repeat(60))?;
        writeln!(f, "DATA VALIDATION REPORT")?;
        writeln!(f, "{}", "=".repeat(60))?;
        writeln!(f, "Success: {}", self.success)?;
        writeln!(f, "Total Tables: {}", self.total_tables)?;
        writeln!(f, "Total Records: {}", self.total_records)?;
        writeln!(f, "Duration: {:.1}s", self.elapsed_seconds)?;
        writeln!(f)?;
        writeln!(f, "Tables match: {}", self.structure.tables_match)?;
        writeln!(f, "Record counts match: {}", self.structure.record_counts_match)?;
        for table in &self.structure.missing_tables {
            writeln!(f, "  missing table: {}", table)?;
        }
        for table in &self.structure.extra_tables {
            writeln!(f, "  extra table: {}", table)?;
        }
        for diff in &self.structure.record_count_differences {
            writeln!(
                f,
                "  {}: {} source records, {} sqlite records",
                diff.table, diff.source_records, diff.sqlite_records
            )?;
        }
        writeln!(f, "Data inconsistencies: {}", self.inconsistencies.len())?;
        for inconsistency in self.inconsistencies.iter().take(10) {
            writeln!(
                f,
                "  {} record {} column {}: source {:?} vs sqlite {:?}",
                inconsistency.table,
                inconsistency.record_number,
                inconsistency.column,
                inconsistency.source_value,
                inconsistency.sqlite_value
            )?;
        }
        writeln!(f, "Validation errors: {}", self.errors.len())?;
        for error in &self.errors {
            writeln!(f, "  {}", error)?;
        }
        Ok(())
    }
}

struct PlannedTable {
    source_index: usize,
    table_number: u8,
    def: TableDef,
    arrays: Vec<ArrayFieldInfo>,
    schema: TableSchema,
}

pub struct ConversionValidator {
    config: Config,
    sample_records: usize,
}

impl ConversionValidator {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            sample_records: VALIDATION_SAMPLE_RECORDS,
        }
    }

    /// Overrides the per-table record sample used at `standard` and
    /// `full`.
    pub fn with_sample_limit(mut self, sample_records: usize) -> Self {
        self.sample_records = sample_records.max(1);
        self
    }

    /// Validates an output database against its sources. Unreadable
    /// inputs land in `report.errors`, not in `Err`.
    pub fn validate(
        &self,
        sources: &[SourceFile],
        sqlite_path: &Path,
        level: ValidationLevel,
    ) -> Result<ValidationReport> {
        let started = Instant::now();
        let mut report = ValidationReport::default();

        let conn = match Connection::open_with_flags(
            sqlite_path,
            OpenFlags::SQLITE_OPEN_READ_ONLY,
        ) {
            Ok(conn) => conn,
            Err(e) => {
                report
                    .errors
                    .push(format!("cannot open output {}: {}", sqlite_path.display(), e));
                report.elapsed_seconds = started.elapsed().as_secs_f64();
                return Ok(report);
            }
        };

        let mut readers = Vec::with_capacity(sources.len());
        for source in sources {
            match PageReader::open(&source.path) {
                Ok(reader) => readers.push(reader),
                Err(e) => report
                    .errors
                    .push(format!("cannot open source {}: {}", source.path.display(), e)),
            }
        }
        if !report.errors.is_empty() {
            report.elapsed_seconds = started.elapsed().as_secs_f64();
            return Ok(report);
        }

        let planned = plan_tables(sources, &readers);
        report.total_tables = planned.len() as u64;

        self.validate_structure(&planned, &readers, &conn, &mut report)?;

        if level >= ValidationLevel::Standard {
            for plan in &planned {
                if report.structure.missing_tables.contains(&plan.schema.table_name) {
                    continue;
                }
                self.compare_records(plan, &readers[plan.source_index], &conn, &mut report)?;
            }
        }

        if level >= ValidationLevel::Full {
            for plan in &planned {
                if report.structure.missing_tables.contains(&plan.schema.table_name) {
                    continue;
                }
                let stats =
                    analyze_table_columns(&conn, &plan.schema.table_name, self.sample_records)?;
                report.column_stats.push(stats);
            }
        }

        report.success = report.errors.is_empty()
            && report.structure.tables_match
            && report.structure.record_counts_match
            && report.inconsistencies.is_empty();
        report.elapsed_seconds = started.elapsed().as_secs_f64();
        debug!(success = report.success, tables = report.total_tables, "validation finished");
        Ok(report)
    }

    fn validate_structure(
        &self,
        planned: &[PlannedTable],
        readers: &[PageReader],
        conn: &Connection,
        report: &mut ValidationReport,
    ) -> Result<()> {
        let sqlite_tables = user_tables(conn)?;
        let planned_names: HashSet<&str> =
            planned.iter().map(|p| p.schema.table_name.as_str()).collect();

        for plan in planned {
            if !sqlite_tables.contains(&plan.schema.table_name) {
                report
                    .structure
                    .missing_tables
                    .push(plan.schema.table_name.clone());
            }
        }
        for table in &sqlite_tables {
            if !planned_names.contains(table.as_str()) {
                report.structure.extra_tables.push(table.clone());
            }
        }
        report.structure.tables_match = report.structure.missing_tables.is_empty()
            && report.structure.extra_tables.is_empty();

        for plan in planned {
            let source_records = readers[plan.source_index]
                .records_for_table(plan.table_number)
                .count() as u64;
            report.total_records += source_records;

            if !sqlite_tables.contains(&plan.schema.table_name) {
                continue;
            }
            let sqlite_records: i64 = conn.query_row(
                &format!("SELECT COUNT(*) FROM \"{}\"", plan.schema.table_name),
                [],
                |row| row.get(0),
            )?;
            if sqlite_records as u64 != source_records {
                report.structure.record_count_differences.push(RecordCountDiff {
                    table: plan.schema.table_name.clone(),
                    source_records,
                    sqlite_records: sqlite_records as u64,
                });
            }
        }
        report.structure.record_counts_match =
            report.structure.record_count_differences.is_empty();
        Ok(())
    }

    /// Re-decodes the leading records of one table and diffs them against
    /// the output rows in insertion order.
    fn compare_records(
        &self,
        plan: &PlannedTable,
        reader: &PageReader,
        conn: &Connection,
        report: &mut ValidationReport,
    ) -> Result<()> {
        let decoder = RecordDecoder::new(
            &plan.def,
            &plan.arrays,
            &plan.schema.plan,
            self.config.code_page,
        );

        let memo_count = plan.def.memos.len();
        let mut memo_store: HashMap<(u32, u8), Vec<u8>> = HashMap::new();
        if memo_count > 0 {
            for record in reader.records() {
                if let Record::Memo {
                    table_number,
                    owner_record,
                    memo_index,
                    bytes,
                } = record
                {
                    if table_number == plan.table_number {
                        memo_store.insert((owner_record, memo_index), bytes);
                    }
                }
            }
        }

        let (_, sqlite_rows) =
            fetch_rows(conn, &plan.schema.table_name, self.sample_records)?;

        for (index, (record_number, payload)) in reader
            .records_for_table(plan.table_number)
            .take(self.sample_records)
            .enumerate()
        {
            let memo_slots: Vec<Option<Vec<u8>>> = (0..memo_count)
                .map(|mi| memo_store.get(&(record_number, mi as u8)).cloned())
                .collect();

            let source_row = match decoder.decode(record_number, &payload, &memo_slots) {
                Ok(row) => row,
                Err(e) => {
                    report
                        .errors
                        .push(format!("cannot re-decode source record: {}", e));
                    continue;
                }
            };

            let Some(sqlite_row) = sqlite_rows.get(index) else {
                report.inconsistencies.push(DataInconsistency {
                    table: plan.schema.table_name.clone(),
                    record_number,
                    column: String::from("<row>"),
                    source_value: String::from("present"),
                    sqlite_value: String::from("missing"),
                });
                continue;
            };

            for (ci, column) in plan.schema.plan.columns.iter().enumerate() {
                let source_value = normalize_value(&source_row[ci]);
                let sqlite_value = sqlite_row
                    .get(ci)
                    .map(normalize_value)
                    .unwrap_or(Value::Null);
                if !values_match(&source_value, &sqlite_value) {
                    report.inconsistencies.push(DataInconsistency {
                        table: plan.schema.table_name.clone(),
                        record_number,
                        column: column.name.clone(),
                        source_value: source_value.to_string(),
                        sqlite_value: sqlite_value.to_string(),
                    });
                }
            }
        }
        Ok(())
    }
}

/// Mirrors the engine's planning pass so validation sees the exact table
/// names and column plans the conversion produced, collisions included.
fn plan_tables(sources: &[SourceFile], readers: &[PageReader]) -> Vec<PlannedTable> {
    let mut planned = Vec::new();
    let mut used_names: HashSet<String> = HashSet::new();

    for (source_index, reader) in readers.iter().enumerate() {
        let prefix = sources[source_index].prefix.as_str();
        let names = reader.table_names();
        let mut definitions: Vec<(u8, Vec<u8>)> = reader.table_definitions().into_iter().collect();
        definitions.sort_by_key(|(table, _)| *table);

        for (table_number, raw) in definitions {
            let def = parse_with_fallback(table_number, &raw);
            let arrays = analyze(&def);
            let source_name = names
                .get(&table_number)
                .cloned()
                .unwrap_or_else(|| format!("TABLE_{}", table_number));

            let mut schema = project(&source_name, prefix, &def, &arrays);
            if !used_names.insert(schema.table_name.clone()) {
                let qualified = format!("{}_{}", source_name, table_number);
                schema = project(&qualified, prefix, &def, &arrays);
                used_names.insert(schema.table_name.clone());
            }

            planned.push(PlannedTable {
                source_index,
                table_number,
                def,
                arrays,
                schema,
            });
        }
    }
    planned
}

/// Trims the representation noise the conversion itself trims, so the
/// comparison reflects content.
fn normalize_value(value: &Value) -> Value {
    match value {
        Value::Text(s) => Value::Text(s.trim_matches(['\0', ' ']).to_string()),
        other => other.clone(),
    }
}

fn values_match(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Int(x), Value::Int(y)) => x == y,
        (Value::Text(x), Value::Text(y)) => x == y,
        (Value::Blob(x), Value::Blob(y)) => x == y,
        (Value::Real(x), Value::Real(y)) => {
            (x - y).abs() <= 1e-9 * x.abs().max(y.abs()).max(1.0)
        }
        (Value::Int(x), Value::Real(y)) | (Value::Real(y), Value::Int(x)) => {
            (*x as f64 - y).abs() <= 1e-9
        }
        _ => false,
    }
}

/// Column statistics: totals, null and unique counts, numeric
/// min/max/avg, text length min/max/avg. Nulls are excluded from the
/// value statistics.
pub fn analyze_column(column: &str, values: &[Value]) -> ColumnStats {
    let mut stats = ColumnStats {
        column: column.to_string(),
        total_values: values.len() as u64,
        ..Default::default()
    };

    let mut uniques: HashSet<String> = HashSet::new();
    let mut numbers: Vec<f64> = Vec::new();
    let mut lengths: Vec<u64> = Vec::new();

    for value in values {
        match value {
            Value::Null => {
                stats.null_count += 1;
                continue;
            }
            Value::Int(i) => numbers.push(*i as f64),
            Value::Real(r) => numbers.push(*r),
            Value::Text(s) => lengths.push(s.chars().count() as u64),
            Value::Blob(b) => lengths.push(b.len() as u64),
        }
        uniques.insert(value.to_string());
    }
    stats.unique_count = uniques.len() as u64;

    if !numbers.is_empty() {
        stats.min_value = numbers.iter().copied().reduce(f64::min);
        stats.max_value = numbers.iter().copied().reduce(f64::max);
        stats.avg_value = Some(numbers.iter().sum::<f64>() / numbers.len() as f64);
    }
    if !lengths.is_empty() {
        stats.min_length = lengths.iter().copied().min();
        stats.max_length = lengths.iter().copied().max();
        stats.avg_length = Some(lengths.iter().sum::<u64>() as f64 / lengths.len() as f64);
    }
    stats
}

fn analyze_table_columns(
    conn: &Connection,
    table: &str,
    sample: usize,
) -> Result<TableColumnStats> {
    let (names, rows) = fetch_rows(conn, table, sample)?;
    let mut stats = TableColumnStats {
        table: table.to_string(),
        columns: Vec::with_capacity(names.len()),
    };
    for (ci, name) in names.iter().enumerate() {
        let column_values: Vec<Value> = rows
            .iter()
            .filter_map(|row| row.get(ci).cloned())
            .collect();
        stats.columns.push(analyze_column(name, &column_values));
    }
    Ok(stats)
}

/// User tables of the output, bookkeeping and sqlite internals excluded.
fn user_tables(conn: &Connection) -> Result<HashSet<String>> {
    let mut stmt = conn.prepare(
        "SELECT name FROM sqlite_master WHERE type='table' \
         AND name NOT LIKE '\\_%' ESCAPE '\\' AND name NOT LIKE 'sqlite_%'",
    )?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<std::result::Result<HashSet<_>, _>>()?;
    Ok(names)
}

fn fetch_rows(
    conn: &Connection,
    table: &str,
    limit: usize,
) -> Result<(Vec<String>, Vec<Vec<Value>>)> {
    let mut stmt = conn
        .prepare(&format!(
            "SELECT * FROM \"{}\" ORDER BY rowid LIMIT {}",
            table, limit
        ))
        .wrap_err_with(|| format!("cannot read table {}", table))?;
    let names: Vec<String> = stmt.column_names().iter().map(|n| n.to_string()).collect();
    let column_count = names.len();

    let mut out = Vec::new();
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let mut values = Vec::with_capacity(column_count);
        for ci in 0..column_count {
            values.push(match row.get_ref(ci)? {
                ValueRef::Null => Value::Null,
                ValueRef::Integer(i) => Value::Int(i),
                ValueRef::Real(r) => Value::Real(r),
                ValueRef::Text(t) => Value::Text(String::from_utf8_lossy(t).into_owned()),
                ValueRef::Blob(b) => Value::Blob(b.to_vec()),
            });
        }
        out.push(values);
    }
    Ok((names, out))
}

// ----------------------------------------------------------------------
// database-to-database comparison
// ----------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct TableDiff {
    pub table: String,
    pub record_count_diff: i64,
    pub data_differences: u64,
}

#[derive(Debug, Clone, Default)]
pub struct DatabaseComparison {
    pub schema_differences: Vec<String>,
    pub table_diffs: Vec<TableDiff>,
}

impl DatabaseComparison {
    pub fn is_identical(&self) -> bool {
        self.schema_differences.is_empty()
            && self
                .table_diffs
                .iter()
                .all(|d| d.record_count_diff == 0 && d.data_differences == 0)
    }
}

struct SqliteTableInfo {
    columns: Vec<(String, String)>,
    record_count: i64,
}

/// Diffs two SQLite files table by table.
pub fn compare_databases(left: &Path, right: &Path) -> Result<DatabaseComparison> {
    let left_conn = Connection::open_with_flags(left, OpenFlags::SQLITE_OPEN_READ_ONLY)
        .wrap_err_with(|| format!("cannot open {}", left.display()))?;
    let right_conn = Connection::open_with_flags(right, OpenFlags::SQLITE_OPEN_READ_ONLY)
        .wrap_err_with(|| format!("cannot open {}", right.display()))?;

    let left_schema = database_schema(&left_conn)?;
    let right_schema = database_schema(&right_conn)?;

    let mut comparison = DatabaseComparison::default();

    for (table, left_info) in &left_schema {
        let Some(right_info) = right_schema.get(table) else {
            comparison
                .schema_differences
                .push(format!("table {} only in {}", table, left.display()));
            continue;
        };
        if left_info.columns != right_info.columns {
            comparison.schema_differences.push(format!(
                "table {} columns differ: {:?} vs {:?}",
                table, left_info.columns, right_info.columns
            ));
        }

        let (_, left_rows) = fetch_rows(&left_conn, table, DB_COMPARE_ROW_CAP)?;
        let (_, right_rows) = fetch_rows(&right_conn, table, DB_COMPARE_ROW_CAP)?;
        let mut data_differences = 0u64;
        for index in 0..left_rows.len().max(right_rows.len()) {
            match (left_rows.get(index), right_rows.get(index)) {
                (Some(a), Some(b)) if rows_match(a, b) => {}
                _ => data_differences += 1,
            }
        }

        comparison.table_diffs.push(TableDiff {
            table: table.clone(),
            record_count_diff: left_info.record_count - right_info.record_count,
            data_differences,
        });
    }

    for table in right_schema.keys() {
        if !left_schema.contains_key(table) {
            comparison
                .schema_differences
                .push(format!("table {} only in {}", table, right.display()));
        }
    }

    Ok(comparison)
}

fn rows_match(a: &[Value], b: &[Value]) -> bool {
    a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| values_match(x, y))
}

fn database_schema(conn: &Connection) -> Result<BTreeMap<String, SqliteTableInfo>> {
    let mut stmt = conn.prepare(
        "SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%'",
    )?;
    let tables: Vec<String> = stmt
        .query_map([], |row| row.get(0))?
        .collect::<std::result::Result<_, _>>()?;

    let mut schema = BTreeMap::new();
    for table in tables {
        let mut info_stmt = conn.prepare(&format!("SELECT name, type FROM pragma_table_info('{}')", table))?;
        let columns: Vec<(String, String)> = info_stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<std::result::Result<_, _>>()?;
        let record_count: i64 =
            conn.query_row(&format!("SELECT COUNT(*) FROM \"{}\"", table), [], |row| {
                row.get(0)
            })?;
        schema.insert(
            table,
            SqliteTableInfo {
                columns,
                record_count,
            },
        );
    }
    Ok(schema)
}
