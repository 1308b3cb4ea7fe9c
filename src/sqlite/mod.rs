//! # SQLite Writer
//!
//! Owns the output connection for the duration of one conversion run.
//! PRAGMAs are applied once at open: `journal_mode=WAL`,
//! `synchronous=NORMAL`, `temp_store=MEMORY`, and a page cache sized to a
//! quarter of the memory limit.
//!
//! ## Write Discipline
//!
//! All DDL is executed before any DML so name references across tables
//! resolve. Batches insert through a cached prepared statement; in
//! streaming mode each batch runs in its own transaction, otherwise the
//! engine brackets a whole table in one transaction with
//! [`SqliteWriter::begin`]/[`SqliteWriter::commit`]. Committing — not
//! rolling back — on a table abort is what makes partial progress
//! durable.
//!
//! ## Bookkeeping Tables
//!
//! - `_schema(table_name, array_fields, source_prefix)` — array metadata
//!   per table, written with the DDL.
//! - `_resume(table_name, last_record)` — created on cancellation only;
//!   markers record the last committed record number per table and are
//!   cleared as tables complete on a resumed run.
//!
//! ## Parallel Mode
//!
//! Under the enterprise profile the connection moves onto a dedicated
//! writer thread; decoder threads hand over pre-serialized batches via
//! [`WriteCommand`]s on an mpsc channel. See [`run_writer`].

mod writer_thread;

pub use writer_thread::{run_writer, WriteCommand};

use std::path::Path;

use eyre::{Result, WrapErr};
use hashbrown::HashMap;
use rusqlite::types::{ToSqlOutput, ValueRef};
use rusqlite::{params_from_iter, Connection, ToSql};

use crate::config::{SQLITE_CACHE_DIVISOR, SQLITE_CACHE_FLOOR_KIB};
use crate::schema::TableSchema;
use crate::types::Value;

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Value::Null => ToSqlOutput::Borrowed(ValueRef::Null),
            Value::Int(i) => ToSqlOutput::Borrowed(ValueRef::Integer(*i)),
            Value::Real(f) => ToSqlOutput::Borrowed(ValueRef::Real(*f)),
            Value::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            Value::Blob(b) => ToSqlOutput::Borrowed(ValueRef::Blob(b)),
        })
    }
}

pub struct SqliteWriter {
    conn: Connection,
}

impl SqliteWriter {
    /// Opens the output database and applies the run PRAGMAs.
    /// `memory_limit_bytes` sizes the page cache at one quarter.
    pub fn open(path: &Path, memory_limit_bytes: u64) -> Result<Self> {
        let conn = Connection::open(path)
            .wrap_err_with(|| format!("failed to open SQLite output {}", path.display()))?;

        let cache_kib =
            (memory_limit_bytes / SQLITE_CACHE_DIVISOR / 1024).max(SQLITE_CACHE_FLOOR_KIB);
        conn.execute_batch(&format!(
            "PRAGMA journal_mode=WAL;\n\
             PRAGMA synchronous=NORMAL;\n\
             PRAGMA temp_store=MEMORY;\n\
             PRAGMA cache_size=-{};",
            cache_kib
        ))
        .wrap_err("failed to apply output PRAGMAs")?;

        Ok(Self { conn })
    }

    /// Emits all DDL — tables, indexes, `_schema` — plus the `_schema`
    /// rows, in one transaction.
    pub fn create_schema(&mut self, schemas: &[TableSchema]) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;

        tx.execute_batch(
            "CREATE TABLE IF NOT EXISTS _schema (\
             table_name TEXT PRIMARY KEY, array_fields TEXT, source_prefix TEXT)",
        )?;

        for schema in schemas {
            tx.execute_batch(&schema.create_table)?;
            for index_sql in &schema.create_indexes {
                tx.execute_batch(index_sql)?;
            }
            tx.execute(
                "INSERT OR REPLACE INTO _schema (table_name, array_fields, source_prefix) \
                 VALUES (?1, ?2, ?3)",
                rusqlite::params![
                    schema.table_name,
                    schema.array_fields_json,
                    schema.source_prefix
                ],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    /// Inserts a batch inside its own transaction (streaming mode).
    pub fn insert_batch(
        &mut self,
        table: &str,
        column_count: usize,
        rows: &[Vec<Value>],
    ) -> Result<usize> {
        if rows.is_empty() {
            return Ok(0);
        }
        let tx = self.conn.unchecked_transaction()?;
        let written = Self::insert_rows(&tx, table, column_count, rows)?;
        tx.commit()?;
        Ok(written)
    }

    /// Inserts a batch without transaction bracketing; the caller holds a
    /// table-level transaction via [`begin`](Self::begin).
    pub fn insert_batch_unbracketed(
        &mut self,
        table: &str,
        column_count: usize,
        rows: &[Vec<Value>],
    ) -> Result<usize> {
        Self::insert_rows(&self.conn, table, column_count, rows)
    }

    fn insert_rows(
        conn: &Connection,
        table: &str,
        column_count: usize,
        rows: &[Vec<Value>],
    ) -> Result<usize> {
        let placeholders = vec!["?"; column_count].join(", ");
        let sql = format!("INSERT INTO \"{}\" VALUES ({})", table, placeholders);
        let mut stmt = conn.prepare_cached(&sql)?;

        for row in rows {
            eyre::ensure!(
                row.len() == column_count,
                "row width {} does not match column count {}",
                row.len(),
                column_count
            );
            stmt.execute(params_from_iter(row.iter()))?;
        }
        Ok(rows.len())
    }

    pub fn begin(&mut self) -> Result<()> {
        self.conn.execute_batch("BEGIN")?;
        Ok(())
    }

    pub fn commit(&mut self) -> Result<()> {
        self.conn.execute_batch("COMMIT")?;
        Ok(())
    }

    /// True when the error chain bottoms out in SQLITE_FULL.
    pub fn is_disk_full(err: &eyre::Report) -> bool {
        err.chain().any(|cause| {
            matches!(
                cause.downcast_ref::<rusqlite::Error>(),
                Some(rusqlite::Error::SqliteFailure(e, _))
                    if e.code == rusqlite::ErrorCode::DiskFull
            )
        })
    }

    // ------------------------------------------------------------------
    // resume markers
    // ------------------------------------------------------------------

    /// Positions recorded by an interrupted run; empty when no `_resume`
    /// table exists.
    pub fn resume_positions(&self) -> Result<HashMap<String, u32>> {
        let exists: bool = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='_resume')",
            [],
            |row| row.get(0),
        )?;
        if !exists {
            return Ok(HashMap::new());
        }

        let mut stmt = self
            .conn
            .prepare("SELECT table_name, last_record FROM _resume")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u32))
        })?;

        let mut positions = HashMap::new();
        for row in rows {
            let (table, last_record) = row?;
            positions.insert(table, last_record);
        }
        Ok(positions)
    }

    /// Records the last committed record for a table, creating `_resume`
    /// on first use.
    pub fn write_resume_marker(&mut self, table: &str, last_record: u32) -> Result<()> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS _resume (\
             table_name TEXT PRIMARY KEY, last_record INTEGER)",
        )?;
        self.conn.execute(
            "INSERT OR REPLACE INTO _resume (table_name, last_record) VALUES (?1, ?2)",
            rusqlite::params![table, last_record as i64],
        )?;
        Ok(())
    }

    /// Drops a table's marker once it has been fully converted.
    pub fn clear_resume_marker(&mut self, table: &str) -> Result<()> {
        let exists: bool = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='_resume')",
            [],
            |row| row.get(0),
        )?;
        if exists {
            self.conn
                .execute("DELETE FROM _resume WHERE table_name = ?1", [table])?;
        }
        Ok(())
    }

    /// Removes `_resume` entirely once no markers remain, so the table is
    /// present only after an interrupted run.
    pub fn drop_resume_if_empty(&mut self) -> Result<()> {
        let exists: bool = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='_resume')",
            [],
            |row| row.get(0),
        )?;
        if !exists {
            return Ok(());
        }
        let remaining: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM _resume", [], |row| row.get(0))?;
        if remaining == 0 {
            self.conn.execute_batch("DROP TABLE _resume")?;
        }
        Ok(())
    }

    /// Closes cleanly, surfacing any pending error.
    pub fn close(self) -> Result<()> {
        self.conn
            .close()
            .map_err(|(_, e)| eyre::Report::new(e).wrap_err("failed to close SQLite output"))
    }

    #[cfg(test)]
    pub(crate) fn connection(&self) -> &Connection {
        &self.conn
    }
}
