//! # Background Writer Thread
//!
//! Under the enterprise profile multiple tables decode in parallel, but
//! SQLite keeps a single-writer discipline: the connection moves onto one
//! dedicated thread, and decoder threads hand over pre-serialized batches
//! as [`WriteCommand`]s. Every command carries a response channel, which
//! doubles as backpressure — a decoder does not start its next batch until
//! the previous one is on disk.
//!
//! The writer thread never blocks while holding anything a decoder waits
//! on: it owns the connection outright and the channel is its only
//! coupling to the rest of the engine. `Shutdown` hands the connection
//! back to the caller so the run can finish its bookkeeping.

use std::sync::mpsc;

use eyre::Result;
use tracing::debug;

use super::SqliteWriter;
use crate::types::Value;

pub enum WriteCommand {
    /// Insert one pre-decoded batch in its own transaction.
    Batch {
        table: String,
        column_count: usize,
        rows: Vec<Vec<Value>>,
        respond_to: mpsc::Sender<Result<usize>>,
    },
    /// Record a cancellation marker for a table.
    ResumeMarker {
        table: String,
        last_record: u32,
        respond_to: mpsc::Sender<Result<()>>,
    },
    /// Clear a table's marker after it completes on a resumed run.
    ClearMarker {
        table: String,
        respond_to: mpsc::Sender<Result<()>>,
    },
    Shutdown,
}

/// Runs the writer loop until `Shutdown` or channel closure, then returns
/// the writer for final bookkeeping.
pub fn run_writer(receiver: mpsc::Receiver<WriteCommand>, mut writer: SqliteWriter) -> SqliteWriter {
    while let Ok(command) = receiver.recv() {
        match command {
            WriteCommand::Batch {
                table,
                column_count,
                rows,
                respond_to,
            } => {
                let result = writer.insert_batch(&table, column_count, &rows);
                let _ = respond_to.send(result);
            }
            WriteCommand::ResumeMarker {
                table,
                last_record,
                respond_to,
            } => {
                let result = writer.write_resume_marker(&table, last_record);
                let _ = respond_to.send(result);
            }
            WriteCommand::ClearMarker { table, respond_to } => {
                let result = writer.clear_resume_marker(&table);
                let _ = respond_to.send(result);
            }
            WriteCommand::Shutdown => {
                debug!("writer thread shutting down");
                break;
            }
        }
    }
    writer
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Column, ColumnPlan, ColumnSource, TableSchema};
    use std::thread;
    use tempfile::tempdir;

    fn schema() -> TableSchema {
        TableSchema {
            source_name: "T".to_string(),
            table_name: "T".to_string(),
            create_table: "CREATE TABLE IF NOT EXISTS \"T\" (\"ID\" INTEGER)".to_string(),
            create_indexes: Vec::new(),
            plan: ColumnPlan {
                columns: vec![Column {
                    name: "ID".to_string(),
                    decl_type: "INTEGER",
                    source: ColumnSource::Scalar(0),
                }],
            },
            array_fields_json: "[]".to_string(),
            source_prefix: String::new(),
        }
    }

    #[test]
    fn writer_thread_applies_batches_in_order() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.db");
        let mut writer = SqliteWriter::open(&path, 64 << 20).unwrap();
        writer.create_schema(&[schema()]).unwrap();

        let (tx, rx) = mpsc::channel();
        let handle = thread::spawn(move || run_writer(rx, writer));

        for i in 0..3i64 {
            let (done_tx, done_rx) = mpsc::channel();
            tx.send(WriteCommand::Batch {
                table: "T".to_string(),
                column_count: 1,
                rows: vec![vec![Value::Int(i)]],
                respond_to: done_tx,
            })
            .unwrap();
            assert_eq!(done_rx.recv().unwrap().unwrap(), 1);
        }
        tx.send(WriteCommand::Shutdown).unwrap();

        let writer = handle.join().unwrap();
        let count: i64 = writer
            .connection()
            .query_row("SELECT COUNT(*) FROM \"T\"", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 3);
    }

    #[test]
    fn writer_thread_handles_markers() {
        let dir = tempdir().unwrap();
        let writer = SqliteWriter::open(&dir.path().join("out.db"), 64 << 20).unwrap();

        let (tx, rx) = mpsc::channel();
        let handle = thread::spawn(move || run_writer(rx, writer));

        let (done_tx, done_rx) = mpsc::channel();
        tx.send(WriteCommand::ResumeMarker {
            table: "T".to_string(),
            last_record: 99,
            respond_to: done_tx,
        })
        .unwrap();
        done_rx.recv().unwrap().unwrap();

        let (done_tx, done_rx) = mpsc::channel();
        tx.send(WriteCommand::ClearMarker {
            table: "T".to_string(),
            respond_to: done_tx,
        })
        .unwrap();
        done_rx.recv().unwrap().unwrap();

        drop(tx);
        let writer = handle.join().unwrap();
        assert!(writer.resume_positions().unwrap().is_empty());
    }
}
