//! # Conversion Engine
//!
//! Orchestrates one run: open the sources, reconstruct every table
//! definition, emit all DDL, then stream each table's records through the
//! decoder into batched SQLite writes under governor control.
//!
//! ## Phases
//!
//! ```text
//! plan    open sources -> table definitions -> array analysis -> schemas
//! ddl     every table + _schema rows, before any DML
//! dml     per table, in table-number order within each source:
//!             memo pre-pass -> record stream -> decode -> batch -> write
//! close   resume bookkeeping, clean connection close, report
//! ```
//!
//! ## Error Policy
//!
//! Corrupt pages and row decode failures are absorbed with counters. A
//! write failure abandons the current table but commits the batches
//! already flushed. Disk-full and post-remediation memory pressure abort
//! the run. Header failures abort the run before any work.
//!
//! ## Cancellation and Resume
//!
//! The engine polls a [`CancelToken`] between batches. On cancellation it
//! commits the in-flight batch, records `_resume` markers — the last
//! committed record for the interrupted table, zero for tables not yet
//! started — closes cleanly, and reports `cancelled`. A later run with
//! `resume = true` skips completed tables (no marker), fast-forwards the
//! interrupted one past its marker, and converts the rest from scratch.
//!
//! With `Config.recovery_dir` set, a [`RecoveryStore`] additionally backs
//! up a pre-existing output before the run touches it and writes a
//! `conversion` checkpoint (counters plus markers) on cancellation.
//! Restoring is always an explicit caller action.
//!
//! ## Parallel Tables
//!
//! Under the enterprise profile with `parallel_tables > 1`, tables are
//! decoded by a pool of worker threads, each with its own `PageReader`
//! handle, feeding pre-serialized batches to the single writer thread
//! that owns the connection. Within one table decoding stays sequential,
//! so per-table insertion order still equals reader yield order.

mod recovery;
mod report;

pub use recovery::RecoveryStore;
pub use report::ConversionReport;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::time::Instant;

use eyre::{Result, WrapErr};
use hashbrown::{HashMap, HashSet};
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::arrays::{analyze, ArrayFieldInfo};
use crate::config::{Config, ProfileChoice, RowErrorPolicy, MAX_CONSECUTIVE_ROW_ERRORS};
use crate::decode::RecordDecoder;
use crate::governor::{Governor, MemoryProbe, Profile, ScriptedProbe, SysinfoProbe};
use crate::schema::{project, TableSchema};
use crate::sqlite::{run_writer, SqliteWriter, WriteCommand};
use crate::tps::{parse_with_fallback, PageReader, Record, TableDef};
use crate::types::Value;

/// Cooperative cancellation handle. Clone it, hand one to the engine, keep
/// the other to cancel from another thread.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

/// Table-name prefix by source context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourcePrefix {
    None,
    Phd,
    Mod,
}

impl SourcePrefix {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourcePrefix::None => "",
            SourcePrefix::Phd => "phd_",
            SourcePrefix::Mod => "mod_",
        }
    }

    /// Infers the prefix from the file extension: `.phd` and `.mod` carry
    /// their prefixes, anything else (`.tps`) none.
    pub fn for_path(path: &Path) -> SourcePrefix {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .as_deref()
        {
            Some("phd") => SourcePrefix::Phd,
            Some("mod") => SourcePrefix::Mod,
            _ => SourcePrefix::None,
        }
    }
}

/// One input file plus its naming context. `.phz` bundles are unpacked by
/// the caller; the engine only sees `.phd`/`.mod`/`.tps` streams.
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub path: PathBuf,
    pub prefix: SourcePrefix,
}

impl SourceFile {
    /// Source with the prefix inferred from the extension.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let prefix = SourcePrefix::for_path(&path);
        Self { path, prefix }
    }

    pub fn with_prefix(path: impl Into<PathBuf>, prefix: SourcePrefix) -> Self {
        Self {
            path: path.into(),
            prefix,
        }
    }
}

type ProbeFactory = Box<dyn Fn() -> Box<dyn MemoryProbe> + Send + Sync>;

fn default_probe_factory() -> ProbeFactory {
    Box::new(|| match SysinfoProbe::new() {
        Ok(probe) => Box::new(probe) as Box<dyn MemoryProbe>,
        Err(e) => {
            warn!(error = %e, "memory probe unavailable, governor runs blind");
            Box::new(ScriptedProbe::constant(0))
        }
    })
}

pub struct ConversionEngine {
    config: Config,
    probe_factory: ProbeFactory,
}

struct TablePlan {
    source_index: usize,
    def: TableDef,
    arrays: Vec<ArrayFieldInfo>,
    schema: TableSchema,
    profile: Profile,
    /// Skip records at or below this number (resume fast-forward).
    resume_after: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TableStatus {
    Ok,
    Partial,
    Failed,
}

struct TableOutcome {
    status: TableStatus,
    rows_written: u64,
    rows_skipped: u64,
    corrupt_pages: u64,
    cancelled: bool,
}

impl ConversionEngine {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            probe_factory: default_probe_factory(),
        }
    }

    /// Engine with an injected memory probe, for deterministic governor
    /// behaviour in tests.
    pub fn with_probe_factory(
        config: Config,
        factory: impl Fn() -> Box<dyn MemoryProbe> + Send + Sync + 'static,
    ) -> Self {
        Self {
            config,
            probe_factory: Box::new(factory),
        }
    }

    pub fn convert(&self, sources: &[SourceFile], sqlite_path: &Path) -> Result<ConversionReport> {
        self.convert_with_cancel(sources, sqlite_path, &CancelToken::new())
    }

    pub fn convert_with_cancel(
        &self,
        sources: &[SourceFile],
        sqlite_path: &Path,
        cancel: &CancelToken,
    ) -> Result<ConversionReport> {
        let started = Instant::now();

        // ---- plan phase -------------------------------------------------
        let mut readers = Vec::with_capacity(sources.len());
        for source in sources {
            readers.push(PageReader::open(&source.path)?);
        }

        let mut plans = self.build_plans(sources, &readers);

        let run_profile = self.run_profile(&plans);
        let memory_limit = self
            .config
            .memory_limit_bytes
            .unwrap_or_else(|| run_profile.settings().memory_limit_bytes);

        // an existing output is backed up before the run touches it
        let mut recovery = self
            .config
            .recovery_dir
            .as_ref()
            .map(RecoveryStore::new)
            .transpose()?;
        if let Some(store) = recovery.as_mut() {
            if sqlite_path.exists() {
                store.create_backup(sqlite_path)?;
            }
        }

        // ---- ddl phase --------------------------------------------------
        let mut writer = SqliteWriter::open(sqlite_path, memory_limit)
            .wrap_err("failed to open conversion output")?;

        if self.config.resume {
            let positions = writer.resume_positions()?;
            if !positions.is_empty() {
                plans.retain_mut(|plan| match positions.get(&plan.schema.table_name) {
                    Some(&last_record) => {
                        plan.resume_after = last_record;
                        true
                    }
                    // no marker means the table completed before the cancel
                    None => false,
                });
                info!(remaining = plans.len(), "resuming interrupted conversion");
            }
        }

        let schemas: Vec<TableSchema> = plans.iter().map(|p| p.schema.clone()).collect();
        writer.create_schema(&schemas)?;

        let mut report = ConversionReport {
            tables_total: plans.len() as u64,
            ..Default::default()
        };

        // ---- dml phase --------------------------------------------------
        let parallel = run_profile == Profile::Enterprise && self.config.parallel_tables > 1;
        let mut writer = if parallel {
            self.convert_parallel(sources, &plans, writer, cancel, &mut report)?
        } else {
            self.convert_sequential(&readers, &plans, writer, cancel, &mut report)?
        };

        // ---- close phase ------------------------------------------------
        if report.cancelled {
            if let Some(store) = recovery.as_mut() {
                store.create_checkpoint("conversion", &checkpoint_state(&writer, &report)?)?;
            }
        } else {
            writer.drop_resume_if_empty()?;
        }
        writer.close()?;

        report.elapsed_seconds = started.elapsed().as_secs_f64();
        info!(%report, "conversion finished");
        Ok(report)
    }

    fn build_plans(&self, sources: &[SourceFile], readers: &[PageReader]) -> Vec<TablePlan> {
        let mut plans = Vec::new();
        let mut used_names: HashSet<String> = HashSet::new();

        for (source_index, reader) in readers.iter().enumerate() {
            let prefix = sources[source_index].prefix.as_str();
            let names = reader.table_names();
            let mut definitions: Vec<(u8, Vec<u8>)> =
                reader.table_definitions().into_iter().collect();
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
                    // prefixed names must stay unique across the merged
                    // database; qualify the collision by table number
                    let qualified = format!("{}_{}", source_name, table_number);
                    schema = project(&qualified, prefix, &def, &arrays);
                    used_names.insert(schema.table_name.clone());
                }

                let estimated_bytes =
                    def.record_length as u64 * reader.last_issued_row() as u64;
                let profile = match self.config.profile {
                    ProfileChoice::Auto => Profile::classify(estimated_bytes),
                    ProfileChoice::Small => Profile::Small,
                    ProfileChoice::Medium => Profile::Medium,
                    ProfileChoice::Large => Profile::Large,
                    ProfileChoice::Enterprise => Profile::Enterprise,
                };

                debug!(
                    table = table_number,
                    name = %schema.table_name,
                    fields = def.fields.len(),
                    arrays = arrays.len(),
                    profile = profile.name(),
                    "planned table"
                );

                plans.push(TablePlan {
                    source_index,
                    def,
                    arrays,
                    schema,
                    profile,
                    resume_after: 0,
                });
            }
        }
        plans
    }

    fn run_profile(&self, plans: &[TablePlan]) -> Profile {
        match self.config.profile {
            ProfileChoice::Small => Profile::Small,
            ProfileChoice::Medium => Profile::Medium,
            ProfileChoice::Large => Profile::Large,
            ProfileChoice::Enterprise => Profile::Enterprise,
            ProfileChoice::Auto => plans
                .iter()
                .map(|p| p.profile)
                .max()
                .unwrap_or(Profile::Small),
        }
    }

    fn convert_sequential(
        &self,
        readers: &[PageReader],
        plans: &[TablePlan],
        mut writer: SqliteWriter,
        cancel: &CancelToken,
        report: &mut ConversionReport,
    ) -> Result<SqliteWriter> {
        let mut remaining = plans.iter();

        for plan in remaining.by_ref() {
            let reader = &readers[plan.source_index];
            let mut sink = DirectSink {
                writer: &mut writer,
            };
            let outcome =
                self.convert_table(reader, plan, (self.probe_factory)(), &mut sink, cancel)?;

            apply_outcome(report, &outcome);
            if outcome.cancelled {
                report.cancelled = true;
                break;
            }
            writer.clear_resume_marker(&plan.schema.table_name)?;
        }

        if report.cancelled {
            for plan in remaining {
                writer.write_resume_marker(&plan.schema.table_name, plan.resume_after)?;
            }
        }
        Ok(writer)
    }

    fn convert_parallel(
        &self,
        sources: &[SourceFile],
        plans: &[TablePlan],
        writer: SqliteWriter,
        cancel: &CancelToken,
        report: &mut ConversionReport,
    ) -> Result<SqliteWriter> {
        let workers = self.config.parallel_tables.min(plans.len().max(1));
        let (command_tx, command_rx) = mpsc::channel::<WriteCommand>();
        let writer_handle = std::thread::spawn(move || run_writer(command_rx, writer));

        let next_plan = AtomicUsize::new(0);
        let outcomes: Mutex<Vec<Option<TableOutcome>>> =
            Mutex::new((0..plans.len()).map(|_| None).collect());
        let fatal: Mutex<Option<eyre::Report>> = Mutex::new(None);

        std::thread::scope(|scope| {
            for _ in 0..workers {
                let command_tx = command_tx.clone();
                let next_plan = &next_plan;
                let outcomes = &outcomes;
                let fatal = &fatal;
                scope.spawn(move || loop {
                    if cancel.is_cancelled() || fatal.lock().is_some() {
                        return;
                    }
                    let index = next_plan.fetch_add(1, Ordering::SeqCst);
                    if index >= plans.len() {
                        return;
                    }
                    let plan = &plans[index];

                    // one file handle per thread
                    let reader = match PageReader::open(&sources[plan.source_index].path) {
                        Ok(reader) => reader,
                        Err(e) => {
                            *fatal.lock() = Some(e);
                            return;
                        }
                    };
                    let mut sink = ChannelSink {
                        commands: command_tx.clone(),
                    };
                    match self.convert_table(
                        &reader,
                        plan,
                        (self.probe_factory)(),
                        &mut sink,
                        cancel,
                    ) {
                        Ok(outcome) => {
                            if !outcome.cancelled {
                                let _ = sink.clear_marker(&plan.schema.table_name);
                            }
                            outcomes.lock()[index] = Some(outcome);
                        }
                        Err(e) => {
                            *fatal.lock() = Some(e);
                        }
                    }
                });
            }
        });

        command_tx
            .send(WriteCommand::Shutdown)
            .map_err(|_| eyre::eyre!("writer thread exited early"))?;
        drop(command_tx);
        let mut writer = writer_handle
            .join()
            .map_err(|_| eyre::eyre!("writer thread panicked"))?;

        if let Some(e) = fatal.into_inner() {
            return Err(e);
        }

        let outcomes = outcomes.into_inner();
        let cancelled = cancel.is_cancelled();
        for (index, outcome) in outcomes.iter().enumerate() {
            match outcome {
                Some(outcome) => apply_outcome(report, outcome),
                None if cancelled => {
                    // never started: marker 0 so a resumed run converts it
                    writer.write_resume_marker(
                        &plans[index].schema.table_name,
                        plans[index].resume_after,
                    )?;
                }
                None => {}
            }
        }
        report.cancelled = cancelled;
        Ok(writer)
    }

    /// Streams one table. Returns `Err` only for run-fatal conditions
    /// (disk full, post-remediation memory pressure); everything else is
    /// absorbed into the outcome.
    fn convert_table(
        &self,
        reader: &PageReader,
        plan: &TablePlan,
        probe: Box<dyn MemoryProbe>,
        sink: &mut dyn BatchSink,
        cancel: &CancelToken,
    ) -> Result<TableOutcome> {
        let def = &plan.def;
        let schema = &plan.schema;
        let column_count = schema.plan.len();
        let mut governor = Governor::new(
            plan.profile,
            self.config.memory_limit_bytes,
            self.config.release_interval,
            probe,
        );
        let streaming = governor.streaming();
        let decoder = RecordDecoder::new(def, &plan.arrays, &schema.plan, self.config.code_page);

        let mut outcome = TableOutcome {
            status: TableStatus::Ok,
            rows_written: 0,
            rows_skipped: 0,
            corrupt_pages: 0,
            cancelled: false,
        };

        // memos are joined to rows by (owner record, memo ordinal)
        let memo_count = def.memos.len();
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
                    if table_number == def.table_number {
                        memo_store.insert((owner_record, memo_index), bytes);
                    }
                }
            }
        }

        if !streaming {
            sink.begin_table()?;
        }

        let mut records = reader.records_for_table(def.table_number);
        let mut batch: Vec<Vec<Value>> = Vec::with_capacity(governor.batch_size());
        let mut last_committed = plan.resume_after;
        let mut pending_high = plan.resume_after;
        let mut consecutive_errors = 0u64;

        'stream: for (record_number, payload) in records.by_ref() {
            if plan.resume_after > 0 && record_number <= plan.resume_after {
                continue;
            }

            let memo_slots: Vec<Option<Vec<u8>>> = (0..memo_count)
                .map(|mi| memo_store.get(&(record_number, mi as u8)).cloned())
                .collect();

            match self.config.on_row_error {
                RowErrorPolicy::Skip => {
                    match decoder.decode(record_number, &payload, &memo_slots) {
                        Ok(row) => {
                            consecutive_errors = 0;
                            batch.push(row);
                            pending_high = pending_high.max(record_number);
                        }
                        Err(e) => {
                            warn!(file = %reader.path().display(), error = %e, "skipping row");
                            outcome.rows_skipped += 1;
                            consecutive_errors += 1;
                            if consecutive_errors >= MAX_CONSECUTIVE_ROW_ERRORS {
                                error!(
                                    file = %reader.path().display(),
                                    table = %schema.table_name,
                                    "too many consecutive row errors, abandoning table"
                                );
                                outcome.status = TableStatus::Partial;
                                break 'stream;
                            }
                        }
                    }
                }
                RowErrorPolicy::Partial => {
                    let (row, first_error) =
                        decoder.decode_partial(record_number, &payload, &memo_slots);
                    if let Some(e) = first_error {
                        warn!(file = %reader.path().display(), error = %e, "inserting partial row");
                    }
                    batch.push(row);
                    pending_high = pending_high.max(record_number);
                    consecutive_errors = 0;
                }
                RowErrorPolicy::Abort => {
                    match decoder.decode(record_number, &payload, &memo_slots) {
                        Ok(row) => {
                            batch.push(row);
                            pending_high = pending_high.max(record_number);
                        }
                        Err(e) => {
                            error!(
                                file = %reader.path().display(),
                                error = %e,
                                "row error under abort policy, abandoning table"
                            );
                            outcome.rows_skipped += 1;
                            outcome.status = TableStatus::Partial;
                            break 'stream;
                        }
                    }
                }
            }

            if batch.len() >= governor.batch_size() {
                let flushed = std::mem::take(&mut batch);
                let count = flushed.len();
                match sink.write_batch(&schema.table_name, column_count, flushed, streaming) {
                    Ok(written) => {
                        outcome.rows_written += written as u64;
                        last_committed = pending_high;
                    }
                    Err(e) => {
                        if SqliteWriter::is_disk_full(&e) {
                            return Err(e.wrap_err("output device full"));
                        }
                        error!(
                            table = %schema.table_name,
                            error = %e,
                            "write failed, abandoning table"
                        );
                        outcome.status = if outcome.rows_written > 0 {
                            TableStatus::Partial
                        } else {
                            TableStatus::Failed
                        };
                        break 'stream;
                    }
                }

                let control = governor.after_batch(count)?;
                if control.release_requested {
                    batch = Vec::with_capacity(governor.batch_size());
                    memo_store.shrink_to_fit();
                }
                if governor.record_progress(count as u64) {
                    batch.shrink_to_fit();
                }

                if cancel.is_cancelled() {
                    sink.resume_marker(&schema.table_name, last_committed)?;
                    outcome.cancelled = true;
                    break 'stream;
                }
            }
        }

        // the in-flight tail is flushed so completed work is never lost
        if !outcome.cancelled && !batch.is_empty() {
            let flushed = std::mem::take(&mut batch);
            match sink.write_batch(&schema.table_name, column_count, flushed, streaming) {
                Ok(written) => outcome.rows_written += written as u64,
                Err(e) => {
                    if SqliteWriter::is_disk_full(&e) {
                        return Err(e.wrap_err("output device full"));
                    }
                    error!(table = %schema.table_name, error = %e, "tail write failed");
                    outcome.status = if outcome.rows_written > 0 {
                        TableStatus::Partial
                    } else {
                        TableStatus::Failed
                    };
                }
            }
        }

        if !streaming {
            // commit, never roll back: partial conversion stays durable
            if let Err(e) = sink.commit_table() {
                if SqliteWriter::is_disk_full(&e) {
                    return Err(e.wrap_err("output device full"));
                }
                error!(table = %schema.table_name, error = %e, "table commit failed");
                outcome.status = TableStatus::Failed;
            }
        }

        outcome.corrupt_pages = records.corrupt_pages();
        Ok(outcome)
    }
}

/// Snapshot written to the `conversion` checkpoint on cancellation: the
/// counters so far plus the `_resume` markers.
fn checkpoint_state(writer: &SqliteWriter, report: &ConversionReport) -> Result<serde_json::Value> {
    let mut markers = serde_json::Map::new();
    for (table, last_record) in writer.resume_positions()? {
        markers.insert(table, serde_json::Value::from(last_record));
    }
    Ok(serde_json::json!({
        "tables_total": report.tables_total,
        "rows_written": report.rows_written,
        "rows_skipped": report.rows_skipped,
        "corrupt_pages": report.corrupt_pages,
        "markers": markers,
    }))
}

fn apply_outcome(report: &mut ConversionReport, outcome: &TableOutcome) {
    report.rows_written += outcome.rows_written;
    report.rows_skipped += outcome.rows_skipped;
    report.corrupt_pages += outcome.corrupt_pages;
    if outcome.cancelled {
        report.tables_partial += 1;
        return;
    }
    match outcome.status {
        TableStatus::Ok => report.tables_ok += 1,
        TableStatus::Partial => report.tables_partial += 1,
        TableStatus::Failed => report.tables_failed += 1,
    }
}

/// Where decoded batches go. The sequential engine writes directly; the
/// parallel engine forwards to the writer thread.
trait BatchSink {
    fn write_batch(
        &mut self,
        table: &str,
        column_count: usize,
        rows: Vec<Vec<Value>>,
        own_txn: bool,
    ) -> Result<usize>;
    fn resume_marker(&mut self, table: &str, last_record: u32) -> Result<()>;
    fn clear_marker(&mut self, table: &str) -> Result<()>;
    fn begin_table(&mut self) -> Result<()>;
    fn commit_table(&mut self) -> Result<()>;
}

struct DirectSink<'a> {
    writer: &'a mut SqliteWriter,
}

impl BatchSink for DirectSink<'_> {
    fn write_batch(
        &mut self,
        table: &str,
        column_count: usize,
        rows: Vec<Vec<Value>>,
        own_txn: bool,
    ) -> Result<usize> {
        if own_txn {
            self.writer.insert_batch(table, column_count, &rows)
        } else {
            self.writer.insert_batch_unbracketed(table, column_count, &rows)
        }
    }

    fn resume_marker(&mut self, table: &str, last_record: u32) -> Result<()> {
        self.writer.write_resume_marker(table, last_record)
    }

    fn clear_marker(&mut self, table: &str) -> Result<()> {
        self.writer.clear_resume_marker(table)
    }

    fn begin_table(&mut self) -> Result<()> {
        self.writer.begin()
    }

    fn commit_table(&mut self) -> Result<()> {
        self.writer.commit()
    }
}

struct ChannelSink {
    commands: mpsc::Sender<WriteCommand>,
}

impl BatchSink for ChannelSink {
    fn write_batch(
        &mut self,
        table: &str,
        column_count: usize,
        rows: Vec<Vec<Value>>,
        _own_txn: bool,
    ) -> Result<usize> {
        let (respond_to, response) = mpsc::channel();
        self.commands
            .send(WriteCommand::Batch {
                table: table.to_string(),
                column_count,
                rows,
                respond_to,
            })
            .map_err(|_| eyre::eyre!("writer thread gone"))?;
        response
            .recv()
            .map_err(|_| eyre::eyre!("writer thread dropped the batch"))?
    }

    fn resume_marker(&mut self, table: &str, last_record: u32) -> Result<()> {
        let (respond_to, response) = mpsc::channel();
        self.commands
            .send(WriteCommand::ResumeMarker {
                table: table.to_string(),
                last_record,
                respond_to,
            })
            .map_err(|_| eyre::eyre!("writer thread gone"))?;
        response
            .recv()
            .map_err(|_| eyre::eyre!("writer thread dropped the marker"))?
    }

    fn clear_marker(&mut self, table: &str) -> Result<()> {
        let (respond_to, response) = mpsc::channel();
        self.commands
            .send(WriteCommand::ClearMarker {
                table: table.to_string(),
                respond_to,
            })
            .map_err(|_| eyre::eyre!("writer thread gone"))?;
        response
            .recv()
            .map_err(|_| eyre::eyre!("writer thread dropped the marker"))?
    }

    // parallel decoding always streams; table-level transactions would
    // interleave across tables on the shared connection
    fn begin_table(&mut self) -> Result<()> {
        Ok(())
    }

    fn commit_table(&mut self) -> Result<()> {
        Ok(())
    }
}
