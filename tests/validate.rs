//! # Validation Integration Tests
//!
//! Runs the full conversion and then the validator against it: clean
//! outputs validate at every level, tampered outputs are caught, and the
//! database comparison flags seeded differences between two outputs.

mod common;

use common::{array_field, field, memo, table_def, FixtureTable, PayloadBuilder, TpsFixture};
use rusqlite::Connection;
use tempfile::tempdir;
use tpslite::tps::FieldKind;
use tpslite::{
    compare_databases, Config, ConversionEngine, ConversionValidator, SourceFile, ValidationLevel,
};

fn build_source(path: &std::path::Path) {
    let mut wells_def = table_def(
        1,
        vec![
            field("W:ID", FieldKind::Long, 0, 4),
            field("W:NAME", FieldKind::String, 4, 10),
            field("W:RATE", FieldKind::Double, 14, 8),
            array_field("W:MONTHLY", FieldKind::Double, 22, 24, 3),
        ],
    );
    wells_def.memos.push(memo("W:NOTES"));

    let mut wells = FixtureTable::new("WELLS", wells_def);
    for i in 1..=30u32 {
        let mut payload = PayloadBuilder::new()
            .long(i as i32)
            .string(&format!("WELL{}", i), 10);
        payload = if i % 7 == 0 {
            payload.double_null()
        } else {
            payload.double(i as f64 * 2.5)
        };
        for slot in 0..3 {
            payload = payload.double(i as f64 + slot as f64);
        }
        wells = wells.row(i, payload.build());
        if i % 3 == 0 {
            wells = wells.memo_record(i, 0, format!("note {}", i).into_bytes());
        }
    }

    let units_def = table_def(2, vec![field("U:ID", FieldKind::Short, 0, 2)]);
    let mut units = FixtureTable::new("UNITS", units_def);
    for i in 1..=10u32 {
        units = units.row(i, PayloadBuilder::new().short(i as i16).build());
    }

    TpsFixture::new().table(wells).table(units).write_to(path);
}

#[test]
fn clean_conversion_validates_at_full_level() {
    let dir = tempdir().unwrap();
    let src = dir.path().join("wells.phd");
    let out = dir.path().join("out.db");
    build_source(&src);

    ConversionEngine::new(Config::default())
        .convert(&[SourceFile::new(&src)], &out)
        .unwrap();

    let report = ConversionValidator::new(Config::default())
        .validate(&[SourceFile::new(&src)], &out, ValidationLevel::Full)
        .unwrap();

    assert!(report.success, "validation failed:\n{}", report);
    assert_eq!(report.total_tables, 2);
    assert_eq!(report.total_records, 40);
    assert!(report.structure.tables_match);
    assert!(report.structure.record_counts_match);
    assert!(report.inconsistencies.is_empty());
    assert!(report.errors.is_empty());

    // full level produced statistics for every column of both tables
    assert_eq!(report.column_stats.len(), 2);
    let wells_stats = report
        .column_stats
        .iter()
        .find(|s| s.table == "phd_WELLS")
        .unwrap();
    let rate = wells_stats.columns.iter().find(|c| c.column == "RATE").unwrap();
    assert_eq!(rate.total_values, 30);
    // every 7th rate is the NULL sentinel: 7, 14, 21, 28
    assert_eq!(rate.null_count, 4);
    assert_eq!(rate.min_value, Some(2.5));
    assert_eq!(rate.max_value, Some(75.0));

    let text = report.to_string();
    assert!(text.contains("DATA VALIDATION REPORT"));
    assert!(text.contains("Success: true"));
}

#[test]
fn deleted_rows_break_record_count_validation() {
    let dir = tempdir().unwrap();
    let src = dir.path().join("wells.phd");
    let out = dir.path().join("out.db");
    build_source(&src);

    ConversionEngine::new(Config::default())
        .convert(&[SourceFile::new(&src)], &out)
        .unwrap();
    let conn = Connection::open(&out).unwrap();
    conn.execute("DELETE FROM phd_UNITS WHERE ID > 7", []).unwrap();
    drop(conn);

    let report = ConversionValidator::new(Config::default())
        .validate(&[SourceFile::new(&src)], &out, ValidationLevel::Basic)
        .unwrap();

    assert!(!report.success);
    assert!(report.structure.tables_match);
    assert!(!report.structure.record_counts_match);
    let diff = report
        .structure
        .record_count_differences
        .iter()
        .find(|d| d.table == "phd_UNITS")
        .unwrap();
    assert_eq!(diff.source_records, 10);
    assert_eq!(diff.sqlite_records, 7);
}

#[test]
fn tampered_cell_is_reported_as_inconsistency() {
    let dir = tempdir().unwrap();
    let src = dir.path().join("wells.phd");
    let out = dir.path().join("out.db");
    build_source(&src);

    ConversionEngine::new(Config::default())
        .convert(&[SourceFile::new(&src)], &out)
        .unwrap();
    let conn = Connection::open(&out).unwrap();
    conn.execute("UPDATE phd_WELLS SET NAME = 'TAMPERED' WHERE ID = 5", [])
        .unwrap();
    drop(conn);

    let report = ConversionValidator::new(Config::default())
        .validate(&[SourceFile::new(&src)], &out, ValidationLevel::Standard)
        .unwrap();

    assert!(!report.success);
    assert_eq!(report.inconsistencies.len(), 1);
    let inconsistency = &report.inconsistencies[0];
    assert_eq!(inconsistency.table, "phd_WELLS");
    assert_eq!(inconsistency.record_number, 5);
    assert_eq!(inconsistency.column, "NAME");
    assert_eq!(inconsistency.source_value, "WELL5");
    assert_eq!(inconsistency.sqlite_value, "TAMPERED");
}

#[test]
fn basic_level_ignores_cell_tampering() {
    let dir = tempdir().unwrap();
    let src = dir.path().join("wells.phd");
    let out = dir.path().join("out.db");
    build_source(&src);

    ConversionEngine::new(Config::default())
        .convert(&[SourceFile::new(&src)], &out)
        .unwrap();
    let conn = Connection::open(&out).unwrap();
    conn.execute("UPDATE phd_WELLS SET NAME = 'TAMPERED' WHERE ID = 5", [])
        .unwrap();
    drop(conn);

    let report = ConversionValidator::new(Config::default())
        .validate(&[SourceFile::new(&src)], &out, ValidationLevel::Basic)
        .unwrap();

    // counts still line up, and basic never looks inside rows
    assert!(report.success);
    assert!(report.inconsistencies.is_empty());
}

#[test]
fn dropped_table_is_reported_missing() {
    let dir = tempdir().unwrap();
    let src = dir.path().join("wells.phd");
    let out = dir.path().join("out.db");
    build_source(&src);

    ConversionEngine::new(Config::default())
        .convert(&[SourceFile::new(&src)], &out)
        .unwrap();
    let conn = Connection::open(&out).unwrap();
    conn.execute("DROP TABLE phd_UNITS", []).unwrap();
    drop(conn);

    let report = ConversionValidator::new(Config::default())
        .validate(&[SourceFile::new(&src)], &out, ValidationLevel::Basic)
        .unwrap();

    assert!(!report.success);
    assert!(!report.structure.tables_match);
    assert_eq!(report.structure.missing_tables, vec!["phd_UNITS".to_string()]);
}

#[test]
fn memo_and_array_columns_validate_cleanly() {
    // regression guard: memo joining and JSON array serialization must
    // produce identical bytes when the validator re-decodes the source
    let dir = tempdir().unwrap();
    let src = dir.path().join("wells.phd");
    let out = dir.path().join("out.db");
    build_source(&src);

    ConversionEngine::new(Config::default())
        .convert(&[SourceFile::new(&src)], &out)
        .unwrap();

    let report = ConversionValidator::new(Config::default())
        .validate(&[SourceFile::new(&src)], &out, ValidationLevel::Standard)
        .unwrap();

    assert!(report.success, "validation failed:\n{}", report);
}

#[test]
fn converted_pair_compares_identical_until_seeded_difference() {
    let dir = tempdir().unwrap();
    let src = dir.path().join("wells.phd");
    let left = dir.path().join("left.db");
    let right = dir.path().join("right.db");
    build_source(&src);

    let engine = ConversionEngine::new(Config::default());
    engine.convert(&[SourceFile::new(&src)], &left).unwrap();
    engine.convert(&[SourceFile::new(&src)], &right).unwrap();

    let comparison = compare_databases(&left, &right).unwrap();
    assert!(comparison.is_identical());

    let conn = Connection::open(&right).unwrap();
    conn.execute("UPDATE phd_WELLS SET RATE = 999.0 WHERE ID = 3", [])
        .unwrap();
    conn.execute("DELETE FROM phd_UNITS WHERE ID = 10", []).unwrap();
    drop(conn);

    let comparison = compare_databases(&left, &right).unwrap();
    assert!(!comparison.is_identical());
    let wells = comparison
        .table_diffs
        .iter()
        .find(|d| d.table == "phd_WELLS")
        .unwrap();
    assert_eq!(wells.record_count_diff, 0);
    assert_eq!(wells.data_differences, 1);
    let units = comparison
        .table_diffs
        .iter()
        .find(|d| d.table == "phd_UNITS")
        .unwrap();
    assert_eq!(units.record_count_diff, 1);
}
