//! # Prefix Invariant Tests
//!
//! A `.phd`/`.mod` pair merges into one SQLite file. Every table carries
//! its source prefix, every index carries its parent table's prefix, and
//! nothing unprefixed leaks through.

mod common;

use common::{field, table_def, FixtureTable, PayloadBuilder, TpsFixture};
use rusqlite::Connection;
use tempfile::tempdir;
use tpslite::tps::{FieldKind, IndexDef};
use tpslite::{Config, ConversionEngine, SourceFile, SourcePrefix};

fn index_def(name: &str, fields: &[u16]) -> IndexDef {
    IndexDef {
        name: name.to_string(),
        fields: fields.iter().copied().collect(),
    }
}

fn indexed_table(table_number: u8, name: &str, rows: u32) -> FixtureTable {
    let mut def = table_def(
        table_number,
        vec![
            field("T:ID", FieldKind::Long, 0, 4),
            field("T:LABEL", FieldKind::String, 4, 8),
        ],
    );
    def.indexes.push(index_def("T:KEYID", &[0]));
    def.indexes.push(index_def("T:KEYLABEL", &[1]));

    let mut fixture = FixtureTable::new(name, def);
    for i in 1..=rows {
        fixture = fixture.row(
            i,
            PayloadBuilder::new().long(i as i32).string("x", 8).build(),
        );
    }
    fixture
}

#[test]
fn phd_and_mod_tables_are_prefixed_and_disjoint() {
    let dir = tempdir().unwrap();
    let phd = dir.path().join("sample.phd");
    let mod_file = dir.path().join("sample.mod");
    let out = dir.path().join("out.db");

    // same table names on both sides: the prefixes must keep them apart
    TpsFixture::new()
        .table(indexed_table(1, "WELLS", 4))
        .table(indexed_table(2, "UNITS", 3))
        .table(indexed_table(3, "GRAPHS", 2))
        .write_to(&phd);
    TpsFixture::new()
        .table(indexed_table(1, "WELLS", 5))
        .table(indexed_table(2, "LOOKUP", 1))
        .write_to(&mod_file);

    let report = ConversionEngine::new(Config::default())
        .convert(
            &[SourceFile::new(&phd), SourceFile::new(&mod_file)],
            &out,
        )
        .unwrap();

    assert_eq!(report.tables_total, 5);
    assert_eq!(report.tables_ok, 5);
    assert_eq!(report.rows_written, 4 + 3 + 2 + 5 + 1);

    let conn = Connection::open(&out).unwrap();
    let mut stmt = conn
        .prepare(
            "SELECT name FROM sqlite_master WHERE type='table' \
             AND name NOT LIKE '\\_%' ESCAPE '\\' AND name NOT LIKE 'sqlite_%'",
        )
        .unwrap();
    let tables: Vec<String> = stmt
        .query_map([], |r| r.get(0))
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();

    assert_eq!(tables.len(), 5);
    for table in &tables {
        assert!(
            table.starts_with("phd_") || table.starts_with("mod_"),
            "unprefixed table leaked: {}",
            table
        );
    }
    assert!(tables.contains(&"phd_WELLS".to_string()));
    assert!(tables.contains(&"mod_WELLS".to_string()));

    // row counts stayed with their sources
    let phd_wells: i64 = conn
        .query_row("SELECT COUNT(*) FROM phd_WELLS", [], |r| r.get(0))
        .unwrap();
    let mod_wells: i64 = conn
        .query_row("SELECT COUNT(*) FROM mod_WELLS", [], |r| r.get(0))
        .unwrap();
    assert_eq!(phd_wells, 4);
    assert_eq!(mod_wells, 5);
}

#[test]
fn every_index_inherits_its_table_prefix() {
    let dir = tempdir().unwrap();
    let phd = dir.path().join("sample.phd");
    let mod_file = dir.path().join("sample.mod");
    let out = dir.path().join("out.db");

    TpsFixture::new()
        .table(indexed_table(1, "WELLS", 2))
        .write_to(&phd);
    TpsFixture::new()
        .table(indexed_table(1, "UNITS", 2))
        .write_to(&mod_file);

    ConversionEngine::new(Config::default())
        .convert(
            &[SourceFile::new(&phd), SourceFile::new(&mod_file)],
            &out,
        )
        .unwrap();

    let conn = Connection::open(&out).unwrap();
    let mut stmt = conn
        .prepare(
            "SELECT name, tbl_name FROM sqlite_master WHERE type='index' \
             AND name NOT LIKE 'sqlite_%'",
        )
        .unwrap();
    let indexes: Vec<(String, String)> = stmt
        .query_map([], |r| Ok((r.get(0)?, r.get(1)?)))
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();

    assert_eq!(indexes.len(), 4);
    for (index_name, table_name) in &indexes {
        assert!(
            index_name.starts_with(table_name.as_str()),
            "index {} does not inherit prefix of {}",
            index_name,
            table_name
        );
        assert!(table_name.starts_with("phd_") || table_name.starts_with("mod_"));
    }
}

#[test]
fn bare_tps_gets_no_prefix() {
    let dir = tempdir().unwrap();
    let src = dir.path().join("plain.tps");
    let out = dir.path().join("out.db");

    TpsFixture::new()
        .table(indexed_table(1, "WELLS", 2))
        .write_to(&src);

    ConversionEngine::new(Config::default())
        .convert(&[SourceFile::new(&src)], &out)
        .unwrap();

    let conn = Connection::open(&out).unwrap();
    let exists: bool = conn
        .query_row(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE name='WELLS')",
            [],
            |r| r.get(0),
        )
        .unwrap();
    assert!(exists);
}

#[test]
fn explicit_prefix_overrides_extension() {
    let dir = tempdir().unwrap();
    let src = dir.path().join("renamed.bin");
    let out = dir.path().join("out.db");

    TpsFixture::new()
        .table(indexed_table(1, "WELLS", 1))
        .write_to(&src);

    ConversionEngine::new(Config::default())
        .convert(
            &[SourceFile::with_prefix(&src, SourcePrefix::Mod)],
            &out,
        )
        .unwrap();

    let conn = Connection::open(&out).unwrap();
    let exists: bool = conn
        .query_row(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE name='mod_WELLS')",
            [],
            |r| r.get(0),
        )
        .unwrap();
    assert!(exists);
}

#[test]
fn schema_rows_record_source_prefixes() {
    let dir = tempdir().unwrap();
    let phd = dir.path().join("s.phd");
    let mod_file = dir.path().join("s.mod");
    let out = dir.path().join("out.db");

    TpsFixture::new()
        .table(indexed_table(1, "WELLS", 1))
        .write_to(&phd);
    TpsFixture::new()
        .table(indexed_table(1, "UNITS", 1))
        .write_to(&mod_file);

    ConversionEngine::new(Config::default())
        .convert(
            &[SourceFile::new(&phd), SourceFile::new(&mod_file)],
            &out,
        )
        .unwrap();

    let conn = Connection::open(&out).unwrap();
    let phd_prefix: String = conn
        .query_row(
            "SELECT source_prefix FROM _schema WHERE table_name='phd_WELLS'",
            [],
            |r| r.get(0),
        )
        .unwrap();
    let mod_prefix: String = conn
        .query_row(
            "SELECT source_prefix FROM _schema WHERE table_name='mod_UNITS'",
            [],
            |r| r.get(0),
        )
        .unwrap();

    assert_eq!(phd_prefix, "phd_");
    assert_eq!(mod_prefix, "mod_");
}
