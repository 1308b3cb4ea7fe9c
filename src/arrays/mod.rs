//! # Multidimensional Array Analysis
//!
//! Clarion applications store repeated measurements two ways, and both
//! must collapse to one JSON array column in SQLite:
//!
//! 1. **Single-field arrays** — one field whose `element_count` is greater
//!    than one, its length an exact multiple of the element width.
//! 2. **Multi-field arrays** — a series of scalar fields sharing a stem
//!    and a contiguous 1-based integer suffix (`PROD1..PROD12`), all of
//!    the same kind and width, laid out at a uniform stride.
//!
//! ## Detection Order and Tie-Breaks
//!
//! Rule 1 runs first and wins conflicts: a field it claims never joins a
//! suffix series. Rule 2 then groups the remaining fields by stem; of each
//! group only the tightest run of suffixes starting at 1 becomes an array
//! (`A1,A2` beats `A10,A11`), members outside the run stay scalar. Suffix
//! zero never joins a run — the format's series are 1-based.
//!
//! Everything not claimed by either rule is projected as a scalar column.

use smallvec::SmallVec;

use crate::schema::names::sanitize_field_name;
use crate::tps::{FieldKind, TableDef};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArrayKind {
    SingleField,
    MultiField,
}

/// Descriptor of one logical array inside a record.
#[derive(Debug, Clone)]
pub struct ArrayFieldInfo {
    pub kind: ArrayKind,
    /// Original name (single-field) or stem (multi-field), prefix intact.
    pub base_name: String,
    pub element_kind: FieldKind,
    pub element_count: u32,
    pub element_width: u32,
    pub start_offset: u32,
    /// Byte offset of every element, in element order.
    pub element_offsets: Vec<u32>,
    /// Indices into `TableDef::fields`: one for single-field arrays, the
    /// suffix-ordered members for multi-field arrays.
    pub members: SmallVec<[usize; 8]>,
    /// Sanitized SQLite column name.
    pub column_name: String,
}

impl ArrayFieldInfo {
    /// Scale of decimal elements, when the element kind carries one.
    pub fn decimals(&self, def: &TableDef) -> Option<u8> {
        self.members
            .first()
            .and_then(|&i| def.fields.get(i))
            .and_then(|f| f.decimals)
    }
}

/// Inspects a table definition and returns its array descriptors in field
/// order.
pub fn analyze(def: &TableDef) -> Vec<ArrayFieldInfo> {
    if def.is_minimal() {
        return Vec::new();
    }

    let mut claimed = vec![false; def.fields.len()];
    let mut arrays = Vec::new();

    // rule 1: single-field arrays
    for (i, field) in def.fields.iter().enumerate() {
        if field.element_count <= 1 {
            continue;
        }
        let element_width = field.element_width();
        if element_width == 0 {
            continue;
        }
        let element_offsets: Vec<u32> = (0..field.element_count)
            .map(|k| field.offset + k * element_width)
            .collect();

        claimed[i] = true;
        arrays.push(ArrayFieldInfo {
            kind: ArrayKind::SingleField,
            base_name: field.name.clone(),
            element_kind: field.kind,
            element_count: field.element_count,
            element_width,
            start_offset: field.offset,
            element_offsets,
            members: SmallVec::from_slice(&[i]),
            column_name: sanitize_field_name(&field.name),
        });
    }

    // rule 2: multi-field series over whatever rule 1 left
    let mut groups: Vec<(String, Vec<(u32, usize)>)> = Vec::new();
    for (i, field) in def.fields.iter().enumerate() {
        if claimed[i] {
            continue;
        }
        let Some((stem, suffix)) = split_numeric_suffix(&field.name) else {
            continue;
        };
        if suffix == 0 {
            continue;
        }
        match groups.iter_mut().find(|(s, _)| s == &stem) {
            Some((_, members)) => members.push((suffix, i)),
            None => groups.push((stem, vec![(suffix, i)])),
        }
    }

    for (stem, mut members) in groups {
        members.sort_by_key(|(suffix, _)| *suffix);
        if members.iter().zip(members.iter().skip(1)).any(|(a, b)| a.0 == b.0) {
            continue;
        }

        let run = contiguous_run_from_one(&members, def);
        if run.len() < 2 {
            continue;
        }

        let first = &def.fields[run[0]];
        let element_offsets: Vec<u32> =
            run.iter().map(|&i| def.fields[i].offset).collect();

        for &i in &run {
            claimed[i] = true;
        }
        arrays.push(ArrayFieldInfo {
            kind: ArrayKind::MultiField,
            base_name: stem.clone(),
            element_kind: first.kind,
            element_count: run.len() as u32,
            element_width: first.length,
            start_offset: first.offset,
            element_offsets,
            members: SmallVec::from_vec(run),
            column_name: sanitize_field_name(&stem),
        });
    }

    arrays.sort_by_key(|info| info.members[0]);
    arrays
}

/// The tightest run of suffixes 1, 2, 3, ... whose members agree on kind,
/// length, and stride. Field indices in suffix order.
fn contiguous_run_from_one(members: &[(u32, usize)], def: &TableDef) -> Vec<usize> {
    let mut run: Vec<usize> = Vec::new();
    let mut expected = 1u32;

    for &(suffix, index) in members {
        if suffix != expected {
            break;
        }
        let field = &def.fields[index];
        if field.element_count != 1 {
            break;
        }
        if let Some(&first) = run.first() {
            let lead = &def.fields[first];
            if field.kind != lead.kind || field.length != lead.length {
                break;
            }
        }
        run.push(index);
        expected += 1;
    }

    // stride uniformity: irregular spacing means these are independent
    // fields that merely share a naming habit
    if run.len() >= 2 {
        let stride = def.fields[run[1]].offset as i64 - def.fields[run[0]].offset as i64;
        if stride <= 0 {
            return Vec::new();
        }
        for pair in run.windows(2) {
            let diff = def.fields[pair[1]].offset as i64 - def.fields[pair[0]].offset as i64;
            if diff != stride {
                return Vec::new();
            }
        }
    }

    run
}

/// Splits `PROD12` into `("PROD", 12)`. The stem must be non-empty and the
/// suffix must parse; names without a trailing digit return `None`.
fn split_numeric_suffix(name: &str) -> Option<(String, u32)> {
    let digits_start = name
        .rfind(|c: char| !c.is_ascii_digit())
        .map(|i| i + name[i..].chars().next().map_or(1, char::len_utf8))?;
    if digits_start >= name.len() {
        return None;
    }
    let (stem, digits) = name.split_at(digits_start);
    if stem.is_empty() {
        return None;
    }
    let suffix: u32 = digits.parse().ok()?;
    Some((stem.to_string(), suffix))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tps::FieldDef;

    fn field(name: &str, kind: FieldKind, offset: u32, length: u32) -> FieldDef {
        FieldDef {
            name: name.to_string(),
            kind,
            offset,
            length,
            element_count: 1,
            decimals: None,
        }
    }

    fn table(fields: Vec<FieldDef>) -> TableDef {
        let record_length = fields.iter().map(|f| f.extent()).max().unwrap_or(0);
        TableDef {
            table_number: 1,
            record_length,
            fields,
            memos: Vec::new(),
            indexes: Vec::new(),
            raw_definition: Vec::new(),
            enhanced: false,
            minimal: false,
        }
    }

    #[test]
    fn plain_fields_yield_no_arrays() {
        let def = table(vec![
            field("T:ID", FieldKind::Short, 0, 2),
            field("T:NAME", FieldKind::String, 2, 20),
        ]);

        assert!(analyze(&def).is_empty());
    }

    #[test]
    fn detects_single_field_array() {
        let mut arr = field("LPV:BOOLPARAM", FieldKind::Byte, 100, 10);
        arr.element_count = 10;
        let def = table(vec![field("LPV:ID", FieldKind::Short, 0, 2), arr]);

        let arrays = analyze(&def);

        assert_eq!(arrays.len(), 1);
        let info = &arrays[0];
        assert_eq!(info.kind, ArrayKind::SingleField);
        assert_eq!(info.base_name, "LPV:BOOLPARAM");
        assert_eq!(info.column_name, "BOOLPARAM");
        assert_eq!(info.element_count, 10);
        assert_eq!(info.element_width, 1);
        assert_eq!(
            info.element_offsets,
            vec![100, 101, 102, 103, 104, 105, 106, 107, 108, 109]
        );
    }

    #[test]
    fn single_field_array_uses_declared_element_width() {
        let mut arr = field("LPV:REALPARAM", FieldKind::Double, 200, 40);
        arr.element_count = 5;
        let def = table(vec![arr]);

        let arrays = analyze(&def);

        assert_eq!(arrays[0].element_width, 8);
        assert_eq!(arrays[0].element_offsets, vec![200, 208, 216, 224, 232]);
    }

    #[test]
    fn detects_multi_field_series() {
        let mut fields = vec![field("DAT:ID", FieldKind::Short, 0, 2)];
        for i in 0..5u32 {
            fields.push(field(
                &format!("DAT:PROD{}", i + 1),
                FieldKind::Double,
                2 + i * 8,
                8,
            ));
        }
        fields.push(field("DAT:STATUS", FieldKind::Short, 42, 2));
        let def = table(fields);

        let arrays = analyze(&def);

        assert_eq!(arrays.len(), 1);
        let info = &arrays[0];
        assert_eq!(info.kind, ArrayKind::MultiField);
        assert_eq!(info.base_name, "DAT:PROD");
        assert_eq!(info.column_name, "PROD");
        assert_eq!(info.element_count, 5);
        assert_eq!(info.element_offsets, vec![2, 10, 18, 26, 34]);
        assert_eq!(info.members.as_slice(), &[1, 2, 3, 4, 5]);
    }

    #[test]
    fn irregular_spacing_is_not_a_series() {
        let def = table(vec![
            field("T:VAL1", FieldKind::Double, 100, 8),
            field("T:VAL2", FieldKind::Double, 125, 8),
            field("T:VAL3", FieldKind::Double, 150, 8),
        ]);

        assert!(analyze(&def).is_empty());
    }

    #[test]
    fn mismatched_kinds_are_not_a_series() {
        let def = table(vec![
            field("T:VAL1", FieldKind::Double, 0, 8),
            field("T:VAL2", FieldKind::Long, 8, 4),
        ]);

        assert!(analyze(&def).is_empty());
    }

    #[test]
    fn series_must_start_at_one() {
        let def = table(vec![
            field("T:PROD2", FieldKind::Double, 0, 8),
            field("T:PROD3", FieldKind::Double, 8, 8),
        ]);

        assert!(analyze(&def).is_empty());
    }

    #[test]
    fn zero_suffix_never_joins() {
        let def = table(vec![
            field("T:PROD0", FieldKind::Double, 0, 8),
            field("T:PROD1", FieldKind::Double, 8, 8),
            field("T:PROD2", FieldKind::Double, 16, 8),
        ]);

        let arrays = analyze(&def);

        assert_eq!(arrays.len(), 1);
        assert_eq!(arrays[0].element_count, 2);
        assert_eq!(arrays[0].members.as_slice(), &[1, 2]);
    }

    #[test]
    fn overlapping_stems_keep_the_tight_run() {
        // A1, A2 form the run; A10, A11 fall outside it and stay scalar
        let def = table(vec![
            field("T:A1", FieldKind::Long, 0, 4),
            field("T:A2", FieldKind::Long, 4, 4),
            field("T:A10", FieldKind::Long, 8, 4),
            field("T:A11", FieldKind::Long, 12, 4),
        ]);

        let arrays = analyze(&def);

        assert_eq!(arrays.len(), 1);
        assert_eq!(arrays[0].element_count, 2);
        assert_eq!(arrays[0].members.as_slice(), &[0, 1]);
    }

    #[test]
    fn rule_one_wins_over_suffix_grouping() {
        // PROD1 is itself an array; PROD2 alone cannot form a series
        let mut arr = field("T:PROD1", FieldKind::Double, 0, 16);
        arr.element_count = 2;
        let def = table(vec![arr, field("T:PROD2", FieldKind::Double, 16, 8)]);

        let arrays = analyze(&def);

        assert_eq!(arrays.len(), 1);
        assert_eq!(arrays[0].kind, ArrayKind::SingleField);
        assert_eq!(arrays[0].base_name, "T:PROD1");
    }

    #[test]
    fn minimal_tables_have_no_arrays() {
        let def = crate::tps::parse_with_fallback(1, &[]);
        assert!(def.is_minimal());
        assert!(analyze(&def).is_empty());
    }

    #[test]
    fn split_suffix_handles_edges() {
        assert_eq!(
            split_numeric_suffix("PROD12"),
            Some(("PROD".to_string(), 12))
        );
        assert_eq!(split_numeric_suffix("DAT:X1"), Some(("DAT:X".to_string(), 1)));
        assert_eq!(split_numeric_suffix("NAME"), None);
        assert_eq!(split_numeric_suffix("123"), None);
        assert_eq!(split_numeric_suffix(""), None);
    }
}
