//! # PageReader
//!
//! Random-access reader over one TopSpeed file. The file is mapped
//! read-only with `memmap2`; pages are resolved lazily by walking the
//! aligned page layout, decompressing as needed, and splitting payloads
//! into records.
//!
//! ## Walk Discipline
//!
//! Pages live on 0x100 boundaries starting right after the 512-byte file
//! header. The walk reads a page header, validates the self-referencing
//! offset and the declared sizes, and advances by the on-disk size rounded
//! up to the boundary. A page that fails validation is counted, reported
//! through `tracing`, and skipped by resyncing to the next boundary — the
//! iterator never aborts on a corrupt page. A truncated tail terminates the
//! iterator for good.
//!
//! ## Iterators
//!
//! - [`PageReader::pages`] — every structurally valid page
//! - [`PageReader::records`] — records of every level-0 page
//! - [`PageReader::records_for_table`] — data records of one table
//!
//! All three are finite, lazy, and single-pass: a fresh scan requires a new
//! iterator. Each exposes the corrupt-page count observed so far so the
//! engine can fold it into the conversion report.
//!
//! ## Metadata Maps
//!
//! [`PageReader::table_definitions`] reassembles multi-block definition
//! records in block order; [`PageReader::table_names`] builds the
//! name-to-table mapping from name records. Both are eager full scans over
//! a fresh iterator.

use std::fs::File;
use std::path::{Path, PathBuf};

use eyre::{Result, WrapErr};
use hashbrown::HashMap;
use memmap2::Mmap;
use tracing::warn;

use super::header::FileHeader;
use super::page::Page;
use super::record::{PageRecords, Record};
use crate::config::{PAGE_ALIGN, PAGE_HEADER_SIZE, TPS_HEADER_SIZE};

#[derive(Debug)]
pub struct PageReader {
    mmap: Mmap,
    path: PathBuf,
    file_size: u64,
    last_issued_row: u32,
}

impl PageReader {
    /// Opens and validates a TopSpeed file. Header failures are fatal.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .wrap_err_with(|| format!("failed to open TopSpeed file {}", path.display()))?;
        // Safety: the map is read-only and the converter treats source
        // files as immutable for the duration of a run.
        let mmap = unsafe { Mmap::map(&file) }
            .wrap_err_with(|| format!("failed to map TopSpeed file {}", path.display()))?;

        let header = FileHeader::from_bytes(&mmap)
            .wrap_err_with(|| format!("invalid header in {}", path.display()))?;
        let file_size = header.file_size() as u64;
        let last_issued_row = header.last_issued_row();

        Ok(Self {
            mmap,
            path: path.to_path_buf(),
            file_size,
            last_issued_row,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Logical file size from the header, the bound of the page walk.
    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    /// Highest record number the file has ever issued; used as a cheap
    /// record-count estimate for size profiling.
    pub fn last_issued_row(&self) -> u32 {
        self.last_issued_row
    }

    pub fn pages(&self) -> Pages<'_> {
        Pages {
            data: &self.mmap[..self.file_size as usize],
            pos: TPS_HEADER_SIZE,
            corrupt: 0,
        }
    }

    pub fn records(&self) -> Records<'_> {
        Records {
            pages: self.pages(),
            current: None,
        }
    }

    pub fn records_for_table(&self, table_number: u8) -> TableRecords<'_> {
        TableRecords {
            records: self.records(),
            table_number,
        }
    }

    /// Collects and reassembles every table definition, keyed by table
    /// number. Blocks are concatenated in block order; a definition with
    /// missing blocks is still returned and left to the parser's fallback.
    pub fn table_definitions(&self) -> HashMap<u8, Vec<u8>> {
        let mut blocks: HashMap<u8, Vec<(u16, Vec<u8>)>> = HashMap::new();

        for record in self.records() {
            if let Record::TableDefinition {
                table_number,
                block_index,
                bytes,
            } = record
            {
                blocks
                    .entry(table_number)
                    .or_default()
                    .push((block_index, bytes));
            }
        }

        blocks
            .into_iter()
            .map(|(table, mut parts)| {
                parts.sort_by_key(|(index, _)| *index);
                let mut assembled = Vec::new();
                for (_, bytes) in parts {
                    assembled.extend_from_slice(&bytes);
                }
                (table, assembled)
            })
            .collect()
    }

    /// Builds the table-number-to-name mapping from name records.
    pub fn table_names(&self) -> HashMap<u8, String> {
        let mut names = HashMap::new();
        for record in self.records() {
            if let Record::TableName { table_number, name } = record {
                names.entry(table_number).or_insert(name);
            }
        }
        names
    }
}

/// Lazy walk over the file's pages. Corrupt pages are counted and skipped.
pub struct Pages<'a> {
    data: &'a [u8],
    pos: usize,
    corrupt: u64,
}

impl Pages<'_> {
    pub fn corrupt_pages(&self) -> u64 {
        self.corrupt
    }
}

impl Iterator for Pages<'_> {
    type Item = Page;

    fn next(&mut self) -> Option<Page> {
        while self.pos < self.data.len() {
            let offset = self.pos;

            if offset + PAGE_HEADER_SIZE > self.data.len() {
                warn!(
                    offset,
                    remaining = self.data.len() - offset,
                    "unexpected EOF inside page header"
                );
                self.pos = self.data.len();
                return None;
            }

            match Page::parse(offset as u64, &self.data[offset..]) {
                Ok(page) => {
                    let declared =
                        u16::from_le_bytes([self.data[offset + 4], self.data[offset + 5]]) as usize;
                    self.pos = offset + round_up(declared, PAGE_ALIGN);
                    return Some(page);
                }
                Err(corrupt) => {
                    warn!(offset, reason = %corrupt.reason, "skipping corrupt page");
                    self.corrupt += 1;
                    self.pos = offset + self.resync_stride(offset);
                }
            }
        }
        None
    }
}

impl Pages<'_> {
    /// When the header is readable enough to trust its size field, skip the
    /// whole page; otherwise resync on the next alignment boundary.
    fn resync_stride(&self, offset: usize) -> usize {
        if offset + 6 <= self.data.len() {
            let declared = u16::from_le_bytes([self.data[offset + 4], self.data[offset + 5]]) as usize;
            if declared >= PAGE_HEADER_SIZE && offset + declared <= self.data.len() {
                return round_up(declared, PAGE_ALIGN);
            }
        }
        PAGE_ALIGN
    }
}

fn round_up(value: usize, align: usize) -> usize {
    value.div_ceil(align) * align
}

/// Records of every level-0 page, in page order.
pub struct Records<'a> {
    pages: Pages<'a>,
    current: Option<std::vec::IntoIter<Record>>,
}

impl Records<'_> {
    pub fn corrupt_pages(&self) -> u64 {
        self.pages.corrupt_pages()
    }
}

impl Iterator for Records<'_> {
    type Item = Record;

    fn next(&mut self) -> Option<Record> {
        loop {
            if let Some(iter) = &mut self.current {
                if let Some(record) = iter.next() {
                    return Some(record);
                }
                self.current = None;
            }

            let page = self.pages.next()?;
            if page.hierarchy_level != 0 {
                continue;
            }
            let records: Vec<Record> = PageRecords::new(&page).collect();
            self.current = Some(records.into_iter());
        }
    }
}

/// Data records of one table: `(record_number, payload)` pairs in page
/// order. Finite and not restartable; a fresh scan needs a new iterator.
pub struct TableRecords<'a> {
    records: Records<'a>,
    table_number: u8,
}

impl TableRecords<'_> {
    pub fn corrupt_pages(&self) -> u64 {
        self.records.corrupt_pages()
    }
}

impl Iterator for TableRecords<'_> {
    type Item = (u32, Vec<u8>);

    fn next(&mut self) -> Option<(u32, Vec<u8>)> {
        loop {
            match self.records.next()? {
                Record::Data {
                    table_number,
                    record_number,
                    payload,
                } if table_number == self.table_number => {
                    return Some((record_number, payload));
                }
                _ => continue,
            }
        }
    }
}
