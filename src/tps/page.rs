//! # Page Structure and RLE Decompression
//!
//! TopSpeed files are sequences of variable-size pages laid out on 0x100
//! boundaries after the 512-byte file header. Every page begins with a
//! 13-byte header.
//!
//! ## Page Header Layout (13 bytes)
//!
//! ```text
//! Offset  Size  Field              Description
//! ------  ----  -----------------  -------------------------------------
//! 0       4     page_offset        File offset of this page (self-ref)
//! 4       2     size               On-disk size, header included
//! 6       2     uncompressed_size  Size after decompression, header incl.
//! 8       2     unabridged_size    Size before header compaction
//! 10      2     record_count       Records carried by this page
//! 12      1     hierarchy_level    0 = data leaf, >0 = index levels
//! ```
//!
//! A page whose `size` is smaller than its `uncompressed_size` carries an
//! RLE-compressed payload.
//!
//! ## RLE Scheme
//!
//! The payload alternates literal runs and repeat runs:
//!
//! ```text
//! [copy][literal bytes x copy][repeat][copy][literal bytes x copy]...
//! ```
//!
//! `copy` and `repeat` are 7-bit variable-length counts: a byte with the
//! high bit set extends into the next byte (`count = (b & 0x7F) | next << 7`).
//! A repeat run re-emits the last literal byte `repeat` times. Decompression
//! stops when the output reaches the expected length; a zero copy count,
//! truncated input, or output overrun marks the page corrupt.
//!
//! Only this documented common scheme is implemented. Pages using any other
//! variant fail structural validation and are skipped with a counter rather
//! than guessed at.
//!
//! ## Self-Referencing Offset
//!
//! `page_offset` must equal the position the page was read from. The page
//! walk uses the mismatch as its corruption signal: a zeroed or torn page
//! fails this check immediately and the walk resyncs on the next 0x100
//! boundary.

use eyre::Result;
use zerocopy::little_endian::{U16, U32};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::config::PAGE_HEADER_SIZE;

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct PageHeader {
    page_offset: U32,
    size: U16,
    uncompressed_size: U16,
    unabridged_size: U16,
    record_count: U16,
    hierarchy_level: u8,
}

const _: () = assert!(std::mem::size_of::<PageHeader>() == PAGE_HEADER_SIZE);

impl PageHeader {
    pub fn new(
        page_offset: u32,
        size: u16,
        uncompressed_size: u16,
        record_count: u16,
        hierarchy_level: u8,
    ) -> Self {
        Self {
            page_offset: U32::new(page_offset),
            size: U16::new(size),
            uncompressed_size: U16::new(uncompressed_size),
            unabridged_size: U16::new(uncompressed_size),
            record_count: U16::new(record_count),
            hierarchy_level,
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<&Self> {
        eyre::ensure!(
            bytes.len() >= PAGE_HEADER_SIZE,
            "buffer too small for PageHeader: {} < {}",
            bytes.len(),
            PAGE_HEADER_SIZE
        );

        Self::ref_from_bytes(&bytes[..PAGE_HEADER_SIZE])
            .map_err(|e| eyre::eyre!("failed to read PageHeader: {:?}", e))
    }

    pub fn page_offset(&self) -> u32 {
        self.page_offset.get()
    }

    pub fn size(&self) -> u16 {
        self.size.get()
    }

    pub fn uncompressed_size(&self) -> u16 {
        self.uncompressed_size.get()
    }

    pub fn record_count(&self) -> u16 {
        self.record_count.get()
    }

    pub fn hierarchy_level(&self) -> u8 {
        self.hierarchy_level
    }

    pub fn is_compressed(&self) -> bool {
        self.size.get() < self.uncompressed_size.get()
    }
}

/// Non-fatal page failure. Carried through `eyre` so the reader can count
/// and skip without aborting the iterator.
#[derive(Debug)]
pub struct CorruptPage {
    pub offset: u64,
    pub reason: String,
}

impl std::fmt::Display for CorruptPage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "corrupt page at offset {:#x}: {}", self.offset, self.reason)
    }
}

impl std::error::Error for CorruptPage {}

/// A validated, decompressed page. `data` is the payload with the page
/// header stripped.
#[derive(Debug, Clone)]
pub struct Page {
    pub offset: u64,
    pub record_count: u16,
    pub hierarchy_level: u8,
    pub data: Vec<u8>,
}

impl Page {
    /// Parses and validates the page starting at `offset`. `bytes` is the
    /// file content from `offset` to the end of the scannable region.
    pub fn parse(offset: u64, bytes: &[u8]) -> Result<Page, CorruptPage> {
        let corrupt = |reason: String| CorruptPage { offset, reason };

        if bytes.len() < PAGE_HEADER_SIZE {
            return Err(corrupt(format!(
                "only {} bytes remain, page header needs {}",
                bytes.len(),
                PAGE_HEADER_SIZE
            )));
        }

        let header = PageHeader::from_bytes(bytes)
            .map_err(|e| corrupt(format!("unreadable header: {}", e)))?;

        if header.page_offset() as u64 != offset {
            return Err(corrupt(format!(
                "self-reference {:#x} does not match position",
                header.page_offset()
            )));
        }

        let size = header.size() as usize;
        let uncompressed = header.uncompressed_size() as usize;

        if size < PAGE_HEADER_SIZE || uncompressed < PAGE_HEADER_SIZE {
            return Err(corrupt(format!(
                "declared sizes {}/{} are below the header size",
                size, uncompressed
            )));
        }
        if size > bytes.len() {
            return Err(corrupt(format!(
                "declared size {} overruns the file ({} bytes remain)",
                size,
                bytes.len()
            )));
        }
        if size > uncompressed {
            return Err(corrupt(format!(
                "on-disk size {} exceeds uncompressed size {}",
                size, uncompressed
            )));
        }

        let payload = &bytes[PAGE_HEADER_SIZE..size];
        let data = if header.is_compressed() {
            decompress_rle(payload, uncompressed - PAGE_HEADER_SIZE).map_err(corrupt)?
        } else {
            payload.to_vec()
        };

        Ok(Page {
            offset,
            record_count: header.record_count(),
            hierarchy_level: header.hierarchy_level(),
            data,
        })
    }
}

/// Expands an RLE-compressed payload to exactly `expected_len` bytes.
pub fn decompress_rle(input: &[u8], expected_len: usize) -> Result<Vec<u8>, String> {
    let mut out = Vec::with_capacity(expected_len);
    let mut pos = 0usize;

    let read_count = |pos: &mut usize| -> Result<usize, String> {
        let b = *input
            .get(*pos)
            .ok_or_else(|| "truncated RLE stream".to_string())?;
        *pos += 1;
        if b & 0x80 != 0 {
            let next = *input
                .get(*pos)
                .ok_or_else(|| "truncated extended RLE count".to_string())?;
            *pos += 1;
            Ok(((b & 0x7F) as usize) | ((next as usize) << 7))
        } else {
            Ok(b as usize)
        }
    };

    while out.len() < expected_len {
        let copy = read_count(&mut pos)?;
        if copy == 0 {
            return Err("zero-length literal run".to_string());
        }
        if pos + copy > input.len() {
            return Err(format!(
                "literal run of {} overruns input at {}",
                copy, pos
            ));
        }
        if out.len() + copy > expected_len {
            return Err(format!(
                "literal run of {} overruns expected output {}",
                copy, expected_len
            ));
        }
        out.extend_from_slice(&input[pos..pos + copy]);
        pos += copy;

        if out.len() == expected_len {
            break;
        }

        let repeat = read_count(&mut pos)?;
        if repeat > 0 {
            let last = *out.last().ok_or_else(|| "repeat before literal".to_string())?;
            if out.len() + repeat > expected_len {
                return Err(format!(
                    "repeat run of {} overruns expected output {}",
                    repeat, expected_len
                ));
            }
            out.resize(out.len() + repeat, last);
        }
    }

    Ok(out)
}
