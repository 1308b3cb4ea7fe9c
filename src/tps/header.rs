//! # TopSpeed File Header
//!
//! Every TopSpeed file begins with a 512-byte header. The layout read here
//! is the part the conversion core depends on; the tail of the header is
//! block-allocation bookkeeping the reader does not need and is kept as an
//! opaque reserved region.
//!
//! ## Header Layout (0x200 bytes)
//!
//! ```text
//! Offset  Size  Field            Description
//! ------  ----  ---------------  ---------------------------------------
//! 0       2     header_offset    Always 0
//! 2       2     header_size      Always 0x200; anything else is an
//!                                unsupported header revision
//! 4       4     file_size        Logical file size in bytes
//! 8       4     allocated_size   Allocated size (>= file_size)
//! 12      4     magic            "tOpS"
//! 16      4     last_issued_row  Highest record number ever issued
//! 20      4     change_count     Bumped on every committed change
//! 24      4     page_root_ref    Root page reference
//! 28      484   reserved         Block allocation bookkeeping
//! ```
//!
//! All multi-byte fields are little-endian; the zerocopy `U16`/`U32`
//! wrappers handle conversion so the struct can be read straight off an
//! mmap without copying.

use eyre::{ensure, Result};
use zerocopy::little_endian::{U16, U32};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::config::TPS_HEADER_SIZE;

pub const TOPSPEED_MAGIC: &[u8; 4] = b"tOpS";

#[repr(C)]
#[derive(Debug, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct FileHeader {
    header_offset: U16,
    header_size: U16,
    file_size: U32,
    allocated_size: U32,
    magic: [u8; 4],
    last_issued_row: U32,
    change_count: U32,
    page_root_ref: U32,
    reserved: [u8; TPS_HEADER_SIZE - 28],
}

const _: () = assert!(std::mem::size_of::<FileHeader>() == TPS_HEADER_SIZE);

impl FileHeader {
    pub fn new(file_size: u32, last_issued_row: u32) -> Self {
        Self {
            header_offset: U16::new(0),
            header_size: U16::new(TPS_HEADER_SIZE as u16),
            file_size: U32::new(file_size),
            allocated_size: U32::new(file_size),
            magic: *TOPSPEED_MAGIC,
            last_issued_row: U32::new(last_issued_row),
            change_count: U32::new(0),
            page_root_ref: U32::new(0),
            reserved: [0u8; TPS_HEADER_SIZE - 28],
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<&Self> {
        ensure!(
            bytes.len() >= TPS_HEADER_SIZE,
            "invalid TopSpeed header: file is {} bytes, header needs {}",
            bytes.len(),
            TPS_HEADER_SIZE
        );

        let header = Self::ref_from_bytes(&bytes[..TPS_HEADER_SIZE])
            .map_err(|e| eyre::eyre!("failed to read TopSpeed header: {:?}", e))?;

        ensure!(
            &header.magic == TOPSPEED_MAGIC,
            "invalid TopSpeed header: bad magic {:02x?}",
            header.magic
        );

        ensure!(
            header.header_size.get() as usize == TPS_HEADER_SIZE,
            "unsupported TopSpeed header revision: header size {:#x}",
            header.header_size.get()
        );

        ensure!(
            header.file_size.get() as usize <= bytes.len(),
            "invalid TopSpeed header: declared size {} exceeds real size {}",
            header.file_size.get(),
            bytes.len()
        );

        Ok(header)
    }

    pub fn file_size(&self) -> u32 {
        self.file_size.get()
    }

    pub fn last_issued_row(&self) -> u32 {
        self.last_issued_row.get()
    }

    pub fn change_count(&self) -> u32 {
        self.change_count.get()
    }

    pub fn page_root_ref(&self) -> u32 {
        self.page_root_ref.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_size_is_512() {
        assert_eq!(std::mem::size_of::<FileHeader>(), 0x200);
    }

    #[test]
    fn header_roundtrip() {
        let header = FileHeader::new(0x1400, 4370);
        let bytes = header.as_bytes();
        let parsed = FileHeader::from_bytes(bytes).unwrap();

        assert_eq!(parsed.file_size(), 0x1400);
        assert_eq!(parsed.last_issued_row(), 4370);
        assert_eq!(parsed.change_count(), 0);
    }

    #[test]
    fn rejects_short_buffer() {
        let bytes = [0u8; 100];
        let result = FileHeader::from_bytes(&bytes);

        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("header needs"));
    }

    #[test]
    fn rejects_bad_magic() {
        let mut header = FileHeader::new(0x200, 0);
        header.magic = *b"NOPE";

        let result = FileHeader::from_bytes(header.as_bytes());

        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("bad magic"));
    }

    #[test]
    fn rejects_unsupported_header_size() {
        let mut header = FileHeader::new(0x200, 0);
        header.header_size = U16::new(0x100);

        let result = FileHeader::from_bytes(header.as_bytes());

        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("unsupported"));
    }

    #[test]
    fn rejects_declared_size_past_real_size() {
        let header = FileHeader::new(0x10000, 0);

        let result = FileHeader::from_bytes(header.as_bytes());

        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("exceeds real size"));
    }
}
