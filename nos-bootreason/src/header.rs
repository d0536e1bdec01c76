//! On-memory log header
//!
//! The header sits at offset zero of the log region and is read byte-for-byte
//! by boot stages that run after a warm reset. Field order, widths and the
//! checksum formula are a contract with those readers and must not change.

use core::mem::{align_of, offset_of, size_of};

use static_assertions::{assert_eq_size, const_assert_eq};

use crate::error::{Error, Result};
use crate::region::MappedRegion;

/// Sentinel proving the region was initialized (`WBRM` in memory order)
pub const HEADER_MAGIC: u32 = 0x4D52_4257;

/// Size of the header; the text buffer starts right after it
pub const HEADER_SIZE: usize = size_of::<LogHeader>();

/// Length of the free-form boot reason string
pub const BOOT_REASON_STR_LEN: usize = 32;

/// Persisted log header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C, align(8))]
pub struct LogHeader {
    /// Header sentinel, [`HEADER_MAGIC`] when valid
    pub magic: u32,
    /// Boot-generation marker owned by the provisioning stage
    pub initial: u32,
    /// Physical address of the text buffer (checksum input only)
    pub log_addr: u64,
    /// Valid bytes in the text buffer
    pub log_size: u32,
    /// `checksum(magic, log_addr, log_size)`
    pub log_crc: u32,
    /// Reason code left by an external boot stage
    pub boot_reason: u32,
    /// Reason text left by an external boot stage, NUL padded
    pub boot_reason_str: [u8; BOOT_REASON_STR_LEN],
    /// Padding to keep the header a multiple of 8 bytes
    pub reserved: [u8; 4],
}

assert_eq_size!(LogHeader, [u8; 64]);
const_assert_eq!(align_of::<LogHeader>(), 8);
const_assert_eq!(offset_of!(LogHeader, magic), 0);
const_assert_eq!(offset_of!(LogHeader, initial), 4);
const_assert_eq!(offset_of!(LogHeader, log_addr), 8);
const_assert_eq!(offset_of!(LogHeader, log_size), 16);
const_assert_eq!(offset_of!(LogHeader, log_crc), 20);
const_assert_eq!(offset_of!(LogHeader, boot_reason), 24);
const_assert_eq!(offset_of!(LogHeader, boot_reason_str), 28);
const_assert_eq!(offset_of!(LogHeader, reserved), 60);

pub(crate) const OFF_MAGIC: usize = offset_of!(LogHeader, magic);
pub(crate) const OFF_INITIAL: usize = offset_of!(LogHeader, initial);
pub(crate) const OFF_LOG_ADDR: usize = offset_of!(LogHeader, log_addr);
pub(crate) const OFF_LOG_SIZE: usize = offset_of!(LogHeader, log_size);
pub(crate) const OFF_LOG_CRC: usize = offset_of!(LogHeader, log_crc);
pub(crate) const OFF_BOOT_REASON: usize = offset_of!(LogHeader, boot_reason);
pub(crate) const OFF_BOOT_REASON_STR: usize = offset_of!(LogHeader, boot_reason_str);
pub(crate) const OFF_RESERVED: usize = offset_of!(LogHeader, reserved);

/// Integrity code over the header fields that locate the text
///
/// `((magic | log_addr | log_addr >> 32) ^ log_size)` evaluated in 64 bits
/// and truncated to 32.
#[inline]
pub const fn checksum(magic: u32, log_addr: u64, log_size: u32) -> u32 {
    (((magic as u64) | log_addr | (log_addr >> 32)) ^ (log_size as u64)) as u32
}

impl LogHeader {
    /// A header with every field zeroed
    pub const fn zeroed() -> Self {
        Self {
            magic: 0,
            initial: 0,
            log_addr: 0,
            log_size: 0,
            log_crc: 0,
            boot_reason: 0,
            boot_reason_str: [0; BOOT_REASON_STR_LEN],
            reserved: [0; 4],
        }
    }

    /// A freshly provisioned header for a text buffer at `log_addr`
    pub const fn fresh(log_addr: u64) -> Self {
        let mut header = Self::zeroed();
        header.magic = HEADER_MAGIC;
        header.log_addr = log_addr;
        header.log_crc = checksum(HEADER_MAGIC, log_addr, 0);
        header
    }

    /// Whether the sentinel is present
    pub const fn has_magic(&self) -> bool {
        self.magic == HEADER_MAGIC
    }

    /// Whether `log_crc` matches the other fields
    pub const fn crc_matches(&self) -> bool {
        self.log_crc == checksum(self.magic, self.log_addr, self.log_size)
    }

    /// Sentinel present and checksum consistent
    pub const fn is_valid(&self) -> bool {
        self.has_magic() && self.crc_matches()
    }

    /// Recompute `log_crc` from the current fields
    pub fn seal(&mut self) {
        self.log_crc = checksum(self.magic, self.log_addr, self.log_size);
    }

    /// Boot reason text up to the first NUL, or up to the first invalid
    /// UTF-8 byte
    pub fn boot_reason_text(&self) -> &str {
        let end = self
            .boot_reason_str
            .iter()
            .position(|b| *b == 0)
            .unwrap_or(BOOT_REASON_STR_LEN);
        let raw = &self.boot_reason_str[..end];
        match core::str::from_utf8(raw) {
            Ok(text) => text,
            Err(err) => core::str::from_utf8(&raw[..err.valid_up_to()]).unwrap_or(""),
        }
    }

    /// Read the header out of a mapped region
    pub fn read_from(region: &MappedRegion) -> Result<Self> {
        if region.len() < HEADER_SIZE {
            return Err(Error::OutOfBounds { offset: 0, len: HEADER_SIZE });
        }
        let mut header = Self::zeroed();
        header.magic = region.read_u32(OFF_MAGIC)?;
        header.initial = region.read_u32(OFF_INITIAL)?;
        header.log_addr = region.read_u64(OFF_LOG_ADDR)?;
        header.log_size = region.read_u32(OFF_LOG_SIZE)?;
        header.log_crc = region.read_u32(OFF_LOG_CRC)?;
        header.boot_reason = region.read_u32(OFF_BOOT_REASON)?;
        region.read_bytes(OFF_BOOT_REASON_STR, &mut header.boot_reason_str)?;
        region.read_bytes(OFF_RESERVED, &mut header.reserved)?;
        Ok(header)
    }

    /// Write every header field into a mapped region
    pub fn write_to(&self, region: &MappedRegion) -> Result<()> {
        if region.len() < HEADER_SIZE {
            return Err(Error::OutOfBounds { offset: 0, len: HEADER_SIZE });
        }
        region.write_u32(OFF_INITIAL, self.initial)?;
        region.write_u64(OFF_LOG_ADDR, self.log_addr)?;
        region.write_u32(OFF_LOG_SIZE, self.log_size)?;
        region.write_u32(OFF_BOOT_REASON, self.boot_reason)?;
        region.write_bytes(OFF_BOOT_REASON_STR, &self.boot_reason_str)?;
        region.write_bytes(OFF_RESERVED, &self.reserved)?;
        region.write_u32(OFF_LOG_CRC, self.log_crc)?;
        // Sentinel last: a reader never sees a magic over stale fields.
        region.write_u32(OFF_MAGIC, self.magic)
    }

    /// Decode a header from a native-endian byte snapshot
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < HEADER_SIZE {
            return None;
        }
        let u32_at = |off: usize| u32::from_ne_bytes([bytes[off], bytes[off + 1], bytes[off + 2], bytes[off + 3]]);
        let mut addr = [0u8; 8];
        addr.copy_from_slice(&bytes[OFF_LOG_ADDR..OFF_LOG_ADDR + 8]);

        let mut header = Self::zeroed();
        header.magic = u32_at(OFF_MAGIC);
        header.initial = u32_at(OFF_INITIAL);
        header.log_addr = u64::from_ne_bytes(addr);
        header.log_size = u32_at(OFF_LOG_SIZE);
        header.log_crc = u32_at(OFF_LOG_CRC);
        header.boot_reason = u32_at(OFF_BOOT_REASON);
        header
            .boot_reason_str
            .copy_from_slice(&bytes[OFF_BOOT_REASON_STR..OFF_BOOT_REASON_STR + BOOT_REASON_STR_LEN]);
        header.reserved.copy_from_slice(&bytes[OFF_RESERVED..OFF_RESERVED + 4]);
        Some(header)
    }

    /// Encode the header as it appears in memory on this platform
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut out = [0u8; HEADER_SIZE];
        out[OFF_MAGIC..OFF_MAGIC + 4].copy_from_slice(&self.magic.to_ne_bytes());
        out[OFF_INITIAL..OFF_INITIAL + 4].copy_from_slice(&self.initial.to_ne_bytes());
        out[OFF_LOG_ADDR..OFF_LOG_ADDR + 8].copy_from_slice(&self.log_addr.to_ne_bytes());
        out[OFF_LOG_SIZE..OFF_LOG_SIZE + 4].copy_from_slice(&self.log_size.to_ne_bytes());
        out[OFF_LOG_CRC..OFF_LOG_CRC + 4].copy_from_slice(&self.log_crc.to_ne_bytes());
        out[OFF_BOOT_REASON..OFF_BOOT_REASON + 4].copy_from_slice(&self.boot_reason.to_ne_bytes());
        out[OFF_BOOT_REASON_STR..OFF_BOOT_REASON_STR + BOOT_REASON_STR_LEN].copy_from_slice(&self.boot_reason_str);
        out[OFF_RESERVED..OFF_RESERVED + 4].copy_from_slice(&self.reserved);
        out
    }
}
