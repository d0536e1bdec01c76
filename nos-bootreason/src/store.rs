//! Persistent log store
//!
//! Text is appended after the header in the log region. When a line would
//! run past the end of the region, `log_size` drops back to zero and writing
//! restarts at the start of the buffer: the tail is discarded rather than
//! wrapped, because readers after reset assume the text always starts at
//! offset zero.

use core::fmt;

use crate::error::{Error, Result};
use crate::header::{checksum, LogHeader, HEADER_MAGIC, HEADER_SIZE, OFF_LOG_ADDR, OFF_LOG_CRC, OFF_LOG_SIZE, OFF_MAGIC};
use crate::region::MappedRegion;

/// Capacity of one formatted line, including the `\r` marker
pub const LINE_MAX: usize = 256;

/// Longest text kept from a single append
pub const TEXT_MAX: usize = LINE_MAX - 1;

/// Largest index `<= idx` that falls on a char boundary of `s`
pub(crate) fn floor_char_boundary(s: &str, idx: usize) -> usize {
    if idx >= s.len() {
        return s.len();
    }
    let mut end = idx;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    end
}

/// A bounded line buffer that silently truncates
///
/// Formatting into it never fails and never allocates; text past
/// [`TEXT_MAX`] bytes is dropped at a char boundary.
#[derive(Debug, Default, Clone)]
pub struct LineBuf {
    buf: heapless::Vec<u8, LINE_MAX>,
}

impl LineBuf {
    /// An empty line
    pub fn new() -> Self {
        Self { buf: heapless::Vec::new() }
    }

    /// Build a line from already formatted text
    pub fn from_text(text: &str) -> Self {
        let mut line = Self::new();
        line.push_text(text);
        line
    }

    /// Format `args` into a new line
    pub fn from_args(args: fmt::Arguments<'_>) -> Self {
        let mut line = Self::new();
        // write_str below never reports an error.
        let _ = fmt::Write::write_fmt(&mut line, args);
        line
    }

    fn push_text(&mut self, text: &str) {
        let room = TEXT_MAX - self.buf.len();
        let take = floor_char_boundary(text, room);
        // Cannot overflow: take <= room.
        let _ = self.buf.extend_from_slice(&text.as_bytes()[..take]);
    }

    /// Bytes as they will be stored: a trailing `\n` gets a `\r` after it
    /// so terminal-style readers return to column zero.
    pub fn finish(mut self) -> heapless::Vec<u8, LINE_MAX> {
        if self.buf.last() == Some(&b'\n') {
            // TEXT_MAX leaves one byte free for the marker.
            let _ = self.buf.push(b'\r');
        }
        self.buf
    }

    /// Text length so far
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Whether nothing has been written
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}

impl fmt::Write for LineBuf {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.push_text(s);
        Ok(())
    }
}

/// Header plus text buffer inside the log region
#[derive(Debug, Default)]
pub struct LogStore {
    region: Option<MappedRegion>,
    cursor: usize,
    ready: bool,
}

impl LogStore {
    /// A store with no region; every append is rejected
    pub const fn new() -> Self {
        Self {
            region: None,
            cursor: 0,
            ready: false,
        }
    }

    /// Write a fresh header into `region`
    ///
    /// This belongs to whichever boot stage owns the region before the
    /// kernel does; [`LogStore::initialize`] never rewrites a region it does
    /// not recognize.
    pub fn provision(region: &MappedRegion) -> Result<LogHeader> {
        if region.len() < HEADER_SIZE {
            return Err(Error::RegionInvalidSize {
                size: region.len(),
                min: HEADER_SIZE,
                max: usize::MAX,
            });
        }
        let header = LogHeader::fresh(region.phys().offset(HEADER_SIZE as u64).as_u64());
        header.write_to(region)?;
        Ok(header)
    }

    /// Adopt `region` and validate the header left by the previous boot
    ///
    /// On success appends continue after the existing text. On a magic or
    /// checksum mismatch the region is kept for inspection but the store
    /// stays not ready.
    pub fn initialize(&mut self, region: MappedRegion) -> Result<()> {
        self.ready = false;
        self.cursor = 0;

        if region.len() < HEADER_SIZE {
            return Err(Error::RegionInvalidSize {
                size: region.len(),
                min: HEADER_SIZE,
                max: usize::MAX,
            });
        }

        let header = LogHeader::read_from(&region)?;
        let capacity = region.len() - HEADER_SIZE;
        self.region = Some(region);

        if !header.has_magic() {
            log::error!(target: "bootreason", "log header magic mismatch: {:#010x}", header.magic);
            return Err(Error::NotInitialized);
        }
        if !header.crc_matches() {
            log::warn!(
                target: "bootreason",
                "log checksum mismatch: stored {:#010x}, expected {:#010x}",
                header.log_crc,
                checksum(header.magic, header.log_addr, header.log_size)
            );
            return Err(Error::NotInitialized);
        }
        if header.log_size as usize > capacity {
            log::warn!(target: "bootreason", "log size {} exceeds buffer {}", header.log_size, capacity);
            return Err(Error::NotInitialized);
        }

        self.cursor = header.log_size as usize;
        self.ready = true;
        log::info!(target: "bootreason", "log store ready, {} of {} bytes in use", self.cursor, capacity);
        Ok(())
    }

    /// Whether appends are accepted
    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// Text buffer capacity in bytes (zero without a region)
    pub fn capacity(&self) -> usize {
        self.region.as_ref().map_or(0, |r| r.len().saturating_sub(HEADER_SIZE))
    }

    /// Offset in the text buffer where the next line lands
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Current header, if a region has been adopted
    pub fn header(&self) -> Option<LogHeader> {
        self.region.as_ref().and_then(|r| LogHeader::read_from(r).ok())
    }

    /// Append already formatted text
    pub fn append(&mut self, text: &str) -> Result<()> {
        self.append_line(&LineBuf::from_text(text).finish())
    }

    /// Format and append
    pub fn append_fmt(&mut self, args: fmt::Arguments<'_>) -> Result<()> {
        if !self.ready {
            return Err(Error::NotReady);
        }
        self.append_line(&LineBuf::from_args(args).finish())
    }

    /// Append bytes produced by [`LineBuf::finish`]
    pub fn append_line(&mut self, line: &[u8]) -> Result<()> {
        let region = match (self.ready, self.region.as_ref()) {
            (true, Some(region)) => region,
            _ => return Err(Error::NotReady),
        };

        let magic = region.read_u32(OFF_MAGIC)?;
        if magic != HEADER_MAGIC {
            return Err(Error::NotInitialized);
        }

        let capacity = region.len() - HEADER_SIZE;
        let line = &line[..line.len().min(capacity)];

        if self.cursor + line.len() + HEADER_SIZE > region.len() {
            self.cursor = 0;
        }

        region.write_bytes(HEADER_SIZE + self.cursor, line)?;
        self.cursor += line.len();

        let log_addr = region.read_u64(OFF_LOG_ADDR)?;
        let size = self.cursor as u32;
        region.write_u32(OFF_LOG_SIZE, size)?;
        region.write_u32(OFF_LOG_CRC, checksum(magic, log_addr, size))?;
        Ok(())
    }

    /// Copy of the text currently in the buffer
    #[cfg(feature = "std")]
    pub fn text(&self) -> std::vec::Vec<u8> {
        let Some(region) = self.region.as_ref() else {
            return std::vec::Vec::new();
        };
        let len = self.header().map_or(0, |h| h.log_size as usize).min(self.capacity());
        let mut out = std::vec![0u8; len];
        let _ = region.read_bytes(HEADER_SIZE, &mut out);
        out
    }

    /// Copy of the whole region, header included
    #[cfg(feature = "std")]
    pub fn image(&self) -> std::vec::Vec<u8> {
        self.region.as_ref().map(MappedRegion::to_vec).unwrap_or_default()
    }
}
