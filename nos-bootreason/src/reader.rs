//! Post-mortem log reader
//!
//! Works on a byte copy of the log region taken after reset, the way a
//! bootloader or field tool sees it. Nothing here touches live memory.

use crate::error::{Error, Result};
use crate::header::{LogHeader, HEADER_SIZE};

/// A decoded log region
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot<'a> {
    pub header: LogHeader,
    /// Whether `log_crc` matched; the text is still returned when it did not
    pub crc_valid: bool,
    /// Text bytes, clamped to what the buffer actually holds
    pub text: &'a [u8],
}

/// Decode a region image
pub fn parse(bytes: &[u8]) -> Result<Snapshot<'_>> {
    let header = LogHeader::from_bytes(bytes).ok_or(Error::RegionInvalidSize {
        size: bytes.len(),
        min: HEADER_SIZE,
        max: usize::MAX,
    })?;
    if !header.has_magic() {
        return Err(Error::NotInitialized);
    }

    let body = &bytes[HEADER_SIZE..];
    let len = (header.log_size as usize).min(body.len());
    Ok(Snapshot {
        header,
        crc_valid: header.crc_matches(),
        text: &body[..len],
    })
}

impl<'a> Snapshot<'a> {
    /// Whether the text was clamped because `log_size` overran the buffer
    pub fn is_truncated(&self) -> bool {
        (self.header.log_size as usize) > self.text.len()
    }

    /// Stored lines without their `\n` / `\n\r` terminators
    ///
    /// A line that is not valid UTF-8 comes back as `None`; use
    /// [`Snapshot::raw_lines`] for the bytes.
    pub fn lines(&self) -> impl Iterator<Item = Option<&'a str>> + 'a {
        self.raw_lines().map(|line| core::str::from_utf8(line).ok())
    }

    /// Stored lines as bytes
    pub fn raw_lines(&self) -> impl Iterator<Item = &'a [u8]> + 'a {
        let text = self.text;
        let text = text.strip_suffix(b"\n\r").or_else(|| text.strip_suffix(b"\n")).unwrap_or(text);
        let mut done = text.is_empty();
        let mut rest = text;
        core::iter::from_fn(move || {
            if done {
                return None;
            }
            match rest.iter().position(|b| *b == b'\n') {
                Some(pos) => {
                    let line = &rest[..pos];
                    rest = &rest[pos + 1..];
                    if rest.first() == Some(&b'\r') {
                        rest = &rest[1..];
                    }
                    Some(line)
                }
                None => {
                    done = true;
                    Some(rest)
                }
            }
        })
    }
}
