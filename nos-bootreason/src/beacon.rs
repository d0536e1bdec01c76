//! Reset-reason beacon
//!
//! The beacon is one 32-bit word in always-on memory that survives a warm
//! reset. The boot stage that runs next reads it before anything else
//! touches the region.

use crate::magic::ResetMagic;
use crate::region::MappedRegion;
use crate::store::{floor_char_boundary, LINE_MAX};
use crate::sync::mb;

/// A mapped reset-reason word
///
/// Every operation on an unmapped beacon is a no-op.
#[derive(Debug, Default, Clone)]
pub struct Beacon {
    region: Option<MappedRegion>,
}

impl Beacon {
    /// A beacon with nothing behind it
    pub const fn unmapped() -> Self {
        Self { region: None }
    }

    /// Wrap a mapped register region
    pub fn new(region: MappedRegion) -> Self {
        Self { region: Some(region) }
    }

    pub fn is_mapped(&self) -> bool {
        self.region.is_some()
    }

    /// Store `magic` and order the store before anything that follows
    pub fn write(&self, magic: ResetMagic) {
        if let Some(region) = &self.region {
            // Regions are at least four bytes and 8-aligned.
            let _ = region.write_u32(0, magic.raw());
            mb();
        }
    }

    /// Current value of the word
    pub fn read(&self) -> Option<ResetMagic> {
        self.region
            .as_ref()
            .and_then(|region| region.read_u32(0).ok())
            .map(ResetMagic::new)
    }
}

/// Last failure text reported by a subsystem
#[derive(Debug, Default, Clone)]
pub struct FailureSlot {
    text: heapless::String<LINE_MAX>,
}

impl FailureSlot {
    pub const fn new() -> Self {
        Self {
            text: heapless::String::new(),
        }
    }

    /// Replace the slot contents, keeping at most `min(max_len, 256) - 1`
    /// bytes. A zero `max_len` leaves the slot untouched.
    pub fn record(&mut self, text: &str, max_len: usize) {
        if max_len == 0 {
            return;
        }
        let keep = floor_char_boundary(text, max_len.min(LINE_MAX) - 1);
        self.text.clear();
        // keep < LINE_MAX, always fits.
        let _ = self.text.push_str(&text[..keep]);
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}
