//! Error handling module for the boot-reason subsystem

use core::fmt;

/// Errors reported by the boot-reason subsystem
///
/// Setup failures abort only this subsystem's bring-up. At runtime every
/// operation degrades to a no-op or returns one of these codes; nothing in
/// this crate panics on a bad region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// No reserved region with this name was described by the platform
    RegionNotFound(&'static str),
    /// The region was described at physical address zero
    ZeroAddress(&'static str),
    /// The region size is zero, too small, or above the configured capacity
    RegionInvalidSize {
        /// Size reported by the platform
        size: usize,
        /// Smallest acceptable size
        min: usize,
        /// Largest acceptable size
        max: usize,
    },
    /// The platform could not map the region
    MapFailed(&'static str),
    /// Header magic or checksum did not validate
    NotInitialized,
    /// Append attempted before a successful initialize
    NotReady,
    /// Access outside the mapped region
    OutOfBounds {
        /// Requested offset
        offset: usize,
        /// Requested length
        len: usize,
    },
    /// The diagnostics context was already installed
    AlreadyInstalled,
    /// The panic notification chain refused the hook
    RegistrationFailed,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::RegionNotFound(name) => write!(f, "reserved region not found: {}", name),
            Error::ZeroAddress(name) => write!(f, "reserved region at address zero: {}", name),
            Error::RegionInvalidSize { size, min, max } => {
                write!(f, "invalid region size {:#x} (expected {:#x}..={:#x})", size, min, max)
            }
            Error::MapFailed(name) => write!(f, "unable to map reserved region: {}", name),
            Error::NotInitialized => write!(f, "log header magic or checksum mismatch"),
            Error::NotReady => write!(f, "log store not ready"),
            Error::OutOfBounds { offset, len } => {
                write!(f, "access of {} bytes at offset {:#x} outside region", len, offset)
            }
            Error::AlreadyInstalled => write!(f, "boot reason context already installed"),
            Error::RegistrationFailed => write!(f, "panic notifier registration failed"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

/// Result type for operations that can fail
pub type Result<T> = core::result::Result<T, Error>;
