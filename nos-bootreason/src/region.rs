//! Reserved memory regions
//!
//! The platform describes named reserved regions (base + size) and maps them
//! for us. Everything above this module works on a [`MappedRegion`], a
//! bounded view with offset accessors; raw addresses never leave this file.

use core::ptr::NonNull;

use bitflags::bitflags;

use crate::error::{Error, Result};

/// A physical address
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct PhysAddr(pub u64);

impl PhysAddr {
    /// Creates a new physical address from a raw value.
    pub const fn new(addr: u64) -> Self {
        Self(addr)
    }

    /// Returns the physical address as a raw value.
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Whether this is the null physical address
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }

    /// Address `offset` bytes past this one
    pub const fn offset(self, offset: u64) -> Self {
        Self(self.0.wrapping_add(offset))
    }
}

impl From<u64> for PhysAddr {
    fn from(addr: u64) -> Self {
        Self(addr)
    }
}

bitflags! {
    /// Caching attributes requested when mapping a region
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MapAttributes: u32 {
        /// Strongly ordered device memory (register-like access)
        const DEVICE = 1 << 0;
        /// Uncached normal memory
        const NO_CACHE = 1 << 1;
        /// Uncached, write-combining normal memory
        const WRITE_COMBINE = 1 << 2;
    }
}

impl MapAttributes {
    /// Attributes for the log buffer: never cacheable, because the reader
    /// after reset sits outside this CPU's cache domain.
    pub const fn log_buffer() -> Self {
        if cfg!(target_arch = "arm") {
            Self::NO_CACHE
        } else {
            Self::WRITE_COMBINE
        }
    }

    /// Attributes for a single-word beacon register
    pub const fn register() -> Self {
        Self::DEVICE
    }
}

/// A region as described by the platform, before mapping
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionDescriptor {
    /// Physical base address
    pub base: PhysAddr,
    /// Size in bytes
    pub size: usize,
}

impl RegionDescriptor {
    /// Creates a new descriptor
    pub const fn new(base: PhysAddr, size: usize) -> Self {
        Self { base, size }
    }
}

/// Acceptable size range for a region
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionLimits {
    /// Smallest usable size
    pub min: usize,
    /// Largest size this configuration was built for
    pub max: usize,
}

impl RegionLimits {
    /// Creates a new size range
    pub const fn new(min: usize, max: usize) -> Self {
        Self { min, max }
    }

    /// Whether `size` is inside the range (zero is never accepted)
    pub const fn accepts(&self, size: usize) -> bool {
        size != 0 && size >= self.min && size <= self.max
    }
}

/// A mapped view of a reserved region
///
/// All accesses are volatile and bounds-checked. Word accesses must be
/// naturally aligned relative to the region base, which is itself 8-byte
/// aligned.
#[derive(Debug, Clone)]
pub struct MappedRegion {
    base: NonNull<u8>,
    len: usize,
    phys: PhysAddr,
}

// SAFETY: the view only performs volatile accesses to memory that stays
// mapped for the life of the system; writers are serialized by the caller's
// lock and single aligned words are accessed atomically by the hardware.
unsafe impl Send for MappedRegion {}
unsafe impl Sync for MappedRegion {}

impl MappedRegion {
    /// Build a view over an existing mapping.
    ///
    /// Returns `None` when `base` is not 8-byte aligned.
    ///
    /// # Safety
    ///
    /// `base..base + len` must be valid for volatile reads and writes for the
    /// rest of the program, and must not be accessed through any other path
    /// while this view (or a clone of it) is in use.
    pub unsafe fn from_raw_parts(base: NonNull<u8>, len: usize, phys: PhysAddr) -> Option<Self> {
        if (base.as_ptr() as usize) % 8 != 0 {
            return None;
        }
        Some(Self { base, len, phys })
    }

    /// Size of the mapping in bytes
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the mapping is empty
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Physical base address of the mapping
    pub fn phys(&self) -> PhysAddr {
        self.phys
    }

    fn check(&self, offset: usize, len: usize, align: usize) -> Result<()> {
        let end = offset.checked_add(len).ok_or(Error::OutOfBounds { offset, len })?;
        if end > self.len || offset % align != 0 {
            return Err(Error::OutOfBounds { offset, len });
        }
        Ok(())
    }

    /// Read a 32-bit word at `offset`
    pub fn read_u32(&self, offset: usize) -> Result<u32> {
        self.check(offset, 4, 4)?;
        // SAFETY: bounds and alignment checked above.
        Ok(unsafe { self.base.as_ptr().add(offset).cast::<u32>().read_volatile() })
    }

    /// Write a 32-bit word at `offset`
    pub fn write_u32(&self, offset: usize, value: u32) -> Result<()> {
        self.check(offset, 4, 4)?;
        // SAFETY: bounds and alignment checked above.
        unsafe { self.base.as_ptr().add(offset).cast::<u32>().write_volatile(value) };
        Ok(())
    }

    /// Read a 64-bit word at `offset`
    pub fn read_u64(&self, offset: usize) -> Result<u64> {
        self.check(offset, 8, 8)?;
        // SAFETY: bounds and alignment checked above.
        Ok(unsafe { self.base.as_ptr().add(offset).cast::<u64>().read_volatile() })
    }

    /// Write a 64-bit word at `offset`
    pub fn write_u64(&self, offset: usize, value: u64) -> Result<()> {
        self.check(offset, 8, 8)?;
        // SAFETY: bounds and alignment checked above.
        unsafe { self.base.as_ptr().add(offset).cast::<u64>().write_volatile(value) };
        Ok(())
    }

    /// Copy `data` into the region at `offset`
    pub fn write_bytes(&self, offset: usize, data: &[u8]) -> Result<()> {
        self.check(offset, data.len(), 1)?;
        let dst = self.base.as_ptr();
        for (i, byte) in data.iter().enumerate() {
            // SAFETY: offset + i < offset + data.len() <= len.
            unsafe { dst.add(offset + i).write_volatile(*byte) };
        }
        Ok(())
    }

    /// Copy bytes out of the region at `offset` into `out`
    pub fn read_bytes(&self, offset: usize, out: &mut [u8]) -> Result<()> {
        self.check(offset, out.len(), 1)?;
        let src = self.base.as_ptr();
        for (i, byte) in out.iter_mut().enumerate() {
            // SAFETY: offset + i < offset + out.len() <= len.
            *byte = unsafe { src.add(offset + i).read_volatile() };
        }
        Ok(())
    }

    /// Copy the whole region into a vector
    #[cfg(feature = "std")]
    pub fn to_vec(&self) -> std::vec::Vec<u8> {
        let mut out = std::vec![0u8; self.len];
        // Full-length read from offset zero is always in bounds.
        let _ = self.read_bytes(0, &mut out);
        out
    }
}

/// Platform collaborator that describes and maps reserved regions
#[cfg_attr(test, mockall::automock)]
pub trait RegionProvider {
    /// Look up a reserved region by name
    fn find(&self, name: &str) -> Option<RegionDescriptor>;

    /// Map a described region with the given attributes
    fn map(&self, region: &RegionDescriptor, attrs: MapAttributes) -> Option<MappedRegion>;
}

/// Resolve a named region to a validated mapping
///
/// The size check happens before mapping so a malformed description can
/// never make us map (and later index) more than we were configured for.
pub fn locate<P: RegionProvider + ?Sized>(
    provider: &P,
    name: &'static str,
    limits: RegionLimits,
    attrs: MapAttributes,
) -> Result<MappedRegion> {
    let Some(desc) = provider.find(name) else {
        log::error!(target: "bootreason", "unable to find reserved region {}", name);
        return Err(Error::RegionNotFound(name));
    };

    if desc.base.is_null() {
        log::error!(target: "bootreason", "reserved region {} has no base address", name);
        return Err(Error::ZeroAddress(name));
    }

    if !limits.accepts(desc.size) {
        log::error!(
            target: "bootreason",
            "reserved region {} size {:#x} outside {:#x}..={:#x}",
            name,
            desc.size,
            limits.min,
            limits.max
        );
        return Err(Error::RegionInvalidSize {
            size: desc.size,
            min: limits.min,
            max: limits.max,
        });
    }

    match provider.map(&desc, attrs) {
        Some(region) if region.len() == desc.size => {
            log::debug!(target: "bootreason", "mapped {} at {:#x} ({:#x} bytes)", name, desc.base.0, desc.size);
            Ok(region)
        }
        _ => {
            log::error!(target: "bootreason", "unable to map reserved region {}", name);
            Err(Error::MapFailed(name))
        }
    }
}
