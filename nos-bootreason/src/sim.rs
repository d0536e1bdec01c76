//! Hosted stand-ins for the platform collaborators
//!
//! [`SimBoard`] hands out heap-backed regions by name and [`SimPanicChain`]
//! runs registered notifiers in priority order. Both are used by the
//! integration tests and the inspect tool.

use std::collections::BTreeMap;
use std::ptr::NonNull;
use std::sync::Mutex;

use crate::error::{Error, Result};
use crate::panic::{NotifyResult, PanicChain, PanicEvent, PanicNotifier};
use crate::region::{MapAttributes, MappedRegion, PhysAddr, RegionDescriptor, RegionProvider};

/// Zeroed, 8-byte aligned memory that lives for the rest of the process
pub fn leak_region(len: usize, phys: PhysAddr) -> MappedRegion {
    let words: &'static mut [u64] = Vec::leak(vec![0u64; len.div_ceil(8).max(1)]);
    let base = NonNull::from(&mut words[0]).cast::<u8>();
    // SAFETY: the allocation is leaked, at least `len` bytes long, 8-byte
    // aligned, and reachable only through the returned view.
    match unsafe { MappedRegion::from_raw_parts(base, len, phys) } {
        Some(region) => region,
        None => unreachable!("u64 allocation is 8-byte aligned"),
    }
}

#[derive(Debug, Clone)]
struct SimRegion {
    desc: RegionDescriptor,
    memory: Option<MappedRegion>,
    last_attrs: Option<MapAttributes>,
}

/// A simulated board with named reserved regions
#[derive(Debug, Default)]
pub struct SimBoard {
    regions: Mutex<BTreeMap<String, SimRegion>>,
}

impl SimBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a mappable region and return the backing view
    pub fn add(&self, name: &str, phys: u64, size: usize) -> MappedRegion {
        let memory = leak_region(size, PhysAddr(phys));
        self.insert(name, RegionDescriptor::new(PhysAddr(phys), size), Some(memory.clone()));
        memory
    }

    /// Describe a region that the platform will refuse to map
    pub fn add_unmappable(&self, name: &str, phys: u64, size: usize) {
        self.insert(name, RegionDescriptor::new(PhysAddr(phys), size), None);
    }

    /// Attributes the last mapping of `name` was requested with
    pub fn attributes(&self, name: &str) -> Option<MapAttributes> {
        self.lock().get(name).and_then(|r| r.last_attrs)
    }

    fn insert(&self, name: &str, desc: RegionDescriptor, memory: Option<MappedRegion>) {
        self.lock().insert(
            name.to_string(),
            SimRegion {
                desc,
                memory,
                last_attrs: None,
            },
        );
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, SimRegion>> {
        self.regions.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl RegionProvider for SimBoard {
    fn find(&self, name: &str) -> Option<RegionDescriptor> {
        self.lock().get(name).map(|r| r.desc)
    }

    fn map(&self, region: &RegionDescriptor, attrs: MapAttributes) -> Option<MappedRegion> {
        let mut regions = self.lock();
        let entry = regions.values_mut().find(|r| r.desc == *region)?;
        entry.last_attrs = Some(attrs);
        entry.memory.clone()
    }
}

/// A panic notifier chain
#[derive(Default)]
pub struct SimPanicChain {
    notifiers: Mutex<Vec<&'static dyn PanicNotifier>>,
    refuse: bool,
}

impl SimPanicChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// A chain that rejects every registration
    pub fn refusing() -> Self {
        Self {
            notifiers: Mutex::new(Vec::new()),
            refuse: true,
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run the chain the way the panic path would
    pub fn fire(&self, event: &PanicEvent<'_>) -> NotifyResult {
        let notifiers = self.lock().clone();
        let mut result = NotifyResult::Ok;
        for notifier in notifiers {
            result = notifier.notify(event);
            if result == NotifyResult::Stop {
                break;
            }
        }
        result
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<&'static dyn PanicNotifier>> {
        self.notifiers.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl PanicChain for SimPanicChain {
    fn register(&self, notifier: &'static dyn PanicNotifier) -> Result<()> {
        if self.refuse {
            return Err(Error::RegistrationFailed);
        }
        let mut notifiers = self.lock();
        // Stable: equal priorities keep registration order.
        let at = notifiers.partition_point(|n| n.priority() >= notifier.priority());
        notifiers.insert(at, notifier);
        Ok(())
    }
}

impl std::fmt::Debug for SimPanicChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimPanicChain")
            .field("notifiers", &self.len())
            .field("refuse", &self.refuse)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Recorder {
        priority: i32,
        order: &'static AtomicUsize,
        seen_at: AtomicUsize,
        result: NotifyResult,
    }

    impl PanicNotifier for Recorder {
        fn priority(&self) -> i32 {
            self.priority
        }

        fn notify(&self, _event: &PanicEvent<'_>) -> NotifyResult {
            self.seen_at.store(self.order.fetch_add(1, Ordering::SeqCst) + 1, Ordering::SeqCst);
            self.result
        }
    }

    fn recorder(priority: i32, order: &'static AtomicUsize, result: NotifyResult) -> &'static Recorder {
        Box::leak(Box::new(Recorder {
            priority,
            order,
            seen_at: AtomicUsize::new(0),
            result,
        }))
    }

    #[test]
    fn test_board_find_and_map() {
        let board = SimBoard::new();
        let memory = board.add("brlog_mem", 0x8000_0000, 128);
        let desc = board.find("brlog_mem").unwrap();
        assert_eq!(desc.size, 128);
        let mapped = board.map(&desc, MapAttributes::log_buffer()).unwrap();
        mapped.write_u32(0, 7).unwrap();
        assert_eq!(memory.read_u32(0).unwrap(), 7);
        assert_eq!(board.attributes("brlog_mem"), Some(MapAttributes::log_buffer()));
        assert!(board.find("missing").is_none());
    }

    #[test]
    fn test_unmappable_region() {
        let board = SimBoard::new();
        board.add_unmappable("imem,reset_reason", 0x1000, 4);
        let desc = board.find("imem,reset_reason").unwrap();
        assert!(board.map(&desc, MapAttributes::register()).is_none());
    }

    #[test]
    fn test_chain_runs_in_priority_order() {
        static ORDER: AtomicUsize = AtomicUsize::new(0);
        let chain = SimPanicChain::new();
        let low = recorder(0, &ORDER, NotifyResult::Ok);
        let high = recorder(i32::MAX, &ORDER, NotifyResult::Done);
        chain.register(low).unwrap();
        chain.register(high).unwrap();
        chain.fire(&PanicEvent::new(0, Some("test")));
        assert_eq!(high.seen_at.load(Ordering::SeqCst), 1);
        assert_eq!(low.seen_at.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_chain_stops() {
        static ORDER: AtomicUsize = AtomicUsize::new(0);
        let chain = SimPanicChain::new();
        let stopper = recorder(10, &ORDER, NotifyResult::Stop);
        let skipped = recorder(0, &ORDER, NotifyResult::Ok);
        chain.register(skipped).unwrap();
        chain.register(stopper).unwrap();
        assert_eq!(chain.fire(&PanicEvent::new(0, None)), NotifyResult::Stop);
        assert_eq!(skipped.seen_at.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_refusing_chain() {
        static ORDER: AtomicUsize = AtomicUsize::new(0);
        let chain = SimPanicChain::refusing();
        assert_eq!(chain.register(recorder(0, &ORDER, NotifyResult::Ok)), Err(Error::RegistrationFailed));
        assert!(chain.is_empty());
    }
}
