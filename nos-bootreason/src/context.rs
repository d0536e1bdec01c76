//! Diagnostics context
//!
//! [`Diagnostics`] owns every mapped region and all mutable state. Log
//! appends, failure text updates and beacon writes go through one
//! interrupt-masking lock; the panic path only ever tries that lock.

use core::fmt;

use crate::beacon::{Beacon, FailureSlot};
use crate::config::{Config, BEACON_LIMITS};
use crate::error::Result;
use crate::header::LogHeader;
use crate::magic::{subsystem_magic, ResetMagic, RestartLevel};
use crate::oops::{fault_line, FaultRegister, OopsRecorder, SymbolResolver};
use crate::panic::{NotifyResult, PanicEvent, PanicHook, PanicNotifier};
use crate::region::{locate, MapAttributes, RegionProvider};
use crate::store::{LineBuf, LogStore};
use crate::sync::{IrqControl, IrqLock, NoIrq};

/// State guarded by the context lock
#[derive(Debug, Default)]
struct Shared {
    store: LogStore,
    failure: FailureSlot,
}

/// Reset-reason beacon and persistent log for one system
pub struct Diagnostics<I: IrqControl = NoIrq> {
    shared: IrqLock<Shared, I>,
    beacon: Beacon,
    tz_beacon: Beacon,
    oops: OopsRecorder,
    hook: PanicHook,
}

impl<I: IrqControl> Diagnostics<I> {
    /// Map and validate every region named in `config`
    ///
    /// A log region without the header sentinel aborts bring-up. A region
    /// whose checksum does not match is kept, but the log stays disabled
    /// for this boot. Both beacons must map.
    pub fn init<P: RegionProvider + ?Sized>(provider: &P, config: &Config, irq: I) -> Result<Self> {
        let region = locate(provider, config.log_region, config.log_limits(), MapAttributes::log_buffer())?;

        let mut store = LogStore::new();
        if let Err(err) = store.initialize(region) {
            match store.header() {
                Some(header) if header.has_magic() => {
                    log::warn!(target: "bootreason", "persistent log disabled for this boot");
                }
                _ => return Err(err),
            }
        }

        let beacon = locate(provider, config.beacon_region, BEACON_LIMITS, MapAttributes::register())?;
        let tz_beacon = locate(provider, config.tz_beacon_region, BEACON_LIMITS, MapAttributes::register())?;

        let diag = Self::from_parts(store, Beacon::new(beacon), Beacon::new(tz_beacon), irq);
        if let Some(tz) = diag.tz_magic() {
            log::info!(target: "bootreason", "tz reset reason: {}", tz);
        }
        Ok(diag)
    }

    /// Assemble a context from already prepared parts
    pub fn from_parts(store: LogStore, beacon: Beacon, tz_beacon: Beacon, irq: I) -> Self {
        Self {
            shared: IrqLock::new(
                Shared {
                    store,
                    failure: FailureSlot::new(),
                },
                irq,
            ),
            beacon,
            tz_beacon,
            oops: OopsRecorder::new(),
            hook: PanicHook::new(),
        }
    }

    /// Append text to the persistent log
    pub fn append(&self, text: &str) -> Result<()> {
        let line = LineBuf::from_text(text).finish();
        self.shared.lock().store.append_line(&line)
    }

    /// Format and append; formatting happens before the lock is taken
    pub fn append_fmt(&self, args: fmt::Arguments<'_>) -> Result<()> {
        let line = LineBuf::from_args(args).finish();
        self.shared.lock().store.append_line(&line)
    }

    /// Whether the persistent log accepts appends
    pub fn is_ready(&self) -> bool {
        self.shared.lock().store.is_ready()
    }

    /// Current log header
    pub fn header(&self) -> Option<LogHeader> {
        self.shared.lock().store.header()
    }

    /// Record the reason for the coming reset
    pub fn set_magic(&self, magic: ResetMagic) {
        if !self.beacon.is_mapped() {
            return;
        }
        {
            let _guard = self.shared.lock();
            self.beacon.write(magic);
        }
        log::info!(target: "bootreason", "reset reason set to {}", magic);
    }

    /// Reset the beacon to "no reason recorded"
    pub fn clear_magic(&self) {
        self.set_magic(ResetMagic::INIT);
    }

    /// Current beacon value, `None` when unmapped
    pub fn magic(&self) -> Option<ResetMagic> {
        self.beacon.read()
    }

    /// Reset reason the secure world left behind
    pub fn tz_magic(&self) -> Option<ResetMagic> {
        self.tz_beacon.read()
    }

    /// Keep the last failure text a subsystem reported
    pub fn record_subsystem_failure(&self, text: &str, max_len: usize) {
        self.shared.lock().failure.record(text, max_len);
    }

    /// Attribute a coming SoC-wide reset to subsystem `name`
    ///
    /// Local restarts leave the beacon alone and return `None`. Unknown
    /// names record [`ResetMagic::SUBSYSTEM`].
    pub fn set_subsystem_reason(&self, name: &str, level: RestartLevel) -> Option<ResetMagic> {
        if level != RestartLevel::SocWideReset {
            return None;
        }
        let magic = subsystem_magic(name).unwrap_or(ResetMagic::SUBSYSTEM);

        let logged = {
            let mut shared = self.shared.lock();
            self.beacon.write(magic);
            let line = LineBuf::from_args(format_args!(
                "{} subsystem failure reason: {}.\n",
                name,
                shared.failure.as_str()
            ))
            .finish();
            shared.store.append_line(&line)
        };

        if self.beacon.is_mapped() {
            log::info!(target: "bootreason", "reset reason set to {} for {}", magic, name);
        }
        if let Err(err) = logged {
            log::debug!(target: "bootreason", "subsystem reason not logged: {}", err);
        }
        Some(magic)
    }

    /// Arm or disarm the one-shot fault register capture
    pub fn arm_oops(&self, armed: bool) {
        self.oops.arm(armed);
    }

    /// Append the faulting PC and LR if armed
    ///
    /// Returns whether this call consumed the arming.
    pub fn record_fault<R: SymbolResolver + ?Sized>(&self, pc: u64, lr: u64, resolver: &R) -> bool {
        if !self.oops.take() {
            return false;
        }

        let mut pc_line = LineBuf::new();
        let mut lr_line = LineBuf::new();
        // LineBuf never fails to write.
        let _ = fault_line(&mut pc_line, FaultRegister::Pc, pc, resolver);
        let _ = fault_line(&mut lr_line, FaultRegister::Lr, lr, resolver);
        let (pc_line, lr_line) = (pc_line.finish(), lr_line.finish());

        let mut shared = self.shared.lock();
        if shared.store.append_line(&pc_line).is_ok() {
            let _ = shared.store.append_line(&lr_line);
        }
        true
    }

    /// Panic-time beacon evaluation
    pub fn evaluate_panic(&self) -> NotifyResult {
        // The panicking context may already hold the lock; the beacon is a
        // single aligned word, so proceed without it in that case.
        let guard = self.shared.try_lock();
        if guard.is_none() {
            log::warn!(target: "bootreason", "lock held at panic, evaluating beacon unlocked");
        }
        let result = self.hook.evaluate(&self.beacon);
        drop(guard);
        result
    }

    /// Log text currently stored
    #[cfg(feature = "std")]
    pub fn log_text(&self) -> std::vec::Vec<u8> {
        self.shared.lock().store.text()
    }

    /// Byte image of the whole log region
    #[cfg(feature = "std")]
    pub fn snapshot(&self) -> std::vec::Vec<u8> {
        self.shared.lock().store.image()
    }
}

impl<I: IrqControl> PanicNotifier for Diagnostics<I> {
    fn priority(&self) -> i32 {
        PanicHook::PRIORITY
    }

    fn notify(&self, _event: &PanicEvent<'_>) -> NotifyResult {
        self.evaluate_panic()
    }
}

impl<I: IrqControl> fmt::Debug for Diagnostics<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Diagnostics")
            .field("beacon", &self.beacon)
            .field("tz_beacon", &self.tz_beacon)
            .field("oops_armed", &self.oops.is_armed())
            .finish_non_exhaustive()
    }
}
