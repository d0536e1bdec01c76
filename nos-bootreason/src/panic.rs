//! Panic notification hook
//!
//! The fault-management layer keeps a chain of notifiers and calls them in
//! priority order when the kernel panics. Our notifier runs first and makes
//! sure the beacon carries an attributed reason before the reset.

use core::sync::atomic::{AtomicU8, Ordering};

use crate::beacon::Beacon;
use crate::error::Result;
use crate::magic::ResetMagic;

/// What a notifier tells the chain after running
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyResult {
    /// Handled, keep calling the rest of the chain
    Done,
    /// Nothing to do, keep calling the rest of the chain
    Ok,
    /// Stop calling further notifiers
    Stop,
}

/// Information passed down the panic chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PanicEvent<'a> {
    pub code: u64,
    pub message: Option<&'a str>,
}

impl<'a> PanicEvent<'a> {
    pub const fn new(code: u64, message: Option<&'a str>) -> Self {
        Self { code, message }
    }
}

/// A participant in the panic chain
pub trait PanicNotifier: Sync {
    /// Higher runs earlier
    fn priority(&self) -> i32 {
        0
    }

    fn notify(&self, event: &PanicEvent<'_>) -> NotifyResult;
}

/// The collaborator that owns the panic chain
pub trait PanicChain {
    fn register(&self, notifier: &'static dyn PanicNotifier) -> Result<()>;
}

/// Hook evaluation state
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookState {
    Idle = 0,
    Evaluating = 1,
}

/// Beacon check run on panic
///
/// Only one CPU evaluates at a time; a second panic arriving meanwhile
/// returns straight away instead of racing on the beacon.
#[derive(Debug)]
pub struct PanicHook {
    state: AtomicU8,
}

impl PanicHook {
    /// Registered ahead of every other notifier
    pub const PRIORITY: i32 = i32::MAX;

    pub const fn new() -> Self {
        Self {
            state: AtomicU8::new(HookState::Idle as u8),
        }
    }

    pub fn state(&self) -> HookState {
        match self.state.load(Ordering::Acquire) {
            0 => HookState::Idle,
            _ => HookState::Evaluating,
        }
    }

    /// Keep a recognized reason, otherwise record a plain panic
    pub fn evaluate(&self, beacon: &Beacon) -> NotifyResult {
        if self
            .state
            .compare_exchange(
                HookState::Idle as u8,
                HookState::Evaluating as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            return NotifyResult::Done;
        }

        if let Some(current) = beacon.read() {
            log::info!(target: "bootreason", "reset reason at panic: {}", current);
            if !current.is_recognized() {
                beacon.write(ResetMagic::PANIC);
                log::info!(target: "bootreason", "reset reason set to {}", ResetMagic::PANIC);
            }
        }

        self.state.store(HookState::Idle as u8, Ordering::Release);
        NotifyResult::Done
    }
}

impl Default for PanicHook {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::region::tests::test_region;

    fn beacon_with(value: ResetMagic) -> Beacon {
        let beacon = Beacon::new(test_region(4, 0x1000));
        beacon.write(value);
        beacon
    }

    #[test]
    fn test_unrecognized_value_becomes_panic() {
        let hook = PanicHook::new();
        let beacon = beacon_with(ResetMagic(0));
        assert_eq!(hook.evaluate(&beacon), NotifyResult::Done);
        assert_eq!(beacon.read(), Some(ResetMagic::PANIC));
        assert_eq!(hook.state(), HookState::Idle);
    }

    #[test]
    fn test_init_value_becomes_panic() {
        let beacon = beacon_with(ResetMagic::INIT);
        PanicHook::new().evaluate(&beacon);
        assert_eq!(beacon.read(), Some(ResetMagic::PANIC));
    }

    #[test]
    fn test_recognized_value_kept() {
        for magic in [ResetMagic::THERMAL, ResetMagic::MODEM, ResetMagic::USER_PANIC] {
            let beacon = beacon_with(magic);
            PanicHook::new().evaluate(&beacon);
            assert_eq!(beacon.read(), Some(magic));
        }
    }

    #[test]
    fn test_concurrent_evaluation_returns_immediately() {
        let hook = PanicHook::new();
        hook.state.store(HookState::Evaluating as u8, Ordering::SeqCst);
        let beacon = beacon_with(ResetMagic(0));
        assert_eq!(hook.evaluate(&beacon), NotifyResult::Done);
        assert_eq!(beacon.read(), Some(ResetMagic(0)));
    }

    #[test]
    fn test_unmapped_beacon_is_noop() {
        let hook = PanicHook::new();
        assert_eq!(hook.evaluate(&Beacon::unmapped()), NotifyResult::Done);
        assert_eq!(hook.state(), HookState::Idle);
    }
}
