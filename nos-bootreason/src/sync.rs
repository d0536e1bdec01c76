//! Interrupt-safe locking for the boot-reason subsystem
//!
//! The log store is written from thread, interrupt and panic context, so the
//! single lock masks local interrupts before it spins and restores them only
//! after the spin lock is released. Interrupt masking itself is a platform
//! concern and comes in through [`IrqControl`].

use core::ops::{Deref, DerefMut};

/// Saved interrupt state returned by [`IrqControl::save_and_disable`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IrqFlags(pub usize);

/// Local interrupt masking
pub trait IrqControl: Sync {
    /// Mask local interrupts and return the previous state
    fn save_and_disable(&self) -> IrqFlags;
    /// Restore a state returned by `save_and_disable`
    fn restore(&self, flags: IrqFlags);
}

/// Interrupt control for hosted builds, where there is nothing to mask
#[derive(Debug, Default, Clone, Copy)]
pub struct NoIrq;

impl IrqControl for NoIrq {
    #[inline]
    fn save_and_disable(&self) -> IrqFlags {
        IrqFlags(0)
    }

    #[inline]
    fn restore(&self, _flags: IrqFlags) {}
}

/// DAIF-based interrupt control for bare-metal AArch64
#[cfg(all(target_arch = "aarch64", target_os = "none"))]
#[derive(Debug, Default, Clone, Copy)]
pub struct Daif;

#[cfg(all(target_arch = "aarch64", target_os = "none"))]
impl IrqControl for Daif {
    #[inline]
    fn save_and_disable(&self) -> IrqFlags {
        let daif: u64;
        unsafe {
            core::arch::asm!("mrs {}, daif", "msr daifset, #0x3", out(reg) daif, options(nostack));
        }
        IrqFlags(daif as usize)
    }

    #[inline]
    fn restore(&self, flags: IrqFlags) {
        unsafe {
            core::arch::asm!("msr daif, {}", in(reg) flags.0 as u64, options(nostack));
        }
    }
}

/// Full memory barrier, used after every beacon write so the value is
/// visible to the memory controller before a reset can be triggered
#[inline]
pub fn mb() {
    #[cfg(all(target_arch = "aarch64", target_os = "none"))]
    unsafe {
        core::arch::asm!("dsb sy", options(nostack));
    }

    #[cfg(not(all(target_arch = "aarch64", target_os = "none")))]
    core::sync::atomic::fence(core::sync::atomic::Ordering::SeqCst);
}

/// A spin lock that masks interrupts while held
pub struct IrqLock<T, I: IrqControl> {
    irq: I,
    inner: spin::Mutex<T>,
}

impl<T, I: IrqControl> IrqLock<T, I> {
    /// Create a new lock around `data`
    pub const fn new(data: T, irq: I) -> Self {
        Self {
            irq,
            inner: spin::Mutex::new(data),
        }
    }

    /// Mask interrupts and acquire the lock
    pub fn lock(&self) -> IrqLockGuard<'_, T, I> {
        let flags = self.irq.save_and_disable();
        let guard = self.inner.lock();
        IrqLockGuard {
            guard: Some(guard),
            irq: &self.irq,
            flags,
        }
    }

    /// Mask interrupts and try to acquire the lock once
    ///
    /// Interrupts are restored before returning `None`.
    pub fn try_lock(&self) -> Option<IrqLockGuard<'_, T, I>> {
        let flags = self.irq.save_and_disable();
        match self.inner.try_lock() {
            Some(guard) => Some(IrqLockGuard {
                guard: Some(guard),
                irq: &self.irq,
                flags,
            }),
            None => {
                self.irq.restore(flags);
                None
            }
        }
    }

    /// Whether some context currently holds the lock
    pub fn is_locked(&self) -> bool {
        self.inner.is_locked()
    }

    /// Interrupt controller used by this lock
    pub fn irq(&self) -> &I {
        &self.irq
    }
}

/// RAII guard for [`IrqLock`]
pub struct IrqLockGuard<'a, T, I: IrqControl> {
    guard: Option<spin::MutexGuard<'a, T>>,
    irq: &'a I,
    flags: IrqFlags,
}

impl<T, I: IrqControl> Deref for IrqLockGuard<'_, T, I> {
    type Target = T;

    fn deref(&self) -> &T {
        // Only taken in drop.
        match self.guard.as_ref() {
            Some(guard) => &**guard,
            None => unreachable!(),
        }
    }
}

impl<T, I: IrqControl> DerefMut for IrqLockGuard<'_, T, I> {
    fn deref_mut(&mut self) -> &mut T {
        match self.guard.as_mut() {
            Some(guard) => &mut **guard,
            None => unreachable!(),
        }
    }
}

impl<T, I: IrqControl> Drop for IrqLockGuard<'_, T, I> {
    fn drop(&mut self) {
        // Unlock first, then let interrupts back in.
        drop(self.guard.take());
        self.irq.restore(self.flags);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// Tracks masking depth the way a real CPU flag would
    #[derive(Default)]
    struct CountingIrq {
        depth: AtomicUsize,
        saves: AtomicUsize,
        masked_while_unlocking: AtomicBool,
    }

    impl IrqControl for CountingIrq {
        fn save_and_disable(&self) -> IrqFlags {
            self.saves.fetch_add(1, Ordering::SeqCst);
            IrqFlags(self.depth.fetch_add(1, Ordering::SeqCst))
        }

        fn restore(&self, flags: IrqFlags) {
            let prev = self.depth.fetch_sub(1, Ordering::SeqCst);
            if prev != flags.0 + 1 {
                self.masked_while_unlocking.store(true, Ordering::SeqCst);
            }
        }
    }

    #[test]
    fn test_lock_masks_and_restores() {
        let lock = IrqLock::new(0u32, CountingIrq::default());
        {
            let mut guard = lock.lock();
            *guard += 1;
            assert_eq!(lock.irq().depth.load(Ordering::SeqCst), 1);
            assert!(lock.is_locked());
        }
        assert_eq!(lock.irq().depth.load(Ordering::SeqCst), 0);
        assert!(!lock.is_locked());
        assert!(!lock.irq().masked_while_unlocking.load(Ordering::SeqCst));
        assert_eq!(*lock.lock(), 1);
    }

    #[test]
    fn test_try_lock_contended_restores_irq() {
        let lock = IrqLock::new((), CountingIrq::default());
        let held = lock.lock();
        assert!(lock.try_lock().is_none());
        assert_eq!(lock.irq().depth.load(Ordering::SeqCst), 1);
        drop(held);
        assert_eq!(lock.irq().depth.load(Ordering::SeqCst), 0);
        assert!(lock.try_lock().is_some());
        assert_eq!(lock.irq().saves.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_noirq_is_inert() {
        let irq = NoIrq;
        let flags = irq.save_and_disable();
        irq.restore(flags);
        assert_eq!(flags, IrqFlags(0));
    }
}
