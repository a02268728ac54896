//! # Synchronization Primitives
//!
//! Interrupt-safe and core-safe critical sections.
//!
//! A Cortex-M interrupt mask only covers the core that sets it, so shared
//! kernel state is guarded by a [`KernelLock`]: local interrupts are masked
//! and a spin flag excludes the other core. Hot paths that only need one
//! word (idle counters, deferral tokens) use atomics instead and never take
//! this lock.

use core::cell::UnsafeCell;
use core::sync::atomic::{AtomicBool, Ordering};

/// Execute a closure with interrupts disabled on the current core.
///
/// Interrupts are disabled on entry and restored on exit. Host builds have
/// no interrupts to mask and run the closure directly.
#[inline]
pub fn critical_section<F, R>(f: F) -> R
where
    F: FnOnce() -> R,
{
    #[cfg(target_os = "none")]
    {
        cortex_m::interrupt::free(|_cs| f())
    }
    #[cfg(not(target_os = "none"))]
    {
        f()
    }
}

/// Data shared between both cores and their interrupt handlers.
///
/// # Usage
/// ```ignore
/// static COUNT: KernelLock<u32> = KernelLock::new(0);
/// COUNT.with(|c| *c += 1);
/// ```
///
/// Keep the closure short: the other core spins while it runs.
pub struct KernelLock<T> {
    locked: AtomicBool,
    value: UnsafeCell<T>,
}

// Safety: access to `value` is serialized by `locked`, and `with` masks
// local interrupts so a handler on the same core cannot re-enter.
unsafe impl<T: Send> Sync for KernelLock<T> {}

impl<T> KernelLock<T> {
    pub const fn new(value: T) -> Self {
        Self {
            locked: AtomicBool::new(false),
            value: UnsafeCell::new(value),
        }
    }

    /// Run `f` with exclusive access to the guarded value.
    pub fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        critical_section(|| {
            while self
                .locked
                .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
                .is_err()
            {
                core::hint::spin_loop();
            }
            // Safety: the flag is held, no other reference exists.
            let result = f(unsafe { &mut *self.value.get() });
            self.locked.store(false, Ordering::Release);
            result
        })
    }
}
