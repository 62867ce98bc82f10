//! Interrupt-exclusion primitives.
//!
//! The MPU region manager is shared mutable state reached from both task and
//! interrupt context, so every read-modify-write of it runs inside a short,
//! bounded critical section. On thumb targets the section is implemented by
//! masking PRIMASK; hosted builds (unit tests) have no interrupts and run the
//! closure directly.

use core::sync::atomic::{compiler_fence, Ordering};

/// Run `f` with interrupts masked, restoring the previous mask state.
///
/// Safe to nest; the outermost call is the one that re-enables.
#[cfg(target_arch = "arm")]
pub fn without_interrupts<F, R>(f: F) -> R
where
    F: FnOnce() -> R,
{
    let primask: u32;
    // SAFETY: reading PRIMASK and setting the I bit has no memory effects.
    unsafe {
        core::arch::asm!("mrs {}, PRIMASK", out(reg) primask);
        core::arch::asm!("cpsid i");
    }
    compiler_fence(Ordering::SeqCst);

    let result = f();

    compiler_fence(Ordering::SeqCst);
    if primask & 1 == 0 {
        // SAFETY: interrupts were enabled on entry, re-enable them.
        unsafe { core::arch::asm!("cpsie i") };
    }
    result
}

/// Hosted fallback: no interrupt controller, plain call.
#[cfg(not(target_arch = "arm"))]
pub fn without_interrupts<F, R>(f: F) -> R
where
    F: FnOnce() -> R,
{
    compiler_fence(Ordering::SeqCst);
    let result = f();
    compiler_fence(Ordering::SeqCst);
    result
}

/// A spin mutex acquired with interrupts masked.
///
/// This is how firmware images share one `RegionManager` between the tick
/// handler and task context: the lock is only ever held for the bounded
/// critical sections the manager's entry points perform, never across a wait.
pub struct IrqMutex<T> {
    inner: spin::Mutex<T>,
}

impl<T> IrqMutex<T> {
    pub const fn new(value: T) -> Self {
        IrqMutex {
            inner: spin::Mutex::new(value),
        }
    }

    /// Run `f` on the protected value inside the critical section.
    pub fn with<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&mut T) -> R,
    {
        without_interrupts(|| {
            let mut guard = self.inner.lock();
            f(&mut guard)
        })
    }
}
