//! # Synchronization Primitives
//!
//! Interrupt-safe shared state. The sample driver is built in `main` but
//! driven from the timer exception, so it is parked in a static
//! [`IsrShared`] cell that both sides reach through a critical section.
//!
//! Data the interrupt reads every tick without locking (the frequency word,
//! the tick clock) lives in atomics instead; see
//! [`ParameterChannel`](crate::channel::ParameterChannel).

use core::cell::RefCell;

use critical_section::{CriticalSection, Mutex};

/// Execute a closure within a critical section (interrupts disabled).
///
/// Keep the body short: it delays the sample interrupt.
#[inline]
pub fn critical_section<F, R>(f: F) -> R
where
    F: FnOnce(CriticalSection<'_>) -> R,
{
    critical_section::with(f)
}

/// A value installed once at startup and then borrowed from interrupt context.
pub struct IsrShared<T> {
    inner: Mutex<RefCell<Option<T>>>,
}

impl<T> IsrShared<T> {
    /// Empty cell, for `static` initialisers.
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(RefCell::new(None)),
        }
    }

    /// Store `value`, returning whatever was installed before.
    pub fn install(&self, value: T) -> Option<T> {
        critical_section(|cs| self.inner.borrow_ref_mut(cs).replace(value))
    }

    /// Remove and return the installed value.
    pub fn take(&self) -> Option<T> {
        critical_section(|cs| self.inner.borrow_ref_mut(cs).take())
    }

    /// Run `f` on the installed value. Returns `None` if nothing is installed
    /// or the value is already borrowed further up the stack.
    pub fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        critical_section(|cs| {
            let mut slot = self.inner.borrow(cs).try_borrow_mut().ok()?;
            slot.as_mut().map(f)
        })
    }

    /// Whether a value is installed.
    pub fn is_installed(&self) -> bool {
        critical_section(|cs| {
            self.inner
                .borrow(cs)
                .try_borrow()
                .map(|slot| slot.is_some())
                .unwrap_or(true)
        })
    }
}

impl<T> Default for IsrShared<T> {
    fn default() -> Self {
        Self::new()
    }
}
