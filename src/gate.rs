//! # Mutual-Exclusion Gate
//!
//! Cooperative tasks share the SPI bus with the sample interrupt. A task that
//! wants the bus masks the sample interrupt first, so no tick can start a DAC
//! word in the middle of the task's transfer:
//!
//! ```text
//!  task:   acquire ─► mask ─► [ bus writes ] ─► unmask ─► release
//!  tick:        ·  ·  ·  ·  ·  dropped  ·  ·  ·  ·  ·  ·  runs again
//! ```
//!
//! The pending flag is left alone on mask, but the timer does not re-queue a
//! tick that fired while masked: each masked window costs at most that many
//! samples. Keep windows short.
//!
//! Release is tied to [`GateGuard`]'s `Drop`, so the interrupt is unmasked on
//! every exit path, early returns and `?` included. The gate does not nest.

use core::ops::{Deref, DerefMut};

use crate::arch::Hal;
use crate::bus::Bus;
use crate::error::KernelError;

/// Handle for taking the bus from cooperative code.
pub struct BusGate<'a, H: Hal + ?Sized> {
    hal: &'a H,
}

impl<H: Hal + ?Sized> Clone for BusGate<'_, H> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<H: Hal + ?Sized> Copy for BusGate<'_, H> {}

impl<'a, H: Hal + ?Sized> BusGate<'a, H> {
    /// Gate over `hal`'s sample interrupt mask.
    pub const fn new(hal: &'a H) -> Self {
        Self { hal }
    }

    /// Mask the sample interrupt and return the bus.
    ///
    /// Pending interrupt state is left alone. A tick that expires while the
    /// guard lives is lost, so hold it for as few words as possible and never
    /// across a yield.
    ///
    /// # Returns
    /// - `Ok(guard)`: bus access until the guard is dropped or released.
    /// - `Err(KernelError::GateHeld)`: the interrupt is already masked. The
    ///   existing holder keeps the gate.
    ///
    /// # Example
    /// ```ignore
    /// let mut bus = gate.acquire()?;
    /// bus.write(BusDevice::EXPANDER, WordWidth::Bits8, 0xFF, true);
    /// // unmasked here, when `bus` goes out of scope
    /// ```
    pub fn acquire(&self) -> Result<GateGuard<'a, H>, KernelError> {
        if self.hal.interrupt_masked() {
            return Err(KernelError::GateHeld);
        }
        self.hal.mask_interrupt();
        Ok(GateGuard {
            hal: self.hal,
            bus: Bus::new(self.hal),
        })
    }

    /// Run `f` with the gate held, releasing it when `f` returns.
    pub fn with<R>(&self, f: impl FnOnce(&mut Bus<'a, H>) -> R) -> Result<R, KernelError> {
        let mut guard = self.acquire()?;
        Ok(f(&mut *guard))
    }

    /// Whether the gate is currently held.
    pub fn is_held(&self) -> bool {
        self.hal.interrupt_masked()
    }
}

/// Exclusive bus access. The sample interrupt stays masked while it lives.
pub struct GateGuard<'a, H: Hal + ?Sized> {
    hal: &'a H,
    bus: Bus<'a, H>,
}

impl<H: Hal + ?Sized> GateGuard<'_, H> {
    /// Release the gate now. Equivalent to dropping the guard.
    pub fn release(self) {}
}

impl<'a, H: Hal + ?Sized> Deref for GateGuard<'a, H> {
    type Target = Bus<'a, H>;

    fn deref(&self) -> &Self::Target {
        &self.bus
    }
}

impl<H: Hal + ?Sized> DerefMut for GateGuard<'_, H> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.bus
    }
}

impl<H: Hal + ?Sized> Drop for GateGuard<'_, H> {
    fn drop(&mut self) {
        self.hal.unmask_interrupt();
    }
}
