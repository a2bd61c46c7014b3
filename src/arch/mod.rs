//! # Architecture Abstraction Layer
//!
//! The hardware boundary of the kernel. Everything above this module talks to
//! the sample timer, the interrupt mask and the shared SPI bus through the
//! [`Hal`] trait only, so the same core runs against the Cortex-M4 port on
//! target and against [`sim::SimPort`] on the host.
//!
//! ```text
//!            ┌──────────────┐      ┌──────────────┐
//!            │ SampleDriver │      │  GateGuard   │
//!            └──────┬───────┘      └──────┬───────┘
//!                   └─────────┬───────────┘
//!                             ▼
//!                     ┌──────────────┐
//!                     │   dyn Hal    │
//!                     └──────┬───────┘
//!               ┌────────────┴────────────┐
//!        ┌──────▼──────┐           ┌──────▼──────┐
//!        │  CortexM4   │           │   SimPort   │
//!        │  (target)   │           │   (host)    │
//!        └─────────────┘           └─────────────┘
//! ```
//!
//! All methods take `&self`: the port is shared between the interrupt and the
//! cooperative context, and every implementation is built from registers or
//! interior-mutable cells.

#[cfg(all(target_arch = "arm", target_os = "none"))]
pub mod cortex_m4;
pub mod sim;

/// Word width of the shared bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum WordWidth {
    /// 8-bit frames (port expander and other byte devices).
    Bits8,
    /// 16-bit frames (the DAC).
    Bits16,
}

/// Chip-select line on the shared bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BusDevice(pub u8);

impl BusDevice {
    /// The DAC the sample interrupt writes to.
    pub const DAC: Self = Self(0);
    /// The I/O port expander used by cooperative tasks.
    pub const EXPANDER: Self = Self(1);
}

/// Hardware services the kernel needs.
pub trait Hal {
    /// CPU clock the port's timer counts in, Hz.
    fn core_clock_hz(&self) -> u32;

    /// Program the sample timer for `rate_hz` interrupts per second and enable it.
    fn arm_timer(&self, rate_hz: u32);

    /// Acknowledge the current sample interrupt.
    fn clear_pending(&self);

    /// Mask the sample interrupt. A tick that fires while masked is lost.
    fn mask_interrupt(&self);

    /// Unmask the sample interrupt.
    fn unmask_interrupt(&self);

    /// Whether the sample interrupt is currently masked.
    fn interrupt_masked(&self) -> bool;

    /// Free-running timer count, for profiling the interrupt.
    fn timer_count(&self) -> u32;

    /// Select the frame width for following bus writes.
    fn set_word_width(&self, width: WordWidth);

    /// Drive a chip-select line. `asserted` means active (electrically low).
    fn chip_select(&self, device: BusDevice, asserted: bool);

    /// Start transmitting one word.
    fn write_bus(&self, word: u16);

    /// Whether a word is still being shifted out.
    fn bus_busy(&self) -> bool;

    /// Read the last received word, clearing the receive flag.
    fn read_bus(&self) -> u16;
}

impl<H: Hal + ?Sized> Hal for &H {
    fn core_clock_hz(&self) -> u32 {
        (**self).core_clock_hz()
    }

    fn arm_timer(&self, rate_hz: u32) {
        (**self).arm_timer(rate_hz)
    }

    fn clear_pending(&self) {
        (**self).clear_pending()
    }

    fn mask_interrupt(&self) {
        (**self).mask_interrupt()
    }

    fn unmask_interrupt(&self) {
        (**self).unmask_interrupt()
    }

    fn interrupt_masked(&self) -> bool {
        (**self).interrupt_masked()
    }

    fn timer_count(&self) -> u32 {
        (**self).timer_count()
    }

    fn set_word_width(&self, width: WordWidth) {
        (**self).set_word_width(width)
    }

    fn chip_select(&self, device: BusDevice, asserted: bool) {
        (**self).chip_select(device, asserted)
    }

    fn write_bus(&self, word: u16) {
        (**self).write_bus(word)
    }

    fn bus_busy(&self) -> bool {
        (**self).bus_busy()
    }

    fn read_bus(&self) -> u16 {
        (**self).read_bus()
    }
}
