//! # Configuration
//!
//! Compile-time constants for the sample engine and the scheduler, plus the
//! runtime [`KernelConfig`] that is checked once at startup. All limits are
//! fixed at compile time; no dynamic allocation.

use crate::error::KernelError;
use crate::scheduler::SchedMethod;

/// Maximum number of cooperative tasks. Bounds the static task table.
pub const MAX_TASKS: usize = 8;

/// Sample interrupt rate in Hz. One DAC word is written per tick.
pub const SAMPLE_RATE_HZ: u32 = 100_000;

/// Number of entries in the waveform table. Must be a power of two.
pub const TABLE_SIZE: usize = 256;

/// Width of the phase accumulator in bits.
pub const ACCUMULATOR_BITS: u32 = 32;

/// Rate divisors at or above this value disable a task.
///
/// `0` runs every pass, `1` every second pass, ... `4` every sixteenth pass.
pub const RATE_DISABLE_THRESHOLD: u8 = 5;

/// Output frequency loaded into the parameter channel at boot.
pub const DEFAULT_FREQUENCY_HZ: u32 = 400;

/// Peak amplitude of the generated waveform, in DAC codes around mid-scale.
pub const DAC_AMPLITUDE: i16 = 2047;

/// System clock frequency in Hz (STM32F4 at 16 MHz HSI).
pub const SYSTEM_CLOCK_HZ: u32 = 16_000_000;

/// SPI clock in Hz. The port expander tops out at 10 MHz; fPCLK/2 stays below it.
pub const BUS_CLOCK_HZ: u32 = 8_000_000;

/// Bits clocked out per DAC word.
pub const BUS_WORD_BITS: u32 = 16;

/// CPU cycles spent in the sample interrupt outside the SPI transfer itself:
/// exception entry, phase update, table lookup, frame build, chip-select and
/// exception return.
pub const ISR_OVERHEAD_CYCLES: u32 = 90;

/// Largest reload value of the sample timer (SysTick is a 24-bit down counter).
pub const TIMER_RELOAD_MAX: u32 = 0x00FF_FFFF;

const _: () = assert!(TABLE_SIZE.is_power_of_two());
const _: () = assert!(RATE_DISABLE_THRESHOLD <= 31);

/// Runtime parameters for one kernel instance.
///
/// Defaults come from the constants above. [`KernelConfig::validate`] is the
/// design-time timing check: the sample period has to cover one full bus word
/// plus the interrupt's own overhead, otherwise ticks overrun and samples are
/// dropped silently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct KernelConfig {
    /// Sample interrupt rate in Hz.
    pub sample_rate_hz: u32,
    /// CPU clock in Hz.
    pub system_clock_hz: u32,
    /// Bus clock in Hz.
    pub bus_clock_hz: u32,
    /// Interrupt cycles outside the bus transfer.
    pub isr_overhead_cycles: u32,
    /// Dispatch policy, fixed at startup.
    pub method: SchedMethod,
}

impl KernelConfig {
    /// Configuration built from the compile-time constants.
    pub const fn new() -> Self {
        Self {
            sample_rate_hz: SAMPLE_RATE_HZ,
            system_clock_hz: SYSTEM_CLOCK_HZ,
            bus_clock_hz: BUS_CLOCK_HZ,
            isr_overhead_cycles: ISR_OVERHEAD_CYCLES,
            method: SchedMethod::RoundRobin,
        }
    }

    /// Same configuration with a different dispatch method.
    pub const fn with_method(mut self, method: SchedMethod) -> Self {
        self.method = method;
        self
    }

    /// Same configuration with a different sample rate.
    pub const fn with_sample_rate(mut self, sample_rate_hz: u32) -> Self {
        self.sample_rate_hz = sample_rate_hz;
        self
    }

    /// Same configuration with a different CPU clock. Has to match the
    /// clock the port was built for; [`Kernel::new`](crate::kernel::Kernel::new)
    /// checks it.
    pub const fn with_system_clock(mut self, system_clock_hz: u32) -> Self {
        self.system_clock_hz = system_clock_hz;
        self
    }

    /// CPU cycles available per sample tick.
    pub const fn tick_cycles(&self) -> u32 {
        if self.sample_rate_hz == 0 {
            return 0;
        }
        self.system_clock_hz / self.sample_rate_hz
    }

    /// CPU cycles one interrupt needs: the word transfer plus fixed overhead.
    pub const fn transaction_cycles(&self) -> u32 {
        if self.bus_clock_hz == 0 {
            return u32::MAX;
        }
        let per_bit = self.system_clock_hz.div_ceil(self.bus_clock_hz);
        per_bit
            .saturating_mul(BUS_WORD_BITS)
            .saturating_add(self.isr_overhead_cycles)
    }

    /// Check the static timing budget.
    ///
    /// The sample rate must be a whole number of kHz and no faster than the
    /// CPU clock. The whole-kHz rule comes from
    /// [`TickClock`](crate::driver::TickClock), which derives milliseconds by
    /// counting a fixed number of ticks; any other rate would make the
    /// scheduler's clock drift. At 1 kHz or faster the tick period of any
    /// 32-bit CPU clock also fits the timer's reload register
    /// ([`TIMER_RELOAD_MAX`]).
    ///
    /// # Returns
    /// - `Err(KernelError::InvalidSampleRate)` for a rate the clock or timer
    ///   cannot produce.
    /// - `Err(KernelError::TimingBudget)` if one bus word plus the interrupt
    ///   overhead does not fit in a tick.
    pub fn validate(&self) -> Result<(), KernelError> {
        if self.sample_rate_hz < 1_000
            || self.sample_rate_hz % 1_000 != 0
            || self.sample_rate_hz > self.system_clock_hz
        {
            return Err(KernelError::InvalidSampleRate(self.sample_rate_hz));
        }

        let tick_cycles = self.tick_cycles();
        let transaction_cycles = self.transaction_cycles();
        if transaction_cycles >= tick_cycles {
            return Err(KernelError::TimingBudget {
                tick_cycles,
                transaction_cycles,
            });
        }
        Ok(())
    }
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self::new()
    }
}
