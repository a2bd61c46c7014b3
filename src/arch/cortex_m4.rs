//! # Cortex-M4 Port Layer
//!
//! Reference [`Hal`] for an STM32F4 (16 MHz HSI by default):
//!
//! - **SysTick** is the sample timer. Masking clears `TICKINT`, so a reload
//!   that happens while masked raises no exception and the tick is lost.
//! - **SPI2** (PB13 SCK, PB14 MISO, PB15 MOSI, AF5) is the shared bus,
//!   master mode with software slave management.
//! - **GPIOB** drives the chip selects: PB12 for the DAC, PB1 for the port
//!   expander. Active low, switched through `BSRR` so no read-modify-write
//!   races with the interrupt.
//!
//! ## Interrupt Priorities
//!
//! - SysTick: priority 0x00 (highest). The sample interrupt preempts
//!   everything and never waits on cooperative code.

use core::ptr::{read_volatile, write_volatile};
use core::sync::atomic::{AtomicBool, Ordering};

use cortex_m::peripheral::SYST;

use super::{BusDevice, Hal, WordWidth};
use crate::config::TIMER_RELOAD_MAX;

// ---------------------------------------------------------------------------
// Register map
// ---------------------------------------------------------------------------

const SYST_CSR_ENABLE: u32 = 1 << 0;
const SYST_CSR_TICKINT: u32 = 1 << 1;
const SYST_CSR_CLKSOURCE: u32 = 1 << 2;

/// Interrupt Control and State Register.
const ICSR: *mut u32 = 0xE000_ED04 as *mut u32;
const ICSR_PENDSTCLR: u32 = 1 << 25;

/// System Handler Priority Register 3. Bits [31:24] are SysTick.
const SHPR3: *mut u32 = 0xE000_ED20 as *mut u32;

const RCC_AHB1ENR: *mut u32 = 0x4002_3830 as *mut u32;
const RCC_AHB1ENR_GPIOBEN: u32 = 1 << 1;
const RCC_APB1ENR: *mut u32 = 0x4002_3840 as *mut u32;
const RCC_APB1ENR_SPI2EN: u32 = 1 << 14;

const GPIOB: usize = 0x4002_0400;
const GPIOB_MODER: *mut u32 = GPIOB as *mut u32;
const GPIOB_AFRH: *mut u32 = (GPIOB + 0x24) as *mut u32;
const GPIOB_BSRR: *mut u32 = (GPIOB + 0x18) as *mut u32;

const SPI2: usize = 0x4000_3800;
const SPI2_CR1: *mut u32 = SPI2 as *mut u32;
const SPI2_SR: *const u32 = (SPI2 + 0x08) as *const u32;
const SPI2_DR: *mut u32 = (SPI2 + 0x0C) as *mut u32;

const CR1_MSTR: u32 = 1 << 2;
const CR1_BR_SHIFT: u32 = 3;
const CR1_SPE: u32 = 1 << 6;
const CR1_SSI: u32 = 1 << 8;
const CR1_SSM: u32 = 1 << 9;
const CR1_DFF: u32 = 1 << 11;

const SR_RXNE: u32 = 1 << 0;
const SR_TXE: u32 = 1 << 1;
const SR_BSY: u32 = 1 << 7;

/// Chip-select pin on GPIOB for each [`BusDevice`] index.
const CS_PINS: [u32; 2] = [12, 1];

// ---------------------------------------------------------------------------
// Port
// ---------------------------------------------------------------------------

/// SysTick + SPI2 port. Holds the core clock and the software copy of the
/// mask bit.
pub struct CortexM4 {
    core_clock_hz: u32,
    masked: AtomicBool,
}

impl CortexM4 {
    /// Create the port for a core running at `core_clock_hz`.
    ///
    /// SysTick runs from the core clock and SPI2 from APB1, which this port
    /// assumes is undivided. Both reload and prescaler are derived from
    /// `core_clock_hz`, so it has to be the frequency the clock tree was
    /// actually set up for; [`Kernel::new`](crate::kernel::Kernel::new)
    /// compares it with the kernel configuration.
    ///
    /// # Safety
    /// The caller must be the only user of SysTick, SPI2 and the GPIOB pins
    /// listed above. Intended for a single `static`.
    pub const unsafe fn steal(core_clock_hz: u32) -> Self {
        Self {
            core_clock_hz,
            masked: AtomicBool::new(false),
        }
    }

    /// Enable clocks, route the SPI pins, park the chip selects high and
    /// bring SPI2 up in 16-bit master mode at `bus_clock_hz` or below.
    pub fn init_bus(&self, bus_clock_hz: u32) {
        let br = prescaler_bits(self.core_clock_hz, bus_clock_hz);
        unsafe {
            modify(RCC_AHB1ENR, |v| v | RCC_AHB1ENR_GPIOBEN);
            modify(RCC_APB1ENR, |v| v | RCC_APB1ENR_SPI2EN);

            // PB13..PB15 alternate function (0b10), chip selects output (0b01)
            modify(GPIOB_MODER, |v| {
                let mut v = v & !(0b11 << 26 | 0b11 << 28 | 0b11 << 30);
                v |= 0b10 << 26 | 0b10 << 28 | 0b10 << 30;
                for pin in CS_PINS {
                    v = (v & !(0b11 << (pin * 2))) | (0b01 << (pin * 2));
                }
                v
            });
            // AF5 for PB13..PB15 (AFRH nibbles 5..7)
            modify(GPIOB_AFRH, |v| {
                (v & !(0xFFF << 20)) | (0x5 << 20) | (0x5 << 24) | (0x5 << 28)
            });
            for pin in CS_PINS {
                write_volatile(GPIOB_BSRR, 1 << pin);
            }

            write_volatile(
                SPI2_CR1,
                CR1_MSTR | CR1_SSM | CR1_SSI | CR1_DFF | (br << CR1_BR_SHIFT) | CR1_SPE,
            );
        }
    }

    fn syst() -> &'static cortex_m::peripheral::syst::RegisterBlock {
        // SAFETY: SYST::PTR is the fixed address of the SysTick block.
        unsafe { &*SYST::PTR }
    }
}

impl Hal for CortexM4 {
    fn core_clock_hz(&self) -> u32 {
        self.core_clock_hz
    }

    /// Program SysTick for `rate_hz` ticks per second.
    ///
    /// A period longer than the 24-bit reload register is clamped to the
    /// longest one the timer can count, and logged.
    fn arm_timer(&self, rate_hz: u32) {
        let reload = (self.core_clock_hz / rate_hz.max(1)).saturating_sub(1);
        if reload > TIMER_RELOAD_MAX {
            warn!("{} Hz needs reload {}, clamped to {}", rate_hz, reload, TIMER_RELOAD_MAX);
        }
        let reload = reload.min(TIMER_RELOAD_MAX);
        let tickint = if self.masked.load(Ordering::Relaxed) {
            0
        } else {
            SYST_CSR_TICKINT
        };
        let syst = Self::syst();
        unsafe {
            // SysTick at the highest priority
            modify(SHPR3, |v| v & !(0xFF << 24));
            syst.rvr.write(reload);
            syst.cvr.write(0);
            syst.csr.write(SYST_CSR_CLKSOURCE | tickint | SYST_CSR_ENABLE);
        }
    }

    #[inline(always)]
    fn clear_pending(&self) {
        unsafe { write_volatile(ICSR, ICSR_PENDSTCLR) };
    }

    fn mask_interrupt(&self) {
        self.masked.store(true, Ordering::Relaxed);
        unsafe { Self::syst().csr.modify(|v| v & !SYST_CSR_TICKINT) };
    }

    fn unmask_interrupt(&self) {
        unsafe { Self::syst().csr.modify(|v| v | SYST_CSR_TICKINT) };
        self.masked.store(false, Ordering::Relaxed);
    }

    fn interrupt_masked(&self) -> bool {
        self.masked.load(Ordering::Relaxed)
    }

    #[inline(always)]
    fn timer_count(&self) -> u32 {
        Self::syst().cvr.read()
    }

    #[inline(always)]
    fn set_word_width(&self, width: WordWidth) {
        let dff = match width {
            WordWidth::Bits8 => 0,
            WordWidth::Bits16 => CR1_DFF,
        };
        unsafe {
            let cr1 = read_volatile(SPI2_CR1);
            if cr1 & CR1_DFF == dff {
                return;
            }
            // DFF may only change with the peripheral disabled
            write_volatile(SPI2_CR1, cr1 & !CR1_SPE);
            write_volatile(SPI2_CR1, (cr1 & !CR1_DFF & !CR1_SPE) | dff);
            write_volatile(SPI2_CR1, (cr1 & !CR1_DFF) | dff | CR1_SPE);
        }
    }

    #[inline(always)]
    fn chip_select(&self, device: BusDevice, asserted: bool) {
        let Some(&pin) = CS_PINS.get(usize::from(device.0)) else {
            return;
        };
        let bit = if asserted { 1 << (pin + 16) } else { 1 << pin };
        unsafe { write_volatile(GPIOB_BSRR, bit) };
    }

    #[inline(always)]
    fn write_bus(&self, word: u16) {
        unsafe {
            while read_volatile(SPI2_SR) & SR_TXE == 0 {}
            write_volatile(SPI2_DR, u32::from(word));
        }
    }

    #[inline(always)]
    fn bus_busy(&self) -> bool {
        let sr = unsafe { read_volatile(SPI2_SR) };
        sr & SR_BSY != 0 || sr & SR_TXE == 0
    }

    #[inline(always)]
    fn read_bus(&self) -> u16 {
        unsafe {
            if read_volatile(SPI2_SR) & SR_RXNE == 0 {
                return 0;
            }
            read_volatile(SPI2_DR) as u16
        }
    }
}

unsafe fn modify(reg: *mut u32, f: impl FnOnce(u32) -> u32) {
    write_volatile(reg, f(read_volatile(reg)));
}

/// SPI `BR` field for the fastest clock at or below `bus_hz`.
const fn prescaler_bits(pclk_hz: u32, bus_hz: u32) -> u32 {
    let mut br = 0;
    while br < 7 && pclk_hz >> (br + 1) > bus_hz {
        br += 1;
    }
    br
}
