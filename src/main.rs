//! # ddsos Example Firmware
//!
//! A 100 kHz sine DDS on DAC channel A plus three cooperative tasks sharing
//! the SPI bus with it:
//!
//! | Task | Rate | Behavior |
//! |------|------|----------|
//! | `FrequencySweep` | 0 | 400 Hz → 4 kHz, +5% every 100 ms, then wraps |
//! | `ExpanderBlink` | 0 | Toggles the expander outputs every 500 ms through the bus gate |
//! | `Uptime` | 2 | Logs uptime once a second |
//!
//! The sample interrupt (SysTick) writes one DAC word per tick; the blink
//! task masks it for the length of one 8-bit expander word.

#![no_std]
#![no_main]

use cortex_m_rt::{entry, exception};
#[cfg(feature = "defmt-logging")]
use defmt_rtt as _;
use panic_halt as _;

use ddsos::arch::cortex_m4::CortexM4;
use ddsos::arch::{BusDevice, WordWidth};
use ddsos::channel::ParameterChannel;
use ddsos::config::{
    KernelConfig, BUS_CLOCK_HZ, DAC_AMPLITUDE, DEFAULT_FREQUENCY_HZ, SAMPLE_RATE_HZ, SYSTEM_CLOCK_HZ,
    TABLE_SIZE,
};
use ddsos::driver::{SampleDriver, TickClock};
use ddsos::gate::BusGate;
use ddsos::kernel::Kernel;
use ddsos::scheduler::SchedMethod;
use ddsos::sync::IsrShared;
use ddsos::task::{Delay, Step, Task, TaskContext, Yield};
use ddsos::tasks::FrequencySweep;
use ddsos::wavetable::WaveformTable;

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

static PORT: CortexM4 = unsafe { CortexM4::steal(SYSTEM_CLOCK_HZ) };
static PARAMS: ParameterChannel = ParameterChannel::new(SAMPLE_RATE_HZ, DEFAULT_FREQUENCY_HZ);
static CLOCK: TickClock = TickClock::new(SAMPLE_RATE_HZ);
static DRIVER: IsrShared<SampleDriver<'static, CortexM4, TABLE_SIZE>> = IsrShared::new();

// ---------------------------------------------------------------------------
// Tasks
// ---------------------------------------------------------------------------

/// Toggles all eight outputs of a shift-register expander.
struct ExpanderBlink {
    gate: BusGate<'static, CortexM4>,
    on: bool,
    delay: Delay,
    missed: u32,
}

impl Task for ExpanderBlink {
    fn resume(&mut self, cx: &mut TaskContext) -> Step {
        if self.delay.poll(cx.now_ms(), 500).is_pending() {
            return Step::Yield(Yield::Timed);
        }
        self.on = !self.on;
        let pattern = if self.on { 0xFF } else { 0x00 };
        let written = self
            .gate
            .with(|bus| bus.write(BusDevice::EXPANDER, WordWidth::Bits8, pattern, true));
        if written.is_err() {
            self.missed += 1;
        }
        Step::Yield(Yield::Timed)
    }
}

/// Logs seconds since boot.
struct Uptime {
    seconds: u32,
    delay: Delay,
}

impl Task for Uptime {
    fn resume(&mut self, cx: &mut TaskContext) -> Step {
        if self.delay.poll(cx.now_ms(), 1_000).is_ready() {
            self.seconds += 1;
            #[cfg(feature = "defmt-logging")]
            defmt::info!("up {}s, {} Hz", self.seconds, PARAMS.frequency());
        }
        Step::Yield(Yield::Timed)
    }
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[entry]
fn main() -> ! {
    PORT.init_bus(BUS_CLOCK_HZ);
    DRIVER.install(SampleDriver::new(
        &PORT,
        &PARAMS,
        &CLOCK,
        WaveformTable::sine(DAC_AMPLITUDE),
    ));

    let mut sweep = FrequencySweep::new(&PARAMS, DEFAULT_FREQUENCY_HZ as f32, 4_000.0);
    let mut blink = ExpanderBlink {
        gate: BusGate::new(&PORT),
        on: false,
        delay: Delay::new(),
        missed: 0,
    };
    let mut uptime = Uptime {
        seconds: 0,
        delay: Delay::new(),
    };

    let config = KernelConfig::default().with_method(SchedMethod::Rate);
    let mut kernel =
        Kernel::new(&PORT, &CLOCK, &PARAMS, config).expect("Failed to create kernel");

    kernel.register(&mut sweep, 0).expect("Failed to register sweep");
    kernel.register(&mut blink, 0).expect("Failed to register blink");
    kernel.register(&mut uptime, 2).expect("Failed to register uptime");

    kernel.start();
    kernel.run()
}

// ---------------------------------------------------------------------------
// Sample interrupt
// ---------------------------------------------------------------------------

#[exception]
fn SysTick() {
    DRIVER.with(|driver| driver.on_tick());
}
