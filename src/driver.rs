//! # Periodic Interrupt Driver
//!
//! The body of the sample interrupt. Every tick:
//!
//! ```text
//!  clear pending
//!       │
//!  increment ◄── ParameterChannel (relaxed load)
//!       │
//!  Dds::advance ──► sample ──► BusFrame (offset binary, header | data)
//!                                  │
//!                     wait idle, 16-bit, CS low, write, wait idle, CS high
//!                                  │
//!                            [dummy read]
//!       │
//!  TickClock::tick, record exit timer count
//! ```
//!
//! The driver never yields, never takes the gate (it preempts whoever holds
//! the bus otherwise, which is why the gate masks it) and never logs.
//!
//! The bus busy-wait runs at interrupt priority. It is bounded by one word at
//! the configured bus clock, which [`KernelConfig::validate`](crate::config::KernelConfig::validate)
//! checks against the tick period.

use core::sync::atomic::{AtomicU32, Ordering};

use crate::arch::Hal;
use crate::bus::Bus;
use crate::channel::ParameterChannel;
use crate::dds::{Dds, PhaseState};
use crate::frame::{BusFrame, FrameHeader};
use crate::wavetable::WaveformTable;

// ---------------------------------------------------------------------------
// Tick clock
// ---------------------------------------------------------------------------

/// Millisecond clock derived from the sample tick.
///
/// Written only by the driver, read by the scheduler. Ticks dropped while the
/// gate is held are not counted, so the clock runs slightly slow under heavy
/// gate use.
pub struct TickClock {
    sample_rate_hz: u32,
    ticks_per_ms: u32,
    sub_ticks: AtomicU32,
    ms: AtomicU32,
}

impl TickClock {
    /// Clock for a sample rate in Hz (a whole number of kHz).
    pub const fn new(sample_rate_hz: u32) -> Self {
        let per_ms = sample_rate_hz / 1_000;
        Self {
            sample_rate_hz,
            ticks_per_ms: if per_ms == 0 { 1 } else { per_ms },
            sub_ticks: AtomicU32::new(0),
            ms: AtomicU32::new(0),
        }
    }

    /// Count one sample tick. Interrupt context only.
    #[inline(always)]
    pub fn tick(&self) {
        let sub = self.sub_ticks.load(Ordering::Relaxed) + 1;
        if sub >= self.ticks_per_ms {
            self.sub_ticks.store(0, Ordering::Relaxed);
            let ms = self.ms.load(Ordering::Relaxed);
            self.ms.store(ms.wrapping_add(1), Ordering::Relaxed);
        } else {
            self.sub_ticks.store(sub, Ordering::Relaxed);
        }
    }

    /// Milliseconds since start, wrapping.
    pub fn now_ms(&self) -> u32 {
        self.ms.load(Ordering::Relaxed)
    }

    /// Sample ticks per millisecond.
    pub const fn ticks_per_ms(&self) -> u32 {
        self.ticks_per_ms
    }

    /// Tick rate the clock was built for.
    pub const fn sample_rate_hz(&self) -> u32 {
        self.sample_rate_hz
    }
}

// ---------------------------------------------------------------------------
// Sample driver
// ---------------------------------------------------------------------------

/// Owns the oscillator and writes one DAC word per tick.
pub struct SampleDriver<'a, H: Hal + ?Sized, const N: usize> {
    hal: &'a H,
    params: &'a ParameterChannel,
    clock: &'a TickClock,
    dds: Dds<N>,
    header: FrameHeader,
    drain: bool,
    last_frame: Option<BusFrame>,
    ticks: u32,
    isr_time: u32,
}

impl<'a, H: Hal + ?Sized, const N: usize> SampleDriver<'a, H, N> {
    /// Driver writing to DAC channel A (1x gain, active), draining the
    /// receive register after each word.
    pub fn new(
        hal: &'a H,
        params: &'a ParameterChannel,
        clock: &'a TickClock,
        table: WaveformTable<N>,
    ) -> Self {
        let mut dds = Dds::new(table);
        dds.set_increment(params.increment());
        Self {
            hal,
            params,
            clock,
            dds,
            header: FrameHeader::default(),
            drain: true,
            last_frame: None,
            ticks: 0,
            isr_time: 0,
        }
    }

    /// Use a different frame header.
    pub fn with_header(mut self, header: FrameHeader) -> Self {
        self.header = header;
        self
    }

    /// Enable or disable the dummy read after each word.
    pub fn with_drain(mut self, drain: bool) -> Self {
        self.drain = drain;
        self
    }

    /// Interrupt body. Call once per sample-timer exception.
    ///
    /// Clears the pending flag, picks up the latest increment from the
    /// parameter channel, advances the oscillator and writes the framed
    /// sample to the DAC. The bus wait before the write covers a task word
    /// still shifting out when the gate was released; the wait after it keeps
    /// the chip select low for exactly one word.
    ///
    /// # Timing
    /// Worst case is one full bus word plus the fixed overhead, the figure
    /// [`KernelConfig::transaction_cycles`](crate::config::KernelConfig::transaction_cycles)
    /// checks against the tick period. The timer count at exit is kept in
    /// [`isr_time`](Self::isr_time) for profiling.
    #[inline(always)]
    pub fn on_tick(&mut self) {
        self.hal.clear_pending();

        self.dds.set_increment(self.params.increment());
        let sample = self.dds.advance();
        let frame = self.header.frame_sample(sample);

        Bus::new(self.hal).write_frame(frame, self.drain);

        self.last_frame = Some(frame);
        self.ticks = self.ticks.wrapping_add(1);
        self.clock.tick();
        self.isr_time = self.hal.timer_count();
    }

    /// Frame written by the most recent tick.
    pub fn last_frame(&self) -> Option<BusFrame> {
        self.last_frame
    }

    /// Ticks handled, wrapping.
    pub fn ticks(&self) -> u32 {
        self.ticks
    }

    /// Timer count recorded at the end of the last tick.
    pub fn isr_time(&self) -> u32 {
        self.isr_time
    }

    /// Oscillator phase state.
    pub fn phase(&self) -> PhaseState {
        self.dds.phase()
    }

    /// The oscillator.
    pub fn dds(&self) -> &Dds<N> {
        &self.dds
    }
}
