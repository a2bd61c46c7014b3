//! # Stock Tasks
//!
//! Cooperative tasks that drive the [`ParameterChannel`] from the task side:
//! a timed frequency sweep and a listener that applies frequency commands
//! read from a byte stream.

use core::task::Poll;

use crate::channel::ParameterChannel;
use crate::line::{ByteSource, LineConfig, LineReader};
use crate::task::{Delay, Step, Task, TaskContext, Yield};

// ---------------------------------------------------------------------------
// Frequency sweep
// ---------------------------------------------------------------------------

/// Steps the output frequency geometrically and wraps at the top.
///
/// ```text
///  hz:  400 ─► 420 ─► 441 ─► ... ─► 3961 ─► 400 ─► ...
///        └ period_ms ┘
/// ```
pub struct FrequencySweep<'a> {
    channel: &'a ParameterChannel,
    hz: f32,
    min_hz: f32,
    max_hz: f32,
    ratio: f32,
    period_ms: u32,
    delay: Delay,
}

impl<'a> FrequencySweep<'a> {
    /// Sweep from `min_hz` to `max_hz`, +5% every 100 ms.
    pub fn new(channel: &'a ParameterChannel, min_hz: f32, max_hz: f32) -> Self {
        Self {
            channel,
            hz: min_hz,
            min_hz,
            max_hz,
            ratio: 1.05,
            period_ms: 100,
            delay: Delay::new(),
        }
    }

    /// Use a different step ratio. Must be above 1.
    pub fn with_ratio(mut self, ratio: f32) -> Self {
        self.ratio = ratio;
        self
    }

    /// Use a different step period.
    pub fn with_period(mut self, period_ms: u32) -> Self {
        self.period_ms = period_ms;
        self
    }

    /// Frequency of the last step.
    pub fn frequency(&self) -> f32 {
        self.hz
    }
}

impl Task for FrequencySweep<'_> {
    fn resume(&mut self, cx: &mut TaskContext) -> Step {
        if self.delay.poll(cx.now_ms(), self.period_ms).is_pending() {
            return Step::Yield(Yield::Timed);
        }

        self.hz *= self.ratio;
        if self.hz > self.max_hz {
            self.hz = self.min_hz;
        }
        if let Err(e) = self.channel.set_frequency(self.hz) {
            warn!("sweep step rejected: {}", e);
        }
        Step::Yield(Yield::Timed)
    }
}

// ---------------------------------------------------------------------------
// Frequency listener
// ---------------------------------------------------------------------------

/// Reads lines such as `"f 440"` and applies them to the channel.
///
/// Malformed or out-of-range lines and read timeouts leave the frequency as
/// it was.
pub struct FrequencyListener<'a, S: ByteSource, const N: usize> {
    channel: &'a ParameterChannel,
    source: S,
    reader: LineReader<N>,
    applied: u32,
    rejected: u32,
    timeouts: u32,
}

impl<'a, S: ByteSource, const N: usize> FrequencyListener<'a, S, N> {
    /// Listener reading carriage-return terminated lines from `source`.
    pub fn new(channel: &'a ParameterChannel, source: S) -> Self {
        Self::with_config(channel, source, LineConfig::enter())
    }

    /// Listener with custom line termination.
    pub fn with_config(channel: &'a ParameterChannel, source: S, config: LineConfig) -> Self {
        Self {
            channel,
            source,
            reader: LineReader::new(config),
            applied: 0,
            rejected: 0,
            timeouts: 0,
        }
    }

    /// Lines that changed the frequency.
    pub fn applied(&self) -> u32 {
        self.applied
    }

    /// Lines that were malformed or out of range.
    pub fn rejected(&self) -> u32 {
        self.rejected
    }

    /// Reads that timed out.
    pub fn timeouts(&self) -> u32 {
        self.timeouts
    }
}

impl<S: ByteSource, const N: usize> Task for FrequencyListener<'_, S, N> {
    fn resume(&mut self, cx: &mut TaskContext) -> Step {
        match self.reader.poll(&mut self.source, cx.now_ms()) {
            Poll::Pending => Step::Yield(Yield::Child),
            Poll::Ready(Ok(line)) => {
                if line.trim().is_empty() {
                    return Step::Yield(Yield::Now);
                }
                match self.channel.set_frequency_str(&line) {
                    Ok(_) => self.applied += 1,
                    Err(e) => {
                        warn!("ignored command: {}", e);
                        self.rejected += 1;
                    }
                }
                Step::Yield(Yield::Now)
            }
            Poll::Ready(Err(_)) => {
                self.timeouts += 1;
                Step::Yield(Yield::Now)
            }
        }
    }
}
