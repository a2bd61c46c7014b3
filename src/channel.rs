//! # Parameter Channel
//!
//! Hand-off of the phase increment from the cooperative side to the sample
//! interrupt. A single `AtomicU32`: one writer (whichever task owns the
//! frequency), one reader (the interrupt). A 32-bit aligned load or store is
//! a single instruction on Cortex-M, so a reader never sees a torn value and
//! relaxed ordering is enough; nothing else is published alongside it.

use core::sync::atomic::{AtomicU32, Ordering};

use crate::dds;
use crate::error::KernelError;

/// Lock-free holder for the current phase increment.
pub struct ParameterChannel {
    increment: AtomicU32,
    sample_rate_hz: u32,
}

impl ParameterChannel {
    /// Channel preloaded with `initial_hz` at `sample_rate_hz`.
    pub const fn new(sample_rate_hz: u32, initial_hz: u32) -> Self {
        Self {
            increment: AtomicU32::new(dds::increment_for_hz(initial_hz, sample_rate_hz)),
            sample_rate_hz,
        }
    }

    /// Current increment. Called from the interrupt.
    #[inline(always)]
    pub fn increment(&self) -> u32 {
        self.increment.load(Ordering::Relaxed)
    }

    /// Store a raw increment.
    pub fn set_increment(&self, increment: u32) {
        self.increment.store(increment, Ordering::Relaxed);
    }

    /// Sample rate the increment is computed against.
    pub const fn sample_rate_hz(&self) -> u32 {
        self.sample_rate_hz
    }

    /// Frequency the stored increment produces.
    pub fn frequency(&self) -> f32 {
        dds::frequency_for(self.increment(), self.sample_rate_hz)
    }

    /// Set the output frequency in Hz and return the stored increment.
    ///
    /// Non-finite, negative and `>= sample_rate` values are rejected and the
    /// previous value is kept. Frequencies above Nyquist are stored but alias.
    pub fn set_frequency(&self, hz: f32) -> Result<u32, KernelError> {
        let increment = dds::increment_for(f64::from(hz), self.sample_rate_hz)
            .ok_or(KernelError::InvalidFrequency)?;
        if increment > 1 << 31 {
            warn!("{} Hz is above Nyquist and will alias", hz);
        }
        self.set_increment(increment);
        debug!("frequency {} Hz, increment {}", hz, increment);
        Ok(increment)
    }

    /// Parse and apply a frequency command.
    ///
    /// Accepts a bare number (`"440"`, `"1234.5"`) or the same prefixed with
    /// `f`/`F` (`"f 440"`). Surrounding whitespace is ignored.
    pub fn set_frequency_str(&self, text: &str) -> Result<u32, KernelError> {
        let hz = parse_frequency(text)?;
        self.set_frequency(hz)
    }
}

fn parse_frequency(text: &str) -> Result<f32, KernelError> {
    let text = text.trim();
    let value = text
        .strip_prefix(['f', 'F'])
        .map(str::trim_start)
        .unwrap_or(text);
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit() || b == b'.') {
        return Err(KernelError::MalformedInput);
    }
    value.parse::<f32>().map_err(|_| KernelError::MalformedInput)
}
