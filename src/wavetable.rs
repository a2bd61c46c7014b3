//! # Waveform Table
//!
//! One precomputed cycle of a periodic waveform, indexed by the top bits of
//! the phase accumulator. Tables are built once at startup and never change.
//!
//! `N` must be a power of two so the index is a plain shift of the
//! accumulator; a non power of two fails to compile.

use core::f32::consts::TAU;

/// Waveform shapes the table builders know about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Shape {
    /// `amplitude * sin(2*pi*i/N)`.
    Sine,
    /// Rising ramp from `-amplitude` to just under `+amplitude`.
    Sawtooth,
    /// Linear up/down ramp, peak at N/4, trough at 3N/4.
    Triangle,
    /// `+amplitude` for the first half cycle, `-amplitude` for the second.
    Square,
}

/// A single waveform period of `N` signed samples.
#[derive(Clone, PartialEq, Eq)]
pub struct WaveformTable<const N: usize> {
    samples: [i16; N],
}

impl<const N: usize> WaveformTable<N> {
    /// log2(N). Evaluating it rejects table sizes that are not a power of two.
    pub const INDEX_BITS: u32 = {
        assert!(N.is_power_of_two(), "table size must be a power of two");
        assert!(N >= 2 && N <= 1 << 16, "table size out of range");
        N.trailing_zeros()
    };

    /// Right shift that turns a 32-bit phase into a table index.
    pub const SHIFT: u32 = crate::config::ACCUMULATOR_BITS - Self::INDEX_BITS;

    /// Build a table of the given shape with peak `amplitude`.
    ///
    /// A negative amplitude is treated as its magnitude.
    pub fn new(shape: Shape, amplitude: i16) -> Self {
        let amplitude = amplitude.saturating_abs();
        let mut samples = [0i16; N];
        for (i, slot) in samples.iter_mut().enumerate() {
            *slot = sample_at(shape, i, N, amplitude);
        }
        // Touch INDEX_BITS so the size assertion runs for every table built.
        let _ = Self::INDEX_BITS;
        Self { samples }
    }

    /// Sine table, the shape the sample engine uses by default.
    pub fn sine(amplitude: i16) -> Self {
        Self::new(Shape::Sine, amplitude)
    }

    /// Table built from caller-supplied samples.
    pub fn from_samples(samples: [i16; N]) -> Self {
        let _ = Self::INDEX_BITS;
        Self { samples }
    }

    /// Sample for a 32-bit phase value.
    #[inline(always)]
    pub fn lookup(&self, phase: u32) -> i16 {
        // The shift leaves exactly INDEX_BITS bits, always < N.
        let index = (phase >> Self::SHIFT) as usize;
        self.samples[index & (N - 1)]
    }

    /// Sample at a raw table index (wrapped to the table length).
    #[inline]
    pub fn get(&self, index: usize) -> i16 {
        self.samples[index & (N - 1)]
    }

    /// All samples, in phase order.
    pub fn as_slice(&self) -> &[i16] {
        &self.samples
    }

    /// Number of entries.
    pub const fn len(&self) -> usize {
        N
    }

    /// Always false; tables hold at least two entries.
    pub const fn is_empty(&self) -> bool {
        false
    }
}

impl<const N: usize> core::fmt::Debug for WaveformTable<N> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("WaveformTable").field("len", &N).finish()
    }
}

fn sample_at(shape: Shape, i: usize, n: usize, amplitude: i16) -> i16 {
    let amp = f32::from(amplitude);
    let x = i as f32 / n as f32;
    let value = match shape {
        Shape::Sine => amp * libm::sinf(TAU * x),
        Shape::Sawtooth => amp * (2.0 * x - 1.0),
        Shape::Triangle => {
            // 0 -> 0, 1/4 -> +1, 3/4 -> -1, back to 0
            let t = if x < 0.25 {
                4.0 * x
            } else if x < 0.75 {
                2.0 - 4.0 * x
            } else {
                4.0 * x - 4.0
            };
            amp * t
        }
        Shape::Square => {
            if x < 0.5 {
                amp
            } else {
                -amp
            }
        }
    };
    libm::roundf(value) as i16
}
