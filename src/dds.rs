//! # Phase Accumulator (DDS engine)
//!
//! A 32-bit phase counter advanced by a fixed increment every sample tick.
//! The top bits of the phase index a [`WaveformTable`]; the increment alone
//! sets the output frequency:
//!
//! ```text
//! increment = f * 2^32 / sample_rate
//! f_out     = increment * sample_rate / 2^32
//! ```
//!
//! Overflow of the accumulator is the modulo operation, so every add is a
//! wrapping add. [`Dds::advance`] runs inside the sample interrupt: it never
//! logs, never fails and touches nothing but its own state.
//!
//! Keeping the increment at or below `2^31` (Nyquist) is up to the caller.

use crate::wavetable::WaveformTable;

const TWO_POW_32: f64 = 4_294_967_296.0;

/// Accumulator and step of one oscillator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PhaseState {
    /// Current phase, one full cycle per 2^32.
    pub accumulator: u32,
    /// Phase step per tick.
    pub increment: u32,
}

/// DDS oscillator: phase state plus the table it indexes.
#[derive(Debug, Clone)]
pub struct Dds<const N: usize> {
    phase: PhaseState,
    table: WaveformTable<N>,
}

impl<const N: usize> Dds<N> {
    /// Oscillator at phase zero with a zero increment (silent, DC at table[0]).
    pub fn new(table: WaveformTable<N>) -> Self {
        Self {
            phase: PhaseState::default(),
            table,
        }
    }

    /// Advance one tick and return the new sample.
    #[inline(always)]
    pub fn advance(&mut self) -> i16 {
        self.phase.accumulator = self.phase.accumulator.wrapping_add(self.phase.increment);
        self.table.lookup(self.phase.accumulator)
    }

    /// Replace the per-tick increment. Takes effect on the next `advance()`.
    #[inline(always)]
    pub fn set_increment(&mut self, increment: u32) {
        self.phase.increment = increment;
    }

    /// Current per-tick increment.
    pub fn increment(&self) -> u32 {
        self.phase.increment
    }

    /// Current phase.
    pub fn accumulator(&self) -> u32 {
        self.phase.accumulator
    }

    /// Snapshot of the phase state.
    pub fn phase(&self) -> PhaseState {
        self.phase
    }

    /// Table index the current phase points at.
    pub fn index(&self) -> usize {
        (self.phase.accumulator >> WaveformTable::<N>::SHIFT) as usize
    }

    /// Return the phase to zero, keeping the increment.
    pub fn reset(&mut self) {
        self.phase.accumulator = 0;
    }

    /// The table this oscillator reads.
    pub fn table(&self) -> &WaveformTable<N> {
        &self.table
    }
}

/// Increment for `hz` at `sample_rate_hz`, rounded to nearest.
///
/// Returns `None` for non-finite or negative frequencies and for frequencies
/// at or above the sample rate, which do not fit in 32 bits.
pub fn increment_for(hz: f64, sample_rate_hz: u32) -> Option<u32> {
    if !hz.is_finite() || hz < 0.0 || sample_rate_hz == 0 {
        return None;
    }
    let increment = libm::round(hz * TWO_POW_32 / f64::from(sample_rate_hz));
    if increment >= TWO_POW_32 {
        return None;
    }
    Some(increment as u32)
}

/// Integer form of [`increment_for`], usable in `const` context.
///
/// Saturates at `u32::MAX` for frequencies at or above the sample rate.
pub const fn increment_for_hz(hz: u32, sample_rate_hz: u32) -> u32 {
    if sample_rate_hz == 0 {
        return 0;
    }
    let rate = sample_rate_hz as u64;
    let increment = (((hz as u64) << 32) + rate / 2) / rate;
    if increment > u32::MAX as u64 {
        u32::MAX
    } else {
        increment as u32
    }
}

/// Output frequency produced by `increment` at `sample_rate_hz`.
pub fn frequency_for(increment: u32, sample_rate_hz: u32) -> f32 {
    (f64::from(increment) * f64::from(sample_rate_hz) / TWO_POW_32) as f32
}

/// Smallest frequency step, `sample_rate / 2^32`.
pub fn resolution_hz(sample_rate_hz: u32) -> f32 {
    (f64::from(sample_rate_hz) / TWO_POW_32) as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wavetable::Shape;

    fn sine_dds() -> Dds<256> {
        Dds::new(WaveformTable::sine(2047))
    }

    #[test]
    fn test_increment_for_400hz_at_100k() {
        assert_eq!(increment_for(400.0, 100_000), Some(17_179_869));
        assert_eq!(increment_for_hz(400, 100_000), 17_179_869);
    }

    #[test]
    fn test_increment_rejects_unrepresentable() {
        assert_eq!(increment_for(f64::NAN, 100_000), None);
        assert_eq!(increment_for(f64::INFINITY, 100_000), None);
        assert_eq!(increment_for(-1.0, 100_000), None);
        assert_eq!(increment_for(100_000.0, 100_000), None);
        assert_eq!(increment_for(400.0, 0), None);
        assert_eq!(increment_for_hz(100_000, 100_000), u32::MAX);
    }

    #[test]
    fn test_nyquist_is_half_range() {
        assert_eq!(increment_for(50_000.0, 100_000), Some(1 << 31));
    }

    #[test]
    fn test_one_period_at_400hz() {
        let mut dds = sine_dds();
        dds.set_increment(increment_for_hz(400, 100_000));
        let start = dds.accumulator();
        for _ in 0..250 {
            dds.advance();
        }
        // 250 * 17179869 = 2^32 - 46
        let drift = dds.accumulator().wrapping_sub(start) as i32;
        assert!(drift.unsigned_abs() <= dds.increment());
    }

    #[test]
    fn test_advance_wraps_instead_of_overflowing() {
        let mut dds = sine_dds();
        dds.set_increment(u32::MAX);
        dds.advance();
        dds.advance();
        assert_eq!(dds.accumulator(), u32::MAX.wrapping_mul(2));
    }

    #[test]
    fn test_advance_reads_table_at_top_bits() {
        let table: WaveformTable<4> = WaveformTable::from_samples([10, 20, 30, 40]);
        let mut dds = Dds::new(table);
        dds.set_increment(1 << 30);
        assert_eq!(dds.advance(), 20);
        assert_eq!(dds.advance(), 30);
        assert_eq!(dds.advance(), 40);
        assert_eq!(dds.advance(), 10);
        assert_eq!(dds.index(), 0);
    }

    #[test]
    fn test_zero_increment_holds_phase() {
        let mut dds = Dds::<64>::new(WaveformTable::new(Shape::Sawtooth, 100));
        let first = dds.advance();
        assert_eq!(dds.advance(), first);
        assert_eq!(dds.accumulator(), 0);
    }

    #[test]
    fn test_reset_keeps_increment() {
        let mut dds = sine_dds();
        dds.set_increment(12345);
        dds.advance();
        dds.reset();
        assert_eq!(dds.accumulator(), 0);
        assert_eq!(dds.increment(), 12345);
    }

    #[test]
    fn test_frequency_round_trip() {
        let inc = increment_for(1234.5, 100_000).unwrap();
        let hz = frequency_for(inc, 100_000);
        // f32 output: allow its rounding on top of the 23 uHz step
        assert!((hz - 1234.5).abs() < 1e-3);
        assert!(resolution_hz(100_000) < 1e-4);
    }
}
