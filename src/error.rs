//! Kernel error type.

/// Errors reported by the cooperative side of the kernel.
///
/// Nothing in the interrupt path returns an error: overruns there are a
/// configuration problem caught by [`KernelConfig::validate`](crate::config::KernelConfig::validate).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum KernelError {
    /// The task table already holds `MAX_TASKS` entries.
    TaskTableFull,
    /// Tasks cannot be registered halfway through a dispatch pass.
    PassInProgress,
    /// The handle does not name a registered task.
    InvalidHandle,
    /// The bus gate is already held; nesting is not supported.
    GateHeld,
    /// The frequency cannot be represented by the phase accumulator.
    InvalidFrequency,
    /// The configuration text could not be parsed.
    MalformedInput,
    /// The sample rate is zero, not a whole number of kHz, or above the CPU clock.
    InvalidSampleRate(u32),
    /// The configured CPU clock is not the one the port runs at.
    ClockMismatch {
        /// Clock in the kernel configuration, Hz.
        configured_hz: u32,
        /// Clock the port reports, Hz.
        port_hz: u32,
    },
    /// One bus word plus interrupt overhead does not fit in a sample period.
    TimingBudget {
        /// CPU cycles per sample tick.
        tick_cycles: u32,
        /// CPU cycles the interrupt needs.
        transaction_cycles: u32,
    },
}

impl core::fmt::Display for KernelError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::TaskTableFull => write!(f, "task table is full"),
            Self::PassInProgress => write!(f, "dispatch pass in progress"),
            Self::InvalidHandle => write!(f, "unknown task handle"),
            Self::GateHeld => write!(f, "bus gate already held"),
            Self::InvalidFrequency => write!(f, "frequency out of range"),
            Self::MalformedInput => write!(f, "malformed configuration input"),
            Self::InvalidSampleRate(hz) => write!(f, "invalid sample rate {hz} Hz"),
            Self::ClockMismatch {
                configured_hz,
                port_hz,
            } => write!(
                f,
                "configured for a {configured_hz} Hz CPU but the port runs at {port_hz} Hz"
            ),
            Self::TimingBudget {
                tick_cycles,
                transaction_cycles,
            } => write!(
                f,
                "interrupt needs {transaction_cycles} cycles but a tick is {tick_cycles}"
            ),
        }
    }
}

/// A delegated cooperative operation did not finish before its deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Timeout;

impl core::fmt::Display for Timeout {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "operation timed out")
    }
}
