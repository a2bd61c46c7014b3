//! # Task Model
//!
//! Tasks are resumable state machines. The scheduler calls [`Task::resume`]
//! once per activation; the task does a bounded amount of work and reports
//! how it suspended. Anything that must survive a suspension lives in the
//! task's own struct, never on the stack.
//!
//! ```text
//!  struct Blink { state: BlinkState, delay: Delay }
//!
//!  resume() ─► match state {
//!                 On  => { write; state = Off; Yield(Timed) }
//!                 Off => { ...                              }
//!              }
//! ```
//!
//! The suspension kinds mirror what cooperative firmware tasks do: give the
//! CPU back ([`Yield::Now`]), wait for a deadline ([`Delay`]), wait for a
//! condition with an optional timeout ([`EventWait`]), or wait on a child
//! operation such as a [`LineReader`](crate::line::LineReader).

use core::task::Poll;

// ---------------------------------------------------------------------------
// Task state machine
// ---------------------------------------------------------------------------

/// Scheduler view of a task, for diagnostics.
///
/// ```text
///                   resume()
///   ┌──────────┐ ─────────────► ┌─────────┐
///   │  Ready   │                │ Running │
///   │ Sleeping │ ◄───────────── └─────────┘
///   │ Waiting  │     Yield(_)        │
///   │ Blocked  │                     │ Exit
///   └──────────┘                     ▼
///                             ┌────────────┐
///                             │ Terminated │
///                             └────────────┘
/// ```
///
/// Dispatch ignores everything but `Terminated`: a sleeping task is still
/// resumed on its pass and checks its own deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TaskState {
    /// Yielded with nothing pending.
    Ready,
    /// Currently inside `resume`.
    Running,
    /// Waiting for a deadline.
    Sleeping,
    /// Waiting for a condition, possibly with a timeout.
    Waiting,
    /// Waiting on a child operation.
    Blocked,
    /// Returned `Step::Exit`; never resumed again.
    Terminated,
}

/// How a task suspended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Yield {
    /// Plain yield.
    Now,
    /// Waiting for a [`Delay`].
    Timed,
    /// Waiting for an [`EventWait`].
    Event,
    /// Waiting for a child operation to finish.
    Child,
}

impl Yield {
    /// State recorded for a task that suspended this way.
    pub const fn state(self) -> TaskState {
        match self {
            Self::Now => TaskState::Ready,
            Self::Timed => TaskState::Sleeping,
            Self::Event => TaskState::Waiting,
            Self::Child => TaskState::Blocked,
        }
    }
}

/// Result of one activation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Step {
    /// Suspend; resume on a later pass.
    Yield(Yield),
    /// Finished for good.
    Exit,
}

// ---------------------------------------------------------------------------
// Task interface
// ---------------------------------------------------------------------------

/// What the scheduler passes into an activation.
#[derive(Debug)]
pub struct TaskContext {
    now_ms: u32,
    pass: u32,
    rate_request: Option<u8>,
}

impl TaskContext {
    pub(crate) const fn new(now_ms: u32, pass: u32) -> Self {
        Self {
            now_ms,
            pass,
            rate_request: None,
        }
    }

    /// Millisecond clock at dispatch time. Wraps.
    pub const fn now_ms(&self) -> u32 {
        self.now_ms
    }

    /// Scheduler pass counter at dispatch time.
    pub const fn pass(&self) -> u32 {
        self.pass
    }

    /// Ask for a new rate divisor, applied when this activation returns.
    pub fn set_rate(&mut self, rate: u8) {
        self.rate_request = Some(rate);
    }

    pub(crate) fn take_rate_request(&mut self) -> Option<u8> {
        self.rate_request.take()
    }
}

/// A cooperative task.
pub trait Task {
    /// Run one activation.
    fn resume(&mut self, cx: &mut TaskContext) -> Step;
}

impl<F> Task for F
where
    F: FnMut(&mut TaskContext) -> Step,
{
    fn resume(&mut self, cx: &mut TaskContext) -> Step {
        self(cx)
    }
}

// ---------------------------------------------------------------------------
// Task Control Block
// ---------------------------------------------------------------------------

/// Scheduler bookkeeping for one registered task.
pub struct TaskControlBlock<'a> {
    pub(crate) task: Option<&'a mut (dyn Task + 'a)>,
    /// Rate divisor; `>= RATE_DISABLE_THRESHOLD` disables the task.
    pub rate: u8,
    /// Last reported state.
    pub state: TaskState,
    /// Number of times `resume` has been called.
    pub activations: u32,
}

impl<'a> TaskControlBlock<'a> {
    /// Unused slot, for initialising the static table.
    pub const EMPTY: Self = Self {
        task: None,
        rate: 0,
        state: TaskState::Ready,
        activations: 0,
    };

    /// Whether this slot holds a task.
    pub fn is_registered(&self) -> bool {
        self.task.is_some()
    }
}

// ---------------------------------------------------------------------------
// Suspension helpers
// ---------------------------------------------------------------------------

/// Whether a wrapping millisecond clock has reached `deadline`.
///
/// Valid as long as deadlines are less than 2^31 ms (about 24 days) ahead.
#[inline]
pub const fn deadline_reached(now_ms: u32, deadline_ms: u32) -> bool {
    now_ms.wrapping_sub(deadline_ms) < 0x8000_0000
}

/// Timed wait. Store one in the task struct and poll it each activation.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Delay {
    deadline: Option<u32>,
}

impl Delay {
    /// Idle delay.
    pub const fn new() -> Self {
        Self { deadline: None }
    }

    /// Start (on the first call) or continue a wait of `ms` milliseconds.
    ///
    /// Returns `Ready` once `ms` have passed since the first call, and re-arms
    /// for the next wait.
    pub fn poll(&mut self, now_ms: u32, ms: u32) -> Poll<()> {
        let deadline = *self.deadline.get_or_insert(now_ms.wrapping_add(ms));
        if deadline_reached(now_ms, deadline) {
            self.deadline = None;
            Poll::Ready(())
        } else {
            Poll::Pending
        }
    }

    /// Whether a wait is in progress.
    pub const fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }

    /// Abandon the current wait.
    pub fn cancel(&mut self) {
        self.deadline = None;
    }
}

/// How an [`EventWait`] finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum WaitOutcome {
    /// The condition became true.
    Ready,
    /// The timeout ran out first.
    TimedOut,
}

/// Wait for a condition, optionally bounded by a timeout.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct EventWait {
    started: bool,
    deadline: Option<u32>,
}

impl EventWait {
    /// Idle wait.
    pub const fn new() -> Self {
        Self {
            started: false,
            deadline: None,
        }
    }

    /// Check `ready`; the timeout is measured from the first poll.
    ///
    /// A condition that is already true wins over an expired timeout.
    pub fn poll(&mut self, now_ms: u32, ready: bool, timeout_ms: Option<u32>) -> Poll<WaitOutcome> {
        if !self.started {
            self.started = true;
            self.deadline = timeout_ms.map(|ms| now_ms.wrapping_add(ms));
        }
        if ready {
            *self = Self::new();
            return Poll::Ready(WaitOutcome::Ready);
        }
        match self.deadline {
            Some(deadline) if deadline_reached(now_ms, deadline) => {
                *self = Self::new();
                Poll::Ready(WaitOutcome::TimedOut)
            }
            _ => Poll::Pending,
        }
    }

    /// Whether a wait is in progress.
    pub const fn is_pending(&self) -> bool {
        self.started
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------
