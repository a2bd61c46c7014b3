//! # Scheduler
//!
//! Cooperative run-to-completion dispatcher. Tasks live in a fixed table in
//! registration order; the scheduler visits one table slot per
//! [`Scheduler::dispatch_next`] call and a full sweep of the table is one
//! *pass*.
//!
//! ## Dispatch Algorithm
//!
//! For the task in the current slot:
//! 1. **Skip** if it has terminated or its rate gate is closed
//! 2. **Resume** it once with the current time and pass number
//! 3. **Record** how it suspended, its activation count and any rate it asked for
//! 4. **Advance** the slot cursor; wrapping to slot 0 ends the pass
//!
//! ## Rate Gate
//!
//! Each task carries a divisor `k`. In [`SchedMethod::Rate`] mode it runs on
//! passes where `pass % 2^k == 0`:
//!
//! ```text
//!  pass:   0  1  2  3  4  5  6  7  8
//!  k = 0   ●  ●  ●  ●  ●  ●  ●  ●  ●
//!  k = 1   ●     ●     ●     ●     ●
//!  k = 2   ●           ●           ●
//!  k = 3   ●                       ●
//! ```
//!
//! In [`SchedMethod::RoundRobin`] mode the divisor only enables or disables.
//! In both modes `k >= RATE_DISABLE_THRESHOLD` disables the task.

use crate::config::{MAX_TASKS, RATE_DISABLE_THRESHOLD};
use crate::error::KernelError;
use crate::task::{Step, Task, TaskContext, TaskControlBlock, TaskState};

/// Dispatch policy, fixed at startup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SchedMethod {
    /// Every enabled task runs every pass.
    #[default]
    RoundRobin,
    /// A task with divisor `k` runs every `2^k` passes.
    Rate,
}

/// Index of a registered task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TaskHandle(usize);

impl TaskHandle {
    /// Position in registration order.
    pub const fn index(self) -> usize {
        self.0
    }
}

/// Whether a task with divisor `rate` runs on `pass`.
#[inline]
pub const fn rate_gate_open(method: SchedMethod, rate: u8, pass: u32) -> bool {
    if rate >= RATE_DISABLE_THRESHOLD {
        return false;
    }
    match method {
        SchedMethod::RoundRobin => true,
        SchedMethod::Rate => pass & ((1u32 << rate) - 1) == 0,
    }
}

// ---------------------------------------------------------------------------
// Scheduler struct
// ---------------------------------------------------------------------------

/// Ordered task table plus the dispatch cursor.
///
/// Tasks are borrowed for `'a`; in firmware they are `'static` and the
/// scheduler lives in `main`'s frame for the life of the program.
pub struct Scheduler<'a> {
    tasks: [TaskControlBlock<'a>; MAX_TASKS],
    task_count: usize,
    method: SchedMethod,
    pass: u32,
    cursor: usize,
}

impl<'a> Scheduler<'a> {
    /// Empty scheduler using `method`.
    pub const fn new(method: SchedMethod) -> Self {
        Self {
            tasks: [TaskControlBlock::EMPTY; MAX_TASKS],
            task_count: 0,
            method,
            pass: 0,
            cursor: 0,
        }
    }

    /// Append a task to the table.
    ///
    /// The task is borrowed for the scheduler's whole life and is resumed in
    /// registration order. Registration is only allowed on a pass boundary:
    /// inserting halfway through a pass would give the new task a slot in a
    /// pass whose rate gates were already decided for the others.
    ///
    /// # Parameters
    /// - `task`: the state machine to resume. Closures taking
    ///   `&mut TaskContext` work too.
    /// - `rate`: divisor `k`; the task runs every `2^k` passes in
    ///   [`SchedMethod::Rate`] mode. `k >= RATE_DISABLE_THRESHOLD` registers
    ///   it disabled.
    ///
    /// # Returns
    /// - `Ok(handle)`: the task's position in the table.
    /// - `Err(KernelError::TaskTableFull)`: `MAX_TASKS` already registered.
    /// - `Err(KernelError::PassInProgress)`: called between the first and
    ///   last slot of a pass.
    ///
    /// # Example
    /// ```ignore
    /// let mut blink = Blink::new(gate);
    /// let handle = scheduler.register(&mut blink, 2)?; // every 4th pass
    /// ```
    pub fn register(
        &mut self,
        task: &'a mut (dyn Task + 'a),
        rate: u8,
    ) -> Result<TaskHandle, KernelError> {
        if self.in_pass() {
            return Err(KernelError::PassInProgress);
        }
        if self.task_count >= MAX_TASKS {
            return Err(KernelError::TaskTableFull);
        }

        let id = self.task_count;
        self.tasks[id] = TaskControlBlock {
            task: Some(task),
            rate,
            state: TaskState::Ready,
            activations: 0,
        };
        self.task_count += 1;
        debug!("task {} registered, rate {}", id, rate);
        Ok(TaskHandle(id))
    }

    /// Change a task's rate divisor. Takes effect from its next slot.
    pub fn set_rate(&mut self, handle: TaskHandle, rate: u8) -> Result<(), KernelError> {
        let tcb = self.tcb_mut(handle)?;
        tcb.rate = rate;
        debug!("task {} rate {}", handle.0, rate);
        Ok(())
    }

    /// Visit the next slot, resuming its task if the gate is open.
    ///
    /// Returns the handle of the task that ran, if any.
    pub fn dispatch_next(&mut self, now_ms: u32) -> Option<TaskHandle> {
        if self.task_count == 0 {
            return None;
        }

        let index = self.cursor;
        let (method, pass) = (self.method, self.pass);
        let tcb = &mut self.tasks[index];
        let mut ran = None;

        if tcb.state != TaskState::Terminated && rate_gate_open(method, tcb.rate, pass) {
            if let Some(task) = tcb.task.as_deref_mut() {
                tcb.state = TaskState::Running;
                let mut cx = TaskContext::new(now_ms, pass);
                let step = task.resume(&mut cx);

                tcb.activations = tcb.activations.wrapping_add(1);
                if let Some(rate) = cx.take_rate_request() {
                    tcb.rate = rate;
                }
                tcb.state = match step {
                    Step::Yield(kind) => kind.state(),
                    Step::Exit => {
                        info!("task {} exited", index);
                        TaskState::Terminated
                    }
                };
                ran = Some(TaskHandle(index));
            }
        }

        self.cursor += 1;
        if self.cursor >= self.task_count {
            self.cursor = 0;
            self.pass = self.pass.wrapping_add(1);
        }
        ran
    }

    /// Finish the current pass (a whole pass if none is in progress).
    ///
    /// Returns the number of tasks resumed.
    pub fn run_pass(&mut self, now_ms: u32) -> usize {
        if self.task_count == 0 {
            self.pass = self.pass.wrapping_add(1);
            return 0;
        }
        let mut ran = 0;
        loop {
            if self.dispatch_next(now_ms).is_some() {
                ran += 1;
            }
            if self.cursor == 0 {
                return ran;
            }
        }
    }

    /// Whether some but not all slots of the current pass have been visited.
    pub fn in_pass(&self) -> bool {
        self.cursor != 0
    }

    /// Completed passes, wrapping.
    pub fn pass_count(&self) -> u32 {
        self.pass
    }

    /// Number of registered tasks.
    pub fn task_count(&self) -> usize {
        self.task_count
    }

    /// Dispatch policy.
    pub fn method(&self) -> SchedMethod {
        self.method
    }

    /// Times the task has been resumed.
    pub fn activations(&self, handle: TaskHandle) -> Result<u32, KernelError> {
        self.tcb(handle).map(|tcb| tcb.activations)
    }

    /// Last state the task reported.
    pub fn state(&self, handle: TaskHandle) -> Result<TaskState, KernelError> {
        self.tcb(handle).map(|tcb| tcb.state)
    }

    /// Current rate divisor of the task.
    pub fn rate(&self, handle: TaskHandle) -> Result<u8, KernelError> {
        self.tcb(handle).map(|tcb| tcb.rate)
    }

    /// Registered task control blocks, in dispatch order.
    pub fn tasks(&self) -> &[TaskControlBlock<'a>] {
        &self.tasks[..self.task_count]
    }

    fn tcb(&self, handle: TaskHandle) -> Result<&TaskControlBlock<'a>, KernelError> {
        self.tasks()
            .get(handle.0)
            .ok_or(KernelError::InvalidHandle)
    }

    fn tcb_mut(&mut self, handle: TaskHandle) -> Result<&mut TaskControlBlock<'a>, KernelError> {
        self.tasks[..self.task_count]
            .get_mut(handle.0)
            .ok_or(KernelError::InvalidHandle)
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::Yield;
    use core::cell::RefCell;

    fn idle(_: &mut TaskContext) -> Step {
        Step::Yield(Yield::Now)
    }

    #[test]
    fn test_rate_gate() {
        assert!(rate_gate_open(SchedMethod::Rate, 0, 7));
        assert!(rate_gate_open(SchedMethod::Rate, 2, 8));
        assert!(!rate_gate_open(SchedMethod::Rate, 2, 6));
        assert!(rate_gate_open(SchedMethod::RoundRobin, 4, 3));
        assert!(!rate_gate_open(SchedMethod::RoundRobin, 5, 0));
        assert!(!rate_gate_open(SchedMethod::Rate, 5, 0));
    }

    #[test]
    fn test_dispatch_in_registration_order() {
        let order = RefCell::new(Vec::new());
        let mut a = |_: &mut TaskContext| {
            order.borrow_mut().push('a');
            Step::Yield(Yield::Now)
        };
        let mut b = |_: &mut TaskContext| {
            order.borrow_mut().push('b');
            Step::Yield(Yield::Now)
        };
        let mut c = |_: &mut TaskContext| {
            order.borrow_mut().push('c');
            Step::Yield(Yield::Now)
        };

        let mut sched = Scheduler::new(SchedMethod::RoundRobin);
        sched.register(&mut a, 0).unwrap();
        sched.register(&mut b, 0).unwrap();
        sched.register(&mut c, 0).unwrap();

        assert_eq!(sched.run_pass(0), 3);
        assert_eq!(sched.run_pass(0), 3);
        drop(sched);
        assert_eq!(*order.borrow(), ['a', 'b', 'c', 'a', 'b', 'c']);
    }

    #[test]
    fn test_table_full() {
        let mut tasks = [idle as fn(&mut TaskContext) -> Step; MAX_TASKS + 1];
        let (fits, extra) = tasks.split_at_mut(MAX_TASKS);
        let mut sched = Scheduler::new(SchedMethod::RoundRobin);
        for task in fits.iter_mut() {
            sched.register(task, 0).unwrap();
        }
        assert!(matches!(
            sched.register(&mut extra[0], 0),
            Err(KernelError::TaskTableFull)
        ));
        assert_eq!(sched.task_count(), MAX_TASKS);
    }

    #[test]
    fn test_register_rejected_mid_pass() {
        let mut a = idle;
        let mut b = idle;
        let mut late = idle;
        let mut later = idle;
        let mut sched = Scheduler::new(SchedMethod::RoundRobin);
        sched.register(&mut a, 0).unwrap();
        sched.register(&mut b, 0).unwrap();

        sched.dispatch_next(0);
        assert!(sched.in_pass());
        assert!(matches!(
            sched.register(&mut late, 0),
            Err(KernelError::PassInProgress)
        ));

        sched.run_pass(0);
        assert!(!sched.in_pass());
        assert_eq!(sched.pass_count(), 1);
        assert!(sched.register(&mut later, 0).is_ok());
    }

    #[test]
    fn test_rate_mode_skips_passes() {
        let mut fast = idle;
        let mut slow = idle;
        let mut sched = Scheduler::new(SchedMethod::Rate);
        let fast = sched.register(&mut fast, 0).unwrap();
        let slow = sched.register(&mut slow, 2).unwrap();

        for _ in 0..8 {
            sched.run_pass(0);
        }
        assert_eq!(sched.activations(fast), Ok(8));
        assert_eq!(sched.activations(slow), Ok(2));
    }

    #[test]
    fn test_round_robin_ignores_divisor_below_threshold() {
        let mut a = idle;
        let mut sched = Scheduler::new(SchedMethod::RoundRobin);
        let a = sched.register(&mut a, 4).unwrap();
        for _ in 0..5 {
            sched.run_pass(0);
        }
        assert_eq!(sched.activations(a), Ok(5));
    }

    #[test]
    fn test_disabled_task_never_runs() {
        let mut a = idle;
        let mut b = idle;
        for method in [SchedMethod::RoundRobin, SchedMethod::Rate] {
            let mut sched = Scheduler::new(method);
            let off = sched.register(&mut a, RATE_DISABLE_THRESHOLD).unwrap();
            let on = sched.register(&mut b, 0).unwrap();
            for _ in 0..4 {
                sched.run_pass(0);
            }
            assert_eq!(sched.activations(off), Ok(0), "{method:?}");
            assert_eq!(sched.activations(on), Ok(4), "{method:?}");
        }
    }

    #[test]
    fn test_set_rate() {
        let mut a = idle;
        let mut sched = Scheduler::new(SchedMethod::Rate);
        let a = sched.register(&mut a, 0).unwrap();
        sched.set_rate(a, 7).unwrap();
        sched.run_pass(0);
        assert_eq!(sched.activations(a), Ok(0));
        assert_eq!(sched.rate(a), Ok(7));
        assert_eq!(
            sched.set_rate(TaskHandle(3), 0),
            Err(KernelError::InvalidHandle)
        );
    }

    #[test]
    fn test_task_requests_own_rate() {
        let mut throttle = |cx: &mut TaskContext| {
            cx.set_rate(RATE_DISABLE_THRESHOLD);
            Step::Yield(Yield::Now)
        };
        let mut sched = Scheduler::new(SchedMethod::RoundRobin);
        let h = sched.register(&mut throttle, 0).unwrap();
        sched.run_pass(0);
        sched.run_pass(0);
        assert_eq!(sched.activations(h), Ok(1));
        assert_eq!(sched.rate(h), Ok(RATE_DISABLE_THRESHOLD));
    }

    #[test]
    fn test_states_and_exit() {
        let mut sleeper = |_: &mut TaskContext| Step::Yield(Yield::Timed);
        let mut quitter = |_: &mut TaskContext| Step::Exit;
        let mut sched = Scheduler::new(SchedMethod::RoundRobin);
        let s = sched.register(&mut sleeper, 0).unwrap();
        let q = sched.register(&mut quitter, 0).unwrap();

        assert_eq!(sched.state(s), Ok(TaskState::Ready));
        for _ in 0..3 {
            sched.run_pass(0);
        }
        assert_eq!(sched.state(s), Ok(TaskState::Sleeping));
        assert_eq!(sched.state(q), Ok(TaskState::Terminated));
        assert_eq!(sched.activations(q), Ok(1));
        assert_eq!(sched.activations(s), Ok(3));
    }

    #[test]
    fn test_context_carries_time_and_pass() {
        let seen = RefCell::new(Vec::new());
        let mut observer = |cx: &mut TaskContext| {
            seen.borrow_mut().push((cx.now_ms(), cx.pass()));
            Step::Yield(Yield::Now)
        };
        let mut sched = Scheduler::new(SchedMethod::RoundRobin);
        sched.register(&mut observer, 0).unwrap();
        sched.run_pass(10);
        sched.run_pass(25);
        drop(sched);
        assert_eq!(*seen.borrow(), [(10, 0), (25, 1)]);
    }

    #[test]
    fn test_empty_scheduler() {
        let mut sched = Scheduler::new(SchedMethod::RoundRobin);
        assert_eq!(sched.dispatch_next(0), None);
        assert_eq!(sched.run_pass(0), 0);
        assert_eq!(sched.pass_count(), 1);
    }
}
