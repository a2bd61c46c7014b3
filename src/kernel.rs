//! # Kernel
//!
//! Ties the cooperative side together: the scheduler, the tick clock it reads
//! time from, and the HAL it hands bus gates out of. The sample driver is
//! separate because it runs in interrupt context; the kernel only arms the
//! timer that drives it.
//!
//! ## Startup Sequence
//!
//! ```text
//! reset (cortex-m-rt)
//!   └─► main()
//!         ├─► build SampleDriver, install in IsrShared
//!         ├─► Kernel::new()       ← validate timing budget and rates
//!         ├─► Kernel::register()  ← tasks (×N)
//!         ├─► Kernel::start()     ← arm sample timer
//!         └─► Kernel::run()       ← dispatch forever (no return)
//! ```

use crate::arch::Hal;
use crate::channel::ParameterChannel;
use crate::config::KernelConfig;
use crate::driver::TickClock;
use crate::error::KernelError;
use crate::gate::BusGate;
use crate::scheduler::{Scheduler, TaskHandle};
use crate::task::{Task, TaskState};

/// The cooperative half of the system.
pub struct Kernel<'a, H: Hal + ?Sized> {
    hal: &'a H,
    clock: &'a TickClock,
    params: &'a ParameterChannel,
    config: KernelConfig,
    scheduler: Scheduler<'a>,
}

impl<'a, H: Hal + ?Sized> Kernel<'a, H> {
    /// Build a kernel after checking `config`'s timing budget.
    ///
    /// The tick clock and the parameter channel are shared with the sample
    /// driver, so they are built before the kernel and handed in here. All
    /// three have to agree on the sample rate: the clock turns ticks into
    /// milliseconds and the channel turns hertz into phase increments, and a
    /// mismatch would run both at the wrong speed without any other symptom.
    ///
    /// # Parameters
    /// - `hal`: port the sample timer and bus gate live on.
    /// - `clock`: millisecond clock the sample driver ticks.
    /// - `params`: frequency word the sample driver reads.
    /// - `config`: rates and dispatch method.
    ///
    /// # Returns
    /// - `Ok(kernel)` with an empty task table.
    /// - `Err(KernelError::InvalidSampleRate)` if the rate is unusable or the
    ///   clock or channel was built for a different rate.
    /// - `Err(KernelError::ClockMismatch)` if the port runs at a different
    ///   CPU clock than `config` assumes.
    /// - `Err(KernelError::TimingBudget)` if one bus word does not fit a tick.
    pub fn new(
        hal: &'a H,
        clock: &'a TickClock,
        params: &'a ParameterChannel,
        config: KernelConfig,
    ) -> Result<Self, KernelError> {
        if let Err(e) = config.validate() {
            error!("kernel config rejected: {}", e);
            return Err(e);
        }
        if hal.core_clock_hz() != config.system_clock_hz {
            error!(
                "CPU clock mismatch: config {} Hz, port {} Hz",
                config.system_clock_hz,
                hal.core_clock_hz()
            );
            return Err(KernelError::ClockMismatch {
                configured_hz: config.system_clock_hz,
                port_hz: hal.core_clock_hz(),
            });
        }
        let rate = config.sample_rate_hz;
        if clock.sample_rate_hz() != rate || params.sample_rate_hz() != rate {
            error!(
                "sample rate mismatch: config {} Hz, clock {} Hz, channel {} Hz",
                rate,
                clock.sample_rate_hz(),
                params.sample_rate_hz()
            );
            return Err(KernelError::InvalidSampleRate(rate));
        }
        Ok(Self {
            hal,
            clock,
            params,
            config,
            scheduler: Scheduler::new(config.method),
        })
    }

    /// Register a task with rate divisor `rate`.
    pub fn register(
        &mut self,
        task: &'a mut (dyn Task + 'a),
        rate: u8,
    ) -> Result<TaskHandle, KernelError> {
        self.scheduler.register(task, rate)
    }

    /// Change a task's rate divisor.
    pub fn set_rate(&mut self, handle: TaskHandle, rate: u8) -> Result<(), KernelError> {
        self.scheduler.set_rate(handle, rate)
    }

    /// Gate for tasks that need the shared bus.
    pub fn gate(&self) -> BusGate<'a, H> {
        BusGate::new(self.hal)
    }

    /// Arm the sample timer. The interrupt starts firing immediately.
    pub fn start(&self) {
        info!(
            "starting: {} Hz sample rate, {} tasks, {} of {} cycles per tick",
            self.config.sample_rate_hz,
            self.scheduler.task_count(),
            self.config.transaction_cycles(),
            self.config.tick_cycles()
        );
        self.hal.arm_timer(self.config.sample_rate_hz);
    }

    /// Run one scheduler pass at the current tick-clock time.
    pub fn run_pass(&mut self) -> usize {
        self.scheduler.run_pass(self.clock.now_ms())
    }

    /// Dispatch forever.
    pub fn run(&mut self) -> ! {
        loop {
            self.run_pass();
        }
    }

    /// Millisecond time the scheduler sees.
    pub fn now_ms(&self) -> u32 {
        self.clock.now_ms()
    }

    /// Frequency word shared with the sample driver.
    pub fn params(&self) -> &'a ParameterChannel {
        self.params
    }

    /// Last reported state of a task.
    pub fn task_state(&self, handle: TaskHandle) -> Result<TaskState, KernelError> {
        self.scheduler.state(handle)
    }

    /// The scheduler, for diagnostics.
    pub fn scheduler(&self) -> &Scheduler<'a> {
        &self.scheduler
    }

    /// Validated configuration.
    pub fn config(&self) -> &KernelConfig {
        &self.config
    }
}
