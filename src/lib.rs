//! # ddsos: DDS Sample Engine and Cooperative Kernel
//!
//! A fixed-rate Direct Digital Synthesis engine and a cooperative
//! run-to-completion scheduler for small microcontrollers that share one SPI
//! bus between a high-rate DAC and slower peripherals.
//!
//! ## Overview
//!
//! Two execution contexts:
//!
//! - **Sample interrupt**: highest priority, fires every tick, advances the
//!   phase accumulator and writes one framed word to the DAC.
//! - **Cooperative context**: everything else. Tasks are state machines
//!   resumed one dispatch slot at a time; they never preempt each other.
//!
//! They meet in exactly three places: the frequency word
//! ([`channel::ParameterChannel`], an atomic), the millisecond clock
//! ([`driver::TickClock`], atomics) and the bus, which a task may use only
//! while holding the [`gate::BusGate`] that masks the sample interrupt.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │                    Application Tasks                   │
//! │          tasks.rs · FrequencySweep · Listener          │
//! ├────────────────────────────────────────────────────────┤
//! │                 Kernel API (kernel.rs)                 │
//! │       new() · register() · start() · run_pass()        │
//! ├──────────────┬──────────────────┬──────────────────────┤
//! │  Scheduler   │  Parameter Chan. │  Gate / Bus          │
//! │  scheduler.rs│  channel.rs      │  gate.rs · bus.rs    │
//! │  task.rs     │  ─ set_frequency │  ─ acquire()         │
//! │  line.rs     │                  │  ─ write()           │
//! ├──────────────┴──────────┬───────┴──────────────────────┤
//! │  Sample Driver          │  DDS core                    │
//! │  driver.rs · sync.rs    │  dds.rs · wavetable.rs       │
//! │  ─ on_tick()            │  frame.rs                    │
//! ├─────────────────────────┴──────────────────────────────┤
//! │            HAL boundary (arch/mod.rs: Hal)             │
//! │      arch/cortex_m4.rs (target) · arch/sim.rs (host)   │
//! └────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Memory Model
//!
//! - **No heap**: all state is statically sized
//! - **No `alloc`**: `core`, `heapless` and `libm` only
//! - **Fixed-size task table**: `[TaskControlBlock; MAX_TASKS]`
//! - **No task stacks**: state that survives a yield lives in the task struct
//! - **Critical sections**: the `critical-section` crate, single-core impl on
//!   target and the `std` impl in host tests

#![cfg_attr(not(test), no_std)]

#[macro_use]
mod fmt;

pub mod arch;
pub mod bus;
pub mod channel;
pub mod config;
pub mod dds;
pub mod driver;
pub mod error;
pub mod frame;
pub mod gate;
pub mod kernel;
pub mod line;
pub mod scheduler;
pub mod sync;
pub mod task;
pub mod tasks;
pub mod wavetable;

pub use error::{KernelError, Timeout};
