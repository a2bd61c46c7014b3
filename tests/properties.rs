//! Property-based tests for the phase accumulator, bus frame, scheduler and gate.
//! Each property is checked over generated inputs rather than fixed examples.

use ddsos::arch::sim::SimPort;
use ddsos::arch::{BusDevice, Hal, WordWidth};
use ddsos::channel::ParameterChannel;
use ddsos::config::{MAX_TASKS, RATE_DISABLE_THRESHOLD};
use ddsos::dds::{increment_for, resolution_hz, Dds};
use ddsos::frame::{BusFrame, DacChannel, FrameHeader, Gain, Power, DATA_MASK};
use ddsos::gate::BusGate;
use ddsos::scheduler::{SchedMethod, Scheduler};
use ddsos::task::{Step, Task, TaskContext, Yield};
use ddsos::wavetable::WaveformTable;
use ddsos::KernelError;
use proptest::prelude::*;

const RATE: u32 = 100_000;

struct Idle;

impl Task for Idle {
    fn resume(&mut self, _: &mut TaskContext) -> Step {
        Step::Yield(Yield::Now)
    }
}

#[derive(Default)]
struct PassRecorder {
    passes: Vec<u32>,
}

impl Task for PassRecorder {
    fn resume(&mut self, cx: &mut TaskContext) -> Step {
        self.passes.push(cx.pass());
        Step::Yield(Yield::Now)
    }
}

fn any_header() -> impl Strategy<Value = FrameHeader> {
    (any::<bool>(), any::<bool>(), any::<bool>()).prop_map(|(b, x2, off)| FrameHeader {
        channel: if b { DacChannel::B } else { DacChannel::A },
        gain: if x2 { Gain::X2 } else { Gain::X1 },
        power: if off { Power::Shutdown } else { Power::Active },
    })
}

proptest! {
    /// The accumulator is always `n * increment mod 2^32` and the sample is
    /// the table entry its top bits select.
    #[test]
    fn phase_wraps_modulo_2_32(increment in any::<u32>(), steps in 1u32..2_000) {
        let table = WaveformTable::<256>::sine(2047);
        let mut dds = Dds::new(table.clone());
        dds.set_increment(increment);
        let mut sample = 0;
        for _ in 0..steps {
            sample = dds.advance();
        }
        let expected = increment.wrapping_mul(steps);
        prop_assert_eq!(dds.accumulator(), expected);
        prop_assert_eq!(sample, table.get((expected >> 24) as usize));
    }

    /// A power-of-two increment returns to the starting phase after exactly
    /// `2^32 / increment` steps.
    #[test]
    fn power_of_two_increment_closes_cycle(k in 20u32..32) {
        let mut dds = Dds::new(WaveformTable::<64>::sine(100));
        dds.set_increment(1 << k);
        let period = 1u32 << (32 - k);
        for step in 1..=period {
            dds.advance();
            if step < period {
                prop_assert_ne!(dds.accumulator(), 0);
            }
        }
        prop_assert_eq!(dds.accumulator(), 0);
    }

    /// A higher frequency below Nyquist maps to a strictly larger increment.
    #[test]
    fn increment_is_monotonic(hz in 1.0f64..49_000.0, delta in 0.01f64..1_000.0) {
        let higher = hz + delta;
        prop_assume!(higher < f64::from(RATE / 2));
        let low = increment_for(hz, RATE).unwrap();
        let high = increment_for(higher, RATE).unwrap();
        prop_assert!(low < high, "{} Hz -> {}, {} Hz -> {}", hz, low, higher, high);
    }

    /// Neighbouring `f32` frequencies stored through the channel never go
    /// backwards, and differ once the gap exceeds the accumulator resolution.
    #[test]
    fn adjacent_f32_frequencies_ordered(hz in 1.0f32..49_000.0) {
        let next = f32::from_bits(hz.to_bits() + 1);
        let channel = ParameterChannel::new(RATE, 0);
        let low = channel.set_frequency(hz).unwrap();
        let high = channel.set_frequency(next).unwrap();
        prop_assert_eq!(channel.increment(), high);
        prop_assert!(low <= high, "{} Hz -> {}, {} Hz -> {}", hz, low, next, high);
        if f64::from(next) - f64::from(hz) > f64::from(resolution_hz(RATE)) {
            prop_assert!(low < high, "{} Hz and {} Hz share increment {}", hz, next, low);
        }
    }

    /// Data never reaches the header bits, whatever its magnitude.
    #[test]
    fn frame_data_is_masked(header in any_header(), data in any::<u16>()) {
        let frame = header.frame(data);
        let word = frame.word();
        prop_assert_eq!(word & !DATA_MASK, header.bits());
        prop_assert_eq!(word & DATA_MASK, data & DATA_MASK);
        prop_assert_eq!(BusFrame::decode(word).header(), header);
    }

    /// Signed samples always land inside the 12-bit range.
    #[test]
    fn frame_sample_in_range(header in any_header(), sample in any::<i16>()) {
        let frame = header.frame_sample(sample);
        prop_assert!(frame.data() <= DATA_MASK);
        prop_assert_eq!(frame.word() & !DATA_MASK, header.bits());
    }

    /// With N enabled tasks, any N consecutive dispatch slots resume each once.
    #[test]
    fn round_robin_is_fair(n in 1usize..=MAX_TASKS, offset in 0usize..64) {
        let mut tasks: Vec<Idle> = (0..n).map(|_| Idle).collect();
        let mut sched = Scheduler::new(SchedMethod::RoundRobin);
        let handles: Vec<_> = tasks
            .iter_mut()
            .map(|t| sched.register(t, 0).unwrap())
            .collect();

        for _ in 0..offset {
            sched.dispatch_next(0);
        }
        let before: Vec<u32> = handles.iter().map(|&h| sched.activations(h).unwrap()).collect();
        for _ in 0..n {
            sched.dispatch_next(0);
        }
        for (i, &h) in handles.iter().enumerate() {
            prop_assert_eq!(sched.activations(h).unwrap() - before[i], 1, "task {}", i);
        }
    }

    /// A task with divisor k runs only on passes divisible by 2^k, and
    /// exactly once in any 2^k consecutive passes.
    #[test]
    fn rate_divisor_skips_passes(k in 0u8..RATE_DISABLE_THRESHOLD, start in 0u32..40) {
        let mut filler = Idle;
        let mut recorder = PassRecorder::default();
        let window = 1u32 << k;
        {
            let mut sched = Scheduler::new(SchedMethod::Rate);
            sched.register(&mut filler, 0).unwrap();
            sched.register(&mut recorder, k).unwrap();
            for _ in 0..start + window {
                sched.run_pass(0);
            }
        }
        prop_assert!(recorder.passes.iter().all(|p| p % window == 0));
        let in_window = recorder
            .passes
            .iter()
            .filter(|&&p| p >= start && p < start + window)
            .count();
        prop_assert_eq!(in_window, 1);
    }

    /// Any sequence of acquire/release, with or without bus traffic and early
    /// exits, leaves the interrupt unmasked and every mask paired.
    #[test]
    fn gate_always_rearms(ops in proptest::collection::vec(0u8..4, 1..32)) {
        let port = SimPort::new();
        let gate = BusGate::new(&port);

        fn bail_early(gate: &BusGate<'_, SimPort>) -> Result<(), KernelError> {
            let mut bus = gate.acquire()?;
            bus.write(BusDevice::EXPANDER, WordWidth::Bits8, 0x01, true);
            Err(KernelError::MalformedInput)
        }

        for op in ops {
            match op {
                0 => gate.acquire().unwrap().release(),
                1 => {
                    let mut bus = gate.acquire().unwrap();
                    bus.write(BusDevice::EXPANDER, WordWidth::Bits8, 0xA5, true);
                }
                2 => {
                    let _ = bail_early(&gate);
                }
                _ => {
                    let held = gate.acquire().unwrap();
                    prop_assert!(matches!(gate.acquire(), Err(KernelError::GateHeld)));
                    drop(held);
                }
            }
            prop_assert!(!port.interrupt_masked());
            prop_assert_eq!(port.mask_count(), port.unmask_count());
        }
    }
}
