//! # Host Simulation Port
//!
//! A [`Hal`] implementation with no hardware behind it. It records every bus
//! word together with the chip-select and word width active at the time,
//! tracks the interrupt mask, and counts ticks that would have been lost
//! while masked. Tests and benches drive the kernel against it.
//!
//! Interior mutability only (`Cell`/`RefCell`), so it is not `Sync` and is
//! meant to live on the test's stack.

use core::cell::{Cell, RefCell};

use heapless::Deque;

use super::{BusDevice, Hal, WordWidth};
use crate::config::SYSTEM_CLOCK_HZ;

/// Number of transactions kept in the log. Older entries are discarded.
pub const LOG_DEPTH: usize = 64;

/// One word seen on the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transaction {
    /// Chip-select asserted during the write, `None` if no device was selected.
    pub device: Option<BusDevice>,
    /// Word width configured at the time of the write.
    pub width: WordWidth,
    /// The word as written.
    pub word: u16,
}

/// Simulated timer, interrupt controller and SPI peripheral.
pub struct SimPort {
    core_clock_hz: Cell<u32>,
    armed_rate: Cell<Option<u32>>,
    masked: Cell<bool>,
    mask_count: Cell<u32>,
    unmask_count: Cell<u32>,
    pending_cleared: Cell<u32>,
    dropped_ticks: Cell<u32>,
    timer: Cell<u32>,
    width: Cell<WordWidth>,
    selected: Cell<Option<BusDevice>>,
    busy_polls: Cell<u32>,
    busy_remaining: Cell<u32>,
    writes: Cell<u32>,
    unselected_writes: Cell<u32>,
    log: RefCell<Deque<Transaction, LOG_DEPTH>>,
    responses: RefCell<Deque<u16, 16>>,
}

impl SimPort {
    /// Idle port: timer stopped, interrupt unmasked, 8-bit bus, nothing selected.
    pub const fn new() -> Self {
        Self {
            core_clock_hz: Cell::new(SYSTEM_CLOCK_HZ),
            armed_rate: Cell::new(None),
            masked: Cell::new(false),
            mask_count: Cell::new(0),
            unmask_count: Cell::new(0),
            pending_cleared: Cell::new(0),
            dropped_ticks: Cell::new(0),
            timer: Cell::new(0),
            width: Cell::new(WordWidth::Bits8),
            selected: Cell::new(None),
            busy_polls: Cell::new(0),
            busy_remaining: Cell::new(0),
            writes: Cell::new(0),
            unselected_writes: Cell::new(0),
            log: RefCell::new(Deque::new()),
            responses: RefCell::new(Deque::new()),
        }
    }

    /// Pretend the CPU runs at `hz`. Defaults to [`SYSTEM_CLOCK_HZ`].
    pub fn set_core_clock_hz(&self, hz: u32) {
        self.core_clock_hz.set(hz);
    }

    /// Make each written word report busy for `polls` calls of `bus_busy`.
    pub fn set_busy_polls(&self, polls: u32) {
        self.busy_polls.set(polls);
    }

    /// Queue a word for the next `read_bus`. Returns it back if the queue is full.
    pub fn push_response(&self, word: u16) -> Result<(), u16> {
        self.responses.borrow_mut().push_back(word)
    }

    /// Set the value `timer_count` reports.
    pub fn set_timer_count(&self, count: u32) {
        self.timer.set(count);
    }

    /// Simulate the timer firing. Returns `true` if the interrupt would run,
    /// `false` (and counts a dropped tick) when it is masked or not armed.
    pub fn take_tick(&self) -> bool {
        if self.masked.get() || self.armed_rate.get().is_none() {
            self.dropped_ticks.set(self.dropped_ticks.get() + 1);
            return false;
        }
        true
    }

    /// Rate passed to the last `arm_timer`, if any.
    pub fn armed_rate(&self) -> Option<u32> {
        self.armed_rate.get()
    }

    /// Number of `mask_interrupt` calls.
    pub fn mask_count(&self) -> u32 {
        self.mask_count.get()
    }

    /// Number of `unmask_interrupt` calls.
    pub fn unmask_count(&self) -> u32 {
        self.unmask_count.get()
    }

    /// Number of `clear_pending` calls.
    pub fn pending_cleared(&self) -> u32 {
        self.pending_cleared.get()
    }

    /// Ticks lost to masking.
    pub fn dropped_ticks(&self) -> u32 {
        self.dropped_ticks.get()
    }

    /// Currently asserted chip-select.
    pub fn selected(&self) -> Option<BusDevice> {
        self.selected.get()
    }

    /// Current word width.
    pub fn word_width(&self) -> WordWidth {
        self.width.get()
    }

    /// Total words written since creation, including ones dropped from the log.
    pub fn write_count(&self) -> u32 {
        self.writes.get()
    }

    /// Words written with no chip-select asserted.
    pub fn unselected_writes(&self) -> u32 {
        self.unselected_writes.get()
    }

    /// Most recent transaction.
    pub fn last_transaction(&self) -> Option<Transaction> {
        self.log.borrow().back().copied()
    }

    /// Logged transactions, oldest first.
    pub fn transactions(&self) -> heapless::Vec<Transaction, LOG_DEPTH> {
        self.log.borrow().iter().copied().collect()
    }

    /// Drop the logged transactions. Counters are kept.
    pub fn clear_log(&self) {
        self.log.borrow_mut().clear();
    }
}

impl Default for SimPort {
    fn default() -> Self {
        Self::new()
    }
}

impl Hal for SimPort {
    fn core_clock_hz(&self) -> u32 {
        self.core_clock_hz.get()
    }

    fn arm_timer(&self, rate_hz: u32) {
        self.armed_rate.set(Some(rate_hz));
    }

    fn clear_pending(&self) {
        self.pending_cleared.set(self.pending_cleared.get() + 1);
    }

    fn mask_interrupt(&self) {
        self.masked.set(true);
        self.mask_count.set(self.mask_count.get() + 1);
    }

    fn unmask_interrupt(&self) {
        self.masked.set(false);
        self.unmask_count.set(self.unmask_count.get() + 1);
    }

    fn interrupt_masked(&self) -> bool {
        self.masked.get()
    }

    fn timer_count(&self) -> u32 {
        self.timer.get()
    }

    fn set_word_width(&self, width: WordWidth) {
        self.width.set(width);
    }

    fn chip_select(&self, device: BusDevice, asserted: bool) {
        if asserted {
            self.selected.set(Some(device));
        } else if self.selected.get() == Some(device) {
            self.selected.set(None);
        }
    }

    fn write_bus(&self, word: u16) {
        let device = self.selected.get();
        if device.is_none() {
            self.unselected_writes.set(self.unselected_writes.get() + 1);
        }
        self.writes.set(self.writes.get().wrapping_add(1));
        self.busy_remaining.set(self.busy_polls.get());

        let mut log = self.log.borrow_mut();
        if log.is_full() {
            log.pop_front();
        }
        // Cannot fail: one slot was freed above if needed.
        let _ = log.push_back(Transaction {
            device,
            width: self.width.get(),
            word,
        });
    }

    fn bus_busy(&self) -> bool {
        let remaining = self.busy_remaining.get();
        if remaining == 0 {
            return false;
        }
        self.busy_remaining.set(remaining - 1);
        true
    }

    fn read_bus(&self) -> u16 {
        self.responses.borrow_mut().pop_front().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state() {
        let port = SimPort::new();
        assert!(!port.interrupt_masked());
        assert_eq!(port.armed_rate(), None);
        assert_eq!(port.selected(), None);
        assert!(port.transactions().is_empty());
        assert_eq!(port.core_clock_hz(), SYSTEM_CLOCK_HZ);
    }

    #[test]
    fn test_write_records_framing() {
        let port = SimPort::new();
        port.set_word_width(WordWidth::Bits16);
        port.chip_select(BusDevice::DAC, true);
        port.write_bus(0x3ABC);
        port.chip_select(BusDevice::DAC, false);

        assert_eq!(
            port.last_transaction(),
            Some(Transaction {
                device: Some(BusDevice::DAC),
                width: WordWidth::Bits16,
                word: 0x3ABC,
            })
        );
        assert_eq!(port.selected(), None);
        assert_eq!(port.unselected_writes(), 0);
    }

    #[test]
    fn test_unselected_write_is_counted() {
        let port = SimPort::new();
        port.write_bus(0x12);
        assert_eq!(port.unselected_writes(), 1);
        assert_eq!(port.last_transaction().map(|t| t.device), Some(None));
    }

    #[test]
    fn test_log_keeps_newest() {
        let port = SimPort::new();
        for word in 0..(LOG_DEPTH as u16 + 10) {
            port.write_bus(word);
        }
        let log = port.transactions();
        assert_eq!(log.len(), LOG_DEPTH);
        assert_eq!(log[0].word, 10);
        assert_eq!(port.write_count(), LOG_DEPTH as u32 + 10);
    }

    #[test]
    fn test_busy_polls_count_down() {
        let port = SimPort::new();
        port.set_busy_polls(2);
        port.write_bus(1);
        assert!(port.bus_busy());
        assert!(port.bus_busy());
        assert!(!port.bus_busy());
    }

    #[test]
    fn test_masked_ticks_are_dropped() {
        let port = SimPort::new();
        assert!(!port.take_tick(), "timer not armed yet");
        port.arm_timer(100_000);
        assert!(port.take_tick());
        port.mask_interrupt();
        assert!(!port.take_tick());
        port.unmask_interrupt();
        assert!(port.take_tick());
        assert_eq!(port.dropped_ticks(), 2);
    }

    #[test]
    fn test_read_responses_in_order() {
        let port = SimPort::new();
        port.push_response(0xAA).unwrap();
        port.push_response(0x55).unwrap();
        assert_eq!(port.read_bus(), 0xAA);
        assert_eq!(port.read_bus(), 0x55);
        assert_eq!(port.read_bus(), 0);
    }
}
