//! # Bus Transport
//!
//! Framed word transfers on the shared SPI bus. One transfer is:
//!
//! ```text
//!   wait idle ─► set width ─► CS low ─► write ─► wait idle ─► CS high ─► [read]
//! ```
//!
//! The chip select brackets exactly one word. The trailing read drains the
//! receive register so the next user does not see a stale word.
//!
//! A [`Bus`] can only be obtained by the sample driver (which runs with the
//! interrupt already serialised) and through a [`GateGuard`](crate::gate::GateGuard).

use crate::arch::{BusDevice, Hal, WordWidth};
use crate::frame::BusFrame;

/// Borrowed access to the shared bus.
pub struct Bus<'a, H: Hal + ?Sized> {
    hal: &'a H,
}

impl<'a, H: Hal + ?Sized> Bus<'a, H> {
    pub(crate) const fn new(hal: &'a H) -> Self {
        Self { hal }
    }

    /// Write one word to `device`, discarding what came back.
    ///
    /// With `drain` set the receive register is read after the transfer.
    #[inline(always)]
    pub fn write(&mut self, device: BusDevice, width: WordWidth, word: u16, drain: bool) {
        self.frame(device, width, word);
        if drain {
            let _ = self.hal.read_bus();
        }
    }

    /// Write a DAC frame as one 16-bit word.
    #[inline(always)]
    pub fn write_frame(&mut self, frame: BusFrame, drain: bool) {
        self.write(BusDevice::DAC, WordWidth::Bits16, frame.word(), drain);
    }

    /// Write one word to `device` and return the word clocked in.
    pub fn transfer(&mut self, device: BusDevice, width: WordWidth, word: u16) -> u16 {
        self.frame(device, width, word);
        self.hal.read_bus()
    }

    #[inline(always)]
    fn frame(&mut self, device: BusDevice, width: WordWidth, word: u16) {
        // A previous user may still be shifting out its last word.
        while self.hal.bus_busy() {
            core::hint::spin_loop();
        }
        self.hal.set_word_width(width);
        self.hal.chip_select(device, true);
        self.hal.write_bus(word);
        while self.hal.bus_busy() {
            core::hint::spin_loop();
        }
        self.hal.chip_select(device, false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::sim::{SimPort, Transaction};

    #[test]
    fn test_write_frames_one_word() {
        let port = SimPort::new();
        port.set_busy_polls(3);
        let mut bus = Bus::new(&port);
        bus.write(BusDevice::DAC, WordWidth::Bits16, 0x3800, true);

        assert_eq!(
            port.transactions().as_slice(),
            &[Transaction {
                device: Some(BusDevice::DAC),
                width: WordWidth::Bits16,
                word: 0x3800,
            }]
        );
        assert_eq!(port.selected(), None, "chip select released after the word");
        assert!(!port.bus_busy(), "write waits for the bus to go idle");
    }

    #[test]
    fn test_transfer_returns_response() {
        let port = SimPort::new();
        port.push_response(0x5A).unwrap();
        let mut bus = Bus::new(&port);
        let rx = bus.transfer(BusDevice::EXPANDER, WordWidth::Bits8, 0x41);
        assert_eq!(rx, 0x5A);
        assert_eq!(port.word_width(), WordWidth::Bits8);
    }

    #[test]
    fn test_drain_consumes_response() {
        let port = SimPort::new();
        port.push_response(0x77).unwrap();
        let mut bus = Bus::new(&port);
        bus.write(BusDevice::DAC, WordWidth::Bits16, 0, true);
        assert_eq!(port.read_bus(), 0, "stale word already drained");
    }
}
