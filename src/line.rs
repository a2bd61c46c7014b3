//! # Line Reader
//!
//! A child operation for tasks that read text from a byte stream, typically a
//! UART receive queue filled by its interrupt. The reader is polled from the
//! owning task's `resume` and finishes on the first of:
//!
//! - the terminator byte (not included in the result),
//! - `max_len` bytes collected,
//! - the timeout, measured from the first poll, which yields [`Timeout`].
//!
//! Non-ASCII bytes are dropped.

use core::task::Poll;

use heapless::String;

use crate::error::Timeout;
use crate::task::{EventWait, WaitOutcome};

/// Something bytes can be pulled from without blocking.
pub trait ByteSource {
    /// Next byte, or `None` if nothing is waiting.
    fn read_byte(&mut self) -> Option<u8>;
}

impl<const N: usize> ByteSource for heapless::spsc::Consumer<'_, u8, N> {
    fn read_byte(&mut self) -> Option<u8> {
        self.dequeue()
    }
}

impl ByteSource for &[u8] {
    fn read_byte(&mut self) -> Option<u8> {
        let (&first, rest) = self.split_first()?;
        *self = rest;
        Some(first)
    }
}

/// When a line is complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LineConfig {
    /// Byte that ends a line, if any.
    pub terminator: Option<u8>,
    /// Byte count that ends a line; `0` means the buffer capacity.
    pub max_len: usize,
    /// Give up this many ms after the first poll, if set.
    pub timeout_ms: Option<u32>,
}

impl LineConfig {
    /// Lines ended by carriage return, no timeout.
    pub const fn enter() -> Self {
        Self {
            terminator: Some(b'\r'),
            max_len: 0,
            timeout_ms: None,
        }
    }

    /// Same settings with a timeout.
    pub const fn with_timeout(mut self, timeout_ms: u32) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    /// Same settings with a byte-count limit.
    pub const fn with_max_len(mut self, max_len: usize) -> Self {
        self.max_len = max_len;
        self
    }
}

impl Default for LineConfig {
    fn default() -> Self {
        Self::enter()
    }
}

/// Accumulates one line of up to `N` bytes.
#[derive(Debug)]
pub struct LineReader<const N: usize> {
    config: LineConfig,
    buf: String<N>,
    wait: EventWait,
}

impl<const N: usize> LineReader<N> {
    /// Reader with the given completion rules.
    pub const fn new(config: LineConfig) -> Self {
        Self {
            config,
            buf: String::new(),
            wait: EventWait::new(),
        }
    }

    /// Pull whatever `src` has and report whether the line is done.
    pub fn poll<S: ByteSource + ?Sized>(
        &mut self,
        src: &mut S,
        now_ms: u32,
    ) -> Poll<Result<String<N>, Timeout>> {
        while let Some(byte) = src.read_byte() {
            if Some(byte) == self.config.terminator {
                return Poll::Ready(Ok(self.finish()));
            }
            if byte.is_ascii() {
                // Cannot overflow: the length check below stops at capacity.
                let _ = self.buf.push(char::from(byte));
            }
            if self.buf.len() >= self.limit() {
                return Poll::Ready(Ok(self.finish()));
            }
        }

        match self.wait.poll(now_ms, false, self.config.timeout_ms) {
            Poll::Ready(WaitOutcome::TimedOut) => {
                debug!("line read timed out after {} bytes", self.buf.len());
                self.finish();
                Poll::Ready(Err(Timeout))
            }
            _ => Poll::Pending,
        }
    }

    /// Bytes collected so far.
    pub fn partial(&self) -> &str {
        &self.buf
    }

    /// Discard any partial line and restart the timeout.
    pub fn reset(&mut self) {
        self.finish();
    }

    fn limit(&self) -> usize {
        if self.config.max_len == 0 || self.config.max_len > N {
            N
        } else {
            self.config.max_len
        }
    }

    fn finish(&mut self) -> String<N> {
        self.wait = EventWait::new();
        core::mem::take(&mut self.buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminated_line() {
        let mut reader: LineReader<16> = LineReader::new(LineConfig::enter());
        let mut src: &[u8] = b"f 440\rnext";
        assert_eq!(reader.poll(&mut src, 0), Poll::Ready(Ok(String::try_from("f 440").unwrap())));
        assert_eq!(src, b"next", "bytes after the terminator stay queued");
    }

    #[test]
    fn test_line_across_polls() {
        let mut reader: LineReader<16> = LineReader::new(LineConfig::enter());
        let mut first: &[u8] = b"12";
        let mut second: &[u8] = b"34\r";
        assert_eq!(reader.poll(&mut first, 0), Poll::Pending);
        assert_eq!(reader.partial(), "12");
        assert_eq!(reader.poll(&mut second, 5), Poll::Ready(Ok(String::try_from("1234").unwrap())));
    }

    #[test]
    fn test_count_terminated() {
        let config = LineConfig {
            terminator: None,
            max_len: 5,
            timeout_ms: None,
        };
        let mut reader: LineReader<16> = LineReader::new(config);
        let mut src: &[u8] = b"abcdefgh";
        assert_eq!(reader.poll(&mut src, 0), Poll::Ready(Ok(String::try_from("abcde").unwrap())));
        assert_eq!(src, b"fgh");
    }

    #[test]
    fn test_capacity_caps_length() {
        let mut reader: LineReader<4> = LineReader::new(LineConfig::enter().with_max_len(100));
        let mut src: &[u8] = b"123456\r";
        assert_eq!(reader.poll(&mut src, 0), Poll::Ready(Ok(String::try_from("1234").unwrap())));
    }

    #[test]
    fn test_timeout_from_first_poll() {
        let mut reader: LineReader<16> = LineReader::new(LineConfig::enter().with_timeout(100));
        let mut empty: &[u8] = b"";
        let mut partial: &[u8] = b"44";
        assert_eq!(reader.poll(&mut empty, 1_000), Poll::Pending);
        assert_eq!(reader.poll(&mut partial, 1_050), Poll::Pending);
        assert_eq!(reader.poll(&mut empty, 1_100), Poll::Ready(Err(Timeout)));
        assert_eq!(reader.partial(), "", "timeout discards the partial line");
        assert_eq!(reader.poll(&mut empty, 1_150), Poll::Pending, "new timeout window");
    }

    #[test]
    fn test_non_ascii_dropped() {
        let mut reader: LineReader<8> = LineReader::new(LineConfig::enter());
        let mut src: &[u8] = &[b'4', 0xFF, b'0', b'\r'];
        assert_eq!(reader.poll(&mut src, 0), Poll::Ready(Ok(String::try_from("40").unwrap())));
    }

    #[test]
    fn test_spsc_consumer_source() {
        let mut queue: heapless::spsc::Queue<u8, 8> = heapless::spsc::Queue::new();
        let (mut producer, mut consumer) = queue.split();
        for &b in b"99\r" {
            producer.enqueue(b).unwrap();
        }
        let mut reader: LineReader<8> = LineReader::new(LineConfig::enter());
        assert_eq!(reader.poll(&mut consumer, 0), Poll::Ready(Ok(String::try_from("99").unwrap())));
    }
}
