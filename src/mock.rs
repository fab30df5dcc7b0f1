//! Host-side stand-ins for the UART, the log file and the RTC.

use core::cell::Cell;
use std::collections::VecDeque;
use std::vec::Vec;

use embedded_io::{ErrorKind, ErrorType, Write};

use crate::channel::Source;
use crate::time::{Clock, DateTime};

/// Serial source fed by the test; optionally hands out bytes in limited bursts.
#[derive(Default)]
pub struct MockSource {
    input: VecDeque<u8>,
    burst: Option<usize>,
    overflow: bool,
    pub reads: usize,
}

impl MockSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_input(bytes: &[u8]) -> Self {
        let mut source = Self::new();
        source.push(bytes);
        source
    }

    pub fn push(&mut self, bytes: &[u8]) {
        self.input.extend(bytes);
    }

    /// Caps how many bytes `available` reports per poll.
    pub fn set_burst(&mut self, burst: usize) {
        self.burst = Some(burst);
    }

    /// Simulates a driver-reported receive overrun.
    pub fn overrun(&mut self) {
        self.overflow = true;
    }

    pub fn pending(&self) -> usize {
        self.input.len()
    }
}

impl Source for MockSource {
    fn available(&mut self) -> usize {
        self.burst.map_or(self.input.len(), |burst| burst.min(self.input.len()))
    }

    fn read(&mut self, buf: &mut [u8]) -> usize {
        self.reads += 1;
        let n = buf.len().min(self.input.len());
        for (slot, byte) in buf.iter_mut().zip(self.input.drain(..n)) {
            *slot = byte;
        }
        n
    }

    fn overflowed(&self) -> bool {
        self.overflow
    }

    fn clear_overflow(&mut self) {
        self.overflow = false;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MockError;

impl embedded_io::Error for MockError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Other
    }
}

/// Append-only sink recording every call; `fail` makes writes error out.
#[derive(Default)]
pub struct MockSink {
    pub data: Vec<u8>,
    pub writes: usize,
    pub flushes: usize,
    pub fail: bool,
}

impl MockSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(&self) -> &str {
        std::str::from_utf8(&self.data).unwrap_or("<non-utf8>")
    }
}

impl ErrorType for MockSink {
    type Error = MockError;
}

impl Write for MockSink {
    fn write(&mut self, buf: &[u8]) -> Result<usize, MockError> {
        if self.fail {
            return Err(MockError);
        }
        self.writes += 1;
        self.data.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<(), MockError> {
        if self.fail {
            return Err(MockError);
        }
        self.flushes += 1;
        Ok(())
    }
}

/// Clock frozen at one wall time; uptime only moves when the test says so.
pub struct MockClock {
    now: DateTime,
    uptime_ms: Cell<u64>,
}

impl MockClock {
    pub fn new(now: DateTime) -> Self {
        Self {
            now,
            uptime_ms: Cell::new(0),
        }
    }

    pub fn advance(&self, ms: u64) {
        self.uptime_ms.set(self.uptime_ms.get() + ms);
    }
}

impl Clock for MockClock {
    fn now(&self) -> DateTime {
        self.now
    }

    fn uptime_ms(&self) -> u64 {
        self.uptime_ms.get()
    }
}

/// The wall time every test clock is frozen at.
pub fn test_time() -> DateTime {
    DateTime {
        year: 2024,
        month: 3,
        day: 5,
        weekday: 2,
        hour: 14,
        minute: 7,
        second: 9,
        microsecond: 123,
    }
}

/// `test_time()` as rendered at the start of each line.
pub const STAMP: &str = "2024/03/05\t14:07:09.000123\t";
