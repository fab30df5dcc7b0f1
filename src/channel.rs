//! One UART-to-sink binding: segmentation, stamping and overflow recovery.
//!
//! Every poll drains what the source has, runs the bytes through the
//! terminator detector, and then walks them against the queue of detected
//! terminators. Bytes up to a terminator's offset are written as the end of
//! the current record followed by a `*TERM*` line; anything after the last
//! terminator starts or continues the next record.
//!
//! Sink output, one line per record and per terminator:
//!
//! ```text
//! 2024/03/05	14:07:09.000123	hello\n
//! 2024/03/05	14:07:09.000123	*TERM*
//! ```
//!
//! Offsets rather than byte copies are queued because a terminator can be
//! recognized long before the writer reaches it, and the writer may be
//! several records behind within one receive chunk.

use embedded_io::{Error as _, ErrorKind, Write};
use heapless::{Deque, Vec};

use crate::config::{
    IDLE_FLUSH_MS, MAX_TERMINATOR_LEN, OUTPUT_BUFFER_SIZE, RX_BUFFER_SIZE, STAMP_FORMAT, TERMINATOR_QUEUE_LEN,
    TERM_OVERFLOW_TAG, TERM_TAG, UART_OVERFLOW_TAG,
};
use crate::detector::{TerminatorEvent, Terminators};
use crate::error::Error;
use crate::listener::Tick;
use crate::time::{self, Clock, DateTime};
use crate::writer::BufferedWriter;

/// Non-blocking byte source, usually a UART driver's receive ring.
pub trait Source {
    /// Bytes that can be read right now without blocking.
    fn available(&mut self) -> usize;

    /// Copies up to `buf.len()` bytes and returns how many were copied.
    fn read(&mut self, buf: &mut [u8]) -> usize;

    /// Whether the driver lost bytes since the flag was last cleared.
    fn overflowed(&self) -> bool;

    fn clear_overflow(&mut self);
}

/// What a single poll did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Activity {
    /// This many bytes were read and processed
    Received(usize),
    /// Nothing arrived for longer than the idle timeout; output was flushed
    IdleFlush,
    Idle,
}

pub struct Channel<
    S,
    W,
    const RX: usize = RX_BUFFER_SIZE,
    const OUT: usize = OUTPUT_BUFFER_SIZE,
    const Q: usize = TERMINATOR_QUEUE_LEN,
> {
    source: S,
    writer: BufferedWriter<W, OUT>,
    terminators: Terminators,
    pending: Deque<TerminatorEvent, Q>,
    rx_buf: [u8; RX],
    /// Tail of the stream kept back while a partial match is undecided
    carry: Vec<u8, MAX_TERMINATOR_LEN>,

    bytes_read: u64,
    bytes_written: u64,
    line_started: bool,
    term_overflow: bool,
    last_activity_ms: u64,
}

impl<S, W, const RX: usize, const OUT: usize, const Q: usize> Channel<S, W, RX, OUT, Q>
where
    S: Source,
    W: Write,
{
    /// Binds `source` to `sink`, splitting records on any of `terminators`.
    pub fn new(source: S, sink: W, terminators: &[&[u8]]) -> Result<Self, Error> {
        Ok(Self {
            source,
            writer: BufferedWriter::new(sink),
            terminators: Terminators::new(terminators)?,
            pending: Deque::new(),
            rx_buf: [0u8; RX],
            carry: Vec::new(),
            bytes_read: 0,
            bytes_written: 0,
            line_started: false,
            term_overflow: false,
            last_activity_ms: 0,
        })
    }

    /// Adds a terminator while running. Fails with `MatcherBusy` mid-match.
    pub fn add_terminator(&mut self, pattern: &[u8]) -> Result<(), Error> {
        self.terminators.register(pattern)
    }

    /// Runs one bounded unit of work.
    ///
    /// Pending overflow conditions are recovered first. Then either the
    /// available bytes are read and written out, or, if nothing arrived for
    /// longer than `IDLE_FLUSH_MS`, buffered output is flushed.
    ///
    /// A sink error is returned after the poll has finished its work; the
    /// batch that failed is dropped.
    pub fn poll<C: Clock + ?Sized>(&mut self, clock: &C) -> Result<Activity, W::Error> {
        let mut result = self.recover(clock);

        let available = self.source.available().min(RX);
        let n = if available > 0 {
            self.source.read(&mut self.rx_buf[..available]).min(available)
        } else {
            0
        };

        if n == 0 {
            let now_ms = clock.uptime_ms();
            if now_ms.saturating_sub(self.last_activity_ms) <= IDLE_FLUSH_MS {
                return result.map(|()| Activity::Idle);
            }
            self.last_activity_ms = now_ms;
            if self.writer.has_data() {
                trace!("idle flush of {} bytes", self.writer.as_slice().len());
            }
            return result.and(self.writer.flush()).map(|()| Activity::IdleFlush);
        }

        let now = clock.now();
        self.detect(n, now);
        result = result.and(self.emit(n, now));
        self.last_activity_ms = clock.uptime_ms();

        result.map(|()| Activity::Received(n))
    }

    /// Pushes buffered output to the sink now.
    pub fn flush(&mut self) -> Result<(), W::Error> {
        self.writer.flush()
    }

    fn detect(&mut self, n: usize, now: DateTime) {
        for &byte in &self.rx_buf[..n] {
            let offset = self.bytes_read;
            self.bytes_read += 1;

            if let Some(event) = self.terminators.feed(byte, offset, now) {
                if self.pending.is_full() {
                    // The oldest boundary goes; its record merges into the next.
                    self.pending.pop_front();
                    if !self.term_overflow {
                        warn!("terminator queue full at offset {}", event.offset);
                        self.term_overflow = true;
                    }
                }
                let _ = self.pending.push_back(event);
            }
        }
    }

    /// Writes out the carried bytes and the `n` new ones, except for the
    /// tail the detector has not decided on yet, which is carried again.
    fn emit(&mut self, n: usize, now: DateTime) -> Result<(), W::Error> {
        let carried = core::mem::take(&mut self.carry);
        let total = carried.len() + n;
        let ready = total - self.terminators.held_back().min(MAX_TERMINATOR_LEN).min(total);
        let from_carry = ready.min(carried.len());
        let from_chunk = ready - from_carry;

        let mut result = Ok(());
        for mut chunk in [&carried[..from_carry], &self.rx_buf[..from_chunk]] {
            while !chunk.is_empty() {
                if !self.line_started {
                    result = result.and(self.writer.write(time::format(&now, STAMP_FORMAT).as_bytes()));
                    self.line_started = true;
                }

                let span = self
                    .pending
                    .front()
                    .and_then(|event| usize::try_from(event.offset.saturating_sub(self.bytes_written)).ok())
                    .filter(|&span| span <= chunk.len());

                let Some(span) = span else {
                    result = result.and(self.writer.write_escaped(chunk));
                    self.bytes_written += chunk.len() as u64;
                    break;
                };

                let (record, rest) = chunk.split_at(span);
                result = result.and(self.writer.write_escaped(record));
                result = result.and(self.writer.newline());
                if let Some(event) = self.pending.pop_front() {
                    result = result.and(self.writer.write(time::format(&event.timestamp, STAMP_FORMAT).as_bytes()));
                    result = result.and(self.writer.write(TERM_TAG));
                    result = result.and(self.writer.newline());
                }

                self.bytes_written += span as u64;
                self.line_started = false;
                chunk = rest;
            }
        }

        // At most MAX_TERMINATOR_LEN bytes by construction of `ready`.
        let _ = self.carry.extend_from_slice(&carried[from_carry..]);
        let _ = self.carry.extend_from_slice(&self.rx_buf[from_chunk..n]);
        result
    }

    /// Consumes the overflow flags raised since the last poll.
    fn recover<C: Clock + ?Sized>(&mut self, clock: &C) -> Result<(), W::Error> {
        let mut result = Ok(());

        if self.source.overflowed() {
            self.source.clear_overflow();
            warn!("UART overflow after {} bytes, resetting", self.bytes_read);
            result = result.and(self.restart(UART_OVERFLOW_TAG, clock.now()));
        }

        if self.term_overflow {
            self.term_overflow = false;
            warn!("terminator overflow after {} bytes, resetting", self.bytes_read);
            result = result.and(self.restart(TERM_OVERFLOW_TAG, clock.now()));
        }

        result
    }

    /// Drops all bookkeeping and writes a marker line set off by blank lines.
    /// A record still open is ended first.
    fn restart(&mut self, tag: &[u8], now: DateTime) -> Result<(), W::Error> {
        let mut result = if self.line_started {
            self.writer.newline()
        } else {
            Ok(())
        };

        self.bytes_read = 0;
        self.bytes_written = 0;
        self.pending.clear();
        self.carry.clear();
        self.terminators.reset();
        self.line_started = false;

        result = result.and(self.writer.newline());
        result = result.and(self.writer.write(time::format(&now, STAMP_FORMAT).as_bytes()));
        result = result.and(self.writer.write(tag));
        result = result.and(self.writer.newline());
        result.and(self.writer.newline())
    }

    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Terminators detected but not yet written
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// True once a record's stamp is out and its terminator is not
    pub fn line_started(&self) -> bool {
        self.line_started
    }

    pub fn writer(&self) -> &BufferedWriter<W, OUT> {
        &self.writer
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }
}

impl<S, W, const RX: usize, const OUT: usize, const Q: usize> Tick for Channel<S, W, RX, OUT, Q>
where
    S: Source,
    W: Write,
{
    fn tick(&mut self, clock: &dyn Clock) -> Result<Activity, ErrorKind> {
        self.poll(clock).map_err(|e| e.kind())
    }
}
