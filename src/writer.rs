//! Buffered, escaping sink writer

use embedded_io::Write;

use crate::config::OUTPUT_BUFFER_SIZE;

const HEX: &[u8; 16] = b"0123456789ABCDEF";

/// Write buffer with flush-on-full semantics.
///
/// Every flush hands the whole buffer to the sink with `write_all` and then
/// asks the sink to `flush`, so data is durable as soon as it leaves here.
pub struct BufferedWriter<W, const N: usize = OUTPUT_BUFFER_SIZE> {
    sink: W,
    buf: [u8; N],
    pos: usize,
}

impl<W: Write, const N: usize> BufferedWriter<W, N> {
    pub const fn new(sink: W) -> Self {
        const { assert!(N > 0) };
        Self {
            sink,
            buf: [0u8; N],
            pos: 0,
        }
    }

    /// Returns number of free bytes in buffer
    pub fn remaining(&self) -> usize {
        N - self.pos
    }

    /// Get buffered data as slice
    pub fn as_slice(&self) -> &[u8] {
        &self.buf[..self.pos]
    }

    /// Check if buffer has data
    pub fn has_data(&self) -> bool {
        self.pos > 0
    }

    pub fn sink(&self) -> &W {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut W {
        &mut self.sink
    }

    /// Copies `bytes` in, flushing each time the buffer fills up.
    ///
    /// A sink error does not stop the copy; the first error is returned
    /// once all of `bytes` has been consumed.
    pub fn write(&mut self, mut bytes: &[u8]) -> Result<(), W::Error> {
        let mut result = Ok(());
        while !bytes.is_empty() {
            let n = bytes.len().min(self.remaining());
            self.buf[self.pos..self.pos + n].copy_from_slice(&bytes[..n]);
            self.pos += n;
            bytes = &bytes[n..];

            if self.pos == N {
                result = result.and(self.flush());
            }
        }
        result
    }

    /// Like [`write`](Self::write), but makes control bytes printable:
    /// `\t`, `\n` and `\r` become two-character escapes and every other
    /// byte below 0x20 becomes `<0xHH>`.
    pub fn write_escaped(&mut self, mut bytes: &[u8]) -> Result<(), W::Error> {
        let mut result = Ok(());
        while !bytes.is_empty() {
            let plain = bytes.iter().position(|&b| b < 0x20).unwrap_or(bytes.len());
            result = result.and(self.write(&bytes[..plain]));
            bytes = &bytes[plain..];

            if let Some((&control, rest)) = bytes.split_first() {
                result = result.and(self.write_control(control));
                bytes = rest;
            }
        }
        result
    }

    pub fn newline(&mut self) -> Result<(), W::Error> {
        self.write(b"\n")
    }

    /// Pushes buffered bytes to the sink. No-op when empty.
    ///
    /// The buffer is emptied even if the sink fails, so a broken sink
    /// loses that batch instead of having it resent forever.
    pub fn flush(&mut self) -> Result<(), W::Error> {
        if self.pos == 0 {
            return Ok(());
        }
        let len = core::mem::take(&mut self.pos);
        self.sink.write_all(&self.buf[..len])?;
        self.sink.flush()
    }

    fn write_control(&mut self, byte: u8) -> Result<(), W::Error> {
        match byte {
            b'\t' => self.write(b"\\t"),
            b'\n' => self.write(b"\\n"),
            b'\r' => self.write(b"\\r"),
            _ => self.write(&[
                b'<',
                b'0',
                b'x',
                HEX[usize::from(byte >> 4)],
                HEX[usize::from(byte & 0x0F)],
                b'>',
            ]),
        }
    }
}
