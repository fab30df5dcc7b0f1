//! The poll loop: visits every registered channel, forever.
//!
//! There is one thread and no blocking. Each visit does one bounded unit of
//! work, so a slow sink stalls every channel for the length of that write.

use embedded_io::ErrorKind;
use heapless::Vec;

use crate::channel::Activity;
use crate::config::MAX_CHANNELS;
use crate::error::Error;
use crate::time::Clock;

/// Object-safe face of a [`Channel`](crate::channel::Channel), so channels
/// with different sources, sinks and buffer sizes share one listener.
pub trait Tick {
    fn tick(&mut self, clock: &dyn Clock) -> Result<Activity, ErrorKind>;
}

/// Identifies a channel within its listener, in registration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ChannelHandle(usize);

impl ChannelHandle {
    pub fn index(self) -> usize {
        self.0
    }
}

pub struct Listener<'a, C, const N: usize = MAX_CHANNELS> {
    clock: C,
    channels: Vec<&'a mut dyn Tick, N>,
    sink_errors: u32,
}

impl<'a, C: Clock, const N: usize> Listener<'a, C, N> {
    pub fn new(clock: C) -> Self {
        Self {
            clock,
            channels: Vec::new(),
            sink_errors: 0,
        }
    }

    pub fn add(&mut self, channel: &'a mut dyn Tick) -> Result<ChannelHandle, Error> {
        let handle = ChannelHandle(self.channels.len());
        self.channels.push(channel).map_err(|_| Error::Capacity)?;
        info!("channel {} registered", handle.0);
        Ok(handle)
    }

    /// Visits every channel once, in registration order. Returns the number
    /// of bytes received across all channels.
    pub fn poll_once(&mut self) -> usize {
        let mut received = 0;
        for (index, channel) in self.channels.iter_mut().enumerate() {
            match channel.tick(&self.clock) {
                Ok(Activity::Received(n)) => received += n,
                Ok(Activity::IdleFlush | Activity::Idle) => {}
                Err(_) => {
                    self.sink_errors = self.sink_errors.wrapping_add(1);
                    if self.sink_errors % 100 == 1 {
                        warn!("channel {}: sink error ({} so far)", index, self.sink_errors);
                    }
                }
            }
        }
        received
    }

    /// Polls forever.
    pub fn listen(&mut self) -> ! {
        loop {
            self.poll_once();
        }
    }

    /// Sink errors seen since start
    pub fn sink_errors(&self) -> u32 {
        self.sink_errors
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::Channel;
    use crate::config::IDLE_FLUSH_MS;
    use crate::mock::{test_time, MockClock, MockSink, MockSource, STAMP};

    #[test]
    fn polls_channels_independently() {
        let mut a: Channel<MockSource, MockSink, 32, 128, 4> =
            Channel::new(MockSource::with_input(b"one\n"), MockSink::new(), &[b"\n"]).unwrap();
        let mut b: Channel<MockSource, MockSink, 16, 64, 2> =
            Channel::new(MockSource::with_input(b"two;"), MockSink::new(), &[b";"]).unwrap();

        {
            let mut listener: Listener<'_, MockClock, 2> = Listener::new(MockClock::new(test_time()));
            assert_eq!(listener.add(&mut a).map(ChannelHandle::index), Ok(0));
            assert_eq!(listener.add(&mut b).map(ChannelHandle::index), Ok(1));
            assert_eq!(listener.poll_once(), 8);
            assert_eq!(listener.poll_once(), 0);

            listener.clock().advance(IDLE_FLUSH_MS + 1);
            listener.poll_once();
        }

        assert_eq!(a.writer().sink().text(), format!("{STAMP}one\\n\n{STAMP}*TERM*\n"));
        assert_eq!(b.writer().sink().text(), format!("{STAMP}two;\n{STAMP}*TERM*\n"));
    }

    #[test]
    fn rejects_channels_beyond_capacity() {
        let mut a: Channel<MockSource, MockSink, 8, 8, 1> =
            Channel::new(MockSource::new(), MockSink::new(), &[]).unwrap();
        let mut b: Channel<MockSource, MockSink, 8, 8, 1> =
            Channel::new(MockSource::new(), MockSink::new(), &[]).unwrap();

        let mut listener: Listener<'_, MockClock, 1> = Listener::new(MockClock::new(test_time()));
        listener.add(&mut a).unwrap();
        assert_eq!(listener.add(&mut b), Err(Error::Capacity));
        assert_eq!(listener.len(), 1);
    }

    #[test]
    fn sink_errors_are_counted_not_fatal() {
        let mut failing = MockSink::new();
        failing.fail = true;
        let mut broken: Channel<MockSource, MockSink, 32, 8, 2> =
            Channel::new(MockSource::with_input(b"lost data"), failing, &[]).unwrap();
        let mut healthy: Channel<MockSource, MockSink, 32, 8, 2> =
            Channel::new(MockSource::with_input(b"kept"), MockSink::new(), &[]).unwrap();

        let mut listener: Listener<'_, MockClock> = Listener::new(MockClock::new(test_time()));
        listener.add(&mut broken).unwrap();
        listener.add(&mut healthy).unwrap();

        // Bytes from a channel whose sink failed are not counted.
        assert_eq!(listener.poll_once(), 4);
        assert_eq!(listener.sink_errors(), 1);
        drop(listener);

        assert!(broken.writer().sink().data.is_empty());
        assert!(!healthy.writer().sink().data.is_empty());
    }
}
