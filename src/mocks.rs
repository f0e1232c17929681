//! In-memory endpoint pair for tests and examples.
//!
//! [Channel::init] links a [Destination] and a [Source] through a bounded
//! channel of [Buffer] messages: writes copy into pool-borrowed message
//! buffers, a full channel exerts backpressure, and closing the writer ends
//! the reader's stream after it drains.

use crate::{Buffer, BufferPool, Error};
use futures::{channel::mpsc, future::poll_fn, StreamExt as _};
use tracing::debug;

/// An in-memory byte channel.
pub struct Channel;

impl Channel {
    /// Creates a linked endpoint pair over a channel holding up to
    /// `capacity` in-flight buffers, each sized by `pool`.
    pub fn init(pool: BufferPool, capacity: usize) -> (Destination, Source) {
        let (sender, receiver) = mpsc::channel(capacity);
        (
            Destination {
                sender,
                pool,
                cause: None,
            },
            Source {
                receiver,
                current: None,
                cause: None,
            },
        )
    }
}

/// Implementation of [crate::Destination] feeding a [Channel].
pub struct Destination {
    sender: mpsc::Sender<Buffer>,
    pool: BufferPool,
    cause: Option<Error>,
}

impl Destination {
    fn record(&mut self, cause: Error) -> Error {
        self.cause.get_or_insert(cause).clone()
    }

    #[cfg(test)]
    fn send_raw(&mut self, buffer: Buffer) {
        self.sender.try_send(buffer).unwrap();
    }
}

impl crate::Destination for Destination {
    fn close_cause(&self) -> Option<&Error> {
        self.cause.as_ref()
    }

    fn write(&mut self, buf: &mut Buffer) -> Result<usize, Error> {
        if let Some(cause) = &self.cause {
            return Err(cause.clone());
        }
        if buf.available_for_read() == 0 {
            return Ok(0);
        }

        let mut message = self.pool.borrow();
        let count = message.write_buffer(buf);
        match self.sender.try_send(message) {
            Ok(()) => Ok(count),
            Err(full) if full.is_full() => {
                // Nothing left: hand the bytes back to the caller.
                buf.set_read_index(buf.read_index() - count);
                Ok(0)
            }
            Err(_) => {
                buf.set_read_index(buf.read_index() - count);
                Err(self.record(Error::Closed))
            }
        }
    }

    async fn await_free_space(&mut self) -> Result<(), Error> {
        if let Some(cause) = &self.cause {
            return Err(cause.clone());
        }
        let sender = &mut self.sender;
        let ready = poll_fn(|cx| sender.poll_ready(cx)).await;
        match ready {
            Ok(()) => Ok(()),
            Err(_) => Err(self.record(Error::Closed)),
        }
    }

    async fn flush(&mut self) -> Result<(), Error> {
        // Messages are handed over on send; nothing is held back here.
        match &self.cause {
            Some(cause) => Err(cause.clone()),
            None => Ok(()),
        }
    }

    fn close(&mut self, cause: Option<Error>) {
        if self.cause.is_some() {
            return;
        }
        let cause = cause.unwrap_or(Error::Closed);
        debug!(?cause, "destination closed");
        self.cause = Some(cause);
        self.sender.close_channel();
    }
}

/// Implementation of [crate::Source] draining a [Channel].
pub struct Source {
    receiver: mpsc::Receiver<Buffer>,
    current: Option<Buffer>,
    cause: Option<Error>,
}

impl Source {
    fn current_has_content(&self) -> bool {
        self.current
            .as_ref()
            .is_some_and(|buffer| buffer.available_for_read() > 0)
    }
}

impl crate::Source for Source {
    fn cancel_cause(&self) -> Option<&Error> {
        self.cause.as_ref()
    }

    fn read(&mut self) -> Result<Option<&mut Buffer>, Error> {
        if let Some(cause) = &self.cause {
            return Err(cause.clone());
        }
        loop {
            if self.current_has_content() {
                return Ok(self.current.as_mut());
            }
            // Exhausted or absent: pull the next message if one is ready,
            // skipping any with nothing to read.
            match self.receiver.try_next() {
                Ok(Some(next)) => self.current = Some(next),
                Ok(None) | Err(_) => {
                    self.current = None;
                    return Ok(None);
                }
            }
        }
    }

    async fn await_content(&mut self) -> Result<bool, Error> {
        if let Some(cause) = &self.cause {
            return Err(cause.clone());
        }
        loop {
            if self.current_has_content() {
                return Ok(true);
            }
            match self.receiver.next().await {
                Some(next) => self.current = Some(next),
                None => {
                    self.current = None;
                    return Ok(false);
                }
            }
        }
    }

    fn cancel(&mut self, cause: Option<Error>) {
        if self.cause.is_some() {
            return;
        }
        let cause = cause.unwrap_or(Error::Cancelled);
        debug!(?cause, "source cancelled");
        self.cause = Some(cause);
        self.current = None;
        self.receiver.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BufferPoolConfig, Destination as _, Source as _};
    use futures::{executor::block_on, FutureExt as _};

    fn pool(buffer_size: usize) -> BufferPool {
        BufferPool::new(BufferPoolConfig {
            buffer_size,
            capacity: 8,
            ..BufferPoolConfig::default()
        })
    }

    #[test]
    fn test_round_trip() {
        let (mut destination, mut source) = Channel::init(pool(8), 4);

        let mut payload = Buffer::from_slice(&[1, 2, 3]);
        assert_eq!(destination.write(&mut payload).unwrap(), 3);

        let buffer = source.read().unwrap().expect("message expected");
        assert_eq!(buffer.available_for_read(), 3);
        assert_eq!(buffer.read_u8(), 1);
        assert_eq!(buffer.read_u16(), 0x0203);
    }

    #[test]
    fn test_writes_are_bounded_by_message_size() {
        let (mut destination, mut source) = Channel::init(pool(2), 8);

        let mut payload = Buffer::from_slice(&[1, 2, 3, 4, 5]);
        assert_eq!(destination.write(&mut payload).unwrap(), 2);
        assert_eq!(destination.write(&mut payload).unwrap(), 2);
        assert_eq!(destination.write(&mut payload).unwrap(), 1);

        let mut received = Vec::new();
        while let Some(buffer) = source.read().unwrap() {
            let mut chunk = [0u8; 2];
            let count = buffer.read_slice(&mut chunk);
            received.extend_from_slice(&chunk[..count]);
        }
        assert_eq!(received, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_full_channel_rewinds_and_reports_zero() {
        let (mut destination, mut source) = Channel::init(pool(4), 0);

        let mut payload = Buffer::from_slice(&[1, 2, 3, 4, 5, 6]);
        assert_eq!(destination.write(&mut payload).unwrap(), 4);

        // The single in-flight slot is taken: no progress, no bytes lost.
        assert_eq!(destination.write(&mut payload).unwrap(), 0);
        assert_eq!(payload.available_for_read(), 2);

        // Free space only appears after the reader drains.
        assert!(destination.await_free_space().now_or_never().is_none());

        let buffer = source.read().unwrap().expect("message expected");
        let mut sink = [0u8; 4];
        buffer.read_slice(&mut sink);
        assert!(source.read().unwrap().is_none());

        block_on(destination.await_free_space()).unwrap();
        assert_eq!(destination.write(&mut payload).unwrap(), 2);
    }

    #[test]
    fn test_close_delivers_end_of_stream_after_drain() {
        let (mut destination, mut source) = Channel::init(pool(8), 4);

        let mut payload = Buffer::from_slice(&[7, 8]);
        destination.write(&mut payload).unwrap();
        destination.close(None);

        assert!(matches!(
            destination.write(&mut Buffer::from_slice(&[9])),
            Err(Error::Closed)
        ));
        assert!(matches!(destination.close_cause(), Some(Error::Closed)));

        assert!(block_on(source.await_content()).unwrap());
        let buffer = source.read().unwrap().expect("message expected");
        assert_eq!(buffer.read_u16(), 0x0708);
        assert!(!block_on(source.await_content()).unwrap());
    }

    #[test]
    fn test_dropped_source_closes_destination() {
        let (mut destination, source) = Channel::init(pool(8), 4);
        drop(source);

        let mut payload = Buffer::from_slice(&[1]);
        assert!(matches!(
            destination.write(&mut payload),
            Err(Error::Closed)
        ));
        // The failed transfer did not consume anything.
        assert_eq!(payload.available_for_read(), 1);
    }

    #[test]
    fn test_cancel_reraises_first_cause() {
        let (_destination, mut source) = Channel::init(pool(8), 4);

        source.cancel(None);
        source.cancel(Some(Error::UnexpectedEof));

        assert!(matches!(source.read(), Err(Error::Cancelled)));
        assert!(matches!(
            block_on(source.await_content()),
            Err(Error::Cancelled)
        ));
    }

    #[test]
    fn test_empty_messages_are_skipped() {
        let (mut destination, mut source) = Channel::init(pool(8), 4);

        destination.send_raw(Buffer::with_capacity(8));
        destination.write(&mut Buffer::from_slice(&[5])).unwrap();

        let buffer = source.read().unwrap().expect("message expected");
        assert_eq!(buffer.read_u8(), 5);
    }
}
