//! Typed writes batched in front of a raw [Destination].

use crate::{Buffer, BufferPool, Destination, Error};

/// Batches typed writes into one pool-borrowed working buffer.
///
/// Bytes accumulate in the working buffer and move downstream only when it
/// fills or on an explicit [Destination::flush]. A typed value wider than
/// the free space splits into two half-width writes, high half first, so
/// the top half can land before a flush and the bottom half after without
/// disturbing the wire byte order.
///
/// [Destination::close] forwards the cause without flushing; callers flush
/// explicitly before closing if they want the tail delivered.
pub struct BufferedDestination<D> {
    destination: D,
    working: Buffer,
}

impl<D: Destination> BufferedDestination<D> {
    /// Wraps a raw destination with a working buffer borrowed from `pool`.
    pub fn new(destination: D, pool: &BufferPool) -> Self {
        Self {
            destination,
            working: pool.borrow(),
        }
    }

    /// Returns the wrapped destination, dropping any unflushed bytes.
    pub fn into_inner(self) -> D {
        self.destination
    }

    /// Writes one byte, flushing first if the working buffer is full.
    pub async fn write_u8(&mut self, value: u8) -> Result<(), Error> {
        self.check_open()?;
        if self.working.is_full() {
            self.drain_working().await?;
        }
        self.working.write_u8(value);
        self.flush_if_full().await
    }

    /// Writes a big-endian `u16`, splitting into bytes when it does not fit.
    pub async fn write_u16(&mut self, value: u16) -> Result<(), Error> {
        self.check_open()?;
        if self.working.available_for_write() >= 2 {
            self.working.write_u16(value);
            return self.flush_if_full().await;
        }
        let [high, low] = value.to_be_bytes();
        self.write_u8(high).await?;
        self.write_u8(low).await
    }

    /// Writes a big-endian `u32`, splitting into halves when it does not
    /// fit.
    pub async fn write_u32(&mut self, value: u32) -> Result<(), Error> {
        self.check_open()?;
        if self.working.available_for_write() >= 4 {
            self.working.write_u32(value);
            return self.flush_if_full().await;
        }
        self.write_u16((value >> 16) as u16).await?;
        self.write_u16(value as u16).await
    }

    /// Writes a big-endian `u64`, splitting into halves when it does not
    /// fit.
    pub async fn write_u64(&mut self, value: u64) -> Result<(), Error> {
        self.check_open()?;
        if self.working.available_for_write() >= 8 {
            self.working.write_u64(value);
            return self.flush_if_full().await;
        }
        self.write_u32((value >> 32) as u32).await?;
        self.write_u32(value as u32).await
    }

    /// Writes an `i8`.
    pub async fn write_i8(&mut self, value: i8) -> Result<(), Error> {
        self.write_u8(value as u8).await
    }

    /// Writes a big-endian `i16`.
    pub async fn write_i16(&mut self, value: i16) -> Result<(), Error> {
        self.write_u16(value as u16).await
    }

    /// Writes a big-endian `i32`.
    pub async fn write_i32(&mut self, value: i32) -> Result<(), Error> {
        self.write_u32(value as u32).await
    }

    /// Writes a big-endian `i64`.
    pub async fn write_i64(&mut self, value: i64) -> Result<(), Error> {
        self.write_u64(value as u64).await
    }

    /// Writes an `f32` as its big-endian bit pattern.
    pub async fn write_f32(&mut self, value: f32) -> Result<(), Error> {
        self.write_u32(value.to_bits()).await
    }

    /// Writes an `f64` as its big-endian bit pattern.
    pub async fn write_f64(&mut self, value: f64) -> Result<(), Error> {
        self.write_u64(value.to_bits()).await
    }

    /// Writes a `bool` as one byte.
    pub async fn write_bool(&mut self, value: bool) -> Result<(), Error> {
        self.write_u8(value as u8).await
    }

    /// Writes all of `src`, flushing as the working buffer fills.
    pub async fn write_slice(&mut self, src: &[u8]) -> Result<(), Error> {
        self.check_open()?;
        let mut remaining = src;
        while !remaining.is_empty() {
            if self.working.is_full() {
                self.drain_working().await?;
            }
            let written = self.working.write_slice(remaining);
            remaining = &remaining[written..];
        }
        self.flush_if_full().await
    }

    fn check_open(&self) -> Result<(), Error> {
        match self.destination.close_cause() {
            Some(cause) => Err(cause.clone()),
            None => Ok(()),
        }
    }

    async fn flush_if_full(&mut self) -> Result<(), Error> {
        if self.working.is_full() {
            self.drain_working().await
        } else {
            Ok(())
        }
    }

    /// Pushes the working buffer fully downstream, then rewinds it.
    async fn drain_working(&mut self) -> Result<(), Error> {
        while self.working.available_for_read() > 0 {
            let written = self.destination.write(&mut self.working)?;
            if written == 0 {
                self.destination.await_free_space().await?;
            }
        }
        self.working.reset();
        Ok(())
    }
}

impl<D: Destination> Destination for BufferedDestination<D> {
    fn close_cause(&self) -> Option<&Error> {
        self.destination.close_cause()
    }

    /// Copies into the working buffer without ever flushing; a full buffer
    /// yields a partial (possibly zero) count.
    fn write(&mut self, buf: &mut Buffer) -> Result<usize, Error> {
        self.check_open()?;
        Ok(self.working.write_buffer(buf))
    }

    async fn await_free_space(&mut self) -> Result<(), Error> {
        self.check_open()?;
        self.flush_if_full().await
    }

    async fn flush(&mut self) -> Result<(), Error> {
        self.check_open()?;
        self.drain_working().await?;
        self.destination.flush().await
    }

    fn close(&mut self, cause: Option<Error>) {
        self.destination.close(cause);
    }
}
