//! Typed reads over a raw [Source].

use crate::{Buffer, Error, Source};

/// Reads typed values from the buffers a [Source] produces.
///
/// The delegate holds the current buffer; this adapter carries no storage
/// of its own. Each typed read takes a single-buffer fast path when the
/// full width is already available and otherwise composes the value from
/// two half-width reads, high half first, which transparently continues in
/// the next buffer. A stream that ends mid-value fails with
/// [Error::UnexpectedEof].
pub struct BufferedSource<S> {
    source: S,
}

impl<S: Source> BufferedSource<S> {
    /// Wraps a raw source.
    pub fn new(source: S) -> Self {
        Self { source }
    }

    /// Returns the wrapped source.
    pub fn into_inner(self) -> S {
        self.source
    }

    /// Reads one byte, waiting for content as needed.
    pub async fn read_u8(&mut self) -> Result<u8, Error> {
        loop {
            if let Some(buffer) = self.source.read()? {
                return Ok(buffer.read_u8());
            }
            if !self.source.await_content().await? {
                return Err(Error::UnexpectedEof);
            }
        }
    }

    /// Reads a big-endian `u16`, composing across buffers as needed.
    pub async fn read_u16(&mut self) -> Result<u16, Error> {
        if let Some(buffer) = self.current_with(2)? {
            return Ok(buffer.read_u16());
        }
        let high = self.read_u8().await?;
        let low = self.read_u8().await?;
        Ok(u16::from_be_bytes([high, low]))
    }

    /// Reads a big-endian `u32`, composing across buffers as needed.
    pub async fn read_u32(&mut self) -> Result<u32, Error> {
        if let Some(buffer) = self.current_with(4)? {
            return Ok(buffer.read_u32());
        }
        let high = self.read_u16().await?;
        let low = self.read_u16().await?;
        Ok(((high as u32) << 16) | low as u32)
    }

    /// Reads a big-endian `u64`, composing across buffers as needed.
    pub async fn read_u64(&mut self) -> Result<u64, Error> {
        if let Some(buffer) = self.current_with(8)? {
            return Ok(buffer.read_u64());
        }
        let high = self.read_u32().await?;
        let low = self.read_u32().await?;
        Ok(((high as u64) << 32) | low as u64)
    }

    /// Reads an `i8`.
    pub async fn read_i8(&mut self) -> Result<i8, Error> {
        Ok(self.read_u8().await? as i8)
    }

    /// Reads a big-endian `i16`.
    pub async fn read_i16(&mut self) -> Result<i16, Error> {
        Ok(self.read_u16().await? as i16)
    }

    /// Reads a big-endian `i32`.
    pub async fn read_i32(&mut self) -> Result<i32, Error> {
        Ok(self.read_u32().await? as i32)
    }

    /// Reads a big-endian `i64`.
    pub async fn read_i64(&mut self) -> Result<i64, Error> {
        Ok(self.read_u64().await? as i64)
    }

    /// Reads an `f32` stored as its big-endian bit pattern.
    pub async fn read_f32(&mut self) -> Result<f32, Error> {
        Ok(f32::from_bits(self.read_u32().await?))
    }

    /// Reads an `f64` stored as its big-endian bit pattern.
    pub async fn read_f64(&mut self) -> Result<f64, Error> {
        Ok(f64::from_bits(self.read_u64().await?))
    }

    /// Reads a `bool` stored as one byte.
    pub async fn read_bool(&mut self) -> Result<bool, Error> {
        Ok(self.read_u8().await? != 0)
    }

    /// Fills `dst` completely, waiting for content as needed.
    pub async fn read_slice(&mut self, dst: &mut [u8]) -> Result<(), Error> {
        let mut filled = 0;
        while filled < dst.len() {
            if let Some(buffer) = self.source.read()? {
                filled += buffer.read_slice(&mut dst[filled..]);
                continue;
            }
            if !self.source.await_content().await? {
                return Err(Error::UnexpectedEof);
            }
        }
        Ok(())
    }

    /// Returns the current buffer when it already holds at least `width`
    /// readable bytes; `Ok(None)` sends the caller down the composing path.
    fn current_with(&mut self, width: usize) -> Result<Option<&mut Buffer>, Error> {
        match self.source.read()? {
            Some(buffer) if buffer.available_for_read() >= width => Ok(Some(buffer)),
            _ => Ok(None),
        }
    }
}

impl<S: Source> Source for BufferedSource<S> {
    fn cancel_cause(&self) -> Option<&Error> {
        self.source.cancel_cause()
    }

    fn read(&mut self) -> Result<Option<&mut Buffer>, Error> {
        self.source.read()
    }

    async fn await_content(&mut self) -> Result<bool, Error> {
        self.source.await_content().await
    }

    fn cancel(&mut self, cause: Option<Error>) {
        self.source.cancel(cause)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{mocks, BufferPool, BufferPoolConfig, Destination as _};
    use futures::executor::block_on;

    /// An endpoint pair whose messages hold at most `message_size` bytes.
    fn channel(message_size: usize) -> (mocks::Destination, mocks::Source) {
        let pool = BufferPool::new(BufferPoolConfig {
            buffer_size: message_size,
            capacity: 8,
            ..BufferPoolConfig::default()
        });
        mocks::Channel::init(pool, 16)
    }

    /// Pushes `payload` through the channel in message-sized pieces.
    fn feed(destination: &mut mocks::Destination, payload: &[u8]) {
        let mut buffer = Buffer::from_slice(payload);
        while buffer.available_for_read() > 0 {
            assert!(destination.write(&mut buffer).unwrap() > 0);
        }
    }

    #[test]
    fn test_values_compose_across_message_boundaries() {
        // Three-byte messages guarantee every width crosses a boundary.
        let (mut destination, source) = channel(3);
        feed(&mut destination, &[1, 2, 3, 4, 5, 6, 7, 8]);
        destination.close(None);

        let mut source = BufferedSource::new(source);
        assert_eq!(block_on(source.read_u64()).unwrap(), 0x0102030405060708);
    }

    #[test]
    fn test_fast_path_within_one_message() {
        let (mut destination, source) = channel(16);
        feed(&mut destination, &[0xAA, 0xBB, 0xCC, 0xDD]);
        destination.close(None);

        let mut source = BufferedSource::new(source);
        assert_eq!(block_on(source.read_u32()).unwrap(), 0xAABBCCDD);
    }

    #[test]
    fn test_mixed_widths_preserve_order() {
        let (mut destination, source) = channel(2);
        feed(&mut destination, &[0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07]);
        destination.close(None);

        let mut source = BufferedSource::new(source);
        assert_eq!(block_on(source.read_u8()).unwrap(), 0x01);
        assert_eq!(block_on(source.read_u16()).unwrap(), 0x0203);
        assert_eq!(block_on(source.read_u32()).unwrap(), 0x04050607);
    }

    #[test]
    fn test_eof_mid_value() {
        let (mut destination, source) = channel(8);
        feed(&mut destination, &[1, 2, 3]);
        destination.close(None);

        let mut source = BufferedSource::new(source);
        assert!(matches!(
            block_on(source.read_u32()),
            Err(Error::UnexpectedEof)
        ));
    }

    #[test]
    fn test_eof_on_empty_stream() {
        let (mut destination, source) = channel(8);
        destination.close(None);

        let mut source = BufferedSource::new(source);
        assert!(matches!(
            block_on(source.read_u8()),
            Err(Error::UnexpectedEof)
        ));
    }

    #[test]
    fn test_read_slice_reassembles_stream() {
        let payload: Vec<u8> = (0..=63).collect();
        let (mut destination, source) = channel(5);
        feed(&mut destination, &payload);
        destination.close(None);

        let mut source = BufferedSource::new(source);
        let mut out = vec![0u8; payload.len()];
        block_on(source.read_slice(&mut out)).unwrap();
        assert_eq!(out, payload);
    }

    #[test]
    fn test_signed_and_float_round_trip() {
        let mut flat = Buffer::with_capacity(16);
        flat.write_i32(-123456);
        flat.write_f64(2.71828);
        flat.write_bool(true);
        let mut bytes = vec![0u8; flat.available_for_read()];
        flat.read_slice(&mut bytes);

        let (mut destination, source) = channel(3);
        feed(&mut destination, &bytes);
        destination.close(None);

        let mut source = BufferedSource::new(source);
        assert_eq!(block_on(source.read_i32()).unwrap(), -123456);
        assert_eq!(block_on(source.read_f64()).unwrap(), 2.71828);
        assert!(block_on(source.read_bool()).unwrap());
    }

    #[test]
    fn test_cancel_reraises_through_adapter() {
        let (_destination, source) = channel(8);
        let mut source = BufferedSource::new(source);

        source.cancel(None);
        assert!(matches!(block_on(source.read_u8()), Err(Error::Cancelled)));
        assert!(matches!(source.cancel_cause(), Some(Error::Cancelled)));
    }
}
