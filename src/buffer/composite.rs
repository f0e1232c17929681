//! Logical addressing over a chain of buffer segments.

use super::Buffer;
use std::{cell::Cell, mem};

/// Cached mapping of a logical index to a segment, keyed by the logical
/// offset where that segment's window begins.
#[derive(Clone, Copy)]
struct Cursor {
    segment: usize,
    base: usize,
}

/// An ordered chain of [Buffer] segments addressed as one contiguous range.
///
/// Appended buffers are owned by the composite and their payloads are never
/// copied; logical indices map onto per-segment windows. All but the last
/// segment are sealed: their windows cover exactly the bytes written through
/// them, so the writable tail of the chain always lives in the last segment
/// and two segments can never claim the same logical position.
///
/// The accessor family mirrors [Buffer]: big-endian, absolute `*_at` reads
/// bounds-checked against `write_index` and writes against `capacity`,
/// relative accessors advancing a cursor, bulk operations returning partial
/// counts. Values that straddle a segment boundary are composed byte by
/// byte, high half first, and read back identically to a flat buffer
/// holding the concatenation.
///
/// Sequential access is O(1) amortized: lookups walk from a cached segment
/// position instead of scanning from the front.
pub struct CompositeBuffer {
    segments: Vec<Buffer>,
    read: usize,
    write: usize,
    capacity: usize,
    cursor: Cell<Cursor>,
}

macro_rules! impl_composite_accessors {
    ($ty:ty, $get_at:ident, $put_at:ident, $read:ident, $write:ident) => {
        #[doc = concat!("Reads a big-endian `", stringify!($ty), "` at logical `index` without moving cursors.")]
        ///
        /// # Panics
        ///
        /// Panics if the value does not lie fully inside the readable region.
        pub fn $get_at(&self, index: usize) -> $ty {
            const SIZE: usize = mem::size_of::<$ty>();
            let end = index.checked_add(SIZE).expect("index overflow");
            assert!(
                end <= self.write,
                "read of {SIZE} bytes at {index} exceeds write index {}",
                self.write
            );
            let (segment, offset) = self.locate(index);
            if offset + SIZE <= self.window_len(segment) {
                let buffer = &self.segments[segment];
                return buffer.$get_at(buffer.read_index() + offset);
            }
            // Straddles a segment boundary: compose byte-wise, high half
            // first.
            let mut bytes = [0u8; SIZE];
            for (i, byte) in bytes.iter_mut().enumerate() {
                *byte = self.byte_at(index + i);
            }
            <$ty>::from_be_bytes(bytes)
        }

        #[doc = concat!("Writes a big-endian `", stringify!($ty), "` at logical `index` without moving cursors.")]
        ///
        /// # Panics
        ///
        /// Panics if the value does not lie fully inside the logical range.
        pub fn $put_at(&mut self, index: usize, value: $ty) {
            const SIZE: usize = mem::size_of::<$ty>();
            let end = index.checked_add(SIZE).expect("index overflow");
            assert!(
                end <= self.capacity,
                "write of {SIZE} bytes at {index} exceeds capacity {}",
                self.capacity
            );
            let (segment, offset) = self.locate(index);
            if offset + SIZE <= self.window_len(segment) {
                let buffer = &mut self.segments[segment];
                let position = buffer.read_index() + offset;
                buffer.$put_at(position, value);
                if position + SIZE > buffer.write_index() {
                    buffer.set_write_index(position + SIZE);
                }
                return;
            }
            for (i, byte) in value.to_be_bytes().into_iter().enumerate() {
                self.set_byte_at(index + i, byte);
            }
        }

        #[doc = concat!("Reads a big-endian `", stringify!($ty), "` at the read cursor and advances it.")]
        ///
        /// # Panics
        ///
        /// Panics if fewer readable bytes remain than the value needs.
        pub fn $read(&mut self) -> $ty {
            let value = self.$get_at(self.read);
            self.read += mem::size_of::<$ty>();
            value
        }

        #[doc = concat!("Writes a big-endian `", stringify!($ty), "` at the write cursor and advances it.")]
        ///
        /// # Panics
        ///
        /// Panics if fewer writable bytes remain than the value needs.
        pub fn $write(&mut self, value: $ty) {
            self.$put_at(self.write, value);
            self.write += mem::size_of::<$ty>();
        }
    };
}

impl CompositeBuffer {
    /// Creates a composite with no segments and zero capacity.
    pub fn new() -> Self {
        Self {
            segments: Vec::new(),
            read: 0,
            write: 0,
            capacity: 0,
            cursor: Cell::new(Cursor { segment: 0, base: 0 }),
        }
    }

    /// Returns the logical capacity: the sum of all segment windows.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the logical read cursor.
    #[inline]
    pub fn read_index(&self) -> usize {
        self.read
    }

    /// Returns the logical write cursor.
    #[inline]
    pub fn write_index(&self) -> usize {
        self.write
    }

    /// Returns the number of readable bytes.
    #[inline]
    pub fn available_for_read(&self) -> usize {
        self.write - self.read
    }

    /// Returns the number of writable bytes.
    #[inline]
    pub fn available_for_write(&self) -> usize {
        self.capacity - self.write
    }

    /// Returns `true` if there is nothing left to read.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.read == self.write
    }

    /// Returns the number of owned segments.
    #[inline]
    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    /// Moves the logical read cursor.
    ///
    /// # Panics
    ///
    /// Panics if `index` exceeds the write cursor.
    pub fn set_read_index(&mut self, index: usize) {
        assert!(
            index <= self.write,
            "read index {index} exceeds write index {}",
            self.write
        );
        self.read = index;
    }

    /// Moves the logical write cursor. Raising it exposes bytes whose
    /// contents are unspecified unless previously written.
    ///
    /// # Panics
    ///
    /// Panics if `index` is below the read cursor or beyond capacity.
    pub fn set_write_index(&mut self, index: usize) {
        assert!(
            index >= self.read,
            "write index {index} below read index {}",
            self.read
        );
        assert!(
            index <= self.capacity,
            "write index {index} exceeds capacity {}",
            self.capacity
        );
        self.sync_written(index);
        self.write = index;
    }

    impl_composite_accessors!(u8, get_u8_at, put_u8_at, read_u8, write_u8);
    impl_composite_accessors!(i8, get_i8_at, put_i8_at, read_i8, write_i8);
    impl_composite_accessors!(u16, get_u16_at, put_u16_at, read_u16, write_u16);
    impl_composite_accessors!(i16, get_i16_at, put_i16_at, read_i16, write_i16);
    impl_composite_accessors!(u32, get_u32_at, put_u32_at, read_u32, write_u32);
    impl_composite_accessors!(i32, get_i32_at, put_i32_at, read_i32, write_i32);
    impl_composite_accessors!(u64, get_u64_at, put_u64_at, read_u64, write_u64);
    impl_composite_accessors!(i64, get_i64_at, put_i64_at, read_i64, write_i64);

    /// Reads an `f32` stored as its big-endian bit pattern.
    pub fn get_f32_at(&self, index: usize) -> f32 {
        f32::from_bits(self.get_u32_at(index))
    }

    /// Writes an `f32` as its big-endian bit pattern.
    pub fn put_f32_at(&mut self, index: usize, value: f32) {
        self.put_u32_at(index, value.to_bits());
    }

    /// Reads an `f64` stored as its big-endian bit pattern.
    pub fn get_f64_at(&self, index: usize) -> f64 {
        f64::from_bits(self.get_u64_at(index))
    }

    /// Writes an `f64` as its big-endian bit pattern.
    pub fn put_f64_at(&mut self, index: usize, value: f64) {
        self.put_u64_at(index, value.to_bits());
    }

    /// Reads a `bool` stored as one byte: zero is `false`, anything else
    /// `true`.
    pub fn get_bool_at(&self, index: usize) -> bool {
        self.get_u8_at(index) != 0
    }

    /// Writes a `bool` as one byte.
    pub fn put_bool_at(&mut self, index: usize, value: bool) {
        self.put_u8_at(index, value as u8);
    }

    /// Reads an `f32` at the read cursor and advances it.
    pub fn read_f32(&mut self) -> f32 {
        f32::from_bits(self.read_u32())
    }

    /// Writes an `f32` at the write cursor and advances it.
    pub fn write_f32(&mut self, value: f32) {
        self.write_u32(value.to_bits());
    }

    /// Reads an `f64` at the read cursor and advances it.
    pub fn read_f64(&mut self) -> f64 {
        f64::from_bits(self.read_u64())
    }

    /// Writes an `f64` at the write cursor and advances it.
    pub fn write_f64(&mut self, value: f64) {
        self.write_u64(value.to_bits());
    }

    /// Reads a `bool` at the read cursor and advances it.
    pub fn read_bool(&mut self) -> bool {
        self.read_u8() != 0
    }

    /// Writes a `bool` at the write cursor and advances it.
    pub fn write_bool(&mut self, value: bool) {
        self.write_u8(value as u8);
    }

    /// Copies readable bytes into `dst`, advancing the read cursor. Returns
    /// how many were copied.
    pub fn read_slice(&mut self, dst: &mut [u8]) -> usize {
        let count = dst.len().min(self.available_for_read());
        for (i, byte) in dst[..count].iter_mut().enumerate() {
            *byte = self.byte_at(self.read + i);
        }
        self.read += count;
        count
    }

    /// Copies bytes from `src` into the writable region, advancing the write
    /// cursor. Returns how many were copied.
    pub fn write_slice(&mut self, src: &[u8]) -> usize {
        let count = src.len().min(self.available_for_write());
        for (i, &byte) in src[..count].iter().enumerate() {
            self.set_byte_at(self.write + i, byte);
        }
        self.write += count;
        count
    }

    /// Appends `buffer` as the new last segment, taking ownership of it.
    ///
    /// The previous last segment is sealed first: its unwritten tail leaves
    /// the address space. The new segment contributes its unconsumed window
    /// (`capacity - read_index`) to the logical capacity, and its readable
    /// bytes count as already written.
    pub fn append_buffer(&mut self, buffer: Buffer) {
        self.seal_tail();
        let window = buffer.capacity() - buffer.read_index();
        let readable = buffer.available_for_read();
        self.capacity += window;
        self.write += readable;
        self.segments.push(buffer);
    }

    /// Moves every segment and both cursors into the returned composite,
    /// leaving `self` empty with zero capacity.
    pub fn steal(&mut self) -> CompositeBuffer {
        mem::replace(self, CompositeBuffer::new())
    }

    /// Shrinks the last segment's window to its written portion.
    fn seal_tail(&mut self) {
        if let Some(tail) = self.segments.last() {
            self.capacity -= tail.available_for_write();
        }
    }

    /// The window length segment `index` contributes to the address space.
    #[inline]
    fn window_len(&self, index: usize) -> usize {
        let segment = &self.segments[index];
        if index + 1 == self.segments.len() {
            segment.capacity() - segment.read_index()
        } else {
            segment.available_for_read()
        }
    }

    /// Maps a logical index to `(segment, offset into its window)`, walking
    /// from the cached position and re-caching the result.
    ///
    /// Callers must bounds-check `index` against the capacity first.
    fn locate(&self, index: usize) -> (usize, usize) {
        let Cursor { mut segment, mut base } = self.cursor.get();
        if index < base {
            while index < base {
                segment -= 1;
                base -= self.window_len(segment);
            }
        } else {
            let mut len = self.window_len(segment);
            while index >= base + len {
                base += len;
                segment += 1;
                len = self.window_len(segment);
            }
        }
        self.cursor.set(Cursor { segment, base });
        (segment, index - base)
    }

    fn byte_at(&self, index: usize) -> u8 {
        let (segment, offset) = self.locate(index);
        let buffer = &self.segments[segment];
        buffer.get_u8_at(buffer.read_index() + offset)
    }

    /// Writes one byte and keeps the owning segment's write cursor covering
    /// it, so sealed windows and segment-level reads stay consistent.
    fn set_byte_at(&mut self, index: usize, value: u8) {
        let (segment, offset) = self.locate(index);
        let buffer = &mut self.segments[segment];
        let position = buffer.read_index() + offset;
        buffer.put_u8_at(position, value);
        if position + 1 > buffer.write_index() {
            buffer.set_write_index(position + 1);
        }
    }

    /// Raises segment write cursors to cover logical positions below `upto`.
    fn sync_written(&mut self, upto: usize) {
        let mut base = 0;
        for index in 0..self.segments.len() {
            if upto <= base {
                break;
            }
            let len = self.window_len(index);
            let covered = (upto - base).min(len);
            let segment = &mut self.segments[index];
            let target = segment.read_index() + covered;
            if target > segment.write_index() {
                segment.set_write_index(target);
            }
            base += len;
        }
    }
}

impl Default for CompositeBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CompositeBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompositeBuffer")
            .field("segments", &self.segments.len())
            .field("capacity", &self.capacity)
            .field("read_index", &self.read)
            .field("write_index", &self.write)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn consumed(data: &[u8]) -> Buffer {
        let mut buffer = Buffer::from_slice(data);
        buffer.set_read_index(data.len());
        buffer
    }

    #[test]
    fn test_empty_composite_has_zero_capacity() {
        let composite = CompositeBuffer::new();
        assert_eq!(composite.capacity(), 0);
        assert_eq!(composite.segment_count(), 0);
        assert!(composite.is_empty());
    }

    #[test]
    #[should_panic(expected = "exceeds write index")]
    fn test_empty_composite_read_panics() {
        let composite = CompositeBuffer::new();
        let _ = composite.get_u8_at(0);
    }

    #[test]
    #[should_panic(expected = "exceeds capacity")]
    fn test_empty_composite_write_panics() {
        let mut composite = CompositeBuffer::new();
        composite.put_u8_at(0, 1);
    }

    #[test]
    fn test_append_contributes_unconsumed_window() {
        let mut buffer = Buffer::with_capacity(10);
        buffer.write_slice(&[1, 2, 3, 4, 5, 6]);
        buffer.set_read_index(2);

        let mut composite = CompositeBuffer::new();
        composite.append_buffer(buffer);

        // Window is capacity minus the consumed prefix; the four readable
        // bytes count as written.
        assert_eq!(composite.capacity(), 8);
        assert_eq!(composite.read_index(), 0);
        assert_eq!(composite.write_index(), 4);
        assert_eq!(composite.read_u8(), 3);
        assert_eq!(composite.read_u8(), 4);
    }

    #[test]
    fn test_straddling_reads_match_flat_buffer() {
        let data: [u8; 8] = [0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88];
        let mut flat = Buffer::from_slice(&data);

        let mut composite = CompositeBuffer::new();
        composite.append_buffer(Buffer::from_slice(&data[..3]));
        composite.append_buffer(Buffer::from_slice(&data[3..]));

        assert_eq!(composite.capacity(), 8);
        assert_eq!(composite.read_u64(), flat.read_u64());
        assert_eq!(composite.get_u32_at(1), flat.get_u32_at(1));
        assert_eq!(composite.get_u16_at(2), flat.get_u16_at(2));
    }

    #[test]
    fn test_sealing_removes_unwritten_tail() {
        let mut composite = CompositeBuffer::new();
        composite.append_buffer(Buffer::with_capacity(4));
        composite.write_u16(0xABCD);

        // The first segment still had two writable bytes; appending seals
        // them out of the address space.
        composite.append_buffer(Buffer::from_slice(&[0x09, 0x09]));
        assert_eq!(composite.capacity(), 4);
        assert_eq!(composite.write_index(), 4);

        assert_eq!(composite.read_u16(), 0xABCD);
        assert_eq!(composite.read_u16(), 0x0909);
    }

    #[test]
    fn test_put_across_segment_border() {
        let mut composite = CompositeBuffer::new();
        composite.append_buffer(Buffer::with_capacity(1));
        composite.write_u8(0xFF);
        composite.append_buffer(Buffer::with_capacity(4));

        composite.put_u16_at(0, 0x1234);
        composite.set_write_index(2);

        assert_eq!(composite.get_u16_at(0), 0x1234);
        composite.set_read_index(0);
        assert_eq!(composite.read_u8(), 0x12);
        assert_eq!(composite.read_u8(), 0x34);
    }

    #[test]
    fn test_appending_unwritten_segments_keeps_capacity_flat() {
        let mut composite = CompositeBuffer::new();
        for _ in 0..4 {
            composite.append_buffer(Buffer::with_capacity(3));
        }
        // Each append sealed the previous, fully unwritten segment down to
        // a zero window, so only the final segment contributes.
        assert_eq!(composite.capacity(), 3);
        assert_eq!(composite.segment_count(), 4);
    }

    #[test]
    fn test_relative_writes_continue_across_append() {
        let mut composite = CompositeBuffer::new();
        composite.append_buffer(Buffer::with_capacity(3));
        composite.write_u16(0x0102);
        composite.write_u8(0x03);
        composite.append_buffer(Buffer::with_capacity(3));
        composite.write_u16(0x0405);
        composite.write_u8(0x06);
        assert_eq!(composite.capacity(), 6);

        assert_eq!(composite.read_u32(), 0x01020304);
        assert_eq!(composite.read_u16(), 0x0506);
    }

    #[test]
    fn test_zero_window_segments_are_skipped() {
        let mut composite = CompositeBuffer::new();
        composite.append_buffer(Buffer::from_slice(&[1, 2]));
        composite.append_buffer(consumed(&[42]));
        composite.append_buffer(Buffer::from_slice(&[3]));

        assert_eq!(composite.segment_count(), 3);
        assert_eq!(composite.capacity(), 3);
        assert_eq!(composite.read_u8(), 1);
        assert_eq!(composite.read_u8(), 2);
        assert_eq!(composite.read_u8(), 3);
    }

    #[test]
    fn test_cursor_cache_walks_backward() {
        let mut composite = CompositeBuffer::new();
        composite.append_buffer(Buffer::from_slice(&[1, 2, 3]));
        composite.append_buffer(Buffer::from_slice(&[4, 5, 6]));
        composite.append_buffer(Buffer::from_slice(&[7, 8, 9]));

        // Park the cache at the last segment, then jump back to the first.
        assert_eq!(composite.get_u8_at(8), 9);
        assert_eq!(composite.get_u8_at(0), 1);
        assert_eq!(composite.get_u8_at(4), 5);
    }

    #[test]
    fn test_bulk_slices_cross_boundaries() {
        let mut composite = CompositeBuffer::new();
        composite.append_buffer(Buffer::with_capacity(3));
        composite.set_write_index(3);
        composite.set_read_index(3);
        composite.append_buffer(Buffer::with_capacity(4));

        let written = composite.write_slice(&[1, 2, 3, 4, 5, 6, 7, 8, 9]);
        assert_eq!(written, 4);

        let mut out = [0u8; 16];
        let read = composite.read_slice(&mut out);
        assert_eq!(read, 4);
        assert_eq!(&out[..4], &[1, 2, 3, 4]);
    }

    #[test]
    fn test_steal_moves_segments_and_cursors() {
        let mut composite = CompositeBuffer::new();
        composite.append_buffer(Buffer::from_slice(&[1, 2, 3, 4]));
        assert_eq!(composite.read_u8(), 1);

        let mut stolen = composite.steal();
        assert_eq!(stolen.segment_count(), 1);
        assert_eq!(stolen.read_index(), 1);
        assert_eq!(stolen.write_index(), 4);
        assert_eq!(stolen.read_u8(), 2);

        assert_eq!(composite.capacity(), 0);
        assert_eq!(composite.segment_count(), 0);
    }

    #[test]
    fn test_typed_round_trip_spanning_three_segments() {
        let mut composite = CompositeBuffer::new();
        composite.append_buffer(Buffer::with_capacity(3));
        composite.set_write_index(3);
        composite.append_buffer(Buffer::with_capacity(3));
        composite.set_write_index(6);
        composite.append_buffer(Buffer::with_capacity(4));
        assert_eq!(composite.capacity(), 10);

        composite.put_i64_at(0, -123456789012345);
        composite.set_write_index(8);
        assert_eq!(composite.read_i64(), -123456789012345);
        assert_eq!(composite.get_i64_at(0), -123456789012345);
    }

    #[test]
    fn test_random_segmentation_matches_flat() {
        use rand::{rngs::StdRng, Rng, SeedableRng};

        let mut rng = StdRng::seed_from_u64(7);
        let payload: Vec<u8> = (0..512).map(|_| rng.gen()).collect();

        let mut composite = CompositeBuffer::new();
        let mut offset = 0;
        while offset < payload.len() {
            let chunk = rng.gen_range(1..=32).min(payload.len() - offset);
            composite.append_buffer(Buffer::from_slice(&payload[offset..offset + chunk]));
            offset += chunk;
        }
        assert_eq!(composite.capacity(), payload.len());

        let mut flat = Buffer::from_slice(&payload);
        for _ in 0..payload.len() / 8 {
            assert_eq!(composite.read_u64(), flat.read_u64());
        }
    }

    #[test]
    fn test_float_and_bool_round_trips() {
        let mut composite = CompositeBuffer::new();
        composite.append_buffer(Buffer::with_capacity(2));
        composite.write_u16(0);
        composite.set_read_index(2);
        composite.append_buffer(Buffer::with_capacity(16));

        composite.write_f64(6.25);
        composite.write_f32(-0.5);
        composite.write_bool(true);

        assert_eq!(composite.read_f64(), 6.25);
        assert_eq!(composite.read_f32(), -0.5);
        assert!(composite.read_bool());
    }
}
