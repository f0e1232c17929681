//! Fixed-capacity byte buffers over shared, pooled storage.
//!
//! [Buffer] is a view: a `[start, end)` window into an allocation plus two
//! cursors. Typed accessors are big-endian. Splitting ([Buffer::take_head],
//! [Buffer::steal]) produces independent views over disjoint windows of the
//! same allocation without copying payload bytes; the allocation is recycled
//! when the last view drops. [CompositeBuffer] chains buffers behind one
//! logical address space.

mod composite;
mod pool;
mod storage;

pub use composite::CompositeBuffer;
pub use pool::{BufferPool, BufferPoolConfig};

use crate::pool::WeakPool;
use bytes::{buf::UninitSlice, Buf, BufMut};
use pool::StorageLifecycle;
use std::{mem, slice, sync::Arc};
use storage::{Shared, Storage};

/// A fixed-capacity byte window with read and write cursors.
///
/// # Layout
///
/// ```text
/// [0...........read_index..........write_index...........capacity]
///  ^            ^                   ^                     ^
///  |            |                   |                     |
///  window start next byte to read   next byte to write    window end
///
/// Regions:
/// - [0, read_index):           consumed
/// - [read_index, write_index): readable
/// - [write_index, capacity):   writable
/// ```
///
/// # Invariants
///
/// - `read_index <= write_index <= capacity`
/// - Every byte of the window is initialized.
///
/// Relative accessors (`read_*`/`write_*`) move a cursor; absolute accessors
/// (`*_at`) do not. Reads are bounds-checked against `write_index`, writes
/// against `capacity`. Single-value accessors panic on violation; bulk
/// operations copy what fits and return the count.
///
/// Multi-byte values are big-endian: the high half is always at the lower
/// index, whether a value is written whole or composed from halves.
///
/// A `Buffer` may be sent between tasks but is single-owner; views produced
/// by [Buffer::take_head] cover disjoint windows and may live on different
/// threads.
pub struct Buffer {
    shared: Arc<Shared>,
    start: usize,
    end: usize,
    read: usize,
    write: usize,
}

macro_rules! impl_integer_accessors {
    ($ty:ty, $get_at:ident, $put_at:ident, $read:ident, $write:ident) => {
        #[doc = concat!("Reads a big-endian `", stringify!($ty), "` at `index` without moving cursors.")]
        ///
        /// # Panics
        ///
        /// Panics if the value does not lie fully inside the readable region.
        #[inline]
        pub fn $get_at(&self, index: usize) -> $ty {
            const SIZE: usize = mem::size_of::<$ty>();
            let end = index.checked_add(SIZE).expect("index overflow");
            assert!(
                end <= self.write,
                "read of {SIZE} bytes at {index} exceeds write index {}",
                self.write
            );
            <$ty>::from_be_bytes(self.window()[index..end].try_into().unwrap())
        }

        #[doc = concat!("Writes a big-endian `", stringify!($ty), "` at `index` without moving cursors.")]
        ///
        /// # Panics
        ///
        /// Panics if the value does not lie fully inside the window.
        #[inline]
        pub fn $put_at(&mut self, index: usize, value: $ty) {
            const SIZE: usize = mem::size_of::<$ty>();
            let end = index.checked_add(SIZE).expect("index overflow");
            assert!(
                end <= self.capacity(),
                "write of {SIZE} bytes at {index} exceeds capacity {}",
                self.capacity()
            );
            self.window_mut()[index..end].copy_from_slice(&value.to_be_bytes());
        }

        #[doc = concat!("Reads a big-endian `", stringify!($ty), "` at the read cursor and advances it.")]
        ///
        /// # Panics
        ///
        /// Panics if fewer readable bytes remain than the value needs.
        #[inline]
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
        #[inline]
        pub fn $write(&mut self, value: $ty) {
            self.$put_at(self.write, value);
            self.write += mem::size_of::<$ty>();
        }
    };
}

impl Buffer {
    /// Creates a buffer over fresh private storage.
    pub fn with_capacity(capacity: usize) -> Self {
        let shared = Shared::unpooled(capacity);
        Self {
            shared: Arc::new(shared),
            start: 0,
            end: capacity,
            read: 0,
            write: 0,
        }
    }

    /// Creates a buffer holding a copy of `data`, ready to read.
    pub fn from_slice(data: &[u8]) -> Self {
        let mut buffer = Self::with_capacity(data.len());
        let copied = buffer.write_slice(data);
        debug_assert_eq!(copied, data.len());
        buffer
    }

    /// Wraps pooled storage into a view with zeroed cursors.
    pub(crate) fn pooled(storage: Storage, pool: WeakPool<StorageLifecycle>) -> Self {
        let capacity = storage.capacity();
        let shared = Shared::pooled(storage, pool);
        shared.counter().retain();
        Self {
            shared: Arc::new(shared),
            start: 0,
            end: capacity,
            read: 0,
            write: 0,
        }
    }

    /// The zero-capacity leftover installed by [Buffer::steal].
    fn detached() -> Self {
        Self::with_capacity(0)
    }

    /// Returns the fixed capacity of this view.
    #[inline]
    pub const fn capacity(&self) -> usize {
        self.end - self.start
    }

    /// Returns the read cursor.
    #[inline]
    pub const fn read_index(&self) -> usize {
        self.read
    }

    /// Returns the write cursor.
    #[inline]
    pub const fn write_index(&self) -> usize {
        self.write
    }

    /// Returns the number of readable bytes.
    #[inline]
    pub const fn available_for_read(&self) -> usize {
        self.write - self.read
    }

    /// Returns the number of writable bytes.
    #[inline]
    pub const fn available_for_write(&self) -> usize {
        self.capacity() - self.write
    }

    /// Returns `true` if there is nothing left to read.
    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.read == self.write
    }

    /// Returns `true` if there is no room left to write.
    #[inline]
    pub const fn is_full(&self) -> bool {
        self.write == self.capacity()
    }

    /// Moves the read cursor.
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

    /// Moves the write cursor. Raising it exposes bytes whose contents are
    /// unspecified unless previously written.
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
            index <= self.capacity(),
            "write index {index} exceeds capacity {}",
            self.capacity()
        );
        self.write = index;
    }

    /// Resets both cursors to zero, discarding content.
    pub fn reset(&mut self) {
        self.read = 0;
        self.write = 0;
    }

    /// Moves the readable region to the front of the window, reclaiming the
    /// consumed prefix for writing.
    pub fn compact(&mut self) {
        if self.read == 0 {
            return;
        }
        let (read, write) = (self.read, self.write);
        self.window_mut().copy_within(read..write, 0);
        self.write = write - read;
        self.read = 0;
    }

    impl_integer_accessors!(u8, get_u8_at, put_u8_at, read_u8, write_u8);
    impl_integer_accessors!(i8, get_i8_at, put_i8_at, read_i8, write_i8);
    impl_integer_accessors!(u16, get_u16_at, put_u16_at, read_u16, write_u16);
    impl_integer_accessors!(i16, get_i16_at, put_i16_at, read_i16, write_i16);
    impl_integer_accessors!(u32, get_u32_at, put_u32_at, read_u32, write_u32);
    impl_integer_accessors!(i32, get_i32_at, put_i32_at, read_i32, write_i32);
    impl_integer_accessors!(u64, get_u64_at, put_u64_at, read_u64, write_u64);
    impl_integer_accessors!(i64, get_i64_at, put_i64_at, read_i64, write_i64);

    /// Reads an `f32` stored as its big-endian bit pattern.
    #[inline]
    pub fn get_f32_at(&self, index: usize) -> f32 {
        f32::from_bits(self.get_u32_at(index))
    }

    /// Writes an `f32` as its big-endian bit pattern.
    #[inline]
    pub fn put_f32_at(&mut self, index: usize, value: f32) {
        self.put_u32_at(index, value.to_bits());
    }

    /// Reads an `f64` stored as its big-endian bit pattern.
    #[inline]
    pub fn get_f64_at(&self, index: usize) -> f64 {
        f64::from_bits(self.get_u64_at(index))
    }

    /// Writes an `f64` as its big-endian bit pattern.
    #[inline]
    pub fn put_f64_at(&mut self, index: usize, value: f64) {
        self.put_u64_at(index, value.to_bits());
    }

    /// Reads a `bool` stored as one byte: zero is `false`, anything else
    /// `true`.
    #[inline]
    pub fn get_bool_at(&self, index: usize) -> bool {
        self.get_u8_at(index) != 0
    }

    /// Writes a `bool` as one byte.
    #[inline]
    pub fn put_bool_at(&mut self, index: usize, value: bool) {
        self.put_u8_at(index, value as u8);
    }

    /// Reads an `f32` at the read cursor and advances it.
    #[inline]
    pub fn read_f32(&mut self) -> f32 {
        f32::from_bits(self.read_u32())
    }

    /// Writes an `f32` at the write cursor and advances it.
    #[inline]
    pub fn write_f32(&mut self, value: f32) {
        self.write_u32(value.to_bits());
    }

    /// Reads an `f64` at the read cursor and advances it.
    #[inline]
    pub fn read_f64(&mut self) -> f64 {
        f64::from_bits(self.read_u64())
    }

    /// Writes an `f64` at the write cursor and advances it.
    #[inline]
    pub fn write_f64(&mut self, value: f64) {
        self.write_u64(value.to_bits());
    }

    /// Reads a `bool` at the read cursor and advances it.
    #[inline]
    pub fn read_bool(&mut self) -> bool {
        self.read_u8() != 0
    }

    /// Writes a `bool` at the write cursor and advances it.
    #[inline]
    pub fn write_bool(&mut self, value: bool) {
        self.write_u8(value as u8);
    }

    /// Copies readable bytes into `dst`, advancing the read cursor. Returns
    /// how many were copied: the shorter of `dst` and the readable region.
    pub fn read_slice(&mut self, dst: &mut [u8]) -> usize {
        let count = dst.len().min(self.available_for_read());
        let read = self.read;
        dst[..count].copy_from_slice(&self.window()[read..read + count]);
        self.read += count;
        count
    }

    /// Copies bytes from `src` into the writable region, advancing the write
    /// cursor. Returns how many were copied: the shorter of `src` and the
    /// writable region.
    pub fn write_slice(&mut self, src: &[u8]) -> usize {
        let count = src.len().min(self.available_for_write());
        let write = self.write;
        self.window_mut()[write..write + count].copy_from_slice(&src[..count]);
        self.write += count;
        count
    }

    /// Drains readable bytes from `source` into this buffer's writable
    /// region, advancing both cursors. Returns how many bytes moved.
    pub fn write_buffer(&mut self, source: &mut Buffer) -> usize {
        let count = self
            .available_for_write()
            .min(source.available_for_read());
        if count == 0 {
            return 0;
        }
        let write = self.write;
        let source_read = source.read;
        self.window_mut()[write..write + count]
            .copy_from_slice(&source.window()[source_read..source_read + count]);
        self.write += count;
        source.read += count;
        count
    }

    /// Detaches the first `index` bytes of capacity as an independent buffer
    /// sharing the same storage, shrinking this view to the remaining tail.
    ///
    /// Cursors split with their relative positions preserved: the head keeps
    /// `min(cursor, index)`, the tail keeps what lies past the cut. The two
    /// capacities always sum to the original.
    ///
    /// # Panics
    ///
    /// Panics if `index` is not below the capacity. Use [Buffer::steal] to
    /// take the whole view.
    pub fn take_head(&mut self, index: usize) -> Buffer {
        let capacity = self.capacity();
        assert!(
            index < capacity,
            "split index {index} out of range [0, {capacity})"
        );

        self.shared.counter().retain();
        let head = Buffer {
            shared: self.shared.clone(),
            start: self.start,
            end: self.start + index,
            read: self.read.min(index),
            write: self.write.min(index),
        };

        self.start += index;
        self.read = self.read.saturating_sub(index);
        self.write = self.write.saturating_sub(index);
        head
    }

    /// Moves this view into the returned buffer, leaving `self` with zero
    /// capacity. The result holds exactly the bytes `self` held.
    pub fn steal(&mut self) -> Buffer {
        mem::replace(self, Buffer::detached())
    }

    /// The readable region as a slice.
    #[inline]
    pub fn as_readable(&self) -> &[u8] {
        &self.window()[self.read..self.write]
    }

    #[inline]
    fn window(&self) -> &[u8] {
        // SAFETY: [start, end) lies inside the allocation, every byte is
        // initialized, and no other view's window overlaps it.
        unsafe { slice::from_raw_parts(self.shared.as_ptr().add(self.start), self.capacity()) }
    }

    #[inline]
    fn window_mut(&mut self) -> &mut [u8] {
        // SAFETY: as for `window`, plus `&mut self` keeps this the only
        // live slice over the window.
        unsafe { slice::from_raw_parts_mut(self.shared.as_ptr().add(self.start), self.capacity()) }
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        if self.shared.counter().release() {
            self.shared.reclaim();
        }
    }
}

impl Buf for Buffer {
    #[inline]
    fn remaining(&self) -> usize {
        self.available_for_read()
    }

    #[inline]
    fn chunk(&self) -> &[u8] {
        self.as_readable()
    }

    #[inline]
    fn advance(&mut self, cnt: usize) {
        assert!(
            cnt <= self.available_for_read(),
            "cannot advance past the write index"
        );
        self.read += cnt;
    }
}

// SAFETY: chunk_mut exposes only initialized bytes of the writable region
// and advance_mut keeps the cursor invariant.
unsafe impl BufMut for Buffer {
    #[inline]
    fn remaining_mut(&self) -> usize {
        self.available_for_write()
    }

    #[inline]
    fn chunk_mut(&mut self) -> &mut UninitSlice {
        let write = self.write;
        let window = self.window_mut();
        UninitSlice::new(&mut window[write..])
    }

    #[inline]
    unsafe fn advance_mut(&mut self, cnt: usize) {
        assert!(
            cnt <= self.available_for_write(),
            "cannot advance past capacity"
        );
        self.write += cnt;
    }
}

impl std::fmt::Debug for Buffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Buffer")
            .field("capacity", &self.capacity())
            .field("read_index", &self.read)
            .field("write_index", &self.write)
            .finish()
    }
}
