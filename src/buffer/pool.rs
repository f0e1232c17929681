use super::{
    storage::{cache_line_size, page_size, Storage},
    Buffer,
};
use crate::{
    pool::{Lifecycle, ObjectPool},
    DEFAULT_BUFFER_SIZE, DEFAULT_POOL_CAPACITY,
};
use prometheus_client::registry::Registry;
use std::num::NonZeroUsize;

/// Configuration for a [BufferPool].
#[derive(Debug, Clone)]
pub struct BufferPoolConfig {
    /// Capacity in bytes of every buffer produced by the pool.
    pub buffer_size: usize,
    /// Maximum number of idle storage allocations retained for reuse.
    pub capacity: usize,
    /// Storage alignment. Must be a power of two. Use
    /// [BufferPoolConfig::page_aligned] for direct I/O.
    pub alignment: NonZeroUsize,
    /// Whether to allocate all retained storage up front.
    pub prefill: bool,
}

impl Default for BufferPoolConfig {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
            capacity: DEFAULT_POOL_CAPACITY,
            alignment: NonZeroUsize::new(cache_line_size()).expect("cache line size is nonzero"),
            prefill: false,
        }
    }
}

impl BufferPoolConfig {
    /// Page-aligned preset for storage that feeds direct I/O or DMA.
    pub fn page_aligned() -> Self {
        Self {
            alignment: NonZeroUsize::new(page_size()).expect("page size is nonzero"),
            ..Self::default()
        }
    }

    /// Validates the configuration, panicking on invalid values.
    ///
    /// # Panics
    ///
    /// - `buffer_size` is zero
    /// - `alignment` is not a power of two
    fn validate(&self) {
        assert!(self.buffer_size > 0, "buffer_size must be positive");
        assert!(
            self.alignment.is_power_of_two(),
            "alignment must be a power of two"
        );
    }
}

/// Produces fixed-size aligned storage for a [BufferPool].
pub(crate) struct StorageLifecycle {
    buffer_size: usize,
    alignment: usize,
}

impl Lifecycle for StorageLifecycle {
    type Item = Storage;

    fn produce(&self) -> Storage {
        Storage::new(self.buffer_size, self.alignment)
    }

    fn validate(&self, item: &Storage) {
        assert_eq!(
            item.capacity(),
            self.buffer_size,
            "storage does not belong to this pool"
        );
    }
}

/// A pool of reusable buffer storage.
///
/// Borrowed buffers carry a weak handle to the pool; when the last view over
/// a storage allocation drops, the allocation comes back here for reuse. If
/// the pool itself is gone by then, the allocation is freed directly. The
/// pool can be dropped while buffers are still out; those buffers remain
/// valid.
#[derive(Clone, Debug)]
pub struct BufferPool {
    storage: ObjectPool<StorageLifecycle>,
    buffer_size: usize,
}

impl BufferPool {
    /// Creates a pool from a validated configuration.
    pub fn new(config: BufferPoolConfig) -> Self {
        config.validate();
        let storage = ObjectPool::new(
            StorageLifecycle {
                buffer_size: config.buffer_size,
                alignment: config.alignment.get(),
            },
            config.capacity,
        );
        if config.prefill {
            storage.prefill();
        }
        Self {
            storage,
            buffer_size: config.buffer_size,
        }
    }

    /// Borrows a buffer with zeroed cursors over pooled storage.
    pub fn borrow(&self) -> Buffer {
        Buffer::pooled(self.storage.borrow(), self.storage.downgrade())
    }

    /// Returns the capacity of buffers produced by this pool.
    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// Returns the number of idle storage allocations.
    pub fn idle(&self) -> usize {
        self.storage.idle()
    }

    /// Returns the number of borrowed storage allocations not yet returned.
    pub fn outstanding(&self) -> usize {
        self.storage.outstanding()
    }

    /// Registers the underlying pool metrics.
    pub fn register(&self, registry: &mut Registry) {
        self.storage.register(registry);
    }

    /// Frees all idle storage and makes further borrows fail. Buffers still
    /// out are unaffected; their storage is freed on return.
    pub fn dispose(&self) {
        self.storage.dispose();
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new(BufferPoolConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_pool(buffer_size: usize, capacity: usize) -> BufferPool {
        BufferPool::new(BufferPoolConfig {
            buffer_size,
            capacity,
            ..BufferPoolConfig::default()
        })
    }

    #[test]
    fn test_borrowed_buffer_starts_empty() {
        let pool = small_pool(64, 2);
        let buffer = pool.borrow();
        assert_eq!(buffer.capacity(), 64);
        assert_eq!(buffer.read_index(), 0);
        assert_eq!(buffer.write_index(), 0);
        assert_eq!(pool.outstanding(), 1);
    }

    #[test]
    fn test_storage_returns_on_drop() {
        let pool = small_pool(64, 2);

        let buffer = pool.borrow();
        assert_eq!(pool.idle(), 0);
        drop(buffer);
        assert_eq!(pool.idle(), 1);
        assert_eq!(pool.outstanding(), 0);

        // Reuse keeps the pool at a single allocation.
        let buffer = pool.borrow();
        assert_eq!(pool.idle(), 0);
        drop(buffer);
        assert_eq!(pool.idle(), 1);
    }

    #[test]
    fn test_storage_returns_once_for_split_views() {
        let pool = small_pool(64, 2);

        let mut tail = pool.borrow();
        let head = tail.take_head(16);
        drop(head);
        assert_eq!(pool.idle(), 0, "storage returned while a view was live");
        drop(tail);
        assert_eq!(pool.idle(), 1);
    }

    #[test]
    fn test_idle_storage_is_bounded() {
        let pool = small_pool(64, 1);

        let first = pool.borrow();
        let second = pool.borrow();
        drop(first);
        drop(second);
        assert_eq!(pool.idle(), 1);
    }

    #[test]
    fn test_buffer_outlives_pool() {
        let pool = small_pool(64, 2);
        let mut buffer = pool.borrow();
        drop(pool);

        buffer.write_u64(0x0102030405060708);
        assert_eq!(buffer.read_u64(), 0x0102030405060708);
        // Dropping the buffer frees the storage directly.
    }

    #[test]
    fn test_drop_after_dispose_frees_storage() {
        let pool = small_pool(64, 2);
        let buffer = pool.borrow();
        pool.dispose();
        drop(buffer);
        assert_eq!(pool.idle(), 0);
        assert_eq!(pool.outstanding(), 0);
    }

    #[test]
    fn test_prefill_allocates_up_front() {
        let pool = BufferPool::new(BufferPoolConfig {
            buffer_size: 64,
            capacity: 3,
            prefill: true,
            ..BufferPoolConfig::default()
        });
        assert_eq!(pool.idle(), 3);
    }

    #[test]
    fn test_page_aligned_preset() {
        let config = BufferPoolConfig::page_aligned();
        assert!(config.alignment.is_power_of_two());
        let pool = BufferPool::new(config);
        let buffer = pool.borrow();
        assert_eq!(buffer.capacity(), DEFAULT_BUFFER_SIZE);
    }

    #[test]
    #[should_panic(expected = "buffer_size must be positive")]
    fn test_zero_buffer_size_rejected() {
        let _ = BufferPool::new(BufferPoolConfig {
            buffer_size: 0,
            ..BufferPoolConfig::default()
        });
    }

    #[test]
    fn test_reuse_preserves_capacity_across_cursor_abuse() {
        let pool = small_pool(32, 1);

        let mut buffer = pool.borrow();
        buffer.write_slice(&[7; 32]);
        assert_eq!(buffer.available_for_write(), 0);
        drop(buffer);

        let buffer = pool.borrow();
        assert_eq!(buffer.capacity(), 32);
        assert_eq!(buffer.write_index(), 0);
        assert_eq!(buffer.available_for_write(), 32);
    }
}
