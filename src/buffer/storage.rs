use super::pool::StorageLifecycle;
use crate::{counter::ReferenceCounter, pool::WeakPool};
use std::{
    alloc::{alloc_zeroed, dealloc, Layout},
    mem::ManuallyDrop,
    ptr::NonNull,
    sync::atomic::{AtomicBool, Ordering},
};

/// Returns the system page size.
///
/// On Unix systems, queries the actual page size via `sysconf`.
/// On other systems (Windows), defaults to 4KB.
#[cfg(unix)]
pub(crate) fn page_size() -> usize {
    // SAFETY: sysconf is safe to call.
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if size <= 0 {
        4096 // Safe fallback if sysconf fails
    } else {
        size as usize
    }
}

#[cfg(not(unix))]
pub(crate) fn page_size() -> usize {
    4096
}

/// Returns the cache line size for the current architecture.
///
/// Uses 128 bytes for x86_64 and aarch64 as a conservative estimate that
/// accounts for spatial prefetching. Uses 64 bytes for other architectures.
pub(crate) const fn cache_line_size() -> usize {
    cfg_if::cfg_if! {
        if #[cfg(any(target_arch = "x86_64", target_arch = "aarch64"))] {
            128
        } else {
            64
        }
    }
}

/// An aligned, zero-initialized allocation.
///
/// Deallocates itself on drop using the stored layout. Zero capacity is
/// legal and holds no allocation.
pub(crate) struct Storage {
    ptr: NonNull<u8>,
    layout: Layout,
}

// SAFETY: Storage owns its memory and can be sent between threads.
unsafe impl Send for Storage {}
// SAFETY: Storage exposes no interior mutability of its own.
unsafe impl Sync for Storage {}

impl Storage {
    /// Allocates zeroed memory with the given capacity and alignment.
    ///
    /// Zeroing matters: cursor manipulation can expose any byte inside a
    /// view's window, so every byte must be initialized from the start.
    ///
    /// # Panics
    ///
    /// Panics if allocation fails or the layout is invalid.
    pub(crate) fn new(capacity: usize, alignment: usize) -> Self {
        let layout = Layout::from_size_align(capacity, alignment).expect("invalid layout");
        if layout.size() == 0 {
            return Self {
                ptr: NonNull::dangling(),
                layout,
            };
        }

        // SAFETY: layout has nonzero size and power-of-two alignment.
        let ptr = unsafe { alloc_zeroed(layout) };
        let ptr = NonNull::new(ptr).expect("allocation failed");

        Self { ptr, layout }
    }

    /// Returns the capacity of the allocation.
    #[inline]
    pub(crate) const fn capacity(&self) -> usize {
        self.layout.size()
    }
}

impl Drop for Storage {
    fn drop(&mut self) {
        if self.layout.size() != 0 {
            // SAFETY: ptr was allocated with this layout.
            unsafe { dealloc(self.ptr.as_ptr(), self.layout) };
        }
    }
}

impl std::fmt::Debug for Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storage")
            .field("capacity", &self.capacity())
            .finish()
    }
}

/// A [Storage] allocation plus the machinery deciding when to recycle it.
///
/// Buffer views hold this behind an `Arc`. Splitting a buffer clones the
/// `Arc` and retains the counter; the view whose release drops the counter
/// to zero hands the storage back to its pool. The `recycled` flag tells the
/// final `Arc` drop that ownership already moved, so memory is freed exactly
/// once either way.
///
/// Views carve the allocation into disjoint `[start, end)` windows, which is
/// what makes independent mutation from different threads sound.
pub(crate) struct Shared {
    ptr: NonNull<u8>,
    layout: Layout,
    counter: ReferenceCounter,
    pool: WeakPool<StorageLifecycle>,
    recycled: AtomicBool,
}

// SAFETY: the allocation is owned and views never alias each other's
// windows; counter and flag are atomic.
unsafe impl Send for Shared {}
// SAFETY: shared access only reads the pointer and atomics.
unsafe impl Sync for Shared {}

impl Shared {
    /// Wraps a pooled allocation. The caller retains the counter per view it
    /// hands out.
    pub(crate) fn pooled(storage: Storage, pool: WeakPool<StorageLifecycle>) -> Self {
        Self::wrap(storage, ReferenceCounter::counted(), pool)
    }

    /// Wraps a private allocation. With the [ReferenceCounter::Empty]
    /// counter, recycling never triggers and the final `Arc` drop frees the
    /// memory.
    pub(crate) fn unpooled(capacity: usize) -> Self {
        Self::wrap(
            Storage::new(capacity, cache_line_size()),
            ReferenceCounter::Empty,
            WeakPool::new(),
        )
    }

    fn wrap(storage: Storage, counter: ReferenceCounter, pool: WeakPool<StorageLifecycle>) -> Self {
        let storage = ManuallyDrop::new(storage);
        Self {
            ptr: storage.ptr,
            layout: storage.layout,
            counter,
            pool,
            recycled: AtomicBool::new(false),
        }
    }

    #[inline]
    pub(crate) const fn capacity(&self) -> usize {
        self.layout.size()
    }

    #[inline]
    pub(crate) const fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    #[inline]
    pub(crate) fn counter(&self) -> &ReferenceCounter {
        &self.counter
    }

    /// Hands the storage back to its pool, if the pool is still around.
    ///
    /// Must only be called by the view that observed the counter reach zero:
    /// that caller is unique, so rebuilding the [Storage] value from the raw
    /// parts moves ownership exactly once.
    pub(crate) fn reclaim(&self) {
        if let Some(pool) = self.pool.upgrade() {
            self.recycled.store(true, Ordering::Release);
            pool.recycle(Storage {
                ptr: self.ptr,
                layout: self.layout,
            });
        }
        // No pool: the final Arc drop deallocates.
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        if !self.recycled.load(Ordering::Acquire) {
            drop(Storage {
                ptr: self.ptr,
                layout: self.layout,
            });
        }
    }
}
