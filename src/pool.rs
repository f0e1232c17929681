//! Generic object pooling with lifecycle hooks.
//!
//! [ObjectPool] bounds the number of idle instances it retains, never the
//! number outstanding: borrowing beyond the idle supply produces fresh
//! instances, and recycling into a full pool disposes the surplus. Pools are
//! cheap to clone and safe to share across threads; this is the only
//! component in the crate designed for concurrent use.
//!
//! # Lifecycle
//!
//! Instances pass through the [Lifecycle] hooks: `produce` when the pool is
//! empty, `clear` before reuse, `validate` when an instance comes back, and
//! `dispose` on every eviction path (idle overflow, pool disposal, recycling
//! into a disposed pool).
//!
//! # Drop-driven recycling
//!
//! Holders that return instances from `Drop` keep a [WeakPool] handle. If
//! the pool is gone by then, the upgrade fails and the holder frees the
//! instance directly instead of recycling it.

use prometheus_client::{
    metrics::{counter::Counter, gauge::Gauge},
    registry::Registry,
};
use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc, Mutex, Weak,
};
use tracing::{debug, trace};

/// Hooks for instances managed by an [ObjectPool].
pub trait Lifecycle: Send + Sync + 'static {
    /// The pooled instance type.
    type Item: Send;

    /// Creates a fresh instance when no idle one is available.
    fn produce(&self) -> Self::Item;

    /// Prepares an idle instance for reuse, before [ObjectPool::borrow]
    /// returns it.
    fn clear(&self, _item: &mut Self::Item) {}

    /// Checks an instance on its way back into the pool. Implementations
    /// should panic on contract violations.
    fn validate(&self, _item: &Self::Item) {}

    /// Releases an instance the pool will not retain.
    fn dispose(&self, item: Self::Item) {
        drop(item);
    }
}

struct PoolMetrics {
    idle: Gauge,
    outstanding: Gauge,
    created_total: Counter,
    reused_total: Counter,
    recycled_total: Counter,
    disposed_total: Counter,
}

impl PoolMetrics {
    fn new() -> Self {
        Self {
            idle: Gauge::default(),
            outstanding: Gauge::default(),
            created_total: Counter::default(),
            reused_total: Counter::default(),
            recycled_total: Counter::default(),
            disposed_total: Counter::default(),
        }
    }

    fn register(&self, registry: &mut Registry) {
        registry.register(
            "pool_idle",
            "Number of idle instances retained by the pool",
            self.idle.clone(),
        );
        registry.register(
            "pool_outstanding",
            "Number of borrowed instances not yet recycled",
            self.outstanding.clone(),
        );
        registry.register(
            "pool_created_total",
            "Total number of instances produced",
            self.created_total.clone(),
        );
        registry.register(
            "pool_reused_total",
            "Total number of borrows served from the idle list",
            self.reused_total.clone(),
        );
        registry.register(
            "pool_recycled_total",
            "Total number of instances stored for reuse",
            self.recycled_total.clone(),
        );
        registry.register(
            "pool_disposed_total",
            "Total number of instances released",
            self.disposed_total.clone(),
        );
    }
}

struct Inner<L: Lifecycle> {
    lifecycle: L,
    capacity: usize,
    idle: Mutex<Vec<L::Item>>,
    outstanding: AtomicUsize,
    disposed: AtomicBool,
    metrics: PoolMetrics,
}

impl<L: Lifecycle> Drop for Inner<L> {
    fn drop(&mut self) {
        // Leftover idle instances still owe a dispose hook call.
        let idle = std::mem::take(self.idle.get_mut().unwrap());
        for item in idle {
            self.lifecycle.dispose(item);
        }
    }
}

/// A bounded pool of reusable instances.
///
/// `capacity` bounds the idle list only; there is no limit on outstanding
/// instances. A capacity of zero is legal and turns the pool into a pure
/// allocator where every recycle disposes.
pub struct ObjectPool<L: Lifecycle> {
    inner: Arc<Inner<L>>,
}

impl<L: Lifecycle> Clone for ObjectPool<L> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<L: Lifecycle> std::fmt::Debug for ObjectPool<L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectPool")
            .field("capacity", &self.inner.capacity)
            .field("idle", &self.idle())
            .field("outstanding", &self.outstanding())
            .finish()
    }
}

impl<L: Lifecycle> ObjectPool<L> {
    /// Creates a pool retaining at most `capacity` idle instances.
    pub fn new(lifecycle: L, capacity: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                lifecycle,
                capacity,
                idle: Mutex::new(Vec::with_capacity(capacity)),
                outstanding: AtomicUsize::new(0),
                disposed: AtomicBool::new(false),
                metrics: PoolMetrics::new(),
            }),
        }
    }

    /// Registers the pool's metrics. Use a prefixed sub-registry to keep
    /// multiple pools apart.
    pub fn register(&self, registry: &mut Registry) {
        self.inner.metrics.register(registry);
    }

    /// Returns the bound on the idle list.
    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Returns the number of idle instances currently retained.
    pub fn idle(&self) -> usize {
        self.inner.idle.lock().unwrap().len()
    }

    /// Returns the number of borrowed instances not yet recycled.
    pub fn outstanding(&self) -> usize {
        self.inner.outstanding.load(Ordering::Relaxed)
    }

    /// Returns an idle instance (cleared for reuse) or produces a fresh one.
    ///
    /// # Panics
    ///
    /// Panics if the pool has been disposed.
    pub fn borrow(&self) -> L::Item {
        assert!(
            !self.inner.disposed.load(Ordering::Acquire),
            "borrowed from a disposed pool"
        );

        let reused = self.inner.idle.lock().unwrap().pop();
        self.inner.outstanding.fetch_add(1, Ordering::Relaxed);
        self.inner.metrics.outstanding.inc();

        match reused {
            Some(mut item) => {
                self.inner.metrics.idle.dec();
                self.inner.metrics.reused_total.inc();
                self.inner.lifecycle.clear(&mut item);
                item
            }
            None => {
                trace!("idle list empty, producing");
                self.inner.metrics.created_total.inc();
                self.inner.lifecycle.produce()
            }
        }
    }

    /// Returns an instance to the pool. The instance is validated, then
    /// stored if the idle list has room and the pool is still live,
    /// otherwise disposed.
    ///
    /// # Panics
    ///
    /// Panics if more instances are recycled than were borrowed.
    pub fn recycle(&self, item: L::Item) {
        let previous = self.inner.outstanding.fetch_sub(1, Ordering::AcqRel);
        assert!(
            previous > 0,
            "recycled an instance that was not borrowed from this pool"
        );
        self.inner.metrics.outstanding.dec();

        self.inner.lifecycle.validate(&item);

        // The disposed flag is re-checked under the idle lock so an instance
        // can never slip in behind a concurrent dispose's drain.
        let overflow = {
            let mut idle = self.inner.idle.lock().unwrap();
            if self.inner.disposed.load(Ordering::Acquire) || idle.len() >= self.inner.capacity {
                Some(item)
            } else {
                idle.push(item);
                None
            }
        };

        match overflow {
            None => {
                self.inner.metrics.idle.inc();
                self.inner.metrics.recycled_total.inc();
            }
            Some(item) => {
                trace!("idle list full, disposing");
                self.inner.metrics.disposed_total.inc();
                self.inner.lifecycle.dispose(item);
            }
        }
    }

    /// Produces instances until the idle list is full.
    pub fn prefill(&self) {
        loop {
            {
                let idle = self.inner.idle.lock().unwrap();
                if self.inner.disposed.load(Ordering::Acquire)
                    || idle.len() >= self.inner.capacity
                {
                    return;
                }
            }

            let item = self.inner.lifecycle.produce();
            self.inner.metrics.created_total.inc();

            let mut idle = self.inner.idle.lock().unwrap();
            if self.inner.disposed.load(Ordering::Acquire) || idle.len() >= self.inner.capacity {
                drop(idle);
                self.inner.metrics.disposed_total.inc();
                self.inner.lifecycle.dispose(item);
                return;
            }
            idle.push(item);
            self.inner.metrics.idle.inc();
        }
    }

    /// Disposes all idle instances and makes further borrows fail.
    /// Instances recycled after this point are disposed instead of stored.
    /// Idempotent.
    pub fn dispose(&self) {
        if self.inner.disposed.swap(true, Ordering::AcqRel) {
            return;
        }

        let drained = std::mem::take(&mut *self.inner.idle.lock().unwrap());
        debug!(count = drained.len(), "disposing pool");
        for item in drained {
            self.inner.metrics.idle.dec();
            self.inner.metrics.disposed_total.inc();
            self.inner.lifecycle.dispose(item);
        }
    }

    /// Returns a weak handle for drop-driven recycling.
    pub fn downgrade(&self) -> WeakPool<L> {
        WeakPool {
            inner: Arc::downgrade(&self.inner),
        }
    }
}

/// A weak handle to an [ObjectPool].
///
/// `WeakPool::new()` is never upgradeable, for holders whose instances are
/// not pooled at all.
pub struct WeakPool<L: Lifecycle> {
    inner: Weak<Inner<L>>,
}

impl<L: Lifecycle> Clone for WeakPool<L> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<L: Lifecycle> WeakPool<L> {
    /// Creates a handle that always fails to upgrade.
    pub fn new() -> Self {
        Self { inner: Weak::new() }
    }

    /// Attempts to recover a strong pool handle.
    pub fn upgrade(&self) -> Option<ObjectPool<L>> {
        self.inner.upgrade().map(|inner| ObjectPool { inner })
    }
}

impl<L: Lifecycle> Default for WeakPool<L> {
    fn default() -> Self {
        Self::new()
    }
}
