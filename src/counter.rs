use std::sync::atomic::{fence, AtomicUsize, Ordering};

/// Tracks outstanding views over one shared backing store.
///
/// The store may be recycled only when the last view goes away:
/// [release](Self::release) returns `true` for exactly one caller, the one
/// that dropped the count to zero. [Empty](Self::Empty) is for stores that
/// are never shared or pooled; it ignores retains and never reports zero.
#[derive(Debug)]
pub enum ReferenceCounter {
    /// No-op counter. `release` always returns `false`.
    Empty,
    /// Atomic count of live views.
    Counted(AtomicUsize),
}

impl ReferenceCounter {
    /// Creates a counter with no outstanding views. The creator must
    /// [retain](Self::retain) before handing out the first view.
    pub const fn counted() -> Self {
        Self::Counted(AtomicUsize::new(0))
    }

    /// Records a new view.
    pub fn retain(&self) {
        match self {
            Self::Empty => {}
            Self::Counted(count) => {
                count.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Records a view going away, returning `true` if it was the last one.
    ///
    /// # Panics
    ///
    /// Panics if there are no outstanding views to release.
    pub fn release(&self) -> bool {
        match self {
            Self::Empty => false,
            Self::Counted(count) => {
                let previous = count.fetch_sub(1, Ordering::Release);
                assert!(previous > 0, "released a reference counter at zero");
                if previous == 1 {
                    // Synchronize with all prior releases before the store
                    // is handed back for reuse.
                    fence(Ordering::Acquire);
                    true
                } else {
                    false
                }
            }
        }
    }
}
