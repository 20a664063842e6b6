//! Single-writer snapshots shared with other threads

use std::sync::Arc;

use arc_swap::ArcSwap;

/// A value replaced wholesale by the scan thread and read lock-free elsewhere.
///
/// Readers get an `Arc` to an immutable snapshot; a newer value only becomes
/// visible when the writer publishes it in one store.
#[derive(Debug)]
pub struct Published<T> {
    slot: Arc<ArcSwap<T>>,
}

impl<T> Published<T> {
    pub fn new(value: T) -> Self {
        Self {
            slot: Arc::new(ArcSwap::from_pointee(value)),
        }
    }

    /// Current snapshot
    pub fn load(&self) -> Arc<T> {
        self.slot.load_full()
    }

    pub(crate) fn publish(&self, value: T) {
        self.slot.store(Arc::new(value));
    }
}

impl<T> Clone for Published<T> {
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
        }
    }
}

impl<T: Default> Default for Published<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}
