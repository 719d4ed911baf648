use std::sync::{Arc, Mutex};

use crate::buffer::StagingBuffer;

/// Process-wide directory of live staging buffers.
///
/// Producers append on first use; the compression worker iterates snapshots
/// and removes buffers it has reaped. Every buffer reachable through the
/// registry is either owned by a live producing thread or retired and
/// awaiting its final drain.
pub struct BufferRegistry {
    staging_capacity: usize,
    inner: Mutex<RegistryInner>,
}

struct RegistryInner {
    buffers: Vec<Arc<StagingBuffer>>,
    next_id: u32,
}

impl BufferRegistry {
    pub fn new(staging_capacity: usize) -> Self {
        Self {
            staging_capacity,
            inner: Mutex::new(RegistryInner {
                buffers: Vec::new(),
                next_id: 1,
            }),
        }
    }

    /// Allocates and registers a staging buffer for the calling thread.
    ///
    /// The id is drawn under the lock, but the multi-megabyte buffer
    /// allocation happens with the lock released so other producers are not
    /// held behind it.
    pub fn register(&self) -> Arc<StagingBuffer> {
        let id = {
            let mut inner = self.lock();
            let id = inner.next_id;
            inner.next_id += 1;
            id
        };

        let buffer = Arc::new(StagingBuffer::new(id, self.staging_capacity));

        self.lock().buffers.push(Arc::clone(&buffer));
        buffer
    }

    /// Copies out the current buffer list for lock-free iteration.
    pub fn snapshot(&self) -> Vec<Arc<StagingBuffer>> {
        self.lock().buffers.clone()
    }

    /// Drops the registry's reference to a reaped buffer, preserving the
    /// round-robin order of the remaining entries.
    pub fn remove(&self, id: u32) -> Option<Arc<StagingBuffer>> {
        let mut inner = self.lock();
        let index = inner.buffers.iter().position(|buffer| buffer.id() == id)?;
        Some(inner.buffers.remove(index))
    }

    pub fn len(&self) -> usize {
        self.lock().buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, RegistryInner> {
        self.inner.lock().expect("buffer registry mutex poisoned")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assigns_monotonically_increasing_ids() {
        let registry = BufferRegistry::new(4096);
        let first = registry.register();
        let second = registry.register();
        assert_eq!(first.id(), 1);
        assert_eq!(second.id(), 2);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn remove_preserves_registration_order() {
        let registry = BufferRegistry::new(4096);
        let ids: Vec<u32> = (0..4).map(|_| registry.register().id()).collect();
        registry.remove(ids[1]).unwrap();

        let remaining: Vec<u32> = registry
            .snapshot()
            .iter()
            .map(|buffer| buffer.id())
            .collect();
        assert_eq!(remaining, vec![ids[0], ids[2], ids[3]]);
    }

    #[test]
    fn remove_of_unknown_id_is_none() {
        let registry = BufferRegistry::new(4096);
        assert!(registry.remove(42).is_none());
    }
}
