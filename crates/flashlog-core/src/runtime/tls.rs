use std::cell::Cell;
use std::ptr::NonNull;
use std::sync::Arc;

use crate::buffer::StagingBuffer;

thread_local! {
    // The raw pointer keeps the log hot path at a single indirection; the
    // token ties it to the runtime instance that allocated the buffer.
    static STAGING: Cell<Option<(usize, NonNull<StagingBuffer>)>> = const { Cell::new(None) };
    // Scope-bound owner: dropped by the runtime when this thread exits.
    static RETIRE: Cell<Option<RetireGuard>> = const { Cell::new(None) };
}

/// Owns this thread's staging buffer reference. Dropping it (at thread
/// termination, or when the thread switches runtimes) clears the pointer and
/// flips the buffer's retired flag, handing drain-then-reap responsibility to
/// the compression worker without ever blocking the producing thread.
struct RetireGuard {
    buffer: Arc<StagingBuffer>,
}

impl Drop for RetireGuard {
    fn drop(&mut self) {
        // Thread-local destruction order is unspecified; the pointer slot
        // may already be gone.
        let _ = STAGING.try_with(|slot| slot.set(None));
        self.buffer.mark_retired();
    }
}

/// Returns this thread's staging buffer pointer, provided it belongs to the
/// runtime identified by `token`.
pub(crate) fn current(token: usize) -> Option<NonNull<StagingBuffer>> {
    STAGING.with(|slot| match slot.get() {
        Some((owner, ptr)) if owner == token => Some(ptr),
        _ => None,
    })
}

/// Installs `buffer` as this thread's staging buffer for the runtime
/// identified by `token`, retiring any buffer the thread held before.
pub(crate) fn install(token: usize, buffer: Arc<StagingBuffer>) -> NonNull<StagingBuffer> {
    let ptr = NonNull::from(&*buffer);
    RETIRE.with(|slot| slot.set(Some(RetireGuard { buffer })));
    STAGING.with(|slot| slot.set(Some((token, ptr))));
    ptr
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thread_exit_retires_the_buffer() {
        let buffer = Arc::new(StagingBuffer::new(1, 4096));
        let handle = Arc::clone(&buffer);
        std::thread::spawn(move || {
            install(1, handle);
        })
        .join()
        .unwrap();
        assert!(buffer.is_retired());
    }

    #[test]
    fn install_for_a_new_runtime_retires_the_old_buffer() {
        let first = Arc::new(StagingBuffer::new(1, 4096));
        let second = Arc::new(StagingBuffer::new(2, 4096));
        let (a, b) = (Arc::clone(&first), Arc::clone(&second));
        std::thread::spawn(move || {
            install(1, a);
            assert!(current(1).is_some());
            assert!(current(2).is_none());

            install(2, b);
            assert!(current(1).is_none());
            assert!(current(2).is_some());
        })
        .join()
        .unwrap();
        assert!(first.is_retired());
        assert!(second.is_retired());
    }
}
