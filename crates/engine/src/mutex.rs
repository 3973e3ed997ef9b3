//! FIFO serialization of oracle weight updates.

use tokio::sync::Mutex;

/// Queues critical sections in arrival order and runs them one at a time.
///
/// Built on tokio's fair mutex: waiters acquire in FIFO order, each section
/// runs to completion before the next queued caller starts, and a section
/// that returns an error releases the lock normally so the next caller
/// still runs.
#[derive(Debug, Default)]
pub struct UpdateMutex {
    inner: Mutex<()>,
}

impl UpdateMutex {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(()),
        }
    }

    /// Run `section` under mutual exclusion. The section itself is
    /// synchronous; the only suspension point is waiting for the lock.
    pub async fn run<T>(&self, section: impl FnOnce() -> T) -> T {
        let _guard = self.inner.lock().await;
        section()
    }
}
