//! Serialized write lock for the primary document.
//!
//! Every read-modify-write of the primary document suspends at its storage
//! calls. Without serialization two writers could both read the same
//! document and the later write would silently drop the earlier one's
//! change. [`WriteLock::acquire`] queues critical sections in call order and
//! runs each to completion, awaited I/O included, before the next starts.
//!
//! There is no timeout: a critical section that never finishes blocks every
//! later writer.

use std::future::Future;

use tokio::sync::Mutex;

/// FIFO asynchronous mutex guarding primary-document writes.
#[derive(Debug, Default)]
pub struct WriteLock {
    queue: Mutex<()>,
}

impl WriteLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `critical_section` once every earlier caller has finished.
    ///
    /// Waiters are served strictly in the order they called `acquire`. The
    /// lock is released when the section returns, including on error, and
    /// when its future is dropped.
    pub async fn acquire<F, Fut, T>(&self, critical_section: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let _guard = self.queue.lock().await;
        critical_section().await
    }

    /// Whether a critical section is running right now.
    pub fn is_held(&self) -> bool {
        self.queue.try_lock().is_err()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn critical_sections_run_in_submission_order() {
        let lock = Arc::new(WriteLock::new());
        let log = Arc::new(Mutex::new(Vec::new()));

        let mut handles = Vec::new();
        for index in 0..8u64 {
            let lock = Arc::clone(&lock);
            let log = Arc::clone(&log);
            handles.push(tokio::spawn(async move {
                lock.acquire(|| async move {
                    log.lock().await.push(format!("start-{index}"));
                    // Later sections finish their I/O sooner; order must hold anyway.
                    tokio::time::sleep(Duration::from_millis(16 - index * 2)).await;
                    log.lock().await.push(format!("end-{index}"));
                })
                .await;
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let expected: Vec<String> = (0..8)
            .flat_map(|index| [format!("start-{index}"), format!("end-{index}")])
            .collect();
        assert_eq!(*log.lock().await, expected);
    }

    #[tokio::test]
    async fn failing_section_releases_the_lock() {
        let lock = WriteLock::new();
        let failed: Result<(), &str> = lock.acquire(|| async { Err("boom") }).await;
        assert!(failed.is_err());
        assert!(!lock.is_held());

        let value = lock.acquire(|| async { 7 }).await;
        assert_eq!(value, 7);
    }

    #[tokio::test]
    async fn is_held_reports_running_section() {
        let lock = WriteLock::new();
        lock.acquire(|| async {
            assert!(lock.is_held());
        })
        .await;
        assert!(!lock.is_held());
    }
}
