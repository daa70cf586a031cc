//! Dynamic<T> - a single-writer snapshot with change notification
//!
//! Readers take cheap snapshots with [`Dynamic::get`]. Observers hold a
//! [`Subscription`] that can be polled synchronously or awaited. Rapid
//! updates coalesce: a subscription sees the latest value, not every value.

use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

struct DynamicInner<T> {
    value: RwLock<T>,
    /// Incremented after every write.
    version: AtomicU64,
    changed: Notify,
}

/// A shared value that can be observed for changes.
///
/// Clones share the same underlying value.
#[derive(Clone)]
pub struct Dynamic<T> {
    inner: Arc<DynamicInner<T>>,
}

impl<T: Clone + Send + Sync + 'static> Dynamic<T> {
    /// Create a new Dynamic with the given initial value.
    pub fn new(value: T) -> Self {
        Self {
            inner: Arc::new(DynamicInner {
                value: RwLock::new(value),
                version: AtomicU64::new(0),
                changed: Notify::new(),
            }),
        }
    }

    /// Snapshot of the current value.
    pub fn get(&self) -> T {
        self.inner.value.read().clone()
    }

    /// Number of writes so far.
    pub fn version(&self) -> u64 {
        self.inner.version.load(Ordering::Acquire)
    }

    /// Replace the value and wake every waiting subscription.
    pub fn set(&self, value: T) {
        *self.inner.value.write() = value;
        self.inner.version.fetch_add(1, Ordering::Release);
        self.inner.changed.notify_waiters();
    }

    /// Subscribe to changes made after this call.
    pub fn subscribe(&self) -> Subscription<T> {
        Subscription {
            source: self.inner.clone(),
            last_version: self.inner.version.load(Ordering::Acquire),
        }
    }
}

impl<T: Clone + Send + Sync + std::fmt::Debug + 'static> std::fmt::Debug for Dynamic<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dynamic")
            .field("value", &self.get())
            .field("version", &self.version())
            .finish()
    }
}

/// Observer of a [`Dynamic`] value.
pub struct Subscription<T> {
    source: Arc<DynamicInner<T>>,
    last_version: u64,
}

impl<T: Clone + Send + Sync + 'static> Subscription<T> {
    /// Whether the source changed since the last poll.
    pub fn has_changed(&self) -> bool {
        self.source.version.load(Ordering::Acquire) > self.last_version
    }

    /// Latest value if it changed since the last poll.
    pub fn poll(&mut self) -> Option<T> {
        let current = self.source.version.load(Ordering::Acquire);
        if current > self.last_version {
            self.last_version = current;
            Some(self.source.value.read().clone())
        } else {
            None
        }
    }

    /// Current value regardless of change.
    pub fn get(&self) -> T {
        self.source.value.read().clone()
    }

    /// Wait until the source changes, then return the latest value.
    pub async fn changed(&mut self) -> T {
        let source = self.source.clone();
        loop {
            let notified = source.changed.notified();
            tokio::pin!(notified);
            // Register before checking so a write between the check and the
            // await is not missed.
            notified.as_mut().enable();
            if let Some(value) = self.poll() {
                return value;
            }
            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_dynamic_set_and_version() {
        let d = Dynamic::new(0);
        assert_eq!(d.version(), 0);
        d.set(5);
        assert_eq!(d.get(), 5);
        assert_eq!(d.version(), 1);
    }

    #[test]
    fn test_clone_shares_state() {
        let d1 = Dynamic::new(0);
        let d2 = d1.clone();
        d1.set(42);
        assert_eq!(d2.get(), 42);
    }

    #[test]
    fn test_subscription_poll_coalesces() {
        let d = Dynamic::new(0);
        let mut sub = d.subscribe();
        assert_eq!(sub.poll(), None);

        d.set(1);
        d.set(2);
        d.set(3);
        assert!(sub.has_changed());
        assert_eq!(sub.poll(), Some(3));
        assert_eq!(sub.poll(), None);
        assert_eq!(sub.get(), 3);
    }

    #[tokio::test]
    async fn test_changed_returns_pending_change_immediately() {
        let d = Dynamic::new("a");
        let mut sub = d.subscribe();
        d.set("b");
        assert_eq!(sub.changed().await, "b");
    }

    #[tokio::test]
    async fn test_changed_wakes_on_later_write() {
        let d = Dynamic::new(0u32);
        let mut sub = d.subscribe();
        let writer = d.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            writer.set(7);
        });
        let value = tokio::time::timeout(Duration::from_secs(5), sub.changed())
            .await
            .unwrap();
        assert_eq!(value, 7);
        task.await.unwrap();
    }
}
