//! 内存路径锁：串行化同一存储键上的并发写入。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::time;

/// Manages asynchronous mutexes keyed by storage key.
#[derive(Debug, Default)]
pub struct LockManager {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

#[derive(Debug)]
pub struct LockTimeout;

impl LockManager {
    pub fn new() -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// 在给定超时时间内获取路径锁。
    pub async fn lock_path_with_timeout(
        &self,
        key: &str,
        timeout: Duration,
    ) -> Result<OwnedMutexGuard<()>, LockTimeout> {
        let lock = {
            let mut locks = self.locks.lock().await;
            // Entries nobody holds or waits on are only referenced by the map.
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        time::timeout(timeout, lock.lock_owned())
            .await
            .map_err(|_| LockTimeout)
    }

    #[cfg(test)]
    async fn tracked(&self) -> usize {
        self.locks.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn same_key_waits_for_holder() {
        let manager = LockManager::new();
        let guard = manager
            .lock_path_with_timeout("a/x.txt", Duration::from_secs(1))
            .await
            .expect("first lock");

        let second = manager
            .lock_path_with_timeout("a/x.txt", Duration::from_millis(20))
            .await;
        assert!(second.is_err());

        drop(guard);
        manager
            .lock_path_with_timeout("a/x.txt", Duration::from_millis(20))
            .await
            .expect("lock after release");
    }

    #[tokio::test]
    async fn different_keys_do_not_contend() {
        let manager = LockManager::new();
        let _a = manager
            .lock_path_with_timeout("a.txt", Duration::from_secs(1))
            .await
            .expect("lock a");
        manager
            .lock_path_with_timeout("b.txt", Duration::from_millis(20))
            .await
            .expect("lock b");
    }

    #[tokio::test]
    async fn released_entries_are_pruned() {
        let manager = LockManager::new();
        for key in ["a", "b", "c"] {
            let _guard = manager
                .lock_path_with_timeout(key, Duration::from_secs(1))
                .await
                .expect("lock");
        }
        let _held = manager
            .lock_path_with_timeout("d", Duration::from_secs(1))
            .await
            .expect("lock");
        assert_eq!(manager.tracked().await, 1);
    }
}
