//! 键控互斥锁管理器

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

/// 键控锁管理器
///
/// 每个键对应一把异步互斥锁，按需创建；最后一个持有者释放后条目被移除，
/// 因此长期运行不会积累空闲的锁。
#[derive(Clone, Default)]
pub struct LockManager {
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl LockManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// 获取锁，被占用时等待
    pub async fn acquire(&self, key: &str) -> LockGuard {
        let mutex = self.entry(key);
        let guard = mutex.lock_owned().await;
        debug!(key = %key, "Keyed lock acquired");
        LockGuard::new(key.to_string(), guard, self.locks.clone())
    }

    /// 尝试获取锁，不等待
    pub fn try_acquire(&self, key: &str) -> Option<LockGuard> {
        let mutex = self.entry(key);
        let guard = mutex.try_lock_owned().ok()?;
        Some(LockGuard::new(key.to_string(), guard, self.locks.clone()))
    }

    /// 当前登记的键数量（持有中或等待中）
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }

    fn entry(&self, key: &str) -> Arc<Mutex<()>> {
        self.locks.entry(key.to_string()).or_default().clone()
    }
}

/// 锁守卫
///
/// drop 时释放锁，并在无人等待时清理条目
pub struct LockGuard {
    key: String,
    guard: Option<OwnedMutexGuard<()>>,
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl LockGuard {
    fn new(
        key: String,
        guard: OwnedMutexGuard<()>,
        locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
    ) -> Self {
        Self {
            key,
            guard: Some(guard),
            locks,
        }
    }

    /// 获取锁的 key
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        // 先释放互斥锁归还守卫持有的引用；克隆发生在分片锁内，计数为 1 说明无人等待
        self.guard.take();
        self.locks
            .remove_if(&self.key, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}
