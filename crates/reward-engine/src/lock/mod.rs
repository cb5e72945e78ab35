//! 进程内键控锁
//!
//! 同一个键上的临界区串行执行，不同键之间互不阻塞。
//!
//! ## 使用示例
//!
//! ```ignore
//! let locks = LockManager::new();
//!
//! let guard = locks.acquire("mint:0xabc:GOLD").await;
//! do_critical_work().await?;
//! drop(guard);
//! ```

mod keyed_lock;

pub use keyed_lock::{LockGuard, LockManager};
