//! 账本存储层
//!
//! 提供机构账本、里程碑、徽章与奖励流水的持久化接口。
//!
//! ## 设计原则
//!
//! - 存储只负责持久化与唯一约束，不包含业务逻辑
//! - 一次通知内的所有写入在同一个工作单元中提交或回滚
//! - 唯一约束冲突以 `InsertOutcome::Duplicate` 返回，由服务层视为已完成
//! - 定义 trait 接口以支持 mock 测试

mod memory_store;
mod pg_store;
mod traits;

pub use memory_store::{InMemoryLedgerStore, MemoryTransaction};
pub use pg_store::{MIGRATOR, PgLedgerStore, PgLedgerTransaction};
pub use traits::*;
