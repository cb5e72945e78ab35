//! 机构奖励账本与里程碑引擎
//!
//! 按证书签发量为签发机构累积积分、推导等级，在跨越里程碑时发放一次性奖励
//! 并异步铸造链上徽章。
//!
//! ## 核心功能
//!
//! - **签发记账**：每张证书计数加一、累加积分、重算等级，全部写入只追加的流水
//! - **里程碑检测**：按区间 `(old, new]` 检测阈值跨越，批量增量也不会漏掉里程碑
//! - **恰好一次**：(机构, 阈值) 与 (机构, 等级) 唯一约束是防重复奖励与重复铸造的最终依据
//! - **徽章铸造**：签发提交后异步分发，外部铸造失败只推迟徽章，不影响积分与等级
//! - **补铸扫描**：定期为未关联徽章的里程碑重新铸造
//! - **查询**：机构统计、排行榜、徽章与流水列表
//!
//! ## 模块结构
//!
//! - `models`: 领域模型定义
//! - `error`: 错误类型定义
//! - `tier`: 等级计算与里程碑检测（纯函数）
//! - `repository`: 账本存储层
//! - `lock`: 进程内键控锁
//! - `mint`: 徽章铸造
//! - `service`: 业务服务层
//! - `engine`: 服务装配

pub mod engine;
pub mod error;
pub mod lock;
pub mod mint;
pub mod models;
pub mod repository;
pub mod service;
pub mod tier;

pub use engine::RewardEngine;
pub use error::{Result, RewardError};
pub use lock::{LockGuard, LockManager};
pub use mint::{
    BadgeMinter, HttpMintGateway, MintCall, MintCoordinator, MintDispatcher, MintError,
    MintReceipt, MintRequest, MintSweeper, RetrySummary,
};
pub use models::*;
pub use repository::{
    InMemoryLedgerStore, InsertOutcome, LedgerStore, LedgerTransaction, MIGRATOR, PgLedgerStore,
};
pub use service::{RewardQueryService, RewardService, dto};
