//! 账本存储 Trait 定义
//!
//! 服务层依赖抽象而非具体实现：PostgreSQL 与内存实现共用同一组约束语义，
//! 也便于 mock 测试。

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{
    BadgeFilter, BadgeRecord, InstitutionLedger, MilestoneRecord, NewBadge, NewMilestone,
    NewRewardTransaction, PendingMint, RewardTransaction, Tier,
};

/// 带唯一约束的插入结果
///
/// 约束冲突不是错误：调用方把 `Duplicate` 当作“已经完成”
#[derive(Debug, Clone, PartialEq)]
pub enum InsertOutcome<T> {
    Inserted(T),
    Duplicate,
}

impl<T> InsertOutcome<T> {
    pub fn inserted(self) -> Option<T> {
        match self {
            Self::Inserted(value) => Some(value),
            Self::Duplicate => None,
        }
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::Duplicate)
    }
}

/// 账本存储
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// 开启一个工作单元
    async fn begin(&self) -> Result<Box<dyn LedgerTransaction>>;

    // 机构
    async fn find_institution(&self, wallet_address: &str) -> Result<Option<InstitutionLedger>>;
    /// 按证书数降序、创建顺序升序排列
    async fn leaderboard(&self, limit: i64) -> Result<Vec<InstitutionLedger>>;

    // 徽章
    async fn find_badge(&self, institution_id: i64, tier: Tier) -> Result<Option<BadgeRecord>>;
    /// 按铸造时间倒序
    async fn list_badges(&self, filter: &BadgeFilter) -> Result<Vec<BadgeRecord>>;

    // 里程碑
    /// 按达成时间倒序
    async fn list_milestones(&self, institution_id: i64) -> Result<Vec<MilestoneRecord>>;
    /// 尚未关联徽章的里程碑，按达成时间正序
    async fn list_unlinked_milestones(&self, limit: i64) -> Result<Vec<PendingMint>>;

    // 流水
    /// 按创建时间倒序，返回最近的 limit 条
    async fn list_transactions(
        &self,
        institution_id: i64,
        limit: i64,
    ) -> Result<Vec<RewardTransaction>>;
}

/// 账本工作单元
///
/// 未调用 `commit` 即被 drop 时，全部写入回滚。
#[async_trait]
pub trait LedgerTransaction: Send {
    /// 锁定机构行，不存在时以给定名称创建；返回 (账本, 是否新建)
    async fn lock_or_create_institution(
        &mut self,
        wallet_address: &str,
        institution_name: &str,
    ) -> Result<(InstitutionLedger, bool)>;

    /// 锁定已存在的机构行
    async fn lock_institution(&mut self, wallet_address: &str)
    -> Result<Option<InstitutionLedger>>;

    /// 写回计数、积分、等级、徽章缓存与更新时间
    async fn update_institution(&mut self, ledger: &InstitutionLedger) -> Result<()>;

    async fn append_transaction(
        &mut self,
        transaction: &NewRewardTransaction,
    ) -> Result<RewardTransaction>;

    /// (institution_id, threshold) 冲突时返回 `Duplicate`
    async fn insert_milestone(
        &mut self,
        milestone: &NewMilestone,
    ) -> Result<InsertOutcome<MilestoneRecord>>;

    /// (institution_id, tier) 冲突时返回 `Duplicate`
    async fn insert_badge(&mut self, badge: &NewBadge) -> Result<InsertOutcome<BadgeRecord>>;

    /// 仅当里程碑尚未关联徽章时写入关联，返回是否写入
    async fn link_milestone_badge(&mut self, milestone_id: i64, badge_id: i64) -> Result<bool>;

    async fn commit(self: Box<Self>) -> Result<()>;
}
