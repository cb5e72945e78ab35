//! 奖励查询服务
//!
//! 机构统计、排行榜、徽章与流水查询，全部为只读操作，不调用外部服务。

use std::sync::Arc;

use reward_shared::config::RewardConfig;
use tracing::instrument;

use crate::error::Result;
use crate::models::BadgeFilter;
use crate::repository::LedgerStore;
use crate::service::dto::{
    BadgeDto, InstitutionStats, InstitutionSummaryDto, LeaderboardEntry, MilestoneDto,
    MilestoneEligibility, TransactionDto,
};
use crate::service::reward_service::normalize_wallet;

/// 奖励查询服务
pub struct RewardQueryService {
    store: Arc<dyn LedgerStore>,
    config: RewardConfig,
}

impl RewardQueryService {
    pub fn new(store: Arc<dyn LedgerStore>, config: RewardConfig) -> Self {
        Self { store, config }
    }

    /// 获取机构统计快照，钱包未注册时返回 None
    #[instrument(skip(self))]
    pub async fn get_institution_stats(
        &self,
        wallet_address: &str,
    ) -> Result<Option<InstitutionStats>> {
        let wallet = normalize_wallet(wallet_address)?;
        let Some(ledger) = self.store.find_institution(&wallet).await? else {
            return Ok(None);
        };

        let badges = self
            .store
            .list_badges(&BadgeFilter::by_wallet(wallet.as_str()))
            .await?;
        let milestones = self.store.list_milestones(ledger.id).await?;
        let transactions = self
            .store
            .list_transactions(ledger.id, self.config.recent_transactions_limit)
            .await?;

        Ok(Some(InstitutionStats {
            institution: InstitutionSummaryDto::from(&ledger),
            badges: badges.iter().map(BadgeDto::from).collect(),
            milestones: milestones.iter().map(MilestoneDto::from).collect(),
            recent_transactions: transactions.iter().map(TransactionDto::from).collect(),
        }))
    }

    /// 排行榜
    ///
    /// 按证书数降序，相同时先创建的机构排名靠前；名次为从 1 开始的位置序号。
    /// limit 缺省为配置的默认值，并限制在 `1..=leaderboard_max_limit`。
    #[instrument(skip(self))]
    pub async fn get_leaderboard(&self, limit: Option<i64>) -> Result<Vec<LeaderboardEntry>> {
        let limit = limit
            .unwrap_or(self.config.leaderboard_default_limit)
            .clamp(1, self.config.leaderboard_max_limit.max(1));

        let institutions = self.store.leaderboard(limit).await?;
        Ok(institutions
            .into_iter()
            .enumerate()
            .map(|(idx, ledger)| LeaderboardEntry {
                rank: idx + 1,
                badges_count: ledger.badges_earned.len(),
                institution_name: ledger.institution_name,
                wallet_address: ledger.wallet_address,
                total_certificates: ledger.total_certificates_issued,
                reward_points: ledger.reward_points,
                current_tier: ledger.current_tier,
            })
            .collect())
    }

    /// 徽章列表，可按钱包和等级过滤
    #[instrument(skip(self))]
    pub async fn list_badges(&self, filter: BadgeFilter) -> Result<Vec<BadgeDto>> {
        let filter = BadgeFilter {
            wallet_address: filter
                .wallet_address
                .as_deref()
                .map(normalize_wallet)
                .transpose()?,
            tier: filter.tier,
        };

        let badges = self.store.list_badges(&filter).await?;
        Ok(badges.iter().map(BadgeDto::from).collect())
    }

    /// 流水历史，按时间倒序
    ///
    /// limit 缺省为 `transaction_history_limit`，并以其为上限。钱包未注册时返回 None
    #[instrument(skip(self))]
    pub async fn list_transactions(
        &self,
        wallet_address: &str,
        limit: Option<i64>,
    ) -> Result<Option<Vec<TransactionDto>>> {
        let wallet = normalize_wallet(wallet_address)?;
        let Some(ledger) = self.store.find_institution(&wallet).await? else {
            return Ok(None);
        };

        let max = self.config.transaction_history_limit.max(1);
        let limit = limit.unwrap_or(max).clamp(1, max);
        let transactions = self.store.list_transactions(ledger.id, limit).await?;
        Ok(Some(transactions.iter().map(TransactionDto::from).collect()))
    }

    /// 里程碑资格检查
    ///
    /// 存在已达成但尚未关联徽章的里程碑时 `eligible_for_nft_mint` 为 true
    #[instrument(skip(self))]
    pub async fn check_milestone_eligibility(
        &self,
        wallet_address: &str,
    ) -> Result<Option<MilestoneEligibility>> {
        let wallet = normalize_wallet(wallet_address)?;
        let Some(ledger) = self.store.find_institution(&wallet).await? else {
            return Ok(None);
        };

        let milestones = self.store.list_milestones(ledger.id).await?;
        let pending_mints = milestones.iter().filter(|m| !m.has_badge()).count();

        Ok(Some(MilestoneEligibility {
            wallet_address: ledger.wallet_address.clone(),
            current_certificates: ledger.total_certificates_issued,
            next_milestone: ledger.next_milestone(),
            progress_percentage: ledger.milestone_progress(),
            current_tier: ledger.current_tier,
            pending_mints,
            eligible_for_nft_mint: pending_mints > 0,
        }))
    }
}
