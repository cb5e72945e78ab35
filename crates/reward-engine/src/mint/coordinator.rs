//! 徽章铸造协调器
//!
//! 负责“里程碑 → 链上徽章”的最后一步：
//!
//! 1. 同一 (机构, 等级) 的铸造在进程内串行
//! 2. 已有徽章时只补写里程碑关联，绝不重复铸造
//! 3. 外部铸造失败、超时或未确认时推迟，里程碑保持未关联，等待补铸扫描
//! 4. 确认成功后在一个工作单元内写入徽章、关联里程碑、追加 NFT_MINTED 流水并更新徽章缓存
//!
//! 铸造失败从不影响已提交的积分与里程碑。

use std::sync::Arc;
use std::time::{Duration, Instant};

use reward_shared::config::MintConfig;
use reward_shared::observability::metrics;
use serde_json::{Map, Value};
use tracing::{debug, info, instrument, warn};

use super::gateway::{BadgeMinter, MintCall, MintError, MintReceipt, metadata_uri};
use crate::error::{Result, RewardError};
use crate::lock::LockManager;
use crate::models::{
    BadgeMetadata, BadgeRecord, BadgeSummary, NewBadge, NewRewardTransaction, PendingMint, Tier,
};
use crate::repository::{InsertOutcome, LedgerStore};

/// 铸造请求
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MintRequest {
    pub milestone_id: i64,
    pub institution_id: i64,
    pub wallet_address: String,
    pub institution_name: String,
    pub threshold: i64,
    pub tier: Tier,
    /// 跨越阈值时的证书数
    pub certificate_count: i64,
}

impl From<PendingMint> for MintRequest {
    fn from(pending: PendingMint) -> Self {
        Self {
            milestone_id: pending.milestone_id,
            institution_id: pending.institution_id,
            wallet_address: pending.wallet_address,
            institution_name: pending.institution_name,
            threshold: pending.threshold,
            tier: pending.tier,
            certificate_count: pending.certificate_count,
        }
    }
}

/// 补铸扫描结果
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetrySummary {
    /// 扫描到的未关联里程碑
    pub scanned: usize,
    /// 已关联徽章（新铸造或补写关联）
    pub minted: usize,
    /// 仍然推迟
    pub deferred: usize,
    /// 存储错误
    pub failed: usize,
}

/// 铸造协调器
pub struct MintCoordinator {
    store: Arc<dyn LedgerStore>,
    minter: Option<Arc<dyn BadgeMinter>>,
    locks: LockManager,
    metadata_base_url: String,
    confirm_timeout: Duration,
}

impl MintCoordinator {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        minter: Option<Arc<dyn BadgeMinter>>,
        config: &MintConfig,
    ) -> Self {
        Self {
            store,
            minter,
            locks: LockManager::new(),
            metadata_base_url: config.metadata_base_url.clone(),
            confirm_timeout: config.confirm_timeout(),
        }
    }

    /// 是否具备铸造能力
    pub fn is_available(&self) -> bool {
        self.minter.is_some()
    }

    /// 为一个已达成的里程碑铸造徽章
    ///
    /// 返回 `Ok(None)` 表示本次推迟（铸造能力缺失、失败、超时或未确认）。
    /// 只有存储故障才返回错误。
    #[instrument(
        skip(self, request),
        fields(wallet = %request.wallet_address, tier = %request.tier, milestone_id = request.milestone_id)
    )]
    pub async fn mint_badge(&self, request: &MintRequest) -> Result<Option<BadgeRecord>> {
        let tier_index = request.tier.index().ok_or_else(|| {
            RewardError::InvalidInput(format!("等级 {} 没有对应的徽章", request.tier))
        })?;

        let Some(minter) = self.minter.as_ref() else {
            return Ok(defer(
                request,
                "deferred",
                RewardError::MintUnavailable("未配置铸造中继".to_string()),
            ));
        };

        let lock_key = format!("mint:{}:{}", request.institution_id, request.tier);
        let _guard = self.locks.acquire(&lock_key).await;

        if let Some(existing) = self
            .store
            .find_badge(request.institution_id, request.tier)
            .await?
        {
            debug!(token_id = existing.token_id, "Badge already minted, linking milestone");
            self.link_existing(request, &existing).await?;
            metrics::record_badge_mint(request.tier.as_str(), "already_minted");
            return Ok(Some(existing));
        }

        let call = MintCall {
            to_address: request.wallet_address.clone(),
            institution_name: request.institution_name.clone(),
            tier_index,
            certificate_count: request.certificate_count,
            metadata_uri: metadata_uri(
                &self.metadata_base_url,
                &request.wallet_address,
                request.tier,
            ),
        };

        let start = Instant::now();
        let receipt = match tokio::time::timeout(self.confirm_timeout, minter.mint(&call)).await {
            Ok(Ok(receipt)) if receipt.confirmed => receipt,
            Ok(Ok(receipt)) => {
                return Ok(defer(
                    request,
                    "unconfirmed",
                    RewardError::MintUnavailable(format!(
                        "交易未确认: {}",
                        receipt.transaction_reference
                    )),
                ));
            }
            Ok(Err(e)) => {
                return Ok(defer(request, e.outcome_label(), e.into()));
            }
            Err(_) => {
                let timeout = MintError::Timeout {
                    seconds: self.confirm_timeout.as_secs(),
                };
                return Ok(defer(request, timeout.outcome_label(), timeout.into()));
            }
        };

        let badge = self.persist_badge(request, &call, receipt).await?;
        metrics::record_badge_mint(request.tier.as_str(), "minted");
        info!(
            token_id = badge.token_id,
            tx = %badge.transaction_reference,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Badge minted"
        );
        Ok(Some(badge))
    }

    /// 为所有未关联徽章的里程碑重新尝试铸造
    #[instrument(skip(self))]
    pub async fn retry_pending(&self, limit: i64) -> Result<RetrySummary> {
        let mut summary = RetrySummary::default();
        if !self.is_available() {
            debug!("Mint capability unavailable, skipping pending sweep");
            return Ok(summary);
        }

        let pending = self.store.list_unlinked_milestones(limit).await?;
        summary.scanned = pending.len();

        for item in pending {
            let request = MintRequest::from(item);
            match self.mint_badge(&request).await {
                Ok(Some(_)) => summary.minted += 1,
                Ok(None) => summary.deferred += 1,
                Err(e) => {
                    warn!(
                        milestone_id = request.milestone_id,
                        error = %e,
                        "Pending mint retry failed"
                    );
                    summary.failed += 1;
                }
            }
        }

        if summary.scanned > 0 {
            info!(
                scanned = summary.scanned,
                minted = summary.minted,
                deferred = summary.deferred,
                failed = summary.failed,
                "Pending mint sweep finished"
            );
        }
        Ok(summary)
    }

    /// 徽章已存在时只补写里程碑关联
    async fn link_existing(&self, request: &MintRequest, badge: &BadgeRecord) -> Result<()> {
        let mut tx = self.store.begin().await?;
        let linked = tx
            .link_milestone_badge(request.milestone_id, badge.id)
            .await?;
        tx.commit().await?;

        if linked {
            info!(token_id = badge.token_id, "Milestone linked to existing badge");
        }
        Ok(())
    }

    /// 在一个工作单元内落库铸造结果
    async fn persist_badge(
        &self,
        request: &MintRequest,
        call: &MintCall,
        receipt: MintReceipt,
    ) -> Result<BadgeRecord> {
        let mut extra = Map::new();
        extra.insert("threshold".to_string(), Value::from(request.threshold));

        let new_badge = NewBadge {
            institution_id: request.institution_id,
            token_id: receipt.token_id,
            tier: request.tier,
            certificate_count_at_mint: request.certificate_count,
            transaction_reference: receipt.transaction_reference,
            block_reference: receipt.block_reference,
            metadata_uri: call.metadata_uri.clone(),
            metadata: BadgeMetadata {
                institution_name: request.institution_name.clone(),
                tier: request.tier,
                certificate_count: request.certificate_count,
                token_id: receipt.token_id,
                extra,
            },
        };

        let mut tx = self.store.begin().await?;
        let mut ledger = tx
            .lock_institution(&request.wallet_address)
            .await?
            .ok_or_else(|| RewardError::InstitutionNotFound(request.wallet_address.clone()))?;

        let badge = match tx.insert_badge(&new_badge).await? {
            InsertOutcome::Inserted(badge) => badge,
            InsertOutcome::Duplicate => {
                // 其他实例已经写入同等级徽章，视为已满足
                drop(tx);
                let suppressed = RewardError::DuplicateSuppressed {
                    entity: "badge",
                    key: format!("{}:{}", request.institution_id, request.tier),
                };
                warn!(
                    token_id = new_badge.token_id,
                    reason = %suppressed,
                    "Badge for this tier was recorded concurrently, keeping the stored one"
                );
                let existing = self
                    .store
                    .find_badge(request.institution_id, request.tier)
                    .await?
                    .ok_or_else(|| {
                        RewardError::Internal(format!(
                            "徽章唯一约束冲突后未找到记录: institution={} tier={}",
                            request.institution_id, request.tier
                        ))
                    })?;
                self.link_existing(request, &existing).await?;
                return Ok(existing);
            }
        };

        tx.link_milestone_badge(request.milestone_id, badge.id)
            .await?;
        tx.append_transaction(&NewRewardTransaction::nft_minted(&badge))
            .await?;

        if !ledger.has_badge_summary(badge.tier) {
            ledger.badges_earned.push(BadgeSummary {
                tier: badge.tier,
                token_id: badge.token_id,
                certificate_count: badge.certificate_count_at_mint,
                minted_at: badge.minted_at,
            });
        }
        ledger.updated_at = chrono::Utc::now();
        tx.update_institution(&ledger).await?;
        tx.commit().await?;

        Ok(badge)
    }
}

/// 记录一次推迟的铸造；里程碑保持未关联，等待补铸扫描
fn defer(request: &MintRequest, outcome: &str, reason: RewardError) -> Option<BadgeRecord> {
    warn!(
        milestone_id = request.milestone_id,
        outcome = outcome,
        error = %reason,
        "Badge mint deferred"
    );
    metrics::record_badge_mint(request.tier.as_str(), outcome);
    None
}
