//! 奖励服务
//!
//! 处理证书签发通知，是机构计数与里程碑记录的唯一写入方：
//! - 输入校验与钱包地址规范化
//! - 同一机构的通知串行执行（进程内键控锁 + 存储层行锁）
//! - 计数、积分、等级、流水与里程碑在一个工作单元内提交
//! - 里程碑唯一约束作为幂等兜底
//! - 提交后异步分发徽章铸造，失败不影响签发结果
//!
//! ## 签发流程
//!
//! 1. 解析或创建机构账本 -> 2. 计数加一、积分累加、重算等级
//!    -> 3. 追加 CERTIFICATE_ISSUED 流水 -> 4. 检测跨越的里程碑并逐个落库
//!    -> 5. 提交 -> 6. 分发铸造（异步）

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use reward_shared::config::RewardConfig;
use reward_shared::observability::metrics;
use tracing::{debug, info, instrument};

use crate::error::{Result, RewardError};
use crate::lock::LockManager;
use crate::mint::{MintDispatcher, MintRequest};
use crate::models::{InstitutionLedger, MilestoneRecord, NewMilestone, NewRewardTransaction};
use crate::repository::{InsertOutcome, LedgerStore};
use crate::service::dto::RegisteredWallet;
use crate::tier::{self, Milestone};

/// 规范化钱包地址：去除首尾空白并转为小写
pub(crate) fn normalize_wallet(wallet_address: &str) -> Result<String> {
    let wallet = wallet_address.trim();
    if wallet.is_empty() {
        return Err(RewardError::InvalidInput("钱包地址不能为空".to_string()));
    }
    Ok(wallet.to_lowercase())
}

/// 机构展示名称，为空时使用 `Institution {钱包前 8 位}`
fn display_name(wallet_address: &str, institution_name: &str) -> String {
    let name = institution_name.trim();
    if name.is_empty() {
        let prefix: String = wallet_address.chars().take(8).collect();
        format!("Institution {}", prefix)
    } else {
        name.to_string()
    }
}

fn lock_key(wallet_address: &str) -> String {
    format!("institution:{}", wallet_address)
}

/// 奖励服务
pub struct RewardService {
    store: Arc<dyn LedgerStore>,
    locks: LockManager,
    points_per_certificate: i64,
    /// 铸造分发器（可选，未配置时里程碑留待补铸扫描处理）
    mint_dispatcher: Option<MintDispatcher>,
}

impl RewardService {
    pub fn new(store: Arc<dyn LedgerStore>, config: &RewardConfig) -> Self {
        Self {
            store,
            locks: LockManager::new(),
            points_per_certificate: config.points_per_certificate,
            mint_dispatcher: None,
        }
    }

    pub fn with_mint_dispatcher(mut self, dispatcher: MintDispatcher) -> Self {
        self.mint_dispatcher = Some(dispatcher);
        self
    }

    /// 记录一次证书签发
    ///
    /// 返回更新后的账本快照。参数非法时返回 `InvalidInput`，存储故障时返回
    /// `LedgerUnavailable` 且本次通知整体未生效，调用方可完整重试。
    #[instrument(
        skip(self, institution_name),
        fields(wallet = %wallet_address, certificate = %certificate_reference)
    )]
    pub async fn record_issuance(
        &self,
        wallet_address: &str,
        institution_name: &str,
        certificate_reference: &str,
    ) -> Result<InstitutionLedger> {
        let start = Instant::now();
        let result = self
            .apply_issuance(wallet_address, institution_name, certificate_reference)
            .await;

        let outcome = match &result {
            Ok(_) => "applied".to_string(),
            Err(e) => e.error_code().to_lowercase(),
        };
        metrics::record_issuance(&outcome, start.elapsed().as_secs_f64());

        result
    }

    async fn apply_issuance(
        &self,
        wallet_address: &str,
        institution_name: &str,
        certificate_reference: &str,
    ) -> Result<InstitutionLedger> {
        let wallet = normalize_wallet(wallet_address)?;
        let certificate_reference = certificate_reference.trim();
        if certificate_reference.is_empty() {
            return Err(RewardError::InvalidInput("证书引用不能为空".to_string()));
        }
        let name = display_name(&wallet, institution_name);

        let _guard = self.locks.acquire(&lock_key(&wallet)).await;
        let mut tx = self.store.begin().await?;

        // 1. 解析或创建账本，名称以首次写入为准
        let (mut ledger, created) = tx.lock_or_create_institution(&wallet, &name).await?;
        if created {
            info!(wallet = %wallet, name = %ledger.institution_name, "机构账本已创建");
        }

        // 2. 计数、积分、等级
        let old_count = ledger.total_certificates_issued;
        let new_count = old_count + 1;
        ledger.total_certificates_issued = new_count;
        ledger.reward_points += self.points_per_certificate;
        ledger.current_tier = tier::tier_for(new_count);
        ledger.updated_at = Utc::now();

        // 3. 签发流水
        tx.append_transaction(&NewRewardTransaction::certificate_issued(
            ledger.id,
            self.points_per_certificate,
            certificate_reference,
        ))
        .await?;

        // 4. 里程碑：区间检测 + 唯一约束兜底
        let mut reached: Vec<(MilestoneRecord, Milestone)> = Vec::new();
        for milestone in tier::detect_crossings(old_count, new_count) {
            let outcome = tx
                .insert_milestone(&NewMilestone {
                    institution_id: ledger.id,
                    threshold: milestone.threshold,
                    tier_achieved: milestone.tier,
                    certificate_count: new_count,
                })
                .await?;

            match outcome {
                InsertOutcome::Inserted(record) => {
                    ledger.reward_points += milestone.bonus_points;
                    tx.append_transaction(&NewRewardTransaction::milestone_reached(
                        ledger.id, &milestone,
                    ))
                    .await?;
                    reached.push((record, milestone));
                }
                InsertOutcome::Duplicate => {
                    let suppressed = RewardError::DuplicateSuppressed {
                        entity: "milestone",
                        key: format!("{}:{}", ledger.id, milestone.threshold),
                    };
                    debug!(reason = %suppressed, "里程碑已记录，跳过");
                }
            }
        }

        tx.update_institution(&ledger).await?;
        tx.commit().await?;

        // 5. 提交后分发铸造
        for (record, milestone) in reached {
            info!(
                wallet = %wallet,
                threshold = milestone.threshold,
                tier = %milestone.tier,
                bonus_points = milestone.bonus_points,
                "里程碑达成"
            );
            metrics::record_milestone(milestone.tier.as_str());
            self.dispatch_mint(&ledger, &record);
        }

        Ok(ledger)
    }

    /// 把铸造请求交给分发器，不等待结果
    fn dispatch_mint(&self, ledger: &InstitutionLedger, milestone: &MilestoneRecord) {
        let Some(dispatcher) = self.mint_dispatcher.as_ref() else {
            debug!(milestone_id = milestone.id, "未配置铸造分发器，里程碑等待补铸扫描");
            return;
        };

        dispatcher.dispatch(MintRequest {
            milestone_id: milestone.id,
            institution_id: ledger.id,
            wallet_address: ledger.wallet_address.clone(),
            institution_name: ledger.institution_name.clone(),
            threshold: milestone.threshold,
            tier: milestone.tier_achieved,
            certificate_count: milestone.certificate_count,
        });
    }

    /// 注册钱包
    ///
    /// 幂等：已注册的钱包直接返回现有账本，名称不变
    #[instrument(skip(self, institution_name), fields(wallet = %wallet_address))]
    pub async fn register_wallet(
        &self,
        wallet_address: &str,
        institution_name: &str,
    ) -> Result<RegisteredWallet> {
        let wallet = normalize_wallet(wallet_address)?;
        let name = display_name(&wallet, institution_name);

        let mut tx = self.store.begin().await?;
        let (ledger, created) = tx.lock_or_create_institution(&wallet, &name).await?;
        tx.commit().await?;

        if created {
            info!(wallet = %wallet, name = %ledger.institution_name, "钱包注册成功");
        } else {
            debug!(wallet = %wallet, "钱包已注册，返回现有账本");
        }

        Ok(RegisteredWallet { ledger, created })
    }

    /// 发放额外积分
    ///
    /// 追加 BONUS_POINTS 流水，不影响证书计数与等级
    #[instrument(skip(self, reason), fields(wallet = %wallet_address, points = points))]
    pub async fn award_bonus_points(
        &self,
        wallet_address: &str,
        points: i64,
        reason: &str,
    ) -> Result<InstitutionLedger> {
        let wallet = normalize_wallet(wallet_address)?;
        if points <= 0 {
            return Err(RewardError::InvalidInput(format!(
                "额外积分必须大于0: {}",
                points
            )));
        }
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(RewardError::InvalidInput("积分发放原因不能为空".to_string()));
        }

        let _guard = self.locks.acquire(&lock_key(&wallet)).await;
        let mut tx = self.store.begin().await?;

        let mut ledger = tx
            .lock_institution(&wallet)
            .await?
            .ok_or_else(|| RewardError::InstitutionNotFound(wallet.clone()))?;

        ledger.reward_points += points;
        ledger.updated_at = Utc::now();
        tx.append_transaction(&NewRewardTransaction::bonus_points(ledger.id, points, reason))
            .await?;
        tx.update_institution(&ledger).await?;
        tx.commit().await?;

        metrics::record_bonus_award();
        info!(
            wallet = %wallet,
            points = points,
            total_points = ledger.reward_points,
            "额外积分发放成功"
        );

        Ok(ledger)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Tier, TransactionType};
    use crate::repository::{InMemoryLedgerStore, LedgerTransaction, MockLedgerStore};

    fn service_with(store: Arc<dyn LedgerStore>) -> RewardService {
        RewardService::new(store, &RewardConfig::default())
    }

    #[test]
    fn test_normalize_wallet() {
        assert_eq!(normalize_wallet("  0xABCdef ").unwrap(), "0xabcdef");
        assert!(matches!(
            normalize_wallet("   "),
            Err(RewardError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_display_name_default() {
        assert_eq!(
            display_name("0x1234567890abcdef", ""),
            "Institution 0x123456"
        );
        assert_eq!(display_name("0xab", "  "), "Institution 0xab");
        assert_eq!(display_name("0xab", " MIT "), "MIT");
    }

    #[tokio::test]
    async fn test_invalid_input_never_touches_store() {
        // 未设置任何期望，任何存储调用都会 panic
        let service = service_with(Arc::new(MockLedgerStore::new()));

        let err = service.record_issuance("", "MIT", "0xcert").await.unwrap_err();
        assert!(matches!(err, RewardError::InvalidInput(_)));

        let err = service.record_issuance("0xabc", "MIT", "  ").await.unwrap_err();
        assert!(matches!(err, RewardError::InvalidInput(_)));

        let err = service
            .award_bonus_points("0xabc", 0, "launch")
            .await
            .unwrap_err();
        assert!(matches!(err, RewardError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_storage_failure_surfaces_as_ledger_unavailable() {
        let mut store = MockLedgerStore::new();
        store
            .expect_begin()
            .returning(|| Err(RewardError::LedgerUnavailable("pool timed out".to_string())));
        let service = service_with(Arc::new(store));

        let err = service
            .record_issuance("0xabc", "MIT", "0xcert")
            .await
            .unwrap_err();
        assert!(matches!(err, RewardError::LedgerUnavailable(_)));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_first_issuance_creates_ledger() {
        let store = InMemoryLedgerStore::new();
        let service = service_with(Arc::new(store.clone()));

        let ledger = service
            .record_issuance("0xABC", "Test University", "0xcert1")
            .await
            .unwrap();
        assert_eq!(ledger.wallet_address, "0xabc");
        assert_eq!(ledger.total_certificates_issued, 1);
        assert_eq!(ledger.reward_points, 10);
        assert_eq!(ledger.current_tier, Tier::None);

        // 名称以首次写入为准
        let ledger = service
            .record_issuance("0xabc", "Renamed", "0xcert2")
            .await
            .unwrap();
        assert_eq!(ledger.institution_name, "Test University");
    }

    #[tokio::test]
    async fn test_register_wallet_is_idempotent() {
        let store = InMemoryLedgerStore::new();
        let service = service_with(Arc::new(store));

        let first = service.register_wallet("0xABCDEF1234", "").await.unwrap();
        assert!(first.created);
        assert_eq!(first.ledger.institution_name, "Institution 0xabcdef");

        let second = service
            .register_wallet("0xabcdef1234", "Other")
            .await
            .unwrap();
        assert!(!second.created);
        assert_eq!(second.ledger.id, first.ledger.id);
        assert_eq!(second.ledger.institution_name, "Institution 0xabcdef");
    }

    #[tokio::test]
    async fn test_award_bonus_points() {
        let store = InMemoryLedgerStore::new();
        let service = service_with(Arc::new(store.clone()));

        let err = service
            .award_bonus_points("0xmissing", 50, "launch")
            .await
            .unwrap_err();
        assert!(matches!(err, RewardError::InstitutionNotFound(_)));

        service.register_wallet("0xabc", "MIT").await.unwrap();
        let ledger = service
            .award_bonus_points("0xABC", 50, "launch campaign")
            .await
            .unwrap();
        assert_eq!(ledger.reward_points, 50);
        assert_eq!(ledger.total_certificates_issued, 0);

        let transactions = store.list_transactions(ledger.id, 10).await.unwrap();
        assert_eq!(transactions.len(), 1);
        assert_eq!(transactions[0].transaction_type, TransactionType::BonusPoints);
        assert_eq!(transactions[0].description, "Bonus points: launch campaign");
    }

    #[tokio::test]
    async fn test_recorded_milestone_is_not_awarded_again() {
        let store = InMemoryLedgerStore::new();
        let service = service_with(Arc::new(store.clone()));

        for i in 0..9 {
            service
                .record_issuance("0xreplay", "Replay College", &format!("cert-{}", i))
                .await
                .unwrap();
        }

        // 里程碑已由先前的投递写入，账本计数尚未推进
        let ledger = store.find_institution("0xreplay").await.unwrap().unwrap();
        let mut tx = store.begin().await.unwrap();
        let seeded = tx
            .insert_milestone(&NewMilestone {
                institution_id: ledger.id,
                threshold: 10,
                tier_achieved: Tier::Bronze,
                certificate_count: 10,
            })
            .await
            .unwrap();
        assert!(!seeded.is_duplicate());
        tx.commit().await.unwrap();

        let ledger = service
            .record_issuance("0xreplay", "Replay College", "cert-9")
            .await
            .unwrap();

        assert_eq!(ledger.total_certificates_issued, 10);
        assert_eq!(ledger.current_tier, Tier::Bronze);
        assert_eq!(ledger.reward_points, 100);

        let milestones = store.list_milestones(ledger.id).await.unwrap();
        assert_eq!(milestones.len(), 1);

        let transactions = store.list_transactions(ledger.id, 100).await.unwrap();
        assert!(
            transactions
                .iter()
                .all(|t| t.transaction_type != TransactionType::MilestoneReached)
        );
        let sum: i64 = transactions
            .iter()
            .filter(|t| t.transaction_type.counts_toward_points())
            .map(|t| t.points_delta)
            .sum();
        assert_eq!(sum, ledger.reward_points);
    }
}
