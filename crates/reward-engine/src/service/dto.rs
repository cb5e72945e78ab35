//! 服务层数据传输对象
//!
//! 查询结果面向 API 层序列化，与内部领域模型解耦

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{
    BadgeRecord, InstitutionLedger, MilestoneRecord, RewardTransaction, Tier, TransactionType,
};

/// 钱包注册结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisteredWallet {
    pub ledger: InstitutionLedger,
    /// 本次调用是否新建了账本
    pub created: bool,
}

/// 机构统计快照
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstitutionStats {
    pub institution: InstitutionSummaryDto,
    /// 按铸造时间倒序
    pub badges: Vec<BadgeDto>,
    /// 按达成时间倒序
    pub milestones: Vec<MilestoneDto>,
    /// 最近的流水，按时间倒序
    pub recent_transactions: Vec<TransactionDto>,
}

/// 机构账本摘要
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstitutionSummaryDto {
    pub name: String,
    pub wallet_address: String,
    pub total_certificates: i64,
    pub reward_points: i64,
    pub current_tier: Tier,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_milestone: Option<i64>,
    pub milestone_progress: u8,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&InstitutionLedger> for InstitutionSummaryDto {
    fn from(ledger: &InstitutionLedger) -> Self {
        Self {
            name: ledger.institution_name.clone(),
            wallet_address: ledger.wallet_address.clone(),
            total_certificates: ledger.total_certificates_issued,
            reward_points: ledger.reward_points,
            current_tier: ledger.current_tier,
            next_milestone: ledger.next_milestone(),
            milestone_progress: ledger.milestone_progress(),
            created_at: ledger.created_at,
            updated_at: ledger.updated_at,
        }
    }
}

/// 徽章 DTO
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BadgeDto {
    pub token_id: i64,
    pub tier: Tier,
    pub certificate_count: i64,
    pub transaction_hash: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_number: Option<i64>,
    pub token_uri: String,
    pub minted_at: DateTime<Utc>,
}

impl From<&BadgeRecord> for BadgeDto {
    fn from(badge: &BadgeRecord) -> Self {
        Self {
            token_id: badge.token_id,
            tier: badge.tier,
            certificate_count: badge.certificate_count_at_mint,
            transaction_hash: badge.transaction_reference.clone(),
            block_number: badge.block_reference,
            token_uri: badge.metadata_uri.clone(),
            minted_at: badge.minted_at,
        }
    }
}

/// 里程碑 DTO
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MilestoneDto {
    /// 里程碑阈值
    pub count: i64,
    pub tier: Tier,
    /// 跨越阈值时的证书数
    pub certificate_count: i64,
    pub achieved_at: DateTime<Utc>,
    /// 是否已关联徽章
    pub has_nft: bool,
}

impl From<&MilestoneRecord> for MilestoneDto {
    fn from(milestone: &MilestoneRecord) -> Self {
        Self {
            count: milestone.threshold,
            tier: milestone.tier_achieved,
            certificate_count: milestone.certificate_count,
            achieved_at: milestone.achieved_at,
            has_nft: milestone.has_badge(),
        }
    }
}

/// 流水 DTO
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionDto {
    #[serde(rename = "type")]
    pub transaction_type: TransactionType,
    pub points: i64,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_hash: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<&RewardTransaction> for TransactionDto {
    fn from(tx: &RewardTransaction) -> Self {
        Self {
            transaction_type: tx.transaction_type,
            points: tx.points_delta,
            description: tx.description.clone(),
            transaction_hash: tx.external_reference.clone(),
            created_at: tx.created_at,
        }
    }
}

/// 排行榜条目
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    /// 从 1 开始的名次
    pub rank: usize,
    pub institution_name: String,
    pub wallet_address: String,
    pub total_certificates: i64,
    pub reward_points: i64,
    pub current_tier: Tier,
    pub badges_count: usize,
}

/// 里程碑资格检查结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MilestoneEligibility {
    pub wallet_address: String,
    pub current_certificates: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_milestone: Option<i64>,
    pub progress_percentage: u8,
    pub current_tier: Tier,
    /// 已达成但尚未关联徽章的里程碑数量
    pub pending_mints: usize,
    pub eligible_for_nft_mint: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_transaction_dto_wire_format() {
        let dto = TransactionDto {
            transaction_type: TransactionType::MilestoneReached,
            points: 100,
            description: "Milestone reached: 10 certificates (BRONZE tier)".to_string(),
            transaction_hash: None,
            created_at: Utc::now(),
        };
        let value = serde_json::to_value(&dto).unwrap();
        assert_eq!(value["type"], json!("MILESTONE_REACHED"));
        assert_eq!(value["points"], json!(100));
        assert!(value.get("transaction_hash").is_none());
    }

    #[test]
    fn test_milestone_dto_has_nft() {
        let record = MilestoneRecord {
            id: 1,
            institution_id: 1,
            threshold: 50,
            tier_achieved: Tier::Silver,
            certificate_count: 50,
            badge_id: None,
            achieved_at: Utc::now(),
        };
        let dto = MilestoneDto::from(&record);
        assert_eq!(dto.count, 50);
        assert!(!dto.has_nft);

        let linked = MilestoneRecord {
            badge_id: Some(3),
            ..record
        };
        assert!(MilestoneDto::from(&linked).has_nft);
    }
}
