//! 奖励流水实体定义
//!
//! 流水只追加，不修改不删除。CERTIFICATE_ISSUED、MILESTONE_REACHED、BONUS_POINTS
//! 的积分之和始终等于机构当前积分。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::badge::BadgeRecord;
use super::enums::{Tier, TransactionType};
use crate::tier::Milestone;

/// 奖励流水
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RewardTransaction {
    pub id: i64,
    pub institution_id: i64,
    pub transaction_type: TransactionType,
    /// 积分变动（可为 0）
    pub points_delta: i64,
    pub description: String,
    /// 外部交易引用（如链上交易哈希）
    pub external_reference: Option<String>,
    pub metadata: TransactionMetadata,
    pub created_at: DateTime<Utc>,
}

/// 流水元数据
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransactionMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate_reference: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub milestone: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tier: Option<Tier>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate_count: Option<i64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// 新建流水参数
#[derive(Debug, Clone, PartialEq)]
pub struct NewRewardTransaction {
    pub institution_id: i64,
    pub transaction_type: TransactionType,
    pub points_delta: i64,
    pub description: String,
    pub external_reference: Option<String>,
    pub metadata: TransactionMetadata,
}

impl NewRewardTransaction {
    pub fn certificate_issued(institution_id: i64, points: i64, certificate_reference: &str) -> Self {
        Self {
            institution_id,
            transaction_type: TransactionType::CertificateIssued,
            points_delta: points,
            description: format!("Certificate issued: {}", certificate_reference),
            external_reference: None,
            metadata: TransactionMetadata {
                certificate_reference: Some(certificate_reference.to_string()),
                ..Default::default()
            },
        }
    }

    pub fn milestone_reached(institution_id: i64, milestone: &Milestone) -> Self {
        Self {
            institution_id,
            transaction_type: TransactionType::MilestoneReached,
            points_delta: milestone.bonus_points,
            description: format!(
                "Milestone reached: {} certificates ({} tier)",
                milestone.threshold, milestone.tier
            ),
            external_reference: None,
            metadata: TransactionMetadata {
                milestone: Some(milestone.threshold),
                tier: Some(milestone.tier),
                ..Default::default()
            },
        }
    }

    pub fn nft_minted(badge: &BadgeRecord) -> Self {
        Self {
            institution_id: badge.institution_id,
            transaction_type: TransactionType::NftMinted,
            points_delta: 0,
            description: format!(
                "NFT Badge minted: {} tier (Token #{})",
                badge.tier, badge.token_id
            ),
            external_reference: Some(badge.transaction_reference.clone()),
            metadata: TransactionMetadata {
                tier: Some(badge.tier),
                token_id: Some(badge.token_id),
                certificate_count: Some(badge.certificate_count_at_mint),
                ..Default::default()
            },
        }
    }

    pub fn bonus_points(institution_id: i64, points: i64, reason: &str) -> Self {
        Self {
            institution_id,
            transaction_type: TransactionType::BonusPoints,
            points_delta: points,
            description: format!("Bonus points: {}", reason),
            external_reference: None,
            metadata: TransactionMetadata::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tier;

    #[test]
    fn test_certificate_issued_transaction() {
        let tx = NewRewardTransaction::certificate_issued(1, 10, "0xcert");
        assert_eq!(tx.transaction_type, TransactionType::CertificateIssued);
        assert_eq!(tx.points_delta, 10);
        assert!(tx.description.contains("0xcert"));
        assert_eq!(tx.metadata.certificate_reference.as_deref(), Some("0xcert"));
    }

    #[test]
    fn test_milestone_reached_transaction() {
        let milestone = tier::milestone_for(50).unwrap();
        let tx = NewRewardTransaction::milestone_reached(1, &milestone);
        assert_eq!(tx.points_delta, 500);
        assert_eq!(tx.metadata.milestone, Some(50));
        assert_eq!(tx.metadata.tier, Some(Tier::Silver));
        assert_eq!(
            tx.description,
            "Milestone reached: 50 certificates (SILVER tier)"
        );
    }

    #[test]
    fn test_metadata_skips_empty_fields() {
        let metadata = TransactionMetadata {
            milestone: Some(10),
            ..Default::default()
        };
        let value = serde_json::to_value(&metadata).unwrap();
        assert_eq!(value, serde_json::json!({ "milestone": 10 }));
    }
}
