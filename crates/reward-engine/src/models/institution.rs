//! 机构账本实体定义

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::enums::Tier;
use crate::tier;

/// 机构奖励账本
///
/// 以小写钱包地址为自然键，每个钱包仅一条。证书数与积分只增不减，
/// 等级始终等于 `tier_for(total_certificates_issued)`。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstitutionLedger {
    pub id: i64,
    /// 钱包地址（小写，不可变）
    pub wallet_address: String,
    /// 机构展示名称（首次写入为准）
    pub institution_name: String,
    /// 累计签发证书数
    pub total_certificates_issued: i64,
    /// 奖励积分
    pub reward_points: i64,
    /// 当前等级
    pub current_tier: Tier,
    /// 已铸造徽章摘要（由徽章记录派生的冗余缓存）
    pub badges_earned: Vec<BadgeSummary>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl InstitutionLedger {
    /// 下一个里程碑阈值，已达最高里程碑时为 None
    pub fn next_milestone(&self) -> Option<i64> {
        tier::next_threshold(self.total_certificates_issued)
    }

    /// 距下一个里程碑的进度百分比
    pub fn milestone_progress(&self) -> u8 {
        tier::progress_percent(self.total_certificates_issued)
    }

    /// 是否已缓存某等级的徽章
    pub fn has_badge_summary(&self, tier: Tier) -> bool {
        self.badges_earned.iter().any(|b| b.tier == tier)
    }
}

/// 徽章摘要
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BadgeSummary {
    pub tier: Tier,
    pub token_id: i64,
    pub certificate_count: i64,
    pub minted_at: DateTime<Utc>,
}
