//! 里程碑达成记录

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::enums::Tier;

/// 里程碑记录
///
/// (institution_id, threshold) 唯一，是防止重复奖励的最终依据。
/// 徽章关联在铸造成功后由铸造协调器写入，其余字段创建后不再变更。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MilestoneRecord {
    pub id: i64,
    pub institution_id: i64,
    /// 里程碑阈值
    pub threshold: i64,
    /// 达成的等级
    pub tier_achieved: Tier,
    /// 跨越阈值时的证书数
    pub certificate_count: i64,
    /// 关联的徽章记录，铸造成功前为空
    pub badge_id: Option<i64>,
    pub achieved_at: DateTime<Utc>,
}

impl MilestoneRecord {
    pub fn has_badge(&self) -> bool {
        self.badge_id.is_some()
    }
}

/// 新建里程碑参数
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMilestone {
    pub institution_id: i64,
    pub threshold: i64,
    pub tier_achieved: Tier,
    pub certificate_count: i64,
}

/// 待补铸的里程碑
///
/// 已达成但尚未关联徽章，附带铸造所需的机构信息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingMint {
    pub milestone_id: i64,
    pub institution_id: i64,
    pub wallet_address: String,
    pub institution_name: String,
    pub threshold: i64,
    pub tier: Tier,
    pub certificate_count: i64,
}
