//! 徽章记录实体定义

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::enums::Tier;

/// 徽章记录
///
/// 仅在外部铸造确认成功后创建，(institution_id, tier) 唯一
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BadgeRecord {
    pub id: i64,
    pub institution_id: i64,
    /// 链上分配的 token ID
    pub token_id: i64,
    pub tier: Tier,
    /// 铸造时的证书数
    pub certificate_count_at_mint: i64,
    /// 链上交易引用
    pub transaction_reference: String,
    /// 区块高度
    pub block_reference: Option<i64>,
    /// 元数据 URI
    pub metadata_uri: String,
    pub metadata: BadgeMetadata,
    pub minted_at: DateTime<Utc>,
}

/// 徽章元数据
///
/// 已知字段显式建模，其余自由数据放入 extra
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BadgeMetadata {
    pub institution_name: String,
    pub tier: Tier,
    pub certificate_count: i64,
    pub token_id: i64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// 新建徽章参数
#[derive(Debug, Clone, PartialEq)]
pub struct NewBadge {
    pub institution_id: i64,
    pub token_id: i64,
    pub tier: Tier,
    pub certificate_count_at_mint: i64,
    pub transaction_reference: String,
    pub block_reference: Option<i64>,
    pub metadata_uri: String,
    pub metadata: BadgeMetadata,
}

/// 徽章列表过滤条件
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BadgeFilter {
    /// 钱包地址（查询前需规范化为小写）
    pub wallet_address: Option<String>,
    pub tier: Option<Tier>,
}

impl BadgeFilter {
    pub fn by_wallet(wallet_address: impl Into<String>) -> Self {
        Self {
            wallet_address: Some(wallet_address.into()),
            tier: None,
        }
    }

    pub fn with_tier(mut self, tier: Tier) -> Self {
        self.tier = Some(tier);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_metadata_extra_is_flattened() {
        let mut metadata = BadgeMetadata {
            institution_name: "Test University".to_string(),
            tier: Tier::Gold,
            certificate_count: 100,
            token_id: 3,
            extra: Map::new(),
        };
        metadata
            .extra
            .insert("campaign".to_string(), json!("spring"));

        let value = serde_json::to_value(&metadata).unwrap();
        assert_eq!(value["tier"], "GOLD");
        assert_eq!(value["campaign"], "spring");

        let parsed: BadgeMetadata = serde_json::from_value(value).unwrap();
        assert_eq!(parsed, metadata);
    }

    #[test]
    fn test_filter_builder() {
        let filter = BadgeFilter::by_wallet("0xabc").with_tier(Tier::Silver);
        assert_eq!(filter.wallet_address.as_deref(), Some("0xabc"));
        assert_eq!(filter.tier, Some(Tier::Silver));
    }
}
