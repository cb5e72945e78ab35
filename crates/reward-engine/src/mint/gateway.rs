//! 徽章铸造能力抽象
//!
//! 链上合约调用由外部铸造中继完成，引擎只依赖 `BadgeMinter` trait。

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::Tier;

/// 铸造调用参数
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MintCall {
    /// 接收徽章的钱包地址
    pub to_address: String,
    pub institution_name: String,
    /// 合约内的等级序号，BRONZE=0 ... DIAMOND=4
    pub tier_index: u8,
    pub certificate_count: i64,
    pub metadata_uri: String,
}

/// 铸造回执
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MintReceipt {
    pub token_id: i64,
    #[serde(rename = "transaction_hash")]
    pub transaction_reference: String,
    #[serde(rename = "block_number", default)]
    pub block_reference: Option<i64>,
    /// 交易是否已确认成功
    pub confirmed: bool,
}

/// 铸造错误
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MintError {
    #[error("铸造服务不可用: {0}")]
    Unavailable(String),

    #[error("铸造被拒绝: {0}")]
    Rejected(String),

    #[error("铸造请求传输失败: {0}")]
    Transport(String),

    #[error("铸造确认超时: {seconds}s")]
    Timeout { seconds: u64 },
}

impl MintError {
    pub fn outcome_label(&self) -> &'static str {
        match self {
            Self::Unavailable(_) => "unavailable",
            Self::Rejected(_) => "rejected",
            Self::Transport(_) => "transport_error",
            Self::Timeout { .. } => "timeout",
        }
    }
}

/// 徽章铸造能力
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BadgeMinter: Send + Sync {
    /// 发起铸造并等待交易确认
    async fn mint(&self, call: &MintCall) -> Result<MintReceipt, MintError>;
}

/// 徽章元数据 URI：`{base}/{wallet}/{tier 小写}.json`
pub fn metadata_uri(base_url: &str, wallet_address: &str, tier: Tier) -> String {
    format!(
        "{}/{}/{}.json",
        base_url.trim_end_matches('/'),
        wallet_address,
        tier.as_str().to_lowercase()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_uri() {
        assert_eq!(
            metadata_uri("https://ceversys.com/nft-metadata", "0xabc", Tier::Gold),
            "https://ceversys.com/nft-metadata/0xabc/gold.json"
        );
        assert_eq!(
            metadata_uri("https://meta.example/", "0xabc", Tier::Bronze),
            "https://meta.example/0xabc/bronze.json"
        );
    }

    #[test]
    fn test_receipt_wire_names() {
        let receipt: MintReceipt = serde_json::from_value(serde_json::json!({
            "token_id": 7,
            "transaction_hash": "0xdead",
            "block_number": 12345,
            "confirmed": true
        }))
        .unwrap();
        assert_eq!(receipt.token_id, 7);
        assert_eq!(receipt.transaction_reference, "0xdead");
        assert_eq!(receipt.block_reference, Some(12345));

        let pending: MintReceipt = serde_json::from_value(serde_json::json!({
            "token_id": 8,
            "transaction_hash": "0xbeef",
            "confirmed": false
        }))
        .unwrap();
        assert_eq!(pending.block_reference, None);
        assert!(!pending.confirmed);
    }
}
