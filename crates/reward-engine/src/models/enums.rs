//! 奖励引擎枚举类型定义
//!
//! 所有枚举都支持数据库（sqlx）和 JSON（serde）序列化

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// 机构等级
///
/// 由累计签发证书数量推导，顺序即等级高低
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    sqlx::Type,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "varchar", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Tier {
    /// 未达到首个里程碑
    #[default]
    None,
    Bronze,
    Silver,
    Gold,
    Platinum,
    Diamond,
}

impl Tier {
    /// 可铸造徽章的等级，按从低到高排列
    pub const MINTABLE: [Tier; 5] = [
        Tier::Bronze,
        Tier::Silver,
        Tier::Gold,
        Tier::Platinum,
        Tier::Diamond,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "NONE",
            Self::Bronze => "BRONZE",
            Self::Silver => "SILVER",
            Self::Gold => "GOLD",
            Self::Platinum => "PLATINUM",
            Self::Diamond => "DIAMOND",
        }
    }

    /// 合约侧的等级下标（0..=4），NONE 没有对应的徽章
    pub fn index(&self) -> Option<u8> {
        match self {
            Self::None => None,
            Self::Bronze => Some(0),
            Self::Silver => Some(1),
            Self::Gold => Some(2),
            Self::Platinum => Some(3),
            Self::Diamond => Some(4),
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tier {
    type Err = String;

    /// 大小写不敏感
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "NONE" => Ok(Self::None),
            "BRONZE" => Ok(Self::Bronze),
            "SILVER" => Ok(Self::Silver),
            "GOLD" => Ok(Self::Gold),
            "PLATINUM" => Ok(Self::Platinum),
            "DIAMOND" => Ok(Self::Diamond),
            other => Err(format!("未知的等级: {}", other)),
        }
    }
}

/// 奖励流水类型
///
/// 流水只追加不修改，用于审计积分和徽章的每一次变动
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "varchar", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionType {
    /// 证书签发（+固定积分）
    CertificateIssued,
    /// 达成里程碑（+里程碑奖励积分）
    MilestoneReached,
    /// 徽章铸造成功（0 积分，仅记录）
    NftMinted,
    /// 额外积分
    BonusPoints,
}

impl TransactionType {
    /// 该类型的积分变动是否计入机构积分余额
    pub fn counts_toward_points(&self) -> bool {
        !matches!(self, Self::NftMinted)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CertificateIssued => "CERTIFICATE_ISSUED",
            Self::MilestoneReached => "MILESTONE_REACHED",
            Self::NftMinted => "NFT_MINTED",
            Self::BonusPoints => "BONUS_POINTS",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_ordering() {
        assert!(Tier::None < Tier::Bronze);
        assert!(Tier::Bronze < Tier::Silver);
        assert!(Tier::Gold < Tier::Platinum);
        assert!(Tier::Platinum < Tier::Diamond);
    }

    #[test]
    fn test_tier_index() {
        assert_eq!(Tier::None.index(), None);
        assert_eq!(Tier::Bronze.index(), Some(0));
        assert_eq!(Tier::Diamond.index(), Some(4));
    }

    #[test]
    fn test_tier_from_str_is_case_insensitive() {
        assert_eq!("gold".parse::<Tier>().unwrap(), Tier::Gold);
        assert_eq!(" Platinum ".parse::<Tier>().unwrap(), Tier::Platinum);
        assert!("obsidian".parse::<Tier>().is_err());
    }

    #[test]
    fn test_tier_serde() {
        assert_eq!(serde_json::to_string(&Tier::Silver).unwrap(), "\"SILVER\"");
        let tier: Tier = serde_json::from_str("\"DIAMOND\"").unwrap();
        assert_eq!(tier, Tier::Diamond);
    }

    #[test]
    fn test_transaction_type_points() {
        assert!(TransactionType::CertificateIssued.counts_toward_points());
        assert!(TransactionType::MilestoneReached.counts_toward_points());
        assert!(TransactionType::BonusPoints.counts_toward_points());
        assert!(!TransactionType::NftMinted.counts_toward_points());
        assert_eq!(
            serde_json::to_string(&TransactionType::NftMinted).unwrap(),
            "\"NFT_MINTED\""
        );
    }
}
