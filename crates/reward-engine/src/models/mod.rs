//! 奖励引擎领域模型
//!
//! 包含机构账本、里程碑、徽章、奖励流水等核心实体定义

pub mod badge;
pub mod enums;
pub mod institution;
pub mod milestone;
pub mod transaction;

pub use badge::{BadgeFilter, BadgeMetadata, BadgeRecord, NewBadge};
pub use enums::{Tier, TransactionType};
pub use institution::{BadgeSummary, InstitutionLedger};
pub use milestone::{MilestoneRecord, NewMilestone, PendingMint};
pub use transaction::{NewRewardTransaction, RewardTransaction, TransactionMetadata};
