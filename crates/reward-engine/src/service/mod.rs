//! 服务层
//!
//! 实现奖励业务逻辑，协调账本存储与铸造分发。
//!
//! ## 模块结构
//!
//! - `dto`: 数据传输对象定义
//! - `reward_service`: 签发通知处理、钱包注册、额外积分（写操作）
//! - `query_service`: 统计、排行榜、徽章与流水查询（只读操作）

pub mod dto;
pub mod query_service;
pub mod reward_service;

pub use dto::*;
pub use query_service::RewardQueryService;
pub use reward_service::RewardService;
