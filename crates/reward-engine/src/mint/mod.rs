//! 徽章铸造
//!
//! - `gateway`: 铸造能力抽象与元数据 URI
//! - `http_gateway`: 基于 HTTP 中继的实现
//! - `coordinator`: 幂等铸造与落库
//! - `dispatcher`: 签发后异步分发
//! - `sweeper`: 补铸扫描

mod coordinator;
mod dispatcher;
mod gateway;
mod http_gateway;
mod sweeper;

pub use coordinator::{MintCoordinator, MintRequest, RetrySummary};
pub use dispatcher::MintDispatcher;
pub use gateway::{BadgeMinter, MintCall, MintError, MintReceipt, metadata_uri};
#[cfg(test)]
pub use gateway::MockBadgeMinter;
pub use http_gateway::HttpMintGateway;
pub use sweeper::MintSweeper;
