//! 共享库
//!
//! 包含奖励引擎与后台 Worker 共用的配置加载、数据库连接池、可观测性初始化等基础设施代码。

pub mod config;
pub mod database;
pub mod error;
pub mod observability;
