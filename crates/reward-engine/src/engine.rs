//! 奖励引擎装配
//!
//! 把账本存储、铸造能力与配置组装成可直接使用的服务集合。
//! 铸造能力由进程启动方显式注入，引擎内部不持有任何全局客户端。

use std::sync::Arc;
use std::time::Duration;

use reward_shared::config::{MintConfig, RewardConfig};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::mint::{BadgeMinter, MintCoordinator, MintDispatcher, MintSweeper};
use crate::repository::LedgerStore;
use crate::service::{RewardQueryService, RewardService};

/// 奖励引擎
///
/// 需要在 tokio 运行时内创建（会启动铸造分发 worker）
pub struct RewardEngine {
    rewards: Arc<RewardService>,
    queries: Arc<RewardQueryService>,
    coordinator: Arc<MintCoordinator>,
    mint_config: MintConfig,
    dispatch_handle: JoinHandle<()>,
}

impl RewardEngine {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        minter: Option<Arc<dyn BadgeMinter>>,
        reward_config: &RewardConfig,
        mint_config: &MintConfig,
    ) -> Self {
        let coordinator = Arc::new(MintCoordinator::new(store.clone(), minter, mint_config));
        let (dispatcher, dispatch_handle) =
            MintDispatcher::spawn(coordinator.clone(), mint_config.queue_capacity);

        let rewards = Arc::new(
            RewardService::new(store.clone(), reward_config).with_mint_dispatcher(dispatcher),
        );
        let queries = Arc::new(RewardQueryService::new(store, reward_config.clone()));

        info!(
            mint_available = coordinator.is_available(),
            queue_capacity = mint_config.queue_capacity,
            "Reward engine initialized"
        );

        Self {
            rewards,
            queries,
            coordinator,
            mint_config: mint_config.clone(),
            dispatch_handle,
        }
    }

    /// 写操作：签发通知、钱包注册、额外积分
    pub fn rewards(&self) -> Arc<RewardService> {
        self.rewards.clone()
    }

    /// 只读查询
    pub fn queries(&self) -> Arc<RewardQueryService> {
        self.queries.clone()
    }

    pub fn coordinator(&self) -> Arc<MintCoordinator> {
        self.coordinator.clone()
    }

    /// 创建补铸扫描 Worker
    pub fn sweeper(&self) -> MintSweeper {
        MintSweeper::new(self.coordinator.clone(), &self.mint_config)
    }

    /// 关闭引擎：释放分发器并等待进行中的铸造完成
    ///
    /// 其他地方仍持有 `RewardService` 时分发 worker 不会退出，超过 grace 后放弃等待
    pub async fn shutdown(self, grace: Duration) {
        let Self {
            rewards,
            dispatch_handle,
            ..
        } = self;
        drop(rewards);

        match tokio::time::timeout(grace, dispatch_handle).await {
            Ok(Ok(())) => info!("Mint dispatcher drained"),
            Ok(Err(e)) => warn!(error = %e, "Mint dispatcher task failed"),
            Err(_) => warn!(
                grace_secs = grace.as_secs(),
                "Mint dispatcher did not drain in time, remaining mints left to the sweeper"
            ),
        }
    }
}
