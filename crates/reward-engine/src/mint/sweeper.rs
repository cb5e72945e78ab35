//! 补铸扫描 Worker
//!
//! 定期扫描已达成但尚未关联徽章的里程碑并重新铸造，
//! 铸造能力恢复后自动补齐降级期间推迟的徽章。

use std::sync::Arc;
use std::time::Duration;

use reward_shared::config::MintConfig;
use reward_shared::observability::metrics;
use tokio::sync::watch;
use tracing::{error, info};

use super::coordinator::{MintCoordinator, RetrySummary};
use crate::error::Result;

const WORKER_NAME: &str = "mint_sweeper";

/// 补铸扫描 Worker
pub struct MintSweeper {
    coordinator: Arc<MintCoordinator>,
    interval: Duration,
    batch_size: i64,
}

impl MintSweeper {
    pub fn new(coordinator: Arc<MintCoordinator>, config: &MintConfig) -> Self {
        Self {
            coordinator,
            interval: config.sweep_interval(),
            batch_size: config.sweep_batch_size,
        }
    }

    /// 执行一轮扫描
    pub async fn run_once(&self) -> Result<RetrySummary> {
        let summary = self.coordinator.retry_pending(self.batch_size).await;
        metrics::set_worker_last_run(WORKER_NAME);
        summary
    }

    /// 主循环：按间隔扫描直到收到关闭信号
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_secs = self.interval.as_secs(),
            batch_size = self.batch_size,
            "Mint sweeper started"
        );

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                // 偏向关闭信号，保证收到关闭时能尽快退出
                biased;

                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Shutdown signal received, mint sweeper exiting");
                        break;
                    }
                }

                _ = ticker.tick() => {
                    if let Err(e) = self.run_once().await {
                        error!(error = %e, "Pending mint sweep failed");
                    }
                }
            }
        }
    }
}
