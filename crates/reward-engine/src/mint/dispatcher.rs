//! 铸造任务分发
//!
//! 签发通知在提交后把铸造请求放入有界队列即返回，后台 worker 负责执行。
//! 队列满或已关闭时请求被丢弃，对应里程碑保持未关联状态，由补铸扫描兜底。

use std::sync::Arc;

use reward_shared::observability::metrics;
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::coordinator::{MintCoordinator, MintRequest};

/// 同时进行中的铸造数量上限
const MAX_CONCURRENT_MINTS: usize = 4;

/// 铸造任务分发器
#[derive(Clone)]
pub struct MintDispatcher {
    sender: mpsc::Sender<MintRequest>,
}

impl MintDispatcher {
    /// 创建分发器并启动后台 worker
    ///
    /// 所有分发器副本被 drop 后，worker 处理完队列中剩余请求后退出
    pub fn spawn(coordinator: Arc<MintCoordinator>, capacity: usize) -> (Self, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let handle = tokio::spawn(run_worker(coordinator, receiver));
        (Self { sender }, handle)
    }

    /// 提交铸造请求，从不阻塞调用方
    ///
    /// 返回是否成功入队
    pub fn dispatch(&self, request: MintRequest) -> bool {
        match self.sender.try_send(request) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(request)) => {
                warn!(
                    wallet = %request.wallet_address,
                    tier = %request.tier,
                    "Mint queue full, badge mint deferred to sweeper"
                );
                metrics::record_mint_queue_rejection("full");
                false
            }
            Err(mpsc::error::TrySendError::Closed(request)) => {
                warn!(
                    wallet = %request.wallet_address,
                    tier = %request.tier,
                    "Mint queue closed, badge mint deferred to sweeper"
                );
                metrics::record_mint_queue_rejection("closed");
                false
            }
        }
    }
}

async fn run_worker(coordinator: Arc<MintCoordinator>, mut receiver: mpsc::Receiver<MintRequest>) {
    info!("Mint dispatch worker started");
    let permits = Arc::new(Semaphore::new(MAX_CONCURRENT_MINTS));

    while let Some(request) = receiver.recv().await {
        let Ok(permit) = permits.clone().acquire_owned().await else {
            break;
        };
        let coordinator = coordinator.clone();
        tokio::spawn(async move {
            let _permit = permit;
            debug!(milestone_id = request.milestone_id, "Processing mint request");
            if let Err(e) = coordinator.mint_badge(&request).await {
                // 铸造失败不影响签发结果，补铸扫描会再次尝试
                error!(
                    milestone_id = request.milestone_id,
                    wallet = %request.wallet_address,
                    error = %e,
                    "Dispatched mint failed"
                );
            }
        });
    }

    // 等待进行中的铸造完成
    let _ = permits.acquire_many(MAX_CONCURRENT_MINTS as u32).await;
    info!("Mint dispatch worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Tier;
    use crate::repository::InMemoryLedgerStore;
    use reward_shared::config::MintConfig;

    fn request() -> MintRequest {
        MintRequest {
            milestone_id: 1,
            institution_id: 1,
            wallet_address: "0xabc".to_string(),
            institution_name: "Test University".to_string(),
            threshold: 10,
            tier: Tier::Bronze,
            certificate_count: 10,
        }
    }

    #[tokio::test]
    async fn test_worker_stops_after_dispatchers_dropped() {
        let coordinator = Arc::new(MintCoordinator::new(
            Arc::new(InMemoryLedgerStore::new()),
            None,
            &MintConfig::default(),
        ));
        let (dispatcher, handle) = MintDispatcher::spawn(coordinator, 4);

        assert!(dispatcher.dispatch(request()));
        drop(dispatcher);

        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_dispatch_on_closed_queue_is_rejected() {
        let coordinator = Arc::new(MintCoordinator::new(
            Arc::new(InMemoryLedgerStore::new()),
            None,
            &MintConfig::default(),
        ));
        let (dispatcher, handle) = MintDispatcher::spawn(coordinator, 1);
        handle.abort();
        let _ = handle.await;

        assert!(!dispatcher.dispatch(request()));
    }
}
