//! 补铸 Worker
//!
//! 连接账本数据库并定期为未关联徽章的里程碑重新铸造。

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use reward_shared::{config::AppConfig, database::Database, observability};
use tokio::signal;
use tokio::sync::watch;
use tracing::{info, warn};

use reward_engine::{
    BadgeMinter, HttpMintGateway, LedgerStore, MIGRATOR, PgLedgerStore, RewardEngine,
};

/// 关闭时等待进行中铸造完成的最长时间
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<()> {
    // 1. 加载配置
    let config = AppConfig::load("reward-mint-worker").unwrap_or_else(|e| {
        tracing::warn!("Failed to load config, using defaults: {}", e);
        AppConfig::default()
    });

    // 2. 初始化可观测性
    let obs_config = config
        .observability
        .clone()
        .with_service_name(&config.service_name);
    let _guard = observability::init(&obs_config).await?;

    info!("Starting reward-mint-worker...");
    info!(environment = %config.environment, "Configuration loaded");

    // 3. 数据库与迁移
    let db = Database::connect(&config.database).await?;
    db.run_migrations(&MIGRATOR).await?;
    db.health_check().await?;
    info!("Database connection established");

    // 4. 铸造能力
    let minter = HttpMintGateway::from_config(&config.mint)?
        .map(|gateway| Arc::new(gateway) as Arc<dyn BadgeMinter>);
    if minter.is_none() {
        warn!("Mint relay endpoint not configured, milestones stay unlinked until it is");
    }

    // 5. 装配引擎
    let store: Arc<dyn LedgerStore> = Arc::new(PgLedgerStore::new(db.pool().clone()));
    let engine = RewardEngine::new(store, minter, &config.reward, &config.mint);

    // 6. 启动补铸扫描
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper = tokio::spawn(engine.sweeper().run(shutdown_rx));

    shutdown_signal().await;

    let _ = shutdown_tx.send(true);
    sweeper.await?;
    engine.shutdown(SHUTDOWN_GRACE).await;
    db.close().await;

    info!("Service shutdown complete");
    Ok(())
}

/// 优雅关闭信号处理
///
/// 监听 Ctrl+C 和 SIGTERM 信号
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, starting graceful shutdown...");
        }
    }
}
