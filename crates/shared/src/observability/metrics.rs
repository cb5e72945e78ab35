//! Prometheus 指标模块
//!
//! 基于 metrics crate 和 metrics-exporter-prometheus 实现指标收集与导出。
//! 指标通过独立的 HTTP 端口暴露，供 Prometheus 抓取。

use anyhow::Result;
use axum::{Router, routing::get};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::sync::OnceLock;
use tokio::net::TcpListener;
use tracing::{error, info};

use super::ObservabilityConfig;

/// 全局 Prometheus handle，用于渲染指标
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Metrics 资源守卫
pub struct MetricsHandle {
    _server_handle: tokio::task::JoinHandle<()>,
}

/// 初始化 Prometheus 指标导出
///
/// 启动一个独立的 HTTP 服务器在指定端口暴露 `/metrics` 与 `/health` 端点。
pub async fn init(config: &ObservabilityConfig) -> Result<MetricsHandle> {
    let handle = PrometheusBuilder::new().install_recorder()?;

    let _ = PROMETHEUS_HANDLE.set(handle.clone());

    register_common_metrics(&config.service_name);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.metrics_port));
    let server_handle = start_metrics_server(addr, handle).await?;

    Ok(MetricsHandle {
        _server_handle: server_handle,
    })
}

/// 注册奖励引擎的业务指标描述
fn register_common_metrics(service_name: &str) {
    metrics::describe_counter!(
        "reward_issuances_total",
        "Total number of certificate issuance notifications"
    );
    metrics::describe_histogram!(
        "reward_issuance_duration_seconds",
        "Issuance notification processing duration in seconds"
    );
    metrics::describe_counter!("reward_milestones_total", "Total number of milestones reached");
    metrics::describe_counter!("reward_badge_mints_total", "Total number of badge mint attempts");
    metrics::describe_counter!(
        "reward_mint_queue_rejections_total",
        "Mint jobs that could not be queued"
    );
    metrics::describe_counter!("reward_bonus_awards_total", "Total number of bonus point awards");
    metrics::describe_gauge!("worker_last_run_timestamp", "Last run of a background worker");

    metrics::counter!("service_starts_total", "service" => service_name.to_string()).increment(1);
}

/// 启动指标 HTTP 服务器
async fn start_metrics_server(
    addr: SocketAddr,
    handle: PrometheusHandle,
) -> Result<tokio::task::JoinHandle<()>> {
    let app = Router::new()
        .route("/metrics", get(move || std::future::ready(handle.render())))
        .route("/health", get(|| async { "OK" }));

    let listener = TcpListener::bind(addr).await?;
    info!("Metrics server listening on {}", addr);

    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("Metrics server error: {}", e);
        }
    });

    Ok(server_handle)
}

/// 获取全局 Prometheus handle（用于自定义渲染）
pub fn get_handle() -> Option<&'static PrometheusHandle> {
    PROMETHEUS_HANDLE.get()
}

// ============================================================================
// 指标记录函数
// ============================================================================

/// 记录证书签发通知处理结果
#[inline]
pub fn record_issuance(outcome: &str, duration_secs: f64) {
    metrics::counter!("reward_issuances_total", "outcome" => outcome.to_string()).increment(1);
    metrics::histogram!("reward_issuance_duration_seconds", "outcome" => outcome.to_string())
        .record(duration_secs);
}

/// 记录里程碑达成
#[inline]
pub fn record_milestone(tier: &str) {
    metrics::counter!("reward_milestones_total", "tier" => tier.to_string()).increment(1);
}

/// 记录徽章铸造结果
#[inline]
pub fn record_badge_mint(tier: &str, outcome: &str) {
    metrics::counter!(
        "reward_badge_mints_total",
        "tier" => tier.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// 记录铸造任务入队失败
#[inline]
pub fn record_mint_queue_rejection(reason: &str) {
    metrics::counter!("reward_mint_queue_rejections_total", "reason" => reason.to_string())
        .increment(1);
}

/// 记录额外积分发放
#[inline]
pub fn record_bonus_award() {
    metrics::counter!("reward_bonus_awards_total").increment(1);
}

/// 记录后台 Worker 最近一次运行时间
#[inline]
pub fn set_worker_last_run(worker: &str) {
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or_default();
    metrics::gauge!("worker_last_run_timestamp", "worker" => worker.to_string()).set(now);
}
