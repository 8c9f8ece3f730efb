//! accesswatch -- Continuous accessibility-compliance monitoring.
//!
//! This crate provides the monitoring scheduler, idempotent execution
//! coordinator, regression/alerting engine, and trend forecaster. The
//! accessibility rule engine and notification delivery are external
//! collaborators behind trait seams.

pub mod alerts;
pub mod api;
pub mod config;
pub mod monitor;
pub mod notify;
pub mod regress;
pub mod scan;
pub mod schedule;
pub mod storage;
pub mod trend;

use anyhow::{bail, Result};
use config::Config;
use monitor::{MonitorRunner, RunnerOptions};
use notify::{NoopSender, NotificationSender, WebhookSender};
use scan::remote::RemoteScanEngine;
use scan::ScanEngine;
use std::sync::Arc;

/// Build the batch runner from configuration: remote scan engine, webhook
/// sender (or logging fallback), and the shared pool.
pub fn build_runner(pool: storage::Pool, config: &Config) -> Result<MonitorRunner> {
    let Some(scan_endpoint) = config.scan_endpoint.as_deref() else {
        bail!("scan_endpoint is not configured; the monitor cannot run without a scan engine");
    };
    // The HTTP client timeout sits slightly above the orchestrator deadline
    // so the deadline fires first with a clear error.
    let engine: Arc<dyn ScanEngine> = Arc::new(RemoteScanEngine::new(
        scan_endpoint,
        config.scan_timeout() + std::time::Duration::from_secs(5),
    )?);
    let sender: Arc<dyn NotificationSender> = match config.webhook_endpoint.as_deref() {
        Some(endpoint) => Arc::new(WebhookSender::new(endpoint)?),
        None => Arc::new(NoopSender),
    };
    Ok(MonitorRunner::new(
        pool,
        engine,
        sender,
        RunnerOptions {
            batch_size: config.batch_size,
            batch_budget: config.batch_budget(),
            scan_timeout: config.scan_timeout(),
        },
    ))
}

/// Start the accesswatch daemon: storage, batch runner, and API server.
///
/// There is no in-process timer; batches run when the trigger endpoint is
/// hit by outside scheduler infrastructure.
pub async fn serve(config: Config) -> Result<()> {
    tracing::info!(db_path = %config.db_path, "Initializing database");
    let pool = storage::open_pool(&config.db_path)?;

    let runner = Arc::new(build_runner(pool.clone(), &config)?);
    if config.trigger_secret.is_none() {
        tracing::warn!("No trigger secret configured; trigger endpoints will refuse requests");
    }

    let state = api::state::AppState {
        pool,
        runner,
        trigger_secret: config.trigger_secret.clone(),
    };
    let app = api::router(state);

    let addr: std::net::SocketAddr = config.bind.parse()?;
    tracing::info!(%addr, "accesswatch listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
