pub mod commands;
pub mod db;
pub mod error;
pub mod monitor;
pub mod state;

use commands::{
    history::{history_refresh, history_state},
    live::{dashboard_view, start_live_monitor, stop_live_monitor},
    preferences::preferences_get,
};
use db::initialize_pool;
use error::AppError;
use monitor::types::MonitorArgs;
use state::AppState;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

const REPORT_INTERVAL: Duration = Duration::from_secs(5);

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

async fn report_dashboard(state: &AppState) -> Result<(), AppError> {
    let view = dashboard_view(state).await?;
    tracing::info!(
        connection = view.connection.as_str(),
        source = ?view.stats.source,
        count = view.stats.count,
        volume = view.stats.volume,
        avg_amount = view.stats.avg_amount,
        anomalies = view.stats.anomaly_count,
        tx_per_sec = view.tx_per_sec,
        dropped_malformed = view.dropped_malformed,
        "dashboard"
    );
    if let Some(efficiency) = &view.efficiency {
        tracing::info!(
            cumulative_efficiency_pct = efficiency.cumulative_efficiency_pct,
            queue_utilization_pct = efficiency.queue_utilization_pct,
            queue_lagging = efficiency.queue_lagging,
            "ingestion"
        );
    }
    if let Some(error) = history_state(state).error {
        tracing::warn!(%error, "history unavailable");
    }
    Ok(())
}

async fn serve() -> Result<(), AppError> {
    let config = MonitorArgs::from_env()?.normalize()?;
    let db_pool = initialize_pool().await?;
    let state = AppState::new(db_pool, config)?;

    let preferences = preferences_get(&state).await?;
    state
        .history
        .lock()
        .await
        .set_page_size(preferences.history_page_size);

    start_live_monitor(&state).await?;
    let history = history_refresh(&state).await?;
    if let Some(pagination) = history.pagination {
        tracing::info!(
            page = pagination.page,
            total_pages = pagination.total_pages,
            "history loaded"
        );
    }

    let mut report = tokio::time::interval(REPORT_INTERVAL);
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = report.tick() => report_dashboard(&state).await?,
        }
    }

    let stopped = stop_live_monitor(&state).await?;
    tracing::info!(stopped = stopped.stopped, "shutdown complete");
    Ok(())
}

pub fn run() -> Result<(), AppError> {
    init_tracing();
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    runtime.block_on(serve())
}
