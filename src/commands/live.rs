use crate::error::AppError;
use crate::monitor::api::stream_endpoint;
use crate::monitor::live::LiveMonitor;
use crate::monitor::persistence::{save_preferences, SavePreferencesArgs};
use crate::monitor::reconciler::DashboardView;
use crate::state::AppState;
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveSession {
    pub stream_endpoint: String,
    pub poll_interval_ms: u64,
    pub reconnect_delay_ms: u64,
    pub window_capacity: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveStopResult {
    pub stopped: bool,
}

/// Replaces any running session with a fresh one.
pub async fn start_live_monitor(state: &AppState) -> Result<LiveSession, AppError> {
    let mut monitor_slot = state.live_monitor.lock().await;
    if let Some(mut existing) = monitor_slot.take() {
        existing.teardown().await;
    }

    *monitor_slot = Some(LiveMonitor::start(
        &state.config,
        state.http_client.clone(),
        Arc::clone(&state.dashboard_view),
    ));

    Ok(LiveSession {
        stream_endpoint: stream_endpoint(&state.config.base_url),
        poll_interval_ms: state.config.poll_interval_ms,
        reconnect_delay_ms: state.config.reconnect_delay_ms,
        window_capacity: state.config.window_capacity,
    })
}

pub async fn stop_live_monitor(state: &AppState) -> Result<LiveStopResult, AppError> {
    let existing = {
        let mut monitor_slot = state.live_monitor.lock().await;
        monitor_slot.take()
    };

    let stopped = if let Some(mut monitor) = existing {
        monitor.teardown().await;
        true
    } else {
        false
    };

    state.controls.lock().await.teardown().await;
    Ok(LiveStopResult { stopped })
}

pub async fn dashboard_view(state: &AppState) -> Result<DashboardView, AppError> {
    let view = state.dashboard_view.read().await.clone();
    Ok(view)
}

pub async fn start_generator(state: &AppState) -> Result<(), AppError> {
    state.controls.lock().await.start().await
}

pub async fn stop_generator(state: &AppState) -> Result<(), AppError> {
    state.controls.lock().await.stop().await
}

/// Clamps, schedules the debounced POST and remembers the value.
pub async fn set_throttle(state: &AppState, value: i64) -> Result<u8, AppError> {
    let applied = state.controls.lock().await.set_throttle(value);
    save_preferences(
        &state.db_pool,
        SavePreferencesArgs {
            throttle: Some(i64::from(applied)),
            history_page_size: None,
        },
    )
    .await?;
    Ok(applied)
}
