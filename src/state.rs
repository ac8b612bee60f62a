use crate::error::AppError;
use crate::monitor::api::build_http_client;
use crate::monitor::control::ControlClient;
use crate::monitor::history::{HistoryQueryClient, SharedHistoryState};
use crate::monitor::live::LiveMonitor;
use crate::monitor::reconciler::{DashboardView, SharedDashboardView};
use crate::monitor::types::MonitorConfig;
use reqwest::Client;
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Mutex, RwLock};

pub struct AppState {
    pub started_at: Instant,
    pub db_pool: SqlitePool,
    pub config: MonitorConfig,
    pub http_client: Client,
    pub live_monitor: Mutex<Option<LiveMonitor>>,
    pub dashboard_view: SharedDashboardView,
    pub history: Mutex<HistoryQueryClient>,
    pub history_state: SharedHistoryState,
    pub controls: Mutex<ControlClient>,
}

impl AppState {
    pub fn new(db_pool: SqlitePool, config: MonitorConfig) -> Result<Self, AppError> {
        let http_client = build_http_client(config.request_timeout_ms)?;
        let history = HistoryQueryClient::new(
            http_client.clone(),
            config.base_url.clone(),
            config.history_page_size,
        );
        let history_state = history.state_handle();
        let controls = ControlClient::new(http_client.clone(), config.base_url.clone());

        Ok(Self {
            started_at: Instant::now(),
            db_pool,
            config,
            http_client,
            live_monitor: Mutex::new(None),
            dashboard_view: Arc::new(RwLock::new(DashboardView::default())),
            history: Mutex::new(history),
            history_state,
            controls: Mutex::new(controls),
        })
    }
}
