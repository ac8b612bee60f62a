use crate::monitor::api::stream_endpoint;
use crate::monitor::poller::{MetricsPoller, PollCounters};
use crate::monitor::reconciler::{run_dashboard, Dashboard, SharedDashboardView};
use crate::monitor::stream::{StreamClient, StreamCounters};
use crate::monitor::types::{ConnectionState, MonitorConfig, StatsSnapshot, Transaction};
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const EVENT_CHANNEL_CAPACITY: usize = 1_024;

struct DashboardHandle {
    cancellation_token: CancellationToken,
    join_handle: JoinHandle<()>,
}

/// One live session: stream, poller and the dashboard task that consumes
/// both. Dropping without `teardown` leaves the tasks running.
pub struct LiveMonitor {
    stream: StreamClient,
    poller: MetricsPoller,
    dashboard: Option<DashboardHandle>,
    view_store: SharedDashboardView,
}

impl LiveMonitor {
    pub fn start(config: &MonitorConfig, http_client: Client, view_store: SharedDashboardView) -> Self {
        let (events, receiver) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

        let mut stream = StreamClient::new(
            stream_endpoint(&config.base_url),
            Duration::from_millis(config.reconnect_delay_ms),
            config.recent_capacity,
            events.clone(),
        );
        let mut poller = MetricsPoller::new(
            http_client,
            config.base_url.clone(),
            Duration::from_millis(config.poll_interval_ms),
            events,
        );

        let dashboard = Dashboard::new(config, stream.recent(), stream.counters());
        let cancellation_token = CancellationToken::new();
        let join_handle = tokio::spawn(run_dashboard(
            dashboard,
            receiver,
            Arc::clone(&view_store),
            cancellation_token.clone(),
        ));

        tracing::info!(
            endpoint = stream.endpoint(),
            poll_interval_ms = config.poll_interval_ms,
            "live monitor starting"
        );
        stream.connect();
        poller.activate();

        Self {
            stream,
            poller,
            dashboard: Some(DashboardHandle {
                cancellation_token,
                join_handle,
            }),
            view_store,
        }
    }

    pub async fn teardown(&mut self) {
        self.stream.teardown().await;
        self.poller.deactivate().await;

        if let Some(dashboard) = self.dashboard.take() {
            dashboard.cancellation_token.cancel();
            let _ = dashboard.join_handle.await;
        }

        self.view_store.write().await.connection = ConnectionState::Disconnected;
        tracing::info!("live monitor stopped");
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.stream.state()
    }

    pub fn latest_snapshot(&self) -> Option<Arc<StatsSnapshot>> {
        self.poller.latest()
    }

    pub fn recent_transactions(&self) -> Vec<Transaction> {
        self.stream.recent_transactions()
    }

    pub fn stream_counters(&self) -> Arc<StreamCounters> {
        self.stream.counters()
    }

    pub fn poll_counters(&self) -> Arc<PollCounters> {
        self.poller.counters()
    }

    pub fn is_polling(&self) -> bool {
        self.poller.is_active()
    }
}
