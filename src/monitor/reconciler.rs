use crate::monitor::delta::{EfficiencyPanel, IngestionPanel};
use crate::monitor::stream::{RecentTransactions, SharedRecentTransactions, StreamCounters};
use crate::monitor::types::{ConnectionState, MonitorConfig, MonitorEvent, StatsSnapshot, Transaction};
use crate::monitor::window::{
    comparison_window, latency_window, throughput_window, volume_window, ChartWindow,
    ComparisonPoint, LatencyPoint, ThroughputPoint, VolumePoint, WindowPoint,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StatsSource {
    Authoritative,
    #[default]
    Fallback,
}

#[derive(Debug, Clone, Serialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ReconciledStats {
    pub count: u64,
    pub volume: f64,
    pub avg_amount: f64,
    pub anomaly_count: u64,
    pub source: StatsSource,
}

/// Authoritative snapshot wins verbatim; the recent buffer is only used
/// until the first snapshot arrives.
pub fn reconcile(snapshot: Option<&StatsSnapshot>, recent: &RecentTransactions) -> ReconciledStats {
    if let Some(snapshot) = snapshot {
        return ReconciledStats {
            count: snapshot.total_count,
            volume: snapshot.total_volume,
            avg_amount: snapshot.avg_amount,
            anomaly_count: snapshot.anomaly_count,
            source: StatsSource::Authoritative,
        };
    }

    let count = recent.len() as u64;
    let volume: f64 = recent.iter().map(|transaction| transaction.amount).sum();
    let anomaly_count = recent
        .iter()
        .filter(|transaction| transaction.is_anomaly())
        .count() as u64;
    let avg_amount = if count == 0 {
        0.0
    } else {
        volume / count as f64
    };

    ReconciledStats {
        count,
        volume,
        avg_amount,
        anomaly_count,
        source: StatsSource::Fallback,
    }
}

#[derive(Debug, Clone, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct DashboardView {
    pub connection: ConnectionState,
    pub stats: ReconciledStats,
    pub tx_per_sec: f64,
    pub running: bool,
    pub elapsed_seconds: u64,
    pub recent: Vec<Transaction>,
    pub dropped_malformed: u64,
    pub throughput: Vec<WindowPoint<ThroughputPoint>>,
    pub volume: Vec<WindowPoint<VolumePoint>>,
    pub latency: Option<WindowPoint<LatencyPoint>>,
    pub comparison: Vec<WindowPoint<ComparisonPoint>>,
    pub efficiency: Option<EfficiencyPanel>,
    pub ingestion: Option<IngestionPanel>,
    pub updated_at_ms: i64,
}

pub type SharedDashboardView = Arc<RwLock<DashboardView>>;

#[derive(Debug)]
pub struct Dashboard {
    recent: SharedRecentTransactions,
    stream_counters: Arc<StreamCounters>,
    latest: Option<Arc<StatsSnapshot>>,
    connection: ConnectionState,
    throughput: ChartWindow<ThroughputPoint>,
    volume: ChartWindow<VolumePoint>,
    latency: ChartWindow<LatencyPoint>,
    comparison: ChartWindow<ComparisonPoint>,
    stats: ReconciledStats,
    updated_at_ms: i64,
}

impl Dashboard {
    pub fn new(
        config: &MonitorConfig,
        recent: SharedRecentTransactions,
        stream_counters: Arc<StreamCounters>,
    ) -> Self {
        let capacity = config.window_capacity;
        Self {
            recent,
            stream_counters,
            latest: None,
            connection: ConnectionState::Disconnected,
            throughput: throughput_window(capacity),
            volume: volume_window(capacity),
            latency: latency_window(capacity),
            comparison: comparison_window(capacity),
            stats: ReconciledStats::default(),
            updated_at_ms: 0,
        }
    }

    pub fn apply(&mut self, event: MonitorEvent, now_ms: i64) {
        match event {
            MonitorEvent::Connection(state) => {
                self.connection = state;
            }
            MonitorEvent::TransactionReceived => {
                // Authoritative stats do not move with stream traffic.
                if self.latest.is_none() {
                    self.refresh_stats();
                }
            }
            MonitorEvent::Snapshot(snapshot) => {
                self.throughput.observe(&snapshot, now_ms);
                self.volume.observe(&snapshot, now_ms);
                self.latency.observe(&snapshot, now_ms);
                self.comparison.observe(&snapshot, now_ms);
                self.latest = Some(snapshot);
                self.refresh_stats();
            }
        }
        self.updated_at_ms = now_ms;
    }

    fn refresh_stats(&mut self) {
        let recent = self.recent.lock();
        self.stats = reconcile(self.latest.as_deref(), &recent);
    }

    pub fn stats(&self) -> &ReconciledStats {
        &self.stats
    }

    pub fn connection(&self) -> ConnectionState {
        self.connection
    }

    pub fn view(&self) -> DashboardView {
        let latest = self.latest.as_deref();
        DashboardView {
            connection: self.connection,
            stats: self.stats.clone(),
            tx_per_sec: latest.map(|snapshot| snapshot.tx_per_sec).unwrap_or_default(),
            running: latest.map(|snapshot| snapshot.running).unwrap_or_default(),
            elapsed_seconds: latest
                .map(|snapshot| snapshot.elapsed_seconds)
                .unwrap_or_default(),
            recent: self.recent.lock().snapshot(),
            dropped_malformed: self.stream_counters.dropped_malformed(),
            throughput: self.throughput.snapshot(),
            volume: self.volume.snapshot(),
            latency: self.latency.latest().cloned(),
            comparison: self.comparison.snapshot(),
            efficiency: latest.and_then(EfficiencyPanel::from_snapshot),
            ingestion: latest.and_then(IngestionPanel::from_snapshot),
            updated_at_ms: self.updated_at_ms,
        }
    }
}

pub async fn run_dashboard(
    mut dashboard: Dashboard,
    mut events: mpsc::Receiver<MonitorEvent>,
    view_store: SharedDashboardView,
    cancel_token: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            _ = cancel_token.cancelled() => break,
            next_event = events.recv() => next_event,
        };

        let Some(event) = event else {
            break;
        };

        dashboard.apply(event, now_unix_ms());
        let view = dashboard.view();
        let mut writable = view_store.write().await;
        *writable = view;
    }
}

pub fn now_unix_ms() -> i64 {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(duration) => duration.as_millis().min(i64::MAX as u128) as i64,
        Err(_) => 0,
    }
}
