use crate::monitor::types::StatsSnapshot;
use serde::Serialize;

/// Queue capacity of the ingestion sink, used for utilisation.
pub const INGESTION_QUEUE_CAPACITY: u64 = 2_000;
pub const QUEUE_LAGGING_THRESHOLD_PCT: f64 = 80.0;

#[derive(Debug, Clone, Copy, Default)]
pub struct DeltaTracker {
    previous: Option<i64>,
}

impl DeltaTracker {
    /// Returns `current - previous` (0 the first time) and always moves the
    /// baseline to `current`.
    pub fn observe(&mut self, current: i64) -> i64 {
        let delta = match self.previous {
            Some(previous) => current.saturating_sub(previous),
            None => 0,
        };
        self.previous = Some(current);
        delta
    }

    pub fn previous(&self) -> Option<i64> {
        self.previous
    }
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10_f64.powi(decimals);
    (value * factor).round() / factor
}

/// Per-second rate for a counter delta observed over `elapsed_ms`. Without a
/// usable interval the delta is taken as one second's worth.
pub fn ingestion_rate_per_sec(delta: i64, elapsed_ms: i64) -> f64 {
    if elapsed_ms <= 0 {
        return delta as f64;
    }
    delta as f64 * 1_000.0 / elapsed_ms as f64
}

/// Ingestion rate vs generation rate, one decimal, unclamped.
pub fn rate_efficiency_pct(ingested_rate: f64, generated_rate: f64) -> f64 {
    if generated_rate <= 0.0 {
        return 0.0;
    }
    round_to(ingested_rate / generated_rate * 100.0, 1)
}

/// Clamped to 100, and 0 while nothing is being generated.
pub fn cumulative_efficiency_pct(total_ingested: u64, total_count: u64, tx_per_sec: f64) -> f64 {
    if tx_per_sec <= 0.0 {
        return 0.0;
    }
    let denominator = total_count.max(1) as f64;
    (total_ingested as f64 / denominator * 100.0)
        .min(100.0)
        .round()
}

pub fn queue_utilization_pct(queue_size: u64) -> f64 {
    (queue_size as f64 / INGESTION_QUEUE_CAPACITY as f64 * 100.0).round()
}

pub fn success_rate_pct(total_ingested: u64, total_failed: u64) -> f64 {
    let attempted = total_ingested.saturating_add(total_failed);
    if attempted == 0 {
        return 0.0;
    }
    round_to(total_ingested as f64 / attempted as f64 * 100.0, 1)
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EfficiencyPanel {
    pub throughput: f64,
    pub cumulative_efficiency_pct: f64,
    pub queue_utilization_pct: f64,
    pub total_ingested: u64,
    pub queue_lagging: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IngestionPanel {
    pub total_ingested: u64,
    pub total_failed: u64,
    pub pending_acks: u64,
    pub avg_latency_ms: f64,
    pub queue_size: u64,
    pub success_rate_pct: f64,
}

impl EfficiencyPanel {
    pub fn from_snapshot(snapshot: &StatsSnapshot) -> Option<Self> {
        let ingestion = snapshot.ingestion.as_ref()?;
        let queue_utilization_pct = queue_utilization_pct(ingestion.queue_size);
        Some(Self {
            throughput: snapshot.tx_per_sec,
            cumulative_efficiency_pct: cumulative_efficiency_pct(
                ingestion.total_ingested,
                snapshot.total_count,
                snapshot.tx_per_sec,
            ),
            queue_utilization_pct,
            total_ingested: ingestion.total_ingested,
            queue_lagging: queue_utilization_pct > QUEUE_LAGGING_THRESHOLD_PCT,
        })
    }
}

impl IngestionPanel {
    pub fn from_snapshot(snapshot: &StatsSnapshot) -> Option<Self> {
        let ingestion = snapshot.ingestion.as_ref()?;
        Some(Self {
            total_ingested: ingestion.total_ingested,
            total_failed: ingestion.total_failed,
            pending_acks: ingestion.pending_acks,
            avg_latency_ms: ingestion.avg_latency_ms,
            queue_size: ingestion.queue_size,
            success_rate_pct: success_rate_pct(ingestion.total_ingested, ingestion.total_failed),
        })
    }
}
