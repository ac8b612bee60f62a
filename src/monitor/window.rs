use crate::monitor::delta::{ingestion_rate_per_sec, rate_efficiency_pct, DeltaTracker};
use crate::monitor::types::StatsSnapshot;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;

const TIME_LABEL_FORMAT: &str = "%H:%M:%S";
const UNREPRESENTABLE_TIME_LABEL: &str = "--:--:--";

/// Fixed-capacity FIFO sequence, oldest point first.
#[derive(Debug, Clone)]
pub struct WindowBuffer<T> {
    points: VecDeque<T>,
    capacity: usize,
}

impl<T: Clone> WindowBuffer<T> {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            points: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, point: T) {
        self.points.push_back(point);
        while self.points.len() > self.capacity {
            self.points.pop_front();
        }
    }

    pub fn snapshot(&self) -> Vec<T> {
        self.points.iter().cloned().collect()
    }

    pub fn latest(&self) -> Option<&T> {
        self.points.back()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WindowPoint<T> {
    pub time: String,
    pub at_ms: i64,
    #[serde(flatten)]
    pub value: T,
}

impl<T> WindowPoint<T> {
    pub fn new(at_ms: i64, value: T) -> Self {
        Self {
            time: time_label(at_ms),
            at_ms,
            value,
        }
    }
}

/// `HH:MM:SS` (24h, UTC) for a unix-millisecond timestamp.
pub fn time_label(at_ms: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(at_ms)
        .map(|at| at.format(TIME_LABEL_FORMAT).to_string())
        .unwrap_or_else(|| UNREPRESENTABLE_TIME_LABEL.to_string())
}

pub type Projection<T> = Box<dyn FnMut(&StatsSnapshot, i64) -> Option<T> + Send>;

pub struct ChartWindow<T> {
    buffer: WindowBuffer<WindowPoint<T>>,
    project: Projection<T>,
}

impl<T: Clone> ChartWindow<T> {
    pub fn new(capacity: usize, project: Projection<T>) -> Self {
        Self {
            buffer: WindowBuffer::new(capacity),
            project,
        }
    }

    /// Returns whether a point was pushed.
    pub fn observe(&mut self, snapshot: &StatsSnapshot, at_ms: i64) -> bool {
        match (self.project)(snapshot, at_ms) {
            Some(value) => {
                self.buffer.push(WindowPoint::new(at_ms, value));
                true
            }
            None => false,
        }
    }

    pub fn snapshot(&self) -> Vec<WindowPoint<T>> {
        self.buffer.snapshot()
    }

    pub fn latest(&self) -> Option<&WindowPoint<T>> {
        self.buffer.latest()
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

impl<T> std::fmt::Debug for ChartWindow<T>
where
    T: std::fmt::Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChartWindow")
            .field("buffer", &self.buffer)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ThroughputPoint {
    pub tx_per_sec: f64,
    pub ingested: u64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VolumePoint {
    pub volume: f64,
    pub count: u64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LatencyPoint {
    pub avg: f64,
    pub min: f64,
    pub max: f64,
    pub p50: f64,
    pub p95: f64,
    pub p99: f64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonPoint {
    pub generated: f64,
    pub ingested: f64,
    pub ingested_delta: i64,
    pub rate_efficiency_pct: f64,
}

pub fn throughput_window(capacity: usize) -> ChartWindow<ThroughputPoint> {
    ChartWindow::new(
        capacity,
        Box::new(|snapshot: &StatsSnapshot, _at_ms: i64| {
            Some(ThroughputPoint {
                tx_per_sec: snapshot.tx_per_sec,
                ingested: snapshot.total_ingested(),
            })
        }),
    )
}

pub fn volume_window(capacity: usize) -> ChartWindow<VolumePoint> {
    ChartWindow::new(
        capacity,
        Box::new(|snapshot: &StatsSnapshot, _at_ms: i64| {
            Some(VolumePoint {
                volume: snapshot.total_volume,
                count: snapshot.total_count,
            })
        }),
    )
}

/// Latency bars only update once the sink reports a non-zero average.
pub fn latency_window(capacity: usize) -> ChartWindow<LatencyPoint> {
    ChartWindow::new(
        capacity,
        Box::new(|snapshot: &StatsSnapshot, _at_ms: i64| {
            let ingestion = snapshot.ingestion.as_ref()?;
            if ingestion.avg_latency_ms <= 0.0 {
                return None;
            }
            Some(LatencyPoint {
                avg: ingestion.avg_latency_ms,
                min: ingestion.min_latency_ms,
                max: ingestion.max_latency_ms,
                p50: ingestion.p50_latency_ms,
                p95: ingestion.p95_latency_ms,
                p99: ingestion.p99_latency_ms,
            })
        }),
    )
}

/// Generated rate vs ingestion rate, both per second. The ingestion delta is
/// scaled by the time elapsed since the previous snapshot.
pub fn comparison_window(capacity: usize) -> ChartWindow<ComparisonPoint> {
    let mut ingested = DeltaTracker::default();
    let mut previous_at_ms: Option<i64> = None;
    ChartWindow::new(
        capacity,
        Box::new(move |snapshot: &StatsSnapshot, at_ms: i64| {
            let ingested_delta = ingested.observe(counter_value(snapshot.total_ingested()));
            let elapsed_ms = previous_at_ms.map_or(0, |previous| at_ms.saturating_sub(previous));
            previous_at_ms = Some(at_ms);

            let ingested_rate = ingestion_rate_per_sec(ingested_delta, elapsed_ms);
            let generated = snapshot.tx_per_sec;
            Some(ComparisonPoint {
                generated,
                ingested: ingested_rate,
                ingested_delta,
                rate_efficiency_pct: rate_efficiency_pct(ingested_rate, generated),
            })
        }),
    )
}

fn counter_value(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}
