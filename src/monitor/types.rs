use crate::error::AppError;
use serde::{Deserialize, Serialize};

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8000";
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1_000;
pub const DEFAULT_RECONNECT_DELAY_MS: u64 = 2_000;
pub const DEFAULT_WINDOW_CAPACITY: usize = 60;
pub const DEFAULT_RECENT_CAPACITY: usize = 100;
pub const DEFAULT_HISTORY_PAGE_SIZE: u32 = 50;
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 5_000;
pub const MIN_POLL_INTERVAL_MS: u64 = 100;
pub const MAX_POLL_INTERVAL_MS: u64 = 60_000;
pub const MIN_RECONNECT_DELAY_MS: u64 = 10;
pub const MAX_RECONNECT_DELAY_MS: u64 = 60_000;
pub const MIN_WINDOW_CAPACITY: usize = 1;
pub const MAX_WINDOW_CAPACITY: usize = 3_600;
pub const MIN_RECENT_CAPACITY: usize = 1;
pub const MAX_RECENT_CAPACITY: usize = 10_000;
pub const MIN_HISTORY_PAGE_SIZE: u32 = 10;
pub const MAX_HISTORY_PAGE_SIZE: u32 = 500;
pub const MIN_REQUEST_TIMEOUT_MS: u64 = 100;
pub const MAX_REQUEST_TIMEOUT_MS: u64 = 120_000;

/// Risk scores strictly above this value count as anomalies.
pub const ANOMALY_RISK_THRESHOLD: f64 = 0.8;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

impl ConnectionState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    Payment,
    Transfer,
    Refund,
    Withdrawal,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
    Flagged,
}

#[derive(Debug, Deserialize)]
pub struct TransactionWire {
    pub id: String,
    pub timestamp: String,
    pub sender: String,
    pub receiver: String,
    pub amount: f64,
    pub currency: String,
    #[serde(rename = "type")]
    pub kind: TransactionType,
    pub status: TransactionStatus,
    pub category: String,
    pub risk_score: f64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: String,
    pub timestamp: String,
    pub sender: String,
    pub receiver: String,
    pub amount: f64,
    pub currency: String,
    #[serde(rename = "type")]
    pub kind: TransactionType,
    pub status: TransactionStatus,
    pub category: String,
    pub risk_score: f64,
}

impl Transaction {
    pub fn is_anomaly(&self) -> bool {
        self.risk_score > ANOMALY_RISK_THRESHOLD
    }
}

impl TryFrom<TransactionWire> for Transaction {
    type Error = AppError;

    fn try_from(value: TransactionWire) -> Result<Self, Self::Error> {
        if !value.amount.is_finite() {
            return Err(AppError::InvalidArgument(
                "transaction amount must be finite".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&value.risk_score) {
            return Err(AppError::InvalidArgument(format!(
                "risk_score {} outside 0.0..=1.0",
                value.risk_score
            )));
        }

        Ok(Self {
            id: value.id,
            timestamp: value.timestamp,
            sender: value.sender,
            receiver: value.receiver,
            amount: value.amount,
            currency: value.currency,
            kind: value.kind,
            status: value.status,
            category: value.category,
            risk_score: value.risk_score,
        })
    }
}

pub fn parse_transaction_payload(payload: &mut [u8]) -> Result<Transaction, AppError> {
    let wire: TransactionWire = simd_json::serde::from_slice(payload)?;
    wire.try_into()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct IngestionStats {
    pub total_ingested: u64,
    pub total_failed: u64,
    pub pending_acks: u64,
    pub queue_size: u64,
    pub avg_latency_ms: f64,
    pub min_latency_ms: f64,
    pub max_latency_ms: f64,
    pub p50_latency_ms: f64,
    pub p95_latency_ms: f64,
    pub p99_latency_ms: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StatsSnapshot {
    pub total_count: u64,
    pub total_volume: f64,
    pub avg_amount: f64,
    pub anomaly_count: u64,
    pub tx_per_sec: f64,
    pub elapsed_seconds: u64,
    pub running: bool,
    pub ingestion: Option<IngestionStats>,
}

impl StatsSnapshot {
    pub fn total_ingested(&self) -> u64 {
        self.ingestion
            .as_ref()
            .map(|ingestion| ingestion.total_ingested)
            .unwrap_or_default()
    }
}

/// Everything the live producers tell the dashboard, in arrival order.
#[derive(Debug, Clone)]
pub enum MonitorEvent {
    Connection(ConnectionState),
    /// A transaction was prepended to the stream's recent buffer.
    TransactionReceived,
    Snapshot(std::sync::Arc<StatsSnapshot>),
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct MonitorArgs {
    pub base_url: Option<String>,
    pub poll_interval_ms: Option<u64>,
    pub reconnect_delay_ms: Option<u64>,
    pub window_capacity: Option<usize>,
    pub recent_capacity: Option<usize>,
    pub history_page_size: Option<u32>,
    pub request_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub base_url: reqwest::Url,
    pub poll_interval_ms: u64,
    pub reconnect_delay_ms: u64,
    pub window_capacity: usize,
    pub recent_capacity: usize,
    pub history_page_size: u32,
    pub request_timeout_ms: u64,
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn env_number<T: std::str::FromStr>(key: &str) -> Result<Option<T>, AppError> {
    match env_value(key) {
        Some(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|_| AppError::InvalidArgument(format!("{key} must be a number, got '{raw}'"))),
        None => Ok(None),
    }
}

pub(crate) fn check_range<T>(name: &str, value: T, min: T, max: T) -> Result<T, AppError>
where
    T: PartialOrd + std::fmt::Display + Copy,
{
    if value < min || value > max {
        return Err(AppError::InvalidArgument(format!(
            "{name} must be between {min} and {max}"
        )));
    }
    Ok(value)
}

impl MonitorArgs {
    pub fn from_env() -> Result<Self, AppError> {
        Ok(Self {
            base_url: env_value("PULSE_BASE_URL"),
            poll_interval_ms: env_number("PULSE_POLL_INTERVAL_MS")?,
            reconnect_delay_ms: env_number("PULSE_RECONNECT_DELAY_MS")?,
            window_capacity: env_number("PULSE_WINDOW_CAPACITY")?,
            recent_capacity: env_number("PULSE_RECENT_CAPACITY")?,
            history_page_size: env_number("PULSE_HISTORY_PAGE_SIZE")?,
            request_timeout_ms: env_number("PULSE_REQUEST_TIMEOUT_MS")?,
        })
    }

    pub fn normalize(self) -> Result<MonitorConfig, AppError> {
        let raw_base_url = self
            .base_url
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let base_url = reqwest::Url::parse(raw_base_url.trim()).map_err(|error| {
            AppError::InvalidArgument(format!("baseUrl '{raw_base_url}' is invalid: {error}"))
        })?;
        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(AppError::InvalidArgument(
                "baseUrl must use http or https".to_string(),
            ));
        }

        let poll_interval_ms = check_range(
            "pollIntervalMs",
            self.poll_interval_ms.unwrap_or(DEFAULT_POLL_INTERVAL_MS),
            MIN_POLL_INTERVAL_MS,
            MAX_POLL_INTERVAL_MS,
        )?;
        let reconnect_delay_ms = check_range(
            "reconnectDelayMs",
            self.reconnect_delay_ms.unwrap_or(DEFAULT_RECONNECT_DELAY_MS),
            MIN_RECONNECT_DELAY_MS,
            MAX_RECONNECT_DELAY_MS,
        )?;
        let window_capacity = check_range(
            "windowCapacity",
            self.window_capacity.unwrap_or(DEFAULT_WINDOW_CAPACITY),
            MIN_WINDOW_CAPACITY,
            MAX_WINDOW_CAPACITY,
        )?;
        let recent_capacity = check_range(
            "recentCapacity",
            self.recent_capacity.unwrap_or(DEFAULT_RECENT_CAPACITY),
            MIN_RECENT_CAPACITY,
            MAX_RECENT_CAPACITY,
        )?;
        let history_page_size = check_range(
            "historyPageSize",
            self.history_page_size.unwrap_or(DEFAULT_HISTORY_PAGE_SIZE),
            MIN_HISTORY_PAGE_SIZE,
            MAX_HISTORY_PAGE_SIZE,
        )?;
        let request_timeout_ms = check_range(
            "requestTimeoutMs",
            self.request_timeout_ms.unwrap_or(DEFAULT_REQUEST_TIMEOUT_MS),
            MIN_REQUEST_TIMEOUT_MS,
            MAX_REQUEST_TIMEOUT_MS,
        )?;

        Ok(MonitorConfig {
            base_url,
            poll_interval_ms,
            reconnect_delay_ms,
            window_capacity,
            recent_capacity,
            history_page_size,
            request_timeout_ms,
        })
    }
}
