use crate::error::AppError;
use crate::monitor::types::StatsSnapshot;
use reqwest::{Client, Url};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::{connect_async_with_config, MaybeTlsStream, WebSocketStream};

const STREAM_PATH: &str = "/ws";
const STATS_PATH: &str = "/api/stats";
const START_PATH: &str = "/api/start";
const STOP_PATH: &str = "/api/stop";
const THROTTLE_PATH: &str = "/api/throttle";
const HISTORY_SUMMARY_PATH: &str = "/api/history/summary";
const HISTORY_TRANSACTIONS_PATH: &str = "/api/history/transactions";
const HISTORY_CLEAR_PATH: &str = "/api/history/clear";

pub type TransactionWsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

fn join_path(base_url: &Url, path: &str) -> String {
    format!("{}{path}", base_url.as_str().trim_end_matches('/'))
}

/// Stream endpoint for `base_url`: `https` pages get `wss`, everything else `ws`.
pub fn stream_endpoint(base_url: &Url) -> String {
    let scheme = if base_url.scheme() == "https" {
        "wss"
    } else {
        "ws"
    };
    let host = base_url.host_str().unwrap_or("localhost");
    match base_url.port() {
        Some(port) => format!("{scheme}://{host}:{port}{STREAM_PATH}"),
        None => format!("{scheme}://{host}{STREAM_PATH}"),
    }
}

pub fn stats_endpoint(base_url: &Url) -> String {
    join_path(base_url, STATS_PATH)
}

pub fn start_endpoint(base_url: &Url) -> String {
    join_path(base_url, START_PATH)
}

pub fn stop_endpoint(base_url: &Url) -> String {
    join_path(base_url, STOP_PATH)
}

pub fn throttle_endpoint(base_url: &Url, value: u8) -> String {
    join_path(base_url, THROTTLE_PATH) + &format!("?value={value}")
}

pub fn history_summary_endpoint(base_url: &Url) -> String {
    join_path(base_url, HISTORY_SUMMARY_PATH)
}

pub fn history_transactions_endpoint(base_url: &Url, limit: u32, offset: u64) -> String {
    join_path(base_url, HISTORY_TRANSACTIONS_PATH) + &format!("?limit={limit}&offset={offset}")
}

pub fn history_clear_endpoint(base_url: &Url) -> String {
    join_path(base_url, HISTORY_CLEAR_PATH)
}

pub fn build_http_client(request_timeout_ms: u64) -> Result<Client, AppError> {
    let client = Client::builder()
        .timeout(Duration::from_millis(request_timeout_ms))
        .build()?;
    Ok(client)
}

pub async fn connect_transaction_stream(endpoint: &str) -> Result<TransactionWsStream, AppError> {
    let ws_config = WebSocketConfig {
        max_message_size: Some(1 << 20),
        max_frame_size: Some(1 << 20),
        ..Default::default()
    };

    let (stream, _) = connect_async_with_config(endpoint, Some(ws_config), true).await?;
    Ok(stream)
}

pub async fn fetch_stats_snapshot(client: &Client, base_url: &Url) -> Result<StatsSnapshot, AppError> {
    let response = client
        .get(stats_endpoint(base_url))
        .send()
        .await?
        .error_for_status()?;
    let snapshot = response.json::<StatsSnapshot>().await?;
    Ok(snapshot)
}

pub async fn post_control(client: &Client, endpoint: String) -> Result<(), AppError> {
    client.post(endpoint).send().await?.error_for_status()?;
    Ok(())
}
