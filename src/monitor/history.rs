use crate::error::AppError;
use crate::monitor::api::{
    history_clear_endpoint, history_summary_endpoint, history_transactions_endpoint,
};
use crate::monitor::types::ANOMALY_RISK_THRESHOLD;
use parking_lot::RwLock;
use reqwest::{Client, Response, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Aggregate columns arrive as strings (or null) straight from the warehouse.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HistorySummaryRow {
    pub total_rows: Option<String>,
    pub total_volume: Option<String>,
    pub avg_amount: Option<String>,
    pub anomaly_count: Option<String>,
    pub anomaly_pct: Option<String>,
    pub earliest: Option<String>,
    pub latest: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TypeBreakdown {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub count: Option<String>,
    pub volume: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StatusBreakdown {
    pub status: Option<String>,
    pub count: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CurrencyBreakdown {
    pub currency: Option<String>,
    pub count: Option<String>,
    pub volume: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HistorySummary {
    pub summary: Vec<HistorySummaryRow>,
    pub by_type: Vec<TypeBreakdown>,
    pub by_status: Vec<StatusBreakdown>,
    pub by_currency: Vec<CurrencyBreakdown>,
    #[serde(skip_serializing)]
    error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HistoryRow {
    pub id: Option<String>,
    pub timestamp: Option<String>,
    pub sender: Option<String>,
    pub receiver: Option<String>,
    pub amount: Option<String>,
    pub currency: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub status: Option<String>,
    pub category: Option<String>,
    pub risk_score: Option<String>,
}

fn parse_decimal(raw: Option<&String>) -> Option<f64> {
    raw.and_then(|value| value.trim().parse::<f64>().ok())
}

impl HistoryRow {
    pub fn amount_value(&self) -> Option<f64> {
        parse_decimal(self.amount.as_ref())
    }

    pub fn risk_score_value(&self) -> Option<f64> {
        parse_decimal(self.risk_score.as_ref())
    }

    pub fn is_high_risk(&self) -> bool {
        self.risk_score_value()
            .map(|risk| risk > ANOMALY_RISK_THRESHOLD)
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HistoryTransactionsPage {
    pub transactions: Vec<HistoryRow>,
    pub total: u64,
    pub limit: u32,
    pub offset: u64,
    #[serde(skip_serializing)]
    error: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: u64,
    pub total_pages: u64,
    pub has_previous: bool,
    pub has_next: bool,
    pub previous_offset: u64,
    pub next_offset: u64,
}

impl Pagination {
    pub fn new(limit: u32, offset: u64, total: u64) -> Self {
        let limit = u64::from(limit.max(1));
        Self {
            page: offset / limit + 1,
            total_pages: total.div_ceil(limit).max(1),
            has_previous: offset > 0,
            has_next: offset.saturating_add(limit) < total,
            previous_offset: offset.saturating_sub(limit),
            next_offset: offset.saturating_add(limit),
        }
    }
}

impl HistoryTransactionsPage {
    pub fn pagination(&self) -> Pagination {
        Pagination::new(self.limit, self.offset, self.total)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ClearResponse {
    status: Option<String>,
    error: Option<String>,
}

trait HistoryEnvelope {
    fn take_error(&mut self) -> Option<String>;
}

impl HistoryEnvelope for HistorySummary {
    fn take_error(&mut self) -> Option<String> {
        self.error.take()
    }
}

impl HistoryEnvelope for HistoryTransactionsPage {
    fn take_error(&mut self) -> Option<String> {
        self.error.take()
    }
}

impl HistoryEnvelope for ClearResponse {
    fn take_error(&mut self) -> Option<String> {
        self.error.take()
    }
}

/// A non-empty `error` field fails the request whatever the HTTP status.
fn decode_history_body<T>(status: reqwest::StatusCode, body: &mut [u8]) -> Result<T, AppError>
where
    T: DeserializeOwned + HistoryEnvelope,
{
    let decoded = simd_json::serde::from_slice::<T>(body);
    let mut decoded = match decoded {
        Ok(decoded) => decoded,
        Err(error) if status.is_success() => return Err(error.into()),
        Err(_) => {
            return Err(AppError::Api(format!(
                "history request failed with status {status}"
            )))
        }
    };

    if let Some(message) = decoded.take_error().filter(|message| !message.is_empty()) {
        return Err(AppError::Api(message));
    }
    if !status.is_success() {
        return Err(AppError::Api(format!(
            "history request failed with status {status}"
        )));
    }
    Ok(decoded)
}

async fn read_history_body<T>(response: Response) -> Result<T, AppError>
where
    T: DeserializeOwned + HistoryEnvelope,
{
    let status = response.status();
    let mut body = response.bytes().await?.to_vec();
    decode_history_body(status, &mut body)
}

pub async fn request_summary(client: &Client, base_url: &Url) -> Result<HistorySummary, AppError> {
    let response = client.get(history_summary_endpoint(base_url)).send().await?;
    read_history_body(response).await
}

pub async fn request_transactions(
    client: &Client,
    base_url: &Url,
    limit: u32,
    offset: u64,
) -> Result<HistoryTransactionsPage, AppError> {
    let response = client
        .get(history_transactions_endpoint(base_url, limit, offset))
        .send()
        .await?;
    read_history_body(response).await
}

pub async fn request_clear(client: &Client, base_url: &Url) -> Result<(), AppError> {
    let response = client.post(history_clear_endpoint(base_url)).send().await?;
    let cleared: ClearResponse = read_history_body(response).await?;
    tracing::info!(status = cleared.status.as_deref().unwrap_or("unknown"), "history cleared");
    Ok(())
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryState {
    pub summary: Option<HistorySummary>,
    pub transactions: Option<HistoryTransactionsPage>,
    pub pagination: Option<Pagination>,
    pub loading: bool,
    pub error: Option<String>,
}

/// Published history state. Readers never wait on an in-flight request.
pub type SharedHistoryState = Arc<RwLock<HistoryState>>;

/// On-demand reads of the historical store. Independent of the live path.
pub struct HistoryQueryClient {
    http_client: Client,
    base_url: Url,
    page_size: u32,
    state: SharedHistoryState,
}

impl HistoryQueryClient {
    pub fn new(http_client: Client, base_url: Url, page_size: u32) -> Self {
        Self {
            http_client,
            base_url,
            page_size: page_size.max(1),
            state: Arc::new(RwLock::new(HistoryState::default())),
        }
    }

    pub fn state(&self) -> HistoryState {
        self.state.read().clone()
    }

    pub fn state_handle(&self) -> SharedHistoryState {
        Arc::clone(&self.state)
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    pub fn set_page_size(&mut self, page_size: u32) {
        self.page_size = page_size.max(1);
    }

    pub async fn fetch_summary(&mut self) -> Result<HistorySummary, AppError> {
        let summary = request_summary(&self.http_client, &self.base_url)
            .await
            .inspect_err(|error| tracing::warn!(%error, "history summary fetch failed"))?;
        self.state.write().summary = Some(summary.clone());
        Ok(summary)
    }

    pub async fn fetch_transactions(
        &mut self,
        limit: u32,
        offset: u64,
    ) -> Result<HistoryTransactionsPage, AppError> {
        let page = request_transactions(&self.http_client, &self.base_url, limit, offset)
            .await
            .inspect_err(|error| tracing::warn!(%error, limit, offset, "history page fetch failed"))?;
        let mut state = self.state.write();
        state.pagination = Some(page.pagination());
        state.transactions = Some(page.clone());
        Ok(page)
    }

    /// Summary and first page in parallel. A failure in one does not
    /// discard the other; the first failure becomes the error state.
    pub async fn refresh(&mut self) -> HistoryState {
        {
            let mut state = self.state.write();
            state.loading = true;
            state.error = None;
        }

        let (summary, page) = tokio::join!(
            request_summary(&self.http_client, &self.base_url),
            request_transactions(&self.http_client, &self.base_url, self.page_size, 0),
        );

        let mut state = self.state.write();
        let mut first_error = None;
        match summary {
            Ok(summary) => state.summary = Some(summary),
            Err(error) => first_error = Some(error),
        }
        match page {
            Ok(page) => {
                state.pagination = Some(page.pagination());
                state.transactions = Some(page);
            }
            Err(error) => {
                first_error.get_or_insert(error);
            }
        }

        if let Some(error) = first_error {
            tracing::warn!(%error, "history refresh failed");
            state.error = Some(error.to_string());
        }
        state.loading = false;
        state.clone()
    }

    /// Destructive. Callers confirm with the operator before invoking.
    pub async fn clear(&mut self) -> Result<(), AppError> {
        if let Err(error) = request_clear(&self.http_client, &self.base_url).await {
            tracing::warn!(%error, "history clear failed");
            self.state.write().error = Some(error.to_string());
            return Err(error);
        }

        self.refresh().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn pagination_matches_offset_and_total() {
        let pagination = Pagination::new(50, 100, 237);

        assert_eq!(pagination.page, 3);
        assert_eq!(pagination.total_pages, 5);
        assert!(pagination.has_previous);
        assert!(pagination.has_next);
        assert_eq!(pagination.previous_offset, 50);
        assert_eq!(pagination.next_offset, 150);
    }

    #[test]
    fn pagination_on_empty_table_has_one_page() {
        let pagination = Pagination::new(50, 0, 0);

        assert_eq!(pagination.page, 1);
        assert_eq!(pagination.total_pages, 1);
        assert!(!pagination.has_previous);
        assert!(!pagination.has_next);
        assert_eq!(pagination.previous_offset, 0);
    }

    #[test]
    fn last_page_has_no_next() {
        let pagination = Pagination::new(50, 200, 237);
        assert_eq!(pagination.page, 5);
        assert!(!pagination.has_next);
    }

    #[test]
    fn rows_flag_high_risk_from_string_scores() {
        let mut row = HistoryRow {
            risk_score: Some("0.81".to_string()),
            amount: Some(" 12.50 ".to_string()),
            ..HistoryRow::default()
        };
        assert!(row.is_high_risk());
        assert_eq!(row.amount_value(), Some(12.5));

        row.risk_score = Some("0.8".to_string());
        assert!(!row.is_high_risk());

        row.risk_score = None;
        assert!(!row.is_high_risk());
    }

    #[test]
    fn decodes_page_with_null_columns() {
        let mut body = br#"{"transactions":[{"id":"tx-1","amount":"10.00","risk_score":null,"type":"payment"}],"total":1,"limit":50,"offset":0}"#.to_vec();
        let page: HistoryTransactionsPage =
            decode_history_body(StatusCode::OK, &mut body).expect("page should decode");

        assert_eq!(page.transactions.len(), 1);
        assert_eq!(page.transactions[0].kind.as_deref(), Some("payment"));
        assert!(page.transactions[0].risk_score.is_none());
        assert_eq!(page.total, 1);
    }

    #[test]
    fn body_error_fails_even_with_ok_status() {
        let mut body = br#"{"error":"Databricks SQL not configured"}"#.to_vec();
        let result: Result<HistorySummary, AppError> =
            decode_history_body(StatusCode::OK, &mut body);

        match result {
            Err(error) => assert_eq!(error.to_string(), "Databricks SQL not configured"),
            Ok(_) => panic!("error body must fail"),
        }
    }

    #[test]
    fn body_error_message_wins_over_status() {
        let mut body = br#"{"error":"permission denied"}"#.to_vec();
        let result: Result<ClearResponse, AppError> =
            decode_history_body(StatusCode::FORBIDDEN, &mut body);

        assert_eq!(
            result.err().map(|error| error.to_string()),
            Some("permission denied".to_string())
        );
    }

    #[test]
    fn non_json_error_status_reports_status() {
        let mut body = b"<html>bad gateway</html>".to_vec();
        let result: Result<HistorySummary, AppError> =
            decode_history_body(StatusCode::BAD_GATEWAY, &mut body);

        let message = result.err().map(|error| error.to_string()).unwrap_or_default();
        assert!(message.contains("502"));
    }

    #[test]
    fn summary_decodes_breakdowns() {
        let mut body = br#"{"summary":[{"total_rows":"3","total_volume":"30.00","avg_amount":"10.00","anomaly_count":"1","anomaly_pct":"33.33","earliest":"a","latest":"b"}],"by_type":[{"type":"refund","count":"3","volume":"30.00"}],"by_status":[{"status":"completed","count":"3"}],"by_currency":[]}"#.to_vec();
        let summary: HistorySummary =
            decode_history_body(StatusCode::OK, &mut body).expect("summary should decode");

        assert_eq!(summary.summary[0].total_rows.as_deref(), Some("3"));
        assert_eq!(summary.by_type[0].kind.as_deref(), Some("refund"));
        assert!(summary.by_currency.is_empty());
    }

    #[tokio::test]
    async fn loading_is_published_while_refresh_is_in_flight() {
        // Bound but never accepted: requests connect and then wait forever.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("listener should bind");
        let addr = listener.local_addr().expect("listener should have an address");
        let base_url = Url::parse(&format!("http://{addr}")).expect("url should parse");

        let mut history = HistoryQueryClient::new(Client::new(), base_url, 50);
        let state = history.state_handle();
        let refresh = tokio::spawn(async move {
            history.refresh().await;
        });

        let mut observed_loading = false;
        for _ in 0..100 {
            if state.read().loading {
                observed_loading = true;
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        refresh.abort();

        assert!(observed_loading);
        assert!(state.read().error.is_none());
        drop(listener);
    }
}
