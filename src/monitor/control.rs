use crate::error::AppError;
use crate::monitor::api::{post_control, start_endpoint, stop_endpoint, throttle_endpoint};
use reqwest::{Client, Url};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub const MIN_THROTTLE: u8 = 1;
pub const MAX_THROTTLE: u8 = 100;
pub const DEFAULT_THROTTLE: u8 = 50;
pub const THROTTLE_DEBOUNCE: Duration = Duration::from_millis(100);

pub fn clamp_throttle(value: i64) -> u8 {
    value.clamp(i64::from(MIN_THROTTLE), i64::from(MAX_THROTTLE)) as u8
}

struct PendingThrottle {
    value: u8,
    cancellation_token: CancellationToken,
    join_handle: JoinHandle<()>,
}

/// Generator controls. Throttle changes are debounced so that only the last
/// value of a burst reaches the backend.
pub struct ControlClient {
    http_client: Client,
    base_url: Url,
    pending_throttle: Option<PendingThrottle>,
}

impl ControlClient {
    pub fn new(http_client: Client, base_url: Url) -> Self {
        Self {
            http_client,
            base_url,
            pending_throttle: None,
        }
    }

    pub async fn start(&self) -> Result<(), AppError> {
        post_control(&self.http_client, start_endpoint(&self.base_url)).await?;
        tracing::info!("generator start requested");
        Ok(())
    }

    pub async fn stop(&self) -> Result<(), AppError> {
        post_control(&self.http_client, stop_endpoint(&self.base_url)).await?;
        tracing::info!("generator stop requested");
        Ok(())
    }

    /// Schedules the throttle POST, replacing any pending one. Returns the
    /// clamped value that will be sent.
    pub fn set_throttle(&mut self, value: i64) -> u8 {
        let value = clamp_throttle(value);
        if let Some(previous) = self.pending_throttle.take() {
            previous.cancellation_token.cancel();
        }

        let cancellation_token = CancellationToken::new();
        let task_token = cancellation_token.clone();
        let http_client = self.http_client.clone();
        let endpoint = throttle_endpoint(&self.base_url, value);

        let join_handle = tokio::spawn(async move {
            tokio::select! {
                _ = task_token.cancelled() => {}
                _ = tokio::time::sleep(THROTTLE_DEBOUNCE) => {
                    if let Err(error) = post_control(&http_client, endpoint).await {
                        tracing::debug!(%error, value, "throttle update failed");
                    }
                }
            }
        });

        self.pending_throttle = Some(PendingThrottle {
            value,
            cancellation_token,
            join_handle,
        });
        value
    }

    pub fn pending_throttle(&self) -> Option<u8> {
        self.pending_throttle
            .as_ref()
            .filter(|pending| !pending.join_handle.is_finished())
            .map(|pending| pending.value)
    }

    pub async fn teardown(&mut self) {
        if let Some(pending) = self.pending_throttle.take() {
            pending.cancellation_token.cancel();
            let _ = pending.join_handle.await;
        }
    }
}
