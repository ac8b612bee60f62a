use crate::monitor::api::fetch_stats_snapshot;
use crate::monitor::types::{MonitorEvent, StatsSnapshot};
use parking_lot::RwLock;
use reqwest::{Client, Url};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

pub type SharedSnapshot = Arc<RwLock<Option<Arc<StatsSnapshot>>>>;

#[derive(Debug, Default)]
pub struct PollCounters {
    succeeded: AtomicU64,
    failed: AtomicU64,
}

impl PollCounters {
    pub fn succeeded(&self) -> u64 {
        self.succeeded.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }
}

struct PollerHandle {
    cancellation_token: CancellationToken,
    join_handle: JoinHandle<()>,
}

#[derive(Clone)]
struct PollContext {
    http_client: Client,
    base_url: Url,
    interval: Duration,
    latest: SharedSnapshot,
    counters: Arc<PollCounters>,
    events: mpsc::Sender<MonitorEvent>,
}

/// A failed tick keeps the previous snapshot.
pub struct MetricsPoller {
    context: PollContext,
    session: Option<PollerHandle>,
}

impl MetricsPoller {
    pub fn new(
        http_client: Client,
        base_url: Url,
        interval: Duration,
        events: mpsc::Sender<MonitorEvent>,
    ) -> Self {
        Self {
            context: PollContext {
                http_client,
                base_url,
                interval,
                latest: Arc::new(RwLock::new(None)),
                counters: Arc::new(PollCounters::default()),
                events,
            },
            session: None,
        }
    }

    pub fn activate(&mut self) {
        if let Some(session) = &self.session {
            if !session.join_handle.is_finished() {
                return;
            }
        }

        let cancellation_token = CancellationToken::new();
        let task_token = cancellation_token.clone();
        let context = self.context.clone();
        let join_handle = tokio::spawn(async move {
            run_poll_loop(context, task_token).await;
        });

        self.session = Some(PollerHandle {
            cancellation_token,
            join_handle,
        });
    }

    pub async fn deactivate(&mut self) {
        if let Some(session) = self.session.take() {
            session.cancellation_token.cancel();
            let _ = session.join_handle.await;
        }
    }

    pub fn is_active(&self) -> bool {
        self.session
            .as_ref()
            .map(|session| !session.join_handle.is_finished())
            .unwrap_or(false)
    }

    pub fn latest(&self) -> Option<Arc<StatsSnapshot>> {
        self.context.latest.read().clone()
    }

    pub fn counters(&self) -> Arc<PollCounters> {
        Arc::clone(&self.context.counters)
    }
}

async fn run_poll_loop(context: PollContext, cancel_token: CancellationToken) {
    // The first tick of a tokio interval completes immediately.
    let mut ticker = tokio::time::interval(context.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = cancel_token.cancelled() => break,
            _ = ticker.tick() => {
                let fetched = tokio::select! {
                    _ = cancel_token.cancelled() => break,
                    result = fetch_stats_snapshot(&context.http_client, &context.base_url) => result,
                };

                match fetched {
                    Ok(snapshot) => {
                        let snapshot = Arc::new(snapshot);
                        *context.latest.write() = Some(Arc::clone(&snapshot));
                        context.counters.succeeded.fetch_add(1, Ordering::Relaxed);
                        let _ = context.events.send(MonitorEvent::Snapshot(snapshot)).await;
                    }
                    Err(error) => {
                        context.counters.failed.fetch_add(1, Ordering::Relaxed);
                        tracing::debug!(%error, "stats poll failed, keeping last snapshot");
                    }
                }
            }
        }
    }
}
