use crate::monitor::api::{connect_transaction_stream, TransactionWsStream};
use crate::monitor::types::{parse_transaction_payload, ConnectionState, MonitorEvent, Transaction};
use futures_util::StreamExt;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// Bounded store of the latest transactions, newest first.
#[derive(Debug, Clone)]
pub struct RecentTransactions {
    entries: VecDeque<Transaction>,
    capacity: usize,
}

impl RecentTransactions {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, transaction: Transaction) {
        self.entries.push_front(transaction);
        self.entries.truncate(self.capacity);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Transaction> {
        self.entries.iter()
    }

    pub fn snapshot(&self) -> Vec<Transaction> {
        self.entries.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

pub type SharedRecentTransactions = Arc<Mutex<RecentTransactions>>;

#[derive(Debug, Default)]
pub struct StreamCounters {
    connect_attempts: AtomicU64,
    received: AtomicU64,
    dropped_malformed: AtomicU64,
}

impl StreamCounters {
    pub fn connect_attempts(&self) -> u64 {
        self.connect_attempts.load(Ordering::Relaxed)
    }

    pub fn received(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }

    pub fn dropped_malformed(&self) -> u64 {
        self.dropped_malformed.load(Ordering::Relaxed)
    }
}

struct StreamSessionHandle {
    cancellation_token: CancellationToken,
    join_handle: JoinHandle<()>,
}

#[derive(Clone)]
struct StreamSessionContext {
    endpoint: String,
    reconnect_delay: Duration,
    recent: SharedRecentTransactions,
    state: Arc<Mutex<ConnectionState>>,
    counters: Arc<StreamCounters>,
    events: mpsc::Sender<MonitorEvent>,
}

impl StreamSessionContext {
    async fn transition(&self, next: ConnectionState) {
        {
            let mut writable = self.state.lock();
            if *writable == next {
                return;
            }
            *writable = next;
        }
        tracing::info!(endpoint = %self.endpoint, state = next.as_str(), "stream state changed");
        let _ = self.events.send(MonitorEvent::Connection(next)).await;
    }
}

pub struct StreamClient {
    context: StreamSessionContext,
    session: Option<StreamSessionHandle>,
}

enum StreamDirective {
    Continue,
    Closed,
}

impl StreamClient {
    pub fn new(
        endpoint: String,
        reconnect_delay: Duration,
        recent_capacity: usize,
        events: mpsc::Sender<MonitorEvent>,
    ) -> Self {
        Self {
            context: StreamSessionContext {
                endpoint,
                reconnect_delay,
                recent: Arc::new(Mutex::new(RecentTransactions::new(recent_capacity))),
                state: Arc::new(Mutex::new(ConnectionState::Disconnected)),
                counters: Arc::new(StreamCounters::default()),
                events,
            },
            session: None,
        }
    }

    /// No-op while a session task is running; that task owns its reconnects.
    pub fn connect(&mut self) {
        if let Some(session) = &self.session {
            if !session.join_handle.is_finished() {
                return;
            }
        }

        let cancellation_token = CancellationToken::new();
        let task_token = cancellation_token.clone();
        let context = self.context.clone();
        let join_handle = tokio::spawn(async move {
            run_stream_session(context, task_token).await;
        });

        self.session = Some(StreamSessionHandle {
            cancellation_token,
            join_handle,
        });
    }

    /// Cancels any pending reconnect and closes the active socket.
    pub async fn teardown(&mut self) {
        if let Some(session) = self.session.take() {
            session.cancellation_token.cancel();
            let _ = session.join_handle.await;
        }
        *self.context.state.lock() = ConnectionState::Disconnected;
    }

    pub fn state(&self) -> ConnectionState {
        *self.context.state.lock()
    }

    pub fn endpoint(&self) -> &str {
        &self.context.endpoint
    }

    pub fn recent(&self) -> SharedRecentTransactions {
        Arc::clone(&self.context.recent)
    }

    pub fn recent_transactions(&self) -> Vec<Transaction> {
        self.context.recent.lock().snapshot()
    }

    pub fn counters(&self) -> Arc<StreamCounters> {
        Arc::clone(&self.context.counters)
    }
}

async fn run_stream_session(context: StreamSessionContext, cancel_token: CancellationToken) {
    while !cancel_token.is_cancelled() {
        context.transition(ConnectionState::Connecting).await;
        context
            .counters
            .connect_attempts
            .fetch_add(1, Ordering::Relaxed);

        let connected = tokio::select! {
            _ = cancel_token.cancelled() => break,
            result = connect_transaction_stream(&context.endpoint) => result,
        };

        match connected {
            Ok(mut websocket_stream) => {
                context.transition(ConnectionState::Connected).await;
                read_until_closed(&mut websocket_stream, &context, &cancel_token).await;
                let closed =
                    tokio::time::timeout(CLOSE_TIMEOUT, websocket_stream.close(None)).await;
                if closed.is_err() {
                    tracing::debug!(endpoint = %context.endpoint, "stream close timed out, dropping socket");
                }
            }
            Err(error) => {
                tracing::debug!(endpoint = %context.endpoint, %error, "stream connect failed");
            }
        }

        if cancel_token.is_cancelled() {
            break;
        }

        context.transition(ConnectionState::Disconnected).await;
        context.transition(ConnectionState::Reconnecting).await;
        tokio::select! {
            _ = cancel_token.cancelled() => break,
            _ = tokio::time::sleep(context.reconnect_delay) => {}
        }
    }

    context.transition(ConnectionState::Disconnected).await;
}

async fn read_until_closed(
    websocket_stream: &mut TransactionWsStream,
    context: &StreamSessionContext,
    cancel_token: &CancellationToken,
) {
    loop {
        let frame = tokio::select! {
            _ = cancel_token.cancelled() => return,
            next_message = websocket_stream.next() => next_message,
        };

        let Some(frame_result) = frame else {
            return;
        };

        match frame_result {
            Ok(message) => match handle_message(message, context).await {
                StreamDirective::Continue => {}
                StreamDirective::Closed => return,
            },
            Err(error) => {
                tracing::debug!(endpoint = %context.endpoint, %error, "stream frame error, closing");
                return;
            }
        }
    }
}

async fn handle_message(message: Message, context: &StreamSessionContext) -> StreamDirective {
    let mut payload = match message {
        Message::Text(text_payload) => text_payload.into_bytes(),
        Message::Binary(binary_payload) => binary_payload,
        Message::Close(_) => return StreamDirective::Closed,
        _ => return StreamDirective::Continue,
    };

    match parse_transaction_payload(payload.as_mut_slice()) {
        Ok(transaction) => {
            context.recent.lock().push(transaction);
            context.counters.received.fetch_add(1, Ordering::Relaxed);
            let _ = context.events.send(MonitorEvent::TransactionReceived).await;
        }
        Err(error) => {
            context
                .counters
                .dropped_malformed
                .fetch_add(1, Ordering::Relaxed);
            tracing::debug!(%error, "dropping malformed stream payload");
        }
    }

    StreamDirective::Continue
}
