#![allow(dead_code)]

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::header::{
    CONNECTION, CONTENT_TYPE, SEC_WEBSOCKET_ACCEPT, SEC_WEBSOCKET_KEY, UPGRADE,
};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use parking_lot::Mutex;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::handshake::derive_accept_key;
use tokio_tungstenite::tungstenite::protocol::Role;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

pub const VALID_TRANSACTION: &str = r#"{"id":"tx-1","timestamp":"2025-01-01T00:00:00Z","sender":"alice","receiver":"bob","amount":42.0,"currency":"USD","type":"payment","status":"completed","category":"retail","risk_score":0.95}"#;

pub fn stats_body(total_count: u64, total_ingested: u64) -> String {
    format!(
        r#"{{"total_count":{total_count},"total_volume":1500.5,"avg_amount":30.01,"anomaly_count":3,"tx_per_sec":12.5,"elapsed_seconds":40,"running":true,"ingestion":{{"total_ingested":{total_ingested},"total_failed":1,"pending_acks":2,"queue_size":100,"avg_latency_ms":8.0,"min_latency_ms":1.0,"max_latency_ms":30.0,"p50_latency_ms":7.0,"p95_latency_ms":20.0,"p99_latency_ms":28.0}}}}"#
    )
}

/// What a scripted websocket server does with each accepted connection.
#[derive(Clone)]
pub enum WsScript {
    /// Send the frames, then close the connection.
    SendThenClose(Vec<String>),
    /// Send the frames, then hold the connection open until the client leaves.
    SendThenHold(Vec<String>),
    /// Send pings without ever reading, so the client's pongs back up.
    FloodPings,
}

pub struct WsServer {
    pub addr: SocketAddr,
    pub accepted_at: Arc<Mutex<Vec<Instant>>>,
}

impl WsServer {
    pub fn endpoint(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }

    pub fn accepted(&self) -> Vec<Instant> {
        self.accepted_at.lock().clone()
    }
}

pub async fn spawn_ws_server(script: WsScript) -> WsServer {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("test listener should bind");
    let addr = listener.local_addr().expect("listener should have an address");
    let accepted_at = Arc::new(Mutex::new(Vec::new()));
    let accepted_log = Arc::clone(&accepted_at);

    tokio::spawn(async move {
        loop {
            let Ok((socket, _)) = listener.accept().await else {
                return;
            };
            accepted_log.lock().push(Instant::now());
            let script = script.clone();
            tokio::spawn(async move {
                let Ok(mut websocket) = tokio_tungstenite::accept_async(socket).await else {
                    return;
                };
                match script {
                    WsScript::SendThenClose(frames) => {
                        for frame in frames {
                            let _ = websocket.send(Message::Text(frame)).await;
                        }
                        let _ = websocket.close(None).await;
                    }
                    WsScript::SendThenHold(frames) => {
                        for frame in frames {
                            let _ = websocket.send(Message::Text(frame)).await;
                        }
                        while let Some(Ok(_)) = websocket.next().await {}
                    }
                    WsScript::FloodPings => {
                        let payload = vec![0_u8; 125];
                        for _ in 0..200_000 {
                            if websocket.send(Message::Ping(payload.clone())).await.is_err() {
                                return;
                            }
                        }
                        std::future::pending::<()>().await;
                    }
                }
            });
        }
    });

    WsServer { addr, accepted_at }
}

#[derive(Debug, Clone)]
pub struct StubResponse {
    pub status: u16,
    pub body: String,
}

impl StubResponse {
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            body: body.into(),
        }
    }

    pub fn status(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }
}

pub type StubRoutes = Arc<dyn Fn(&str, &str, usize) -> StubResponse + Send + Sync>;

pub struct HttpStub {
    pub addr: SocketAddr,
    pub requests: Arc<Mutex<Vec<String>>>,
}

impl HttpStub {
    pub fn base_url(&self) -> reqwest::Url {
        reqwest::Url::parse(&format!("http://{}", self.addr)).expect("stub url should parse")
    }

    /// Request lines seen so far, as `METHOD /path?query`.
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().clone()
    }

    pub fn count_matching(&self, prefix: &str) -> usize {
        self.requests
            .lock()
            .iter()
            .filter(|line| line.starts_with(prefix))
            .count()
    }
}

type StubBody = Full<Bytes>;

fn stub_response(status: u16, body: impl Into<Bytes>) -> Response<StubBody> {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() =
        StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    response
        .headers_mut()
        .insert(CONTENT_TYPE, "application/json".parse().expect("static header value"));
    response
}

/// Completes the websocket handshake for `request` and streams `frames` on
/// the upgraded connection once hyper hands it over.
fn upgrade_to_websocket(
    mut request: Request<Incoming>,
    frames: Arc<Vec<String>>,
) -> Response<StubBody> {
    let Some(key) = request.headers().get(SEC_WEBSOCKET_KEY) else {
        return stub_response(400, "missing websocket key");
    };
    let accept_key = derive_accept_key(key.as_bytes());
    let on_upgrade = hyper::upgrade::on(&mut request);

    tokio::spawn(async move {
        let Ok(upgraded) = on_upgrade.await else {
            return;
        };
        let mut websocket =
            WebSocketStream::from_raw_socket(TokioIo::new(upgraded), Role::Server, None).await;
        for frame in frames.iter() {
            let _ = websocket.send(Message::Text(frame.clone())).await;
        }
        while let Some(Ok(_)) = websocket.next().await {}
    });

    let mut response = Response::new(Full::new(Bytes::new()));
    *response.status_mut() = StatusCode::SWITCHING_PROTOCOLS;
    let headers = response.headers_mut();
    headers.insert(CONNECTION, "Upgrade".parse().expect("static header value"));
    headers.insert(UPGRADE, "websocket".parse().expect("static header value"));
    headers.insert(
        SEC_WEBSOCKET_ACCEPT,
        accept_key.parse().expect("accept key is a valid header value"),
    );
    response
}

async fn handle_request(
    request: Request<Incoming>,
    routes: StubRoutes,
    request_log: Arc<Mutex<Vec<String>>>,
    frames: Option<Arc<Vec<String>>>,
) -> Result<Response<StubBody>, Infallible> {
    let method = request.method().as_str().to_string();
    let path = request
        .uri()
        .path_and_query()
        .map(|path_and_query| path_and_query.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());

    let index = {
        let mut log = request_log.lock();
        log.push(format!("{method} {path}"));
        log.len() - 1
    };

    if let Some(frames) = frames {
        if method == "GET" && request.uri().path() == "/ws" {
            return Ok(upgrade_to_websocket(request, frames));
        }
    }

    let response = routes(&method, &path, index);
    Ok(stub_response(response.status, response.body))
}

/// HTTP/1.1 stub. `routes` gets the method, the path with query and the
/// zero-based index of this request among all requests.
pub async fn spawn_http_stub(routes: StubRoutes) -> HttpStub {
    spawn_backend_stub(routes, None).await
}

/// HTTP stub that also upgrades `GET /ws` to a websocket and sends `frames`
/// on it, so one base URL serves both the stream and the REST endpoints.
pub async fn spawn_backend_stub(routes: StubRoutes, frames: Option<Vec<String>>) -> HttpStub {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("test listener should bind");
    let addr = listener.local_addr().expect("listener should have an address");
    let requests = Arc::new(Mutex::new(Vec::new()));
    let request_log = Arc::clone(&requests);
    let frames = frames.map(Arc::new);

    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                return;
            };
            let routes = Arc::clone(&routes);
            let request_log = Arc::clone(&request_log);
            let frames = frames.clone();
            tokio::spawn(async move {
                let service = service_fn(move |request: Request<Incoming>| {
                    handle_request(
                        request,
                        Arc::clone(&routes),
                        Arc::clone(&request_log),
                        frames.clone(),
                    )
                });
                let _ = http1::Builder::new()
                    .serve_connection(TokioIo::new(stream), service)
                    .with_upgrades()
                    .await;
            });
        }
    });

    HttpStub { addr, requests }
}

pub async fn wait_until<F>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
