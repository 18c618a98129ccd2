//! Shared helpers for integration tests: a local ingestion receiver.

#![allow(dead_code)]

use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, Uri};
use axum::Router;
use lantern_telemetry::LanternConfig;
use parking_lot::Mutex;
use serde_json::Value;

/// One request as seen by the receiver.
#[derive(Debug, Clone)]
pub struct Received {
    pub path: String,
    pub query: Option<String>,
    pub content_type: Option<String>,
    pub body: Value,
}

#[derive(Clone)]
struct ReceiverState {
    received: Arc<Mutex<Vec<Received>>>,
    status: Arc<AtomicU16>,
}

/// An HTTP server on `127.0.0.1:0` that records every request and answers
/// with a configurable status.
pub struct Receiver {
    pub base_url: String,
    state: ReceiverState,
}

impl Receiver {
    pub async fn spawn() -> Self {
        let state = ReceiverState {
            received: Arc::new(Mutex::new(Vec::new())),
            status: Arc::new(AtomicU16::new(200)),
        };
        let app = Router::new().fallback(record).with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind receiver");
        let addr = listener.local_addr().expect("receiver address");
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("receiver serves");
        });

        Self {
            base_url: format!("http://{addr}"),
            state,
        }
    }

    pub fn respond_with(&self, status: u16) {
        self.state.status.store(status, Ordering::SeqCst);
    }

    pub fn received(&self, path: &str) -> Vec<Received> {
        self.state
            .received
            .lock()
            .iter()
            .filter(|r| r.path == path)
            .cloned()
            .collect()
    }

    pub async fn wait_for(&self, path: &str, count: usize) -> Vec<Received> {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let received = self.received(path);
                if received.len() >= count {
                    return received;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap_or_else(|_| panic!("receiver got no {count} request(s) on {path}"))
    }
}

async fn record(
    State(state): State<ReceiverState>,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    let body = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap_or(Value::Null)
    };
    state.received.lock().push(Received {
        path: uri.path().to_owned(),
        query: uri.query().map(str::to_owned),
        content_type: headers
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned),
        body,
    });
    StatusCode::from_u16(state.status.load(Ordering::SeqCst)).unwrap_or(StatusCode::OK)
}

/// Configuration pointing at `endpoint`, with the panic hook off.
pub fn config_for(endpoint: &str) -> LanternConfig {
    let mut config = LanternConfig::default();
    config.collector.endpoint = endpoint.to_owned();
    config.collector.environment = "integration".to_owned();
    config.collector.build_version = "2.4.1".to_owned();
    config.collector.capture_panics = false;
    config
}
