//! Test fixtures: an in-process issuer and credential helpers.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use common::Region;
use issuer::CredentialRecord;
use tokio::net::TcpListener;

type Respond = dyn Fn(usize, &str) -> bool + Send + Sync;

struct IssuerState {
    hits: Arc<AtomicUsize>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    seen: Mutex<Vec<(String, String)>>,
    respond: Box<Respond>,
    delay: Duration,
}

/// Issuer serving `/{endpoint}/token` for any endpoint name.
///
/// `respond(n, uid)` decides whether the n-th request (0-based, across all
/// endpoints) gets a token or a 500.
pub struct MockIssuer {
    addr: std::net::SocketAddr,
    state: Arc<IssuerState>,
}

impl MockIssuer {
    pub async fn start(respond: impl Fn(usize, &str) -> bool + Send + Sync + 'static) -> Self {
        Self::start_with_delay(respond, Duration::ZERO).await
    }

    pub async fn start_with_delay(
        respond: impl Fn(usize, &str) -> bool + Send + Sync + 'static,
        delay: Duration,
    ) -> Self {
        let state = Arc::new(IssuerState {
            hits: Arc::new(AtomicUsize::new(0)),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
            respond: Box::new(respond),
            delay,
        });

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = axum::Router::new()
            .route("/{endpoint}/token", axum::routing::get(handle))
            .with_state(state.clone());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr, state }
    }

    /// `n` endpoint base URLs, named `e0..e{n-1}`.
    pub fn endpoints(&self, n: usize) -> Vec<String> {
        (0..n)
            .map(|i| format!("http://{}/e{i}/", self.addr))
            .collect()
    }

    pub fn hits(&self) -> usize {
        self.state.hits.load(Ordering::SeqCst)
    }

    /// Shared request counter, for clocks that move with issuer traffic.
    pub fn hit_counter(&self) -> Arc<AtomicUsize> {
        self.state.hits.clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.state.max_in_flight.load(Ordering::SeqCst)
    }

    /// `(endpoint, uid)` for every request received.
    pub fn seen(&self) -> Vec<(String, String)> {
        self.state.seen.lock().unwrap().clone()
    }
}

async fn handle(
    State(state): State<Arc<IssuerState>>,
    Path(endpoint): Path<String>,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    let n = state.hits.fetch_add(1, Ordering::SeqCst);
    let current = state.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
    state.max_in_flight.fetch_max(current, Ordering::SeqCst);

    let uid = query.get("uid").cloned().unwrap_or_default();
    state.seen.lock().unwrap().push((endpoint, uid.clone()));

    if !state.delay.is_zero() {
        tokio::time::sleep(state.delay).await;
    }
    let ok = (state.respond)(n, &uid);
    state.in_flight.fetch_sub(1, Ordering::SeqCst);

    if ok {
        axum::Json(serde_json::json!({ "token": format!("tok-{uid}") })).into_response()
    } else {
        (StatusCode::INTERNAL_SERVER_ERROR, "issuer failure").into_response()
    }
}

/// `n` credentials `u0/p0 .. u{n-1}/p{n-1}`.
pub fn credentials(n: usize) -> Vec<CredentialRecord> {
    (0..n)
        .map(|i| CredentialRecord::new(format!("u{i}"), format!("p{i}")))
        .collect()
}

/// Write a credential file with `n` records for `region` into `dir`.
pub async fn write_credentials(dir: &std::path::Path, region: Region, n: usize) {
    let records: Vec<serde_json::Value> = (0..n)
        .map(|i| serde_json::json!({ "uid": format!("u{i}"), "password": format!("p{i}") }))
        .collect();
    tokio::fs::write(
        dir.join(format!("{}_data.json", region.slug())),
        serde_json::to_vec(&records).unwrap(),
    )
    .await
    .unwrap();
}
