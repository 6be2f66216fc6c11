//! Batched token fetch
//!
//! A batch covers `batch_size` consecutive positions of the credential
//! sequence starting at the rotation index, wrapping around the end. The
//! endpoint for position `i` is `endpoints[i % endpoints.len()]`, regardless
//! of which credential sits at that position.
//!
//! Requests run concurrently, at most `max_concurrency` at a time. A failed
//! request only loses its own token. `fetch` returns once every request has
//! finished.

use std::time::{Duration, Instant};

use common::Region;
use futures_util::StreamExt;
use futures_util::stream;
use issuer::CredentialRecord;
use tracing::{debug, warn};

use crate::metrics;
use crate::state::TokenRecord;

/// Where one batch position goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Assignment {
    pub position: usize,
    /// Index into the credential sequence.
    pub source_index: usize,
    /// Index into the endpoint pool.
    pub endpoint: usize,
}

/// Issues token batches against a fixed endpoint pool.
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: reqwest::Client,
    endpoints: Vec<String>,
    batch_size: usize,
    max_concurrency: usize,
    request_timeout: Duration,
}

impl Fetcher {
    pub fn new(
        client: reqwest::Client,
        endpoints: Vec<String>,
        batch_size: usize,
        max_concurrency: usize,
        request_timeout: Duration,
    ) -> Self {
        Self {
            client,
            endpoints,
            batch_size,
            max_concurrency: max_concurrency.max(1),
            request_timeout,
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn endpoints(&self) -> &[String] {
        &self.endpoints
    }

    /// Position → (credential, endpoint) plan for a batch starting at
    /// `start` over `len` credentials. Empty if there are no credentials or
    /// no endpoints.
    pub fn plan(&self, start: usize, len: usize) -> Vec<Assignment> {
        if len == 0 || self.endpoints.is_empty() {
            return Vec::new();
        }
        (0..self.batch_size)
            .map(|i| Assignment {
                position: i,
                source_index: (start + i) % len,
                endpoint: i % self.endpoints.len(),
            })
            .collect()
    }

    /// Run one batch and return the tokens that came back.
    ///
    /// Every token is stamped with `fetched_at`. Unusable credential slots
    /// and failed requests are logged and skipped.
    pub async fn fetch(
        &self,
        region: Region,
        start: usize,
        credentials: &[CredentialRecord],
        fetched_at: u64,
    ) -> Vec<TokenRecord> {
        let started = Instant::now();
        let plan = self.plan(start, credentials.len());
        let attempted = plan.len();

        let requests = plan.into_iter().filter_map(|a| {
            match credentials[a.source_index].usable() {
                Some((uid, password)) => Some((a, uid, password)),
                None => {
                    warn!(
                        %region,
                        index = a.source_index,
                        "credential slot missing uid or password, skipping"
                    );
                    metrics::record_fetch_failure(region, "incomplete_credential");
                    None
                }
            }
        });

        // Futures are built up front (they stay lazy until polled) so the
        // stream item is a concrete future type; mapping inside the stream
        // trips rustc's higher-ranked lifetime check and the pass is not `Send`
        let requests: Vec<_> = requests
            .map(|(a, uid, password)| async move {
                let endpoint = &self.endpoints[a.endpoint];
                match issuer::fetch_token(
                    &self.client,
                    endpoint,
                    uid,
                    password,
                    self.request_timeout,
                )
                .await
                {
                    Ok(token) => Some(TokenRecord {
                        uid: uid.to_string(),
                        token,
                        timestamp: fetched_at,
                    }),
                    Err(e) => {
                        warn!(%region, uid, endpoint = %endpoint, kind = e.kind(), error = %e, "token request failed");
                        metrics::record_fetch_failure(region, e.kind());
                        None
                    }
                }
            })
            .collect();

        let tokens: Vec<TokenRecord> = stream::iter(requests)
            .buffer_unordered(self.max_concurrency)
            .filter_map(|t| async move { t })
            .collect()
            .await;

        let elapsed = started.elapsed();
        debug!(
            %region,
            attempted,
            fetched = tokens.len(),
            elapsed_ms = elapsed.as_millis() as u64,
            "batch complete"
        );
        metrics::record_batch(region, tokens.len(), elapsed.as_secs_f64());
        tokens
    }
}
