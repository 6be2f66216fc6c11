//! Per-region refresh state machine
//!
//! Each pass loads the region's state, picks at most one trigger and runs it:
//!
//! 1. `Bootstrap`: live pool empty → fetch, then promote
//! 2. `SuccessThreshold`: enough consumer successes → fetch until the
//!    refresh quota is met, mark `refresh_done`
//! 3. `TimeThreshold`: refresh interval elapsed → fetch until the refresh
//!    quota is met, mark `refresh_done`, promote; if every staged token went
//!    stale first, refetch the same credential slice until the corrective
//!    quota is met
//!
//! Triggers 2 and 3 only fire while `refresh_done` is false. Quota loops are
//! bounded by `RetryPolicy`; running out of attempts fails the pass with
//! `Error::QuotaNotMet` and leaves the state for the next tick.
//!
//! A pass runs under a lease stored with the region state. The claim holds
//! the store's directory lock, so passes are kept apart across processes
//! sharing a data directory, and a persisted lease keeps a region blocked
//! after a crash until it expires.

use std::sync::Arc;
use std::time::Duration;

use common::Region;
use issuer::CredentialSource;
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::fetcher::Fetcher;
use crate::metrics;
use crate::retry::RetryPolicy;
use crate::state::{RegionState, now_millis};
use crate::store::FileStore;

/// Source of unix-millisecond timestamps.
pub type Clock = Arc<dyn Fn() -> u64 + Send + Sync>;

pub fn system_clock() -> Clock {
    Arc::new(now_millis)
}

/// Thresholds and quotas driving the triggers.
#[derive(Debug, Clone)]
pub struct RefreshPolicy {
    pub success_threshold: u64,
    pub refresh_interval: Duration,
    pub freshness_window: Duration,
    /// Minimum single-batch size for trigger-driven refreshes.
    pub refresh_quota: usize,
    /// Minimum single-batch size for the corrective refetch.
    pub corrective_quota: usize,
    pub retry: RetryPolicy,
    pub lease_ttl: Duration,
}

impl Default for RefreshPolicy {
    fn default() -> Self {
        Self {
            success_threshold: 28,
            refresh_interval: Duration::from_secs(6 * 60 * 60),
            freshness_window: Duration::from_secs(30 * 60),
            refresh_quota: 100,
            corrective_quota: 95,
            retry: RetryPolicy::default(),
            lease_ttl: Duration::from_secs(30 * 60),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Bootstrap,
    SuccessThreshold,
    TimeThreshold,
}

impl Trigger {
    /// Pick the trigger for a region, highest priority first.
    pub fn evaluate(
        state: &RegionState,
        live_len: usize,
        now: u64,
        policy: &RefreshPolicy,
    ) -> Option<Trigger> {
        if live_len == 0 {
            return Some(Trigger::Bootstrap);
        }
        if state.refresh_done {
            return None;
        }
        if state.success_count >= policy.success_threshold {
            return Some(Trigger::SuccessThreshold);
        }
        if state.elapsed_since_update(now) >= policy.refresh_interval.as_millis() as u64 {
            return Some(Trigger::TimeThreshold);
        }
        None
    }

    pub fn label(&self) -> &'static str {
        match self {
            Trigger::Bootstrap => "bootstrap",
            Trigger::SuccessThreshold => "success_threshold",
            Trigger::TimeThreshold => "time_threshold",
        }
    }
}

/// What a region pass did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PassOutcome {
    /// The region lease is held by another pass.
    Busy,
    /// No trigger fired.
    Idle,
    Completed {
        trigger: Trigger,
        fetched: usize,
        /// Live pool size after promotion, if one happened.
        promoted: Option<usize>,
        /// Batch size of the corrective refetch, if one ran.
        corrective: Option<usize>,
    },
}

impl PassOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            PassOutcome::Busy => "busy",
            PassOutcome::Idle => "idle",
            PassOutcome::Completed { trigger, .. } => trigger.label(),
        }
    }
}

/// Runs refresh passes for any region against a shared store.
pub struct Rotator {
    store: Arc<FileStore>,
    credentials: CredentialSource,
    fetcher: Fetcher,
    policy: RefreshPolicy,
    clock: Clock,
    owner: String,
}

impl Rotator {
    pub fn new(
        store: Arc<FileStore>,
        credentials: CredentialSource,
        fetcher: Fetcher,
        policy: RefreshPolicy,
    ) -> Self {
        let owner = format!("rotator-{}", uuid::Uuid::new_v4().as_simple());
        Self {
            store,
            credentials,
            fetcher,
            policy,
            clock: system_clock(),
            owner,
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn store(&self) -> &Arc<FileStore> {
        &self.store
    }

    pub fn policy(&self) -> &RefreshPolicy {
        &self.policy
    }

    /// Lease owner id of this rotator.
    pub fn owner(&self) -> &str {
        &self.owner
    }

    fn now(&self) -> u64 {
        (self.clock)()
    }

    /// Run one pass for `region` under its lease.
    ///
    /// The lease is released whatever the pass returns.
    pub async fn process_region(&self, region: Region) -> Result<PassOutcome> {
        let acquired = self
            .store
            .try_acquire_lease(region, &self.owner, self.now(), self.policy.lease_ttl)
            .await?;
        if !acquired {
            debug!(%region, "region busy, skipping");
            return Ok(PassOutcome::Busy);
        }

        let result = self.run_pass(region).await;

        if let Err(e) = self.store.release_lease(region, &self.owner).await {
            error!(%region, error = %e, "failed to release region lease");
        }
        result
    }

    async fn run_pass(&self, region: Region) -> Result<PassOutcome> {
        let state = self.store.load_state(region).await?;
        let live_len = self.store.live_len(region).await?;
        let now = self.now();

        let Some(trigger) = Trigger::evaluate(&state, live_len, now, &self.policy) else {
            return Ok(PassOutcome::Idle);
        };

        match trigger {
            Trigger::Bootstrap => {
                warn!(%region, "live pool empty, forcing fetch");
                let fetched = self.fetch(region, true).await?;
                let mut promoted = None;
                if fetched > 0 {
                    let now = self.now();
                    self.store
                        .update_state(region, |s| {
                            s.refresh_done = true;
                            s.last_update_time = Some(now);
                        })
                        .await?;
                    promoted = self.promote(region).await?;
                }
                Ok(PassOutcome::Completed {
                    trigger,
                    fetched,
                    promoted,
                    corrective: None,
                })
            }
            Trigger::SuccessThreshold => {
                info!(
                    %region,
                    success_count = state.success_count,
                    "success threshold reached, refreshing"
                );
                let fetched = self
                    .fetch_until(region, true, self.policy.refresh_quota)
                    .await?;
                self.store
                    .update_state(region, |s| s.refresh_done = true)
                    .await?;
                info!(%region, fetched, "refresh complete, awaiting promotion");
                Ok(PassOutcome::Completed {
                    trigger,
                    fetched,
                    promoted: None,
                    corrective: None,
                })
            }
            Trigger::TimeThreshold => {
                info!(
                    %region,
                    elapsed_secs = state.elapsed_since_update(now) / 1000,
                    "refresh interval elapsed, refreshing"
                );
                let fetched = self
                    .fetch_until(region, true, self.policy.refresh_quota)
                    .await?;
                let now = self.now();
                self.store
                    .update_state(region, |s| {
                        s.refresh_done = true;
                        s.last_update_time = Some(now);
                    })
                    .await?;

                let promoted = self.promote(region).await?;
                let mut corrective = None;
                if promoted.is_none() {
                    warn!(%region, "staged tokens expired before promotion, refetching same slice");
                    let refetched = self
                        .fetch_until(region, false, self.policy.corrective_quota)
                        .await?;
                    let now = self.now();
                    self.store
                        .update_state(region, |s| s.last_update_time = Some(now))
                        .await?;
                    info!(%region, fetched = refetched, "corrective refetch complete");
                    corrective = Some(refetched);
                }
                Ok(PassOutcome::Completed {
                    trigger,
                    fetched,
                    promoted,
                    corrective,
                })
            }
        }
    }

    /// Fetch one batch into staging and persist the resulting state.
    ///
    /// With `advance`, a non-empty batch moves the rotation index forward by
    /// the batch size. Without it the index stays put, so the next call hits
    /// the same credential slice. An empty batch changes no state, except
    /// that a stored index past the end of a shrunken credential file is
    /// written back reduced into range.
    async fn fetch(&self, region: Region, advance: bool) -> Result<usize> {
        let state = self.store.load_state(region).await?;

        let credentials = match self.credentials.load(region).await {
            Ok(c) => c,
            Err(e) => {
                error!(%region, error = %e, "cannot read credentials");
                return Ok(0);
            }
        };
        if credentials.is_empty() {
            warn!(%region, "credential file is empty");
            return Ok(0);
        }

        self.store.clear_staging(region).await?;

        let len = credentials.len();
        let start = state.current_index % len;
        let fetched_at = self.now();
        let tokens = self
            .fetcher
            .fetch(region, start, &credentials, fetched_at)
            .await;
        let count = tokens.len();

        if count == 0 {
            warn!(%region, start, "no tokens fetched");
            if start != state.current_index {
                self.store
                    .update_state(region, |s| s.current_index = start)
                    .await?;
            }
            return Ok(0);
        }

        let now = self.now();
        let next_index = (start + self.fetcher.batch_size()) % len;
        self.store
            .mutate(region, |doc| {
                doc.staging = tokens;
                doc.state.refresh_count = count;
                doc.state.last_update_time = Some(now);
                doc.state.current_index = if advance { next_index } else { start };
            })
            .await?;

        if advance {
            info!(%region, fetched = count, next_index, "tokens staged, rotation index advanced");
        } else {
            info!(%region, fetched = count, index = start, "tokens staged, same credential slice reused");
        }
        Ok(count)
    }

    /// Fetch until a single batch reaches `quota`, within the retry policy.
    ///
    /// Short batches still stage their tokens and advance the index, but
    /// when the budget runs out `last_update_time` is put back to its value
    /// before the loop so the time trigger stays due on the next tick.
    async fn fetch_until(&self, region: Region, advance: bool, quota: usize) -> Result<usize> {
        let retry = self.policy.retry;
        let last_update_before = self.store.load_state(region).await?.last_update_time;
        let mut best = 0;
        for attempt in 1..=retry.max_attempts {
            let fetched = self.fetch(region, advance).await?;
            if fetched >= quota {
                return Ok(fetched);
            }
            best = best.max(fetched);
            if attempt < retry.max_attempts {
                let delay = retry.backoff(attempt);
                warn!(
                    %region,
                    fetched,
                    quota,
                    attempt,
                    retry_in_ms = delay.as_millis() as u64,
                    "batch below quota, retrying"
                );
                tokio::time::sleep(delay).await;
            }
        }

        self.store
            .update_state(region, |s| s.last_update_time = last_update_before)
            .await?;
        metrics::record_quota_exhausted(region);
        Err(Error::QuotaNotMet {
            region,
            best,
            required: quota,
            attempts: retry.max_attempts,
        })
    }

    async fn promote(&self, region: Region) -> Result<Option<usize>> {
        let promoted = self
            .store
            .promote(region, self.now(), self.policy.freshness_window)
            .await?;
        metrics::record_promotion(region, promoted);
        match promoted {
            Some(n) => info!(%region, live = n, "staged tokens promoted"),
            None => warn!(%region, "no fresh staged tokens to promote"),
        }
        Ok(promoted)
    }
}
