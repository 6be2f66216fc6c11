//! Rotation metrics
//!
//! Emitted through the `metrics` facade; the binary installs the Prometheus
//! recorder. Without a recorder every call is a no-op.
//!
//! - `rotator_tokens_fetched_total` (counter): label `region`
//! - `rotator_fetch_failures_total` (counter): labels `region`, `kind`
//! - `rotator_fetch_duration_seconds` (histogram): label `region`
//! - `rotator_promotions_total` (counter): labels `region`, `outcome`
//! - `rotator_live_pool_size` (gauge): label `region`
//! - `rotator_quota_exhausted_total` (counter): label `region`
//! - `rotator_passes_total` (counter): labels `region`, `outcome`

use common::Region;

pub const FETCH_DURATION_METRIC: &str = "rotator_fetch_duration_seconds";

/// Record a finished batch.
pub fn record_batch(region: Region, fetched: usize, duration_secs: f64) {
    metrics::counter!("rotator_tokens_fetched_total", "region" => region.code())
        .increment(fetched as u64);
    metrics::histogram!(FETCH_DURATION_METRIC, "region" => region.code()).record(duration_secs);
}

/// Record one failed token request.
pub fn record_fetch_failure(region: Region, kind: &'static str) {
    metrics::counter!("rotator_fetch_failures_total", "region" => region.code(), "kind" => kind)
        .increment(1);
}

/// Record a promotion attempt. `promoted` is the new live size on success.
pub fn record_promotion(region: Region, promoted: Option<usize>) {
    let outcome = if promoted.is_some() {
        "promoted"
    } else {
        "no_fresh_tokens"
    };
    metrics::counter!("rotator_promotions_total", "region" => region.code(), "outcome" => outcome)
        .increment(1);
    if let Some(size) = promoted {
        metrics::gauge!("rotator_live_pool_size", "region" => region.code()).set(size as f64);
    }
}

pub fn record_quota_exhausted(region: Region) {
    metrics::counter!("rotator_quota_exhausted_total", "region" => region.code()).increment(1);
}

/// Record the end of a region pass with a short outcome label.
pub fn record_pass(region: Region, outcome: &'static str) {
    metrics::counter!("rotator_passes_total", "region" => region.code(), "outcome" => outcome)
        .increment(1);
}
