//! Prometheus recorder for the rotator binary
//!
//! The metric names themselves live in `token_pool::metrics`; this module
//! only installs the exporter that renders them on `/metrics`.

use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder, PrometheusHandle};

/// Bucket boundaries for `rotator_fetch_duration_seconds`. A batch takes at
/// least one request round trip and at most a few request timeouts.
const FETCH_DURATION_BUCKETS: &[f64] = &[0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 20.0, 30.0, 60.0];

fn builder() -> Result<PrometheusBuilder, BuildError> {
    PrometheusBuilder::new().set_buckets_for_metric(
        Matcher::Full(token_pool::metrics::FETCH_DURATION_METRIC.to_string()),
        FETCH_DURATION_BUCKETS,
    )
}

/// Install the Prometheus recorder and return a handle for rendering metrics.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    builder()?.install_recorder()
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::Region;

    #[test]
    fn fetch_duration_renders_as_histogram() {
        let recorder = builder().unwrap().build_recorder();
        let handle = recorder.handle();
        let _guard = metrics::set_default_local_recorder(&recorder);

        token_pool::metrics::record_batch(Region::Ind, 100, 1.2);

        let output = handle.render();
        assert!(
            output.contains("rotator_fetch_duration_seconds_bucket"),
            "histogram must render _bucket lines, got:\n{output}"
        );
        assert!(output.contains("rotator_tokens_fetched_total"));
        assert!(output.contains("region=\"IND\""));
    }
}
