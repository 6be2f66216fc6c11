//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults.
//! `ROTATOR_DATA_DIR` overrides `store.data_dir` so containers can mount the
//! store without editing the TOML.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use common::Region;
use serde::Deserialize;
use token_pool::{RefreshPolicy, RetryPolicy};

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub credentials: CredentialsConfig,
    pub issuer: IssuerConfig,
    #[serde(default)]
    pub refresh: RefreshConfig,
    #[serde(default)]
    pub admin: AdminConfig,
}

/// Persistent region documents
#[derive(Debug, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

/// Per-region credential files
#[derive(Debug, Deserialize)]
pub struct CredentialsConfig {
    #[serde(default = "default_credentials_dir")]
    pub dir: PathBuf,
}

/// Token issuer endpoint pool
#[derive(Debug, Deserialize)]
pub struct IssuerConfig {
    pub endpoints: Vec<String>,
    #[serde(default = "default_request_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
}

/// Scheduler, trigger and quota settings
#[derive(Debug, Deserialize)]
pub struct RefreshConfig {
    #[serde(default = "default_regions")]
    pub regions: Vec<Region>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_tick_interval")]
    pub tick_interval_secs: u64,
    #[serde(default = "default_success_threshold")]
    pub success_threshold: u64,
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_secs: u64,
    #[serde(default = "default_freshness_window")]
    pub freshness_window_secs: u64,
    #[serde(default = "default_refresh_quota")]
    pub refresh_quota: usize,
    #[serde(default = "default_corrective_quota")]
    pub corrective_quota: usize,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff")]
    pub max_backoff_secs: u64,
    #[serde(default = "default_lease_ttl")]
    pub lease_ttl_secs: u64,
}

/// Optional admin listener. Disabled when `listen_addr` is unset.
#[derive(Debug, Default, Deserialize)]
pub struct AdminConfig {
    #[serde(default)]
    pub listen_addr: Option<SocketAddr>,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("state")
}

fn default_credentials_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_request_timeout() -> u64 {
    issuer::DEFAULT_REQUEST_TIMEOUT.as_secs()
}

fn default_max_concurrency() -> usize {
    32
}

fn default_regions() -> Vec<Region> {
    Region::ALL.to_vec()
}

fn default_batch_size() -> usize {
    105
}

fn default_tick_interval() -> u64 {
    10
}

fn default_success_threshold() -> u64 {
    28
}

fn default_refresh_interval() -> u64 {
    6 * 60 * 60
}

fn default_freshness_window() -> u64 {
    30 * 60
}

fn default_refresh_quota() -> usize {
    100
}

fn default_corrective_quota() -> usize {
    95
}

fn default_max_attempts() -> u32 {
    8
}

fn default_initial_backoff_ms() -> u64 {
    500
}

fn default_max_backoff() -> u64 {
    60
}

fn default_lease_ttl() -> u64 {
    30 * 60
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            dir: default_credentials_dir(),
        }
    }
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            regions: default_regions(),
            batch_size: default_batch_size(),
            tick_interval_secs: default_tick_interval(),
            success_threshold: default_success_threshold(),
            refresh_interval_secs: default_refresh_interval(),
            freshness_window_secs: default_freshness_window(),
            refresh_quota: default_refresh_quota(),
            corrective_quota: default_corrective_quota(),
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_secs: default_max_backoff(),
            lease_ttl_secs: default_lease_ttl(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file, then overlay environment variables.
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;

        if let Ok(dir) = std::env::var("ROTATOR_DATA_DIR") {
            if !dir.trim().is_empty() {
                config.store.data_dir = PathBuf::from(dir);
            }
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> common::Result<()> {
        if self.issuer.endpoints.is_empty() {
            return Err(common::Error::Config(
                "issuer.endpoints must list at least one endpoint".into(),
            ));
        }
        for endpoint in &self.issuer.endpoints {
            if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
                return Err(common::Error::Config(format!(
                    "issuer endpoint must start with http:// or https://, got: {endpoint}"
                )));
            }
        }

        let refresh = &self.refresh;
        if refresh.regions.is_empty() {
            return Err(common::Error::Config(
                "refresh.regions must list at least one region".into(),
            ));
        }
        let mut seen = HashSet::new();
        for region in &refresh.regions {
            if !seen.insert(*region) {
                return Err(common::Error::Config(format!(
                    "refresh.regions lists {region} more than once"
                )));
            }
        }

        let non_zero: [(&str, u64); 12] = [
            ("issuer.timeout_secs", self.issuer.timeout_secs),
            ("issuer.max_concurrency", self.issuer.max_concurrency as u64),
            ("refresh.batch_size", refresh.batch_size as u64),
            ("refresh.tick_interval_secs", refresh.tick_interval_secs),
            ("refresh.success_threshold", refresh.success_threshold),
            ("refresh.refresh_interval_secs", refresh.refresh_interval_secs),
            ("refresh.freshness_window_secs", refresh.freshness_window_secs),
            ("refresh.refresh_quota", refresh.refresh_quota as u64),
            ("refresh.corrective_quota", refresh.corrective_quota as u64),
            ("refresh.max_attempts", refresh.max_attempts as u64),
            ("refresh.initial_backoff_ms", refresh.initial_backoff_ms),
            ("refresh.lease_ttl_secs", refresh.lease_ttl_secs),
        ];
        for (field, value) in non_zero {
            if value == 0 {
                return Err(common::Error::Config(format!(
                    "{field} must be greater than 0"
                )));
            }
        }

        if Duration::from_secs(refresh.max_backoff_secs)
            < Duration::from_millis(refresh.initial_backoff_ms)
        {
            return Err(common::Error::Config(
                "refresh.max_backoff_secs must not be below refresh.initial_backoff_ms".into(),
            ));
        }

        let worst = self.worst_case_pass();
        if Duration::from_secs(refresh.lease_ttl_secs) < worst {
            return Err(common::Error::Config(format!(
                "refresh.lease_ttl_secs ({}) is shorter than the longest possible pass ({}s)",
                refresh.lease_ttl_secs,
                worst.as_secs_f64().ceil() as u64
            )));
        }

        Ok(())
    }

    /// Upper bound on one region pass: the time trigger's refresh loop
    /// followed by its corrective loop, each attempt running every request
    /// wave to its timeout.
    pub fn worst_case_pass(&self) -> Duration {
        let waves = self
            .refresh
            .batch_size
            .div_ceil(self.issuer.max_concurrency.max(1)) as u32;
        let per_attempt = self.request_timeout().saturating_mul(waves);
        self.refresh_policy()
            .retry
            .worst_case(per_attempt)
            .saturating_mul(2)
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("token-rotator.toml")
    }

    pub fn refresh_policy(&self) -> RefreshPolicy {
        let r = &self.refresh;
        RefreshPolicy {
            success_threshold: r.success_threshold,
            refresh_interval: Duration::from_secs(r.refresh_interval_secs),
            freshness_window: Duration::from_secs(r.freshness_window_secs),
            refresh_quota: r.refresh_quota,
            corrective_quota: r.corrective_quota,
            retry: RetryPolicy {
                max_attempts: r.max_attempts,
                initial_backoff: Duration::from_millis(r.initial_backoff_ms),
                max_backoff: Duration::from_secs(r.max_backoff_secs),
            },
            lease_ttl: Duration::from_secs(r.lease_ttl_secs),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.issuer.timeout_secs)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.refresh.tick_interval_secs)
    }
}
