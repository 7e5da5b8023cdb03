use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use config::{Config, Environment, File, Map};
use serde::{Deserialize, Serialize};

use crate::http::RetryPolicy;

const DEFAULT_CONFIG_FILE: &str = "subsidy";
const ENV_PREFIX: &str = "SUBSIDY";

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    /// Concurrent fetch tasks. Controls both target load and local resources.
    pub workers: usize,
    /// Log a progress line every N completed tasks.
    pub progress_every: usize,
    pub output_dir: PathBuf,
    pub db_path: PathBuf,
    pub http: HttpSettings,
    pub pacing: PacingSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            workers: 5,
            progress_every: 50,
            output_dir: PathBuf::from("output"),
            db_path: PathBuf::from("data/subsidy.sqlite"),
            http: HttpSettings::default(),
            pacing: PacingSettings::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HttpSettings {
    pub timeout_ms: u64,
    pub max_attempts: u32,
    pub backoff_base_ms: u64,
    pub backoff_multiplier: f64,
    pub backoff_max_ms: u64,
    pub retry_statuses: Vec<u16>,
    /// Skip TLS certificate validation. Some carrier shops serve broken
    /// chains; this must be turned on explicitly.
    pub accept_invalid_certs: bool,
    pub pool_max_idle_per_host: usize,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout_ms: 15_000,
            max_attempts: 4,
            backoff_base_ms: 1_000,
            backoff_multiplier: 2.0,
            backoff_max_ms: 30_000,
            retry_statuses: vec![429, 500, 502, 503, 504],
            accept_invalid_certs: false,
            pool_max_idle_per_host: 20,
        }
    }
}

impl HttpSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_millis(self.backoff_base_ms),
            multiplier: self.backoff_multiplier,
            max_delay: Duration::from_millis(self.backoff_max_ms),
            retry_statuses: self.retry_statuses.clone(),
        }
    }
}

/// Uniform random delay window, in milliseconds, inclusive on both ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DelayWindow {
    pub min_ms: u64,
    pub max_ms: u64,
}

impl DelayWindow {
    pub const fn new(min_ms: u64, max_ms: u64) -> Self {
        Self { min_ms, max_ms }
    }

    #[cfg(test)]
    pub const ZERO: DelayWindow = DelayWindow::new(0, 0);
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
#[serde(from = "PacingTable")]
pub struct PacingSettings {
    /// Before the first request of every task.
    pub request: DelayWindow,
    /// Before each continuation page.
    pub page: DelayWindow,
    /// Between catalog discovery calls.
    pub catalog: DelayWindow,
}

impl Default for PacingSettings {
    fn default() -> Self {
        Self {
            request: DelayWindow::new(50, 200),
            page: DelayWindow::new(50, 150),
            catalog: DelayWindow::new(100, 300),
        }
    }
}

/// `[pacing]` as written in a settings source. Each window may name one
/// bound, both, or neither.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PacingTable {
    request: PartialWindow,
    page: PartialWindow,
    catalog: PartialWindow,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PartialWindow {
    min_ms: Option<u64>,
    max_ms: Option<u64>,
}

impl PartialWindow {
    /// Missing bounds come from `fallback`, clamped so `min_ms <= max_ms`.
    fn or(self, fallback: DelayWindow) -> DelayWindow {
        match (self.min_ms, self.max_ms) {
            (Some(min), Some(max)) => DelayWindow::new(min, max),
            (Some(min), None) => DelayWindow::new(min, fallback.max_ms.max(min)),
            (None, Some(max)) => DelayWindow::new(fallback.min_ms.min(max), max),
            (None, None) => fallback,
        }
    }
}

impl From<PacingTable> for PacingSettings {
    fn from(table: PacingTable) -> Self {
        let defaults = PacingSettings::default();
        Self {
            request: table.request.or(defaults.request),
            page: table.page.or(defaults.page),
            catalog: table.catalog.or(defaults.catalog),
        }
    }
}

impl Settings {
    /// Layered load: defaults, then the TOML file (explicit path, or
    /// `subsidy.toml` in the working directory if present), then
    /// `SUBSIDY_*` environment variables (`__` separates nested keys,
    /// `SUBSIDY_HTTP__RETRY_STATUSES` takes a comma-separated list).
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_layered(path, None)
    }

    /// `load` with the environment layer read from `vars` instead of the
    /// process environment when given.
    fn load_layered(path: Option<&Path>, vars: Option<Map<String, String>>) -> Result<Self> {
        let file = match path {
            Some(p) => File::from(p).required(true),
            None => File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };

        let settings = Config::builder()
            .add_source(file)
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("http.retry_statuses")
                    .source(vars),
            )
            .build()
            .context("Failed to read settings")?
            .try_deserialize::<Settings>()
            .context("Invalid settings")?;

        Ok(settings)
    }
}
