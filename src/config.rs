//! Gateway endpoint constants and runtime settings.
//!
//! Settings are layered: built-in defaults, then an optional TOML file, then
//! `BULLION_*` environment variables, then whatever the builder sets
//! explicitly.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::SecretString;
use serde::Deserialize;

use crate::error::{DashboardError, Result};
use crate::models::TimeRange;

pub const DEFAULT_BASE_URL: &str = "http://localhost:8000/api";

pub const LATEST_PATH: &str = "/latest";
pub const HISTORY_PATH: &str = "/history";
pub const COLLECT_PATH: &str = "/collect";
pub const HEALTH_PATH: &str = "/health";
pub const CURRENT_PRICES_PATH: &str = "/prices/current";
pub const MONTHLY_STATISTICS_PATH: &str = "/statistics/monthly";
pub const LATEST_INSIGHT_PATH: &str = "/ai-analysis/latest";

/// Header carrying the opaque credential on `POST /collect`.
pub const API_KEY_HEADER: &str = "X-API-Key";

/// The history endpoint accepts `days` in `1..=MAX_HISTORY_DAYS`.
pub const MAX_HISTORY_DAYS: u32 = 365;

pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(120);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_HIGHLIGHT_DURATION: Duration = Duration::from_millis(500);

pub const ENV_BASE_URL: &str = "BULLION_BASE_URL";
pub const ENV_API_KEY: &str = "BULLION_API_KEY";
pub const ENV_REFRESH_SECS: &str = "BULLION_REFRESH_SECS";
pub const ENV_TIMEOUT_SECS: &str = "BULLION_TIMEOUT_SECS";
pub const ENV_RANGE: &str = "BULLION_RANGE";

/// Platform config location, e.g. `~/.config/bullion-sync/config.toml` on Linux.
pub fn default_config_path() -> PathBuf {
    if let Some(dir) = dirs::config_dir() {
        dir.join("bullion-sync").join("config.toml")
    } else {
        PathBuf::from(".bullion-sync.toml")
    }
}

// ---------------------------------------------------------------------------
// FileSettings — TOML shape
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileSettings {
    base_url: Option<String>,
    api_key: Option<String>,
    refresh_interval_secs: Option<u64>,
    request_timeout_secs: Option<u64>,
    highlight_duration_ms: Option<u64>,
    default_range: Option<TimeRange>,
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// Runtime settings for a dashboard instance.
///
/// The base URL and credential are opaque to the pipeline; they are only
/// handed to the gateway client.
pub struct Settings {
    /// Gateway base address, without a trailing slash.
    pub base_url: String,
    /// Credential sent as `X-API-Key` on manual collection.
    pub api_key: Option<SecretString>,
    /// Cadence of the periodic refresh.
    pub refresh_interval: Duration,
    /// Upper bound on each gateway call.
    pub request_timeout: Duration,
    /// How long a "value just changed" highlight stays lit.
    pub highlight_duration: Duration,
    /// Range selected when the dashboard starts.
    pub default_range: TimeRange,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: None,
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            highlight_duration: DEFAULT_HIGHLIGHT_DURATION,
            default_range: TimeRange::default(),
        }
    }
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "[redacted]"))
            .field("refresh_interval", &self.refresh_interval)
            .field("request_timeout", &self.request_timeout)
            .field("highlight_duration", &self.highlight_duration)
            .field("default_range", &self.default_range)
            .finish()
    }
}

impl Settings {
    /// Load settings from defaults, a TOML file and the process environment.
    ///
    /// When `path` is `Some`, the file must exist. When `None`, the
    /// [`default_config_path`] is read if present and silently skipped
    /// otherwise.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut settings = Settings::default();

        match path {
            Some(p) => settings.apply_toml(&fs::read_to_string(p)?)?,
            None => {
                let default_path = default_config_path();
                if default_path.exists() {
                    settings.apply_toml(&fs::read_to_string(&default_path)?)?;
                }
            }
        }

        settings.apply_env_from(|name| std::env::var(name).ok())?;
        settings.validate()?;
        Ok(settings)
    }

    /// Parse settings from TOML text layered over the defaults.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let mut settings = Settings::default();
        settings.apply_toml(text)?;
        settings.validate()?;
        Ok(settings)
    }

    fn apply_toml(&mut self, text: &str) -> Result<()> {
        let file: FileSettings = toml::from_str(text)?;
        if let Some(url) = file.base_url {
            self.base_url = normalize_base_url(&url);
        }
        if let Some(key) = file.api_key {
            self.api_key = Some(SecretString::new(key.into()));
        }
        if let Some(secs) = file.refresh_interval_secs {
            self.refresh_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = file.request_timeout_secs {
            self.request_timeout = Duration::from_secs(secs);
        }
        if let Some(ms) = file.highlight_duration_ms {
            self.highlight_duration = Duration::from_millis(ms);
        }
        if let Some(range) = file.default_range {
            self.default_range = range;
        }
        Ok(())
    }

    /// Override fields from `BULLION_*` variables supplied by `lookup`.
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_BASE_URL) {
            self.base_url = normalize_base_url(&url);
        }
        if let Some(key) = lookup(ENV_API_KEY).filter(|k| !k.is_empty()) {
            self.api_key = Some(SecretString::new(key.into()));
        }
        if let Some(raw) = lookup(ENV_REFRESH_SECS) {
            self.refresh_interval = Duration::from_secs(parse_secs(ENV_REFRESH_SECS, &raw)?);
        }
        if let Some(raw) = lookup(ENV_TIMEOUT_SECS) {
            self.request_timeout = Duration::from_secs(parse_secs(ENV_TIMEOUT_SECS, &raw)?);
        }
        if let Some(raw) = lookup(ENV_RANGE) {
            self.default_range = raw.parse()?;
        }
        Ok(())
    }

    /// Reject settings the scheduler or gateway cannot run with.
    pub fn validate(&self) -> Result<()> {
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(DashboardError::Config(format!(
                "base_url must be an http(s) URL, got '{}'",
                self.base_url
            )));
        }
        if self.refresh_interval.is_zero() {
            return Err(DashboardError::Config(
                "refresh_interval must be greater than zero".into(),
            ));
        }
        if self.request_timeout.is_zero() {
            return Err(DashboardError::Config(
                "request_timeout must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

pub(crate) fn normalize_base_url(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}

fn parse_secs(name: &str, raw: &str) -> Result<u64> {
    raw.trim().parse::<u64>().map_err(|_| {
        DashboardError::Config(format!("{} must be a whole number of seconds, got '{}'", name, raw))
    })
}
