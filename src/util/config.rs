//! Scanner settings loaded from a TOML file. Every field has a default.

use std::{collections::HashSet, fs, io, path::Path, time::Duration};

use serde::Deserialize;
use thiserror::Error;

use crate::domain::{Location, DEFAULT_TAX_RATE};
use crate::infra::albion::DEFAULT_BASE_URL;
use crate::util::logging::LoggingConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Read(#[from] io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Quote cache lifetime in milliseconds.
    pub ttl_ms: u64,
    pub tax_rate: f64,
    /// Candidates scanned per scan; the rest are ignored.
    pub item_scan_cap: usize,
    /// Item fetches in flight at once during a scan.
    pub concurrency_limit: usize,
    pub request_timeout_ms: u64,
    pub base_url: String,
    pub locations: Vec<Location>,
    pub logging: LoggingConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            ttl_ms: 300_000,
            tax_rate: DEFAULT_TAX_RATE,
            item_scan_cap: 50,
            concurrency_limit: 4,
            request_timeout_ms: 10_000,
            base_url: DEFAULT_BASE_URL.to_string(),
            locations: Location::ALL.to_vec(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Settings {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path)?;
        Self::parse(&raw)
    }

    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let settings: Settings = toml::from_str(raw)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..1.0).contains(&self.tax_rate) {
            return Err(invalid("tax_rate", format!("{} not in [0, 1)", self.tax_rate)));
        }
        if self.item_scan_cap == 0 {
            return Err(invalid("item_scan_cap", "must be at least 1".into()));
        }
        if self.concurrency_limit == 0 {
            return Err(invalid("concurrency_limit", "must be at least 1".into()));
        }
        if self.request_timeout_ms == 0 {
            return Err(invalid("request_timeout_ms", "must be at least 1".into()));
        }
        if self.locations.is_empty() {
            return Err(invalid("locations", "at least one hub is required".into()));
        }
        let mut seen = HashSet::new();
        if let Some(duplicate) = self.locations.iter().find(|loc| !seen.insert(**loc)) {
            return Err(invalid("locations", format!("{duplicate} listed twice")));
        }
        Ok(())
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

fn invalid(field: &'static str, reason: String) -> ConfigError {
    ConfigError::Invalid { field, reason }
}
