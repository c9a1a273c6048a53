//! Configuration management for the document client.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::error::{ClientError, Result};
use crate::ratelimit::{RateGate, TimeWindow};

/// Prefix of environment variables that override file settings,
/// e.g. `CRPT__API__TOKEN` or `CRPT__RATE_LIMITING__REQUESTS_PER_UNIT`.
pub const ENV_PREFIX: &str = "CRPT";

/// Main configuration for the document client.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Remote API configuration
    #[serde(default)]
    pub api: ApiConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limiting: RateLimitingConfig,
}

/// Remote API configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL of the document service
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Bearer token sent with every request
    #[serde(default)]
    pub token: String,

    /// Per-request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            token: String::new(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl ApiConfig {
    /// Per-request timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_base_url() -> String {
    "https://ismp.crpt.ru".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

/// Rate limiting configuration.
///
/// `requests_per_unit` is signed so that a negative value in a config file
/// is reported as an invalid limit rather than a parse failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitingConfig {
    /// Number of requests allowed per window
    #[serde(default = "default_requests_per_unit")]
    pub requests_per_unit: i64,

    /// Named window length
    #[serde(default)]
    pub unit: TimeWindow,

    /// Explicit window length in milliseconds, overrides `unit`
    #[serde(default)]
    pub window_ms: Option<u64>,
}

impl Default for RateLimitingConfig {
    fn default() -> Self {
        Self {
            requests_per_unit: default_requests_per_unit(),
            unit: TimeWindow::default(),
            window_ms: None,
        }
    }
}

fn default_requests_per_unit() -> i64 {
    10
}

impl RateLimitingConfig {
    /// The configured limit, rejected unless positive.
    pub fn limit(&self) -> Result<u64> {
        u64::try_from(self.requests_per_unit)
            .ok()
            .filter(|limit| *limit > 0)
            .ok_or_else(|| {
                ClientError::InvalidConfiguration(format!(
                    "Request limit must be greater than zero, got {}",
                    self.requests_per_unit
                ))
            })
    }

    /// Length of one rate limiting window.
    pub fn window(&self) -> Duration {
        match self.window_ms {
            Some(ms) => Duration::from_millis(ms),
            None => self.unit.duration(),
        }
    }

    /// Build the admission gate described by this configuration.
    pub fn build_gate(&self) -> Result<RateGate> {
        RateGate::new(self.limit()?, self.window())
    }
}

impl ClientConfig {
    /// Load configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading client configuration");

        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: ClientConfig = serde_yaml::from_str(yaml)
            .map_err(|e| ClientError::Config(format!("Failed to parse client config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from an optional YAML file, then apply
    /// `CRPT__SECTION__KEY` environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = ::config::Config::builder();

        if let Some(path) = path {
            info!(path = %path.display(), "Loading client configuration");
            builder = builder.add_source(
                ::config::File::from(path).format(::config::FileFormat::Yaml),
            );
        }

        let config: ClientConfig = builder
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| ClientError::Config(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Check settings that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        self.rate_limiting.limit()?;
        if self.rate_limiting.window().is_zero() {
            return Err(ClientError::InvalidConfiguration(
                "Rate limit window must be longer than zero".to_string(),
            ));
        }
        if self.api.base_url.is_empty() {
            return Err(ClientError::InvalidConfiguration(
                "API base URL is required".to_string(),
            ));
        }
        Ok(())
    }
}
