//! Configuration structures for logship

use crate::types::{Secret, DEFAULT_TIME_KEY};
use crate::{Result, ShipError};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default batch-size threshold (records per request)
pub const DEFAULT_BATCH_SIZE: usize = 100;
/// Default flush interval in milliseconds
pub const DEFAULT_FLUSH_INTERVAL_MS: u64 = 3000;
/// Default per-request timeout in milliseconds
pub const DEFAULT_TIMEOUT_MS: u64 = 1000;
/// Prefix of environment variables read by [`ShipperConfig::load`]
pub const ENV_PREFIX: &str = "LOGSHIP";

/// Shipper configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ShipperConfig {
    /// Ingestion endpoint host, e.g. `cn-hangzhou-intranet.log.aliyuncs.com`
    pub endpoint: String,
    /// Log project name (prepended to the endpoint host)
    pub project: String,
    /// Log store name
    pub store: String,
    /// Value of the log group topic
    pub topic: String,
    /// Value of the log group source; defaults to the hostname
    pub source: String,
    /// Access key id
    pub access_key: String,
    /// Access key secret
    pub access_secret: Secret,
    /// Records per batch; the queue holds twice this many
    pub batch_size: usize,
    /// Periodic flush interval in milliseconds
    pub flush_interval_ms: u64,
    /// Per-request timeout in milliseconds
    pub timeout_ms: u64,
    /// Use https when pushing logs
    pub use_https: bool,
    /// JSON field holding the record timestamp
    pub time_key: String,
    /// Emit per-record debug events
    pub verbose: bool,
}

impl Default for ShipperConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            project: String::new(),
            store: String::new(),
            topic: String::new(),
            source: String::new(),
            access_key: String::new(),
            access_secret: Secret::default(),
            batch_size: DEFAULT_BATCH_SIZE,
            flush_interval_ms: DEFAULT_FLUSH_INTERVAL_MS,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            use_https: false,
            time_key: DEFAULT_TIME_KEY.to_string(),
            verbose: false,
        }
    }
}

impl ShipperConfig {
    /// Load configuration from TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ShipError::Config(format!("Failed to read config file: {}", e)))?;

        let config: ShipperConfig = toml::from_str(&content)
            .map_err(|e| ShipError::Config(format!("Failed to parse config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from an optional TOML file overlaid with
    /// `LOGSHIP_*` environment variables (e.g. `LOGSHIP_ACCESS_KEY`)
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = Self::load_unvalidated(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Same as [`load`](Self::load) without validation, for callers that
    /// fill in required fields afterwards
    pub fn load_unvalidated(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(false));
        }
        builder = builder.add_source(config::Environment::with_prefix(ENV_PREFIX).try_parsing(true));

        let config: ShipperConfig = builder
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| ShipError::Config(format!("Failed to load config: {}", e)))?;
        Ok(config)
    }

    /// Validate configuration, reporting every missing required field at once
    pub fn validate(&self) -> Result<()> {
        let required = [
            ("endpoint", self.endpoint.trim().is_empty()),
            ("access_key", self.access_key.trim().is_empty()),
            ("access_secret", self.access_secret.is_blank()),
            ("project", self.project.trim().is_empty()),
            ("store", self.store.trim().is_empty()),
            ("topic", self.topic.trim().is_empty()),
        ];

        let missing: Vec<String> = required
            .iter()
            .filter(|(_, blank)| *blank)
            .map(|(field, _)| format!("invalid config {:?} is required", field))
            .collect();

        if !missing.is_empty() {
            return Err(ShipError::Config(missing.join("; ")));
        }
        Ok(())
    }

    /// Validate, then fill in defaults for every optional field left empty
    pub fn normalized(mut self) -> Result<Self> {
        self.validate()?;

        if self.source.trim().is_empty() {
            self.source = gethostname::gethostname().to_string_lossy().to_string();
        }
        if self.batch_size == 0 {
            self.batch_size = DEFAULT_BATCH_SIZE;
        }
        if self.flush_interval_ms == 0 {
            self.flush_interval_ms = DEFAULT_FLUSH_INTERVAL_MS;
        }
        if self.timeout_ms == 0 {
            self.timeout_ms = DEFAULT_TIMEOUT_MS;
        }
        if self.time_key.trim().is_empty() {
            self.time_key = DEFAULT_TIME_KEY.to_string();
        }
        Ok(self)
    }

    /// `{scheme}://{project}.{endpoint}/logstores/{store}/shards/lb`
    pub fn put_logs_url(&self) -> Result<Url> {
        let scheme = if self.use_https { "https" } else { "http" };
        let raw = format!(
            "{}://{}.{}/logstores/{}/shards/lb",
            scheme,
            self.project.trim(),
            self.endpoint.trim(),
            self.store.trim()
        );
        Url::parse(&raw)
            .map_err(|e| ShipError::Config(format!("invalid config \"endpoint\" {}", e)))
    }

    /// Periodic flush interval
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }

    /// Per-request timeout
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}
