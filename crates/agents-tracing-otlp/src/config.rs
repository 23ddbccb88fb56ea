//! Configuration loading and management.
//!
//! Configuration is layered with figment. Sources, lowest priority first:
//! 1. Default values (compiled in)
//! 2. A TOML file (optional, skipped when absent)
//! 3. Standard OpenTelemetry environment variables (`OTEL_*`)
//! 4. Crate-specific environment variables (`AGENTS_OTLP_*`)
//!
//! # Supported Standard Environment Variables
//!
//! | Variable | Config Path | Description |
//! |----------|-------------|-------------|
//! | `OTEL_EXPORTER_OTLP_TRACES_ENDPOINT` | `exporter.endpoint` | Full traces URL |
//! | `OTEL_EXPORTER_OTLP_ENDPOINT` | `exporter.endpoint` | Base URL, `/v1/traces` is appended |
//! | `OTEL_EXPORTER_OTLP_HEADERS` | `exporter.headers` | Comma-separated key=value pairs |
//! | `OTEL_EXPORTER_OTLP_COMPRESSION` | `exporter.compression` | `gzip` or `none` |
//! | `OTEL_SERVICE_NAME` | `exporter.resource_attributes` | Sets `service.name` |
//! | `OTEL_RESOURCE_ATTRIBUTES` | `exporter.resource_attributes` | Comma-separated key=value pairs |
//!
//! Crate-specific variables use `__` to separate nesting levels, for example
//! `AGENTS_OTLP_EXPORTER__MAX_RETRIES=5`.

use crate::error::Result;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

const ENV_PREFIX: &str = "AGENTS_OTLP_";
const TRACES_PATH: &str = "/v1/traces";
const SERVICE_NAME: &str = "service.name";

/// Default collector URL for OTLP/HTTP traces.
pub const DEFAULT_ENDPOINT: &str = "http://localhost:4318/v1/traces";

/// Compression applied to the request body.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    /// No compression.
    #[default]
    None,
    /// Gzip compression.
    Gzip,
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// OTLP exporter configuration.
    pub exporter: ExporterConfig,
    /// Batch processor configuration.
    pub batch: BatchConfig,
}

impl Config {
    /// Loads configuration from defaults and environment variables only.
    ///
    /// # Errors
    ///
    /// Returns an error if an environment value has the wrong type.
    pub fn load() -> Result<Self> {
        Self::figment(None).extract().map_err(Into::into)
    }

    /// Loads configuration from a TOML file layered under the environment.
    ///
    /// A missing file is not an error; defaults are used in its place.
    ///
    /// # Errors
    ///
    /// Returns an error if the file or an environment value cannot be parsed.
    pub fn load_from_path<P: AsRef<Path>>(config_path: P) -> Result<Self> {
        Self::figment(Some(config_path.as_ref()))
            .extract()
            .map_err(Into::into)
    }

    fn figment(config_path: Option<&Path>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));

        if let Some(path) = config_path
            && path.exists()
        {
            figment = figment.merge(Toml::file(path));
        }

        figment
            .merge(standard_otel_env())
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Creates a new config builder.
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }
}

/// OTLP/HTTP exporter configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExporterConfig {
    /// Collector URL the batch is POSTed to.
    pub endpoint: String,
    /// Extra headers sent with every request.
    pub headers: HashMap<String, String>,
    /// Maximum number of delivery attempts per export call.
    pub max_retries: u32,
    /// Backoff before the second attempt, in milliseconds.
    #[serde(with = "duration_ms")]
    pub base_delay: Duration,
    /// Upper bound of the backoff, in milliseconds.
    #[serde(with = "duration_ms")]
    pub max_delay: Duration,
    /// Per-request timeout, in milliseconds.
    #[serde(with = "duration_ms")]
    pub timeout: Duration,
    /// Request body compression.
    pub compression: Compression,
    /// Resource attributes attached to every batch, e.g. `service.name`.
    pub resource_attributes: HashMap<String, String>,
}

impl Default for ExporterConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            headers: HashMap::new(),
            max_retries: 3,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(30_000),
            timeout: Duration::from_secs(10),
            compression: Compression::None,
            resource_attributes: HashMap::new(),
        }
    }
}

/// Batch processor configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Maximum number of items buffered before new ones are dropped.
    pub max_queue_size: usize,
    /// Maximum number of items handed to the exporter at once.
    pub max_batch_size: usize,
    /// Interval between scheduled exports, in milliseconds.
    #[serde(with = "duration_ms")]
    pub schedule_delay: Duration,
    /// Fill ratio of the queue that triggers an early export.
    pub export_trigger_ratio: f64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_queue_size: 1000,
            max_batch_size: 100,
            schedule_delay: Duration::from_millis(5000),
            export_trigger_ratio: 0.8,
        }
    }
}

impl BatchConfig {
    /// Queue length at which the worker is woken before its schedule.
    pub fn export_trigger_size(&self) -> usize {
        let ratio = self.export_trigger_ratio.clamp(0.0, 1.0);
        ((self.max_queue_size as f64 * ratio) as usize).max(1)
    }
}

/// Builder for constructing configuration programmatically.
#[must_use = "builders do nothing unless .build() is called"]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Creates a new config builder with default values.
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    /// Sets the collector endpoint.
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.config.exporter.endpoint = endpoint.into();
        self
    }

    /// Adds a header sent with every request.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.config
            .exporter
            .headers
            .insert(name.into(), value.into());
        self
    }

    /// Sets the maximum number of delivery attempts.
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.config.exporter.max_retries = max_retries;
        self
    }

    /// Sets the initial backoff delay.
    pub fn base_delay(mut self, delay: Duration) -> Self {
        self.config.exporter.base_delay = delay;
        self
    }

    /// Sets the backoff cap.
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.config.exporter.max_delay = delay;
        self
    }

    /// Sets the per-request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.exporter.timeout = timeout;
        self
    }

    /// Sets the request body compression.
    pub fn compression(mut self, compression: Compression) -> Self {
        self.config.exporter.compression = compression;
        self
    }

    /// Sets the `service.name` resource attribute.
    pub fn service_name(self, name: impl Into<String>) -> Self {
        self.resource_attribute(SERVICE_NAME, name)
    }

    /// Adds a resource attribute.
    pub fn resource_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config
            .exporter
            .resource_attributes
            .insert(key.into(), value.into());
        self
    }

    /// Sets the batch processor queue capacity.
    pub fn max_queue_size(mut self, size: usize) -> Self {
        self.config.batch.max_queue_size = size;
        self
    }

    /// Sets the maximum batch size.
    pub fn max_batch_size(mut self, size: usize) -> Self {
        self.config.batch.max_batch_size = size;
        self
    }

    /// Sets the scheduled export interval.
    pub fn schedule_delay(mut self, delay: Duration) -> Self {
        self.config.batch.schedule_delay = delay;
        self
    }

    /// Sets the queue fill ratio that triggers an early export.
    pub fn export_trigger_ratio(mut self, ratio: f64) -> Self {
        self.config.batch.export_trigger_ratio = ratio;
        self
    }

    /// Builds the configuration.
    pub fn build(self) -> Config {
        self.config
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Partial exporter config for standard OTEL env var overrides.
#[derive(Debug, Default, Serialize)]
struct PartialExporterConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    endpoint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    compression: Option<Compression>,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    headers: HashMap<String, String>,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    resource_attributes: HashMap<String, String>,
}

/// Partial config for standard OTEL env var overrides.
#[derive(Debug, Default, Serialize)]
struct PartialConfig {
    #[serde(skip_serializing_if = "is_partial_exporter_empty")]
    exporter: PartialExporterConfig,
}

fn is_partial_exporter_empty(config: &PartialExporterConfig) -> bool {
    config.endpoint.is_none()
        && config.compression.is_none()
        && config.headers.is_empty()
        && config.resource_attributes.is_empty()
}

fn standard_otel_env() -> Serialized<PartialConfig> {
    let mut config = PartialConfig::default();

    if let Ok(endpoint) = std::env::var("OTEL_EXPORTER_OTLP_TRACES_ENDPOINT") {
        config.exporter.endpoint = Some(endpoint);
    } else if let Ok(base) = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT") {
        config.exporter.endpoint = Some(format!("{}{}", base.trim_end_matches('/'), TRACES_PATH));
    }

    if let Ok(compression) = std::env::var("OTEL_EXPORTER_OTLP_COMPRESSION") {
        config.exporter.compression = match compression.to_lowercase().as_str() {
            "gzip" => Some(Compression::Gzip),
            "none" => Some(Compression::None),
            _ => None,
        };
    }

    if let Ok(headers) = std::env::var("OTEL_EXPORTER_OTLP_HEADERS") {
        config.exporter.headers = parse_key_value_list(&headers);
    }

    if let Ok(attributes) = std::env::var("OTEL_RESOURCE_ATTRIBUTES") {
        config.exporter.resource_attributes = parse_key_value_list(&attributes);
    }

    if let Ok(service_name) = std::env::var("OTEL_SERVICE_NAME") {
        config
            .exporter
            .resource_attributes
            .insert(SERVICE_NAME.to_string(), service_name);
    }

    Serialized::defaults(config)
}

fn parse_key_value_list(list: &str) -> HashMap<String, String> {
    list.split(',')
        .filter_map(|pair| pair.split_once('='))
        .map(|(key, value)| (key.trim().to_string(), value.trim().to_string()))
        .filter(|(key, _)| !key.is_empty())
        .collect()
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let ms = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(ms))
    }
}
