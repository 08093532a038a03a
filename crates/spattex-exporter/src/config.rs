//! Exporter configuration with layered loading.

use std::path::Path;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::Deserialize;
use spattex_store::{StoreConfig, TableRef};

use crate::error::ConfigError;

// ============================================================================
// Default configuration constants
// ============================================================================

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "spattex.toml";

/// Prefix for environment variable overrides (`SPATTEX_TABLE__DATASET=...`).
pub const ENV_PREFIX: &str = "SPATTEX_";

/// Field holding the span name in every row.
pub const NAME_FIELD: &str = "name";

/// Default reserved field used to partition the table by day.
pub const DEFAULT_PARTITION_FIELD: &str = "ts";

/// Default wait after a schema update before resubmitting a batch.
///
/// Schema changes propagate asynchronously in the store; inserts issued
/// immediately after an alteration can still be rejected.
pub const DEFAULT_SCHEMA_SETTLE_DELAY: Duration = Duration::from_secs(60);

/// Default upper bound on each remote call (describe, alter, insert).
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Default first delay of the outer batch-retry policy.
pub const DEFAULT_RETRY_INITIAL_INTERVAL: Duration = Duration::from_secs(60);

/// Default cap on any single outer retry delay.
pub const DEFAULT_RETRY_MAX_INTERVAL: Duration = Duration::from_secs(60);

/// Default total time the outer layer keeps retrying one batch.
pub const DEFAULT_RETRY_MAX_ELAPSED: Duration = Duration::from_secs(5 * 60);

/// Exporter configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ExporterConfig {
    /// Target table identity. All three parts are required.
    #[serde(default)]
    pub table: TableConfig,

    /// Evolve the table schema when rows carry unknown fields.
    #[serde(default)]
    pub schema_flexible: bool,

    /// Name of the reserved timestamp partition field.
    #[serde(default = "default_partition_field")]
    pub partition_field: String,

    /// Write the span start time into the partition field of every row.
    #[serde(default)]
    pub write_partition_timestamp: bool,

    /// Wait between a schema update and the single resubmission.
    #[serde(
        default = "default_schema_settle_delay",
        deserialize_with = "deserialize_duration"
    )]
    pub schema_settle_delay: Duration,

    /// Bound on each remote store call.
    #[serde(
        default = "default_request_timeout",
        deserialize_with = "deserialize_duration"
    )]
    pub request_timeout: Duration,

    /// Retry policy recommended to the surrounding queue layer.
    #[serde(default)]
    pub retry: RetrySettings,

    /// Table store backend.
    #[serde(default)]
    pub store: StoreConfig,
}

impl Default for ExporterConfig {
    fn default() -> Self {
        Self {
            table: TableConfig::default(),
            schema_flexible: false,
            partition_field: default_partition_field(),
            write_partition_timestamp: false,
            schema_settle_delay: DEFAULT_SCHEMA_SETTLE_DELAY,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            retry: RetrySettings::default(),
            store: StoreConfig::default(),
        }
    }
}

impl ExporterConfig {
    /// Load configuration from files and environment.
    ///
    /// Configuration is loaded in order (later sources override earlier):
    /// 1. Default values
    /// 2. `spattex.toml` in the current directory, if present
    /// 3. Environment variables prefixed with `SPATTEX_`, nested keys
    ///    separated by `__` (`SPATTEX_TABLE__DATASET=otel`)
    pub fn load() -> Result<Self, ConfigError> {
        Self::figment(DEFAULT_CONFIG_FILE)
            .extract::<Self>()
            .map_err(ConfigError::from)
    }

    /// Loads configuration from the specified file path, which must exist.
    ///
    /// Environment variables override file settings as in [`Self::load`].
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }

        Self::figment(path)
            .extract::<Self>()
            .map_err(ConfigError::from)
    }

    fn figment(path: impl AsRef<Path>) -> Figment {
        Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Parses configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let figment = Figment::new().merge(Toml::string(content));
        figment.extract::<Self>().map_err(ConfigError::from)
    }

    /// Checks the settings an export cannot start without.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.table.validate()?;

        if self.partition_field.is_empty() {
            return Err(ConfigError::Invalid(
                "partition_field must not be empty".to_owned(),
            ));
        }
        if self.request_timeout.is_zero() {
            return Err(ConfigError::Invalid(
                "request_timeout must be greater than zero".to_owned(),
            ));
        }
        Ok(())
    }

    /// The configured table as a store reference.
    pub fn table_ref(&self) -> TableRef {
        TableRef::new(
            &self.table.project,
            &self.table.dataset,
            &self.table.table,
        )
    }
}

/// Three-part identity of the target table.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TableConfig {
    /// Project (catalog) that owns the dataset.
    pub project: String,
    /// Dataset holding the table.
    pub dataset: String,
    /// Table name.
    pub table: String,
}

impl TableConfig {
    /// The store API requires all three identifiers.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.project.is_empty() {
            return Err(ConfigError::MissingTableIdentity("project"));
        }
        if self.dataset.is_empty() {
            return Err(ConfigError::MissingTableIdentity("dataset"));
        }
        if self.table.is_empty() {
            return Err(ConfigError::MissingTableIdentity("table"));
        }
        Ok(())
    }
}

/// Whole-batch retry policy for the queue layer that drives the exporter.
///
/// The exporter itself never retries beyond its single schema-driven
/// resubmission; these values are published for the caller.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    /// Whether failed batches should be retried at all.
    pub enabled: bool,
    /// Delay before the first retry.
    #[serde(deserialize_with = "deserialize_duration")]
    pub initial_interval: Duration,
    /// Cap on any single retry delay.
    #[serde(deserialize_with = "deserialize_duration")]
    pub max_interval: Duration,
    /// Give up once this much time has passed since the first attempt.
    #[serde(deserialize_with = "deserialize_duration")]
    pub max_elapsed_time: Duration,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            enabled: true,
            initial_interval: DEFAULT_RETRY_INITIAL_INTERVAL,
            max_interval: DEFAULT_RETRY_MAX_INTERVAL,
            max_elapsed_time: DEFAULT_RETRY_MAX_ELAPSED,
        }
    }
}

impl RetrySettings {
    /// Delay before retry number `attempt` (zero-based).
    ///
    /// The delay doubles with each attempt (2^attempt * initial_interval),
    /// capped at `max_interval`.
    #[allow(clippy::cast_possible_truncation, clippy::as_conversions)]
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let multiplier = 2u64.saturating_pow(attempt).min(u64::from(u32::MAX));
        let delay = self.initial_interval.saturating_mul(multiplier as u32);
        delay.min(self.max_interval)
    }
}

fn default_partition_field() -> String {
    DEFAULT_PARTITION_FIELD.to_owned()
}

const fn default_schema_settle_delay() -> Duration {
    DEFAULT_SCHEMA_SETTLE_DELAY
}

const fn default_request_timeout() -> Duration {
    DEFAULT_REQUEST_TIMEOUT
}

/// A duration as written in config: bare seconds or a string with a unit.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawDuration {
    Seconds(u64),
    Text(String),
}

fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match RawDuration::deserialize(deserializer)? {
        RawDuration::Seconds(secs) => Ok(Duration::from_secs(secs)),
        RawDuration::Text(s) => parse_duration(&s).map_err(serde::de::Error::custom),
    }
}

fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    let (digits, unit) = if let Some(stripped) = s.strip_suffix("ms") {
        (stripped, Duration::from_millis(1))
    } else if let Some(stripped) = s.strip_suffix('s') {
        (stripped, Duration::from_secs(1))
    } else if let Some(stripped) = s.strip_suffix('m') {
        (stripped, Duration::from_secs(60))
    } else {
        (s, Duration::from_secs(1))
    };

    let count: u32 = digits
        .trim()
        .parse()
        .map_err(|_| format!("Invalid duration: {s}"))?;
    Ok(unit * count)
}
