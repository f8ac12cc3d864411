//! Application configuration management.
//!
//! Handles loading, saving, and validating hitag configuration including:
//! - Presence tracking timeouts
//! - Monitored beacon regions
//! - Backend endpoint, sandbox mode and request timeouts
//! - Scan-record upload batching
//! - Daemon bind address
//!
//! Configuration is layered: an optional TOML file, then `HITAG_*` environment
//! variables (`HITAG_API__SANDBOX=true` sets `api.sandbox`).

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::region::ProximityRegion;

/// Production backend host.
pub const PRODUCTION_BASE_URL: &str = "https://api.buybuddy.co";

/// Sandbox backend host.
pub const SANDBOX_BASE_URL: &str = "https://sandbox-api.buybuddy.co";

/// Environment variable prefix for configuration overrides.
pub const ENV_PREFIX: &str = "HITAG";

/// Errors raised while loading, validating or saving configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file was explicitly requested but does not exist.
    #[error("Configuration file not found: {0}")]
    NotFound(String),

    /// The layered sources could not be read or deserialized.
    #[error("Failed to load configuration: {0}")]
    ParseError(#[from] config::ConfigError),

    /// The configuration could not be written back to disk.
    #[error("Failed to write {path}: {source}")]
    WriteError {
        /// Target path.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The configuration could not be rendered as TOML.
    #[error("Failed to serialize configuration: {0}")]
    SerializeError(#[from] toml::ser::Error),

    /// A single field failed validation.
    #[error("Invalid value for '{field}': {message}")]
    ValidationError {
        /// Dotted path of the offending field.
        field: String,
        /// What is wrong with it.
        message: String,
    },

    /// Several fields failed validation.
    #[error("{} configuration errors", .0.len())]
    MultipleValidationErrors(Vec<ConfigError>),

    /// No platform configuration directory could be determined.
    #[error("Cannot determine configuration directory")]
    DirectoryUnavailable,
}

/// Result type for configuration operations.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Main application configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HitagConfig {
    /// Presence tracking.
    pub tracking: TrackingConfig,

    /// Monitored beacon regions.
    pub regions: RegionsConfig,

    /// Backend API access.
    pub api: ApiConfig,

    /// Scan-record upload.
    pub upload: UploadConfig,

    /// HTTP daemon.
    pub server: ServerConfig,
}

/// Presence tracking settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    /// How long a tag stays active without being observed, in milliseconds.
    pub active_timeout_ms: u64,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            active_timeout_ms: 10_000,
        }
    }
}

impl TrackingConfig {
    /// The active timeout as a duration.
    #[must_use]
    pub const fn active_timeout(&self) -> Duration {
        Duration::from_millis(self.active_timeout_ms)
    }
}

/// Beacon region settings.
///
/// Region UUIDs are `uuid_prefix` followed by a two digit uppercase hex serial,
/// for serials `0..count`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegionsConfig {
    /// UUID text shared by every region, missing the final byte.
    pub uuid_prefix: String,

    /// Number of regions to monitor.
    pub count: u16,
}

impl Default for RegionsConfig {
    fn default() -> Self {
        Self {
            uuid_prefix: ProximityRegion::DEFAULT_UUID_PREFIX.to_string(),
            count: ProximityRegion::DEFAULT_COUNT,
        }
    }
}

/// Backend API settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Talk to the sandbox backend instead of production.
    pub sandbox: bool,

    /// Explicit base URL, overriding the sandbox/production choice.
    pub base_url: Option<String>,

    /// Per-request transport timeout in seconds.
    pub request_timeout_secs: u64,

    /// How long a caller waits for an in-flight credential refresh, in seconds.
    /// Zero waits indefinitely.
    pub refresh_wait_timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            sandbox: false,
            base_url: None,
            request_timeout_secs: 15,
            refresh_wait_timeout_secs: 30,
        }
    }
}

impl ApiConfig {
    /// Resolve the backend base URL.
    ///
    /// # Errors
    ///
    /// Returns a validation error if `base_url` is set but not a valid URL.
    pub fn base_url(&self) -> ConfigResult<Url> {
        let raw = self.base_url.as_deref().unwrap_or(if self.sandbox {
            SANDBOX_BASE_URL
        } else {
            PRODUCTION_BASE_URL
        });
        Url::parse(raw).map_err(|e| ConfigError::ValidationError {
            field: "api.base_url".to_string(),
            message: e.to_string(),
        })
    }

    /// Transport timeout.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Bound on refresh waits, `None` when unbounded.
    #[must_use]
    pub const fn refresh_wait_timeout(&self) -> Option<Duration> {
        if self.refresh_wait_timeout_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(self.refresh_wait_timeout_secs))
        }
    }
}

/// Scan-record upload settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    /// Seconds between background flushes.
    pub interval_secs: u64,

    /// Maximum records per upload request.
    pub max_batch: usize,

    /// Maximum records kept in memory. The oldest are dropped past this.
    pub max_pending: usize,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            interval_secs: 5,
            max_batch: 100,
            max_pending: 10_000,
        }
    }
}

impl UploadConfig {
    /// Background flush interval.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

/// HTTP daemon settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Socket address to listen on.
    pub bind_address: String,

    /// Use production logging (JSON files + compact stdout).
    pub production: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:3000".to_string(),
            production: false,
        }
    }
}

impl HitagConfig {
    /// Load configuration from an optional TOML file layered with environment
    /// variables, then validate it.
    ///
    /// A missing file at the default location is not an error; the defaults
    /// apply. A missing file that was passed explicitly is.
    ///
    /// # Errors
    ///
    /// Returns an error if a source cannot be parsed or validation fails.
    pub fn load(path: Option<&Path>) -> ConfigResult<Self> {
        let mut builder = config::Config::builder();

        match path {
            Some(path) => {
                if !path.exists() {
                    return Err(ConfigError::NotFound(path.display().to_string()));
                }
                builder = builder.add_source(config::File::from(path));
            }
            None => {
                if let Ok(default_path) = default_config_path() {
                    builder = builder.add_source(config::File::from(default_path).required(false));
                }
            }
        }

        let loaded: Self = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        loaded.validate()?;
        Ok(loaded)
    }

    /// Save configuration as TOML.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be serialized or written.
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        let write_err = |source| ConfigError::WriteError {
            path: path.display().to_string(),
            source,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(write_err)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(write_err)
    }

    /// Validate every section, collecting all problems.
    ///
    /// # Errors
    ///
    /// Returns the single failure, or `MultipleValidationErrors`.
    pub fn validate(&self) -> ConfigResult<()> {
        let mut errors = Vec::new();
        let invalid = |field: &str, message: &str| ConfigError::ValidationError {
            field: field.to_string(),
            message: message.to_string(),
        };

        if self.tracking.active_timeout_ms == 0 {
            errors.push(invalid("tracking.active_timeout_ms", "must be greater than zero"));
        }
        if let Err(e) = ProximityRegion::from_config(&self.regions) {
            errors.push(e);
        }
        if let Err(e) = self.api.base_url() {
            errors.push(e);
        }
        if self.api.request_timeout_secs == 0 {
            errors.push(invalid("api.request_timeout_secs", "must be greater than zero"));
        }
        if self.upload.interval_secs == 0 {
            errors.push(invalid("upload.interval_secs", "must be greater than zero"));
        }
        if self.upload.max_batch == 0 {
            errors.push(invalid("upload.max_batch", "must be greater than zero"));
        }
        if self.upload.max_pending < self.upload.max_batch {
            errors.push(invalid("upload.max_pending", "must be at least upload.max_batch"));
        }
        if self.server.bind_address.parse::<SocketAddr>().is_err() {
            errors.push(invalid("server.bind_address", "expected host:port"));
        }

        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(ConfigError::MultipleValidationErrors(errors)),
        }
    }
}

/// Default configuration file path.
///
/// On Linux devices: `/etc/hitag/config.toml`.
/// Elsewhere: the platform config directory, e.g. `~/.config/hitag/config.toml`.
///
/// # Errors
///
/// Returns `DirectoryUnavailable` if no home directory can be resolved.
pub fn default_config_path() -> ConfigResult<PathBuf> {
    #[cfg(target_os = "linux")]
    {
        Ok(PathBuf::from("/etc/hitag/config.toml"))
    }
    #[cfg(not(target_os = "linux"))]
    {
        let dirs = directories::ProjectDirs::from("co", "buybuddy", "hitag")
            .ok_or(ConfigError::DirectoryUnavailable)?;
        Ok(dirs.config_dir().join("config.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = HitagConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.tracking.active_timeout(), Duration::from_secs(10));
        assert_eq!(config.api.refresh_wait_timeout(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_base_url_selection() {
        let mut api = ApiConfig::default();
        assert_eq!(api.base_url().unwrap().as_str(), "https://api.buybuddy.co/");

        api.sandbox = true;
        assert_eq!(
            api.base_url().unwrap().as_str(),
            "https://sandbox-api.buybuddy.co/"
        );

        api.base_url = Some("http://127.0.0.1:9000".to_string());
        assert_eq!(api.base_url().unwrap().as_str(), "http://127.0.0.1:9000/");
    }

    #[test]
    fn test_zero_refresh_wait_is_unbounded() {
        let api = ApiConfig {
            refresh_wait_timeout_secs: 0,
            ..ApiConfig::default()
        };
        assert_eq!(api.refresh_wait_timeout(), None);
    }

    #[test]
    fn test_validation_collects_all_errors() {
        let mut config = HitagConfig::default();
        config.tracking.active_timeout_ms = 0;
        config.upload.max_batch = 0;

        match config.validate() {
            Err(ConfigError::MultipleValidationErrors(errors)) => assert_eq!(errors.len(), 2),
            other => panic!("expected multiple errors, got {other:?}"),
        }
    }

    #[test]
    fn test_pending_cap_below_batch_size_rejected() {
        let mut config = HitagConfig::default();
        config.upload.max_batch = 50;
        config.upload.max_pending = 10;

        match config.validate() {
            Err(ConfigError::ValidationError { field, .. }) => {
                assert_eq!(field, "upload.max_pending");
            }
            other => panic!("expected a single error, got {other:?}"),
        }
    }

    #[test]
    fn test_single_validation_error() {
        let mut config = HitagConfig::default();
        config.server.bind_address = "not an address".to_string();

        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError { field, .. }) if field == "server.bind_address"
        ));
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = HitagConfig::default();
        config.api.sandbox = true;
        config.tracking.active_timeout_ms = 4_000;
        config.save(&path).unwrap();

        let loaded = HitagConfig::load(Some(&path)).unwrap();
        assert!(loaded.api.sandbox);
        assert_eq!(loaded.tracking.active_timeout_ms, 4_000);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[upload]\nmax_batch = 7\n").unwrap();

        let loaded = HitagConfig::load(Some(&path)).unwrap();
        assert_eq!(loaded.upload.max_batch, 7);
        assert_eq!(loaded.upload.interval_secs, 5);
        assert_eq!(loaded.regions.count, 20);
    }

    #[test]
    fn test_explicit_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        assert!(matches!(
            HitagConfig::load(Some(&path)),
            Err(ConfigError::NotFound(_))
        ));
    }
}
