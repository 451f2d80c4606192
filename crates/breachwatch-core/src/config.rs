//! Configuration management for breachwatch.
//!
//! Provides TOML-based configuration with XDG-compliant paths and
//! environment variable overrides, plus the per-session options the
//! user confirms before a check starts.

use crate::error::{ConfigError, ConfigResult};
use crate::types::BreachSource;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Main application configuration.
///
/// This is loaded from `~/.config/breachwatch/config.toml` (or platform equivalent).
/// If the file doesn't exist, default values are used.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Shared HTTP client settings
    pub http: HttpConfig,
    /// Retry, backoff and concurrency settings
    pub checking: CheckingConfig,
    /// Breach source endpoints and thresholds
    pub sources: SourcesConfig,
}

impl AppConfig {
    /// Load configuration from disk, falling back to defaults if not found.
    ///
    /// # Errors
    /// Returns error if:
    /// - Config directory cannot be determined
    /// - File exists but cannot be read
    /// - File contents are not valid TOML
    pub fn load() -> ConfigResult<Self> {
        let config_path = Self::config_path()?;
        Self::load_from(&config_path)
    }

    /// Load configuration from an explicit path, falling back to defaults if
    /// the file does not exist.
    pub fn load_from(config_path: &Path) -> ConfigResult<Self> {
        let config: Self = if config_path.exists() {
            tracing::debug!("Loading config from {}", config_path.display());
            let contents = fs::read_to_string(config_path)?;
            toml::from_str(&contents)?
        } else {
            tracing::debug!("Config file not found, using defaults");
            Self::default()
        };

        config.validate()?;
        Ok(config)
    }

    /// Load configuration with environment variable overrides.
    ///
    /// Supports the following environment variables:
    /// - `BREACHWATCH_TIMEOUT_SECS`: Override the HTTP request timeout
    /// - `BREACHWATCH_MAX_CONCURRENT`: Override concurrent requests per backend
    /// - `BREACHWATCH_MAX_RETRIES`: Override retries per request
    pub fn load_with_env() -> ConfigResult<Self> {
        let mut config = Self::load()?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Apply `BREACHWATCH_*` environment overrides in place.
    ///
    /// Unparseable values are ignored.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("BREACHWATCH_TIMEOUT_SECS") {
            if let Ok(secs) = val.parse() {
                self.http.timeout_secs = secs;
                tracing::debug!("Override http.timeout_secs from env: {}", secs);
            }
        }

        if let Ok(val) = std::env::var("BREACHWATCH_MAX_CONCURRENT") {
            if let Ok(max) = val.parse() {
                self.checking.max_concurrent_requests = max;
                tracing::debug!("Override checking.max_concurrent_requests from env: {}", max);
            }
        }

        if let Ok(val) = std::env::var("BREACHWATCH_MAX_RETRIES") {
            if let Ok(retries) = val.parse() {
                self.checking.max_retries = retries;
                tracing::debug!("Override checking.max_retries from env: {}", retries);
            }
        }
    }

    /// Reject values the checker cannot run with.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.http.timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "http.timeout_secs".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.checking.max_concurrent_requests == 0 {
            return Err(ConfigError::InvalidValue {
                field: "checking.max_concurrent_requests".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// Save configuration to `config_path`.
    ///
    /// Creates the parent directory if it doesn't exist.
    pub fn save_to(&self, config_path: &Path) -> ConfigResult<()> {
        if let Some(config_dir) = config_path.parent() {
            fs::create_dir_all(config_dir)?;
        }
        tracing::debug!("Saving config to {}", config_path.display());

        let contents = toml::to_string_pretty(self)?;
        fs::write(config_path, contents)?;
        Ok(())
    }

    /// Get the path to the configuration file.
    ///
    /// Uses XDG base directories: `~/.config/breachwatch/config.toml`
    pub fn config_path() -> ConfigResult<PathBuf> {
        let dirs = ProjectDirs::from("com", "breachwatch", "breachwatch")
            .ok_or(ConfigError::NoConfigDir)?;
        Ok(dirs.config_dir().join("config.toml"))
    }
}

/// Settings for the single shared HTTP client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Per-request timeout ceiling in seconds
    pub timeout_secs: u64,
    /// User agent string sent with every request
    pub user_agent: String,
    /// Value of the `Accept` header
    pub accept: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30 * 60,
            user_agent: concat!("breachwatch/", env!("CARGO_PKG_VERSION")).to_string(),
            accept: "application/json".to_string(),
        }
    }
}

/// Retry and concurrency behaviour of backend runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckingConfig {
    /// Retries after the first attempt before a transient failure becomes a skip
    pub max_retries: u32,
    /// Base delay between attempts in milliseconds
    pub retry_delay_ms: u64,
    /// Multiplier applied to the delay after a rate-limit response
    pub rate_limit_backoff_multiplier: u64,
    /// Concurrent in-flight requests within one backend run
    pub max_concurrent_requests: usize,
}

impl Default for CheckingConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay_ms: 2000,
            rate_limit_backoff_multiplier: 3,
            max_concurrent_requests: 5,
        }
    }
}

/// Endpoints and staleness thresholds of the breach sources.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourcesConfig {
    /// Have I Been Pwned API base URL
    pub hibp_api_url: String,
    /// Pwned Passwords range API base URL
    pub pwned_passwords_url: String,
    /// Plain-text list of domains served through Cloudflare during Cloudbleed
    pub cloudbleed_list_url: String,
    /// Passwords unchanged for longer than this are "old" for Pwned Passwords
    pub password_max_age_days: u32,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            hibp_api_url: "https://haveibeenpwned.com/api/v3".to_string(),
            pwned_passwords_url: "https://api.pwnedpasswords.com".to_string(),
            cloudbleed_list_url:
                "https://raw.githubusercontent.com/pirate/sites-using-cloudflare/master/sorted_unique_cf.txt"
                    .to_string(),
            password_max_age_days: 365,
        }
    }
}

/// Options the user confirms when starting a checking session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
#[allow(clippy::struct_excessive_bools)]
pub struct SessionConfig {
    /// Run every supported source instead of only `selected_backend`
    pub check_all_backends: bool,
    /// Source to run when `check_all_backends` is false
    pub selected_backend: BreachSource,
    /// Mark breached entries for expiry (performed by the presentation layer)
    pub expire_entries: bool,
    /// Only check entries older than each source's staleness threshold
    pub only_check_old_entries: bool,
    /// Skip entries that sit in the recycle bin
    pub ignore_deleted_entries: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            check_all_backends: false,
            selected_backend: BreachSource::HaveIBeenPwned,
            expire_entries: false,
            only_check_old_entries: false,
            ignore_deleted_entries: true,
        }
    }
}

impl SessionConfig {
    /// Sources this session will run, in run order.
    #[must_use]
    pub fn selected_sources(&self) -> Vec<BreachSource> {
        if self.check_all_backends {
            BreachSource::ALL.to_vec()
        } else {
            vec![self.selected_backend]
        }
    }
}
