//! Configuration for the tfweather daemon.
//!
//! Built-in defaults, then a TOML file, then `TFWEATHER_*` environment
//! variables, merged with figment. Translates into the core's
//! [`StationConfig`] and the transport's [`ConnectionConfig`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use tfweather_api::ConnectionConfig;
use tfweather_core::{DisplayLayout, StationConfig};

/// Environment variable prefix for every key.
pub const ENV_PREFIX: &str = "TFWEATHER_";

/// Overrides the config file location.
pub const CONFIG_PATH_ENV: &str = "TFWEATHER_CONFIG";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── Config ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// brickd host.
    pub host: String,
    pub port: u16,
    /// Wait between failed connect or enumerate attempts.
    pub retry_backoff_ms: u64,
    /// How long a device request waits for its response.
    pub request_timeout_ms: u64,
    /// Display refresh period.
    pub tick_interval_ms: u64,
    /// Ticks between temperature/humidity refreshes.
    pub slow_refresh_ticks: u32,
    /// Illuminance push period requested from the light sensor.
    pub illuminance_period_ms: u64,
    /// Below this the backlight goes off.
    pub backlight_threshold_lux: f64,
    /// Default tracing filter when `RUST_LOG` is unset.
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 4223,
            retry_backoff_ms: 1000,
            request_timeout_ms: 2500,
            tick_interval_ms: 1000,
            slow_refresh_ticks: 10,
            illuminance_period_ms: 1000,
            backlight_threshold_lux: 0.5,
            log_level: "info".into(),
        }
    }
}

impl Config {
    /// Reject values the station cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(invalid("host", "must not be empty"));
        }
        if self.port == 0 {
            return Err(invalid("port", "must not be 0"));
        }
        for (field, value) in [
            ("retry_backoff_ms", self.retry_backoff_ms),
            ("request_timeout_ms", self.request_timeout_ms),
            ("tick_interval_ms", self.tick_interval_ms),
            ("illuminance_period_ms", self.illuminance_period_ms),
        ] {
            if value == 0 {
                return Err(invalid(field, "must be greater than 0"));
            }
        }
        if u32::try_from(self.illuminance_period_ms).is_err() {
            return Err(invalid("illuminance_period_ms", "must fit in 32 bits"));
        }
        if self.slow_refresh_ticks == 0 {
            return Err(invalid("slow_refresh_ticks", "must be greater than 0"));
        }
        if !self.backlight_threshold_lux.is_finite() || self.backlight_threshold_lux < 0.0 {
            return Err(invalid("backlight_threshold_lux", "must be a finite, non-negative number"));
        }
        Ok(())
    }

    pub fn to_station_config(&self) -> StationConfig {
        StationConfig {
            host: self.host.clone(),
            port: self.port,
            retry_backoff: Duration::from_millis(self.retry_backoff_ms),
            tick_interval: Duration::from_millis(self.tick_interval_ms),
            slow_refresh_ticks: self.slow_refresh_ticks,
            illuminance_period: Duration::from_millis(self.illuminance_period_ms),
            backlight_threshold_lux: self.backlight_threshold_lux,
            layout: DisplayLayout::default(),
        }
    }

    pub fn connection_config(&self) -> ConnectionConfig {
        ConnectionConfig {
            request_timeout: Duration::from_millis(self.request_timeout_ms),
            ..ConnectionConfig::default()
        }
    }
}

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::Validation {
        field: field.into(),
        reason: reason.into(),
    }
}

// ── Config file path ────────────────────────────────────────────────

/// `TFWEATHER_CONFIG` if set, otherwise the platform config directory.
pub fn config_path() -> PathBuf {
    if let Some(path) = std::env::var_os(CONFIG_PATH_ENV) {
        return PathBuf::from(path);
    }
    ProjectDirs::from("", "", "tfweather").map_or_else(
        || PathBuf::from("tfweather.toml"),
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

// ── Config loading ──────────────────────────────────────────────────

/// Load and validate the config from the default path and environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load and validate the config from `path` and environment. A missing
/// file is not an error.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let config: Config = figment(path).extract()?;
    config.validate()?;
    Ok(config)
}

fn figment(path: &Path) -> Figment {
    Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed(ENV_PREFIX).ignore(&["config"]))
}
