//! Daemon error types with miette diagnostics.

use miette::Diagnostic;
use thiserror::Error;

use tfweather_config::ConfigError;
use tfweather_core::CoreError;

#[derive(Debug, Error, Diagnostic)]
pub enum AppError {
    // ── Configuration ────────────────────────────────────────────────

    #[error("Invalid configuration: {field}: {reason}")]
    #[diagnostic(
        code(tfweather::invalid_config),
        help(
            "Fix the value in the config file or the matching TFWEATHER_* variable.\n\
             Config file: {path}"
        )
    )]
    InvalidConfig {
        field: String,
        reason: String,
        path: String,
    },

    #[error("Could not load configuration")]
    #[diagnostic(
        code(tfweather::config_load),
        help(
            "Check the TOML syntax of {path}.\n\
             Set TFWEATHER_CONFIG to use a different file."
        )
    )]
    ConfigLoad {
        path: String,
        #[source]
        source: ConfigError,
    },

    // ── Runtime ──────────────────────────────────────────────────────

    #[error("Could not install signal handler")]
    #[diagnostic(code(tfweather::signal))]
    Signal(#[source] std::io::Error),

    #[error(transparent)]
    #[diagnostic(
        code(tfweather::station),
        help("Run with RUST_LOG=debug for the full event trace.")
    )]
    Station(#[from] CoreError),
}

impl AppError {
    /// Attach the config file location to a loading failure.
    pub fn from_config(err: ConfigError, path: &std::path::Path) -> Self {
        let path = path.display().to_string();
        match err {
            ConfigError::Validation { field, reason } => Self::InvalidConfig { field, reason, path },
            source @ ConfigError::Figment(_) => Self::ConfigLoad { path, source },
        }
    }
}
