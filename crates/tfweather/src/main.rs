//! tfweather: shows date, time, temperature and humidity on a Tinkerforge
//! LCD 20x4 and switches its backlight with the ambient light.

mod error;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use tfweather_config::Config;
use tfweather_core::{TfpBus, WeatherStation};

use crate::error::AppError;

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(1);
    }
}

async fn run() -> Result<(), AppError> {
    let path = tfweather_config::config_path();
    let config = tfweather_config::load_config_from(&path).map_err(|e| AppError::from_config(e, &path))?;

    init_tracing(&config);
    info!(
        host = %config.host,
        port = config.port,
        config = %path.display(),
        "starting tfweather"
    );

    let cancel = CancellationToken::new();
    spawn_signal_handler(cancel.clone())?;

    let bus = TfpBus::new(config.connection_config());
    let station = WeatherStation::new(bus, config.to_station_config(), cancel);
    station.run().await?;

    info!("tfweather stopped");
    Ok(())
}

fn init_tracing(config: &Config) {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter(&config.log_level)))
        .with_target(false)
        .init();
}

fn default_filter(level: &str) -> EnvFilter {
    EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"))
}

// ── Signals ─────────────────────────────────────────────────────────

/// Cancel `cancel` on Ctrl-C, and on SIGTERM where available.
fn spawn_signal_handler(cancel: CancellationToken) -> Result<(), AppError> {
    #[cfg(unix)]
    let mut sigterm =
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()).map_err(AppError::Signal)?;

    tokio::spawn(async move {
        #[cfg(unix)]
        let terminate = async {
            sigterm.recv().await;
        };
        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        let interrupt = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "ctrl-c handler failed");
                std::future::pending::<()>().await;
            }
        };

        tokio::select! {
            () = interrupt => {}
            () = terminate => {}
        }

        info!("shutdown requested");
        cancel.cancel();
    });

    Ok(())
}
