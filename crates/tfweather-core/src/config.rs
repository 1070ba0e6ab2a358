// ── Station configuration ──
//
// Runtime settings the core consumes. Built by tfweather-config from the
// layered TOML/env configuration; tests construct it directly.

use std::time::Duration;

/// Which display row each field occupies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayLayout {
    pub date_row: u8,
    pub time_row: u8,
    pub temperature_row: u8,
    pub humidity_row: u8,
}

impl Default for DisplayLayout {
    fn default() -> Self {
        Self {
            date_row: 0,
            time_row: 1,
            temperature_row: 2,
            humidity_row: 3,
        }
    }
}

#[derive(Debug, Clone)]
pub struct StationConfig {
    pub host: String,
    pub port: u16,
    /// Wait between failed connect or discovery attempts.
    pub retry_backoff: Duration,
    pub tick_interval: Duration,
    /// Ticks between temperature/humidity refreshes.
    pub slow_refresh_ticks: u32,
    pub illuminance_period: Duration,
    pub backlight_threshold_lux: f64,
    pub layout: DisplayLayout,
}

impl Default for StationConfig {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 4223,
            retry_backoff: Duration::from_secs(1),
            tick_interval: Duration::from_secs(1),
            slow_refresh_ticks: 10,
            illuminance_period: Duration::from_millis(1000),
            backlight_threshold_lux: crate::ambient::DEFAULT_THRESHOLD_LUX,
            layout: DisplayLayout::default(),
        }
    }
}
