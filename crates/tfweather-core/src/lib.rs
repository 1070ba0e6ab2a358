// tfweather-core: Connection, discovery and display refresh for the weather station.

pub mod ambient;
pub mod bus;
pub mod config;
pub mod connection;
pub mod display;
pub mod error;
pub mod format;
pub mod model;
pub mod registry;
pub mod scheduler;
pub mod station;
pub mod tfp;

#[cfg(test)]
mod mock;

// ── Primary re-exports ──────────────────────────────────────────────
pub use ambient::AmbientLightMonitor;
pub use bus::{BarometerDevice, Bus, DisplayDevice, HumidityDevice, LightSensorDevice};
pub use config::{DisplayLayout, StationConfig};
pub use connection::BusConnection;
pub use display::DisplayController;
pub use error::CoreError;
pub use registry::{Bound, DeviceRegistry};
pub use scheduler::{RefreshScheduler, TickReport};
pub use station::WeatherStation;
pub use tfp::TfpBus;

pub use model::{
    BusEvent, ConnectReason, ConnectionState, DeviceKind, DiscoveryEvent, Field, Reachability, Role, SchedulerState,
};
