// tfweather-api: Async Rust client for the Tinkerforge TCP/IP protocol (brickd)

pub mod bricklet;
pub mod connection;
pub mod error;
pub mod event;
pub mod packet;
pub mod uid;

pub use bricklet::{AmbientLight, Barometer, Humidity, Lcd20x4, device_identifier};
pub use connection::{ConnectionConfig, IpConnection, ReconnectConfig};
pub use error::Error;
pub use event::{ConnectReason, DisconnectReason, Event};
pub use packet::{EnumerateCallback, EnumerationType};
pub use uid::Uid;
