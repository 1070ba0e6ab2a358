// Events published by the connection's reader task.

use crate::packet::EnumerateCallback;

/// Why the connection came up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectReason {
    /// Explicit `connect()` call.
    Request,
    /// Background loop re-established a dropped link.
    AutoReconnect,
}

/// Why the connection went down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    /// Explicit `disconnect()` call.
    Request,
    /// Socket error or malformed stream.
    Error,
    /// brickd closed the socket.
    Shutdown,
}

/// Everything the connection reports asynchronously.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Connected(ConnectReason),
    Disconnected(DisconnectReason),
    Enumerate(EnumerateCallback),
    /// Periodic push from an Ambient Light bricklet, in 1/10 lux.
    Illuminance { uid: String, illuminance: u16 },
}
