// ── Domain model ──
//
// Transport-neutral types shared by the registry, the scheduler and the
// bus adapter. The TFP bus translates its wire events into these.

use tfweather_api::device_identifier;

/// A slot in the device registry. One bound handle per role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum Role {
    Display,
    LightSensor,
    HumiditySensor,
    Barometer,
}

/// What a discovered device is, by its device identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    /// LCD 20x4 bricklet.
    Display,
    /// Ambient Light bricklet.
    LightSensor,
    /// Humidity bricklet.
    HumiditySensor,
    /// Barometer bricklet.
    Barometer,
    /// Anything else on the bus. Ignored.
    Other(u16),
}

impl DeviceKind {
    pub fn from_identifier(identifier: u16) -> Self {
        match identifier {
            device_identifier::LCD_20X4 => Self::Display,
            device_identifier::AMBIENT_LIGHT => Self::LightSensor,
            device_identifier::HUMIDITY => Self::HumiditySensor,
            device_identifier::BAROMETER => Self::Barometer,
            other => Self::Other(other),
        }
    }

    /// The registry role this kind fills, if any.
    pub fn role(self) -> Option<Role> {
        match self {
            Self::Display => Some(Role::Display),
            Self::LightSensor => Some(Role::LightSensor),
            Self::HumiditySensor => Some(Role::HumiditySensor),
            Self::Barometer => Some(Role::Barometer),
            Self::Other(_) => None,
        }
    }
}

/// Why a device showed up in a discovery event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum Reachability {
    /// Plugged in (or powered up) just now.
    JustConnected,
    /// Answer to an enumerate request.
    AlreadyAvailable,
    /// Unplugged.
    Disconnected,
}

impl Reachability {
    /// Only newly connected or enumerated devices are bound.
    pub fn triggers_binding(self) -> bool {
        matches!(self, Self::JustConnected | Self::AlreadyAvailable)
    }
}

/// A device announced itself on the bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryEvent {
    pub uid: String,
    pub parent_uid: String,
    pub kind: DeviceKind,
    pub reachability: Reachability,
    pub position: char,
    pub hardware_version: [u8; 3],
    pub firmware_version: [u8; 3],
}

impl DiscoveryEvent {
    /// Shorthand for tests and adapters that only know the essentials.
    pub fn new(uid: impl Into<String>, kind: DeviceKind, reachability: Reachability) -> Self {
        Self {
            uid: uid.into(),
            parent_uid: String::new(),
            kind,
            reachability,
            position: '0',
            hardware_version: [0; 3],
            firmware_version: [0; 3],
        }
    }
}

/// Why the bus link came up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectReason {
    Request,
    AutoReconnect,
}

/// Everything the bus reports asynchronously.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusEvent {
    Discovered(DiscoveryEvent),
    Connected(ConnectReason),
    ConnectionLost,
    /// Illuminance push from a light sensor, in 1/10 lux.
    Illuminance { uid: String, raw: u16 },
}

/// Connection state observable by consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Refresh loop state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// Ticking, but no display is bound.
    AwaitingDisplay,
    Running,
    Stopped,
}

/// A display row the scheduler writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum Field {
    Date,
    Time,
    Temperature,
    Humidity,
}
