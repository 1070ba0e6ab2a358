// ── TFP bus adapter ──
//
// Implements `Bus` on top of `tfweather_api::IpConnection`. A bridge task
// translates transport events into `BusEvent`s on the core's own
// broadcast channel, so consumers never see wire types.

use std::time::Duration;

use tfweather_api::{
    AmbientLight, Barometer, ConnectionConfig, EnumerateCallback, EnumerationType, Event, Humidity, IpConnection,
    Lcd20x4,
};
use tokio::sync::{Mutex, broadcast};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::bus::{BarometerDevice, Bus, DisplayDevice, HumidityDevice, LightSensorDevice};
use crate::error::CoreError;
use crate::model::{BusEvent, ConnectReason, DeviceKind, DiscoveryEvent, Reachability};

const EVENT_CHANNEL_SIZE: usize = 256;

/// Production bus backed by a brickd TCP connection.
pub struct TfpBus {
    conn: IpConnection,
    events: broadcast::Sender<BusEvent>,
    bridge: Mutex<Option<JoinHandle<()>>>,
    cancel: CancellationToken,
}

impl TfpBus {
    pub fn new(config: ConnectionConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_SIZE);
        Self {
            conn: IpConnection::new(config),
            events,
            bridge: Mutex::new(None),
            cancel: CancellationToken::new(),
        }
    }

    /// The underlying transport connection.
    pub fn connection(&self) -> &IpConnection {
        &self.conn
    }

    /// Start forwarding transport events. Subscribes before the first
    /// connect so the initial `Connected` is not missed.
    async fn ensure_bridge(&self) {
        let mut bridge = self.bridge.lock().await;
        if bridge.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return;
        }
        let rx = self.conn.subscribe();
        let tx = self.events.clone();
        let cancel = self.cancel.child_token();
        *bridge = Some(tokio::spawn(bridge_task(rx, tx, cancel)));
    }
}

impl Bus for TfpBus {
    type Display = Lcd20x4;
    type LightSensor = AmbientLight;
    type HumiditySensor = Humidity;
    type Barometer = Barometer;

    async fn connect(&self, host: &str, port: u16) -> Result<(), CoreError> {
        self.ensure_bridge().await;
        self.conn.connect(host, port).await.map_err(|e| match e {
            tfweather_api::Error::Io(io) => CoreError::ConnectionFailed {
                addr: format!("{host}:{port}"),
                reason: io.to_string(),
            },
            other => other.into(),
        })
    }

    async fn request_discovery(&self) -> Result<(), CoreError> {
        self.conn.enumerate().await?;
        Ok(())
    }

    async fn disconnect(&self) {
        self.conn.disconnect().await;
        self.cancel.cancel();
        if let Some(handle) = self.bridge.lock().await.take() {
            let _ = handle.await;
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<BusEvent> {
        self.events.subscribe()
    }

    fn open_display(&self, uid: &str) -> Result<Lcd20x4, CoreError> {
        Ok(Lcd20x4::new(uid, &self.conn)?)
    }

    fn open_light_sensor(&self, uid: &str) -> Result<AmbientLight, CoreError> {
        Ok(AmbientLight::new(uid, &self.conn)?)
    }

    fn open_humidity_sensor(&self, uid: &str) -> Result<Humidity, CoreError> {
        Ok(Humidity::new(uid, &self.conn)?)
    }

    fn open_barometer(&self, uid: &str) -> Result<Barometer, CoreError> {
        Ok(Barometer::new(uid, &self.conn)?)
    }
}

// ── Device trait impls for the bricklet handles ──────────────────────

impl DisplayDevice for Lcd20x4 {
    async fn write_line(&self, line: u8, position: u8, text: &str) -> Result<(), CoreError> {
        Ok(Lcd20x4::write_line(self, line, position, text).await?)
    }

    async fn clear(&self) -> Result<(), CoreError> {
        Ok(self.clear_display().await?)
    }

    async fn backlight_on(&self) -> Result<(), CoreError> {
        Ok(Lcd20x4::backlight_on(self).await?)
    }

    async fn backlight_off(&self) -> Result<(), CoreError> {
        Ok(Lcd20x4::backlight_off(self).await?)
    }
}

impl LightSensorDevice for AmbientLight {
    async fn set_illuminance_period(&self, period: Duration) -> Result<(), CoreError> {
        Ok(self.set_illuminance_callback_period(period).await?)
    }
}

impl HumidityDevice for Humidity {
    async fn humidity(&self) -> Result<u16, CoreError> {
        Ok(Humidity::humidity(self).await?)
    }
}

impl BarometerDevice for Barometer {
    async fn chip_temperature(&self) -> Result<i16, CoreError> {
        Ok(Barometer::chip_temperature(self).await?)
    }
}

// ── Event bridge ─────────────────────────────────────────────────────

async fn bridge_task(
    mut rx: broadcast::Receiver<Event>,
    tx: broadcast::Sender<BusEvent>,
    cancel: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            event = rx.recv() => event,
        };

        match event {
            Ok(event) => {
                if let Some(bus_event) = translate(event) {
                    let _ = tx.send(bus_event);
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "bus event bridge lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
    debug!("bus event bridge exiting");
}

/// Map a transport event into the core's vocabulary.
fn translate(event: Event) -> Option<BusEvent> {
    match event {
        Event::Connected(tfweather_api::ConnectReason::Request) => Some(BusEvent::Connected(ConnectReason::Request)),
        Event::Connected(tfweather_api::ConnectReason::AutoReconnect) => {
            Some(BusEvent::Connected(ConnectReason::AutoReconnect))
        }
        Event::Disconnected(tfweather_api::DisconnectReason::Request) => None,
        Event::Disconnected(_) => Some(BusEvent::ConnectionLost),
        Event::Enumerate(device) => discovery_event(device).map(BusEvent::Discovered),
        Event::Illuminance { uid, illuminance } => Some(BusEvent::Illuminance { uid, raw: illuminance }),
    }
}

fn discovery_event(device: EnumerateCallback) -> Option<DiscoveryEvent> {
    let reachability = match device.enumeration_type {
        EnumerationType::Available => Reachability::AlreadyAvailable,
        EnumerationType::Connected => Reachability::JustConnected,
        EnumerationType::Disconnected => Reachability::Disconnected,
        EnumerationType::Unknown(raw) => {
            trace!(uid = %device.uid, raw, "unknown enumeration type");
            return None;
        }
    };
    Some(DiscoveryEvent {
        uid: device.uid,
        parent_uid: device.connected_uid,
        kind: DeviceKind::from_identifier(device.device_identifier),
        reachability,
        position: device.position,
        hardware_version: device.hardware_version,
        firmware_version: device.firmware_version,
    })
}
