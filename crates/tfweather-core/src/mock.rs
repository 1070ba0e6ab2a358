// In-memory bus for unit tests. Records every device call and lets tests
// inject connection, discovery, open and per-device failures.
#![allow(clippy::unwrap_used)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicI16, AtomicU16, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::broadcast;

use crate::bus::{BarometerDevice, Bus, DisplayDevice, HumidityDevice, LightSensorDevice};
use crate::error::CoreError;
use crate::model::BusEvent;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Call {
    WriteLine { uid: String, line: u8, text: String },
    Clear { uid: String },
    BacklightOn { uid: String },
    BacklightOff { uid: String },
    SetPeriod { uid: String, period: Duration },
    Humidity { uid: String },
    ChipTemperature { uid: String },
}

struct Shared {
    calls: Mutex<Vec<Call>>,
    failing_devices: Mutex<HashSet<String>>,
    humidity: AtomicU16,
    temperature: AtomicI16,
}

pub(crate) struct MockBus {
    shared: Arc<Shared>,
    events: broadcast::Sender<BusEvent>,
    failing_opens: Mutex<HashSet<String>>,
    connect_failures: AtomicU32,
    discovery_failures: AtomicU32,
    connect_attempts: AtomicU32,
    discovery_attempts: AtomicU32,
    disconnected: AtomicBool,
}

impl MockBus {
    pub(crate) fn new() -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            shared: Arc::new(Shared {
                calls: Mutex::new(Vec::new()),
                failing_devices: Mutex::new(HashSet::new()),
                humidity: AtomicU16::new(455),
                temperature: AtomicI16::new(2150),
            }),
            events,
            failing_opens: Mutex::new(HashSet::new()),
            connect_failures: AtomicU32::new(0),
            discovery_failures: AtomicU32::new(0),
            connect_attempts: AtomicU32::new(0),
            discovery_attempts: AtomicU32::new(0),
            disconnected: AtomicBool::new(false),
        }
    }

    // ── Failure injection ────────────────────────────────────────────

    pub(crate) fn fail_connects(&self, count: u32) {
        self.connect_failures.store(count, Ordering::SeqCst);
    }

    pub(crate) fn fail_discoveries(&self, count: u32) {
        self.discovery_failures.store(count, Ordering::SeqCst);
    }

    /// Opening a handle for `uid` fails.
    pub(crate) fn fail_open(&self, uid: &str) {
        self.failing_opens.lock().unwrap().insert(uid.to_owned());
    }

    /// Every call on the device with `uid` fails.
    pub(crate) fn fail_device(&self, uid: &str) {
        self.shared.failing_devices.lock().unwrap().insert(uid.to_owned());
    }

    pub(crate) fn set_readings(&self, humidity: u16, temperature: i16) {
        self.shared.humidity.store(humidity, Ordering::SeqCst);
        self.shared.temperature.store(temperature, Ordering::SeqCst);
    }

    pub(crate) fn emit(&self, event: BusEvent) {
        let _ = self.events.send(event);
    }

    // ── Inspection ───────────────────────────────────────────────────

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.shared.calls.lock().unwrap().clone()
    }

    pub(crate) fn clear_calls(&self) {
        self.shared.calls.lock().unwrap().clear();
    }

    /// Rows written, as `(line, text)`.
    pub(crate) fn lines_written(&self) -> Vec<(u8, String)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::WriteLine { line, text, .. } => Some((line, text)),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls().iter().filter(|call| pred(call)).count()
    }

    pub(crate) fn connect_attempts(&self) -> u32 {
        self.connect_attempts.load(Ordering::SeqCst)
    }

    pub(crate) fn discovery_attempts(&self) -> u32 {
        self.discovery_attempts.load(Ordering::SeqCst)
    }

    pub(crate) fn disconnected(&self) -> bool {
        self.disconnected.load(Ordering::SeqCst)
    }

    fn open(&self, uid: &str) -> Result<MockDevice, CoreError> {
        if self.failing_opens.lock().unwrap().contains(uid) {
            return Err(CoreError::Device {
                message: format!("cannot open {uid}"),
            });
        }
        Ok(MockDevice {
            uid: uid.to_owned(),
            shared: Arc::clone(&self.shared),
        })
    }
}

/// Take one unit off a failure budget. Returns `true` if the call should fail.
fn consume(budget: &AtomicU32) -> bool {
    budget
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
        .is_ok()
}

impl Bus for MockBus {
    type Display = MockDevice;
    type LightSensor = MockDevice;
    type HumiditySensor = MockDevice;
    type Barometer = MockDevice;

    async fn connect(&self, _host: &str, _port: u16) -> Result<(), CoreError> {
        self.connect_attempts.fetch_add(1, Ordering::SeqCst);
        if consume(&self.connect_failures) {
            return Err(CoreError::ConnectionFailed {
                addr: "mock".into(),
                reason: "refused".into(),
            });
        }
        let _ = self.events.send(BusEvent::Connected(crate::model::ConnectReason::Request));
        Ok(())
    }

    async fn request_discovery(&self) -> Result<(), CoreError> {
        self.discovery_attempts.fetch_add(1, Ordering::SeqCst);
        if consume(&self.discovery_failures) {
            return Err(CoreError::NotConnected);
        }
        Ok(())
    }

    async fn disconnect(&self) {
        self.disconnected.store(true, Ordering::SeqCst);
    }

    fn subscribe(&self) -> broadcast::Receiver<BusEvent> {
        self.events.subscribe()
    }

    fn open_display(&self, uid: &str) -> Result<MockDevice, CoreError> {
        self.open(uid)
    }

    fn open_light_sensor(&self, uid: &str) -> Result<MockDevice, CoreError> {
        self.open(uid)
    }

    fn open_humidity_sensor(&self, uid: &str) -> Result<MockDevice, CoreError> {
        self.open(uid)
    }

    fn open_barometer(&self, uid: &str) -> Result<MockDevice, CoreError> {
        self.open(uid)
    }
}

pub(crate) struct MockDevice {
    uid: String,
    shared: Arc<Shared>,
}

impl MockDevice {
    fn record(&self, call: Call) -> Result<(), CoreError> {
        if self.shared.failing_devices.lock().unwrap().contains(&self.uid) {
            return Err(CoreError::Device {
                message: format!("{} failed", self.uid),
            });
        }
        self.shared.calls.lock().unwrap().push(call);
        Ok(())
    }
}

impl DisplayDevice for MockDevice {
    async fn write_line(&self, line: u8, _position: u8, text: &str) -> Result<(), CoreError> {
        self.record(Call::WriteLine {
            uid: self.uid.clone(),
            line,
            text: text.to_owned(),
        })
    }

    async fn clear(&self) -> Result<(), CoreError> {
        self.record(Call::Clear { uid: self.uid.clone() })
    }

    async fn backlight_on(&self) -> Result<(), CoreError> {
        self.record(Call::BacklightOn { uid: self.uid.clone() })
    }

    async fn backlight_off(&self) -> Result<(), CoreError> {
        self.record(Call::BacklightOff { uid: self.uid.clone() })
    }
}

impl LightSensorDevice for MockDevice {
    async fn set_illuminance_period(&self, period: Duration) -> Result<(), CoreError> {
        self.record(Call::SetPeriod {
            uid: self.uid.clone(),
            period,
        })
    }
}

impl HumidityDevice for MockDevice {
    async fn humidity(&self) -> Result<u16, CoreError> {
        self.record(Call::Humidity { uid: self.uid.clone() })?;
        Ok(self.shared.humidity.load(Ordering::SeqCst))
    }
}

impl BarometerDevice for MockDevice {
    async fn chip_temperature(&self) -> Result<i16, CoreError> {
        self.record(Call::ChipTemperature { uid: self.uid.clone() })?;
        Ok(self.shared.temperature.load(Ordering::SeqCst))
    }
}
