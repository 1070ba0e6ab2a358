// ── Bus abstraction ──
//
// The seams between the station logic and a concrete device bus. The
// production implementation is `TfpBus`; tests plug in an in-memory bus.

use std::future::Future;
use std::time::Duration;

use tokio::sync::broadcast;

use crate::error::CoreError;
use crate::model::BusEvent;

/// A 20x4 character display.
pub trait DisplayDevice: Send + Sync + 'static {
    fn write_line(&self, line: u8, position: u8, text: &str) -> impl Future<Output = Result<(), CoreError>> + Send;

    fn clear(&self) -> impl Future<Output = Result<(), CoreError>> + Send;

    fn backlight_on(&self) -> impl Future<Output = Result<(), CoreError>> + Send;

    fn backlight_off(&self) -> impl Future<Output = Result<(), CoreError>> + Send;
}

/// An ambient light sensor that pushes illuminance readings.
pub trait LightSensorDevice: Send + Sync + 'static {
    /// Ask the sensor to push [`BusEvent::Illuminance`] every `period`.
    fn set_illuminance_period(&self, period: Duration) -> impl Future<Output = Result<(), CoreError>> + Send;
}

pub trait HumidityDevice: Send + Sync + 'static {
    /// Relative humidity in 1/10 %RH.
    fn humidity(&self) -> impl Future<Output = Result<u16, CoreError>> + Send;
}

pub trait BarometerDevice: Send + Sync + 'static {
    /// Sensor chip temperature in 1/100 °C.
    fn chip_temperature(&self) -> impl Future<Output = Result<i16, CoreError>> + Send;
}

/// A device bus: one connection, discovery, and handle construction.
pub trait Bus: Send + Sync + 'static {
    type Display: DisplayDevice;
    type LightSensor: LightSensorDevice;
    type HumiditySensor: HumidityDevice;
    type Barometer: BarometerDevice;

    /// A single connection attempt.
    fn connect(&self, host: &str, port: u16) -> impl Future<Output = Result<(), CoreError>> + Send;

    /// Ask every device to announce itself as [`BusEvent::Discovered`].
    fn request_discovery(&self) -> impl Future<Output = Result<(), CoreError>> + Send;

    fn disconnect(&self) -> impl Future<Output = ()> + Send;

    fn subscribe(&self) -> broadcast::Receiver<BusEvent>;

    fn open_display(&self, uid: &str) -> Result<Self::Display, CoreError>;

    fn open_light_sensor(&self, uid: &str) -> Result<Self::LightSensor, CoreError>;

    fn open_humidity_sensor(&self, uid: &str) -> Result<Self::HumiditySensor, CoreError>;

    fn open_barometer(&self, uid: &str) -> Result<Self::Barometer, CoreError>;
}
