// ── Device registry ──
//
// One slot per role, each an `ArcSwapOption` so the refresh loop can load
// the current handle without locking while the event pump rebinds.
// Binding a role never touches another role's slot.

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwapOption;
use tracing::{debug, info};

use crate::bus::{Bus, LightSensorDevice};
use crate::display::DisplayController;
use crate::error::CoreError;
use crate::model::{DeviceKind, DiscoveryEvent, Role};

/// A bound sensor handle and the uid it was bound from.
pub struct Bound<D> {
    pub uid: String,
    pub device: D,
}

pub struct DeviceRegistry<B: Bus> {
    bus: Arc<B>,
    illuminance_period: Duration,
    display: ArcSwapOption<DisplayController<B::Display>>,
    light_sensor: ArcSwapOption<Bound<B::LightSensor>>,
    humidity_sensor: ArcSwapOption<Bound<B::HumiditySensor>>,
    barometer: ArcSwapOption<Bound<B::Barometer>>,
}

impl<B: Bus> DeviceRegistry<B> {
    pub fn new(bus: Arc<B>, illuminance_period: Duration) -> Self {
        Self {
            bus,
            illuminance_period,
            display: ArcSwapOption::empty(),
            light_sensor: ArcSwapOption::empty(),
            humidity_sensor: ArcSwapOption::empty(),
            barometer: ArcSwapOption::empty(),
        }
    }

    /// Bind the device named by a discovery event.
    ///
    /// Returns the role that was bound, `None` for events that do not
    /// bind (unplugs, unknown kinds), or the bind failure.
    pub async fn on_discovery(&self, event: &DiscoveryEvent) -> Result<Option<Role>, CoreError> {
        if !event.reachability.triggers_binding() {
            debug!(uid = %event.uid, kind = ?event.kind, "ignoring device removal");
            return Ok(None);
        }

        debug!(
            uid = %event.uid,
            parent = %event.parent_uid,
            position = %event.position,
            kind = ?event.kind,
            reachability = %event.reachability,
            hardware_version = ?event.hardware_version,
            firmware_version = ?event.firmware_version,
            "device discovered"
        );

        let role = match event.kind {
            DeviceKind::Display => {
                self.bind_display(&event.uid).await?;
                Role::Display
            }
            DeviceKind::LightSensor => {
                self.bind_light_sensor(&event.uid).await?;
                Role::LightSensor
            }
            DeviceKind::HumiditySensor => {
                self.bind_humidity_sensor(&event.uid)?;
                Role::HumiditySensor
            }
            DeviceKind::Barometer => {
                self.bind_barometer(&event.uid)?;
                Role::Barometer
            }
            DeviceKind::Other(identifier) => {
                debug!(uid = %event.uid, identifier, "ignoring unsupported device");
                return Ok(None);
            }
        };
        Ok(Some(role))
    }

    /// Open the display, clear it and light the backlight. The slot is
    /// populated only if all three succeed.
    pub async fn bind_display(&self, uid: &str) -> Result<(), CoreError> {
        let result = async {
            let device = self.bus.open_display(uid)?;
            let display = DisplayController::new(uid, device);
            display.clear().await?;
            display.backlight_on().await?;
            Ok::<_, CoreError>(display)
        }
        .await;

        match result {
            Ok(display) => {
                self.display.store(Some(Arc::new(display)));
                info!(uid, "display bound");
                Ok(())
            }
            Err(e) => {
                self.display.store(None);
                Err(CoreError::bind(Role::Display, uid, e))
            }
        }
    }

    /// Open the light sensor and start its periodic illuminance push.
    pub async fn bind_light_sensor(&self, uid: &str) -> Result<(), CoreError> {
        let result = async {
            let device = self.bus.open_light_sensor(uid)?;
            device.set_illuminance_period(self.illuminance_period).await?;
            Ok::<_, CoreError>(device)
        }
        .await;

        match result {
            Ok(device) => {
                self.light_sensor.store(Some(Arc::new(Bound {
                    uid: uid.to_owned(),
                    device,
                })));
                info!(uid, "light sensor bound");
                Ok(())
            }
            Err(e) => {
                self.light_sensor.store(None);
                Err(CoreError::bind(Role::LightSensor, uid, e))
            }
        }
    }

    pub fn bind_humidity_sensor(&self, uid: &str) -> Result<(), CoreError> {
        match self.bus.open_humidity_sensor(uid) {
            Ok(device) => {
                self.humidity_sensor.store(Some(Arc::new(Bound {
                    uid: uid.to_owned(),
                    device,
                })));
                info!(uid, "humidity sensor bound");
                Ok(())
            }
            Err(e) => {
                self.humidity_sensor.store(None);
                Err(CoreError::bind(Role::HumiditySensor, uid, e))
            }
        }
    }

    pub fn bind_barometer(&self, uid: &str) -> Result<(), CoreError> {
        match self.bus.open_barometer(uid) {
            Ok(device) => {
                self.barometer.store(Some(Arc::new(Bound {
                    uid: uid.to_owned(),
                    device,
                })));
                info!(uid, "barometer bound");
                Ok(())
            }
            Err(e) => {
                self.barometer.store(None);
                Err(CoreError::bind(Role::Barometer, uid, e))
            }
        }
    }

    // ── Slot accessors ───────────────────────────────────────────────

    pub fn display(&self) -> Option<Arc<DisplayController<B::Display>>> {
        self.display.load_full()
    }

    pub fn light_sensor(&self) -> Option<Arc<Bound<B::LightSensor>>> {
        self.light_sensor.load_full()
    }

    pub fn humidity_sensor(&self) -> Option<Arc<Bound<B::HumiditySensor>>> {
        self.humidity_sensor.load_full()
    }

    pub fn barometer(&self) -> Option<Arc<Bound<B::Barometer>>> {
        self.barometer.load_full()
    }

    /// Uid of the bound light sensor; illuminance from any other uid is
    /// not routed.
    pub fn light_sensor_uid(&self) -> Option<String> {
        self.light_sensor.load_full().map(|bound| bound.uid.clone())
    }

    /// Uid bound to `role`, if any.
    pub fn bound_uid(&self, role: Role) -> Option<String> {
        match role {
            Role::Display => self.display.load_full().map(|d| d.uid().to_owned()),
            Role::LightSensor => self.light_sensor_uid(),
            Role::HumiditySensor => self.humidity_sensor.load_full().map(|b| b.uid.clone()),
            Role::Barometer => self.barometer.load_full().map(|b| b.uid.clone()),
        }
    }
}
