// ── Ambient light monitor ──
//
// Switches the backlight on a single illuminance threshold. There is no
// hysteresis: every crossing toggles, readings on the same side do not.

use tracing::debug;

use crate::bus::DisplayDevice;
use crate::display::DisplayController;
use crate::error::CoreError;

/// Default switching threshold in lux.
pub const DEFAULT_THRESHOLD_LUX: f64 = 0.5;

#[derive(Debug, Clone, Copy)]
pub struct AmbientLightMonitor {
    threshold_lux: f64,
}

impl Default for AmbientLightMonitor {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD_LUX)
    }
}

impl AmbientLightMonitor {
    pub fn new(threshold_lux: f64) -> Self {
        Self { threshold_lux }
    }

    pub fn threshold_lux(&self) -> f64 {
        self.threshold_lux
    }

    /// Readings arrive in 1/10 lux.
    pub fn to_lux(raw: u16) -> f64 {
        f64::from(raw) / 10.0
    }

    /// Apply an illuminance reading to the display backlight.
    ///
    /// Returns the new backlight state if it was toggled, `None` if the
    /// reading stayed on the same side of the threshold.
    pub async fn on_illuminance<D: DisplayDevice>(
        &self,
        display: &DisplayController<D>,
        raw: u16,
    ) -> Result<Option<bool>, CoreError> {
        let lux = Self::to_lux(raw);
        let want_on = lux >= self.threshold_lux;
        let changed = if want_on {
            display.backlight_on().await?
        } else {
            display.backlight_off().await?
        };
        if changed {
            debug!(lux, threshold = self.threshold_lux, on = want_on, "backlight follows ambient light");
            Ok(Some(want_on))
        } else {
            Ok(None)
        }
    }
}
