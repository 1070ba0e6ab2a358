// ── Display controller ──
//
// Wraps the bound display handle and remembers the last commanded
// backlight state. The backlight lock is held across the device call so
// concurrent toggles from the light monitor are serialized.

use tokio::sync::Mutex;
use tracing::debug;

use crate::bus::DisplayDevice;
use crate::error::CoreError;

pub struct DisplayController<D> {
    uid: String,
    device: D,
    backlight: Mutex<bool>,
}

impl<D: DisplayDevice> DisplayController<D> {
    /// Wrap a freshly opened display. The backlight is assumed off until
    /// commanded.
    pub fn new(uid: impl Into<String>, device: D) -> Self {
        Self {
            uid: uid.into(),
            device,
            backlight: Mutex::new(false),
        }
    }

    pub fn uid(&self) -> &str {
        &self.uid
    }

    /// Write `text` on `line` starting at `position`. Out-of-range rows and
    /// columns are rejected by the device.
    pub async fn write_line(&self, line: u8, position: u8, text: &str) -> Result<(), CoreError> {
        self.device.write_line(line, position, text).await
    }

    pub async fn clear(&self) -> Result<(), CoreError> {
        self.device.clear().await
    }

    /// Turn the backlight on. Returns whether a device call was made.
    pub async fn backlight_on(&self) -> Result<bool, CoreError> {
        self.set_backlight(true).await
    }

    /// Turn the backlight off. Returns whether a device call was made.
    pub async fn backlight_off(&self) -> Result<bool, CoreError> {
        self.set_backlight(false).await
    }

    /// The last commanded backlight state.
    pub async fn is_backlight_on(&self) -> bool {
        *self.backlight.lock().await
    }

    async fn set_backlight(&self, on: bool) -> Result<bool, CoreError> {
        let mut state = self.backlight.lock().await;
        if *state == on {
            return Ok(false);
        }
        if on {
            self.device.backlight_on().await?;
        } else {
            self.device.backlight_off().await?;
        }
        *state = on;
        debug!(uid = %self.uid, on, "backlight switched");
        Ok(true)
    }
}
