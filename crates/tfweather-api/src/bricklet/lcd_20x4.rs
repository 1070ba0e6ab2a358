// LCD 20x4 bricklet: four rows of twenty KS0066U characters with a
// switchable backlight.

use bytes::{BufMut, BytesMut};

use super::{DeviceHandle, device_identifier, expect_len};
use crate::connection::IpConnection;
use crate::error::Error;
use crate::uid::Uid;

pub const FUNCTION_WRITE_LINE: u8 = 1;
pub const FUNCTION_CLEAR_DISPLAY: u8 = 2;
pub const FUNCTION_BACKLIGHT_ON: u8 = 3;
pub const FUNCTION_BACKLIGHT_OFF: u8 = 4;
pub const FUNCTION_IS_BACKLIGHT_ON: u8 = 5;

pub const COLUMNS: usize = 20;
pub const ROWS: u8 = 4;

#[derive(Clone)]
pub struct Lcd20x4 {
    device: DeviceHandle,
}

impl Lcd20x4 {
    pub const DEVICE_IDENTIFIER: u16 = device_identifier::LCD_20X4;

    pub fn new(uid: &str, conn: &IpConnection) -> Result<Self, Error> {
        Ok(Self {
            device: DeviceHandle::new(uid, Self::DEVICE_IDENTIFIER, conn)?,
        })
    }

    pub fn uid(&self) -> &Uid {
        self.device.uid()
    }

    /// Write `text` at `line`, starting at column `position`.
    ///
    /// Text is converted to the display's character set and cut to 20
    /// columns; the device itself rejects out-of-range rows or columns.
    pub async fn write_line(&self, line: u8, position: u8, text: &str) -> Result<(), Error> {
        let mut payload = BytesMut::with_capacity(2 + COLUMNS);
        payload.put_u8(line);
        payload.put_u8(position);
        payload.put_slice(&to_ks0066u(text));
        self.device.call(FUNCTION_WRITE_LINE, &payload).await?;
        Ok(())
    }

    pub async fn clear_display(&self) -> Result<(), Error> {
        self.device.call(FUNCTION_CLEAR_DISPLAY, &[]).await?;
        Ok(())
    }

    pub async fn backlight_on(&self) -> Result<(), Error> {
        self.device.call(FUNCTION_BACKLIGHT_ON, &[]).await?;
        Ok(())
    }

    pub async fn backlight_off(&self) -> Result<(), Error> {
        self.device.call(FUNCTION_BACKLIGHT_OFF, &[]).await?;
        Ok(())
    }

    pub async fn is_backlight_on(&self) -> Result<bool, Error> {
        let body = self.device.call(FUNCTION_IS_BACKLIGHT_ON, &[]).await?;
        expect_len(&body, 1, "is_backlight_on")?;
        Ok(body[0] != 0)
    }
}

/// Convert text to the KS0066U ROM character set, NUL-padded to 20 bytes.
///
/// Printable ASCII maps to itself except `\` and `~`, which the ROM
/// lacks. A handful of Latin-1 characters have ROM equivalents; anything
/// else becomes a space.
pub fn to_ks0066u(text: &str) -> [u8; COLUMNS] {
    let mut out = [0u8; COLUMNS];
    for (slot, c) in out.iter_mut().zip(text.chars()) {
        *slot = match c {
            '\\' | '~' => b' ',
            ' '..='}' => u8::try_from(c).unwrap_or(b' '),
            '°' => 0xDF,
            'ä' => 0xE1,
            'ß' => 0xE2,
            'µ' => 0xE4,
            'ö' => 0xEF,
            'ü' => 0xF5,
            _ => b' ',
        };
    }
    out
}
