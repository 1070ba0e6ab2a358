// Barometer bricklet. The station reads the chip temperature (1/100 °C).

use bytes::Buf;

use super::{DeviceHandle, device_identifier, expect_len};
use crate::connection::IpConnection;
use crate::error::Error;
use crate::uid::Uid;

pub const FUNCTION_GET_CHIP_TEMPERATURE: u8 = 14;

#[derive(Clone)]
pub struct Barometer {
    device: DeviceHandle,
}

impl Barometer {
    pub const DEVICE_IDENTIFIER: u16 = device_identifier::BAROMETER;

    pub fn new(uid: &str, conn: &IpConnection) -> Result<Self, Error> {
        Ok(Self {
            device: DeviceHandle::new(uid, Self::DEVICE_IDENTIFIER, conn)?,
        })
    }

    pub fn uid(&self) -> &Uid {
        self.device.uid()
    }

    /// Temperature of the sensor chip in 1/100 °C.
    pub async fn chip_temperature(&self) -> Result<i16, Error> {
        let body = self.device.call(FUNCTION_GET_CHIP_TEMPERATURE, &[]).await?;
        expect_len(&body, 2, "get_chip_temperature")?;
        Ok((&body[..]).get_i16_le())
    }
}
