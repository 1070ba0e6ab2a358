// Humidity bricklet. Relative humidity is reported in 1/10 %RH.

use bytes::Buf;

use super::{DeviceHandle, device_identifier, expect_len};
use crate::connection::IpConnection;
use crate::error::Error;
use crate::uid::Uid;

pub const FUNCTION_GET_HUMIDITY: u8 = 1;

#[derive(Clone)]
pub struct Humidity {
    device: DeviceHandle,
}

impl Humidity {
    pub const DEVICE_IDENTIFIER: u16 = device_identifier::HUMIDITY;

    pub fn new(uid: &str, conn: &IpConnection) -> Result<Self, Error> {
        Ok(Self {
            device: DeviceHandle::new(uid, Self::DEVICE_IDENTIFIER, conn)?,
        })
    }

    pub fn uid(&self) -> &Uid {
        self.device.uid()
    }

    pub async fn humidity(&self) -> Result<u16, Error> {
        let body = self.device.call(FUNCTION_GET_HUMIDITY, &[]).await?;
        expect_len(&body, 2, "get_humidity")?;
        Ok((&body[..]).get_u16_le())
    }
}
