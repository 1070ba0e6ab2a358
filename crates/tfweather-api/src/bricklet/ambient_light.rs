// Ambient Light bricklet. Illuminance is reported in 1/10 lux.

use std::time::Duration;

use super::{DeviceHandle, device_identifier};
use crate::connection::IpConnection;
use crate::error::Error;
use crate::uid::Uid;

pub const FUNCTION_SET_ILLUMINANCE_CALLBACK_PERIOD: u8 = 2;
pub const CALLBACK_ILLUMINANCE: u8 = 13;

#[derive(Clone)]
pub struct AmbientLight {
    device: DeviceHandle,
}

impl AmbientLight {
    pub const DEVICE_IDENTIFIER: u16 = device_identifier::AMBIENT_LIGHT;

    pub fn new(uid: &str, conn: &IpConnection) -> Result<Self, Error> {
        Ok(Self {
            device: DeviceHandle::new(uid, Self::DEVICE_IDENTIFIER, conn)?,
        })
    }

    pub fn uid(&self) -> &Uid {
        self.device.uid()
    }

    /// Push [`Event::Illuminance`](crate::Event::Illuminance) every
    /// `period` while the value changes. A zero period turns the push off.
    pub async fn set_illuminance_callback_period(&self, period: Duration) -> Result<(), Error> {
        let millis = u32::try_from(period.as_millis()).unwrap_or(u32::MAX);
        self.device
            .call(FUNCTION_SET_ILLUMINANCE_CALLBACK_PERIOD, &millis.to_le_bytes())
            .await?;
        Ok(())
    }
}
