// Typed handles for the bricklets the weather station talks to.
//
// Each handle is a UID plus a clone of the shared connection. Handles
// register themselves with the connection on construction so callbacks
// addressed to them can be decoded by the reader task.

pub mod ambient_light;
pub mod barometer;
pub mod humidity;
pub mod lcd_20x4;

use bytes::Bytes;

use crate::connection::IpConnection;
use crate::error::Error;
use crate::uid::Uid;

pub use ambient_light::AmbientLight;
pub use barometer::Barometer;
pub use humidity::Humidity;
pub use lcd_20x4::Lcd20x4;

/// Device identifiers reported in enumerate callbacks.
pub mod device_identifier {
    pub const AMBIENT_LIGHT: u16 = 21;
    pub const HUMIDITY: u16 = 27;
    pub const LCD_20X4: u16 = 212;
    pub const BAROMETER: u16 = 221;
}

/// State shared by every bricklet handle.
#[derive(Clone)]
pub(crate) struct DeviceHandle {
    uid: Uid,
    conn: IpConnection,
}

impl DeviceHandle {
    pub(crate) fn new(uid: &str, identifier: u16, conn: &IpConnection) -> Result<Self, Error> {
        let uid = Uid::parse(uid)?;
        conn.register_device(&uid, identifier);
        Ok(Self {
            uid,
            conn: conn.clone(),
        })
    }

    pub(crate) fn uid(&self) -> &Uid {
        &self.uid
    }

    pub(crate) async fn call(&self, function_id: u8, payload: &[u8]) -> Result<Bytes, Error> {
        self.conn.request(&self.uid, function_id, payload).await
    }
}

/// Fail with [`Error::MalformedPacket`] if a response is shorter than expected.
pub(crate) fn expect_len(body: &Bytes, len: usize, what: &str) -> Result<(), Error> {
    if body.len() < len {
        return Err(Error::MalformedPacket(format!(
            "{what} response needs {len} bytes, got {}",
            body.len()
        )));
    }
    Ok(())
}
