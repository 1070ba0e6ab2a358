//! TFP packet framing.
//!
//! Every packet starts with an 8-byte little-endian header:
//!
//! | offset | size | field                                              |
//! |--------|------|----------------------------------------------------|
//! | 0      | 4    | UID (0 = broadcast)                                |
//! | 4      | 1    | total length, header included                      |
//! | 5      | 1    | function ID                                        |
//! | 6      | 1    | sequence number (bits 4-7), response expected (bit 3) |
//! | 7      | 1    | error code (bits 6-7)                              |
//!
//! Callbacks are sent by brickd with sequence number 0.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::Error;

pub const HEADER_LEN: usize = 8;
/// Largest packet brickd accepts (header + 64 byte payload).
pub const MAX_PACKET_LEN: usize = 80;

pub const FUNCTION_ENUMERATE: u8 = 254;
pub const CALLBACK_ENUMERATE: u8 = 253;

/// Broadcast UID used for enumeration.
pub const BROADCAST_UID: u32 = 0;

const ENUMERATE_PAYLOAD_LEN: usize = 26;

// ── Header ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub uid: u32,
    pub length: u8,
    pub function_id: u8,
    pub sequence: u8,
    pub response_expected: bool,
    pub error_code: u8,
}

impl Header {
    /// Build a request header for a payload of `payload_len` bytes.
    pub fn request(
        uid: u32,
        function_id: u8,
        sequence: u8,
        response_expected: bool,
        payload_len: usize,
    ) -> Result<Self, Error> {
        let total = HEADER_LEN + payload_len;
        if total > MAX_PACKET_LEN {
            return Err(Error::PayloadTooLarge { len: payload_len });
        }
        let length = u8::try_from(total).map_err(|_| Error::PayloadTooLarge { len: payload_len })?;
        Ok(Self {
            uid,
            length,
            function_id,
            sequence: sequence & 0x0F,
            response_expected,
            error_code: 0,
        })
    }

    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_u32_le(self.uid);
        buf.put_u8(self.length);
        buf.put_u8(self.function_id);
        buf.put_u8((self.sequence << 4) | (u8::from(self.response_expected) << 3));
        buf.put_u8(self.error_code << 6);
    }

    /// Decode a header and validate its length field.
    pub fn decode(mut raw: &[u8]) -> Result<Self, Error> {
        if raw.len() < HEADER_LEN {
            return Err(Error::MalformedPacket(format!(
                "header needs {HEADER_LEN} bytes, got {}",
                raw.len()
            )));
        }
        let uid = raw.get_u32_le();
        let length = raw.get_u8();
        let function_id = raw.get_u8();
        let options = raw.get_u8();
        let flags = raw.get_u8();

        if usize::from(length) < HEADER_LEN || usize::from(length) > MAX_PACKET_LEN {
            return Err(Error::MalformedPacket(format!("invalid length {length}")));
        }

        Ok(Self {
            uid,
            length,
            function_id,
            sequence: options >> 4,
            response_expected: options & 0x08 != 0,
            error_code: flags >> 6,
        })
    }

    pub fn payload_len(&self) -> usize {
        usize::from(self.length).saturating_sub(HEADER_LEN)
    }

    /// Callbacks carry sequence number 0; responses echo the request's.
    pub fn is_callback(&self) -> bool {
        self.sequence == 0
    }
}

/// Encode a full packet (header followed by payload).
pub fn encode_packet(header: &Header, payload: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(usize::from(header.length));
    header.encode(&mut buf);
    buf.put_slice(payload);
    buf.freeze()
}

// ── Enumerate callback ───────────────────────────────────────────────

/// Why a device appears in an enumerate callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnumerationType {
    /// Answer to an explicit enumerate request.
    Available,
    /// Device was just plugged in or its brick was reset.
    Connected,
    /// Device went away.
    Disconnected,
    Unknown(u8),
}

impl From<u8> for EnumerationType {
    fn from(raw: u8) -> Self {
        match raw {
            0 => Self::Available,
            1 => Self::Connected,
            2 => Self::Disconnected,
            other => Self::Unknown(other),
        }
    }
}

impl From<EnumerationType> for u8 {
    fn from(kind: EnumerationType) -> Self {
        match kind {
            EnumerationType::Available => 0,
            EnumerationType::Connected => 1,
            EnumerationType::Disconnected => 2,
            EnumerationType::Unknown(raw) => raw,
        }
    }
}

/// Payload of an enumerate callback (function 253).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumerateCallback {
    pub uid: String,
    pub connected_uid: String,
    pub position: char,
    pub hardware_version: [u8; 3],
    pub firmware_version: [u8; 3],
    pub device_identifier: u16,
    pub enumeration_type: EnumerationType,
}

impl EnumerateCallback {
    pub fn decode(mut payload: &[u8]) -> Result<Self, Error> {
        if payload.len() < ENUMERATE_PAYLOAD_LEN {
            return Err(Error::MalformedPacket(format!(
                "enumerate payload needs {ENUMERATE_PAYLOAD_LEN} bytes, got {}",
                payload.len()
            )));
        }
        let uid = read_fixed_string(&mut payload, 8);
        let connected_uid = read_fixed_string(&mut payload, 8);
        let position = char::from(payload.get_u8());
        let mut hardware_version = [0u8; 3];
        payload.copy_to_slice(&mut hardware_version);
        let mut firmware_version = [0u8; 3];
        payload.copy_to_slice(&mut firmware_version);
        let device_identifier = payload.get_u16_le();
        let enumeration_type = EnumerationType::from(payload.get_u8());

        Ok(Self {
            uid,
            connected_uid,
            position,
            hardware_version,
            firmware_version,
            device_identifier,
            enumeration_type,
        })
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(ENUMERATE_PAYLOAD_LEN);
        write_fixed_string(&mut buf, &self.uid, 8);
        write_fixed_string(&mut buf, &self.connected_uid, 8);
        buf.put_u8(u8::try_from(self.position).unwrap_or(b'?'));
        buf.put_slice(&self.hardware_version);
        buf.put_slice(&self.firmware_version);
        buf.put_u16_le(self.device_identifier);
        buf.put_u8(self.enumeration_type.into());
        buf.freeze()
    }
}

/// Read a NUL-padded string of exactly `len` bytes.
fn read_fixed_string(buf: &mut &[u8], len: usize) -> String {
    let (field, rest) = buf.split_at(len);
    *buf = rest;
    let end = field.iter().position(|&b| b == 0).unwrap_or(len);
    field[..end].iter().map(|&b| char::from(b)).collect()
}

/// Write `text` into a NUL-padded field of exactly `len` bytes.
pub(crate) fn write_fixed_string(buf: &mut BytesMut, text: &str, len: usize) {
    let bytes = text.as_bytes();
    let take = bytes.len().min(len);
    buf.put_slice(&bytes[..take]);
    buf.put_bytes(0, len - take);
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn header_encodes_options_and_flags() {
        let header = Header::request(0x1234_5678, 3, 5, true, 2).expect("fits");
        let bytes = encode_packet(&header, &[0xAA, 0xBB]);
        assert_eq!(
            bytes.as_ref(),
            &[0x78, 0x56, 0x34, 0x12, 10, 3, 0x58, 0x00, 0xAA, 0xBB]
        );
    }

    #[test]
    fn header_decode_reads_error_code_and_sequence() {
        let raw = [0x01, 0x00, 0x00, 0x00, 8, 14, 0x78, 0x40];
        let header = Header::decode(&raw).expect("valid header");
        assert_eq!(header.uid, 1);
        assert_eq!(header.function_id, 14);
        assert_eq!(header.sequence, 7);
        assert!(header.response_expected);
        assert_eq!(header.error_code, 1);
        assert_eq!(header.payload_len(), 0);
        assert!(!header.is_callback());
    }

    #[test]
    fn header_decode_rejects_short_length() {
        let raw = [0, 0, 0, 0, 4, 1, 0x10, 0];
        assert!(matches!(Header::decode(&raw), Err(Error::MalformedPacket(_))));
    }

    #[test]
    fn request_rejects_oversized_payload() {
        assert!(matches!(
            Header::request(1, 1, 1, true, 73),
            Err(Error::PayloadTooLarge { len: 73 })
        ));
    }

    #[test]
    fn enumerate_callback_decodes_all_fields() {
        let mut payload = BytesMut::new();
        payload.put_slice(b"oRX\0\0\0\0\0");
        payload.put_slice(b"6Dd9jq\0\0");
        payload.put_u8(b'a');
        payload.put_slice(&[1, 2, 0]);
        payload.put_slice(&[2, 0, 3]);
        payload.put_u16_le(212);
        payload.put_u8(1);

        let cb = EnumerateCallback::decode(&payload).expect("valid payload");
        assert_eq!(cb.uid, "oRX");
        assert_eq!(cb.connected_uid, "6Dd9jq");
        assert_eq!(cb.position, 'a');
        assert_eq!(cb.hardware_version, [1, 2, 0]);
        assert_eq!(cb.firmware_version, [2, 0, 3]);
        assert_eq!(cb.device_identifier, 212);
        assert_eq!(cb.enumeration_type, EnumerationType::Connected);
    }

    #[test]
    fn enumerate_callback_rejects_truncated_payload() {
        assert!(EnumerateCallback::decode(&[0u8; 10]).is_err());
    }

    #[test]
    fn enumerate_callback_encode_matches_decode() {
        let cb = EnumerateCallback {
            uid: "bAr".into(),
            connected_uid: "6Dd9jq".into(),
            position: 'c',
            hardware_version: [1, 0, 0],
            firmware_version: [2, 0, 1],
            device_identifier: 221,
            enumeration_type: EnumerationType::Available,
        };
        let encoded = cb.encode();
        assert_eq!(encoded.len(), ENUMERATE_PAYLOAD_LEN);
        assert_eq!(EnumerateCallback::decode(&encoded).expect("decodes"), cb);
    }
}
