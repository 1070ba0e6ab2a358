// Bricklet UIDs are printed as base58 strings but travel on the wire as
// a little-endian u32. UIDs that decode to more than 32 bits are folded
// the same way brickd does.

use std::fmt;

use crate::error::Error;

const BASE58_ALPHABET: &[u8; 58] =
    b"123456789abcdefghijkmnopqrstuvwxyzABCDEFGHJKLMNPQRSTUVWXYZ";

/// A device UID: the printable base58 form plus its 32-bit wire value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Uid {
    text: String,
    wire: u32,
}

impl Uid {
    /// Parse a base58 UID string as reported by enumeration.
    pub fn parse(text: &str) -> Result<Self, Error> {
        let wide = base58_decode(text).ok_or_else(|| Error::InvalidUid(text.to_owned()))?;
        let wire = match u32::try_from(wide) {
            Ok(narrow) => narrow,
            Err(_) => fold_uid64(wide),
        };
        if wire == 0 {
            return Err(Error::InvalidUid(text.to_owned()));
        }
        Ok(Self {
            text: text.to_owned(),
            wire,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// The value placed in the packet header.
    pub fn wire(&self) -> u32 {
        self.wire
    }
}

impl fmt::Display for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Decode a base58 string. Returns `None` on an empty string, a character
/// outside the alphabet, or overflow past 64 bits.
fn base58_decode(text: &str) -> Option<u64> {
    if text.is_empty() {
        return None;
    }
    text.bytes().try_fold(0u64, |acc, byte| {
        let digit = BASE58_ALPHABET.iter().position(|&c| c == byte)?;
        acc.checked_mul(58)?.checked_add(u64::try_from(digit).ok()?)
    })
}

/// Fold a 64-bit UID into the 32-bit form used in packet headers.
fn fold_uid64(uid: u64) -> u32 {
    let low = uid & 0xFFFF_FFFF;
    let high = (uid >> 32) & 0xFFFF_FFFF;

    let mut folded = low & 0x0000_0FFF;
    folded |= (low & 0x0F00_0000) >> 12;
    folded |= (high & 0x0000_003F) << 16;
    folded |= (high & 0x000F_0000) << 6;
    folded |= (high & 0x3F00_0000) << 2;

    // Every contributing bit lands below bit 32.
    u32::try_from(folded & 0xFFFF_FFFF).unwrap_or_default()
}
