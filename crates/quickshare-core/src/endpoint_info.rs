//! EndpointInfo codec (§4.3) — the mDNS TXT "n" record payload.
//!
//! Byte layout:
//!   byte 0:      bits 7..5 = version, bit 4 = hidden (1 = not visible),
//!                bits 3..1 = device type, bit 0 reserved
//!   bytes 1..17: 16 random bytes
//!   byte 17:     device name length
//!   bytes 18..:  UTF-8 device name

use thiserror::Error;

use crate::crypto::random_bytes;

/// A device's advertised identity, as packed into the mDNS TXT "n" record.
///
/// `device_type` is kept as an opaque 3-bit number (§9 Design Notes —
/// the taxonomy beyond "3 = laptop/phone" is undocumented upstream).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointInfo {
    pub version: u8,
    pub visible: bool,
    pub device_type: u8,
    pub random: [u8; 16],
    pub device_name: String,
}

impl EndpointInfo {
    /// Build a fresh record for local advertisement, with new random bytes.
    pub fn new(version: u8, visible: bool, device_type: u8, device_name: impl Into<String>) -> Self {
        let mut random = [0u8; 16];
        random.copy_from_slice(&random_bytes(16));
        Self {
            version: version & 0b111,
            visible,
            device_type: device_type & 0b111,
            random,
            device_name: device_name.into(),
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, EndpointInfoError> {
        let name_bytes = self.device_name.as_bytes();
        if name_bytes.len() > 255 {
            return Err(EndpointInfoError::NameTooLong(name_bytes.len()));
        }

        let mut out = Vec::with_capacity(18 + name_bytes.len());
        let hidden_bit = if self.visible { 0 } else { 0b0001_0000 };
        let byte0 = ((self.version & 0b111) << 5) | hidden_bit | ((self.device_type & 0b111) << 1);
        out.push(byte0);
        out.extend_from_slice(&self.random);
        out.push(name_bytes.len() as u8);
        out.extend_from_slice(name_bytes);
        Ok(out)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, EndpointInfoError> {
        if bytes.len() < 18 {
            return Err(EndpointInfoError::Truncated);
        }

        let byte0 = bytes[0];
        let version = (byte0 & 0b1110_0000) >> 5;
        let visible = byte0 & 0b0001_0000 == 0;
        let device_type = (byte0 & 0b0000_1110) >> 1;

        let mut random = [0u8; 16];
        random.copy_from_slice(&bytes[1..17]);

        let name_len = bytes[17] as usize;
        let name_bytes = bytes.get(18..18 + name_len).ok_or(EndpointInfoError::Truncated)?;
        let device_name = String::from_utf8(name_bytes.to_vec())
            .map_err(|_| EndpointInfoError::InvalidName)?;

        Ok(Self {
            version,
            visible,
            device_type,
            random,
            device_name,
        })
    }
}

#[derive(Debug, Error)]
pub enum EndpointInfoError {
    #[error("endpoint info is shorter than the minimum 18-byte header")]
    Truncated,

    #[error("device name is not valid UTF-8")]
    InvalidName,

    #[error("device name of {0} bytes exceeds the 255-byte length field")]
    NameTooLong(usize),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_visible_endpoint() {
        let info = EndpointInfo::new(1, true, 3, "My Laptop");
        let bytes = info.to_bytes().unwrap();
        let decoded = EndpointInfo::from_bytes(&bytes).unwrap();
        assert_eq!(info, decoded);
    }

    #[test]
    fn round_trips_a_hidden_endpoint() {
        let info = EndpointInfo::new(1, false, 1, "Hidden Phone");
        let bytes = info.to_bytes().unwrap();
        let decoded = EndpointInfo::from_bytes(&bytes).unwrap();
        assert!(!decoded.visible);
        assert_eq!(info, decoded);
    }

    #[test]
    fn round_trips_empty_name() {
        let info = EndpointInfo::new(1, true, 0, "");
        let bytes = info.to_bytes().unwrap();
        let decoded = EndpointInfo::from_bytes(&bytes).unwrap();
        assert_eq!(decoded.device_name, "");
    }

    #[test]
    fn visible_bit_is_inverted_hidden_flag() {
        let visible = EndpointInfo::new(0, true, 0, "a").to_bytes().unwrap();
        let hidden = EndpointInfo::new(0, false, 0, "a").to_bytes().unwrap();
        assert_eq!(visible[0] & 0b0001_0000, 0);
        assert_eq!(hidden[0] & 0b0001_0000, 0b0001_0000);
    }

    #[test]
    fn version_and_device_type_pack_into_expected_bits() {
        let info = EndpointInfo::new(0b101, true, 0b110, "x");
        let bytes = info.to_bytes().unwrap();
        assert_eq!((bytes[0] & 0b1110_0000) >> 5, 0b101);
        assert_eq!((bytes[0] & 0b0000_1110) >> 1, 0b110);
    }

    #[test]
    fn truncated_input_is_rejected() {
        assert!(matches!(
            EndpointInfo::from_bytes(&[0u8; 10]),
            Err(EndpointInfoError::Truncated)
        ));
    }

    #[test]
    fn name_length_byte_longer_than_remaining_input_is_rejected() {
        let mut bytes = vec![0u8; 18];
        bytes[17] = 5; // claims 5 name bytes but none follow
        assert!(matches!(
            EndpointInfo::from_bytes(&bytes),
            Err(EndpointInfoError::Truncated)
        ));
    }

    #[test]
    fn max_length_name_round_trips() {
        let name = "x".repeat(255);
        let info = EndpointInfo::new(1, true, 3, name.clone());
        let bytes = info.to_bytes().unwrap();
        assert_eq!(bytes.len(), 18 + 255);
        let decoded = EndpointInfo::from_bytes(&bytes).unwrap();
        assert_eq!(decoded.device_name, name);
    }
}
