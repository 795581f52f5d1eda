//! Device addresses: the `TT:NNNNNN` identifiers carried by every packet.

use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// The known device classes (the `TT` component of a [`DeviceId`]).
///
/// Unrecognised type ids still round-trip via [`DeviceType::Other`]; the
/// schema only needs to recognise the classes that appear in permission
/// tables and index resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceType {
    /// `01` — system controller.
    Controller,
    /// `02` — underfloor heating controller.
    UfhController,
    /// `04` — thermostatic radiator valve.
    Trv,
    /// `07` — DHW sensor (TRHA).
    DhwSensor,
    /// `10` — OpenTherm bridge.
    OpenThermBridge,
    /// `13` — relay / BDR91.
    Relay,
    /// `18` — USB radio gateway (HGI80-compatible).
    Gateway,
    /// `34` — radiator thermostat (wireless round thermostat).
    RadiatorThermostat,
    /// `63` — null / broadcast device class.
    Null,
    /// Any other two-digit class not named above.
    Other(u8),
}

impl DeviceType {
    /// Classifies a raw type id into a [`DeviceType`].
    pub fn from_id(type_id: u8) -> DeviceType {
        match type_id {
            1 => DeviceType::Controller,
            2 => DeviceType::UfhController,
            4 => DeviceType::Trv,
            7 => DeviceType::DhwSensor,
            10 => DeviceType::OpenThermBridge,
            13 => DeviceType::Relay,
            18 => DeviceType::Gateway,
            34 => DeviceType::RadiatorThermostat,
            63 => DeviceType::Null,
            other => DeviceType::Other(other),
        }
    }

    /// Returns the raw two-digit type id.
    pub fn id(self) -> u8 {
        match self {
            DeviceType::Controller => 1,
            DeviceType::UfhController => 2,
            DeviceType::Trv => 4,
            DeviceType::DhwSensor => 7,
            DeviceType::OpenThermBridge => 10,
            DeviceType::Relay => 13,
            DeviceType::Gateway => 18,
            DeviceType::RadiatorThermostat => 34,
            DeviceType::Null => 63,
            DeviceType::Other(id) => id,
        }
    }

    /// Whether this class is a zone-bearing controller-like source (used by
    /// the index resolver).
    pub fn is_controller_like(self) -> bool {
        matches!(
            self,
            DeviceType::Controller | DeviceType::UfhController | DeviceType::Gateway
        )
    }
}

/// A parsed `TT:NNNNNN` device address.
///
/// Stored as the decoded `(type, serial)` pair rather than kept as a
/// string — addresses are decoded once at the edge and callers format
/// with [`DeviceId`]'s `Display` impl rather than re-parsing text on
/// every access.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceId {
    type_id: u8,
    serial: u32,
}

/// The sentinel serial used by the absent address `--:------`.
const ABSENT_SERIAL: u32 = 0x3FFFF;

impl DeviceId {
    /// Constructs a `DeviceId` from its raw parts.
    ///
    /// `type_id` must fit in 6 bits (`0..=63`) and `serial` in 18 bits
    /// (`0..=262_143`); out-of-range values are masked, mirroring the
    /// original's 24-bit packed encoding.
    pub fn new(type_id: u8, serial: u32) -> DeviceId {
        DeviceId {
            type_id: type_id & 0x3F,
            serial: serial & ABSENT_SERIAL,
        }
    }

    /// The placeholder "no address" id, displayed as `--:------`.
    pub fn absent() -> DeviceId {
        DeviceId {
            type_id: 0x3F,
            serial: ABSENT_SERIAL,
        }
    }

    /// The null/broadcast id `63:262142`.
    pub fn null() -> DeviceId {
        DeviceId {
            type_id: 63,
            serial: 262_142,
        }
    }

    /// Whether this id is the `--:------` placeholder.
    pub fn is_absent(self) -> bool {
        self.type_id == 0x3F && self.serial == ABSENT_SERIAL
    }

    /// Whether this id is the `63:262142` null/broadcast address.
    pub fn is_null(self) -> bool {
        self.type_id == 63 && self.serial == 262_142
    }

    /// The device's class.
    pub fn device_type(self) -> DeviceType {
        DeviceType::from_id(self.type_id)
    }

    /// The raw two-digit type id.
    pub fn type_id(self) -> u8 {
        self.type_id
    }

    /// Decodes a `DeviceId` from the 24-bit big-endian integer packed into
    /// three hex-encoded payload bytes, as used by codes like `1FC9`,
    /// `000C` and `0418`.
    pub fn from_hex_bytes(bytes: [u8; 3]) -> DeviceId {
        let packed = ((bytes[0] as u32) << 16) | ((bytes[1] as u32) << 8) | bytes[2] as u32;
        DeviceId {
            type_id: ((packed >> 18) & 0x3F) as u8,
            serial: packed & ABSENT_SERIAL,
        }
    }

    /// Encodes this `DeviceId` back into its 24-bit big-endian byte triple.
    pub fn to_hex_bytes(self) -> [u8; 3] {
        let packed = ((self.type_id as u32) << 18) | self.serial;
        [(packed >> 16) as u8, (packed >> 8) as u8, packed as u8]
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.is_absent() {
            write!(f, "--:------")
        } else {
            write!(f, "{:02}:{:06}", self.type_id, self.serial)
        }
    }
}

impl fmt::Debug for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "DeviceId({})", self)
    }
}

impl FromStr for DeviceId {
    type Err = Error;

    fn from_str(s: &str) -> Result<DeviceId, Error> {
        if s == "--:------" {
            return Ok(DeviceId::absent());
        }

        let bad = || Error::InvalidPacket {
            line: s.to_owned(),
            reason: "missing_address",
        };

        if s.len() != 9 || s.as_bytes()[2] != b':' {
            return Err(bad());
        }

        let type_id: u8 = s[0..2].parse().map_err(|_| bad())?;
        let serial: u32 = s[3..9].parse().map_err(|_| bad())?;

        Ok(DeviceId::new(type_id, serial))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_display_and_from_str() {
        let id: DeviceId = "01:145038".parse().unwrap();
        assert_eq!(id.to_string(), "01:145038");
        assert_eq!(id.device_type(), DeviceType::Controller);
    }

    #[test]
    fn absent_round_trips() {
        let id: DeviceId = "--:------".parse().unwrap();
        assert!(id.is_absent());
        assert_eq!(id.to_string(), "--:------");
    }

    #[test]
    fn null_broadcast_is_recognised() {
        let id = DeviceId::null();
        assert!(id.is_null());
        assert_eq!(id.to_string(), "63:262142");
    }

    #[test]
    fn hex_byte_round_trip() {
        let id: DeviceId = "01:145038".parse().unwrap();
        let bytes = id.to_hex_bytes();
        assert_eq!(DeviceId::from_hex_bytes(bytes), id);
    }

    #[test]
    fn rejects_malformed_address() {
        assert!("01145038".parse::<DeviceId>().is_err());
        assert!("xx:145038".parse::<DeviceId>().is_err());
    }
}
