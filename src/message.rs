//! The message layer: a frame plus its decoded payload and validation.

use std::fmt;

use chrono::{DateTime, Utc};

use crate::address::{DeviceId, DeviceType};
use crate::clock::Clock;
use crate::code::{known, Code};
use crate::error::Error;
use crate::frame::Frame;
use crate::parsers::{self, MessageContext};
use crate::payload::Payload;
use crate::verb::Verb;

/// Command codes where a type mismatch between source and destination is
/// tolerated — the HVAC exception list.
const HVAC_EXCEPTION_CODES: &[u16] = &[0x31D9, 0x31DA, 0x31E0, 0x12A0];

/// A decoded, validated message: a [`Frame`] plus its parsed [`Payload`].
#[derive(Debug, Clone)]
pub struct Message {
    pub timestamp: DateTime<Utc>,
    pub rssi: u8,
    pub verb: Verb,
    pub seq_no: u16,
    pub src: DeviceId,
    pub addr2: DeviceId,
    pub dst: DeviceId,
    pub code: Code,
    pub raw_hex: String,
    pub payload: Payload,
}

/// Per-class permission table: which verbs a device of this class may use
/// with a given code. An unlisted code is allowed — the table is a
/// representative subset of each class's real role, not an exhaustive
/// enumeration of every code the corpus defines.
fn device_class_permits(device_type: DeviceType, code: Code, verb: Verb) -> bool {
    use DeviceType::*;
    use Verb::*;

    // Unknown or gateway/HGI sources are never rejected on permission
    // grounds ("Non-matching packets raise InvalidPacket except when the
    // source class is HGI or DEV (unknown)").
    let allowed: &[(Code, &[Verb])] = match device_type {
        Controller => &[
            (known::ZONE_NAME, &[I, RQ, RP, W]),
            (known::ZONE_CONFIG, &[I, RQ, RP, W]),
            (known::ZONE_ACTUATORS, &[RQ, RP]),
            (known::RELAY_DEMAND, &[I]),
            (known::SYSTEM_FAULT, &[I, RQ, RP]),
            (known::DHW_PARAMS, &[RQ, RP, W]),
            (known::DHW_MODE, &[RQ, RP, W]),
            (known::TPI_PARAMS, &[RQ, RP, W]),
            (known::TEMPERATURE, &[I]),
            (known::SETPOINT, &[I, RQ, RP, W]),
            (known::ZONE_MODE, &[I, RQ, RP, W]),
            (known::SYSTEM_MODE, &[I, RQ, RP, W]),
            (known::SYNC_DATETIME, &[I, RQ, RP, W]),
            (known::SYNC_CYCLE, &[I, RP]),
            (known::HEAT_DEMAND, &[I]),
            (known::BIND, &[I]),
            (known::DEVICE_INFO, &[RP]),
            (known::WINDOW_STATE, &[I]),
            (known::OUTDOOR_TEMPERATURE, &[I]),
            (known::OPENTHERM_MSG, &[RQ]),
        ],
        Trv => &[
            (known::TEMPERATURE, &[I]),
            (known::HEAT_DEMAND, &[I]),
            (known::WINDOW_STATE, &[I]),
            (known::DEVICE_BATTERY, &[I]),
            (known::BIND, &[I, W]),
            (known::ZONE_NAME, &[RQ]),
        ],
        DhwSensor => &[
            (known::DHW_TEMPERATURE, &[I]),
            (known::DHW_PARAMS, &[RQ]),
            (known::DEVICE_BATTERY, &[I]),
            (known::BIND, &[I]),
        ],
        RadiatorThermostat => &[
            (known::SETPOINT, &[RQ]),
            (known::ZONE_CONFIG, &[RQ]),
            (known::TEMPERATURE, &[I]),
            (known::DEVICE_BATTERY, &[I]),
            (known::BIND, &[I]),
        ],
        Relay => &[
            (known::RELAY_DEMAND, &[I, RP]),
            (known::ACTUATOR_STATE, &[I, RP]),
            (known::ACTUATOR_ENABLED, &[I, RP]),
            (known::DEVICE_BATTERY, &[I]),
            (known::BIND, &[I]),
        ],
        OpenThermBridge => &[
            (known::OPENTHERM_MSG, &[RQ, RP, W]),
            (known::ACTUATOR_ENABLED, &[I]),
            (known::DEVICE_INFO, &[RP]),
            (known::BIND, &[I]),
        ],
        UfhController => &[
            (known::UFH_SETPOINT, &[I, RQ, RP]),
            (known::ZONE_CONFIG, &[RQ, RP]),
            (known::HEAT_DEMAND, &[I]),
            (known::MIXVALVE_CONFIG, &[RQ, RP]),
            (known::ZONE_ACTUATORS, &[RP]),
            (known::BIND, &[I]),
        ],
        Null | Gateway | Other(_) => return true,
    };
    allowed
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, verbs)| verbs.contains(&verb))
        .unwrap_or(true)
}

impl Message {
    /// Decodes a validated [`Frame`] into a [`Message`], running the
    /// address-consistency and permission checks.
    pub fn from_frame(frame: Frame) -> Result<Message, Error> {
        let self_addressed = frame.src == frame.dst;
        let same_class = !frame.src.is_absent() && !frame.dst.is_absent() && frame.src.device_type() == frame.dst.device_type();

        if !self_addressed && same_class && !HVAC_EXCEPTION_CODES.contains(&frame.code.as_u16()) {
            return Err(Error::InvalidAddrSet {
                code: frame.code.to_string(),
                reason: format!("src and dst both {:?}", frame.src.device_type()),
            });
        }

        if !device_class_permits(frame.src.device_type(), frame.code, frame.verb) {
            return Err(Error::InvalidPacket {
                line: frame.raw_hex.clone(),
                reason: "invalid_structure",
            });
        }

        // For a request, the destination class must be able to serve it
        // (i.e. itself be permitted to send the matching RP).
        if frame.verb == Verb::RQ && !device_class_permits(frame.dst.device_type(), frame.code, Verb::RP) {
            return Err(Error::InvalidPacket {
                line: frame.raw_hex.clone(),
                reason: "invalid_structure",
            });
        }

        let ctx = MessageContext {
            verb: frame.verb,
            src_type: frame.src.device_type(),
            src_is_self_addressed: self_addressed,
        };
        let payload = parsers::parse(frame.code, &frame.raw_hex, ctx, frame.src)
            .unwrap_or_else(|_| Payload::map(Default::default()));

        Ok(Message {
            timestamp: frame.timestamp,
            rssi: frame.rssi,
            verb: frame.verb,
            seq_no: frame.seq_no,
            src: frame.src,
            addr2: frame.addr2,
            dst: frame.dst,
            code: frame.code,
            raw_hex: frame.raw_hex,
            payload,
        })
    }

    /// Parses a raw serial line straight through frame validation into a
    /// `Message`.
    pub fn from_line(line: &str, clock: &dyn Clock) -> Result<Message, Error> {
        let frame = Frame::from_line(line, clock)?;
        Message::from_frame(frame)
    }

    /// The one-line display form:
    /// `‹src› ‹dst› VV <code> <short_hex> <payload>`.
    pub fn fmt_short(&self) -> String {
        format!(
            "{} {} {:<2} {} {} {}",
            self.src, self.dst, self.verb, self.code, self.raw_hex, self.payload
        )
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.fmt_short())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::payload::Value;

    #[test]
    fn decodes_array_temperature_message() {
        let clock = SystemClock;
        let message = Message::from_line(
            "053  I 000 01:158182 --:------ 01:158182 30C9 006 0007D1010864",
            &clock,
        )
        .unwrap();
        let records = message.payload.as_array().unwrap();
        assert_eq!(records[0]["zone_idx"], Value::Str("00".to_owned()));
    }

    #[test]
    fn mismatched_length_is_rejected_before_message_decode() {
        let clock = SystemClock;
        let err = Message::from_line(
            "053  I 000 01:158182 --:------ 01:158182 30C9 010 000000000000000000",
            &clock,
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidPacket { reason: "mismatched_length", .. }));
    }

    #[test]
    fn display_form_includes_addresses_and_code() {
        let clock = SystemClock;
        let message = Message::from_line(
            "053  I 000 01:158182 --:------ 01:158182 30C9 006 0007D1010864",
            &clock,
        )
        .unwrap();
        let text = message.to_string();
        assert!(text.contains("01:158182"));
        assert!(text.contains("30C9"));
    }

    #[test]
    fn same_class_cross_talk_is_rejected() {
        let clock = SystemClock;
        let err = Message::from_line(
            "053  I 000 01:100000 --:------ 01:200000 0001 005 00FFFF0200",
            &clock,
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidAddrSet { .. }));
    }

    #[test]
    fn source_class_permission_rejects_disallowed_verb() {
        let clock = SystemClock;
        let err = Message::from_line("053  W 000 04:111111 --:------ --:------ 0004 002 0000", &clock).unwrap_err();
        assert!(matches!(err, Error::InvalidPacket { reason: "invalid_structure", .. }));
    }

    #[test]
    fn request_rejected_when_destination_class_cannot_serve_it() {
        let clock = SystemClock;
        let err = Message::from_line("053 RQ 000 18:000730 --:------ 13:000002 1060 001 00", &clock).unwrap_err();
        assert!(matches!(err, Error::InvalidPacket { reason: "invalid_structure", .. }));
    }
}
