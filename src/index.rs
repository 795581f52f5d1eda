//! The index resolver: classifies a payload's leading byte as a zone
//! index, domain id, parent idx, ufh idx, vent id, or log idx.
//!
//! Ported rule-for-rule from `evohome/parsers.py::_idx`.

use crate::address::DeviceType;
use crate::code::{known, Code};

/// Domain ids share the zone-index byte slot.
const DOMAIN_IDS: &[&str] = &["F8", "F9", "FA", "FB", "FC", "FD", "FE", "FF"];

/// Ventilation codes, whose index byte is a vent id restricted to `{00,21}`.
fn is_ventilation_code(code: Code) -> bool {
    matches!(code.as_u16(), 0x31D9 | 0x31DA | 0x31E0)
}

/// The resolved index kind for a payload's leading byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedIndex {
    /// `F8..FF`-style domain id.
    DomainId(String),
    /// A controller-broadcast zone index (`00..0B`, occasionally higher).
    ZoneIdx(String),
    /// A subordinate device (e.g. TRV) reporting which zone it belongs to.
    ParentIdx(String),
    /// `0418`'s fault-log slot, independent of the byte's numeric meaning.
    LogIdx(String),
    /// `22C9`'s underfloor-heating channel index, `< 8`.
    UfhIdx(String),
    /// A ventilation unit id, `{00, 21}` only.
    VentId(String),
    /// No index applies to this code/byte combination.
    None,
}

/// Resolves the index carried by `lead_byte` (two uppercase hex chars) for
/// a message of the given `code` originating from a device of `src_type`.
///
/// `src_is_self_addressed` is true when the message's source and
/// destination are the same controller (a self-announce broadcast), which
/// the original treats identically to a controller source for this
/// purpose (the ambiguity rule for self-directed broadcasts).
pub fn resolve(code: Code, lead_byte: &str, src_type: DeviceType, src_is_self_addressed: bool) -> ResolvedIndex {
    if code.as_u16() == known::SYSTEM_FAULT.as_u16() {
        return ResolvedIndex::LogIdx(lead_byte.to_owned());
    }

    if code.never_has_idx() {
        return ResolvedIndex::None;
    }

    if DOMAIN_IDS.contains(&lead_byte) {
        return ResolvedIndex::DomainId(lead_byte.to_owned());
    }

    if code.as_u16() == known::UFH_SETPOINT.as_u16() && src_type == DeviceType::UfhController {
        if let Ok(n) = u8::from_str_radix(lead_byte, 16) {
            if n < 8 {
                return ResolvedIndex::UfhIdx(lead_byte.to_owned());
            }
        }
        return ResolvedIndex::None;
    }

    if code.has_zone_idx_bias() {
        if u8::from_str_radix(lead_byte, 16).is_ok() {
            // Out-of-range zones (>= 12) are still reported (see the
            // Hometronic open question); the caller is responsible for the
            // `saw_oversized_zone_idx` warning/counter.
            let is_controller_like = src_type.is_controller_like() || src_is_self_addressed;
            return if is_controller_like {
                ResolvedIndex::ZoneIdx(lead_byte.to_owned())
            } else {
                ResolvedIndex::ParentIdx(lead_byte.to_owned())
            };
        }
        return ResolvedIndex::None;
    }

    if is_ventilation_code(code) {
        return match lead_byte {
            "00" | "21" => ResolvedIndex::VentId(lead_byte.to_owned()),
            _ => ResolvedIndex::None,
        };
    }

    ResolvedIndex::None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_id_takes_priority() {
        let resolved = resolve(known::HEAT_DEMAND, "F9", DeviceType::Controller, false);
        assert_eq!(resolved, ResolvedIndex::DomainId("F9".to_owned()));
    }

    #[test]
    fn system_fault_is_always_log_idx() {
        let resolved = resolve(known::SYSTEM_FAULT, "02", DeviceType::Trv, false);
        assert_eq!(resolved, ResolvedIndex::LogIdx("02".to_owned()));
    }

    #[test]
    fn controller_source_yields_zone_idx() {
        let resolved = resolve(known::SETPOINT, "03", DeviceType::Controller, false);
        assert_eq!(resolved, ResolvedIndex::ZoneIdx("03".to_owned()));
    }

    #[test]
    fn trv_source_yields_parent_idx() {
        let resolved = resolve(known::SETPOINT, "03", DeviceType::Trv, false);
        assert_eq!(resolved, ResolvedIndex::ParentIdx("03".to_owned()));
    }

    #[test]
    fn system_mode_never_has_idx() {
        let resolved = resolve(known::SYSTEM_MODE, "00", DeviceType::Controller, false);
        assert_eq!(resolved, ResolvedIndex::None);
    }

    #[test]
    fn ventilation_id_limited_to_00_or_21() {
        assert_eq!(
            resolve(known::VENT_STATE, "21", DeviceType::Other(39), false),
            ResolvedIndex::VentId("21".to_owned())
        );
        assert_eq!(
            resolve(known::VENT_STATE, "05", DeviceType::Other(39), false),
            ResolvedIndex::None
        );
    }

    #[test]
    fn ufh_idx_requires_ufh_source_and_is_bounded() {
        assert_eq!(
            resolve(known::UFH_SETPOINT, "03", DeviceType::UfhController, false),
            ResolvedIndex::UfhIdx("03".to_owned())
        );
        assert_eq!(
            resolve(known::UFH_SETPOINT, "0F", DeviceType::UfhController, false),
            ResolvedIndex::None
        );
    }
}
