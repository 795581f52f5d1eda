//! Per-code payload parsers, the verb prefilter, and the dispatcher.
//!
//! Ported from `evohome/parsers.py`'s `parser_<code>` functions and the
//! `parser_decorator` verb prefilter. Each parser is a pure function of
//! the payload hex and a little message context; the dispatcher selects
//! one by [`Code`], applying the verb prefilter first.

use crate::address::{DeviceId, DeviceType};
use crate::code::{known, Code};
use crate::error::Error;
use crate::field;
use crate::index::{self, ResolvedIndex};
use crate::opentherm;
use crate::payload::{Fields, Payload, Value};
use crate::verb::Verb;

/// Context a parser needs beyond the raw payload bytes.
#[derive(Debug, Clone, Copy)]
pub struct MessageContext {
    pub verb: Verb,
    pub src_type: DeviceType,
    pub src_is_self_addressed: bool,
}

fn bad(code: Code, reason: impl Into<String>) -> Error {
    Error::InvalidPayload {
        code: code.to_string(),
        reason: reason.into(),
    }
}

fn byte_str(hex: &str, byte_idx: usize) -> &str {
    &hex[byte_idx * 2..byte_idx * 2 + 2]
}

fn slice_str(hex: &str, from_byte: usize, to_byte: usize) -> &str {
    &hex[from_byte * 2..to_byte * 2]
}

fn bytes_len(hex: &str) -> usize {
    hex.len() / 2
}

fn idx_field_name(resolved: &ResolvedIndex) -> Option<(&'static str, String)> {
    match resolved {
        ResolvedIndex::DomainId(v) => Some(("domain_id", v.clone())),
        ResolvedIndex::ZoneIdx(v) => Some(("zone_idx", v.clone())),
        ResolvedIndex::ParentIdx(v) => Some(("parent_idx", v.clone())),
        ResolvedIndex::LogIdx(v) => Some(("log_idx", v.clone())),
        ResolvedIndex::UfhIdx(v) => Some(("ufh_idx", v.clone())),
        ResolvedIndex::VentId(v) => Some(("vent_id", v.clone())),
        ResolvedIndex::None => None,
    }
}

fn insert_idx(fields: &mut Fields, code: Code, hex: &str, ctx: MessageContext) {
    if bytes_len(hex) == 0 {
        return;
    }
    let resolved = index::resolve(code, byte_str(hex, 0), ctx.src_type, ctx.src_is_self_addressed);
    if let Some((name, value)) = idx_field_name(&resolved) {
        fields.insert(name.to_owned(), Value::Str(value));
    }
}

/// Short-circuit form for `RQ`-verb messages that carry only an index: the
/// dispatcher does not invoke the real parser.
fn rq_index_only(code: Code, hex: &str, ctx: MessageContext) -> Payload {
    let mut fields = Fields::new();
    insert_idx(&mut fields, code, hex, ctx);
    Payload::map(fields)
}

// ---- 0001 rf_unknown --------------------------------------------------

fn parse_0001(hex: &str) -> Result<Payload, Error> {
    if bytes_len(hex) != 5 {
        return Err(bad(known::RF_UNKNOWN, "expected 5 bytes"));
    }
    let mut fields = Fields::new();
    fields.insert("idx".to_owned(), Value::Str(byte_str(hex, 0).to_owned()));
    fields.insert("unknown_1".to_owned(), Value::Str(slice_str(hex, 1, 5).to_owned()));
    Ok(Payload::map(fields))
}

// ---- 0004 zone_name -----------------------------------------------------

fn parse_0004(hex: &str) -> Result<Payload, Error> {
    if bytes_len(hex) != 22 {
        return Err(bad(known::ZONE_NAME, "expected 22 bytes"));
    }
    let mut fields = Fields::new();
    fields.insert("zone_idx".to_owned(), Value::Str(byte_str(hex, 0).to_owned()));
    fields.insert("name".to_owned(), field::decode_str(slice_str(hex, 2, 22))?.into());
    Ok(Payload::map(fields))
}

// ---- 0008 relay_demand --------------------------------------------------

fn parse_0008(hex: &str) -> Result<Payload, Error> {
    if bytes_len(hex) != 2 {
        return Err(bad(known::RELAY_DEMAND, "expected 2 bytes"));
    }
    let mut fields = Fields::new();
    fields.insert("idx".to_owned(), Value::Str(byte_str(hex, 0).to_owned()));
    fields.insert(
        "relay_demand".to_owned(),
        field::decode_percent(byte_str(hex, 1))?.into(),
    );
    Ok(Payload::map(fields))
}

// ---- 0009 relay_failsafe (array, 3-byte stride) -------------------------

fn parse_0009(hex: &str) -> Result<Payload, Error> {
    let len = bytes_len(hex);
    if len == 0 || len % 3 != 0 {
        return Err(bad(known::RELAY_FAILSAFE, "expected a multiple of 3 bytes"));
    }
    let mut records = Vec::new();
    for i in (0..len).step_by(3) {
        let mut fields = Fields::new();
        fields.insert("domain_id".to_owned(), Value::Str(byte_str(hex, i).to_owned()));
        fields.insert("failsafe_enabled".to_owned(), field::decode_bool(byte_str(hex, i + 1))?.into());
        records.push(fields);
    }
    if records.len() == 1 {
        Ok(Payload::map(records.remove(0)))
    } else {
        Ok(Payload::Array(records))
    }
}

// ---- 000A zone_config (array, 6-byte stride) ----------------------------

fn parse_000a(hex: &str) -> Result<Payload, Error> {
    let len = bytes_len(hex);
    if len == 0 || len % 6 != 0 {
        return Err(bad(known::ZONE_CONFIG, "expected a multiple of 6 bytes"));
    }
    let mut records = Vec::new();
    for i in (0..len).step_by(6) {
        let bitmap = u8::from_str_radix(byte_str(hex, i + 1), 16).map_err(|_| bad(known::ZONE_CONFIG, "bad bitmap byte"))?;
        let mut fields = Fields::new();
        fields.insert("zone_idx".to_owned(), Value::Str(byte_str(hex, i).to_owned()));
        fields.insert("local_override".to_owned(), Value::Bool(bitmap & 0b0001 == 0));
        fields.insert("openwindow_function".to_owned(), Value::Bool(bitmap & 0b0010 == 0));
        fields.insert("multiroom_mode".to_owned(), Value::Bool(bitmap & 0b1_0000 == 0));
        fields.insert("min_temp".to_owned(), temp_field(slice_str(hex, i + 2, i + 4))?);
        fields.insert("max_temp".to_owned(), temp_field(slice_str(hex, i + 4, i + 6))?);
        records.push(fields);
    }
    if records.len() == 1 {
        Ok(Payload::map(records.remove(0)))
    } else {
        Ok(Payload::Array(records))
    }
}

fn temp_field(hex: &str) -> Result<Value, Error> {
    Ok(match field::decode_temp(hex)? {
        field::Temperature::Value(v) => Value::Float(v),
        field::Temperature::Disabled => Value::Str("disabled".to_owned()),
        field::Temperature::Absent => Value::Null,
    })
}

// ---- 000C zone_actuators -------------------------------------------------

fn parse_000c(hex: &str) -> Result<Payload, Error> {
    let len = bytes_len(hex);
    if len < 4 || (len - 4) % 3 != 0 {
        return Err(bad(known::ZONE_ACTUATORS, "malformed actuator list"));
    }
    let mut fields = Fields::new();
    fields.insert("zone_idx".to_owned(), Value::Str(byte_str(hex, 0).to_owned()));
    fields.insert("device_class".to_owned(), Value::Str(byte_str(hex, 1).to_owned()));
    let mut devices = Vec::new();
    for i in (4..len).step_by(3) {
        let raw = hex::decode(slice_str(hex, i, i + 3)).map_err(|e| bad(known::ZONE_ACTUATORS, e.to_string()))?;
        let id = DeviceId::from_hex_bytes([raw[0], raw[1], raw[2]]);
        if !id.is_absent() {
            devices.push(Value::Str(id.to_string()));
        }
    }
    fields.insert("actuators".to_owned(), Value::List(devices));
    Ok(Payload::map(fields))
}

// ---- 0016 rf_check --------------------------------------------------------

fn parse_0016(hex: &str) -> Result<Payload, Error> {
    if bytes_len(hex) != 2 {
        return Err(bad(known::RF_CHECK, "expected 2 bytes"));
    }
    let rf_value = u32::from_str_radix(byte_str(hex, 1), 16).map_err(|_| bad(known::RF_CHECK, "bad rf value"))?;
    let mut fields = Fields::new();
    fields.insert("idx".to_owned(), Value::Str(byte_str(hex, 0).to_owned()));
    fields.insert("rf_strength".to_owned(), Value::Int(((rf_value / 5) + 1).min(5) as i64));
    Ok(Payload::map(fields))
}

// ---- 0100 language ---------------------------------------------------------

fn parse_0100(hex: &str) -> Result<Payload, Error> {
    if bytes_len(hex) != 5 {
        return Err(bad(Code::from_u16(0x0100), "expected 5 bytes"));
    }
    let mut fields = Fields::new();
    fields.insert("language".to_owned(), field::decode_str(slice_str(hex, 1, 3))?.into());
    Ok(Payload::map(fields))
}

// ---- 0404 schedule_fragment --------------------------------------------

fn parse_0404(hex: &str) -> Result<Payload, Error> {
    let len = bytes_len(hex);
    if len < 7 {
        return Err(bad(known::SCHEDULE_FRAGMENT, "expected at least 7 bytes"));
    }
    let mut fields = Fields::new();
    fields.insert("zone_idx".to_owned(), Value::Str(byte_str(hex, 0).to_owned()));
    fields.insert(
        "frag_index".to_owned(),
        Value::Int(u8::from_str_radix(byte_str(hex, 4), 16).map_err(|_| bad(known::SCHEDULE_FRAGMENT, "bad frag_index"))? as i64),
    );
    fields.insert(
        "frag_total".to_owned(),
        Value::Int(u8::from_str_radix(byte_str(hex, 5), 16).map_err(|_| bad(known::SCHEDULE_FRAGMENT, "bad frag_total"))? as i64),
    );
    fields.insert("fragment".to_owned(), Value::Str(slice_str(hex, 7, len).to_owned()));
    Ok(Payload::map(fields))
}

// ---- 0418 system_fault ----------------------------------------------------

fn parse_0418(hex: &str) -> Result<Payload, Error> {
    if bytes_len(hex) != 22 {
        return Err(bad(known::SYSTEM_FAULT, "expected 22 bytes"));
    }
    if slice_str(hex, 0, 22) == "000000B0000000000000000000007FFFFF7000" {
        return Ok(Payload::map(Fields::new()));
    }
    let log_idx = byte_str(hex, 1);
    let fault_state = u8::from_str_radix(byte_str(hex, 2), 16).map_err(|_| bad(known::SYSTEM_FAULT, "bad fault_state"))?;
    let fault_type = u8::from_str_radix(byte_str(hex, 3), 16).map_err(|_| bad(known::SYSTEM_FAULT, "bad fault_type"))?;
    let device_class = u8::from_str_radix(byte_str(hex, 6), 16).map_err(|_| bad(known::SYSTEM_FAULT, "bad device_class"))?;
    let mut fields = Fields::new();
    fields.insert("log_idx".to_owned(), Value::Str(log_idx.to_owned()));
    fields.insert(
        "fault_state".to_owned(),
        Value::Str(format!("{:?}", opentherm::FaultState::from_byte(fault_state))),
    );
    fields.insert(
        "fault_type".to_owned(),
        Value::Str(format!("{:?}", opentherm::FaultType::from_byte(fault_type))),
    );
    fields.insert(
        "device_class".to_owned(),
        Value::Str(format!("{:?}", opentherm::FaultDeviceClass::from_byte(device_class))),
    );
    fields.insert("timestamp".to_owned(), field::decode_datetime(slice_str(hex, 8, 15))?.into());
    let raw = hex::decode(slice_str(hex, 15, 18)).map_err(|e| bad(known::SYSTEM_FAULT, e.to_string()))?;
    let device_id = DeviceId::from_hex_bytes([raw[0], raw[1], raw[2]]);
    if !device_id.is_absent() {
        fields.insert("device_id".to_owned(), Value::Str(device_id.to_string()));
    }
    Ok(Payload::map(fields))
}

// ---- 1060 device_battery -----------------------------------------------

fn parse_1060(hex: &str) -> Result<Payload, Error> {
    if bytes_len(hex) != 3 {
        return Err(bad(known::DEVICE_BATTERY, "expected 3 bytes"));
    }
    let mut fields = Fields::new();
    fields.insert("idx".to_owned(), Value::Str(byte_str(hex, 0).to_owned()));
    fields.insert("battery_level".to_owned(), field::decode_percent(byte_str(hex, 1))?.into());
    fields.insert("low_battery".to_owned(), Value::Bool(byte_str(hex, 2) == "00"));
    Ok(Payload::map(fields))
}

// ---- 10A0 dhw_params -------------------------------------------------------

fn parse_10a0(hex: &str) -> Result<Payload, Error> {
    if bytes_len(hex) < 6 {
        return Err(bad(known::DHW_PARAMS, "expected at least 6 bytes"));
    }
    let mut fields = Fields::new();
    fields.insert("dhw_idx".to_owned(), Value::Str(byte_str(hex, 0).to_owned()));
    fields.insert("setpoint".to_owned(), temp_field(slice_str(hex, 1, 3))?);
    fields.insert(
        "overrun".to_owned(),
        Value::Int(u8::from_str_radix(byte_str(hex, 3), 16).map_err(|_| bad(known::DHW_PARAMS, "bad overrun"))? as i64),
    );
    fields.insert("differential".to_owned(), temp_field(slice_str(hex, 4, 6))?);
    Ok(Payload::map(fields))
}

// ---- 10E0 device_info -------------------------------------------------------

fn parse_10e0(hex: &str) -> Result<Payload, Error> {
    let len = bytes_len(hex);
    if ![30, 36, 38].contains(&len) {
        return Err(bad(known::DEVICE_INFO, "expected 30, 36 or 38 bytes"));
    }
    let mut fields = Fields::new();
    fields.insert("description".to_owned(), field::decode_str(slice_str(hex, 13, len))?.into());
    Ok(Payload::map(fields))
}

// ---- 1100 tpi_params --------------------------------------------------------

fn parse_1100(hex: &str) -> Result<Payload, Error> {
    let len = bytes_len(hex);
    if len != 5 && len != 8 {
        return Err(bad(known::TPI_PARAMS, "expected 5 or 8 bytes"));
    }
    let mut fields = Fields::new();
    fields.insert(
        "cycle_rate".to_owned(),
        Value::Int(u8::from_str_radix(byte_str(hex, 1), 16).map_err(|_| bad(known::TPI_PARAMS, "bad cycle_rate"))? as i64),
    );
    fields.insert("min_on_time".to_owned(), Value::Float(field::decode_percent(byte_str(hex, 2))?.unwrap_or(0.0)));
    fields.insert("min_off_time".to_owned(), Value::Float(field::decode_percent(byte_str(hex, 3))?.unwrap_or(0.0)));
    Ok(Payload::map(fields))
}

// ---- 1F09 sync_cycle --------------------------------------------------------

fn parse_1f09(hex: &str) -> Result<Payload, Error> {
    if bytes_len(hex) != 3 {
        return Err(bad(known::SYNC_CYCLE, "expected 3 bytes"));
    }
    let raw = u32::from_str_radix(slice_str(hex, 1, 3), 16).map_err(|_| bad(known::SYNC_CYCLE, "bad seconds field"))?;
    let mut fields = Fields::new();
    fields.insert("sync_status".to_owned(), Value::Str(byte_str(hex, 0).to_owned()));
    fields.insert("remaining_seconds".to_owned(), Value::Float(raw as f64 / 10.0));
    Ok(Payload::map(fields))
}

// ---- 1F41 dhw_mode ----------------------------------------------------------

fn parse_1f41(hex: &str) -> Result<Payload, Error> {
    let len = bytes_len(hex);
    if len != 6 && len != 12 {
        return Err(bad(known::DHW_MODE, "expected 6 or 12 bytes"));
    }
    let mode = byte_str(hex, 2);
    let mut fields = Fields::new();
    fields.insert("active".to_owned(), field::decode_bool(byte_str(hex, 0))?.into());
    fields.insert("mode".to_owned(), Value::Str(mode_name(mode)));
    if mode == "04" && len == 12 {
        fields.insert("until".to_owned(), field::decode_datetime(slice_str(hex, 6, 12))?.into());
    } else {
        fields.insert("until".to_owned(), Value::Null);
    }
    Ok(Payload::map(fields))
}

fn mode_name(mode: &str) -> String {
    match mode {
        "00" => "Auto".to_owned(),
        "01" => "On".to_owned(),
        "02" => "Off".to_owned(),
        "04" => "TemporaryOverride".to_owned(),
        other => format!("Unknown({other})"),
    }
}

// ---- 1FC9 bind_device (array, 6-byte stride) --------------------------

fn parse_1fc9(hex: &str, ctx: MessageContext, src: DeviceId) -> Result<Payload, Error> {
    let len = bytes_len(hex);
    if len == 0 || len % 6 != 0 {
        return Err(bad(known::BIND, "expected a multiple of 6 bytes"));
    }
    let mut records = Vec::new();
    for i in (0..len).step_by(6) {
        let code = Code::from_u16(
            u16::from_str_radix(slice_str(hex, i + 1, i + 3), 16).map_err(|_| bad(known::BIND, "bad embedded code"))?,
        );
        let raw = hex::decode(slice_str(hex, i + 3, i + 6)).map_err(|e| bad(known::BIND, e.to_string()))?;
        let device_id = DeviceId::from_hex_bytes([raw[0], raw[1], raw[2]]);
        if ctx.verb == Verb::W && device_id != src {
            return Err(bad(known::BIND, "W-verb bind device id must equal source address"));
        }
        let mut fields = Fields::new();
        fields.insert("domain_or_zone".to_owned(), Value::Str(byte_str(hex, i).to_owned()));
        fields.insert("code".to_owned(), Value::Str(code.to_string()));
        fields.insert("device_id".to_owned(), Value::Str(device_id.to_string()));
        records.push(fields);
    }
    Ok(Payload::Array(records))
}

/// Encodes a single bind-device triple for outbound Offer/Accept/Confirm
/// transmissions, the inverse of [`parse_1fc9`]'s per-record shape.
pub fn encode_bind_triple(domain_or_zone: &str, code: Code, device_id: DeviceId) -> String {
    format!("{domain_or_zone}{code}{}", hex::encode_upper(device_id.to_hex_bytes()))
}

// ---- 2309 setpoint / 30C9 temperature (array, 3-byte stride) -----------

fn parse_temp_array(code: Code, hex: &str) -> Result<Payload, Error> {
    let len = bytes_len(hex);
    if len == 0 || len % 3 != 0 {
        return Err(bad(code, "expected a multiple of 3 bytes"));
    }
    let mut records = Vec::new();
    for i in (0..len).step_by(3) {
        let mut fields = Fields::new();
        fields.insert("zone_idx".to_owned(), Value::Str(byte_str(hex, i).to_owned()));
        let field_name = if code == known::TEMPERATURE { "temperature" } else { "setpoint" };
        fields.insert(field_name.to_owned(), temp_field(slice_str(hex, i + 1, i + 3))?);
        records.push(fields);
    }
    if records.len() == 1 {
        Ok(Payload::map(records.remove(0)))
    } else {
        Ok(Payload::Array(records))
    }
}

/// Encodes one `2309`/`30C9`-shaped element for an outbound `W` setpoint.
pub fn encode_setpoint(zone_idx: &str, temperature: field::Temperature) -> String {
    format!("{zone_idx}{}", field::encode_temp(temperature))
}

// ---- 2349 zone_mode ---------------------------------------------------------

fn parse_2349(hex: &str) -> Result<Payload, Error> {
    let len = bytes_len(hex);
    if len != 7 && len != 13 {
        return Err(bad(known::ZONE_MODE, "expected 7 or 13 bytes"));
    }
    let mode = byte_str(hex, 3);
    let mut fields = Fields::new();
    fields.insert("zone_idx".to_owned(), Value::Str(byte_str(hex, 0).to_owned()));
    fields.insert("setpoint".to_owned(), temp_field(slice_str(hex, 1, 3))?);
    fields.insert("mode".to_owned(), Value::Str(mode_name(mode)));
    if mode == "04" && len == 13 {
        fields.insert("until".to_owned(), field::decode_datetime(slice_str(hex, 7, 13))?.into());
    } else {
        fields.insert("until".to_owned(), Value::Null);
    }
    Ok(Payload::map(fields))
}

/// Encodes an outbound `2349` zone-mode write.
pub fn encode_zone_mode(zone_idx: &str, setpoint: field::Temperature, mode: &str, until: Option<chrono::DateTime<chrono::Utc>>) -> String {
    let base = format!("{zone_idx}{}{mode}FFFFFF", field::encode_temp(setpoint));
    match until {
        Some(dt) if mode == "04" => format!("{base}{}", field::encode_datetime(dt)),
        _ => base,
    }
}

// ---- 2E04 system_mode -----------------------------------------------------

fn parse_2e04(hex: &str) -> Result<Payload, Error> {
    if bytes_len(hex) != 8 {
        return Err(bad(known::SYSTEM_MODE, "expected 8 bytes"));
    }
    let mut fields = Fields::new();
    fields.insert("system_mode".to_owned(), Value::Str(byte_str(hex, 0).to_owned()));
    if byte_str(hex, 7) != "00" {
        fields.insert("until".to_owned(), field::decode_datetime(slice_str(hex, 1, 7))?.into());
    } else {
        fields.insert("until".to_owned(), Value::Null);
    }
    Ok(Payload::map(fields))
}

// ---- 3150 heat_demand (array, 2-byte stride) ---------------------------

fn parse_3150(hex: &str) -> Result<Payload, Error> {
    let len = bytes_len(hex);
    if len == 0 || len % 2 != 0 {
        return Err(bad(known::HEAT_DEMAND, "expected a multiple of 2 bytes"));
    }
    let mut records = Vec::new();
    for i in (0..len).step_by(2) {
        let mut fields = Fields::new();
        fields.insert("idx".to_owned(), Value::Str(byte_str(hex, i).to_owned()));
        fields.insert("heat_demand".to_owned(), field::decode_percent(byte_str(hex, i + 1))?.into());
        records.push(fields);
    }
    if records.len() == 1 {
        Ok(Payload::map(records.remove(0)))
    } else {
        Ok(Payload::Array(records))
    }
}

// ---- 3220 opentherm_msg -----------------------------------------------------

fn parse_3220(hex: &str) -> Result<Payload, Error> {
    if bytes_len(hex) != 5 {
        return Err(bad(known::OPENTHERM_MSG, "expected 5 bytes"));
    }
    let raw = hex::decode(slice_str(hex, 1, 5)).map_err(|e| bad(known::OPENTHERM_MSG, e.to_string()))?;
    let frame = opentherm::decode_frame(&raw)?;
    let mut fields = Fields::new();
    fields.insert("msg_type".to_owned(), Value::Str(format!("{:?}", frame.msg_type)));
    fields.insert("msg_id".to_owned(), Value::Int(frame.msg_id as i64));
    fields.insert("value_raw".to_owned(), Value::Int(frame.value as i64));
    Ok(Payload::map(fields))
}

// ---- 3B00 sync_tpi --------------------------------------------------------

fn parse_3b00(hex: &str) -> Result<Payload, Error> {
    if bytes_len(hex) != 2 {
        return Err(bad(Code::from_u16(0x3B00), "expected 2 bytes"));
    }
    let mut fields = Fields::new();
    fields.insert("domain_id".to_owned(), Value::Str(byte_str(hex, 0).to_owned()));
    fields.insert("active".to_owned(), field::decode_bool(byte_str(hex, 1))?.into());
    Ok(Payload::map(fields))
}

// ---- 3EF0 actuator_enabled -----------------------------------------------

fn parse_3ef0(hex: &str) -> Result<Payload, Error> {
    let len = bytes_len(hex);
    if len != 3 && len != 6 {
        return Err(bad(known::ACTUATOR_ENABLED, "expected 3 or 6 bytes"));
    }
    let mut fields = Fields::new();
    fields.insert("modulation_level".to_owned(), field::decode_percent(byte_str(hex, 1))?.into());
    if len == 6 {
        fields.insert("flame_active".to_owned(), field::decode_bool(byte_str(hex, 3))?.into());
    }
    Ok(Payload::map(fields))
}

// ---- unknown ---------------------------------------------------------------

fn parse_unknown(hex: &str) -> Payload {
    let mut fields = Fields::new();
    fields.insert("raw_hex".to_owned(), Value::Str(hex.to_owned()));
    Payload::map(fields)
}

/// Decodes `raw_hex` for `code`, applying the verb prefilter described
/// §4.3. `src` is the decoded source address (needed by `1FC9`'s `W`-verb
/// self-identity check).
pub fn parse(code: Code, raw_hex: &str, ctx: MessageContext, src: DeviceId) -> Result<Payload, Error> {
    if ctx.verb == Verb::RQ && bytes_len(raw_hex) <= 2 {
        return Ok(rq_index_only(code, raw_hex, ctx));
    }

    let mut payload = match code.as_u16() {
        0x0001 => parse_0001(raw_hex),
        0x0004 => parse_0004(raw_hex),
        0x0008 => parse_0008(raw_hex),
        0x0009 => parse_0009(raw_hex),
        0x000A => parse_000a(raw_hex),
        0x000C => parse_000c(raw_hex),
        0x0016 => parse_0016(raw_hex),
        0x0100 => parse_0100(raw_hex),
        0x0404 => parse_0404(raw_hex),
        0x0418 => parse_0418(raw_hex),
        0x1060 => parse_1060(raw_hex),
        0x10A0 => parse_10a0(raw_hex),
        0x10E0 => parse_10e0(raw_hex),
        0x1100 => parse_1100(raw_hex),
        0x1F09 => parse_1f09(raw_hex),
        0x1F41 => parse_1f41(raw_hex),
        0x1FC9 => parse_1fc9(raw_hex, ctx, src),
        0x2309 => parse_temp_array(known::SETPOINT, raw_hex),
        0x2349 => parse_2349(raw_hex),
        0x2E04 => parse_2e04(raw_hex),
        0x30C9 => parse_temp_array(known::TEMPERATURE, raw_hex),
        0x3150 => parse_3150(raw_hex),
        0x3220 => parse_3220(raw_hex),
        0x3B00 => parse_3b00(raw_hex),
        0x3EF0 => parse_3ef0(raw_hex),
        _ => Ok(parse_unknown(raw_hex)),
    }?;

    if let Payload::Map(ref mut fields) = payload {
        if !code.never_has_idx() && !fields.contains_key("zone_idx") && !fields.contains_key("domain_id") {
            insert_idx(fields, code, raw_hex, ctx);
        }
    }

    Ok(payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(verb: Verb, src_type: DeviceType) -> MessageContext {
        MessageContext {
            verb,
            src_type,
            src_is_self_addressed: false,
        }
    }

    #[test]
    fn temperature_array_decodes_two_zones() {
        let src: DeviceId = "01:158182".parse().unwrap();
        let payload = parse(known::TEMPERATURE, "0007D1010864", ctx(Verb::I, DeviceType::Controller), src).unwrap();
        let records = payload.as_array().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["zone_idx"], Value::Str("00".to_owned()));
        assert_eq!(records[0]["temperature"], Value::Float(20.01));
        assert_eq!(records[1]["zone_idx"], Value::Str("01".to_owned()));
        assert_eq!(records[1]["temperature"], Value::Float(21.48));
    }

    #[test]
    fn dhw_mode_decodes_off_with_null_until() {
        let src: DeviceId = "01:158182".parse().unwrap();
        let payload = parse(known::DHW_MODE, "00FF00FFFFFF", ctx(Verb::RP, DeviceType::Controller), src).unwrap();
        let fields = payload.as_map().unwrap();
        assert_eq!(fields["active"], Value::Null);
        assert_eq!(fields["mode"], Value::Str("Off".to_owned()));
        assert_eq!(fields["until"], Value::Null);
    }

    #[test]
    fn rq_prefilter_short_circuits_to_index() {
        let src: DeviceId = "12:010740".parse().unwrap();
        let payload = parse(known::SETPOINT, "03", ctx(Verb::RQ, DeviceType::Trv), src).unwrap();
        let fields = payload.as_map().unwrap();
        assert_eq!(fields["parent_idx"], Value::Str("03".to_owned()));
        assert!(!fields.contains_key("setpoint"));
    }

    #[test]
    fn bind_device_decodes_triples_and_checks_source() {
        let src: DeviceId = "01:145038".parse().unwrap();
        let payload = parse(
            known::BIND,
            "07000806368EFC3B0006368E071FC906368E",
            ctx(Verb::I, DeviceType::Controller),
            src,
        )
        .unwrap();
        let records = payload.as_array().unwrap();
        assert_eq!(records.len(), 3);
        for record in records {
            assert_eq!(record["device_id"], Value::Str("01:145038".to_owned()));
        }
    }

    #[test]
    fn mismatched_length_is_invalid_payload() {
        let src: DeviceId = "01:158182".parse().unwrap();
        let err = parse(known::ZONE_NAME, "0001", ctx(Verb::I, DeviceType::Controller), src).unwrap_err();
        assert!(matches!(err, Error::InvalidPayload { .. }));
    }

    #[test]
    fn unknown_code_falls_back_to_raw_hex() {
        let src: DeviceId = "01:158182".parse().unwrap();
        let payload = parse(Code::from_u16(0x9999), "ABCD", ctx(Verb::I, DeviceType::Controller), src).unwrap();
        assert_eq!(payload.as_map().unwrap()["raw_hex"], Value::Str("ABCD".to_owned()));
    }
}
