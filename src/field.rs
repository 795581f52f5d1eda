//! Scalar field codecs shared by the per-code payload parsers.
//!
//! Each decoder consumes a hex substring of a payload and returns the typed
//! value the original's `_bool`/`_temp`/`_percent`/`_dtm`/`_date`/`_str`
//! helpers produced; each has a matching encoder for outbound commands.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};

use crate::error::Error;

fn bad_payload(reason: impl Into<String>) -> Error {
    Error::InvalidPayload {
        code: String::new(),
        reason: reason.into(),
    }
}

fn parse_hex_u32(seqx: &str) -> Result<u32, Error> {
    u32::from_str_radix(seqx, 16).map_err(|_| bad_payload(format!("not hex: {seqx}")))
}

/// Decodes a two-hex-digit tri-state boolean: `00` is `false`, `C8` is
/// `true`, `FF` is absent.
pub fn decode_bool(seqx: &str) -> Result<Option<bool>, Error> {
    match seqx {
        "00" => Ok(Some(false)),
        "C8" => Ok(Some(true)),
        "FF" => Ok(None),
        other => Err(bad_payload(format!("invalid bool byte: {other}"))),
    }
}

/// Encodes a tri-state boolean back to its two-hex-digit form.
pub fn encode_bool(value: Option<bool>) -> &'static str {
    match value {
        Some(false) => "00",
        Some(true) => "C8",
        None => "FF",
    }
}

/// Decodes a two-hex-digit percentage in half-percent units (`0..=200`,
/// i.e. divide by 200 for the `0.0..=1.0` fraction); `FF` is absent.
pub fn decode_percent(seqx: &str) -> Result<Option<f64>, Error> {
    if seqx == "FF" {
        return Ok(None);
    }
    let raw = parse_hex_u32(seqx)?;
    if raw > 200 {
        return Err(bad_payload(format!("percent out of range: {raw}")));
    }
    Ok(Some(raw as f64 / 200.0))
}

/// Encodes a `0.0..=1.0` fraction back to its half-percent hex byte.
pub fn encode_percent(value: Option<f64>) -> Result<String, Error> {
    match value {
        None => Ok("FF".to_owned()),
        Some(v) if (0.0..=1.0).contains(&v) => Ok(format!("{:02X}", (v * 200.0).round() as u32)),
        Some(v) => Err(bad_payload(format!("percent fraction out of range: {v}"))),
    }
}

/// Decodes a two-hex-digit percentage in whole-percent units (`0..=100`),
/// used by `12A0` indoor humidity rather than the half-percent form above.
pub fn decode_percent_whole(seqx: &str) -> Result<Option<f64>, Error> {
    if seqx == "FF" {
        return Ok(None);
    }
    let raw = parse_hex_u32(seqx)?;
    Ok(Some(raw as f64 / 100.0))
}

/// Decodes a signed two's-complement temperature in hundredths of a degree.
///
/// `7FFF` means absent; `7EFF` means the sensor is present but disabled.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Temperature {
    /// A decoded temperature, in degrees Celsius.
    Value(f64),
    /// The sensor is present but reports itself disabled (`7EFF`).
    Disabled,
    /// No reading (`7FFF`).
    Absent,
}

/// Decodes a 4-hex-digit signed temperature field.
pub fn decode_temp(seqx: &str) -> Result<Temperature, Error> {
    if seqx.len() != 4 {
        return Err(bad_payload(format!("temperature field wrong length: {seqx}")));
    }
    if seqx.eq_ignore_ascii_case("7FFF") {
        return Ok(Temperature::Absent);
    }
    if seqx.eq_ignore_ascii_case("7EFF") {
        return Ok(Temperature::Disabled);
    }
    let raw = u16::from_str_radix(seqx, 16).map_err(|_| bad_payload(format!("not hex: {seqx}")))? as i16;
    Ok(Temperature::Value(raw as f64 / 100.0))
}

/// Encodes a temperature back to its 4-hex-digit two's-complement form.
pub fn encode_temp(value: Temperature) -> String {
    match value {
        Temperature::Absent => "7FFF".to_owned(),
        Temperature::Disabled => "7EFF".to_owned(),
        Temperature::Value(v) => {
            let raw = (v * 100.0).round() as i16;
            format!("{:04X}", raw as u16)
        }
    }
}

/// Decodes a printable-ASCII string from a hex-encoded byte run.
///
/// Non-printable bytes (outside `32..127`) are dropped, matching the
/// original's filter; an empty result after filtering is `None`.
pub fn decode_str(seqx: &str) -> Result<Option<String>, Error> {
    let bytes = hex::decode(seqx).map_err(|e| bad_payload(format!("not hex: {e}")))?;
    let filtered: String = bytes
        .into_iter()
        .filter(|&b| b > 31 && b < 127)
        .map(|b| b as char)
        .collect();
    if filtered.is_empty() {
        Ok(None)
    } else {
        Ok(Some(filtered))
    }
}

/// Encodes a string to its hex-encoded, NUL-padded byte form of `len` bytes.
pub fn encode_str(value: &str, len: usize) -> String {
    let mut bytes = value.as_bytes().to_vec();
    bytes.resize(len, 0x00);
    hex::encode_upper(bytes)
}

/// Decodes a 12- or 14-hex-digit RAMSES-II datetime.
///
/// A 12-digit field is treated as a 14-digit one with a `"00"` seconds
/// prefix, per the original's padding rule. The day field's top three bits
/// carry the day-of-week and the second field's top bit carries a DST flag;
/// both are masked off rather than interpreted.
pub fn decode_datetime(seqx: &str) -> Result<DateTime<Utc>, Error> {
    let padded = match seqx.len() {
        12 => format!("00{seqx}"),
        14 => seqx.to_owned(),
        other => return Err(bad_payload(format!("datetime field wrong length: {other}"))),
    };

    let second = (u8::from_str_radix(&padded[0..2], 16).map_err(|_| bad_payload("bad second"))?) & 0b0111_1111;
    let minute = u8::from_str_radix(&padded[2..4], 16).map_err(|_| bad_payload("bad minute"))?;
    let hour = u8::from_str_radix(&padded[4..6], 16).map_err(|_| bad_payload("bad hour"))?;
    let day = (u8::from_str_radix(&padded[6..8], 16).map_err(|_| bad_payload("bad day"))?) & 0b0001_1111;
    let month = u8::from_str_radix(&padded[8..10], 16).map_err(|_| bad_payload("bad month"))?;
    let year = u16::from_str_radix(&padded[10..14], 16).map_err(|_| bad_payload("bad year"))?;

    let date = NaiveDate::from_ymd_opt(year as i32, month as u32, day as u32)
        .ok_or_else(|| bad_payload(format!("invalid calendar date: {year}-{month}-{day}")))?;
    let naive = date
        .and_hms_opt(hour as u32, minute as u32, second as u32)
        .ok_or_else(|| bad_payload(format!("invalid time of day: {hour}:{minute}:{second}")))?;

    Ok(Utc.from_utc_datetime(&naive))
}

/// Encodes a datetime to its 14-hex-digit form (day-of-week/DST bits zero).
pub fn encode_datetime(value: DateTime<Utc>) -> String {
    format!(
        "{:02X}{:02X}{:02X}{:02X}{:02X}{:04X}",
        value.format("%S").to_string().parse::<u8>().unwrap_or(0),
        value.format("%M").to_string().parse::<u8>().unwrap_or(0),
        value.format("%H").to_string().parse::<u8>().unwrap_or(0),
        value.format("%d").to_string().parse::<u8>().unwrap_or(0),
        value.format("%m").to_string().parse::<u8>().unwrap_or(0),
        value.format("%Y").to_string().parse::<u16>().unwrap_or(0),
    )
}

/// Decodes an 8-hex-digit date-only field. `FFFFFFFF` means absent.
pub fn decode_date(seqx: &str) -> Result<Option<NaiveDate>, Error> {
    if seqx.eq_ignore_ascii_case("FFFFFFFF") {
        return Ok(None);
    }
    if seqx.len() != 8 {
        return Err(bad_payload(format!("date field wrong length: {seqx}")));
    }
    let day = (u8::from_str_radix(&seqx[0..2], 16).map_err(|_| bad_payload("bad day"))?) & 0b0001_1111;
    let month = u8::from_str_radix(&seqx[2..4], 16).map_err(|_| bad_payload("bad month"))?;
    let year = u16::from_str_radix(&seqx[4..8], 16).map_err(|_| bad_payload("bad year"))?;
    NaiveDate::from_ymd_opt(year as i32, month as u32, day as u32)
        .map(Some)
        .ok_or_else(|| bad_payload(format!("invalid calendar date: {year}-{month}-{day}")))
}

/// Encodes a date back to its 8-hex-digit form, or `FFFFFFFF` if absent.
pub fn encode_date(value: Option<NaiveDate>) -> String {
    match value {
        None => "FFFFFFFF".to_owned(),
        Some(d) => format!(
            "{:02X}{:02X}{:04X}",
            d.format("%d").to_string().parse::<u8>().unwrap_or(0),
            d.format("%m").to_string().parse::<u8>().unwrap_or(0),
            d.format("%Y").to_string().parse::<u16>().unwrap_or(0),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bool_roundtrips() {
        assert_eq!(decode_bool("00").unwrap(), Some(false));
        assert_eq!(decode_bool("C8").unwrap(), Some(true));
        assert_eq!(decode_bool("FF").unwrap(), None);
        assert!(decode_bool("7F").is_err());
        assert_eq!(encode_bool(Some(true)), "C8");
    }

    #[test]
    fn percent_is_half_percent_units() {
        assert_eq!(decode_percent("C8").unwrap(), Some(1.0));
        assert_eq!(decode_percent("00").unwrap(), Some(0.0));
        assert_eq!(decode_percent("FF").unwrap(), None);
        assert!(decode_percent("C9").unwrap().unwrap() > 1.0);
    }

    #[test]
    fn temp_handles_sentinels_and_negative() {
        assert_eq!(decode_temp("7FFF").unwrap(), Temperature::Absent);
        assert_eq!(decode_temp("7EFF").unwrap(), Temperature::Disabled);
        assert_eq!(decode_temp("0898").unwrap(), Temperature::Value(22.0));
        // -5.00C: two's complement of 500 in 16 bits.
        assert_eq!(decode_temp("FE0C").unwrap(), Temperature::Value(-5.0));
    }

    #[test]
    fn str_filters_non_printable_and_empty_is_none() {
        assert_eq!(decode_str("48454C4C4F").unwrap(), Some("HELLO".to_owned()));
        assert_eq!(decode_str("0000").unwrap(), None);
    }

    #[test]
    fn datetime_pads_12_digit_and_masks_high_bits() {
        let dt = decode_datetime("1E0A0F1C070BE6").unwrap();
        assert_eq!(dt.format("%Y-%m-%d %H:%M:%S").to_string(), "3046-07-28 15:10:30");

        let padded = decode_datetime("0A0F1C070BE6").unwrap();
        assert_eq!(padded.format("%H:%M:%S").to_string(), "15:10:00");
    }

    #[test]
    fn date_sentinel_is_none() {
        assert_eq!(decode_date("FFFFFFFF").unwrap(), None);
    }
}
