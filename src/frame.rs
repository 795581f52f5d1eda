//! The frame codec: turns one serial text line into a validated [`Frame`].
//!
//! Mirrors the original's `split_pkt_line`/`Packet.is_valid` two-stage
//! shape: first split the raw line into packet/error/comment parts, then
//! run the packet text through an ordered validation chain that reports
//! the *first* failing rule as the error's `reason`.

use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;

use crate::address::DeviceId;
use crate::clock::Clock;
use crate::code::Code;
use crate::error::Error;
use crate::verb::Verb;

/// Payload first-byte values that are legal zone indices or domain ids
/// (the frame's `bad_zone_or_domain` check).
const VALID_LEAD_BYTES: &[&str] = &[
    "00", "01", "02", "03", "04", "05", "06", "07", "08", "09", "0A", "0B", "21", "F8", "F9",
    "FA", "FB", "FC", "FF",
];

fn frame_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(concat!(
            r"^\d{3} +(I|RQ|RP|W) +\d{3} ",
            r"([0-9]{2}:[0-9]{6}|--:------) ",
            r"([0-9]{2}:[0-9]{6}|--:------) ",
            r"([0-9]{2}:[0-9]{6}|--:------) ",
            r"[0-9A-F]{4} \d{3} [0-9A-F]*$",
        ))
        .expect("static frame regex is valid")
    })
}

/// The outcome of splitting a raw serial line into its three parts, per
/// the original's `split_pkt_line`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitLine {
    /// The packet text proper (may be empty for a comment-only line).
    pub packet: String,
    /// Text following a `*`, a firmware-reported error.
    pub error_text: Option<String>,
    /// Text following a `#`, a free-form comment.
    pub comment: Option<String>,
}

/// Splits a raw line on `#` (comment) then `*` (firmware error), as the
/// original's `split_pkt_line` does.
pub fn split_pkt_line(line: &str) -> SplitLine {
    let (rest, comment) = match line.split_once('#') {
        Some((head, tail)) => (head, Some(tail.trim().to_owned())),
        None => (line, None),
    };
    let (packet, error_text) = match rest.split_once('*') {
        Some((head, tail)) => (head, Some(tail.trim().to_owned())),
        None => (rest, None),
    };
    SplitLine {
        packet: packet.trim().to_owned(),
        error_text,
        comment,
    }
}

/// A validated, timestamped frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// RSSI, decimal `0..=255`.
    pub rssi: u8,
    /// The frame's verb.
    pub verb: Verb,
    /// The 3-digit sequence number.
    pub seq_no: u16,
    /// The first address slot.
    pub src: DeviceId,
    /// The second address slot (often absent).
    pub addr2: DeviceId,
    /// The third address slot.
    pub dst: DeviceId,
    /// The command code.
    pub code: Code,
    /// The payload, as an uppercase hex string.
    pub raw_hex: String,
    /// When this frame was read off the transport.
    pub timestamp: DateTime<Utc>,
}

fn invalid(line: &str, reason: &'static str) -> Error {
    Error::InvalidPacket {
        line: line.to_owned(),
        reason,
    }
}

impl Frame {
    /// Parses and validates one already-split packet line, attaching a
    /// timestamp read from `clock`.
    ///
    /// Runs the ordered validation chain: `invalid_structure`
    /// → `excessive_length` → `mismatched_length` → `missing_address` →
    /// `bad_zone_or_domain`. The first failing rule is returned; later rules
    /// are not evaluated.
    pub fn parse(packet: &str, clock: &dyn Clock) -> Result<Frame, Error> {
        if !frame_regex().is_match(packet) {
            return Err(invalid(packet, "invalid_structure"));
        }

        let fields: Vec<&str> = packet.split_whitespace().collect();
        // The regex guarantees at least: rssi verb seq src addr2 dst code len [hex].
        let rssi: u8 = fields[0].parse().map_err(|_| invalid(packet, "invalid_structure"))?;
        let verb: Verb = fields[1].parse()?;
        let seq_no: u16 = fields[2].parse().map_err(|_| invalid(packet, "invalid_structure"))?;
        let src: DeviceId = fields[3].parse()?;
        let addr2: DeviceId = fields[4].parse()?;
        let dst: DeviceId = fields[5].parse()?;
        let code: Code = fields[6].parse()?;
        let declared_len: usize = fields[7].parse().map_err(|_| invalid(packet, "invalid_structure"))?;
        let raw_hex = fields.get(8).copied().unwrap_or("").to_uppercase();

        if declared_len > 48 {
            return Err(invalid(packet, "excessive_length"));
        }
        if declared_len * 2 != raw_hex.len() {
            return Err(invalid(packet, "mismatched_length"));
        }
        if src.is_absent() && addr2.is_absent() && dst.is_absent() {
            return Err(invalid(packet, "missing_address"));
        }
        if raw_hex.len() >= 2 && !VALID_LEAD_BYTES.contains(&&raw_hex[0..2]) {
            return Err(invalid(packet, "bad_zone_or_domain"));
        }

        Ok(Frame {
            rssi,
            verb,
            seq_no,
            src,
            addr2,
            dst,
            code,
            raw_hex,
            timestamp: clock.now(),
        })
    }

    /// Splits, parses and validates a raw serial line in one step. Returns
    /// `Err` (and the caller should `warn!` and drop) for any malformed or
    /// firmware-error-flagged line.
    pub fn from_line(line: &str, clock: &dyn Clock) -> Result<Frame, Error> {
        let split = split_pkt_line(line);
        if split.error_text.is_some() {
            return Err(invalid(line, "invalid_structure"));
        }
        if split.packet.is_empty() {
            return Err(invalid(line, "invalid_structure"));
        }
        Frame::parse(&split.packet, clock)
    }
}
