//! The four-verb request/response grammar RAMSES-II frames carry.

use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// A packet's verb: what kind of exchange it is part of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    /// An unsolicited broadcast.
    I,
    /// A request for information.
    RQ,
    /// A response to an `RQ`.
    RP,
    /// A write/command instruction.
    W,
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            Verb::I => "I",
            Verb::RQ => "RQ",
            Verb::RP => "RP",
            Verb::W => "W",
        };
        f.pad(s)
    }
}

impl FromStr for Verb {
    type Err = Error;

    fn from_str(s: &str) -> Result<Verb, Error> {
        match s.trim() {
            "I" => Ok(Verb::I),
            "RQ" => Ok(Verb::RQ),
            "RP" => Ok(Verb::RP),
            "W" => Ok(Verb::W),
            other => Err(Error::InvalidPacket {
                line: other.to_owned(),
                reason: "invalid_structure",
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_every_verb() {
        for verb in [Verb::I, Verb::RQ, Verb::RP, Verb::W] {
            let text = verb.to_string();
            assert_eq!(text.parse::<Verb>().unwrap(), verb);
        }
    }

    #[test]
    fn rejects_unknown_verb() {
        assert!("XX".parse::<Verb>().is_err());
    }
}
