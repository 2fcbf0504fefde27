// SPDX-License-Identifier: GPL-3.0-only

//! Declarative size grammar
//!
//! A size expression is `[+|-]<integer>[%|<byte-suffix>]`:
//!
//! - a leading `+` anchors the value at the beginning of the device
//! - a leading `-` anchors the value at the end of the device
//! - no sign means the value is relative to the running cursor
//! - `%` sizes relative to the device, a byte suffix (`K`, `MiB`, ...)
//!   counts bytes, and no suffix counts raw sectors

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

use crate::error::ValidationError;

/// Where a size expression is anchored on the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeAnchor {
    /// `+`: absolute, counted from the first sector.
    Begin,
    /// `-`: absolute, counted back from the last sector.
    End,
    /// Unsigned: relative to the running cursor (start field) or to the
    /// resolved start (stop field).
    Cursor,
}

/// Unit of a size expression's magnitude.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeUnit {
    /// `%`. Note: percentage sizing preserves the historical behavior of
    /// dividing the device sector count by the magnitude ("50%" of 1000
    /// sectors is 20, not 500).
    Percent,
    /// A byte suffix; the multiplier is the number of bytes per unit.
    Bytes(u64),
    /// No suffix: raw sectors.
    Sectors,
}

/// A parsed, immutable size expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeSpec {
    pub anchor: SizeAnchor,
    pub magnitude: u64,
    pub unit: SizeUnit,
}

const KIB: u64 = 1024;
const MIB: u64 = 1024 * KIB;
const GIB: u64 = 1024 * MIB;
const TIB: u64 = 1024 * GIB;

fn byte_multiplier(suffix: &str) -> Option<u64> {
    match suffix {
        "B" => Some(1),
        "K" | "KiB" => Some(KIB),
        "M" | "MiB" => Some(MIB),
        "G" | "GiB" => Some(GIB),
        "T" | "TiB" => Some(TIB),
        _ => None,
    }
}

impl FromStr for SizeSpec {
    type Err = ValidationError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let err = |reason: &str| ValidationError::InvalidSizeSpec {
            input: input.to_string(),
            reason: reason.to_string(),
        };

        let trimmed = input.trim();
        let (anchor, rest) = match trimmed.as_bytes().first() {
            Some(b'+') => (SizeAnchor::Begin, &trimmed[1..]),
            Some(b'-') => (SizeAnchor::End, &trimmed[1..]),
            Some(_) => (SizeAnchor::Cursor, trimmed),
            None => return Err(err("empty expression")),
        };

        let digits_end = rest
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(rest.len());
        let (digits, suffix) = rest.split_at(digits_end);
        if digits.is_empty() {
            return Err(err("missing magnitude"));
        }

        let magnitude: u64 = digits.parse().map_err(|_| err("magnitude overflow"))?;

        let unit = match suffix {
            "" => SizeUnit::Sectors,
            "%" => {
                if magnitude == 0 {
                    return Err(err("zero percent"));
                }
                SizeUnit::Percent
            }
            other => SizeUnit::Bytes(byte_multiplier(other).ok_or_else(|| err("unknown suffix"))?),
        };

        Ok(SizeSpec {
            anchor,
            magnitude,
            unit,
        })
    }
}

impl fmt::Display for SizeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = match self.anchor {
            SizeAnchor::Begin => "+",
            SizeAnchor::End => "-",
            SizeAnchor::Cursor => "",
        };
        match self.unit {
            SizeUnit::Percent => write!(f, "{sign}{}%", self.magnitude),
            SizeUnit::Bytes(mult) => write!(f, "{sign}{}B", self.magnitude.saturating_mul(mult)),
            SizeUnit::Sectors => write!(f, "{sign}{}", self.magnitude),
        }
    }
}

impl<'de> Deserialize<'de> for SizeSpec {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_anchors_and_units() {
        let spec: SizeSpec = "+2048".parse().expect("begin sectors");
        assert_eq!(spec.anchor, SizeAnchor::Begin);
        assert_eq!(spec.unit, SizeUnit::Sectors);
        assert_eq!(spec.magnitude, 2048);

        let spec: SizeSpec = "-512MiB".parse().expect("end bytes");
        assert_eq!(spec.anchor, SizeAnchor::End);
        assert_eq!(spec.unit, SizeUnit::Bytes(1024 * 1024));
        assert_eq!(spec.magnitude, 512);

        let spec: SizeSpec = "50%".parse().expect("cursor percent");
        assert_eq!(spec.anchor, SizeAnchor::Cursor);
        assert_eq!(spec.unit, SizeUnit::Percent);
    }

    #[test]
    fn short_and_long_suffixes_agree() {
        let short: SizeSpec = "+1G".parse().expect("short");
        let long: SizeSpec = "+1GiB".parse().expect("long");
        assert_eq!(short, long);
    }

    #[test]
    fn rejects_garbage() {
        assert!("".parse::<SizeSpec>().is_err());
        assert!("+".parse::<SizeSpec>().is_err());
        assert!("12XB".parse::<SizeSpec>().is_err());
        assert!("0%".parse::<SizeSpec>().is_err());
        assert!("--5".parse::<SizeSpec>().is_err());
    }
}
