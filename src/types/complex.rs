//! Array and time types
//!
//! TIME8 is a relative fixed-point fraction of a second while TIME32 and
//! TIME64 are absolute GPS times. The asymmetry is part of the format.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{PrimitiveType, Value};

/// Milliseconds between the Unix and GPS epochs.
pub const GPS_EPOCH_MILLIS: i64 = 315_964_800_000;

/// A fixed-length, contiguous array of one primitive type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArrayType {
    element: PrimitiveType,
    count: usize,
}

impl ArrayType {
    pub fn new(element: PrimitiveType, count: usize) -> Self {
        Self { element, count }
    }

    /// Parse `U8[3]`, also accepting the `ArrayType('U8[3]')` spelling.
    pub fn parse(name: &str) -> Option<Self> {
        let inner = name
            .strip_prefix("ArrayType(")
            .and_then(|s| s.strip_suffix(')'))
            .map(|s| s.trim_matches(|c| c == '\'' || c == '"'))
            .unwrap_or(name);

        let open = inner.find('[')?;
        let count: usize = inner[open + 1..].strip_suffix(']')?.parse().ok()?;
        let element = PrimitiveType::parse(&inner[..open])?;
        Some(Self { element, count })
    }

    pub fn element(&self) -> &PrimitiveType {
        &self.element
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn byte_width(&self) -> usize {
        self.count * self.element.byte_width()
    }

    /// Decode `count` elements at strictly increasing contiguous offsets.
    /// Any element out of bounds makes the whole array unavailable.
    pub fn decode(&self, bytes: &[u8], offset: usize) -> Option<Value> {
        let step = self.element.byte_width();
        (0..self.count)
            .map(|i| self.element.decode(bytes, offset.checked_add(i * step)?))
            .collect::<Option<Vec<_>>>()
            .map(Value::Array)
    }
}

/// The three time encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimeKind {
    /// One byte, value / 256 seconds, relative.
    Time8,
    /// Big-endian u32 seconds since the GPS epoch.
    Time32,
    /// Big-endian f64 seconds since the GPS epoch.
    Time64,
}

impl TimeKind {
    pub const fn byte_width(self) -> usize {
        match self {
            TimeKind::Time8 => 1,
            TimeKind::Time32 => 4,
            TimeKind::Time64 => 8,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            TimeKind::Time8 => "TIME8",
            TimeKind::Time32 => "TIME32",
            TimeKind::Time64 => "TIME64",
        }
    }

    pub fn decode(self, bytes: &[u8], offset: usize) -> Option<Value> {
        let raw = bytes.get(offset..offset.checked_add(self.byte_width())?)?;
        match self {
            TimeKind::Time8 => Some(Value::Float(f64::from(raw[0]) / 256.0)),
            TimeKind::Time32 => {
                let seconds = u32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]]);
                gps_seconds_to_utc(seconds).map(Value::Time)
            }
            TimeKind::Time64 => {
                let mut b = [0u8; 8];
                b.copy_from_slice(raw);
                gps_decimal_seconds_to_utc(f64::from_be_bytes(b)).map(Value::Time)
            }
        }
    }
}

/// Absolute time from whole seconds since the GPS epoch.
pub fn gps_seconds_to_utc(seconds: u32) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_millis(GPS_EPOCH_MILLIS + i64::from(seconds) * 1000)
}

/// Absolute time from decimal seconds since the GPS epoch.
///
/// The digits after the decimal point are read as an integer count of
/// nanoseconds-of-a-millisecond (`digits / 1e6` ms), not as a binary
/// fraction: `12.5` adds 5e-6 ms, not 500 ms. Ground tools display this
/// value, so it is reproduced exactly.
pub fn gps_decimal_seconds_to_utc(seconds: f64) -> Option<DateTime<Utc>> {
    if !seconds.is_finite() {
        return None;
    }
    let (whole, fraction) = if seconds.fract() == 0.0 {
        (seconds as i64, 0i64)
    } else {
        let text = seconds.to_string();
        let (w, f) = text.split_once('.')?;
        (w.parse().ok()?, f.parse().ok()?)
    };

    // digits / 1e6 ms is exactly `digits` nanoseconds
    let nanos = whole
        .checked_mul(1000)
        .and_then(|ms| ms.checked_add(GPS_EPOCH_MILLIS))
        .and_then(|ms| ms.checked_mul(1_000_000))
        .and_then(|ns| ns.checked_add(fraction))?;
    Some(DateTime::from_timestamp_nanos(nanos))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn array_names_parse_in_both_spellings() {
        let a = ArrayType::parse("U8[3]").unwrap();
        assert_eq!(a.count(), 3);
        assert_eq!(a.byte_width(), 3);

        let b = ArrayType::parse("ArrayType('MSB_U16[4]')").unwrap();
        assert_eq!(b.element().name(), "MSB_U16");
        assert_eq!(b.byte_width(), 8);

        assert!(ArrayType::parse("U8[x]").is_none());
        assert!(ArrayType::parse("Q8[2]").is_none());
    }

    #[test]
    fn array_decode_is_all_or_nothing() {
        let a = ArrayType::parse("MSB_U16[2]").unwrap();
        assert_eq!(
            a.decode(&[0, 1, 0, 2], 0),
            Some(Value::Array(vec![Value::UInt(1), Value::UInt(2)]))
        );
        assert_eq!(a.decode(&[0, 1, 0], 0), None);
    }

    #[test]
    fn time8_is_relative_fraction() {
        assert_eq!(TimeKind::Time8.decode(&[128], 0), Some(Value::Float(0.5)));
        assert_eq!(TimeKind::Time8.decode(&[], 0), None);
    }

    #[test]
    fn time32_is_gps_absolute() {
        let decoded = TimeKind::Time32.decode(&[0, 0, 0, 0], 0).unwrap();
        let expected = DateTime::from_timestamp(315_964_800, 0).unwrap();
        assert_eq!(decoded, Value::Time(expected));

        let decoded = TimeKind::Time32.decode(&60u32.to_be_bytes(), 0).unwrap();
        assert_eq!(decoded, Value::Time(DateTime::from_timestamp(315_964_860, 0).unwrap()));
    }

    #[test]
    fn time64_reads_fraction_digits_as_integer() {
        let whole = gps_decimal_seconds_to_utc(10.0).unwrap();
        assert_eq!(whole, DateTime::from_timestamp(315_964_810, 0).unwrap());

        // "10.5" -> 10 s + 5 / 1e6 ms = 5 ns
        let fractional = gps_decimal_seconds_to_utc(10.5).unwrap();
        assert_eq!(fractional.timestamp(), 315_964_810);
        assert_eq!(fractional.timestamp_subsec_nanos(), 5);

        let bytes = 10.5f64.to_be_bytes();
        assert_eq!(TimeKind::Time64.decode(&bytes, 0), Some(Value::Time(fractional)));
    }
}
