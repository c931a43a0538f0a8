//! Fixed-width primitive types and their canonical name grammar
//!
//! Names follow `<LSB|MSB>_<I|U|F|D><bits>` for numeric types, `S<n>` for
//! fixed-length strings and `<I|U>8` for single-byte integers that have no
//! byte order.

use serde::{Deserialize, Serialize};

use super::Value;

/// Byte order of a primitive type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Endianness {
    Big,
    Little,
    None,
}

/// A primitive type derived once from its canonical name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrimitiveType {
    name: String,
    endianness: Endianness,
    signed: bool,
    float: bool,
    string: bool,
    bit_width: u32,
    min: Option<f64>,
    max: Option<f64>,
}

impl PrimitiveType {
    /// Parse a canonical type name. Returns `None` for names outside the grammar.
    pub fn parse(name: &str) -> Option<Self> {
        let (endianness, signed, float, string, bit_width) =
            if let Some(rest) = name.strip_prefix("LSB_").or_else(|| name.strip_prefix("MSB_")) {
                let endianness =
                    if name.starts_with("LSB_") { Endianness::Little } else { Endianness::Big };
                let (kind, bits) = rest.split_at_checked(1)?;
                let bits: u32 = bits.parse().ok()?;
                let valid = match kind {
                    "I" | "U" => matches!(bits, 8 | 16 | 32 | 64),
                    "F" => bits == 32,
                    "D" => bits == 64,
                    _ => false,
                };
                if !valid {
                    return None;
                }
                (endianness, kind != "U", matches!(kind, "F" | "D"), false, bits)
            } else if let Some(len) = name.strip_prefix('S') {
                let len: u32 = len.parse().ok()?;
                if len == 0 {
                    return None;
                }
                (Endianness::None, false, false, true, len.checked_mul(8)?)
            } else {
                let (kind, bits) = name.split_at_checked(1)?;
                if !matches!(kind, "I" | "U") || bits != "8" {
                    return None;
                }
                (Endianness::None, kind == "I", false, false, 8)
            };

        let (min, max) = if float {
            (Some(-f64::MAX), Some(f64::MAX))
        } else if signed {
            let max = 2f64.powi(bit_width as i32 - 1);
            (Some(-(max - 1.0)), Some(max))
        } else if !string {
            (Some(0.0), Some(2f64.powi(bit_width as i32) - 1.0))
        } else {
            (None, None)
        };

        Some(Self { name: name.to_string(), endianness, signed, float, string, bit_width, min, max })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn endianness(&self) -> Endianness {
        self.endianness
    }

    pub fn is_signed(&self) -> bool {
        self.signed
    }

    pub fn is_float(&self) -> bool {
        self.float
    }

    pub fn is_string(&self) -> bool {
        self.string
    }

    pub fn bit_width(&self) -> u32 {
        self.bit_width
    }

    pub const fn byte_width(&self) -> usize {
        (self.bit_width / 8) as usize
    }

    pub fn min(&self) -> Option<f64> {
        self.min
    }

    pub fn max(&self) -> Option<f64> {
        self.max
    }

    /// Decode one value at `offset`. Returns `None` when the read would
    /// run past the end of `bytes`.
    pub fn decode(&self, bytes: &[u8], offset: usize) -> Option<Value> {
        let end = offset.checked_add(self.byte_width())?;
        let raw = bytes.get(offset..end)?;

        if self.string {
            let len = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
            return Some(Value::Str(String::from_utf8_lossy(&raw[..len]).into_owned()));
        }

        let big = self.endianness != Endianness::Little;
        if self.float {
            return Some(Value::Float(match raw.len() {
                4 => {
                    let b = [raw[0], raw[1], raw[2], raw[3]];
                    f64::from(if big { f32::from_be_bytes(b) } else { f32::from_le_bytes(b) })
                }
                _ => {
                    let mut b = [0u8; 8];
                    b.copy_from_slice(raw);
                    if big { f64::from_be_bytes(b) } else { f64::from_le_bytes(b) }
                }
            }));
        }

        let unsigned = read_unsigned(raw, big);
        if self.signed {
            let shift = 64 - self.bit_width;
            Some(Value::Int(((unsigned << shift) as i64) >> shift))
        } else {
            Some(Value::UInt(unsigned))
        }
    }

    /// Encode a value into this type's wire representation.
    ///
    /// Returns `None` when the value has no representation in this type.
    pub fn encode(&self, value: &Value) -> Option<Vec<u8>> {
        let width = self.byte_width();
        if self.string {
            let text = value.as_str()?;
            let mut out = text.as_bytes().to_vec();
            out.resize(width, 0);
            return Some(out);
        }

        let big = self.endianness != Endianness::Little;
        if self.float {
            let v = value.as_f64()?;
            return Some(match (width, big) {
                (4, true) => (v as f32).to_be_bytes().to_vec(),
                (4, false) => (v as f32).to_le_bytes().to_vec(),
                (_, true) => v.to_be_bytes().to_vec(),
                (_, false) => v.to_le_bytes().to_vec(),
            });
        }

        let bits: u64 = match value {
            Value::UInt(v) => *v,
            other => other.as_i64()? as u64,
        };
        let be = bits.to_be_bytes();
        let mut out = be[8 - width..].to_vec();
        if !big {
            out.reverse();
        }
        Some(out)
    }
}

fn read_unsigned(raw: &[u8], big: bool) -> u64 {
    let fold = |acc: u64, b: &u8| (acc << 8) | u64::from(*b);
    if big { raw.iter().fold(0, fold) } else { raw.iter().rev().fold(0, fold) }
}
