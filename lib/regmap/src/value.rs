//! Typed values held by variables, plus the access mode definitions.

use bitflags::bitflags;
use core::fmt::{Display, Formatter};
use utils::endian::{mask, sign_extend};

/// A value read from or written to a variable.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    UInt(u64),
    Int(i64),
    Float(f64),
    Str(String),
}

impl Value {
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::Bool(b) => Some(*b as u64),
            Value::UInt(v) => Some(*v),
            Value::Int(v) if *v >= 0 => Some(*v as u64),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Bool(b) => Some(*b as i64),
            Value::UInt(v) => i64::try_from(*v).ok(),
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            Value::UInt(0) | Value::Int(0) => Some(false),
            Value::UInt(1) | Value::Int(1) => Some(true),
            _ => None,
        }
    }

    /// Convert a JSON scalar into a value. Arrays, objects and null have no counterpart.
    pub fn from_json(json: &serde_json::Value) -> Option<Value> {
        match json {
            serde_json::Value::Bool(b) => Some(Value::Bool(*b)),
            serde_json::Value::Number(n) => {
                if let Some(v) = n.as_u64() {
                    Some(Value::UInt(v))
                } else if let Some(v) = n.as_i64() {
                    Some(Value::Int(v))
                } else {
                    n.as_f64().map(Value::Float)
                }
            }
            serde_json::Value::String(s) => Some(Value::Str(s.clone())),
            _ => None,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Bool(b) => serde_json::Value::from(*b),
            Value::UInt(v) => serde_json::Value::from(*v),
            Value::Int(v) => serde_json::Value::from(*v),
            Value::Float(v) => serde_json::Value::from(*v),
            Value::Str(s) => serde_json::Value::from(s.as_str()),
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{}", if *b { "True" } else { "False" }),
            Value::UInt(v) => write!(f, "{:#x}", v),
            Value::Int(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::Str(s) => f.write_str(s),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}
impl From<u64> for Value {
    fn from(value: u64) -> Self {
        Value::UInt(value)
    }
}
impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Value::UInt(value as u64)
    }
}
impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}
impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}
impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Str(value.into())
    }
}
impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Str(value)
    }
}

/// How the raw bits of a hardware-backed variable are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Base {
    #[default]
    UInt,
    /// Two's complement, sign-extended from the variable width.
    Int,
    Bool,
}

impl Base {
    /// Encode `value` into `bit_size` raw bits, or `None` if it does not fit.
    pub fn to_bits(self, value: &Value, bit_size: u32) -> Option<u64> {
        match self {
            Base::UInt => {
                let v = value.as_u64()?;
                (v & !mask(bit_size) == 0).then_some(v)
            }
            Base::Int => {
                let v = value.as_i64()?;
                if bit_size == 0 {
                    return None;
                }
                if bit_size < 64 {
                    let limit = 1i64 << (bit_size - 1);
                    if v < -limit || v >= limit {
                        return None;
                    }
                }
                Some(v as u64 & mask(bit_size))
            }
            Base::Bool => value.as_bool().map(|b| b as u64),
        }
    }

    /// Decode `bit_size` raw bits.
    pub fn from_bits(self, bits: u64, bit_size: u32) -> Value {
        match self {
            Base::UInt => Value::UInt(bits & mask(bit_size)),
            Base::Int => Value::Int(sign_extend(bits & mask(bit_size), bit_size)),
            Base::Bool => Value::Bool(bits != 0),
        }
    }
}

/// Access mode of a variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    ReadOnly,
    WriteOnly,
    #[default]
    ReadWrite,
}

impl Mode {
    pub fn readable(self) -> bool {
        self != Mode::WriteOnly
    }

    pub fn writable(self) -> bool {
        self != Mode::ReadOnly
    }

    /// The mode of a block hosting variables with modes `self` and `other`.
    pub fn combine(self, other: Mode) -> Mode {
        if self == other { self } else { Mode::ReadWrite }
    }
}

bitflags! {
    /// Set of modes selected by snapshot and restore.
    pub struct ModeFilter: u8 {
        const RO = 0b001;
        const WO = 0b010;
        const RW = 0b100;
    }
}

impl ModeFilter {
    pub fn matches(&self, mode: Mode) -> bool {
        match mode {
            Mode::ReadOnly => self.contains(ModeFilter::RO),
            Mode::WriteOnly => self.contains(ModeFilter::WO),
            Mode::ReadWrite => self.contains(ModeFilter::RW),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uint_must_fit_width() {
        assert_eq!(Base::UInt.to_bits(&Value::UInt(0xff), 8), Some(0xff));
        assert_eq!(Base::UInt.to_bits(&Value::UInt(0x100), 8), None);
        assert_eq!(Base::UInt.to_bits(&Value::UInt(u64::MAX), 64), Some(u64::MAX));
    }

    #[test]
    fn int_round_trips_through_bits() {
        let bits = Base::Int.to_bits(&Value::Int(-3), 12).unwrap();
        assert_eq!(bits, 0xffd);
        assert_eq!(Base::Int.from_bits(bits, 12), Value::Int(-3));
        assert_eq!(Base::Int.to_bits(&Value::Int(2048), 12), None);
    }

    #[test]
    fn mode_filter_selection() {
        let filter = ModeFilter::RW | ModeFilter::RO;
        assert!(filter.matches(Mode::ReadOnly));
        assert!(!filter.matches(Mode::WriteOnly));
        assert_eq!(Mode::ReadOnly.combine(Mode::WriteOnly), Mode::ReadWrite);
    }
}
