//! Core datapoint types.
//!
//! Defines the closed [`DatapointType`] enumeration, the tagged
//! [`Value`] union, per-datapoint [`DatapointFlags`], and the
//! [`Datapoint`] record stored in the canonical arrays.

use bitflags::bitflags;
use static_assertions::const_assert_eq;

/// Number of datapoint types.
pub const TYPE_COUNT: usize = 6;

/// Datapoint type — closed enumeration.
///
/// Each type has its own value array, datapoint count, and subscriber
/// table; all cross-type operations dispatch through this enum as an
/// index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum DatapointType {
    /// On/off process value, stored as 0/1.
    Binary = 0,
    /// Momentary command point.
    Button = 1,
    /// Floating point measurement/command value.
    Float = 2,
    /// Signed integer value.
    Int = 3,
    /// Enumerated state value.
    MultiState = 4,
    /// Unsigned integer value.
    Uint = 5,
}

impl DatapointType {
    /// All types, in index order.
    pub const ALL: [DatapointType; TYPE_COUNT] = [
        Self::Binary,
        Self::Button,
        Self::Float,
        Self::Int,
        Self::MultiState,
        Self::Uint,
    ];

    /// Convert from raw `u8` value. Returns `None` for invalid values.
    ///
    /// This is the only place an out-of-range type index can appear;
    /// past this boundary the enum makes unsupported types
    /// unrepresentable.
    #[inline]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Binary),
            1 => Some(Self::Button),
            2 => Some(Self::Float),
            3 => Some(Self::Int),
            4 => Some(Self::MultiState),
            5 => Some(Self::Uint),
            _ => None,
        }
    }

    /// Table index for this type.
    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Value tag stored by datapoints of this type.
    #[inline]
    pub const fn tag(self) -> ValueTag {
        match self {
            Self::Float => ValueTag::Float,
            Self::Int => ValueTag::Int,
            Self::Binary | Self::Button | Self::MultiState | Self::Uint => ValueTag::Uint,
        }
    }
}

/// Discriminant of a [`Value`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ValueTag {
    /// 32-bit float payload.
    Float = 0,
    /// Unsigned integer payload (also binary/button/multi-state).
    Uint = 1,
    /// Signed integer payload.
    Int = 2,
}

/// Tagged datapoint value union.
///
/// Equality is bitwise per tag: two `Float` values compare equal iff
/// their bit patterns match, so rewriting an identical pattern
/// (including NaN) is detected as unchanged.
#[derive(Debug, Clone, Copy)]
pub enum Value {
    /// Floating point value.
    Float(f32),
    /// Unsigned integer value.
    Uint(u32),
    /// Signed integer value.
    Int(i32),
}

const_assert_eq!(core::mem::size_of::<Value>(), 8);

impl Value {
    /// The tag of this value.
    #[inline]
    pub const fn tag(self) -> ValueTag {
        match self {
            Self::Float(_) => ValueTag::Float,
            Self::Uint(_) => ValueTag::Uint,
            Self::Int(_) => ValueTag::Int,
        }
    }

    /// Zero value for the given tag.
    #[inline]
    pub const fn zero(tag: ValueTag) -> Self {
        match tag {
            ValueTag::Float => Self::Float(0.0),
            ValueTag::Uint => Self::Uint(0),
            ValueTag::Int => Self::Int(0),
        }
    }

    /// Float payload, if this is a `Float` value.
    #[inline]
    pub const fn as_f32(self) -> Option<f32> {
        match self {
            Self::Float(v) => Some(v),
            _ => None,
        }
    }

    /// Unsigned integer payload, if this is a `Uint` value.
    #[inline]
    pub const fn as_u32(self) -> Option<u32> {
        match self {
            Self::Uint(v) => Some(v),
            _ => None,
        }
    }

    /// Signed integer payload, if this is an `Int` value.
    #[inline]
    pub const fn as_i32(self) -> Option<i32> {
        match self {
            Self::Int(v) => Some(v),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Float(a), Self::Float(b)) => a.to_bits() == b.to_bits(),
            (Self::Uint(a), Self::Uint(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

bitflags! {
    /// Per-datapoint flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct DatapointFlags: u32 {
        /// Value is persisted to non-volatile storage.
        const NVM = 1 << 0;
    }
}

impl Default for DatapointFlags {
    fn default() -> Self {
        Self::empty()
    }
}

/// A single datapoint record in a canonical array.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Datapoint {
    /// Current value.
    pub value: Value,
    /// Datapoint flags.
    pub flags: DatapointFlags,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_roundtrip() {
        for val in 0..TYPE_COUNT as u8 {
            let ty = DatapointType::from_u8(val).unwrap();
            assert_eq!(ty as u8, val);
            assert_eq!(ty.index(), val as usize);
        }
        assert!(DatapointType::from_u8(TYPE_COUNT as u8).is_none());
        assert!(DatapointType::from_u8(255).is_none());
    }

    #[test]
    fn all_covers_every_type_once() {
        for (idx, ty) in DatapointType::ALL.iter().enumerate() {
            assert_eq!(ty.index(), idx);
        }
    }

    #[test]
    fn type_value_tags() {
        assert_eq!(DatapointType::Float.tag(), ValueTag::Float);
        assert_eq!(DatapointType::Int.tag(), ValueTag::Int);
        assert_eq!(DatapointType::Binary.tag(), ValueTag::Uint);
        assert_eq!(DatapointType::Button.tag(), ValueTag::Uint);
        assert_eq!(DatapointType::MultiState.tag(), ValueTag::Uint);
        assert_eq!(DatapointType::Uint.tag(), ValueTag::Uint);
    }

    #[test]
    fn value_equality_is_bitwise_per_tag() {
        assert_eq!(Value::Float(1.5), Value::Float(1.5));
        assert_ne!(Value::Float(1.5), Value::Float(1.6));
        assert_eq!(Value::Uint(7), Value::Uint(7));
        assert_ne!(Value::Int(-1), Value::Int(1));

        // Same bit pattern, different tags — never equal.
        assert_ne!(Value::Uint(0), Value::Int(0));
        assert_ne!(Value::Float(0.0), Value::Uint(0));

        // NaN equals itself bitwise, so a NaN rewrite is "unchanged".
        assert_eq!(Value::Float(f32::NAN), Value::Float(f32::NAN));
        // Positive and negative zero differ bitwise.
        assert_ne!(Value::Float(0.0), Value::Float(-0.0));
    }

    #[test]
    fn value_accessors() {
        assert_eq!(Value::Float(2.5).as_f32(), Some(2.5));
        assert_eq!(Value::Float(2.5).as_u32(), None);
        assert_eq!(Value::Uint(9).as_u32(), Some(9));
        assert_eq!(Value::Int(-4).as_i32(), Some(-4));
        assert_eq!(Value::Int(-4).as_f32(), None);
    }

    #[test]
    fn zero_values_match_tags() {
        for tag in [ValueTag::Float, ValueTag::Uint, ValueTag::Int] {
            assert_eq!(Value::zero(tag).tag(), tag);
        }
    }

    #[test]
    fn flags_nvm_bit() {
        let flags = DatapointFlags::NVM;
        assert_eq!(flags.bits(), 1);
        assert!(flags.contains(DatapointFlags::NVM));
        assert!(!DatapointFlags::default().contains(DatapointFlags::NVM));
    }
}
