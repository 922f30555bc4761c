use std::fmt;
use std::ops::Add;

use serde::{Deserialize, Serialize};

/// Scalar kind recorded in a header. Tags match the on-disk encoding
/// (stored as `tag - 1` in two bits).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScalarType {
    Int32 = 1,
    Int64 = 2,
    Float = 3,
    Double = 4,
}

impl ScalarType {
    pub fn tag(self) -> u64 {
        self as u64
    }

    pub fn from_tag(tag: u64) -> Option<Self> {
        match tag {
            1 => Some(ScalarType::Int32),
            2 => Some(ScalarType::Int64),
            3 => Some(ScalarType::Float),
            4 => Some(ScalarType::Double),
            _ => None,
        }
    }

    /// Bits of the IEEE exponent field, or 0 for integer types.
    pub fn exponent_bits(self) -> u32 {
        match self {
            ScalarType::Float => 8,
            ScalarType::Double => 11,
            ScalarType::Int32 | ScalarType::Int64 => 0,
        }
    }
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ScalarType::Int32 => "int32",
            ScalarType::Int64 => "int64",
            ScalarType::Float => "float",
            ScalarType::Double => "double",
        };
        f.write_str(name)
    }
}

/// Element type an array can hold.
///
/// Codecs work in `f64` and convert at the block boundary, so the trait only
/// needs `+` for in-place updates besides the two conversions and the tag.
pub trait Scalar:
    Copy + Default + PartialEq + Add<Output = Self> + fmt::Debug + Send + Sync + 'static
{
    const TYPE: ScalarType;

    fn to_f64(self) -> f64;

    fn from_f64(value: f64) -> Self;
}

impl Scalar for f32 {
    const TYPE: ScalarType = ScalarType::Float;

    #[inline]
    fn to_f64(self) -> f64 {
        self as f64
    }

    #[inline]
    fn from_f64(value: f64) -> Self {
        value as f32
    }
}

impl Scalar for f64 {
    const TYPE: ScalarType = ScalarType::Double;

    #[inline]
    fn to_f64(self) -> f64 {
        self
    }

    #[inline]
    fn from_f64(value: f64) -> Self {
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_round_trip() {
        for ty in [
            ScalarType::Int32,
            ScalarType::Int64,
            ScalarType::Float,
            ScalarType::Double,
        ] {
            assert_eq!(ScalarType::from_tag(ty.tag()), Some(ty));
        }
        assert_eq!(ScalarType::from_tag(0), None);
        assert_eq!(ScalarType::from_tag(5), None);
    }

    #[test]
    fn scalar_types_match_tags() {
        assert_eq!(<f32 as Scalar>::TYPE, ScalarType::Float);
        assert_eq!(<f64 as Scalar>::TYPE, ScalarType::Double);
        assert_eq!(ScalarType::Double.to_string(), "double");
    }
}
