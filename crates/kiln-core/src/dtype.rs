use std::fmt;
use std::str::FromStr;

use crate::error::KilnError;

/// Runtime tag for the element type held by a buffer.
///
/// A buffer's bytes carry no type information of their own; this tag is what
/// lets buffers of different element types live side by side in one
/// collection and still be dispatched to typed code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum DType {
    /// 32-bit IEEE 754 single-precision float
    F32,
    /// 16-bit IEEE 754 half-precision float
    F16,
    /// 16-bit Brain Float (same exponent range as F32, reduced mantissa)
    BF16,
    /// 64-bit IEEE 754 double-precision float
    F64,
    /// 8-bit signed integer
    I8,
    /// 16-bit signed integer
    I16,
    /// 32-bit signed integer
    I32,
    /// 64-bit signed integer
    I64,
    /// 8-bit unsigned integer
    U8,
}

impl DType {
    pub const ALL: [DType; 9] = [
        DType::F32,
        DType::F16,
        DType::BF16,
        DType::F64,
        DType::I8,
        DType::I16,
        DType::I32,
        DType::I64,
        DType::U8,
    ];

    /// Size in bytes of a single element.
    pub fn size_in_bytes(&self) -> usize {
        match self {
            DType::I8 | DType::U8 => 1,
            DType::F16 | DType::BF16 | DType::I16 => 2,
            DType::F32 | DType::I32 => 4,
            DType::F64 | DType::I64 => 8,
        }
    }

    /// Whether this dtype is a floating-point type.
    pub fn is_float(&self) -> bool {
        matches!(self, DType::F16 | DType::BF16 | DType::F32 | DType::F64)
    }

    /// Whether this dtype is an integer type.
    pub fn is_integer(&self) -> bool {
        !self.is_float()
    }

    pub fn name(&self) -> &'static str {
        match self {
            DType::F32 => "f32",
            DType::F16 => "f16",
            DType::BF16 => "bf16",
            DType::F64 => "f64",
            DType::I8 => "i8",
            DType::I16 => "i16",
            DType::I32 => "i32",
            DType::I64 => "i64",
            DType::U8 => "u8",
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DType {
    type Err = KilnError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "f32" | "float" | "float32" => Ok(DType::F32),
            "f16" | "float16" => Ok(DType::F16),
            "bf16" | "bfloat16" => Ok(DType::BF16),
            "f64" | "float64" => Ok(DType::F64),
            "i8" | "int8" => Ok(DType::I8),
            "i16" | "int16" => Ok(DType::I16),
            "i32" | "int32" => Ok(DType::I32),
            "i64" | "int64" => Ok(DType::I64),
            "u8" | "uint8" => Ok(DType::U8),
            other => Err(KilnError::Parse(format!("unknown dtype '{other}'"))),
        }
    }
}

/// Rust types that can be stored in a buffer.
///
/// This is the compile-time half of the type tag registry: `T::DTYPE` maps a
/// concrete type to its runtime tag, and [`dtype_dispatch!`](crate::dtype_dispatch)
/// maps a tag back to a concrete type.
pub trait Element:
    Copy + Send + Sync + PartialEq + fmt::Debug + bytemuck::Pod + 'static
{
    /// The corresponding DType enum variant.
    const DTYPE: DType;

    /// Widen to f64 (used for tolerance comparisons).
    fn to_f64(self) -> f64;
}

macro_rules! impl_element {
    ($($t:ty => $dtype:ident),* $(,)?) => {
        $(
            impl Element for $t {
                const DTYPE: DType = DType::$dtype;
                fn to_f64(self) -> f64 {
                    self as f64
                }
            }
        )*
    };
}

impl_element!(
    f32 => F32,
    f64 => F64,
    i8 => I8,
    i16 => I16,
    i32 => I32,
    i64 => I64,
    u8 => U8,
);

impl Element for half::f16 {
    const DTYPE: DType = DType::F16;
    fn to_f64(self) -> f64 {
        half::f16::to_f64(self)
    }
}

impl Element for half::bf16 {
    const DTYPE: DType = DType::BF16;
    fn to_f64(self) -> f64 {
        half::bf16::to_f64(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_element_sizes() {
        for dtype in DType::ALL {
            let size = crate::dtype_dispatch!(dtype, T => std::mem::size_of::<T>());
            assert_eq!(dtype.size_in_bytes(), size, "{dtype}");
        }
    }

    #[test]
    fn test_registry_roundtrip() {
        for dtype in DType::ALL {
            let back = crate::dtype_dispatch!(dtype, T => <T as Element>::DTYPE);
            assert_eq!(back, dtype);
        }
        assert_eq!(half::bf16::DTYPE, DType::BF16);
    }

    #[test]
    fn test_dtype_categories() {
        assert!(DType::F16.is_float());
        assert!(!DType::F32.is_integer());
        assert!(DType::I16.is_integer());
        assert!(DType::U8.is_integer());
    }

    #[test]
    fn test_parse() {
        assert_eq!("f32".parse::<DType>().unwrap(), DType::F32);
        assert_eq!("bfloat16".parse::<DType>().unwrap(), DType::BF16);
        assert_eq!("INT8".parse::<DType>().unwrap(), DType::I8);
        assert!("complex64".parse::<DType>().is_err());
        for dtype in DType::ALL {
            assert_eq!(dtype.to_string().parse::<DType>().unwrap(), dtype);
        }
    }

    #[test]
    fn test_to_f64() {
        assert_eq!(Element::to_f64(half::f16::from_f32(1.5)), 1.5);
        assert_eq!(Element::to_f64(-3i8), -3.0);
    }
}
