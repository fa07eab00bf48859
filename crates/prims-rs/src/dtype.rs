use serde::{Deserialize, Serialize};

/// Enumerates scalar element types supported by the primitive contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DType {
    Bool,
    Ui8,
    Si8,
    Si16,
    Si32,
    Si64,
    F16,
    Bf16,
    F32,
    F64,
    Cf32,
    Cf64,
}

/// Coarse dtype families ordered by promotion rank: boolean values promote to
/// integers, integers to floats, floats to complex numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TypeCategory {
    Boolean,
    Integral,
    Floating,
    Complex,
}

impl DType {
    pub fn is_boolean(self) -> bool {
        matches!(self, DType::Bool)
    }

    /// Returns `true` when the dtype is any signed or unsigned integer.
    pub fn is_integer(self) -> bool {
        matches!(
            self,
            DType::Ui8 | DType::Si8 | DType::Si16 | DType::Si32 | DType::Si64
        )
    }

    /// Returns `true` when the dtype is a floating-point representation.
    pub fn is_float(self) -> bool {
        matches!(self, DType::F16 | DType::Bf16 | DType::F32 | DType::F64)
    }

    /// Returns `true` when the dtype is complex.
    pub fn is_complex(self) -> bool {
        matches!(self, DType::Cf32 | DType::Cf64)
    }

    /// Returns the storage size of one element in bytes.
    pub fn size_in_bytes(self) -> usize {
        match self {
            DType::Bool | DType::Ui8 | DType::Si8 => 1,
            DType::Si16 | DType::F16 | DType::Bf16 => 2,
            DType::Si32 | DType::F32 => 4,
            DType::Si64 | DType::F64 | DType::Cf32 => 8,
            DType::Cf64 => 16,
        }
    }

    /// Returns the promotion family this dtype belongs to.
    pub fn category(self) -> TypeCategory {
        match self {
            DType::Bool => TypeCategory::Boolean,
            DType::Ui8 | DType::Si8 | DType::Si16 | DType::Si32 | DType::Si64 => {
                TypeCategory::Integral
            }
            DType::F16 | DType::Bf16 | DType::F32 | DType::F64 => TypeCategory::Floating,
            DType::Cf32 | DType::Cf64 => TypeCategory::Complex,
        }
    }

    /// Maps a complex dtype to the float dtype of its components; non-complex
    /// dtypes are returned unchanged.
    pub fn corresponding_real_dtype(self) -> DType {
        match self {
            DType::Cf32 => DType::F32,
            DType::Cf64 => DType::F64,
            other => other,
        }
    }
}

/// Returns the higher of the two promotion families.
pub fn higher_category(a: DType, b: DType) -> TypeCategory {
    a.category().max(b.category())
}
