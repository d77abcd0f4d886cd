//! Primitive kinds and their target machine representations.
//!
//! A kind names both a source-level scalar/vector type and its byte size and
//! WASM value type. Narrow integer kinds (8/16-bit) share the `i32`
//! representation and get sign/zero extension on every read; the nine
//! 128-bit lane shapes all share the `v128` representation.

use serde::{Deserialize, Serialize};
use wasm_encoder::ValType;

/// The machine representation class a kind lowers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MachineRepr {
    I32,
    I64,
    F32,
    F64,
    V128,
}

/// Rank on the numeric promotion lattice, widest first:
/// f64 > f32 > i64-class > i32-class. Vector kinds never promote.
impl MachineRepr {
    pub fn promotion_rank(self) -> Option<u8> {
        match self {
            MachineRepr::F64 => Some(3),
            MachineRepr::F32 => Some(2),
            MachineRepr::I64 => Some(1),
            MachineRepr::I32 => Some(0),
            MachineRepr::V128 => None,
        }
    }
}

/// Every scalar and vector primitive kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrimitiveKind {
    Bool,
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
    F32,
    F64,
    I8x16,
    U8x16,
    I16x8,
    U16x8,
    I32x4,
    U32x4,
    I64x2,
    F32x4,
    F64x2,
}

impl PrimitiveKind {
    /// All kinds, in registration order.
    pub const ALL: [PrimitiveKind; 20] = [
        PrimitiveKind::Bool,
        PrimitiveKind::I8,
        PrimitiveKind::U8,
        PrimitiveKind::I16,
        PrimitiveKind::U16,
        PrimitiveKind::I32,
        PrimitiveKind::U32,
        PrimitiveKind::I64,
        PrimitiveKind::U64,
        PrimitiveKind::F32,
        PrimitiveKind::F64,
        PrimitiveKind::I8x16,
        PrimitiveKind::U8x16,
        PrimitiveKind::I16x8,
        PrimitiveKind::U16x8,
        PrimitiveKind::I32x4,
        PrimitiveKind::U32x4,
        PrimitiveKind::I64x2,
        PrimitiveKind::F32x4,
        PrimitiveKind::F64x2,
    ];

    /// The kind of untyped pointers: every Pointer value's underlying
    /// primitive is exactly this kind.
    pub const POINTER: PrimitiveKind = PrimitiveKind::U32;

    /// Source-level name.
    pub fn name(self) -> &'static str {
        match self {
            PrimitiveKind::Bool => "bool",
            PrimitiveKind::I8 => "i8",
            PrimitiveKind::U8 => "u8",
            PrimitiveKind::I16 => "i16",
            PrimitiveKind::U16 => "u16",
            PrimitiveKind::I32 => "i32",
            PrimitiveKind::U32 => "u32",
            PrimitiveKind::I64 => "i64",
            PrimitiveKind::U64 => "u64",
            PrimitiveKind::F32 => "f32",
            PrimitiveKind::F64 => "f64",
            PrimitiveKind::I8x16 => "i8x16",
            PrimitiveKind::U8x16 => "u8x16",
            PrimitiveKind::I16x8 => "i16x8",
            PrimitiveKind::U16x8 => "u16x8",
            PrimitiveKind::I32x4 => "i32x4",
            PrimitiveKind::U32x4 => "u32x4",
            PrimitiveKind::I64x2 => "i64x2",
            PrimitiveKind::F32x4 => "f32x4",
            PrimitiveKind::F64x2 => "f64x2",
        }
    }

    /// Look a kind up by its source-level name.
    pub fn from_name(name: &str) -> Option<PrimitiveKind> {
        PrimitiveKind::ALL.iter().copied().find(|k| k.name() == name)
    }

    /// Byte size in linear memory. Layout is byte-packed; this is also the
    /// exact footprint of an inline struct field of this kind.
    pub fn size(self) -> u32 {
        match self {
            PrimitiveKind::Bool | PrimitiveKind::I8 | PrimitiveKind::U8 => 1,
            PrimitiveKind::I16 | PrimitiveKind::U16 => 2,
            PrimitiveKind::I32 | PrimitiveKind::U32 | PrimitiveKind::F32 => 4,
            PrimitiveKind::I64 | PrimitiveKind::U64 | PrimitiveKind::F64 => 8,
            _ => 16,
        }
    }

    /// The target machine representation class.
    pub fn repr(self) -> MachineRepr {
        match self {
            PrimitiveKind::Bool
            | PrimitiveKind::I8
            | PrimitiveKind::U8
            | PrimitiveKind::I16
            | PrimitiveKind::U16
            | PrimitiveKind::I32
            | PrimitiveKind::U32 => MachineRepr::I32,
            PrimitiveKind::I64 | PrimitiveKind::U64 => MachineRepr::I64,
            PrimitiveKind::F32 => MachineRepr::F32,
            PrimitiveKind::F64 => MachineRepr::F64,
            _ => MachineRepr::V128,
        }
    }

    /// The WASM value type this kind occupies on the operand stack.
    pub fn val_type(self) -> ValType {
        match self.repr() {
            MachineRepr::I32 => ValType::I32,
            MachineRepr::I64 => ValType::I64,
            MachineRepr::F32 => ValType::F32,
            MachineRepr::F64 => ValType::F64,
            MachineRepr::V128 => ValType::V128,
        }
    }

    pub fn is_integer(self) -> bool {
        matches!(
            self,
            PrimitiveKind::Bool
                | PrimitiveKind::I8
                | PrimitiveKind::U8
                | PrimitiveKind::I16
                | PrimitiveKind::U16
                | PrimitiveKind::I32
                | PrimitiveKind::U32
                | PrimitiveKind::I64
                | PrimitiveKind::U64
        )
    }

    pub fn is_float(self) -> bool {
        matches!(self, PrimitiveKind::F32 | PrimitiveKind::F64)
    }

    pub fn is_vector(self) -> bool {
        self.repr() == MachineRepr::V128
    }

    /// Signed integer kinds (scalar or lane-wise) route division, remainder,
    /// right shift, and ordered comparison to signed instructions.
    pub fn is_signed(self) -> bool {
        matches!(
            self,
            PrimitiveKind::I8
                | PrimitiveKind::I16
                | PrimitiveKind::I32
                | PrimitiveKind::I64
                | PrimitiveKind::I8x16
                | PrimitiveKind::I16x8
                | PrimitiveKind::I32x4
                | PrimitiveKind::I64x2
        )
    }

    /// The result kind of a comparison: scalar kinds compare to `bool`,
    /// vector kinds to a lane mask of the same shape.
    pub fn comparison_result(self) -> PrimitiveKind {
        match self {
            PrimitiveKind::I8x16 | PrimitiveKind::U8x16 => PrimitiveKind::U8x16,
            PrimitiveKind::I16x8 | PrimitiveKind::U16x8 => PrimitiveKind::U16x8,
            PrimitiveKind::I32x4 | PrimitiveKind::U32x4 | PrimitiveKind::F32x4 => {
                PrimitiveKind::U32x4
            }
            PrimitiveKind::I64x2 | PrimitiveKind::F64x2 => PrimitiveKind::I64x2,
            _ => PrimitiveKind::Bool,
        }
    }
}

impl std::fmt::Display for PrimitiveKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sizes_match_reprs() {
        assert_eq!(PrimitiveKind::Bool.size(), 1);
        assert_eq!(PrimitiveKind::U16.size(), 2);
        assert_eq!(PrimitiveKind::F32.size(), 4);
        assert_eq!(PrimitiveKind::U64.size(), 8);
        assert_eq!(PrimitiveKind::F64x2.size(), 16);
        assert_eq!(PrimitiveKind::I8.val_type(), ValType::I32);
        assert_eq!(PrimitiveKind::U64.val_type(), ValType::I64);
        assert_eq!(PrimitiveKind::F32x4.val_type(), ValType::V128);
    }

    #[test]
    fn name_round_trip() {
        for kind in PrimitiveKind::ALL {
            assert_eq!(PrimitiveKind::from_name(kind.name()), Some(kind));
        }
        assert_eq!(PrimitiveKind::from_name("number"), None);
    }

    #[test]
    fn pointer_kind_is_u32() {
        assert_eq!(PrimitiveKind::POINTER, PrimitiveKind::U32);
        assert_eq!(PrimitiveKind::POINTER.size(), 4);
    }
}
