//! Operator and conversion tables.
//!
//! Dispatch is per-kind table lookup, not inheritance: signed integer kinds
//! route division/remainder/shift/comparison to signed instructions,
//! unsigned kinds to unsigned ones, floats support add/sub/mul/div and
//! ordered comparison only, and 128-bit vector kinds lower lane-wise with
//! comparisons yielding a lane-mask kind instead of a scalar bool.
//!
//! A binary operator requires both operands to share the exact same kind
//! name; coercion happens before dispatch (see [`promote`] and [`convert`]).

use marrow_types::{BinOp, UnOp};
use wasm_encoder::{Instruction, MemArg};

use crate::error::{CodegenError, CodegenResult};
use crate::primitive::{MachineRepr, PrimitiveKind};

/// An instruction sequence; the unit every table entry produces.
pub type InstrSeq = Vec<Instruction<'static>>;

/// Create a `MemArg`. Alignment hint is always 0: struct layout is
/// byte-packed, so multi-byte fields can sit at any offset.
pub(crate) fn memarg(offset: u64) -> MemArg {
    MemArg {
        offset,
        align: 0,
        memory_index: 0,
    }
}

/// A lowered binary operator: the instruction(s) applied to two same-kind
/// operands already on the stack, and the kind of the result.
pub struct BinaryLowering {
    pub code: InstrSeq,
    pub result: PrimitiveKind,
}

fn unsupported(op: impl std::fmt::Display, kind: PrimitiveKind) -> CodegenError {
    CodegenError::OperatorTypeMismatch {
        op: op.to_string(),
        lhs: kind.name().to_string(),
        rhs: kind.name().to_string(),
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Binary operators
// ══════════════════════════════════════════════════════════════════════════════

/// Look up the lowering of `op` for two operands of `kind`.
pub fn binary(kind: PrimitiveKind, op: BinOp) -> CodegenResult<BinaryLowering> {
    use Instruction as I;
    use PrimitiveKind as K;

    let arith = |instr: Instruction<'static>| {
        Ok(BinaryLowering {
            code: vec![instr],
            result: kind,
        })
    };
    let cmp = |instr: Instruction<'static>| {
        Ok(BinaryLowering {
            code: vec![instr],
            result: kind.comparison_result(),
        })
    };
    let reject = || Err(unsupported(op, kind));

    match kind {
        // bool supports equality and bit-logic only.
        K::Bool => match op {
            BinOp::Eq => cmp(I::I32Eq),
            BinOp::Ne => cmp(I::I32Ne),
            BinOp::BitAnd => arith(I::I32And),
            BinOp::BitOr => arith(I::I32Or),
            BinOp::BitXor => arith(I::I32Xor),
            _ => reject(),
        },

        K::I8 | K::I16 | K::I32 => match op {
            BinOp::Add => arith(I::I32Add),
            BinOp::Sub => arith(I::I32Sub),
            BinOp::Mul => arith(I::I32Mul),
            BinOp::Div => arith(I::I32DivS),
            BinOp::Rem => arith(I::I32RemS),
            BinOp::Shl => arith(I::I32Shl),
            BinOp::Shr => arith(I::I32ShrS),
            BinOp::BitAnd => arith(I::I32And),
            BinOp::BitOr => arith(I::I32Or),
            BinOp::BitXor => arith(I::I32Xor),
            BinOp::Eq => cmp(I::I32Eq),
            BinOp::Ne => cmp(I::I32Ne),
            BinOp::Lt => cmp(I::I32LtS),
            BinOp::Le => cmp(I::I32LeS),
            BinOp::Gt => cmp(I::I32GtS),
            BinOp::Ge => cmp(I::I32GeS),
        },

        K::U8 | K::U16 | K::U32 => match op {
            BinOp::Add => arith(I::I32Add),
            BinOp::Sub => arith(I::I32Sub),
            BinOp::Mul => arith(I::I32Mul),
            BinOp::Div => arith(I::I32DivU),
            BinOp::Rem => arith(I::I32RemU),
            BinOp::Shl => arith(I::I32Shl),
            BinOp::Shr => arith(I::I32ShrU),
            BinOp::BitAnd => arith(I::I32And),
            BinOp::BitOr => arith(I::I32Or),
            BinOp::BitXor => arith(I::I32Xor),
            BinOp::Eq => cmp(I::I32Eq),
            BinOp::Ne => cmp(I::I32Ne),
            BinOp::Lt => cmp(I::I32LtU),
            BinOp::Le => cmp(I::I32LeU),
            BinOp::Gt => cmp(I::I32GtU),
            BinOp::Ge => cmp(I::I32GeU),
        },

        K::I64 => match op {
            BinOp::Add => arith(I::I64Add),
            BinOp::Sub => arith(I::I64Sub),
            BinOp::Mul => arith(I::I64Mul),
            BinOp::Div => arith(I::I64DivS),
            BinOp::Rem => arith(I::I64RemS),
            BinOp::Shl => arith(I::I64Shl),
            BinOp::Shr => arith(I::I64ShrS),
            BinOp::BitAnd => arith(I::I64And),
            BinOp::BitOr => arith(I::I64Or),
            BinOp::BitXor => arith(I::I64Xor),
            BinOp::Eq => cmp(I::I64Eq),
            BinOp::Ne => cmp(I::I64Ne),
            BinOp::Lt => cmp(I::I64LtS),
            BinOp::Le => cmp(I::I64LeS),
            BinOp::Gt => cmp(I::I64GtS),
            BinOp::Ge => cmp(I::I64GeS),
        },

        K::U64 => match op {
            BinOp::Add => arith(I::I64Add),
            BinOp::Sub => arith(I::I64Sub),
            BinOp::Mul => arith(I::I64Mul),
            BinOp::Div => arith(I::I64DivU),
            BinOp::Rem => arith(I::I64RemU),
            BinOp::Shl => arith(I::I64Shl),
            BinOp::Shr => arith(I::I64ShrU),
            BinOp::BitAnd => arith(I::I64And),
            BinOp::BitOr => arith(I::I64Or),
            BinOp::BitXor => arith(I::I64Xor),
            BinOp::Eq => cmp(I::I64Eq),
            BinOp::Ne => cmp(I::I64Ne),
            BinOp::Lt => cmp(I::I64LtU),
            BinOp::Le => cmp(I::I64LeU),
            BinOp::Gt => cmp(I::I64GtU),
            BinOp::Ge => cmp(I::I64GeU),
        },

        K::F32 => match op {
            BinOp::Add => arith(I::F32Add),
            BinOp::Sub => arith(I::F32Sub),
            BinOp::Mul => arith(I::F32Mul),
            BinOp::Div => arith(I::F32Div),
            BinOp::Eq => cmp(I::F32Eq),
            BinOp::Ne => cmp(I::F32Ne),
            BinOp::Lt => cmp(I::F32Lt),
            BinOp::Le => cmp(I::F32Le),
            BinOp::Gt => cmp(I::F32Gt),
            BinOp::Ge => cmp(I::F32Ge),
            _ => reject(),
        },

        K::F64 => match op {
            BinOp::Add => arith(I::F64Add),
            BinOp::Sub => arith(I::F64Sub),
            BinOp::Mul => arith(I::F64Mul),
            BinOp::Div => arith(I::F64Div),
            BinOp::Eq => cmp(I::F64Eq),
            BinOp::Ne => cmp(I::F64Ne),
            BinOp::Lt => cmp(I::F64Lt),
            BinOp::Le => cmp(I::F64Le),
            BinOp::Gt => cmp(I::F64Gt),
            BinOp::Ge => cmp(I::F64Ge),
            _ => reject(),
        },

        // Lane-wise vector lowering. The target has no 8-lane multiply, no
        // vector division, and no unsigned 64-lane comparisons; those
        // combinations reject. Vector shifts take a scalar count and so
        // fall outside the same-kind binary table.
        K::I8x16 => match op {
            BinOp::Add => arith(I::I8x16Add),
            BinOp::Sub => arith(I::I8x16Sub),
            BinOp::BitAnd => arith(I::V128And),
            BinOp::BitOr => arith(I::V128Or),
            BinOp::BitXor => arith(I::V128Xor),
            BinOp::Eq => cmp(I::I8x16Eq),
            BinOp::Ne => cmp(I::I8x16Ne),
            BinOp::Lt => cmp(I::I8x16LtS),
            BinOp::Le => cmp(I::I8x16LeS),
            BinOp::Gt => cmp(I::I8x16GtS),
            BinOp::Ge => cmp(I::I8x16GeS),
            _ => reject(),
        },

        K::U8x16 => match op {
            BinOp::Add => arith(I::I8x16Add),
            BinOp::Sub => arith(I::I8x16Sub),
            BinOp::BitAnd => arith(I::V128And),
            BinOp::BitOr => arith(I::V128Or),
            BinOp::BitXor => arith(I::V128Xor),
            BinOp::Eq => cmp(I::I8x16Eq),
            BinOp::Ne => cmp(I::I8x16Ne),
            BinOp::Lt => cmp(I::I8x16LtU),
            BinOp::Le => cmp(I::I8x16LeU),
            BinOp::Gt => cmp(I::I8x16GtU),
            BinOp::Ge => cmp(I::I8x16GeU),
            _ => reject(),
        },

        K::I16x8 => match op {
            BinOp::Add => arith(I::I16x8Add),
            BinOp::Sub => arith(I::I16x8Sub),
            BinOp::Mul => arith(I::I16x8Mul),
            BinOp::BitAnd => arith(I::V128And),
            BinOp::BitOr => arith(I::V128Or),
            BinOp::BitXor => arith(I::V128Xor),
            BinOp::Eq => cmp(I::I16x8Eq),
            BinOp::Ne => cmp(I::I16x8Ne),
            BinOp::Lt => cmp(I::I16x8LtS),
            BinOp::Le => cmp(I::I16x8LeS),
            BinOp::Gt => cmp(I::I16x8GtS),
            BinOp::Ge => cmp(I::I16x8GeS),
            _ => reject(),
        },

        K::U16x8 => match op {
            BinOp::Add => arith(I::I16x8Add),
            BinOp::Sub => arith(I::I16x8Sub),
            BinOp::Mul => arith(I::I16x8Mul),
            BinOp::BitAnd => arith(I::V128And),
            BinOp::BitOr => arith(I::V128Or),
            BinOp::BitXor => arith(I::V128Xor),
            BinOp::Eq => cmp(I::I16x8Eq),
            BinOp::Ne => cmp(I::I16x8Ne),
            BinOp::Lt => cmp(I::I16x8LtU),
            BinOp::Le => cmp(I::I16x8LeU),
            BinOp::Gt => cmp(I::I16x8GtU),
            BinOp::Ge => cmp(I::I16x8GeU),
            _ => reject(),
        },

        K::I32x4 => match op {
            BinOp::Add => arith(I::I32x4Add),
            BinOp::Sub => arith(I::I32x4Sub),
            BinOp::Mul => arith(I::I32x4Mul),
            BinOp::BitAnd => arith(I::V128And),
            BinOp::BitOr => arith(I::V128Or),
            BinOp::BitXor => arith(I::V128Xor),
            BinOp::Eq => cmp(I::I32x4Eq),
            BinOp::Ne => cmp(I::I32x4Ne),
            BinOp::Lt => cmp(I::I32x4LtS),
            BinOp::Le => cmp(I::I32x4LeS),
            BinOp::Gt => cmp(I::I32x4GtS),
            BinOp::Ge => cmp(I::I32x4GeS),
            _ => reject(),
        },

        K::U32x4 => match op {
            BinOp::Add => arith(I::I32x4Add),
            BinOp::Sub => arith(I::I32x4Sub),
            BinOp::Mul => arith(I::I32x4Mul),
            BinOp::BitAnd => arith(I::V128And),
            BinOp::BitOr => arith(I::V128Or),
            BinOp::BitXor => arith(I::V128Xor),
            BinOp::Eq => cmp(I::I32x4Eq),
            BinOp::Ne => cmp(I::I32x4Ne),
            BinOp::Lt => cmp(I::I32x4LtU),
            BinOp::Le => cmp(I::I32x4LeU),
            BinOp::Gt => cmp(I::I32x4GtU),
            BinOp::Ge => cmp(I::I32x4GeU),
            _ => reject(),
        },

        K::I64x2 => match op {
            BinOp::Add => arith(I::I64x2Add),
            BinOp::Sub => arith(I::I64x2Sub),
            BinOp::Mul => arith(I::I64x2Mul),
            BinOp::BitAnd => arith(I::V128And),
            BinOp::BitOr => arith(I::V128Or),
            BinOp::BitXor => arith(I::V128Xor),
            BinOp::Eq => cmp(I::I64x2Eq),
            BinOp::Ne => cmp(I::I64x2Ne),
            BinOp::Lt => cmp(I::I64x2LtS),
            BinOp::Le => cmp(I::I64x2LeS),
            BinOp::Gt => cmp(I::I64x2GtS),
            BinOp::Ge => cmp(I::I64x2GeS),
            _ => reject(),
        },

        K::F32x4 => match op {
            BinOp::Add => arith(I::F32x4Add),
            BinOp::Sub => arith(I::F32x4Sub),
            BinOp::Mul => arith(I::F32x4Mul),
            BinOp::Div => arith(I::F32x4Div),
            BinOp::Eq => cmp(I::F32x4Eq),
            BinOp::Ne => cmp(I::F32x4Ne),
            BinOp::Lt => cmp(I::F32x4Lt),
            BinOp::Le => cmp(I::F32x4Le),
            BinOp::Gt => cmp(I::F32x4Gt),
            BinOp::Ge => cmp(I::F32x4Ge),
            _ => reject(),
        },

        K::F64x2 => match op {
            BinOp::Add => arith(I::F64x2Add),
            BinOp::Sub => arith(I::F64x2Sub),
            BinOp::Mul => arith(I::F64x2Mul),
            BinOp::Div => arith(I::F64x2Div),
            BinOp::Eq => cmp(I::F64x2Eq),
            BinOp::Ne => cmp(I::F64x2Ne),
            BinOp::Lt => cmp(I::F64x2Lt),
            BinOp::Le => cmp(I::F64x2Le),
            BinOp::Gt => cmp(I::F64x2Gt),
            BinOp::Ge => cmp(I::F64x2Ge),
            _ => reject(),
        },
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Unary operators
// ══════════════════════════════════════════════════════════════════════════════

/// Look up the lowering of a unary operator.
pub fn unary(kind: PrimitiveKind, op: UnOp) -> CodegenResult<BinaryLowering> {
    use Instruction as I;
    match op {
        UnOp::Not => match kind {
            PrimitiveKind::Bool => Ok(BinaryLowering {
                code: vec![I::I32Eqz],
                result: PrimitiveKind::Bool,
            }),
            k if k.is_vector() => Ok(BinaryLowering {
                code: vec![I::V128Not],
                result: k,
            }),
            _ => Err(unsupported("!", kind)),
        },
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Conversions and promotion
// ══════════════════════════════════════════════════════════════════════════════

/// The pairwise conversion table: the instruction sequence turning a `from`
/// value on the stack into a canonical `to` value.
///
/// Integer widening extends by the *source's* sign; narrowing wraps and then
/// re-normalizes narrow targets; float→integer saturates instead of
/// trapping. Only scalar numeric kinds convert; everything else rejects.
pub fn convert(from: PrimitiveKind, to: PrimitiveKind) -> CodegenResult<InstrSeq> {
    use Instruction as I;
    use MachineRepr as R;

    if from == to {
        return Ok(Vec::new());
    }
    if from.is_vector() || to.is_vector() || from == PrimitiveKind::Bool {
        return Err(CodegenError::OperatorTypeMismatch {
            op: "convert".to_string(),
            lhs: from.name().to_string(),
            rhs: to.name().to_string(),
        });
    }

    let mut code: InstrSeq = Vec::new();
    match (from.repr(), to.repr()) {
        // Same representation class: bit identity, then narrow-target
        // canonicalization below.
        (R::I32, R::I32) | (R::I64, R::I64) => {}

        (R::I32, R::I64) => {
            code.push(if from.is_signed() {
                I::I64ExtendI32S
            } else {
                I::I64ExtendI32U
            });
        }
        (R::I64, R::I32) => code.push(I::I32WrapI64),

        (R::I32, R::F32) => code.push(if from.is_signed() {
            I::F32ConvertI32S
        } else {
            I::F32ConvertI32U
        }),
        (R::I32, R::F64) => code.push(if from.is_signed() {
            I::F64ConvertI32S
        } else {
            I::F64ConvertI32U
        }),
        (R::I64, R::F32) => code.push(if from.is_signed() {
            I::F32ConvertI64S
        } else {
            I::F32ConvertI64U
        }),
        (R::I64, R::F64) => code.push(if from.is_signed() {
            I::F64ConvertI64S
        } else {
            I::F64ConvertI64U
        }),

        (R::F32, R::I32) => code.push(if to.is_signed() {
            I::I32TruncSatF32S
        } else {
            I::I32TruncSatF32U
        }),
        (R::F64, R::I32) => code.push(if to.is_signed() {
            I::I32TruncSatF64S
        } else {
            I::I32TruncSatF64U
        }),
        (R::F32, R::I64) => code.push(if to.is_signed() {
            I::I64TruncSatF32S
        } else {
            I::I64TruncSatF32U
        }),
        (R::F64, R::I64) => code.push(if to.is_signed() {
            I::I64TruncSatF64S
        } else {
            I::I64TruncSatF64U
        }),

        (R::F32, R::F64) => code.push(I::F64PromoteF32),
        (R::F64, R::F32) => code.push(I::F32DemoteF64),

        (R::F32, R::F32) | (R::F64, R::F64) | (R::V128, _) | (_, R::V128) => {
            return Err(CodegenError::Internal(format!(
                "conversion {from} -> {to} fell through the table"
            )));
        }
    }

    // Narrow integer targets are canonicalized so subsequent reads agree.
    code.extend(normalize(to));
    Ok(code)
}

/// Resolve the promotion lattice between two differing kinds: returns the
/// kind the *narrower* operand must be converted to, or `None` when the
/// kinds sit on the same rung (no ambient coercion exists; exact-kind
/// operator dispatch will reject them).
pub fn promote(a: PrimitiveKind, b: PrimitiveKind) -> Option<PrimitiveKind> {
    let ra = a.repr().promotion_rank()?;
    let rb = b.repr().promotion_rank()?;
    match ra.cmp(&rb) {
        std::cmp::Ordering::Less => Some(b),
        std::cmp::Ordering::Greater => Some(a),
        std::cmp::Ordering::Equal => None,
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Loads, stores, normalization
// ══════════════════════════════════════════════════════════════════════════════

/// The kind-appropriate load from memory at `base + offset`, including
/// sign/zero extension of narrow kinds and 0/1 normalization of bool.
pub fn load(kind: PrimitiveKind, offset: u64) -> InstrSeq {
    use Instruction as I;
    use PrimitiveKind as K;
    let m = memarg(offset);
    match kind {
        K::Bool => vec![I::I32Load8U(m), I::I32Const(0), I::I32GtU],
        K::I8 => vec![I::I32Load8S(m)],
        K::U8 => vec![I::I32Load8U(m)],
        K::I16 => vec![I::I32Load16S(m)],
        K::U16 => vec![I::I32Load16U(m)],
        K::I32 | K::U32 => vec![I::I32Load(m)],
        K::I64 | K::U64 => vec![I::I64Load(m)],
        K::F32 => vec![I::F32Load(m)],
        K::F64 => vec![I::F64Load(m)],
        _ => vec![I::V128Load(m)],
    }
}

/// The kind-appropriate store to memory at `base + offset` (1/2/4/8/16-byte
/// width).
pub fn store(kind: PrimitiveKind, offset: u64) -> Instruction<'static> {
    use Instruction as I;
    use PrimitiveKind as K;
    let m = memarg(offset);
    match kind {
        K::Bool | K::I8 | K::U8 => I::I32Store8(m),
        K::I16 | K::U16 => I::I32Store16(m),
        K::I32 | K::U32 => I::I32Store(m),
        K::I64 | K::U64 => I::I64Store(m),
        K::F32 => I::F32Store(m),
        K::F64 => I::F64Store(m),
        _ => I::V128Store(m),
    }
}

/// Canonicalize a register value of a narrow kind: mask unsigned kinds to
/// their low bytes, sign-extend signed ones, normalize bool to 0/1 with an
/// unsigned-greater-than-zero test. Wide kinds need nothing.
pub fn normalize(kind: PrimitiveKind) -> InstrSeq {
    use Instruction as I;
    match kind {
        PrimitiveKind::Bool => vec![I::I32Const(0), I::I32GtU],
        PrimitiveKind::I8 => vec![I::I32Extend8S],
        PrimitiveKind::I16 => vec![I::I32Extend16S],
        PrimitiveKind::U8 => vec![I::I32Const(0xFF), I::I32And],
        PrimitiveKind::U16 => vec![I::I32Const(0xFFFF), I::I32And],
        _ => Vec::new(),
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Intrinsics
// ══════════════════════════════════════════════════════════════════════════════

/// A lowered intrinsic: expected operand count, code, result kind.
pub struct IntrinsicLowering {
    pub arity: usize,
    pub code: InstrSeq,
    pub result: PrimitiveKind,
}

/// Per-kind intrinsic operators outside the arithmetic set: float math and
/// bit-reinterpretation, integer bit counting and rotates.
pub fn intrinsic(kind: PrimitiveKind, name: &str) -> CodegenResult<IntrinsicLowering> {
    use Instruction as I;
    use PrimitiveKind as K;

    let one = |instr: Instruction<'static>, result: PrimitiveKind| {
        Ok(IntrinsicLowering {
            arity: 1,
            code: vec![instr],
            result,
        })
    };
    let two = |instr: Instruction<'static>, result: PrimitiveKind| {
        Ok(IntrinsicLowering {
            arity: 2,
            code: vec![instr],
            result,
        })
    };
    let reject = || Err(unsupported(format!("intrinsic `{name}`"), kind));

    match kind {
        K::F32 => match name {
            "sqrt" => one(I::F32Sqrt, kind),
            "floor" => one(I::F32Floor, kind),
            "ceil" => one(I::F32Ceil, kind),
            "trunc" => one(I::F32Trunc, kind),
            "nearest" => one(I::F32Nearest, kind),
            "abs" => one(I::F32Abs, kind),
            "neg" => one(I::F32Neg, kind),
            "copysign" => two(I::F32Copysign, kind),
            "min" => two(I::F32Min, kind),
            "max" => two(I::F32Max, kind),
            "reinterpret" => one(I::I32ReinterpretF32, K::U32),
            _ => reject(),
        },
        K::F64 => match name {
            "sqrt" => one(I::F64Sqrt, kind),
            "floor" => one(I::F64Floor, kind),
            "ceil" => one(I::F64Ceil, kind),
            "trunc" => one(I::F64Trunc, kind),
            "nearest" => one(I::F64Nearest, kind),
            "abs" => one(I::F64Abs, kind),
            "neg" => one(I::F64Neg, kind),
            "copysign" => two(I::F64Copysign, kind),
            "min" => two(I::F64Min, kind),
            "max" => two(I::F64Max, kind),
            "reinterpret" => one(I::I64ReinterpretF64, K::U64),
            _ => reject(),
        },
        K::I32 | K::U32 => match name {
            "clz" => one(I::I32Clz, kind),
            "ctz" => one(I::I32Ctz, kind),
            "popcnt" => one(I::I32Popcnt, kind),
            "rotl" => two(I::I32Rotl, kind),
            "rotr" => two(I::I32Rotr, kind),
            "reinterpret" => one(I::F32ReinterpretI32, K::F32),
            _ => reject(),
        },
        K::I64 | K::U64 => match name {
            "clz" => one(I::I64Clz, kind),
            "ctz" => one(I::I64Ctz, kind),
            "popcnt" => one(I::I64Popcnt, kind),
            "rotl" => two(I::I64Rotl, kind),
            "rotr" => two(I::I64Rotr, kind),
            "reinterpret" => one(I::F64ReinterpretI64, K::F64),
            _ => reject(),
        },
        _ => reject(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use marrow_types::BinOp;

    #[test]
    fn signed_and_unsigned_division_differ() {
        let s = binary(PrimitiveKind::I32, BinOp::Div).unwrap();
        let u = binary(PrimitiveKind::U32, BinOp::Div).unwrap();
        assert!(matches!(s.code.as_slice(), [Instruction::I32DivS]));
        assert!(matches!(u.code.as_slice(), [Instruction::I32DivU]));
    }

    #[test]
    fn float_remainder_rejected() {
        assert!(matches!(
            binary(PrimitiveKind::F64, BinOp::Rem),
            Err(CodegenError::OperatorTypeMismatch { .. })
        ));
    }

    #[test]
    fn vector_comparison_yields_lane_mask() {
        let l = binary(PrimitiveKind::F32x4, BinOp::Lt).unwrap();
        assert_eq!(l.result, PrimitiveKind::U32x4);
        let s = binary(PrimitiveKind::I32, BinOp::Lt).unwrap();
        assert_eq!(s.result, PrimitiveKind::Bool);
    }

    #[test]
    fn widening_extends_by_source_sign() {
        let signed = convert(PrimitiveKind::I32, PrimitiveKind::I64).unwrap();
        assert!(matches!(signed.as_slice(), [Instruction::I64ExtendI32S]));
        let unsigned = convert(PrimitiveKind::U32, PrimitiveKind::U64).unwrap();
        assert!(matches!(unsigned.as_slice(), [Instruction::I64ExtendI32U]));
    }

    #[test]
    fn float_to_int_saturates() {
        let seq = convert(PrimitiveKind::F64, PrimitiveKind::I32).unwrap();
        assert!(matches!(seq.as_slice(), [Instruction::I32TruncSatF64S]));
    }

    #[test]
    fn promotion_prefers_wider_repr() {
        assert_eq!(
            promote(PrimitiveKind::I32, PrimitiveKind::I64),
            Some(PrimitiveKind::I64)
        );
        assert_eq!(
            promote(PrimitiveKind::F32, PrimitiveKind::U64),
            Some(PrimitiveKind::F32)
        );
        // Same rung: no ambient coercion.
        assert_eq!(promote(PrimitiveKind::I32, PrimitiveKind::U32), None);
    }

    #[test]
    fn narrow_conversion_renormalizes() {
        let seq = convert(PrimitiveKind::I64, PrimitiveKind::U8).unwrap();
        assert!(matches!(
            seq.as_slice(),
            [
                Instruction::I32WrapI64,
                Instruction::I32Const(0xFF),
                Instruction::I32And
            ]
        ));
    }
}
