//! Expression translation.
//!
//! Each node is translated to a [`Value`] and driven through the value
//! layer's capabilities. The expected type of the use site flows downward
//! into literals and arithmetic operands (an unsuffixed `2` in `f32`
//! context becomes an `f32` constant, and a scalar literal in vector
//! context becomes a splat); everywhere else operand kinds must already
//! agree, with scalar promotion by representation width as the only
//! implicit bridge.

use std::rc::Rc;

use marrow_types::{BinOp, Expr};
use wasm_encoder::{Instruction as I, ValType};

use crate::context::Ctx;
use crate::error::{CodegenError, CodegenResult};
use crate::instance::Storage;
use crate::layout::{ArrayLayout, TypeDesc};
use crate::ops::{self, InstrSeq};
use crate::primitive::PrimitiveKind;
use crate::value::{DirectFn, Pointer, StrRef, Value};
use crate::{closure, runtime};

/// Translate one expression. `expect` is the type required by the use site,
/// when known; it refines literal kinds and never forces a conversion on a
/// value that already has one.
pub fn compile(expr: &Expr, expect: Option<&TypeDesc>, ctx: &mut Ctx) -> CodegenResult<Value> {
    match expr {
        Expr::Int { value, kind } => {
            let kind = literal_kind(kind.as_deref(), expect, PrimitiveKind::I32)?;
            Ok(Value::transient(kind, int_const(kind, *value)?))
        }
        Expr::Float { value, kind } => {
            // Only a float-shaped expectation can refine a float literal.
            let expect = expect.filter(|d| {
                matches!(d, TypeDesc::Primitive(k)
                    if matches!(k.repr(), crate::primitive::MachineRepr::F32 | crate::primitive::MachineRepr::F64)
                        || matches!(k, PrimitiveKind::F32x4 | PrimitiveKind::F64x2))
            });
            let kind = literal_kind(kind.as_deref(), expect, PrimitiveKind::F64)?;
            Ok(Value::transient(kind, float_const(kind, *value)?))
        }
        Expr::Bool(b) => Ok(Value::transient(
            PrimitiveKind::Bool,
            vec![I::I32Const(*b as i32)],
        )),
        Expr::Str(s) => {
            let addr = ctx.module.data.intern_str(s);
            Ok(Value::Str(StrRef {
                addr: Pointer::transient(vec![I::I32Const(addr as i32)]),
                instance: crate::instance::InstanceType::reference(
                    TypeDesc::Str,
                    Storage::Static,
                ),
            }))
        }
        Expr::Ident(name) => compile_ident(name, ctx),
        Expr::Binary { op, lhs, rhs } => compile_binary(*op, lhs, rhs, expect, ctx),
        Expr::Unary { op, operand } => {
            let v = compile(operand, None, ctx)?;
            v.unary(ctx, *op)
        }
        Expr::Field { object, field } => {
            let obj = compile(object, None, ctx)?;
            obj.field_access(ctx, field)
        }
        Expr::Index { object, index } => {
            let obj = compile(object, None, ctx)?;
            let idx = compile(index, None, ctx)?;
            obj.index_access(ctx, &idx)
        }
        Expr::Call { callee, args } => compile_call(callee, args, ctx),
        Expr::StructLit { name, fields } => compile_struct_lit(name, fields, ctx),
        Expr::ArrayLit { elem, elems } => compile_array_lit(elem, elems, ctx),
        Expr::Convert { target, value } => {
            let to = PrimitiveKind::from_name(target)
                .ok_or_else(|| CodegenError::UnknownType(target.clone()))?;
            let v = compile(value, None, ctx)?;
            let from = v.kind().ok_or_else(|| {
                CodegenError::InvalidOperation(format!(
                    "cannot convert `{}` to `{}`",
                    v.type_name(),
                    target
                ))
            })?;
            let mut code = v.materialize(ctx)?;
            code.extend(ops::convert(from, to)?);
            Ok(Value::transient(to, code))
        }
        Expr::Intrinsic { name, args } => compile_intrinsic(name, args, expect, ctx),
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Literals
// ══════════════════════════════════════════════════════════════════════════════

/// Resolve a literal's kind: an explicit suffix wins, then a primitive
/// expectation, then the default.
fn literal_kind(
    suffix: Option<&str>,
    expect: Option<&TypeDesc>,
    default: PrimitiveKind,
) -> CodegenResult<PrimitiveKind> {
    if let Some(name) = suffix {
        return PrimitiveKind::from_name(name)
            .ok_or_else(|| CodegenError::UnknownType(name.to_string()));
    }
    if let Some(TypeDesc::Primitive(kind)) = expect {
        if *kind != PrimitiveKind::Bool {
            return Ok(*kind);
        }
    }
    Ok(default)
}

/// The scalar lane kind and splat instruction of a vector kind.
fn splat(kind: PrimitiveKind) -> Option<(PrimitiveKind, I<'static>)> {
    use PrimitiveKind as K;
    match kind {
        K::I8x16 | K::U8x16 => Some((K::I32, I::I8x16Splat)),
        K::I16x8 | K::U16x8 => Some((K::I32, I::I16x8Splat)),
        K::I32x4 | K::U32x4 => Some((K::I32, I::I32x4Splat)),
        K::I64x2 => Some((K::I64, I::I64x2Splat)),
        K::F32x4 => Some((K::F32, I::F32x4Splat)),
        K::F64x2 => Some((K::F64, I::F64x2Splat)),
        _ => None,
    }
}

fn int_const(kind: PrimitiveKind, value: i64) -> CodegenResult<InstrSeq> {
    if let Some((lane, splat_instr)) = splat(kind) {
        let mut code = int_const(lane, value)?;
        code.push(splat_instr);
        return Ok(code);
    }
    Ok(match kind.repr() {
        crate::primitive::MachineRepr::I32 => vec![I::I32Const(value as i32)],
        crate::primitive::MachineRepr::I64 => vec![I::I64Const(value)],
        crate::primitive::MachineRepr::F32 => vec![I::F32Const(value as f32)],
        crate::primitive::MachineRepr::F64 => vec![I::F64Const(value as f64)],
        crate::primitive::MachineRepr::V128 => {
            return Err(CodegenError::Internal(format!(
                "no splat lowering for `{kind}`"
            )))
        }
    })
}

fn float_const(kind: PrimitiveKind, value: f64) -> CodegenResult<InstrSeq> {
    if let Some((lane, splat_instr)) = splat(kind) {
        let mut code = float_const(lane, value)?;
        code.push(splat_instr);
        return Ok(code);
    }
    match kind.repr() {
        crate::primitive::MachineRepr::F32 => Ok(vec![I::F32Const(value as f32)]),
        crate::primitive::MachineRepr::F64 => Ok(vec![I::F64Const(value)]),
        _ => Err(CodegenError::InvalidOperation(format!(
            "float literal in `{kind}` position"
        ))),
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Names
// ══════════════════════════════════════════════════════════════════════════════

fn compile_ident(name: &str, ctx: &mut Ctx) -> CodegenResult<Value> {
    if let Some(v) = ctx.func.get(name) {
        return Ok(v.clone());
    }
    if let Some(entry) = ctx.module.funcs.get(name) {
        return Ok(Value::DirectFn(DirectFn {
            entry: entry.clone(),
        }));
    }
    if ctx.module.global_decls.contains_key(name) {
        let entry = ctx.module.ensure_global(name)?;
        return match &entry.desc {
            TypeDesc::Primitive(kind) => Ok(Value::global(*kind, entry.index)),
            agg => {
                // The raw global stores the aggregate's address.
                let addr = Pointer::new(Value::global(PrimitiveKind::POINTER, entry.index))?;
                Ok(Value::at_address(agg, addr, Storage::Global, true))
            }
        };
    }
    Err(CodegenError::UnresolvedSymbol(name.to_string()))
}

// ══════════════════════════════════════════════════════════════════════════════
// Operators
// ══════════════════════════════════════════════════════════════════════════════

fn is_comparison(op: BinOp) -> bool {
    matches!(
        op,
        BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge
    )
}

fn compile_binary(
    op: BinOp,
    lhs: &Expr,
    rhs: &Expr,
    expect: Option<&TypeDesc>,
    ctx: &mut Ctx,
) -> CodegenResult<Value> {
    // A boolean expectation on a comparison must not leak into the compared
    // operands.
    let operand_expect = if is_comparison(op) { None } else { expect };
    let lv = compile(lhs, operand_expect, ctx)?;
    // The right operand sees the left's kind, so bare literals side with it.
    let lhs_desc = lv.kind().map(TypeDesc::Primitive);
    let rv = compile(rhs, lhs_desc.as_ref().or(operand_expect), ctx)?;

    match (lv.kind(), rv.kind()) {
        (Some(lk), Some(rk)) if lk != rk => {
            // Scalar promotion toward the wider machine representation.
            let target =
                ops::promote(lk, rk).ok_or_else(|| CodegenError::OperatorTypeMismatch {
                    op: op.to_string(),
                    lhs: lk.name().to_string(),
                    rhs: rk.name().to_string(),
                })?;
            let lv = promote_to(lv, target, ctx)?;
            let rv = promote_to(rv, target, ctx)?;
            lv.binary(ctx, op, &rv)
        }
        _ => lv.binary(ctx, op, &rv),
    }
}

fn promote_to(v: Value, target: PrimitiveKind, ctx: &mut Ctx) -> CodegenResult<Value> {
    match v.kind() {
        Some(k) if k != target => {
            let mut code = v.materialize(ctx)?;
            code.extend(ops::convert(k, target)?);
            Ok(Value::transient(target, code))
        }
        _ => Ok(v),
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Calls
// ══════════════════════════════════════════════════════════════════════════════

fn compile_call(callee: &Expr, args: &[Expr], ctx: &mut Ctx) -> CodegenResult<Value> {
    let callee_v = match callee {
        // `obj.name(...)`: a failed lookup here is an unknown method, not an
        // unknown field.
        Expr::Field { object, field } => {
            let obj = compile(object, None, ctx)?;
            match obj.field_access(ctx, field) {
                Err(CodegenError::UnknownField { struct_name, .. }) => {
                    return Err(CodegenError::UnknownMethod {
                        struct_name,
                        method: field.clone(),
                    })
                }
                other => other?,
            }
        }
        other => compile(other, None, ctx)?,
    };

    let params: Vec<TypeDesc> = match &callee_v {
        Value::DirectFn(f) => f.entry.sig.params.clone(),
        Value::BoundMethod(m) => m.entry.sig.params.iter().skip(1).cloned().collect(),
        Value::IndirectFn(f) => f.sig.params.clone(),
        other => {
            return Err(CodegenError::InvalidOperation(format!(
                "cannot call a `{}` value",
                other.type_name()
            )))
        }
    };
    if params.len() != args.len() {
        return Err(CodegenError::ArityMismatch {
            expected: params.len(),
            found: args.len(),
        });
    }
    let mut arg_values = Vec::with_capacity(args.len());
    for (param, arg) in params.iter().zip(args) {
        let v = compile(arg, Some(param), ctx)?;
        arg_values.push(coerce_to_desc(v, param, ctx)?);
    }
    callee_v.call(ctx, &arg_values)
}

/// Reify a bare function used where a closure-record value is required.
pub(crate) fn coerce_to_desc(v: Value, want: &TypeDesc, ctx: &mut Ctx) -> CodegenResult<Value> {
    match (&v, want) {
        (Value::DirectFn(_) | Value::BoundMethod(_), TypeDesc::Func(sig)) => {
            let record = closure::reify(&v, ctx)?;
            Ok(Value::IndirectFn(crate::value::IndirectFn {
                sig: Rc::clone(sig),
                record,
            }))
        }
        _ => Ok(v),
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Aggregate literals
// ══════════════════════════════════════════════════════════════════════════════

/// Store the already-compiled `value` into `base_local + offset`, by slot
/// kind: primitives store with their access width, reference slots store
/// the address, inline aggregates copy their bytes.
fn emit_store_into(
    code: &mut InstrSeq,
    base_local: u32,
    offset: u32,
    desc: &TypeDesc,
    is_ref: bool,
    value: &Value,
    ctx: &mut Ctx,
) -> CodegenResult<()> {
    if is_ref || matches!(desc, TypeDesc::Str | TypeDesc::Func(_)) {
        code.push(I::LocalGet(base_local));
        code.extend(value.materialize(ctx)?);
        code.push(ops::store(PrimitiveKind::POINTER, offset as u64));
        return Ok(());
    }
    match desc {
        TypeDesc::Primitive(kind) => {
            match value.kind() {
                Some(k) if k == *kind => {}
                _ => {
                    return Err(CodegenError::AssignmentTypeMismatch {
                        from: value.type_name(),
                        to: kind.name().to_string(),
                    })
                }
            }
            code.push(I::LocalGet(base_local));
            code.extend(value.materialize(ctx)?);
            code.push(ops::store(*kind, offset as u64));
        }
        agg => {
            if value.type_desc() != *agg {
                return Err(CodegenError::AssignmentTypeMismatch {
                    from: value.type_name(),
                    to: agg.to_string(),
                });
            }
            let size = agg.byte_size().ok_or_else(|| {
                CodegenError::Internal(format!("inline aggregate `{agg}` with no static size"))
            })?;
            code.push(I::LocalGet(base_local));
            if offset != 0 {
                code.push(I::I32Const(offset as i32));
                code.push(I::I32Add);
            }
            code.extend(value.materialize(ctx)?);
            code.push(I::I32Const(size as i32));
            code.push(I::MemoryCopy {
                src_mem: 0,
                dst_mem: 0,
            });
        }
    }
    Ok(())
}

fn compile_struct_lit(
    name: &str,
    fields: &[(String, Expr)],
    ctx: &mut Ctx,
) -> CodegenResult<Value> {
    let layout = ctx
        .module
        .registry
        .get(name)
        .cloned()
        .ok_or_else(|| CodegenError::UnknownType(name.to_string()))?;

    for (fname, _) in fields {
        if layout.field(fname).is_none() {
            return Err(CodegenError::UnknownField {
                struct_name: name.to_string(),
                field: fname.clone(),
            });
        }
    }

    let tmp = ctx.func.alloc_local(ValType::I32);
    let mut code = vec![
        I::I32Const(layout.size as i32),
        I::Call(runtime::rt_func_idx(runtime::RT_ARENA_MALLOC)),
        I::LocalSet(tmp),
    ];
    // Declaration order, whatever order the literal spelled them in.
    for field in &layout.fields {
        let init = fields
            .iter()
            .find(|(fname, _)| *fname == field.name)
            .map(|(_, e)| e)
            .ok_or_else(|| {
                CodegenError::InvalidOperation(format!(
                    "missing field `{}` in `{}` literal",
                    field.name, name
                ))
            })?;
        let v = compile(init, Some(&field.ty), ctx)?;
        let v = coerce_to_desc(v, &field.ty, ctx)?;
        emit_store_into(&mut code, tmp, field.offset, &field.ty, field.is_ref, &v, ctx)?;
    }
    code.push(I::LocalGet(tmp));

    let desc = TypeDesc::Struct(Rc::clone(&layout));
    Ok(Value::at_address(
        &desc,
        Pointer::transient(code),
        Storage::Arena,
        true,
    ))
}

fn compile_array_lit(
    elem: &marrow_types::TypeExpr,
    elems: &[Expr],
    ctx: &mut Ctx,
) -> CodegenResult<Value> {
    let elem_desc = ctx.module.registry.lookup_expr(elem)?;
    let layout = Rc::new(ArrayLayout {
        elem: elem_desc.clone(),
        len: Some(elems.len() as u32),
    });
    let elem_size = layout.elem_size()?;
    let elem_is_ref = matches!(elem_desc, TypeDesc::Str | TypeDesc::Func(_));

    let tmp = ctx.func.alloc_local(ValType::I32);
    let mut code = vec![
        I::I32Const((elem_size * elems.len() as u32) as i32),
        I::Call(runtime::rt_func_idx(runtime::RT_ARENA_MALLOC)),
        I::LocalSet(tmp),
    ];
    for (i, e) in elems.iter().enumerate() {
        let v = compile(e, Some(&elem_desc), ctx)?;
        let v = coerce_to_desc(v, &elem_desc, ctx)?;
        emit_store_into(
            &mut code,
            tmp,
            i as u32 * elem_size,
            &elem_desc,
            elem_is_ref,
            &v,
            ctx,
        )?;
    }
    code.push(I::LocalGet(tmp));

    let desc = TypeDesc::Array(Rc::clone(&layout));
    Ok(Value::at_address(
        &desc,
        Pointer::transient(code),
        Storage::Arena,
        true,
    ))
}

// ══════════════════════════════════════════════════════════════════════════════
// Intrinsics
// ══════════════════════════════════════════════════════════════════════════════

fn compile_intrinsic(
    name: &str,
    args: &[Expr],
    expect: Option<&TypeDesc>,
    ctx: &mut Ctx,
) -> CodegenResult<Value> {
    if args.is_empty() {
        return Err(CodegenError::ArityMismatch {
            expected: 1,
            found: 0,
        });
    }
    let first = compile(&args[0], expect, ctx)?;
    let kind = first.kind().ok_or_else(|| {
        CodegenError::InvalidOperation(format!(
            "intrinsic `{name}` applied to `{}`",
            first.type_name()
        ))
    })?;
    let lowering = ops::intrinsic(kind, name)?;
    if lowering.arity != args.len() {
        return Err(CodegenError::ArityMismatch {
            expected: lowering.arity,
            found: args.len(),
        });
    }
    let mut code = first.materialize(ctx)?;
    let want = TypeDesc::Primitive(kind);
    for arg in &args[1..] {
        let v = compile(arg, Some(&want), ctx)?;
        match v.kind() {
            Some(k) if k == kind => {}
            _ => {
                return Err(CodegenError::OperatorTypeMismatch {
                    op: name.to_string(),
                    lhs: kind.name().to_string(),
                    rhs: v.type_name(),
                })
            }
        }
        code.extend(v.materialize(ctx)?);
    }
    code.extend(lowering.code);
    Ok(Value::transient(lowering.result, code))
}
