//! Statement translation.
//!
//! Statements append to the caller's instruction accumulator. Expression
//! results that would linger on the operand stack are dropped; assignment
//! chains are emitted through the value layer's store-then-reload and then
//! dropped the same way.

use marrow_types::Stmt;
use wasm_encoder::{BlockType, Instruction as I, ValType};

use crate::context::Ctx;
use crate::error::{CodegenError, CodegenResult};
use crate::expr;
use crate::layout::TypeDesc;
use crate::ops::{self, InstrSeq};
use crate::primitive::PrimitiveKind;
use crate::value::{Pointer, Value};

pub fn compile_block(stmts: &[Stmt], ctx: &mut Ctx, out: &mut InstrSeq) -> CodegenResult<()> {
    for stmt in stmts {
        compile_stmt(stmt, ctx, out)?;
    }
    Ok(())
}

fn compile_stmt(stmt: &Stmt, ctx: &mut Ctx, out: &mut InstrSeq) -> CodegenResult<()> {
    match stmt {
        Stmt::Let { name, ty, value } => {
            let declared = match ty {
                Some(t) => Some(ctx.module.registry.lookup_expr(t)?),
                None => None,
            };
            let v = expr::compile(value, declared.as_ref(), ctx)?;
            bind_let(name, declared, v, ctx, out)
        }

        Stmt::Assign { target, value } => {
            let t = expr::compile(target, None, ctx)?;
            let want = t.type_desc();
            let v = expr::compile(value, Some(&want), ctx)?;
            let v = expr::coerce_to_desc(v, &want, ctx)?;
            let result = t.write(ctx, &v)?;
            discard(result, ctx, out)
        }

        Stmt::Return(value) => {
            let want = ctx.func.result.clone();
            match (value, want) {
                (None, None) => {
                    out.push(I::Return);
                    Ok(())
                }
                (None, Some(want)) => Err(CodegenError::AssignmentTypeMismatch {
                    from: "void".to_string(),
                    to: want.to_string(),
                }),
                (Some(e), want) => {
                    let v = expr::compile(e, want.as_ref(), ctx)?;
                    let want = want.ok_or_else(|| CodegenError::AssignmentTypeMismatch {
                        from: v.type_name(),
                        to: "void".to_string(),
                    })?;
                    let v = expr::coerce_to_desc(v, &want, ctx)?;
                    check_assignable(&want, &v)?;
                    out.extend(v.materialize(ctx)?);
                    out.push(I::Return);
                    Ok(())
                }
            }
        }

        Stmt::Expr(e) => {
            let v = expr::compile(e, None, ctx)?;
            discard(v, ctx, out)
        }

        Stmt::If {
            cond,
            then_body,
            else_body,
        } => {
            emit_condition(cond, ctx, out)?;
            out.push(I::If(BlockType::Empty));
            compile_block(then_body, ctx, out)?;
            if !else_body.is_empty() {
                out.push(I::Else);
                compile_block(else_body, ctx, out)?;
            }
            out.push(I::End);
            Ok(())
        }

        Stmt::While { cond, body } => {
            out.push(I::Block(BlockType::Empty));
            out.push(I::Loop(BlockType::Empty));
            emit_condition(cond, ctx, out)?;
            out.push(I::I32Eqz);
            out.push(I::BrIf(1));
            compile_block(body, ctx, out)?;
            out.push(I::Br(0));
            out.push(I::End);
            out.push(I::End);
            Ok(())
        }
    }
}

fn emit_condition(
    cond: &marrow_types::Expr,
    ctx: &mut Ctx,
    out: &mut InstrSeq,
) -> CodegenResult<()> {
    let want = TypeDesc::Primitive(PrimitiveKind::Bool);
    let c = expr::compile(cond, Some(&want), ctx)?;
    match c.kind() {
        Some(PrimitiveKind::Bool) => {}
        _ => {
            return Err(CodegenError::AssignmentTypeMismatch {
                from: c.type_name(),
                to: "bool".to_string(),
            })
        }
    }
    out.extend(c.materialize(ctx)?);
    Ok(())
}

/// `let` lowering: primitives get a typed local slot, aggregates get an i32
/// slot holding their address. The binding's declared type wins over the
/// initializer's when both are present.
fn bind_let(
    name: &str,
    declared: Option<TypeDesc>,
    v: Value,
    ctx: &mut Ctx,
    out: &mut InstrSeq,
) -> CodegenResult<()> {
    // A bare function initializer becomes a closure record.
    let v = match (&declared, &v) {
        (_, Value::DirectFn(_) | Value::BoundMethod(_)) => {
            let want = declared.clone().unwrap_or_else(|| v.type_desc());
            expr::coerce_to_desc(v, &want, ctx)?
        }
        _ => v,
    };

    if let Value::Void(_) = v {
        return Err(CodegenError::InvalidOperation(format!(
            "binding `{name}` to a void value"
        )));
    }

    if let Some(kind) = v.kind() {
        if let Some(d) = &declared {
            match d {
                TypeDesc::Primitive(dk) if *dk == kind => {}
                other => {
                    return Err(CodegenError::AssignmentTypeMismatch {
                        from: kind.name().to_string(),
                        to: other.to_string(),
                    })
                }
            }
        }
        let index = ctx.func.alloc_local(kind.val_type());
        out.extend(v.materialize(ctx)?);
        out.extend(ops::normalize(kind));
        out.push(I::LocalSet(index));
        ctx.func.bind(name, Value::local(kind, index));
        return Ok(());
    }

    // Aggregate: bind the address.
    let desc = match &declared {
        Some(d) => {
            check_assignable(d, &v)?;
            d.clone()
        }
        None => v.type_desc(),
    };
    let storage = v.instance().storage;
    let index = ctx.func.alloc_local(ValType::I32);
    out.extend(v.materialize(ctx)?);
    out.push(I::LocalSet(index));
    ctx.func
        .bind(name, Value::at_address(&desc, Pointer::local(index), storage, true));
    Ok(())
}

/// Structural compatibility for bindings and returns: exact descriptor
/// equality. Fixed and dynamic arrays never interchange; their in-memory
/// shapes differ by the length header.
fn check_assignable(want: &TypeDesc, v: &Value) -> CodegenResult<()> {
    if *want != v.type_desc() {
        return Err(CodegenError::AssignmentTypeMismatch {
            from: v.type_name(),
            to: want.to_string(),
        });
    }
    Ok(())
}

/// Emit a statement-position value and clear what it left on the stack.
fn discard(v: Value, ctx: &mut Ctx, out: &mut InstrSeq) -> CodegenResult<()> {
    match v {
        Value::Void(code) => {
            out.extend(code);
        }
        other => {
            out.extend(other.materialize(ctx)?);
            out.push(I::Drop);
        }
    }
    Ok(())
}
