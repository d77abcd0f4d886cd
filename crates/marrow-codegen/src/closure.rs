//! Closure records and trampolines.
//!
//! A function value is an eight-byte arena record: the function-table slot
//! at word 0 and a context pointer at word 1. Every table entry adopts the
//! uniform `(context, ...params) -> result` convention, so a plain function
//! is reified through a one-per-name trampoline that drops the context and
//! forwards, while a bound method enters the table as itself, since its
//! receiver parameter already sits where the context goes. Trampolines and
//! table slots are memoized by function name; capturing the same function
//! twice yields the same slot.

use wasm_encoder::{Function, Instruction as I, ValType};

use crate::context::{Ctx, FuncEntry};
use crate::error::{CodegenError, CodegenResult};
use crate::layout::CLOSURE_RECORD_SIZE;
use crate::ops::{self, InstrSeq};
use crate::primitive::PrimitiveKind;
use crate::runtime::{rt_func_idx, CLOSURE_CTX_OFFSET, CLOSURE_SLOT_OFFSET, RT_ARENA_MALLOC};
use crate::value::{Pointer, Value};

/// Reify a function-like value as a closure record, returning a pointer to
/// the record.
pub fn reify(value: &Value, ctx: &mut Ctx) -> CodegenResult<Pointer> {
    match value {
        Value::DirectFn(f) => {
            let tramp = trampoline_for(ctx, &f.entry);
            let slot = ctx.module.table_slot(&f.entry.name, tramp);
            record(ctx, slot, vec![I::I32Const(0)])
        }
        Value::BoundMethod(m) => {
            let slot = ctx.module.table_slot(&m.entry.name, m.entry.index);
            let receiver = m.receiver.materialize(ctx)?;
            record(ctx, slot, receiver)
        }
        other => Err(CodegenError::Internal(format!(
            "cannot reify `{}` as a closure",
            other.type_name()
        ))),
    }
}

/// The memoized context-dropping trampoline for a plain function.
fn trampoline_for(ctx: &mut Ctx, entry: &FuncEntry) -> u32 {
    if let Some(&index) = ctx.module.trampolines.get(&entry.name) {
        return index;
    }
    let type_index = ctx.module.func_type_index(&entry.sig, true);
    let mut body = Function::new(vec![]);
    // Local 0 is the unused context; the real parameters follow.
    for i in 0..entry.sig.params.len() {
        body.instruction(&I::LocalGet(i as u32 + 1));
    }
    body.instruction(&I::Call(entry.index));
    body.instruction(&I::End);
    let index = ctx.module.next_func_index;
    ctx.module.next_func_index += 1;
    ctx.module.synthesized.push((type_index, body));
    ctx.module.trampolines.insert(entry.name.clone(), index);
    index
}

/// Emit an arena allocation of the two-word record, filling the slot word
/// and the context word.
fn record(ctx: &mut Ctx, slot: u32, context: InstrSeq) -> CodegenResult<Pointer> {
    let tmp = ctx.func.alloc_local(ValType::I32);
    let mut code = vec![
        I::I32Const(CLOSURE_RECORD_SIZE as i32),
        I::Call(rt_func_idx(RT_ARENA_MALLOC)),
        I::LocalSet(tmp),
        I::LocalGet(tmp),
        I::I32Const(slot as i32),
        ops::store(PrimitiveKind::U32, CLOSURE_SLOT_OFFSET),
        I::LocalGet(tmp),
    ];
    code.extend(context);
    code.push(ops::store(PrimitiveKind::U32, CLOSURE_CTX_OFFSET));
    code.push(I::LocalGet(tmp));
    Ok(Pointer::transient(code))
}
