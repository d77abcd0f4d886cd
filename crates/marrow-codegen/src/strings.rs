//! Injected string routines.
//!
//! Strings are length-prefixed byte buffers. Comparison walks both buffers
//! sixteen bytes at a time with v128 lane equality, finds the first
//! differing byte through the inverted lane bitmask, and falls back to the
//! length difference when the common prefix matches. Concatenation
//! allocates the result on the arena heap.

use wasm_encoder::{BlockType, Function, Instruction as I, ValType};

use crate::ops::memarg;
use crate::runtime::{rt_func_idx, RT_ARENA_MALLOC};

// cmp locals: 0 = a, 1 = b, 2 = n (common length), 3 = i, 4 = lane mask,
// 5 = len(a), 6 = len(b).

/// Load sixteen bytes of each buffer at `base + 4 + i` and leave the
/// bitmask of differing lanes on the stack.
fn emit_chunk_mask(f: &mut Function) {
    f.instruction(&I::LocalGet(0));
    f.instruction(&I::LocalGet(3));
    f.instruction(&I::I32Add);
    f.instruction(&I::V128Load(memarg(4)));
    f.instruction(&I::LocalGet(1));
    f.instruction(&I::LocalGet(3));
    f.instruction(&I::I32Add);
    f.instruction(&I::V128Load(memarg(4)));
    f.instruction(&I::I8x16Eq);
    f.instruction(&I::V128Not);
    f.instruction(&I::I8x16Bitmask);
}

/// Advance `i` to the first set bit of the mask in local 4, then return the
/// difference of the bytes there.
fn emit_diff_return(f: &mut Function) {
    f.instruction(&I::LocalGet(3));
    f.instruction(&I::LocalGet(4));
    f.instruction(&I::I32Ctz);
    f.instruction(&I::I32Add);
    f.instruction(&I::LocalSet(3));
    f.instruction(&I::LocalGet(0));
    f.instruction(&I::LocalGet(3));
    f.instruction(&I::I32Add);
    f.instruction(&I::I32Load8U(memarg(4)));
    f.instruction(&I::LocalGet(1));
    f.instruction(&I::LocalGet(3));
    f.instruction(&I::I32Add);
    f.instruction(&I::I32Load8U(memarg(4)));
    f.instruction(&I::I32Sub);
    f.instruction(&I::Return);
}

/// `cmp(a: i32, b: i32) -> i32`
///
/// Negative, zero, or positive in the manner of `memcmp`, ordering first by
/// the first differing byte of the common prefix, then by length.
pub fn str_cmp_body() -> Function {
    let mut f = Function::new(vec![(5, ValType::I32)]);

    // n = min(len a, len b)
    f.instruction(&I::LocalGet(0));
    f.instruction(&I::I32Load(memarg(0)));
    f.instruction(&I::LocalSet(5));
    f.instruction(&I::LocalGet(1));
    f.instruction(&I::I32Load(memarg(0)));
    f.instruction(&I::LocalSet(6));
    f.instruction(&I::LocalGet(5));
    f.instruction(&I::LocalGet(6));
    f.instruction(&I::LocalGet(5));
    f.instruction(&I::LocalGet(6));
    f.instruction(&I::I32LtU);
    f.instruction(&I::Select);
    f.instruction(&I::LocalSet(2));

    // Full sixteen-byte chunks.
    f.instruction(&I::Loop(BlockType::Empty));
    {
        f.instruction(&I::LocalGet(3));
        f.instruction(&I::I32Const(16));
        f.instruction(&I::I32Add);
        f.instruction(&I::LocalGet(2));
        f.instruction(&I::I32LeU);
        f.instruction(&I::If(BlockType::Empty));
        {
            emit_chunk_mask(&mut f);
            f.instruction(&I::LocalSet(4));
            f.instruction(&I::LocalGet(4));
            f.instruction(&I::If(BlockType::Empty));
            emit_diff_return(&mut f);
            f.instruction(&I::End);
            f.instruction(&I::LocalGet(3));
            f.instruction(&I::I32Const(16));
            f.instruction(&I::I32Add);
            f.instruction(&I::LocalSet(3));
            f.instruction(&I::Br(1));
        }
        f.instruction(&I::End);
    }
    f.instruction(&I::End);

    // Tail: one more sixteen-byte load with the lanes past `n` masked off.
    f.instruction(&I::LocalGet(3));
    f.instruction(&I::LocalGet(2));
    f.instruction(&I::I32Ne);
    f.instruction(&I::If(BlockType::Empty));
    {
        emit_chunk_mask(&mut f);
        f.instruction(&I::I32Const(1));
        f.instruction(&I::LocalGet(2));
        f.instruction(&I::LocalGet(3));
        f.instruction(&I::I32Sub);
        f.instruction(&I::I32Shl);
        f.instruction(&I::I32Const(1));
        f.instruction(&I::I32Sub);
        f.instruction(&I::I32And);
        f.instruction(&I::LocalSet(4));
        f.instruction(&I::LocalGet(4));
        f.instruction(&I::If(BlockType::Empty));
        emit_diff_return(&mut f);
        f.instruction(&I::End);
    }
    f.instruction(&I::End);

    // Common prefix equal: order by length.
    f.instruction(&I::LocalGet(5));
    f.instruction(&I::LocalGet(6));
    f.instruction(&I::I32Sub);
    f.instruction(&I::End);
    f
}

// concat locals: 0 = a, 1 = b, 2 = len(a), 3 = len(b), 4 = out.

/// `String.concat(a: i32, b: i32) -> i32`
pub fn str_concat_body() -> Function {
    let mut f = Function::new(vec![(3, ValType::I32)]);

    f.instruction(&I::LocalGet(0));
    f.instruction(&I::I32Load(memarg(0)));
    f.instruction(&I::LocalSet(2));
    f.instruction(&I::LocalGet(1));
    f.instruction(&I::I32Load(memarg(0)));
    f.instruction(&I::LocalSet(3));

    // out = arena_heap_malloc(4 + len a + len b)
    f.instruction(&I::I32Const(4));
    f.instruction(&I::LocalGet(2));
    f.instruction(&I::I32Add);
    f.instruction(&I::LocalGet(3));
    f.instruction(&I::I32Add);
    f.instruction(&I::Call(rt_func_idx(RT_ARENA_MALLOC)));
    f.instruction(&I::LocalSet(4));

    // Length header.
    f.instruction(&I::LocalGet(4));
    f.instruction(&I::LocalGet(2));
    f.instruction(&I::LocalGet(3));
    f.instruction(&I::I32Add);
    f.instruction(&I::I32Store(memarg(0)));

    // Bytes of a, then bytes of b.
    f.instruction(&I::LocalGet(4));
    f.instruction(&I::I32Const(4));
    f.instruction(&I::I32Add);
    f.instruction(&I::LocalGet(0));
    f.instruction(&I::I32Const(4));
    f.instruction(&I::I32Add);
    f.instruction(&I::LocalGet(2));
    f.instruction(&I::MemoryCopy {
        src_mem: 0,
        dst_mem: 0,
    });
    f.instruction(&I::LocalGet(4));
    f.instruction(&I::I32Const(4));
    f.instruction(&I::I32Add);
    f.instruction(&I::LocalGet(2));
    f.instruction(&I::I32Add);
    f.instruction(&I::LocalGet(1));
    f.instruction(&I::I32Const(4));
    f.instruction(&I::I32Add);
    f.instruction(&I::LocalGet(3));
    f.instruction(&I::MemoryCopy {
        src_mem: 0,
        dst_mem: 0,
    });

    f.instruction(&I::LocalGet(4));
    f.instruction(&I::End);
    f
}
