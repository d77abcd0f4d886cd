//! The runtime memory map and the injected heap routines.
//!
//! Linear memory is laid out as
//!
//! ```text
//! 0x00000 .. static data (address 0 reserved as null)
//!  ..      ↑ shadow stack, growing down from 0x10000
//! 0x10000 .. 0x20000   pinned heap, first reservation (never moves)
//! 0x20000 ..           arena heap, bump-allocated, grows with memory
//! ```
//!
//! When the pinned heap outgrows its current reservation it carves a fresh
//! whole-page slab from the arena frontier and raises the arena's reset
//! floor past it, so pinned allocations never move and never get recycled
//! while sharing the arena's page-growth path. Six mutable globals come
//! before any user global: the shadow stack pointer, the arena origin, the
//! arena bump offset, the pinned-heap pointer, the arena reset floor, and
//! the pinned reservation limit. One import precedes all defined functions:
//! a zero-argument host callback invoked after every `memory.grow` so the
//! embedder can re-bind its view of the buffer.

use wasm_encoder::{BlockType, Function, Instruction as I, ValType};

pub const PAGE_SIZE: u32 = 0x10000;

/// Shadow stack top; the stack grows downward toward the static data.
pub const STACK_TOP: u32 = 0x10000;
/// Initial pinned heap reservation.
pub const PINNED_BASE: u32 = 0x10000;
pub const PINNED_LIMIT: u32 = 0x20000;
/// Arena heap origin. Everything above grows with the memory.
pub const ARENA_ORIGIN: u32 = 0x20000;
/// Data+stack page, pinned page, first arena page.
pub const INITIAL_PAGES: u64 = 3;

pub const GLOBAL_STACK_PTR: u32 = 0;
pub const GLOBAL_ARENA_ORIGIN: u32 = 1;
pub const GLOBAL_ARENA_OFFSET: u32 = 2;
pub const GLOBAL_PINNED_PTR: u32 = 3;
/// Reset rewinds the arena offset to this floor, not to zero; carving a
/// pinned slab raises it so the slab survives every later reset.
pub const GLOBAL_ARENA_FLOOR: u32 = 4;
/// End of the pinned heap's current reservation.
pub const GLOBAL_PINNED_LIMIT: u32 = 5;
/// First global index available to user variables.
pub const RUNTIME_GLOBALS: u32 = 6;

/// The single import: `env.memory_refresh () -> ()`.
pub const IMPORT_MODULE: &str = "env";
pub const IMPORT_REFRESH: &str = "memory_refresh";
pub const IMPORT_COUNT: u32 = 1;

// Injected-function offsets, in code-section order.
pub const RT_ARENA_MALLOC: u32 = 0;
pub const RT_ARENA_RESET: u32 = 1;
pub const RT_PINNED_MALLOC: u32 = 2;
pub const RT_STR_CMP: u32 = 3;
pub const RT_STR_CONCAT: u32 = 4;
pub const RT_FUNC_COUNT: u32 = 5;

/// Absolute function index of an injected routine.
pub const fn rt_func_idx(offset: u32) -> u32 {
    IMPORT_COUNT + offset
}

/// Absolute index of the first user-defined function.
pub const FIRST_USER_FUNC: u32 = IMPORT_COUNT + RT_FUNC_COUNT;

// Closure record layout: two 32-bit words in the arena.
pub const CLOSURE_SLOT_OFFSET: u64 = 0;
pub const CLOSURE_CTX_OFFSET: u64 = 4;

// Export names of the runtime surface.
pub const EXPORT_MEMORY: &str = "memory";
pub const EXPORT_TABLE: &str = "table";
pub const EXPORT_STACK_PTR: &str = "stack_ptr";
pub const EXPORT_ARENA_ORIGIN: &str = "arena_heap_origin";
pub const EXPORT_ARENA_OFFSET: &str = "arena_heap_offset";
pub const EXPORT_PINNED_PTR: &str = "pinned_heap_ptr";
pub const EXPORT_ARENA_MALLOC: &str = "arena_heap_malloc";
pub const EXPORT_ARENA_RESET: &str = "arena_heap_reset";
pub const EXPORT_PINNED_MALLOC: &str = "pinned_heap_malloc";
pub const EXPORT_STR_CONCAT: &str = "String.concat";
pub const EXPORT_STR_CMP: &str = "cmp";

/// `arena_heap_malloc(size: i32) -> i32`
///
/// Bump allocation: the returned pointer is `origin + offset` before the
/// bump. When the new high-water mark passes the current memory size the
/// memory is grown by however many pages are missing and the host refresh
/// callback is invoked.
pub fn arena_malloc_body() -> Function {
    let mut f = Function::new(vec![(1, ValType::I32)]);
    // local 0: size, local 1: result pointer
    f.instruction(&I::GlobalGet(GLOBAL_ARENA_ORIGIN));
    f.instruction(&I::GlobalGet(GLOBAL_ARENA_OFFSET));
    f.instruction(&I::I32Add);
    f.instruction(&I::LocalSet(1));
    f.instruction(&I::GlobalGet(GLOBAL_ARENA_OFFSET));
    f.instruction(&I::LocalGet(0));
    f.instruction(&I::I32Add);
    f.instruction(&I::GlobalSet(GLOBAL_ARENA_OFFSET));
    // Grow when the new end passes the current memory size.
    f.instruction(&I::GlobalGet(GLOBAL_ARENA_ORIGIN));
    f.instruction(&I::GlobalGet(GLOBAL_ARENA_OFFSET));
    f.instruction(&I::I32Add);
    f.instruction(&I::MemorySize(0));
    f.instruction(&I::I32Const(16));
    f.instruction(&I::I32Shl);
    f.instruction(&I::I32GtU);
    f.instruction(&I::If(BlockType::Empty));
    {
        // Pages missing, rounded up.
        f.instruction(&I::GlobalGet(GLOBAL_ARENA_ORIGIN));
        f.instruction(&I::GlobalGet(GLOBAL_ARENA_OFFSET));
        f.instruction(&I::I32Add);
        f.instruction(&I::MemorySize(0));
        f.instruction(&I::I32Const(16));
        f.instruction(&I::I32Shl);
        f.instruction(&I::I32Sub);
        f.instruction(&I::I32Const(PAGE_SIZE as i32 - 1));
        f.instruction(&I::I32Add);
        f.instruction(&I::I32Const(16));
        f.instruction(&I::I32ShrU);
        f.instruction(&I::MemoryGrow(0));
        f.instruction(&I::I32Const(-1));
        f.instruction(&I::I32Eq);
        f.instruction(&I::If(BlockType::Empty));
        f.instruction(&I::Unreachable);
        f.instruction(&I::End);
        // The host must re-bind its memory view after growth.
        f.instruction(&I::Call(0));
    }
    f.instruction(&I::End);
    f.instruction(&I::LocalGet(1));
    f.instruction(&I::End);
    f
}

/// `arena_heap_reset() -> ()`: rewinds the bump offset to the reset floor.
/// Previously handed-out arena pointers become dangling by contract; pinned
/// slabs carved from the arena sit below the floor and survive.
pub fn arena_reset_body() -> Function {
    let mut f = Function::new(vec![]);
    f.instruction(&I::GlobalGet(GLOBAL_ARENA_FLOOR));
    f.instruction(&I::GlobalSet(GLOBAL_ARENA_OFFSET));
    f.instruction(&I::End);
    f
}

/// `pinned_heap_malloc(size: i32) -> i32`
///
/// Bump allocation inside the current reservation. When the reservation is
/// exhausted, a fresh whole-page slab is carved from the arena frontier
/// (reusing the arena's growth and refresh path) and the arena reset floor
/// is raised past it, so pinned pointers never move and never get recycled.
pub fn pinned_malloc_body() -> Function {
    let mut f = Function::new(vec![(2, ValType::I32)]);
    // local 0: size, local 1: slab byte count, local 2: slab base
    f.instruction(&I::GlobalGet(GLOBAL_PINNED_PTR));
    f.instruction(&I::LocalGet(0));
    f.instruction(&I::I32Add);
    f.instruction(&I::GlobalGet(GLOBAL_PINNED_LIMIT));
    f.instruction(&I::I32GtU);
    f.instruction(&I::If(BlockType::Empty));
    {
        // Whole pages, rounded up.
        f.instruction(&I::LocalGet(0));
        f.instruction(&I::I32Const(PAGE_SIZE as i32 - 1));
        f.instruction(&I::I32Add);
        f.instruction(&I::I32Const(16));
        f.instruction(&I::I32ShrU);
        f.instruction(&I::I32Const(16));
        f.instruction(&I::I32Shl);
        f.instruction(&I::LocalSet(1));
        f.instruction(&I::LocalGet(1));
        f.instruction(&I::Call(rt_func_idx(RT_ARENA_MALLOC)));
        f.instruction(&I::LocalSet(2));
        // The slab must survive every later reset.
        f.instruction(&I::GlobalGet(GLOBAL_ARENA_OFFSET));
        f.instruction(&I::GlobalSet(GLOBAL_ARENA_FLOOR));
        f.instruction(&I::LocalGet(2));
        f.instruction(&I::GlobalSet(GLOBAL_PINNED_PTR));
        f.instruction(&I::LocalGet(2));
        f.instruction(&I::LocalGet(1));
        f.instruction(&I::I32Add);
        f.instruction(&I::GlobalSet(GLOBAL_PINNED_LIMIT));
    }
    f.instruction(&I::End);
    f.instruction(&I::GlobalGet(GLOBAL_PINNED_PTR));
    f.instruction(&I::GlobalGet(GLOBAL_PINNED_PTR));
    f.instruction(&I::LocalGet(0));
    f.instruction(&I::I32Add);
    f.instruction(&I::GlobalSet(GLOBAL_PINNED_PTR));
    f.instruction(&I::End);
    f
}
