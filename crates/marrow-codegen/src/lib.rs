//! Marrow WASM code generator: compiles a resolved AST to a `.wasm` binary.
//!
//! # Architecture
//!
//! The engine takes a resolved [`marrow_types::Program`] and produces a
//! self-contained `.wasm` module. Struct layouts are planned first
//! ([`layout`]), every expression is translated to a polymorphic [`value`]
//! that knows how to read, write, and combine itself, and the assembled
//! module carries an injected runtime: a bump-allocated arena heap, a
//! pinned heap, SIMD string comparison and concatenation, and a function
//! table for closures.
//!
//! ## Imports
//! - `env.memory_refresh()` — invoked after every memory growth so the host
//!   can re-bind its view of the buffer
//!
//! ## Exports
//! - `memory`, `table` — linear memory and the closure function table
//! - `stack_ptr`, `arena_heap_origin`, `arena_heap_offset`,
//!   `pinned_heap_ptr` — the runtime globals
//! - `arena_heap_malloc(size) → ptr`, `arena_heap_reset()`,
//!   `pinned_heap_malloc(size) → ptr`
//! - `cmp(a, b) → i32`, `String.concat(a, b) → ptr`
//! - every user function declared with the export flag, under its own name

pub mod closure;
pub mod compiler;
pub mod context;
pub mod descriptor;
pub mod error;
pub mod expr;
pub mod instance;
pub mod layout;
pub mod ops;
pub mod primitive;
pub mod runtime;
pub mod stmt;
pub mod strings;
pub mod value;

pub use compiler::{compile, CompiledModule};
pub use descriptor::{describe, TypeDescriptorTable};
pub use error::{CodegenError, CodegenResult};
pub use layout::{TypeDesc, TypeRegistry};
pub use primitive::{MachineRepr, PrimitiveKind};
