//! Compilation context.
//!
//! The read-only tables (type registry, function entries) are built once
//! during module setup; the mutable accumulators (wasm type section, global
//! slots, trampoline memo, function table, data segment) and the
//! per-function state (bindings, local counter, frame estimate) are threaded
//! explicitly through every translation call. Nothing here is ambient.

use std::collections::HashMap;
use std::rc::Rc;

use wasm_encoder::{Function, ValType};

use crate::error::{CodegenError, CodegenResult};
use crate::layout::{FuncType, TypeDesc, TypeRegistry};
use crate::value::Value;

/// A registered function: its absolute WASM index and signature.
#[derive(Debug, Clone)]
pub struct FuncEntry {
    pub name: String,
    pub index: u32,
    pub sig: Rc<FuncType>,
    pub exported: bool,
    pub method_of: Option<String>,
}

/// The stack value type an ABI slot of this descriptor occupies: aggregates
/// pass as 32-bit pointers.
pub fn abi_val_type(desc: &TypeDesc) -> ValType {
    match desc {
        TypeDesc::Primitive(kind) => kind.val_type(),
        _ => ValType::I32,
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Wasm type section interning
// ══════════════════════════════════════════════════════════════════════════════

/// Deduplicated function-type section entries.
#[derive(Debug, Default)]
pub struct TypeTable {
    entries: Vec<(Vec<ValType>, Vec<ValType>)>,
    index: HashMap<(Vec<ValType>, Vec<ValType>), u32>,
}

impl TypeTable {
    pub fn intern(&mut self, params: Vec<ValType>, results: Vec<ValType>) -> u32 {
        let key = (params, results);
        if let Some(&idx) = self.index.get(&key) {
            return idx;
        }
        let idx = self.entries.len() as u32;
        self.entries.push(key.clone());
        self.index.insert(key, idx);
        idx
    }

    pub fn entries(&self) -> &[(Vec<ValType>, Vec<ValType>)] {
        &self.entries
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Static data
// ══════════════════════════════════════════════════════════════════════════════

/// Interned static data placed at the bottom of linear memory. String
/// literals are stored length-prefixed and deduplicated by content; address
/// 0 is kept unused so it can serve as a null pointer.
#[derive(Debug)]
pub struct DataBuilder {
    bytes: Vec<u8>,
    strings: HashMap<String, u32>,
}

impl Default for DataBuilder {
    fn default() -> Self {
        DataBuilder {
            // Reserved null region.
            bytes: vec![0; 8],
            strings: HashMap::new(),
        }
    }
}

impl DataBuilder {
    /// Intern a string literal. Returns the address of its 4-byte length
    /// header.
    pub fn intern_str(&mut self, s: &str) -> u32 {
        if let Some(&addr) = self.strings.get(s) {
            return addr;
        }
        let addr = self.bytes.len() as u32;
        self.bytes
            .extend_from_slice(&(s.len() as u32).to_le_bytes());
        self.bytes.extend_from_slice(s.as_bytes());
        self.strings.insert(s.to_string(), addr);
        addr
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> u32 {
        self.bytes.len() as u32
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Module context
// ══════════════════════════════════════════════════════════════════════════════

/// A materialized module-level global slot.
#[derive(Debug, Clone)]
pub struct GlobalEntry {
    pub name: String,
    pub index: u32,
    pub desc: TypeDesc,
}

/// Module-scoped compilation state.
pub struct ModuleCtx {
    /// Read-only after layout resolution.
    pub registry: TypeRegistry,
    /// Functions by name; methods are also reachable via `methods`.
    pub funcs: HashMap<String, FuncEntry>,
    /// Struct name → method name → entry.
    pub methods: HashMap<String, HashMap<String, FuncEntry>>,
    /// Declared module-level variables not yet materialized as WASM globals.
    pub global_decls: HashMap<String, TypeDesc>,
    /// Materialized globals, in declaration-of-first-use order.
    pub globals: Vec<GlobalEntry>,
    global_index: HashMap<String, u32>,
    /// First global index available to user variables (the runtime heap
    /// globals come first).
    pub first_user_global: u32,
    pub types: TypeTable,
    pub data: DataBuilder,
    /// Function table contents: absolute function indices, slot = position.
    pub table: Vec<u32>,
    /// Function name → memoized table slot.
    table_slots: HashMap<String, u32>,
    /// Trampoline bodies synthesized during compilation, appended to the
    /// code section after user functions: (type index, body).
    pub synthesized: Vec<(u32, Function)>,
    /// Function name → synthesized trampoline index.
    pub trampolines: HashMap<String, u32>,
    /// Next free absolute function index (for trampolines).
    pub next_func_index: u32,
}

impl ModuleCtx {
    pub fn new(registry: TypeRegistry, first_user_global: u32) -> Self {
        ModuleCtx {
            registry,
            funcs: HashMap::new(),
            methods: HashMap::new(),
            global_decls: HashMap::new(),
            globals: Vec::new(),
            global_index: HashMap::new(),
            first_user_global,
            types: TypeTable::default(),
            data: DataBuilder::default(),
            table: Vec::new(),
            table_slots: HashMap::new(),
            synthesized: Vec::new(),
            trampolines: HashMap::new(),
            next_func_index: 0,
        }
    }

    /// Intern the wasm type of `sig`, optionally prefixed with the uniform
    /// i32 context parameter of the indirect calling convention.
    pub fn func_type_index(&mut self, sig: &FuncType, with_context: bool) -> u32 {
        let mut params: Vec<ValType> = Vec::with_capacity(sig.params.len() + 1);
        if with_context {
            params.push(ValType::I32);
        }
        params.extend(sig.params.iter().map(abi_val_type));
        let results = sig.result.iter().map(abi_val_type).collect();
        self.types.intern(params, results)
    }

    /// Materialize a declared module-level variable as a mutable WASM global
    /// with a zero initializer of its raw kind, the first time it is
    /// referenced.
    pub fn ensure_global(&mut self, name: &str) -> CodegenResult<GlobalEntry> {
        if let Some(&idx) = self.global_index.get(name) {
            let slot = (idx - self.first_user_global) as usize;
            return Ok(self.globals[slot].clone());
        }
        let desc = self
            .global_decls
            .get(name)
            .cloned()
            .ok_or_else(|| CodegenError::UnresolvedSymbol(name.to_string()))?;
        let index = self.first_user_global + self.globals.len() as u32;
        let entry = GlobalEntry {
            name: name.to_string(),
            index,
            desc,
        };
        self.globals.push(entry.clone());
        self.global_index.insert(name.to_string(), index);
        Ok(entry)
    }

    /// The memoized function-table slot for a function index. One slot per
    /// distinct function name, however many times it is captured.
    pub fn table_slot(&mut self, name: &str, func_index: u32) -> u32 {
        if let Some(&slot) = self.table_slots.get(name) {
            return slot;
        }
        let slot = self.table.len() as u32;
        self.table.push(func_index);
        self.table_slots.insert(name.to_string(), slot);
        slot
    }

    /// Look up a method entry on a struct.
    pub fn method(&self, struct_name: &str, method: &str) -> Option<&FuncEntry> {
        self.methods.get(struct_name)?.get(method)
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Per-function context
// ══════════════════════════════════════════════════════════════════════════════

/// State for one function body: named bindings, the local-slot counter, and
/// the estimated stack-frame size (locals plus by-value aggregate copies).
pub struct FuncCtx {
    /// Extra locals declared during codegen: (count, type).
    pub locals: Vec<(u32, ValType)>,
    pub bindings: HashMap<String, Value>,
    pub next_local: u32,
    pub frame_bytes: u32,
    /// The declared result descriptor, for return checking.
    pub result: Option<TypeDesc>,
}

impl FuncCtx {
    pub fn new(param_count: u32, result: Option<TypeDesc>) -> Self {
        FuncCtx {
            locals: Vec::new(),
            bindings: HashMap::new(),
            next_local: param_count,
            frame_bytes: 0,
            result,
        }
    }

    /// Allocate a fresh local slot of the given type.
    pub fn alloc_local(&mut self, ty: ValType) -> u32 {
        let idx = self.next_local;
        self.next_local += 1;
        self.locals.push((1, ty));
        self.frame_bytes += match ty {
            ValType::I64 | ValType::F64 => 8,
            ValType::V128 => 16,
            _ => 4,
        };
        idx
    }

    pub fn bind(&mut self, name: &str, value: Value) {
        self.bindings.insert(name.to_string(), value);
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.bindings.get(name)
    }
}

/// The full context handed through every translation call: shared module
/// state plus the current function's state.
pub struct Ctx<'m> {
    pub module: &'m mut ModuleCtx,
    pub func: FuncCtx,
}
