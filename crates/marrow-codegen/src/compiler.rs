//! Main WASM module assembler.
//!
//! Orchestrates the code generation pipeline:
//! 1. Resolve struct layouts into the type registry
//! 2. Register module globals and function signatures (indices are fixed
//!    before any body is compiled)
//! 3. Translate every function body through the value layer
//! 4. Assemble all sections, with the injected heap and string routines
//!    between the import and the user functions and any synthesized
//!    trampolines after them
//! 5. Validate with `wasmparser`

use std::borrow::Cow;
use std::rc::Rc;

use marrow_types::Program;
use wasm_encoder::{
    CodeSection, ConstExpr, DataSection, ElementSection, Elements, EntityType, ExportKind,
    ExportSection, Function, FunctionSection, GlobalSection, GlobalType, ImportSection,
    Instruction as I, MemorySection, MemoryType, Module, RefType, TableSection, TableType,
    TypeSection, ValType,
};

use crate::context::{abi_val_type, Ctx, FuncCtx, FuncEntry, ModuleCtx};
use crate::error::{CodegenError, CodegenResult};
use crate::instance::Storage;
use crate::layout::{FuncType, TypeDesc, TypeRegistry};
use crate::value::{Pointer, Value};
use crate::{runtime, stmt, strings};

// ══════════════════════════════════════════════════════════════════════════════
// Public API
// ══════════════════════════════════════════════════════════════════════════════

/// The result of a successful compilation.
pub struct CompiledModule {
    /// The validated `.wasm` binary.
    pub wasm: Vec<u8>,
    /// Estimated per-function frame footprint in bytes (locals plus
    /// by-value aggregate copies), in declaration order. Embedders can use
    /// this to flag pathological value-type nesting.
    pub frame_sizes: Vec<(String, u32)>,
}

/// Compile a resolved [`Program`] into a validated WebAssembly module.
pub fn compile(program: &Program) -> CodegenResult<CompiledModule> {
    let registry = TypeRegistry::resolve(&program.structs)?;
    let mut mctx = ModuleCtx::new(registry, runtime::RUNTIME_GLOBALS);

    for g in &program.globals {
        let desc = mctx.registry.lookup_expr(&g.ty)?;
        mctx.global_decls.insert(g.name.clone(), desc);
    }

    register_functions(program, &mut mctx)?;
    let (bodies, frame_sizes) = compile_bodies(program, &mut mctx)?;
    let wasm = assemble(program, mctx, bodies)?;

    wasmparser::validate(&wasm)
        .map_err(|e| CodegenError::ValidationFailed(format!("{e}")))?;

    Ok(CompiledModule { wasm, frame_sizes })
}

// ══════════════════════════════════════════════════════════════════════════════
// Function registration
// ══════════════════════════════════════════════════════════════════════════════

/// Fix every user function's absolute index and signature up front, so
/// bodies can call forward.
fn register_functions(program: &Program, mctx: &mut ModuleCtx) -> CodegenResult<()> {
    for (i, decl) in program.functions.iter().enumerate() {
        let params = decl
            .params
            .iter()
            .map(|p| mctx.registry.lookup_expr(&p.ty))
            .collect::<CodegenResult<Vec<_>>>()?;
        let result = match &decl.result {
            Some(t) => Some(mctx.registry.lookup_expr(t)?),
            None => None,
        };
        let name = match &decl.method_of {
            Some(s) => format!("{s}.{}", decl.name),
            None => decl.name.clone(),
        };
        let entry = FuncEntry {
            name,
            index: runtime::FIRST_USER_FUNC + i as u32,
            sig: Rc::new(FuncType { params, result }),
            exported: decl.exported,
            method_of: decl.method_of.clone(),
        };
        match &decl.method_of {
            Some(s) => {
                mctx.methods
                    .entry(s.clone())
                    .or_default()
                    .insert(decl.name.clone(), entry);
            }
            None => {
                mctx.funcs.insert(decl.name.clone(), entry);
            }
        }
    }
    mctx.next_func_index = runtime::FIRST_USER_FUNC + program.functions.len() as u32;
    Ok(())
}

fn entry_for<'a>(decl_name: &str, method_of: &Option<String>, mctx: &'a ModuleCtx) -> CodegenResult<FuncEntry> {
    let entry = match method_of {
        Some(s) => mctx.method(s, decl_name),
        None => mctx.funcs.get(decl_name),
    };
    entry
        .cloned()
        .ok_or_else(|| CodegenError::Internal(format!("unregistered function `{decl_name}`")))
}

// ══════════════════════════════════════════════════════════════════════════════
// Body translation
// ══════════════════════════════════════════════════════════════════════════════

type Bodies = Vec<(u32, Function)>;

fn compile_bodies(
    program: &Program,
    mctx: &mut ModuleCtx,
) -> CodegenResult<(Bodies, Vec<(String, u32)>)> {
    let mut bodies = Vec::with_capacity(program.functions.len());
    let mut frame_sizes = Vec::with_capacity(program.functions.len());

    for decl in &program.functions {
        let entry = entry_for(&decl.name, &decl.method_of, mctx)?;
        let mut ctx = Ctx {
            module: mctx,
            func: FuncCtx::new(decl.params.len() as u32, entry.sig.result.clone()),
        };

        for (i, (param, desc)) in decl.params.iter().zip(entry.sig.params.iter()).enumerate() {
            let v = match desc {
                TypeDesc::Primitive(kind) => Value::local(*kind, i as u32),
                agg => Value::at_address(agg, Pointer::local(i as u32), Storage::Arena, true),
            };
            ctx.func.bind(&param.name, v);
        }

        let mut body = Vec::new();
        stmt::compile_block(&decl.body, &mut ctx, &mut body)?;

        let type_index = ctx.module.func_type_index(&entry.sig, false);
        let mut f = Function::new(ctx.func.locals.clone());
        for instr in &body {
            f.instruction(instr);
        }
        // Bodies that fall off the end of a value-returning function have
        // already missed their return; make the validator's view explicit.
        if entry.sig.result.is_some() {
            f.instruction(&I::Unreachable);
        }
        f.instruction(&I::End);

        frame_sizes.push((entry.name.clone(), ctx.func.frame_bytes));
        bodies.push((type_index, f));
    }
    Ok((bodies, frame_sizes))
}

// ══════════════════════════════════════════════════════════════════════════════
// Section assembly
// ══════════════════════════════════════════════════════════════════════════════

fn zero_init(ty: ValType) -> ConstExpr {
    match ty {
        ValType::I64 => ConstExpr::i64_const(0),
        ValType::F32 => ConstExpr::f32_const(0.0),
        ValType::F64 => ConstExpr::f64_const(0.0),
        ValType::V128 => ConstExpr::v128_const(0),
        _ => ConstExpr::i32_const(0),
    }
}

fn assemble(program: &Program, mut mctx: ModuleCtx, bodies: Bodies) -> CodegenResult<Vec<u8>> {
    if mctx.data.len() > runtime::STACK_TOP {
        return Err(CodegenError::Internal(
            "static data exceeds the reserved low region".to_string(),
        ));
    }

    let ty_void = mctx.types.intern(vec![], vec![]);
    let ty_malloc = mctx.types.intern(vec![ValType::I32], vec![ValType::I32]);
    let ty_binstr = mctx
        .types
        .intern(vec![ValType::I32, ValType::I32], vec![ValType::I32]);

    let mut module = Module::new();

    // 1. Type section
    let mut types = TypeSection::new();
    for (params, results) in mctx.types.entries() {
        types.ty().function(params.clone(), results.clone());
    }
    module.section(&types);

    // 2. Import section
    let mut imports = ImportSection::new();
    imports.import(
        runtime::IMPORT_MODULE,
        runtime::IMPORT_REFRESH,
        EntityType::Function(ty_void),
    );
    module.section(&imports);

    // 3. Function section: injected runtime, user functions, trampolines
    let mut funcs = FunctionSection::new();
    funcs.function(ty_malloc); // arena_heap_malloc
    funcs.function(ty_void); // arena_heap_reset
    funcs.function(ty_malloc); // pinned_heap_malloc
    funcs.function(ty_binstr); // cmp
    funcs.function(ty_binstr); // String.concat
    for (type_index, _) in &bodies {
        funcs.function(*type_index);
    }
    for (type_index, _) in &mctx.synthesized {
        funcs.function(*type_index);
    }
    module.section(&funcs);

    // 4. Table section
    let slots = mctx.table.len() as u64;
    let mut tables = TableSection::new();
    tables.table(TableType {
        element_type: RefType::FUNCREF,
        minimum: slots,
        maximum: Some(slots),
        table64: false,
        shared: false,
    });
    module.section(&tables);

    // 5. Memory section
    let mut memory = MemorySection::new();
    memory.memory(MemoryType {
        minimum: runtime::INITIAL_PAGES,
        maximum: None,
        memory64: false,
        shared: false,
        page_size_log2: None,
    });
    module.section(&memory);

    // 6. Global section: the six runtime globals, then user globals
    let mut globals = GlobalSection::new();
    let mut_i32 = GlobalType {
        val_type: ValType::I32,
        mutable: true,
        shared: false,
    };
    globals.global(mut_i32, &ConstExpr::i32_const(runtime::STACK_TOP as i32));
    globals.global(mut_i32, &ConstExpr::i32_const(runtime::ARENA_ORIGIN as i32));
    globals.global(mut_i32, &ConstExpr::i32_const(0));
    globals.global(mut_i32, &ConstExpr::i32_const(runtime::PINNED_BASE as i32));
    globals.global(mut_i32, &ConstExpr::i32_const(0));
    globals.global(mut_i32, &ConstExpr::i32_const(runtime::PINNED_LIMIT as i32));
    for entry in &mctx.globals {
        let ty = abi_val_type(&entry.desc);
        globals.global(
            GlobalType {
                val_type: ty,
                mutable: true,
                shared: false,
            },
            &zero_init(ty),
        );
    }
    module.section(&globals);

    // 7. Export section
    let mut exports = ExportSection::new();
    exports.export(runtime::EXPORT_MEMORY, ExportKind::Memory, 0);
    exports.export(runtime::EXPORT_TABLE, ExportKind::Table, 0);
    exports.export(
        runtime::EXPORT_STACK_PTR,
        ExportKind::Global,
        runtime::GLOBAL_STACK_PTR,
    );
    exports.export(
        runtime::EXPORT_ARENA_ORIGIN,
        ExportKind::Global,
        runtime::GLOBAL_ARENA_ORIGIN,
    );
    exports.export(
        runtime::EXPORT_ARENA_OFFSET,
        ExportKind::Global,
        runtime::GLOBAL_ARENA_OFFSET,
    );
    exports.export(
        runtime::EXPORT_PINNED_PTR,
        ExportKind::Global,
        runtime::GLOBAL_PINNED_PTR,
    );
    exports.export(
        runtime::EXPORT_ARENA_MALLOC,
        ExportKind::Func,
        runtime::rt_func_idx(runtime::RT_ARENA_MALLOC),
    );
    exports.export(
        runtime::EXPORT_ARENA_RESET,
        ExportKind::Func,
        runtime::rt_func_idx(runtime::RT_ARENA_RESET),
    );
    exports.export(
        runtime::EXPORT_PINNED_MALLOC,
        ExportKind::Func,
        runtime::rt_func_idx(runtime::RT_PINNED_MALLOC),
    );
    exports.export(
        runtime::EXPORT_STR_CMP,
        ExportKind::Func,
        runtime::rt_func_idx(runtime::RT_STR_CMP),
    );
    exports.export(
        runtime::EXPORT_STR_CONCAT,
        ExportKind::Func,
        runtime::rt_func_idx(runtime::RT_STR_CONCAT),
    );
    for decl in &program.functions {
        if decl.exported && decl.method_of.is_none() {
            let entry = entry_for(&decl.name, &decl.method_of, &mctx)?;
            exports.export(&decl.name, ExportKind::Func, entry.index);
        }
    }
    module.section(&exports);

    // 8. Element section (function table contents)
    if !mctx.table.is_empty() {
        let mut elements = ElementSection::new();
        elements.active(
            None,
            &ConstExpr::i32_const(0),
            Elements::Functions(Cow::Owned(mctx.table.clone())),
        );
        module.section(&elements);
    }

    // 9. Code section, same order as the function section
    let mut code = CodeSection::new();
    code.function(&runtime::arena_malloc_body());
    code.function(&runtime::arena_reset_body());
    code.function(&runtime::pinned_malloc_body());
    code.function(&strings::str_cmp_body());
    code.function(&strings::str_concat_body());
    for (_, f) in &bodies {
        code.function(f);
    }
    for (_, f) in &mctx.synthesized {
        code.function(f);
    }
    module.section(&code);

    // 10. Data section
    let mut data = DataSection::new();
    data.active(0, &ConstExpr::i32_const(0), mctx.data.bytes().iter().copied());
    module.section(&data);

    Ok(module.finish())
}
