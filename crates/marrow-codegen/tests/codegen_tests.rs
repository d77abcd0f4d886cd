//! Integration tests for the WASM code generator.
//!
//! Tests validate:
//! - Minimal programs compile to valid WASM
//! - Module structure (the single import, runtime exports, table, globals)
//! - Deterministic output (same input → same bytes)
//! - Closure capture memoization at the table level
//! - The error taxonomy
//! - Descriptor table output

use marrow_codegen::{compile, describe, CodegenError, TypeRegistry};
use marrow_types::{
    BinOp, Expr, FieldDecl, FunctionDecl, GlobalDecl, Param, Program, Stmt, StructDecl, TypeExpr,
};
use wasmparser::{ExternalKind, Parser as WasmParser, Payload, TypeRef};

// ══════════════════════════════════════════════════════════════════════════════
// Helpers
// ══════════════════════════════════════════════════════════════════════════════

fn program(structs: Vec<StructDecl>, globals: Vec<GlobalDecl>, functions: Vec<FunctionDecl>) -> Program {
    Program {
        structs,
        globals,
        functions,
    }
}

fn func(name: &str, params: Vec<Param>, result: Option<TypeExpr>, body: Vec<Stmt>) -> FunctionDecl {
    FunctionDecl {
        name: name.to_string(),
        params,
        result,
        body,
        exported: true,
        method_of: None,
    }
}

fn param(name: &str, ty: TypeExpr) -> Param {
    Param {
        name: name.to_string(),
        ty,
    }
}

fn ty(name: &str) -> TypeExpr {
    TypeExpr::Name(name.to_string())
}

fn field(name: &str, type_name: &str) -> FieldDecl {
    FieldDecl {
        name: name.to_string(),
        type_name: type_name.to_string(),
        is_ref: false,
    }
}

fn point_struct() -> StructDecl {
    StructDecl {
        name: "Point".to_string(),
        fields: vec![field("x", "i32"), field("y", "i32")],
    }
}

fn compile_wasm(program: &Program) -> Vec<u8> {
    compile(program)
        .unwrap_or_else(|e| panic!("codegen failed: {e}"))
        .wasm
}

/// Extract exports from WASM bytes.
fn get_exports(wasm: &[u8]) -> Vec<(String, ExternalKind)> {
    let mut exports = Vec::new();
    for payload in WasmParser::new(0).parse_all(wasm) {
        if let Ok(Payload::ExportSection(reader)) = payload {
            for export in reader {
                let exp = export.expect("valid export");
                exports.push((exp.name.to_string(), exp.kind));
            }
        }
    }
    exports
}

fn has_export(wasm: &[u8], name: &str, kind: ExternalKind) -> bool {
    get_exports(wasm).iter().any(|(n, k)| n == name && *k == kind)
}

/// Extract (module, name) of every import.
fn get_imports(wasm: &[u8]) -> Vec<(String, String)> {
    let mut imports = Vec::new();
    for payload in WasmParser::new(0).parse_all(wasm) {
        if let Ok(Payload::ImportSection(reader)) = payload {
            for import in reader {
                let imp = import.expect("valid import");
                assert!(matches!(imp.ty, TypeRef::Func(_)));
                imports.push((imp.module.to_string(), imp.name.to_string()));
            }
        }
    }
    imports
}

/// The declared minimum size of the function table.
fn table_min(wasm: &[u8]) -> u64 {
    for payload in WasmParser::new(0).parse_all(wasm) {
        if let Ok(Payload::TableSection(reader)) = payload {
            for table in reader {
                return table.expect("valid table").ty.initial;
            }
        }
    }
    panic!("no table section");
}

// ══════════════════════════════════════════════════════════════════════════════
// Module structure
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn empty_program_compiles_to_valid_wasm() {
    let wasm = compile_wasm(&program(vec![], vec![], vec![]));
    assert!(wasm.starts_with(b"\0asm"));
    assert!(wasmparser::validate(&wasm).is_ok());
}

#[test]
fn runtime_surface_is_exported() {
    let wasm = compile_wasm(&program(vec![], vec![], vec![]));
    assert!(has_export(&wasm, "memory", ExternalKind::Memory));
    assert!(has_export(&wasm, "table", ExternalKind::Table));
    for global in [
        "stack_ptr",
        "arena_heap_origin",
        "arena_heap_offset",
        "pinned_heap_ptr",
    ] {
        assert!(has_export(&wasm, global, ExternalKind::Global), "{global}");
    }
    for f in [
        "arena_heap_malloc",
        "arena_heap_reset",
        "pinned_heap_malloc",
        "cmp",
        "String.concat",
    ] {
        assert!(has_export(&wasm, f, ExternalKind::Func), "{f}");
    }
}

#[test]
fn the_single_import_is_the_memory_refresh_callback() {
    let wasm = compile_wasm(&program(vec![], vec![], vec![]));
    assert_eq!(
        get_imports(&wasm),
        vec![("env".to_string(), "memory_refresh".to_string())]
    );
}

#[test]
fn exported_function_appears_under_its_name() {
    let wasm = compile_wasm(&program(
        vec![],
        vec![],
        vec![func(
            "answer",
            vec![],
            Some(ty("i32")),
            vec![Stmt::Return(Some(Expr::int(42)))],
        )],
    ));
    assert!(has_export(&wasm, "answer", ExternalKind::Func));
}

#[test]
fn unexported_function_stays_internal() {
    let mut hidden = func(
        "hidden",
        vec![],
        Some(ty("i32")),
        vec![Stmt::Return(Some(Expr::int(1)))],
    );
    hidden.exported = false;
    let wasm = compile_wasm(&program(vec![], vec![], vec![hidden]));
    assert!(!has_export(&wasm, "hidden", ExternalKind::Func));
}

#[test]
fn identical_input_produces_identical_bytes() {
    let prog = program(
        vec![point_struct()],
        vec![GlobalDecl {
            name: "counter".to_string(),
            ty: ty("i64"),
        }],
        vec![func(
            "poke",
            vec![],
            Some(ty("i64")),
            vec![
                Stmt::Assign {
                    target: Expr::ident("counter"),
                    value: Expr::binary(
                        BinOp::Add,
                        Expr::ident("counter"),
                        Expr::int_as(1, "i64"),
                    ),
                },
                Stmt::Return(Some(Expr::ident("counter"))),
            ],
        )],
    );
    assert_eq!(compile_wasm(&prog), compile_wasm(&prog));
}

// ══════════════════════════════════════════════════════════════════════════════
// Closure capture
// ══════════════════════════════════════════════════════════════════════════════

fn closure_program(extra_calls: usize) -> Program {
    let apply = func(
        "apply",
        vec![
            param("f", TypeExpr::Func {
                params: vec![ty("i32")],
                result: Some(Box::new(ty("i32"))),
            }),
            param("v", ty("i32")),
        ],
        Some(ty("i32")),
        vec![Stmt::Return(Some(Expr::call(
            Expr::ident("f"),
            vec![Expr::ident("v")],
        )))],
    );
    let double = func(
        "double",
        vec![param("x", ty("i32"))],
        Some(ty("i32")),
        vec![Stmt::Return(Some(Expr::binary(
            BinOp::Mul,
            Expr::ident("x"),
            Expr::int(2),
        )))],
    );
    let mut body = Vec::new();
    for _ in 0..extra_calls {
        body.push(Stmt::Expr(Expr::call(
            Expr::ident("apply"),
            vec![Expr::ident("double"), Expr::int(1)],
        )));
    }
    body.push(Stmt::Return(Some(Expr::call(
        Expr::ident("apply"),
        vec![Expr::ident("double"), Expr::int(21)],
    ))));
    let user = func("run", vec![], Some(ty("i32")), body);
    program(vec![], vec![], vec![apply, double, user])
}

#[test]
fn capturing_the_same_function_twice_reuses_the_table_slot() {
    let once = compile_wasm(&closure_program(0));
    let thrice = compile_wasm(&closure_program(2));
    assert_eq!(table_min(&once), 1);
    assert_eq!(table_min(&thrice), 1);
}

// ══════════════════════════════════════════════════════════════════════════════
// Frame accounting
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn frame_sizes_are_reported_per_function() {
    let compiled = compile(&program(
        vec![point_struct()],
        vec![],
        vec![func(
            "make",
            vec![],
            Some(ty("i32")),
            vec![
                Stmt::Let {
                    name: "p".to_string(),
                    ty: None,
                    value: Expr::StructLit {
                        name: "Point".to_string(),
                        fields: vec![
                            ("x".to_string(), Expr::int(7)),
                            ("y".to_string(), Expr::int(9)),
                        ],
                    },
                },
                Stmt::Return(Some(Expr::field(Expr::ident("p"), "x"))),
            ],
        )],
    ))
    .unwrap();
    assert_eq!(compiled.frame_sizes.len(), 1);
    let (name, bytes) = &compiled.frame_sizes[0];
    assert_eq!(name, "make");
    assert!(*bytes > 0);
}

// ══════════════════════════════════════════════════════════════════════════════
// Error taxonomy
// ══════════════════════════════════════════════════════════════════════════════

fn compile_err(prog: &Program) -> CodegenError {
    compile(prog).map(|_| ()).unwrap_err()
}

#[test]
fn mismatched_operand_kinds_are_rejected() {
    // bool + i32 has no promotion rung.
    let err = compile_err(&program(
        vec![],
        vec![],
        vec![func(
            "bad",
            vec![param("flag", ty("bool")), param("n", ty("i32"))],
            Some(ty("i32")),
            vec![Stmt::Return(Some(Expr::binary(
                BinOp::Add,
                Expr::ident("flag"),
                Expr::ident("n"),
            )))],
        )],
    ));
    assert!(matches!(err, CodegenError::OperatorTypeMismatch { .. }));
}

#[test]
fn vector_scalar_mixing_is_rejected() {
    let err = compile_err(&program(
        vec![],
        vec![],
        vec![func(
            "bad",
            vec![param("v", ty("f32x4")), param("s", ty("i64"))],
            Some(ty("f32x4")),
            vec![Stmt::Return(Some(Expr::binary(
                BinOp::Add,
                Expr::ident("v"),
                Expr::ident("s"),
            )))],
        )],
    ));
    assert!(matches!(err, CodegenError::OperatorTypeMismatch { .. }));
}

#[test]
fn assigning_a_string_to_an_integer_local_is_rejected() {
    let err = compile_err(&program(
        vec![],
        vec![],
        vec![func(
            "bad",
            vec![],
            None,
            vec![
                Stmt::Let {
                    name: "x".to_string(),
                    ty: Some(ty("i32")),
                    value: Expr::int(1),
                },
                Stmt::Assign {
                    target: Expr::ident("x"),
                    value: Expr::str("nope"),
                },
            ],
        )],
    ));
    assert!(matches!(err, CodegenError::AssignmentTypeMismatch { .. }));
}

#[test]
fn unknown_field_and_unknown_method_are_distinguished() {
    let base = |expr: Expr| {
        program(
            vec![point_struct()],
            vec![],
            vec![func(
                "bad",
                vec![param("p", ty("Point"))],
                Some(ty("i32")),
                vec![Stmt::Return(Some(expr))],
            )],
        )
    };
    let field_err = compile_err(&base(Expr::field(Expr::ident("p"), "zzz")));
    assert!(
        matches!(field_err, CodegenError::UnknownField { ref field, .. } if field == "zzz"),
        "{field_err}"
    );
    let method_err = compile_err(&base(Expr::call(
        Expr::field(Expr::ident("p"), "zzz"),
        vec![],
    )));
    assert!(
        matches!(method_err, CodegenError::UnknownMethod { ref method, .. } if method == "zzz"),
        "{method_err}"
    );
}

#[test]
fn wrong_argument_count_is_rejected() {
    let err = compile_err(&program(
        vec![],
        vec![],
        vec![
            func(
                "one",
                vec![param("x", ty("i32"))],
                Some(ty("i32")),
                vec![Stmt::Return(Some(Expr::ident("x")))],
            ),
            func(
                "bad",
                vec![],
                Some(ty("i32")),
                vec![Stmt::Return(Some(Expr::call(
                    Expr::ident("one"),
                    vec![Expr::int(1), Expr::int(2)],
                )))],
            ),
        ],
    ));
    assert!(
        matches!(err, CodegenError::ArityMismatch { expected: 1, found: 2 }),
        "{err}"
    );
}

#[test]
fn unresolved_names_are_rejected() {
    let err = compile_err(&program(
        vec![],
        vec![],
        vec![func(
            "bad",
            vec![],
            Some(ty("i32")),
            vec![Stmt::Return(Some(Expr::ident("nonesuch")))],
        )],
    ));
    assert!(matches!(err, CodegenError::UnresolvedSymbol(name) if name == "nonesuch"));
}

#[test]
fn struct_cycles_surface_through_compile() {
    let err = compile_err(&program(
        vec![StructDecl {
            name: "Knot".to_string(),
            fields: vec![field("next", "Knot")],
        }],
        vec![],
        vec![],
    ));
    assert!(matches!(err, CodegenError::StructCycle(_)));
}

// ══════════════════════════════════════════════════════════════════════════════
// Descriptor table
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn descriptor_table_reports_layout_and_methods() {
    let norm = FunctionDecl {
        name: "norm1".to_string(),
        params: vec![param("self", ty("Point"))],
        result: Some(ty("i32")),
        body: vec![Stmt::Return(Some(Expr::binary(
            BinOp::Add,
            Expr::field(Expr::ident("self"), "x"),
            Expr::field(Expr::ident("self"), "y"),
        )))],
        exported: false,
        method_of: Some("Point".to_string()),
    };
    let prog = program(vec![point_struct()], vec![], vec![norm]);
    let registry = TypeRegistry::resolve(&prog.structs).unwrap();
    let table = describe(&registry, &prog);

    assert_eq!(table.types.len(), 1);
    let point = &table.types[0];
    assert_eq!(point.name, "Point");
    assert_eq!(point.size, 8);
    assert_eq!(point.fields[1].name, "y");
    assert_eq!(point.fields[1].offset, 4);
    assert!(!point.fields[1].is_ref);
    assert_eq!(point.methods, vec!["norm1".to_string()]);

    let json = table.to_json().unwrap();
    assert!(json.contains("\"classification\": \"struct\""));
    assert!(json.contains("\"offset\": 4"));
}
