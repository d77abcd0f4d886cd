//! Execution tests: compiled modules instantiated under `wasmi`.
//!
//! Each test compiles a small program, instantiates it with a stub
//! `env.memory_refresh` host function that counts its invocations, and
//! checks the observable behavior of the generated code: allocator laws,
//! arithmetic and promotion, aggregate access, string runtime, closures,
//! methods, and globals.

use marrow_codegen::{compile, runtime};
use marrow_types::{
    BinOp, Expr, FieldDecl, FunctionDecl, GlobalDecl, Param, Program, Stmt, StructDecl, TypeExpr,
};

// ══════════════════════════════════════════════════════════════════════════════
// Helpers — program construction
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

fn let_stmt(name: &str, value: Expr) -> Stmt {
    Stmt::Let {
        name: name.to_string(),
        ty: None,
        value,
    }
}

fn assign(target: Expr, value: Expr) -> Stmt {
    Stmt::Assign { target, value }
}

fn ret(e: Expr) -> Stmt {
    Stmt::Return(Some(e))
}

// ══════════════════════════════════════════════════════════════════════════════
// Runner — wasmi instantiation with a refresh-counting host
// ══════════════════════════════════════════════════════════════════════════════

struct Runner {
    store: wasmi::Store<u32>,
    instance: wasmi::Instance,
}

impl Runner {
    fn new(prog: &Program) -> Self {
        let wasm = compile(prog)
            .unwrap_or_else(|e| panic!("codegen failed: {e}"))
            .wasm;
        let engine = wasmi::Engine::default();
        let module = wasmi::Module::new(&engine, &wasm).expect("module parse");

        // Store data counts env.memory_refresh invocations.
        let mut store = wasmi::Store::new(&engine, 0u32);
        let mut linker = <wasmi::Linker<u32>>::new(&engine);
        linker
            .func_wrap("env", "memory_refresh", |mut caller: wasmi::Caller<'_, u32>| {
                *caller.data_mut() += 1;
            })
            .expect("link memory_refresh");

        let instance = linker
            .instantiate(&mut store, &module)
            .expect("instantiation failed")
            .start(&mut store)
            .expect("start failed");

        Self { store, instance }
    }

    fn empty() -> Self {
        Self::new(&program(vec![], vec![], vec![]))
    }

    fn call_i32(&mut self, name: &str, arg: i32) -> i32 {
        let f = self
            .instance
            .get_typed_func::<i32, i32>(&self.store, name)
            .unwrap_or_else(|e| panic!("no export `{name}`: {e}"));
        f.call(&mut self.store, arg)
            .unwrap_or_else(|e| panic!("`{name}` trapped: {e}"))
    }

    fn call0_i32(&mut self, name: &str) -> i32 {
        let f = self
            .instance
            .get_typed_func::<(), i32>(&self.store, name)
            .unwrap_or_else(|e| panic!("no export `{name}`: {e}"));
        f.call(&mut self.store, ())
            .unwrap_or_else(|e| panic!("`{name}` trapped: {e}"))
    }

    fn call0_void(&mut self, name: &str) {
        let f = self
            .instance
            .get_typed_func::<(), ()>(&self.store, name)
            .unwrap_or_else(|e| panic!("no export `{name}`: {e}"));
        f.call(&mut self.store, ())
            .unwrap_or_else(|e| panic!("`{name}` trapped: {e}"));
    }

    fn refresh_count(&self) -> u32 {
        *self.store.data()
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Allocator laws
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn arena_malloc_bumps_and_reset_rewinds() {
    let mut r = Runner::empty();
    let origin = runtime::ARENA_ORIGIN as i32;
    assert_eq!(r.call_i32("arena_heap_malloc", 16), origin);
    assert_eq!(r.call_i32("arena_heap_malloc", 10), origin + 16);
    r.call0_void("arena_heap_reset");
    assert_eq!(r.call_i32("arena_heap_malloc", 4), origin);
    assert_eq!(r.refresh_count(), 0);
}

#[test]
fn arena_growth_invokes_the_refresh_callback_once() {
    let mut r = Runner::empty();
    // Three initial pages; this block pushes the high-water mark two pages
    // past the end while leaving 8 bytes of slack before the new end.
    assert_eq!(
        r.call_i32("arena_heap_malloc", 0x2FFF8),
        runtime::ARENA_ORIGIN as i32
    );
    assert_eq!(r.refresh_count(), 1);
    // The follow-up allocation fits in the grown memory exactly.
    assert_eq!(
        r.call_i32("arena_heap_malloc", 8),
        runtime::ARENA_ORIGIN as i32 + 0x2FFF8
    );
    assert_eq!(r.refresh_count(), 1);
}

#[test]
fn pinned_malloc_bumps_and_never_moves() {
    let mut r = Runner::empty();
    let base = runtime::PINNED_BASE as i32;
    assert_eq!(r.call_i32("pinned_heap_malloc", 8), base);
    assert_eq!(r.call_i32("pinned_heap_malloc", 24), base + 8);
}

#[test]
fn pinned_exhaustion_carves_a_slab_from_the_arena() {
    let mut r = Runner::empty();
    let base = runtime::PINNED_BASE as i32;
    let origin = runtime::ARENA_ORIGIN as i32;
    assert_eq!(r.call_i32("pinned_heap_malloc", 8), base);
    // The reservation cannot hold a full page more; a one-page slab is
    // taken from the arena frontier instead.
    assert_eq!(r.call_i32("pinned_heap_malloc", 0x10000), origin);
    assert_eq!(r.refresh_count(), 0);
    // The arena keeps bumping past the carved slab.
    assert_eq!(r.call_i32("arena_heap_malloc", 16), origin + 0x10000);
}

#[test]
fn arena_reset_never_recycles_pinned_slabs() {
    let mut r = Runner::empty();
    let origin = runtime::ARENA_ORIGIN as i32;
    assert_eq!(r.call_i32("pinned_heap_malloc", 0x10000), runtime::PINNED_BASE as i32);
    assert_eq!(r.call_i32("pinned_heap_malloc", 0x10000), origin);
    assert_eq!(r.call_i32("arena_heap_malloc", 16), origin + 0x10000);
    // Reset rewinds to just past the slab, not to the arena origin.
    r.call0_void("arena_heap_reset");
    assert_eq!(r.call_i32("arena_heap_malloc", 4), origin + 0x10000);
}

// ══════════════════════════════════════════════════════════════════════════════
// Arithmetic and conversions
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn integer_arithmetic() {
    let mut r = Runner::new(&program(
        vec![],
        vec![],
        vec![func(
            "add",
            vec![param("a", ty("i32")), param("b", ty("i32"))],
            Some(ty("i32")),
            vec![ret(Expr::binary(BinOp::Add, Expr::ident("a"), Expr::ident("b")))],
        )],
    ));
    let f = r
        .instance
        .get_typed_func::<(i32, i32), i32>(&r.store, "add")
        .unwrap();
    assert_eq!(f.call(&mut r.store, (2, 40)).unwrap(), 42);
    assert_eq!(f.call(&mut r.store, (-7, 7)).unwrap(), 0);
}

#[test]
fn mixed_operands_promote_to_the_wider_kind() {
    let mut r = Runner::new(&program(
        vec![],
        vec![],
        vec![func(
            "mix",
            vec![param("a", ty("i32")), param("b", ty("f64"))],
            Some(ty("f64")),
            vec![ret(Expr::binary(BinOp::Add, Expr::ident("a"), Expr::ident("b")))],
        )],
    ));
    let f = r
        .instance
        .get_typed_func::<(i32, f64), f64>(&r.store, "mix")
        .unwrap();
    assert_eq!(f.call(&mut r.store, (3, 0.5)).unwrap(), 3.5);
}

#[test]
fn float_to_int_conversion_truncates() {
    let mut r = Runner::new(&program(
        vec![],
        vec![],
        vec![func(
            "trunc",
            vec![],
            Some(ty("i32")),
            vec![ret(Expr::convert("i32", Expr::float(3.7)))],
        )],
    ));
    assert_eq!(r.call0_i32("trunc"), 3);
}

#[test]
fn sqrt_intrinsic_lowers_inline() {
    let mut r = Runner::new(&program(
        vec![],
        vec![],
        vec![func(
            "root",
            vec![param("x", ty("f64"))],
            Some(ty("f64")),
            vec![ret(Expr::intrinsic("sqrt", vec![Expr::ident("x")]))],
        )],
    ));
    let f = r
        .instance
        .get_typed_func::<f64, f64>(&r.store, "root")
        .unwrap();
    assert_eq!(f.call(&mut r.store, 144.0).unwrap(), 12.0);
}

// ══════════════════════════════════════════════════════════════════════════════
// Aggregates
// ══════════════════════════════════════════════════════════════════════════════

fn point_struct() -> StructDecl {
    StructDecl {
        name: "Point".to_string(),
        fields: vec![
            FieldDecl {
                name: "x".to_string(),
                type_name: "i32".to_string(),
                is_ref: false,
            },
            FieldDecl {
                name: "y".to_string(),
                type_name: "i32".to_string(),
                is_ref: false,
            },
        ],
    }
}

fn struct_lit(name: &str, fields: Vec<(&str, Expr)>) -> Expr {
    Expr::StructLit {
        name: name.to_string(),
        fields: fields
            .into_iter()
            .map(|(n, e)| (n.to_string(), e))
            .collect(),
    }
}

#[test]
fn struct_literal_fields_read_back() {
    let mut r = Runner::new(&program(
        vec![point_struct()],
        vec![],
        vec![func(
            "make",
            vec![],
            Some(ty("i32")),
            vec![
                let_stmt("p", struct_lit("Point", vec![("x", Expr::int(7)), ("y", Expr::int(9))])),
                ret(Expr::binary(
                    BinOp::Add,
                    Expr::field(Expr::ident("p"), "x"),
                    Expr::field(Expr::ident("p"), "y"),
                )),
            ],
        )],
    ));
    assert_eq!(r.call0_i32("make"), 16);
}

#[test]
fn nested_value_structs_read_through_three_levels() {
    let inner = StructDecl {
        name: "Inner".to_string(),
        fields: vec![FieldDecl {
            name: "v".to_string(),
            type_name: "i32".to_string(),
            is_ref: false,
        }],
    };
    let mid = StructDecl {
        name: "Mid".to_string(),
        fields: vec![
            FieldDecl {
                name: "a".to_string(),
                type_name: "Inner".to_string(),
                is_ref: false,
            },
            FieldDecl {
                name: "w".to_string(),
                type_name: "i32".to_string(),
                is_ref: false,
            },
        ],
    };
    let outer = StructDecl {
        name: "Outer".to_string(),
        fields: vec![
            FieldDecl {
                name: "b".to_string(),
                type_name: "Mid".to_string(),
                is_ref: false,
            },
            FieldDecl {
                name: "z".to_string(),
                type_name: "i32".to_string(),
                is_ref: false,
            },
        ],
    };
    let mut r = Runner::new(&program(
        vec![inner, mid, outer],
        vec![],
        vec![func(
            "deep",
            vec![],
            Some(ty("i32")),
            vec![
                let_stmt(
                    "c",
                    struct_lit(
                        "Outer",
                        vec![
                            (
                                "b",
                                struct_lit(
                                    "Mid",
                                    vec![
                                        ("a", struct_lit("Inner", vec![("v", Expr::int(7))])),
                                        ("w", Expr::int(5)),
                                    ],
                                ),
                            ),
                            ("z", Expr::int(7)),
                        ],
                    ),
                ),
                // c.b.a.v + c.b.w + c.z
                ret(Expr::binary(
                    BinOp::Add,
                    Expr::binary(
                        BinOp::Add,
                        Expr::field(
                            Expr::field(Expr::field(Expr::ident("c"), "b"), "a"),
                            "v",
                        ),
                        Expr::field(Expr::field(Expr::ident("c"), "b"), "w"),
                    ),
                    Expr::field(Expr::ident("c"), "z"),
                )),
            ],
        )],
    ));
    assert_eq!(r.call0_i32("deep"), 19);
}

#[test]
fn array_literal_elements_index_back() {
    let mut r = Runner::new(&program(
        vec![],
        vec![],
        vec![func(
            "sum",
            vec![],
            Some(ty("i32")),
            vec![
                let_stmt(
                    "a",
                    Expr::ArrayLit {
                        elem: ty("i32"),
                        elems: vec![Expr::int(3), Expr::int(5), Expr::int(8)],
                    },
                ),
                ret(Expr::binary(
                    BinOp::Add,
                    Expr::binary(
                        BinOp::Add,
                        Expr::index(Expr::ident("a"), Expr::int(0)),
                        Expr::index(Expr::ident("a"), Expr::int(1)),
                    ),
                    Expr::index(Expr::ident("a"), Expr::int(2)),
                )),
            ],
        )],
    ));
    assert_eq!(r.call0_i32("sum"), 16);
}

#[test]
fn reference_fields_can_be_reseated() {
    let holder = StructDecl {
        name: "Holder".to_string(),
        fields: vec![FieldDecl {
            name: "p".to_string(),
            type_name: "Point".to_string(),
            is_ref: true,
        }],
    };
    let mut r = Runner::new(&program(
        vec![point_struct(), holder],
        vec![],
        vec![func(
            "run",
            vec![],
            Some(ty("i32")),
            vec![
                let_stmt("a", struct_lit("Point", vec![("x", Expr::int(1)), ("y", Expr::int(2))])),
                let_stmt("h", struct_lit("Holder", vec![("p", Expr::ident("a"))])),
                let_stmt("c", struct_lit("Point", vec![("x", Expr::int(20)), ("y", Expr::int(10))])),
                assign(Expr::field(Expr::ident("h"), "p"), Expr::ident("c")),
                ret(Expr::binary(
                    BinOp::Add,
                    Expr::field(Expr::field(Expr::ident("h"), "p"), "x"),
                    Expr::field(Expr::field(Expr::ident("h"), "p"), "y"),
                )),
            ],
        )],
    ));
    assert_eq!(r.call0_i32("run"), 30);
}

#[test]
fn string_fields_can_be_relabeled() {
    let tag = StructDecl {
        name: "Tag".to_string(),
        fields: vec![FieldDecl {
            name: "label".to_string(),
            type_name: "string".to_string(),
            is_ref: true,
        }],
    };
    let mut r = Runner::new(&program(
        vec![tag],
        vec![],
        vec![func(
            "run",
            vec![],
            Some(ty("bool")),
            vec![
                let_stmt("t", struct_lit("Tag", vec![("label", Expr::str("old"))])),
                assign(Expr::field(Expr::ident("t"), "label"), Expr::str("new")),
                ret(Expr::binary(
                    BinOp::Eq,
                    Expr::field(Expr::ident("t"), "label"),
                    Expr::str("new"),
                )),
            ],
        )],
    ));
    assert_eq!(r.call0_i32("run"), 1);
}

fn point_add() -> FunctionDecl {
    func(
        "padd",
        vec![param("a", ty("Point")), param("b", ty("Point"))],
        Some(ty("Point")),
        vec![ret(struct_lit(
            "Point",
            vec![
                (
                    "x",
                    Expr::binary(
                        BinOp::Add,
                        Expr::field(Expr::ident("a"), "x"),
                        Expr::field(Expr::ident("b"), "x"),
                    ),
                ),
                (
                    "y",
                    Expr::binary(
                        BinOp::Add,
                        Expr::field(Expr::ident("a"), "y"),
                        Expr::field(Expr::ident("b"), "y"),
                    ),
                ),
            ],
        ))],
    )
}

#[test]
fn struct_returned_from_a_call_reads_back() {
    let run = func(
        "run",
        vec![],
        Some(ty("i32")),
        vec![
            let_stmt(
                "r",
                Expr::call(
                    Expr::ident("padd"),
                    vec![
                        struct_lit("Point", vec![("x", Expr::int(5)), ("y", Expr::int(6))]),
                        struct_lit("Point", vec![("x", Expr::int(3)), ("y", Expr::int(2))]),
                    ],
                ),
            ),
            ret(Expr::binary(
                BinOp::Add,
                Expr::field(Expr::ident("r"), "x"),
                Expr::field(Expr::ident("r"), "y"),
            )),
        ],
    );
    let mut r = Runner::new(&program(vec![point_struct()], vec![], vec![point_add(), run]));
    assert_eq!(r.call0_i32("run"), 16);
}

#[test]
fn struct_results_chain_through_nested_calls() {
    let lit = |x: i64, y: i64| struct_lit("Point", vec![("x", Expr::int(x)), ("y", Expr::int(y))]);
    let call = |a: Expr, b: Expr| Expr::call(Expr::ident("padd"), vec![a, b]);
    let run = func(
        "run",
        vec![],
        Some(ty("i32")),
        vec![
            let_stmt(
                "r",
                call(call(call(lit(5, 6), lit(3, 2)), lit(1, 0)), lit(1, 1)),
            ),
            ret(Expr::binary(
                BinOp::Add,
                Expr::field(Expr::ident("r"), "x"),
                Expr::field(Expr::ident("r"), "y"),
            )),
        ],
    );
    let mut r = Runner::new(&program(vec![point_struct()], vec![], vec![point_add(), run]));
    assert_eq!(r.call0_i32("run"), 19);
}

#[test]
fn array_returned_from_a_call_indexes_back() {
    let pair = TypeExpr::array(ty("i32"), 2);
    let aadd = func(
        "aadd",
        vec![param("a", pair.clone()), param("b", pair.clone())],
        Some(pair),
        vec![ret(Expr::ArrayLit {
            elem: ty("i32"),
            elems: vec![
                Expr::binary(
                    BinOp::Add,
                    Expr::index(Expr::ident("a"), Expr::int(0)),
                    Expr::index(Expr::ident("b"), Expr::int(0)),
                ),
                Expr::binary(
                    BinOp::Add,
                    Expr::index(Expr::ident("a"), Expr::int(1)),
                    Expr::index(Expr::ident("b"), Expr::int(1)),
                ),
            ],
        })],
    );
    let run = func(
        "run",
        vec![],
        Some(ty("i32")),
        vec![
            let_stmt(
                "r",
                Expr::call(
                    Expr::ident("aadd"),
                    vec![
                        Expr::ArrayLit {
                            elem: ty("i32"),
                            elems: vec![Expr::int(5), Expr::int(6)],
                        },
                        Expr::ArrayLit {
                            elem: ty("i32"),
                            elems: vec![Expr::int(3), Expr::int(2)],
                        },
                    ],
                ),
            ),
            ret(Expr::binary(
                BinOp::Add,
                Expr::index(Expr::ident("r"), Expr::int(0)),
                Expr::index(Expr::ident("r"), Expr::int(1)),
            )),
        ],
    );
    let mut r = Runner::new(&program(vec![], vec![], vec![aadd, run]));
    assert_eq!(r.call0_i32("run"), 16);
}

#[test]
fn while_loop_accumulates() {
    let mut r = Runner::new(&program(
        vec![],
        vec![],
        vec![func(
            "sum_to_ten",
            vec![],
            Some(ty("i32")),
            vec![
                let_stmt("i", Expr::int(1)),
                let_stmt("total", Expr::int(0)),
                Stmt::While {
                    cond: Expr::binary(BinOp::Le, Expr::ident("i"), Expr::int(10)),
                    body: vec![
                        assign(
                            Expr::ident("total"),
                            Expr::binary(BinOp::Add, Expr::ident("total"), Expr::ident("i")),
                        ),
                        assign(
                            Expr::ident("i"),
                            Expr::binary(BinOp::Add, Expr::ident("i"), Expr::int(1)),
                        ),
                    ],
                },
                ret(Expr::ident("total")),
            ],
        )],
    ));
    assert_eq!(r.call0_i32("sum_to_ten"), 55);
}

// ══════════════════════════════════════════════════════════════════════════════
// Strings
// ══════════════════════════════════════════════════════════════════════════════

fn bool_fn(name: &str, body_expr: Expr) -> FunctionDecl {
    func(name, vec![], Some(ty("bool")), vec![ret(body_expr)])
}

#[test]
fn string_ordering_is_lexicographic() {
    let mut r = Runner::new(&program(
        vec![],
        vec![],
        vec![
            bool_fn(
                "apples_first",
                Expr::binary(BinOp::Lt, Expr::str("apple"), Expr::str("banana")),
            ),
            bool_fn(
                "bananas_first",
                Expr::binary(BinOp::Lt, Expr::str("banana"), Expr::str("apple")),
            ),
        ],
    ));
    assert_eq!(r.call0_i32("apples_first"), 1);
    assert_eq!(r.call0_i32("bananas_first"), 0);
}

#[test]
fn shorter_prefix_orders_first() {
    let mut r = Runner::new(&program(
        vec![],
        vec![],
        vec![bool_fn(
            "prefix_lt",
            Expr::binary(BinOp::Lt, Expr::str("abc"), Expr::str("abcd")),
        )],
    ));
    assert_eq!(r.call0_i32("prefix_lt"), 1);
}

#[test]
fn comparison_reaches_past_the_first_chunk() {
    // Equal through byte 16, differ at byte 17: forces the vectorized loop
    // into its second 16-byte chunk.
    let a = "aaaaaaaaaaaaaaaaaAaa";
    let b = "aaaaaaaaaaaaaaaaaBaa";
    let mut r = Runner::new(&program(
        vec![],
        vec![],
        vec![
            bool_fn("lt", Expr::binary(BinOp::Lt, Expr::str(a), Expr::str(b))),
            bool_fn("eq", Expr::binary(BinOp::Eq, Expr::str(a), Expr::str(b))),
            bool_fn("self_eq", Expr::binary(BinOp::Eq, Expr::str(a), Expr::str(a))),
        ],
    ));
    assert_eq!(r.call0_i32("lt"), 1);
    assert_eq!(r.call0_i32("eq"), 0);
    assert_eq!(r.call0_i32("self_eq"), 1);
}

#[test]
fn concatenation_produces_an_equal_string() {
    let mut r = Runner::new(&program(
        vec![],
        vec![],
        vec![bool_fn(
            "concat_eq",
            Expr::binary(
                BinOp::Eq,
                Expr::binary(BinOp::Add, Expr::str("foo"), Expr::str("bar")),
                Expr::str("foobar"),
            ),
        )],
    ));
    assert_eq!(r.call0_i32("concat_eq"), 1);
}

#[test]
fn string_indexing_reads_single_bytes() {
    let mut r = Runner::new(&program(
        vec![],
        vec![],
        vec![func(
            "nth",
            vec![],
            Some(ty("i32")),
            vec![
                let_stmt("s", Expr::str("marrow")),
                ret(Expr::convert(
                    "i32",
                    Expr::index(Expr::ident("s"), Expr::int(5)),
                )),
            ],
        )],
    ));
    assert_eq!(r.call0_i32("nth"), i32::from(b'w'));
}

// ══════════════════════════════════════════════════════════════════════════════
// Closures, methods, globals
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn plain_function_passes_as_a_closure_argument() {
    let apply = func(
        "apply",
        vec![
            param(
                "f",
                TypeExpr::Func {
                    params: vec![ty("i32")],
                    result: Some(Box::new(ty("i32"))),
                },
            ),
            param("v", ty("i32")),
        ],
        Some(ty("i32")),
        vec![ret(Expr::call(Expr::ident("f"), vec![Expr::ident("v")]))],
    );
    let double = func(
        "double",
        vec![param("x", ty("i32"))],
        Some(ty("i32")),
        vec![ret(Expr::binary(BinOp::Mul, Expr::ident("x"), Expr::int(2)))],
    );
    let run = func(
        "run",
        vec![],
        Some(ty("i32")),
        vec![ret(Expr::call(
            Expr::ident("apply"),
            vec![Expr::ident("double"), Expr::int(21)],
        ))],
    );
    let mut r = Runner::new(&program(vec![], vec![], vec![apply, double, run]));
    assert_eq!(r.call0_i32("run"), 42);
}

#[test]
fn method_call_binds_the_receiver() {
    let norm1 = FunctionDecl {
        name: "norm1".to_string(),
        params: vec![param("self", ty("Point"))],
        result: Some(ty("i32")),
        body: vec![ret(Expr::binary(
            BinOp::Add,
            Expr::field(Expr::ident("self"), "x"),
            Expr::field(Expr::ident("self"), "y"),
        ))],
        exported: false,
        method_of: Some("Point".to_string()),
    };
    let mut r = Runner::new(&program(
        vec![point_struct()],
        vec![],
        vec![
            norm1,
            func(
                "run",
                vec![],
                Some(ty("i32")),
                vec![
                    let_stmt("p", struct_lit("Point", vec![("x", Expr::int(4)), ("y", Expr::int(6))])),
                    ret(Expr::call(Expr::field(Expr::ident("p"), "norm1"), vec![])),
                ],
            ),
        ],
    ));
    assert_eq!(r.call0_i32("run"), 10);
}

#[test]
fn globals_persist_across_calls() {
    let mut r = Runner::new(&program(
        vec![],
        vec![GlobalDecl {
            name: "counter".to_string(),
            ty: ty("i32"),
        }],
        vec![func(
            "bump",
            vec![],
            Some(ty("i32")),
            vec![
                assign(
                    Expr::ident("counter"),
                    Expr::binary(BinOp::Add, Expr::ident("counter"), Expr::int(10)),
                ),
                ret(Expr::ident("counter")),
            ],
        )],
    ));
    assert_eq!(r.call0_i32("bump"), 10);
    assert_eq!(r.call0_i32("bump"), 20);
}

// ══════════════════════════════════════════════════════════════════════════════
// Assignment target evaluation
// ══════════════════════════════════════════════════════════════════════════════

fn calls_global() -> GlobalDecl {
    GlobalDecl {
        name: "calls".to_string(),
        ty: ty("i32"),
    }
}

fn count_call() -> Stmt {
    assign(
        Expr::ident("calls"),
        Expr::binary(BinOp::Add, Expr::ident("calls"), Expr::int(1)),
    )
}

#[test]
fn impure_assignment_base_runs_once() {
    // `make().x = 3` must evaluate `make()` exactly once.
    let make = func(
        "make",
        vec![],
        Some(ty("Point")),
        vec![
            count_call(),
            ret(struct_lit("Point", vec![("x", Expr::int(1)), ("y", Expr::int(2))])),
        ],
    );
    let run = func(
        "run",
        vec![],
        Some(ty("i32")),
        vec![
            assign(Expr::field(Expr::call(Expr::ident("make"), vec![]), "x"), Expr::int(3)),
            ret(Expr::ident("calls")),
        ],
    );
    let mut r = Runner::new(&program(vec![point_struct()], vec![calls_global()], vec![make, run]));
    assert_eq!(r.call0_i32("run"), 1);
}

#[test]
fn impure_aggregate_copy_base_runs_once() {
    let pair = StructDecl {
        name: "Pair".to_string(),
        fields: vec![FieldDecl {
            name: "p".to_string(),
            type_name: "Point".to_string(),
            is_ref: false,
        }],
    };
    let make = func(
        "make",
        vec![],
        Some(ty("Pair")),
        vec![
            count_call(),
            ret(struct_lit(
                "Pair",
                vec![(
                    "p",
                    struct_lit("Point", vec![("x", Expr::int(1)), ("y", Expr::int(2))]),
                )],
            )),
        ],
    );
    let run = func(
        "run",
        vec![],
        Some(ty("i32")),
        vec![
            assign(
                Expr::field(Expr::call(Expr::ident("make"), vec![]), "p"),
                struct_lit("Point", vec![("x", Expr::int(8)), ("y", Expr::int(9))]),
            ),
            ret(Expr::ident("calls")),
        ],
    );
    let mut r = Runner::new(&program(
        vec![point_struct(), pair],
        vec![calls_global()],
        vec![make, run],
    ));
    assert_eq!(r.call0_i32("run"), 1);
}
