//! Integration tests for the layout planner.
//!
//! Tests validate:
//! - Byte-exact packing with no alignment padding
//! - Reference fields occupying pointer width regardless of target size
//! - Dependency-driven resolution order and its independence from
//!   declaration order
//! - Cycle rejection at one, two, and three hops (diamonds are fine)
//! - Error classes for unknown and illegal field types

use marrow_codegen::{CodegenError, TypeRegistry};
use marrow_types::{FieldDecl, StructDecl};

// ══════════════════════════════════════════════════════════════════════════════
// Helpers
// ══════════════════════════════════════════════════════════════════════════════

fn field(name: &str, ty: &str) -> FieldDecl {
    FieldDecl {
        name: name.to_string(),
        type_name: ty.to_string(),
        is_ref: false,
    }
}

fn ref_field(name: &str, ty: &str) -> FieldDecl {
    FieldDecl {
        name: name.to_string(),
        type_name: ty.to_string(),
        is_ref: true,
    }
}

fn decl(name: &str, fields: Vec<FieldDecl>) -> StructDecl {
    StructDecl {
        name: name.to_string(),
        fields,
    }
}

fn offsets(registry: &TypeRegistry, name: &str) -> Vec<(String, u32)> {
    let layout = registry.get(name).expect("struct resolved");
    layout
        .fields
        .iter()
        .map(|f| (f.name.clone(), f.offset))
        .collect()
}

// ══════════════════════════════════════════════════════════════════════════════
// Packing
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn coord_packs_to_eight_bytes() {
    let registry = TypeRegistry::resolve(&[decl(
        "Coord",
        vec![field("x", "i32"), field("y", "f32")],
    )])
    .unwrap();
    let coord = registry.get("Coord").unwrap();
    assert_eq!(coord.size, 8);
    assert_eq!(
        offsets(&registry, "Coord"),
        vec![("x".to_string(), 0), ("y".to_string(), 4)]
    );
}

#[test]
fn packing_produces_odd_offsets() {
    // u8 + i32 + u16: no padding anywhere, so the i32 sits at offset 1.
    let registry = TypeRegistry::resolve(&[decl(
        "Mixed",
        vec![field("a", "u8"), field("b", "i32"), field("c", "u16")],
    )])
    .unwrap();
    let mixed = registry.get("Mixed").unwrap();
    assert_eq!(mixed.size, 7);
    assert_eq!(mixed.field("a").unwrap().offset, 0);
    assert_eq!(mixed.field("b").unwrap().offset, 1);
    assert_eq!(mixed.field("c").unwrap().offset, 5);
}

#[test]
fn vector_field_packs_at_odd_offset() {
    let registry = TypeRegistry::resolve(&[decl(
        "Shaded",
        vec![field("flag", "u8"), field("lanes", "f32x4")],
    )])
    .unwrap();
    let shaded = registry.get("Shaded").unwrap();
    assert_eq!(shaded.size, 17);
    assert_eq!(shaded.field("lanes").unwrap().offset, 1);
}

#[test]
fn reference_fields_are_pointer_sized() {
    let registry = TypeRegistry::resolve(&[
        decl("Wide", vec![field("lo", "f64x2"), field("hi", "f64x2")]),
        decl(
            "Holder",
            vec![ref_field("wide", "Wide"), ref_field("label", "string")],
        ),
    ])
    .unwrap();
    assert_eq!(registry.get("Wide").unwrap().size, 32);
    let holder = registry.get("Holder").unwrap();
    assert_eq!(holder.size, 8);
    assert_eq!(holder.field("label").unwrap().offset, 4);
}

#[test]
fn nested_value_struct_inlines_its_bytes() {
    let registry = TypeRegistry::resolve(&[
        decl("Inner", vec![field("a", "i64")]),
        decl("Outer", vec![field("inner", "Inner"), field("b", "u8")]),
    ])
    .unwrap();
    let outer = registry.get("Outer").unwrap();
    assert_eq!(outer.size, 9);
    assert_eq!(outer.field("b").unwrap().offset, 8);
}

// ══════════════════════════════════════════════════════════════════════════════
// Resolution order
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn layout_is_independent_of_declaration_order() {
    let forward = TypeRegistry::resolve(&[
        decl("Leaf", vec![field("v", "i32")]),
        decl("Branch", vec![field("leaf", "Leaf"), field("w", "i16")]),
    ])
    .unwrap();
    let backward = TypeRegistry::resolve(&[
        decl("Branch", vec![field("leaf", "Leaf"), field("w", "i16")]),
        decl("Leaf", vec![field("v", "i32")]),
    ])
    .unwrap();
    assert_eq!(
        forward.get("Branch").unwrap().size,
        backward.get("Branch").unwrap().size
    );
    assert_eq!(offsets(&forward, "Branch"), offsets(&backward, "Branch"));
}

#[test]
fn resolution_is_deterministic() {
    let decls = vec![
        decl("A", vec![field("b", "B"), field("x", "u8")]),
        decl("B", vec![field("c", "C")]),
        decl("C", vec![field("v", "f64")]),
    ];
    let first = TypeRegistry::resolve(&decls).unwrap();
    let second = TypeRegistry::resolve(&decls).unwrap();
    for name in ["A", "B", "C"] {
        assert_eq!(first.get(name).unwrap().size, second.get(name).unwrap().size);
        assert_eq!(offsets(&first, name), offsets(&second, name));
    }
    assert_eq!(first.get("A").unwrap().size, 9);
}

#[test]
fn diamond_dependency_is_not_a_cycle() {
    let registry = TypeRegistry::resolve(&[
        decl("Shared", vec![field("v", "i32")]),
        decl("Left", vec![field("s", "Shared")]),
        decl("Right", vec![field("s", "Shared")]),
        decl("Top", vec![field("l", "Left"), field("r", "Right")]),
    ])
    .unwrap();
    assert_eq!(registry.get("Top").unwrap().size, 8);
    assert_eq!(registry.len(), 4);
}

// ══════════════════════════════════════════════════════════════════════════════
// Errors
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn self_cycle_is_rejected() {
    let err = TypeRegistry::resolve(&[decl("Knot", vec![field("next", "Knot")])]).unwrap_err();
    assert!(matches!(err, CodegenError::StructCycle(name) if name == "Knot"));
}

#[test]
fn two_hop_cycle_is_rejected() {
    let err = TypeRegistry::resolve(&[
        decl("Ping", vec![field("other", "Pong")]),
        decl("Pong", vec![field("other", "Ping")]),
    ])
    .unwrap_err();
    assert!(matches!(err, CodegenError::StructCycle(_)));
}

#[test]
fn three_hop_cycle_is_rejected() {
    let err = TypeRegistry::resolve(&[
        decl("A", vec![field("b", "B")]),
        decl("B", vec![field("c", "C")]),
        decl("C", vec![field("a", "A")]),
    ])
    .unwrap_err();
    assert!(matches!(err, CodegenError::StructCycle(_)));
}

#[test]
fn unknown_field_type_is_rejected() {
    let err =
        TypeRegistry::resolve(&[decl("Broken", vec![field("v", "Missing")])]).unwrap_err();
    assert!(matches!(err, CodegenError::UnknownType(name) if name == "Missing"));
}

#[test]
fn value_typed_string_field_is_rejected() {
    let err =
        TypeRegistry::resolve(&[decl("Tag", vec![field("label", "string")])]).unwrap_err();
    assert!(matches!(err, CodegenError::InvalidOperation(_)));
}
