//! Shared types for the Marrow backend.
//!
//! This crate defines the *resolved* declaration tree the frontend hands to
//! the code-generation engine: struct, global, and function declarations with
//! bodies as trees of typed statements and expressions. Every type name in
//! the tree is already resolvable to a primitive kind or a previously
//! declared struct name; diagnostics and source positions are the frontend's
//! concern and do not cross this boundary.

pub mod ast;

pub use ast::{
    BinOp, Expr, FieldDecl, FunctionDecl, GlobalDecl, Param, Program, Stmt, StructDecl, TypeExpr,
    UnOp,
};
