//! Codegen error types.
//!
//! Every error is compile-time, fatal, and non-recoverable within a pass:
//! the first violation aborts compilation and surfaces to the caller.

use thiserror::Error;

/// Errors that can occur during layout planning or WASM code generation.
#[derive(Debug, Error)]
pub enum CodegenError {
    /// A struct's field types form a dependency cycle. Carries the first
    /// repeated member found on the walk.
    #[error("cyclic struct dependency through `{0}`")]
    StructCycle(String),

    /// The layout planner resolved fewer structs than were declared. This
    /// signals a compiler bug, not a user error.
    #[error("struct graph inconsistency: resolved {resolved} of {declared} structs")]
    UnconnectedGraph { resolved: usize, declared: usize },

    /// A type name resolves to neither a primitive kind nor a declared
    /// struct (this includes the unsupported array-as-struct-field case).
    #[error("unknown type `{0}`")]
    UnknownType(String),

    /// Struct member access of an undeclared field.
    #[error("struct `{struct_name}` has no field `{field}`")]
    UnknownField { struct_name: String, field: String },

    /// Struct method lookup of an undeclared method.
    #[error("struct `{struct_name}` has no method `{method}`")]
    UnknownMethod {
        struct_name: String,
        method: String,
    },

    /// Field access, indexing, or a call attempted on a value kind that
    /// does not support it.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// Operand kinds differ, or the operator is unsupported for the kind.
    #[error("operator `{op}` not applicable to `{lhs}` and `{rhs}`")]
    OperatorTypeMismatch {
        op: String,
        lhs: String,
        rhs: String,
    },

    /// A store of a mismatched kind.
    #[error("cannot assign `{from}` to `{to}`")]
    AssignmentTypeMismatch { from: String, to: String },

    /// A call with the wrong argument count.
    #[error("call expected {expected} arguments, found {found}")]
    ArityMismatch { expected: usize, found: usize },

    /// A name could not be resolved during codegen.
    #[error("unresolved symbol: {0}")]
    UnresolvedSymbol(String),

    /// An internal consistency check failed.
    #[error("internal codegen error: {0}")]
    Internal(String),

    /// The generated WASM module failed validation.
    #[error("WASM validation failed: {0}")]
    ValidationFailed(String),
}

/// Codegen result type alias.
pub type CodegenResult<T> = Result<T, CodegenError>;
