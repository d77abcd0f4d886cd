//! Resolved AST node types for the Marrow backend.
//!
//! Large recursive types are boxed to keep enum sizes reasonable.
//! Declaration order is significant everywhere: struct fields lay out in
//! source order and globals/functions are numbered in source order.

use serde::{Deserialize, Serialize};

// ══════════════════════════════════════════════════════════════════════════════
// Top Level
// ══════════════════════════════════════════════════════════════════════════════

/// A complete resolved program: struct declarations, module-level globals,
/// and function declarations.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Program {
    pub structs: Vec<StructDecl>,
    pub globals: Vec<GlobalDecl>,
    pub functions: Vec<FunctionDecl>,
}

/// `struct Name { field: type, ... }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructDecl {
    pub name: String,
    pub fields: Vec<FieldDecl>,
}

/// A single struct field. `is_ref` fields are stored as a 4-byte pointer
/// instead of inline; the frontend sets it for reference-typed members
/// (strings are always reference-typed).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDecl {
    pub name: String,
    pub type_name: String,
    pub is_ref: bool,
}

/// A module-level mutable variable. Backed by a WASM global of the type's
/// raw machine representation, zero-initialized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalDecl {
    pub name: String,
    pub ty: TypeExpr,
}

/// A function declaration with a fully typed body.
///
/// A function with `method_of: Some(name)` is registered in that struct's
/// method table; its first parameter is the receiver pointer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDecl {
    pub name: String,
    pub params: Vec<Param>,
    pub result: Option<TypeExpr>,
    pub body: Vec<Stmt>,
    pub exported: bool,
    pub method_of: Option<String>,
}

/// A function parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    pub ty: TypeExpr,
}

// ══════════════════════════════════════════════════════════════════════════════
// Type expressions
// ══════════════════════════════════════════════════════════════════════════════

/// A resolved type reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TypeExpr {
    /// A primitive kind name or a declared struct name.
    Name(String),
    /// `[elem; len]` (fixed length) or `[elem]` (length-prefixed, dynamic).
    Array {
        elem: Box<TypeExpr>,
        len: Option<u32>,
    },
    /// A first-class function type.
    Func {
        params: Vec<TypeExpr>,
        result: Option<Box<TypeExpr>>,
    },
}

impl TypeExpr {
    pub fn name(n: impl Into<String>) -> Self {
        TypeExpr::Name(n.into())
    }

    pub fn array(elem: TypeExpr, len: u32) -> Self {
        TypeExpr::Array {
            elem: Box::new(elem),
            len: Some(len),
        }
    }

    pub fn func(params: Vec<TypeExpr>, result: Option<TypeExpr>) -> Self {
        TypeExpr::Func {
            params,
            result: result.map(Box::new),
        }
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Statements
// ══════════════════════════════════════════════════════════════════════════════

/// A statement in a function body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Stmt {
    /// `let name: ty = value` — `ty` gives the expected kind for the
    /// initializer when present.
    Let {
        name: String,
        ty: Option<TypeExpr>,
        value: Expr,
    },
    /// `target = value` where target is an lvalue expression.
    Assign { target: Expr, value: Expr },
    /// `return expr?`
    Return(Option<Expr>),
    /// An expression evaluated for its effects; the result is dropped.
    Expr(Expr),
    /// `if cond { then } else { else }`
    If {
        cond: Expr,
        then_body: Vec<Stmt>,
        else_body: Vec<Stmt>,
    },
    /// `while cond { body }`
    While { cond: Expr, body: Vec<Stmt> },
}

// ══════════════════════════════════════════════════════════════════════════════
// Expressions
// ══════════════════════════════════════════════════════════════════════════════

/// An expression node. Literal kinds are refined by the expected type at the
/// use site; an unsuffixed integer defaults to `i32` and an unsuffixed float
/// to `f64`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    /// An integer literal with an optional kind suffix.
    Int { value: i64, kind: Option<String> },
    /// A float literal with an optional kind suffix.
    Float { value: f64, kind: Option<String> },
    Bool(bool),
    Str(String),
    /// A resolved name: local, global, or function.
    Ident(String),
    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Unary {
        op: UnOp,
        operand: Box<Expr>,
    },
    /// `object.field` — also resolves struct methods (producing a bound
    /// method when used as a value).
    Field { object: Box<Expr>, field: String },
    /// `object[index]`
    Index { object: Box<Expr>, index: Box<Expr> },
    /// `callee(args...)`
    Call { callee: Box<Expr>, args: Vec<Expr> },
    /// `Name { field: value, ... }` — fields may appear in any order; layout
    /// order comes from the struct declaration.
    StructLit {
        name: String,
        fields: Vec<(String, Expr)>,
    },
    /// `[a, b, c]` — a fixed-length array of the elements' common type.
    ArrayLit { elem: TypeExpr, elems: Vec<Expr> },
    /// An explicit conversion to the named primitive kind.
    Convert { target: String, value: Box<Expr> },
    /// A named per-kind intrinsic (`sqrt`, `ctz`, `rotl`, ...).
    Intrinsic { name: String, args: Vec<Expr> },
}

impl Expr {
    pub fn int(value: i64) -> Self {
        Expr::Int { value, kind: None }
    }

    pub fn int_as(value: i64, kind: &str) -> Self {
        Expr::Int {
            value,
            kind: Some(kind.to_string()),
        }
    }

    pub fn float(value: f64) -> Self {
        Expr::Float { value, kind: None }
    }

    pub fn float_as(value: f64, kind: &str) -> Self {
        Expr::Float {
            value,
            kind: Some(kind.to_string()),
        }
    }

    pub fn str(s: impl Into<String>) -> Self {
        Expr::Str(s.into())
    }

    pub fn ident(name: impl Into<String>) -> Self {
        Expr::Ident(name.into())
    }

    pub fn binary(op: BinOp, lhs: Expr, rhs: Expr) -> Self {
        Expr::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    pub fn unary(op: UnOp, operand: Expr) -> Self {
        Expr::Unary {
            op,
            operand: Box::new(operand),
        }
    }

    pub fn field(object: Expr, field: impl Into<String>) -> Self {
        Expr::Field {
            object: Box::new(object),
            field: field.into(),
        }
    }

    pub fn index(object: Expr, index: Expr) -> Self {
        Expr::Index {
            object: Box::new(object),
            index: Box::new(index),
        }
    }

    pub fn call(callee: Expr, args: Vec<Expr>) -> Self {
        Expr::Call {
            callee: Box::new(callee),
            args,
        }
    }

    pub fn convert(target: &str, value: Expr) -> Self {
        Expr::Convert {
            target: target.to_string(),
            value: Box::new(value),
        }
    }

    pub fn intrinsic(name: &str, args: Vec<Expr>) -> Self {
        Expr::Intrinsic {
            name: name.to_string(),
            args,
        }
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Operators
// ══════════════════════════════════════════════════════════════════════════════

/// Binary operator tokens. Dispatch to concrete instructions is per-kind in
/// the engine's operator tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Shl,
    Shr,
    BitAnd,
    BitOr,
    BitXor,
}

/// Unary operator tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnOp {
    /// Logical not: yields `bool` (or the lane mask kind for vectors).
    Not,
}

impl std::fmt::Display for BinOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Rem => "%",
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
            BinOp::Shl => "<<",
            BinOp::Shr => ">>",
            BinOp::BitAnd => "&",
            BinOp::BitOr => "|",
            BinOp::BitXor => "^",
        };
        f.write_str(s)
    }
}
