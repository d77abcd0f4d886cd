//! Type registry and layout planner.
//!
//! Resolves struct declarations into closed-form, byte-offset-annotated
//! descriptors. Resolution runs exactly once per compilation, in dependency
//! order; descriptors are immutable and shared by reference afterwards.
//!
//! Layout policy is byte-packed: fields land contiguously in declaration
//! order with no padding. Reference-typed fields occupy 4 bytes (a pointer),
//! value-typed fields occupy their full size inline.

use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use marrow_types::{StructDecl, TypeExpr};

use crate::error::{CodegenError, CodegenResult};
use crate::primitive::PrimitiveKind;

/// Name of the built-in string type: a 4-byte length header followed by that
/// many raw bytes, always reference-typed.
pub const STRING_TYPE: &str = "string";

/// Size of a reference (pointer) field in linear memory.
pub const PTR_SIZE: u32 = 4;

/// Size of the length header on strings and dynamic arrays.
pub const LEN_HEADER_SIZE: u32 = 4;

/// Size of a closure record: {table slot: u32, context pointer: u32}.
pub const CLOSURE_RECORD_SIZE: u32 = 8;

// ══════════════════════════════════════════════════════════════════════════════
// Descriptors
// ══════════════════════════════════════════════════════════════════════════════

/// An immutable type descriptor. Created during resolution, read-only for
/// the rest of compilation, shared by reference.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeDesc {
    Primitive(PrimitiveKind),
    Struct(Rc<StructLayout>),
    Array(Rc<ArrayLayout>),
    /// The length-prefixed byte buffer type.
    Str,
    Func(Rc<FuncType>),
}

impl TypeDesc {
    /// Static byte size, or `None` when the size is only known at run time
    /// (strings and dynamic arrays).
    pub fn byte_size(&self) -> Option<u32> {
        match self {
            TypeDesc::Primitive(kind) => Some(kind.size()),
            TypeDesc::Struct(layout) => Some(layout.size),
            TypeDesc::Array(layout) => layout.byte_size(),
            TypeDesc::Str => None,
            TypeDesc::Func(_) => Some(CLOSURE_RECORD_SIZE),
        }
    }

    pub fn primitive(&self) -> Option<PrimitiveKind> {
        match self {
            TypeDesc::Primitive(kind) => Some(*kind),
            _ => None,
        }
    }

    /// Aggregates live in linear memory and are addressed through a pointer.
    pub fn is_aggregate(&self) -> bool {
        !matches!(self, TypeDesc::Primitive(_))
    }
}

impl std::fmt::Display for TypeDesc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TypeDesc::Primitive(kind) => f.write_str(kind.name()),
            TypeDesc::Struct(layout) => f.write_str(&layout.name),
            TypeDesc::Array(layout) => match layout.len {
                Some(n) => write!(f, "[{}; {n}]", layout.elem),
                None => write!(f, "[{}]", layout.elem),
            },
            TypeDesc::Str => f.write_str(STRING_TYPE),
            TypeDesc::Func(sig) => {
                write!(f, "fn(")?;
                for (i, p) in sig.params.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{p}")?;
                }
                write!(f, ")")?;
                if let Some(r) = &sig.result {
                    write!(f, " -> {r}")?;
                }
                Ok(())
            }
        }
    }
}

/// A resolved struct: ordered fields with byte offsets, total size.
#[derive(Debug, Clone, PartialEq)]
pub struct StructLayout {
    pub name: String,
    pub fields: Vec<FieldLayout>,
    /// Total byte size: the final running offset after the last field.
    pub size: u32,
}

impl StructLayout {
    pub fn field(&self, name: &str) -> Option<&FieldLayout> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// A single laid-out field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldLayout {
    pub name: String,
    pub ty: TypeDesc,
    pub offset: u32,
    /// Reference-typed fields store a 4-byte pointer; value-typed fields
    /// store their contents inline.
    pub is_ref: bool,
}

/// An array descriptor. Fixed-length arrays are headerless; dynamic arrays
/// carry a 4-byte length prefix and their size is computed at run time.
#[derive(Debug, Clone, PartialEq)]
pub struct ArrayLayout {
    pub elem: TypeDesc,
    pub len: Option<u32>,
}

impl ArrayLayout {
    /// Element stride. Reference-typed elements are not modeled; elements
    /// are stored inline at `elem` granularity.
    pub fn elem_size(&self) -> CodegenResult<u32> {
        self.elem.byte_size().ok_or_else(|| {
            CodegenError::InvalidOperation(format!(
                "array element type `{}` has no static size",
                self.elem
            ))
        })
    }

    /// Total static size, when the length is known at compile time.
    pub fn byte_size(&self) -> Option<u32> {
        let n = self.len?;
        Some(n * self.elem.byte_size()?)
    }

    /// Byte offset of element storage past the base pointer.
    pub fn header_size(&self) -> u32 {
        if self.len.is_some() { 0 } else { LEN_HEADER_SIZE }
    }
}

/// A function signature descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct FuncType {
    pub params: Vec<TypeDesc>,
    pub result: Option<TypeDesc>,
}

// ══════════════════════════════════════════════════════════════════════════════
// Registry
// ══════════════════════════════════════════════════════════════════════════════

/// The resolved type table: struct name → offset-annotated descriptor.
/// `order` records leaf-first resolution order for the descriptor table.
#[derive(Debug, Default)]
pub struct TypeRegistry {
    structs: HashMap<String, Rc<StructLayout>>,
    order: Vec<String>,
}

impl TypeRegistry {
    /// Resolve a set of struct declarations into a registry.
    ///
    /// Fails fast with [`CodegenError::StructCycle`] on a field-type cycle
    /// (checked before any offset is computed), [`CodegenError::UnknownType`]
    /// on an unresolvable field type, and
    /// [`CodegenError::UnconnectedGraph`] if the topological pass drops a
    /// declared struct (an internal invariant violation).
    pub fn resolve(decls: &[StructDecl]) -> CodegenResult<TypeRegistry> {
        let declared: HashSet<&str> = decls.iter().map(|d| d.name.as_str()).collect();

        // Out-edges: the distinct non-primitive type names each struct's
        // fields reference. Self-reference counts.
        let mut deps: HashMap<&str, Vec<&str>> = HashMap::new();
        for decl in decls {
            let mut edges: Vec<&str> = Vec::new();
            for field in &decl.fields {
                let ty = field.type_name.as_str();
                if PrimitiveKind::from_name(ty).is_some() || ty == STRING_TYPE {
                    continue;
                }
                if declared.contains(ty) && !edges.contains(&ty) {
                    edges.push(ty);
                }
                // Unknown names are rejected later, during the offset pass,
                // so the error cites the struct being laid out.
            }
            deps.insert(decl.name.as_str(), edges);
        }

        Self::check_cycles(decls, &deps)?;

        // Kahn's algorithm seeded from structs no other struct references
        // (top-level consumers), reversed afterwards so leaves resolve first.
        let mut referenced: HashSet<&str> = HashSet::new();
        for edges in deps.values() {
            referenced.extend(edges.iter().copied());
        }
        let mut in_degree: HashMap<&str, usize> = HashMap::new();
        for decl in decls {
            in_degree.insert(decl.name.as_str(), 0);
        }
        for edges in deps.values() {
            for edge in edges {
                if let Some(d) = in_degree.get_mut(edge) {
                    *d += 1;
                }
            }
        }
        let mut queue: Vec<&str> = decls
            .iter()
            .map(|d| d.name.as_str())
            .filter(|n| !referenced.contains(n))
            .collect();
        let mut processing: Vec<&str> = Vec::new();
        while let Some(name) = queue.pop() {
            processing.push(name);
            if let Some(edges) = deps.get(name) {
                for &edge in edges {
                    let d = in_degree
                        .get_mut(edge)
                        .ok_or_else(|| CodegenError::Internal(format!("missing vertex `{edge}`")))?;
                    *d -= 1;
                    if *d == 0 {
                        queue.push(edge);
                    }
                }
            }
        }
        if processing.len() != decls.len() {
            return Err(CodegenError::UnconnectedGraph {
                resolved: processing.len(),
                declared: decls.len(),
            });
        }
        processing.reverse();

        // Offset pass, leaf-first. Sizes are computed exactly once and never
        // change after registration.
        let by_name: HashMap<&str, &StructDecl> =
            decls.iter().map(|d| (d.name.as_str(), d)).collect();
        let mut registry = TypeRegistry::default();
        for name in processing {
            let decl = by_name
                .get(name)
                .copied()
                .ok_or_else(|| CodegenError::Internal(format!("missing declaration `{name}`")))?;
            let layout = registry.lay_out(decl)?;
            registry.order.push(name.to_string());
            registry.structs.insert(name.to_string(), Rc::new(layout));
        }
        Ok(registry)
    }

    /// Reject field-type cycles with an explicit-stack walk. A vertex
    /// re-encountered on the current path is the first repeated member.
    fn check_cycles(decls: &[StructDecl], deps: &HashMap<&str, Vec<&str>>) -> CodegenResult<()> {
        let mut done: HashSet<&str> = HashSet::new();
        for decl in decls {
            let start = decl.name.as_str();
            if done.contains(start) {
                continue;
            }
            // (vertex, next-edge cursor) frames; `path` mirrors the stack.
            let mut stack: Vec<(&str, usize)> = vec![(start, 0)];
            let mut path: HashSet<&str> = HashSet::new();
            path.insert(start);
            while let Some((vertex, cursor)) = stack.pop() {
                let edges = deps.get(vertex).map(Vec::as_slice).unwrap_or(&[]);
                if cursor < edges.len() {
                    stack.push((vertex, cursor + 1));
                    let next = edges[cursor];
                    if path.contains(next) {
                        return Err(CodegenError::StructCycle(next.to_string()));
                    }
                    if !done.contains(next) {
                        path.insert(next);
                        stack.push((next, 0));
                    }
                } else {
                    path.remove(vertex);
                    done.insert(vertex);
                }
            }
        }
        Ok(())
    }

    /// Lay out a single struct whose dependencies are already resolved.
    fn lay_out(&self, decl: &StructDecl) -> CodegenResult<StructLayout> {
        let mut fields = Vec::with_capacity(decl.fields.len());
        let mut offset = 0u32;
        for field in &decl.fields {
            let ty_name = field.type_name.as_str();
            let (ty, advance) = if field.is_ref {
                // A reference field stores a pointer regardless of target size.
                (self.lookup(ty_name)?, PTR_SIZE)
            } else if let Some(kind) = PrimitiveKind::from_name(ty_name) {
                (TypeDesc::Primitive(kind), kind.size())
            } else if ty_name == STRING_TYPE {
                return Err(CodegenError::InvalidOperation(format!(
                    "field `{}.{}`: strings must be reference-typed",
                    decl.name, field.name
                )));
            } else if let Some(layout) = self.structs.get(ty_name) {
                (TypeDesc::Struct(Rc::clone(layout)), layout.size)
            } else {
                // Covers undeclared names and array-typed fields, which this
                // path does not support.
                return Err(CodegenError::UnknownType(ty_name.to_string()));
            };
            fields.push(FieldLayout {
                name: field.name.clone(),
                ty,
                offset,
                is_ref: field.is_ref,
            });
            offset += advance;
        }
        Ok(StructLayout {
            name: decl.name.clone(),
            fields,
            size: offset,
        })
    }

    /// Resolve a type name to a descriptor.
    pub fn lookup(&self, name: &str) -> CodegenResult<TypeDesc> {
        if let Some(kind) = PrimitiveKind::from_name(name) {
            return Ok(TypeDesc::Primitive(kind));
        }
        if name == STRING_TYPE {
            return Ok(TypeDesc::Str);
        }
        if let Some(layout) = self.structs.get(name) {
            return Ok(TypeDesc::Struct(Rc::clone(layout)));
        }
        Err(CodegenError::UnknownType(name.to_string()))
    }

    /// Resolve a type expression (names, arrays, function types).
    pub fn lookup_expr(&self, ty: &TypeExpr) -> CodegenResult<TypeDesc> {
        match ty {
            TypeExpr::Name(name) => self.lookup(name),
            TypeExpr::Array { elem, len } => {
                let elem = self.lookup_expr(elem)?;
                Ok(TypeDesc::Array(Rc::new(ArrayLayout { elem, len: *len })))
            }
            TypeExpr::Func { params, result } => {
                let params = params
                    .iter()
                    .map(|p| self.lookup_expr(p))
                    .collect::<CodegenResult<Vec<_>>>()?;
                let result = match result {
                    Some(r) => Some(self.lookup_expr(r)?),
                    None => None,
                };
                Ok(TypeDesc::Func(Rc::new(FuncType { params, result })))
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&Rc<StructLayout>> {
        self.structs.get(name)
    }

    /// Structs in leaf-first resolution order.
    pub fn ordered(&self) -> impl Iterator<Item = &Rc<StructLayout>> {
        self.order.iter().filter_map(|n| self.structs.get(n))
    }

    pub fn len(&self) -> usize {
        self.structs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.structs.is_empty()
    }
}
