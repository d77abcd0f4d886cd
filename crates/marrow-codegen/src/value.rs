//! The polymorphic runtime-value model.
//!
//! Every expression node translates to a [`Value`]: a closed tagged variant
//! over everything a typed quantity can be during codegen — an in-flight
//! instruction sequence, a local or global slot, a primitive behind a
//! pointer, an aggregate in linear memory, or a function-like value. Each
//! variant implements the full capability surface (read, materialize, write,
//! field/index access, call, size-of, operators), even if only to reject it;
//! exhaustive matching keeps the surface closed.
//!
//! Values are ephemeral: created per expression node, never persisted, and
//! own nothing beyond the instructions they reference.

use std::rc::Rc;

use marrow_types::{BinOp, UnOp};
use wasm_encoder::{BlockType, Instruction, ValType};

use crate::context::{Ctx, FuncEntry};
use crate::error::{CodegenError, CodegenResult};
use crate::instance::{InstanceType, Storage};
use crate::layout::{ArrayLayout, FuncType, StructLayout, TypeDesc, LEN_HEADER_SIZE};
use crate::ops::{self, InstrSeq};
use crate::primitive::PrimitiveKind;
use crate::runtime;

// ══════════════════════════════════════════════════════════════════════════════
// Variants
// ══════════════════════════════════════════════════════════════════════════════

/// A ready-made instruction sequence yielding a primitive. Not addressable;
/// reading clones the sequence, writing is illegal.
#[derive(Debug, Clone)]
pub struct Transient {
    pub kind: PrimitiveKind,
    pub code: InstrSeq,
}

/// A primitive in a function-local slot.
#[derive(Debug, Clone)]
pub struct LocalSlot {
    pub kind: PrimitiveKind,
    pub index: u32,
}

/// A primitive in a module-level mutable global slot.
#[derive(Debug, Clone)]
pub struct GlobalSlot {
    pub kind: PrimitiveKind,
    pub index: u32,
}

/// A primitive read through a pointer with a kind-appropriate access width.
#[derive(Debug, Clone)]
pub struct MemoryCell {
    pub kind: PrimitiveKind,
    pub addr: Pointer,
}

/// A thin wrapper over a primitive that must be exactly the unsigned 32-bit
/// kind. Forwards read/write; structural access is illegal on a bare
/// pointer.
#[derive(Debug, Clone)]
pub struct Pointer {
    prim: Box<Value>,
}

impl Pointer {
    /// Wrap a primitive value as a pointer. The underlying kind must be
    /// exactly `u32`.
    pub fn new(prim: Value) -> CodegenResult<Pointer> {
        match prim.kind() {
            Some(PrimitiveKind::U32) => Ok(Pointer {
                prim: Box::new(prim),
            }),
            _ => Err(CodegenError::Internal(format!(
                "pointer over non-u32 value `{}`",
                prim.type_name()
            ))),
        }
    }

    /// A pointer holding a ready-made address sequence.
    pub fn transient(code: InstrSeq) -> Pointer {
        Pointer {
            prim: Box::new(Value::Transient(Transient {
                kind: PrimitiveKind::U32,
                code,
            })),
        }
    }

    /// A pointer stored in a local slot.
    pub fn local(index: u32) -> Pointer {
        Pointer {
            prim: Box::new(Value::Local(LocalSlot {
                kind: PrimitiveKind::U32,
                index,
            })),
        }
    }

    pub fn materialize(&self, ctx: &mut Ctx) -> CodegenResult<InstrSeq> {
        self.prim.materialize(ctx)
    }

    /// Store a new address through this pointer's own storage.
    pub fn write(&self, ctx: &mut Ctx, rhs: &Value) -> CodegenResult<Value> {
        self.prim.write(ctx, rhs)
    }

    pub fn storage(&self) -> Storage {
        self.prim.instance().storage
    }
}

/// A struct instance in linear memory, addressed through a pointer.
#[derive(Debug, Clone)]
pub struct StructRef {
    pub layout: Rc<StructLayout>,
    pub addr: Pointer,
    pub instance: InstanceType,
}

/// An array in linear memory. Fixed-length arrays are headerless; dynamic
/// arrays carry a 4-byte length prefix.
#[derive(Debug, Clone)]
pub struct ArrayRef {
    pub layout: Rc<ArrayLayout>,
    pub addr: Pointer,
    pub instance: InstanceType,
}

/// A length-prefixed string buffer.
#[derive(Debug, Clone)]
pub struct StrRef {
    pub addr: Pointer,
    pub instance: InstanceType,
}

/// A bare function name used as a value or callee.
#[derive(Debug, Clone)]
pub struct DirectFn {
    pub entry: FuncEntry,
}

/// A `receiver.method` pair. Called directly; reified as a closure record
/// when used as a value.
#[derive(Debug, Clone)]
pub struct BoundMethod {
    pub entry: FuncEntry,
    pub receiver: Pointer,
}

/// A closure record {table slot, context pointer} callable through the
/// function table.
#[derive(Debug, Clone)]
pub struct IndirectFn {
    pub sig: Rc<FuncType>,
    pub record: Pointer,
}

/// The value model. See the module docs.
#[derive(Debug, Clone)]
pub enum Value {
    Transient(Transient),
    Local(LocalSlot),
    Global(GlobalSlot),
    Memory(MemoryCell),
    Pointer(Pointer),
    Struct(StructRef),
    Array(ArrayRef),
    Str(StrRef),
    DirectFn(DirectFn),
    BoundMethod(BoundMethod),
    IndirectFn(IndirectFn),
    /// Pure effect with no result on the stack (a void call).
    Void(InstrSeq),
}

// ══════════════════════════════════════════════════════════════════════════════
// Constructors
// ══════════════════════════════════════════════════════════════════════════════

impl Value {
    pub fn transient(kind: PrimitiveKind, code: InstrSeq) -> Value {
        Value::Transient(Transient { kind, code })
    }

    pub fn local(kind: PrimitiveKind, index: u32) -> Value {
        Value::Local(LocalSlot { kind, index })
    }

    pub fn global(kind: PrimitiveKind, index: u32) -> Value {
        Value::Global(GlobalSlot { kind, index })
    }

    /// The value of descriptor `desc` located *at* `addr` (inline). For a
    /// function descriptor the record itself sits at the address.
    pub fn at_address(desc: &TypeDesc, addr: Pointer, storage: Storage, is_ref: bool) -> Value {
        match desc {
            TypeDesc::Primitive(kind) => Value::Memory(MemoryCell { kind: *kind, addr }),
            TypeDesc::Struct(layout) => Value::Struct(StructRef {
                layout: Rc::clone(layout),
                addr,
                instance: InstanceType {
                    desc: desc.clone(),
                    is_ref,
                    storage,
                },
            }),
            TypeDesc::Array(layout) => Value::Array(ArrayRef {
                layout: Rc::clone(layout),
                addr,
                instance: InstanceType {
                    desc: desc.clone(),
                    is_ref,
                    storage,
                },
            }),
            TypeDesc::Str => Value::Str(StrRef {
                addr,
                instance: InstanceType {
                    desc: TypeDesc::Str,
                    is_ref: true,
                    storage,
                },
            }),
            TypeDesc::Func(sig) => Value::IndirectFn(IndirectFn {
                sig: Rc::clone(sig),
                record: addr,
            }),
        }
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Introspection
// ══════════════════════════════════════════════════════════════════════════════

impl Value {
    /// The primitive kind, for primitive-carrying variants.
    pub fn kind(&self) -> Option<PrimitiveKind> {
        match self {
            Value::Transient(t) => Some(t.kind),
            Value::Local(l) => Some(l.kind),
            Value::Global(g) => Some(g.kind),
            Value::Memory(m) => Some(m.kind),
            Value::Pointer(p) => p.prim.kind(),
            _ => None,
        }
    }

    /// The structural type descriptor.
    pub fn type_desc(&self) -> TypeDesc {
        match self {
            Value::Transient(t) => TypeDesc::Primitive(t.kind),
            Value::Local(l) => TypeDesc::Primitive(l.kind),
            Value::Global(g) => TypeDesc::Primitive(g.kind),
            Value::Memory(m) => TypeDesc::Primitive(m.kind),
            Value::Pointer(_) => TypeDesc::Primitive(PrimitiveKind::POINTER),
            Value::Struct(s) => TypeDesc::Struct(Rc::clone(&s.layout)),
            Value::Array(a) => TypeDesc::Array(Rc::clone(&a.layout)),
            Value::Str(_) => TypeDesc::Str,
            Value::DirectFn(f) => TypeDesc::Func(Rc::clone(&f.entry.sig)),
            Value::BoundMethod(m) => TypeDesc::Func(Rc::clone(&m.entry.sig)),
            Value::IndirectFn(f) => TypeDesc::Func(Rc::clone(&f.sig)),
            Value::Void(_) => TypeDesc::Primitive(PrimitiveKind::U32),
        }
    }

    /// Display name for diagnostics.
    pub fn type_name(&self) -> String {
        match self {
            Value::Void(_) => "void".to_string(),
            other => other.type_desc().to_string(),
        }
    }

    /// The instance type: descriptor plus use-site flags. The storage (and
    /// with it the "is global" flag) is inherited from the value's address,
    /// never set independently.
    pub fn instance(&self) -> InstanceType {
        match self {
            Value::Transient(t) => {
                InstanceType::new(TypeDesc::Primitive(t.kind), Storage::Transient)
            }
            Value::Local(l) => InstanceType::new(TypeDesc::Primitive(l.kind), Storage::Local),
            Value::Global(g) => InstanceType::new(TypeDesc::Primitive(g.kind), Storage::Global),
            Value::Memory(m) => {
                InstanceType::new(TypeDesc::Primitive(m.kind), m.addr.storage())
            }
            Value::Pointer(p) => p.prim.instance(),
            Value::Struct(s) => s.instance.clone(),
            Value::Array(a) => a.instance.clone(),
            Value::Str(s) => s.instance.clone(),
            Value::DirectFn(f) => {
                InstanceType::new(TypeDesc::Func(Rc::clone(&f.entry.sig)), Storage::Transient)
            }
            Value::BoundMethod(m) => {
                InstanceType::new(TypeDesc::Func(Rc::clone(&m.entry.sig)), Storage::Transient)
            }
            Value::IndirectFn(f) => InstanceType::reference(
                TypeDesc::Func(Rc::clone(&f.sig)),
                f.record.storage(),
            ),
            Value::Void(_) => {
                InstanceType::new(TypeDesc::Primitive(PrimitiveKind::U32), Storage::Transient)
            }
        }
    }

    fn invalid(&self, what: &str) -> CodegenError {
        CodegenError::InvalidOperation(format!("cannot {what} a `{}` value", self.type_name()))
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// read / materialize
// ══════════════════════════════════════════════════════════════════════════════

impl Value {
    /// Produce the instruction sequence yielding this value, for embedding
    /// into a larger expression. Aggregates yield their 32-bit address.
    pub fn materialize(&self, ctx: &mut Ctx) -> CodegenResult<InstrSeq> {
        match self {
            Value::Transient(t) => Ok(t.code.clone()),
            Value::Local(l) => {
                let mut code = vec![Instruction::LocalGet(l.index)];
                code.extend(ops::normalize(l.kind));
                Ok(code)
            }
            Value::Global(g) => {
                let mut code = vec![Instruction::GlobalGet(g.index)];
                code.extend(ops::normalize(g.kind));
                Ok(code)
            }
            Value::Memory(m) => {
                let mut code = m.addr.materialize(ctx)?;
                code.extend(ops::load(m.kind, 0));
                Ok(code)
            }
            Value::Pointer(p) => p.materialize(ctx),
            Value::Struct(s) => s.addr.materialize(ctx),
            Value::Array(a) => a.addr.materialize(ctx),
            Value::Str(s) => s.addr.materialize(ctx),
            Value::DirectFn(_) | Value::BoundMethod(_) => {
                // Reification emits a closure record; the address is the value.
                let record = crate::closure::reify(self, ctx)?;
                record.materialize(ctx)
            }
            Value::IndirectFn(f) => f.record.materialize(ctx),
            Value::Void(code) => Ok(code.clone()),
        }
    }

    /// Read the current contents as something further usable: a transient
    /// primitive (loads and normalization applied) or an aggregate handle's
    /// address.
    pub fn read(&self, ctx: &mut Ctx) -> CodegenResult<Value> {
        match self {
            Value::Transient(t) => Ok(Value::Transient(t.clone())),
            Value::Void(_) => Err(self.invalid("read")),
            other => {
                let code = other.materialize(ctx)?;
                let kind = other.kind().unwrap_or(PrimitiveKind::U32);
                Ok(Value::transient(kind, code))
            }
        }
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// write
// ══════════════════════════════════════════════════════════════════════════════

impl Value {
    /// Store `rhs` into this value, returning the post-store value (a
    /// store-then-reload, so assignment expressions chain and see the same
    /// normalization a plain read would).
    ///
    /// For aggregates that are not reference-typed, assignment is a
    /// byte-range copy of the whole size rather than a pointer copy.
    pub fn write(&self, ctx: &mut Ctx, rhs: &Value) -> CodegenResult<Value> {
        match self {
            Value::Transient(_) | Value::Void(_) => Err(self.invalid("assign to")),
            Value::DirectFn(_) | Value::BoundMethod(_) => Err(self.invalid("assign to")),

            Value::Local(l) => {
                self.check_prim_kind(l.kind, rhs)?;
                let mut code = rhs.materialize(ctx)?;
                code.extend(ops::normalize(l.kind));
                code.push(Instruction::LocalSet(l.index));
                code.push(Instruction::LocalGet(l.index));
                code.extend(ops::normalize(l.kind));
                Ok(Value::transient(l.kind, code))
            }

            Value::Global(g) => {
                self.check_prim_kind(g.kind, rhs)?;
                let mut code = rhs.materialize(ctx)?;
                code.extend(ops::normalize(g.kind));
                code.push(Instruction::GlobalSet(g.index));
                code.push(Instruction::GlobalGet(g.index));
                code.extend(ops::normalize(g.kind));
                Ok(Value::transient(g.kind, code))
            }

            Value::Memory(m) => {
                self.check_prim_kind(m.kind, rhs)?;
                // Evaluate the address once; an impure base expression must
                // not run again for the reload.
                let addr_local = ctx.func.alloc_local(ValType::I32);
                let mut code = m.addr.materialize(ctx)?;
                code.push(Instruction::LocalSet(addr_local));
                code.push(Instruction::LocalGet(addr_local));
                code.extend(rhs.materialize(ctx)?);
                code.push(ops::store(m.kind, 0));
                // Reload so the chained value sees read-side normalization.
                code.push(Instruction::LocalGet(addr_local));
                code.extend(ops::load(m.kind, 0));
                Ok(Value::transient(m.kind, code))
            }

            Value::Pointer(p) => p.write(ctx, rhs),

            Value::Struct(s) => self.write_aggregate(ctx, rhs, &s.addr, s.instance.is_ref),
            Value::Array(a) => self.write_aggregate(ctx, rhs, &a.addr, a.instance.is_ref),
            // Strings are always reference-typed: assignment copies the
            // pointer.
            Value::Str(s) => self.write_aggregate(ctx, rhs, &s.addr, true),
            Value::IndirectFn(f) => self.write_aggregate(ctx, rhs, &f.record, true),
        }
    }

    fn check_prim_kind(&self, expected: PrimitiveKind, rhs: &Value) -> CodegenResult<()> {
        match rhs.kind() {
            Some(k) if k == expected => Ok(()),
            _ => Err(CodegenError::AssignmentTypeMismatch {
                from: rhs.type_name(),
                to: expected.name().to_string(),
            }),
        }
    }

    fn write_aggregate(
        &self,
        ctx: &mut Ctx,
        rhs: &Value,
        addr: &Pointer,
        is_ref: bool,
    ) -> CodegenResult<Value> {
        if rhs.type_desc() != self.type_desc() {
            return Err(CodegenError::AssignmentTypeMismatch {
                from: rhs.type_name(),
                to: self.type_name(),
            });
        }
        if is_ref {
            // Pointer copy: store the source address through our pointer's
            // own storage.
            let src = rhs.read(ctx)?;
            let stored = addr.write(ctx, &src)?;
            let mut out = self.clone();
            out.replace_addr(Pointer::transient(stored.materialize(ctx)?));
            return Ok(out);
        }
        // Value semantics: byte-range copy of the whole size. The
        // destination address is evaluated once into a scratch local so an
        // impure base runs its side effects once.
        let addr_local = ctx.func.alloc_local(ValType::I32);
        let mut code = addr.materialize(ctx)?;
        code.push(Instruction::LocalSet(addr_local));
        code.push(Instruction::LocalGet(addr_local));
        code.extend(rhs.materialize(ctx)?);
        code.extend(self.size_of(ctx)?.materialize(ctx)?);
        code.push(Instruction::MemoryCopy {
            src_mem: 0,
            dst_mem: 0,
        });
        if let Some(size) = self.type_desc().byte_size() {
            ctx.func.frame_bytes += size;
        }
        // Post-store value: the destination, with the copy carried as a
        // prefix of its address sequence.
        code.push(Instruction::LocalGet(addr_local));
        let mut out = self.clone();
        out.replace_addr(Pointer::transient(code));
        Ok(out)
    }

    fn replace_addr(&mut self, addr: Pointer) {
        match self {
            Value::Struct(s) => s.addr = addr,
            Value::Array(a) => a.addr = addr,
            Value::Str(s) => s.addr = addr,
            Value::IndirectFn(f) => f.record = addr,
            _ => {}
        }
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Structural access
// ══════════════════════════════════════════════════════════════════════════════

fn offset_addr(base: InstrSeq, offset: u32) -> InstrSeq {
    let mut code = base;
    if offset != 0 {
        code.push(Instruction::I32Const(offset as i32));
        code.push(Instruction::I32Add);
    }
    code
}

impl Value {
    /// Access a struct field (or, failing that, a struct method as a bound
    /// value). Only legal on structs.
    pub fn field_access(&self, ctx: &mut Ctx, name: &str) -> CodegenResult<Value> {
        let s = match self {
            Value::Struct(s) => s,
            _ => return Err(self.invalid("access a field of")),
        };
        if let Some(field) = s.layout.field(name) {
            let base = s.addr.materialize(ctx)?;
            let slot = offset_addr(base, field.offset);
            let storage = s.instance.storage;
            if field.is_ref {
                // The slot stores the referent's address. Backing the
                // pointer with the slot cell keeps it writable: reads load
                // the stored address, assignment stores a new one through
                // `base + offset`.
                let slot_ptr = Pointer::new(Value::Memory(MemoryCell {
                    kind: PrimitiveKind::POINTER,
                    addr: Pointer::transient(slot),
                }))?;
                return Ok(Value::at_address(&field.ty, slot_ptr, storage, true));
            }
            return Ok(Value::at_address(
                &field.ty,
                Pointer::transient(slot),
                storage,
                false,
            ));
        }
        // Fall back to the method table before failing.
        if let Some(entry) = ctx.module.method(&s.layout.name, name) {
            return Ok(Value::BoundMethod(BoundMethod {
                entry: entry.clone(),
                receiver: s.addr.clone(),
            }));
        }
        Err(CodegenError::UnknownField {
            struct_name: s.layout.name.clone(),
            field: name.to_string(),
        })
    }

    /// Index into an array or string: element address is
    /// `base + header + index * element-size`. 64-bit indices are wrapped
    /// to 32-bit; non-integer index kinds are rejected.
    pub fn index_access(&self, ctx: &mut Ctx, index: &Value) -> CodegenResult<Value> {
        let idx_kind = index
            .kind()
            .filter(|k| k.is_integer() && *k != PrimitiveKind::Bool)
            .ok_or_else(|| {
                CodegenError::InvalidOperation(format!(
                    "index must be an integer kind, found `{}`",
                    index.type_name()
                ))
            })?;
        let mut idx = index.materialize(ctx)?;
        if idx_kind.size() == 8 {
            idx.push(Instruction::I32WrapI64);
        }

        match self {
            Value::Array(a) => {
                let elem_size = a.layout.elem_size()?;
                let mut code = a.addr.materialize(ctx)?;
                code.extend(idx);
                code.push(Instruction::I32Const(elem_size as i32));
                code.push(Instruction::I32Mul);
                code.push(Instruction::I32Add);
                let code = offset_addr(code, a.layout.header_size());
                Ok(Value::at_address(
                    &a.layout.elem,
                    Pointer::transient(code),
                    a.instance.storage,
                    false,
                ))
            }
            Value::Str(s) => {
                let mut code = s.addr.materialize(ctx)?;
                code.extend(idx);
                code.push(Instruction::I32Add);
                let code = offset_addr(code, LEN_HEADER_SIZE);
                Ok(Value::Memory(MemoryCell {
                    kind: PrimitiveKind::U8,
                    addr: Pointer::transient(code),
                }))
            }
            _ => Err(self.invalid("index")),
        }
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Calls
// ══════════════════════════════════════════════════════════════════════════════

/// Wrap a call result of descriptor `desc` whose producing code is `code`.
fn wrap_result(desc: Option<&TypeDesc>, code: InstrSeq) -> Value {
    match desc {
        None => Value::Void(code),
        Some(TypeDesc::Primitive(kind)) => Value::transient(*kind, code),
        Some(agg) => Value::at_address(
            agg,
            Pointer::transient(code),
            Storage::Arena,
            matches!(agg, TypeDesc::Str | TypeDesc::Func(_)),
        ),
    }
}

impl Value {
    /// Call a function-like value. Arity is checked before any emission.
    pub fn call(&self, ctx: &mut Ctx, args: &[Value]) -> CodegenResult<Value> {
        match self {
            Value::DirectFn(f) => {
                check_arity(f.entry.sig.params.len(), args.len())?;
                let mut code = Vec::new();
                for (param, arg) in f.entry.sig.params.iter().zip(args) {
                    code.extend(coerce_arg(ctx, param, arg)?);
                }
                code.push(Instruction::Call(f.entry.index));
                Ok(wrap_result(f.entry.sig.result.as_ref(), code))
            }

            Value::BoundMethod(m) => {
                // The receiver occupies the method's first parameter.
                check_arity(m.entry.sig.params.len().saturating_sub(1), args.len())?;
                let mut code = m.receiver.materialize(ctx)?;
                for (param, arg) in m.entry.sig.params.iter().skip(1).zip(args) {
                    code.extend(coerce_arg(ctx, param, arg)?);
                }
                code.push(Instruction::Call(m.entry.index));
                Ok(wrap_result(m.entry.sig.result.as_ref(), code))
            }

            Value::IndirectFn(f) => {
                check_arity(f.sig.params.len(), args.len())?;
                // Load the two record words: context pointer first, then the
                // table slot, and call through the table with the uniform
                // (context, ...args) convention.
                let record_local = ctx.func.alloc_local(ValType::I32);
                let mut code = f.record.materialize(ctx)?;
                code.push(Instruction::LocalSet(record_local));
                code.push(Instruction::LocalGet(record_local));
                code.extend(ops::load(PrimitiveKind::U32, runtime::CLOSURE_CTX_OFFSET));
                for (param, arg) in f.sig.params.iter().zip(args) {
                    code.extend(coerce_arg(ctx, param, arg)?);
                }
                code.push(Instruction::LocalGet(record_local));
                code.extend(ops::load(PrimitiveKind::U32, runtime::CLOSURE_SLOT_OFFSET));
                let type_index = ctx.module.func_type_index(&f.sig, true);
                code.push(Instruction::CallIndirect {
                    type_index,
                    table_index: 0,
                });
                Ok(wrap_result(f.sig.result.as_ref(), code))
            }

            _ => Err(self.invalid("call")),
        }
    }
}

fn check_arity(expected: usize, found: usize) -> CodegenResult<()> {
    if expected != found {
        return Err(CodegenError::ArityMismatch { expected, found });
    }
    Ok(())
}

/// Materialize an argument for a parameter slot, checking the kinds match.
fn coerce_arg(ctx: &mut Ctx, param: &TypeDesc, arg: &Value) -> CodegenResult<InstrSeq> {
    let ok = match (param, arg.kind()) {
        (TypeDesc::Primitive(want), Some(have)) => *want == have,
        (TypeDesc::Primitive(_), None) => false,
        (want, _) => *want == arg.type_desc(),
    };
    if !ok {
        return Err(CodegenError::AssignmentTypeMismatch {
            from: arg.type_name(),
            to: param.to_string(),
        });
    }
    arg.materialize(ctx)
}

// ══════════════════════════════════════════════════════════════════════════════
// size_of
// ══════════════════════════════════════════════════════════════════════════════

impl Value {
    /// The value's byte size: a constant for fixed-size kinds, an
    /// instruction sequence (`header + length * element-size`) for dynamic
    /// arrays and strings.
    pub fn size_of(&self, ctx: &mut Ctx) -> CodegenResult<Value> {
        if let Some(size) = self.type_desc().byte_size() {
            return Ok(Value::transient(
                PrimitiveKind::U32,
                vec![Instruction::I32Const(size as i32)],
            ));
        }
        match self {
            Value::Array(a) => {
                let elem_size = a.layout.elem_size()?;
                let mut code = a.addr.materialize(ctx)?;
                code.extend(ops::load(PrimitiveKind::U32, 0));
                code.push(Instruction::I32Const(elem_size as i32));
                code.push(Instruction::I32Mul);
                code.push(Instruction::I32Const(LEN_HEADER_SIZE as i32));
                code.push(Instruction::I32Add);
                Ok(Value::transient(PrimitiveKind::U32, code))
            }
            Value::Str(s) => {
                let mut code = s.addr.materialize(ctx)?;
                code.extend(ops::load(PrimitiveKind::U32, 0));
                code.push(Instruction::I32Const(LEN_HEADER_SIZE as i32));
                code.push(Instruction::I32Add);
                Ok(Value::transient(PrimitiveKind::U32, code))
            }
            other => Err(other.invalid("take the size of")),
        }
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Operators
// ══════════════════════════════════════════════════════════════════════════════

impl Value {
    /// Apply a binary operator. Both operands must already share the exact
    /// same kind name; coercion happens before dispatch. Strings route
    /// comparison through the injected `cmp` routine and `+` through
    /// `concat`.
    pub fn binary(&self, ctx: &mut Ctx, op: BinOp, rhs: &Value) -> CodegenResult<Value> {
        if let (Value::Str(a), Value::Str(b)) = (self, rhs) {
            return string_binary(ctx, op, a, b);
        }
        let (lk, rk) = match (self.kind(), rhs.kind()) {
            (Some(l), Some(r)) => (l, r),
            _ => {
                return Err(CodegenError::OperatorTypeMismatch {
                    op: op.to_string(),
                    lhs: self.type_name(),
                    rhs: rhs.type_name(),
                })
            }
        };
        if lk != rk {
            return Err(CodegenError::OperatorTypeMismatch {
                op: op.to_string(),
                lhs: lk.name().to_string(),
                rhs: rk.name().to_string(),
            });
        }
        let lowering = ops::binary(lk, op)?;
        let mut code = self.materialize(ctx)?;
        code.extend(rhs.materialize(ctx)?);
        code.extend(lowering.code);
        Ok(Value::transient(lowering.result, code))
    }

    /// Apply a unary operator.
    pub fn unary(&self, ctx: &mut Ctx, op: UnOp) -> CodegenResult<Value> {
        let kind = self.kind().ok_or_else(|| CodegenError::OperatorTypeMismatch {
            op: "!".to_string(),
            lhs: self.type_name(),
            rhs: self.type_name(),
        })?;
        let lowering = ops::unary(kind, op)?;
        let mut code = self.materialize(ctx)?;
        code.extend(lowering.code);
        Ok(Value::transient(lowering.result, code))
    }
}

/// String operator routing: equality short-circuits on the length header
/// before falling back to `cmp(...) == 0`; ordering goes straight through
/// `cmp`; `+` through `concat`.
fn string_binary(ctx: &mut Ctx, op: BinOp, a: &StrRef, b: &StrRef) -> CodegenResult<Value> {
    use Instruction as I;

    let cmp_zero = |cmp_op: Instruction<'static>, ctx: &mut Ctx| -> CodegenResult<Value> {
        let mut code = a.addr.materialize(ctx)?;
        code.extend(b.addr.materialize(ctx)?);
        code.push(I::Call(runtime::rt_func_idx(runtime::RT_STR_CMP)));
        code.push(I::I32Const(0));
        code.push(cmp_op);
        Ok(Value::transient(PrimitiveKind::Bool, code))
    };

    match op {
        BinOp::Add => {
            let mut code = a.addr.materialize(ctx)?;
            code.extend(b.addr.materialize(ctx)?);
            code.push(I::Call(runtime::rt_func_idx(runtime::RT_STR_CONCAT)));
            Ok(Value::Str(StrRef {
                addr: Pointer::transient(code),
                instance: InstanceType::reference(TypeDesc::Str, Storage::Arena),
            }))
        }
        BinOp::Eq | BinOp::Ne => {
            let la = ctx.func.alloc_local(ValType::I32);
            let lb = ctx.func.alloc_local(ValType::I32);
            let mut code = a.addr.materialize(ctx)?;
            code.push(I::LocalSet(la));
            code.extend(b.addr.materialize(ctx)?);
            code.push(I::LocalSet(lb));
            // Header length mismatch short-circuits to false.
            code.push(I::LocalGet(la));
            code.extend(ops::load(PrimitiveKind::U32, 0));
            code.push(I::LocalGet(lb));
            code.extend(ops::load(PrimitiveKind::U32, 0));
            code.push(I::I32Eq);
            code.push(I::If(BlockType::Result(ValType::I32)));
            code.push(I::LocalGet(la));
            code.push(I::LocalGet(lb));
            code.push(I::Call(runtime::rt_func_idx(runtime::RT_STR_CMP)));
            code.push(I::I32Eqz);
            code.push(I::Else);
            code.push(I::I32Const(0));
            code.push(I::End);
            if op == BinOp::Ne {
                code.push(I::I32Eqz);
            }
            Ok(Value::transient(PrimitiveKind::Bool, code))
        }
        BinOp::Lt => cmp_zero(I::I32LtS, ctx),
        BinOp::Le => cmp_zero(I::I32LeS, ctx),
        BinOp::Gt => cmp_zero(I::I32GtS, ctx),
        BinOp::Ge => cmp_zero(I::I32GeS, ctx),
        other => Err(CodegenError::OperatorTypeMismatch {
            op: other.to_string(),
            lhs: "string".to_string(),
            rhs: "string".to_string(),
        }),
    }
}
