//! Instance types: a shared descriptor plus per-use-site flags.
//!
//! The structural descriptor (shape, offsets, size) is immutable and shared;
//! everything that varies per use site — reference semantics and storage
//! location — lives here, composed by wrapping. Instance types are
//! constructed cheaply and often during expression translation.

use crate::layout::TypeDesc;

/// Where a value physically lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Storage {
    /// In flight on the operand stack, not addressable.
    Transient,
    /// A function-local slot.
    Local,
    /// A module-level mutable global slot.
    Global,
    /// The static data segment (interned literals).
    Static,
    /// The bump-allocated arena heap, invalidated by `arena_heap_reset`.
    Arena,
    /// The pinned heap: survives arena resets, never bulk-reclaimed.
    Pinned,
}

/// A type descriptor plus usage-site flags.
#[derive(Debug, Clone, PartialEq)]
pub struct InstanceType {
    pub desc: TypeDesc,
    /// Stored by pointer indirection rather than inline. Inherited from the
    /// value's address/storage, never set independently.
    pub is_ref: bool,
    pub storage: Storage,
}

impl InstanceType {
    pub fn new(desc: TypeDesc, storage: Storage) -> Self {
        InstanceType {
            desc,
            is_ref: false,
            storage,
        }
    }

    pub fn reference(desc: TypeDesc, storage: Storage) -> Self {
        InstanceType {
            desc,
            is_ref: true,
            storage,
        }
    }

    pub fn with_storage(mut self, storage: Storage) -> Self {
        self.storage = storage;
        self
    }

    /// Values addressed through a global carry the flag on their address.
    pub fn is_global(&self) -> bool {
        self.storage == Storage::Global
    }
}
