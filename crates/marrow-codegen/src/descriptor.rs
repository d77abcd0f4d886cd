//! Serializable type descriptors.
//!
//! A stable, JSON-friendly view of the resolved layouts, for downstream
//! accessor generators that need to read and write compiled objects from
//! the host side: byte sizes, field offsets, reference flags, and method
//! names, in deterministic (leaf-first) order.

use marrow_types::Program;
use serde::{Deserialize, Serialize};

use crate::layout::{TypeRegistry, PTR_SIZE};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Classification {
    Struct,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub name: String,
    /// The field's declared type, in source spelling.
    #[serde(rename = "type")]
    pub type_name: String,
    pub offset: u32,
    /// Bytes the field occupies in the record (the pointer width for
    /// reference fields).
    pub size: u32,
    pub is_ref: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeDescriptor {
    pub classification: Classification,
    pub name: String,
    pub size: u32,
    pub fields: Vec<FieldDescriptor>,
    pub methods: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeDescriptorTable {
    pub types: Vec<TypeDescriptor>,
}

impl TypeDescriptorTable {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Build the descriptor table for every struct in the registry.
pub fn describe(registry: &TypeRegistry, program: &Program) -> TypeDescriptorTable {
    let types = registry
        .ordered()
        .map(|layout| {
            let fields = layout
                .fields
                .iter()
                .map(|f| FieldDescriptor {
                    name: f.name.clone(),
                    type_name: f.ty.to_string(),
                    offset: f.offset,
                    size: if f.is_ref {
                        PTR_SIZE
                    } else {
                        f.ty.byte_size().unwrap_or(PTR_SIZE)
                    },
                    is_ref: f.is_ref,
                })
                .collect();
            let methods = program
                .functions
                .iter()
                .filter(|d| d.method_of.as_deref() == Some(layout.name.as_str()))
                .map(|d| d.name.clone())
                .collect();
            TypeDescriptor {
                classification: Classification::Struct,
                name: layout.name.clone(),
                size: layout.size,
                fields,
                methods,
            }
        })
        .collect();
    TypeDescriptorTable { types }
}
