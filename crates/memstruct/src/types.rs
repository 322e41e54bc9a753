//! Serialized schema file format.
//!
//! ```json
//! {
//!   "types": {
//!     "unit": {
//!       "rtti": "unit",
//!       "fields": [
//!         { "name": "id", "offset": 4, "type": { "kind": "number", "bits": 32, "signed": true } },
//!         { "name": "job", "offset": 8, "type": { "kind": "pointer", "target": { "kind": "global", "name": "job" } } }
//!       ]
//!     }
//!   },
//!   "globals": { "world": { "address": 20971520, "type": "world" } },
//!   "vtables": { "unit": 16777216 }
//! }
//! ```

use serde::Deserialize;
use std::collections::HashMap;

/// Top-level schema file.
#[derive(Debug, Deserialize)]
pub struct SchemaFile {
    #[serde(default)]
    pub types: HashMap<String, TypeDef>,
    #[serde(default)]
    pub globals: HashMap<String, SymbolDef>,
    /// Runtime class name to vtable address.
    #[serde(default)]
    pub vtables: HashMap<String, u32>,
}

/// A named compound type.
#[derive(Debug, Clone, Deserialize)]
pub struct TypeDef {
    /// Runtime class name for polymorphic types.
    #[serde(default)]
    pub rtti: Option<String>,
    #[serde(default)]
    pub fields: Vec<FieldDef>,
}

/// A field within a compound, in declaration order.
#[derive(Debug, Clone, Deserialize)]
pub struct FieldDef {
    pub name: String,
    pub offset: u32,
    #[serde(rename = "type")]
    pub type_info: TypeInfo,
}

/// A global symbol: an address and the schema type living there.
#[derive(Debug, Clone, Deserialize)]
pub struct SymbolDef {
    pub address: u32,
    #[serde(rename = "type")]
    pub type_name: String,
}

fn one() -> u32 {
    1
}

/// Type of a field, recursive for pointers and containers.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TypeInfo {
    Number {
        bits: u32,
        #[serde(default)]
        signed: bool,
    },
    Float,
    Bits {
        shift: u32,
        #[serde(default = "one")]
        len: u32,
    },
    Pointer {
        #[serde(default)]
        target: Option<Box<TypeInfo>>,
    },
    PointerAry {
        stride: u32,
        target: Box<TypeInfo>,
    },
    StaticArray {
        length: u32,
        stride: u32,
        element: Box<TypeInfo>,
    },
    StaticString {
        length: u32,
    },
    StlVector {
        #[serde(default)]
        stride: Option<u32>,
        #[serde(default)]
        element: Option<Box<TypeInfo>>,
    },
    StlString,
    StlBitVector,
    StlDeque {
        stride: u32,
        element: Box<TypeInfo>,
    },
    DfFlagarray,
    DfArray {
        stride: u32,
        element: Box<TypeInfo>,
    },
    DfLinkedList {
        #[serde(default)]
        element: Option<Box<TypeInfo>>,
    },
    Global {
        name: String,
    },
    Compound {
        #[serde(default)]
        fields: Vec<FieldDef>,
    },
}
