//! Resolved schema: named compound types, global symbols and known vtables.

use crate::descriptor::{Compound, Descriptor};
use crate::error::{MemStructError, MemStructResult};
use crate::types::{FieldDef, SchemaFile, TypeInfo};
use std::collections::HashMap;

/// A named global: where it lives and which schema type it has.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobalSymbol {
    pub address: u32,
    pub type_name: String,
}

/// Immutable descriptor table shared by every view of a session.
#[derive(Debug, Default)]
pub struct Schema {
    /// Always `Descriptor::Compound`.
    types: HashMap<String, Descriptor>,
    symbols: HashMap<String, GlobalSymbol>,
    vtables: HashMap<String, u32>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a named compound type. Names are unique.
    pub fn insert_type(&mut self, name: &str, mut compound: Compound) -> MemStructResult<()> {
        if self.types.contains_key(name) {
            return Err(MemStructError::Schema(format!("duplicate type: {}", name)));
        }
        compound.set_name(name);
        self.types
            .insert(name.to_string(), Descriptor::compound(compound));
        Ok(())
    }

    pub fn insert_symbol(&mut self, name: &str, address: u32, type_name: &str) {
        self.symbols.insert(
            name.to_string(),
            GlobalSymbol {
                address,
                type_name: type_name.to_string(),
            },
        );
    }

    pub fn insert_vtable(&mut self, runtime_name: &str, address: u32) {
        self.vtables.insert(runtime_name.to_string(), address);
    }

    /// The `Descriptor::Compound` registered under `name`.
    pub fn type_descriptor(&self, name: &str) -> Option<&Descriptor> {
        self.types.get(name)
    }

    pub fn compound(&self, name: &str) -> Option<&Compound> {
        match self.types.get(name) {
            Some(Descriptor::Compound(c)) => Some(c.as_ref()),
            _ => None,
        }
    }

    pub fn type_names(&self) -> impl Iterator<Item = &str> {
        self.types.keys().map(String::as_str)
    }

    pub fn symbol(&self, name: &str) -> Option<&GlobalSymbol> {
        self.symbols.get(name)
    }

    pub fn symbols(&self) -> impl Iterator<Item = (&str, &GlobalSymbol)> {
        self.symbols.iter().map(|(name, symbol)| (name.as_str(), symbol))
    }

    pub fn vtables(&self) -> &HashMap<String, u32> {
        &self.vtables
    }

    /// `(runtime name, schema type)` for every type declaring a runtime class name.
    pub fn rtti_classes(&self) -> impl Iterator<Item = (&str, &str)> {
        self.types.iter().filter_map(|(name, descriptor)| match descriptor {
            Descriptor::Compound(c) => c.rtti_classname().map(|rtti| (rtti, name.as_str())),
            _ => None,
        })
    }

    /// Check that every type reference resolves.
    pub fn validate(&self) -> MemStructResult<()> {
        let mut missing = None;
        for descriptor in self.types.values() {
            descriptor.for_each_global(&mut |name| {
                if missing.is_none() && !self.types.contains_key(name) {
                    missing = Some(name.to_string());
                }
            });
        }
        for (symbol, global) in &self.symbols {
            if missing.is_none() && !self.types.contains_key(&global.type_name) {
                missing = Some(format!("{} (type of global {})", global.type_name, symbol));
            }
        }
        match missing {
            Some(name) => Err(MemStructError::Schema(format!("unknown type: {}", name))),
            None => Ok(()),
        }
    }

    /// Relocate every global and vtable address by `delta`, e.g. the
    /// difference between the module's load base and its preferred base.
    pub fn rebase(&mut self, delta: i64) {
        for global in self.symbols.values_mut() {
            global.address = (global.address as i64).wrapping_add(delta) as u32;
        }
        for vptr in self.vtables.values_mut() {
            *vptr = (*vptr as i64).wrapping_add(delta) as u32;
        }
    }

    /// Build a schema from a parsed file. Every type is converted once, here;
    /// views only ever see the resulting descriptors.
    pub fn from_file(file: SchemaFile) -> MemStructResult<Self> {
        let mut schema = Schema::new();
        for (name, def) in &file.types {
            let compound = build_compound(&def.fields, def.rtti.as_deref())
                .map_err(|e| MemStructError::Schema(format!("in type {}: {}", name, e)))?;
            schema.insert_type(name, compound)?;
        }
        for (name, def) in &file.globals {
            schema.insert_symbol(name, def.address, &def.type_name);
        }
        for (name, &address) in &file.vtables {
            schema.insert_vtable(name, address);
        }
        schema.validate()?;
        Ok(schema)
    }
}

fn build_compound(fields: &[FieldDef], rtti: Option<&str>) -> MemStructResult<Compound> {
    let mut builder = Compound::builder();
    for field in fields {
        builder = builder.field(&field.name, field.offset, build_descriptor(&field.type_info)?);
    }
    if let Some(rtti) = rtti {
        builder = builder.rtti_classname(rtti);
    }
    builder.build()
}

fn build_descriptor(info: &TypeInfo) -> MemStructResult<Descriptor> {
    let boxed = |info: &TypeInfo| build_descriptor(info);
    Ok(match info {
        TypeInfo::Number { bits, signed } => Descriptor::number(*bits, *signed)?,
        TypeInfo::Float => Descriptor::float(),
        TypeInfo::Bits { shift, len } => Descriptor::bits(*shift, *len)?,
        TypeInfo::Pointer { target } => {
            Descriptor::pointer(target.as_deref().map(boxed).transpose()?)
        }
        TypeInfo::PointerAry { stride, target } => {
            Descriptor::pointer_ary(*stride, boxed(target)?)
        }
        TypeInfo::StaticArray {
            length,
            stride,
            element,
        } => Descriptor::static_array(*length, *stride, boxed(element)?),
        TypeInfo::StaticString { length } => Descriptor::static_string(*length),
        TypeInfo::StlVector { stride, element } => {
            let element = match element {
                Some(element) => boxed(element)?,
                None => Descriptor::number(32, false)?,
            };
            Descriptor::stl_vector(*stride, element)
        }
        TypeInfo::StlString => Descriptor::stl_string(),
        TypeInfo::StlBitVector => Descriptor::stl_bit_vector(),
        TypeInfo::StlDeque { stride, element } => Descriptor::stl_deque(*stride, boxed(element)?),
        TypeInfo::DfFlagarray => Descriptor::df_flagarray(),
        TypeInfo::DfArray { stride, element } => Descriptor::df_array(*stride, boxed(element)?),
        TypeInfo::DfLinkedList { element } => {
            Descriptor::df_linked_list(element.as_deref().map(boxed).transpose()?)
        }
        TypeInfo::Global { name } => Descriptor::global(name.as_str()),
        TypeInfo::Compound { fields } => Descriptor::compound(build_compound(fields, None)?),
    })
}
