//! Descriptors: immutable recipes for how to interpret foreign bytes.
//!
//! Descriptors own no address. They are built once, during schema setup, and
//! shared by every [`View`](crate::View) that binds them.

use crate::error::{MemStructError, MemStructResult};
use crate::provider::ElementWidth;
use std::collections::HashSet;
use std::sync::Arc;

/// Width of an integer field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntWidth {
    Int8,
    Int16,
    Int32,
    Int64,
}

impl IntWidth {
    pub fn from_bits(bits: u32) -> Option<Self> {
        match bits {
            8 => Some(IntWidth::Int8),
            16 => Some(IntWidth::Int16),
            32 => Some(IntWidth::Int32),
            64 => Some(IntWidth::Int64),
            _ => None,
        }
    }

    pub fn bits(self) -> u32 {
        match self {
            IntWidth::Int8 => 8,
            IntWidth::Int16 => 16,
            IntWidth::Int32 => 32,
            IntWidth::Int64 => 64,
        }
    }
}

/// How to interpret the bytes at an address.
#[derive(Debug, Clone)]
pub enum Descriptor {
    Number { width: IntWidth, signed: bool },
    Float,
    /// Bits `[shift, shift+len)` of the containing 32-bit word.
    BitField { shift: u32, len: u32 },
    /// 32-bit pointer slot. An untyped pointer only exposes its target address.
    Pointer { target: Option<Box<Descriptor>> },
    /// Pointer to the first of a run of elements `stride` bytes apart.
    PointerAry { stride: u32, target: Box<Descriptor> },
    Compound(Arc<Compound>),
    StaticArray {
        stride: u32,
        length: u32,
        element: Box<Descriptor>,
    },
    StaticString { length: u32 },
    StlVector {
        width: ElementWidth,
        element: Box<Descriptor>,
    },
    StlBitVector,
    StlString,
    StlDeque { stride: u32, element: Box<Descriptor> },
    DfFlagarray,
    /// `{length: u32, ptr: u32}`.
    DfArray { stride: u32, element: Box<Descriptor> },
    DfLinkedList { element: Option<Box<Descriptor>> },
    /// Named schema type, resolved polymorphically when bound.
    Global(String),
}

impl Descriptor {
    pub fn number(bits: u32, signed: bool) -> MemStructResult<Self> {
        let width = IntWidth::from_bits(bits)
            .ok_or_else(|| MemStructError::Schema(format!("unsupported integer width: {}", bits)))?;
        Ok(Descriptor::Number { width, signed })
    }

    pub fn float() -> Self {
        Descriptor::Float
    }

    /// Single-bit boolean field.
    pub fn bit(shift: u32) -> MemStructResult<Self> {
        Self::bits(shift, 1)
    }

    pub fn bits(shift: u32, len: u32) -> MemStructResult<Self> {
        if len == 0 || shift.saturating_add(len) > 32 {
            return Err(MemStructError::Schema(format!(
                "bitfield at bit {} with length {} does not fit a 32-bit word",
                shift, len
            )));
        }
        Ok(Descriptor::BitField { shift, len })
    }

    pub fn pointer(target: Option<Descriptor>) -> Self {
        Descriptor::Pointer {
            target: target.map(Box::new),
        }
    }

    pub fn pointer_ary(stride: u32, target: Descriptor) -> Self {
        Descriptor::PointerAry {
            stride,
            target: Box::new(target),
        }
    }

    pub fn static_array(length: u32, stride: u32, element: Descriptor) -> Self {
        Descriptor::StaticArray {
            stride,
            length,
            element: Box::new(element),
        }
    }

    pub fn static_string(length: u32) -> Self {
        Descriptor::StaticString { length }
    }

    /// Growable vector; a missing stride means 32-bit elements.
    pub fn stl_vector(stride: Option<u32>, element: Descriptor) -> Self {
        Descriptor::StlVector {
            width: ElementWidth::from_stride(stride.unwrap_or(4)),
            element: Box::new(element),
        }
    }

    pub fn stl_bit_vector() -> Self {
        Descriptor::StlBitVector
    }

    pub fn stl_string() -> Self {
        Descriptor::StlString
    }

    pub fn stl_deque(stride: u32, element: Descriptor) -> Self {
        Descriptor::StlDeque {
            stride,
            element: Box::new(element),
        }
    }

    pub fn df_flagarray() -> Self {
        Descriptor::DfFlagarray
    }

    pub fn df_array(stride: u32, element: Descriptor) -> Self {
        Descriptor::DfArray {
            stride,
            element: Box::new(element),
        }
    }

    pub fn df_linked_list(element: Option<Descriptor>) -> Self {
        Descriptor::DfLinkedList {
            element: element.map(Box::new),
        }
    }

    pub fn global(name: impl Into<String>) -> Self {
        Descriptor::Global(name.into())
    }

    pub fn compound(compound: Compound) -> Self {
        Descriptor::Compound(Arc::new(compound))
    }

    /// Short kind name, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Descriptor::Number { .. } => "number",
            Descriptor::Float => "float",
            Descriptor::BitField { .. } => "bitfield",
            Descriptor::Pointer { .. } => "pointer",
            Descriptor::PointerAry { .. } => "pointer_ary",
            Descriptor::Compound(_) => "compound",
            Descriptor::StaticArray { .. } => "static_array",
            Descriptor::StaticString { .. } => "static_string",
            Descriptor::StlVector { .. } => "stl_vector",
            Descriptor::StlBitVector => "stl_bit_vector",
            Descriptor::StlString => "stl_string",
            Descriptor::StlDeque { .. } => "stl_deque",
            Descriptor::DfFlagarray => "df_flagarray",
            Descriptor::DfArray { .. } => "df_array",
            Descriptor::DfLinkedList { .. } => "df_linked_list",
            Descriptor::Global(_) => "global",
        }
    }

    /// Visit every `Global` name reachable from this descriptor.
    pub(crate) fn for_each_global<'d>(&'d self, f: &mut dyn FnMut(&'d str)) {
        match self {
            Descriptor::Global(name) => f(name),
            Descriptor::Pointer { target: Some(d) }
            | Descriptor::DfLinkedList { element: Some(d) } => d.for_each_global(f),
            Descriptor::PointerAry { target: d, .. }
            | Descriptor::StaticArray { element: d, .. }
            | Descriptor::StlVector { element: d, .. }
            | Descriptor::StlDeque { element: d, .. }
            | Descriptor::DfArray { element: d, .. } => d.for_each_global(f),
            Descriptor::Compound(c) => {
                for field in &c.fields {
                    field.descriptor.for_each_global(f);
                }
            }
            _ => {}
        }
    }
}

/// One entry of a compound's field table.
#[derive(Debug, Clone)]
pub struct Field {
    pub name: String,
    pub offset: u32,
    pub descriptor: Descriptor,
}

/// Aggregate with a named, offset-addressed field table.
///
/// Offsets are authoritative; declaration order is kept only for iteration.
#[derive(Debug, Clone, Default)]
pub struct Compound {
    name: Option<String>,
    fields: Vec<Field>,
    rtti_classname: Option<String>,
}

impl Compound {
    pub fn builder() -> CompoundBuilder {
        CompoundBuilder::default()
    }

    /// Schema name, or `<anonymous>` for inline compounds.
    pub fn type_name(&self) -> &str {
        self.name.as_deref().unwrap_or("<anonymous>")
    }

    pub(crate) fn set_name(&mut self, name: &str) {
        self.name = Some(name.to_string());
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Runtime class name registered for polymorphic lookup, if any.
    pub fn rtti_classname(&self) -> Option<&str> {
        self.rtti_classname.as_deref()
    }
}

/// Declares the fields of a [`Compound`].
///
/// ```rust
/// use memstruct::{Compound, Descriptor};
///
/// let coord = Compound::builder()
///     .field("x", 0, Descriptor::number(16, true).unwrap())
///     .field("y", 2, Descriptor::number(16, true).unwrap())
///     .build()
///     .unwrap();
/// assert_eq!(coord.field("y").unwrap().offset, 2);
/// ```
#[derive(Debug, Default)]
pub struct CompoundBuilder {
    fields: Vec<Field>,
    rtti_classname: Option<String>,
}

impl CompoundBuilder {
    pub fn field(mut self, name: impl Into<String>, offset: u32, descriptor: Descriptor) -> Self {
        self.fields.push(Field {
            name: name.into(),
            offset,
            descriptor,
        });
        self
    }

    pub fn rtti_classname(mut self, name: impl Into<String>) -> Self {
        self.rtti_classname = Some(name.into());
        self
    }

    /// Finish the declaration. Field names must be unique.
    pub fn build(self) -> MemStructResult<Compound> {
        let mut seen = HashSet::new();
        for field in &self.fields {
            if !seen.insert(field.name.as_str()) {
                return Err(MemStructError::Schema(format!(
                    "duplicate field name: {}",
                    field.name
                )));
            }
        }
        Ok(Compound {
            name: None,
            fields: self.fields,
            rtti_classname: self.rtti_classname,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_field_rejected() {
        let result = Compound::builder()
            .field("id", 0, Descriptor::number(32, true).unwrap())
            .field("id", 4, Descriptor::float())
            .build();
        assert!(matches!(result, Err(MemStructError::Schema(_))));
    }

    #[test]
    fn test_invalid_widths_rejected() {
        assert!(Descriptor::number(24, false).is_err());
        assert!(Descriptor::bits(30, 4).is_err());
        assert!(Descriptor::bits(3, 0).is_err());
        assert!(Descriptor::bits(28, 4).is_ok());
        assert!(Descriptor::bit(31).is_ok());
        assert!(matches!(Descriptor::bit(32), Err(MemStructError::Schema(_))));
    }

    #[test]
    fn test_nested_anonymous_compound() {
        let pos = Compound::builder()
            .field("x", 0, Descriptor::number(16, true).unwrap())
            .field("y", 2, Descriptor::number(16, true).unwrap())
            .build()
            .unwrap();
        let unit = Compound::builder()
            .field("pos", 8, Descriptor::compound(pos))
            .field("job", 12, Descriptor::pointer(Some(Descriptor::global("job"))))
            .rtti_classname("unit")
            .build()
            .unwrap();

        assert_eq!(unit.rtti_classname(), Some("unit"));
        let field = unit.field("pos").unwrap();
        assert_eq!(field.offset, 8);
        assert_eq!(field.descriptor.kind(), "compound");

        let mut globals = Vec::new();
        Descriptor::compound(unit).for_each_global(&mut |n| globals.push(n.to_string()));
        assert_eq!(globals, vec!["job".to_string()]);
    }
}
