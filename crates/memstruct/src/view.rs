//! Views: a descriptor bound to an address.
//!
//! A [`View`] is a cheap `Copy` handle. Reading decodes through the overlay's
//! provider on every call; nothing is cached, since the foreign process may
//! change its memory between any two accesses.

use crate::descriptor::{Compound, Descriptor, IntWidth};
use crate::error::{AccessContext, MemStructError, MemStructResult};
use crate::overlay::Overlay;
use crate::provider::MemoryProvider;
use crate::scalar;
use crate::value::{Item, Value};
use std::fmt;

/// `length` and `ptr` words of a df-array.
static DF_ARRAY_WORD: Descriptor = Descriptor::Number {
    width: IntWidth::Int32,
    signed: false,
};
pub(crate) const DF_ARRAY_LENGTH: u32 = 0;
pub(crate) const DF_ARRAY_PTR: u32 = 4;

#[derive(Clone, Copy)]
pub struct View<'a> {
    overlay: &'a Overlay,
    descriptor: &'a Descriptor,
    address: u32,
}

impl fmt::Debug for View<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("View")
            .field("kind", &self.descriptor.kind())
            .field("address", &format_args!("{:#x}", self.address))
            .finish()
    }
}

impl<'a> View<'a> {
    pub(crate) fn new(overlay: &'a Overlay, descriptor: &'a Descriptor, address: u32) -> Self {
        View {
            overlay,
            descriptor,
            address,
        }
    }

    pub fn address(&self) -> u32 {
        self.address
    }

    pub fn descriptor(&self) -> &'a Descriptor {
        self.descriptor
    }

    pub fn overlay(&self) -> &'a Overlay {
        self.overlay
    }

    pub(crate) fn provider(&self) -> &'a dyn MemoryProvider {
        self.overlay.provider()
    }

    pub(crate) fn read_u32(&self, addr: u32) -> MemStructResult<u32> {
        Ok(self.provider().read_i32(addr).at(addr)? as u32)
    }

    pub(crate) fn bind(&self, descriptor: &'a Descriptor, address: u32) -> MemStructResult<View<'a>> {
        self.overlay.bind(descriptor, address)
    }

    /// Decode a scalar, or hand back the view itself for everything else.
    pub fn get(&self) -> MemStructResult<Item<'a>> {
        let provider = self.provider();
        let value = match *self.descriptor {
            Descriptor::Number { width, signed } => {
                scalar::decode_number(provider, self.address, width, signed)?
            }
            Descriptor::Float => scalar::decode_float(provider, self.address)?,
            Descriptor::BitField { shift, len } => {
                scalar::decode_bitfield(provider, self.address, shift, len)?
            }
            Descriptor::StaticString { length } => Value::Bytes(
                provider
                    .read_bytes(self.address, length as usize)
                    .at(self.address)?,
            ),
            Descriptor::StlString => {
                Value::Bytes(provider.read_dyn_string(self.address).at(self.address)?)
            }
            _ => return Ok(Item::View(*self)),
        };
        Ok(Item::Value(value))
    }

    /// Encode `value` into the bytes this view covers.
    ///
    /// Compounds take a record, containers a list. Pointer views forward the
    /// write to their pointee.
    pub fn set(&self, value: &Value) -> MemStructResult<()> {
        let provider = self.provider();
        match self.descriptor {
            Descriptor::Number { width, .. } => {
                scalar::encode_number(provider, self.address, *width, value)
            }
            Descriptor::Float => scalar::encode_float(provider, self.address, value),
            Descriptor::BitField { shift, len } => {
                scalar::encode_bitfield(provider, self.address, *shift, *len, value)
            }
            Descriptor::StaticString { length } => {
                let mut bytes = value.as_bytes()?.to_vec();
                bytes.resize(*length as usize, 0);
                provider.write_bytes(self.address, &bytes).at(self.address)
            }
            Descriptor::StlString => provider
                .write_dyn_string(self.address, value.as_bytes()?)
                .at(self.address),
            Descriptor::Pointer { .. } => match self.deref()? {
                Some(target) => target.set(value),
                None => Err(MemStructError::NullDereference {
                    address: self.address,
                }),
            },
            Descriptor::Compound(_) => self.set_fields(value.as_record()?),
            Descriptor::PointerAry { .. } | Descriptor::Global(_) => {
                Err(MemStructError::unsupported("set", self.descriptor.kind()))
            }
            _ => self.set_all(value.as_list()?),
        }
    }

    // -----------------------------------------------------------------------
    // Compound fields
    // -----------------------------------------------------------------------

    /// The field table behind this view, if it is a compound.
    pub fn compound(&self) -> Option<&'a Compound> {
        match self.descriptor {
            Descriptor::Compound(c) => Some(c.as_ref()),
            _ => None,
        }
    }

    /// Bind a field's descriptor at `self + offset`.
    pub fn field_view(&self, name: &str) -> MemStructResult<View<'a>> {
        match self.descriptor {
            Descriptor::Compound(c) => {
                let field = c.field(name).ok_or_else(|| MemStructError::FieldNotFound {
                    type_name: c.type_name().to_string(),
                    field: name.to_string(),
                })?;
                self.bind(&field.descriptor, self.address.wrapping_add(field.offset))
            }
            Descriptor::DfArray { .. } => {
                let offset = match name {
                    "length" => DF_ARRAY_LENGTH,
                    "ptr" => DF_ARRAY_PTR,
                    _ => {
                        return Err(MemStructError::FieldNotFound {
                            type_name: "df_array".to_string(),
                            field: name.to_string(),
                        })
                    }
                };
                Ok(View::new(self.overlay, &DF_ARRAY_WORD, self.address.wrapping_add(offset)))
            }
            other => Err(MemStructError::unsupported("field", other.kind())),
        }
    }

    pub fn field(&self, name: &str) -> MemStructResult<Item<'a>> {
        self.field_view(name)?.get()
    }

    pub fn set_field(&self, name: &str, value: &Value) -> MemStructResult<()> {
        self.field_view(name)?.set(value)
    }

    /// Apply each `(name, value)` pair in order; fields not named are untouched.
    pub fn set_fields(&self, values: &[(String, Value)]) -> MemStructResult<()> {
        for (name, value) in values {
            self.set_field(name, value)?;
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Pointers
    // -----------------------------------------------------------------------

    /// Address stored in a pointer slot.
    pub fn target_address(&self) -> MemStructResult<u32> {
        match self.descriptor {
            Descriptor::Pointer { .. } | Descriptor::PointerAry { .. } => {
                self.read_u32(self.address)
            }
            other => Err(MemStructError::unsupported("target_address", other.kind())),
        }
    }

    /// Follow a pointer. `None` when the slot holds zero.
    pub fn deref(&self) -> MemStructResult<Option<View<'a>>> {
        match self.descriptor {
            Descriptor::Pointer { target } => {
                let target = target
                    .as_deref()
                    .ok_or_else(|| MemStructError::unsupported("deref", "untyped pointer"))?;
                match self.read_u32(self.address)? {
                    0 => Ok(None),
                    addr => self.bind(target, addr).map(Some),
                }
            }
            Descriptor::PointerAry { target, .. } => match self.read_u32(self.address)? {
                0 => Ok(None),
                addr => self.bind(target, addr).map(Some),
            },
            other => Err(MemStructError::unsupported("deref", other.kind())),
        }
    }

    /// Point the slot somewhere else.
    pub fn set_target(&self, address: u32) -> MemStructResult<()> {
        match self.descriptor {
            Descriptor::Pointer { .. } | Descriptor::PointerAry { .. } => self
                .provider()
                .write_i32(self.address, address as i32)
                .at(self.address),
            other => Err(MemStructError::unsupported("set_target", other.kind())),
        }
    }

    // -----------------------------------------------------------------------
    // Snapshots
    // -----------------------------------------------------------------------

    /// Copy this view into an owned [`Value`] tree, following at most
    /// `depth` levels of pointers. Null pointers become [`Value::Null`].
    pub fn snapshot(&self, depth: usize) -> MemStructResult<Value> {
        match self.descriptor {
            Descriptor::Compound(c) => {
                let mut fields = Vec::with_capacity(c.fields().len());
                for field in c.fields() {
                    let value = self.field_view(&field.name)?.snapshot(depth)?;
                    fields.push((field.name.clone(), value));
                }
                Ok(Value::Record(fields))
            }
            Descriptor::Pointer { target: Some(_) } if depth > 0 => match self.deref()? {
                Some(target) => target.snapshot(depth - 1),
                None => Ok(Value::Null),
            },
            Descriptor::Pointer { .. } | Descriptor::PointerAry { .. } => {
                Ok(Value::UInt(self.target_address()? as u64))
            }
            _ => match self.get()? {
                Item::Value(v) => Ok(v),
                Item::View(_) => {
                    let mut items = Vec::new();
                    for item in self.iter()? {
                        items.push(match item? {
                            Item::Value(v) => v,
                            Item::View(v) => v.snapshot(depth)?,
                        });
                    }
                    Ok(Value::List(items))
                }
            },
        }
    }
}
