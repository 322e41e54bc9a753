//! Session root: a schema, a provider and the RTTI cache that ties them together.

use crate::descriptor::Descriptor;
use crate::error::{MemStructError, MemStructResult};
use crate::provider::MemoryProvider;
use crate::rtti::RttiCache;
use crate::schema::Schema;
use crate::view::View;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Everything views need to reach foreign memory.
///
/// One overlay per connection to a foreign process. The RTTI cache lives and
/// dies with it, so reconnecting to a restarted process starts clean.
pub struct Overlay {
    schema: Arc<Schema>,
    provider: Arc<dyn MemoryProvider>,
    rtti: RttiCache,
}

impl fmt::Debug for Overlay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Overlay")
            .field("schema", &self.schema)
            .field("rtti", &self.rtti)
            .finish_non_exhaustive()
    }
}

impl Overlay {
    /// Registers every runtime class name the schema declares.
    pub fn new(schema: Arc<Schema>, provider: Arc<dyn MemoryProvider>) -> Self {
        let rtti = RttiCache::new();
        for (runtime_name, class) in schema.rtti_classes() {
            rtti.register(runtime_name, class);
        }
        debug!("Overlay created with {} vtables known", schema.vtables().len());
        Overlay {
            schema,
            provider,
            rtti,
        }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn provider(&self) -> &dyn MemoryProvider {
        self.provider.as_ref()
    }

    pub fn rtti(&self) -> &RttiCache {
        &self.rtti
    }

    /// Bind a schema type at `address` as-is, without consulting RTTI.
    pub fn view(&self, type_name: &str, address: u32) -> MemStructResult<View<'_>> {
        let descriptor = self
            .schema
            .type_descriptor(type_name)
            .ok_or_else(|| MemStructError::UnregisteredType(type_name.to_string()))?;
        Ok(View::new(self, descriptor, address))
    }

    /// Bind `type_name` at `address`, switching to the object's concrete
    /// class when it is polymorphic.
    pub fn global(&self, type_name: &str, address: u32) -> MemStructResult<View<'_>> {
        let static_descriptor = self
            .schema
            .type_descriptor(type_name)
            .ok_or_else(|| MemStructError::UnregisteredType(type_name.to_string()))?;
        let class = self
            .rtti
            .resolve_concrete_class(self.provider(), type_name, address)?;
        if class == type_name {
            return Ok(View::new(self, static_descriptor, address));
        }
        match self.schema.type_descriptor(&class) {
            Some(descriptor) => Ok(View::new(self, descriptor, address)),
            None => {
                warn!(
                    "Class {} registered for RTTI but missing from schema, using {}",
                    class, type_name
                );
                Ok(View::new(self, static_descriptor, address))
            }
        }
    }

    /// View of a named global symbol.
    pub fn symbol(&self, name: &str) -> MemStructResult<View<'_>> {
        let symbol = self
            .schema
            .symbol(name)
            .ok_or_else(|| MemStructError::UnregisteredType(name.to_string()))?;
        self.global(&symbol.type_name, symbol.address)
    }

    /// Bind any descriptor. `Global` references go through [`Overlay::global`].
    pub fn bind<'a>(&'a self, descriptor: &'a Descriptor, address: u32) -> MemStructResult<View<'a>> {
        match descriptor {
            Descriptor::Global(name) => self.global(name, address),
            _ => Ok(View::new(self, descriptor, address)),
        }
    }
}
