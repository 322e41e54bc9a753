//! Polymorphism resolver backed by an RTTI cache.
//!
//! Maps runtime class names to schema types (both ways) and vtable addresses
//! to runtime class names (both ways). Vtable entries are filled lazily from
//! the provider and kept until the cache is dropped: a vtable's class is
//! assumed stable for as long as the foreign process keeps its code loaded.

use crate::error::{AccessContext, MemStructResult};
use crate::provider::MemoryProvider;
use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::debug;

#[derive(Debug, Default)]
struct RttiMaps {
    name_to_class: HashMap<String, String>,
    class_to_name: HashMap<String, String>,
    vtable_to_name: HashMap<u32, String>,
    /// 0 records a name the foreign process has no vtable for.
    name_to_vtable: HashMap<String, u32>,
}

/// RTTI lookup tables for one connection to a foreign process.
///
/// Concurrent first lookups of the same key may both query the provider;
/// the answers are identical, so the last write wins.
#[derive(Debug, Default)]
pub struct RttiCache {
    maps: RwLock<RttiMaps>,
}

impl RttiCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Associate a runtime class name with a schema type.
    pub fn register(&self, runtime_name: &str, class: &str) {
        let mut maps = self.maps.write();
        maps.name_to_class
            .insert(runtime_name.to_string(), class.to_string());
        maps.class_to_name
            .insert(class.to_string(), runtime_name.to_string());
    }

    pub fn class_for_name(&self, runtime_name: &str) -> Option<String> {
        self.maps.read().name_to_class.get(runtime_name).cloned()
    }

    pub fn name_for_class(&self, class: &str) -> Option<String> {
        self.maps.read().class_to_name.get(class).cloned()
    }

    /// Runtime class name for a vtable, queried from the provider once.
    pub fn class_name_for_vtable(
        &self,
        provider: &dyn MemoryProvider,
        vptr: u32,
    ) -> MemStructResult<String> {
        if let Some(name) = self.maps.read().vtable_to_name.get(&vptr) {
            return Ok(name.clone());
        }
        let name = provider.class_name_for_vtable(vptr).at(vptr)?;
        debug!("RTTI: vtable {:#x} is {}", vptr, name);
        let mut maps = self.maps.write();
        maps.vtable_to_name.insert(vptr, name.clone());
        maps.name_to_vtable.insert(name.clone(), vptr);
        Ok(name)
    }

    /// Vtable address for a runtime class name, `None` when the foreign
    /// process has none (e.g. an abstract base).
    pub fn vtable_for_name(
        &self,
        provider: &dyn MemoryProvider,
        runtime_name: &str,
    ) -> MemStructResult<Option<u32>> {
        if let Some(&vptr) = self.maps.read().name_to_vtable.get(runtime_name) {
            return Ok((vptr != 0).then_some(vptr));
        }
        let vptr = provider.vtable_for_class_name(runtime_name).at(0)?;
        debug!("RTTI: {} has vtable {:#x}", runtime_name, vptr);
        let mut maps = self.maps.write();
        maps.name_to_vtable.insert(runtime_name.to_string(), vptr);
        if vptr != 0 {
            maps.vtable_to_name.insert(vptr, runtime_name.to_string());
        }
        Ok((vptr != 0).then_some(vptr))
    }

    /// Pick the schema type to use for the object at `address`, whose static
    /// type is `static_class`.
    ///
    /// Without a registered runtime name for `static_class`, or at a null
    /// address, the static class is returned. Otherwise the object's vtable
    /// decides; runtime classes without a registered schema type fall back to
    /// the static class.
    pub fn resolve_concrete_class(
        &self,
        provider: &dyn MemoryProvider,
        static_class: &str,
        address: u32,
    ) -> MemStructResult<String> {
        if address == 0 || self.name_for_class(static_class).is_none() {
            return Ok(static_class.to_string());
        }
        let vptr = provider.read_vtable_pointer(address).at(address)?;
        let runtime_name = self.class_name_for_vtable(provider, vptr)?;
        match self.class_for_name(&runtime_name) {
            Some(class) => Ok(class),
            None => {
                debug!(
                    "RTTI: {} at {:#x} is not registered, using {}",
                    runtime_name, address, static_class
                );
                Ok(static_class.to_string())
            }
        }
    }
}
