//! Typed views over the memory of a foreign 32-bit process.
//!
//! A [`Schema`] describes the foreign program's data layout: named compound
//! types, global symbols and vtable addresses. An [`Overlay`] pairs it with a
//! [`MemoryProvider`] and hands out [`View`]s, which decode and encode values
//! in place, walk pointers and operate on the foreign program's containers.
//!
//! - Parsing of `.json` and `.json.xz` schema files
//! - Descriptors for numbers, bitfields, pointers, compounds, strings and containers
//! - Polymorphic binding through an RTTI cache
//! - An MSVC x86 [`MsvcProvider`] over any [`RawMemory`]
//!
//! # Example
//!
//! ```rust,ignore
//! use memstruct::{parse_schema_file, BufferMemory, MsvcProvider, Overlay};
//! use std::sync::Arc;
//!
//! let schema = parse_schema_file("df.json.xz")?;
//! let provider = MsvcProvider::new(BufferMemory::from_bytes(0x0040_0000, dump));
//! let overlay = Overlay::new(Arc::new(schema), Arc::new(provider));
//! let unit = overlay.symbol("active_unit")?;
//! println!("{}", serde_json::to_string(&unit.snapshot(1)?)?);
//! ```

pub mod containers;
pub mod descriptor;
pub mod error;
pub mod msvc;
pub mod overlay;
pub mod parser;
pub mod provider;
pub mod rtti;
mod scalar;
pub mod schema;
pub mod types;
pub mod value;
pub mod view;

#[cfg(test)]
mod testing;

// Re-export key types at crate root.
pub use containers::Elements;
pub use descriptor::{Compound, CompoundBuilder, Descriptor, Field, IntWidth};
pub use error::{MemStructError, MemStructResult};
pub use msvc::MsvcProvider;
pub use overlay::Overlay;
pub use parser::{parse_schema_bytes, parse_schema_file, parse_schema_str};
pub use provider::{BufferMemory, ElementWidth, MemoryProvider, ProviderError, ProviderResult, RawMemory};
pub use rtti::RttiCache;
pub use schema::{GlobalSymbol, Schema};
pub use value::{Item, Value};
pub use view::View;
