//! Memory access provider contract.
//!
//! Everything in this crate reaches the foreign address space through a
//! [`MemoryProvider`]. Addresses are 32-bit offsets into that address space and
//! a zero address is the universal null sentinel.

use parking_lot::RwLock;

/// Error type returned by providers. Views wrap it into
/// [`MemStructError::Access`](crate::MemStructError::Access).
pub type ProviderError = Box<dyn std::error::Error + Send + Sync>;

/// Result type returned by providers.
pub type ProviderResult<T> = Result<T, ProviderError>;

/// Element width of a foreign growable vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementWidth {
    W8,
    W16,
    W32,
}

impl ElementWidth {
    /// Pick the vector flavour for an element stride: 1 and 2 map to the
    /// narrow vectors, anything else to the 32-bit one.
    pub fn from_stride(stride: u32) -> Self {
        match stride {
            1 => ElementWidth::W8,
            2 => ElementWidth::W16,
            _ => ElementWidth::W32,
        }
    }

    /// Width in bytes.
    pub fn bytes(self) -> u32 {
        match self {
            ElementWidth::W8 => 1,
            ElementWidth::W16 => 2,
            ElementWidth::W32 => 4,
        }
    }
}

/// Primitive operations against a foreign address space.
///
/// Scalar reads return the native signed decode; callers mask as needed.
pub trait MemoryProvider: Send + Sync {
    fn read_i8(&self, addr: u32) -> ProviderResult<i8>;
    fn read_i16(&self, addr: u32) -> ProviderResult<i16>;
    fn read_i32(&self, addr: u32) -> ProviderResult<i32>;
    fn write_i8(&self, addr: u32, value: i8) -> ProviderResult<()>;
    fn write_i16(&self, addr: u32, value: i16) -> ProviderResult<()>;
    fn write_i32(&self, addr: u32, value: i32) -> ProviderResult<()>;
    fn read_f32(&self, addr: u32) -> ProviderResult<f32>;
    fn write_f32(&self, addr: u32, value: f32) -> ProviderResult<()>;
    fn read_bytes(&self, addr: u32, length: usize) -> ProviderResult<Vec<u8>>;
    fn write_bytes(&self, addr: u32, bytes: &[u8]) -> ProviderResult<()>;

    /// Contents of the foreign dynamic string at `addr`.
    fn read_dyn_string(&self, addr: u32) -> ProviderResult<Vec<u8>>;
    fn write_dyn_string(&self, addr: u32, bytes: &[u8]) -> ProviderResult<()>;

    fn vector_length(&self, width: ElementWidth, addr: u32) -> ProviderResult<u32>;
    /// Address of element `index` of the vector at `addr`.
    fn vector_elem_addr(&self, width: ElementWidth, addr: u32, index: u32) -> ProviderResult<u32>;
    fn vector_insert(&self, width: ElementWidth, addr: u32, index: u32, value: i64)
        -> ProviderResult<()>;
    fn vector_delete(&self, width: ElementWidth, addr: u32, index: u32) -> ProviderResult<()>;

    fn bool_vec_length(&self, addr: u32) -> ProviderResult<u32>;
    fn bool_vec_get(&self, addr: u32, index: u32) -> ProviderResult<bool>;
    fn bool_vec_set(&self, addr: u32, index: u32, value: bool) -> ProviderResult<()>;
    fn bool_vec_insert(&self, addr: u32, index: u32, value: bool) -> ProviderResult<()>;
    fn bool_vec_delete(&self, addr: u32, index: u32) -> ProviderResult<()>;

    /// Virtual-table pointer of the polymorphic object at `addr`.
    fn read_vtable_pointer(&self, addr: u32) -> ProviderResult<u32>;
    /// Runtime class name recorded in the RTTI of the vtable at `vptr`.
    fn class_name_for_vtable(&self, vptr: u32) -> ProviderResult<String>;
    /// Vtable address for a runtime class name, 0 if the foreign process has none.
    fn vtable_for_class_name(&self, name: &str) -> ProviderResult<u32>;
}

/// Byte-level access to a foreign address space.
///
/// This is the only thing a concrete backend (process handle, dump file,
/// in-memory buffer) has to implement; [`MsvcProvider`](crate::msvc::MsvcProvider)
/// builds the full [`MemoryProvider`] contract on top of it.
pub trait RawMemory: Send + Sync {
    fn read(&self, addr: u32, length: usize) -> ProviderResult<Vec<u8>>;
    fn write(&self, addr: u32, bytes: &[u8]) -> ProviderResult<()>;
    fn is_valid(&self, addr: u32, length: u32) -> bool;
}

/// A `Vec<u8>` mapped at `base` in the foreign address space.
pub struct BufferMemory {
    base: u32,
    data: RwLock<Vec<u8>>,
}

impl BufferMemory {
    /// Zero-filled buffer of `size` bytes starting at `base`.
    pub fn new(base: u32, size: usize) -> Self {
        BufferMemory {
            base,
            data: RwLock::new(vec![0u8; size]),
        }
    }

    pub fn from_bytes(base: u32, bytes: Vec<u8>) -> Self {
        BufferMemory {
            base,
            data: RwLock::new(bytes),
        }
    }

    pub fn base(&self) -> u32 {
        self.base
    }

    /// Copy of the whole buffer.
    pub fn to_vec(&self) -> Vec<u8> {
        self.data.read().clone()
    }

    fn range(&self, addr: u32, length: usize) -> ProviderResult<std::ops::Range<usize>> {
        let size = self.data.read().len();
        let start = addr
            .checked_sub(self.base)
            .ok_or_else(|| format!("address {:#x} below buffer base {:#x}", addr, self.base))?
            as usize;
        let end = start
            .checked_add(length)
            .filter(|&end| end <= size)
            .ok_or_else(|| format!("range {:#x}+{} outside buffer", addr, length))?;
        Ok(start..end)
    }
}

impl RawMemory for BufferMemory {
    fn read(&self, addr: u32, length: usize) -> ProviderResult<Vec<u8>> {
        let range = self.range(addr, length)?;
        Ok(self.data.read()[range].to_vec())
    }

    fn write(&self, addr: u32, bytes: &[u8]) -> ProviderResult<()> {
        let range = self.range(addr, bytes.len())?;
        self.data.write()[range].copy_from_slice(bytes);
        Ok(())
    }

    fn is_valid(&self, addr: u32, length: u32) -> bool {
        self.range(addr, length as usize).is_ok()
    }
}
