//! [`MemoryProvider`] for 32-bit MSVC (2010-era) container layouts.
//!
//! Container primitives are implemented purely with byte reads and writes, so
//! the provider works against any [`RawMemory`]: a live process handle, a dump
//! file or an in-memory buffer. Nothing here can allocate in the foreign
//! address space, so growing a container past its capacity is an error.
//!
//! Container headers come from foreign memory and may be garbage when a view
//! is bound at the wrong address. Header pointers are checked before any
//! arithmetic on them, and a bad header is reported as an error.

use crate::provider::{ElementWidth, MemoryProvider, ProviderError, ProviderResult, RawMemory};
use std::collections::HashMap;

// std::vector<T>: three pointers.
const VEC_FIRST: u32 = 0;
const VEC_LAST: u32 = 4;
const VEC_END: u32 = 8;

// std::vector<bool>: a vector<unsigned int> followed by the bit count.
const BITVEC_SIZE: u32 = 12;

// std::string: 16-byte buffer/pointer union, then size and capacity.
const STR_SSO_CAPACITY: u32 = 16;
const STR_SIZE: u32 = 16;
const STR_CAPACITY: u32 = 20;

// RTTI: vptr[-1] is the complete object locator, whose type descriptor at +0xC
// holds the decorated name at +0x8 (".?AVname@@"); +0xC skips ".?AV".
const COL_OFFSET: u32 = 4;
const COL_TYPE_DESCRIPTOR: u32 = 0xC;
const TYPE_DESCRIPTOR_NAME: u32 = 0xC;
const MAX_CLASS_NAME: usize = 256;

/// MSVC x86 ABI on top of byte-level memory access.
pub struct MsvcProvider<M> {
    memory: M,
    vtables: HashMap<String, u32>,
}

impl<M: RawMemory> MsvcProvider<M> {
    pub fn new(memory: M) -> Self {
        MsvcProvider {
            memory,
            vtables: HashMap::new(),
        }
    }

    /// Known vtable addresses, keyed by runtime class name. Used to answer
    /// [`MemoryProvider::vtable_for_class_name`].
    pub fn with_vtables(mut self, vtables: HashMap<String, u32>) -> Self {
        self.vtables = vtables;
        self
    }

    pub fn memory(&self) -> &M {
        &self.memory
    }

    /// Read exactly `length` bytes; a short read from the backend is an error.
    fn read_exact(&self, addr: u32, length: usize) -> ProviderResult<Vec<u8>> {
        let bytes = self.memory.read(addr, length)?;
        if bytes.len() != length {
            return Err(format!(
                "short read at {:#x}: got {} of {} bytes",
                addr,
                bytes.len(),
                length
            )
            .into());
        }
        Ok(bytes)
    }

    fn read_array<const N: usize>(&self, addr: u32) -> ProviderResult<[u8; N]> {
        let bytes = self.read_exact(addr, N)?;
        bytes.as_slice().try_into().map_err(|_| {
            ProviderError::from(format!("short read at {:#x}: expected {} bytes", addr, N))
        })
    }

    fn read_u32(&self, addr: u32) -> ProviderResult<u32> {
        Ok(u32::from_le_bytes(self.read_array(addr)?))
    }

    fn write_u32(&self, addr: u32, value: u32) -> ProviderResult<()> {
        self.memory.write(addr, &value.to_le_bytes())
    }

    /// Fail before a multi-step update if any byte of the range is unmapped.
    fn ensure_mapped(&self, addr: u32, length: u32) -> ProviderResult<()> {
        if length == 0 || self.memory.is_valid(addr, length) {
            Ok(())
        } else {
            Err(format!("range {:#x}+{} is not mapped", addr, length).into())
        }
    }

    fn read_cstring(&self, addr: u32, max_length: usize) -> ProviderResult<Vec<u8>> {
        let mut out = Vec::new();
        for i in 0..max_length as u32 {
            let [byte] = self.read_array::<1>(addr.wrapping_add(i))?;
            if byte == 0 {
                break;
            }
            out.push(byte);
        }
        Ok(out)
    }

    /// (first, last, end) pointers of a std::vector, with `first <= last <= end`.
    fn vector_bounds(&self, addr: u32) -> ProviderResult<(u32, u32, u32)> {
        let first = self.read_u32(addr.wrapping_add(VEC_FIRST))?;
        let last = self.read_u32(addr.wrapping_add(VEC_LAST))?;
        let end = self.read_u32(addr.wrapping_add(VEC_END))?;
        if first > last || last > end {
            return Err(format!(
                "corrupt vector header at {:#x}: first {:#x}, last {:#x}, end {:#x}",
                addr, first, last, end
            )
            .into());
        }
        Ok((first, last, end))
    }

    fn read_bits(&self, addr: u32) -> ProviderResult<Vec<bool>> {
        let count = self.read_u32(addr.wrapping_add(BITVEC_SIZE))?;
        let first = self.read_u32(addr.wrapping_add(VEC_FIRST))?;
        let words = count.div_ceil(32) as usize;
        let raw = self.read_exact(first, words * 4)?;
        Ok((0..count as usize)
            .map(|i| raw[i / 8] & (1 << (i % 8)) != 0)
            .collect())
    }

    fn write_bits(&self, addr: u32, bits: &[bool]) -> ProviderResult<()> {
        let (first, _, end) = self.vector_bounds(addr)?;
        let count = u32::try_from(bits.len())
            .map_err(|_| format!("vector<bool> at {:#x}: {} bits overflow", addr, bits.len()))?;
        let bytes = count.div_ceil(32) * 4;
        if bytes > end - first {
            return Err(format!(
                "vector<bool> at {:#x} needs {} words, capacity is {}",
                addr,
                bytes / 4,
                (end - first) / 4
            )
            .into());
        }
        self.ensure_mapped(first, bytes)?;
        let mut raw = vec![0u8; bytes as usize];
        for (i, &bit) in bits.iter().enumerate() {
            if bit {
                raw[i / 8] |= 1 << (i % 8);
            }
        }
        self.memory.write(first, &raw)?;
        self.write_u32(addr.wrapping_add(VEC_LAST), first + bytes)?;
        self.write_u32(addr.wrapping_add(BITVEC_SIZE), count)
    }

    fn string_data(&self, addr: u32) -> ProviderResult<(u32, u32, u32)> {
        let size = self.read_u32(addr.wrapping_add(STR_SIZE))?;
        let capacity = self.read_u32(addr.wrapping_add(STR_CAPACITY))?;
        let data = if capacity >= STR_SSO_CAPACITY {
            self.read_u32(addr)?
        } else {
            addr
        };
        Ok((data, size, capacity))
    }
}

impl<M: RawMemory> MemoryProvider for MsvcProvider<M> {
    fn read_i8(&self, addr: u32) -> ProviderResult<i8> {
        Ok(i8::from_le_bytes(self.read_array(addr)?))
    }

    fn read_i16(&self, addr: u32) -> ProviderResult<i16> {
        Ok(i16::from_le_bytes(self.read_array(addr)?))
    }

    fn read_i32(&self, addr: u32) -> ProviderResult<i32> {
        Ok(self.read_u32(addr)? as i32)
    }

    fn write_i8(&self, addr: u32, value: i8) -> ProviderResult<()> {
        self.memory.write(addr, &value.to_le_bytes())
    }

    fn write_i16(&self, addr: u32, value: i16) -> ProviderResult<()> {
        self.memory.write(addr, &value.to_le_bytes())
    }

    fn write_i32(&self, addr: u32, value: i32) -> ProviderResult<()> {
        self.memory.write(addr, &value.to_le_bytes())
    }

    fn read_f32(&self, addr: u32) -> ProviderResult<f32> {
        Ok(f32::from_bits(self.read_u32(addr)?))
    }

    fn write_f32(&self, addr: u32, value: f32) -> ProviderResult<()> {
        self.write_u32(addr, value.to_bits())
    }

    fn read_bytes(&self, addr: u32, length: usize) -> ProviderResult<Vec<u8>> {
        self.read_exact(addr, length)
    }

    fn write_bytes(&self, addr: u32, bytes: &[u8]) -> ProviderResult<()> {
        self.memory.write(addr, bytes)
    }

    fn read_dyn_string(&self, addr: u32) -> ProviderResult<Vec<u8>> {
        let (data, size, _) = self.string_data(addr)?;
        self.read_exact(data, size as usize)
    }

    fn write_dyn_string(&self, addr: u32, bytes: &[u8]) -> ProviderResult<()> {
        let (data, _, capacity) = self.string_data(addr)?;
        if bytes.len() as u64 > u64::from(capacity) {
            return Err(format!(
                "string at {:#x}: {} bytes exceed capacity {}",
                addr,
                bytes.len(),
                capacity
            )
            .into());
        }
        let mut buf = bytes.to_vec();
        buf.push(0);
        self.memory.write(data, &buf)?;
        self.write_u32(addr.wrapping_add(STR_SIZE), bytes.len() as u32)
    }

    fn vector_length(&self, width: ElementWidth, addr: u32) -> ProviderResult<u32> {
        let (first, last, _) = self.vector_bounds(addr)?;
        Ok((last - first) / width.bytes())
    }

    fn vector_elem_addr(&self, width: ElementWidth, addr: u32, index: u32) -> ProviderResult<u32> {
        let first = self.read_u32(addr.wrapping_add(VEC_FIRST))?;
        Ok(first.wrapping_add(index.wrapping_mul(width.bytes())))
    }

    fn vector_insert(
        &self,
        width: ElementWidth,
        addr: u32,
        index: u32,
        value: i64,
    ) -> ProviderResult<()> {
        let w = width.bytes();
        let (first, last, end) = self.vector_bounds(addr)?;
        let length = (last - first) / w;
        if index > length {
            return Err(format!("vector at {:#x}: insert at {} past length {}", addr, index, length).into());
        }
        if end - last < w {
            return Err(format!("vector at {:#x}: capacity exhausted", addr).into());
        }
        // index <= length, so first <= at <= last and at + w <= end.
        let at = first + index * w;
        self.ensure_mapped(at, last - at + w)?;
        let tail = self.read_exact(at, (last - at) as usize)?;
        self.memory.write(at + w, &tail)?;
        self.memory.write(at, &value.to_le_bytes()[..w as usize])?;
        self.write_u32(addr.wrapping_add(VEC_LAST), last + w)
    }

    fn vector_delete(&self, width: ElementWidth, addr: u32, index: u32) -> ProviderResult<()> {
        let w = width.bytes();
        let (first, last, _) = self.vector_bounds(addr)?;
        let length = (last - first) / w;
        if index >= length {
            return Err(format!("vector at {:#x}: delete at {} past length {}", addr, index, length).into());
        }
        // index < length, so at + w <= last.
        let at = first + index * w;
        self.ensure_mapped(at, last - at)?;
        let tail = self.read_exact(at + w, (last - at - w) as usize)?;
        self.memory.write(at, &tail)?;
        self.write_u32(addr.wrapping_add(VEC_LAST), last - w)
    }

    fn bool_vec_length(&self, addr: u32) -> ProviderResult<u32> {
        self.read_u32(addr.wrapping_add(BITVEC_SIZE))
    }

    fn bool_vec_get(&self, addr: u32, index: u32) -> ProviderResult<bool> {
        let count = self.read_u32(addr.wrapping_add(BITVEC_SIZE))?;
        if index >= count {
            return Err(format!("vector<bool> at {:#x}: index {} past length {}", addr, index, count).into());
        }
        let first = self.read_u32(addr.wrapping_add(VEC_FIRST))?;
        let word = self.read_u32(first.wrapping_add((index / 32) * 4))?;
        Ok(word & (1 << (index % 32)) != 0)
    }

    fn bool_vec_set(&self, addr: u32, index: u32, value: bool) -> ProviderResult<()> {
        let count = self.read_u32(addr.wrapping_add(BITVEC_SIZE))?;
        if index >= count {
            return Err(format!("vector<bool> at {:#x}: index {} past length {}", addr, index, count).into());
        }
        let word_addr = self
            .read_u32(addr.wrapping_add(VEC_FIRST))?
            .wrapping_add((index / 32) * 4);
        let word = self.read_u32(word_addr)?;
        let mask = 1 << (index % 32);
        self.write_u32(word_addr, if value { word | mask } else { word & !mask })
    }

    fn bool_vec_insert(&self, addr: u32, index: u32, value: bool) -> ProviderResult<()> {
        let mut bits = self.read_bits(addr)?;
        if index as usize > bits.len() {
            return Err(format!("vector<bool> at {:#x}: insert at {} past length {}", addr, index, bits.len()).into());
        }
        bits.insert(index as usize, value);
        self.write_bits(addr, &bits)
    }

    fn bool_vec_delete(&self, addr: u32, index: u32) -> ProviderResult<()> {
        let mut bits = self.read_bits(addr)?;
        if index as usize >= bits.len() {
            return Err(format!("vector<bool> at {:#x}: delete at {} past length {}", addr, index, bits.len()).into());
        }
        bits.remove(index as usize);
        self.write_bits(addr, &bits)
    }

    fn read_vtable_pointer(&self, addr: u32) -> ProviderResult<u32> {
        self.read_u32(addr)
    }

    fn class_name_for_vtable(&self, vptr: u32) -> ProviderResult<String> {
        let locator = self.read_u32(vptr.wrapping_sub(COL_OFFSET))?;
        let type_descriptor = self.read_u32(locator.wrapping_add(COL_TYPE_DESCRIPTOR))?;
        let raw = self.read_cstring(
            type_descriptor.wrapping_add(TYPE_DESCRIPTOR_NAME),
            MAX_CLASS_NAME,
        )?;
        let raw = raw.strip_suffix(b"@@").unwrap_or(&raw);
        Ok(String::from_utf8_lossy(raw).into_owned())
    }

    fn vtable_for_class_name(&self, name: &str) -> ProviderResult<u32> {
        Ok(self.vtables.get(name).copied().unwrap_or(0))
    }
}
