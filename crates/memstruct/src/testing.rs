//! Test support: a provider wrapper that records which primitives were called.

use crate::provider::{ElementWidth, MemoryProvider, ProviderResult};
use parking_lot::Mutex;

pub(crate) struct Recorder<P> {
    inner: P,
    calls: Mutex<Vec<&'static str>>,
}

impl<P: MemoryProvider> Recorder<P> {
    pub(crate) fn new(inner: P) -> Self {
        Recorder {
            inner,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn inner(&self) -> &P {
        &self.inner
    }

    fn log(&self, call: &'static str) {
        self.calls.lock().push(call);
    }

    pub(crate) fn count(&self, call: &str) -> usize {
        self.calls.lock().iter().filter(|&&c| c == call).count()
    }

    /// Calls so far, filtered to the given names, then forgotten.
    pub(crate) fn take(&self, names: &[&str]) -> Vec<&'static str> {
        let mut calls = self.calls.lock();
        let out = calls.iter().copied().filter(|c| names.contains(c)).collect();
        calls.clear();
        out
    }
}

impl<P: MemoryProvider> MemoryProvider for Recorder<P> {
    fn read_i8(&self, addr: u32) -> ProviderResult<i8> {
        self.log("read_i8");
        self.inner.read_i8(addr)
    }

    fn read_i16(&self, addr: u32) -> ProviderResult<i16> {
        self.log("read_i16");
        self.inner.read_i16(addr)
    }

    fn read_i32(&self, addr: u32) -> ProviderResult<i32> {
        self.log("read_i32");
        self.inner.read_i32(addr)
    }

    fn write_i8(&self, addr: u32, value: i8) -> ProviderResult<()> {
        self.log("write_i8");
        self.inner.write_i8(addr, value)
    }

    fn write_i16(&self, addr: u32, value: i16) -> ProviderResult<()> {
        self.log("write_i16");
        self.inner.write_i16(addr, value)
    }

    fn write_i32(&self, addr: u32, value: i32) -> ProviderResult<()> {
        self.log("write_i32");
        self.inner.write_i32(addr, value)
    }

    fn read_f32(&self, addr: u32) -> ProviderResult<f32> {
        self.log("read_f32");
        self.inner.read_f32(addr)
    }

    fn write_f32(&self, addr: u32, value: f32) -> ProviderResult<()> {
        self.log("write_f32");
        self.inner.write_f32(addr, value)
    }

    fn read_bytes(&self, addr: u32, length: usize) -> ProviderResult<Vec<u8>> {
        self.log("read_bytes");
        self.inner.read_bytes(addr, length)
    }

    fn write_bytes(&self, addr: u32, bytes: &[u8]) -> ProviderResult<()> {
        self.log("write_bytes");
        self.inner.write_bytes(addr, bytes)
    }

    fn read_dyn_string(&self, addr: u32) -> ProviderResult<Vec<u8>> {
        self.log("read_dyn_string");
        self.inner.read_dyn_string(addr)
    }

    fn write_dyn_string(&self, addr: u32, bytes: &[u8]) -> ProviderResult<()> {
        self.log("write_dyn_string");
        self.inner.write_dyn_string(addr, bytes)
    }

    fn vector_length(&self, width: ElementWidth, addr: u32) -> ProviderResult<u32> {
        self.log("vector_length");
        self.inner.vector_length(width, addr)
    }

    fn vector_elem_addr(&self, width: ElementWidth, addr: u32, index: u32) -> ProviderResult<u32> {
        self.log("vector_elem_addr");
        self.inner.vector_elem_addr(width, addr, index)
    }

    fn vector_insert(
        &self,
        width: ElementWidth,
        addr: u32,
        index: u32,
        value: i64,
    ) -> ProviderResult<()> {
        self.log("vector_insert");
        self.inner.vector_insert(width, addr, index, value)
    }

    fn vector_delete(&self, width: ElementWidth, addr: u32, index: u32) -> ProviderResult<()> {
        self.log("vector_delete");
        self.inner.vector_delete(width, addr, index)
    }

    fn bool_vec_length(&self, addr: u32) -> ProviderResult<u32> {
        self.log("bool_vec_length");
        self.inner.bool_vec_length(addr)
    }

    fn bool_vec_get(&self, addr: u32, index: u32) -> ProviderResult<bool> {
        self.log("bool_vec_get");
        self.inner.bool_vec_get(addr, index)
    }

    fn bool_vec_set(&self, addr: u32, index: u32, value: bool) -> ProviderResult<()> {
        self.log("bool_vec_set");
        self.inner.bool_vec_set(addr, index, value)
    }

    fn bool_vec_insert(&self, addr: u32, index: u32, value: bool) -> ProviderResult<()> {
        self.log("bool_vec_insert");
        self.inner.bool_vec_insert(addr, index, value)
    }

    fn bool_vec_delete(&self, addr: u32, index: u32) -> ProviderResult<()> {
        self.log("bool_vec_delete");
        self.inner.bool_vec_delete(addr, index)
    }

    fn read_vtable_pointer(&self, addr: u32) -> ProviderResult<u32> {
        self.log("read_vtable_pointer");
        self.inner.read_vtable_pointer(addr)
    }

    fn class_name_for_vtable(&self, vptr: u32) -> ProviderResult<String> {
        self.log("class_name_for_vtable");
        self.inner.class_name_for_vtable(vptr)
    }

    fn vtable_for_class_name(&self, name: &str) -> ProviderResult<u32> {
        self.log("vtable_for_class_name");
        self.inner.vtable_for_class_name(name)
    }
}
