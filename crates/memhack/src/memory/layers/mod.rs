//! Layer implementations backing a [`memstruct::RawMemory`].

pub mod mmap_file;

pub use mmap_file::MmapFileLayer;
