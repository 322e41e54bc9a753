//! Memory-mapped dump file layer.
//!
//! Maps a raw dump of a foreign address range so that file offset 0 appears
//! at `base` in the foreign address space. Writable layers patch the file in
//! place.

use crate::memory::error::{LayerError, LayerResult};
use memmap2::{Mmap, MmapMut, MmapOptions};
use memstruct::{ProviderResult, RawMemory};
use parking_lot::RwLock;
use std::fs::{File, OpenOptions};
use std::ops::Range;
use std::path::PathBuf;
use tracing::debug;

enum MmapState {
    ReadOnly(Mmap),
    Writable(MmapMut),
    Empty,
}

impl MmapState {
    fn as_slice(&self) -> &[u8] {
        match self {
            MmapState::ReadOnly(mmap) => mmap.as_ref(),
            MmapState::Writable(mmap) => mmap.as_ref(),
            MmapState::Empty => &[],
        }
    }
}

/// A dump file mapped at a foreign base address.
///
/// # Thread Safety
///
/// Reads share a `parking_lot::RwLock`; writes take it exclusively.
///
/// # Example
///
/// ```rust,ignore
/// let layer = MmapFileLayer::open("dump", "/tmp/heap.bin", 0x0040_0000, false)?;
/// let header = layer.read_bytes(0x0040_0000, 64)?;
/// ```
pub struct MmapFileLayer {
    name: String,
    path: PathBuf,
    base: u32,
    size: u32,
    state: RwLock<MmapState>,
}

impl MmapFileLayer {
    /// Parse a file:// URL to a path.
    fn parse_location(location: &str) -> PathBuf {
        let path_str = location.strip_prefix("file://").unwrap_or(location);
        PathBuf::from(urlencoding_decode(path_str))
    }

    fn create_mmap(path: &PathBuf, writable: bool) -> LayerResult<(MmapState, u64)> {
        let file = if writable {
            OpenOptions::new().read(true).write(true).open(path)?
        } else {
            File::open(path)?
        };

        let size = file.metadata()?.len();
        if size == 0 {
            return Ok((MmapState::Empty, 0));
        }

        let state = if writable {
            MmapState::Writable(unsafe { MmapOptions::new().map_mut(&file)? })
        } else {
            MmapState::ReadOnly(unsafe { MmapOptions::new().map(&file)? })
        };
        Ok((state, size))
    }

    /// File offsets covering `[address, address + length)`.
    fn range(&self, address: u32, length: usize) -> LayerResult<Range<usize>> {
        let start = address.checked_sub(self.base).ok_or_else(|| {
            LayerError::invalid_address(&self.name, address, "below layer base")
        })? as usize;
        start
            .checked_add(length)
            .filter(|&end| end <= self.size as usize)
            .map(|end| start..end)
            .ok_or_else(|| {
                LayerError::invalid_address(
                    &self.name,
                    address,
                    format!("{} bytes run past the end of the dump", length),
                )
            })
    }
}

impl MmapFileLayer {
    /// Open a dump file.
    ///
    /// # Arguments
    ///
    /// * `name` - The name of the layer, used in errors
    /// * `location` - file:// URL or plain filesystem path
    /// * `base` - Foreign address of the first byte of the file
    /// * `writable` - Whether writes go through to the file
    pub fn open(
        name: impl Into<String>,
        location: &str,
        base: u32,
        writable: bool,
    ) -> LayerResult<Self> {
        let name = name.into();
        let path = Self::parse_location(location);
        let (state, size) = Self::create_mmap(&path, writable)?;
        let end = u64::from(base) + size;
        if end > u64::from(u32::MAX) {
            return Err(LayerError::invalid_address(
                &name,
                base,
                format!("{} byte dump does not fit a 32-bit address space", size),
            ));
        }
        debug!(
            "Mapped {} ({} bytes) at {:#x}{}",
            path.display(),
            size,
            base,
            if writable { ", writable" } else { "" }
        );

        Ok(MmapFileLayer {
            name,
            path,
            base,
            size: size as u32,
            state: RwLock::new(state),
        })
    }

    pub fn read_bytes(&self, address: u32, length: usize) -> LayerResult<Vec<u8>> {
        let range = self.range(address, length)?;
        Ok(self.state.read().as_slice()[range].to_vec())
    }

    pub fn write_bytes(&self, address: u32, bytes: &[u8]) -> LayerResult<()> {
        let range = self.range(address, bytes.len())?;
        match &mut *self.state.write() {
            MmapState::Writable(mmap) => {
                mmap[range].copy_from_slice(bytes);
                Ok(())
            }
            _ => Err(LayerError::ReadOnly(self.name.clone())),
        }
    }

    /// Check if an address range is backed by the dump.
    pub fn is_valid(&self, address: u32, length: u32) -> bool {
        length > 0 && self.range(address, length as usize).is_ok()
    }

    /// Flush pending writes to the file.
    pub fn flush(&self) -> LayerResult<()> {
        if let MmapState::Writable(mmap) = &*self.state.read() {
            mmap.flush()?;
            debug!("Flushed {}", self.path.display());
        }
        Ok(())
    }

    pub fn base(&self) -> u32 {
        self.base
    }

    pub fn size(&self) -> u32 {
        self.size
    }
}

impl RawMemory for MmapFileLayer {
    fn read(&self, addr: u32, length: usize) -> ProviderResult<Vec<u8>> {
        Ok(self.read_bytes(addr, length)?)
    }

    fn write(&self, addr: u32, bytes: &[u8]) -> ProviderResult<()> {
        Ok(self.write_bytes(addr, bytes)?)
    }

    fn is_valid(&self, addr: u32, length: u32) -> bool {
        MmapFileLayer::is_valid(self, addr, length)
    }
}

/// Simple URL decoding for file paths.
fn urlencoding_decode(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '%' {
            let hex: String = chars.by_ref().take(2).collect();
            if hex.len() == 2 {
                if let Ok(byte) = u8::from_str_radix(&hex, 16) {
                    result.push(byte as char);
                    continue;
                }
            }
            result.push('%');
            result.push_str(&hex);
        } else {
            result.push(c);
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn dump(contents: &[u8]) -> NamedTempFile {
        let mut tmpfile = NamedTempFile::new().unwrap();
        tmpfile.write_all(contents).unwrap();
        tmpfile.flush().unwrap();
        tmpfile
    }

    #[test]
    fn test_parse_location() {
        assert_eq!(
            MmapFileLayer::parse_location("file:///tmp/test.raw"),
            PathBuf::from("/tmp/test.raw")
        );
        assert_eq!(
            MmapFileLayer::parse_location("/tmp/test.raw"),
            PathBuf::from("/tmp/test.raw")
        );
        assert_eq!(
            MmapFileLayer::parse_location("file:///tmp/test%20file.raw"),
            PathBuf::from("/tmp/test file.raw")
        );
    }

    #[test]
    fn test_read_at_base() {
        let tmpfile = dump(b"Hello, World!");
        let layer =
            MmapFileLayer::open("test", tmpfile.path().to_str().unwrap(), 0x1000, false).unwrap();

        assert_eq!(layer.read_bytes(0x1000, 5).unwrap(), b"Hello");
        assert_eq!(layer.read_bytes(0x1007, 5).unwrap(), b"World");
        assert!(layer.read_bytes(0x0fff, 1).is_err());
        assert!(layer.read_bytes(0x100a, 4).is_err());
    }

    #[test]
    fn test_is_valid() {
        let tmpfile = dump(b"0123456789");
        let layer =
            MmapFileLayer::open("test", tmpfile.path().to_str().unwrap(), 0x2000, false).unwrap();

        assert!(layer.is_valid(0x2000, 1));
        assert!(layer.is_valid(0x2000, 10));
        assert!(layer.is_valid(0x2009, 1));
        assert!(!layer.is_valid(0x200a, 1));
        assert!(!layer.is_valid(0x2000, 11));
        assert!(!layer.is_valid(0x2000, 0));
    }

    #[test]
    fn test_read_only_rejects_writes() {
        let tmpfile = dump(b"data");
        let layer =
            MmapFileLayer::open("test", tmpfile.path().to_str().unwrap(), 0, false).unwrap();
        assert!(matches!(
            layer.write_bytes(0, b"x"),
            Err(LayerError::ReadOnly(_))
        ));
    }

    #[test]
    fn test_write_through_to_file() {
        let tmpfile = dump(b"\0\0\0\0\0\0\0\0");
        let layer =
            MmapFileLayer::open("test", tmpfile.path().to_str().unwrap(), 0x4000, true).unwrap();

        let raw: &dyn RawMemory = &layer;
        raw.write(0x4004, &0xdead_beefu32.to_le_bytes()).unwrap();
        assert!(raw.write(0x4006, &[0; 4]).is_err());
        layer.flush().unwrap();

        let contents = std::fs::read(tmpfile.path()).unwrap();
        assert_eq!(&contents[4..], &0xdead_beefu32.to_le_bytes());
    }

    #[test]
    fn test_empty_dump() {
        let tmpfile = dump(b"");
        let layer =
            MmapFileLayer::open("test", tmpfile.path().to_str().unwrap(), 0x1000, false).unwrap();
        assert!(layer.read_bytes(0x1000, 1).is_err());
        assert_eq!(layer.read_bytes(0x1000, 0).unwrap(), b"");
    }
}
