//! Error types for the memstruct crate.

use thiserror::Error;

/// Errors raised while building schemas or accessing foreign memory through views.
#[derive(Debug, Error)]
pub enum MemStructError {
    #[error("Null dereference through pointer at {address:#x}")]
    NullDereference { address: u32 },

    #[error("Invalid index {index} (length {length})")]
    InvalidIndex { index: i64, length: u32 },

    #[error("Unregistered type: {0}")]
    UnregisteredType(String),

    #[error("Field not found: {field} in type {type_name}")]
    FieldNotFound { type_name: String, field: String },

    #[error("Operation '{operation}' is not supported by {kind} descriptors")]
    Unsupported {
        operation: &'static str,
        kind: &'static str,
    },

    #[error("Value mismatch: expected {expected}, found {found}")]
    ValueMismatch {
        expected: &'static str,
        found: &'static str,
    },

    #[error("Memory access error at {address:#x}: {msg}")]
    Access { address: u32, msg: String },

    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Schema file not found: {0}")]
    FileNotFound(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("XZ/LZMA decompression error: {0}")]
    Decompression(String),

    #[error("JSON parse error: {0}")]
    JsonParse(String),
}

impl MemStructError {
    /// Wrap a provider failure at `address`.
    pub fn access(address: u32, err: impl std::fmt::Display) -> Self {
        MemStructError::Access {
            address,
            msg: err.to_string(),
        }
    }

    pub(crate) fn unsupported(operation: &'static str, kind: &'static str) -> Self {
        MemStructError::Unsupported { operation, kind }
    }
}

pub type MemStructResult<T> = Result<T, MemStructError>;

/// Attach the accessed address to a provider failure.
pub(crate) trait AccessContext<T> {
    fn at(self, address: u32) -> MemStructResult<T>;
}

impl<T> AccessContext<T> for crate::provider::ProviderResult<T> {
    fn at(self, address: u32) -> MemStructResult<T> {
        self.map_err(|e| MemStructError::access(address, e))
    }
}
