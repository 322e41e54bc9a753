//! Error types for dump-backed memory layers.

use thiserror::Error;

/// Errors raised by a memory layer.
#[derive(Error, Debug)]
pub enum LayerError {
    /// An address is not backed by the layer.
    #[error("Invalid address {address:#x} in layer '{layer_name}': {message}")]
    InvalidAddress {
        layer_name: String,
        address: u32,
        message: String,
    },

    /// A write was attempted on a layer opened read-only.
    #[error("Layer '{0}' is read-only")]
    ReadOnly(String),

    /// I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl LayerError {
    pub fn invalid_address(layer_name: impl Into<String>, address: u32, msg: impl Into<String>) -> Self {
        LayerError::InvalidAddress {
            layer_name: layer_name.into(),
            address,
            message: msg.into(),
        }
    }
}

pub type LayerResult<T> = Result<T, LayerError>;
