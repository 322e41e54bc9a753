//! Schema file loader: plain JSON or `.json.xz` compressed.

use crate::error::{MemStructError, MemStructResult};
use crate::schema::Schema;
use crate::types::SchemaFile;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use tracing::info;
use xz2::read::XzDecoder;

/// Load a schema from disk. Files ending in `.xz` are decompressed first.
pub fn parse_schema_file(path: impl AsRef<Path>) -> MemStructResult<Schema> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(MemStructError::FileNotFound(path.display().to_string()));
    }

    let file = File::open(path)
        .map_err(|e| MemStructError::Io(format!("opening {}: {}", path.display(), e)))?;
    let mut reader = BufReader::new(file);
    let mut buf = Vec::new();
    if path.to_string_lossy().to_lowercase().ends_with(".xz") {
        XzDecoder::new(reader)
            .read_to_end(&mut buf)
            .map_err(|e| MemStructError::Decompression(format!("{}: {}", path.display(), e)))?;
    } else {
        reader
            .read_to_end(&mut buf)
            .map_err(|e| MemStructError::Io(format!("reading {}: {}", path.display(), e)))?;
    }

    let schema = parse_schema_bytes(&buf)?;
    info!(
        "Loaded schema from {} ({} types)",
        path.display(),
        schema.type_names().count()
    );
    Ok(schema)
}

/// Parse an already decompressed schema.
pub fn parse_schema_bytes(json_bytes: &[u8]) -> MemStructResult<Schema> {
    let file: SchemaFile = serde_json::from_slice(json_bytes)
        .map_err(|e| MemStructError::JsonParse(e.to_string()))?;
    Schema::from_file(file)
}

pub fn parse_schema_str(json_str: &str) -> MemStructResult<Schema> {
    let file: SchemaFile =
        serde_json::from_str(json_str).map_err(|e| MemStructError::JsonParse(e.to_string()))?;
    Schema::from_file(file)
}
