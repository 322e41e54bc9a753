//! Command-line interface definitions.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "memhack", about = "Inspect and patch memory dumps through a schema", version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// Schema file (.json or .json.xz)
    #[arg(short, long)]
    pub schema: PathBuf,

    /// Raw dump of the foreign address range
    #[arg(short, long)]
    pub dump: String,

    /// Foreign address of the first byte of the dump
    #[arg(short, long, default_value = "0", value_parser = parse_address)]
    pub base: u32,

    /// Added to every global and vtable address of the schema
    #[arg(long, default_value = "0", allow_hyphen_values = true, value_parser = parse_delta)]
    pub rebase: i64,

    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print a global, or a type at an address, as JSON
    Show {
        /// `symbol` or `type@address`, optionally followed by `.field.0.field`
        target: String,

        /// Levels of pointers to follow
        #[arg(long, default_value_t = 1)]
        depth: usize,
    },
    /// Write a JSON value into a field or element
    Set {
        /// `symbol` or `type@address`
        target: String,

        /// Dotted path below the target; numeric parts index containers
        path: String,

        /// New value as JSON (numbers, booleans, strings, arrays, objects)
        value: String,
    },
    /// List the types and globals the schema defines
    Types,
}

/// Decimal or `0x`-prefixed hexadecimal address.
pub fn parse_address(s: &str) -> Result<u32, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(&hex.replace('_', ""), 16),
        None => s.replace('_', "").parse(),
    };
    parsed.map_err(|e| format!("invalid address '{}': {}", s, e))
}

/// Signed address delta, e.g. `-0x1000`.
pub fn parse_delta(s: &str) -> Result<i64, String> {
    let (negative, magnitude) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s),
    };
    let value = i64::from(parse_address(magnitude)?);
    Ok(if negative { -value } else { value })
}
