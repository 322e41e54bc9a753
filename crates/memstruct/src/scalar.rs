//! Scalar codecs: integers, floats and bitfields.

use crate::descriptor::IntWidth;
use crate::error::{AccessContext, MemStructError, MemStructResult};
use crate::provider::MemoryProvider;
use crate::value::Value;

/// Decode an integer. Unsigned values are masked to their width; 64-bit
/// values are joined from two 32-bit words, low word first.
pub(crate) fn decode_number(
    provider: &dyn MemoryProvider,
    addr: u32,
    width: IntWidth,
    signed: bool,
) -> MemStructResult<Value> {
    let raw = match width {
        IntWidth::Int8 => provider.read_i8(addr).at(addr)? as i64,
        IntWidth::Int16 => provider.read_i16(addr).at(addr)? as i64,
        IntWidth::Int32 => provider.read_i32(addr).at(addr)? as i64,
        IntWidth::Int64 => {
            let high_addr = addr.wrapping_add(4);
            let low = provider.read_i32(addr).at(addr)? as u32 as u64;
            let high = provider.read_i32(high_addr).at(high_addr)? as u32 as u64;
            let v = low | (high << 32);
            return Ok(if signed {
                Value::Int(v as i64)
            } else {
                Value::UInt(v)
            });
        }
    };
    if signed {
        Ok(Value::Int(raw))
    } else {
        Ok(Value::UInt(raw as u64 & ((1u64 << width.bits()) - 1)))
    }
}

pub(crate) fn encode_number(
    provider: &dyn MemoryProvider,
    addr: u32,
    width: IntWidth,
    value: &Value,
) -> MemStructResult<()> {
    let bits = value.as_bits()?;
    match width {
        IntWidth::Int8 => provider.write_i8(addr, bits as i8).at(addr),
        IntWidth::Int16 => provider.write_i16(addr, bits as i16).at(addr),
        IntWidth::Int32 => provider.write_i32(addr, bits as i32).at(addr),
        IntWidth::Int64 => {
            let high_addr = addr.wrapping_add(4);
            provider.write_i32(addr, bits as u32 as i32).at(addr)?;
            provider
                .write_i32(high_addr, (bits >> 32) as u32 as i32)
                .at(high_addr)
        }
    }
}

pub(crate) fn decode_float(provider: &dyn MemoryProvider, addr: u32) -> MemStructResult<Value> {
    Ok(Value::Float(provider.read_f32(addr).at(addr)?))
}

pub(crate) fn encode_float(
    provider: &dyn MemoryProvider,
    addr: u32,
    value: &Value,
) -> MemStructResult<()> {
    provider.write_f32(addr, value.as_f32()?).at(addr)
}

/// Mask for a `len`-bit field; the field must fit a 32-bit word.
fn bit_mask(shift: u32, len: u32) -> MemStructResult<u32> {
    if len == 0 || len > 32 || shift > 32 - len {
        return Err(MemStructError::Schema(format!(
            "bitfield at bit {} with length {} does not fit a 32-bit word",
            shift, len
        )));
    }
    Ok(((1u64 << len) - 1) as u32)
}

/// Decode bits `[shift, shift+len)` of the word at `addr`. One-bit fields
/// decode to booleans.
pub(crate) fn decode_bitfield(
    provider: &dyn MemoryProvider,
    addr: u32,
    shift: u32,
    len: u32,
) -> MemStructResult<Value> {
    let mask = bit_mask(shift, len)?;
    let word = provider.read_i32(addr).at(addr)? as u32;
    let v = (word >> shift) & mask;
    if len == 1 {
        Ok(Value::Bool(v != 0))
    } else {
        Ok(Value::UInt(v as u64))
    }
}

/// Rewrite only bits `[shift, shift+len)` of the word at `addr`.
pub(crate) fn encode_bitfield(
    provider: &dyn MemoryProvider,
    addr: u32,
    shift: u32,
    len: u32,
    value: &Value,
) -> MemStructResult<()> {
    let mask = bit_mask(shift, len)?;
    let raw = if len == 1 {
        value.truthy() as u64
    } else {
        value.as_bits()?
    };
    let v = (raw as u32 & mask) << shift;
    let original = provider.read_i32(addr).at(addr)? as u32;
    let updated = original
        .wrapping_sub(original & (mask << shift))
        .wrapping_add(v);
    provider.write_i32(addr, updated as i32).at(addr)
}
