//! Indexing, resizing and iteration for container views.
//!
//! All containers index from 0 with negative-index wraparound. Vector lengths
//! and element addresses are re-queried from the provider on every access.

use crate::descriptor::Descriptor;
use crate::error::{AccessContext, MemStructError, MemStructResult};
use crate::value::{Item, Value};
use crate::view::{View, DF_ARRAY_LENGTH, DF_ARRAY_PTR};
use std::collections::HashSet;
use tracing::{debug, warn};

// df-flagarray: {bits: u8*, size_in_bytes: u32}
const FLAGARRAY_BITS: u32 = 0;
const FLAGARRAY_SIZE: u32 = 4;

// df-linked-list node: {item: T*, prev: node*, next: node*}
const NODE_ITEM: u32 = 0;
const NODE_NEXT: u32 = 8;
const MAX_LIST_NODES: usize = 65536;

// MSVC std::deque: {proxy, map: T**, map_size, offset, size}
const DEQUE_MAP: u32 = 4;
const DEQUE_MAP_SIZE: u32 = 8;
const DEQUE_OFFSET: u32 = 12;
const DEQUE_SIZE: u32 = 16;

fn wrap(index: i64, length: u32) -> i64 {
    if index < 0 {
        index + length as i64
    } else {
        index
    }
}

fn offset_address(base: u32, index: i64, stride: u32) -> u32 {
    (base as i64).wrapping_add(index.wrapping_mul(stride as i64)) as u32
}

/// Elements per deque block for a given element size.
fn deque_block_size(stride: u32) -> u32 {
    match stride {
        0..=1 => 16,
        2 => 8,
        3..=4 => 4,
        5..=8 => 2,
        _ => 1,
    }
}

impl<'a> View<'a> {
    /// Number of elements in a container.
    pub fn len(&self) -> MemStructResult<u32> {
        let addr = self.address();
        let provider = self.provider();
        match self.descriptor() {
            Descriptor::StaticArray { length, .. } => Ok(*length),
            Descriptor::StlVector { width, .. } => provider.vector_length(*width, addr).at(addr),
            Descriptor::StlBitVector => provider.bool_vec_length(addr).at(addr),
            Descriptor::DfArray { .. } => self.read_u32(addr.wrapping_add(DF_ARRAY_LENGTH)),
            Descriptor::DfFlagarray => {
                Ok(self.read_u32(addr.wrapping_add(FLAGARRAY_SIZE))?.saturating_mul(8))
            }
            Descriptor::StlDeque { .. } => self.read_u32(addr.wrapping_add(DEQUE_SIZE)),
            Descriptor::DfLinkedList { .. } => Ok(self.list_items()?.len() as u32),
            other => Err(MemStructError::unsupported("len", other.kind())),
        }
    }

    pub fn is_empty(&self) -> MemStructResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Read element `index`. `None` when the index is out of range, or when a
    /// pointer-array's base pointer is null.
    pub fn index(&self, index: i64) -> MemStructResult<Option<Item<'a>>> {
        if let Descriptor::PointerAry { stride, target } = self.descriptor() {
            let base = self.read_u32(self.address())?;
            if base == 0 {
                return Ok(None);
            }
            let at = offset_address(base, index, *stride);
            return self.bind(target, at)?.get().map(Some);
        }

        let length = self.len()?;
        let i = wrap(index, length);
        if i < 0 || i >= length as i64 {
            return Ok(None);
        }
        self.element(i as u32).map(Some)
    }

    /// Write element `index`.
    ///
    /// Vectors grow when `index` is at or past their length: a placeholder is
    /// inserted at `index` and then overwritten. Fixed-size containers reject
    /// out-of-range indices.
    pub fn set_index(&self, index: i64, value: &Value) -> MemStructResult<()> {
        let addr = self.address();
        let provider = self.provider();
        match self.descriptor() {
            Descriptor::PointerAry { stride, target } => {
                let base = self.read_u32(addr)?;
                if base == 0 {
                    return Err(MemStructError::NullDereference { address: addr });
                }
                self.bind(target, offset_address(base, index, *stride))?
                    .set(value)
            }
            Descriptor::StlVector { width, element } => {
                let length = self.len()?;
                let i = wrap(index, length);
                if i < 0 {
                    return Err(MemStructError::InvalidIndex { index, length });
                }
                let i = i as u32;
                if i >= length {
                    provider.vector_insert(*width, addr, i, 0).at(addr)?;
                }
                let at = provider.vector_elem_addr(*width, addr, i).at(addr)?;
                self.bind(element, at)?.set(value)
            }
            Descriptor::StlBitVector => {
                let length = self.len()?;
                let i = wrap(index, length);
                if i < 0 {
                    return Err(MemStructError::InvalidIndex { index, length });
                }
                let i = i as u32;
                if i >= length {
                    provider.bool_vec_insert(addr, i, value.truthy()).at(addr)
                } else {
                    provider.bool_vec_set(addr, i, value.truthy()).at(addr)
                }
            }
            _ => {
                let length = self.len()?;
                let i = wrap(index, length);
                if i < 0 || i >= length as i64 {
                    return Err(MemStructError::InvalidIndex { index, length });
                }
                self.set_element(i as u32, value)
            }
        }
    }

    /// Element `index`, known to be in range.
    fn element(&self, index: u32) -> MemStructResult<Item<'a>> {
        let addr = self.address();
        let provider = self.provider();
        match self.descriptor() {
            Descriptor::StlBitVector => Ok(Item::Value(Value::Bool(
                provider.bool_vec_get(addr, index).at(addr)?,
            ))),
            Descriptor::DfFlagarray => {
                let (byte_addr, bit) = self.flag_position(index)?;
                let byte = provider.read_i8(byte_addr).at(byte_addr)? as u8;
                Ok(Item::Value(Value::Bool(byte & (1 << bit) != 0)))
            }
            Descriptor::DfLinkedList { element } => {
                let items = self.list_items()?;
                self.list_item(element.as_deref(), items[index as usize])
            }
            _ => self.element_view(index)?.get(),
        }
    }

    fn set_element(&self, index: u32, value: &Value) -> MemStructResult<()> {
        let provider = self.provider();
        match self.descriptor() {
            Descriptor::DfFlagarray => {
                let (byte_addr, bit) = self.flag_position(index)?;
                let byte = provider.read_i8(byte_addr).at(byte_addr)? as u8;
                let byte = if value.truthy() {
                    byte | (1 << bit)
                } else {
                    byte & !(1 << bit)
                };
                provider.write_i8(byte_addr, byte as i8).at(byte_addr)
            }
            Descriptor::DfLinkedList { element: Some(element) } => {
                let items = self.list_items()?;
                self.bind(element, items[index as usize])?.set(value)
            }
            _ => self.element_view(index)?.set(value),
        }
    }

    /// View of an addressable element, known to be in range.
    fn element_view(&self, index: u32) -> MemStructResult<View<'a>> {
        let addr = self.address();
        let provider = self.provider();
        match self.descriptor() {
            Descriptor::StaticArray {
                stride, element, ..
            } => self.bind(element, addr.wrapping_add(index.wrapping_mul(*stride))),
            Descriptor::StlVector { width, element } => {
                let at = provider.vector_elem_addr(*width, addr, index).at(addr)?;
                self.bind(element, at)
            }
            Descriptor::DfArray { stride, element } => {
                let ptr = self.read_u32(addr.wrapping_add(DF_ARRAY_PTR))?;
                self.bind(element, ptr.wrapping_add(index.wrapping_mul(*stride)))
            }
            Descriptor::StlDeque { stride, element } => {
                let at = self.deque_element_address(*stride, index)?;
                self.bind(element, at)
            }
            other => Err(MemStructError::unsupported("element", other.kind())),
        }
    }

    /// Assign a whole sequence.
    ///
    /// Vectors are first shrunk to the new length by deleting their last
    /// element, then every index is overwritten in order.
    pub(crate) fn set_all(&self, values: &[Value]) -> MemStructResult<()> {
        if matches!(
            self.descriptor(),
            Descriptor::StlVector { .. } | Descriptor::StlBitVector
        ) {
            let target = values.len() as u32;
            let mut length = self.len()?;
            if length > target {
                debug!(
                    "Shrinking {} at {:#x} from {} to {}",
                    self.descriptor().kind(),
                    self.address(),
                    length,
                    target
                );
            }
            while length > target {
                self.delete_at(length - 1)?;
                length = self.len()?;
            }
        }
        for (i, value) in values.iter().enumerate() {
            self.set_index(i as i64, value)?;
        }
        Ok(())
    }

    /// Append to a vector.
    pub fn push(&self, value: &Value) -> MemStructResult<()> {
        match self.descriptor() {
            Descriptor::StlVector { .. } | Descriptor::StlBitVector => {
                self.set_index(self.len()? as i64, value)
            }
            other => Err(MemStructError::unsupported("push", other.kind())),
        }
    }

    /// Remove and return the last element of a vector, `None` if empty.
    ///
    /// For composite elements the returned view points at storage that has
    /// just been released by the container.
    pub fn pop(&self) -> MemStructResult<Option<Item<'a>>> {
        let length = self.len()?;
        if length == 0 {
            return Ok(None);
        }
        let item = self.element(length - 1)?;
        self.delete_at(length - 1)?;
        Ok(Some(item))
    }

    /// Insert a raw element value at `index`.
    pub fn insert_at(&self, index: u32, value: &Value) -> MemStructResult<()> {
        let addr = self.address();
        let provider = self.provider();
        match self.descriptor() {
            Descriptor::StlVector { width, .. } => provider
                .vector_insert(*width, addr, index, value.as_bits()? as i64)
                .at(addr),
            Descriptor::StlBitVector => provider
                .bool_vec_insert(addr, index, value.truthy())
                .at(addr),
            other => Err(MemStructError::unsupported("insert_at", other.kind())),
        }
    }

    pub fn delete_at(&self, index: u32) -> MemStructResult<()> {
        let addr = self.address();
        let provider = self.provider();
        match self.descriptor() {
            Descriptor::StlVector { width, .. } => {
                provider.vector_delete(*width, addr, index).at(addr)
            }
            Descriptor::StlBitVector => provider.bool_vec_delete(addr, index).at(addr),
            other => Err(MemStructError::unsupported("delete_at", other.kind())),
        }
    }

    /// Delete every element of a vector, last first.
    pub fn clear(&self) -> MemStructResult<()> {
        let mut length = self.len()?;
        while length > 0 {
            self.delete_at(length - 1)?;
            length = self.len()?;
        }
        Ok(())
    }

    /// Lazily decode elements `0..len`. Each call starts over.
    pub fn iter(&self) -> MemStructResult<Elements<'a>> {
        let nodes = match self.descriptor() {
            Descriptor::DfLinkedList { .. } => Some(self.list_items()?),
            _ => None,
        };
        let length = match &nodes {
            Some(items) => items.len() as u32,
            None => self.len()?,
        };
        Ok(Elements {
            view: *self,
            next: 0,
            length,
            nodes,
        })
    }

    fn flag_position(&self, index: u32) -> MemStructResult<(u32, u32)> {
        let bits = self.read_u32(self.address().wrapping_add(FLAGARRAY_BITS))?;
        Ok((bits.wrapping_add(index / 8), index % 8))
    }

    fn deque_element_address(&self, stride: u32, index: u32) -> MemStructResult<u32> {
        let addr = self.address();
        let map = self.read_u32(addr.wrapping_add(DEQUE_MAP))?;
        let map_size = self.read_u32(addr.wrapping_add(DEQUE_MAP_SIZE))?;
        let offset = self.read_u32(addr.wrapping_add(DEQUE_OFFSET))?;
        if map_size == 0 {
            return Err(MemStructError::access(addr, "deque has an empty block map"));
        }
        let per_block = deque_block_size(stride);
        let position = offset.wrapping_add(index);
        let block = (position / per_block) % map_size;
        let block_ptr = self.read_u32(map.wrapping_add(block.wrapping_mul(4)))?;
        Ok(block_ptr.wrapping_add((position % per_block).wrapping_mul(stride)))
    }

    /// Item pointers of a linked list, following `next` from the head node.
    /// Nodes with a null item are skipped.
    fn list_items(&self) -> MemStructResult<Vec<u32>> {
        let mut items = Vec::new();
        let mut visited = HashSet::new();
        let mut node = self.read_u32(self.address().wrapping_add(NODE_NEXT))?;
        while node != 0 {
            if !visited.insert(node) {
                debug!("Cycle detected at list node {:#x}, stopping walk", node);
                break;
            }
            if visited.len() > MAX_LIST_NODES {
                warn!(
                    "Linked list at {:#x} exceeds {} nodes, results truncated",
                    self.address(),
                    MAX_LIST_NODES
                );
                break;
            }
            let item = self.read_u32(node.wrapping_add(NODE_ITEM))?;
            if item != 0 {
                items.push(item);
            }
            node = self.read_u32(node.wrapping_add(NODE_NEXT))?;
        }
        Ok(items)
    }

    fn list_item(&self, element: Option<&'a Descriptor>, item: u32) -> MemStructResult<Item<'a>> {
        match element {
            Some(element) => self.bind(element, item)?.get(),
            None => Ok(Item::Value(Value::UInt(item as u64))),
        }
    }
}

/// Iterator over the decoded elements of a container view.
pub struct Elements<'a> {
    view: View<'a>,
    next: u32,
    length: u32,
    nodes: Option<Vec<u32>>,
}

impl<'a> Iterator for Elements<'a> {
    type Item = MemStructResult<Item<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.length {
            return None;
        }
        let index = self.next;
        self.next += 1;
        Some(match (&self.nodes, self.view.descriptor()) {
            (Some(nodes), Descriptor::DfLinkedList { element }) => self
                .view
                .list_item(element.as_deref(), nodes[index as usize]),
            _ => self.view.element(index),
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.length - self.next) as usize;
        (remaining, Some(remaining))
    }
}
