// Copyright 2024 RisingLight Project Authors. Licensed under Apache-2.0.

//! Type-directed copy machinery.
//!
//! A [`CopyFunction`] is a tree of copy strategies shaped like the column
//! type, built once per schema. Every strategy shares one contract: fill the
//! current destination vector up to [`VECTOR_WIDTH`] rows, initialize its
//! validity bitmap to all-valid on first touch, clear bits for null source
//! rows, and chain a continuation vector when rows remain.

use crate::allocator::ChunkState;
use crate::error::{Error, Result};
use crate::layout::{
    read_list_entry, read_string_entry, write_list_entry, write_string_entry, StringEntry,
    ValidityMaskMut, ENTRY_SIZE, STRING_INLINE_LENGTH, VALIDITY_BYTES, VECTOR_WIDTH,
};
use crate::segment::{Segment, VectorDataIndex};
use crate::types::{DataType, PhysicalType};
use crate::vector::{UnifiedFormat, Vector};

#[derive(Debug)]
enum CopyStrategy {
    FixedWidth { size: usize },
    Varchar,
    List,
    Struct,
}

/// Copy dispatcher for one column, with child dispatchers for nested types.
pub(crate) struct CopyFunction {
    strategy: CopyStrategy,
    children: Vec<CopyFunction>,
}

impl CopyFunction {
    pub fn for_type(ty: &DataType) -> CopyFunction {
        match ty.physical_type() {
            PhysicalType::Varchar => CopyFunction {
                strategy: CopyStrategy::Varchar,
                children: Vec::new(),
            },
            PhysicalType::List => CopyFunction {
                strategy: CopyStrategy::List,
                children: vec![CopyFunction::for_type(ty.list_child())],
            },
            PhysicalType::Struct => CopyFunction {
                strategy: CopyStrategy::Struct,
                children: ty
                    .struct_fields()
                    .iter()
                    .map(|(_, child_ty)| CopyFunction::for_type(child_ty))
                    .collect(),
            },
            physical => CopyFunction {
                strategy: CopyStrategy::FixedWidth {
                    size: physical.size(),
                },
                children: Vec::new(),
            },
        }
    }

    /// Appends `count` rows starting at `offset` from the canonicalized
    /// source into the vector chain headed at `index`.
    pub fn copy(
        &self,
        segment: &mut Segment,
        state: &mut ChunkState,
        index: VectorDataIndex,
        source: &UnifiedFormat<'_>,
        source_vector: &Vector,
        offset: usize,
        count: usize,
    ) -> Result<()> {
        let ty = source_vector.data_type();
        match &self.strategy {
            CopyStrategy::FixedWidth { size } => copy_entries(
                segment,
                state,
                index,
                source,
                ty,
                offset,
                count,
                *size,
                EntryOp::Fixed,
            ),
            CopyStrategy::Varchar => copy_entries(
                segment,
                state,
                index,
                source,
                ty,
                offset,
                count,
                ENTRY_SIZE,
                EntryOp::String,
            ),
            CopyStrategy::List => {
                self.copy_list(segment, state, index, source, source_vector, offset, count)
            }
            CopyStrategy::Struct => {
                self.copy_struct(segment, state, index, source, source_vector, offset, count)
            }
        }
    }

    fn copy_list(
        &self,
        segment: &mut Segment,
        state: &mut ChunkState,
        index: VectorDataIndex,
        source: &UnifiedFormat<'_>,
        source_vector: &Vector,
        offset: usize,
        count: usize,
    ) -> Result<()> {
        let child_vector = source_vector.list_child();
        let child_count = child_vector.len();
        let child_source = child_vector.to_unified();

        // establish the child backbone on first touch
        let child_head = match segment.vector_meta(index).child_index {
            Some(child_index) => segment.child_index_at(child_index, 0),
            None => {
                let child_head = segment.allocate_vector(child_vector.data_type(), None)?;
                let child_index = segment.add_child_index(child_head);
                segment.vector_meta_mut(index).child_index = Some(child_index);
                child_head
            }
        };

        // where the new child rows will land: the current length of the chain
        let mut current_list_size = 0u64;
        let mut cursor = Some(child_head);
        while let Some(child) = cursor {
            let meta = segment.vector_meta(child);
            current_list_size += meta.count as u64;
            cursor = meta.next_data;
        }

        // append the full source child array at the tail of the chain; the
        // entries below only reference the slice they need
        self.children[0].copy(
            segment,
            state,
            child_head,
            &child_source,
            child_vector,
            0,
            child_count,
        )?;

        copy_entries(
            segment,
            state,
            index,
            source,
            source_vector.data_type(),
            offset,
            count,
            ENTRY_SIZE,
            EntryOp::ListEntry {
                shift: current_list_size,
            },
        )
    }

    fn copy_struct(
        &self,
        segment: &mut Segment,
        state: &mut ChunkState,
        index: VectorDataIndex,
        source: &UnifiedFormat<'_>,
        source_vector: &Vector,
        offset: usize,
        count: usize,
    ) -> Result<()> {
        // the struct vector itself carries only validity
        copy_entries(
            segment,
            state,
            index,
            source,
            source_vector.data_type(),
            offset,
            count,
            0,
            EntryOp::ValidityOnly,
        )?;

        let child_index = segment
            .vector_meta(index)
            .child_index
            .expect("struct head without child backbone");
        for (child, (function, child_vector)) in self
            .children
            .iter()
            .zip(source_vector.struct_children())
            .enumerate()
        {
            let child_head = segment.child_index_at(child_index, child);
            let child_source = child_vector.to_unified();
            function.copy(
                segment,
                state,
                child_head,
                &child_source,
                child_vector,
                offset,
                count,
            )?;
        }
        Ok(())
    }
}

#[derive(Clone, Copy)]
enum EntryOp {
    /// Copy `type_size` bytes verbatim.
    Fixed,
    /// Re-encode string entries, spilling long payloads to the segment heap.
    String,
    /// Copy list entries, shifting offsets past the existing child rows.
    ListEntry { shift: u64 },
    /// Struct parents: no payload.
    ValidityOnly,
}

/// The shared chained-vector copy loop.
///
/// Fills the vector at `index` up to [`VECTOR_WIDTH`] rows and continues into
/// `next_data`, allocating continuation vectors as needed. A single call may
/// span multiple linked vectors; only list children actually do.
#[allow(clippy::too_many_arguments)]
fn copy_entries(
    segment: &mut Segment,
    state: &mut ChunkState,
    mut index: VectorDataIndex,
    source: &UnifiedFormat<'_>,
    ty: &DataType,
    mut offset: usize,
    count: usize,
    type_size: usize,
    op: EntryOp,
) -> Result<()> {
    let allocator = segment.allocator.clone();
    let mut remaining = count;
    loop {
        let (block_id, block_offset, dest_count) = {
            let meta = segment.vector_meta(index);
            (meta.block_id, meta.offset as usize, meta.count as usize)
        };
        let append = remaining.min(VECTOR_WIDTH - dest_count);
        if append > 0 {
            // stage entries first: heap spills borrow the segment mutably,
            // the block write below must not
            let mut staged = vec![0u8; append * type_size];
            let mut invalid = Vec::new();
            for i in 0..append {
                let src_idx = source.index(offset + i);
                if !source.is_valid(src_idx) {
                    invalid.push(dest_count + i);
                    continue;
                }
                let dst = &mut staged[i * type_size..(i + 1) * type_size];
                match op {
                    EntryOp::Fixed => dst.copy_from_slice(
                        &source.data[src_idx * type_size..(src_idx + 1) * type_size],
                    ),
                    EntryOp::String => {
                        let entry = &source.data[src_idx * ENTRY_SIZE..(src_idx + 1) * ENTRY_SIZE];
                        let payload = match read_string_entry(entry) {
                            StringEntry::Inline(payload) => payload,
                            StringEntry::Heap { offset, len } => {
                                &source.heap[offset as usize..offset as usize + len]
                            }
                        };
                        if payload.len() <= STRING_INLINE_LENGTH {
                            write_string_entry(dst, payload.len(), payload, 0);
                        } else {
                            let heap_offset = segment.heap.add_blob(payload);
                            write_string_entry(dst, payload.len(), &[], heap_offset);
                        }
                    }
                    EntryOp::ListEntry { shift } => {
                        let entry = &source.data[src_idx * ENTRY_SIZE..(src_idx + 1) * ENTRY_SIZE];
                        let (entry_offset, entry_len) = read_list_entry(entry);
                        let shifted = entry_offset
                            .checked_add(shift)
                            .ok_or_else(|| Error::internal("list offset overflow"))?;
                        write_list_entry(dst, shifted, entry_len);
                    }
                    EntryOp::ValidityOnly => {}
                }
            }
            let block = allocator.pin(state, block_id);
            block.with_write(|data| {
                let buffer =
                    &mut data[block_offset..block_offset + VECTOR_WIDTH * type_size + VALIDITY_BYTES];
                buffer[dest_count * type_size..dest_count * type_size + staged.len()]
                    .copy_from_slice(&staged);
                let mut mask = ValidityMaskMut::new(&mut buffer[VECTOR_WIDTH * type_size..]);
                if dest_count == 0 {
                    // first touch: the buffer is uninitialized
                    mask.set_all_valid();
                }
                for &row in &invalid {
                    mask.set_invalid(row);
                }
            });
            segment.vector_meta_mut(index).count += append as u32;
        }
        remaining -= append;
        offset += append;
        if remaining == 0 {
            return Ok(());
        }
        if segment.vector_meta(index).next_data.is_none() {
            segment.allocate_vector(ty, Some(index))?;
        }
        index = segment
            .vector_meta(index)
            .next_data
            .expect("continuation vector was just linked");
    }
}
