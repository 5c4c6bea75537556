// Copyright 2024 RisingLight Project Authors. Licensed under Apache-2.0.

//! Segments: the storage unit of a collection.
//!
//! A segment owns an arena of vector-metadata records, the chunk records that
//! point into it, and the string heap for out-of-line payloads. Vector
//! records are linked by arena index rather than by pointer, so moving a
//! whole segment between collections is a plain move.

use std::sync::Arc;

use tracing::trace;

use crate::allocator::{BlockId, ChunkState, ColumnDataAllocator};
use crate::error::Result;
use crate::heap::StringHeap;
use crate::layout::{read_string_entry, StringEntry, ValidityMask, VALIDITY_BYTES, VECTOR_WIDTH};
use crate::types::{DataType, PhysicalType};
use crate::vector::{DataChunk, Vector};

/// Index of a vector-metadata record in a segment's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct VectorDataIndex(u32);

/// Index into a segment's child-index table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct VectorChildIndex(u32);

/// Describes one physical vector buffer: up to [`VECTOR_WIDTH`] entries
/// followed by a validity bitmap.
pub(crate) struct VectorMeta {
    pub block_id: BlockId,
    pub offset: u32,
    pub count: u32,
    /// Continuation vector within the same chunk. Only list children
    /// overflow; top-level chunk columns never set this.
    pub next_data: Option<VectorDataIndex>,
    /// First child vector of a list or struct head.
    pub child_index: Option<VectorChildIndex>,
}

/// One chunk: a row range of at most [`VECTOR_WIDTH`] rows, with one head
/// vector per top-level column.
pub(crate) struct ChunkMeta {
    pub count: u32,
    pub vector_data: Vec<VectorDataIndex>,
}

pub(crate) struct Segment {
    pub(crate) allocator: Arc<ColumnDataAllocator>,
    pub(crate) types: Vec<DataType>,
    pub(crate) count: usize,
    pub(crate) chunk_data: Vec<ChunkMeta>,
    vector_data: Vec<VectorMeta>,
    child_indices: Vec<VectorDataIndex>,
    pub(crate) heap: StringHeap,
}

impl Segment {
    pub fn new(allocator: Arc<ColumnDataAllocator>, types: Vec<DataType>) -> Self {
        Segment {
            allocator,
            types,
            count: 0,
            chunk_data: Vec::new(),
            vector_data: Vec::new(),
            child_indices: Vec::new(),
            heap: StringHeap::default(),
        }
    }

    pub fn vector_meta(&self, index: VectorDataIndex) -> &VectorMeta {
        &self.vector_data[index.0 as usize]
    }

    pub fn vector_meta_mut(&mut self, index: VectorDataIndex) -> &mut VectorMeta {
        &mut self.vector_data[index.0 as usize]
    }

    pub fn add_child_index(&mut self, index: VectorDataIndex) -> VectorChildIndex {
        self.add_child_indices(vec![index])
    }

    fn add_child_indices(&mut self, indices: Vec<VectorDataIndex>) -> VectorChildIndex {
        let start = VectorChildIndex(self.child_indices.len() as u32);
        self.child_indices.extend(indices);
        start
    }

    pub fn child_index_at(&self, index: VectorChildIndex, child: usize) -> VectorDataIndex {
        self.child_indices[index.0 as usize + child]
    }

    /// Reserves a vector buffer and registers its metadata.
    ///
    /// When `prev` is given the new vector is linked as its continuation.
    /// Struct heads get their child backbone allocated recursively;
    /// continuations reuse the head's backbone and skip it. List children
    /// are allocated lazily by the list copy.
    pub fn allocate_vector(
        &mut self,
        ty: &DataType,
        prev: Option<VectorDataIndex>,
    ) -> Result<VectorDataIndex> {
        let physical = ty.physical_type();
        let size = VECTOR_WIDTH * physical.size() + VALIDITY_BYTES;
        let (block_id, offset) = self.allocator.allocate(size)?;
        let index = VectorDataIndex(self.vector_data.len() as u32);
        self.vector_data.push(VectorMeta {
            block_id,
            offset,
            count: 0,
            next_data: None,
            child_index: None,
        });
        if let Some(prev) = prev {
            self.vector_data[prev.0 as usize].next_data = Some(index);
        }
        if physical == PhysicalType::Struct && prev.is_none() {
            let children = ty
                .struct_fields()
                .iter()
                .map(|(_, child_ty)| self.allocate_vector(child_ty, None))
                .collect::<Result<Vec<_>>>()?;
            let child_index = self.add_child_indices(children);
            self.vector_data[index.0 as usize].child_index = Some(child_index);
        }
        Ok(index)
    }

    /// Materializes a new chunk with one head vector per top-level column.
    pub fn allocate_new_chunk(&mut self) -> Result<()> {
        let types = self.types.clone();
        let mut vector_data = Vec::with_capacity(types.len());
        for ty in &types {
            vector_data.push(self.allocate_vector(ty, None)?);
        }
        trace!(chunk = self.chunk_data.len(), "allocated chunk");
        self.chunk_data.push(ChunkMeta {
            count: 0,
            vector_data,
        });
        Ok(())
    }

    pub fn chunk_count(&self) -> usize {
        self.chunk_data.len()
    }

    /// Primes a pin cache with every block the chunk references.
    pub fn initialize_chunk_state(&self, chunk_idx: usize, state: &mut ChunkState) {
        let chunk = &self.chunk_data[chunk_idx];
        for (column, head) in chunk.vector_data.iter().enumerate() {
            self.pin_vectors(state, *head, &self.types[column]);
        }
    }

    fn pin_vectors(&self, state: &mut ChunkState, head: VectorDataIndex, ty: &DataType) {
        let mut cursor = Some(head);
        while let Some(index) = cursor {
            let meta = self.vector_meta(index);
            self.allocator.pin(state, meta.block_id);
            cursor = meta.next_data;
        }
        if let Some(child_index) = self.vector_meta(head).child_index {
            match ty.physical_type() {
                PhysicalType::List => {
                    self.pin_vectors(state, self.child_index_at(child_index, 0), ty.list_child());
                }
                PhysicalType::Struct => {
                    for (child, (_, child_ty)) in ty.struct_fields().iter().enumerate() {
                        self.pin_vectors(state, self.child_index_at(child_index, child), child_ty);
                    }
                }
                _ => unreachable!("child backbone on a primitive vector"),
            }
        }
    }

    /// Reconstitutes a chunk as an owned batch of the selected columns.
    pub fn read_chunk(
        &self,
        chunk_idx: usize,
        state: &mut ChunkState,
        out: &mut DataChunk,
        column_ids: &[usize],
    ) {
        assert!(!column_ids.is_empty());
        self.initialize_chunk_state(chunk_idx, state);
        let chunk = &self.chunk_data[chunk_idx];
        out.reset();
        for (out_idx, &column) in column_ids.iter().enumerate() {
            let read = self.read_vector(
                state,
                chunk.vector_data[column],
                &self.types[column],
                out.column_mut(out_idx),
            );
            debug_assert_eq!(read, chunk.count as usize);
        }
    }

    /// Walks a vector chain, appending all its rows to `out`. Returns the
    /// number of rows read.
    fn read_vector(
        &self,
        state: &mut ChunkState,
        head: VectorDataIndex,
        ty: &DataType,
        out: &mut Vector,
    ) -> usize {
        let physical = ty.physical_type();
        let size = physical.size();
        let mut total = 0;
        let mut cursor = Some(head);
        while let Some(index) = cursor {
            let meta = self.vector_meta(index);
            let count = meta.count as usize;
            let base = meta.offset as usize;
            let block = self.allocator.pin(state, meta.block_id);
            block.with_read(|data| {
                let buffer = &data[base..base + VECTOR_WIDTH * size + VALIDITY_BYTES];
                let mask = ValidityMask::new(&buffer[VECTOR_WIDTH * size..]);
                match physical {
                    PhysicalType::Struct => {
                        for row in 0..count {
                            out.push_validity(mask.is_valid(row));
                        }
                    }
                    PhysicalType::Varchar => {
                        for row in 0..count {
                            if !mask.is_valid(row) {
                                out.push_null();
                                continue;
                            }
                            let entry = &buffer[row * size..(row + 1) * size];
                            match read_string_entry(entry) {
                                StringEntry::Inline(payload) => out.push_bytes(payload),
                                StringEntry::Heap { offset, len } => {
                                    out.push_bytes(self.heap.blob(offset, len))
                                }
                            }
                        }
                    }
                    // list entries were rewritten against the child chain at
                    // append time and are copied verbatim, like any other
                    // fixed-width payload
                    _ => out.extend_fixed(buffer, count, |row| mask.is_valid(row)),
                }
            });
            total += count;
            cursor = meta.next_data;
        }
        match physical {
            PhysicalType::List => {
                if let Some(child_index) = self.vector_meta(head).child_index {
                    let child_head = self.child_index_at(child_index, 0);
                    self.read_vector(state, child_head, ty.list_child(), &mut out.children[0]);
                }
            }
            PhysicalType::Struct => {
                if let Some(child_index) = self.vector_meta(head).child_index {
                    for (child, (_, child_ty)) in ty.struct_fields().iter().enumerate() {
                        let child_head = self.child_index_at(child_index, child);
                        self.read_vector(state, child_head, child_ty, &mut out.children[child]);
                    }
                }
            }
            _ => {}
        }
        total
    }

    /// Reads one chunk with a throwaway pin cache.
    pub fn fetch_chunk(&self, chunk_idx: usize, out: &mut DataChunk) {
        let mut state = ChunkState::default();
        let column_ids: Vec<usize> = (0..self.types.len()).collect();
        self.read_chunk(chunk_idx, &mut state, out, &column_ids);
    }

    pub fn verify(&self) {
        #[cfg(debug_assertions)]
        {
            let total: usize = self.chunk_data.iter().map(|c| c.count as usize).sum();
            assert_eq!(total, self.count, "chunk counts do not sum to segment count");
            for chunk in &self.chunk_data[..self.chunk_data.len().saturating_sub(1)] {
                assert_eq!(
                    chunk.count as usize, VECTOR_WIDTH,
                    "only the last chunk may be partially filled"
                );
            }
        }
    }
}
