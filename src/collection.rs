// Copyright 2024 RisingLight Project Authors. Licensed under Apache-2.0.

//! The collection: an append-once, scan-many columnar buffer.

use std::sync::Arc;

use tracing::debug;

use crate::allocator::{ChunkState, ColumnDataAllocator};
use crate::copy::CopyFunction;
use crate::error::{Error, Result};
use crate::layout::VECTOR_WIDTH;
use crate::segment::Segment;
use crate::types::DataType;
use crate::vector::{DataChunk, UnifiedFormat, Vector};

/// Accumulates typed batches and re-emits them for sequential or parallel
/// scans.
///
/// Rows are appended into segments of fixed-width chunks; nested and
/// variable-length columns are stored with explicit heap and child-vector
/// ownership. Appending is single-writer (`&mut self`); scanning is shared.
pub struct ColumnDataCollection {
    types: Vec<DataType>,
    count: usize,
    finished_append: bool,
    allocator: Arc<ColumnDataAllocator>,
    pub(crate) segments: Vec<Segment>,
    copy_functions: Vec<CopyFunction>,
}

/// State of an in-progress append: the writer's pin cache. Obtained from
/// [`ColumnDataCollection::init_append`].
pub struct ColumnDataAppendState {
    pub(crate) current_chunk_state: ChunkState,
}

impl ColumnDataCollection {
    pub fn new(types: Vec<DataType>) -> Self {
        Self::with_allocator(Arc::new(ColumnDataAllocator::new()), types)
    }

    pub fn with_allocator(allocator: Arc<ColumnDataAllocator>, types: Vec<DataType>) -> Self {
        assert!(!types.is_empty(), "a collection needs at least one column");
        let copy_functions = types.iter().map(CopyFunction::for_type).collect();
        ColumnDataCollection {
            types,
            count: 0,
            finished_append: false,
            allocator,
            segments: Vec::new(),
            copy_functions,
        }
    }

    /// A new empty collection with `other`'s schema and allocator.
    ///
    /// Adopting an open collection as a source seals it.
    pub fn new_from(other: &mut ColumnDataCollection) -> Self {
        other.finished_append = true;
        Self::with_allocator(other.allocator.clone(), other.types.clone())
    }

    pub fn types(&self) -> &[DataType] {
        &self.types
    }

    pub fn column_count(&self) -> usize {
        self.types.len()
    }

    pub fn row_count(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Whether the collection still accepts appends.
    pub fn is_sealed(&self) -> bool {
        self.finished_append
    }

    pub fn chunk_count(&self) -> usize {
        self.segments.iter().map(|s| s.chunk_count()).sum()
    }

    /// Begins an append, creating the first segment and chunk if needed.
    pub fn init_append(&mut self) -> Result<ColumnDataAppendState> {
        if self.finished_append {
            return Err(Error::InvalidState("append after the collection was sealed"));
        }
        if self.segments.is_empty() {
            debug!(segment = 0, "creating segment");
            self.segments
                .push(Segment::new(self.allocator.clone(), self.types.clone()));
        }
        let segment = self.segments.last_mut().unwrap();
        if segment.chunk_data.is_empty() {
            segment.allocate_new_chunk()?;
        }
        Ok(ColumnDataAppendState {
            current_chunk_state: ChunkState::default(),
        })
    }

    /// Appends a batch using a previously initialized state.
    pub fn append_with_state(
        &mut self,
        state: &mut ColumnDataAppendState,
        input: &DataChunk,
    ) -> Result<()> {
        if self.finished_append {
            return Err(Error::InvalidState("append after the collection was sealed"));
        }
        if self.segments.is_empty() {
            return Err(Error::InvalidState("append before init_append"));
        }
        let input_types = input.types();
        if input_types != self.types {
            return Err(Error::SchemaMismatch {
                expected: self.types.clone(),
                found: input_types,
            });
        }

        // nested columns must be flat: their copy needs direct child access
        let flattened: Vec<Option<Vector>> = (0..input.column_count())
            .map(|column| {
                let vector = input.column_at(column);
                (vector.data_type().is_nested() && !vector.is_flat()).then(|| vector.flatten())
            })
            .collect();
        let sources: Vec<&Vector> = flattened
            .iter()
            .enumerate()
            .map(|(column, flat)| flat.as_ref().unwrap_or_else(|| input.column_at(column)))
            .collect();
        let unified: Vec<UnifiedFormat<'_>> = sources.iter().map(|v| v.to_unified()).collect();

        let Self {
            segments,
            copy_functions,
            ..
        } = self;
        let segment = segments.last_mut().expect("init_append creates a segment");

        let size = input.cardinality();
        let mut remaining = size;
        while remaining > 0 {
            let chunk_idx = segment.chunk_data.len() - 1;
            let room = VECTOR_WIDTH - segment.chunk_data[chunk_idx].count as usize;
            let append = remaining.min(room);
            if append > 0 {
                let offset = size - remaining;
                for (column, function) in copy_functions.iter().enumerate() {
                    let head = segment.chunk_data[chunk_idx].vector_data[column];
                    function.copy(
                        segment,
                        &mut state.current_chunk_state,
                        head,
                        &unified[column],
                        sources[column],
                        offset,
                        append,
                    )?;
                }
                segment.chunk_data[chunk_idx].count += append as u32;
            }
            remaining -= append;
            if remaining > 0 {
                segment.allocate_new_chunk()?;
            }
        }
        segment.count += size;
        self.count += size;
        Ok(())
    }

    /// Appends a batch with a one-shot append state.
    pub fn append(&mut self, input: &DataChunk) -> Result<()> {
        let mut state = self.init_append()?;
        self.append_with_state(&mut state, input)
    }

    /// Takes ownership of `other`'s segments, appending its rows after ours.
    pub fn combine(&mut self, other: ColumnDataCollection) -> Result<()> {
        if other.count == 0 {
            return Ok(());
        }
        if self.types != other.types {
            return Err(Error::SchemaMismatch {
                expected: self.types.clone(),
                found: other.types,
            });
        }
        debug!(
            segments = other.segments.len(),
            rows = other.count,
            "combining collections"
        );
        self.count += other.count;
        self.segments.extend(other.segments);
        self.verify();
        Ok(())
    }

    /// Reads the chunk with the given global index.
    pub fn fetch_chunk(&self, mut chunk_idx: usize, out: &mut DataChunk) -> Result<()> {
        for segment in &self.segments {
            if chunk_idx >= segment.chunk_count() {
                chunk_idx -= segment.chunk_count();
            } else {
                segment.fetch_chunk(chunk_idx, out);
                return Ok(());
            }
        }
        Err(Error::internal("failed to find chunk in collection"))
    }

    /// An empty chunk matching this collection's schema.
    pub fn init_chunk(&self) -> DataChunk {
        DataChunk::with_types(self.types.iter().cloned())
    }

    /// Drops all rows, reopening the collection for appends.
    pub fn reset(&mut self) {
        self.count = 0;
        self.segments.clear();
        self.finished_append = false;
    }

    /// Checks the per-segment row accounting. Compiled to a no-op outside
    /// debug builds.
    pub fn verify(&self) {
        #[cfg(debug_assertions)]
        {
            let mut total = 0;
            for segment in &self.segments {
                segment.verify();
                total += segment.count;
            }
            assert_eq!(total, self.count, "segment counts do not sum to collection count");
        }
    }

    /// Compares two collections row by row, treating two NULLs as equal.
    ///
    /// Returns a description of the first mismatch.
    pub fn result_equals(
        left: &ColumnDataCollection,
        right: &ColumnDataCollection,
    ) -> Result<(), String> {
        if left.column_count() != right.column_count() {
            return Err("column count mismatch".to_string());
        }
        if left.row_count() != right.row_count() {
            return Err("row count mismatch".to_string());
        }
        let left_rows = left.rows();
        let right_rows = right.rows();
        for row in 0..left.row_count() {
            for column in 0..left.column_count() {
                let left_value = left_rows.get_value(column, row);
                let right_value = right_rows.get_value(column, row);
                if left_value != right_value {
                    return Err(format!(
                        "{left_value} <> {right_value} (row: {row}, col: {column})"
                    ));
                }
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for ColumnDataCollection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ColumnDataCollection")
            .field("types", &self.types)
            .field("count", &self.count)
            .field("segments", &self.segments.len())
            .field("sealed", &self.finished_append)
            .finish()
    }
}
