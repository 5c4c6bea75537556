// Copyright 2024 RisingLight Project Authors. Licensed under Apache-2.0.

//! Sequential and parallel scans.
//!
//! Both modes advance a `(segment, chunk)` cursor and reconstruct one chunk
//! per step. A parallel scan shares the cursor behind a mutex; each worker
//! reads with its own pin cache, so block access stays lock-free apart from
//! cursor reservation.

use parking_lot::Mutex;
use tracing::trace;

use crate::allocator::ChunkState;
use crate::collection::ColumnDataCollection;
use crate::vector::DataChunk;

/// Whether a scan releases pinned blocks as its cursor leaves a segment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ScanProperties {
    /// Release block handles when the cursor crosses a segment boundary.
    #[default]
    ReleaseBlocks,
    /// Keep every scanned block pinned until the state is dropped.
    KeepPinned,
}

/// State of a sequential scan.
pub struct ScanState {
    pub(crate) current_chunk_state: ChunkState,
    segment_index: usize,
    chunk_index: usize,
    current_row_index: usize,
    next_row_index: usize,
    column_ids: Vec<usize>,
    properties: ScanProperties,
}

impl ScanState {
    /// Columns this scan produces, as indexes into the collection schema.
    pub fn column_ids(&self) -> &[usize] {
        &self.column_ids
    }

    /// Global index of the first row of the chunk produced last.
    pub fn current_row_index(&self) -> usize {
        self.current_row_index
    }
}

/// Shared cursor of a parallel scan.
pub struct ParallelScanState {
    cursor: Mutex<ScanState>,
    column_ids: Vec<usize>,
    properties: ScanProperties,
}

/// Per-worker state of a parallel scan: its own pin cache and the segment it
/// pinned from last.
#[derive(Default)]
pub struct LocalScanState {
    current_chunk_state: ChunkState,
    current_segment_index: Option<usize>,
    current_row_index: usize,
}

impl LocalScanState {
    /// Global index of the first row of the chunk this worker produced last.
    pub fn current_row_index(&self) -> usize {
        self.current_row_index
    }
}

impl ColumnDataCollection {
    /// Initializes a sequential scan over all columns.
    pub fn init_scan(&self) -> ScanState {
        self.init_scan_with((0..self.column_count()).collect(), ScanProperties::default())
    }

    /// Initializes a sequential scan over the selected columns.
    pub fn init_scan_with(&self, column_ids: Vec<usize>, properties: ScanProperties) -> ScanState {
        assert!(!column_ids.is_empty(), "a scan needs at least one column");
        assert!(
            column_ids.iter().all(|&id| id < self.column_count()),
            "column id out of bounds"
        );
        trace!(columns = column_ids.len(), "initializing scan");
        ScanState {
            current_chunk_state: ChunkState::default(),
            segment_index: 0,
            chunk_index: 0,
            current_row_index: 0,
            next_row_index: 0,
            column_ids,
            properties,
        }
    }

    /// An empty chunk matching the scan's column selection.
    pub fn init_scan_chunk(&self, state: &ScanState) -> DataChunk {
        DataChunk::with_types(
            state
                .column_ids
                .iter()
                .map(|&id| self.types()[id].clone()),
        )
    }

    /// Reserves the next `(chunk, segment, row)` triple, skipping exhausted
    /// segments. Returns `None` past the last chunk of the last segment.
    fn next_scan_index(&self, state: &mut ScanState) -> Option<(usize, usize, usize)> {
        state.current_row_index = state.next_row_index;
        let row_index = state.next_row_index;
        if state.segment_index >= self.segments.len() {
            return None;
        }
        while state.chunk_index >= self.segments[state.segment_index].chunk_count() {
            state.chunk_index = 0;
            state.segment_index += 1;
            if state.properties == ScanProperties::ReleaseBlocks {
                state.current_chunk_state.clear();
            }
            if state.segment_index >= self.segments.len() {
                return None;
            }
        }
        state.next_row_index +=
            self.segments[state.segment_index].chunk_data[state.chunk_index].count as usize;
        let result = (state.chunk_index, state.segment_index, row_index);
        state.chunk_index += 1;
        Some(result)
    }

    /// Scans the next chunk into `out`. Returns `false` when the collection
    /// is exhausted.
    pub fn scan(&self, state: &mut ScanState, out: &mut DataChunk) -> bool {
        out.reset();
        let Some((chunk_index, segment_index, _)) = self.next_scan_index(state) else {
            return false;
        };
        self.segments[segment_index].read_chunk(
            chunk_index,
            &mut state.current_chunk_state,
            out,
            &state.column_ids,
        );
        true
    }

    /// Initializes a parallel scan over all columns.
    pub fn init_parallel_scan(&self) -> ParallelScanState {
        self.init_parallel_scan_with((0..self.column_count()).collect(), ScanProperties::default())
    }

    /// Initializes a parallel scan over the selected columns.
    pub fn init_parallel_scan_with(
        &self,
        column_ids: Vec<usize>,
        properties: ScanProperties,
    ) -> ParallelScanState {
        let state = self.init_scan_with(column_ids.clone(), properties);
        ParallelScanState {
            cursor: Mutex::new(state),
            column_ids,
            properties,
        }
    }

    /// Scans the next unclaimed chunk into `out` using the worker's local
    /// state. Returns `false` when the collection is exhausted.
    ///
    /// Every chunk is handed to exactly one worker; output order across
    /// workers is unspecified.
    pub fn scan_parallel(
        &self,
        state: &ParallelScanState,
        local: &mut LocalScanState,
        out: &mut DataChunk,
    ) -> bool {
        out.reset();
        let (chunk_index, segment_index, row_index) = {
            let mut cursor = state.cursor.lock();
            match self.next_scan_index(&mut cursor) {
                Some(next) => next,
                None => return false,
            }
        };
        if local.current_segment_index != Some(segment_index) {
            if state.properties == ScanProperties::ReleaseBlocks {
                local.current_chunk_state.clear();
            }
            local.current_segment_index = Some(segment_index);
        }
        self.segments[segment_index].read_chunk(
            chunk_index,
            &mut local.current_chunk_state,
            out,
            &state.column_ids,
        );
        local.current_row_index = row_index;
        true
    }

    /// Iterates over all chunks of the collection via a sequential scan.
    pub fn chunks(&self) -> Chunks<'_> {
        Chunks {
            collection: self,
            state: self.init_scan(),
        }
    }
}

/// Iterator over owned scanned chunks.
pub struct Chunks<'a> {
    collection: &'a ColumnDataCollection,
    state: ScanState,
}

impl Iterator for Chunks<'_> {
    type Item = DataChunk;

    fn next(&mut self) -> Option<DataChunk> {
        let mut out = self.collection.init_scan_chunk(&self.state);
        self.collection
            .scan(&mut self.state, &mut out)
            .then_some(out)
    }
}
