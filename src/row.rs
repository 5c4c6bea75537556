// Copyright 2024 RisingLight Project Authors. Licensed under Apache-2.0.

//! Row-wise view of a scanned collection.
//!
//! Built by draining the collection into owned chunks; values materialize
//! lazily per cell. Expensive, and meant for equality checks and inspection
//! rather than hot paths.

use crate::collection::ColumnDataCollection;
use crate::types::DataValue;
use crate::vector::DataChunk;

struct RowLocation {
    chunk: usize,
    row: usize,
    base_row: usize,
}

/// All rows of a collection, indexable in append order.
pub struct RowCollection {
    chunks: Vec<DataChunk>,
    rows: Vec<RowLocation>,
}

impl ColumnDataCollection {
    /// Drains the collection into a row-wise view.
    pub fn rows(&self) -> RowCollection {
        let chunks: Vec<DataChunk> = self.chunks().collect();
        let mut rows = Vec::with_capacity(self.row_count());
        let mut base_row = 0;
        for (chunk_idx, chunk) in chunks.iter().enumerate() {
            for row in 0..chunk.cardinality() {
                rows.push(RowLocation {
                    chunk: chunk_idx,
                    row,
                    base_row,
                });
            }
            base_row += chunk.cardinality();
        }
        RowCollection { chunks, rows }
    }
}

impl RowCollection {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Materializes the value at `(column, row)`.
    pub fn get_value(&self, column: usize, row: usize) -> DataValue {
        self.get(row).value(column)
    }

    pub fn get(&self, row: usize) -> Row<'_> {
        Row {
            collection: self,
            index: row,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = Row<'_>> {
        (0..self.len()).map(|index| Row {
            collection: self,
            index,
        })
    }
}

/// One row of a [`RowCollection`].
#[derive(Clone, Copy)]
pub struct Row<'a> {
    collection: &'a RowCollection,
    index: usize,
}

impl Row<'_> {
    /// Materializes the value of one column.
    pub fn value(&self, column: usize) -> DataValue {
        let location = &self.collection.rows[self.index];
        self.collection.chunks[location.chunk]
            .column_at(column)
            .get_value(location.row)
    }

    /// Global index of this row within the scanned collection.
    pub fn row_index(&self) -> usize {
        let location = &self.collection.rows[self.index];
        location.base_row + location.row
    }
}
