use itertools::Itertools;
use smallvec::SmallVec;

use super::Vector;
use crate::types::{DataType, DataValue};

/// A collection of vectors.
///
/// A chunk is a horizontal subset of a collection: every vector holds the
/// same number of rows.
pub struct DataChunk {
    columns: SmallVec<[Vector; 4]>,
}

impl FromIterator<Vector> for DataChunk {
    fn from_iter<I: IntoIterator<Item = Vector>>(iter: I) -> Self {
        let columns: SmallVec<[Vector; 4]> = iter.into_iter().collect();
        assert!(!columns.is_empty());
        let cardinality = columns[0].len();
        assert!(
            columns.iter().map(|c| c.len()).all(|l| l == cardinality),
            "all columns must have the same length"
        );
        DataChunk { columns }
    }
}

impl DataChunk {
    /// An empty chunk with one flat vector per type.
    pub fn with_types(types: impl IntoIterator<Item = DataType>) -> Self {
        let columns: SmallVec<[Vector; 4]> = types.into_iter().map(Vector::new).collect();
        assert!(!columns.is_empty());
        DataChunk { columns }
    }

    /// Return the number of rows in the chunk.
    pub fn cardinality(&self) -> usize {
        self.columns[0].len()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Get the reference of a vector by index.
    pub fn column_at(&self, idx: usize) -> &Vector {
        &self.columns[idx]
    }

    pub(crate) fn column_mut(&mut self, idx: usize) -> &mut Vector {
        &mut self.columns[idx]
    }

    /// The logical types of all columns.
    pub fn types(&self) -> Vec<DataType> {
        self.columns.iter().map(|c| c.data_type().clone()).collect()
    }

    /// Materialize one row as values.
    pub fn row_values(&self, idx: usize) -> Vec<DataValue> {
        self.columns.iter().map(|c| c.get_value(idx)).collect()
    }

    /// Clears all rows, keeping the column types.
    pub fn reset(&mut self) {
        for column in &mut self.columns {
            column.reset();
        }
    }
}

/// Print the chunk as a pretty table.
impl std::fmt::Display for DataChunk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        use prettytable::{format, Table};
        let mut table = Table::new();
        table.set_format(*format::consts::FORMAT_NO_LINESEP_WITH_TITLE);
        for i in 0..self.cardinality() {
            let row = self.columns.iter().map(|c| c.get_value(i).to_string()).collect();
            table.add_row(row);
        }
        write!(f, "{}", table)
    }
}

/// Builds a [`DataChunk`] row by row.
pub struct DataChunkBuilder {
    columns: Vec<Vector>,
}

impl DataChunkBuilder {
    pub fn new(types: impl IntoIterator<Item = DataType>) -> Self {
        DataChunkBuilder {
            columns: types.into_iter().map(Vector::new).collect(),
        }
    }

    /// Push a row of values; the row length must equal the column count.
    pub fn push_row(&mut self, row: impl IntoIterator<Item = DataValue>) -> &mut Self {
        self.columns
            .iter_mut()
            .zip_eq(row)
            .for_each(|(column, value)| column.push(&value));
        self
    }

    pub fn finish(self) -> DataChunk {
        self.columns.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let mut builder =
            DataChunkBuilder::new([DataType::Int32, DataType::Varchar]);
        builder.push_row([DataValue::Int32(1), DataValue::String("a".into())]);
        builder.push_row([DataValue::Null, DataValue::Null]);
        let chunk = builder.finish();
        assert_eq!(chunk.cardinality(), 2);
        assert_eq!(chunk.column_count(), 2);
        assert_eq!(
            chunk.row_values(0),
            vec![DataValue::Int32(1), DataValue::String("a".into())]
        );
        assert_eq!(chunk.row_values(1), vec![DataValue::Null, DataValue::Null]);
    }
}
