//! Materialized chunk buffers

use crate::chunk::DataChunk;
use crate::error::{QueryError, Result};
use crate::types::{LogicalType, ScalarValue};
use arrow::array::{new_empty_array, Array, ArrayRef};
use arrow::compute;

/// Append-only list of flat chunks sharing one set of types
///
/// Used wherever an operator must see its whole input before producing output
/// (ORDER BY, the build side of joins) and as the default result sink.
#[derive(Debug, Clone, Default)]
pub struct ChunkCollection {
    types: Vec<LogicalType>,
    chunks: Vec<DataChunk>,
    count: usize,
}

impl ChunkCollection {
    pub fn new(types: Vec<LogicalType>) -> Self {
        Self {
            types,
            chunks: Vec::new(),
            count: 0,
        }
    }

    /// Append the active rows of `chunk`, returning the bytes now held for
    /// them; empty chunks are skipped.
    pub fn append(&mut self, chunk: &DataChunk) -> Result<usize> {
        if chunk.is_empty() {
            return Ok(0);
        }
        if self.chunks.is_empty() && self.types.is_empty() {
            self.types = chunk.types().to_vec();
        }
        if chunk.types() != self.types.as_slice() {
            return Err(QueryError::Internal(format!(
                "cannot append chunk of types {:?} to collection of types {:?}",
                chunk.types(),
                self.types
            )));
        }
        let flat = chunk.to_flat()?;
        let bytes = flat.columns().iter().map(|a| a.get_array_memory_size()).sum();
        self.count += flat.size();
        self.chunks.push(flat);
        Ok(bytes)
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn types(&self) -> &[LogicalType] {
        &self.types
    }

    pub fn chunks(&self) -> &[DataChunk] {
        &self.chunks
    }

    pub fn into_chunks(self) -> Vec<DataChunk> {
        self.chunks
    }

    /// Concatenate every chunk into one array per column
    pub fn materialize(&self) -> Result<Vec<ArrayRef>> {
        (0..self.types.len())
            .map(|col| {
                let parts: Vec<&dyn Array> =
                    self.chunks.iter().map(|c| c.column(col).as_ref()).collect();
                match parts.len() {
                    0 => Ok(new_empty_array(&self.types[col].physical_type())),
                    1 => Ok(self.chunks[0].column(col).clone()),
                    _ => compute::concat(&parts).map_err(Into::into),
                }
            })
            .collect()
    }

    /// Approximate bytes held by the buffered arrays
    pub fn memory_size(&self) -> usize {
        self.chunks
            .iter()
            .flat_map(|c| c.columns().iter())
            .map(|a| a.get_array_memory_size())
            .sum()
    }

    /// Value at the global row `row` of column `col`
    pub fn get_value(&self, col: usize, row: usize) -> Result<ScalarValue> {
        let mut remaining = row;
        for chunk in &self.chunks {
            if remaining < chunk.size() {
                return ScalarValue::try_from_array(chunk.column(col).as_ref(), remaining);
            }
            remaining -= chunk.size();
        }
        Err(QueryError::Internal(format!(
            "row {} out of range for collection of {} rows",
            row, self.count
        )))
    }

    /// Every value of column `col`, in append order
    pub fn column_values(&self, col: usize) -> Result<Vec<ScalarValue>> {
        let mut values = Vec::with_capacity(self.count);
        for chunk in &self.chunks {
            let column = chunk.column(col);
            for row in 0..chunk.size() {
                values.push(ScalarValue::try_from_array(column.as_ref(), row)?);
            }
        }
        Ok(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::SelectionVector;
    use arrow::array::Int64Array;
    use std::sync::Arc;

    fn chunk(values: Vec<i64>) -> DataChunk {
        DataChunk::try_from_arrays(vec![Arc::new(Int64Array::from(values))]).unwrap()
    }

    #[test]
    fn test_append_flattens_selection() {
        let mut collection = ChunkCollection::new(vec![LogicalType::BigInt]);
        let mut selected = chunk(vec![1, 2, 3, 4]);
        selected.select(SelectionVector::new(vec![0, 3]));
        collection.append(&selected).unwrap();
        collection.append(&chunk(vec![9])).unwrap();
        collection.append(&chunk(vec![])).unwrap();

        assert_eq!(collection.count(), 3);
        assert_eq!(collection.chunks().len(), 2);
        assert_eq!(
            collection.column_values(0).unwrap(),
            vec![ScalarValue::BigInt(1), ScalarValue::BigInt(4), ScalarValue::BigInt(9)]
        );
        assert_eq!(collection.get_value(0, 2).unwrap(), ScalarValue::BigInt(9));
        assert!(collection.get_value(0, 3).is_err());
    }

    #[test]
    fn test_materialize_concatenates() {
        let mut collection = ChunkCollection::new(vec![LogicalType::BigInt]);
        collection.append(&chunk(vec![1, 2])).unwrap();
        collection.append(&chunk(vec![3])).unwrap();
        let columns = collection.materialize().unwrap();
        assert_eq!(columns[0].len(), 3);
        assert!(collection.memory_size() > 0);
    }

    #[test]
    fn test_append_rejects_type_mismatch() {
        let mut collection = ChunkCollection::new(vec![LogicalType::Varchar]);
        assert!(collection.append(&chunk(vec![1])).is_err());
    }
}
