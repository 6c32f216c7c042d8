//! The unit of data moving between operators

use crate::chunk::SelectionVector;
use crate::error::{QueryError, Result};
use crate::types::{LogicalType, VECTOR_SIZE};
use arrow::array::{new_empty_array, ArrayRef};
use arrow::compute;
use arrow::datatypes::{Field, Schema};
use arrow::record_batch::RecordBatch;
use std::sync::Arc;

/// Bounded-capacity columnar batch with an optional selection vector
///
/// Without a selection vector every column holds exactly `size()` rows. With
/// one, `size()` is the selection length and every selected index is in bounds
/// for every column; rows not named by the selection are invisible.
#[derive(Debug, Clone)]
pub struct DataChunk {
    types: Vec<LogicalType>,
    columns: Vec<ArrayRef>,
    selection: Option<SelectionVector>,
    count: usize,
    capacity: usize,
}

impl Default for DataChunk {
    fn default() -> Self {
        Self::new()
    }
}

impl DataChunk {
    pub fn new() -> Self {
        Self {
            types: Vec::new(),
            columns: Vec::new(),
            selection: None,
            count: 0,
            capacity: VECTOR_SIZE,
        }
    }

    /// Set up the chunk for `types` with the default capacity
    pub fn initialize(&mut self, types: &[LogicalType]) {
        self.initialize_with_capacity(types, VECTOR_SIZE);
    }

    /// Set up the chunk for `types`; repeating the call with the same types
    /// only resets the contents.
    pub fn initialize_with_capacity(&mut self, types: &[LogicalType], capacity: usize) {
        if self.types != types {
            self.types = types.to_vec();
        }
        self.capacity = capacity.max(1);
        self.reset();
    }

    /// Drop all rows, references and the selection vector
    pub fn reset(&mut self) {
        self.columns.clear();
        self.columns
            .extend(self.types.iter().map(|t| new_empty_array(&t.physical_type())));
        self.selection = None;
        self.count = 0;
    }

    /// Build a flat chunk from equally long arrays
    pub fn try_from_arrays(columns: Vec<ArrayRef>) -> Result<Self> {
        let types = columns
            .iter()
            .map(|c| {
                LogicalType::from_physical(c.data_type()).ok_or_else(|| {
                    QueryError::NotImplemented(format!("Unsupported column type {:?}", c.data_type()))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        let count = columns.first().map(|c| c.len()).unwrap_or(0);
        let chunk = Self {
            types,
            columns,
            selection: None,
            count,
            capacity: VECTOR_SIZE.max(count),
        };
        chunk.verify()?;
        Ok(chunk)
    }

    pub fn types(&self) -> &[LogicalType] {
        &self.types
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Number of active rows
    pub fn size(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn column(&self, index: usize) -> &ArrayRef {
        &self.columns[index]
    }

    pub fn columns(&self) -> &[ArrayRef] {
        &self.columns
    }

    pub fn selection(&self) -> Option<&SelectionVector> {
        self.selection.as_ref()
    }

    /// Number of physical rows behind the active rows
    pub fn physical_len(&self) -> usize {
        match (self.columns.first(), &self.selection) {
            (Some(column), _) => column.len(),
            (None, Some(sel)) => sel.max_index().map(|m| m + 1).unwrap_or(0),
            (None, None) => self.count,
        }
    }

    /// Physical row of the `i`-th active row
    pub fn row_index(&self, i: usize) -> usize {
        match &self.selection {
            Some(sel) => sel.get(i),
            None => i,
        }
    }

    /// Physical indices of all active rows, in order
    pub fn active_rows(&self) -> Box<dyn Iterator<Item = usize> + '_> {
        match &self.selection {
            Some(sel) => Box::new(sel.iter()),
            None => Box::new(0..self.count),
        }
    }

    /// Replace column `index` with an owned array
    pub fn set_column(&mut self, index: usize, array: ArrayRef) -> Result<()> {
        let expected = self.types.get(index).ok_or_else(|| {
            QueryError::InvalidPlan(format!(
                "column {} out of range for chunk with {} columns",
                index,
                self.types.len()
            ))
        })?;
        if array.data_type() != &expected.physical_type() {
            return Err(QueryError::Internal(format!(
                "column {} expects {:?} but got {:?}",
                index,
                expected.physical_type(),
                array.data_type()
            )));
        }
        self.columns[index] = array;
        Ok(())
    }

    /// Make column `index` alias column `source` of `other` without copying
    pub fn reference_column(&mut self, index: usize, other: &DataChunk, source: usize) -> Result<()> {
        let column = other.columns.get(source).ok_or_else(|| {
            QueryError::InvalidPlan(format!(
                "cannot reference column {} of a chunk with {} columns",
                source,
                other.column_count()
            ))
        })?;
        self.set_column(index, Arc::clone(column))
    }

    /// Alias every column of `other` and adopt its cardinality and selection
    pub fn reference(&mut self, other: &DataChunk) {
        self.types = other.types.clone();
        self.columns = other.columns.clone();
        self.selection = other.selection.clone();
        self.count = other.count;
    }

    /// Flat cardinality; clears any selection vector
    pub fn set_cardinality(&mut self, count: usize) {
        self.selection = None;
        self.count = count;
    }

    /// Adopt the active rows of `other` (its count and selection vector)
    pub fn set_cardinality_from(&mut self, other: &DataChunk) {
        self.selection = other.selection.clone();
        self.count = other.count;
    }

    /// Restrict the active rows to `selection`
    pub fn select(&mut self, selection: SelectionVector) {
        self.count = selection.len();
        self.selection = Some(selection);
    }

    /// Materialize the selection vector so the chunk is flat
    pub fn flatten(&mut self) -> Result<()> {
        if self.selection.is_some() {
            self.columns = self.flat_columns()?;
            self.selection = None;
        }
        Ok(())
    }

    /// Columns restricted to the active rows; shares buffers when already flat
    pub fn flat_columns(&self) -> Result<Vec<ArrayRef>> {
        match &self.selection {
            None => Ok(self.columns.clone()),
            Some(sel) => {
                let indices = sel.to_indices();
                self.columns
                    .iter()
                    .map(|c| compute::take(c.as_ref(), &indices, None).map_err(Into::into))
                    .collect()
            }
        }
    }

    /// Flat copy of the active rows
    pub fn to_flat(&self) -> Result<DataChunk> {
        let mut flat = self.clone();
        flat.flatten()?;
        Ok(flat)
    }

    /// Active rows `[offset, offset + len)` as a new chunk, zero-copy
    pub fn slice(&self, offset: usize, len: usize) -> Result<DataChunk> {
        let end = offset + len;
        if end > self.count {
            return Err(QueryError::Internal(format!(
                "slice [{}, {}) out of range for chunk of size {}",
                offset, end, self.count
            )));
        }
        let mut result = self.clone();
        match &self.selection {
            Some(sel) => result.select(sel.slice(offset, end)),
            None => {
                result.columns = self.columns.iter().map(|c| c.slice(offset, len)).collect();
                result.count = len;
            }
        }
        Ok(result)
    }

    /// Check the chunk invariants
    pub fn verify(&self) -> Result<()> {
        if self.columns.len() != self.types.len() {
            return Err(QueryError::Internal(format!(
                "chunk has {} columns but {} types",
                self.columns.len(),
                self.types.len()
            )));
        }
        let physical_len = self.physical_len();
        for (i, (column, ty)) in self.columns.iter().zip(&self.types).enumerate() {
            if column.len() != physical_len {
                return Err(QueryError::Internal(format!(
                    "column {} has {} rows, expected {}",
                    i,
                    column.len(),
                    physical_len
                )));
            }
            if column.data_type() != &ty.physical_type() {
                return Err(QueryError::Internal(format!(
                    "column {} stores {:?} for logical type {}",
                    i,
                    column.data_type(),
                    ty
                )));
            }
        }
        match &self.selection {
            None if !self.columns.is_empty() && physical_len != self.count => {
                Err(QueryError::Internal(format!(
                    "flat chunk reports {} rows but columns hold {}",
                    self.count, physical_len
                )))
            }
            Some(sel) if sel.len() != self.count => Err(QueryError::Internal(format!(
                "selection of {} rows but chunk reports {}",
                sel.len(),
                self.count
            ))),
            Some(sel) if sel.max_index().is_some_and(|m| m >= physical_len) => Err(
                QueryError::Internal("selection index out of range".to_string()),
            ),
            _ => Ok(()),
        }
    }

    /// Flat arrow batch of the active rows, columns named `c0..cn`
    pub fn to_record_batch(&self) -> Result<RecordBatch> {
        let fields: Vec<Field> = self
            .types
            .iter()
            .enumerate()
            .map(|(i, t)| Field::new(format!("c{}", i), t.physical_type(), true))
            .collect();
        let schema = Arc::new(Schema::new(fields));
        if self.columns.is_empty() {
            return Ok(RecordBatch::new_empty(schema));
        }
        RecordBatch::try_new(schema, self.flat_columns()?).map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Array, AsArray, Int64Array, StringArray};
    use arrow::datatypes::Int64Type;

    fn sample_chunk() -> DataChunk {
        DataChunk::try_from_arrays(vec![
            Arc::new(Int64Array::from(vec![10, 20, 30, 40])),
            Arc::new(StringArray::from(vec!["a", "b", "c", "d"])),
        ])
        .unwrap()
    }

    #[test]
    fn test_initialize_is_idempotent() {
        let mut chunk = DataChunk::new();
        chunk.initialize(&[LogicalType::BigInt, LogicalType::Varchar]);
        assert_eq!(chunk.column_count(), 2);
        assert_eq!(chunk.size(), 0);

        chunk.initialize(&[LogicalType::BigInt, LogicalType::Varchar]);
        assert_eq!(chunk.types(), &[LogicalType::BigInt, LogicalType::Varchar]);
        assert_eq!(chunk.capacity(), VECTOR_SIZE);
        chunk.verify().unwrap();
    }

    #[test]
    fn test_reference_column_is_zero_copy() {
        let source = sample_chunk();
        let mut target = DataChunk::new();
        target.initialize(&[LogicalType::BigInt]);
        target.reference_column(0, &source, 0).unwrap();
        target.set_cardinality_from(&source);

        assert!(Arc::ptr_eq(target.column(0), source.column(0)));
        assert_eq!(target.size(), 4);
    }

    #[test]
    fn test_reference_column_out_of_range() {
        let source = sample_chunk();
        let mut target = DataChunk::new();
        target.initialize(&[LogicalType::BigInt]);
        let err = target.reference_column(0, &source, 5).unwrap_err();
        assert!(err.is_invalid_plan());
    }

    #[test]
    fn test_selection_and_flatten() {
        let mut chunk = sample_chunk();
        chunk.select(SelectionVector::new(vec![1, 3]));
        assert_eq!(chunk.size(), 2);
        assert_eq!(chunk.physical_len(), 4);
        assert_eq!(chunk.active_rows().collect::<Vec<_>>(), vec![1, 3]);
        chunk.verify().unwrap();

        chunk.flatten().unwrap();
        assert!(chunk.selection().is_none());
        let values = chunk.column(0).as_primitive::<Int64Type>();
        assert_eq!(values.values().to_vec(), vec![20, 40]);
    }

    #[test]
    fn test_slice_with_and_without_selection() {
        let chunk = sample_chunk();
        let sliced = chunk.slice(1, 2).unwrap();
        assert_eq!(sliced.size(), 2);
        assert_eq!(sliced.column(0).len(), 2);

        let mut selected = sample_chunk();
        selected.select(SelectionVector::new(vec![0, 2, 3]));
        let sliced = selected.slice(1, 2).unwrap();
        assert_eq!(sliced.selection().unwrap().as_slice(), &[2, 3]);
        assert!(selected.slice(2, 5).is_err());
    }

    #[test]
    fn test_verify_rejects_bad_selection() {
        let mut chunk = sample_chunk();
        chunk.select(SelectionVector::new(vec![0, 7]));
        assert!(chunk.verify().is_err());
    }

    #[test]
    fn test_to_record_batch_applies_selection() {
        let mut chunk = sample_chunk();
        chunk.select(SelectionVector::new(vec![2]));
        let batch = chunk.to_record_batch().unwrap();
        assert_eq!(batch.num_rows(), 1);
        assert_eq!(batch.num_columns(), 2);
    }
}
