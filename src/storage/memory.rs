//! In-memory table provider

use crate::chunk::SelectionVector;
use crate::error::{QueryError, Result};
use crate::storage::{ScanWindow, TableProvider};
use crate::types::LogicalType;
use arrow::array::{Array, ArrayRef};
use arrow::compute;
use arrow::record_batch::RecordBatch;
use parking_lot::RwLock;
use tracing::debug;

/// In-memory table: one contiguous array per column plus a deletion mask
#[derive(Debug)]
pub struct MemoryTable {
    name: String,
    types: Vec<LogicalType>,
    columns: Vec<ArrayRef>,
    deleted: RwLock<Vec<bool>>,
}

impl MemoryTable {
    pub fn try_new(name: impl Into<String>, columns: Vec<ArrayRef>) -> Result<Self> {
        let name = name.into();
        let types = columns
            .iter()
            .map(|c| {
                LogicalType::from_physical(c.data_type()).ok_or_else(|| {
                    QueryError::Storage(format!(
                        "table {} has unsupported column type {:?}",
                        name,
                        c.data_type()
                    ))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        let rows = columns.first().map(|c| c.len()).unwrap_or(0);
        if columns.iter().any(|c| c.len() != rows) {
            return Err(QueryError::Storage(format!(
                "columns of table {} differ in length",
                name
            )));
        }
        Ok(Self {
            name,
            types,
            columns,
            deleted: RwLock::new(vec![false; rows]),
        })
    }

    /// Build a table from record batches sharing one schema
    pub fn try_from_batches(name: impl Into<String>, batches: &[RecordBatch]) -> Result<Self> {
        let Some(first) = batches.first() else {
            return Self::try_new(name, Vec::new());
        };
        let columns = (0..first.num_columns())
            .map(|i| {
                let parts: Vec<&dyn Array> = batches.iter().map(|b| b.column(i).as_ref()).collect();
                compute::concat(&parts).map_err(QueryError::from)
            })
            .collect::<Result<Vec<_>>>()?;
        Self::try_new(name, columns)
    }

    /// Number of rows not deleted
    pub fn live_rows(&self) -> usize {
        self.deleted.read().iter().filter(|d| !**d).count()
    }
}

impl TableProvider for MemoryTable {
    fn name(&self) -> &str {
        &self.name
    }

    fn types(&self) -> Vec<LogicalType> {
        self.types.clone()
    }

    fn cardinality(&self) -> usize {
        self.deleted.read().len()
    }

    fn scan(&self, column_ids: &[usize], offset: usize, len: usize) -> Result<ScanWindow> {
        let rows = self.cardinality();
        let end = offset.saturating_add(len).min(rows);
        let len = end.saturating_sub(offset);
        let columns = column_ids
            .iter()
            .map(|&id| {
                self.columns
                    .get(id)
                    .map(|c| c.slice(offset.min(rows), len))
                    .ok_or_else(|| {
                        QueryError::Storage(format!(
                            "table {} has no column {}",
                            self.name, id
                        ))
                    })
            })
            .collect::<Result<Vec<_>>>()?;

        let deleted = self.deleted.read();
        let window = &deleted[offset.min(rows)..end];
        let visible = if window.iter().any(|d| *d) {
            let rows = window
                .iter()
                .enumerate()
                .filter(|(_, d)| !**d)
                .map(|(i, _)| i as u32)
                .collect();
            Some(SelectionVector::new(rows))
        } else {
            None
        };
        Ok(ScanWindow { columns, visible })
    }

    fn delete(&self, row_ids: &[i64]) -> Result<usize> {
        let mut deleted = self.deleted.write();
        let mut count = 0;
        for &id in row_ids {
            let slot = usize::try_from(id)
                .ok()
                .and_then(|i| deleted.get_mut(i))
                .ok_or_else(|| {
                    QueryError::Storage(format!("row id {} out of range for {}", id, self.name))
                })?;
            if !*slot {
                *slot = true;
                count += 1;
            }
        }
        debug!(table = %self.name, deleted = count, "Deleted rows");
        Ok(count)
    }
}
