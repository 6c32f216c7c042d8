//! Table storage consumed by scans and deletes
//!
//! The engine only needs a narrow view of storage: read a window of rows for a
//! subset of columns, learn which of them are deleted, and delete rows by id.

mod memory;

pub use memory::MemoryTable;

use crate::chunk::SelectionVector;
use crate::error::Result;
use crate::types::LogicalType;
use arrow::array::ArrayRef;
use std::fmt;

/// Rows `[offset, offset + len)` of a table
#[derive(Debug, Clone)]
pub struct ScanWindow {
    /// One array per requested column, each `len` rows long
    pub columns: Vec<ArrayRef>,
    /// Rows of the window that are still visible; `None` when all are
    pub visible: Option<SelectionVector>,
}

/// Table provider trait for accessing table data
pub trait TableProvider: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    /// Column types of the table
    fn types(&self) -> Vec<LogicalType>;

    /// Number of physical rows, deleted rows included
    fn cardinality(&self) -> usize;

    /// Read a window of rows for the given columns
    fn scan(&self, column_ids: &[usize], offset: usize, len: usize) -> Result<ScanWindow>;

    /// Delete rows by row id, returning how many rows were newly deleted
    fn delete(&self, row_ids: &[i64]) -> Result<usize>;
}
