//! Table scan operator

use crate::chunk::DataChunk;
use crate::error::{QueryError, Result};
use crate::execution::ExecutionContext;
use crate::physical::plan::state_mismatch;
use crate::physical::{LocalState, OperatorState, PhysicalOperator};
use crate::planner::ColumnId;
use crate::storage::TableProvider;
use crate::types::LogicalType;
use arrow::array::{ArrayRef, Int64Array};
use std::sync::Arc;

/// Position of a scan within its table
#[derive(Debug, Default)]
pub struct ScanState {
    pub(crate) offset: usize,
}

/// Scans a table in capacity-sized windows
///
/// Columns are zero-copy slices of the table's arrays. Deleted rows are hidden
/// with a selection vector, and windows with no visible rows are skipped.
#[derive(Debug)]
pub struct TableScanExec {
    table: Arc<dyn TableProvider>,
    column_ids: Vec<ColumnId>,
    /// Table columns to read, in output order, without the row id
    table_columns: Vec<usize>,
    types: Vec<LogicalType>,
}

impl TableScanExec {
    pub fn try_new(table: Arc<dyn TableProvider>, column_ids: Vec<ColumnId>) -> Result<Self> {
        let table_types = table.types();
        let mut types = Vec::with_capacity(column_ids.len());
        let mut table_columns = Vec::new();
        for id in &column_ids {
            match id {
                ColumnId::RowId => types.push(LogicalType::BigInt),
                ColumnId::Column(i) => {
                    let ty = table_types.get(*i).ok_or_else(|| {
                        QueryError::InvalidPlan(format!(
                            "table {} has no column {}",
                            table.name(),
                            i
                        ))
                    })?;
                    types.push(*ty);
                    table_columns.push(*i);
                }
            }
        }
        Ok(Self {
            table,
            column_ids,
            table_columns,
            types,
        })
    }
}

impl PhysicalOperator for TableScanExec {
    fn types(&self) -> &[LogicalType] {
        &self.types
    }

    fn children(&self) -> Vec<&dyn PhysicalOperator> {
        vec![]
    }

    fn name(&self) -> &str {
        "TableScan"
    }

    fn params(&self) -> String {
        let cols: Vec<String> = self
            .column_ids
            .iter()
            .map(|c| match c {
                ColumnId::Column(i) => format!("#{}", i),
                ColumnId::RowId => "rowid".to_string(),
            })
            .collect();
        format!("{} [{}]", self.table.name(), cols.join(", "))
    }

    fn get_initial_state(&self) -> OperatorState {
        OperatorState::with_local(None, LocalState::Scan(ScanState::default()))
    }

    fn compute_chunk(
        &self,
        _ctx: &ExecutionContext,
        chunk: &mut DataChunk,
        state: &mut OperatorState,
    ) -> Result<()> {
        let LocalState::Scan(scan) = &mut state.local else {
            return Err(state_mismatch(self.name()));
        };
        let cardinality = self.table.cardinality();

        while scan.offset < cardinality {
            let offset = scan.offset;
            let len = chunk.capacity().min(cardinality - offset);
            scan.offset += len;

            let window = self.table.scan(&self.table_columns, offset, len)?;
            if window.visible.as_ref().is_some_and(|v| v.is_empty()) {
                continue;
            }

            let mut table_columns = window.columns.into_iter();
            for (i, id) in self.column_ids.iter().enumerate() {
                let array: ArrayRef = match id {
                    ColumnId::RowId => Arc::new(Int64Array::from_iter_values(
                        offset as i64..(offset + len) as i64,
                    )),
                    ColumnId::Column(_) => table_columns.next().ok_or_else(|| {
                        QueryError::Storage(format!(
                            "table {} returned too few columns",
                            self.table.name()
                        ))
                    })?,
                };
                chunk.set_column(i, array)?;
            }
            match window.visible {
                Some(visible) => chunk.select(visible),
                None => chunk.set_cardinality(len),
            }
            return Ok(());
        }
        Ok(())
    }
}
