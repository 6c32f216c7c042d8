//! Delete operator

use crate::chunk::DataChunk;
use crate::error::{QueryError, Result};
use crate::execution::ExecutionContext;
use crate::physical::plan::{fetch_chunk, state_mismatch};
use crate::physical::{LocalState, OperatorState, PhysicalOperator};
use crate::storage::TableProvider;
use crate::types::LogicalType;
use arrow::array::{Array, AsArray, Int64Array};
use arrow::datatypes::Int64Type;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Default)]
pub struct DeleteState {
    done: bool,
}

/// Deletes the rows whose ids arrive in the child's last column
///
/// Emits a single BIGINT row holding the number of rows deleted.
#[derive(Debug)]
pub struct DeleteExec {
    input: Box<dyn PhysicalOperator>,
    table: Arc<dyn TableProvider>,
    types: Vec<LogicalType>,
}

impl DeleteExec {
    pub fn try_new(input: Box<dyn PhysicalOperator>, table: Arc<dyn TableProvider>) -> Result<Self> {
        if input.types().last() != Some(&LogicalType::BigInt) {
            return Err(QueryError::InvalidPlan(format!(
                "delete from {} expects a BIGINT row id as the last input column",
                table.name()
            )));
        }
        Ok(Self {
            input,
            table,
            types: vec![LogicalType::BigInt],
        })
    }
}

impl PhysicalOperator for DeleteExec {
    fn types(&self) -> &[LogicalType] {
        &self.types
    }

    fn children(&self) -> Vec<&dyn PhysicalOperator> {
        vec![self.input.as_ref()]
    }

    fn name(&self) -> &str {
        "Delete"
    }

    fn params(&self) -> String {
        self.table.name().to_string()
    }

    fn get_initial_state(&self) -> OperatorState {
        OperatorState::with_local(
            Some(self.input.as_ref()),
            LocalState::Delete(DeleteState::default()),
        )
    }

    fn compute_chunk(
        &self,
        ctx: &ExecutionContext,
        chunk: &mut DataChunk,
        state: &mut OperatorState,
    ) -> Result<()> {
        let OperatorState {
            child_chunk,
            child_state,
            local,
            ..
        } = state;
        let LocalState::Delete(delete) = local else {
            return Err(state_mismatch(self.name()));
        };
        if delete.done {
            return Ok(());
        }

        let mut deleted = 0;
        loop {
            fetch_chunk(ctx, self.input.as_ref(), child_chunk, child_state)?;
            if child_chunk.is_empty() {
                break;
            }
            let row_id_column = child_chunk.column_count() - 1;
            let ids = child_chunk.column(row_id_column).as_primitive::<Int64Type>();
            let row_ids: Vec<i64> = child_chunk
                .active_rows()
                .filter(|row| ids.is_valid(*row))
                .map(|row| ids.value(row))
                .collect();
            deleted += self.table.delete(&row_ids)?;
        }
        info!(table = self.table.name(), deleted, "Delete complete");

        delete.done = true;
        chunk.set_column(0, Arc::new(Int64Array::from(vec![deleted as i64])))?;
        chunk.set_cardinality(1);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physical::operators::test_util::{collect_i64, run};
    use crate::physical::{FilterExec, TableScanExec};
    use crate::planner::{ColumnId, Expr};
    use crate::storage::MemoryTable;
    use crate::types::ScalarValue;

    #[test]
    fn test_delete_filtered_rows() {
        let ctx = ExecutionContext::new();
        let table = Arc::new(
            MemoryTable::try_new("t", vec![Arc::new(Int64Array::from_iter_values(0..6))]).unwrap(),
        );
        let scan = TableScanExec::try_new(table.clone(), vec![ColumnId::Column(0), ColumnId::RowId])
            .unwrap();
        let predicate = Expr::column(0, LogicalType::BigInt).gt_eq(Expr::literal(ScalarValue::BigInt(4)));
        let filter = FilterExec::new(Box::new(scan), vec![predicate]);
        let delete = DeleteExec::try_new(Box::new(filter), table.clone()).unwrap();

        let chunks = run(&ctx, &delete).unwrap();
        assert_eq!(collect_i64(&chunks, 0), vec![Some(2)]);
        assert_eq!(table.live_rows(), 4);

        // A second execution sees the rows already gone
        let chunks = run(&ctx, &delete).unwrap();
        assert_eq!(collect_i64(&chunks, 0), vec![Some(0)]);
    }

    #[test]
    fn test_requires_row_id_column() {
        let table = Arc::new(
            MemoryTable::try_new(
                "t",
                vec![Arc::new(arrow::array::StringArray::from(vec!["a"]))],
            )
            .unwrap(),
        );
        let scan = TableScanExec::try_new(table.clone(), vec![ColumnId::Column(0)]).unwrap();
        let err = DeleteExec::try_new(Box::new(scan), table).unwrap_err();
        assert!(err.is_invalid_plan());
    }
}
