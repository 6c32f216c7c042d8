//! Column pruning operator

use crate::chunk::DataChunk;
use crate::error::{QueryError, Result};
use crate::execution::ExecutionContext;
use crate::physical::{OperatorState, PhysicalOperator};
use crate::types::LogicalType;

/// Keeps the first `column_limit` columns of its child
///
/// Purely referential: output columns are the child's buffers and the child's
/// selection vector is forwarded. Nothing is allocated or copied.
#[derive(Debug)]
pub struct PruneColumnsExec {
    input: Box<dyn PhysicalOperator>,
    column_limit: usize,
    types: Vec<LogicalType>,
}

impl PruneColumnsExec {
    pub fn try_new(input: Box<dyn PhysicalOperator>, column_limit: usize) -> Result<Self> {
        let input_types = input.types();
        if column_limit > input_types.len() {
            return Err(QueryError::InvalidPlan(format!(
                "cannot keep {} columns of an input with {}",
                column_limit,
                input_types.len()
            )));
        }
        let types = input_types[..column_limit].to_vec();
        Ok(Self {
            input,
            column_limit,
            types,
        })
    }

    pub fn column_limit(&self) -> usize {
        self.column_limit
    }
}

impl PhysicalOperator for PruneColumnsExec {
    fn types(&self) -> &[LogicalType] {
        &self.types
    }

    fn children(&self) -> Vec<&dyn PhysicalOperator> {
        vec![self.input.as_ref()]
    }

    fn name(&self) -> &str {
        "PruneColumns"
    }

    fn params(&self) -> String {
        self.column_limit.to_string()
    }

    fn compute_chunk(
        &self,
        ctx: &ExecutionContext,
        chunk: &mut DataChunk,
        state: &mut OperatorState,
    ) -> Result<()> {
        state.fetch_child(ctx, self.input.as_ref())?;
        let child = &state.child_chunk;
        if child.is_empty() {
            return Ok(());
        }
        if self.column_limit > child.column_count() {
            return Err(QueryError::InvalidPlan(format!(
                "cannot keep {} columns of a chunk with {}",
                self.column_limit,
                child.column_count()
            )));
        }
        for i in 0..self.column_limit {
            chunk.reference_column(i, child, i)?;
        }
        chunk.set_cardinality_from(child);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::SelectionVector;
    use crate::physical::operators::test_util::{run, ChunkSourceExec};
    use crate::physical::operators::EmptyResultExec;
    use arrow::array::{Int64Array, StringArray};
    use std::sync::Arc;

    fn wide_chunk() -> DataChunk {
        DataChunk::try_from_arrays(vec![
            Arc::new(Int64Array::from(vec![1, 2, 3])),
            Arc::new(StringArray::from(vec!["a", "b", "c"])),
            Arc::new(Int64Array::from(vec![7, 8, 9])),
        ])
        .unwrap()
    }

    #[test]
    fn test_prune_references_child_columns() {
        let ctx = ExecutionContext::new();
        let mut input = wide_chunk();
        let selection = SelectionVector::new(vec![0, 2]);
        input.select(selection.clone());
        let first = Arc::clone(input.column(0));
        let second = Arc::clone(input.column(1));

        let prune = PruneColumnsExec::try_new(Box::new(ChunkSourceExec::new(vec![input])), 2).unwrap();
        assert_eq!(prune.types(), &[LogicalType::BigInt, LogicalType::Varchar]);

        let chunks = run(&ctx, &prune).unwrap();
        assert_eq!(chunks.len(), 1);
        let out = &chunks[0];
        assert_eq!(out.column_count(), 2);
        assert_eq!(out.size(), 2);
        assert!(Arc::ptr_eq(out.column(0), &first));
        assert!(Arc::ptr_eq(out.column(1), &second));
        assert!(out.selection().unwrap().ptr_eq(&selection));
    }

    #[test]
    fn test_prune_on_empty_child() {
        let ctx = ExecutionContext::new();
        let empty = EmptyResultExec::new(vec![LogicalType::BigInt, LogicalType::Varchar]);
        let prune = PruneColumnsExec::try_new(Box::new(empty), 1).unwrap();
        let mut state = prune.get_initial_state();
        let mut chunk = DataChunk::new();
        prune.get_chunk(&ctx, &mut chunk, &mut state).unwrap();
        assert_eq!(chunk.size(), 0);
        assert!(state.finished);
    }

    #[test]
    fn test_prune_zero_columns_keeps_cardinality() {
        let ctx = ExecutionContext::new();
        let prune = PruneColumnsExec::try_new(Box::new(ChunkSourceExec::new(vec![wide_chunk()])), 0).unwrap();
        let chunks = run(&ctx, &prune).unwrap();
        assert_eq!(chunks[0].column_count(), 0);
        assert_eq!(chunks[0].size(), 3);
    }

    #[test]
    fn test_prune_rejects_too_many_columns() {
        let source = ChunkSourceExec::new(vec![wide_chunk()]);
        let err = PruneColumnsExec::try_new(Box::new(source), 4).unwrap_err();
        assert!(err.is_invalid_plan());
    }
}
