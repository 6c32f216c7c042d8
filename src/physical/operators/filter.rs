//! Filter operator

use crate::chunk::DataChunk;
use crate::error::Result;
use crate::execution::ExecutionContext;
use crate::physical::evaluator;
use crate::physical::{OperatorState, PhysicalOperator};
use crate::planner::Expr;
use crate::types::LogicalType;

/// Keeps the rows for which every predicate is TRUE
///
/// Output columns alias the child's; only the selection vector changes.
#[derive(Debug)]
pub struct FilterExec {
    input: Box<dyn PhysicalOperator>,
    predicates: Vec<Expr>,
    types: Vec<LogicalType>,
}

impl FilterExec {
    pub fn new(input: Box<dyn PhysicalOperator>, predicates: Vec<Expr>) -> Self {
        let types = input.types().to_vec();
        Self {
            input,
            predicates,
            types,
        }
    }
}

impl PhysicalOperator for FilterExec {
    fn types(&self) -> &[LogicalType] {
        &self.types
    }

    fn children(&self) -> Vec<&dyn PhysicalOperator> {
        vec![self.input.as_ref()]
    }

    fn name(&self) -> &str {
        "Filter"
    }

    fn params(&self) -> String {
        let preds: Vec<String> = self.predicates.iter().map(|p| p.to_string()).collect();
        preds.join(" AND ")
    }

    fn compute_chunk(
        &self,
        ctx: &ExecutionContext,
        chunk: &mut DataChunk,
        state: &mut OperatorState,
    ) -> Result<()> {
        loop {
            state.fetch_child(ctx, self.input.as_ref())?;
            if state.child_chunk.is_empty() {
                return Ok(());
            }
            chunk.reference(&state.child_chunk);
            for predicate in &self.predicates {
                let selection = evaluator::select(chunk, predicate)?;
                chunk.select(selection);
                if chunk.is_empty() {
                    break;
                }
            }
            if !chunk.is_empty() {
                return Ok(());
            }
            chunk.reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::SelectionVector;
    use crate::physical::operators::test_util::{collect_i64, int_chunk, run, ChunkSourceExec};
    use crate::types::ScalarValue;
    use std::sync::Arc;

    fn gt(v: i64) -> Expr {
        Expr::column(0, LogicalType::BigInt).gt(Expr::literal(ScalarValue::BigInt(v)))
    }

    #[test]
    fn test_filter_skips_empty_chunks() {
        let ctx = ExecutionContext::new();
        let source = ChunkSourceExec::new(vec![
            int_chunk(vec![1, 2]),
            int_chunk(vec![3, 9]),
            int_chunk(vec![0]),
            int_chunk(vec![10, 4]),
        ]);
        let filter = FilterExec::new(Box::new(source), vec![gt(5)]);
        let chunks = run(&ctx, &filter).unwrap();
        assert_eq!(chunks.len(), 2);
        assert_eq!(collect_i64(&chunks, 0), vec![Some(9), Some(10)]);
    }

    #[test]
    fn test_filter_aliases_columns_and_narrows_selection() {
        let ctx = ExecutionContext::new();
        let mut input = int_chunk(vec![7, 1, 8, 9]);
        input.select(SelectionVector::new(vec![0, 1, 2]));
        let source_column = Arc::clone(input.column(0));
        let filter = FilterExec::new(
            Box::new(ChunkSourceExec::new(vec![input])),
            vec![gt(5), Expr::column(0, LogicalType::BigInt).lt(Expr::literal(ScalarValue::BigInt(8)))],
        );
        let chunks = run(&ctx, &filter).unwrap();
        assert_eq!(chunks.len(), 1);
        assert!(Arc::ptr_eq(chunks[0].column(0), &source_column));
        assert_eq!(chunks[0].selection().unwrap().as_slice(), &[0]);
    }
}
