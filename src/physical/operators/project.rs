//! Projection operator

use crate::chunk::DataChunk;
use crate::error::Result;
use crate::execution::ExecutionContext;
use crate::physical::evaluator::evaluate_expr;
use crate::physical::{OperatorState, PhysicalOperator};
use crate::planner::Expr;
use crate::types::LogicalType;

/// Projection execution operator
///
/// Evaluates one output column per expression over the child's physical rows
/// and passes the child's selection vector through unchanged.
#[derive(Debug)]
pub struct ProjectExec {
    input: Box<dyn PhysicalOperator>,
    exprs: Vec<Expr>,
    types: Vec<LogicalType>,
}

impl ProjectExec {
    pub fn new(input: Box<dyn PhysicalOperator>, exprs: Vec<Expr>, types: Vec<LogicalType>) -> Self {
        Self { input, exprs, types }
    }
}

impl PhysicalOperator for ProjectExec {
    fn types(&self) -> &[LogicalType] {
        &self.types
    }

    fn children(&self) -> Vec<&dyn PhysicalOperator> {
        vec![self.input.as_ref()]
    }

    fn name(&self) -> &str {
        "Projection"
    }

    fn params(&self) -> String {
        let exprs: Vec<String> = self.exprs.iter().map(|e| e.to_string()).collect();
        exprs.join(", ")
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
        for (i, expr) in self.exprs.iter().enumerate() {
            chunk.set_column(i, evaluate_expr(child, expr)?)?;
        }
        chunk.set_cardinality_from(child);
        Ok(())
    }
}
