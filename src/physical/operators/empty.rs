//! Empty result operator

use crate::chunk::DataChunk;
use crate::error::Result;
use crate::execution::ExecutionContext;
use crate::physical::{OperatorState, PhysicalOperator};
use crate::types::LogicalType;

/// Produces no rows
#[derive(Debug)]
pub struct EmptyResultExec {
    types: Vec<LogicalType>,
}

impl EmptyResultExec {
    pub fn new(types: Vec<LogicalType>) -> Self {
        Self { types }
    }
}

impl PhysicalOperator for EmptyResultExec {
    fn types(&self) -> &[LogicalType] {
        &self.types
    }

    fn children(&self) -> Vec<&dyn PhysicalOperator> {
        vec![]
    }

    fn name(&self) -> &str {
        "EmptyResult"
    }

    fn compute_chunk(
        &self,
        _ctx: &ExecutionContext,
        _chunk: &mut DataChunk,
        _state: &mut OperatorState,
    ) -> Result<()> {
        Ok(())
    }
}
