//! Cross product operator

use crate::chunk::DataChunk;
use crate::error::Result;
use crate::execution::{ExecutionContext, MemoryReservation};
use crate::physical::plan::{collect_chunks, fetch_chunk, state_mismatch};
use crate::physical::{LocalState, OperatorState, PhysicalOperator};
use crate::types::{LogicalType, ScalarValue};
use arrow::array::ArrayRef;

/// Materialized right side and the position within it
#[derive(Debug, Default)]
pub struct CrossProductState {
    right: Option<Vec<ArrayRef>>,
    right_count: usize,
    /// Next right row to pair with the current left chunk
    position: usize,
    has_left: bool,
    reservation: Option<MemoryReservation>,
}

/// Pairs every left row with every right row
///
/// The right child is buffered; for each left chunk and each right row the
/// output aliases the left columns and broadcasts the right row.
#[derive(Debug)]
pub struct CrossProductExec {
    left: Box<dyn PhysicalOperator>,
    right: Box<dyn PhysicalOperator>,
    types: Vec<LogicalType>,
}

impl CrossProductExec {
    pub fn new(left: Box<dyn PhysicalOperator>, right: Box<dyn PhysicalOperator>) -> Self {
        let types = left.types().iter().chain(right.types()).copied().collect();
        Self { left, right, types }
    }
}

impl PhysicalOperator for CrossProductExec {
    fn types(&self) -> &[LogicalType] {
        &self.types
    }

    fn children(&self) -> Vec<&dyn PhysicalOperator> {
        vec![self.left.as_ref(), self.right.as_ref()]
    }

    fn name(&self) -> &str {
        "CrossProduct"
    }

    fn get_initial_state(&self) -> OperatorState {
        OperatorState::with_local(
            Some(self.left.as_ref()),
            LocalState::CrossProduct(CrossProductState::default()),
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
        let LocalState::CrossProduct(cross) = local else {
            return Err(state_mismatch(self.name()));
        };

        if cross.right.is_none() {
            let mut right_state = self.right.get_initial_state();
            let mut reservation = ctx.memory_pool().reservation();
            let buffered = collect_chunks(ctx, self.right.as_ref(), &mut right_state, &mut reservation)?;
            cross.right_count = buffered.count();
            cross.right = Some(buffered.materialize()?);
            cross.reservation = Some(reservation);
        }
        let Some(right) = &cross.right else {
            return Ok(());
        };
        if cross.right_count == 0 {
            return Ok(());
        }

        if !cross.has_left || cross.position >= cross.right_count {
            fetch_chunk(ctx, self.left.as_ref(), child_chunk, child_state)?;
            if child_chunk.is_empty() {
                return Ok(());
            }
            cross.has_left = true;
            cross.position = 0;
        }

        let row = cross.position;
        cross.position += 1;
        let left_columns = child_chunk.column_count();
        for i in 0..left_columns {
            chunk.reference_column(i, child_chunk, i)?;
        }
        let len = child_chunk.physical_len();
        let right_types = &self.types[left_columns..];
        for (j, (column, ty)) in right.iter().zip(right_types).enumerate() {
            let value = ScalarValue::try_from_array(column.as_ref(), row)?;
            chunk.set_column(left_columns + j, value.to_array_of_type(*ty, len))?;
        }
        chunk.set_cardinality_from(child_chunk);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physical::operators::test_util::{collect_i64, collect_values, int_chunk, run, ChunkSourceExec};
    use arrow::array::StringArray;
    use std::sync::Arc;

    fn right() -> ChunkSourceExec {
        ChunkSourceExec::new(vec![DataChunk::try_from_arrays(vec![Arc::new(StringArray::from(
            vec![Some("x"), None],
        ))])
        .unwrap()])
    }

    #[test]
    fn test_cross_product_pairs_every_row() {
        let ctx = ExecutionContext::new();
        let left = ChunkSourceExec::new(vec![int_chunk(vec![1, 2]), int_chunk(vec![3])]);
        let cross = CrossProductExec::new(Box::new(left), Box::new(right()));
        assert_eq!(cross.types(), &[LogicalType::BigInt, LogicalType::Varchar]);

        let chunks = run(&ctx, &cross).unwrap();
        assert_eq!(chunks.len(), 4);
        assert_eq!(
            collect_i64(&chunks, 0),
            vec![Some(1), Some(2), Some(1), Some(2), Some(3), Some(3)]
        );
        assert_eq!(
            collect_values(&chunks, 1),
            vec![
                ScalarValue::varchar("x"),
                ScalarValue::varchar("x"),
                ScalarValue::Null,
                ScalarValue::Null,
                ScalarValue::varchar("x"),
                ScalarValue::Null,
            ]
        );
    }

    #[test]
    fn test_empty_right_side() {
        let ctx = ExecutionContext::new();
        let left = ChunkSourceExec::new(vec![int_chunk(vec![1, 2])]);
        let right = ChunkSourceExec::with_types(vec![LogicalType::Varchar], vec![]);
        let cross = CrossProductExec::new(Box::new(left), Box::new(right));
        assert!(run(&ctx, &cross).unwrap().is_empty());
    }
}
