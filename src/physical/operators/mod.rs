//! Physical operators

mod cross_product;
mod delete;
mod empty;
mod filter;
mod hash_agg;
mod hash_join;
pub mod join;
mod limit;
mod project;
mod prune;
mod scan;
mod sort;
mod window;

pub use cross_product::{CrossProductExec, CrossProductState};
pub use delete::{DeleteExec, DeleteState};
pub use empty::EmptyResultExec;
pub use filter::FilterExec;
pub use hash_agg::{Accumulator, AggregateExpr, AggregateState, HashAggregateExec};
pub use hash_join::{HashJoinExec, HashJoinState};
pub use join::{
    construct_left_join_result, construct_mark_join_result, construct_semi_or_anti_join_result,
    JoinType,
};
pub use limit::{LimitExec, LimitState};
pub use project::ProjectExec;
pub use prune::PruneColumnsExec;
pub use scan::{ScanState, TableScanExec};
pub use sort::{OrderState, SortExec};
pub use window::{WindowExec, WindowState};

#[cfg(test)]
pub(crate) mod test_util {
    use super::ScanState;
    use crate::chunk::DataChunk;
    use crate::error::Result;
    use crate::execution::ExecutionContext;
    use crate::physical::plan::state_mismatch;
    use crate::physical::{LocalState, OperatorState, PhysicalOperator};
    use crate::types::{LogicalType, ScalarValue};
    use arrow::array::{Array, AsArray, Int64Array};
    use arrow::datatypes::Int64Type;
    use std::sync::Arc;

    /// Leaf that replays prepared chunks, selections included
    #[derive(Debug)]
    pub struct ChunkSourceExec {
        types: Vec<LogicalType>,
        chunks: Vec<DataChunk>,
    }

    impl ChunkSourceExec {
        pub fn new(chunks: Vec<DataChunk>) -> Self {
            let types = chunks.first().map(|c| c.types().to_vec()).unwrap_or_default();
            Self { types, chunks }
        }

        pub fn with_types(types: Vec<LogicalType>, chunks: Vec<DataChunk>) -> Self {
            Self { types, chunks }
        }
    }

    impl PhysicalOperator for ChunkSourceExec {
        fn types(&self) -> &[LogicalType] {
            &self.types
        }

        fn children(&self) -> Vec<&dyn PhysicalOperator> {
            vec![]
        }

        fn name(&self) -> &str {
            "ChunkSource"
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
            let LocalState::Scan(cursor) = &mut state.local else {
                return Err(state_mismatch(self.name()));
            };
            if let Some(next) = self.chunks.get(cursor.offset) {
                cursor.offset += 1;
                chunk.reference(next);
            }
            Ok(())
        }
    }

    /// Pull `op` to exhaustion with a fresh state
    pub fn run(ctx: &ExecutionContext, op: &dyn PhysicalOperator) -> Result<Vec<DataChunk>> {
        let mut state = op.get_initial_state();
        let mut chunks = Vec::new();
        loop {
            let mut chunk = DataChunk::new();
            op.get_chunk(ctx, &mut chunk, &mut state)?;
            if chunk.is_empty() {
                return Ok(chunks);
            }
            chunks.push(chunk);
        }
    }

    pub fn collect_i64(chunks: &[DataChunk], col: usize) -> Vec<Option<i64>> {
        let mut values = Vec::new();
        for chunk in chunks {
            let array = chunk.column(col).as_primitive::<Int64Type>();
            values.extend(
                chunk
                    .active_rows()
                    .map(|row| array.is_valid(row).then(|| array.value(row))),
            );
        }
        values
    }

    pub fn collect_values(chunks: &[DataChunk], col: usize) -> Vec<ScalarValue> {
        let mut values = Vec::new();
        for chunk in chunks {
            for row in chunk.active_rows() {
                values.push(ScalarValue::try_from_array(chunk.column(col).as_ref(), row).unwrap());
            }
        }
        values
    }

    pub fn int_chunk(values: Vec<i64>) -> DataChunk {
        DataChunk::try_from_arrays(vec![Arc::new(Int64Array::from(values))]).unwrap()
    }
}
