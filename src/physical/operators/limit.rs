//! Limit operator

use crate::chunk::DataChunk;
use crate::error::Result;
use crate::execution::ExecutionContext;
use crate::physical::plan::{fetch_chunk, state_mismatch};
use crate::physical::{LocalState, OperatorState, PhysicalOperator};
use crate::types::LogicalType;

/// Rows of the child seen so far
#[derive(Debug, Default)]
pub struct LimitState {
    current_offset: usize,
}

/// Limit execution operator
#[derive(Debug)]
pub struct LimitExec {
    input: Box<dyn PhysicalOperator>,
    limit: Option<usize>,
    offset: usize,
    types: Vec<LogicalType>,
}

impl LimitExec {
    pub fn new(input: Box<dyn PhysicalOperator>, limit: Option<usize>, offset: usize) -> Self {
        let types = input.types().to_vec();
        Self {
            input,
            limit,
            offset,
            types,
        }
    }
}

impl PhysicalOperator for LimitExec {
    fn types(&self) -> &[LogicalType] {
        &self.types
    }

    fn children(&self) -> Vec<&dyn PhysicalOperator> {
        vec![self.input.as_ref()]
    }

    fn name(&self) -> &str {
        "Limit"
    }

    fn params(&self) -> String {
        match self.limit {
            Some(limit) => format!("limit={}, offset={}", limit, self.offset),
            None => format!("offset={}", self.offset),
        }
    }

    fn get_initial_state(&self) -> OperatorState {
        OperatorState::with_local(
            Some(self.input.as_ref()),
            LocalState::Limit(LimitState::default()),
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
        let LocalState::Limit(limit) = local else {
            return Err(state_mismatch(self.name()));
        };
        let end = self.limit.map(|l| self.offset.saturating_add(l));

        loop {
            // Stop pulling once the window is satisfied
            if end.is_some_and(|end| limit.current_offset >= end) {
                return Ok(());
            }
            fetch_chunk(ctx, self.input.as_ref(), child_chunk, child_state)?;
            let size = child_chunk.size();
            if size == 0 {
                return Ok(());
            }
            let start = limit.current_offset;
            limit.current_offset += size;

            let lo = self.offset.saturating_sub(start).min(size);
            let hi = end.map_or(size, |end| end.saturating_sub(start).min(size));
            if hi <= lo {
                continue;
            }
            if lo == 0 && hi == size {
                chunk.reference(child_chunk);
            } else {
                chunk.reference(&child_chunk.slice(lo, hi - lo)?);
            }
            return Ok(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::SelectionVector;
    use crate::physical::operators::test_util::{collect_i64, int_chunk, run, ChunkSourceExec};

    fn source() -> ChunkSourceExec {
        ChunkSourceExec::new(vec![
            int_chunk(vec![0, 1, 2]),
            int_chunk(vec![3, 4, 5]),
            int_chunk(vec![6, 7, 8]),
        ])
    }

    #[test]
    fn test_limit_with_offset_across_chunks() {
        let ctx = ExecutionContext::new();
        let limit = LimitExec::new(Box::new(source()), Some(4), 2);
        let chunks = run(&ctx, &limit).unwrap();
        assert_eq!(collect_i64(&chunks, 0), vec![Some(2), Some(3), Some(4), Some(5)]);
    }

    #[test]
    fn test_offset_only() {
        let ctx = ExecutionContext::new();
        let limit = LimitExec::new(Box::new(source()), None, 7);
        let chunks = run(&ctx, &limit).unwrap();
        assert_eq!(collect_i64(&chunks, 0), vec![Some(7), Some(8)]);
    }

    #[test]
    fn test_limit_zero() {
        let ctx = ExecutionContext::new();
        let limit = LimitExec::new(Box::new(source()), Some(0), 0);
        assert!(run(&ctx, &limit).unwrap().is_empty());
    }

    #[test]
    fn test_whole_chunk_keeps_selection() {
        let ctx = ExecutionContext::new();
        let mut input = int_chunk(vec![10, 11, 12, 13]);
        let selection = SelectionVector::new(vec![1, 3]);
        input.select(selection.clone());
        let limit = LimitExec::new(Box::new(ChunkSourceExec::new(vec![input])), Some(5), 0);
        let chunks = run(&ctx, &limit).unwrap();
        assert!(chunks[0].selection().unwrap().ptr_eq(&selection));
        assert_eq!(collect_i64(&chunks, 0), vec![Some(11), Some(13)]);
    }

    #[test]
    fn test_partial_chunk_narrows_selection() {
        let ctx = ExecutionContext::new();
        let mut input = int_chunk(vec![10, 11, 12, 13]);
        input.select(SelectionVector::new(vec![0, 2, 3]));
        let limit = LimitExec::new(Box::new(ChunkSourceExec::new(vec![input])), Some(1), 1);
        let chunks = run(&ctx, &limit).unwrap();
        assert_eq!(chunks[0].selection().unwrap().as_slice(), &[2]);
    }

    #[test]
    fn test_stops_pulling_once_satisfied() {
        let ctx = ExecutionContext::new();
        let limit = LimitExec::new(Box::new(source()), Some(3), 0);
        let mut state = limit.get_initial_state();
        let mut chunk = DataChunk::new();
        limit.get_chunk(&ctx, &mut chunk, &mut state).unwrap();
        assert_eq!(chunk.size(), 3);
        limit.get_chunk(&ctx, &mut chunk, &mut state).unwrap();
        assert_eq!(chunk.size(), 0);
        // The source was pulled exactly once
        assert!(!state.child_state.as_ref().unwrap().finished);
    }
}
