//! Hash join operator

use crate::chunk::DataChunk;
use crate::error::{QueryError, Result};
use crate::execution::{ExecutionContext, MemoryReservation};
use crate::physical::evaluator::evaluate_expr;
use crate::physical::operators::join::{
    construct_left_join_result, construct_mark_join_result, construct_semi_or_anti_join_result,
    JoinType,
};
use crate::physical::plan::{collect_chunks, fetch_chunk, state_mismatch};
use crate::physical::{LocalState, OperatorState, PhysicalOperator};
use crate::planner::{common_type, Expr};
use crate::types::{LogicalType, ScalarValue};
use arrow::array::{ArrayRef, UInt32Array};
use arrow::compute;
use hashbrown::HashMap;
use tracing::debug;

/// Hash table over the materialized build (right) side
#[derive(Debug)]
struct BuildSide {
    columns: Vec<ArrayRef>,
    table: HashMap<Vec<ScalarValue>, Vec<u32>>,
    count: usize,
    /// Some build row had a NULL key
    has_null: bool,
}

/// Build side plus the output still owed for the current probe chunk
#[derive(Debug, Default)]
pub struct HashJoinState {
    build: Option<BuildSide>,
    /// (probe row, build row) pairs not yet emitted; `None` pads with NULLs
    pending: Vec<(u32, Option<u32>)>,
    pending_pos: usize,
    reservation: Option<MemoryReservation>,
}

/// Equi-join of a probe (left) child against a hashed build (right) child
#[derive(Debug)]
pub struct HashJoinExec {
    left: Box<dyn PhysicalOperator>,
    right: Box<dyn PhysicalOperator>,
    join_type: JoinType,
    left_keys: Vec<Expr>,
    right_keys: Vec<Expr>,
    types: Vec<LogicalType>,
}

impl HashJoinExec {
    /// Build a join; key pairs of different types are cast to a common type
    pub fn try_new(
        left: Box<dyn PhysicalOperator>,
        right: Box<dyn PhysicalOperator>,
        join_type: JoinType,
        on: Vec<(Expr, Expr)>,
    ) -> Result<Self> {
        if on.is_empty() {
            return Err(QueryError::InvalidPlan(
                "hash join requires at least one join condition".to_string(),
            ));
        }
        let mut left_keys = Vec::with_capacity(on.len());
        let mut right_keys = Vec::with_capacity(on.len());
        for (l, r) in on {
            let lt = l.resolve_type(left.types())?;
            let rt = r.resolve_type(right.types())?;
            let common = common_type(lt, rt).ok_or_else(|| {
                QueryError::Type(format!("cannot join {} with {}", lt, rt))
            })?;
            left_keys.push(if lt == common { l } else { l.cast_to(common) });
            right_keys.push(if rt == common { r } else { r.cast_to(common) });
        }
        let types = join_type.output_types(left.types(), right.types());
        Ok(Self {
            left,
            right,
            join_type,
            left_keys,
            right_keys,
            types,
        })
    }

    pub fn join_type(&self) -> JoinType {
        self.join_type
    }

    fn build(&self, ctx: &ExecutionContext, reservation: &mut MemoryReservation) -> Result<BuildSide> {
        let mut right_state = self.right.get_initial_state();
        let buffered = collect_chunks(ctx, self.right.as_ref(), &mut right_state, reservation)?;
        let count = buffered.count();
        let columns = buffered.materialize()?;

        let mut table: HashMap<Vec<ScalarValue>, Vec<u32>> = HashMap::new();
        let mut has_null = false;
        if count > 0 {
            let mut input = DataChunk::try_from_arrays(columns.clone())?;
            input.set_cardinality(count);
            let keys = self
                .right_keys
                .iter()
                .map(|k| evaluate_expr(&input, k))
                .collect::<Result<Vec<_>>>()?;
            for row in 0..count {
                match join_key(&keys, row)? {
                    Some(key) => table.entry(key).or_default().push(row as u32),
                    // NULL never equals anything
                    None => has_null = true,
                }
            }
            reservation.try_grow(build_table_bytes(table.len(), keys.len(), count))?;
        }
        debug!(
            rows = count,
            distinct_keys = table.len(),
            has_null,
            "Built join hash table"
        );
        Ok(BuildSide {
            columns,
            table,
            count,
            has_null,
        })
    }

    /// Emit up to one chunk of pending inner/left join pairs
    fn emit_pending(
        &self,
        build: &BuildSide,
        probe: &DataChunk,
        join: &mut HashJoinState,
        chunk: &mut DataChunk,
    ) -> Result<()> {
        let end = (join.pending_pos + chunk.capacity()).min(join.pending.len());
        let pairs = &join.pending[join.pending_pos..end];
        join.pending_pos = end;

        let left_indices = UInt32Array::from_iter_values(pairs.iter().map(|(l, _)| *l));
        let right_indices: UInt32Array = pairs.iter().map(|(_, r)| *r).collect();
        let left_columns = probe.column_count();
        for i in 0..left_columns {
            let column = compute::take(probe.column(i).as_ref(), &left_indices, None)?;
            chunk.set_column(i, column)?;
        }
        for (j, column) in build.columns.iter().enumerate() {
            let column = compute::take(column.as_ref(), &right_indices, None)?;
            chunk.set_column(left_columns + j, column)?;
        }
        chunk.set_cardinality(pairs.len());
        Ok(())
    }
}

/// Key of `row`, or `None` when any part is NULL
fn join_key(keys: &[ArrayRef], row: usize) -> Result<Option<Vec<ScalarValue>>> {
    let mut values = Vec::with_capacity(keys.len());
    for key in keys {
        let value = ScalarValue::try_from_array(key.as_ref(), row)?;
        if value.is_null() {
            return Ok(None);
        }
        values.push(value);
    }
    Ok(Some(values))
}

/// Heap held by a build table of `entries` distinct keys over `rows` rows
fn build_table_bytes(entries: usize, key_columns: usize, rows: usize) -> usize {
    let per_entry = std::mem::size_of::<Vec<ScalarValue>>()
        + std::mem::size_of::<Vec<u32>>()
        + std::mem::size_of::<ScalarValue>() * key_columns;
    entries * per_entry + rows * std::mem::size_of::<u32>()
}

impl PhysicalOperator for HashJoinExec {
    fn types(&self) -> &[LogicalType] {
        &self.types
    }

    fn children(&self) -> Vec<&dyn PhysicalOperator> {
        vec![self.left.as_ref(), self.right.as_ref()]
    }

    fn name(&self) -> &str {
        "HashJoin"
    }

    fn params(&self) -> String {
        let on: Vec<String> = self
            .left_keys
            .iter()
            .zip(&self.right_keys)
            .map(|(l, r)| format!("{} = {}", l, r))
            .collect();
        format!("{} on [{}]", self.join_type, on.join(", "))
    }

    fn get_initial_state(&self) -> OperatorState {
        OperatorState::with_local(
            Some(self.left.as_ref()),
            LocalState::HashJoin(HashJoinState::default()),
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
        let LocalState::HashJoin(join) = local else {
            return Err(state_mismatch(self.name()));
        };

        if join.build.is_none() {
            let mut reservation = ctx.memory_pool().reservation();
            join.build = Some(self.build(ctx, &mut reservation)?);
            join.reservation = Some(reservation);
        }
        let Some(build) = join.build.take() else {
            return Ok(());
        };
        let result = self.probe(ctx, &build, child_chunk, child_state, join, chunk);
        join.build = Some(build);
        result
    }
}

impl HashJoinExec {
    fn probe(
        &self,
        ctx: &ExecutionContext,
        build: &BuildSide,
        probe: &mut DataChunk,
        probe_state: &mut Option<Box<OperatorState>>,
        join: &mut HashJoinState,
        chunk: &mut DataChunk,
    ) -> Result<()> {
        loop {
            if join.pending_pos < join.pending.len() {
                return self.emit_pending(build, probe, join, chunk);
            }
            join.pending.clear();
            join.pending_pos = 0;

            if build.count == 0 && matches!(self.join_type, JoinType::Inner | JoinType::Semi) {
                return Ok(());
            }
            fetch_chunk(ctx, self.left.as_ref(), probe, probe_state)?;
            if probe.is_empty() {
                return Ok(());
            }

            if build.count == 0 {
                // Nothing can match: every probe row survives unchanged
                match self.join_type {
                    JoinType::Left => {
                        construct_left_join_result(probe, chunk, self.right.types())?
                    }
                    JoinType::Anti => chunk.reference(probe),
                    _ => {
                        let found = vec![false; probe.size()];
                        construct_mark_join_result(&[], probe, chunk, &found, false)?
                    }
                }
                return Ok(());
            }

            let keys = self
                .left_keys
                .iter()
                .map(|k| evaluate_expr(probe, k))
                .collect::<Result<Vec<_>>>()?;
            let mut found_match = Vec::with_capacity(probe.size());
            for row in probe.active_rows() {
                let matches = match join_key(&keys, row)? {
                    Some(key) => build.table.get(&key),
                    None => None,
                };
                found_match.push(matches.is_some());
                match (self.join_type, matches) {
                    (JoinType::Inner | JoinType::Left, Some(rows)) => join
                        .pending
                        .extend(rows.iter().map(|r| (row as u32, Some(*r)))),
                    (JoinType::Left, None) => join.pending.push((row as u32, None)),
                    _ => {}
                }
            }

            match self.join_type {
                JoinType::Inner | JoinType::Left => continue,
                JoinType::Semi | JoinType::Anti => {
                    let anti = self.join_type == JoinType::Anti;
                    construct_semi_or_anti_join_result(probe, chunk, &found_match, anti)?;
                    if chunk.is_empty() {
                        chunk.reset();
                        continue;
                    }
                }
                JoinType::Mark => {
                    construct_mark_join_result(&keys, probe, chunk, &found_match, build.has_null)?
                }
            }
            return Ok(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::ExecutionConfig;
    use crate::physical::operators::test_util::{collect_i64, collect_values, int_chunk, run, ChunkSourceExec};
    use arrow::array::{Array, Int32Array, Int64Array, StringArray};
    use std::sync::Arc;

    fn key(ty: LogicalType) -> Expr {
        Expr::column(0, ty)
    }

    fn on() -> Vec<(Expr, Expr)> {
        vec![(key(LogicalType::BigInt), key(LogicalType::BigInt))]
    }

    fn opt_chunk(values: Vec<Option<i64>>) -> DataChunk {
        DataChunk::try_from_arrays(vec![Arc::new(Int64Array::from(values))]).unwrap()
    }

    fn right_with_payload() -> ChunkSourceExec {
        ChunkSourceExec::new(vec![DataChunk::try_from_arrays(vec![
            Arc::new(Int64Array::from(vec![Some(1), Some(2), Some(2), None])),
            Arc::new(StringArray::from(vec!["one", "two", "deux", "null"])),
        ])
        .unwrap()])
    }

    #[test]
    fn test_inner_join_with_duplicates() {
        let ctx = ExecutionContext::new();
        let left = ChunkSourceExec::new(vec![opt_chunk(vec![Some(2), Some(3), None, Some(1)])]);
        let join = HashJoinExec::try_new(Box::new(left), Box::new(right_with_payload()), JoinType::Inner, on())
            .unwrap();
        let chunks = run(&ctx, &join).unwrap();
        assert_eq!(collect_i64(&chunks, 0), vec![Some(2), Some(2), Some(1)]);
        assert_eq!(
            collect_values(&chunks, 2),
            vec![
                ScalarValue::varchar("two"),
                ScalarValue::varchar("deux"),
                ScalarValue::varchar("one")
            ]
        );
    }

    #[test]
    fn test_inner_join_output_is_chunked() {
        let ctx = ExecutionContext::with_config(ExecutionConfig::new().with_chunk_capacity(2));
        let left = ChunkSourceExec::new(vec![int_chunk(vec![1, 1, 1])]);
        let right = ChunkSourceExec::new(vec![int_chunk(vec![1])]);
        let join = HashJoinExec::try_new(Box::new(left), Box::new(right), JoinType::Inner, on()).unwrap();
        let chunks = run(&ctx, &join).unwrap();
        assert_eq!(chunks.iter().map(|c| c.size()).collect::<Vec<_>>(), vec![2, 1]);
    }

    #[test]
    fn test_left_join_pads_with_nulls() {
        let ctx = ExecutionContext::new();
        let left = ChunkSourceExec::new(vec![opt_chunk(vec![Some(3), None, Some(1)])]);
        let join = HashJoinExec::try_new(Box::new(left), Box::new(right_with_payload()), JoinType::Left, on())
            .unwrap();
        let chunks = run(&ctx, &join).unwrap();
        assert_eq!(collect_i64(&chunks, 0), vec![Some(3), None, Some(1)]);
        assert_eq!(
            collect_values(&chunks, 2),
            vec![ScalarValue::Null, ScalarValue::Null, ScalarValue::varchar("one")]
        );
    }

    #[test]
    fn test_semi_and_anti_alias_left() {
        let ctx = ExecutionContext::new();
        for (join_type, expected) in [
            (JoinType::Semi, vec![Some(2), Some(1)]),
            (JoinType::Anti, vec![Some(3), None]),
        ] {
            let input = opt_chunk(vec![Some(2), Some(3), None, Some(1)]);
            let column = Arc::clone(input.column(0));
            let left = ChunkSourceExec::new(vec![input]);
            let join = HashJoinExec::try_new(Box::new(left), Box::new(right_with_payload()), join_type, on())
                .unwrap();
            let chunks = run(&ctx, &join).unwrap();
            assert!(Arc::ptr_eq(chunks[0].column(0), &column));
            assert_eq!(collect_i64(&chunks, 0), expected);
        }
    }

    #[test]
    fn test_mark_join_null_semantics() {
        let ctx = ExecutionContext::new();
        let left = ChunkSourceExec::new(vec![opt_chunk(vec![Some(1), Some(5), None])]);
        let right = ChunkSourceExec::new(vec![int_chunk(vec![1])]);
        let join = HashJoinExec::try_new(Box::new(left), Box::new(right), JoinType::Mark, on()).unwrap();
        let chunks = run(&ctx, &join).unwrap();
        assert_eq!(
            collect_values(&chunks, 1),
            vec![ScalarValue::Boolean(true), ScalarValue::Boolean(false), ScalarValue::Null]
        );

        let left = ChunkSourceExec::new(vec![opt_chunk(vec![Some(1), Some(5)])]);
        let right = ChunkSourceExec::new(vec![opt_chunk(vec![Some(1), None])]);
        let join = HashJoinExec::try_new(Box::new(left), Box::new(right), JoinType::Mark, on()).unwrap();
        let chunks = run(&ctx, &join).unwrap();
        assert_eq!(
            collect_values(&chunks, 1),
            vec![ScalarValue::Boolean(true), ScalarValue::Null]
        );
    }

    #[test]
    fn test_empty_build_side() {
        let ctx = ExecutionContext::new();
        let empty = || ChunkSourceExec::with_types(vec![LogicalType::BigInt], vec![]);
        let left = || ChunkSourceExec::new(vec![opt_chunk(vec![Some(1), None])]);

        let mark = HashJoinExec::try_new(Box::new(left()), Box::new(empty()), JoinType::Mark, on()).unwrap();
        let chunks = run(&ctx, &mark).unwrap();
        assert_eq!(
            collect_values(&chunks, 1),
            vec![ScalarValue::Boolean(false), ScalarValue::Boolean(false)]
        );

        let inner = HashJoinExec::try_new(Box::new(left()), Box::new(empty()), JoinType::Inner, on()).unwrap();
        assert!(run(&ctx, &inner).unwrap().is_empty());

        let anti = HashJoinExec::try_new(Box::new(left()), Box::new(empty()), JoinType::Anti, on()).unwrap();
        assert_eq!(collect_i64(&run(&ctx, &anti).unwrap(), 0), vec![Some(1), None]);

        let left_join = HashJoinExec::try_new(Box::new(left()), Box::new(empty()), JoinType::Left, on()).unwrap();
        let chunks = run(&ctx, &left_join).unwrap();
        assert_eq!(collect_values(&chunks, 1), vec![ScalarValue::Null, ScalarValue::Null]);
    }

    #[test]
    fn test_keys_of_different_width_are_coerced() {
        let ctx = ExecutionContext::new();
        let left = ChunkSourceExec::new(vec![DataChunk::try_from_arrays(vec![Arc::new(
            Int32Array::from(vec![1, 2]),
        )])
        .unwrap()]);
        let right = ChunkSourceExec::new(vec![int_chunk(vec![2])]);
        let join = HashJoinExec::try_new(
            Box::new(left),
            Box::new(right),
            JoinType::Semi,
            vec![(key(LogicalType::Integer), key(LogicalType::BigInt))],
        )
        .unwrap();
        let chunks = run(&ctx, &join).unwrap();
        assert_eq!(chunks[0].selection().unwrap().as_slice(), &[1]);
    }

    #[test]
    fn test_join_requires_condition() {
        let left = ChunkSourceExec::new(vec![]);
        let right = ChunkSourceExec::new(vec![]);
        let err = HashJoinExec::try_new(Box::new(left), Box::new(right), JoinType::Inner, vec![]).unwrap_err();
        assert!(err.is_invalid_plan());
    }

    #[test]
    fn test_build_reservation_covers_row_lists() {
        let ctx = ExecutionContext::new();
        let build_keys: ArrayRef = Arc::new(Int64Array::from(vec![7; 64]));
        let column_bytes = build_keys.get_array_memory_size();
        let right = ChunkSourceExec::new(vec![DataChunk::try_from_arrays(vec![build_keys]).unwrap()]);
        let left = ChunkSourceExec::new(vec![int_chunk(vec![7])]);
        let join = HashJoinExec::try_new(Box::new(left), Box::new(right), JoinType::Inner, on()).unwrap();

        let mut state = join.get_initial_state();
        let mut chunk = DataChunk::new();
        join.get_chunk(&ctx, &mut chunk, &mut state).unwrap();
        assert_eq!(chunk.size(), 64);
        // one key, 64 row ids
        assert!(ctx.memory_pool().used() >= column_bytes + 64 * std::mem::size_of::<u32>());

        drop(state);
        assert_eq!(ctx.memory_pool().used(), 0);
    }
}
