//! Window operator

use super::hash_agg::Accumulator;
use crate::chunk::DataChunk;
use crate::error::{QueryError, Result};
use crate::execution::{ExecutionContext, MemoryReservation};
use crate::physical::evaluator::evaluate_expr;
use crate::physical::plan::{collect_chunks, state_mismatch};
use crate::physical::{LocalState, OperatorState, PhysicalOperator};
use crate::planner::{Expr, WindowExpr, WindowFunction};
use crate::types::{LogicalType, ScalarValue};
use arrow::array::{Array, ArrayRef};
use arrow::compute::{LexicographicalComparator, SortColumn, SortOptions};
use hashbrown::HashMap;
use std::cmp::Ordering;
use tracing::debug;

/// Input extended with the window results, and the emit cursor
#[derive(Debug, Default)]
pub struct WindowState {
    output: Option<Vec<ArrayRef>>,
    count: usize,
    position: usize,
    reservation: Option<MemoryReservation>,
}

/// Computes window functions over the whole input
///
/// Output is the child's columns followed by one column per window
/// expression, in input row order.
#[derive(Debug)]
pub struct WindowExec {
    input: Box<dyn PhysicalOperator>,
    windows: Vec<WindowExpr>,
    types: Vec<LogicalType>,
}

impl WindowExec {
    pub fn try_new(input: Box<dyn PhysicalOperator>, exprs: Vec<Expr>) -> Result<Self> {
        let mut types = input.types().to_vec();
        let mut windows = Vec::with_capacity(exprs.len());
        for expr in exprs {
            types.push(expr.resolve_type(input.types())?);
            match expr {
                Expr::Window(window) => windows.push(*window),
                other => {
                    return Err(QueryError::InvalidPlan(format!(
                        "{} is not a window function call",
                        other
                    )))
                }
            }
        }
        Ok(Self {
            input,
            windows,
            types,
        })
    }

    /// Evaluate one window expression over the materialized input
    fn compute(&self, input: &DataChunk, window: &WindowExpr, result_type: LogicalType) -> Result<ArrayRef> {
        let count = input.size();
        let partition_keys = window
            .partitions
            .iter()
            .map(|p| evaluate_expr(input, p))
            .collect::<Result<Vec<_>>>()?;
        let sort_columns = window
            .orders
            .iter()
            .map(|order| {
                Ok(SortColumn {
                    values: evaluate_expr(input, &order.expr)?,
                    options: Some(SortOptions {
                        descending: order.is_descending(),
                        nulls_first: order.is_nulls_first(),
                    }),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        let comparator = if sort_columns.is_empty() {
            None
        } else {
            Some(LexicographicalComparator::try_new(&sort_columns)?)
        };
        let args = window
            .args
            .iter()
            .map(|a| evaluate_expr(input, a))
            .collect::<Result<Vec<_>>>()?;

        // Partitions in first-seen order, rows in input order
        let mut index: HashMap<Vec<ScalarValue>, usize> = HashMap::new();
        let mut partitions: Vec<Vec<usize>> = Vec::new();
        for row in 0..count {
            let key = partition_keys
                .iter()
                .map(|k| ScalarValue::try_from_array(k.as_ref(), row))
                .collect::<Result<Vec<_>>>()?;
            let slot = *index.entry(key).or_insert_with(|| {
                partitions.push(Vec::new());
                partitions.len() - 1
            });
            partitions[slot].push(row);
        }

        let compare = |a: usize, b: usize| {
            comparator
                .as_ref()
                .map_or(Ordering::Equal, |c| c.compare(a, b))
        };
        let mut results = vec![ScalarValue::Null; count];
        for mut rows in partitions {
            rows.sort_by(|a, b| compare(*a, *b));
            // Peer groups: maximal runs of rows equal on the order keys
            let mut peers = Vec::new();
            let mut start = 0;
            for i in 1..=rows.len() {
                if i == rows.len() || compare(rows[i - 1], rows[i]) != Ordering::Equal {
                    peers.push(start..i);
                    start = i;
                }
            }

            match window.function {
                WindowFunction::RowNumber => {
                    for (i, row) in rows.iter().enumerate() {
                        results[*row] = ScalarValue::BigInt(i as i64 + 1);
                    }
                }
                WindowFunction::Rank | WindowFunction::DenseRank => {
                    for (group, range) in peers.into_iter().enumerate() {
                        let rank = match window.function {
                            WindowFunction::Rank => range.start as i64 + 1,
                            _ => group as i64 + 1,
                        };
                        for row in &rows[range] {
                            results[*row] = ScalarValue::BigInt(rank);
                        }
                    }
                }
                WindowFunction::Aggregate(func) => {
                    let mut acc = Accumulator::new(func, result_type);
                    let frames = if comparator.is_some() {
                        peers
                    } else {
                        vec![0..rows.len()]
                    };
                    for range in frames {
                        for row in &rows[range.clone()] {
                            match args.first() {
                                Some(arg) => {
                                    let value = ScalarValue::try_from_array(arg.as_ref(), *row)?;
                                    acc.update(Some(&value))?;
                                }
                                None => acc.update(None)?,
                            }
                        }
                        let value = acc.evaluate();
                        for row in &rows[range] {
                            results[*row] = value.clone();
                        }
                    }
                }
            }
        }
        ScalarValue::iter_to_array(result_type, results)
    }
}

impl PhysicalOperator for WindowExec {
    fn types(&self) -> &[LogicalType] {
        &self.types
    }

    fn children(&self) -> Vec<&dyn PhysicalOperator> {
        vec![self.input.as_ref()]
    }

    fn name(&self) -> &str {
        "Window"
    }

    fn params(&self) -> String {
        let exprs: Vec<String> = self
            .windows
            .iter()
            .map(|w| Expr::Window(Box::new(w.clone())).to_string())
            .collect();
        exprs.join(", ")
    }

    fn get_initial_state(&self) -> OperatorState {
        OperatorState::with_local(
            Some(self.input.as_ref()),
            LocalState::Window(WindowState::default()),
        )
    }

    fn compute_chunk(
        &self,
        ctx: &ExecutionContext,
        chunk: &mut DataChunk,
        state: &mut OperatorState,
    ) -> Result<()> {
        let OperatorState {
            child_state, local, ..
        } = state;
        let LocalState::Window(window) = local else {
            return Err(state_mismatch(self.name()));
        };

        if window.output.is_none() {
            let child_state = child_state
                .as_deref_mut()
                .ok_or_else(|| state_mismatch(self.name()))?;
            let mut reservation = ctx.memory_pool().reservation();
            let buffered = collect_chunks(ctx, self.input.as_ref(), child_state, &mut reservation)?;
            let count = buffered.count();
            let mut output = buffered.materialize()?;
            if count > 0 {
                let mut input = DataChunk::try_from_arrays(output.clone())?;
                // a zero-column input still has `count` rows
                input.set_cardinality(count);
                let input_columns = input.column_count();
                for (w, result_type) in self.windows.iter().zip(&self.types[input_columns..]) {
                    let column = self.compute(&input, w, *result_type)?;
                    reservation.try_grow(column.get_array_memory_size())?;
                    output.push(column);
                }
            }
            debug!(rows = count, windows = self.windows.len(), "Computed window functions");
            window.output = Some(output);
            window.count = count;
            window.reservation = Some(reservation);
        }

        let Some(output) = &window.output else {
            return Ok(());
        };
        if window.position >= window.count {
            return Ok(());
        }
        let len = chunk.capacity().min(window.count - window.position);
        for (i, column) in output.iter().enumerate() {
            chunk.set_column(i, column.slice(window.position, len))?;
        }
        chunk.set_cardinality(len);
        window.position += len;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physical::operators::test_util::{collect_i64, run, ChunkSourceExec};
    use crate::planner::{AggregateFunction, SortExpr};
    use arrow::array::{Int64Array, StringArray};
    use std::sync::Arc;

    // dept, salary
    fn staff() -> ChunkSourceExec {
        ChunkSourceExec::new(vec![DataChunk::try_from_arrays(vec![
            Arc::new(StringArray::from(vec!["x", "y", "x", "x", "y"])),
            Arc::new(Int64Array::from(vec![30, 10, 20, 30, 5])),
        ])
        .unwrap()])
    }

    fn dept() -> Expr {
        Expr::column(0, LogicalType::Varchar)
    }

    fn salary() -> Expr {
        Expr::column(1, LogicalType::BigInt)
    }

    fn ranked(function: WindowFunction, args: Vec<Expr>) -> Expr {
        Expr::window(
            WindowExpr::new(function, args)
                .partition_by(vec![dept()])
                .order_by(vec![SortExpr::new(salary()).desc()]),
        )
    }

    #[test]
    fn test_ranking_functions_keep_input_order() {
        let ctx = ExecutionContext::new();
        let window = WindowExec::try_new(
            Box::new(staff()),
            vec![
                ranked(WindowFunction::RowNumber, vec![]),
                ranked(WindowFunction::Rank, vec![]),
                ranked(WindowFunction::DenseRank, vec![]),
            ],
        )
        .unwrap();
        assert_eq!(window.types().len(), 5);
        let chunks = run(&ctx, &window).unwrap();
        assert_eq!(collect_i64(&chunks, 1), vec![Some(30), Some(10), Some(20), Some(30), Some(5)]);
        assert_eq!(collect_i64(&chunks, 2), vec![Some(1), Some(1), Some(3), Some(2), Some(2)]);
        assert_eq!(collect_i64(&chunks, 3), vec![Some(1), Some(1), Some(3), Some(1), Some(2)]);
        assert_eq!(collect_i64(&chunks, 4), vec![Some(1), Some(1), Some(2), Some(1), Some(2)]);
    }

    #[test]
    fn test_running_sum_includes_peers() {
        let ctx = ExecutionContext::new();
        let window = WindowExec::try_new(
            Box::new(staff()),
            vec![ranked(WindowFunction::Aggregate(AggregateFunction::Sum), vec![salary()])],
        )
        .unwrap();
        let chunks = run(&ctx, &window).unwrap();
        assert_eq!(collect_i64(&chunks, 2), vec![Some(60), Some(10), Some(80), Some(60), Some(15)]);
    }

    #[test]
    fn test_whole_partition_frame_without_order() {
        let ctx = ExecutionContext::new();
        let count = Expr::window(
            WindowExpr::new(WindowFunction::Aggregate(AggregateFunction::CountStar), vec![])
                .partition_by(vec![dept()]),
        );
        let window = WindowExec::try_new(Box::new(staff()), vec![count]).unwrap();
        let chunks = run(&ctx, &window).unwrap();
        assert_eq!(collect_i64(&chunks, 2), vec![Some(3), Some(2), Some(3), Some(3), Some(2)]);
    }

    #[test]
    fn test_empty_input() {
        let ctx = ExecutionContext::new();
        let input = ChunkSourceExec::with_types(vec![LogicalType::Varchar, LogicalType::BigInt], vec![]);
        let window = WindowExec::try_new(Box::new(input), vec![ranked(WindowFunction::RowNumber, vec![])])
            .unwrap();
        assert!(run(&ctx, &window).unwrap().is_empty());
    }

    #[test]
    fn test_rejects_plain_expression() {
        let err = WindowExec::try_new(Box::new(staff()), vec![salary()]).unwrap_err();
        assert!(err.is_invalid_plan());
    }

    #[test]
    fn test_zero_column_input_keeps_row_count() {
        let ctx = ExecutionContext::new();
        let mut rows = DataChunk::new();
        rows.set_cardinality(3);
        let input = ChunkSourceExec::with_types(vec![], vec![rows]);
        let row_number = Expr::window(WindowExpr::new(WindowFunction::RowNumber, vec![]));
        let window = WindowExec::try_new(Box::new(input), vec![row_number]).unwrap();
        let chunks = run(&ctx, &window).unwrap();
        assert_eq!(collect_i64(&chunks, 0), vec![Some(1), Some(2), Some(3)]);
    }
}
