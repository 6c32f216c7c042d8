//! Order (sort) operator

use crate::chunk::DataChunk;
use crate::error::Result;
use crate::execution::{ExecutionContext, MemoryReservation};
use crate::physical::evaluator::evaluate_expr;
use crate::physical::plan::{collect_chunks, state_mismatch};
use crate::physical::{LocalState, OperatorState, PhysicalOperator};
use crate::planner::SortExpr;
use crate::types::LogicalType;
use arrow::array::{ArrayRef, UInt32Array};
use arrow::compute::{self, LexicographicalComparator, SortColumn, SortOptions};
use tracing::debug;

/// Sorted output of an order operator and the emit cursor
#[derive(Debug, Default)]
pub struct OrderState {
    /// `None` until the child has been drained and sorted
    sorted: Option<Vec<ArrayRef>>,
    count: usize,
    position: usize,
    reservation: Option<MemoryReservation>,
}

/// Sort execution operator
///
/// Drains its child on the first pull, sorts stably by the order keys, then
/// emits the result in capacity-sized chunks.
#[derive(Debug)]
pub struct SortExec {
    input: Box<dyn PhysicalOperator>,
    order_by: Vec<SortExpr>,
    types: Vec<LogicalType>,
}

impl SortExec {
    pub fn new(input: Box<dyn PhysicalOperator>, order_by: Vec<SortExpr>) -> Self {
        let types = input.types().to_vec();
        Self {
            input,
            order_by,
            types,
        }
    }

    fn sort(&self, columns: Vec<ArrayRef>) -> Result<Vec<ArrayRef>> {
        if self.order_by.is_empty() {
            return Ok(columns);
        }
        let input = DataChunk::try_from_arrays(columns)?;
        let sort_columns = self
            .order_by
            .iter()
            .map(|order| {
                Ok(SortColumn {
                    values: evaluate_expr(&input, &order.expr)?,
                    options: Some(SortOptions {
                        descending: order.is_descending(),
                        nulls_first: order.is_nulls_first(),
                    }),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let comparator = LexicographicalComparator::try_new(&sort_columns)?;
        let mut indices: Vec<u32> = (0..input.size() as u32).collect();
        // sort_by is stable, so equal keys keep their input order
        indices.sort_by(|a, b| comparator.compare(*a as usize, *b as usize));
        let indices = UInt32Array::from(indices);

        input
            .columns()
            .iter()
            .map(|c| compute::take(c.as_ref(), &indices, None).map_err(Into::into))
            .collect()
    }
}

impl PhysicalOperator for SortExec {
    fn types(&self) -> &[LogicalType] {
        &self.types
    }

    fn children(&self) -> Vec<&dyn PhysicalOperator> {
        vec![self.input.as_ref()]
    }

    fn name(&self) -> &str {
        "Order"
    }

    fn params(&self) -> String {
        let orders: Vec<String> = self.order_by.iter().map(|o| o.to_string()).collect();
        orders.join(", ")
    }

    fn get_initial_state(&self) -> OperatorState {
        OperatorState::with_local(
            Some(self.input.as_ref()),
            LocalState::Order(OrderState::default()),
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
        let LocalState::Order(order) = local else {
            return Err(state_mismatch(self.name()));
        };

        if order.sorted.is_none() {
            let child_state = child_state
                .as_deref_mut()
                .ok_or_else(|| state_mismatch(self.name()))?;
            let mut reservation = ctx.memory_pool().reservation();
            let buffered = collect_chunks(ctx, self.input.as_ref(), child_state, &mut reservation)?;
            order.count = buffered.count();
            let sorted = self.sort(buffered.materialize()?)?;
            debug!(rows = order.count, bytes = reservation.size(), "Sorted input");
            order.sorted = Some(sorted);
            order.reservation = Some(reservation);
        }

        let Some(sorted) = &order.sorted else {
            return Ok(());
        };
        if order.position >= order.count {
            return Ok(());
        }
        let len = chunk.capacity().min(order.count - order.position);
        for (i, column) in sorted.iter().enumerate() {
            chunk.set_column(i, column.slice(order.position, len))?;
        }
        chunk.set_cardinality(len);
        order.position += len;
        Ok(())
    }
}
