//! Physical operator abstraction and per-execution state

use crate::chunk::{ChunkCollection, DataChunk};
use crate::error::{QueryError, Result};
use crate::execution::{ExecutionContext, MemoryReservation};
use crate::physical::operators::{
    AggregateState, CrossProductState, DeleteState, HashJoinState, LimitState, OrderState,
    ScanState, WindowState,
};
use crate::types::LogicalType;
use std::fmt::Debug;
use tracing::trace;

/// Operator-specific cursor kept between `get_chunk` calls
#[derive(Debug, Default)]
pub enum LocalState {
    #[default]
    None,
    Scan(ScanState),
    Order(OrderState),
    Limit(LimitState),
    CrossProduct(CrossProductState),
    HashJoin(HashJoinState),
    Aggregate(AggregateState),
    Window(WindowState),
    Delete(DeleteState),
}

/// State of one pull sequence over one operator
///
/// Created by [`PhysicalOperator::get_initial_state`] and owned by the caller,
/// so the same compiled tree can serve many independent executions.
#[derive(Debug, Default)]
pub struct OperatorState {
    /// Buffer the first child writes into
    pub child_chunk: DataChunk,
    /// State of the first child, if any
    pub child_state: Option<Box<OperatorState>>,
    /// Set once the operator returned an empty chunk
    pub finished: bool,
    pub local: LocalState,
}

impl OperatorState {
    pub fn new(child: Option<&dyn PhysicalOperator>) -> Self {
        Self {
            child_chunk: DataChunk::new(),
            child_state: child.map(|c| Box::new(c.get_initial_state())),
            finished: false,
            local: LocalState::None,
        }
    }

    pub fn with_local(child: Option<&dyn PhysicalOperator>, local: LocalState) -> Self {
        Self {
            local,
            ..Self::new(child)
        }
    }

    /// Pull the next chunk of `child` into `child_chunk`
    pub fn fetch_child(&mut self, ctx: &ExecutionContext, child: &dyn PhysicalOperator) -> Result<()> {
        fetch_chunk(ctx, child, &mut self.child_chunk, &mut self.child_state)
    }
}

/// Pull the next chunk of `child` using its boxed state; split out of
/// [`OperatorState::fetch_child`] for operators that also borrow their local
/// state.
pub fn fetch_chunk(
    ctx: &ExecutionContext,
    child: &dyn PhysicalOperator,
    chunk: &mut DataChunk,
    child_state: &mut Option<Box<OperatorState>>,
) -> Result<()> {
    let child_state = child_state.as_deref_mut().ok_or_else(|| {
        QueryError::Internal(format!("{} has no state for its child", child.name()))
    })?;
    child.get_chunk(ctx, chunk, child_state)
}

/// Error for an operator handed a state it did not create
pub(crate) fn state_mismatch(name: &str) -> QueryError {
    QueryError::Internal(format!("{} received a state created by another operator", name))
}

/// Physical operator trait
///
/// Operators are immutable once built; everything that changes during
/// execution lives in the [`OperatorState`] passed to [`get_chunk`].
///
/// [`get_chunk`]: PhysicalOperator::get_chunk
pub trait PhysicalOperator: Debug + Send + Sync {
    /// Output column types
    fn types(&self) -> &[LogicalType];

    /// Get child operators
    fn children(&self) -> Vec<&dyn PhysicalOperator>;

    /// Name of this operator for display
    fn name(&self) -> &str;

    /// Operator parameters for display
    fn params(&self) -> String {
        String::new()
    }

    /// Fresh state for a new pull sequence
    fn get_initial_state(&self) -> OperatorState {
        OperatorState::new(self.children().first().copied())
    }

    /// Produce the next chunk into `chunk`, which arrives reset to this
    /// operator's types. Leaving it empty signals the end of the stream.
    fn compute_chunk(
        &self,
        ctx: &ExecutionContext,
        chunk: &mut DataChunk,
        state: &mut OperatorState,
    ) -> Result<()>;

    /// Pull the next chunk; once an empty chunk is returned every later call
    /// returns an empty chunk too.
    fn get_chunk(
        &self,
        ctx: &ExecutionContext,
        chunk: &mut DataChunk,
        state: &mut OperatorState,
    ) -> Result<()> {
        chunk.initialize_with_capacity(self.types(), ctx.config().chunk_capacity);
        if state.finished {
            return Ok(());
        }
        self.compute_chunk(ctx, chunk, state)?;
        if chunk.is_empty() {
            trace!(operator = self.name(), "Exhausted");
            state.finished = true;
        }
        if ctx.config().verify_chunks {
            chunk.verify()?;
        }
        Ok(())
    }
}

/// Pull `op` to exhaustion, buffering its output and accounting the bytes
pub fn collect_chunks(
    ctx: &ExecutionContext,
    op: &dyn PhysicalOperator,
    state: &mut OperatorState,
    reservation: &mut MemoryReservation,
) -> Result<ChunkCollection> {
    let mut collection = ChunkCollection::new(op.types().to_vec());
    let mut chunk = DataChunk::new();
    loop {
        op.get_chunk(ctx, &mut chunk, state)?;
        if chunk.is_empty() {
            break;
        }
        let bytes = collection.append(&chunk)?;
        reservation.try_grow(bytes)?;
    }
    trace!(
        operator = op.name(),
        rows = collection.count(),
        bytes = reservation.size(),
        "Buffered input"
    );
    Ok(collection)
}

/// Display helper for physical plans
pub fn display_plan(plan: &dyn PhysicalOperator, indent: usize) -> String {
    let params = plan.params();
    let mut result = if params.is_empty() {
        format!("{}{}\n", "  ".repeat(indent), plan.name())
    } else {
        format!("{}{}: {}\n", "  ".repeat(indent), plan.name(), params)
    };
    for child in plan.children() {
        result.push_str(&display_plan(child, indent + 1));
    }
    result
}
