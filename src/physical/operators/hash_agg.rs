//! Hash aggregate operator

use crate::chunk::DataChunk;
use crate::error::{QueryError, Result};
use crate::execution::{ExecutionContext, MemoryReservation};
use crate::physical::evaluator::evaluate_expr;
use crate::physical::plan::{fetch_chunk, state_mismatch};
use crate::physical::{LocalState, OperatorState, PhysicalOperator};
use crate::planner::{AggregateFunction, Expr};
use crate::types::{LogicalType, ScalarValue};
use arrow::array::ArrayRef;
use hashbrown::HashMap;
use std::fmt;
use tracing::debug;

/// Aggregate function with its (optional) argument
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateExpr {
    pub func: AggregateFunction,
    pub arg: Option<Expr>,
    pub result_type: LogicalType,
}

impl AggregateExpr {
    /// Unpack an `Expr::Aggregate`, resolving its type against `input`
    pub fn try_new(expr: &Expr, input: &[LogicalType]) -> Result<Self> {
        let Expr::Aggregate { func, args } = expr else {
            return Err(QueryError::InvalidPlan(format!(
                "{} is not an aggregate function call",
                expr
            )));
        };
        let result_type = expr.resolve_type(input)?;
        Ok(Self {
            func: *func,
            arg: args.first().cloned(),
            result_type,
        })
    }
}

impl fmt::Display for AggregateExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.arg {
            Some(arg) => write!(f, "{}({})", self.func, arg),
            None => write!(f, "COUNT(*)"),
        }
    }
}

/// Running state of one aggregate for one group
#[derive(Debug, Clone)]
pub struct Accumulator {
    func: AggregateFunction,
    result_type: LogicalType,
    count: i64,
    int_sum: i64,
    float_sum: f64,
    extreme: ScalarValue,
}

impl Accumulator {
    pub fn new(func: AggregateFunction, result_type: LogicalType) -> Self {
        Self {
            func,
            result_type,
            count: 0,
            int_sum: 0,
            float_sum: 0.0,
            extreme: ScalarValue::Null,
        }
    }

    /// Fold one input value; `None` is a COUNT(*) row
    pub fn update(&mut self, value: Option<&ScalarValue>) -> Result<()> {
        let Some(value) = value else {
            self.count += 1;
            return Ok(());
        };
        if value.is_null() {
            return Ok(());
        }
        self.count += 1;
        match self.func {
            AggregateFunction::CountStar | AggregateFunction::Count => {}
            AggregateFunction::Sum if self.result_type == LogicalType::BigInt => {
                let v = value.as_i64().unwrap_or_default();
                self.int_sum = self.int_sum.checked_add(v).ok_or_else(|| {
                    QueryError::Execution("integer overflow in SUM".to_string())
                })?;
            }
            AggregateFunction::Sum | AggregateFunction::Avg => {
                self.float_sum += value.as_f64().unwrap_or_default();
            }
            AggregateFunction::Min => {
                if self.extreme.is_null() || *value < self.extreme {
                    self.extreme = value.clone();
                }
            }
            AggregateFunction::Max => {
                if self.extreme.is_null() || *value > self.extreme {
                    self.extreme = value.clone();
                }
            }
        }
        Ok(())
    }

    /// Final value; aggregates other than COUNT over no values are NULL
    pub fn evaluate(&self) -> ScalarValue {
        match self.func {
            AggregateFunction::CountStar | AggregateFunction::Count => {
                ScalarValue::BigInt(self.count)
            }
            _ if self.count == 0 => ScalarValue::Null,
            AggregateFunction::Sum if self.result_type == LogicalType::BigInt => {
                ScalarValue::BigInt(self.int_sum)
            }
            AggregateFunction::Sum => ScalarValue::double(self.float_sum),
            AggregateFunction::Avg => ScalarValue::double(self.float_sum / self.count as f64),
            AggregateFunction::Min | AggregateFunction::Max => self.extreme.clone(),
        }
    }
}

/// Aggregated output and the emit cursor
#[derive(Debug, Default)]
pub struct AggregateState {
    output: Option<Vec<ArrayRef>>,
    count: usize,
    position: usize,
    reservation: Option<MemoryReservation>,
}

/// Hash aggregate execution operator
///
/// Output columns are the group keys followed by the aggregates. Groups come
/// out in first-seen order.
#[derive(Debug)]
pub struct HashAggregateExec {
    input: Box<dyn PhysicalOperator>,
    group_by: Vec<Expr>,
    aggregates: Vec<AggregateExpr>,
    types: Vec<LogicalType>,
}

impl HashAggregateExec {
    pub fn try_new(
        input: Box<dyn PhysicalOperator>,
        group_by: Vec<Expr>,
        aggregates: Vec<Expr>,
    ) -> Result<Self> {
        let mut types = group_by
            .iter()
            .map(|g| g.resolve_type(input.types()))
            .collect::<Result<Vec<_>>>()?;
        let aggregates = aggregates
            .iter()
            .map(|a| AggregateExpr::try_new(a, input.types()))
            .collect::<Result<Vec<_>>>()?;
        types.extend(aggregates.iter().map(|a| a.result_type));
        Ok(Self {
            input,
            group_by,
            aggregates,
            types,
        })
    }

    fn new_accumulators(&self) -> Vec<Accumulator> {
        self.aggregates
            .iter()
            .map(|a| Accumulator::new(a.func, a.result_type))
            .collect()
    }

    fn aggregate(
        &self,
        ctx: &ExecutionContext,
        child_chunk: &mut DataChunk,
        child_state: &mut Option<Box<OperatorState>>,
        reservation: &mut MemoryReservation,
    ) -> Result<(Vec<ArrayRef>, usize)> {
        let mut index: HashMap<Vec<ScalarValue>, usize> = HashMap::new();
        let mut groups: Vec<(Vec<ScalarValue>, Vec<Accumulator>)> = Vec::new();
        let group_bytes = std::mem::size_of::<ScalarValue>() * (self.group_by.len() + 1)
            + std::mem::size_of::<Accumulator>() * self.aggregates.len();

        loop {
            fetch_chunk(ctx, self.input.as_ref(), child_chunk, child_state)?;
            if child_chunk.is_empty() {
                break;
            }
            let keys = self
                .group_by
                .iter()
                .map(|g| evaluate_expr(child_chunk, g))
                .collect::<Result<Vec<_>>>()?;
            let args = self
                .aggregates
                .iter()
                .map(|a| a.arg.as_ref().map(|e| evaluate_expr(child_chunk, e)).transpose())
                .collect::<Result<Vec<_>>>()?;

            for row in child_chunk.active_rows() {
                let key = keys
                    .iter()
                    .map(|k| ScalarValue::try_from_array(k.as_ref(), row))
                    .collect::<Result<Vec<_>>>()?;
                let slot = match index.get(&key) {
                    Some(slot) => *slot,
                    None => {
                        reservation.try_grow(group_bytes)?;
                        index.insert(key.clone(), groups.len());
                        groups.push((key, self.new_accumulators()));
                        groups.len() - 1
                    }
                };
                let accumulators = &mut groups[slot].1;
                for (acc, arg) in accumulators.iter_mut().zip(&args) {
                    match arg {
                        Some(array) => {
                            let value = ScalarValue::try_from_array(array.as_ref(), row)?;
                            acc.update(Some(&value))?
                        }
                        None => acc.update(None)?,
                    }
                }
            }
        }

        // An ungrouped aggregate over no rows still yields one row
        if groups.is_empty() && self.group_by.is_empty() {
            groups.push((Vec::new(), self.new_accumulators()));
        }

        let mut columns = Vec::with_capacity(self.types.len());
        for (i, ty) in self.types[..self.group_by.len()].iter().enumerate() {
            let values = groups.iter().map(|(key, _)| key[i].clone());
            columns.push(ScalarValue::iter_to_array(*ty, values)?);
        }
        for (j, agg) in self.aggregates.iter().enumerate() {
            let values = groups.iter().map(|(_, accs)| accs[j].evaluate());
            columns.push(ScalarValue::iter_to_array(agg.result_type, values)?);
        }
        debug!(groups = groups.len(), bytes = reservation.size(), "Aggregated input");
        Ok((columns, groups.len()))
    }
}

impl PhysicalOperator for HashAggregateExec {
    fn types(&self) -> &[LogicalType] {
        &self.types
    }

    fn children(&self) -> Vec<&dyn PhysicalOperator> {
        vec![self.input.as_ref()]
    }

    fn name(&self) -> &str {
        "HashAggregate"
    }

    fn params(&self) -> String {
        let groups: Vec<String> = self.group_by.iter().map(|g| g.to_string()).collect();
        let aggs: Vec<String> = self.aggregates.iter().map(|a| a.to_string()).collect();
        format!("groups=[{}], aggs=[{}]", groups.join(", "), aggs.join(", "))
    }

    fn get_initial_state(&self) -> OperatorState {
        OperatorState::with_local(
            Some(self.input.as_ref()),
            LocalState::Aggregate(AggregateState::default()),
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
        let LocalState::Aggregate(agg) = local else {
            return Err(state_mismatch(self.name()));
        };

        if agg.output.is_none() {
            let mut reservation = ctx.memory_pool().reservation();
            let (columns, count) = self.aggregate(ctx, child_chunk, child_state, &mut reservation)?;
            agg.output = Some(columns);
            agg.count = count;
            agg.reservation = Some(reservation);
        }
        let Some(output) = &agg.output else {
            return Ok(());
        };
        if agg.position >= agg.count {
            return Ok(());
        }
        let len = chunk.capacity().min(agg.count - agg.position);
        for (i, column) in output.iter().enumerate() {
            chunk.set_column(i, column.slice(agg.position, len))?;
        }
        chunk.set_cardinality(len);
        agg.position += len;
        Ok(())
    }
}
