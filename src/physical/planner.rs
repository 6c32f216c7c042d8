//! Physical planner - converts logical plans to physical plans

use crate::error::{QueryError, Result};
use crate::physical::operators::{
    CrossProductExec, DeleteExec, EmptyResultExec, FilterExec, HashAggregateExec, HashJoinExec,
    LimitExec, ProjectExec, PruneColumnsExec, SortExec, TableScanExec, WindowExec,
};
use crate::physical::PhysicalOperator;
use crate::planner::{Expr, LogicalNode, LogicalOperator};
use crate::types::LogicalType;
use tracing::debug;

/// Physical planner that converts logical plans to physical execution plans
#[derive(Debug, Default)]
pub struct PhysicalPlanner;

impl PhysicalPlanner {
    pub fn new() -> Self {
        Self
    }

    /// Compile a logical tree; the returned operator owns its whole subtree
    pub fn create_physical_plan(&self, logical: &LogicalOperator) -> Result<Box<dyn PhysicalOperator>> {
        let physical: Box<dyn PhysicalOperator> = match &logical.node {
            LogicalNode::Get { table, column_ids } => {
                expect_children(logical, 0)?;
                Box::new(TableScanExec::try_new(table.clone(), column_ids.clone())?)
            }

            LogicalNode::Filter { expressions } => {
                let input = self.compile_single_child(logical)?;
                for expr in expressions {
                    check_scalar(expr, "filter")?;
                    match expr.resolve_type(input.types())? {
                        LogicalType::Boolean | LogicalType::SqlNull => {}
                        other => {
                            return Err(QueryError::Type(format!(
                                "filter predicate {} has type {}",
                                expr, other
                            )))
                        }
                    }
                }
                Box::new(FilterExec::new(input, expressions.clone()))
            }

            LogicalNode::Projection { expressions } => {
                let input = self.compile_single_child(logical)?;
                let types = expressions
                    .iter()
                    .map(|expr| {
                        check_scalar(expr, "projection")?;
                        expr.resolve_type(input.types())
                    })
                    .collect::<Result<Vec<_>>>()?;
                Box::new(ProjectExec::new(input, expressions.clone(), types))
            }

            LogicalNode::Aggregate { groups, aggregates } => {
                let input = self.compile_single_child(logical)?;
                for group in groups {
                    check_scalar(group, "group")?;
                }
                for aggregate in aggregates {
                    if let Expr::Aggregate { args, .. } = aggregate {
                        for arg in args {
                            check_scalar(arg, "aggregate argument")?;
                        }
                    }
                }
                Box::new(HashAggregateExec::try_new(input, groups.clone(), aggregates.clone())?)
            }

            LogicalNode::Window { expressions } => {
                let input = self.compile_single_child(logical)?;
                Box::new(WindowExec::try_new(input, expressions.clone())?)
            }

            LogicalNode::Order { orders } => {
                let input = self.compile_single_child(logical)?;
                for order in orders {
                    check_scalar(&order.expr, "order")?;
                    order.expr.resolve_type(input.types())?;
                }
                Box::new(SortExec::new(input, orders.clone()))
            }

            LogicalNode::Limit { limit, offset } => {
                let input = self.compile_single_child(logical)?;
                Box::new(LimitExec::new(input, *limit, *offset))
            }

            LogicalNode::CrossProduct => {
                let (left, right) = self.compile_two_children(logical)?;
                Box::new(CrossProductExec::new(left, right))
            }

            LogicalNode::Join {
                join_type,
                conditions,
            } => {
                let (left, right) = self.compile_two_children(logical)?;
                for (l, r) in conditions {
                    check_scalar(l, "join condition")?;
                    check_scalar(r, "join condition")?;
                }
                Box::new(HashJoinExec::try_new(left, right, *join_type, conditions.clone())?)
            }

            LogicalNode::Delete { table } => {
                let input = self.compile_single_child(logical)?;
                Box::new(DeleteExec::try_new(input, table.clone())?)
            }

            LogicalNode::PruneColumns { column_limit } => {
                let input = self.compile_single_child(logical)?;
                Box::new(PruneColumnsExec::try_new(input, *column_limit)?)
            }

            LogicalNode::EmptyResult => {
                expect_children(logical, 0)?;
                Box::new(EmptyResultExec::new(logical.types.clone()))
            }
        };

        if physical.types() != logical.types.as_slice() {
            return Err(QueryError::InvalidPlan(format!(
                "{} produces {:?} but the plan expects {:?}",
                physical.name(),
                physical.types(),
                logical.types
            )));
        }
        debug!(
            logical = logical.node.name(),
            physical = physical.name(),
            "Compiled operator"
        );
        Ok(physical)
    }

    fn compile_single_child(&self, logical: &LogicalOperator) -> Result<Box<dyn PhysicalOperator>> {
        let children = expect_children(logical, 1)?;
        self.create_physical_plan(&children[0])
    }

    fn compile_two_children(
        &self,
        logical: &LogicalOperator,
    ) -> Result<(Box<dyn PhysicalOperator>, Box<dyn PhysicalOperator>)> {
        let children = expect_children(logical, 2)?;
        let left = self.create_physical_plan(&children[0])?;
        let right = self.create_physical_plan(&children[1])?;
        Ok((left, right))
    }
}

fn expect_children(logical: &LogicalOperator, count: usize) -> Result<&[LogicalOperator]> {
    if logical.children.len() != count {
        return Err(QueryError::InvalidPlan(format!(
            "{} expects {} children, got {}",
            logical.node.name(),
            count,
            logical.children.len()
        )));
    }
    Ok(&logical.children)
}

/// Aggregates and window functions are only valid directly under their own node
fn check_scalar(expr: &Expr, context: &str) -> Result<()> {
    if expr.contains_aggregate() || expr.contains_window() {
        return Err(QueryError::InvalidPlan(format!(
            "{} expression {} contains an aggregate or window function",
            context, expr
        )));
    }
    Ok(())
}
