//! Logical operator tree consumed by the physical planner

use crate::error::{QueryError, Result};
use crate::planner::{Expr, SortExpr};
use crate::storage::TableProvider;
use crate::types::LogicalType;
use std::fmt;
use std::sync::Arc;

/// Join types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JoinType {
    Inner,
    Left,
    Semi,
    Anti,
    /// Left rows plus a BOOLEAN "has a match" column, used for IN / EXISTS
    Mark,
}

impl JoinType {
    /// Output column types of a join between `left` and `right`
    pub fn output_types(&self, left: &[LogicalType], right: &[LogicalType]) -> Vec<LogicalType> {
        match self {
            JoinType::Inner | JoinType::Left => left.iter().chain(right).copied().collect(),
            JoinType::Semi | JoinType::Anti => left.to_vec(),
            JoinType::Mark => {
                let mut types = left.to_vec();
                types.push(LogicalType::Boolean);
                types
            }
        }
    }
}

impl fmt::Display for JoinType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JoinType::Inner => write!(f, "INNER"),
            JoinType::Left => write!(f, "LEFT"),
            JoinType::Semi => write!(f, "SEMI"),
            JoinType::Anti => write!(f, "ANTI"),
            JoinType::Mark => write!(f, "MARK"),
        }
    }
}

/// Column read by a table scan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnId {
    Column(usize),
    /// Physical row id of the row, as BIGINT
    RowId,
}

/// Operator-specific payload of a logical operator
#[derive(Debug, Clone)]
pub enum LogicalNode {
    /// Table scan
    Get {
        table: Arc<dyn TableProvider>,
        column_ids: Vec<ColumnId>,
    },
    /// Conjunction of predicates
    Filter { expressions: Vec<Expr> },
    /// One output column per expression
    Projection { expressions: Vec<Expr> },
    /// GROUP BY; output is the groups followed by the aggregates
    Aggregate {
        groups: Vec<Expr>,
        aggregates: Vec<Expr>,
    },
    /// Child columns followed by one column per window expression
    Window { expressions: Vec<Expr> },
    Order { orders: Vec<SortExpr> },
    Limit { limit: Option<usize>, offset: usize },
    CrossProduct,
    /// Equi-join; each condition pairs a left expression with a right one
    Join {
        join_type: JoinType,
        conditions: Vec<(Expr, Expr)>,
    },
    /// Deletes the rows whose ids arrive in the child's last column
    Delete { table: Arc<dyn TableProvider> },
    /// Keep the first `column_limit` columns of the child
    PruneColumns { column_limit: usize },
    EmptyResult,
}

impl LogicalNode {
    pub fn name(&self) -> &'static str {
        match self {
            LogicalNode::Get { .. } => "Get",
            LogicalNode::Filter { .. } => "Filter",
            LogicalNode::Projection { .. } => "Projection",
            LogicalNode::Aggregate { .. } => "Aggregate",
            LogicalNode::Window { .. } => "Window",
            LogicalNode::Order { .. } => "Order",
            LogicalNode::Limit { .. } => "Limit",
            LogicalNode::CrossProduct => "CrossProduct",
            LogicalNode::Join { .. } => "Join",
            LogicalNode::Delete { .. } => "Delete",
            LogicalNode::PruneColumns { .. } => "PruneColumns",
            LogicalNode::EmptyResult => "EmptyResult",
        }
    }
}

/// A node of the logical plan: payload, children and resolved output types
///
/// The builder methods resolve output types as they go and reject malformed
/// payloads; [`LogicalOperator::new`] trusts its caller.
#[derive(Debug, Clone)]
pub struct LogicalOperator {
    pub node: LogicalNode,
    pub children: Vec<LogicalOperator>,
    pub types: Vec<LogicalType>,
}

impl LogicalOperator {
    pub fn new(node: LogicalNode, children: Vec<LogicalOperator>, types: Vec<LogicalType>) -> Self {
        Self {
            node,
            children,
            types,
        }
    }

    /// Scan `column_ids` of `table`
    pub fn get(table: Arc<dyn TableProvider>, column_ids: Vec<ColumnId>) -> Result<Self> {
        let table_types = table.types();
        let types = column_ids
            .iter()
            .map(|id| match id {
                ColumnId::RowId => Ok(LogicalType::BigInt),
                ColumnId::Column(i) => table_types.get(*i).copied().ok_or_else(|| {
                    QueryError::InvalidPlan(format!(
                        "table {} has no column {}",
                        table.name(),
                        i
                    ))
                }),
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(LogicalNode::Get { table, column_ids }, vec![], types))
    }

    /// Scan every column of `table`
    pub fn scan(table: Arc<dyn TableProvider>) -> Result<Self> {
        let column_ids = (0..table.types().len()).map(ColumnId::Column).collect();
        Self::get(table, column_ids)
    }

    pub fn empty_result(types: Vec<LogicalType>) -> Self {
        Self::new(LogicalNode::EmptyResult, vec![], types)
    }

    pub fn filter(self, expressions: Vec<Expr>) -> Result<Self> {
        for expr in &expressions {
            match expr.resolve_type(&self.types)? {
                LogicalType::Boolean | LogicalType::SqlNull => {}
                other => {
                    return Err(QueryError::Type(format!(
                        "filter predicate {} has type {}",
                        expr, other
                    )))
                }
            }
        }
        let types = self.types.clone();
        Ok(Self::new(LogicalNode::Filter { expressions }, vec![self], types))
    }

    pub fn project(self, expressions: Vec<Expr>) -> Result<Self> {
        let types = resolve_all(&expressions, &self.types)?;
        Ok(Self::new(LogicalNode::Projection { expressions }, vec![self], types))
    }

    pub fn aggregate(self, groups: Vec<Expr>, aggregates: Vec<Expr>) -> Result<Self> {
        let mut types = resolve_all(&groups, &self.types)?;
        types.extend(resolve_all(&aggregates, &self.types)?);
        Ok(Self::new(
            LogicalNode::Aggregate { groups, aggregates },
            vec![self],
            types,
        ))
    }

    pub fn window(self, expressions: Vec<Expr>) -> Result<Self> {
        let mut types = self.types.clone();
        types.extend(resolve_all(&expressions, &self.types)?);
        Ok(Self::new(LogicalNode::Window { expressions }, vec![self], types))
    }

    pub fn order(self, orders: Vec<SortExpr>) -> Result<Self> {
        for order in &orders {
            order.expr.resolve_type(&self.types)?;
        }
        let types = self.types.clone();
        Ok(Self::new(LogicalNode::Order { orders }, vec![self], types))
    }

    pub fn limit(self, limit: Option<usize>, offset: usize) -> Self {
        let types = self.types.clone();
        Self::new(LogicalNode::Limit { limit, offset }, vec![self], types)
    }

    pub fn cross_product(self, right: LogicalOperator) -> Self {
        let types = JoinType::Inner.output_types(&self.types, &right.types);
        Self::new(LogicalNode::CrossProduct, vec![self, right], types)
    }

    pub fn join(
        self,
        right: LogicalOperator,
        join_type: JoinType,
        conditions: Vec<(Expr, Expr)>,
    ) -> Result<Self> {
        for (l, r) in &conditions {
            l.resolve_type(&self.types)?;
            r.resolve_type(&right.types)?;
        }
        let types = join_type.output_types(&self.types, &right.types);
        Ok(Self::new(
            LogicalNode::Join {
                join_type,
                conditions,
            },
            vec![self, right],
            types,
        ))
    }

    pub fn delete(self, table: Arc<dyn TableProvider>) -> Self {
        Self::new(LogicalNode::Delete { table }, vec![self], vec![LogicalType::BigInt])
    }

    pub fn prune_columns(self, column_limit: usize) -> Result<Self> {
        if column_limit > self.types.len() {
            return Err(QueryError::InvalidPlan(format!(
                "cannot keep {} columns of an input with {}",
                column_limit,
                self.types.len()
            )));
        }
        let types = self.types[..column_limit].to_vec();
        Ok(Self::new(LogicalNode::PruneColumns { column_limit }, vec![self], types))
    }

    fn fmt_indent(&self, f: &mut fmt::Formatter<'_>, indent: usize) -> fmt::Result {
        let prefix = "  ".repeat(indent);
        let join = |exprs: &[Expr]| exprs.iter().map(|e| e.to_string()).collect::<Vec<_>>().join(", ");

        match &self.node {
            LogicalNode::Get { table, column_ids } => {
                let cols: Vec<String> = column_ids
                    .iter()
                    .map(|c| match c {
                        ColumnId::Column(i) => format!("#{}", i),
                        ColumnId::RowId => "rowid".to_string(),
                    })
                    .collect();
                writeln!(f, "{}Get: {} [{}]", prefix, table.name(), cols.join(", "))?;
            }
            LogicalNode::Filter { expressions } => {
                writeln!(f, "{}Filter: {}", prefix, join(expressions))?
            }
            LogicalNode::Projection { expressions } => {
                writeln!(f, "{}Projection: [{}]", prefix, join(expressions))?
            }
            LogicalNode::Aggregate { groups, aggregates } => writeln!(
                f,
                "{}Aggregate: groups=[{}], aggregates=[{}]",
                prefix,
                join(groups),
                join(aggregates)
            )?,
            LogicalNode::Window { expressions } => {
                writeln!(f, "{}Window: [{}]", prefix, join(expressions))?
            }
            LogicalNode::Order { orders } => {
                let order: Vec<String> = orders.iter().map(|o| o.to_string()).collect();
                writeln!(f, "{}Order: [{}]", prefix, order.join(", "))?;
            }
            LogicalNode::Limit { limit, offset } => {
                writeln!(f, "{}Limit: limit={:?}, offset={}", prefix, limit, offset)?
            }
            LogicalNode::CrossProduct => writeln!(f, "{}CrossProduct", prefix)?,
            LogicalNode::Join {
                join_type,
                conditions,
            } => {
                let on: Vec<String> = conditions
                    .iter()
                    .map(|(l, r)| format!("{} = {}", l, r))
                    .collect();
                writeln!(f, "{}{} Join: {}", prefix, join_type, on.join(" AND "))?;
            }
            LogicalNode::Delete { table } => writeln!(f, "{}Delete: {}", prefix, table.name())?,
            LogicalNode::PruneColumns { column_limit } => {
                writeln!(f, "{}PruneColumns: {}", prefix, column_limit)?
            }
            LogicalNode::EmptyResult => writeln!(f, "{}EmptyResult", prefix)?,
        }
        for child in &self.children {
            child.fmt_indent(f, indent + 1)?;
        }
        Ok(())
    }
}

impl fmt::Display for LogicalOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_indent(f, 0)
    }
}

fn resolve_all(exprs: &[Expr], input: &[LogicalType]) -> Result<Vec<LogicalType>> {
    exprs.iter().map(|e| e.resolve_type(input)).collect()
}
