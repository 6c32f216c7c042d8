//! Bound expressions

use crate::error::{QueryError, Result};
use crate::types::{LogicalType, ScalarValue};
use arrow::compute::can_cast_types;
use std::fmt;

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    // Arithmetic
    Add,
    Subtract,
    Multiply,
    Divide,
    // Comparison
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    // Logical
    And,
    Or,
}

impl BinaryOp {
    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinaryOp::Eq | BinaryOp::NotEq | BinaryOp::Lt | BinaryOp::LtEq | BinaryOp::Gt | BinaryOp::GtEq
        )
    }

    pub fn is_arithmetic(&self) -> bool {
        matches!(
            self,
            BinaryOp::Add | BinaryOp::Subtract | BinaryOp::Multiply | BinaryOp::Divide
        )
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BinaryOp::Add => write!(f, "+"),
            BinaryOp::Subtract => write!(f, "-"),
            BinaryOp::Multiply => write!(f, "*"),
            BinaryOp::Divide => write!(f, "/"),
            BinaryOp::Eq => write!(f, "="),
            BinaryOp::NotEq => write!(f, "<>"),
            BinaryOp::Lt => write!(f, "<"),
            BinaryOp::LtEq => write!(f, "<="),
            BinaryOp::Gt => write!(f, ">"),
            BinaryOp::GtEq => write!(f, ">="),
            BinaryOp::And => write!(f, "AND"),
            BinaryOp::Or => write!(f, "OR"),
        }
    }
}

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Not,
    Negate,
    IsNull,
    IsNotNull,
}

impl fmt::Display for UnaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnaryOp::Not => write!(f, "NOT"),
            UnaryOp::Negate => write!(f, "-"),
            UnaryOp::IsNull => write!(f, "IS NULL"),
            UnaryOp::IsNotNull => write!(f, "IS NOT NULL"),
        }
    }
}

/// Aggregate function types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggregateFunction {
    CountStar,
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

impl AggregateFunction {
    /// Result type for an argument of type `input` (`None` for COUNT(*))
    pub fn return_type(&self, input: Option<LogicalType>) -> Result<LogicalType> {
        let Some(t) = input else {
            return match self {
                AggregateFunction::CountStar => Ok(LogicalType::BigInt),
                _ => Err(QueryError::InvalidPlan(format!(
                    "{} takes exactly one argument",
                    self
                ))),
            };
        };
        match self {
            AggregateFunction::CountStar => Err(QueryError::InvalidPlan(
                "COUNT(*) takes no arguments".to_string(),
            )),
            AggregateFunction::Count => Ok(LogicalType::BigInt),
            AggregateFunction::Sum if t.is_integral() => Ok(LogicalType::BigInt),
            AggregateFunction::Sum if t == LogicalType::Double => Ok(LogicalType::Double),
            AggregateFunction::Avg if t.is_numeric() => Ok(LogicalType::Double),
            AggregateFunction::Sum | AggregateFunction::Avg => {
                Err(QueryError::Type(format!("{} is not defined for {}", self, t)))
            }
            AggregateFunction::Min | AggregateFunction::Max => Ok(t),
        }
    }
}

impl fmt::Display for AggregateFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AggregateFunction::CountStar => write!(f, "COUNT_STAR"),
            AggregateFunction::Count => write!(f, "COUNT"),
            AggregateFunction::Sum => write!(f, "SUM"),
            AggregateFunction::Avg => write!(f, "AVG"),
            AggregateFunction::Min => write!(f, "MIN"),
            AggregateFunction::Max => write!(f, "MAX"),
        }
    }
}

/// Window function types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WindowFunction {
    RowNumber,
    Rank,
    DenseRank,
    Aggregate(AggregateFunction),
}

impl fmt::Display for WindowFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WindowFunction::RowNumber => write!(f, "ROW_NUMBER"),
            WindowFunction::Rank => write!(f, "RANK"),
            WindowFunction::DenseRank => write!(f, "DENSE_RANK"),
            WindowFunction::Aggregate(func) => write!(f, "{}", func),
        }
    }
}

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

/// Null ordering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum NullOrdering {
    #[default]
    NullsFirst,
    NullsLast,
}

/// Sort expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortExpr {
    pub expr: Expr,
    pub direction: SortDirection,
    pub nulls: NullOrdering,
}

impl SortExpr {
    pub fn new(expr: Expr) -> Self {
        Self {
            expr,
            direction: SortDirection::Asc,
            nulls: NullOrdering::NullsFirst,
        }
    }

    pub fn asc(mut self) -> Self {
        self.direction = SortDirection::Asc;
        self
    }

    pub fn desc(mut self) -> Self {
        self.direction = SortDirection::Desc;
        self
    }

    pub fn nulls_first(mut self) -> Self {
        self.nulls = NullOrdering::NullsFirst;
        self
    }

    pub fn nulls_last(mut self) -> Self {
        self.nulls = NullOrdering::NullsLast;
        self
    }

    pub fn is_descending(&self) -> bool {
        self.direction == SortDirection::Desc
    }

    pub fn is_nulls_first(&self) -> bool {
        self.nulls == NullOrdering::NullsFirst
    }
}

impl fmt::Display for SortExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let direction = if self.is_descending() { "DESC" } else { "ASC" };
        let nulls = if self.is_nulls_first() { "NULLS FIRST" } else { "NULLS LAST" };
        write!(f, "{} {} {}", self.expr, direction, nulls)
    }
}

/// Window expression: function, arguments and window definition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowExpr {
    pub function: WindowFunction,
    pub args: Vec<Expr>,
    pub partitions: Vec<Expr>,
    pub orders: Vec<SortExpr>,
}

impl WindowExpr {
    pub fn new(function: WindowFunction, args: Vec<Expr>) -> Self {
        Self {
            function,
            args,
            partitions: Vec::new(),
            orders: Vec::new(),
        }
    }

    pub fn partition_by(mut self, partitions: Vec<Expr>) -> Self {
        self.partitions = partitions;
        self
    }

    pub fn order_by(mut self, orders: Vec<SortExpr>) -> Self {
        self.orders = orders;
        self
    }
}

/// Bound expression
///
/// Column references address the input chunk by position; names are gone by
/// the time an expression reaches the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    /// Reference to column `index` of the input
    Column { index: usize, data_type: LogicalType },

    /// Literal value
    Literal(ScalarValue),

    /// Binary operation
    BinaryExpr {
        left: Box<Expr>,
        op: BinaryOp,
        right: Box<Expr>,
    },

    /// Unary operation
    UnaryExpr { op: UnaryOp, expr: Box<Expr> },

    /// Type cast
    Cast {
        expr: Box<Expr>,
        data_type: LogicalType,
    },

    /// Aggregate function call; only valid directly under an aggregate node
    Aggregate {
        func: AggregateFunction,
        args: Vec<Expr>,
    },

    /// Window function call; only valid directly under a window node
    Window(Box<WindowExpr>),
}

impl Expr {
    pub fn column(index: usize, data_type: LogicalType) -> Self {
        Expr::Column { index, data_type }
    }

    pub fn literal(value: ScalarValue) -> Self {
        Expr::Literal(value)
    }

    fn binary(self, op: BinaryOp, other: Expr) -> Self {
        Expr::BinaryExpr {
            left: Box::new(self),
            op,
            right: Box::new(other),
        }
    }

    fn unary(self, op: UnaryOp) -> Self {
        Expr::UnaryExpr {
            op,
            expr: Box::new(self),
        }
    }

    pub fn eq(self, other: Expr) -> Self {
        self.binary(BinaryOp::Eq, other)
    }

    pub fn not_eq(self, other: Expr) -> Self {
        self.binary(BinaryOp::NotEq, other)
    }

    pub fn lt(self, other: Expr) -> Self {
        self.binary(BinaryOp::Lt, other)
    }

    pub fn lt_eq(self, other: Expr) -> Self {
        self.binary(BinaryOp::LtEq, other)
    }

    pub fn gt(self, other: Expr) -> Self {
        self.binary(BinaryOp::Gt, other)
    }

    pub fn gt_eq(self, other: Expr) -> Self {
        self.binary(BinaryOp::GtEq, other)
    }

    pub fn and(self, other: Expr) -> Self {
        self.binary(BinaryOp::And, other)
    }

    pub fn or(self, other: Expr) -> Self {
        self.binary(BinaryOp::Or, other)
    }

    pub fn add(self, other: Expr) -> Self {
        self.binary(BinaryOp::Add, other)
    }

    pub fn subtract(self, other: Expr) -> Self {
        self.binary(BinaryOp::Subtract, other)
    }

    pub fn multiply(self, other: Expr) -> Self {
        self.binary(BinaryOp::Multiply, other)
    }

    pub fn divide(self, other: Expr) -> Self {
        self.binary(BinaryOp::Divide, other)
    }

    pub fn logical_not(self) -> Self {
        self.unary(UnaryOp::Not)
    }

    pub fn negate(self) -> Self {
        self.unary(UnaryOp::Negate)
    }

    pub fn is_null(self) -> Self {
        self.unary(UnaryOp::IsNull)
    }

    pub fn is_not_null(self) -> Self {
        self.unary(UnaryOp::IsNotNull)
    }

    pub fn cast_to(self, data_type: LogicalType) -> Self {
        Expr::Cast {
            expr: Box::new(self),
            data_type,
        }
    }

    pub fn count_star() -> Self {
        Expr::Aggregate {
            func: AggregateFunction::CountStar,
            args: vec![],
        }
    }

    pub fn aggregate(func: AggregateFunction, arg: Expr) -> Self {
        Expr::Aggregate {
            func,
            args: vec![arg],
        }
    }

    pub fn window(expr: WindowExpr) -> Self {
        Expr::Window(Box::new(expr))
    }

    /// Resolve the result type against the input column types
    pub fn resolve_type(&self, input: &[LogicalType]) -> Result<LogicalType> {
        match self {
            Expr::Column { index, data_type } => {
                let actual = input.get(*index).ok_or_else(|| {
                    QueryError::InvalidPlan(format!(
                        "column reference #{} out of range for input with {} columns",
                        index,
                        input.len()
                    ))
                })?;
                if actual != data_type {
                    return Err(QueryError::Type(format!(
                        "column #{} is {} but was bound as {}",
                        index, actual, data_type
                    )));
                }
                Ok(*data_type)
            }
            Expr::Literal(value) => Ok(value.logical_type()),
            Expr::BinaryExpr { left, op, right } => {
                let l = left.resolve_type(input)?;
                let r = right.resolve_type(input)?;
                binary_result_type(l, *op, r)
            }
            Expr::UnaryExpr { op, expr } => {
                let t = expr.resolve_type(input)?;
                match op {
                    UnaryOp::IsNull | UnaryOp::IsNotNull => Ok(LogicalType::Boolean),
                    UnaryOp::Not => match t {
                        LogicalType::Boolean | LogicalType::SqlNull => Ok(LogicalType::Boolean),
                        other => Err(QueryError::Type(format!("NOT expects BOOLEAN, got {}", other))),
                    },
                    UnaryOp::Negate if t.is_numeric() => Ok(t),
                    UnaryOp::Negate => Err(QueryError::Type(format!("cannot negate {}", t))),
                }
            }
            Expr::Cast { expr, data_type } => {
                let from = expr.resolve_type(input)?;
                if !can_cast_types(&from.physical_type(), &data_type.physical_type()) {
                    return Err(QueryError::Type(format!(
                        "cannot cast {} to {}",
                        from, data_type
                    )));
                }
                Ok(*data_type)
            }
            Expr::Aggregate { func, args } => {
                let arg = match args.as_slice() {
                    [] => None,
                    [arg] => Some(arg.resolve_type(input)?),
                    _ => {
                        return Err(QueryError::InvalidPlan(format!(
                            "{} takes at most one argument",
                            func
                        )))
                    }
                };
                func.return_type(arg)
            }
            Expr::Window(window) => {
                for partition in &window.partitions {
                    partition.resolve_type(input)?;
                }
                for order in &window.orders {
                    order.expr.resolve_type(input)?;
                }
                match window.function {
                    WindowFunction::RowNumber | WindowFunction::Rank | WindowFunction::DenseRank => {
                        if !window.args.is_empty() {
                            return Err(QueryError::InvalidPlan(format!(
                                "{} takes no arguments",
                                window.function
                            )));
                        }
                        Ok(LogicalType::BigInt)
                    }
                    WindowFunction::Aggregate(func) => Expr::Aggregate {
                        func,
                        args: window.args.clone(),
                    }
                    .resolve_type(input),
                }
            }
        }
    }

    /// Check if expression contains an aggregate
    pub fn contains_aggregate(&self) -> bool {
        match self {
            Expr::Aggregate { .. } => true,
            Expr::BinaryExpr { left, right, .. } => {
                left.contains_aggregate() || right.contains_aggregate()
            }
            Expr::UnaryExpr { expr, .. } | Expr::Cast { expr, .. } => expr.contains_aggregate(),
            _ => false,
        }
    }

    /// Check if expression contains a window function
    pub fn contains_window(&self) -> bool {
        match self {
            Expr::Window(_) => true,
            Expr::BinaryExpr { left, right, .. } => left.contains_window() || right.contains_window(),
            Expr::UnaryExpr { expr, .. } | Expr::Cast { expr, .. } => expr.contains_window(),
            Expr::Aggregate { args, .. } => args.iter().any(|a| a.contains_window()),
            _ => false,
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Column { index, .. } => write!(f, "#{}", index),
            Expr::Literal(v) => write!(f, "{}", v),
            Expr::BinaryExpr { left, op, right } => write!(f, "({} {} {})", left, op, right),
            Expr::UnaryExpr { op, expr } => match op {
                UnaryOp::IsNull | UnaryOp::IsNotNull => write!(f, "({} {})", expr, op),
                _ => write!(f, "({} {})", op, expr),
            },
            Expr::Cast { expr, data_type } => write!(f, "CAST({} AS {})", expr, data_type),
            Expr::Aggregate { func, args } => {
                if *func == AggregateFunction::CountStar {
                    return write!(f, "COUNT(*)");
                }
                let args_str: Vec<String> = args.iter().map(|a| a.to_string()).collect();
                write!(f, "{}({})", func, args_str.join(", "))
            }
            Expr::Window(window) => {
                let args_str: Vec<String> = window.args.iter().map(|a| a.to_string()).collect();
                match window.function {
                    WindowFunction::Aggregate(AggregateFunction::CountStar) => write!(f, "COUNT(*)")?,
                    func => write!(f, "{}({})", func, args_str.join(", "))?,
                }
                write!(f, " OVER (")?;
                if !window.partitions.is_empty() {
                    let parts: Vec<String> = window.partitions.iter().map(|p| p.to_string()).collect();
                    write!(f, "PARTITION BY {}", parts.join(", "))?;
                }
                if !window.orders.is_empty() {
                    if !window.partitions.is_empty() {
                        write!(f, " ")?;
                    }
                    let orders: Vec<String> = window.orders.iter().map(|o| o.to_string()).collect();
                    write!(f, "ORDER BY {}", orders.join(", "))?;
                }
                write!(f, ")")
            }
        }
    }
}

/// Rank numeric types by width; DOUBLE absorbs everything
fn numeric_rank(t: LogicalType) -> Option<u8> {
    match t {
        LogicalType::TinyInt => Some(0),
        LogicalType::SmallInt => Some(1),
        LogicalType::Integer => Some(2),
        LogicalType::BigInt => Some(3),
        LogicalType::Double => Some(4),
        _ => None,
    }
}

/// Common type two operands are coerced to before a binary kernel runs
pub fn common_type(left: LogicalType, right: LogicalType) -> Option<LogicalType> {
    match (left, right) {
        (l, r) if l == r => Some(l),
        (LogicalType::SqlNull, other) | (other, LogicalType::SqlNull) => Some(other),
        (l, r) => {
            let (lr, rr) = (numeric_rank(l)?, numeric_rank(r)?);
            Some(if lr >= rr { l } else { r })
        }
    }
}

fn binary_result_type(left: LogicalType, op: BinaryOp, right: LogicalType) -> Result<LogicalType> {
    let mismatch = || {
        QueryError::Type(format!(
            "cannot apply {} to {} and {}",
            op, left, right
        ))
    };
    match op {
        BinaryOp::And | BinaryOp::Or => match (left, right) {
            (LogicalType::Boolean | LogicalType::SqlNull, LogicalType::Boolean | LogicalType::SqlNull) => {
                Ok(LogicalType::Boolean)
            }
            _ => Err(mismatch()),
        },
        _ if op.is_comparison() => common_type(left, right)
            .map(|_| LogicalType::Boolean)
            .ok_or_else(mismatch),
        _ => match common_type(left, right) {
            Some(LogicalType::SqlNull) => Ok(LogicalType::SqlNull),
            Some(t) if t.is_numeric() => Ok(t),
            _ => Err(mismatch()),
        },
    }
}
