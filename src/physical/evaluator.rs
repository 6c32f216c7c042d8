//! Expression evaluation over chunks
//!
//! Expressions are evaluated over the physical rows of a chunk so the result
//! lines up with the chunk's columns and the chunk's selection vector stays
//! valid for it. Operations that can fail on bad data (checked arithmetic,
//! casts) first mask the inactive rows to NULL, so rows hidden by a selection
//! never raise errors.

use crate::chunk::{DataChunk, SelectionVector};
use crate::error::{QueryError, Result};
use crate::planner::{common_type, BinaryOp, Expr, UnaryOp};
use crate::types::{LogicalType, ScalarValue};
use arrow::array::{new_null_array, Array, ArrayRef, AsArray, BooleanArray, Datum, Scalar};
use arrow::compute::kernels::{boolean, cmp, numeric};
use arrow::compute::{self, CastOptions};
use arrow::datatypes::DataType;
use std::sync::Arc;

/// Evaluate `expr` over every physical row of `chunk`
pub fn evaluate_expr(chunk: &DataChunk, expr: &Expr) -> Result<ArrayRef> {
    let len = chunk.physical_len();
    match expr {
        Expr::Column { index, .. } => chunk.columns().get(*index).cloned().ok_or_else(|| {
            QueryError::InvalidPlan(format!(
                "column reference #{} out of range for chunk with {} columns",
                index,
                chunk.column_count()
            ))
        }),
        Expr::Literal(value) => Ok(value.to_array(len)),
        Expr::BinaryExpr { left, op, right } => {
            let left = evaluate_expr(chunk, left)?;
            let right = evaluate_expr(chunk, right)?;
            evaluate_binary_op(chunk, &left, *op, &right)
        }
        Expr::UnaryExpr { op, expr } => {
            let input = evaluate_expr(chunk, expr)?;
            evaluate_unary_op(chunk, *op, &input)
        }
        Expr::Cast { expr, data_type } => {
            let input = evaluate_expr(chunk, expr)?;
            evaluate_cast(chunk, &input, *data_type)
        }
        Expr::Aggregate { .. } => Err(QueryError::Internal(format!(
            "aggregate {} cannot be evaluated outside an aggregate operator",
            expr
        ))),
        Expr::Window(_) => Err(QueryError::Internal(format!(
            "window function {} cannot be evaluated outside a window operator",
            expr
        ))),
    }
}

/// Evaluate `expr` and keep only the active rows, in order
pub fn evaluate_active(chunk: &DataChunk, expr: &Expr) -> Result<ArrayRef> {
    let result = evaluate_expr(chunk, expr)?;
    match chunk.selection() {
        None => Ok(result),
        Some(sel) => Ok(compute::take(result.as_ref(), &sel.to_indices(), None)?),
    }
}

/// Physical indices of the active rows for which `predicate` is TRUE
pub fn select(chunk: &DataChunk, predicate: &Expr) -> Result<SelectionVector> {
    let result = evaluate_expr(chunk, predicate)?;
    let mask = as_boolean(&result)?;
    let passes = |row: usize| mask.is_valid(row) && mask.value(row);
    let indices = chunk
        .active_rows()
        .filter(|&row| passes(row))
        .map(|row| row as u32)
        .collect();
    Ok(SelectionVector::new(indices))
}

/// Null out rows hidden by the chunk's selection vector
fn mask_inactive(chunk: &DataChunk, array: &ArrayRef) -> Result<ArrayRef> {
    let Some(sel) = chunk.selection() else {
        return Ok(array.clone());
    };
    let mut inactive = vec![true; array.len()];
    for row in sel.iter() {
        inactive[row] = false;
    }
    Ok(compute::nullif(array.as_ref(), &BooleanArray::from(inactive))?)
}

/// Cast to the boolean physical type, accepting untyped NULL
fn as_boolean(array: &ArrayRef) -> Result<BooleanArray> {
    match array.data_type() {
        DataType::Boolean => Ok(array.as_boolean().clone()),
        DataType::Null => Ok(compute::cast(array, &DataType::Boolean)?.as_boolean().clone()),
        other => Err(QueryError::Type(format!(
            "expected BOOLEAN operand, got {:?}",
            other
        ))),
    }
}

fn logical_type_of(array: &ArrayRef) -> Result<LogicalType> {
    LogicalType::from_physical(array.data_type()).ok_or_else(|| {
        QueryError::NotImplemented(format!("Unsupported physical type {:?}", array.data_type()))
    })
}

fn coerce_arrays(left: &ArrayRef, right: &ArrayRef) -> Result<(LogicalType, ArrayRef, ArrayRef)> {
    let (l, r) = (logical_type_of(left)?, logical_type_of(right)?);
    let common = common_type(l, r)
        .ok_or_else(|| QueryError::Type(format!("Cannot coerce {} and {}", l, r)))?;
    let target = common.physical_type();
    let coerce = |array: &ArrayRef| -> Result<ArrayRef> {
        if array.data_type() == &target {
            Ok(array.clone())
        } else {
            Ok(compute::cast(array, &target)?)
        }
    };
    Ok((common, coerce(left)?, coerce(right)?))
}

fn evaluate_binary_op(
    chunk: &DataChunk,
    left: &ArrayRef,
    op: BinaryOp,
    right: &ArrayRef,
) -> Result<ArrayRef> {
    let len = left.len();
    match op {
        BinaryOp::And => {
            let (l, r) = (as_boolean(left)?, as_boolean(right)?);
            Ok(Arc::new(boolean::and_kleene(&l, &r)?))
        }
        BinaryOp::Or => {
            let (l, r) = (as_boolean(left)?, as_boolean(right)?);
            Ok(Arc::new(boolean::or_kleene(&l, &r)?))
        }
        _ if op.is_comparison() => {
            let (common, left, right) = coerce_arrays(left, right)?;
            if common == LogicalType::SqlNull {
                return Ok(new_null_array(&DataType::Boolean, len));
            }
            let (l, r): (&dyn Datum, &dyn Datum) = (&left, &right);
            let result = match op {
                BinaryOp::Eq => cmp::eq(l, r)?,
                BinaryOp::NotEq => cmp::neq(l, r)?,
                BinaryOp::Lt => cmp::lt(l, r)?,
                BinaryOp::LtEq => cmp::lt_eq(l, r)?,
                BinaryOp::Gt => cmp::gt(l, r)?,
                _ => cmp::gt_eq(l, r)?,
            };
            Ok(Arc::new(result))
        }
        _ => {
            let (common, left, right) = coerce_arrays(left, right)?;
            if common == LogicalType::SqlNull {
                return Ok(new_null_array(&DataType::Null, len));
            }
            if !common.is_numeric() {
                return Err(QueryError::Type(format!("cannot apply {} to {}", op, common)));
            }
            let left = mask_inactive(chunk, &left)?;
            let mut right = mask_inactive(chunk, &right)?;
            if op == BinaryOp::Divide {
                let zero = Scalar::new(ScalarValue::zero_of(common)?.to_array(1));
                let is_zero = cmp::eq(&right, &zero)?;
                right = compute::nullif(right.as_ref(), &is_zero)?;
            }
            let result = match op {
                BinaryOp::Add => numeric::add(&left, &right),
                BinaryOp::Subtract => numeric::sub(&left, &right),
                BinaryOp::Multiply => numeric::mul(&left, &right),
                _ => numeric::div(&left, &right),
            };
            result.map_err(|e| QueryError::Execution(format!("{} failed: {}", op, e)))
        }
    }
}

fn evaluate_unary_op(chunk: &DataChunk, op: UnaryOp, input: &ArrayRef) -> Result<ArrayRef> {
    match op {
        UnaryOp::Not => Ok(Arc::new(boolean::not(&as_boolean(input)?)?)),
        UnaryOp::Negate => {
            if input.data_type() == &DataType::Null {
                return Ok(input.clone());
            }
            let masked = mask_inactive(chunk, input)?;
            numeric::neg(masked.as_ref())
                .map_err(|e| QueryError::Execution(format!("negation failed: {}", e)))
        }
        UnaryOp::IsNull => Ok(Arc::new(compute::is_null(input.as_ref())?)),
        UnaryOp::IsNotNull => Ok(Arc::new(compute::is_not_null(input.as_ref())?)),
    }
}

fn null_count(array: &dyn Array) -> usize {
    array.logical_nulls().map(|n| n.null_count()).unwrap_or(0)
}

fn evaluate_cast(chunk: &DataChunk, input: &ArrayRef, target: LogicalType) -> Result<ArrayRef> {
    let target_type = target.physical_type();
    if input.data_type() == &target_type {
        return Ok(input.clone());
    }
    let masked = mask_inactive(chunk, input)?;
    let options = CastOptions {
        safe: true,
        ..Default::default()
    };
    let result = compute::cast_with_options(masked.as_ref(), &target_type, &options)?;
    // Safe casts turn failures into NULLs; any new NULL is an active row that failed
    if null_count(result.as_ref()) > null_count(masked.as_ref()) {
        let row = (0..result.len())
            .find(|&i| result.is_null(i) && !masked.is_null(i))
            .unwrap_or_default();
        let value = ScalarValue::try_from_array(masked.as_ref(), row)?;
        return Err(QueryError::Execution(format!(
            "could not cast {} to {}",
            value, target
        )));
    }
    Ok(result)
}
