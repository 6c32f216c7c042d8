//! Shared join result construction
//!
//! Semi, anti and mark joins never copy left-side data: their results alias
//! the probe chunk's columns and differ only in the selection vector or in one
//! appended BOOLEAN column.

use crate::chunk::{DataChunk, SelectionVector};
use crate::error::{QueryError, Result};
use crate::types::{LogicalType, ScalarValue};
use arrow::array::{Array, ArrayRef, BooleanArray};
use std::sync::Arc;

pub use crate::planner::JoinType;

fn check_matches(child: &DataChunk, found_match: &[bool]) -> Result<()> {
    if found_match.len() != child.size() {
        return Err(QueryError::Internal(format!(
            "{} match flags for a chunk of {} rows",
            found_match.len(),
            child.size()
        )));
    }
    Ok(())
}

fn reference_left(child: &DataChunk, result: &mut DataChunk) -> Result<usize> {
    let columns = child.column_count();
    for i in 0..columns {
        result.reference_column(i, child, i)?;
    }
    Ok(columns)
}

/// Keep the rows of `child` that found a match (semi) or did not (anti)
///
/// `found_match` is indexed by active row.
pub fn construct_semi_or_anti_join_result(
    child: &DataChunk,
    result: &mut DataChunk,
    found_match: &[bool],
    anti: bool,
) -> Result<()> {
    check_matches(child, found_match)?;
    reference_left(child, result)?;
    let selection = child
        .active_rows()
        .zip(found_match)
        .filter(|(_, found)| **found != anti)
        .map(|(row, _)| row as u32)
        .collect();
    result.select(SelectionVector::new(selection));
    Ok(())
}

/// Left rows of `child` padded with NULL right-side columns
pub fn construct_left_join_result(
    child: &DataChunk,
    result: &mut DataChunk,
    right_types: &[LogicalType],
) -> Result<()> {
    let columns = reference_left(child, result)?;
    let len = child.physical_len();
    for (j, ty) in right_types.iter().enumerate() {
        result.set_column(columns + j, ScalarValue::Null.to_array_of_type(*ty, len))?;
    }
    result.set_cardinality_from(child);
    Ok(())
}

/// Alias the columns of `child` into `result` and append the mark column
///
/// Per active row the mark is TRUE when a match was found. Otherwise it is
/// NULL if any join key of the row is NULL or the right side contained a NULL
/// key, and FALSE if not. An empty right side is expressed by passing no key
/// columns, no matches and `right_has_null = false`, which marks every row
/// FALSE.
pub fn construct_mark_join_result(
    join_keys: &[ArrayRef],
    child: &DataChunk,
    result: &mut DataChunk,
    found_match: &[bool],
    right_has_null: bool,
) -> Result<()> {
    check_matches(child, found_match)?;
    let len = child.physical_len();
    if let Some(key) = join_keys.iter().find(|k| k.len() != len) {
        return Err(QueryError::Internal(format!(
            "join key of {} rows for a chunk of {} physical rows",
            key.len(),
            len
        )));
    }

    let columns = reference_left(child, result)?;
    let mut marks: Vec<Option<bool>> = vec![None; len];
    for (row, found) in child.active_rows().zip(found_match) {
        marks[row] = if *found {
            Some(true)
        } else if right_has_null || join_keys.iter().any(|k| k.is_null(row)) {
            None
        } else {
            Some(false)
        };
    }
    result.set_column(columns, Arc::new(BooleanArray::from(marks)))?;
    result.set_cardinality_from(child);
    Ok(())
}
