//! Logical plan interface
//!
//! Bound expressions and the logical operator tree handed to the physical
//! planner. Building these trees from SQL happens upstream.

mod logical_expr;
mod logical_plan;

pub use logical_expr::*;
pub use logical_plan::*;
