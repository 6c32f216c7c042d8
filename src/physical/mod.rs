//! Physical execution module
//!
//! Converts logical plans to physical operator trees and pulls chunks
//! through them

pub mod evaluator;
pub mod operators;
mod plan;
mod planner;

pub use operators::*;
pub use plan::*;
pub use planner::*;
