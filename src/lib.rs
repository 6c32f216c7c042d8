//! Vectorized pull-based query execution engine
//!
//! Logical plans are compiled into trees of physical operators that pull
//! fixed-capacity columnar chunks from their children. Columns are arrow
//! arrays; rows are filtered with selection vectors instead of copies.

pub mod chunk;
pub mod error;
pub mod execution;
pub mod physical;
pub mod planner;
pub mod storage;
pub mod types;

// Re-export main types
pub use chunk::{ChunkCollection, DataChunk, SelectionVector};
pub use error::{QueryError, Result};
pub use execution::{ExecutionConfig, ExecutionContext, QueryResult};
pub use physical::{PhysicalOperator, PhysicalPlanner};
pub use planner::{Expr, LogicalOperator};
pub use storage::{MemoryTable, TableProvider};
pub use types::{LogicalType, ScalarValue};
