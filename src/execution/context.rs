//! Execution context - main entry point for query execution

use crate::chunk::{ChunkCollection, DataChunk};
use crate::error::Result;
use crate::execution::{create_memory_pool, ExecutionConfig, SharedMemoryPool};
use crate::physical::{display_plan, PhysicalOperator, PhysicalPlanner};
use crate::planner::LogicalOperator;
use crate::storage::TableProvider;
use crate::types::LogicalType;
use arrow::record_batch::RecordBatch;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Consumer of the chunks a plan produces
pub trait ResultSink {
    fn consume(&mut self, chunk: &DataChunk) -> Result<()>;
}

impl ResultSink for ChunkCollection {
    fn consume(&mut self, chunk: &DataChunk) -> Result<()> {
        self.append(chunk).map(|_| ())
    }
}

/// Query execution result
#[derive(Debug)]
pub struct QueryResult {
    /// Output column types
    pub types: Vec<LogicalType>,
    /// Result chunks, flat
    pub chunks: Vec<DataChunk>,
    /// Total row count
    pub row_count: usize,
    /// Execution metrics
    pub metrics: QueryMetrics,
}

impl QueryResult {
    pub fn to_record_batches(&self) -> Result<Vec<RecordBatch>> {
        self.chunks.iter().map(|c| c.to_record_batch()).collect()
    }
}

/// Query execution metrics
#[derive(Debug, Default, Clone)]
pub struct QueryMetrics {
    /// Time spent compiling the physical plan
    pub plan_time: Duration,
    /// Time spent pulling chunks
    pub execute_time: Duration,
    /// Total time
    pub total_time: Duration,
    /// Non-empty chunks produced by the root
    pub chunk_count: usize,
    /// Highest memory pool usage observed
    pub peak_memory: usize,
}

/// Summary of one drive of a plan into a sink
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionStats {
    pub chunks: usize,
    pub rows: usize,
}

/// Execution context - holds configuration, the memory pool and tables
#[derive(Debug)]
pub struct ExecutionContext {
    config: ExecutionConfig,
    memory_pool: SharedMemoryPool,
    tables: HashMap<String, Arc<dyn TableProvider>>,
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self::with_config(ExecutionConfig::default())
    }

    pub fn with_config(config: ExecutionConfig) -> Self {
        Self {
            memory_pool: create_memory_pool(config.memory_limit),
            config,
            tables: HashMap::new(),
        }
    }

    pub fn config(&self) -> &ExecutionConfig {
        &self.config
    }

    pub fn memory_pool(&self) -> &SharedMemoryPool {
        &self.memory_pool
    }

    /// Register a table provider under its own name
    pub fn register_table(&mut self, table: Arc<dyn TableProvider>) {
        self.tables.insert(table.name().to_string(), table);
    }

    pub fn table(&self, name: &str) -> Option<Arc<dyn TableProvider>> {
        self.tables.get(name).cloned()
    }

    /// List registered tables
    pub fn table_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tables.keys().cloned().collect();
        names.sort();
        names
    }

    /// Compile a logical plan into a physical operator tree
    pub fn create_physical_plan(&self, logical: &LogicalOperator) -> Result<Box<dyn PhysicalOperator>> {
        PhysicalPlanner::new().create_physical_plan(logical)
    }

    /// Pull `root` to exhaustion, handing every non-empty chunk to `sink`
    ///
    /// The first error stops the loop and is returned as is.
    pub fn execute_plan(
        &self,
        root: &dyn PhysicalOperator,
        sink: &mut dyn ResultSink,
    ) -> Result<ExecutionStats> {
        let mut state = root.get_initial_state();
        let mut chunk = DataChunk::new();
        let mut stats = ExecutionStats::default();
        loop {
            root.get_chunk(self, &mut chunk, &mut state)?;
            if chunk.is_empty() {
                break;
            }
            stats.chunks += 1;
            stats.rows += chunk.size();
            sink.consume(&chunk)?;
        }
        Ok(stats)
    }

    /// Compile and run a logical plan, materializing the result
    pub fn execute(&self, logical: &LogicalOperator) -> Result<QueryResult> {
        let start = Instant::now();
        let mut metrics = QueryMetrics::default();

        let plan_start = Instant::now();
        let physical = self.create_physical_plan(logical)?;
        metrics.plan_time = plan_start.elapsed();
        debug!(plan = %display_plan(physical.as_ref(), 0), "Physical plan");

        let execute_start = Instant::now();
        let mut collection = ChunkCollection::new(physical.types().to_vec());
        let stats = self.execute_plan(physical.as_ref(), &mut collection)?;
        metrics.execute_time = execute_start.elapsed();
        metrics.total_time = start.elapsed();
        metrics.chunk_count = stats.chunks;
        metrics.peak_memory = self.memory_pool.peak();

        info!(
            rows = stats.rows,
            chunks = stats.chunks,
            plan_us = metrics.plan_time.as_micros() as u64,
            execute_us = metrics.execute_time.as_micros() as u64,
            "Query executed"
        );

        Ok(QueryResult {
            types: physical.types().to_vec(),
            row_count: collection.count(),
            chunks: collection.into_chunks(),
            metrics,
        })
    }

    /// Render the physical plan of a logical plan
    pub fn explain(&self, logical: &LogicalOperator) -> Result<String> {
        let physical = self.create_physical_plan(logical)?;
        Ok(display_plan(physical.as_ref(), 0))
    }
}

/// Utility to print query results
pub fn print_results(result: &QueryResult) -> Result<()> {
    use arrow::util::pretty::print_batches;

    println!("Row count: {}", result.row_count);
    println!(
        "Timing: plan={:?}, exec={:?}, total={:?}",
        result.metrics.plan_time, result.metrics.execute_time, result.metrics.total_time
    );
    println!();

    let batches = result.to_record_batches()?;
    if !batches.is_empty() {
        print_batches(&batches)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::QueryError;
    use crate::planner::{Expr, SortExpr};
    use crate::storage::MemoryTable;
    use arrow::array::Int64Array;

    fn table() -> Arc<dyn TableProvider> {
        Arc::new(
            MemoryTable::try_new("numbers", vec![Arc::new(Int64Array::from(vec![3, 1, 2]))]).unwrap(),
        )
    }

    #[test]
    fn test_execute_collects_rows() {
        let ctx = ExecutionContext::new();
        let plan = LogicalOperator::scan(table())
            .unwrap()
            .order(vec![SortExpr::new(Expr::column(0, LogicalType::BigInt))])
            .unwrap();
        let result = ctx.execute(&plan).unwrap();
        assert_eq!(result.row_count, 3);
        assert_eq!(result.types, vec![LogicalType::BigInt]);
        let batches = result.to_record_batches().unwrap();
        assert_eq!(batches[0].num_rows(), 3);
    }

    #[test]
    fn test_execute_plan_stops_on_error() {
        struct FailingSink;
        impl ResultSink for FailingSink {
            fn consume(&mut self, _chunk: &DataChunk) -> Result<()> {
                Err(QueryError::Execution("sink full".to_string()))
            }
        }

        let ctx = ExecutionContext::new();
        let plan = ctx.create_physical_plan(&LogicalOperator::scan(table()).unwrap()).unwrap();
        let result = ctx.execute_plan(plan.as_ref(), &mut FailingSink);
        assert!(matches!(result, Err(QueryError::Execution(_))));
    }

    #[test]
    fn test_register_table() {
        let mut ctx = ExecutionContext::new();
        ctx.register_table(table());
        assert_eq!(ctx.table_names(), vec!["numbers".to_string()]);
        assert!(ctx.table("numbers").is_some());
        assert!(ctx.table("missing").is_none());
    }

    #[test]
    fn test_explain() {
        let ctx = ExecutionContext::new();
        let plan = LogicalOperator::scan(table()).unwrap().limit(Some(1), 0);
        let text = ctx.explain(&plan).unwrap();
        assert!(text.starts_with("Limit"));
        assert!(text.contains("\n  TableScan: numbers"));
    }
}
