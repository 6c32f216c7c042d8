//! Vector engine CLI

use arrow::array::{ArrayRef, Float64Array, Int64Array, StringArray};
use clap::{Parser, Subcommand};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::PathBuf;
use std::sync::Arc;
use vector_engine::execution::print_results;
use vector_engine::planner::{JoinType, SortExpr};
use vector_engine::{
    ExecutionConfig, ExecutionContext, Expr, LogicalOperator, LogicalType, MemoryTable, Result,
};

#[derive(Parser)]
#[command(name = "vector_engine")]
#[command(about = "Vectorized pull-based query execution engine")]
struct Cli {
    /// JSON execution config (chunk_capacity, memory_limit, verify_chunks)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Override the number of rows per chunk
    #[arg(long, global = true)]
    chunk_capacity: Option<usize>,

    /// Override the memory pool limit in bytes
    #[arg(long, global = true)]
    memory_limit: Option<usize>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sort a random table by its second column and keep the first two columns
    Run {
        /// Number of generated rows
        #[arg(short, long, default_value = "20")]
        rows: usize,

        /// Keep only the first N sorted rows
        #[arg(short, long)]
        limit: Option<usize>,

        /// Random seed
        #[arg(short, long, default_value = "42")]
        seed: u64,
    },

    /// Print the physical plan of the `run` query
    Explain {
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Show IN / NOT IN results computed by a mark join
    MarkJoin {
        /// Add a NULL to the right-hand side
        #[arg(long)]
        with_null: bool,
    },
}

fn main() {
    // Set up logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let mut config = match &cli.config {
        Some(path) => ExecutionConfig::from_file(path)?,
        None => ExecutionConfig::default(),
    };
    if let Some(capacity) = cli.chunk_capacity {
        config = config.with_chunk_capacity(capacity);
    }
    if let Some(limit) = cli.memory_limit {
        config = config.with_memory_limit(limit);
    }
    let ctx = ExecutionContext::with_config(config);

    match cli.command {
        Commands::Run { rows, limit, seed } => {
            let plan = sorted_plan(random_table(rows, seed)?, limit)?;
            let result = ctx.execute(&plan)?;
            print_results(&result)?;
        }
        Commands::Explain { limit } => {
            let plan = sorted_plan(random_table(4, 0)?, limit)?;
            println!("Logical Plan:\n{}", plan);
            println!("Physical Plan:\n{}", ctx.explain(&plan)?);
        }
        Commands::MarkJoin { with_null } => {
            let left = MemoryTable::try_new(
                "probe",
                vec![Arc::new(StringArray::from(vec![Some("A"), Some("B"), Some("C"), None]))],
            )?;
            let mut values = vec![Some("A")];
            if with_null {
                values.push(None);
            }
            let right = MemoryTable::try_new("build", vec![Arc::new(StringArray::from(values))])?;
            let key = Expr::column(0, LogicalType::Varchar);
            let plan = LogicalOperator::scan(Arc::new(left))?.join(
                LogicalOperator::scan(Arc::new(right))?,
                JoinType::Mark,
                vec![(key.clone(), key)],
            )?;
            let result = ctx.execute(&plan)?;
            print_results(&result)?;
        }
    }
    Ok(())
}

/// Four columns: id, score, name, weight
fn random_table(rows: usize, seed: u64) -> Result<Arc<MemoryTable>> {
    let mut rng = StdRng::seed_from_u64(seed);
    let columns: Vec<ArrayRef> = vec![
        Arc::new(Int64Array::from_iter_values(0..rows as i64)),
        Arc::new(Int64Array::from_iter_values(
            (0..rows).map(|_| rng.gen_range(0..100)),
        )),
        Arc::new(StringArray::from_iter_values(
            (0..rows).map(|i| format!("row-{}", i)),
        )),
        Arc::new(Float64Array::from_iter_values(
            (0..rows).map(|_| rng.gen::<f64>()),
        )),
    ];
    Ok(Arc::new(MemoryTable::try_new("random", columns)?))
}

/// prune(2) <- [limit] <- order by #1 <- prune(4) <- scan
fn sorted_plan(table: Arc<MemoryTable>, limit: Option<usize>) -> Result<LogicalOperator> {
    let plan = LogicalOperator::scan(table)?
        .prune_columns(4)?
        .order(vec![SortExpr::new(Expr::column(1, LogicalType::BigInt))])?;
    let plan = match limit {
        Some(limit) => plan.limit(Some(limit), 0),
        None => plan,
    };
    plan.prune_columns(2)
}
