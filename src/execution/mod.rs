//! Query execution module

mod config;
mod context;
mod memory;

pub use config::*;
pub use context::*;
pub use memory::*;
