//! Execution configuration

use crate::error::Result;
use crate::types::VECTOR_SIZE;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Knobs shared by every operator of a query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Maximum rows per output chunk
    pub chunk_capacity: usize,
    /// Bytes blocking operators may buffer; unbounded when absent
    pub memory_limit: Option<usize>,
    /// Check chunk invariants after every `get_chunk`
    pub verify_chunks: bool,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            chunk_capacity: VECTOR_SIZE,
            memory_limit: None,
            verify_chunks: cfg!(debug_assertions),
        }
    }
}

impl ExecutionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_chunk_capacity(mut self, capacity: usize) -> Self {
        self.chunk_capacity = capacity.max(1);
        self
    }

    pub fn with_memory_limit(mut self, limit: usize) -> Self {
        self.memory_limit = Some(limit);
        self
    }

    pub fn with_verify_chunks(mut self, verify: bool) -> Self {
        self.verify_chunks = verify;
        self
    }

    /// Parse a JSON document; missing fields keep their defaults
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        let capacity = config.chunk_capacity;
        Ok(config.with_chunk_capacity(capacity))
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::QueryError;

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = ExecutionConfig::from_json(r#"{"chunk_capacity": 8}"#).unwrap();
        assert_eq!(config.chunk_capacity, 8);
        assert_eq!(config.memory_limit, None);
        assert_eq!(config.verify_chunks, cfg!(debug_assertions));
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let config = ExecutionConfig::from_json(r#"{"chunk_capacity": 0}"#).unwrap();
        assert_eq!(config.chunk_capacity, 1);
    }

    #[test]
    fn test_json_roundtrip_and_errors() {
        let config = ExecutionConfig::new().with_memory_limit(4096).with_verify_chunks(true);
        let parsed = ExecutionConfig::from_json(&config.to_json().unwrap()).unwrap();
        assert_eq!(parsed, config);
        assert!(matches!(
            ExecutionConfig::from_json("{not json"),
            Err(QueryError::Config(_))
        ));
    }
}
