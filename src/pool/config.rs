use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use super::PoolResult;
use super::{DEFAULT_BUFFER_FILE_PREFIX, DEFAULT_MAX_BUFFER_SIZE, DEFAULT_RAM_LIMIT};

/// Construction parameters of a brick pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolConfig {
    /// Directory holding the buffer files
    pub pool_path: PathBuf,
    /// Upper bound for a buffer; the actual size is rounded down to whole bricks
    #[serde(default = "default_max_buffer_size")]
    pub max_buffer_size_bytes: usize,
    /// RAM budget for resident buffers
    #[serde(default = "default_ram_limit")]
    pub ram_limit_bytes: usize,
    #[serde(default = "default_prefix")]
    pub buffer_file_prefix: String,
}

fn default_max_buffer_size() -> usize {
    DEFAULT_MAX_BUFFER_SIZE
}

fn default_ram_limit() -> usize {
    DEFAULT_RAM_LIMIT
}

fn default_prefix() -> String {
    DEFAULT_BUFFER_FILE_PREFIX.to_string()
}

impl PoolConfig {
    pub fn new<P: AsRef<Path>>(pool_path: P) -> Self {
        Self {
            pool_path: pool_path.as_ref().to_path_buf(),
            max_buffer_size_bytes: DEFAULT_MAX_BUFFER_SIZE,
            ram_limit_bytes: DEFAULT_RAM_LIMIT,
            buffer_file_prefix: default_prefix(),
        }
    }

    pub fn with_max_buffer_size(mut self, bytes: usize) -> Self {
        self.max_buffer_size_bytes = bytes;
        self
    }

    pub fn with_ram_limit(mut self, bytes: usize) -> Self {
        self.ram_limit_bytes = bytes;
        self
    }

    pub fn with_buffer_file_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.buffer_file_prefix = prefix.into();
        self
    }

    /// Load a configuration from a JSON file
    pub fn load(path: &Path) -> PoolResult<Self> {
        let content = fs::read_to_string(path)?;
        let config = serde_json::from_str(&content)?;
        Ok(config)
    }
}
