mod buffer;
mod config;
mod error;
mod file_manager;
mod geometry;
mod guard;
mod lru_queue;
mod manager;
mod manifest;
mod progress;
#[cfg(test)]
mod proptest;

pub use config::PoolConfig;
pub use error::{PoolError, PoolResult};
pub use file_manager::BufferFileManager;
pub use geometry::PoolGeometry;
pub use guard::{BrickReadGuard, BrickWriteGuard};
pub use lru_queue::LruQueue;
pub use manager::{BrickPoolManager, PoolStats};
pub use manifest::PoolManifest;
pub use progress::ProgressReporter;

/// Default upper bound for a single buffer (64MB)
pub const DEFAULT_MAX_BUFFER_SIZE: usize = 64 * 1024 * 1024;

/// Default RAM budget for resident buffers (512MB)
pub const DEFAULT_RAM_LIMIT: usize = 512 * 1024 * 1024;

/// Default file name prefix of buffer files inside the pool directory
pub const DEFAULT_BUFFER_FILE_PREFIX: &str = "buffer_";

/// Buffer index, in creation order
pub type BufferId = usize;
