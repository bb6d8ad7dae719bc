use std::io;
use thiserror::Error;

use super::BufferId;
use crate::brick::{UsageError, VirtualAddress};

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid brick size: {0}")]
    InvalidBrickSize(usize),

    #[error("Brick size {brick_size} exceeds maximum buffer size {max_buffer_size}")]
    BrickTooLarge {
        brick_size: usize,
        max_buffer_size: usize,
    },

    #[error("Brick pool directory does not exist: {0}")]
    PoolDirectoryMissing(String),

    #[error("RAM limit of {ram_limit} bytes cannot hold two buffers of {buffer_size} bytes")]
    RamLimitTooSmall { ram_limit: usize, buffer_size: usize },

    #[error("Missing brick buffer file: {0}")]
    MissingBufferFile(String),

    #[error("Brick buffer file {path} has size {actual}, expected {expected}")]
    BufferFileSize {
        path: String,
        expected: u64,
        actual: u64,
    },

    #[error("Invalid manifest: {0}")]
    InvalidManifest(String),

    #[error("Invalid brick address: {0}")]
    InvalidAddress(VirtualAddress),

    #[error("Brick {0} has already been deleted")]
    BrickAlreadyDeleted(VirtualAddress),

    #[error("Brick {0} is being written")]
    BrickIsBeingWritten(VirtualAddress),

    #[error("Brick {0} is in use")]
    BrickIsInUse(VirtualAddress),

    #[error("All buffers in RAM are in use")]
    AllBuffersInUse,

    #[error("Cannot evict buffer {0} while its bricks are in use")]
    ResourceExhausted(BufferId),

    #[error("Buffer {0} is not resident")]
    BufferNotResident(BufferId),

    #[error("Buffer {0} released more often than acquired")]
    RefcountUnderflow(BufferId),

    #[error("{0} buffers still have bricks in use")]
    BuffersInUse(usize),

    #[error("Brick usage error: {0}")]
    Usage(#[from] UsageError),
}

pub type PoolResult<T> = Result<T, PoolError>;
