pub mod brick;
pub mod pool;

pub use brick::{AccessMode, BrickUsage, ChannelSelection, NO_BRICK, VirtualAddress};
pub use pool::{
    BrickPoolManager, BrickReadGuard, BrickWriteGuard, BufferId, PoolConfig, PoolError,
    PoolManifest, PoolResult, PoolStats, ProgressReporter,
};
