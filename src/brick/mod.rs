mod channel;
mod usage;

pub use channel::ChannelSelection;
pub use usage::{BrickUsage, UsageError};

/// Maximum number of independently tracked channels per brick
pub const MAX_CHANNELS: usize = 4;

/// Logical offset of a brick in the pool's address space
pub type VirtualAddress = u64;

/// Sentinel address meaning "no brick"
pub const NO_BRICK: VirtualAddress = u64::MAX;

/// Whether a brick is being released after reading or after writing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    Read,
    Write,
}
