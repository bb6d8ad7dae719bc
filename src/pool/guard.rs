use parking_lot::{MappedRwLockReadGuard, MappedRwLockWriteGuard, RwLockReadGuard, RwLockWriteGuard};
use std::fmt;
use std::sync::Arc;
use tracing::warn;

use super::buffer::BufferMemory;
use super::manager::BrickPoolManager;
use super::PoolResult;
use crate::brick::{AccessMode, ChannelSelection, VirtualAddress};

/// An acquired brick; releases its usage on the pool exactly once
struct BrickHandle<'a> {
    pool: &'a BrickPoolManager,
    address: VirtualAddress,
    channels: ChannelSelection,
    mode: AccessMode,
    memory: Arc<BufferMemory>,
    slot: usize,
    released: bool,
}

impl BrickHandle<'_> {
    fn data(&self) -> MappedRwLockReadGuard<'_, [u8]> {
        RwLockReadGuard::map(self.memory.brick(self.slot).read(), |brick| &**brick)
    }

    fn release(&mut self) -> PoolResult<()> {
        self.released = true;
        self.pool
            .release_brick(self.address, self.channels, self.mode)
    }
}

impl Drop for BrickHandle<'_> {
    fn drop(&mut self) {
        if !self.released
            && let Err(err) = self.release()
        {
            warn!(address = self.address, %err, "failed to release brick");
        }
    }
}

/// Read access to one brick, held until [`release`](Self::release) or drop
pub struct BrickReadGuard<'a>(BrickHandle<'a>);

impl<'a> BrickReadGuard<'a> {
    pub(super) fn new(
        pool: &'a BrickPoolManager,
        address: VirtualAddress,
        channels: ChannelSelection,
        memory: Arc<BufferMemory>,
        slot: usize,
    ) -> Self {
        Self(BrickHandle {
            pool,
            address,
            channels,
            mode: AccessMode::Read,
            memory,
            slot,
            released: false,
        })
    }

    pub fn address(&self) -> VirtualAddress {
        self.0.address
    }

    pub fn channels(&self) -> ChannelSelection {
        self.0.channels
    }

    /// The brick's bytes
    pub fn data(&self) -> MappedRwLockReadGuard<'_, [u8]> {
        self.0.data()
    }

    pub fn release(mut self) -> PoolResult<()> {
        self.0.release()
    }
}

/// Write access to one brick, held until [`release`](Self::release) or drop.
///
/// Releasing clears the being-written flag of the selected channels.
pub struct BrickWriteGuard<'a>(BrickHandle<'a>);

impl<'a> BrickWriteGuard<'a> {
    pub(super) fn new(
        pool: &'a BrickPoolManager,
        address: VirtualAddress,
        channels: ChannelSelection,
        memory: Arc<BufferMemory>,
        slot: usize,
    ) -> Self {
        Self(BrickHandle {
            pool,
            address,
            channels,
            mode: AccessMode::Write,
            memory,
            slot,
            released: false,
        })
    }

    pub fn address(&self) -> VirtualAddress {
        self.0.address
    }

    pub fn channels(&self) -> ChannelSelection {
        self.0.channels
    }

    pub fn data(&self) -> MappedRwLockReadGuard<'_, [u8]> {
        self.0.data()
    }

    pub fn data_mut(&mut self) -> MappedRwLockWriteGuard<'_, [u8]> {
        RwLockWriteGuard::map(self.0.memory.brick(self.0.slot).write(), |brick| {
            &mut **brick
        })
    }

    pub fn release(mut self) -> PoolResult<()> {
        self.0.release()
    }
}

impl fmt::Debug for BrickReadGuard<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BrickReadGuard")
            .field("address", &self.0.address)
            .field("channels", &self.0.channels)
            .finish()
    }
}

impl fmt::Debug for BrickWriteGuard<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BrickWriteGuard")
            .field("address", &self.0.address)
            .field("channels", &self.0.channels)
            .finish()
    }
}
