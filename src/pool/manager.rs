use ahash::AHashSet;
use parking_lot::{Condvar, Mutex, MutexGuard};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::buffer::{BufferEntry, BufferMemory};
use super::config::PoolConfig;
use super::error::{PoolError, PoolResult};
use super::file_manager::BufferFileManager;
use super::geometry::PoolGeometry;
use super::guard::{BrickReadGuard, BrickWriteGuard};
use super::lru_queue::LruQueue;
use super::manifest::PoolManifest;
use super::progress::ProgressReporter;
use super::BufferId;
use crate::brick::{AccessMode, ChannelSelection, NO_BRICK, VirtualAddress};

/// Snapshot of the pool's counters
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    pub brick_size: usize,
    pub buffer_size: usize,
    pub bricks_per_buffer: usize,
    pub buffer_count: usize,
    pub resident_buffers: usize,
    pub max_resident_buffers: usize,
    pub dirty_buffers: usize,
    pub free_bricks: usize,
    pub next_virtual_address: VirtualAddress,
    pub memory_used: usize,
    pub memory_allocated: u64,
}

/// Disk-backed pool of fixed-size bricks with an LRU cache of resident buffers.
///
/// All state lives behind one mutex; blocking calls wait on a single
/// condition variable that is notified whenever a brick or buffer is released.
/// Disk I/O runs with the lock held.
pub struct BrickPoolManager {
    state: Mutex<PoolState>,
    released: Condvar,
}

struct PoolState {
    geometry: PoolGeometry,
    max_buffer_size: usize,
    ram_limit: usize,
    max_resident: usize,
    files: BufferFileManager,
    next_address: VirtualAddress,
    /// Deleted bricks, reused before the cursor grows
    free_list: Vec<VirtualAddress>,
    deleted: AHashSet<VirtualAddress>,
    buffer_files: Vec<PathBuf>,
    buffers: Vec<BufferEntry>,
    lru: LruQueue,
    resident_count: usize,
}

/// Number of buffers that fit in `ram_limit`; at least two are required
fn max_resident_for(ram_limit: usize, buffer_size: usize) -> PoolResult<usize> {
    let max_resident = ram_limit / buffer_size;
    if max_resident < 2 {
        return Err(PoolError::RamLimitTooSmall {
            ram_limit,
            buffer_size,
        });
    }
    Ok(max_resident)
}

impl BrickPoolManager {
    /// Create an empty pool for bricks of `brick_size` bytes.
    ///
    /// The pool directory must already exist.
    pub fn initialize(config: &PoolConfig, brick_size: usize) -> PoolResult<Self> {
        let geometry = PoolGeometry::new(brick_size, config.max_buffer_size_bytes)?;
        let files = BufferFileManager::open(&config.pool_path, &config.buffer_file_prefix)?;
        let max_resident = max_resident_for(config.ram_limit_bytes, geometry.buffer_size())?;

        info!(
            brick_size,
            buffer_size = geometry.buffer_size(),
            bricks_per_buffer = geometry.bricks_per_buffer(),
            max_resident,
            pool = %files.pool_path().display(),
            "initialized brick pool"
        );

        Ok(Self::from_state(PoolState {
            geometry,
            max_buffer_size: config.max_buffer_size_bytes,
            ram_limit: config.ram_limit_bytes,
            max_resident,
            files,
            next_address: 0,
            free_list: Vec::new(),
            deleted: AHashSet::new(),
            buffer_files: Vec::new(),
            buffers: Vec::new(),
            lru: LruQueue::new(),
            resident_count: 0,
        }))
    }

    /// Reopen a pool from its manifest. Geometry, directory and prefix come
    /// from the manifest, the RAM limit from `config`. Every buffer starts
    /// out on disk only.
    pub fn deserialize(config: &PoolConfig, manifest: &PoolManifest) -> PoolResult<Self> {
        let geometry = PoolGeometry::from_parts(
            manifest.brick_memory_size_bytes,
            manifest.single_buffer_size_bytes,
            manifest.num_brick_slots_per_buffer,
        )?;
        let files =
            BufferFileManager::open(&manifest.brick_pool_path, &manifest.buffer_file_prefix)?;
        for path in &manifest.buffer_files {
            files.check_buffer_file(path, geometry.buffer_size() as u64)?;
        }
        let max_resident = max_resident_for(config.ram_limit_bytes, geometry.buffer_size())?;

        let next_address = manifest.next_virtual_memory_address;
        if !geometry.is_brick_aligned(next_address)
            || next_address > geometry.buffer_start(manifest.buffer_files.len())
        {
            return Err(PoolError::InvalidManifest(format!(
                "next address {next_address} does not fit {} buffer files",
                manifest.buffer_files.len()
            )));
        }

        let buffers = (0..manifest.buffer_files.len())
            .map(|_| BufferEntry::new(geometry.bricks_per_buffer()))
            .collect();

        info!(
            buffers = manifest.buffer_files.len(),
            next_address,
            pool = %files.pool_path().display(),
            "reopened brick pool"
        );

        Ok(Self::from_state(PoolState {
            geometry,
            max_buffer_size: manifest.max_single_buffer_size_bytes,
            ram_limit: config.ram_limit_bytes,
            max_resident,
            files,
            next_address,
            free_list: Vec::new(),
            deleted: AHashSet::new(),
            buffer_files: manifest.buffer_files.clone(),
            buffers,
            lru: LruQueue::new(),
            resident_count: 0,
        }))
    }

    fn from_state(state: PoolState) -> Self {
        Self {
            state: Mutex::new(state),
            released: Condvar::new(),
        }
    }

    /// Write dirty buffers and describe the pool so it can be reopened
    pub fn serialize(&self) -> PoolResult<PoolManifest> {
        let mut state = self.state.lock();
        state.flush_dirty(None)?;
        Ok(PoolManifest {
            brick_memory_size_bytes: state.geometry.brick_size(),
            max_single_buffer_size_bytes: state.max_buffer_size,
            single_buffer_size_bytes: state.geometry.buffer_size(),
            num_brick_slots_per_buffer: state.geometry.bricks_per_buffer(),
            buffer_files: state.buffer_files.clone(),
            brick_pool_path: state.files.pool_path().to_path_buf(),
            buffer_file_prefix: state.files.prefix().to_string(),
            next_virtual_memory_address: state.next_address,
        })
    }

    /// Write every dirty buffer back and drop all buffers from RAM.
    ///
    /// The pool stays usable; buffers are paged in again on demand.
    pub fn deinitialize(&self) -> PoolResult<()> {
        let mut state = self.state.lock();
        state.evict_all()?;
        info!("released all brick buffers");
        Ok(())
    }

    /// Hand out a brick address, growing the pool by one buffer if needed
    pub fn allocate_brick(&self) -> PoolResult<VirtualAddress> {
        let mut state = self.state.lock();
        let cursor = state.next_address;
        let brick_size = state.geometry.brick_size() as u64;

        if state.geometry.buffer_of(cursor) < state.buffers.len() {
            state.next_address += brick_size;
            return Ok(cursor);
        }

        if let Some(address) = state.free_list.pop() {
            state.deleted.remove(&address);
            return Ok(address);
        }

        state.create_buffer()?;
        state.next_address = cursor + brick_size;
        Ok(cursor)
    }

    /// Hand a brick back for reuse, waiting until nobody uses it any more
    pub fn delete_brick(&self, address: VirtualAddress) -> PoolResult<()> {
        let mut state = self.state.lock();
        let (buffer, slot) = state.locate(address)?;

        while state.buffers[buffer].usage[slot].is_in_use(ChannelSelection::ALL, 0) {
            self.released.wait(&mut state);
        }

        if !state.deleted.insert(address) {
            return Err(PoolError::BrickAlreadyDeleted(address));
        }
        state.free_list.push(address);
        Ok(())
    }

    /// Acquire a brick for reading. Returns `None` for [`NO_BRICK`].
    ///
    /// Waits while a selected channel is being written, or fails with
    /// [`PoolError::BrickIsBeingWritten`] when `blocking` is false.
    pub fn get_brick(
        &self,
        address: VirtualAddress,
        channels: ChannelSelection,
        blocking: bool,
    ) -> PoolResult<Option<BrickReadGuard<'_>>> {
        if address == NO_BRICK {
            return Ok(None);
        }
        let (memory, slot) = self.acquire(address, channels, blocking, AccessMode::Read)?;
        Ok(Some(BrickReadGuard::new(self, address, channels, memory, slot)))
    }

    /// Acquire a brick for writing. Returns `None` for [`NO_BRICK`].
    ///
    /// Waits until no other holder uses or writes a selected channel, or
    /// fails immediately when `blocking` is false.
    pub fn get_writable_brick(
        &self,
        address: VirtualAddress,
        channels: ChannelSelection,
        blocking: bool,
    ) -> PoolResult<Option<BrickWriteGuard<'_>>> {
        if address == NO_BRICK {
            return Ok(None);
        }
        let (memory, slot) = self.acquire(address, channels, blocking, AccessMode::Write)?;
        Ok(Some(BrickWriteGuard::new(self, address, channels, memory, slot)))
    }

    fn acquire(
        &self,
        address: VirtualAddress,
        channels: ChannelSelection,
        blocking: bool,
        mode: AccessMode,
    ) -> PoolResult<(Arc<BufferMemory>, usize)> {
        let mut state = self.state.lock();
        let (buffer, slot) = state.locate(address)?;

        // Pin the buffer first so it cannot be evicted while we wait on the brick.
        if state.buffers[buffer].is_resident() {
            state.buffers[buffer].in_use_refcount += 1;
        } else {
            self.load_buffer_from_disk(&mut state, buffer, blocking)?;
        }
        state.lru.push_to_front(buffer);

        // The caller holds no brick reference yet, so "any other user" means
        // any user at all.
        loop {
            let usage = state.buffers[buffer].usage[slot];
            let conflict = if usage.is_being_written(channels) {
                Some(PoolError::BrickIsBeingWritten(address))
            } else if mode == AccessMode::Write && usage.is_in_use(channels, 0) {
                Some(PoolError::BrickIsInUse(address))
            } else {
                None
            };
            let Some(conflict) = conflict else {
                break;
            };
            if !blocking {
                self.unpin(state, buffer);
                return Err(conflict);
            }
            self.released.wait(&mut state);
        }

        let entry = &mut state.buffers[buffer];
        if let Err(err) = entry.usage[slot].increase_in_use(channels) {
            error!(address, ?channels, %err, "too many concurrent users of brick");
            self.unpin(state, buffer);
            return Err(err.into());
        }
        if mode == AccessMode::Write {
            entry.usage[slot].set_being_written(true, channels);
            entry.must_be_saved = true;
        }
        match entry.memory.clone() {
            Some(memory) => Ok((memory, slot)),
            None => {
                error!(buffer, "pinned buffer is not resident");
                Err(PoolError::BufferNotResident(buffer))
            }
        }
    }

    /// Drop a pin taken by a failed acquisition and wake waiters
    fn unpin(&self, mut state: MutexGuard<'_, PoolState>, buffer: BufferId) {
        let entry = &mut state.buffers[buffer];
        entry.in_use_refcount = entry.in_use_refcount.saturating_sub(1);
        drop(state);
        self.released.notify_all();
    }

    /// Page a buffer in, evicting the least recently used unreferenced
    /// buffer if RAM is full. Leaves the buffer pinned once for the caller.
    fn load_buffer_from_disk(
        &self,
        state: &mut MutexGuard<'_, PoolState>,
        buffer: BufferId,
        blocking: bool,
    ) -> PoolResult<()> {
        loop {
            // Another thread may have paged it in while we were waiting.
            if state.buffers[buffer].is_resident() {
                state.buffers[buffer].in_use_refcount += 1;
                return Ok(());
            }
            if state.resident_count < state.max_resident {
                break;
            }
            if let Some(victim) = state.select_victim() {
                state.evict(victim)?;
                break;
            }
            if !blocking {
                return Err(PoolError::AllBuffersInUse);
            }
            debug!(buffer, "waiting for a buffer to become evictable");
            self.released.wait(state);
        }

        let path = state.buffer_files[buffer].clone();
        let memory = state.files.read_buffer(&path, &state.geometry)?;
        let entry = &mut state.buffers[buffer];
        entry.memory = Some(Arc::new(memory));
        entry.in_use_refcount = 1;
        entry.must_be_saved = false;
        state.lru.insert_to_front(buffer);
        state.resident_count += 1;
        debug!(buffer, resident = state.resident_count, "paged in buffer");
        Ok(())
    }

    /// Release path behind the brick guards
    pub(crate) fn release_brick(
        &self,
        address: VirtualAddress,
        channels: ChannelSelection,
        mode: AccessMode,
    ) -> PoolResult<()> {
        let mut state = self.state.lock();
        let (buffer, slot) = state.locate(address)?;
        let entry = &mut state.buffers[buffer];

        if !entry.is_resident() {
            error!(address, buffer, "release on a buffer that is not resident");
            return Err(PoolError::BufferNotResident(buffer));
        }
        if entry.in_use_refcount == 0 {
            error!(address, buffer, "buffer released more often than acquired");
            return Err(PoolError::RefcountUnderflow(buffer));
        }
        if let Err(err) = entry.usage[slot].decrease_in_use(channels) {
            error!(address, ?channels, %err, "brick released more often than acquired");
            return Err(err.into());
        }
        if mode == AccessMode::Write {
            entry.usage[slot].set_being_written(false, channels);
            entry.must_be_saved = true;
        }
        entry.in_use_refcount -= 1;

        drop(state);
        self.released.notify_all();
        Ok(())
    }

    /// True if the buffer holding `address` is resident
    pub fn is_brick_in_ram(&self, address: VirtualAddress) -> bool {
        let state = self.state.lock();
        match state.locate(address) {
            Ok((buffer, _)) => state.buffers[buffer].is_resident(),
            Err(_) => false,
        }
    }

    /// Bytes held in RAM by resident buffers
    pub fn brick_pool_memory_used(&self) -> usize {
        let state = self.state.lock();
        state.resident_count * state.geometry.buffer_size()
    }

    /// Bytes occupied on disk by all buffer files
    pub fn brick_pool_memory_allocated(&self) -> u64 {
        let state = self.state.lock();
        state.buffer_files.len() as u64 * state.geometry.buffer_size() as u64
    }

    /// Write every dirty resident buffer to disk. Returns the number of
    /// buffers written.
    pub fn flush_pool_to_disk(&self, progress: Option<&dyn ProgressReporter>) -> PoolResult<usize> {
        let mut state = self.state.lock();
        let written = state.flush_dirty(progress)?;
        debug!(written, "flushed brick pool");
        Ok(written)
    }

    /// Change the RAM budget. A different limit flushes the pool and drops
    /// every buffer from RAM before it takes effect.
    pub fn set_ram_limit(&self, ram_limit: usize) -> PoolResult<()> {
        let mut state = self.state.lock();
        if ram_limit == state.ram_limit {
            return Ok(());
        }
        let max_resident = max_resident_for(ram_limit, state.geometry.buffer_size())?;
        state.evict_all()?;
        state.ram_limit = ram_limit;
        state.max_resident = max_resident;
        info!(ram_limit, max_resident, "changed brick pool RAM limit");
        Ok(())
    }

    /// Current RAM budget in bytes
    pub fn ram_limit(&self) -> usize {
        self.state.lock().ram_limit
    }

    /// Size of one brick in bytes
    pub fn brick_size(&self) -> usize {
        self.state.lock().geometry.brick_size()
    }

    /// Size of one buffer in bytes
    pub fn buffer_size(&self) -> usize {
        self.state.lock().geometry.buffer_size()
    }

    /// Brick slots in each buffer
    pub fn bricks_per_buffer(&self) -> usize {
        self.state.lock().geometry.bricks_per_buffer()
    }

    /// Buffers that fit in the RAM budget
    pub fn max_resident_buffers(&self) -> usize {
        self.state.lock().max_resident
    }

    /// Buffers currently held in RAM
    pub fn resident_buffer_count(&self) -> usize {
        self.state.lock().resident_count
    }

    /// Buffers in the pool, resident or not
    pub fn buffer_count(&self) -> usize {
        self.state.lock().buffers.len()
    }

    /// Resident buffers with unsaved changes
    pub fn dirty_buffer_count(&self) -> usize {
        self.state.lock().dirty_count()
    }

    /// Deleted bricks waiting for reuse
    pub fn free_brick_count(&self) -> usize {
        self.state.lock().free_list.len()
    }

    /// Address the allocation cursor hands out next
    pub fn next_virtual_address(&self) -> VirtualAddress {
        self.state.lock().next_address
    }

    /// Resident buffers from most to least recently used
    pub fn resident_buffers(&self) -> Vec<BufferId> {
        self.state.lock().lru.iter().collect()
    }

    /// Snapshot of all counters under one lock
    pub fn stats(&self) -> PoolStats {
        let state = self.state.lock();
        let buffer_size = state.geometry.buffer_size();
        PoolStats {
            brick_size: state.geometry.brick_size(),
            buffer_size,
            bricks_per_buffer: state.geometry.bricks_per_buffer(),
            buffer_count: state.buffers.len(),
            resident_buffers: state.resident_count,
            max_resident_buffers: state.max_resident,
            dirty_buffers: state.dirty_count(),
            free_bricks: state.free_list.len(),
            next_virtual_address: state.next_address,
            memory_used: state.resident_count * buffer_size,
            memory_allocated: state.buffer_files.len() as u64 * buffer_size as u64,
        }
    }
}

impl Drop for BrickPoolManager {
    fn drop(&mut self) {
        if let Err(err) = self.deinitialize() {
            warn!(%err, "failed to flush brick pool on drop");
        }
    }
}

impl PoolState {
    /// Buffer and slot of an issued brick address
    fn locate(&self, address: VirtualAddress) -> PoolResult<(BufferId, usize)> {
        if address >= self.next_address || !self.geometry.is_brick_aligned(address) {
            return Err(PoolError::InvalidAddress(address));
        }
        Ok((
            self.geometry.buffer_of(address),
            self.geometry.slot_of(address),
        ))
    }

    /// Least recently used resident buffer that nothing references
    fn select_victim(&self) -> Option<BufferId> {
        self.lru
            .iter_lru_first()
            .find(|&buffer| self.buffers[buffer].is_evictable())
    }

    /// Append a new zeroed, dirty, resident buffer, evicting one if RAM is full
    fn create_buffer(&mut self) -> PoolResult<BufferId> {
        let buffer = self.buffers.len();
        if self.resident_count >= self.max_resident {
            // Not necessarily the tail: a pinned tail is skipped for the
            // next unreferenced buffer in LRU order.
            let Some(victim) = self.select_victim() else {
                let tail = self.lru.peek_last().unwrap_or_default();
                error!(buffer = tail, "cannot evict a buffer to allocate a new one");
                return Err(PoolError::ResourceExhausted(tail));
            };
            self.evict(victim)?;
        }

        let mut entry = BufferEntry::new(self.geometry.bricks_per_buffer());
        entry.memory = Some(Arc::new(BufferMemory::zeroed(&self.geometry)));
        entry.must_be_saved = true;

        self.buffer_files.push(self.files.buffer_file_path(buffer));
        self.buffers.push(entry);
        self.lru.insert_to_front(buffer);
        self.resident_count += 1;
        debug!(buffer, resident = self.resident_count, "created buffer");
        Ok(buffer)
    }

    /// Write a resident buffer to its file without waiting on brick locks.
    ///
    /// The dirty flag stays set while a writer is still active on one of its
    /// bricks, or if a borrowed brick could not be copied.
    fn save_buffer_to_disk(&mut self, buffer: BufferId) -> PoolResult<()> {
        let entry = &mut self.buffers[buffer];
        let Some(memory) = entry.memory.as_ref() else {
            return Err(PoolError::BufferNotResident(buffer));
        };
        let complete = self.files.write_buffer(&self.buffer_files[buffer], memory)?;
        entry.must_be_saved = !complete || entry.has_active_writer();
        Ok(())
    }

    /// Drop a resident, unreferenced buffer from RAM, saving it if dirty
    fn evict(&mut self, buffer: BufferId) -> PoolResult<()> {
        if !self.buffers[buffer].is_evictable() {
            error!(buffer, "attempted to evict a buffer that is in use");
            return Err(PoolError::ResourceExhausted(buffer));
        }
        if self.buffers[buffer].must_be_saved {
            self.save_buffer_to_disk(buffer)?;
            if self.buffers[buffer].must_be_saved {
                error!(buffer, "buffer still borrowed after its last release");
                return Err(PoolError::ResourceExhausted(buffer));
            }
        }
        if self.buffers[buffer].memory.take().is_none() {
            return Err(PoolError::BufferNotResident(buffer));
        }
        self.lru.remove(buffer);
        self.resident_count -= 1;
        debug!(buffer, resident = self.resident_count, "evicted buffer");
        Ok(())
    }

    fn evict_all(&mut self) -> PoolResult<()> {
        let pinned = self
            .buffers
            .iter()
            .filter(|entry| entry.is_resident() && !entry.is_evictable())
            .count();
        if pinned > 0 {
            return Err(PoolError::BuffersInUse(pinned));
        }
        while let Some(buffer) = self.lru.peek_last() {
            self.evict(buffer)?;
        }
        Ok(())
    }

    fn flush_dirty(&mut self, progress: Option<&dyn ProgressReporter>) -> PoolResult<usize> {
        let dirty: Vec<BufferId> = (0..self.buffers.len())
            .filter(|&buffer| {
                let entry = &self.buffers[buffer];
                entry.is_resident() && entry.must_be_saved
            })
            .collect();

        let total = dirty.len();
        for (done, buffer) in dirty.into_iter().enumerate() {
            self.save_buffer_to_disk(buffer)?;
            if let Some(progress) = progress {
                progress.set_progress((done + 1) as f32 / total as f32);
            }
        }
        if total == 0
            && let Some(progress) = progress
        {
            progress.set_progress(1.0);
        }
        Ok(total)
    }

    fn dirty_count(&self) -> usize {
        self.buffers
            .iter()
            .filter(|entry| entry.is_resident() && entry.must_be_saved)
            .count()
    }
}
