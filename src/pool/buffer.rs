use parking_lot::RwLock;
use std::io::{Read, Write};
use std::sync::Arc;

use super::geometry::PoolGeometry;
use crate::brick::{BrickUsage, ChannelSelection};

/// RAM copy of one buffer, split into independently lockable brick slots.
///
/// The slots are laid out back to back on disk in slot order.
#[derive(Debug)]
pub struct BufferMemory {
    brick_size: usize,
    bricks: Box<[RwLock<Box<[u8]>>]>,
}

impl BufferMemory {
    /// A buffer with every brick zeroed
    pub fn zeroed(geometry: &PoolGeometry) -> Self {
        let bricks = (0..geometry.bricks_per_buffer())
            .map(|_| RwLock::new(vec![0u8; geometry.brick_size()].into_boxed_slice()))
            .collect();
        Self {
            brick_size: geometry.brick_size(),
            bricks,
        }
    }

    /// Read a full buffer image from `reader`
    pub fn read_from<R: Read>(reader: &mut R, geometry: &PoolGeometry) -> std::io::Result<Self> {
        let mut bricks = Vec::with_capacity(geometry.bricks_per_buffer());
        for _ in 0..geometry.bricks_per_buffer() {
            let mut data = vec![0u8; geometry.brick_size()].into_boxed_slice();
            reader.read_exact(&mut data)?;
            bricks.push(RwLock::new(data));
        }
        Ok(Self {
            brick_size: geometry.brick_size(),
            bricks: bricks.into_boxed_slice(),
        })
    }

    /// Write the full buffer image to `writer` without blocking on brick locks.
    ///
    /// A brick whose bytes are exclusively borrowed at the moment is written
    /// as zeros. Returns false if that happened, so the image is incomplete.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> std::io::Result<bool> {
        let mut complete = true;
        for brick in self.bricks.iter() {
            match brick.try_read() {
                Some(data) => writer.write_all(&data)?,
                None => {
                    complete = false;
                    writer.write_all(&vec![0u8; self.brick_size])?;
                }
            }
        }
        Ok(complete)
    }


    pub fn brick(&self, slot: usize) -> &RwLock<Box<[u8]>> {
        &self.bricks[slot]
    }
}

/// Bookkeeping for one buffer, resident or not
#[derive(Debug)]
pub struct BufferEntry {
    /// Present while the buffer is resident
    pub memory: Option<Arc<BufferMemory>>,
    /// One usage word per brick slot
    pub usage: Box<[BrickUsage]>,
    /// Outstanding brick acquisitions against this buffer
    pub in_use_refcount: usize,
    /// Must be written back before the RAM copy is dropped
    pub must_be_saved: bool,
}

impl BufferEntry {
    pub fn new(bricks_per_buffer: usize) -> Self {
        Self {
            memory: None,
            usage: vec![BrickUsage::new(); bricks_per_buffer].into_boxed_slice(),
            in_use_refcount: 0,
            must_be_saved: false,
        }
    }

    pub fn is_resident(&self) -> bool {
        self.memory.is_some()
    }

    /// True if nothing references the buffer, so it may be evicted
    pub fn is_evictable(&self) -> bool {
        self.in_use_refcount == 0 && self.usage.iter().all(|u| u.is_idle())
    }

    /// True if some brick of this buffer still has an open writer
    pub fn has_active_writer(&self) -> bool {
        self.usage
            .iter()
            .any(|u| u.is_being_written(ChannelSelection::ALL))
    }
}
