use super::{BufferId, PoolError, PoolResult};
use crate::brick::VirtualAddress;

/// Brick and buffer sizes of a pool, and address translation between them
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolGeometry {
    brick_size: usize,
    buffer_size: usize,
    bricks_per_buffer: usize,
}

impl PoolGeometry {
    /// Derive the geometry for `brick_size`, fitting as many whole bricks as
    /// possible into `max_buffer_size`.
    pub fn new(brick_size: usize, max_buffer_size: usize) -> PoolResult<Self> {
        if brick_size == 0 {
            return Err(PoolError::InvalidBrickSize(brick_size));
        }
        if brick_size > max_buffer_size {
            return Err(PoolError::BrickTooLarge {
                brick_size,
                max_buffer_size,
            });
        }
        let bricks_per_buffer = max_buffer_size / brick_size;
        Ok(Self {
            brick_size,
            buffer_size: bricks_per_buffer * brick_size,
            bricks_per_buffer,
        })
    }

    /// Rebuild a geometry from persisted values, checking they agree
    pub fn from_parts(
        brick_size: usize,
        buffer_size: usize,
        bricks_per_buffer: usize,
    ) -> PoolResult<Self> {
        if brick_size == 0 || bricks_per_buffer == 0 {
            return Err(PoolError::InvalidManifest(format!(
                "brick size {brick_size} and bricks per buffer {bricks_per_buffer} must be nonzero"
            )));
        }
        if brick_size.checked_mul(bricks_per_buffer) != Some(buffer_size) {
            return Err(PoolError::InvalidManifest(format!(
                "buffer size {buffer_size} is not {bricks_per_buffer} bricks of {brick_size} bytes"
            )));
        }
        Ok(Self {
            brick_size,
            buffer_size,
            bricks_per_buffer,
        })
    }

    pub fn brick_size(&self) -> usize {
        self.brick_size
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    pub fn bricks_per_buffer(&self) -> usize {
        self.bricks_per_buffer
    }

    /// Buffer holding `address`
    pub fn buffer_of(&self, address: VirtualAddress) -> BufferId {
        (address / self.buffer_size as u64) as BufferId
    }

    /// Brick slot of `address` within its buffer
    pub fn slot_of(&self, address: VirtualAddress) -> usize {
        ((address % self.buffer_size as u64) / self.brick_size as u64) as usize
    }

    /// First address of a buffer
    pub fn buffer_start(&self, buffer: BufferId) -> VirtualAddress {
        buffer as u64 * self.buffer_size as u64
    }

    /// True if `address` is the first byte of a brick slot
    pub fn is_brick_aligned(&self, address: VirtualAddress) -> bool {
        address % self.brick_size as u64 == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_rounded_down_to_bricks() {
        let geometry = PoolGeometry::new(1000, 4500).unwrap();
        assert_eq!(geometry.bricks_per_buffer(), 4);
        assert_eq!(geometry.buffer_size(), 4000);
    }

    #[test]
    fn test_brick_too_large() {
        let result = PoolGeometry::new(4097, 4096);
        assert!(matches!(result, Err(PoolError::BrickTooLarge { .. })));
        assert!(matches!(
            PoolGeometry::new(0, 4096),
            Err(PoolError::InvalidBrickSize(0))
        ));
    }

    #[test]
    fn test_address_translation() {
        let geometry = PoolGeometry::new(4096, 3 * 4096).unwrap();
        let address = geometry.buffer_start(2) + 4096;
        assert_eq!(geometry.buffer_of(address), 2);
        assert_eq!(geometry.slot_of(address), 1);
        assert!(geometry.is_brick_aligned(address));
        assert!(!geometry.is_brick_aligned(address + 1));
        assert_eq!(geometry.slot_of(address + 4095), 1);
    }

    #[test]
    fn test_from_parts_validates() {
        assert!(PoolGeometry::from_parts(512, 2048, 4).is_ok());
        assert!(matches!(
            PoolGeometry::from_parts(512, 2000, 4),
            Err(PoolError::InvalidManifest(_))
        ));
        assert!(matches!(
            PoolGeometry::from_parts(0, 0, 4),
            Err(PoolError::InvalidManifest(_))
        ));
    }
}
