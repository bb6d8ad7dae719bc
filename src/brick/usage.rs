//! Packed per-brick usage word.
//!
//! Bit layout (one nibble per channel, channel `c` at bits `4c..4c+4`):
//!
//! ```text
//!  15   12 11    8 7     4 3     0
//! +-------+-------+-------+-------+
//! | ch 3  | ch 2  | ch 1  | ch 0  |
//! +-------+-------+-------+-------+
//!   nibble: [ W | C C C ]
//!            bit 3: being written
//!            bits 0-2: in-use counter (0..=7)
//! ```
//!
//! No locking happens here; the pool manager mutates entries under its lock.

use thiserror::Error;

use super::{ChannelSelection, MAX_CHANNELS};

const BITS_PER_CHANNEL: u32 = 4;
const COUNTER_MASK: u16 = 0b0111;
const WRITE_FLAG: u16 = 0b1000;

/// Highest value the in-use counter of a channel can hold
pub const MAX_IN_USE: u8 = COUNTER_MASK as u8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum UsageError {
    #[error("In-use counter overflow on channel {0}")]
    Overflow(usize),

    #[error("In-use counter underflow on channel {0}")]
    Underflow(usize),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BrickUsage(u16);

/// One counter increment for every selected channel, as a single addend
const fn counter_pattern(channels: ChannelSelection) -> u16 {
    let bits = channels.bits();
    let mut pattern = 0u16;
    let mut c = 0;
    while c < MAX_CHANNELS {
        if bits & (1 << c) != 0 {
            pattern |= 1 << (c as u32 * BITS_PER_CHANNEL);
        }
        c += 1;
    }
    pattern
}

const fn write_pattern(channels: ChannelSelection) -> u16 {
    counter_pattern(channels) << 3
}

impl BrickUsage {
    pub const fn new() -> Self {
        Self(0)
    }

    /// Raw packed representation
    pub const fn bits(self) -> u16 {
        self.0
    }

    /// In-use counter of a single channel
    pub const fn in_use_count(self, channel: usize) -> u8 {
        ((self.0 >> (channel as u32 * BITS_PER_CHANNEL)) & COUNTER_MASK) as u8
    }

    pub fn increase_in_use(&mut self, channels: ChannelSelection) -> Result<(), UsageError> {
        if let Some(c) = channels.iter().find(|&c| self.in_use_count(c) == MAX_IN_USE) {
            return Err(UsageError::Overflow(c));
        }
        self.0 += counter_pattern(channels);
        Ok(())
    }

    pub fn decrease_in_use(&mut self, channels: ChannelSelection) -> Result<(), UsageError> {
        if let Some(c) = channels.iter().find(|&c| self.in_use_count(c) == 0) {
            return Err(UsageError::Underflow(c));
        }
        self.0 -= counter_pattern(channels);
        Ok(())
    }

    /// True if any selected channel has more than `threshold` users.
    ///
    /// A caller already holding one reference passes `threshold = 1` to
    /// detect other users.
    pub fn is_in_use(self, channels: ChannelSelection, threshold: u8) -> bool {
        channels.iter().any(|c| self.in_use_count(c) > threshold)
    }

    pub const fn is_being_written(self, channels: ChannelSelection) -> bool {
        self.0 & write_pattern(channels) != 0
    }

    pub fn set_being_written(&mut self, writing: bool, channels: ChannelSelection) {
        if writing {
            self.0 |= write_pattern(channels);
        } else {
            self.0 &= !write_pattern(channels);
        }
    }

    /// True if no channel is in use or being written
    pub const fn is_idle(self) -> bool {
        self.0 == 0
    }
}
