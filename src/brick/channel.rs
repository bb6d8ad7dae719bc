use std::fmt;

use super::MAX_CHANNELS;

/// A set of brick channels, stored as a 4-bit mask (bit `c` = channel `c`)
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelSelection(u8);

impl ChannelSelection {
    /// All four channels
    pub const ALL: Self = Self(0b1111);

    /// The empty selection
    pub const NONE: Self = Self(0);

    /// Select a single channel. Channels outside 0..4 are ignored.
    pub const fn single(channel: usize) -> Self {
        if channel < MAX_CHANNELS {
            Self(1 << channel)
        } else {
            Self::NONE
        }
    }

    /// Build a selection from a list of channel indices
    pub fn from_channels(channels: &[usize]) -> Self {
        channels
            .iter()
            .fold(Self::NONE, |acc, &c| acc.union(Self::single(c)))
    }

    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    pub const fn contains(self, channel: usize) -> bool {
        channel < MAX_CHANNELS && self.0 & (1 << channel) != 0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub const fn is_all(self) -> bool {
        self.0 == Self::ALL.0
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Iterate over the selected channel indices in ascending order
    pub fn iter(self) -> impl Iterator<Item = usize> {
        (0..MAX_CHANNELS).filter(move |&c| self.contains(c))
    }
}

impl Default for ChannelSelection {
    fn default() -> Self {
        Self::ALL
    }
}

impl fmt::Debug for ChannelSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_all() {
            return write!(f, "ChannelSelection(ALL)");
        }
        f.debug_set().entries(self.iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_and_contains() {
        let sel = ChannelSelection::single(2);
        assert!(sel.contains(2));
        assert!(!sel.contains(0));
        assert_eq!(sel.iter().collect::<Vec<_>>(), vec![2]);
    }

    #[test]
    fn test_out_of_range_channel_ignored() {
        assert!(ChannelSelection::single(7).is_empty());
        assert!(!ChannelSelection::ALL.contains(4));
    }

    #[test]
    fn test_from_channels() {
        let sel = ChannelSelection::from_channels(&[0, 1, 2, 3]);
        assert!(sel.is_all());
        assert_eq!(sel, ChannelSelection::ALL);

        let sel = ChannelSelection::from_channels(&[3, 1]);
        assert_eq!(sel.iter().collect::<Vec<_>>(), vec![1, 3]);
    }

    #[test]
    fn test_default_is_all() {
        assert_eq!(ChannelSelection::default(), ChannelSelection::ALL);
    }
}
