use crate::EngineError;

/// Number of stem channels the ensemble is built from.
pub const CHANNEL_COUNT: usize = 5;

/// Index of a stem channel, `0..CHANNEL_COUNT`.
///
/// Channel 0 is the reference channel: its playing flag and position speak
/// for the whole ensemble.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChannelIndex(u8);

impl ChannelIndex {
    pub const REFERENCE: ChannelIndex = ChannelIndex(0);

    pub fn new(index: usize) -> Result<Self, EngineError> {
        if index < CHANNEL_COUNT {
            Ok(Self(index as u8))
        } else {
            Err(EngineError::ChannelOutOfRange(index))
        }
    }

    #[inline]
    pub fn get(self) -> usize {
        self.0 as usize
    }

    #[inline]
    pub fn is_reference(self) -> bool {
        self == Self::REFERENCE
    }

    /// Every channel, in index order.
    pub fn all() -> impl Iterator<Item = ChannelIndex> {
        (0..CHANNEL_COUNT as u8).map(ChannelIndex)
    }
}

impl std::fmt::Display for ChannelIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_covers_every_index_once() {
        let indices: Vec<usize> = ChannelIndex::all().map(ChannelIndex::get).collect();
        assert_eq!(indices, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_out_of_range_index_rejected() {
        assert!(matches!(
            ChannelIndex::new(5),
            Err(EngineError::ChannelOutOfRange(5))
        ));
    }

    #[test]
    fn test_reference_is_channel_zero() {
        assert!(ChannelIndex::new(0).unwrap().is_reference());
        assert!(!ChannelIndex::new(3).unwrap().is_reference());
    }
}
