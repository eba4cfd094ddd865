//! Channel enable masks.

/// One bit per channel position of a device.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelsMask {
    words: Vec<u32>,
    len: usize,
}

impl ChannelsMask {
    /// Create a cleared mask for `len` channels.
    pub fn new(len: usize) -> Self {
        Self {
            words: vec![0; len.div_ceil(32)],
            len,
        }
    }

    /// Number of channel positions covered.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the mask covers no channels.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Set the bit for a channel position. Out-of-range positions are ignored.
    pub fn enable(&mut self, pos: usize) {
        if pos < self.len {
            self.words[pos / 32] |= 1u32 << (pos % 32);
        }
    }

    /// Clear the bit for a channel position.
    pub fn disable(&mut self, pos: usize) {
        if pos < self.len {
            self.words[pos / 32] &= !(1u32 << (pos % 32));
        }
    }

    /// Set or clear a bit.
    pub fn set(&mut self, pos: usize, enabled: bool) {
        if enabled {
            self.enable(pos);
        } else {
            self.disable(pos);
        }
    }

    /// Whether a channel position is enabled.
    pub fn is_enabled(&self, pos: usize) -> bool {
        pos < self.len && self.words[pos / 32] & (1u32 << (pos % 32)) != 0
    }

    /// Positions of enabled channels, ascending.
    pub fn enabled(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.len).filter(move |&pos| self.is_enabled(pos))
    }

    /// Number of enabled channels.
    pub fn count(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }
}
