//! Channel table shared by all regional plans
//!
//! A table owns the static definition of every channel of a region (frequency
//! pair and datarate range) plus two enable bitmaps: the uplink mask driven by
//! LinkADRReq/CFList and the join subset. Selection walks a cursor over the
//! eligible set so consecutive picks never repeat while an alternative exists.

use super::{ChannelMaskBlock, ChannelMaskStatus, ChannelSelection, RegionError};

/// Number of 16-bit words in a channel bitmap (96 channels)
pub const MASK_WORDS: usize = 6;

/// Channel enable bitmap, one bit per channel index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ChannelMask {
    words: [u16; MASK_WORDS],
}

impl ChannelMask {
    /// Bitmap with every channel disabled
    pub const fn empty() -> Self {
        Self {
            words: [0; MASK_WORDS],
        }
    }

    /// Whether channel `index` is set
    pub fn is_set(&self, index: usize) -> bool {
        index < MASK_WORDS * 16 && self.words[index / 16] & (1 << (index % 16)) != 0
    }

    /// Set or clear channel `index`; indices beyond the bitmap are ignored
    pub fn set(&mut self, index: usize, enabled: bool) {
        if index >= MASK_WORDS * 16 {
            return;
        }
        let bit = 1 << (index % 16);
        if enabled {
            self.words[index / 16] |= bit;
        } else {
            self.words[index / 16] &= !bit;
        }
    }

    /// 16-channel group `group`
    pub fn word(&self, group: usize) -> u16 {
        self.words.get(group).copied().unwrap_or(0)
    }

    /// Overwrite 16-channel group `group`
    pub fn set_word(&mut self, group: usize, bits: u16) {
        if let Some(word) = self.words.get_mut(group) {
            *word = bits;
        }
    }

    /// Number of channels set
    pub fn count(&self) -> u32 {
        self.words.iter().map(|w| w.count_ones()).sum()
    }

    /// True when no channel is set
    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|&w| w == 0)
    }

    /// Channels set in both bitmaps
    pub fn and(&self, other: &ChannelMask) -> ChannelMask {
        let mut out = *self;
        for (w, o) in out.words.iter_mut().zip(other.words.iter()) {
            *w &= *o;
        }
        out
    }

    /// Channels set here but not in `other`
    pub fn and_not(&self, other: &ChannelMask) -> ChannelMask {
        let mut out = *self;
        for (w, o) in out.words.iter_mut().zip(other.words.iter()) {
            *w &= !*o;
        }
        out
    }
}

/// Static definition of a channel
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct ChannelDef {
    pub tx_frequency: u32,
    pub rx1_frequency: u32,
    pub dr_min: u8,
    pub dr_max: u8,
}

impl ChannelDef {
    const UNDEFINED: ChannelDef = ChannelDef {
        tx_frequency: 0,
        rx1_frequency: 0,
        dr_min: 0,
        dr_max: 0,
    };
}

/// Snapshot of one channel of a regional plan
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Channel {
    /// Channel index in the plan
    pub index: u8,
    /// Uplink frequency in Hz, 0 when the channel is undefined
    pub tx_frequency: u32,
    /// RX1 downlink frequency in Hz
    pub rx1_frequency: u32,
    /// Lowest datarate allowed on the channel
    pub dr_min: u8,
    /// Highest datarate allowed on the channel
    pub dr_max: u8,
    /// Whether the channel is enabled for uplinks
    pub enabled: bool,
}

/// Channel table of one region
#[derive(Debug, Clone)]
pub struct ChannelTable<const N: usize> {
    defs: [ChannelDef; N],
    enabled: ChannelMask,
    join: ChannelMask,
    last_channel: Option<u8>,
}

impl<const N: usize> ChannelTable<N> {
    /// Build a table whose channel `i` is defined by `define(i)`; every
    /// channel with a frequency starts enabled.
    pub(crate) fn new(define: impl Fn(usize) -> ChannelDef) -> Self {
        let mut defs = [ChannelDef::UNDEFINED; N];
        for (i, def) in defs.iter_mut().enumerate() {
            *def = define(i);
        }
        let mut table = Self {
            defs,
            enabled: ChannelMask::empty(),
            join: ChannelMask::empty(),
            last_channel: None,
        };
        table.reset();
        table
    }

    /// Restore the default enable state and forget the selection cursor
    pub(crate) fn reset(&mut self) {
        let valid = self.valid_mask();
        self.enabled = valid;
        self.join = valid;
        self.last_channel = None;
    }

    /// Bitmap of channels that have a non-zero frequency
    pub fn valid_mask(&self) -> ChannelMask {
        let mut mask = ChannelMask::empty();
        for (i, def) in self.defs.iter().enumerate() {
            mask.set(i, def.tx_frequency != 0);
        }
        mask
    }

    /// Uplink enable bitmap
    pub fn enabled_mask(&self) -> &ChannelMask {
        &self.enabled
    }

    /// Join subset bitmap
    pub fn join_mask(&self) -> &ChannelMask {
        &self.join
    }

    /// Enable every channel that has a valid frequency
    pub(crate) fn enable_all_valid(&mut self) {
        self.enabled = self.valid_mask();
    }

    fn def(&self, index: u8) -> Result<&ChannelDef, RegionError> {
        self.defs
            .get(index as usize)
            .ok_or(RegionError::InvalidChannel)
    }

    /// Snapshot of channel `index`
    pub fn channel(&self, index: u8) -> Result<Channel, RegionError> {
        let def = self.def(index)?;
        Ok(Channel {
            index,
            tx_frequency: def.tx_frequency,
            rx1_frequency: def.rx1_frequency,
            dr_min: def.dr_min,
            dr_max: def.dr_max,
            enabled: def.tx_frequency != 0 && self.enabled.is_set(index as usize),
        })
    }

    /// Uplink frequency of channel `index`
    pub fn tx_frequency(&self, index: u8) -> Result<u32, RegionError> {
        self.def(index).map(|d| d.tx_frequency)
    }

    /// RX1 frequency of channel `index`
    pub fn rx1_frequency(&self, index: u8) -> Result<u32, RegionError> {
        self.def(index).map(|d| d.rx1_frequency)
    }

    fn is_eligible(&self, mask: &ChannelMask, index: usize, datarate: u8) -> bool {
        let def = &self.defs[index];
        def.tx_frequency != 0
            && mask.is_set(index)
            && datarate >= def.dr_min
            && datarate <= def.dr_max
    }

    /// Number of channels of `mask` usable at `datarate`
    pub fn eligible_count(&self, mask: &ChannelMask, datarate: u8) -> u8 {
        (0..N)
            .filter(|&i| self.is_eligible(mask, i, datarate))
            .count() as u8
    }

    /// Pick the next eligible channel after the cursor, from the uplink mask or
    /// from the join subset.
    pub(crate) fn select(
        &mut self,
        datarate: u8,
        join: bool,
    ) -> Result<ChannelSelection, RegionError> {
        let mask = if join { self.join } else { self.enabled };
        let eligible_count = self.eligible_count(&mask, datarate);
        if eligible_count == 0 {
            return Err(RegionError::NoEligibleChannel);
        }

        let start = self.last_channel.map(|c| c as usize + 1).unwrap_or(0);
        let index = (0..N)
            .map(|offset| (start + offset) % N)
            .find(|&i| self.is_eligible(&mask, i, datarate))
            .ok_or(RegionError::NoEligibleChannel)?;

        self.last_channel = Some(index as u8);
        let def = &self.defs[index];
        Ok(ChannelSelection {
            index: index as u8,
            tx_frequency: def.tx_frequency,
            rx1_frequency: def.rx1_frequency,
            eligible_count,
        })
    }

    /// Stage `blocks` on a copy of the uplink mask with the region's decoding
    /// rule and commit only if the result is legal.
    pub(crate) fn apply_blocks(
        &mut self,
        blocks: &[ChannelMaskBlock],
        stage: impl Fn(
            &mut ChannelMask,
            &ChannelMaskBlock,
            &ChannelMask,
        ) -> Result<bool, ChannelMaskStatus>,
    ) -> ChannelMaskStatus {
        let valid = self.valid_mask();
        let mut staged = self.enabled;
        let mut bulk = false;
        for block in blocks {
            match stage(&mut staged, block, &valid) {
                Ok(is_bulk) => bulk |= is_bulk,
                Err(status) => return status,
            }
        }
        let status = self.check(&staged, &valid);
        if status != ChannelMaskStatus::Accepted {
            return status;
        }
        self.enabled = staged;
        if bulk {
            ChannelMaskStatus::AcceptedBulk
        } else {
            ChannelMaskStatus::Accepted
        }
    }

    /// Legality of a staged bitmap against the defined channels
    pub(crate) fn check(&self, staged: &ChannelMask, valid: &ChannelMask) -> ChannelMaskStatus {
        if !staged.and_not(valid).is_empty() {
            ChannelMaskStatus::UndefinedChannel
        } else if staged.is_empty() {
            ChannelMaskStatus::WouldDisableAll
        } else {
            ChannelMaskStatus::Accepted
        }
    }

    /// Load `words.len()` ChMask words from a CFList into both the uplink mask
    /// and the join subset.
    pub(crate) fn apply_cf_list(
        &mut self,
        cf_list: &[u8; 16],
        words: usize,
    ) -> Result<(), RegionError> {
        // last byte is CFListType, 1 = channel mask list
        if cf_list[15] != 1 {
            return Err(RegionError::InvalidCfList);
        }
        let mut staged = ChannelMask::empty();
        for (group, pair) in cf_list[..words * 2].chunks_exact(2).enumerate() {
            staged.set_word(group, u16::from_le_bytes([pair[0], pair[1]]));
        }
        let valid = self.valid_mask();
        // bits past the defined channels of the last word are RFU
        let staged = staged.and(&valid);
        if staged.is_empty() {
            return Err(RegionError::InvalidCfList);
        }
        self.enabled = staged;
        self.join = staged;
        Ok(())
    }
}
