//! Regional channel plans
//!
//! This module holds everything that depends on the regional parameters:
//! - Channel tables and channel selection
//! - Channel mask decoding (LinkADRReq ChMaskCntl/ChMask, CFList)
//! - Datarate to modulation mapping
//! - Class B beacon and ping slot frequency hopping
//!
//! Each region is a concrete type implementing [`Region`]; a stack holds a
//! [`RegionPlan`], the tagged union of all supported regions.

/// Channel table and bitmaps
pub mod channel;

/// CN470 (RP 1.0) 96 channel plan
pub mod cn470;

/// US915 hybrid plan
pub mod us915;

pub use channel::{Channel, ChannelMask, ChannelTable};
pub use cn470::Cn470;
pub use us915::Us915;

use crate::config::DevAddr;

/// Class B beacon period in seconds
pub const BEACON_PERIOD_S: u32 = 128;

/// Supported regional plans
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RegionKind {
    /// CN470-510, regional parameters 1.0
    Cn470Rp1,
    /// US902-928
    Us915,
}

/// Region layer error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RegionError {
    /// Datarate not defined by the region
    InvalidDatarate,
    /// Datarate defined but not a LoRa datarate
    NotLora,
    /// Channel index outside the channel table
    InvalidChannel,
    /// No enabled channel accepts the requested datarate
    NoEligibleChannel,
    /// CFList type unsupported or it would disable every channel
    InvalidCfList,
}

/// Modulation family of a datarate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Modulation {
    /// LoRa chirp spread spectrum
    Lora,
    /// LR-FHSS
    LrFhss,
    /// GFSK
    Fsk,
}

/// LoRa bandwidth
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Bandwidth {
    /// 125 kHz
    Khz125,
    /// 250 kHz
    Khz250,
    /// 500 kHz
    Khz500,
}

impl Bandwidth {
    /// Bandwidth in Hz
    pub fn hz(&self) -> u32 {
        match self {
            Bandwidth::Khz125 => 125_000,
            Bandwidth::Khz250 => 250_000,
            Bandwidth::Khz500 => 500_000,
        }
    }
}

/// Physical parameters of a datarate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Datarate {
    Lora { sf: u8, bw: Bandwidth },
    LrFhss,
}

impl Datarate {
    fn modulation(&self) -> Modulation {
        match self {
            Datarate::Lora { .. } => Modulation::Lora,
            Datarate::LrFhss => Modulation::LrFhss,
        }
    }
}

pub(crate) fn lookup_datarate(
    table: &[Option<Datarate>],
    datarate: u8,
) -> Result<Datarate, RegionError> {
    table
        .get(datarate as usize)
        .copied()
        .flatten()
        .ok_or(RegionError::InvalidDatarate)
}

pub(crate) fn modulation_of(
    table: &[Option<Datarate>],
    datarate: u8,
) -> Result<Modulation, RegionError> {
    lookup_datarate(table, datarate).map(|dr| dr.modulation())
}

pub(crate) fn sf_bw_of(
    table: &[Option<Datarate>],
    datarate: u8,
) -> Result<(u8, Bandwidth), RegionError> {
    match lookup_datarate(table, datarate)? {
        Datarate::Lora { sf, bw } => Ok((sf, bw)),
        _ => Err(RegionError::NotLora),
    }
}

/// Class B hopping: channel `(salt + gps_time_s / 128) mod count` above `base`
pub(crate) fn hopping_frequency(
    base: u32,
    step: u32,
    count: u32,
    gps_time_s: u32,
    salt: u32,
) -> u32 {
    let channel = salt.wrapping_add(gps_time_s / BEACON_PERIOD_S) % count;
    base + channel * step
}

/// Result of a channel selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ChannelSelection {
    /// Selected channel index
    pub index: u8,
    /// Uplink frequency in Hz
    pub tx_frequency: u32,
    /// RX1 frequency in Hz
    pub rx1_frequency: u32,
    /// Number of channels that were eligible
    pub eligible_count: u8,
}

/// One ChMaskCntl/ChMask pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ChannelMaskBlock {
    /// ChMaskCntl: group index or bulk directive
    pub selector: u8,
    /// ChMask bits
    pub bits: u16,
}

impl ChannelMaskBlock {
    /// Create a channel mask block
    pub fn new(selector: u8, bits: u16) -> Self {
        Self { selector, bits }
    }
}

/// Outcome of a channel mask application
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ChannelMaskStatus {
    /// Group bits applied
    Accepted,
    /// Applied, at least one block was a bulk directive
    AcceptedBulk,
    /// Rejected, no channel would remain enabled
    WouldDisableAll,
    /// Rejected, selector is RFU for this region
    InvalidSelector,
    /// Rejected, a bit enables a channel without a frequency
    UndefinedChannel,
}

impl ChannelMaskStatus {
    /// Whether the mask was applied
    pub fn is_accepted(&self) -> bool {
        matches!(self, ChannelMaskStatus::Accepted | ChannelMaskStatus::AcceptedBulk)
    }
}

/// Regional channel plan algorithms
pub trait Region {
    /// Region identifier
    fn kind(&self) -> RegionKind;

    /// Restore the default channel plan and forget the selection cursor
    fn config(&mut self);

    /// Number of ChMask words carried by a CFList
    fn chmask_count_in_cflist(&self) -> u8;

    /// Next uplink channel usable at `datarate`
    fn next_channel(&mut self, datarate: u8) -> Result<ChannelSelection, RegionError>;

    /// Next join-request channel usable at `datarate`
    fn join_next_channel(&mut self, datarate: u8) -> Result<ChannelSelection, RegionError>;

    /// Apply one ChMaskCntl/ChMask pair; rejected masks leave the table unchanged
    fn build_channel_mask(&mut self, selector: u8, bits: u16) -> ChannelMaskStatus {
        self.build_channel_mask_block(&[ChannelMaskBlock::new(selector, bits)])
    }

    /// Apply consecutive ChMask blocks atomically, validating only the final mask
    fn build_channel_mask_block(&mut self, blocks: &[ChannelMaskBlock]) -> ChannelMaskStatus;

    /// Apply a ChMask-type CFList received in a join accept
    fn apply_cf_list(&mut self, cf_list: &[u8; 16]) -> Result<(), RegionError>;

    /// Enable every channel that has a non-zero frequency
    fn enable_all_channels_with_valid_freq(&mut self);

    /// Modulation of `datarate`
    fn datarate_to_modulation(&self, datarate: u8) -> Result<Modulation, RegionError>;

    /// Spreading factor and bandwidth of a LoRa `datarate`
    fn datarate_to_sf_bw(&self, datarate: u8) -> Result<(u8, Bandwidth), RegionError>;

    /// Uplink frequency of channel `index`
    fn tx_frequency_by_index(&self, index: u8) -> Result<u32, RegionError>;

    /// RX1 frequency of channel `index`
    fn rx1_frequency_by_index(&self, index: u8) -> Result<u32, RegionError>;

    /// Snapshot of channel `index`
    fn channel(&self, index: u8) -> Result<Channel, RegionError>;

    /// Current uplink enable bitmap
    fn channel_mask(&self) -> &ChannelMask;

    /// Number of enabled channels accepting `datarate`
    fn eligible_channel_count(&self, datarate: u8) -> u8;

    /// RX1 datarate for an uplink at `datarate` with RX1DROffset `offset`
    fn rx1_datarate(&self, datarate: u8, offset: u8) -> Result<u8, RegionError>;

    /// Default RX2 frequency and datarate
    fn rx2_window(&self) -> (u32, u8);

    /// Maximum MAC payload size at `datarate`
    fn max_payload_size(&self, datarate: u8) -> Result<u8, RegionError>;

    /// Largest TXPower index accepted in LinkADRReq
    fn max_tx_power_index(&self) -> u8;

    /// Beacon frequency for the beacon period containing `gps_time_s`
    fn beacon_frequency(&self, gps_time_s: u32) -> u32;

    /// Ping slot frequency for `dev_addr` in the beacon period containing `gps_time_s`
    fn ping_slot_frequency(&self, gps_time_s: u32, dev_addr: DevAddr) -> u32;

    /// Beacon datarate
    fn beacon_datarate(&self) -> u8;

    /// Number of RFU bytes preceding the Time field in the beacon payload
    fn beacon_rfu_len(&self) -> usize;

    /// Beacon payload length, received with an implicit header
    fn beacon_size(&self) -> u8;
}

/// Regional plan of a stack instance
#[derive(Debug, Clone)]
pub enum RegionPlan {
    /// CN470 RP 1.0
    Cn470(Cn470),
    /// US915
    Us915(Us915),
}

impl RegionPlan {
    /// Create the default plan of `kind`
    pub fn new(kind: RegionKind) -> Self {
        match kind {
            RegionKind::Cn470Rp1 => RegionPlan::Cn470(Cn470::new()),
            RegionKind::Us915 => RegionPlan::Us915(Us915::new()),
        }
    }
}

macro_rules! dispatch {
    ($self:ident, $region:ident => $call:expr) => {
        match $self {
            RegionPlan::Cn470($region) => $call,
            RegionPlan::Us915($region) => $call,
        }
    };
}

impl Region for RegionPlan {
    fn kind(&self) -> RegionKind {
        dispatch!(self, r => r.kind())
    }

    fn config(&mut self) {
        dispatch!(self, r => r.config())
    }

    fn chmask_count_in_cflist(&self) -> u8 {
        dispatch!(self, r => r.chmask_count_in_cflist())
    }

    fn next_channel(&mut self, datarate: u8) -> Result<ChannelSelection, RegionError> {
        dispatch!(self, r => r.next_channel(datarate))
    }

    fn join_next_channel(&mut self, datarate: u8) -> Result<ChannelSelection, RegionError> {
        dispatch!(self, r => r.join_next_channel(datarate))
    }

    fn build_channel_mask_block(&mut self, blocks: &[ChannelMaskBlock]) -> ChannelMaskStatus {
        dispatch!(self, r => r.build_channel_mask_block(blocks))
    }

    fn apply_cf_list(&mut self, cf_list: &[u8; 16]) -> Result<(), RegionError> {
        dispatch!(self, r => r.apply_cf_list(cf_list))
    }

    fn enable_all_channels_with_valid_freq(&mut self) {
        dispatch!(self, r => r.enable_all_channels_with_valid_freq())
    }

    fn datarate_to_modulation(&self, datarate: u8) -> Result<Modulation, RegionError> {
        dispatch!(self, r => r.datarate_to_modulation(datarate))
    }

    fn datarate_to_sf_bw(&self, datarate: u8) -> Result<(u8, Bandwidth), RegionError> {
        dispatch!(self, r => r.datarate_to_sf_bw(datarate))
    }

    fn tx_frequency_by_index(&self, index: u8) -> Result<u32, RegionError> {
        dispatch!(self, r => r.tx_frequency_by_index(index))
    }

    fn rx1_frequency_by_index(&self, index: u8) -> Result<u32, RegionError> {
        dispatch!(self, r => r.rx1_frequency_by_index(index))
    }

    fn channel(&self, index: u8) -> Result<Channel, RegionError> {
        dispatch!(self, r => r.channel(index))
    }

    fn channel_mask(&self) -> &ChannelMask {
        dispatch!(self, r => r.channel_mask())
    }

    fn eligible_channel_count(&self, datarate: u8) -> u8 {
        dispatch!(self, r => r.eligible_channel_count(datarate))
    }

    fn rx1_datarate(&self, datarate: u8, offset: u8) -> Result<u8, RegionError> {
        dispatch!(self, r => r.rx1_datarate(datarate, offset))
    }

    fn rx2_window(&self) -> (u32, u8) {
        dispatch!(self, r => r.rx2_window())
    }

    fn max_payload_size(&self, datarate: u8) -> Result<u8, RegionError> {
        dispatch!(self, r => r.max_payload_size(datarate))
    }

    fn max_tx_power_index(&self) -> u8 {
        dispatch!(self, r => r.max_tx_power_index())
    }

    fn beacon_frequency(&self, gps_time_s: u32) -> u32 {
        dispatch!(self, r => r.beacon_frequency(gps_time_s))
    }

    fn ping_slot_frequency(&self, gps_time_s: u32, dev_addr: DevAddr) -> u32 {
        dispatch!(self, r => r.ping_slot_frequency(gps_time_s, dev_addr))
    }

    fn beacon_datarate(&self) -> u8 {
        dispatch!(self, r => r.beacon_datarate())
    }

    fn beacon_rfu_len(&self) -> usize {
        dispatch!(self, r => r.beacon_rfu_len())
    }

    fn beacon_size(&self) -> u8 {
        dispatch!(self, r => r.beacon_size())
    }
}
