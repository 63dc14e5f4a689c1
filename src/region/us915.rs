use super::{
    channel::{ChannelDef, ChannelMask, ChannelTable},
    hopping_frequency, modulation_of, sf_bw_of, Bandwidth, Channel, ChannelMaskBlock,
    ChannelMaskStatus, ChannelSelection, Datarate, Modulation, Region, RegionError, RegionKind,
};
use crate::config::DevAddr;

/// Number of uplink channels (64 + 8)
pub const NUMBER_OF_CHANNELS: usize = 72;

const NARROW_CHANNELS: usize = 64;
const NARROW_BASE: u32 = 902_300_000;
const NARROW_STEP: u32 = 200_000;
const WIDE_BASE: u32 = 903_000_000;
const WIDE_STEP: u32 = 1_600_000;

const DOWNLINK_BASE: u32 = 923_300_000;
const DOWNLINK_STEP: u32 = 600_000;
const DOWNLINK_CHANNELS: usize = 8;

const RX2_FREQUENCY: u32 = 923_300_000;
const RX2_DATARATE: u8 = 8;

const BEACON_CHANNELS: u32 = 8;
const BEACON_DATARATE: u8 = 8;
const BEACON_RFU_LEN: usize = 5;
const BEACON_SIZE: u8 = 23;

const UPLINK_DR_MAX: u8 = 6;
const MAX_TX_POWER_INDEX: u8 = 14;

/// ChMaskCntl directives
const CNTL_WIDE: u8 = 4;
const CNTL_BANKS: u8 = 5;
const CNTL_NARROW_ON: u8 = 6;
const CNTL_NARROW_OFF: u8 = 7;

const DATARATES: [Option<Datarate>; 14] = [
    Some(Datarate::Lora { sf: 10, bw: Bandwidth::Khz125 }),
    Some(Datarate::Lora { sf: 9, bw: Bandwidth::Khz125 }),
    Some(Datarate::Lora { sf: 8, bw: Bandwidth::Khz125 }),
    Some(Datarate::Lora { sf: 7, bw: Bandwidth::Khz125 }),
    Some(Datarate::Lora { sf: 8, bw: Bandwidth::Khz500 }),
    Some(Datarate::LrFhss),
    Some(Datarate::LrFhss),
    None,
    Some(Datarate::Lora { sf: 12, bw: Bandwidth::Khz500 }),
    Some(Datarate::Lora { sf: 11, bw: Bandwidth::Khz500 }),
    Some(Datarate::Lora { sf: 10, bw: Bandwidth::Khz500 }),
    Some(Datarate::Lora { sf: 9, bw: Bandwidth::Khz500 }),
    Some(Datarate::Lora { sf: 8, bw: Bandwidth::Khz500 }),
    Some(Datarate::Lora { sf: 7, bw: Bandwidth::Khz500 }),
];

const MAX_PAYLOAD: [Option<u8>; 14] = [
    Some(19),
    Some(61),
    Some(133),
    Some(250),
    Some(250),
    Some(58),
    Some(133),
    None,
    Some(61),
    Some(137),
    Some(250),
    Some(250),
    Some(250),
    Some(250),
];

/// US915 region configuration: 64 125 kHz channels, 8 500 kHz channels
#[derive(Debug, Clone)]
pub struct Us915 {
    table: ChannelTable<NUMBER_OF_CHANNELS>,
}

impl Default for Us915 {
    fn default() -> Self {
        let table = ChannelTable::new(|i| {
            let tx_frequency = if i < NARROW_CHANNELS {
                NARROW_BASE + i as u32 * NARROW_STEP
            } else {
                WIDE_BASE + (i - NARROW_CHANNELS) as u32 * WIDE_STEP
            };
            let (dr_min, dr_max) = if i < NARROW_CHANNELS { (0, 3) } else { (4, 4) };
            ChannelDef {
                tx_frequency,
                rx1_frequency: DOWNLINK_BASE + (i % DOWNLINK_CHANNELS) as u32 * DOWNLINK_STEP,
                dr_min,
                dr_max,
            }
        });
        Self { table }
    }
}

impl Us915 {
    /// Create a new US915 region configuration
    pub fn new() -> Self {
        Self::default()
    }

    fn stage(
        staged: &mut ChannelMask,
        block: &ChannelMaskBlock,
        _valid: &ChannelMask,
    ) -> Result<bool, ChannelMaskStatus> {
        // the 8 MSBs of ChMask are RFU whenever it addresses channels 64..71
        let wide_bits = block.bits & 0x00FF;
        match block.selector {
            0..=3 => {
                staged.set_word(block.selector as usize, block.bits);
                Ok(false)
            }
            CNTL_WIDE => {
                staged.set_word(4, wide_bits);
                Ok(false)
            }
            CNTL_BANKS => {
                for bank in 0..8 {
                    let on = block.bits & (1 << bank) != 0;
                    for channel in bank * 8..bank * 8 + 8 {
                        staged.set(channel, on);
                    }
                    staged.set(NARROW_CHANNELS + bank, on);
                }
                Ok(true)
            }
            CNTL_NARROW_ON | CNTL_NARROW_OFF => {
                let narrow = if block.selector == CNTL_NARROW_ON { 0xFFFF } else { 0x0000 };
                for group in 0..4 {
                    staged.set_word(group, narrow);
                }
                staged.set_word(4, wide_bits);
                Ok(true)
            }
            _ => Err(ChannelMaskStatus::InvalidSelector),
        }
    }

    fn check_uplink_datarate(datarate: u8) -> Result<(), RegionError> {
        if datarate > UPLINK_DR_MAX {
            return Err(RegionError::InvalidDatarate);
        }
        Ok(())
    }
}

impl Region for Us915 {
    fn kind(&self) -> RegionKind {
        RegionKind::Us915
    }

    fn config(&mut self) {
        self.table.reset();
    }

    fn chmask_count_in_cflist(&self) -> u8 {
        5
    }

    fn next_channel(&mut self, datarate: u8) -> Result<ChannelSelection, RegionError> {
        Self::check_uplink_datarate(datarate)?;
        self.table.select(datarate, false)
    }

    fn join_next_channel(&mut self, datarate: u8) -> Result<ChannelSelection, RegionError> {
        Self::check_uplink_datarate(datarate)?;
        self.table.select(datarate, true)
    }

    fn build_channel_mask_block(&mut self, blocks: &[ChannelMaskBlock]) -> ChannelMaskStatus {
        let status = self.table.apply_blocks(blocks, Self::stage);
        if !status.is_accepted() {
            warn!("us915: channel mask rejected");
        }
        status
    }

    fn apply_cf_list(&mut self, cf_list: &[u8; 16]) -> Result<(), RegionError> {
        let words = self.chmask_count_in_cflist() as usize;
        self.table.apply_cf_list(cf_list, words)
    }

    fn enable_all_channels_with_valid_freq(&mut self) {
        self.table.enable_all_valid();
    }

    fn datarate_to_modulation(&self, datarate: u8) -> Result<Modulation, RegionError> {
        modulation_of(&DATARATES, datarate)
    }

    fn datarate_to_sf_bw(&self, datarate: u8) -> Result<(u8, Bandwidth), RegionError> {
        sf_bw_of(&DATARATES, datarate)
    }

    fn tx_frequency_by_index(&self, index: u8) -> Result<u32, RegionError> {
        self.table.tx_frequency(index)
    }

    fn rx1_frequency_by_index(&self, index: u8) -> Result<u32, RegionError> {
        self.table.rx1_frequency(index)
    }

    fn channel(&self, index: u8) -> Result<Channel, RegionError> {
        self.table.channel(index)
    }

    fn channel_mask(&self) -> &ChannelMask {
        self.table.enabled_mask()
    }

    fn eligible_channel_count(&self, datarate: u8) -> u8 {
        self.table.eligible_count(self.table.enabled_mask(), datarate)
    }

    fn rx1_datarate(&self, datarate: u8, offset: u8) -> Result<u8, RegionError> {
        // RX1 only defined for the LoRa uplink datarates
        if datarate > 4 || offset > 3 {
            return Err(RegionError::InvalidDatarate);
        }
        let dr = (10 + datarate as i16 - offset as i16).clamp(8, 13);
        Ok(dr as u8)
    }

    fn rx2_window(&self) -> (u32, u8) {
        (RX2_FREQUENCY, RX2_DATARATE)
    }

    fn max_payload_size(&self, datarate: u8) -> Result<u8, RegionError> {
        MAX_PAYLOAD
            .get(datarate as usize)
            .copied()
            .flatten()
            .ok_or(RegionError::InvalidDatarate)
    }

    fn max_tx_power_index(&self) -> u8 {
        MAX_TX_POWER_INDEX
    }

    fn beacon_frequency(&self, gps_time_s: u32) -> u32 {
        hopping_frequency(DOWNLINK_BASE, DOWNLINK_STEP, BEACON_CHANNELS, gps_time_s, 0)
    }

    fn ping_slot_frequency(&self, gps_time_s: u32, dev_addr: DevAddr) -> u32 {
        hopping_frequency(
            DOWNLINK_BASE,
            DOWNLINK_STEP,
            BEACON_CHANNELS,
            gps_time_s,
            dev_addr.as_u32(),
        )
    }

    fn beacon_datarate(&self) -> u8 {
        BEACON_DATARATE
    }

    fn beacon_rfu_len(&self) -> usize {
        BEACON_RFU_LEN
    }

    fn beacon_size(&self) -> u8 {
        BEACON_SIZE
    }
}
