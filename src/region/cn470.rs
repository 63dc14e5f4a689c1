use super::{
    channel::{ChannelDef, ChannelMask, ChannelTable},
    hopping_frequency, modulation_of, sf_bw_of, Bandwidth, Channel, ChannelMaskBlock,
    ChannelMaskStatus, ChannelSelection, Datarate, Modulation, Region, RegionError, RegionKind,
};
use crate::config::DevAddr;

/// Number of uplink channels
pub const NUMBER_OF_CHANNELS: usize = 96;

const UPLINK_BASE: u32 = 470_300_000;
const DOWNLINK_BASE: u32 = 500_300_000;
const CHANNEL_STEP: u32 = 200_000;
const DOWNLINK_CHANNELS: usize = 48;

const RX2_FREQUENCY: u32 = 505_300_000;
const RX2_DATARATE: u8 = 0;

const BEACON_BASE: u32 = 508_300_000;
const BEACON_STEP: u32 = 200_000;
const BEACON_CHANNELS: u32 = 8;
const BEACON_DATARATE: u8 = 2;
const BEACON_RFU_LEN: usize = 3;
const BEACON_SIZE: u8 = 19;

const DR_MAX: u8 = 5;
const MAX_TX_POWER_INDEX: u8 = 7;

/// ChMaskCntl value enabling every defined channel
const CNTL_ALL_ON: u8 = 6;

const DATARATES: [Option<Datarate>; 6] = [
    Some(Datarate::Lora { sf: 12, bw: Bandwidth::Khz125 }),
    Some(Datarate::Lora { sf: 11, bw: Bandwidth::Khz125 }),
    Some(Datarate::Lora { sf: 10, bw: Bandwidth::Khz125 }),
    Some(Datarate::Lora { sf: 9, bw: Bandwidth::Khz125 }),
    Some(Datarate::Lora { sf: 8, bw: Bandwidth::Khz125 }),
    Some(Datarate::Lora { sf: 7, bw: Bandwidth::Khz125 }),
];

const MAX_PAYLOAD: [u8; 6] = [59, 59, 59, 123, 250, 250];

/// CN470-510 plan of regional parameters 1.0: 96 uplink channels in six
/// groups of 16, 48 downlink channels, eight beacon channels.
#[derive(Debug, Clone)]
pub struct Cn470 {
    table: ChannelTable<NUMBER_OF_CHANNELS>,
}

impl Default for Cn470 {
    fn default() -> Self {
        let table = ChannelTable::new(|i| ChannelDef {
            tx_frequency: UPLINK_BASE + i as u32 * CHANNEL_STEP,
            rx1_frequency: DOWNLINK_BASE + (i % DOWNLINK_CHANNELS) as u32 * CHANNEL_STEP,
            dr_min: 0,
            dr_max: DR_MAX,
        });
        Self { table }
    }
}

impl Cn470 {
    /// Create the default CN470 plan, every channel enabled
    pub fn new() -> Self {
        Self::default()
    }

    fn stage(
        staged: &mut ChannelMask,
        block: &ChannelMaskBlock,
        valid: &ChannelMask,
    ) -> Result<bool, ChannelMaskStatus> {
        match block.selector {
            0..=5 => {
                staged.set_word(block.selector as usize, block.bits);
                Ok(false)
            }
            CNTL_ALL_ON => {
                *staged = *valid;
                Ok(true)
            }
            _ => Err(ChannelMaskStatus::InvalidSelector),
        }
    }

    fn check_datarate(datarate: u8) -> Result<(), RegionError> {
        if datarate > DR_MAX {
            return Err(RegionError::InvalidDatarate);
        }
        Ok(())
    }
}

impl Region for Cn470 {
    fn kind(&self) -> RegionKind {
        RegionKind::Cn470Rp1
    }

    fn config(&mut self) {
        self.table.reset();
    }

    fn chmask_count_in_cflist(&self) -> u8 {
        (NUMBER_OF_CHANNELS / 16) as u8
    }

    fn next_channel(&mut self, datarate: u8) -> Result<ChannelSelection, RegionError> {
        Self::check_datarate(datarate)?;
        self.table.select(datarate, false)
    }

    fn join_next_channel(&mut self, datarate: u8) -> Result<ChannelSelection, RegionError> {
        Self::check_datarate(datarate)?;
        self.table.select(datarate, true)
    }

    fn build_channel_mask_block(&mut self, blocks: &[ChannelMaskBlock]) -> ChannelMaskStatus {
        let status = self.table.apply_blocks(blocks, Self::stage);
        if !status.is_accepted() {
            warn!("cn470: channel mask rejected");
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
        Self::check_datarate(datarate)?;
        if offset > 5 {
            return Err(RegionError::InvalidDatarate);
        }
        Ok(datarate.saturating_sub(offset))
    }

    fn rx2_window(&self) -> (u32, u8) {
        (RX2_FREQUENCY, RX2_DATARATE)
    }

    fn max_payload_size(&self, datarate: u8) -> Result<u8, RegionError> {
        MAX_PAYLOAD
            .get(datarate as usize)
            .copied()
            .ok_or(RegionError::InvalidDatarate)
    }

    fn max_tx_power_index(&self) -> u8 {
        MAX_TX_POWER_INDEX
    }

    fn beacon_frequency(&self, gps_time_s: u32) -> u32 {
        hopping_frequency(BEACON_BASE, BEACON_STEP, BEACON_CHANNELS, gps_time_s, 0)
    }

    fn ping_slot_frequency(&self, gps_time_s: u32, dev_addr: DevAddr) -> u32 {
        hopping_frequency(BEACON_BASE, BEACON_STEP, BEACON_CHANNELS, gps_time_s, dev_addr.as_u32())
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_frequencies() {
        let region = Cn470::new();
        assert_eq!(region.tx_frequency_by_index(0), Ok(470_300_000));
        assert_eq!(region.tx_frequency_by_index(95), Ok(489_300_000));
        assert_eq!(region.rx1_frequency_by_index(0), Ok(500_300_000));
        assert_eq!(region.rx1_frequency_by_index(47), Ok(509_700_000));
        assert_eq!(region.rx1_frequency_by_index(48), Ok(500_300_000));
        assert_eq!(region.tx_frequency_by_index(96), Err(RegionError::InvalidChannel));
        assert_eq!(region.rx1_frequency_by_index(255), Err(RegionError::InvalidChannel));
    }

    #[test]
    fn test_group_mask_then_disable_all_rejected() {
        let mut region = Cn470::new();

        assert_eq!(region.build_channel_mask(1, 0x0000), ChannelMaskStatus::Accepted);
        for i in 0..96u8 {
            let enabled = region.channel(i).unwrap().enabled;
            assert_eq!(enabled, !(16..32).contains(&i), "channel {}", i);
        }

        // groups 2..5 still enabled, so clear them first
        for group in 2..6 {
            assert_eq!(region.build_channel_mask(group, 0x0000), ChannelMaskStatus::Accepted);
        }
        let before = *region.channel_mask();
        assert_eq!(region.build_channel_mask(0, 0x0000), ChannelMaskStatus::WouldDisableAll);
        assert_eq!(*region.channel_mask(), before);
        assert_eq!(before.word(0), 0xFFFF);
    }

    #[test]
    fn test_bulk_enable_and_rfu_selector() {
        let mut region = Cn470::new();
        assert_eq!(region.build_channel_mask(3, 0x00F0), ChannelMaskStatus::Accepted);
        assert_eq!(region.channel_mask().count(), 84);

        let before = *region.channel_mask();
        assert_eq!(region.build_channel_mask(7, 0xFFFF), ChannelMaskStatus::InvalidSelector);
        assert_eq!(*region.channel_mask(), before);

        assert_eq!(region.build_channel_mask(6, 0x0000), ChannelMaskStatus::AcceptedBulk);
        assert_eq!(region.channel_mask().count(), 96);
    }

    #[test]
    fn test_block_validated_at_end() {
        let mut region = Cn470::new();
        let blocks = [
            ChannelMaskBlock::new(0, 0x0000),
            ChannelMaskBlock::new(1, 0x0000),
            ChannelMaskBlock::new(2, 0x0000),
            ChannelMaskBlock::new(3, 0x0000),
            ChannelMaskBlock::new(4, 0x0000),
            ChannelMaskBlock::new(5, 0x0001),
        ];
        assert_eq!(region.build_channel_mask_block(&blocks), ChannelMaskStatus::Accepted);
        assert_eq!(region.channel_mask().count(), 1);
        assert!(region.channel(80).unwrap().enabled);

        let sel = region.next_channel(0).unwrap();
        assert_eq!(sel.index, 80);
        assert_eq!(sel.eligible_count, 1);
    }

    #[test]
    fn test_datarate_tables() {
        let mut region = Cn470::new();
        assert_eq!(region.datarate_to_sf_bw(0), Ok((12, Bandwidth::Khz125)));
        assert_eq!(region.datarate_to_sf_bw(5), Ok((7, Bandwidth::Khz125)));
        assert_eq!(region.datarate_to_sf_bw(6), Err(RegionError::InvalidDatarate));
        assert_eq!(region.datarate_to_modulation(3), Ok(Modulation::Lora));
        assert_eq!(region.datarate_to_modulation(15), Err(RegionError::InvalidDatarate));
        assert_eq!(region.next_channel(6), Err(RegionError::InvalidDatarate));
        assert_eq!(region.max_payload_size(3), Ok(123));
        assert_eq!(region.rx1_datarate(4, 2), Ok(2));
        assert_eq!(region.rx1_datarate(1, 3), Ok(0));
    }

    #[test]
    fn test_beacon_hopping() {
        let region = Cn470::new();
        assert_eq!(region.beacon_frequency(0), 508_300_000);
        assert_eq!(region.beacon_frequency(127), 508_300_000);
        assert_eq!(region.beacon_frequency(128), 508_500_000);
        assert_eq!(region.beacon_frequency(128 * 9), 508_500_000);
        assert_eq!(region.ping_slot_frequency(128, DevAddr(2)), 508_900_000);
        assert_eq!(region.ping_slot_frequency(0, DevAddr(7)), 509_700_000);
    }

    #[test]
    fn test_cf_list_updates_join_subset() {
        let mut region = Cn470::new();
        let mut cf_list = [0u8; 16];
        cf_list[2] = 0xFF; // channels 16..24
        cf_list[15] = 1;
        region.apply_cf_list(&cf_list).unwrap();
        assert_eq!(region.channel_mask().count(), 8);
        let join = region.join_next_channel(0).unwrap();
        assert_eq!(join.index, 16);
        assert_eq!(join.eligible_count, 8);

        region.config();
        assert_eq!(region.channel_mask().count(), 96);
        assert_eq!(region.join_next_channel(0).unwrap().eligible_count, 96);
    }
}
