use lorawan_modem::{
    config::DevAddr,
    mac::{apply_link_adr_block, LinkAdrReq},
    region::{
        ChannelMaskBlock, ChannelMaskStatus, Modulation, Region, RegionError, RegionKind,
        RegionPlan, BEACON_PERIOD_S,
    },
};

/// Small deterministic generator for mask patterns
struct Lcg(u32);

impl Lcg {
    fn next(&mut self) -> u32 {
        self.0 = self.0.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
        self.0
    }
}

#[test]
fn test_cn470_group_mask_scenario() {
    let mut region = RegionPlan::new(RegionKind::Cn470Rp1);
    assert_eq!(region.build_channel_mask(1, 0x0000), ChannelMaskStatus::Accepted);
    let after_first = *region.channel_mask();

    assert_eq!(region.build_channel_mask(0, 0x0000), ChannelMaskStatus::Accepted);
    // Groups 2..5 are still enabled, so clearing group 0 is legal
    assert_eq!(region.channel_mask().count(), 64);

    let mut region = RegionPlan::new(RegionKind::Cn470Rp1);
    region.build_channel_mask(1, 0x0000);
    for group in 2..6 {
        assert!(region.build_channel_mask(group, 0x0000).is_accepted());
    }
    assert_eq!(region.build_channel_mask(0, 0x0000), ChannelMaskStatus::WouldDisableAll);
    for index in 0..96u8 {
        assert_eq!(region.channel(index).unwrap().enabled, index < 16, "channel {}", index);
    }

    let mut region = RegionPlan::new(RegionKind::Cn470Rp1);
    region.build_channel_mask(1, 0x0000);
    assert_eq!(*region.channel_mask(), after_first);
    for index in 0..96u8 {
        let expected = !(16..32).contains(&index);
        assert_eq!(region.channel(index).unwrap().enabled, expected, "channel {}", index);
    }
}

#[test]
fn test_rejected_block_leaves_mask_untouched() {
    let mut region = RegionPlan::new(RegionKind::Cn470Rp1);
    region.build_channel_mask(3, 0x00F0);
    let before = *region.channel_mask();
    let blocks = [
        ChannelMaskBlock::new(0, 0),
        ChannelMaskBlock::new(1, 0),
        ChannelMaskBlock::new(2, 0),
        ChannelMaskBlock::new(3, 0),
        ChannelMaskBlock::new(4, 0),
        ChannelMaskBlock::new(5, 0),
    ];
    assert_eq!(region.build_channel_mask_block(&blocks), ChannelMaskStatus::WouldDisableAll);
    assert_eq!(*region.channel_mask(), before);
    assert_eq!(region.build_channel_mask(7, 0xFFFF), ChannelMaskStatus::InvalidSelector);
    assert_eq!(*region.channel_mask(), before);
}

#[test]
fn test_consecutive_selections_differ() {
    let mut rng = Lcg(7);
    for kind in [RegionKind::Cn470Rp1, RegionKind::Us915] {
        let mut region = RegionPlan::new(kind);
        for _ in 0..50 {
            let group = (rng.next() % 4) as u8;
            region.build_channel_mask(group, rng.next() as u16);
            let datarate = (rng.next() % 4) as u8;
            let eligible = region.eligible_channel_count(datarate);
            let mut previous = None;
            for _ in 0..10 {
                match region.next_channel(datarate) {
                    Ok(selection) => {
                        assert_eq!(selection.eligible_count, eligible);
                        let index = selection.index;
                        assert_eq!(region.tx_frequency_by_index(index), Ok(selection.tx_frequency));
                        let rx1 = region.rx1_frequency_by_index(index);
                        assert_eq!(rx1, Ok(selection.rx1_frequency));
                        if eligible > 1 {
                            assert_ne!(previous, Some(selection.index));
                        }
                        previous = Some(selection.index);
                    }
                    Err(err) => {
                        assert_eq!(err, RegionError::NoEligibleChannel);
                        assert_eq!(eligible, 0);
                    }
                }
            }
        }
    }
}

#[test]
fn test_single_eligible_channel_repeats() {
    let mut region = RegionPlan::new(RegionKind::Cn470Rp1);
    let blocks = [
        ChannelMaskBlock::new(0, 0),
        ChannelMaskBlock::new(1, 0),
        ChannelMaskBlock::new(2, 0),
        ChannelMaskBlock::new(3, 0),
        ChannelMaskBlock::new(4, 0),
        ChannelMaskBlock::new(5, 0x8000),
    ];
    assert!(region.build_channel_mask_block(&blocks).is_accepted());
    for _ in 0..3 {
        let selection = region.next_channel(3).unwrap();
        assert_eq!(selection.index, 95);
        assert_eq!(selection.tx_frequency, 470_300_000 + 95 * 200_000);
        assert_eq!(selection.rx1_frequency, 500_300_000 + 47 * 200_000);
        assert_eq!(selection.eligible_count, 1);
    }
}

#[test]
fn test_join_subset_follows_cf_list() {
    let mut region = RegionPlan::new(RegionKind::Cn470Rp1);
    // Uplink mask changes do not touch the join subset
    region.build_channel_mask(0, 0x0001);
    assert_eq!(region.join_next_channel(0).unwrap().index, 0);
    assert_eq!(region.join_next_channel(0).unwrap().index, 1);

    let mut cf_list = [0u8; 16];
    cf_list[2] = 0x03; // channels 16 and 17
    cf_list[15] = 1;
    region.apply_cf_list(&cf_list).unwrap();
    let first = region.join_next_channel(0).unwrap();
    let second = region.join_next_channel(0).unwrap();
    assert_eq!((first.index, second.index), (16, 17));
    assert_eq!(first.eligible_count, 2);
    assert_eq!(region.channel_mask().count(), 2);

    cf_list[15] = 0;
    assert_eq!(region.apply_cf_list(&cf_list), Err(RegionError::InvalidCfList));
    let mut empty_mask = [0u8; 16];
    empty_mask[15] = 1;
    assert_eq!(region.apply_cf_list(&empty_mask), Err(RegionError::InvalidCfList));
    assert_eq!(region.channel_mask().count(), 2);

    region.config();
    assert_eq!(region.channel_mask().count(), 96);
    assert_eq!(region.join_next_channel(0).unwrap().index, 0);
}

#[test]
fn test_frequency_by_index_bounds() {
    let cn = RegionPlan::new(RegionKind::Cn470Rp1);
    assert_eq!(cn.tx_frequency_by_index(95), Ok(489_300_000));
    assert_eq!(cn.rx1_frequency_by_index(48), Ok(500_300_000));
    assert_eq!(cn.tx_frequency_by_index(96), Err(RegionError::InvalidChannel));
    assert_eq!(cn.rx1_frequency_by_index(255), Err(RegionError::InvalidChannel));

    let us = RegionPlan::new(RegionKind::Us915);
    assert_eq!(us.tx_frequency_by_index(64), Ok(903_000_000));
    assert_eq!(us.tx_frequency_by_index(72), Err(RegionError::InvalidChannel));
}

#[test]
fn test_datarate_lookups() {
    let cn = RegionPlan::new(RegionKind::Cn470Rp1);
    assert_eq!(cn.datarate_to_modulation(0), Ok(Modulation::Lora));
    assert_eq!(cn.datarate_to_sf_bw(5).map(|(sf, _)| sf), Ok(7));
    assert_eq!(cn.datarate_to_sf_bw(6), Err(RegionError::InvalidDatarate));
    assert_eq!(cn.datarate_to_sf_bw(255), Err(RegionError::InvalidDatarate));
    assert_eq!(cn.rx2_window(), (505_300_000, 0));
    assert_eq!(cn.max_payload_size(3), Ok(123));

    let us = RegionPlan::new(RegionKind::Us915);
    assert_eq!(us.datarate_to_modulation(5), Ok(Modulation::LrFhss));
    assert_eq!(us.datarate_to_sf_bw(5), Err(RegionError::NotLora));
    assert_eq!(us.datarate_to_sf_bw(7), Err(RegionError::InvalidDatarate));
    assert_eq!(us.datarate_to_sf_bw(14), Err(RegionError::InvalidDatarate));
}

#[test]
fn test_hopping_is_pure_and_periodic() {
    for kind in [RegionKind::Cn470Rp1, RegionKind::Us915] {
        let region = RegionPlan::new(kind);
        let addr = DevAddr(0x2601_1234);
        for period in 0..20u32 {
            let t = period * BEACON_PERIOD_S;
            let frequency = region.beacon_frequency(t);
            assert_eq!(frequency, region.beacon_frequency(t + BEACON_PERIOD_S - 1));
            assert_eq!(frequency, region.beacon_frequency(t + 8 * BEACON_PERIOD_S));
            assert_eq!(region.ping_slot_frequency(t, addr), region.ping_slot_frequency(t, addr));
        }
    }
}

#[test]
fn test_ping_slot_uniform_over_dev_addr() {
    let region = RegionPlan::new(RegionKind::Cn470Rp1);
    let mut counts = [0u32; 8];
    for addr in 0..8_000u32 {
        let frequency = region.ping_slot_frequency(12_345, DevAddr(addr));
        let channel = (frequency - 508_300_000) / 200_000;
        counts[channel as usize] += 1;
    }
    assert!(counts.iter().all(|&c| c == 1_000), "{:?}", counts);

    // Published formula: (DevAddr + floor(t / 128)) mod 8
    assert_eq!(region.ping_slot_frequency(1_408, DevAddr(0x0102_0304)), 509_700_000);
    assert_eq!(region.ping_slot_frequency(0, DevAddr(u32::MAX)), 509_700_000);
}

#[test]
fn test_link_adr_on_us915() {
    let mut region = RegionPlan::new(RegionKind::Us915);
    // Bank directive: only channels 8..15 and 65
    let req = LinkAdrReq {
        data_rate: 3,
        tx_power: 2,
        ch_mask: 0x0002,
        ch_mask_cntl: 5,
        nb_trans: 0,
    };
    let outcome = apply_link_adr_block(&mut region, &[req]);
    assert!(outcome.answer.is_accepted());
    assert_eq!(outcome.mask_status, ChannelMaskStatus::AcceptedBulk);
    assert_eq!(outcome.nb_trans, Some(1));
    assert_eq!(region.channel_mask().count(), 9);
    assert_eq!(region.next_channel(3).unwrap().index, 8);
}
