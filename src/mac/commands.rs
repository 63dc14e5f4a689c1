use heapless::Vec;

use crate::region::{ChannelMaskBlock, ChannelMaskStatus, Region, RegionPlan};

/// LinkADRReq command identifier
pub const LINK_ADR_REQ_CID: u8 = 0x03;
/// LinkADRAns command identifier
pub const LINK_ADR_ANS_CID: u8 = 0x83;

/// Payload length of LinkADRReq
const LINK_ADR_REQ_LEN: usize = 4;

/// DataRate or TXPower value asking to keep the current setting
pub const KEEP_CURRENT: u8 = 0x0F;

/// Largest number of LinkADRReq commands handled as one block
pub const MAX_LINK_ADR_BLOCK: usize = 8;

/// Link ADR request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LinkAdrReq {
    /// Data rate
    pub data_rate: u8,
    /// TX power index
    pub tx_power: u8,
    /// Channel mask
    pub ch_mask: u16,
    /// Channel mask control
    pub ch_mask_cntl: u8,
    /// Number of transmissions
    pub nb_trans: u8,
}

impl LinkAdrReq {
    /// Parse the 4-byte command payload
    pub fn from_bytes(payload: &[u8]) -> Option<Self> {
        if payload.len() < LINK_ADR_REQ_LEN {
            return None;
        }
        Some(Self {
            data_rate: payload[0] >> 4,
            tx_power: payload[0] & 0x0F,
            ch_mask: u16::from_le_bytes([payload[1], payload[2]]),
            ch_mask_cntl: (payload[3] >> 4) & 0x07,
            nb_trans: payload[3] & 0x0F,
        })
    }

    /// Channel mask block carried by the request
    pub fn mask_block(&self) -> ChannelMaskBlock {
        ChannelMaskBlock::new(self.ch_mask_cntl, self.ch_mask)
    }
}

/// Link ADR answer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LinkAdrAns {
    /// Power ACK
    pub power_ack: bool,
    /// Data rate ACK
    pub data_rate_ack: bool,
    /// Channel mask ACK
    pub channel_mask_ack: bool,
}

impl LinkAdrAns {
    /// Status byte of the answer
    pub fn to_byte(&self) -> u8 {
        (self.power_ack as u8) << 2 | (self.data_rate_ack as u8) << 1 | self.channel_mask_ack as u8
    }

    /// Parse a status byte
    pub fn from_byte(status: u8) -> Self {
        Self {
            power_ack: (status & 0x04) != 0,
            data_rate_ack: (status & 0x02) != 0,
            channel_mask_ack: (status & 0x01) != 0,
        }
    }

    /// Whether every field was acknowledged
    pub fn is_accepted(&self) -> bool {
        self.power_ack && self.data_rate_ack && self.channel_mask_ack
    }
}

/// Result of a LinkADRReq block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LinkAdrOutcome {
    /// Answer to send, once per request of the block
    pub answer: LinkAdrAns,
    /// Channel mask status of the staged block
    pub mask_status: ChannelMaskStatus,
    /// New datarate, `None` when kept or rejected
    pub data_rate: Option<u8>,
    /// New TX power index, `None` when kept or rejected
    pub tx_power: Option<u8>,
    /// New number of transmissions, `None` when rejected
    pub nb_trans: Option<u8>,
}

/// Collect the contiguous LinkADRReq commands at the start of `commands`
///
/// Returns the requests and the number of bytes they span.
pub fn parse_link_adr_block(commands: &[u8]) -> (Vec<LinkAdrReq, MAX_LINK_ADR_BLOCK>, usize) {
    let mut reqs = Vec::new();
    let mut offset = 0;
    while commands.get(offset) == Some(&LINK_ADR_REQ_CID) {
        let req = match LinkAdrReq::from_bytes(&commands[offset + 1..]) {
            Some(req) => req,
            None => break,
        };
        if reqs.push(req).is_err() {
            break;
        }
        offset += 1 + LINK_ADR_REQ_LEN;
    }
    (reqs, offset)
}

/// Apply a block of LinkADRReq commands to `region`
///
/// The channel masks of every request are staged together and the datarate
/// and power of the last request are checked against the staged plan. The
/// region is only updated if all three fields are acknowledged.
pub fn apply_link_adr_block(region: &mut RegionPlan, reqs: &[LinkAdrReq]) -> LinkAdrOutcome {
    // Requests past the block limit are ignored entirely
    let reqs = &reqs[..reqs.len().min(MAX_LINK_ADR_BLOCK)];
    let last = match reqs.last() {
        Some(last) => *last,
        None => {
            return LinkAdrOutcome {
                answer: LinkAdrAns::from_byte(0),
                mask_status: ChannelMaskStatus::InvalidSelector,
                data_rate: None,
                tx_power: None,
                nb_trans: None,
            }
        }
    };

    let mut blocks: Vec<ChannelMaskBlock, MAX_LINK_ADR_BLOCK> = Vec::new();
    for req in reqs {
        blocks.push(req.mask_block()).ok();
    }
    let mut staged = region.clone();
    let mask_status = staged.build_channel_mask_block(&blocks);

    let data_rate_ack = last.data_rate == KEEP_CURRENT
        || (staged.datarate_to_modulation(last.data_rate).is_ok()
            && staged.eligible_channel_count(last.data_rate) > 0);
    let power_ack = last.tx_power == KEEP_CURRENT || last.tx_power <= staged.max_tx_power_index();
    let answer = LinkAdrAns {
        power_ack,
        data_rate_ack,
        channel_mask_ack: mask_status.is_accepted(),
    };

    if !answer.is_accepted() {
        debug!("link adr rejected, status {}", answer.to_byte());
        return LinkAdrOutcome {
            answer,
            mask_status,
            data_rate: None,
            tx_power: None,
            nb_trans: None,
        };
    }

    *region = staged;
    LinkAdrOutcome {
        answer,
        mask_status,
        data_rate: (last.data_rate != KEEP_CURRENT).then_some(last.data_rate),
        tx_power: (last.tx_power != KEEP_CURRENT).then_some(last.tx_power),
        nb_trans: Some(if last.nb_trans == 0 { 1 } else { last.nb_trans }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::region::RegionKind;

    fn req(data_rate: u8, tx_power: u8, ch_mask: u16, ch_mask_cntl: u8) -> LinkAdrReq {
        LinkAdrReq {
            data_rate,
            tx_power,
            ch_mask,
            ch_mask_cntl,
            nb_trans: 1,
        }
    }

    #[test]
    fn test_parse_link_adr_req() {
        let cmd = LinkAdrReq::from_bytes(&[0x53, 0xFF, 0x00, 0x21]).unwrap();
        assert_eq!(cmd.data_rate, 5);
        assert_eq!(cmd.tx_power, 3);
        assert_eq!(cmd.ch_mask, 0x00FF);
        assert_eq!(cmd.ch_mask_cntl, 2);
        assert_eq!(cmd.nb_trans, 1);
        assert_eq!(LinkAdrReq::from_bytes(&[0x53, 0xFF]), None);
    }

    #[test]
    fn test_parse_block_stops_at_other_command() {
        let bytes = [0x03, 0x20, 0xFF, 0xFF, 0x01, 0x03, 0x20, 0x00, 0x00, 0x11, 0x06];
        let (reqs, used) = parse_link_adr_block(&bytes);
        assert_eq!(reqs.len(), 2);
        assert_eq!(used, 10);
        assert_eq!(reqs[1].ch_mask_cntl, 1);
    }

    #[test]
    fn test_answer_byte() {
        let ans = LinkAdrAns {
            power_ack: true,
            data_rate_ack: false,
            channel_mask_ack: true,
        };
        assert_eq!(ans.to_byte(), 0b101);
        assert_eq!(LinkAdrAns::from_byte(0b101), ans);
    }

    #[test]
    fn test_block_applied_atomically() {
        let mut region = RegionPlan::new(RegionKind::Cn470Rp1);
        // Only group 2 ends up enabled
        let reqs: [LinkAdrReq; 6] =
            core::array::from_fn(|i| req(5, 1, if i == 2 { 0x000F } else { 0 }, i as u8));
        let outcome = apply_link_adr_block(&mut region, &reqs);
        assert!(outcome.answer.is_accepted());
        assert_eq!(outcome.data_rate, Some(5));
        assert_eq!(region.channel_mask().count(), 4);
        assert!(region.channel_mask().is_set(32));
    }

    #[test]
    fn test_block_limited_to_eight_requests() {
        let mut region = RegionPlan::new(RegionKind::Cn470Rp1);
        let mut reqs = [req(3, 2, 0xFFFF, 0); MAX_LINK_ADR_BLOCK + 1];
        reqs[MAX_LINK_ADR_BLOCK] = req(4, 9, 0x0000, 1);
        let outcome = apply_link_adr_block(&mut region, &reqs);
        assert!(outcome.answer.is_accepted());
        assert_eq!(outcome.data_rate, Some(3));
        assert_eq!(outcome.tx_power, Some(2));
        assert_eq!(region.channel_mask().count(), 96);
    }

    #[test]
    fn test_rejected_power_keeps_mask() {
        let mut region = RegionPlan::new(RegionKind::Cn470Rp1);
        let before = *region.channel_mask();
        let outcome = apply_link_adr_block(&mut region, &[req(0, 9, 0x0001, 0)]);
        assert!(!outcome.answer.power_ack);
        assert!(outcome.answer.channel_mask_ack);
        assert_eq!(outcome.data_rate, None);
        assert_eq!(*region.channel_mask(), before);
    }

    #[test]
    fn test_datarate_needs_eligible_channel() {
        let mut region = RegionPlan::new(RegionKind::Us915);
        // Only the 500 kHz channel 64 remains, it does not accept DR0
        let outcome = apply_link_adr_block(&mut region, &[req(0, KEEP_CURRENT, 0x0001, 7)]);
        assert!(!outcome.answer.data_rate_ack);
        assert!(outcome.answer.channel_mask_ack);
        assert_eq!(region.channel_mask().count(), 72);

        let outcome = apply_link_adr_block(&mut region, &[req(4, KEEP_CURRENT, 0x0001, 7)]);
        assert!(outcome.answer.is_accepted());
        assert_eq!(outcome.tx_power, None);
        assert_eq!(region.channel_mask().count(), 1);
    }
}
