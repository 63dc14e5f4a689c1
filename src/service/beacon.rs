//! Class B beacon tracking
//!
//! This service handles beacon synchronization including:
//! - Beacon window scheduling from a GPS time reference
//! - Beacon reception and GPS time re-anchoring
//! - Beacon loss detection and recovery
//! - Ping slot frequency of the current beacon period

use super::{DownlinkFrame, RadioOutcome, RadioRequest, Service, TaskContext};
use crate::engine::event::ModemEvent;
use crate::radio::arbiter::RxWindow;
use crate::region::{Region, BEACON_PERIOD_S};

/// Beacon interval in milliseconds
pub const BEACON_INTERVAL_MS: u32 = BEACON_PERIOD_S * 1_000;

/// Reception starts this long before the expected beacon
const BEACON_GUARD_MS: u32 = 3_000;

/// Maximum beacons missed before declaring loss
const MAX_BEACON_MISSED: u8 = 3;

/// Beacon tracking state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BeaconState {
    /// Not tracking beacons
    Idle,
    /// Searching for the first beacon
    Searching,
    /// Synchronized with network beacons
    Synchronized,
    /// Lost beacon synchronization, still searching
    Lost,
}

#[derive(Debug, Clone, Copy)]
struct TimeReference {
    local_ms: u32,
    gps_time_s: u32,
}

impl TimeReference {
    fn gps_ms(&self, now_ms: u32) -> u64 {
        self.gps_time_s as u64 * 1_000 + now_ms.wrapping_sub(self.local_ms) as u64
    }
}

/// Beacon tracking service
#[derive(Debug)]
pub struct BeaconService {
    state: BeaconState,
    time_ref: Option<TimeReference>,
    missed_beacons: u8,
    last_beacon_s: Option<u32>,
    expected_beacon_s: Option<u32>,
    received_beacon_s: Option<u32>,
    rfu_len: usize,
    ping_slot_frequency: Option<u32>,
}

impl BeaconService {
    /// Create an idle beacon tracker
    pub fn new() -> Self {
        Self {
            state: BeaconState::Idle,
            time_ref: None,
            missed_beacons: 0,
            last_beacon_s: None,
            expected_beacon_s: None,
            received_beacon_s: None,
            rfu_len: 0,
            ping_slot_frequency: None,
        }
    }

    /// Anchor GPS time: `gps_time_s` was current at local time `local_ms`
    pub fn sync_time(&mut self, local_ms: u32, gps_time_s: u32) {
        self.time_ref = Some(TimeReference { local_ms, gps_time_s });
    }

    /// Start beacon acquisition; the service task must be scheduled
    pub fn start(&mut self) {
        self.state = BeaconState::Searching;
        self.missed_beacons = 0;
    }

    /// Stop tracking
    pub fn stop(&mut self) {
        self.state = BeaconState::Idle;
        self.expected_beacon_s = None;
        self.ping_slot_frequency = None;
    }

    /// Current beacon state
    pub fn state(&self) -> BeaconState {
        self.state
    }

    /// Check if beacon is synchronized
    pub fn is_synchronized(&self) -> bool {
        self.state == BeaconState::Synchronized
    }

    /// Consecutive beacons missed while synchronized
    pub fn missed_beacons(&self) -> u8 {
        self.missed_beacons
    }

    /// GPS time of the last received beacon
    pub fn last_beacon_time(&self) -> Option<u32> {
        self.last_beacon_s
    }

    /// GPS time in seconds at local time `now_ms`
    pub fn gps_time_s(&self, now_ms: u32) -> Option<u32> {
        self.time_ref.map(|r| (r.gps_ms(now_ms) / 1_000) as u32)
    }

    /// Ping slot frequency of the current beacon period
    pub fn ping_slot_frequency(&self) -> Option<u32> {
        self.ping_slot_frequency
    }

    /// Open the window of the next beacon or wait until it is close
    fn plan_window(&mut self, ctx: &mut TaskContext<'_>) {
        let time_ref = match self.time_ref {
            Some(time_ref) => time_ref,
            None => {
                warn!("beacon: no GPS time reference");
                return;
            }
        };
        let gps_ms = time_ref.gps_ms(ctx.now_ms());
        let period_ms = BEACON_INTERVAL_MS as u64;
        let next_beacon_ms = (gps_ms / period_ms + 1) * period_ms;
        let delay_ms = (next_beacon_ms - gps_ms) as u32;
        if delay_ms > BEACON_GUARD_MS {
            ctx.schedule_in(delay_ms - BEACON_GUARD_MS);
            return;
        }

        if ctx.outcome() == Some(RadioOutcome::Failed) {
            // Radio could not start this window, try the next period
            debug!("beacon: window start failed, next period");
            ctx.schedule_in(delay_ms + BEACON_GUARD_MS);
            return;
        }

        let beacon_s = (next_beacon_ms / 1_000) as u32;
        // Widen the window while not synchronized
        let guard_ms = match self.state {
            BeaconState::Synchronized => BEACON_GUARD_MS,
            _ => 2 * BEACON_GUARD_MS,
        };
        let region = ctx.region();
        let request = RadioRequest::Rx {
            frequency: region.beacon_frequency(beacon_s),
            datarate: region.beacon_datarate(),
            timeout_ms: delay_ms + guard_ms,
            window: RxWindow::Beacon,
        };
        self.rfu_len = region.beacon_rfu_len();
        match ctx.request_radio(request) {
            Ok(()) => {
                debug!("beacon: window opened for beacon {}", beacon_s);
                self.expected_beacon_s = Some(beacon_s);
                self.received_beacon_s = None;
            }
            Err(_) => {
                debug!("beacon: radio busy, next period");
                ctx.schedule_in(delay_ms + BEACON_GUARD_MS);
            }
        }
    }

    fn on_beacon(&mut self, ctx: &mut TaskContext<'_>, gps_time_s: u32) {
        self.time_ref = Some(TimeReference {
            local_ms: ctx.now_ms(),
            gps_time_s,
        });
        self.state = BeaconState::Synchronized;
        self.missed_beacons = 0;
        self.last_beacon_s = Some(gps_time_s);
        let frequency = ctx.region().ping_slot_frequency(gps_time_s, ctx.dev_addr());
        self.ping_slot_frequency = Some(frequency);
        info!("beacon: synchronized at {}", gps_time_s);
        ctx.raise_event(ModemEvent::BeaconSync { gps_time_s });
    }

    fn on_missed(&mut self, ctx: &mut TaskContext<'_>, expected_s: Option<u32>) {
        if self.state != BeaconState::Synchronized {
            return;
        }
        self.missed_beacons += 1;
        warn!("beacon: missed {}", self.missed_beacons);
        if self.missed_beacons >= MAX_BEACON_MISSED {
            self.state = BeaconState::Lost;
            self.ping_slot_frequency = None;
            ctx.raise_event(ModemEvent::BeaconLost);
        } else if let Some(expected_s) = expected_s {
            // Keep hopping on the predicted schedule
            let frequency = ctx.region().ping_slot_frequency(expected_s, ctx.dev_addr());
            self.ping_slot_frequency = Some(frequency);
        }
    }

    /// Parse the Time field of a beacon payload whose network CRC matches
    fn beacon_time(&self, payload: &[u8]) -> Option<u32> {
        if payload.iter().all(|&b| b == 0) {
            return None;
        }
        let covered = self.rfu_len + 4;
        let crc = payload.get(covered..covered + 2)?;
        if u16::from_le_bytes([crc[0], crc[1]]) != beacon_crc(&payload[..covered]) {
            debug!("beacon: crc mismatch");
            return None;
        }
        let time = &payload[self.rfu_len..covered];
        Some(u32::from_le_bytes([time[0], time[1], time[2], time[3]]))
    }
}

/// CRC-16/CCITT (polynomial 0x1021, initial value 0) of the beacon network fields
fn beacon_crc(data: &[u8]) -> u16 {
    let mut crc: u16 = 0;
    for &byte in data {
        crc ^= (byte as u16) << 8;
        for _ in 0..8 {
            crc = if crc & 0x8000 != 0 {
                (crc << 1) ^ 0x1021
            } else {
                crc << 1
            };
        }
    }
    crc
}

impl Default for BeaconService {
    fn default() -> Self {
        Self::new()
    }
}

impl Service for BeaconService {
    fn on_launch(&mut self, ctx: &mut TaskContext<'_>) {
        if self.state == BeaconState::Idle {
            return;
        }
        self.plan_window(ctx);
    }

    fn on_update(&mut self, ctx: &mut TaskContext<'_>) {
        let expected_s = self.expected_beacon_s.take();
        let received = self.received_beacon_s.take();
        let claimed = matches!(
            ctx.outcome(),
            Some(RadioOutcome::RxDone { claimed_by }) if claimed_by == Some(ctx.service_id())
        );
        match received {
            Some(gps_time_s) if claimed => self.on_beacon(ctx, gps_time_s),
            _ => self.on_missed(ctx, expected_s),
        }
        if self.state != BeaconState::Idle {
            self.plan_window(ctx);
        }
    }

    fn on_downlink(&mut self, frame: &DownlinkFrame) -> bool {
        if frame.window != RxWindow::Beacon || self.expected_beacon_s.is_none() {
            return false;
        }
        match self.beacon_time(&frame.payload) {
            Some(gps_time_s) => {
                self.received_beacon_s = Some(gps_time_s);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crc_check_value() {
        assert_eq!(beacon_crc(b"123456789"), 0x31C3);
        assert_eq!(beacon_crc(&[]), 0);
    }

    #[test]
    fn test_beacon_time_after_rfu() {
        let mut service = BeaconService::new();
        service.rfu_len = 3;
        let mut payload = [0, 0, 0, 0x00, 0x80, 0x00, 0x00, 0, 0, 0xAA];
        let crc = beacon_crc(&payload[..7]).to_le_bytes();
        payload[7..9].copy_from_slice(&crc);
        assert_eq!(service.beacon_time(&payload), Some(32_768));

        payload[8] ^= 0x01;
        assert_eq!(service.beacon_time(&payload), None);
        assert_eq!(service.beacon_time(&[0u8; 19]), None);
        assert_eq!(service.beacon_time(&[1, 2, 3, 4]), None);
        assert_eq!(service.beacon_time(&[1, 2, 3, 4, 5, 6, 7, 8]), None);
    }

    #[test]
    fn test_gps_time_follows_local_clock() {
        let mut service = BeaconService::new();
        assert_eq!(service.gps_time_s(0), None);
        service.sync_time(u32::MAX - 499, 1_000);
        assert_eq!(service.gps_time_s(500), Some(1_001));
    }

    #[test]
    fn test_idle_ignores_frames() {
        let mut service = BeaconService::new();
        let frame = DownlinkFrame {
            payload: heapless::Vec::from_slice(&[0, 0, 0, 1, 0, 0, 0]).unwrap(),
            frequency: 508_300_000,
            datarate: 2,
            window: RxWindow::Beacon,
            rssi: -90,
            snr: 5,
            timestamp_ms: 0,
        };
        assert!(!service.on_downlink(&frame));
        assert_eq!(service.state(), BeaconState::Idle);
    }
}
