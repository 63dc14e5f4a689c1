//! One stack instance: region, services, radio ownership and events

use core::sync::atomic::{AtomicBool, Ordering};

use heapless::Vec;

use super::event::{EventQueue, ModemEvent};
use crate::config::{EngineConfig, StackConfig, MAX_PAYLOAD_SIZE};
use crate::radio::arbiter::{PendingOp, RadioArbiter, RadioOpKind, RxWindow};
use crate::radio::traits::{ModulationParams, PacketParams, Radio, RadioEvent};
use crate::region::{Region, RegionPlan};
use crate::service::{
    DownlinkFrame, RadioOutcome, RadioRequest, ServiceId, ServiceRegistry, TaskContext,
};

const UPLINK_PREAMBLE_LEN: u16 = 8;
const BEACON_PREAMBLE_LEN: u16 = 10;

pub(crate) struct StackInstance<'a, R: Radio> {
    pub(crate) stack_id: u8,
    pub(crate) config: StackConfig,
    pub(crate) region: RegionPlan,
    pub(crate) services: ServiceRegistry<'a>,
    pub(crate) arbiter: RadioArbiter,
    pub(crate) radio: Option<&'a mut R>,
    pub(crate) irq_pending: AtomicBool,
    pub(crate) events: EventQueue,
}

impl<'a, R: Radio> StackInstance<'a, R> {
    pub(crate) fn new(stack_id: u8, config: StackConfig) -> Self {
        Self {
            stack_id,
            config,
            region: RegionPlan::new(config.region),
            services: ServiceRegistry::new(),
            arbiter: RadioArbiter::new(),
            radio: None,
            irq_pending: AtomicBool::new(false),
            events: EventQueue::new(),
        }
    }

    /// One scheduling pass, returns the delay before the next one
    pub(crate) fn run(&mut self, now_ms: u32, config: &EngineConfig) -> u32 {
        self.services.seal();
        self.process_irq(now_ms);
        self.check_watchdog(now_ms, config);
        self.launch_due_task(now_ms);
        self.next_delay(now_ms, config)
    }

    fn process_irq(&mut self, now_ms: u32) {
        if !self.irq_pending.load(Ordering::Acquire) {
            return;
        }
        // Cleared before polling so an interrupt landing meanwhile is kept
        self.irq_pending.store(false, Ordering::Release);

        let op = match self.arbiter.pending() {
            Some(op) => *op,
            None => {
                debug!("stack {}: interrupt without pending operation", self.stack_id);
                return;
            }
        };
        let polled = match self.radio.as_deref_mut() {
            Some(radio) => radio.poll_event().map_err(|e| e.map(|_| ())),
            None => Err(nb::Error::Other(())),
        };
        match polled {
            Ok(event) => self.complete(op, event, now_ms),
            Err(nb::Error::WouldBlock) => {}
            Err(nb::Error::Other(())) => {
                error!("stack {}: radio error on completion", self.stack_id);
                self.arbiter.release();
                self.run_service(op.owner, Some(RadioOutcome::Failed), now_ms);
            }
        }
    }

    fn complete(&mut self, op: PendingOp, event: RadioEvent, now_ms: u32) {
        self.arbiter.release();
        let outcome = match (event, op.kind) {
            (RadioEvent::TxDone, _) => RadioOutcome::TxDone,
            (RadioEvent::RxDone, RadioOpKind::Rx(window)) => {
                match self.read_frame(&op, window, now_ms) {
                    Some(frame) => {
                        let claimed_by = self.services.dispatch_downlink(&frame);
                        if claimed_by.is_none() {
                            self.events.push(ModemEvent::Downlink(frame));
                        }
                        RadioOutcome::RxDone { claimed_by }
                    }
                    None => RadioOutcome::Failed,
                }
            }
            (RadioEvent::RxDone, RadioOpKind::Tx) => RadioOutcome::Failed,
            (RadioEvent::RxTimeout, _) => RadioOutcome::RxTimeout,
            (RadioEvent::RxCrcError, _) => {
                let stats = self.radio.as_deref_mut().and_then(|radio| radio.rx_stats().ok());
                if let Some(stats) = stats {
                    debug!(
                        "stack {}: crc error, {} of {} packets",
                        self.stack_id,
                        stats.crc_errors,
                        stats.received
                    );
                }
                RadioOutcome::RxCrcError
            }
        };
        trace!("stack {}: operation of service {} completed", self.stack_id, op.owner);
        self.run_service(op.owner, Some(outcome), now_ms);
    }

    fn read_frame(
        &mut self,
        op: &PendingOp,
        window: RxWindow,
        now_ms: u32,
    ) -> Option<DownlinkFrame> {
        let radio = self.radio.as_deref_mut()?;
        let mut buffer = [0u8; MAX_PAYLOAD_SIZE];
        let len = radio.read_payload(&mut buffer).ok()?;
        let status = radio.packet_status().unwrap_or_default();
        let payload = Vec::from_slice(buffer.get(..len)?).ok()?;
        Some(DownlinkFrame {
            payload,
            frequency: op.frequency,
            datarate: op.datarate,
            window,
            rssi: status.rssi,
            snr: status.snr,
            timestamp_ms: now_ms,
        })
    }

    fn check_watchdog(&mut self, now_ms: u32, config: &EngineConfig) {
        if !self.arbiter.is_expired(now_ms, config.radio_watchdog_ms) {
            return;
        }
        if let Some(op) = self.arbiter.release() {
            warn!("stack {}: radio operation of service {} aborted", self.stack_id, op.owner);
            if let Some(radio) = self.radio.as_deref_mut() {
                radio.sleep().ok();
            }
            self.events.push(ModemEvent::RadioAborted { service_id: op.owner });
            self.run_service(op.owner, Some(RadioOutcome::Aborted), now_ms);
        }
    }

    fn launch_due_task(&mut self, now_ms: u32) {
        if !self.arbiter.is_free() {
            return;
        }
        let service_id = match self.services.next_task(now_ms) {
            Some((service_id, until)) if until <= 0 => service_id,
            _ => return,
        };
        if self.services.remove_task(service_id).is_err() {
            return;
        }
        debug!("stack {}: launching service {}", self.stack_id, service_id);
        self.run_service(service_id, None, now_ms);
    }

    fn next_delay(&self, now_ms: u32, config: &EngineConfig) -> u32 {
        if self.irq_pending.load(Ordering::Acquire) {
            return 0;
        }
        let delay = match self.arbiter.time_to_expiry(now_ms, config.radio_watchdog_ms) {
            Some(left) => left,
            None => match self.services.next_task(now_ms) {
                Some((_, until)) => until.max(0) as u32,
                None => config.max_delay_ms,
            },
        };
        delay.min(config.max_delay_ms)
    }

    /// Call `on_launch` (no outcome) or `on_update`, then start the radio
    /// operation the hook asked for. A failed start is reported once through
    /// `on_update`.
    fn run_service(&mut self, service_id: ServiceId, outcome: Option<RadioOutcome>, now_ms: u32) {
        let mut outcome = outcome;
        loop {
            let request = match self.invoke(service_id, outcome, now_ms) {
                Some(request) => request,
                None => return,
            };
            if self.start_radio(service_id, request, now_ms) {
                return;
            }
            if outcome == Some(RadioOutcome::Failed) {
                warn!("stack {}: dropping request of service {}", self.stack_id, service_id);
                return;
            }
            outcome = Some(RadioOutcome::Failed);
        }
    }

    fn invoke(
        &mut self,
        service_id: ServiceId,
        outcome: Option<RadioOutcome>,
        now_ms: u32,
    ) -> Option<RadioRequest> {
        let radio_free = self.arbiter.is_free();
        let slot = self.services.slot_mut(service_id).ok()?;
        if !slot.enabled {
            return None;
        }
        let mut ctx = TaskContext::new(
            self.stack_id,
            slot.service_id,
            slot.task_id,
            now_ms,
            self.config.dev_addr,
            radio_free,
            outcome,
            &mut self.region,
            &mut self.events,
        );
        match outcome {
            None => {
                slot.service.on_launch(&mut ctx);
                slot.initialized = true;
            }
            Some(_) => slot.service.on_update(&mut ctx),
        }
        let (request, reschedule) = ctx.into_parts();
        if let Some(delay_ms) = reschedule {
            slot.due_ms = Some(now_ms.wrapping_add(delay_ms));
        }
        request
    }

    /// Acquire the radio for `owner` and start `request`
    fn start_radio(&mut self, owner: ServiceId, request: RadioRequest, now_ms: u32) -> bool {
        let (frequency, datarate, kind) = match &request {
            RadioRequest::Tx {
                frequency,
                datarate,
                ..
            } => (*frequency, *datarate, RadioOpKind::Tx),
            RadioRequest::Rx {
                frequency,
                datarate,
                window,
                ..
            } => (*frequency, *datarate, RadioOpKind::Rx(*window)),
        };
        let (sf, bw) = match self.region.datarate_to_sf_bw(datarate) {
            Ok(sf_bw) => sf_bw,
            Err(_) => {
                warn!("stack {}: datarate {} not usable", self.stack_id, datarate);
                return false;
            }
        };
        let radio = match self.radio.as_deref_mut() {
            Some(radio) => radio,
            None => {
                warn!("stack {}: no radio context", self.stack_id);
                return false;
            }
        };
        let op = PendingOp {
            owner,
            kind,
            started_ms: now_ms,
            datarate,
            frequency,
        };
        if self.arbiter.acquire(op).is_err() {
            return false;
        }
        let packet = packet_params(&request, self.region.beacon_size());
        if program(radio, &request, ModulationParams::lora(sf, bw), packet).is_err() {
            error!("stack {}: radio programming failed", self.stack_id);
            self.arbiter.release();
            radio.sleep().ok();
            return false;
        }
        true
    }
}

fn packet_params(request: &RadioRequest, beacon_size: u8) -> PacketParams {
    match request {
        RadioRequest::Tx { payload, .. } => PacketParams {
            preamble_len: UPLINK_PREAMBLE_LEN,
            implicit_header: false,
            payload_len: payload.len() as u8,
            crc_on: true,
            invert_iq: false,
        },
        RadioRequest::Rx {
            window: RxWindow::Beacon,
            ..
        } => PacketParams {
            preamble_len: BEACON_PREAMBLE_LEN,
            implicit_header: true,
            payload_len: beacon_size,
            crc_on: false,
            invert_iq: false,
        },
        RadioRequest::Rx { .. } => PacketParams {
            preamble_len: UPLINK_PREAMBLE_LEN,
            implicit_header: false,
            payload_len: u8::MAX,
            crc_on: false,
            invert_iq: true,
        },
    }
}

fn program<R: Radio>(
    radio: &mut R,
    request: &RadioRequest,
    modulation: ModulationParams,
    packet: PacketParams,
) -> Result<(), R::Error> {
    match request {
        RadioRequest::Tx {
            frequency,
            power_dbm,
            payload,
            ..
        } => {
            radio.set_frequency(*frequency)?;
            radio.set_tx_power(*power_dbm)?;
            radio.configure_modulation(modulation)?;
            radio.configure_packet(packet)?;
            radio.transmit(payload)
        }
        RadioRequest::Rx {
            frequency, timeout_ms, ..
        } => {
            radio.set_frequency(*frequency)?;
            radio.configure_modulation(modulation)?;
            radio.configure_packet(packet)?;
            radio.receive(*timeout_ms)
        }
    }
}
