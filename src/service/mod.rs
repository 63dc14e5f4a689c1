//! Protocol services run by the engine
//!
//! A service is a piece of protocol logic (join, class B tracking, an
//! application) registered on a stack. The engine launches its task when it
//! is due, runs its update hook when the radio operation it started
//! completes and offers it every received frame before generic processing.
//!
//! Hooks never block. They talk to the engine through a [`TaskContext`]:
//! reading the region, asking for one radio operation, rescheduling
//! themselves and raising events.

/// Class B beacon tracking
pub mod beacon;
/// Fixed capacity service table
pub mod registry;

pub use beacon::{BeaconService, BeaconState};
pub use registry::{RegistryError, ServiceHandle, ServiceRegistry};

use heapless::Vec;

use crate::config::{DevAddr, MAX_PAYLOAD_SIZE};
use crate::engine::clock::MAX_DELAY_MS;
use crate::engine::event::{EventQueue, ModemEvent};
use crate::radio::arbiter::{ArbiterError, RxWindow};
use crate::region::RegionPlan;

/// Index of a service in its stack's registry
pub type ServiceId = u8;

/// Frame received by the radio
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DownlinkFrame {
    /// PHY payload
    pub payload: Vec<u8, MAX_PAYLOAD_SIZE>,
    /// Reception frequency in Hz
    pub frequency: u32,
    /// Reception datarate
    pub datarate: u8,
    /// Window the frame was received in
    pub window: RxWindow,
    /// RSSI in dBm
    pub rssi: i16,
    /// SNR in dB
    pub snr: i8,
    /// Time the reception completed, in milliseconds
    pub timestamp_ms: u32,
}

/// Radio operation requested by a hook
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RadioRequest {
    /// Transmit `payload`
    Tx {
        /// Frequency in Hz
        frequency: u32,
        /// Region datarate
        datarate: u8,
        /// Output power in dBm
        power_dbm: i8,
        /// PHY payload
        payload: Vec<u8, MAX_PAYLOAD_SIZE>,
    },
    /// Open a reception window
    Rx {
        /// Frequency in Hz
        frequency: u32,
        /// Region datarate
        datarate: u8,
        /// Window length in milliseconds
        timeout_ms: u32,
        /// Window kind
        window: RxWindow,
    },
}

/// How the radio operation of a task ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RadioOutcome {
    /// Transmission finished
    TxDone,
    /// Frame received and dispatched
    RxDone {
        /// Service that claimed the frame, `None` if it was queued as an event
        claimed_by: Option<ServiceId>,
    },
    /// Window closed without a frame
    RxTimeout,
    /// Frame received with a CRC error
    RxCrcError,
    /// The radio could not be programmed or reported an error
    Failed,
    /// The operation exceeded the watchdog limit
    Aborted,
}

/// View of the engine handed to service hooks
pub struct TaskContext<'c> {
    stack_id: u8,
    service_id: ServiceId,
    task_id: u8,
    now_ms: u32,
    dev_addr: DevAddr,
    radio_free: bool,
    outcome: Option<RadioOutcome>,
    region: &'c mut RegionPlan,
    events: &'c mut EventQueue,
    request: Option<RadioRequest>,
    reschedule: Option<u32>,
}

impl<'c> TaskContext<'c> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        stack_id: u8,
        service_id: ServiceId,
        task_id: u8,
        now_ms: u32,
        dev_addr: DevAddr,
        radio_free: bool,
        outcome: Option<RadioOutcome>,
        region: &'c mut RegionPlan,
        events: &'c mut EventQueue,
    ) -> Self {
        Self {
            stack_id,
            service_id,
            task_id,
            now_ms,
            dev_addr,
            radio_free,
            outcome,
            region,
            events,
            request: None,
            reschedule: None,
        }
    }

    /// Stack the task runs on
    pub fn stack_id(&self) -> u8 {
        self.stack_id
    }

    /// Service owning the task
    pub fn service_id(&self) -> ServiceId {
        self.service_id
    }

    /// Task identifier given at registration
    pub fn task_id(&self) -> u8 {
        self.task_id
    }

    /// Time of the current run pass
    pub fn now_ms(&self) -> u32 {
        self.now_ms
    }

    /// Device address of the stack
    pub fn dev_addr(&self) -> DevAddr {
        self.dev_addr
    }

    /// Whether the radio was free when the hook was called
    pub fn radio_free(&self) -> bool {
        self.radio_free
    }

    /// Outcome of the completed radio operation, only set in `on_update`
    pub fn outcome(&self) -> Option<RadioOutcome> {
        self.outcome
    }

    /// Regional plan of the stack
    pub fn region(&self) -> &RegionPlan {
        &*self.region
    }

    /// Mutable regional plan of the stack
    pub fn region_mut(&mut self) -> &mut RegionPlan {
        &mut *self.region
    }

    /// Ask for one radio operation, started when the hook returns
    pub fn request_radio(&mut self, request: RadioRequest) -> Result<(), ArbiterError> {
        if !self.radio_free || self.request.is_some() {
            return Err(ArbiterError::Busy);
        }
        self.request = Some(request);
        Ok(())
    }

    /// Schedule this service's task `delay_ms` from now, capped at
    /// [`MAX_DELAY_MS`]
    pub fn schedule_in(&mut self, delay_ms: u32) {
        self.reschedule = Some(delay_ms.min(MAX_DELAY_MS));
    }

    /// Queue an event for the application
    pub fn raise_event(&mut self, event: ModemEvent) {
        self.events.push(event);
    }

    pub(crate) fn into_parts(self) -> (Option<RadioRequest>, Option<u32>) {
        (self.request, self.reschedule)
    }
}

/// Protocol logic registered on a stack
///
/// Every hook has a no-op default; a service overriding none of them is an
/// inert task.
pub trait Service {
    /// Task is due
    fn on_launch(&mut self, _ctx: &mut TaskContext<'_>) {}

    /// Radio operation started by this service completed
    fn on_update(&mut self, _ctx: &mut TaskContext<'_>) {}

    /// Offered a received frame, return true to claim it
    fn on_downlink(&mut self, _frame: &DownlinkFrame) -> bool {
        false
    }
}
