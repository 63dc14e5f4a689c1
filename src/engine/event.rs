//! Modem events reported to the application
//!
//! Each stack keeps a bounded queue. When it is full the newest event is
//! dropped and counted; the application learns about new events through the
//! hook given to `init_common` and drains them with `get_event`.

use heapless::Deque;

use crate::config::EVENT_QUEUE_DEPTH;
use crate::service::{DownlinkFrame, ServiceId};

/// Event raised by the engine or by a service
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ModemEvent {
    /// Downlink that no service claimed
    Downlink(DownlinkFrame),
    /// Beacon received, GPS time re-anchored
    BeaconSync {
        /// GPS time carried by the beacon, in seconds
        gps_time_s: u32,
    },
    /// Beacon synchronization lost
    BeaconLost,
    /// Radio operation aborted by the watchdog
    RadioAborted {
        /// Owner of the aborted operation
        service_id: ServiceId,
    },
    /// Service specific notification
    Service {
        /// Service raising the event
        service_id: ServiceId,
        /// Service defined code
        code: u8,
    },
}

/// Bounded event queue of one stack
#[derive(Debug)]
pub struct EventQueue {
    queue: Deque<ModemEvent, EVENT_QUEUE_DEPTH>,
    missed: u16,
    raised: bool,
}

impl EventQueue {
    /// Create an empty queue
    pub fn new() -> Self {
        Self {
            queue: Deque::new(),
            missed: 0,
            raised: false,
        }
    }

    /// Queue `event`, dropping it when the queue is full
    pub fn push(&mut self, event: ModemEvent) {
        self.raised = true;
        if self.queue.push_back(event).is_err() {
            self.missed = self.missed.saturating_add(1);
            warn!("event queue full, {} events missed", self.missed);
        }
    }

    /// Oldest queued event
    pub fn pop(&mut self) -> Option<ModemEvent> {
        self.queue.pop_front()
    }

    /// Number of queued events
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// True if no event is queued
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Number of events dropped because the queue was full
    pub fn missed(&self) -> u16 {
        self.missed
    }

    /// Whether an event was raised since the last call
    pub(crate) fn take_raised(&mut self) -> bool {
        core::mem::replace(&mut self.raised, false)
    }
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new()
    }
}
