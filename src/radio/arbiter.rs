//! Ownership of the shared radio
//!
//! At most one operation owns the radio of a stack at a time. The owner is
//! recorded when the operation starts and cleared when its completion is
//! processed or the watchdog aborts it. `is_free` is a snapshot only.

use crate::engine::clock::elapsed_ms;

/// Receive window a reception belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RxWindow {
    /// First class A window
    Rx1,
    /// Second class A window
    Rx2,
    /// Class C continuous reception
    ClassC,
    /// Class B beacon
    Beacon,
    /// Class B ping slot
    PingSlot,
}

/// Kind of radio operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RadioOpKind {
    /// Transmission
    Tx,
    /// Reception window
    Rx(RxWindow),
}

/// Operation currently owning the radio
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PendingOp {
    /// Service that started the operation
    pub owner: u8,
    /// Operation kind
    pub kind: RadioOpKind,
    /// Start time in milliseconds
    pub started_ms: u32,
    /// Datarate of the operation, kept for the received frame descriptor
    pub datarate: u8,
    /// Frequency of the operation in Hz
    pub frequency: u32,
}

/// Arbiter error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ArbiterError {
    /// Another operation owns the radio
    Busy,
}

/// Single-owner radio arbiter of one stack
#[derive(Debug, Default)]
pub struct RadioArbiter {
    pending: Option<PendingOp>,
}

impl RadioArbiter {
    /// Create a free arbiter
    pub fn new() -> Self {
        Self::default()
    }

    /// True if no operation owns the radio
    pub fn is_free(&self) -> bool {
        self.pending.is_none()
    }

    /// Operation owning the radio
    pub fn pending(&self) -> Option<&PendingOp> {
        self.pending.as_ref()
    }

    /// Take ownership for `op`
    pub fn acquire(&mut self, op: PendingOp) -> Result<(), ArbiterError> {
        if self.pending.is_some() {
            return Err(ArbiterError::Busy);
        }
        trace!("arbiter: radio acquired by service {}", op.owner);
        self.pending = Some(op);
        Ok(())
    }

    /// Release ownership, returning the operation that held it
    pub fn release(&mut self) -> Option<PendingOp> {
        self.pending.take()
    }

    /// Whether the pending operation is older than `limit_ms` at `now_ms`
    pub fn is_expired(&self, now_ms: u32, limit_ms: u32) -> bool {
        self.pending
            .map(|op| elapsed_ms(op.started_ms, now_ms) >= limit_ms)
            .unwrap_or(false)
    }

    /// Time left before the pending operation expires
    pub fn time_to_expiry(&self, now_ms: u32, limit_ms: u32) -> Option<u32> {
        self.pending
            .map(|op| limit_ms.saturating_sub(elapsed_ms(op.started_ms, now_ms)))
    }
}
