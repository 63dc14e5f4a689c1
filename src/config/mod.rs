//! Modem and stack configuration
//!
//! This module contains the compile-time capacities of the modem core and the
//! runtime configuration of the engine and of each stack instance:
//! - Table capacities (stacks, services, event queue depth, payload size)
//! - Engine timing parameters
//! - Per-stack region and device address

/// Per-stack configuration
pub mod stack;

pub use stack::{DevAddr, StackConfig};

/// Number of independent stack instances an engine can host
pub const MAX_STACKS: usize = 2;

/// Capacity of each stack's service table
pub const MAX_SERVICES: usize = 8;

/// Depth of each stack's event queue
pub const EVENT_QUEUE_DEPTH: usize = 4;

/// Largest PHY payload handled by the engine
pub const MAX_PAYLOAD_SIZE: usize = 255;

/// Engine timing configuration
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct EngineConfig {
    /// Upper bound for the delay returned by `run`, in milliseconds
    pub max_delay_ms: u32,
    /// Age after which a radio operation without completion is aborted
    pub radio_watchdog_ms: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_delay_ms: 60_000,
            radio_watchdog_ms: 10_000,
        }
    }
}
