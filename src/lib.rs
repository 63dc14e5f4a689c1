//! LoRaWAN soft-modem MAC core in Rust
//!
//! This crate provides the MAC core of a LoRaWAN end-device modem: the
//! regional channel plan arithmetic and the cooperative engine that runs
//! protocol services over one shared radio, without an operating system.
//!
//! # Features
//! - CN470 (96 channels) and US915 channel plans
//! - Channel selection, channel mask and CFList handling
//! - Class B beacon and ping slot frequency hopping
//! - Cooperative scheduler with radio arbitration and downlink dispatch
//! - Radio driver abstraction, register programming stays in the driver
//! - No allocation, no unsafe code
//!
//! # Example
//! ```
//! use lorawan_modem::region::{Region, RegionKind, RegionPlan};
//!
//! let mut region = RegionPlan::new(RegionKind::Cn470Rp1);
//!
//! // Disable channels 16-31
//! assert!(region.build_channel_mask(1, 0x0000).is_accepted());
//!
//! let selection = region.next_channel(0).unwrap();
//! assert_eq!(
//!     region.tx_frequency_by_index(selection.index).unwrap(),
//!     selection.tx_frequency
//! );
//! ```

#![warn(missing_docs)]
#![cfg_attr(not(test), no_std)]

#[macro_use]
mod fmt;

/// Modem and stack configuration
pub mod config;

/// Cooperative engine and stack instances
pub mod engine;

/// MAC command handling
pub mod mac;

/// Radio abstraction and arbitration
pub mod radio;

/// Regional channel plans
pub mod region;

/// Protocol services
pub mod service;

pub use config::{DevAddr, EngineConfig, StackConfig};
pub use engine::{Clock, Engine, EngineError, ModemEvent};
pub use radio::traits::Radio;
pub use region::{Region, RegionKind, RegionPlan};
pub use service::{DownlinkFrame, RadioOutcome, RadioRequest, Service, TaskContext};
