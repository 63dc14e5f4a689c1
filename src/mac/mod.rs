//! MAC command handling
//!
//! Only the commands acting on the regional plan live here; frame security
//! and the remaining MAC commands belong to the services.

/// LinkADRReq / LinkADRAns
pub mod commands;

pub use commands::{
    apply_link_adr_block, parse_link_adr_block, LinkAdrAns, LinkAdrOutcome, LinkAdrReq,
};
