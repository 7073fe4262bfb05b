//! BLE protocol adapter for the EFR32 radio coexistence (PTA) core.
//!
//! Translates the BLE stack's transmit/receive intents into coexistence
//! requests and mirrors arbitration outcomes into the radio driver: losing
//! GRANT mid-transmit aborts the transmit, and radio hold-off changes are
//! forwarded as TX hold-off.
#![cfg_attr(not(test), no_std)]

// This mod MUST go first, so that the others see its macros.
pub(crate) mod fmt;

mod ble;

pub use ble::*;
pub use efr32_coex as coex;
