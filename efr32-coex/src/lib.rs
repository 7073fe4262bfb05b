//! Radio coexistence (PTA) arbitration core for EFR32-class radios.
//!
//! Mediates access to a shared radio medium between the local radio and an
//! external packet traffic arbiter over a small set of GPIO lines
//! (REQUEST, PRIORITY, GRANT, RADIO_HOLD_OFF, PHY_SELECT, PWM_REQUEST),
//! with an optional hardware-timed directional-priority pulse on PRIORITY.
//!
//! The crate is chip-agnostic: all hardware access goes through the
//! [`CoexPin`] and [`DpBackend`] traits, one implementation per hardware
//! generation.
#![cfg_attr(not(test), no_std)]

// This mod MUST go first, so that the others see its macros.
pub(crate) mod fmt;

mod arbiter;
mod dp;
mod gpio;

pub use arbiter::*;
pub use dp::*;
pub use gpio::*;

#[cfg(test)]
pub(crate) mod mock;
