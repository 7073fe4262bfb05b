//! Logical coexistence signal binding.
//!
//! Each PTA signal is bound to one physical pin with an assertion polarity,
//! and all reads and writes are normalized so the rest of the stack only
//! deals in asserted/deasserted. An unbound signal is not an error: every
//! operation on it degrades to a no-op or the caller's default, so each
//! coexistence line is independently optional.

use core::ops::{BitOr, BitOrAssign};

/// Drive mode applied to a bound pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PinMode {
    /// Actively driven both ways.
    PushPull,
    /// Open drain with pull-down; for active-high shared lines.
    WiredOr,
    /// Open source with pull-up; for active-low shared lines.
    WiredAnd,
    /// Input with a pull to the deasserted level.
    InputPull,
}

/// Per-signal option bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct GpioOptions(u8);

impl GpioOptions {
    pub const NONE: GpioOptions = GpioOptions(0);
    /// The line is shared with other requesters (wired-or / wired-and).
    pub const SHARED: GpioOptions = GpioOptions(1 << 0);
    /// The line is driven by this device.
    pub const OUTPUT: GpioOptions = GpioOptions(1 << 1);
    /// Interrupt on the asserting edge.
    pub const INT_ASSERTED: GpioOptions = GpioOptions(1 << 2);
    /// Interrupt on the deasserting edge.
    pub const INT_DEASSERTED: GpioOptions = GpioOptions(1 << 3);
    /// Drive the line asserted as soon as it is configured.
    pub const DEFAULT_ASSERTED: GpioOptions = GpioOptions(1 << 4);

    pub const fn contains(self, other: GpioOptions) -> bool {
        (self.0 & other.0) == other.0
    }
}

impl BitOr for GpioOptions {
    type Output = GpioOptions;

    fn bitor(self, rhs: GpioOptions) -> GpioOptions {
        GpioOptions(self.0 | rhs.0)
    }
}

impl BitOrAssign for GpioOptions {
    fn bitor_assign(&mut self, rhs: GpioOptions) {
        self.0 |= rhs.0;
    }
}

/// Raw pin operations the signal binder needs from a hardware target.
///
/// All methods must be callable from interrupt context.
pub trait CoexPin {
    /// Apply a drive mode, keeping `level` on the output latch.
    fn set_mode(&mut self, mode: PinMode, level: bool);
    /// Write the output latch. A single register write on real hardware.
    fn set_output(&mut self, level: bool);
    /// Read back the output latch.
    fn output(&self) -> bool;
    /// Read the input level.
    fn input(&self) -> bool;
    /// Select edge sensing and arm or disarm the pin's interrupt line.
    fn configure_interrupt(&mut self, rising: bool, falling: bool, enable: bool);
    /// Mask the pin's interrupt line.
    fn disable_interrupt(&mut self);
    /// Latch the interrupt flag from software.
    fn set_interrupt_flag(&mut self);
    /// Clear a pending interrupt flag.
    fn clear_interrupt_flag(&mut self);
}

/// A logical coexistence signal bound to a physical pin.
pub struct Signal<P> {
    pin: P,
    polarity: bool,
    options: GpioOptions,
}

impl<P: CoexPin> Signal<P> {
    /// Bind `pin` with the given assertion polarity (`true` = active high).
    pub fn new(pin: P, polarity: bool) -> Self {
        Signal {
            pin,
            polarity,
            options: GpioOptions::NONE,
        }
    }

    /// Apply signal options: derive the drive mode and drive the default
    /// level. Mode change and default-level write are one atomic sequence,
    /// so a preempting ISR never sees a half-configured signal.
    pub fn configure(&mut self, options: GpioOptions) {
        let mode = if options.contains(GpioOptions::SHARED) {
            if self.polarity {
                PinMode::WiredOr
            } else {
                PinMode::WiredAnd
            }
        } else if options.contains(GpioOptions::OUTPUT) {
            PinMode::PushPull
        } else {
            PinMode::InputPull
        };
        critical_section::with(|_| {
            let level = self.pin.output();
            self.pin.set_mode(mode, level);
            self.options = options;
            self.set(options.contains(GpioOptions::DEFAULT_ASSERTED));
        });
    }

    /// Drive the line to `asserted` under the configured polarity.
    pub fn set(&mut self, asserted: bool) {
        self.pin.set_output(asserted == self.polarity);
    }

    /// Latch or clear the signal's interrupt flag from software.
    pub fn set_flag(&mut self, asserted: bool) {
        if asserted {
            self.pin.set_interrupt_flag();
        } else {
            self.pin.clear_interrupt_flag();
        }
    }

    /// Arm or disarm edge interrupts for the configured polarity.
    ///
    /// Arming first disarms sensing and clears any stale pending edge, so an
    /// event from a previous configuration is neither lost nor
    /// double-counted; `was_asserted` is reset for the same reason.
    pub fn enable_interrupt(&mut self, enabled: bool, was_asserted: Option<&mut bool>) {
        if enabled {
            self.pin.configure_interrupt(false, false, false);
            self.pin.clear_interrupt_flag();
            if let Some(was_asserted) = was_asserted {
                *was_asserted = false;
            }
            let int_asserted = self.options.contains(GpioOptions::INT_ASSERTED);
            let int_deasserted = self.options.contains(GpioOptions::INT_DEASSERTED);
            let (rising, falling) = if self.polarity {
                (int_asserted, int_deasserted)
            } else {
                (int_deasserted, int_asserted)
            };
            self.pin.configure_interrupt(rising, falling, true);
        } else {
            self.pin.disable_interrupt();
            self.pin.clear_interrupt_flag();
        }
    }

    /// Polarity-normalized input read.
    pub fn is_in_set(&self) -> bool {
        self.pin.input() == self.polarity
    }

    /// Polarity-normalized output-latch read.
    pub fn is_out_set(&self) -> bool {
        self.pin.output() == self.polarity
    }

    pub(crate) fn options(&self) -> GpioOptions {
        self.options
    }
}

pub(crate) fn set<P: CoexPin>(signal: &mut Option<Signal<P>>, asserted: bool) {
    if let Some(signal) = signal {
        signal.set(asserted);
    }
}

pub(crate) fn set_flag<P: CoexPin>(signal: &mut Option<Signal<P>>, asserted: bool) {
    if let Some(signal) = signal {
        signal.set_flag(asserted);
    }
}

pub(crate) fn enable_interrupt<P: CoexPin>(
    signal: &mut Option<Signal<P>>,
    enabled: bool,
    was_asserted: Option<&mut bool>,
) {
    if let Some(signal) = signal {
        signal.enable_interrupt(enabled, was_asserted);
    }
}

pub(crate) fn is_in_set<P: CoexPin>(signal: &Option<Signal<P>>, default: bool) -> bool {
    signal.as_ref().map_or(default, |signal| signal.is_in_set())
}

pub(crate) fn is_out_set<P: CoexPin>(signal: &Option<Signal<P>>, default: bool) -> bool {
    signal.as_ref().map_or(default, |signal| signal.is_out_set())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockPin;

    #[test]
    fn set_is_normalized_by_polarity() {
        let pin = MockPin::new();
        let mut active_high = Signal::new(pin.clone(), true);
        active_high.set(true);
        assert!(pin.state().output);
        active_high.set(false);
        assert!(!pin.state().output);

        let pin = MockPin::new();
        let mut active_low = Signal::new(pin.clone(), false);
        active_low.set(true);
        assert!(!pin.state().output);
        active_low.set(false);
        assert!(pin.state().output);
    }

    #[test]
    fn reads_are_normalized_by_polarity() {
        for polarity in [false, true] {
            let pin = MockPin::new();
            let signal = Signal::new(pin.clone(), polarity);
            for raw in [false, true] {
                pin.set_input(raw);
                pin.set_raw_output(raw);
                assert_eq!(signal.is_in_set(), raw == polarity);
                assert_eq!(signal.is_out_set(), raw == polarity);
            }
        }
    }

    #[test]
    fn configure_derives_drive_mode() {
        let cases = [
            (GpioOptions::SHARED, true, PinMode::WiredOr),
            (GpioOptions::SHARED, false, PinMode::WiredAnd),
            (GpioOptions::OUTPUT, true, PinMode::PushPull),
            (GpioOptions::NONE, true, PinMode::InputPull),
        ];
        for (options, polarity, mode) in cases {
            let pin = MockPin::new();
            let mut signal = Signal::new(pin.clone(), polarity);
            signal.configure(options);
            assert_eq!(pin.state().mode, Some(mode));
        }
    }

    #[test]
    fn configure_drives_default_level() {
        let pin = MockPin::new();
        let mut signal = Signal::new(pin.clone(), true);
        signal.configure(GpioOptions::OUTPUT | GpioOptions::DEFAULT_ASSERTED);
        assert!(pin.state().output);

        let pin = MockPin::new();
        let mut signal = Signal::new(pin.clone(), false);
        signal.configure(GpioOptions::OUTPUT);
        // Deasserted on an active-low line means driven high.
        assert!(pin.state().output);
    }

    #[test]
    fn arming_clears_stale_edge_and_primes_polarity_edges() {
        let pin = MockPin::new();
        pin.0.borrow_mut().int_flag = true;
        let mut signal = Signal::new(pin.clone(), true);
        signal.configure(GpioOptions::INT_ASSERTED);
        let mut was_asserted = true;
        signal.enable_interrupt(true, Some(&mut was_asserted));
        assert!(!was_asserted);
        let state = pin.state();
        assert!(!state.int_flag);
        assert!(state.int_enabled);
        assert!(state.int_rising);
        assert!(!state.int_falling);
    }

    #[test]
    fn active_low_deassert_edge_is_rising() {
        let pin = MockPin::new();
        let mut signal = Signal::new(pin.clone(), false);
        signal.configure(GpioOptions::INT_DEASSERTED);
        signal.enable_interrupt(true, None);
        let state = pin.state();
        assert!(state.int_rising);
        assert!(!state.int_falling);
    }

    #[test]
    fn disarming_masks_and_clears() {
        let pin = MockPin::new();
        let mut signal = Signal::new(pin.clone(), true);
        signal.configure(GpioOptions::INT_ASSERTED | GpioOptions::INT_DEASSERTED);
        signal.enable_interrupt(true, None);
        pin.0.borrow_mut().int_flag = true;
        signal.enable_interrupt(false, None);
        let state = pin.state();
        assert!(!state.int_enabled);
        assert!(!state.int_flag);
    }

    #[test]
    fn unbound_signal_degrades_to_defaults() {
        let mut unbound: Option<Signal<MockPin>> = None;
        set(&mut unbound, true);
        set_flag(&mut unbound, true);
        let mut was_asserted = true;
        enable_interrupt(&mut unbound, true, Some(&mut was_asserted));
        assert!(was_asserted); // untouched: no signal to reset it for
        assert!(is_in_set(&unbound, true));
        assert!(!is_in_set(&unbound, false));
        assert!(!is_out_set(&unbound, false));
    }
}
