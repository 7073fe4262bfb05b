//! Directional priority: pulse the PRIORITY line for RX requests, hold it
//! for the whole of a TX request, entirely in timer + PRS hardware.
//!
//! With a non-zero pulse width, PRIORITY is produced by a one-shot timer
//! retriggered by the REQUEST rising edge and combined with the TX LNA
//! enable through a three-stage PRS logic chain, so the pulse width is exact
//! in hardware time and immune to interrupt latency. A width of zero is the
//! sentinel for "no pulsing": a pass-through chain makes PRIORITY track the
//! request level directly.

const MICROSECONDS_PER_SECOND: u64 = 1_000_000;

/// PRS logic chain driving the PRIORITY output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PrsChain {
    /// PRIORITY follows the request level directly.
    PassThrough,
    /// PRIORITY = (REQUEST and timer active) or (REQUEST and TX LNA enabled).
    Pulsed,
}

/// Timer and PRS operations behind the pulse generator.
///
/// One implementation per hardware generation; the register layouts differ
/// enough that the variation lives behind this trait rather than in the
/// pulse logic.
pub trait DpBackend {
    /// Timer clock after prescaling, in Hz.
    fn timer_frequency(&self) -> u32;
    /// Start or stop the timer.
    fn enable_timer(&mut self, enabled: bool);
    /// Program the one-shot length: top, compare and counter, retriggered by
    /// a rising REQUEST edge. Returns false if the routing is unsupported.
    fn program_timer(&mut self, ticks: u32) -> bool;
    /// Select which PRS logic chain drives the PRIORITY output.
    fn select_chain(&mut self, chain: PrsChain);
    /// Mask the REQUEST/PRIORITY edge interrupt sources feeding the chain.
    fn disable_edge_interrupts(&mut self);
    /// Route the PRIORITY pin to the PRS output, wired-or when `shared`.
    /// Returns false if no route to the pin exists.
    fn connect_priority_output(&mut self, shared: bool) -> bool;
}

/// Directional-priority pulse generator.
pub struct DirectionalPriority<B> {
    backend: B,
    pulse_width_us: u8,
    initialized: bool,
}

impl<B: DpBackend> DirectionalPriority<B> {
    pub fn new(backend: B) -> Self {
        DirectionalPriority {
            backend,
            pulse_width_us: 0,
            initialized: false,
        }
    }

    /// One-time setup: masks the edge interrupts feeding the chain, routes
    /// the PRIORITY pin to the PRS output and applies `pulse_width_us`.
    pub fn configure(&mut self, pulse_width_us: u8, shared_priority: bool) -> bool {
        self.backend.disable_edge_interrupts();
        if !self.backend.connect_priority_output(shared_priority) {
            warn!("coex dp: no PRS route to the priority pin");
            return false;
        }
        self.set_pulse_width(pulse_width_us)
    }

    /// Apply a new pulse width in microseconds.
    ///
    /// Idempotent: re-applying the current width performs no hardware
    /// writes, so a redundant call cannot glitch an in-flight pulse. Width 0
    /// stops the timer and selects the pass-through chain.
    ///
    /// The stop/reprogram/restart sequence runs with interrupts disabled. A
    /// REQUEST edge arriving through the PRS fabric mid-sequence would still
    /// retrigger the one-shot with a stale top value, so reconfigure only
    /// while the radio is idle and REQUEST is deasserted.
    pub fn set_pulse_width(&mut self, pulse_width_us: u8) -> bool {
        if self.initialized && self.pulse_width_us == pulse_width_us {
            return true;
        }
        let ok = critical_section::with(|_| {
            if pulse_width_us == 0 {
                self.backend.enable_timer(false);
                self.backend.select_chain(PrsChain::PassThrough);
                return true;
            }
            let ticks = pulse_ticks(pulse_width_us, self.backend.timer_frequency());
            self.backend.enable_timer(false);
            if !self.backend.program_timer(ticks) {
                return false;
            }
            self.backend.enable_timer(true);
            self.backend.select_chain(PrsChain::Pulsed);
            true
        });
        if ok {
            self.initialized = true;
            self.pulse_width_us = pulse_width_us;
            trace!("coex dp: pulse width {}us", pulse_width_us);
        }
        ok
    }

    /// The last successfully applied pulse width.
    pub fn pulse_width(&self) -> u8 {
        self.pulse_width_us
    }
}

/// One-shot length for a pulse width, rounded up so a pulse is never short.
fn pulse_ticks(pulse_width_us: u8, timer_freq_hz: u32) -> u32 {
    ((pulse_width_us as u64 * timer_freq_hz as u64).div_ceil(MICROSECONDS_PER_SECOND)) as u32
}
