//! Request/grant arbitration against an external packet traffic arbiter.
//!
//! The [`Coex`] context owns one optional binding per logical PTA line and
//! three requester slots (TX, RX, software-triggered). Task-context code
//! stores requests through [`Coex::set_request`]; the user's GPIO interrupt
//! handlers call the `on_*_edge` methods and dispatch the returned
//! [`Events`] to the protocol adapter.

use core::ops::{BitOr, BitOrAssign};

use crate::gpio::{self, CoexPin, GpioOptions, Signal};

/// A requester's desired state.
///
/// `ON` may be combined with `PRIORITY`, `FORCED` and `PWM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Request(u8);

impl Request {
    /// No request.
    pub const OFF: Request = Request(0);
    /// Request the medium.
    pub const ON: Request = Request(1 << 0);
    /// Signal urgency on the PRIORITY line.
    pub const PRIORITY: Request = Request(1 << 1);
    /// Skip the randomized backoff on shared request lines.
    pub const FORCED: Request = Request(1 << 2);
    /// Use the low-duty-cycle PWM request line instead of REQUEST.
    pub const PWM: Request = Request(1 << 3);

    pub const fn contains(self, other: Request) -> bool {
        (self.0 & other.0) == other.0
    }

    /// Whether the medium is being requested at all.
    pub const fn is_on(self) -> bool {
        (self.0 & Request::ON.0) != 0
    }
}

impl BitOr for Request {
    type Output = Request;

    fn bitor(self, rhs: Request) -> Request {
        Request(self.0 | rhs.0)
    }
}

impl BitOrAssign for Request {
    fn bitor_assign(&mut self, rhs: Request) {
        self.0 |= rhs.0;
    }
}

/// Requester slots.
///
/// At most one TX and one RX request is active at a time per protocol
/// instance; `Sw` is the software-triggered override.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RequestKind {
    Tx = 0,
    Rx = 1,
    Sw = 2,
}

/// Fired when a slot's request has been granted.
pub type RequestCallback = fn(Request);

/// Engine option and status bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Options(u32);

impl Options {
    pub const NONE: Options = Options(0);
    /// Abort an in-flight TX when GRANT is withdrawn.
    pub const TX_ABORT: Options = Options(1 << 0);
    /// Status bit: the radio hold-off line is currently asserted.
    pub const HOLDOFF_ACTIVE: Options = Options(1 << 1);

    pub const fn contains(self, other: Options) -> bool {
        (self.0 & other.0) == other.0
    }

    fn set(&mut self, bits: Options, on: bool) {
        if on {
            self.0 |= bits.0;
        } else {
            self.0 &= !bits.0;
        }
    }
}

impl BitOr for Options {
    type Output = Options;

    fn bitor(self, rhs: Options) -> Options {
        Options(self.0 | rhs.0)
    }
}

impl BitOrAssign for Options {
    fn bitor_assign(&mut self, rhs: Options) {
        self.0 |= rhs.0;
    }
}

/// Events produced by the edge handlers, consumed synchronously by the
/// protocol adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Events(u8);

impl Events {
    pub const NONE: Events = Events(0);
    /// GRANT was withdrawn while a request was active.
    pub const GRANT_RELEASED: Events = Events(1 << 0);
    /// The radio hold-off state changed; `options()` carries the new level.
    pub const HOLDOFF_CHANGED: Events = Events(1 << 1);
    /// A peer released the shared REQUEST line.
    pub const REQUEST_RELEASED: Events = Events(1 << 2);

    pub const fn contains(self, other: Events) -> bool {
        (self.0 & other.0) == other.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for Events {
    type Output = Events;

    fn bitor(self, rhs: Events) -> Events {
        Events(self.0 | rhs.0)
    }
}

impl BitOrAssign for Events {
    fn bitor_assign(&mut self, rhs: Events) {
        self.0 |= rhs.0;
    }
}

/// Randomized backoff seam, used to jitter contention on shared lines.
///
/// Implementations busy-wait for at most the masked window and run in task
/// context with interrupts enabled; the engine never invokes this from an
/// edge handler.
pub trait RandomDelay {
    fn random_delay(&mut self, mask_us: u16);
}

/// No-op backoff for builds without a PRNG source.
pub struct NoBackoff;

impl RandomDelay for NoBackoff {
    fn random_delay(&mut self, _mask_us: u16) {}
}

#[derive(Clone, Copy, Default)]
struct Slot {
    req: Request,
    cb: Option<RequestCallback>,
}

/// The coexistence arbitration context.
///
/// Self-contained; multiple instances can coexist, one per radio.
pub struct Coex<P, D> {
    request: Option<Signal<P>>,
    pwm_request: Option<Signal<P>>,
    priority: Option<Signal<P>>,
    grant: Option<Signal<P>>,
    radio_holdoff: Option<Signal<P>>,
    phy_select: Option<Signal<P>>,
    slots: [Slot; 3],
    options: Options,
    random_delay_mask_us: u16,
    delay: D,
    granted: bool,
    initialized: bool,
}

impl<P: CoexPin, D: RandomDelay> Coex<P, D> {
    pub fn new(delay: D) -> Self {
        Coex {
            request: None,
            pwm_request: None,
            priority: None,
            grant: None,
            radio_holdoff: None,
            phy_select: None,
            slots: [Slot::default(); 3],
            options: Options::NONE,
            random_delay_mask_us: 0,
            delay,
            // With no GRANT line bound the medium counts as granted.
            granted: true,
            initialized: false,
        }
    }

    /// Marks configuration complete. Requests are rejected until this runs.
    pub fn init(&mut self) {
        self.initialized = true;
    }

    pub fn options(&self) -> Options {
        self.options
    }

    /// Replace the configuration options.
    ///
    /// `HOLDOFF_ACTIVE` mirrors the RADIO_HOLD_OFF line and cannot be forged
    /// from here.
    pub fn set_options(&mut self, options: Options) {
        let holdoff = self.options.contains(Options::HOLDOFF_ACTIVE);
        self.options = options;
        self.options.set(Options::HOLDOFF_ACTIVE, holdoff);
    }

    /// Window mask for the randomized backoff, in microseconds.
    pub fn set_random_delay_mask(&mut self, mask_us: u16) {
        self.random_delay_mask_us = mask_us;
    }

    /// Bind the REQUEST output. Returns false if already bound.
    pub fn config_request(&mut self, pin: P, polarity: bool, shared: bool) -> bool {
        if self.request.is_some() {
            warn!("coex: REQUEST already bound");
            return false;
        }
        let mut options = GpioOptions::OUTPUT;
        if shared {
            // On a shared line we must see peers release it.
            options |= GpioOptions::SHARED | GpioOptions::INT_DEASSERTED;
        }
        let mut signal = Signal::new(pin, polarity);
        signal.configure(options);
        if shared {
            signal.enable_interrupt(true, None);
        }
        self.request = Some(signal);
        true
    }

    /// Bind the low-duty-cycle PWM request output.
    pub fn config_pwm_request(&mut self, pin: P, polarity: bool, shared: bool) -> bool {
        if self.pwm_request.is_some() {
            warn!("coex: PWM_REQUEST already bound");
            return false;
        }
        let mut options = GpioOptions::OUTPUT;
        if shared {
            options |= GpioOptions::SHARED;
        }
        let mut signal = Signal::new(pin, polarity);
        signal.configure(options);
        self.pwm_request = Some(signal);
        true
    }

    /// Bind the PRIORITY output.
    pub fn config_priority(&mut self, pin: P, polarity: bool, shared: bool) -> bool {
        if self.priority.is_some() {
            warn!("coex: PRIORITY already bound");
            return false;
        }
        let mut options = GpioOptions::OUTPUT;
        if shared {
            options |= GpioOptions::SHARED;
        }
        let mut signal = Signal::new(pin, polarity);
        signal.configure(options);
        self.priority = Some(signal);
        true
    }

    /// Bind the GRANT input and prime its edge interrupts.
    pub fn config_grant(&mut self, pin: P, polarity: bool) -> bool {
        if self.grant.is_some() {
            warn!("coex: GRANT already bound");
            return false;
        }
        let mut signal = Signal::new(pin, polarity);
        signal.configure(GpioOptions::INT_ASSERTED | GpioOptions::INT_DEASSERTED);
        let mut was_asserted = false;
        signal.enable_interrupt(true, Some(&mut was_asserted));
        self.granted = signal.is_in_set();
        self.grant = Some(signal);
        true
    }

    /// Bind the RADIO_HOLD_OFF input and prime its edge interrupts.
    pub fn config_radio_holdoff(&mut self, pin: P, polarity: bool) -> bool {
        if self.radio_holdoff.is_some() {
            warn!("coex: RADIO_HOLD_OFF already bound");
            return false;
        }
        let mut signal = Signal::new(pin, polarity);
        signal.configure(GpioOptions::INT_ASSERTED | GpioOptions::INT_DEASSERTED);
        signal.enable_interrupt(true, None);
        let active = signal.is_in_set();
        self.options.set(Options::HOLDOFF_ACTIVE, active);
        self.radio_holdoff = Some(signal);
        true
    }

    /// Bind the PHY_SELECT input.
    pub fn config_phy_select(&mut self, pin: P, polarity: bool) -> bool {
        if self.phy_select.is_some() {
            warn!("coex: PHY_SELECT already bound");
            return false;
        }
        let mut signal = Signal::new(pin, polarity);
        signal.configure(GpioOptions::NONE);
        self.phy_select = Some(signal);
        true
    }

    /// Current request of a slot.
    pub fn request_state(&self, kind: RequestKind) -> Request {
        self.slots[kind as usize].req
    }

    /// Whether GRANT is currently asserted (true when no GRANT line is bound).
    pub fn is_granted(&self) -> bool {
        gpio::is_in_set(&self.grant, true)
    }

    /// PHY selection line level (false when unbound).
    pub fn is_phy_select_asserted(&self) -> bool {
        gpio::is_in_set(&self.phy_select, false)
    }

    /// Store a requester slot and mirror the combined request onto the PTA
    /// lines. Returns false until [`Coex::init`] has run.
    ///
    /// Asserting a first request on a shared REQUEST line currently held by
    /// a peer applies the randomized backoff, unless `FORCED`.
    pub fn set_request(
        &mut self,
        kind: RequestKind,
        req: Request,
        cb: Option<RequestCallback>,
    ) -> bool {
        if !self.initialized {
            return false;
        }
        // Backoff happens before the atomic section below: it busy-waits
        // with interrupts enabled.
        if req.is_on()
            && !self.combined().is_on()
            && !req.contains(Request::FORCED)
            && self.peer_holds_request()
        {
            let mask = self.random_delay_mask_us;
            self.delay.random_delay(mask);
        }
        let granted = critical_section::with(|_| {
            self.slots[kind as usize] = Slot { req, cb };
            self.apply_combined();
            self.granted
        });
        if granted && req.is_on() {
            if let Some(cb) = cb {
                cb(req);
            }
        }
        true
    }

    /// GRANT edge handler; call from the GRANT GPIO interrupt.
    pub fn on_grant_edge(&mut self) -> Events {
        let granted = gpio::is_in_set(&self.grant, true);
        if granted == self.granted {
            return Events::NONE;
        }
        self.granted = granted;
        if granted {
            for slot in self.slots {
                if slot.req.is_on() {
                    if let Some(cb) = slot.cb {
                        cb(slot.req);
                    }
                }
            }
            Events::NONE
        } else if self.combined().is_on() {
            Events::GRANT_RELEASED
        } else {
            Events::NONE
        }
    }

    /// RADIO_HOLD_OFF edge handler; call from the RHO GPIO interrupt.
    pub fn on_rho_edge(&mut self) -> Events {
        let active = gpio::is_in_set(&self.radio_holdoff, false);
        if active == self.options.contains(Options::HOLDOFF_ACTIVE) {
            return Events::NONE;
        }
        self.options.set(Options::HOLDOFF_ACTIVE, active);
        Events::HOLDOFF_CHANGED
    }

    /// REQUEST edge handler; call from the shared REQUEST line's interrupt.
    ///
    /// Re-asserts a pending local request once the peers have released the
    /// line. No backoff runs here: busy-waiting inside an interrupt handler
    /// is not allowed, and the contention jitter was already applied when
    /// the request was stored.
    pub fn on_request_edge(&mut self) -> Events {
        let combined = self.combined();
        if !combined.is_on() || self.peer_holds_request() {
            return Events::NONE;
        }
        self.apply_combined();
        Events::REQUEST_RELEASED
    }

    fn combined(&self) -> Request {
        self.slots.iter().fold(Request::OFF, |acc, slot| acc | slot.req)
    }

    /// Mirror the combined request onto REQUEST / PWM_REQUEST / PRIORITY.
    fn apply_combined(&mut self) {
        let combined = self.combined();
        let on = combined.is_on();
        let pwm = combined.contains(Request::PWM);
        gpio::set(&mut self.request, on && !pwm);
        gpio::set(&mut self.pwm_request, on && pwm);
        gpio::set(&mut self.priority, on && combined.contains(Request::PRIORITY));
    }

    fn peer_holds_request(&self) -> bool {
        match &self.request {
            Some(signal) => {
                signal.options().contains(GpioOptions::SHARED)
                    && signal.is_in_set()
                    && !signal.is_out_set()
            }
            None => false,
        }
    }
}
