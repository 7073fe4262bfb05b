use core::cell::RefCell;

use efr32_coex::{
    Coex, CoexPin, Events, Options, RandomDelay, Request, RequestCallback, RequestKind,
};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use rand_core::RngCore;

/// Scope of a forced transmit stop, mirroring the radio driver's stop modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TxStopMode {
    /// Stop a scheduled transmit that has not started yet.
    Pending,
    /// Stop the active in-flight transmit.
    Active,
    /// Stop both.
    All,
}

/// Radio driver operations the adapter needs.
pub trait CoexRadio {
    /// Force-stop a transmit. The driver ignores this if the radio is idle.
    fn stop_tx(&mut self, mode: TxStopMode);
    /// Mirror the coexistence-mandated hold-off state into the driver.
    fn enable_tx_hold_off(&mut self, enabled: bool);
}

/// Free-running microsecond clock (the radio driver's time base).
pub trait CoexClock {
    fn now_us(&self) -> u32;
}

/// Randomized contention backoff: a masked 16-bit draw from the PRNG, spun
/// down against the microsecond clock.
///
/// The spin is bounded by `mask_us` and wraparound-safe. Task context only;
/// the arbitration core never invokes it from an edge handler.
pub struct RandomBackoff<C, G> {
    clock: C,
    rng: G,
}

impl<C, G> RandomBackoff<C, G> {
    pub fn new(clock: C, rng: G) -> Self {
        RandomBackoff { clock, rng }
    }
}

impl<C: CoexClock, G: RngCore> RandomDelay for RandomBackoff<C, G> {
    fn random_delay(&mut self, mask_us: u16) {
        let start = self.clock.now_us();
        let delay = self.rng.next_u32() as u16 & mask_us;
        while (self.clock.now_us().wrapping_sub(start) as u16) < delay {}
    }
}

/// The BLE-facing coexistence layer.
///
/// Owns the radio seam and the arbitration context; the three request slots
/// (TX, RX, software-triggered) are independent and combined by the core.
pub struct BleCoex<R, P, C, G> {
    radio: R,
    coex: Coex<P, RandomBackoff<C, G>>,
}

impl<R: CoexRadio, P: CoexPin, C: CoexClock, G: RngCore> BleCoex<R, P, C, G> {
    pub fn new(radio: R, clock: C, rng: G) -> Self {
        BleCoex {
            radio,
            coex: Coex::new(RandomBackoff::new(clock, rng)),
        }
    }

    /// The underlying arbitration context, for signal binding and options.
    pub fn coex(&mut self) -> &mut Coex<P, RandomBackoff<C, G>> {
        &mut self.coex
    }

    /// Completes setup; call once all signals are bound.
    pub fn init(&mut self) {
        self.coex.init();
    }

    /// Request (or release) the medium for a transmit.
    pub fn set_tx_request(&mut self, req: Request, cb: Option<RequestCallback>) -> bool {
        self.coex.set_request(RequestKind::Tx, req, cb)
    }

    /// Request (or release) the medium for a receive.
    pub fn set_rx_request(&mut self, req: Request, cb: Option<RequestCallback>) -> bool {
        self.coex.set_request(RequestKind::Rx, req, cb)
    }

    /// Software-triggered coexistence request.
    pub fn set_sw_request(&mut self, req: Request, cb: Option<RequestCallback>) -> bool {
        self.coex.set_request(RequestKind::Sw, req, cb)
    }

    /// Call from the shared REQUEST line's GPIO interrupt handler.
    pub fn on_request_isr(&mut self) {
        let events = self.coex.on_request_edge();
        self.dispatch(events);
    }

    /// Call from the GRANT line's GPIO interrupt handler.
    pub fn on_grant_isr(&mut self) {
        let events = self.coex.on_grant_edge();
        self.dispatch(events);
    }

    /// Call from the RADIO_HOLD_OFF line's GPIO interrupt handler.
    pub fn on_rho_isr(&mut self) {
        let events = self.coex.on_rho_edge();
        self.dispatch(events);
    }

    fn dispatch(&mut self, events: Events) {
        if events.contains(Events::GRANT_RELEASED)
            && self.coex.options().contains(Options::TX_ABORT)
            && self.coex.request_state(RequestKind::Tx).is_on()
        {
            // Grant loss must stop the transmit before the arbiter acts
            // unilaterally. The stop is ignored if the radio went idle.
            warn!("coex: grant released mid-tx, aborting");
            self.coex.set_request(RequestKind::Tx, Request::OFF, None);
            self.radio.stop_tx(TxStopMode::Active);
        }
        if events.contains(Events::HOLDOFF_CHANGED) {
            let held = self.coex.options().contains(Options::HOLDOFF_ACTIVE);
            self.radio.enable_tx_hold_off(held);
        }
    }
}

/// A [`BleCoex`] behind a critical-section mutex, so the GPIO interrupt
/// handlers and task code can share one instance through a static.
pub struct SharedBleCoex<R, P, C, G> {
    inner: Mutex<CriticalSectionRawMutex, RefCell<Option<BleCoex<R, P, C, G>>>>,
}

impl<R: CoexRadio, P: CoexPin, C: CoexClock, G: RngCore> SharedBleCoex<R, P, C, G> {
    pub const fn new() -> Self {
        SharedBleCoex {
            inner: Mutex::new(RefCell::new(None)),
        }
    }

    /// Install the adapter instance, replacing any previous one.
    pub fn set(&self, coex: BleCoex<R, P, C, G>) {
        self.inner.lock(|cell| *cell.borrow_mut() = Some(coex));
    }

    /// Run `f` on the installed adapter; `None` before [`SharedBleCoex::set`].
    pub fn with<T>(&self, f: impl FnOnce(&mut BleCoex<R, P, C, G>) -> T) -> Option<T> {
        self.inner.lock(|cell| cell.borrow_mut().as_mut().map(f))
    }

    pub fn on_request_isr(&self) {
        self.with(|coex| coex.on_request_isr());
    }

    pub fn on_grant_isr(&self) {
        self.with(|coex| coex.on_grant_isr());
    }

    pub fn on_rho_isr(&self) {
        self.with(|coex| coex.on_rho_isr());
    }
}

impl<R: CoexRadio, P: CoexPin, C: CoexClock, G: RngCore> Default for SharedBleCoex<R, P, C, G> {
    fn default() -> Self {
        Self::new()
    }
}
