//! In-memory hardware backends for host tests.

use std::cell::{Ref, RefCell};
use std::rc::Rc;

use crate::dp::{DpBackend, PrsChain};
use crate::gpio::{CoexPin, PinMode};

#[derive(Default)]
pub(crate) struct PinState {
    pub input: bool,
    pub output: bool,
    pub mode: Option<PinMode>,
    pub int_rising: bool,
    pub int_falling: bool,
    pub int_enabled: bool,
    pub int_flag: bool,
    /// Register writes performed through the `CoexPin` interface.
    pub writes: usize,
}

#[derive(Clone, Default)]
pub(crate) struct MockPin(pub Rc<RefCell<PinState>>);

impl MockPin {
    pub fn new() -> Self {
        MockPin::default()
    }

    pub fn state(&self) -> Ref<'_, PinState> {
        self.0.borrow()
    }

    /// Drive the simulated input level, as the external arbiter would.
    pub fn set_input(&self, level: bool) {
        self.0.borrow_mut().input = level;
    }

    /// Force the output latch without going through the pin interface.
    pub fn set_raw_output(&self, level: bool) {
        self.0.borrow_mut().output = level;
    }
}

impl CoexPin for MockPin {
    fn set_mode(&mut self, mode: PinMode, level: bool) {
        let mut state = self.0.borrow_mut();
        state.mode = Some(mode);
        state.output = level;
        state.writes += 1;
    }

    fn set_output(&mut self, level: bool) {
        let mut state = self.0.borrow_mut();
        state.output = level;
        state.writes += 1;
    }

    fn output(&self) -> bool {
        self.0.borrow().output
    }

    fn input(&self) -> bool {
        self.0.borrow().input
    }

    fn configure_interrupt(&mut self, rising: bool, falling: bool, enable: bool) {
        let mut state = self.0.borrow_mut();
        state.int_rising = rising;
        state.int_falling = falling;
        state.int_enabled = enable;
        state.writes += 1;
    }

    fn disable_interrupt(&mut self) {
        let mut state = self.0.borrow_mut();
        state.int_enabled = false;
        state.writes += 1;
    }

    fn set_interrupt_flag(&mut self) {
        let mut state = self.0.borrow_mut();
        state.int_flag = true;
        state.writes += 1;
    }

    fn clear_interrupt_flag(&mut self) {
        let mut state = self.0.borrow_mut();
        state.int_flag = false;
        state.writes += 1;
    }
}

pub(crate) struct DpState {
    pub freq_hz: u32,
    pub enables: Vec<bool>,
    pub programmed: Vec<u32>,
    pub chains: Vec<PrsChain>,
    pub routes: Vec<bool>,
    pub edges_masked: usize,
    /// Register writes performed through the `DpBackend` interface.
    pub writes: usize,
    pub program_ok: bool,
    pub route_ok: bool,
}

#[derive(Clone)]
pub(crate) struct MockDp(pub Rc<RefCell<DpState>>);

impl MockDp {
    pub fn new(freq_hz: u32) -> Self {
        MockDp(Rc::new(RefCell::new(DpState {
            freq_hz,
            enables: Vec::new(),
            programmed: Vec::new(),
            chains: Vec::new(),
            routes: Vec::new(),
            edges_masked: 0,
            writes: 0,
            program_ok: true,
            route_ok: true,
        })))
    }

    pub fn state(&self) -> Ref<'_, DpState> {
        self.0.borrow()
    }
}

impl DpBackend for MockDp {
    fn timer_frequency(&self) -> u32 {
        self.0.borrow().freq_hz
    }

    fn enable_timer(&mut self, enabled: bool) {
        let mut state = self.0.borrow_mut();
        state.enables.push(enabled);
        state.writes += 1;
    }

    fn program_timer(&mut self, ticks: u32) -> bool {
        let mut state = self.0.borrow_mut();
        if !state.program_ok {
            return false;
        }
        state.programmed.push(ticks);
        state.writes += 1;
        true
    }

    fn select_chain(&mut self, chain: PrsChain) {
        let mut state = self.0.borrow_mut();
        state.chains.push(chain);
        state.writes += 1;
    }

    fn disable_edge_interrupts(&mut self) {
        let mut state = self.0.borrow_mut();
        state.edges_masked += 1;
        state.writes += 1;
    }

    fn connect_priority_output(&mut self, shared: bool) -> bool {
        let mut state = self.0.borrow_mut();
        if !state.route_ok {
            return false;
        }
        state.routes.push(shared);
        state.writes += 1;
        true
    }
}
