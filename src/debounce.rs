//! # Debounce Filter
//!
//! Consumer task of the edge interrupt. Each deferral token starts one
//! debounce pass:
//!
//! ```text
//!            token                    settle delay
//! Waiting ──────────► Confirming ─────────────────► sample 1
//!    ▲                (sample 0)                      │
//!    │                                                │
//!    ├──── both asserted: emit, hold until released ◄─┤
//!    └──── otherwise: drop silently ◄─────────────────┘
//! ```
//!
//! Two samples one settle delay apart are the whole algorithm; no history
//! is kept beyond them.

use crate::config::{ms_to_ticks, ticks_to_ms, Tick, HOLD_POLL_MS, SETTLE_DELAY_MS};
use crate::deferral::DeferralChannel;
use crate::input::{InputConfig, InputPin, Level};
use crate::kernel::Kernel;
use crate::observe::{Observation, ObservationSink};

/// Outcome of one debounce pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Confirmed,
    Rejected,
}

/// Confirm iff both samples read asserted.
#[inline]
pub fn decide(sample0: Level, sample1: Level) -> Decision {
    match (sample0, sample1) {
        (Level::Asserted, Level::Asserted) => Decision::Confirmed,
        _ => Decision::Rejected,
    }
}

/// State of the filter between two tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebounceState {
    /// Blocked on the deferral channel.
    Waiting,
    /// Sample 0 taken, settle delay running.
    Confirming { sample0: Level },
}

/// The two-state machine, without any timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Debouncer {
    state: DebounceState,
}

impl Debouncer {
    pub const fn new() -> Self {
        Self {
            state: DebounceState::Waiting,
        }
    }

    #[inline]
    pub fn state(&self) -> DebounceState {
        self.state
    }

    /// A token arrived and the input read `sample0`.
    pub fn on_signal(&mut self, sample0: Level) {
        self.state = DebounceState::Confirming { sample0 };
    }

    /// The settle delay passed and the input read `sample1`. `None` when no
    /// pass was in progress.
    pub fn on_settled(&mut self, sample1: Level) -> Option<Decision> {
        match self.state {
            DebounceState::Confirming { sample0 } => {
                self.state = DebounceState::Waiting;
                Some(decide(sample0, sample1))
            }
            DebounceState::Waiting => None,
        }
    }
}

impl Default for Debouncer {
    fn default() -> Self {
        Self::new()
    }
}

/// Timing of the filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebounceConfig {
    pub input: InputConfig,
    pub settle_ms: u32,
    pub hold_poll_ms: u32,
}

impl DebounceConfig {
    pub const fn new(input: InputConfig) -> Self {
        Self {
            input,
            settle_ms: SETTLE_DELAY_MS,
            hold_poll_ms: HOLD_POLL_MS,
        }
    }
}

/// Debounce filter bound to one input and its deferral channel.
pub struct DebounceFilter<'a, P> {
    channel: &'a DeferralChannel,
    pin: P,
    config: DebounceConfig,
    debouncer: Debouncer,
}

impl<'a, P: InputPin> DebounceFilter<'a, P> {
    pub fn new(channel: &'a DeferralChannel, pin: P, config: DebounceConfig) -> Self {
        Self {
            channel,
            pin,
            config,
            debouncer: Debouncer::new(),
        }
    }

    #[inline]
    pub fn state(&self) -> DebounceState {
        self.debouncer.state()
    }

    /// Wait up to `timeout` for a token, then run one pass. `None` on
    /// timeout.
    ///
    /// Only the edges taken at wait time belong to the pass. Edges that
    /// arrive while it runs stay pending and start the next pass.
    pub fn service_one<K, S>(&mut self, kernel: &K, sink: &S, timeout: Option<Tick>) -> Option<Decision>
    where
        K: Kernel,
        S: ObservationSink,
    {
        self.channel.wait(kernel, timeout)?;
        Some(self.pass(kernel, sink))
    }

    /// One debounce pass, starting from a fresh token.
    fn pass<K, S>(&mut self, kernel: &K, sink: &S) -> Decision
    where
        K: Kernel,
        S: ObservationSink,
    {
        self.debouncer.on_signal(self.pin.read_level());
        kernel.delay_ms(self.config.settle_ms);
        let decision = self
            .debouncer
            .on_settled(self.pin.read_level())
            .unwrap_or(Decision::Rejected);

        if decision == Decision::Confirmed {
            let pin = self.config.input.pin;
            let pressed = kernel.tick_count();
            sink.emit(&Observation::EdgeConfirmed { pin, tick: pressed });

            while self.pin.read_level() == Level::Asserted {
                kernel.delay(ms_to_ticks(self.config.hold_poll_ms).max(1));
            }
            let held_ms = ticks_to_ms(kernel.tick_count().saturating_sub(pressed));
            sink.emit(&Observation::Released { pin, held_ms });
        }
        decision
    }

    /// Body of the debounce task. Never returns.
    pub fn run<K, S>(&mut self, kernel: &K, sink: &S) -> !
    where
        K: Kernel,
        S: ObservationSink,
    {
        loop {
            self.service_one(kernel, sink, None);
        }
    }
}
