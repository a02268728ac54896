//! # Input Collaborator
//!
//! The board-facing side of the edge-triggered input: pin configuration,
//! level reads and interrupt registration. The harness only reads levels
//! and asks for a handler to be installed; pin multiplexing and register
//! access stay with the board.

use crate::error::Error;

/// Logical level of the input, after active-low inversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Asserted,
    Deasserted,
}

/// Internal pull resistor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pull {
    None,
    Up,
    Down,
}

/// Electrical edge that raises the interrupt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    Rising,
    Falling,
    Both,
}

/// How the board must set up the input pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputConfig {
    pub pin: u8,
    pub pull: Pull,
    pub edge: Edge,
    /// A low electrical level means Asserted.
    pub active_low: bool,
}

impl InputConfig {
    /// Push button to ground: pull-up, interrupt on the falling edge.
    pub const fn active_low_button(pin: u8) -> Self {
        Self {
            pin,
            pull: Pull::Up,
            edge: Edge::Falling,
            active_low: true,
        }
    }

    /// Map a raw electrical level to a logical one.
    #[inline]
    pub const fn level(&self, high: bool) -> Level {
        if high != self.active_low {
            Level::Asserted
        } else {
            Level::Deasserted
        }
    }
}

/// Reads the current level of an input.
pub trait InputPin {
    fn read_level(&self) -> Level;
}

/// Board services needed to turn a pin into an edge interrupt source.
pub trait EdgeInput {
    /// Configure `config.pin` as an input with the given pull and edge.
    fn configure_input(&mut self, config: &InputConfig) -> Result<(), Error>;

    /// Install `handler` for edges on `pin` and unmask the interrupt.
    /// `handler` runs in interrupt context.
    fn register_edge_interrupt(&mut self, pin: u8, handler: fn()) -> Result<(), Error>;
}

impl<P: InputPin + ?Sized> InputPin for &P {
    fn read_level(&self) -> Level {
        (**self).read_level()
    }
}
