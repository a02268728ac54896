//! # Errors
//!
//! Setup-time failures. Everything that can go wrong after the scheduler is
//! running (bounce, zero calibration counts, missed work deadlines) is
//! corrected locally and never surfaces here.

use crate::task::CoreId;

/// Resource-creation failure reported by the kernel or a collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// Every TCB slot is in use.
    #[error("task table full ({capacity} slots)")]
    TaskTableFull { capacity: usize },

    /// A task was pinned to a core the kernel does not schedule.
    #[error("core {core} does not exist")]
    InvalidAffinity { core: CoreId },

    /// A task asked for more stack than a TCB carries.
    #[error("stack budget {requested} exceeds {available} bytes")]
    StackBudget { requested: usize, available: usize },

    /// The input collaborator rejected the pin configuration.
    #[error("input configuration failed for pin {pin}")]
    InputConfig { pin: u8 },

    /// The edge interrupt handler could not be installed.
    #[error("edge interrupt registration failed for pin {pin}")]
    InterruptRegistration { pin: u8 },
}
