//! # Observations
//!
//! Everything the harness reports goes through an [`ObservationSink`] as a
//! typed [`Observation`]. The default [`LogSink`] renders each record with
//! `Display` and hands it to the `log` facade under a per-kind target, so
//! the firmware's logger decides where lines end up.

use core::fmt;

use log::Level;

use crate::config::Tick;
use crate::error::Error;
use crate::stats::Utilization;
use crate::task::CoreId;
use crate::workload::TimingSample;

/// Log target of the workload and setup records.
pub const TAG: &str = "preempt_slice";
/// Log target of the utilization records.
pub const CPU_TAG: &str = "CPU";
/// Log target of the tick-rate banner.
pub const TICK_TAG: &str = "TickInfo";
/// Log target of the debounce records.
pub const BUTTON_TAG: &str = "button";

/// One structured record emitted by the harness.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Observation {
    /// Tick rate banner, emitted once at startup.
    TickInfo { tick_hz: u32, tick_us: u32 },
    /// Calibration started.
    Calibrating { interval_ms: u32 },
    /// Calibration finished for one core.
    Calibrated { core: CoreId, baseline: u32 },
    /// A workload cycle is about to burn `intended_us`.
    WorkBegin {
        task: &'static str,
        tick: Tick,
        intended_us: u32,
        elapsed_ms: u64,
    },
    /// A workload cycle finished.
    WorkEnd {
        task: &'static str,
        sample: TimingSample,
        intended_us: u32,
        elapsed_before_ms: u64,
        elapsed_after_ms: u64,
    },
    /// A workload task saw the window elapse and is deleting itself.
    Stopping {
        task: &'static str,
        elapsed_ms: u64,
        cycles: u32,
    },
    /// The task seen running on a core changed.
    Running {
        tick: Tick,
        core: CoreId,
        task: &'static str,
    },
    /// One core's utilization for one sampling interval.
    Utilization(Utilization),
    /// A debounced edge was confirmed.
    EdgeConfirmed { pin: u8, tick: Tick },
    /// A confirmed input returned to the unasserted level.
    Released { pin: u8, held_ms: u64 },
    /// Startup aborted.
    SetupFailed { what: &'static str, error: Error },
}

impl Observation {
    /// Log target for this record.
    pub fn tag(&self) -> &'static str {
        match self {
            Observation::TickInfo { .. } => TICK_TAG,
            Observation::Utilization(_) => CPU_TAG,
            Observation::EdgeConfirmed { .. } | Observation::Released { .. } => BUTTON_TAG,
            _ => TAG,
        }
    }

    /// Severity of this record.
    pub fn level(&self) -> Level {
        match self {
            Observation::SetupFailed { .. } => Level::Error,
            Observation::Running { .. } => Level::Debug,
            _ => Level::Info,
        }
    }
}

impl fmt::Display for Observation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Observation::TickInfo { tick_hz, tick_us } => {
                write!(f, "tick rate = {} Hz -> 1 tick = {} us", tick_hz, tick_us)
            }
            Observation::Calibrating { interval_ms } => write!(
                f,
                "calibrating idle hook for {} ms (no workload tasks yet)",
                interval_ms
            ),
            Observation::Calibrated { core, baseline } => write!(
                f,
                "calibration: core {} max idle count per interval = {}",
                core, baseline
            ),
            Observation::WorkBegin {
                task,
                tick,
                intended_us,
                elapsed_ms,
            } => write!(
                f,
                "[Tick {}] {} begin work (intended {} us) (global elapsed {} ms)",
                tick, task, intended_us, elapsed_ms
            ),
            Observation::WorkEnd {
                task,
                sample,
                intended_us,
                elapsed_before_ms,
                elapsed_after_ms,
            } => write!(
                f,
                "[Tick {} -> {} | Elapsed {} ms -> {} ms] {} end work: intended={} us, actual={} us, tick_diff={} ms",
                sample.tick_before,
                sample.tick_after,
                elapsed_before_ms,
                elapsed_after_ms,
                task,
                intended_us,
                sample.actual_us(),
                sample.tick_diff_ms()
            ),
            Observation::Stopping {
                task,
                elapsed_ms,
                cycles,
            } => write!(
                f,
                "{} stopping after {} ms ({} cycles)",
                task, elapsed_ms, cycles
            ),
            Observation::Running { tick, core, task } => {
                write!(f, "[Tick {}] core {} current running: {}", tick, core, task)
            }
            Observation::Utilization(u) => write!(
                f,
                "Core {}: idle_count={}, calibrated_max={} -> CPU util ~ {}",
                u.core,
                u.idle_count,
                u.baseline,
                u.busy()
            ),
            Observation::EdgeConfirmed { pin, tick } => {
                write!(f, "[Tick {}] pin {} pressed", tick, pin)
            }
            Observation::Released { pin, held_ms } => {
                write!(f, "pin {} released after {} ms", pin, held_ms)
            }
            Observation::SetupFailed { what, error } => {
                write!(f, "setup failed: {}: {}", what, error)
            }
        }
    }
}

/// Destination of observations. Fire-and-forget.
pub trait ObservationSink {
    fn emit(&self, observation: &Observation);
}

impl<S: ObservationSink + ?Sized> ObservationSink for &S {
    fn emit(&self, observation: &Observation) {
        (**self).emit(observation)
    }
}

/// Sink forwarding every observation to the `log` facade.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl ObservationSink for LogSink {
    fn emit(&self, observation: &Observation) {
        log::log!(target: observation.tag(), observation.level(), "{}", observation);
    }
}
