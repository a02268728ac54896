//! # Periodic Workloads
//!
//! Synthetic load for the preemption experiment. A workload task repeats
//! work/sleep cycles until the experiment window closes:
//!
//! ```text
//! loop {
//!     window elapsed?        ──► emit Stopping, return
//!     tick₀, µs₀             ◄── before
//!     emit WorkBegin
//!     busy_work_us(work_us)  ◄── spins, never sleeps, stays preemptible
//!     tick₁, µs₁             ◄── after
//!     emit WorkEnd           ◄── actual = µs₁ − µs₀, tick_diff = tick₁ − tick₀
//!     delay(sleep_ms)
//! }
//! ```
//!
//! `actual > intended` means the task was preempted or starved while it
//! spun; the excess is what the experiment measures.

use core::hint::spin_loop;

use crate::config::{ticks_to_ms, Tick};
use crate::kernel::Kernel;
use crate::observe::{Observation, ObservationSink};
use crate::stats::SwitchMonitor;
use crate::task::{CoreAffinity, TaskConfig};
use crate::window::ExperimentWindow;

// ---------------------------------------------------------------------------
// Busy-work emulator
// ---------------------------------------------------------------------------

/// Burn `us` microseconds of wall-clock time on the high-resolution clock.
///
/// Synthetic load: spins instead of sleeping, so the caller holds its core
/// and can only lose it to preemption. Only the clock is polled; no kernel
/// state is touched while spinning. Returns once at least `us` microseconds
/// have passed since the call.
pub fn busy_work_us<K: Kernel>(kernel: &K, us: u32) {
    let start = kernel.now_us();
    while kernel.now_us().saturating_sub(start) < us as u64 {
        spin_loop();
    }
}

// ---------------------------------------------------------------------------
// Descriptors and samples
// ---------------------------------------------------------------------------

/// One periodic workload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkloadDescriptor {
    pub name: &'static str,
    /// Intended busy time per cycle.
    pub work_us: u32,
    /// Sleep between two cycles.
    pub sleep_ms: u32,
    pub priority: u8,
    pub affinity: CoreAffinity,
    pub stack_bytes: usize,
}

impl WorkloadDescriptor {
    /// Kernel configuration of the task running this workload.
    pub const fn task_config(&self) -> TaskConfig {
        TaskConfig {
            name: self.name,
            priority: self.priority,
            affinity: self.affinity,
            stack_bytes: self.stack_bytes,
        }
    }
}

/// Clock readings around one work cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimingSample {
    pub tick_before: Tick,
    pub tick_after: Tick,
    pub us_before: u64,
    pub us_after: u64,
}

impl TimingSample {
    /// Wall-clock duration of the cycle.
    #[inline]
    pub fn actual_us(&self) -> u64 {
        self.us_after.saturating_sub(self.us_before)
    }

    /// Tick-based duration of the cycle, in milliseconds.
    #[inline]
    pub fn tick_diff_ms(&self) -> u64 {
        ticks_to_ms(self.tick_after.saturating_sub(self.tick_before))
    }
}

// ---------------------------------------------------------------------------
// Runner
// ---------------------------------------------------------------------------

/// A cycle between `begin_cycle` and `end_cycle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cycle {
    tick_before: Tick,
    us_before: u64,
}

/// Totals of a finished workload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub cycles: u32,
    /// Largest `actual - intended` over all cycles.
    pub max_excess_us: u64,
    pub total_excess_us: u64,
}

/// Bookkeeping of one workload, independent of how time passes.
///
/// [`run_periodic`] drives it from a real kernel; a simulation can drive it
/// from virtual clocks.
#[derive(Debug, Clone)]
pub struct PeriodicRunner {
    desc: WorkloadDescriptor,
    window: ExperimentWindow,
    summary: RunSummary,
}

impl PeriodicRunner {
    pub const fn new(desc: WorkloadDescriptor, window: ExperimentWindow) -> Self {
        Self {
            desc,
            window,
            summary: RunSummary {
                cycles: 0,
                max_excess_us: 0,
                total_excess_us: 0,
            },
        }
    }

    #[inline]
    pub fn descriptor(&self) -> &WorkloadDescriptor {
        &self.desc
    }

    /// Start a cycle at `tick` / `us`. Returns `None` once the window has
    /// elapsed; the caller must then [`stop`](Self::stop).
    pub fn begin_cycle<S: ObservationSink>(&mut self, tick: Tick, us: u64, sink: &S) -> Option<Cycle> {
        if self.window.is_elapsed(tick) {
            return None;
        }
        sink.emit(&Observation::WorkBegin {
            task: self.desc.name,
            tick,
            intended_us: self.desc.work_us,
            elapsed_ms: self.window.elapsed_ms(tick),
        });
        Some(Cycle {
            tick_before: tick,
            us_before: us,
        })
    }

    /// Finish `cycle` at `tick` / `us`.
    pub fn end_cycle<S: ObservationSink>(&mut self, cycle: Cycle, tick: Tick, us: u64, sink: &S) -> TimingSample {
        let sample = TimingSample {
            tick_before: cycle.tick_before,
            tick_after: tick,
            us_before: cycle.us_before,
            us_after: us,
        };
        let excess = sample.actual_us().saturating_sub(self.desc.work_us as u64);
        self.summary.cycles += 1;
        self.summary.max_excess_us = self.summary.max_excess_us.max(excess);
        self.summary.total_excess_us += excess;

        sink.emit(&Observation::WorkEnd {
            task: self.desc.name,
            sample,
            intended_us: self.desc.work_us,
            elapsed_before_ms: self.window.elapsed_ms(sample.tick_before),
            elapsed_after_ms: self.window.elapsed_ms(sample.tick_after),
        });
        sample
    }

    /// Emit the stopping record and return the totals.
    pub fn stop<S: ObservationSink>(&self, tick: Tick, sink: &S) -> RunSummary {
        sink.emit(&Observation::Stopping {
            task: self.desc.name,
            elapsed_ms: self.window.elapsed_ms(tick),
            cycles: self.summary.cycles,
        });
        self.summary
    }
}

/// Run work/sleep cycles of `desc` until `window` elapses.
///
/// With a `monitor`, the task reports which task it finds running on its
/// core at the start and end of every cycle. Returns after the stopping
/// record; the caller deletes the task.
pub fn run_periodic<K, S>(
    kernel: &K,
    desc: &WorkloadDescriptor,
    window: ExperimentWindow,
    sink: &S,
    monitor: Option<&SwitchMonitor>,
) -> RunSummary
where
    K: Kernel,
    S: ObservationSink,
{
    let mut runner = PeriodicRunner::new(*desc, window);
    loop {
        let tick = kernel.tick_count();
        let us = kernel.now_us();
        let Some(cycle) = runner.begin_cycle(tick, us, sink) else {
            return runner.stop(tick, sink);
        };

        if let Some(monitor) = monitor {
            monitor.check(kernel, sink);
        }
        busy_work_us(kernel, desc.work_us);
        if let Some(monitor) = monitor {
            monitor.check(kernel, sink);
        }

        let tick = kernel.tick_count();
        let us = kernel.now_us();
        runner.end_cycle(cycle, tick, us, sink);

        kernel.delay_ms(desc.sleep_ms);
    }
}
