//! # Scheduler Statistics
//!
//! Idle-time sampling and CPU-utilization estimation.
//!
//! Each core's idle task runs [`idle_hook`] whenever nothing else is
//! runnable there, bumping that core's counter. A calibration pass,
//! taken before any workload exists, records how many increments one
//! sampling interval produces on an otherwise idle core; afterwards the
//! utilization monitor drains the counters every interval and reports
//!
//! ```text
//! idle = min(1, count / baseline)
//! busy = 100 × (1 − idle)
//! ```
//!
//! The estimate assumes the baseline stays valid for the whole run: any
//! background load that appears after calibration reads as workload.
//!
//! All cross-context state is single-word atomics: one writer path per
//! counter (its core's idle task) and one reader (the monitor), so
//! increments and drains are linearizable without a lock.

use core::fmt;
use core::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

use crate::config::{ms_to_ticks, NUM_CORES};
use crate::kernel::Kernel;
use crate::observe::{Observation, ObservationSink};
use crate::task::{CoreId, TaskId};

// ---------------------------------------------------------------------------
// Statistics context
// ---------------------------------------------------------------------------

/// Per-core idle counters and calibrated baselines.
pub struct SchedStats {
    idle: [AtomicU32; NUM_CORES],
    baseline: [AtomicU32; NUM_CORES],
}

/// Process-wide statistics, living as long as the firmware.
pub static SCHED_STATS: SchedStats = SchedStats::new();

impl SchedStats {
    /// Zeroed counters; baselines start at the floor of 1.
    pub const fn new() -> Self {
        Self {
            idle: [const { AtomicU32::new(0) }; NUM_CORES],
            baseline: [const { AtomicU32::new(1) }; NUM_CORES],
        }
    }

    /// Count one idle pass on `core`. Wait-free.
    #[inline]
    pub fn record_idle(&self, core: CoreId) {
        if let Some(counter) = self.idle.get(core) {
            counter.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Read and zero `core`'s idle counter in one step.
    #[inline]
    pub fn drain(&self, core: CoreId) -> u32 {
        self.idle[core].swap(0, Ordering::Relaxed)
    }

    /// Zero every idle counter.
    pub fn reset_all(&self) {
        for counter in &self.idle {
            counter.store(0, Ordering::Relaxed);
        }
    }

    /// Store `measured` as `core`'s baseline, floored to 1. Returns the
    /// stored value.
    pub fn set_baseline(&self, core: CoreId, measured: u32) -> u32 {
        let baseline = measured.max(1);
        self.baseline[core].store(baseline, Ordering::Relaxed);
        baseline
    }

    /// Calibrated idle increments per sampling interval on `core`. Never 0.
    #[inline]
    pub fn baseline(&self, core: CoreId) -> u32 {
        self.baseline[core].load(Ordering::Relaxed)
    }
}

impl Default for SchedStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Idle hook registered with the kernel: counts one idle pass on `core`.
pub fn idle_hook(core: CoreId) {
    SCHED_STATS.record_idle(core);
}

// ---------------------------------------------------------------------------
// Calibration
// ---------------------------------------------------------------------------

/// Measure each core's idle increment rate with no workload running.
///
/// Zeroes the counters, sleeps for `interval_ms` so the idle tasks get
/// every core to themselves, then drains the counters into the baselines.
/// Must run before any workload task is created.
pub fn calibrate<K, S>(kernel: &K, stats: &SchedStats, sink: &S, interval_ms: u32) -> [u32; NUM_CORES]
where
    K: Kernel,
    S: ObservationSink,
{
    sink.emit(&Observation::Calibrating { interval_ms });

    stats.reset_all();
    kernel.delay(ms_to_ticks(interval_ms));

    let mut baselines = [0; NUM_CORES];
    for (core, slot) in baselines.iter_mut().enumerate() {
        let measured = stats.drain(core);
        *slot = stats.set_baseline(core, measured);
        sink.emit(&Observation::Calibrated {
            core,
            baseline: *slot,
        });
    }
    baselines
}

// ---------------------------------------------------------------------------
// Utilization estimate
// ---------------------------------------------------------------------------

/// Busy share in tenths of a percent, always within `0..=1000`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct BusyPermille(u16);

impl BusyPermille {
    pub const IDLE: Self = Self(0);
    pub const FULL: Self = Self(1000);

    /// Clamp `permille` into range.
    pub const fn new(permille: u16) -> Self {
        if permille > 1000 {
            Self::FULL
        } else {
            Self(permille)
        }
    }

    /// Busy share of an interval in which the idle hook ran `count` times
    /// against a calibrated `baseline`.
    pub fn from_idle(count: u32, baseline: u32) -> Self {
        let baseline = baseline.max(1) as u64;
        let count = (count as u64).min(baseline);
        // Round the idle share to the nearest tenth of a percent.
        let idle = (count * 1000 + baseline / 2) / baseline;
        Self::new(1000u16.saturating_sub(idle as u16))
    }

    #[inline]
    pub const fn permille(self) -> u16 {
        self.0
    }

    /// Whole percent, rounded down.
    #[inline]
    pub const fn percent(self) -> u8 {
        (self.0 / 10) as u8
    }
}

impl fmt::Display for BusyPermille {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}%", self.0 / 10, self.0 % 10)
    }
}

/// One core's result for one sampling interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Utilization {
    pub core: CoreId,
    /// Idle passes counted during the interval.
    pub idle_count: u32,
    /// Calibrated idle passes of a fully idle interval.
    pub baseline: u32,
    pub busy: BusyPermille,
}

impl Utilization {
    #[inline]
    pub fn busy(&self) -> BusyPermille {
        self.busy
    }
}

/// Turns drained idle counts into per-core utilization.
pub struct UtilizationEstimator<'a> {
    stats: &'a SchedStats,
}

impl<'a> UtilizationEstimator<'a> {
    pub const fn new(stats: &'a SchedStats) -> Self {
        Self { stats }
    }

    /// Drain every core's counter and compute its utilization for the
    /// interval that just ended.
    pub fn sample(&self) -> [Utilization; NUM_CORES] {
        core::array::from_fn(|core| {
            let idle_count = self.stats.drain(core);
            let baseline = self.stats.baseline(core);
            Utilization {
                core,
                idle_count,
                baseline,
                busy: BusyPermille::from_idle(idle_count, baseline),
            }
        })
    }

    /// Sleep one interval, then sample and emit one observation per core.
    pub fn run_interval<K, S>(&self, kernel: &K, sink: &S, interval_ms: u32) -> [Utilization; NUM_CORES]
    where
        K: Kernel,
        S: ObservationSink,
    {
        kernel.delay(ms_to_ticks(interval_ms));
        let sample = self.sample();
        for u in &sample {
            sink.emit(&Observation::Utilization(*u));
        }
        sample
    }

    /// Discard idle passes counted before monitoring starts, so the first
    /// interval covers only the monitor's own sleep.
    pub fn start(&self) {
        self.stats.reset_all();
    }

    /// Body of the utilization monitor task. Never returns.
    pub fn run<K, S>(&self, kernel: &K, sink: &S, interval_ms: u32) -> !
    where
        K: Kernel,
        S: ObservationSink,
    {
        self.start();
        loop {
            self.run_interval(kernel, sink, interval_ms);
        }
    }
}

// ---------------------------------------------------------------------------
// Task-switch monitor
// ---------------------------------------------------------------------------

const NO_TASK: usize = usize::MAX;

/// Last task seen running on each core.
///
/// Busy workloads poll it while they spin so the log shows who actually
/// held each core.
pub struct SwitchMonitor {
    last: [AtomicUsize; NUM_CORES],
}

/// Process-wide monitor shared by every workload.
pub static SWITCH_MONITOR: SwitchMonitor = SwitchMonitor::new();

impl SwitchMonitor {
    pub const fn new() -> Self {
        Self {
            last: [const { AtomicUsize::new(NO_TASK) }; NUM_CORES],
        }
    }

    /// Record `task` as running on `core`. Returns `true` when it differs
    /// from the previously recorded task.
    #[inline]
    pub fn observe(&self, core: CoreId, task: TaskId) -> bool {
        match self.last.get(core) {
            Some(last) => last.swap(task, Ordering::Relaxed) != task,
            None => false,
        }
    }

    /// Observe the caller and emit a `Running` record on change.
    pub fn check<K, S>(&self, kernel: &K, sink: &S)
    where
        K: Kernel,
        S: ObservationSink,
    {
        let core = kernel.core_id();
        let task = kernel.current_task();
        if self.observe(core, task) {
            sink.emit(&Observation::Running {
                tick: kernel.tick_count(),
                core,
                task: kernel.task_name(task),
            });
        }
    }
}

impl Default for SwitchMonitor {
    fn default() -> Self {
        Self::new()
    }
}
