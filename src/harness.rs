//! # Harness Startup
//!
//! Wires the experiment together from inside the startup task:
//!
//! 1. Tick-rate banner
//! 2. Idle-hook calibration (no workload exists yet)
//! 3. Open the experiment window
//! 4. Utilization monitor, then every workload
//! 5. Input pin, debounce consumer, edge interrupt
//!
//! The first failure is reported through the sink and aborts the rest of
//! the setup; tasks already created keep running.

use crate::config::{
    tick_period_us, BUTTON_PIN, CALIBRATION_MS, DEBOUNCE_PRIORITY, EXPERIMENT_WINDOW_MS,
    MONITOR_PRIORITY, SAMPLE_INTERVAL_MS, STACK_SIZE, TICK_HZ, YIELD_INTERVAL_MS,
};
use crate::debounce::DebounceConfig;
use crate::deferral::DeferralChannel;
use crate::error::Error;
use crate::input::{EdgeInput, InputConfig};
use crate::kernel::Kernel;
use crate::observe::{Observation, ObservationSink};
use crate::stats::{calibrate, SchedStats};
use crate::task::{CoreAffinity, TaskConfig, TaskId};
use crate::window::ExperimentWindow;
use crate::workload::WorkloadDescriptor;

/// Number of periodic workloads in a plan.
pub const WORKLOADS: usize = 3;

/// Utilization monitor task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorPlan {
    pub task: TaskConfig,
    pub interval_ms: u32,
}

/// Debounce consumer task and its input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebouncePlan {
    pub task: TaskConfig,
    pub config: DebounceConfig,
}

/// Everything the startup task creates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HarnessPlan {
    pub calibration_ms: u32,
    pub window_ms: u32,
    pub monitor: MonitorPlan,
    pub workloads: [WorkloadDescriptor; WORKLOADS],
    pub debounce: Option<DebouncePlan>,
}

impl HarnessPlan {
    /// Two low-priority workloads on separate cores and a short
    /// high-priority one sharing core 0 with the 20 ms task.
    pub const DEFAULT: Self = Self {
        calibration_ms: CALIBRATION_MS,
        window_ms: EXPERIMENT_WINDOW_MS,
        monitor: MonitorPlan {
            task: TaskConfig {
                name: "CPUUtil",
                priority: MONITOR_PRIORITY,
                affinity: CoreAffinity::Pinned(0),
                stack_bytes: 2048,
            },
            interval_ms: SAMPLE_INTERVAL_MS,
        },
        workloads: [
            WorkloadDescriptor {
                name: "High",
                work_us: 5_000,
                sleep_ms: YIELD_INTERVAL_MS,
                priority: 2,
                affinity: CoreAffinity::Pinned(0),
                stack_bytes: STACK_SIZE,
            },
            WorkloadDescriptor {
                name: "Task A",
                work_us: 20_000,
                sleep_ms: YIELD_INTERVAL_MS,
                priority: 1,
                affinity: CoreAffinity::Pinned(0),
                stack_bytes: STACK_SIZE,
            },
            WorkloadDescriptor {
                name: "Task B",
                work_us: 30_000,
                sleep_ms: YIELD_INTERVAL_MS,
                priority: 1,
                affinity: CoreAffinity::Pinned(1),
                stack_bytes: STACK_SIZE,
            },
        ],
        debounce: Some(DebouncePlan {
            task: TaskConfig {
                name: "Button",
                priority: DEBOUNCE_PRIORITY,
                affinity: CoreAffinity::Any,
                stack_bytes: 2048,
            },
            config: DebounceConfig::new(InputConfig::active_low_button(BUTTON_PIN)),
        }),
    };
}

impl Default for HarnessPlan {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Which body a spawned task runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Monitor,
    /// Index into [`HarnessPlan::workloads`].
    Workload(usize),
    Debounce,
}

/// Creates the harness tasks. The firmware maps each role to an entry
/// point; tests record the calls.
pub trait Launcher {
    /// Publish the window before any workload exists.
    fn open_window(&mut self, window: ExperimentWindow);

    fn spawn(&mut self, role: Role, config: TaskConfig) -> Result<TaskId, Error>;
}

/// Edge interrupt source feeding the debounce filter.
pub struct EdgeSource<'a, B> {
    pub board: B,
    pub events: &'a DeferralChannel,
    /// Interrupt handler signalling `events`.
    pub on_edge: fn(),
}

/// Report `result` as the failure of `what` if it is an error.
fn checked<T, S: ObservationSink>(sink: &S, what: &'static str, result: Result<T, Error>) -> Result<T, Error> {
    result.map_err(|error| {
        sink.emit(&Observation::SetupFailed { what, error });
        error
    })
}

/// Run the startup sequence of `plan`. Returns the opened window.
pub fn start<K, S, L, B>(
    kernel: &K,
    stats: &SchedStats,
    sink: &S,
    launcher: &mut L,
    mut edge: EdgeSource<'_, B>,
    plan: &HarnessPlan,
) -> Result<ExperimentWindow, Error>
where
    K: Kernel,
    S: ObservationSink,
    L: Launcher,
    B: EdgeInput,
{
    sink.emit(&Observation::TickInfo {
        tick_hz: TICK_HZ,
        tick_us: tick_period_us(),
    });

    calibrate(kernel, stats, sink, plan.calibration_ms);

    let window = ExperimentWindow::new(kernel.tick_count(), plan.window_ms);
    launcher.open_window(window);

    let monitor = plan.monitor.task;
    checked(sink, monitor.name, launcher.spawn(Role::Monitor, monitor))?;

    for (index, workload) in plan.workloads.iter().enumerate() {
        checked(
            sink,
            workload.name,
            launcher.spawn(Role::Workload(index), workload.task_config()),
        )?;
    }

    if let Some(debounce) = &plan.debounce {
        let input = debounce.config.input;
        checked(sink, "input", edge.board.configure_input(&input))?;
        let consumer = checked(
            sink,
            debounce.task.name,
            launcher.spawn(Role::Debounce, debounce.task),
        )?;
        edge.events.bind(consumer);
        checked(
            sink,
            "edge interrupt",
            edge.board.register_edge_interrupt(input.pin, edge.on_edge),
        )?;
    }

    Ok(window)
}
