//! Deterministic dual-core run of the preemption experiment.
//!
//! The real [`Scheduler`] makes every decision; time advances in 100 µs
//! steps and SysTick fires every tenth step. Each workload is a
//! [`PeriodicRunner`] whose busy work only progresses while its task holds
//! a core, so preemption shows up as excess exactly as it does on
//! hardware. A core running its idle task calls the idle hook once per
//! step.

use std::boxed::Box;
use std::vec::Vec;

use crate::config::{ms_to_ticks, Tick, CALIBRATION_MS, NUM_CORES};
use crate::harness::HarnessPlan;
use crate::observe::Observation;
use crate::scheduler::Scheduler;
use crate::stats::{SchedStats, UtilizationEstimator};
use crate::task::{CoreId, TaskId};
use crate::testing::RecordingSink;
use crate::window::ExperimentWindow;
use crate::workload::{Cycle, PeriodicRunner, RunSummary, WorkloadDescriptor};

const STEP_US: u64 = 100;
const STEPS_PER_TICK: u64 = 10;

extern "C" fn never() -> ! {
    loop {
        core::hint::spin_loop();
    }
}

enum Phase {
    Begin,
    Working { cycle: Cycle, remaining_us: u64 },
    Stopped(RunSummary),
}

struct SimTask {
    id: TaskId,
    runner: PeriodicRunner,
    phase: Phase,
}

impl SimTask {
    /// Run this task for one step on `core`.
    fn step(&mut self, core: CoreId, sched: &mut Scheduler, now_us: u64, sink: &RecordingSink) {
        let tick = sched.tick_count;
        if let Phase::Begin = self.phase {
            match self.runner.begin_cycle(tick, now_us, sink) {
                Some(cycle) => {
                    self.phase = Phase::Working {
                        cycle,
                        remaining_us: self.runner.descriptor().work_us as u64,
                    }
                }
                None => {
                    self.phase = Phase::Stopped(self.runner.stop(tick, sink));
                    sched.terminate_current(core);
                    return;
                }
            }
        }

        if let Phase::Working { cycle, remaining_us } = &mut self.phase {
            *remaining_us = remaining_us.saturating_sub(STEP_US);
            if *remaining_us == 0 {
                let cycle = *cycle;
                self.runner.end_cycle(cycle, tick, now_us + STEP_US, sink);
                self.phase = Phase::Begin;
                sched.delay_current(core, ms_to_ticks(self.runner.descriptor().sleep_ms));
            }
        }
    }
}

struct Machine {
    sched: Box<Scheduler>,
    now_us: u64,
    steps: u64,
    tasks: Vec<SimTask>,
    stats: SchedStats,
    sink: RecordingSink,
}

impl Machine {
    fn new() -> Self {
        let mut sched = Box::new(Scheduler::new());
        sched.init_idle(never);
        for core in 0..NUM_CORES {
            sched.schedule(core);
        }
        Self {
            sched,
            now_us: 0,
            steps: 0,
            tasks: Vec::new(),
            stats: SchedStats::new(),
            sink: RecordingSink::new(),
        }
    }

    fn tick(&self) -> Tick {
        self.sched.tick_count
    }

    fn spawn(&mut self, desc: WorkloadDescriptor, window: ExperimentWindow) {
        let id = self.sched.create_task(desc.task_config(), never).unwrap();
        self.tasks.push(SimTask {
            id,
            runner: PeriodicRunner::new(desc, window),
            phase: Phase::Begin,
        });
        self.reschedule();
    }

    fn reschedule(&mut self) {
        for core in 0..NUM_CORES {
            if self.sched.needs_reschedule[core] {
                self.sched.schedule(core);
            }
        }
    }

    fn step(&mut self) {
        for core in 0..NUM_CORES {
            let current = self.sched.current_task(core);
            match self.tasks.iter_mut().find(|t| t.id == current) {
                Some(task) => task.step(core, &mut self.sched, self.now_us, &self.sink),
                None => self.stats.record_idle(core),
            }
            if self.sched.needs_reschedule[core] {
                self.sched.schedule(core);
            }
        }

        self.now_us += STEP_US;
        self.steps += 1;
        if self.steps % STEPS_PER_TICK == 0 {
            self.sched.tick();
            self.reschedule();
        }
    }

    fn run_for_ms(&mut self, ms: u32) {
        for _ in 0..ms_to_ticks(ms) * STEPS_PER_TICK {
            self.step();
        }
    }

    fn all_stopped(&self) -> bool {
        self.tasks.iter().all(|t| matches!(t.phase, Phase::Stopped(_)))
    }

    fn summary(&self, name: &str) -> RunSummary {
        self.tasks
            .iter()
            .find(|t| t.runner.descriptor().name == name)
            .and_then(|t| match t.phase {
                Phase::Stopped(summary) => Some(summary),
                _ => None,
            })
            .unwrap()
    }

    /// Calibrate the idle hook with no workload, as the startup task does.
    fn calibrate(&mut self) {
        self.stats.reset_all();
        self.run_for_ms(CALIBRATION_MS);
        for core in 0..NUM_CORES {
            let measured = self.stats.drain(core);
            self.stats.set_baseline(core, measured);
        }
    }
}

#[test]
fn test_preemption_experiment() {
    let plan = HarnessPlan::DEFAULT;
    let mut m = Machine::new();

    m.calibrate();
    assert_eq!(m.stats.baseline(0), 10_000);
    assert_eq!(m.stats.baseline(1), 10_000);

    let window = ExperimentWindow::new(m.tick(), plan.window_ms);
    for workload in plan.workloads {
        m.spawn(workload, window);
    }

    // First utilization interval of the window.
    m.run_for_ms(plan.monitor.interval_ms);
    let util = UtilizationEstimator::new(&m.stats).sample();
    // Task B: 30 ms busy out of every 39 ms.
    assert!((700..=850).contains(&util[1].busy.permille()), "{:?}", util[1]);
    // High and Task A leave only the gaps where both sleep.
    assert!((700..=950).contains(&util[0].busy.permille()), "{:?}", util[0]);

    let mut budget = 3_000;
    while !m.all_stopped() && budget > 0 {
        m.run_for_ms(1);
        budget -= 1;
    }
    assert!(m.all_stopped());

    let high = m.summary("High");
    let a = m.summary("Task A");
    let b = m.summary("Task B");

    assert!(high.cycles >= 120, "{:?}", high);
    assert!(high.cycles > 2 * a.cycles, "{:?} vs {:?}", high, a);
    assert!(b.cycles > 0);

    // High is never preempted; Task A loses the core to it every cycle.
    assert_eq!(high.max_excess_us, 0);
    assert!(high.max_excess_us <= a.max_excess_us);
    assert!(a.max_excess_us >= 5_000);

    for record in m.sink.records() {
        match record {
            Observation::WorkBegin { elapsed_ms, .. } => assert!(elapsed_ms < 2000),
            Observation::WorkEnd { sample, intended_us, .. } => {
                assert!(sample.actual_us() >= intended_us as u64)
            }
            Observation::Stopping { elapsed_ms, .. } => assert!(elapsed_ms >= 2000),
            _ => {}
        }
    }
    assert_eq!(m.sink.count(|o| matches!(o, Observation::Stopping { .. })), 3);

    // Every workload deleted itself: both cores are back to idle.
    for core in 0..NUM_CORES {
        assert_eq!(m.sched.current_task(core), core);
    }
}

#[test]
fn test_idle_machine_reads_zero_busy() {
    let mut m = Machine::new();
    m.calibrate();
    m.run_for_ms(CALIBRATION_MS);

    let util = UtilizationEstimator::new(&m.stats).sample();
    for u in &util {
        assert_eq!(u.busy.permille(), 0);
    }
}
