//! Host-side test doubles: a virtual-time kernel, a recording sink and a
//! scripted input pin.

use std::boxed::Box;
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::vec::Vec;

use crate::config::{tick_period_us, Tick};
use crate::input::{InputPin, Level};
use crate::kernel::{IsrNotify, Kernel};
use crate::observe::{Observation, ObservationSink};
use crate::task::{CoreId, TaskId};

/// Kernel with virtual time.
///
/// Every `now_us` read advances the clock by `spin_step_us`, so busy loops
/// terminate; `delay` advances it by whole ticks. Notification waits pop
/// scripted results (an empty script times out).
pub struct MockKernel<'a> {
    now_us: Cell<u64>,
    spin_step_us: u64,
    task: TaskId,
    task_queries: Cell<u32>,
    names: Vec<(TaskId, &'static str)>,
    delays: RefCell<Vec<Tick>>,
    on_delay: Option<Box<dyn Fn(Tick) + 'a>>,
    wakeups: RefCell<VecDeque<bool>>,
    on_wait: Option<Box<dyn Fn() + 'a>>,
    wakeup_after: Tick,
    waits: RefCell<Vec<Option<Tick>>>,
}

impl<'a> MockKernel<'a> {
    pub fn new() -> Self {
        Self {
            now_us: Cell::new(0),
            spin_step_us: 100,
            task: 0,
            task_queries: Cell::new(0),
            names: Vec::new(),
            delays: RefCell::new(Vec::new()),
            on_delay: None,
            wakeups: RefCell::new(VecDeque::new()),
            on_wait: None,
            wakeup_after: 0,
            waits: RefCell::new(Vec::new()),
        }
    }

    /// Start the virtual clock at tick `tick`.
    pub fn at_tick(self, tick: Tick) -> Self {
        self.now_us.set(tick * tick_period_us() as u64);
        self
    }

    /// Clock advance per `now_us` read.
    pub fn spin_step_us(mut self, step: u64) -> Self {
        self.spin_step_us = step;
        self
    }

    /// Pretend to be task `id` named `name`.
    pub fn with_task(mut self, id: TaskId, name: &'static str) -> Self {
        self.task = id;
        self.names.push((id, name));
        self
    }

    /// Run `f` with the tick count of every delay.
    pub fn on_delay(mut self, f: impl Fn(Tick) + 'a) -> Self {
        self.on_delay = Some(Box::new(f));
        self
    }

    /// Run `f` every time the caller starts a notification wait.
    pub fn on_wait(mut self, f: impl Fn() + 'a) -> Self {
        self.on_wait = Some(Box::new(f));
        self
    }

    /// Ticks a successful notification wait blocks before waking, capped
    /// at its timeout.
    pub fn wakeup_after(mut self, ticks: Tick) -> Self {
        self.wakeup_after = ticks;
        self
    }

    /// Queue the results of upcoming notification waits.
    pub fn script_wakeups(&self, results: &[bool]) {
        self.wakeups.borrow_mut().extend(results.iter().copied());
    }

    /// Tick counts passed to `delay`, in call order.
    pub fn delays(&self) -> Vec<Tick> {
        self.delays.borrow().clone()
    }

    /// Number of `current_task` calls.
    pub fn task_queries(&self) -> u32 {
        self.task_queries.get()
    }

    /// Timeouts passed to `wait_notification`, in call order.
    pub fn waits(&self) -> Vec<Option<Tick>> {
        self.waits.borrow().clone()
    }

    fn advance_ticks(&self, ticks: Tick) {
        self.now_us
            .set(self.now_us.get() + ticks * tick_period_us() as u64);
    }
}

impl Default for MockKernel<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl Kernel for MockKernel<'_> {
    fn tick_count(&self) -> Tick {
        self.now_us.get() / tick_period_us() as u64
    }

    fn now_us(&self) -> u64 {
        let now = self.now_us.get();
        self.now_us.set(now + self.spin_step_us);
        now
    }

    fn delay(&self, ticks: Tick) {
        self.delays.borrow_mut().push(ticks);
        self.advance_ticks(ticks);
        if let Some(f) = &self.on_delay {
            f(ticks);
        }
    }

    fn core_id(&self) -> CoreId {
        0
    }

    fn current_task(&self) -> TaskId {
        self.task_queries.set(self.task_queries.get() + 1);
        self.task
    }

    fn task_name(&self, id: TaskId) -> &'static str {
        self.names
            .iter()
            .find(|(task, _)| *task == id)
            .map(|(_, name)| *name)
            .unwrap_or("<?>")
    }

    fn wait_notification(&self, timeout: Option<Tick>) -> bool {
        self.waits.borrow_mut().push(timeout);
        if let Some(f) = &self.on_wait {
            f();
        }
        let woken = self.wakeups.borrow_mut().pop_front().unwrap_or(false);
        match (woken, timeout) {
            (true, Some(t)) => self.advance_ticks(self.wakeup_after.min(t)),
            (true, None) => self.advance_ticks(self.wakeup_after),
            (false, Some(t)) => self.advance_ticks(t),
            (false, None) => {}
        }
        woken
    }
}

/// ISR side that records who was notified.
#[derive(Default)]
pub struct MockIsr {
    pub notified: RefCell<Vec<TaskId>>,
    pub yields: Cell<u32>,
    pub outranks: bool,
}

impl IsrNotify for MockIsr {
    fn notify_from_isr(&self, task: TaskId) -> bool {
        self.notified.borrow_mut().push(task);
        self.outranks
    }

    fn yield_from_isr(&self) {
        self.yields.set(self.yields.get() + 1);
    }
}

/// Sink keeping every observation.
#[derive(Default)]
pub struct RecordingSink {
    records: RefCell<Vec<Observation>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<Observation> {
        self.records.borrow().clone()
    }

    pub fn count(&self, pred: impl Fn(&Observation) -> bool) -> usize {
        self.records.borrow().iter().filter(|&o| pred(o)).count()
    }
}

impl ObservationSink for RecordingSink {
    fn emit(&self, observation: &Observation) {
        self.records.borrow_mut().push(*observation);
    }
}

/// Input pin replaying a script of levels, then a fixed level forever.
pub struct ScriptedPin {
    levels: RefCell<VecDeque<Level>>,
    rest: Level,
    reads: Cell<u32>,
}

impl ScriptedPin {
    pub fn new(levels: &[Level], rest: Level) -> Self {
        Self {
            levels: RefCell::new(levels.iter().copied().collect()),
            rest,
            reads: Cell::new(0),
        }
    }

    pub fn reads(&self) -> u32 {
        self.reads.get()
    }
}

impl InputPin for ScriptedPin {
    fn read_level(&self) -> Level {
        self.reads.set(self.reads.get() + 1);
        self.levels.borrow_mut().pop_front().unwrap_or(self.rest)
    }
}
