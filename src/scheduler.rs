//! # Scheduler
//!
//! Fixed-priority preemptive scheduling across `NUM_CORES` cores.
//!
//! ## Scheduling Algorithm
//!
//! At each SysTick interrupt:
//! 1. **Advance time**: Increment the tick counter
//! 2. **Wake sleepers**: Delayed tasks and timed-out notification waiters
//!    whose deadline has passed become Ready
//! 3. **Flag preemption**: A woken task that outranks the task running on a
//!    core it may use marks that core for rescheduling
//!
//! When a core reschedules (PendSV), `schedule(core)` picks the
//! highest-priority Ready task allowed on that core. A task that was
//! preempted (not one that blocked or yielded) keeps its core against
//! equal-priority competitors; a task that yielded hands the core to the
//! next equal-priority task in round-robin order. With nothing Ready, the
//! core runs its idle task, which in turn runs the idle hook.

use crate::config::{Tick, IDLE_PRIORITY, MAX_TASKS, NUM_CORES, STACK_SIZE};
use crate::error::Error;
use crate::task::{
    CoreAffinity, CoreId, TaskConfig, TaskControlBlock, TaskEntry, TaskId, TaskState,
};

/// Names of the per-core idle tasks.
const IDLE_NAMES: [&str; NUM_CORES] = ["IDLE0", "IDLE1"];

/// Result of a notification wait on the current task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// A notification was already pending and has been consumed.
    Notified,
    /// The task is now blocked; the caller must trigger a context switch.
    Blocked,
    /// Zero timeout and nothing pending.
    TimedOut,
}

// ---------------------------------------------------------------------------
// Scheduler struct
// ---------------------------------------------------------------------------

/// The central scheduler state. Stored behind a `KernelLock` in
/// `kernel.rs` on target and owned directly by host simulations.
///
/// ## Design Notes
///
/// - All tasks are stored inline in a fixed-size array (no heap)
/// - Slot `core` holds the idle task of that core
/// - `current[core]` is the task executing on `core`
pub struct Scheduler {
    /// Fixed-size array of TCBs.
    pub tasks: [TaskControlBlock; MAX_TASKS],

    /// Number of allocated slots, idle tasks included.
    pub task_count: usize,

    /// Task executing on each core.
    pub current: [TaskId; NUM_CORES],

    /// Monotonic tick counter.
    pub tick_count: Tick,

    /// Per-core flag set when that core must run `schedule()`.
    pub needs_reschedule: [bool; NUM_CORES],
}

impl Scheduler {
    /// Create a scheduler whose idle slots are reserved but not yet
    /// installed (see [`Scheduler::init_idle`]).
    pub const fn new() -> Self {
        let mut current = [0; NUM_CORES];
        let mut core = 0;
        while core < NUM_CORES {
            current[core] = core;
            core += 1;
        }
        Self {
            tasks: [TaskControlBlock::EMPTY; MAX_TASKS],
            task_count: NUM_CORES,
            current,
            tick_count: 0,
            needs_reschedule: [false; NUM_CORES],
        }
    }

    /// Install the idle task of every core. Each core starts out "running"
    /// its idle task until the first `schedule()`.
    pub fn init_idle(&mut self, entry: TaskEntry) {
        for core in 0..NUM_CORES {
            let config = TaskConfig {
                name: IDLE_NAMES[core],
                priority: IDLE_PRIORITY,
                affinity: CoreAffinity::Pinned(core),
                stack_bytes: STACK_SIZE,
            };
            let tcb = &mut self.tasks[core];
            tcb.init(core, config, entry);
            tcb.idle = true;
            tcb.state = TaskState::Running;
            self.current[core] = core;
        }
    }

    /// Register a new task with the scheduler.
    ///
    /// # Returns
    /// - `Ok(task_id)`: the index of the newly created task
    /// - `Err(_)`: invalid configuration or the task array is full
    pub fn create_task(&mut self, config: TaskConfig, entry: TaskEntry) -> Result<TaskId, Error> {
        config.validate()?;
        if self.task_count >= MAX_TASKS {
            return Err(Error::TaskTableFull { capacity: MAX_TASKS });
        }

        let id = self.task_count;
        self.tasks[id].init(id, config, entry);
        self.task_count += 1;
        self.request_preemption(id);
        Ok(id)
    }

    /// Called from the SysTick handler every tick.
    ///
    /// Wakes every task whose delay or wait timeout has expired and flags
    /// the cores it should preempt.
    pub fn tick(&mut self) {
        self.tick_count += 1;
        let now = self.tick_count;

        for id in NUM_CORES..self.task_count {
            if self.tasks[id].active && self.tasks[id].state.wake_due(now) {
                self.tasks[id].state = TaskState::Ready;
                self.request_preemption(id);
            }
        }
    }

    /// Whether `candidate` should take the core currently running `running`.
    fn outranks(&self, candidate: TaskId, running: TaskId) -> bool {
        let current = &self.tasks[running];
        current.idle
            || current.state != TaskState::Running
            || self.tasks[candidate].priority() > current.priority()
    }

    /// Flag every core that `id` may run on and whose current task it
    /// outranks. Returns whether any core was flagged.
    fn request_preemption(&mut self, id: TaskId) -> bool {
        let mut flagged = false;
        for core in 0..NUM_CORES {
            if self.tasks[id].can_run_on_core(core) && self.outranks(id, self.current[core]) {
                self.needs_reschedule[core] = true;
                flagged = true;
            }
        }
        flagged
    }

    /// Select the next task to run on `core` and mark it Running.
    ///
    /// # Returns
    /// Index of the next task; `core` itself (the idle task) when nothing
    /// is runnable there.
    pub fn schedule(&mut self, core: CoreId) -> TaskId {
        let prev = self.current[core];
        let prev_keeps_core = !self.tasks[prev].idle && self.tasks[prev].state == TaskState::Running;
        if self.tasks[prev].state == TaskState::Running {
            self.tasks[prev].state = TaskState::Ready;
        }

        // Scan in round-robin order starting after `prev`, so that among
        // equal priorities the task after `prev` wins.
        let count = self.task_count;
        let mut best: Option<TaskId> = None;
        for offset in 1..=count {
            let id = (prev + offset) % count;
            let tcb = &self.tasks[id];
            if tcb.idle || !tcb.is_runnable() || !tcb.can_run_on_core(core) {
                continue;
            }
            match best {
                Some(b) if tcb.priority() <= self.tasks[b].priority() => {}
                _ => best = Some(id),
            }
        }

        let next = match best {
            Some(b) if prev_keeps_core && self.tasks[b].priority() <= self.tasks[prev].priority() => {
                prev
            }
            Some(b) => b,
            None => core,
        };

        self.tasks[next].state = TaskState::Running;
        self.current[core] = next;
        self.needs_reschedule[core] = false;
        next
    }

    /// Put the task running on `core` to sleep for `ticks` ticks. Zero
    /// ticks is a plain yield.
    pub fn delay_current(&mut self, core: CoreId, ticks: Tick) {
        let id = self.current[core];
        if self.tasks[id].idle {
            return;
        }
        self.tasks[id].state = if ticks == 0 {
            TaskState::Ready
        } else {
            TaskState::Delayed {
                until: self.tick_count + ticks,
            }
        };
        self.needs_reschedule[core] = true;
    }

    /// Block the task running on `core` until notified, or until `timeout`
    /// ticks have passed.
    pub fn wait_notification_current(&mut self, core: CoreId, timeout: Option<Tick>) -> WaitOutcome {
        let id = self.current[core];
        if self.tasks[id].notified {
            self.tasks[id].notified = false;
            return WaitOutcome::Notified;
        }
        if timeout == Some(0) || self.tasks[id].idle {
            return WaitOutcome::TimedOut;
        }
        self.tasks[id].state = TaskState::WaitingNotification {
            until: timeout.map(|t| self.tick_count + t),
        };
        self.needs_reschedule[core] = true;
        WaitOutcome::Blocked
    }

    /// Consume the pending notification of the task running on `core`.
    /// Called once a blocked waiter runs again: `false` means it timed out.
    pub fn take_notification(&mut self, core: CoreId) -> bool {
        let id = self.current[core];
        core::mem::replace(&mut self.tasks[id].notified, false)
    }

    /// Notify `id`, waking it if it waits for a notification. Safe to call
    /// from interrupt context.
    ///
    /// Returns whether a core must reschedule for the woken task.
    pub fn notify(&mut self, id: TaskId) -> bool {
        if id >= self.task_count || !self.tasks[id].active || self.tasks[id].idle {
            return false;
        }
        if self.tasks[id].state == TaskState::Terminated {
            return false;
        }
        self.tasks[id].notified = true;
        if let TaskState::WaitingNotification { .. } = self.tasks[id].state {
            self.tasks[id].state = TaskState::Ready;
            return self.request_preemption(id);
        }
        false
    }

    /// Delete the task running on `core`. It is never scheduled again.
    pub fn terminate_current(&mut self, core: CoreId) {
        let id = self.current[core];
        if self.tasks[id].idle {
            return;
        }
        self.tasks[id].state = TaskState::Terminated;
        self.needs_reschedule[core] = true;
    }

    /// Task executing on `core`.
    #[inline]
    pub fn current_task(&self, core: CoreId) -> TaskId {
        self.current[core]
    }

    /// Label of task `id`, `"<?>"` for unallocated slots.
    pub fn task_name(&self, id: TaskId) -> &'static str {
        match self.tasks.get(id) {
            Some(tcb) if tcb.active => tcb.config.name,
            _ => "<?>",
        }
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::boxed::Box;

    extern "C" fn never() -> ! {
        loop {
            core::hint::spin_loop();
        }
    }

    fn scheduler() -> Box<Scheduler> {
        let mut s = Box::new(Scheduler::new());
        s.init_idle(never);
        s
    }

    fn spawn(s: &mut Scheduler, name: &'static str, priority: u8, affinity: CoreAffinity) -> TaskId {
        let config = TaskConfig {
            name,
            priority,
            affinity,
            stack_bytes: 1024,
        };
        s.create_task(config, never).unwrap()
    }

    #[test]
    fn test_idle_when_nothing_ready() {
        let mut s = scheduler();
        assert_eq!(s.schedule(0), 0);
        assert_eq!(s.schedule(1), 1);
        assert_eq!(s.task_name(s.current_task(1)), "IDLE1");
    }

    #[test]
    fn test_highest_priority_wins_and_affinity_respected() {
        let mut s = scheduler();
        let low = spawn(&mut s, "low", 1, CoreAffinity::Pinned(0));
        let high = spawn(&mut s, "high", 2, CoreAffinity::Pinned(0));
        let other = spawn(&mut s, "other", 1, CoreAffinity::Pinned(1));

        assert_eq!(s.schedule(0), high);
        assert_eq!(s.schedule(1), other);

        s.delay_current(0, 5);
        assert_eq!(s.schedule(0), low);
    }

    #[test]
    fn test_creation_flags_preemption() {
        let mut s = scheduler();
        s.schedule(0);
        s.schedule(1);
        spawn(&mut s, "pinned", 1, CoreAffinity::Pinned(1));
        assert!(!s.needs_reschedule[0]);
        assert!(s.needs_reschedule[1]);
    }

    #[test]
    fn test_delay_wakes_on_tick_and_preempts_lower() {
        let mut s = scheduler();
        let low = spawn(&mut s, "low", 1, CoreAffinity::Pinned(0));
        let high = spawn(&mut s, "high", 3, CoreAffinity::Pinned(0));

        assert_eq!(s.schedule(0), high);
        s.delay_current(0, 2);
        assert_eq!(s.schedule(0), low);

        s.tick();
        assert!(!s.needs_reschedule[0]);
        s.tick();
        assert!(s.needs_reschedule[0]);
        assert_eq!(s.schedule(0), high);
        assert_eq!(s.tasks[low].state, TaskState::Ready);
    }

    #[test]
    fn test_preempted_task_keeps_core_against_equal_priority() {
        let mut s = scheduler();
        let a = spawn(&mut s, "a", 1, CoreAffinity::Pinned(0));
        let b = spawn(&mut s, "b", 1, CoreAffinity::Pinned(0));

        let first = s.schedule(0);
        assert_eq!(first, a);
        // A reschedule without a yield leaves `a` in place.
        assert_eq!(s.schedule(0), a);

        // Yielding rotates to the other equal-priority task.
        s.delay_current(0, 0);
        assert_eq!(s.schedule(0), b);
        s.delay_current(0, 0);
        assert_eq!(s.schedule(0), a);
    }

    #[test]
    fn test_any_affinity_task_runs_on_free_core() {
        let mut s = scheduler();
        let busy = spawn(&mut s, "busy", 5, CoreAffinity::Pinned(0));
        let roamer = spawn(&mut s, "roamer", 1, CoreAffinity::Any);

        assert_eq!(s.schedule(0), busy);
        assert_eq!(s.schedule(1), roamer);
        // Running on core 1, so core 0 cannot pick it as well.
        s.delay_current(0, 10);
        assert_eq!(s.schedule(0), 0);
    }

    #[test]
    fn test_notification_wakes_waiter() {
        let mut s = scheduler();
        let waiter = spawn(&mut s, "waiter", 4, CoreAffinity::Pinned(0));
        let worker = spawn(&mut s, "worker", 1, CoreAffinity::Pinned(0));

        assert_eq!(s.schedule(0), waiter);
        assert_eq!(s.wait_notification_current(0, None), WaitOutcome::Blocked);
        assert_eq!(s.schedule(0), worker);

        assert!(s.notify(waiter));
        assert!(s.needs_reschedule[0]);
        assert_eq!(s.schedule(0), waiter);
        assert!(s.take_notification(0));
        assert!(!s.take_notification(0));
    }

    #[test]
    fn test_pending_notification_is_not_lost() {
        let mut s = scheduler();
        let waiter = spawn(&mut s, "waiter", 4, CoreAffinity::Pinned(0));
        assert_eq!(s.schedule(0), waiter);

        // Notified while running: the next wait returns immediately.
        assert!(!s.notify(waiter));
        assert_eq!(s.wait_notification_current(0, None), WaitOutcome::Notified);
        assert_eq!(s.wait_notification_current(0, Some(0)), WaitOutcome::TimedOut);
    }

    #[test]
    fn test_notification_wait_times_out() {
        let mut s = scheduler();
        let waiter = spawn(&mut s, "waiter", 4, CoreAffinity::Pinned(1));
        assert_eq!(s.schedule(1), waiter);
        assert_eq!(s.wait_notification_current(1, Some(3)), WaitOutcome::Blocked);
        assert_eq!(s.schedule(1), 1);

        for _ in 0..3 {
            s.tick();
        }
        assert!(s.needs_reschedule[1]);
        assert_eq!(s.schedule(1), waiter);
        assert!(!s.take_notification(1));
    }

    #[test]
    fn test_terminated_task_never_scheduled() {
        let mut s = scheduler();
        let t = spawn(&mut s, "once", 2, CoreAffinity::Pinned(0));
        assert_eq!(s.schedule(0), t);
        s.terminate_current(0);
        assert_eq!(s.schedule(0), 0);
        assert!(!s.notify(t));
        s.tick();
        assert_eq!(s.schedule(0), 0);
    }

    #[test]
    fn test_task_table_full() {
        let mut s = scheduler();
        for _ in NUM_CORES..MAX_TASKS {
            spawn(&mut s, "filler", 1, CoreAffinity::Any);
        }
        let config = TaskConfig {
            name: "extra",
            priority: 1,
            affinity: CoreAffinity::Any,
            stack_bytes: 256,
        };
        assert_eq!(
            s.create_task(config, never),
            Err(Error::TaskTableFull { capacity: MAX_TASKS })
        );
    }
}
