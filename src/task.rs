//! # Task Control Block
//!
//! Defines the task model of the rtprobe kernel. Each task has a fixed
//! priority, a core affinity and an inline stack; the scheduler moves it
//! through the state machine below.

use crate::config::{Tick, NUM_CORES, STACK_SIZE};
use crate::error::Error;

/// Index of a processor core, `0..NUM_CORES`.
pub type CoreId = usize;

/// Index of a task in the scheduler's TCB array.
pub type TaskId = usize;

/// Task entry point. Tasks never return; a finished task deletes itself.
pub type TaskEntry = extern "C" fn() -> !;

// ---------------------------------------------------------------------------
// Task state machine
// ---------------------------------------------------------------------------

/// Execution state of a task.
///
/// ```text
///   ┌──────────┐     schedule()      ┌─────────┐
///   │  Ready   │ ──────────────────► │ Running │ ── terminate ──► Terminated
///   └──────────┘ ◄── preempt/yield ─ └─────────┘
///        ▲                                │
///        │  tick() / notify()             │ delay() / wait_notification()
///        │                                ▼
///        │                  ┌───────────────────────────────┐
///        └───────────────── │ Delayed / WaitingNotification │
///                           └───────────────────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// Runnable, waiting for a core.
    Ready,
    /// Executing on the core recorded in the scheduler.
    Running,
    /// Sleeping until the tick count reaches `until`.
    Delayed { until: Tick },
    /// Blocked until notified, or until `until` if a timeout was given.
    WaitingNotification { until: Option<Tick> },
    /// Deleted; the slot is never scheduled again.
    Terminated,
}

impl TaskState {
    /// Whether a blocked task must be made ready at tick `now`.
    #[inline]
    pub fn wake_due(&self, now: Tick) -> bool {
        match *self {
            TaskState::Delayed { until } => now >= until,
            TaskState::WaitingNotification { until: Some(until) } => now >= until,
            _ => false,
        }
    }
}

// ---------------------------------------------------------------------------
// Task configuration (immutable after creation)
// ---------------------------------------------------------------------------

/// Cores a task may execute on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoreAffinity {
    /// Schedulable on every core.
    Any,
    /// Pinned to exactly one core.
    Pinned(CoreId),
}

/// Static configuration for a task, set at creation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskConfig {
    /// Human-readable label used in observations.
    pub name: &'static str,

    /// Fixed priority, higher = more important. Must be above
    /// `IDLE_PRIORITY`.
    pub priority: u8,

    /// Cores this task may run on.
    pub affinity: CoreAffinity,

    /// Stack the task needs, in bytes. Must fit in `STACK_SIZE`.
    pub stack_bytes: usize,
}

impl TaskConfig {
    /// Check the configuration against the kernel's static limits.
    pub fn validate(&self) -> Result<(), Error> {
        if let CoreAffinity::Pinned(core) = self.affinity {
            if core >= NUM_CORES {
                return Err(Error::InvalidAffinity { core });
            }
        }
        if self.stack_bytes > STACK_SIZE {
            return Err(Error::StackBudget {
                requested: self.stack_bytes,
                available: STACK_SIZE,
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Task Control Block
// ---------------------------------------------------------------------------

/// Per-task stack memory, aligned to 8 bytes as required by AAPCS.
#[repr(C, align(8))]
pub struct TaskStack(pub [u8; STACK_SIZE]);

/// Task Control Block (TCB).
///
/// TCBs are stored in a fixed array in the scheduler. Slots `0..NUM_CORES`
/// hold the idle task of the matching core.
pub struct TaskControlBlock {
    /// Index in the scheduler's task array.
    pub id: TaskId,

    /// Current execution state.
    pub state: TaskState,

    /// Static configuration.
    pub config: TaskConfig,

    /// Entry point, `None` for unallocated slots.
    pub entry: Option<TaskEntry>,

    /// Pending notification, consumed by `take_notification`.
    pub notified: bool,

    /// Saved process stack pointer. Points into `self.stack`.
    pub stack_pointer: *mut u32,

    /// Per-task stack.
    pub stack: TaskStack,

    /// Whether this slot is allocated.
    pub active: bool,

    /// Whether this is a core's idle task.
    pub idle: bool,
}

// Safety: `stack_pointer` always points into the task's own stack array and
// TCBs are only touched under the kernel lock.
unsafe impl Send for TaskControlBlock {}
unsafe impl Sync for TaskControlBlock {}

impl TaskControlBlock {
    /// An unallocated slot. Used to initialize the static array.
    pub const EMPTY: Self = Self {
        id: 0,
        state: TaskState::Terminated,
        config: TaskConfig {
            name: "",
            priority: 0,
            affinity: CoreAffinity::Any,
            stack_bytes: 0,
        },
        entry: None,
        notified: false,
        stack_pointer: core::ptr::null_mut(),
        stack: TaskStack([0u8; STACK_SIZE]),
        active: false,
        idle: false,
    };

    /// Allocate this slot for a new task in the Ready state.
    ///
    /// The stack frame is laid out separately by the arch port.
    pub fn init(&mut self, id: TaskId, config: TaskConfig, entry: TaskEntry) {
        self.id = id;
        self.state = TaskState::Ready;
        self.config = config;
        self.entry = Some(entry);
        self.notified = false;
        self.active = true;
        self.idle = false;
    }

    /// Check if this task is allocated and Ready.
    #[inline]
    pub fn is_runnable(&self) -> bool {
        self.active && self.state == TaskState::Ready
    }

    /// Check if this task can run on the given core.
    #[inline]
    pub fn can_run_on_core(&self, core: CoreId) -> bool {
        match self.config.affinity {
            CoreAffinity::Any => true,
            CoreAffinity::Pinned(c) => c == core,
        }
    }

    /// Base priority.
    #[inline]
    pub fn priority(&self) -> u8 {
        self.config.priority
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::boxed::Box;

    extern "C" fn never() -> ! {
        loop {
            core::hint::spin_loop();
        }
    }

    fn config(priority: u8, affinity: CoreAffinity) -> TaskConfig {
        TaskConfig {
            name: "t",
            priority,
            affinity,
            stack_bytes: 1024,
        }
    }

    #[test]
    fn test_tcb_initialization() {
        let mut tcb = Box::new(TaskControlBlock::EMPTY);
        assert!(!tcb.active);
        assert_eq!(tcb.state, TaskState::Terminated);

        tcb.init(3, config(5, CoreAffinity::Pinned(1)), never);

        assert!(tcb.active);
        assert!(!tcb.idle);
        assert_eq!(tcb.id, 3);
        assert_eq!(tcb.state, TaskState::Ready);
        assert_eq!(tcb.priority(), 5);
        assert!(tcb.is_runnable());
    }

    #[test]
    fn test_affinity() {
        let mut tcb = Box::new(TaskControlBlock::EMPTY);
        tcb.init(2, config(1, CoreAffinity::Pinned(1)), never);
        assert!(!tcb.can_run_on_core(0));
        assert!(tcb.can_run_on_core(1));

        tcb.config.affinity = CoreAffinity::Any;
        assert!(tcb.can_run_on_core(0));
        assert!(tcb.can_run_on_core(1));
    }

    #[test]
    fn test_wake_due() {
        assert!(TaskState::Delayed { until: 10 }.wake_due(10));
        assert!(!TaskState::Delayed { until: 10 }.wake_due(9));
        assert!(TaskState::WaitingNotification { until: Some(4) }.wake_due(5));
        assert!(!TaskState::WaitingNotification { until: None }.wake_due(u64::MAX));
        assert!(!TaskState::Ready.wake_due(100));
    }

    #[test]
    fn test_config_validation() {
        assert!(config(1, CoreAffinity::Pinned(NUM_CORES - 1)).validate().is_ok());
        assert_eq!(
            config(1, CoreAffinity::Pinned(NUM_CORES)).validate(),
            Err(Error::InvalidAffinity { core: NUM_CORES })
        );

        let mut big = config(1, CoreAffinity::Any);
        big.stack_bytes = STACK_SIZE + 1;
        assert_eq!(
            big.validate(),
            Err(Error::StackBudget {
                requested: STACK_SIZE + 1,
                available: STACK_SIZE
            })
        );
    }
}
