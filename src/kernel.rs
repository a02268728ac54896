//! # Kernel
//!
//! The kernel services the harness runs on, exposed two ways:
//!
//! - the [`Kernel`] and [`IsrNotify`] traits, which every harness operation
//!   is written against (host tests drive them with a mock);
//! - on target, the global scheduler instance and the free functions that
//!   create tasks and start each core, plus [`Rtos`], the zero-sized handle
//!   implementing the traits.
//!
//! ## Startup Sequence
//!
//! ```text
//! reset_handler (cortex-m-rt), core 0
//!   └─► main()
//!         ├─► kernel::init()               ← Install idle tasks
//!         ├─► kernel::register_idle_hook() ← Idle-time sampler
//!         ├─► kernel::create_task()        ← Startup task
//!         └─► kernel::start_core()         ← Launch core 0 (no return)
//! board bring-up, core 1
//!   └─► kernel::start_core()               ← Launch core 1 (no return)
//! ```

use crate::config::{ms_to_ticks, Tick};
use crate::task::{CoreId, TaskId};

/// Scheduler services available to task code.
pub trait Kernel {
    /// Scheduler ticks since boot.
    fn tick_count(&self) -> Tick;

    /// High-resolution monotonic time in microseconds. Finer than the tick.
    fn now_us(&self) -> u64;

    /// Sleep for `ticks` ticks, letting lower-priority work run. Zero
    /// ticks yields to equal-priority tasks.
    fn delay(&self, ticks: Tick);

    /// Core executing the caller.
    fn core_id(&self) -> CoreId;

    /// Task executing the caller.
    fn current_task(&self) -> TaskId;

    /// Label of a task.
    fn task_name(&self, id: TaskId) -> &'static str;

    /// Block until the calling task is notified or `timeout` ticks pass.
    /// Returns `false` on timeout.
    fn wait_notification(&self, timeout: Option<Tick>) -> bool;

    /// Sleep for `ms` milliseconds, rounded down to whole ticks.
    fn delay_ms(&self, ms: u32) {
        self.delay(ms_to_ticks(ms));
    }
}

/// Notification entry point callable from interrupt context.
pub trait IsrNotify {
    /// Notify `task`. Returns whether the woken task outranks the one this
    /// core was running.
    fn notify_from_isr(&self, task: TaskId) -> bool;

    /// Request a context switch on ISR exit.
    fn yield_from_isr(&self);
}

#[cfg(target_os = "none")]
pub use self::rtos::*;

#[cfg(target_os = "none")]
mod rtos {
    use super::{IsrNotify, Kernel};
    use crate::arch::cortex_m as port;
    use crate::config::{Tick, SYSTEM_CLOCK_HZ};
    use crate::error::Error;
    use crate::scheduler::{Scheduler, WaitOutcome};
    use crate::sync::KernelLock;
    use crate::task::{CoreId, TaskConfig, TaskEntry, TaskId};

    // -----------------------------------------------------------------------
    // Global state
    // -----------------------------------------------------------------------

    /// Global scheduler instance, shared by both cores and their SysTick /
    /// PendSV handlers.
    pub static SCHEDULER: KernelLock<Scheduler> = KernelLock::new(Scheduler::new());

    /// Hook run in a loop by every idle task.
    static IDLE_HOOK: KernelLock<Option<fn(CoreId)>> = KernelLock::new(None);

    // -----------------------------------------------------------------------
    // Kernel API
    // -----------------------------------------------------------------------

    /// Install the per-core idle tasks. Must be called once, before any
    /// other kernel function.
    pub fn init() {
        SCHEDULER.with(|s| {
            s.init_idle(idle_task);
            for core in 0..crate::config::NUM_CORES {
                port::init_task_stack(&mut s.tasks[core], idle_task);
            }
        });
    }

    /// Register the function every idle task runs once per idle pass.
    ///
    /// Idle tasks read the hook when they first run, so it must be
    /// registered before `start_core`.
    pub fn register_idle_hook(hook: fn(CoreId)) {
        IDLE_HOOK.with(|h| *h = Some(hook));
    }

    /// Create a new task and register it with the scheduler.
    ///
    /// # Returns
    /// - `Ok(task_id)`: the task's index in the scheduler array
    /// - `Err(_)`: invalid configuration or the task array is full
    pub fn create_task(entry: TaskEntry, config: TaskConfig) -> Result<TaskId, Error> {
        let (id, reschedule) = SCHEDULER.with(|s| {
            let id = s.create_task(config, entry)?;
            port::init_task_stack(&mut s.tasks[id], entry);
            Ok::<_, Error>((id, s.needs_reschedule[port::core_id()]))
        })?;
        if reschedule {
            port::trigger_pendsv();
        }
        Ok(id)
    }

    /// Start scheduling on the calling core. **Does not return.**
    ///
    /// Configures SysTick and the cycle counter of this core, sets the
    /// exception priorities and launches the first task.
    pub fn start_core(mut core_peripherals: cortex_m::Peripherals) -> ! {
        cortex_m::interrupt::disable();

        port::enable_cycle_counter(&mut core_peripherals.DCB, &mut core_peripherals.DWT);
        port::configure_systick(&mut core_peripherals.SYST, SYSTEM_CLOCK_HZ);
        port::set_interrupt_priorities();

        let core = port::core_id();
        let first_sp = SCHEDULER.with(|s| {
            let first = s.schedule(core);
            s.tasks[first].stack_pointer as *const u32
        });

        // Safety: called once per core, with a stack laid out by
        // `init_task_stack`.
        unsafe { port::start_first_task(first_sp) }
    }

    /// Delete the calling task. **Does not return.**
    pub fn delete_current() -> ! {
        SCHEDULER.with(|s| s.terminate_current(port::core_id()));
        port::trigger_pendsv();
        loop {
            cortex_m::asm::wfi();
        }
    }

    /// Entry point of every idle task.
    extern "C" fn idle_task() -> ! {
        let core = port::core_id();
        let hook = IDLE_HOOK.with(|h| *h);
        loop {
            if let Some(hook) = hook {
                hook(core);
            }
        }
    }

    // -----------------------------------------------------------------------
    // Trait handle
    // -----------------------------------------------------------------------

    /// Handle to the running kernel.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct Rtos;

    impl Kernel for Rtos {
        fn tick_count(&self) -> Tick {
            SCHEDULER.with(|s| s.tick_count)
        }

        fn now_us(&self) -> u64 {
            port::now_us()
        }

        fn delay(&self, ticks: Tick) {
            SCHEDULER.with(|s| s.delay_current(port::core_id(), ticks));
            port::trigger_pendsv();
        }

        fn core_id(&self) -> CoreId {
            port::core_id()
        }

        fn current_task(&self) -> TaskId {
            SCHEDULER.with(|s| s.current_task(port::core_id()))
        }

        fn task_name(&self, id: TaskId) -> &'static str {
            SCHEDULER.with(|s| s.task_name(id))
        }

        fn wait_notification(&self, timeout: Option<Tick>) -> bool {
            let core = port::core_id();
            match SCHEDULER.with(|s| s.wait_notification_current(core, timeout)) {
                WaitOutcome::Notified => true,
                WaitOutcome::TimedOut => false,
                WaitOutcome::Blocked => {
                    port::trigger_pendsv();
                    // Resumed: either notified or timed out.
                    SCHEDULER.with(|s| s.take_notification(core))
                }
            }
        }
    }

    impl IsrNotify for Rtos {
        fn notify_from_isr(&self, task: TaskId) -> bool {
            let core = port::core_id();
            SCHEDULER.with(|s| {
                let woke = s.notify(task);
                woke && s.needs_reschedule[core]
            })
        }

        fn yield_from_isr(&self) {
            port::trigger_pendsv();
        }
    }
}
