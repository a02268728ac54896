//! # rtprobe Configuration
//!
//! Compile-time constants governing the kernel and the measurement harness.
//! All limits are fixed at compile time; nothing is allocated.

/// Maximum number of tasks the kernel can manage, including the per-core
/// idle tasks in slots `0..NUM_CORES`. Each slot carries `STACK_SIZE` bytes
/// of stack.
pub const MAX_TASKS: usize = 10;

/// Number of processor cores the kernel schedules.
pub const NUM_CORES: usize = 2;

/// SysTick frequency in Hz. One tick is the granularity of every
/// voluntary sleep.
pub const TICK_HZ: u32 = 1000;

/// Per-task stack size in bytes. Must cover the deepest call chain plus the
/// hardware exception frame (32 bytes) and the software-saved context
/// (32 bytes for R4–R11).
pub const STACK_SIZE: usize = 4096;

/// Core clock in Hz. Drives the SysTick reload and the cycle-to-µs
/// conversion of the high-resolution clock.
pub const SYSTEM_CLOCK_HZ: u32 = 150_000_000;

/// Priority of the per-core idle tasks. An idle task only runs when nothing
/// else is Ready on its core, whatever that task's priority.
pub const IDLE_PRIORITY: u8 = 0;

// ---------------------------------------------------------------------------
// Harness parameters
// ---------------------------------------------------------------------------

/// Length of the experiment window shared by every workload task.
pub const EXPERIMENT_WINDOW_MS: u32 = 2000;

/// Sleep between two work cycles of a periodic task.
pub const YIELD_INTERVAL_MS: u32 = 10;

/// Reference interval of the idle-hook calibration.
pub const CALIBRATION_MS: u32 = 1000;

/// Sampling interval of the utilization monitor. Must equal
/// `CALIBRATION_MS`, since baselines are counts per calibration interval.
pub const SAMPLE_INTERVAL_MS: u32 = CALIBRATION_MS;

/// Delay between the two level samples of the debounce filter.
pub const SETTLE_DELAY_MS: u32 = 20;

/// Poll interval while a confirmed input is held asserted.
pub const HOLD_POLL_MS: u32 = 50;

/// Priority of the utilization monitor.
pub const MONITOR_PRIORITY: u8 = 3;

/// Priority of the debounce consumer task.
pub const DEBOUNCE_PRIORITY: u8 = 4;

/// Priority of the startup task. Above every task it creates, so setup
/// finishes before any of them runs on its core.
pub const STARTUP_PRIORITY: u8 = 5;

/// GPIO of the push button feeding the debounce filter.
pub const BUTTON_PIN: u8 = 15;

// ---------------------------------------------------------------------------
// Tick conversions
// ---------------------------------------------------------------------------

/// Scheduler tick count, monotonic since boot.
pub type Tick = u64;

/// Convert milliseconds to scheduler ticks, rounding down.
#[inline]
pub const fn ms_to_ticks(ms: u32) -> Tick {
    ms as Tick * TICK_HZ as Tick / 1000
}

/// Convert scheduler ticks to milliseconds.
#[inline]
pub const fn ticks_to_ms(ticks: Tick) -> u64 {
    ticks * 1000 / TICK_HZ as u64
}

/// Length of one tick in microseconds.
#[inline]
pub const fn tick_period_us() -> u32 {
    1_000_000 / TICK_HZ
}
