//! # rtprobe: Preemption and Utilization Harness
//!
//! A measurement harness for a small fixed-priority preemptive RTOS on
//! dual-core Arm Cortex-M microcontrollers.
//!
//! ## Overview
//!
//! The harness makes three kernel mechanisms observable:
//!
//! - **Preemption**: periodic busy-work tasks pinned to cores run inside a
//!   shared experiment window; every cycle reports intended vs. actual
//!   duration, so time lost to higher-priority tasks shows up as excess.
//! - **Utilization**: each core's idle task counts idle passes; a
//!   calibration run with no workload fixes the "100% idle" count, and a
//!   monitor turns later counts into a busy percentage.
//! - **Interrupt deferral**: a GPIO edge interrupt only signals a channel;
//!   a task debounces the input with two samples one settle delay apart.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                Firmware (main.rs, board)                  │
//! ├──────────────────────────────────────────────────────────┤
//! │                Harness setup (harness.rs)                 │
//! ├────────────────┬─────────────────┬───────────────────────┤
//! │  Workloads     │  Statistics     │  Input path           │
//! │  workload.rs   │  stats.rs       │  deferral.rs          │
//! │  window.rs     │  ─ idle_hook    │  debounce.rs          │
//! │  ─ busy_work   │  ─ calibrate    │  input.rs             │
//! │  ─ run_periodic│  ─ estimator    │                       │
//! ├────────────────┴─────────────────┴───────────────────────┤
//! │      Observations (observe.rs) ──► log facade             │
//! ├──────────────────────────────────────────────────────────┤
//! │   Kernel API (kernel.rs): Kernel · IsrNotify · Rtos       │
//! ├──────────────────┬──────────────────┬────────────────────┤
//! │  Scheduler       │  Task Model      │  Sync              │
//! │  scheduler.rs    │  task.rs         │  sync.rs           │
//! ├──────────────────┴──────────────────┴────────────────────┤
//! │   Arch Port (arch/cortex_m.rs)                            │
//! │   PendSV · SysTick · DWT clock · core id                  │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! Harness code is written against the [`kernel::Kernel`] and
//! [`kernel::IsrNotify`] traits. On target they are backed by the kernel
//! in this crate; on the host, unit tests drive them with a virtual clock.
//!
//! ## Memory Model
//!
//! - **No heap**: all state is statically allocated
//! - **Fixed-size TCB array**: `[TaskControlBlock; MAX_TASKS]`
//! - **Per-task stack**: `[u8; STACK_SIZE]` inline in the TCB
//! - **Scheduler state**: one `KernelLock`, interrupt mask plus spin flag
//! - **Counters**: single-word atomics, never behind a lock

#![cfg_attr(not(test), no_std)]

pub mod config;
pub mod error;
pub mod task;
pub mod scheduler;
pub mod sync;
pub mod kernel;
#[cfg(target_os = "none")]
pub mod arch;

pub mod observe;
pub mod window;
pub mod workload;
pub mod stats;
pub mod input;
pub mod deferral;
pub mod debounce;
pub mod harness;

pub use error::Error;

#[cfg(test)]
mod testing;
#[cfg(test)]
mod sim;
