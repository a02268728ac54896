//! # Cortex-M Port Layer
//!
//! Hardware-specific code for dual-core Cortex-M parts (ARMv7-M / ARMv8-M
//! Mainline). Implements context switching via PendSV, the SysTick tick,
//! the DWT-backed high-resolution clock and core identification.
//!
//! ## Context Switch Mechanism
//!
//! The Cortex-M uses a split-stack model:
//! - **MSP** (Main Stack Pointer): Used by the kernel and interrupt handlers
//! - **PSP** (Process Stack Pointer): Used by tasks in Thread mode
//!
//! On exception entry, the hardware automatically stacks R0–R3, R12, LR, PC,
//! and xPSR onto the process stack. The PendSV handler manually saves and
//! restores R4–R11, which completes the full context save/restore. No FPU
//! context is saved: tasks must not use floating point.
//!
//! ## Cores
//!
//! Every core runs its own SysTick and PendSV. Only core 0 advances the
//! shared tick count; each core reschedules itself when its
//! `needs_reschedule` flag is set, at the latest on its next SysTick.
//!
//! The board provides the executing core's index through the
//! `_rtprobe_core_id` hook, the way multicore executors take it from the
//! PAC.

use core::arch::{asm, naked_asm};
use core::sync::atomic::{AtomicU32, Ordering};

use cortex_m::peripheral::syst::SystClkSource;
use cortex_m::peripheral::{DCB, DWT, SCB, SYST};

use crate::config::{NUM_CORES, STACK_SIZE, SYSTEM_CLOCK_HZ, TICK_HZ};
use crate::kernel::SCHEDULER;
use crate::task::{CoreId, TaskControlBlock, TaskEntry};

extern "Rust" {
    /// Index of the executing core, `0..NUM_CORES`. Provided by the board.
    fn _rtprobe_core_id() -> usize;
}

/// Index of the executing core.
#[inline]
pub fn core_id() -> CoreId {
    // Safety: the board hook only reads a core-local register.
    let core = unsafe { _rtprobe_core_id() };
    if core < NUM_CORES {
        core
    } else {
        0
    }
}

// ---------------------------------------------------------------------------
// SysTick configuration
// ---------------------------------------------------------------------------

/// Configure the SysTick timer of this core to fire at `TICK_HZ`.
pub fn configure_systick(syst: &mut SYST, clock_hz: u32) {
    let reload = clock_hz / TICK_HZ - 1;
    syst.set_reload(reload);
    syst.clear_current();
    syst.set_clock_source(SystClkSource::Core);
    syst.enable_counter();
    syst.enable_interrupt();
}

// ---------------------------------------------------------------------------
// High-resolution clock
// ---------------------------------------------------------------------------

/// Upper 32 bits of each core's extended cycle count.
static CYCLES_HI: [AtomicU32; NUM_CORES] = [const { AtomicU32::new(0) }; NUM_CORES];

/// Last raw CYCCNT value seen on each core, for wrap detection.
static CYCLES_LAST: [AtomicU32; NUM_CORES] = [const { AtomicU32::new(0) }; NUM_CORES];

/// Start the DWT cycle counter of this core.
pub fn enable_cycle_counter(dcb: &mut DCB, dwt: &mut DWT) {
    dcb.enable_trace();
    dwt.enable_cycle_counter();
}

/// 64-bit cycle count of this core.
///
/// CYCCNT is 32 bits wide; SysTick calls this every tick, so a wrap is
/// always seen before a second one can happen.
pub fn cycles() -> u64 {
    cortex_m::interrupt::free(|_cs| {
        let core = core_id();
        let lo = DWT::cycle_count();
        let mut hi = CYCLES_HI[core].load(Ordering::Relaxed);
        if lo < CYCLES_LAST[core].load(Ordering::Relaxed) {
            hi = hi.wrapping_add(1);
            CYCLES_HI[core].store(hi, Ordering::Relaxed);
        }
        CYCLES_LAST[core].store(lo, Ordering::Relaxed);
        ((hi as u64) << 32) | lo as u64
    })
}

/// Microseconds since this core's cycle counter started.
#[inline]
pub fn now_us() -> u64 {
    cycles() / (SYSTEM_CLOCK_HZ / 1_000_000) as u64
}

// ---------------------------------------------------------------------------
// PendSV trigger
// ---------------------------------------------------------------------------

/// Pend a PendSV exception on this core to perform a context switch.
///
/// PendSV runs at the lowest priority, so it only switches once no other
/// handler is active. From Thread mode it takes effect before this
/// function returns.
#[inline]
pub fn trigger_pendsv() {
    SCB::set_pendsv();
    cortex_m::asm::dsb();
    cortex_m::asm::isb();
}

// ---------------------------------------------------------------------------
// Interrupt priority configuration
// ---------------------------------------------------------------------------

/// Set PendSV and SysTick to the lowest interrupt priority on this core.
pub fn set_interrupt_priorities() {
    unsafe {
        // System Handler Priority Register 3 (SHPR3): 0xE000_ED20
        // Bits [23:16] = PendSV priority
        // Bits [31:24] = SysTick priority
        let shpr3: *mut u32 = 0xE000_ED20 as *mut u32;
        let val = core::ptr::read_volatile(shpr3);
        let val = val | (0xFF << 16) | (0xFF << 24);
        core::ptr::write_volatile(shpr3, val);
    }
}

// ---------------------------------------------------------------------------
// Stack initialization
// ---------------------------------------------------------------------------

/// Lay out a task's stack so that the first PendSV "return" starts `entry`.
///
/// ## Stack Layout (top = high address, growing down)
///
/// ```text
/// [Hardware stacked frame]
///   xPSR  (Thumb bit set)
///   PC    (task entry point)
///   LR    (task_exit)
///   R12, R3, R2, R1, R0
/// [Software saved context]
///   R11 .. R4              <- stack_pointer after init
/// ```
pub fn init_task_stack(tcb: &mut TaskControlBlock, entry: TaskEntry) {
    let stack_top = tcb.stack.0.as_ptr() as usize + STACK_SIZE;
    // Align to 8 bytes (AAPCS requirement)
    let aligned_top = stack_top & !0x07;

    // 16 registers: 8 software-saved + 8 hardware-stacked
    let frame_ptr = (aligned_top - 16 * 4) as *mut u32;

    unsafe {
        for i in 0..8 {
            *frame_ptr.add(i) = 0; // R4–R11
        }
        for i in 8..13 {
            *frame_ptr.add(i) = 0; // R0–R3, R12
        }
        *frame_ptr.add(13) = task_exit as usize as u32; // LR
        *frame_ptr.add(14) = entry as usize as u32; // PC
        *frame_ptr.add(15) = 0x0100_0000; // xPSR, Thumb bit
    }

    tcb.stack_pointer = frame_ptr;
}

/// Landing pad for a task entry that returns. Deletes the task.
extern "C" fn task_exit() -> ! {
    crate::kernel::delete_current()
}

// ---------------------------------------------------------------------------
// First task launch
// ---------------------------------------------------------------------------

/// Start the first task on this core by switching Thread mode to PSP and
/// branching to the task's entry point.
///
/// # Safety
/// Must be called once per core, with interrupts disabled and a stack
/// pointer produced by `init_task_stack`.
pub unsafe fn start_first_task(psp: *const u32) -> ! {
    asm!(
        // Skip the software-saved R4–R11 (8×4 = 32 bytes)
        "adds r0, #32",
        "msr psp, r0",

        // Thread mode uses PSP (CONTROL.SPSEL = 1)
        "movs r0, #2",
        "msr control, r0",
        "isb",

        // Unstack the hardware frame by hand
        "pop {{r0-r3, r12}}",
        "pop {{r4}}",          // LR (task_exit)
        "pop {{r5}}",          // PC (task entry)
        "pop {{r6}}",          // xPSR (discarded)
        "mov lr, r4",

        "cpsie i",
        "bx r5",

        in("r0") psp,
        options(noreturn)
    );
}

// ---------------------------------------------------------------------------
// PendSV handler (context switch)
// ---------------------------------------------------------------------------

/// PendSV exception handler: performs the context switch on this core.
///
/// ## Sequence
/// 1. Save R4–R11 onto the current task's stack (PSP)
/// 2. Store the updated PSP into the current task's TCB
/// 3. Select the next task for this core
/// 4. Restore R4–R11 from the new task's stack and load its PSP
/// 5. Return to Thread mode on PSP (EXC_RETURN = 0xFFFFFFFD)
///
/// # Safety
/// Called directly by the NVIC; follows the exception entry/exit
/// convention.
#[no_mangle]
#[unsafe(naked)]
pub unsafe extern "C" fn PendSV() {
    naked_asm!(
        "mrs r0, psp",
        "stmdb r0!, {{r4-r11}}",
        "bl {save_context}",
        "bl {do_schedule}",
        "ldmia r0!, {{r4-r11}}",
        "msr psp, r0",
        "mvn r0, #2",
        "bx r0",
        save_context = sym save_current_context,
        do_schedule = sym do_context_switch,
    );
}

/// Save the current task's stack pointer. Called from PendSV.
extern "C" fn save_current_context(psp: *mut u32) {
    let core = core_id();
    SCHEDULER.with(|s| {
        let current = s.current_task(core);
        s.tasks[current].stack_pointer = psp;
    });
}

/// Pick the next task for this core and return its saved PSP. Called from
/// PendSV.
extern "C" fn do_context_switch() -> *mut u32 {
    let core = core_id();
    SCHEDULER.with(|s| {
        let next = s.schedule(core);
        s.tasks[next].stack_pointer
    })
}

// ---------------------------------------------------------------------------
// SysTick handler
// ---------------------------------------------------------------------------

/// SysTick exception handler: scheduler tick entry point.
///
/// Keeps the cycle clock extended, advances the shared tick on core 0 and
/// pends a context switch when this core must reschedule.
#[no_mangle]
pub extern "C" fn SysTick() {
    let core = core_id();
    cycles();

    let reschedule = SCHEDULER.with(|s| {
        if core == 0 {
            s.tick();
        }
        s.needs_reschedule[core]
    });

    if reschedule {
        trigger_pendsv();
    }
}
