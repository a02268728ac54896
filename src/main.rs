//! # rtprobe Firmware
//!
//! Runs the preemption experiment on a dual-core RP2350-class board:
//!
//! | Task | Priority | Core | Behavior |
//! |------|----------|------|----------|
//! | `Startup` | 5 | 0 | Calibrates the idle hook, creates the rest, deletes itself |
//! | `CPUUtil` | 3 | 0 | Reports per-core utilization every second |
//! | `High` | 2 | 0 | 5 ms busy work, 10 ms sleep |
//! | `Task A` | 1 | 0 | 20 ms busy work, 10 ms sleep |
//! | `Task B` | 1 | 1 | 30 ms busy work, 10 ms sleep |
//! | `Button` | 4 | any | Debounces the button on GPIO 15 |
//!
//! The workloads stop themselves 2000 ms after the window opens; the
//! monitor and the button task keep running. Output goes through the `log`
//! facade to the semihosting console.
//!
//! ## Expected Output
//!
//! - `High` shows `actual` close to `intended`; it is never preempted.
//! - `Task A` shows `actual` well above `intended`: `High` takes core 0
//!   from it every time it wakes.
//! - `Task B` has core 1 to itself.
//!
//! Core 1 is started by board bring-up, which must call
//! `rtprobe_core1_main` on it once `kernel::init` has run on core 0.

#![cfg_attr(target_os = "none", no_std)]
#![cfg_attr(target_os = "none", no_main)]

#[cfg(not(target_os = "none"))]
fn main() {}

#[cfg(target_os = "none")]
mod firmware {
    use cortex_m_rt::entry;
    use panic_halt as _;

    use rtprobe::config::{STACK_SIZE, STARTUP_PRIORITY};
    use rtprobe::debounce::DebounceFilter;
    use rtprobe::deferral::DeferralChannel;
    use rtprobe::error::Error;
    use rtprobe::harness::{self, EdgeSource, HarnessPlan, Launcher, Role, WORKLOADS};
    use rtprobe::kernel::{self, Rtos};
    use rtprobe::observe::{LogSink, TAG};
    use rtprobe::stats::{idle_hook, UtilizationEstimator, SCHED_STATS, SWITCH_MONITOR};
    use rtprobe::sync::KernelLock;
    use rtprobe::task::{CoreAffinity, TaskConfig, TaskEntry, TaskId};
    use rtprobe::window::ExperimentWindow;
    use rtprobe::workload::run_periodic;

    use super::board;

    static PLAN: HarnessPlan = HarnessPlan::DEFAULT;

    /// Window shared by the workloads. Closed until the startup task opens
    /// it, so a workload started early stops at once.
    static WINDOW: KernelLock<ExperimentWindow> = KernelLock::new(ExperimentWindow::new(0, 0));

    /// Button edges, from the GPIO interrupt to the debounce task.
    static BUTTON_EVENTS: DeferralChannel = DeferralChannel::new();

    const WORKLOAD_ENTRIES: [TaskEntry; WORKLOADS] =
        [workload_task::<0>, workload_task::<1>, workload_task::<2>];

    // -----------------------------------------------------------------------
    // Task entry points
    // -----------------------------------------------------------------------

    /// Runs the harness setup, then deletes itself.
    extern "C" fn startup_task() -> ! {
        let edge = EdgeSource {
            board: board::Board,
            events: &BUTTON_EVENTS,
            on_edge,
        };
        if harness::start(&Rtos, &SCHED_STATS, &LogSink, &mut FirmwareLauncher, edge, &PLAN).is_err() {
            log::error!(target: TAG, "setup aborted");
        }
        kernel::delete_current()
    }

    extern "C" fn monitor_task() -> ! {
        UtilizationEstimator::new(&SCHED_STATS).run(&Rtos, &LogSink, PLAN.monitor.interval_ms)
    }

    /// Workload `N` of the plan.
    extern "C" fn workload_task<const N: usize>() -> ! {
        let window = WINDOW.with(|w| *w);
        run_periodic(&Rtos, &PLAN.workloads[N], window, &LogSink, Some(&SWITCH_MONITOR));
        kernel::delete_current()
    }

    extern "C" fn debounce_task() -> ! {
        let Some(plan) = PLAN.debounce else {
            kernel::delete_current()
        };
        let line = board::InputLine::new(plan.config.input);
        DebounceFilter::new(&BUTTON_EVENTS, line, plan.config).run(&Rtos, &LogSink)
    }

    /// GPIO edge interrupt: defer everything to the debounce task.
    fn on_edge() {
        BUTTON_EVENTS.signal(&Rtos);
    }

    struct FirmwareLauncher;

    impl Launcher for FirmwareLauncher {
        fn open_window(&mut self, window: ExperimentWindow) {
            WINDOW.with(|w| *w = window);
        }

        fn spawn(&mut self, role: Role, config: TaskConfig) -> Result<TaskId, Error> {
            let entry: TaskEntry = match role {
                Role::Monitor => monitor_task,
                Role::Workload(index) => WORKLOAD_ENTRIES[index],
                Role::Debounce => debounce_task,
            };
            kernel::create_task(entry, config)
        }
    }

    // -----------------------------------------------------------------------
    // Entry points
    // -----------------------------------------------------------------------

    /// Core 0 entry. Initializes the kernel, creates the startup task and
    /// starts scheduling. Does not return.
    #[entry]
    fn main() -> ! {
        let cp = cortex_m::Peripherals::take().unwrap();

        super::logger::init(log::LevelFilter::Info);

        kernel::init();
        kernel::register_idle_hook(idle_hook);

        kernel::create_task(
            startup_task,
            TaskConfig {
                name: "Startup",
                priority: STARTUP_PRIORITY,
                affinity: CoreAffinity::Pinned(0),
                stack_bytes: STACK_SIZE,
            },
        )
        .expect("Failed to create startup task");

        kernel::start_core(cp)
    }

    /// Core 1 entry, called by board bring-up.
    #[no_mangle]
    pub extern "C" fn rtprobe_core1_main() -> ! {
        // Safety: the core peripherals are banked per core; this core's copy
        // is not otherwise owned.
        let cp = unsafe { cortex_m::Peripherals::steal() };
        kernel::start_core(cp)
    }
}

// ---------------------------------------------------------------------------
// Semihosting logger
// ---------------------------------------------------------------------------

#[cfg(target_os = "none")]
mod logger {
    use cortex_m_semihosting::hprintln;
    use log::{LevelFilter, Log, Metadata, Record};
    use rtprobe::sync::KernelLock;

    /// `log` backend printing `[LEVEL target] message` lines.
    struct Semihosting {
        console: KernelLock<()>,
    }

    static LOGGER: Semihosting = Semihosting {
        console: KernelLock::new(()),
    };

    impl Log for Semihosting {
        fn enabled(&self, metadata: &Metadata) -> bool {
            metadata.level() <= log::max_level()
        }

        fn log(&self, record: &Record) {
            if !self.enabled(record.metadata()) {
                return;
            }
            // One line at a time across both cores.
            self.console.with(|_| {
                hprintln!("[{} {}] {}", record.level(), record.target(), record.args());
            });
        }

        fn flush(&self) {}
    }

    pub fn init(level: LevelFilter) {
        if log::set_logger(&LOGGER).is_ok() {
            log::set_max_level(level);
        }
    }
}

// ---------------------------------------------------------------------------
// Board support (RP2350)
// ---------------------------------------------------------------------------

#[cfg(target_os = "none")]
mod board {
    use core::ptr::{read_volatile, write_volatile};

    use cortex_m::interrupt::InterruptNumber;
    use cortex_m::peripheral::NVIC;
    use cortex_m_rt::exception;

    use rtprobe::error::Error;
    use rtprobe::input::{Edge, EdgeInput, InputConfig, InputPin, Level, Pull};
    use rtprobe::sync::KernelLock;

    const SIO_CPUID: *const u32 = 0xd000_0000 as *const u32;
    const SIO_GPIO_IN: *const u32 = 0xd000_0004 as *const u32;

    const IO_BANK0: usize = 0x4002_8000;
    const INTR0: usize = 0x230;
    const PROC0_INTE0: usize = 0x248;
    const FUNCSEL_SIO: u32 = 5;

    const PADS_BANK0: usize = 0x4003_8000;
    const PAD_ISO: u32 = 1 << 8;
    const PAD_OD: u32 = 1 << 7;
    const PAD_IE: u32 = 1 << 6;
    const PAD_PUE: u32 = 1 << 3;
    const PAD_PDE: u32 = 1 << 2;

    const GPIO_COUNT: u8 = 30;

    /// Per-pin event bits in the INTRx / PROC0_INTEx registers.
    const EVENT_EDGE_LOW: u32 = 1 << 2;
    const EVENT_EDGE_HIGH: u32 = 1 << 3;

    #[derive(Clone, Copy)]
    struct IoIrqBank0;

    // Safety: 21 is IO_IRQ_BANK0 in the RP2350 vector table.
    unsafe impl InterruptNumber for IoIrqBank0 {
        fn number(self) -> u16 {
            21
        }
    }

    #[derive(Clone, Copy)]
    struct EdgeHandler {
        pin: u8,
        mask: u32,
        handler: fn(),
    }

    static INPUT: KernelLock<Option<InputConfig>> = KernelLock::new(None);
    static EDGE_HANDLER: KernelLock<Option<EdgeHandler>> = KernelLock::new(None);

    #[inline]
    fn reg(base: usize, offset: usize) -> *mut u32 {
        (base + offset) as *mut u32
    }

    /// Offset of the INTRx / INTEx register holding `pin`'s events.
    #[inline]
    fn event_reg_offset(pin: u8) -> usize {
        4 * (pin as usize / 8)
    }

    fn event_mask(pin: u8, edge: Edge) -> u32 {
        let events = match edge {
            Edge::Falling => EVENT_EDGE_LOW,
            Edge::Rising => EVENT_EDGE_HIGH,
            Edge::Both => EVENT_EDGE_LOW | EVENT_EDGE_HIGH,
        };
        events << (4 * (pin as u32 % 8))
    }

    /// Core index hook used by the kernel port.
    #[no_mangle]
    fn _rtprobe_core_id() -> usize {
        // Safety: CPUID is a read-only SIO register.
        unsafe { read_volatile(SIO_CPUID) as usize }
    }

    pub struct Board;

    impl EdgeInput for Board {
        fn configure_input(&mut self, config: &InputConfig) -> Result<(), Error> {
            if config.pin >= GPIO_COUNT {
                return Err(Error::InputConfig { pin: config.pin });
            }
            let pin = config.pin as usize;
            let pull = match config.pull {
                Pull::None => 0,
                Pull::Up => PAD_PUE,
                Pull::Down => PAD_PDE,
            };
            // Safety: pad and IO control registers of a pin this firmware
            // owns.
            unsafe {
                let pad = reg(PADS_BANK0, 4 + 4 * pin);
                let value = read_volatile(pad) & !(PAD_ISO | PAD_OD | PAD_PUE | PAD_PDE);
                write_volatile(pad, value | PAD_IE | pull);
                write_volatile(reg(IO_BANK0, 8 * pin + 4), FUNCSEL_SIO);
            }
            INPUT.with(|slot| *slot = Some(*config));
            Ok(())
        }

        fn register_edge_interrupt(&mut self, pin: u8, handler: fn()) -> Result<(), Error> {
            let edge = INPUT
                .with(|slot| *slot)
                .filter(|config| config.pin == pin)
                .map(|config| config.edge)
                .ok_or(Error::InterruptRegistration { pin })?;
            let mask = event_mask(pin, edge);

            let installed = EDGE_HANDLER.with(|slot| {
                if slot.is_some() {
                    return false;
                }
                *slot = Some(EdgeHandler { pin, mask, handler });
                true
            });
            if !installed {
                return Err(Error::InterruptRegistration { pin });
            }

            let offset = event_reg_offset(pin);
            // Safety: clears stale edges and enables this pin's events for
            // core 0 only; the handler is installed above.
            unsafe {
                write_volatile(reg(IO_BANK0, INTR0 + offset), mask);
                let inte = reg(IO_BANK0, PROC0_INTE0 + offset);
                write_volatile(inte, read_volatile(inte) | mask);
                NVIC::unmask(IoIrqBank0);
            }
            Ok(())
        }
    }

    /// Level of the configured input, read from SIO.
    pub struct InputLine {
        config: InputConfig,
    }

    impl InputLine {
        pub const fn new(config: InputConfig) -> Self {
            Self { config }
        }
    }

    impl InputPin for InputLine {
        fn read_level(&self) -> Level {
            // Safety: GPIO_IN is a read-only SIO register.
            let bits = unsafe { read_volatile(SIO_GPIO_IN) };
            self.config.level((bits & (1 << self.config.pin)) != 0)
        }
    }

    /// Device interrupts without a dedicated handler land here.
    #[exception]
    unsafe fn DefaultHandler(irqn: i16) {
        if irqn != IoIrqBank0.number() as i16 {
            return;
        }
        let Some(edge) = EDGE_HANDLER.with(|slot| *slot) else {
            return;
        };
        let intr = reg(IO_BANK0, INTR0 + event_reg_offset(edge.pin));
        let pending = read_volatile(intr) & edge.mask;
        if pending != 0 {
            // Edge events are write-1-to-clear.
            write_volatile(intr, pending);
            (edge.handler)();
        }
    }
}
