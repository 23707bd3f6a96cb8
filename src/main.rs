//! # CeilOS Demo Firmware
//!
//! Runs four demonstration scenarios from an idle task:
//!
//! | Scenario | What it shows |
//! |----------|---------------|
//! | Preemption | `Low` preempts `Idle` and waits; `Medium` preempts `Idle` |
//! | Resources | `Medium` holds `Res1` at ceiling `P1`, so `High` waits for the release |
//! | Events | `Idle` sets `Event1`; `Low` wakes and runs to completion |
//! | RMA | Three periodic tasks (periods 2/5/10) over 20 ticks |
//!
//! | Task | Priority | Body |
//! |------|----------|------|
//! | `Idle` | 16 | Drives the scenarios |
//! | `High` | 1 | Signals `Event2` and terminates |
//! | `Medium` | 5 | Locks `Res1`, activates `High`, releases |
//! | `Low` | 10 | Waits for `Event1`, then uses `Res2` |
//! | `Rate2` / `Rate5` / `Rate10` | 2 / 6 / 11 | Periodic jobs |
//!
//! On the host the kernel logs to the console and shuts down after the
//! scenarios. On Cortex-M it keeps servicing SysTick so the periodic tasks
//! go on being released.

#![cfg_attr(target_os = "none", no_std)]
#![cfg_attr(target_os = "none", no_main)]

use ceilos::event::EventId;
use ceilos::kernel::Kernel;
use ceilos::registry::{ceiling_of, DeclId, EventDecl, Registry, ResourceDecl, TaskDecl};
use ceilos::resource::ResourceId;
use ceilos::task::{Priority, TaskId};
use ceilos::KernelResult;

// ---------------------------------------------------------------------------
// Declarations
// ---------------------------------------------------------------------------

const IDLE_PRIO: Priority = Priority(16);
const HIGH_PRIO: Priority = Priority(1);
const MEDIUM_PRIO: Priority = Priority(5);
const LOW_PRIO: Priority = Priority(10);

const IDLE: DeclId = DeclId(0);
const HIGH: DeclId = DeclId(1);
const MEDIUM: DeclId = DeclId(2);
const LOW: DeclId = DeclId(3);
const RATE_TASKS: [(DeclId, u32); 3] = [(DeclId(4), 2), (DeclId(5), 5), (DeclId(6), 10)];

const RES1: ResourceId = ResourceId(0);
const RES2: ResourceId = ResourceId(1);
const EVENT1: EventId = EventId(0);
const EVENT2: EventId = EventId(1);

/// Ticks the RMA scenario runs for.
const RMA_TICKS: u32 = 20;

static TASKS: [TaskDecl; 7] = [
    TaskDecl::new("Idle", IDLE_PRIO, idle_task),
    TaskDecl::new("High", HIGH_PRIO, high_task),
    TaskDecl::new("Medium", MEDIUM_PRIO, medium_task),
    TaskDecl::new("Low", LOW_PRIO, low_task),
    TaskDecl::new("Rate2", Priority(2), periodic_job),
    TaskDecl::new("Rate5", Priority(6), periodic_job),
    TaskDecl::new("Rate10", Priority(11), periodic_job),
];

static RESOURCES: [ResourceDecl; 2] = [
    // High only runs while Medium holds Res1, so both count as lockers.
    ResourceDecl::new("Res1", ceiling_of(&[MEDIUM_PRIO, HIGH_PRIO])),
    ResourceDecl::new("Res2", ceiling_of(&[LOW_PRIO, Priority(8)])),
];

static EVENTS: [EventDecl; 2] = [EventDecl::new("Event1"), EventDecl::new("Event2")];

static REGISTRY: Registry = Registry::new(&TASKS, &RESOURCES, &EVENTS);

// ---------------------------------------------------------------------------
// Task bodies
// ---------------------------------------------------------------------------

/// Runs every scenario in order, then terminates.
fn idle_task(k: &mut Kernel, id: TaskId) -> KernelResult<()> {
    log::info!("Idle: starting scenarios");
    preemption_scenario(k)?;
    resource_scenario(k)?;
    event_scenario(k)?;
    rma_scenario(k)?;
    log::info!("Idle: all scenarios complete");
    k.terminate_task(id)
}

fn high_task(k: &mut Kernel, id: TaskId) -> KernelResult<()> {
    log::info!("High: running at {}", k.effective_priority(id)?);
    // Nobody waits for Event2; the pulse stays set.
    k.set_event(EVENT2)?;
    k.terminate_task(id)
}

fn medium_task(k: &mut Kernel, id: TaskId) -> KernelResult<()> {
    log::info!("Medium: running");
    if k.get_resource(id, RES1)?.is_blocked() {
        return Ok(());
    }
    log::info!("Medium: holds Res1 at {}", k.effective_priority(id)?);

    let high_prio = k.registry().task(HIGH)?.priority;
    k.activate_task(HIGH, high_prio)?;
    log::info!("Medium: continuing, High has not run yet");

    k.release_resource(id, RES1)?;
    log::info!("Medium: released Res1, back at {}", k.effective_priority(id)?);
    k.terminate_task(id)
}

fn low_task(k: &mut Kernel, id: TaskId) -> KernelResult<()> {
    log::info!("Low: waiting for Event1");
    if k.wait_event(id, EVENT1)?.is_blocked() {
        return Ok(());
    }
    log::info!("Low: Event1 received");

    if k.get_resource(id, RES2)?.is_blocked() {
        return Ok(());
    }
    log::info!("Low: holds Res2 at {}", k.effective_priority(id)?);
    k.release_resource(id, RES2)?;
    k.terminate_task(id)
}

fn periodic_job(k: &mut Kernel, id: TaskId) -> KernelResult<()> {
    let info = k.task_info(id)?;
    log::info!(
        "{}: activation {} at tick {}",
        info.name,
        info.activations,
        k.tick_count()
    );
    k.terminate_task(id)
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

fn preemption_scenario(k: &mut Kernel) -> KernelResult<()> {
    log::info!("--- Preemption ---");
    let low = k.create_task(LOW, LOW_PRIO)?;
    // Low preempts Idle at once and blocks on Event1.
    k.resume_task(low)?;
    log::info!("Idle: Low is {:?}", k.task_state(low)?);
    Ok(())
}

fn resource_scenario(k: &mut Kernel) -> KernelResult<()> {
    log::info!("--- Resources ---");
    k.activate_task(MEDIUM, MEDIUM_PRIO)?;
    log::info!("Idle: Res1 owner is {:?}", k.resource_owner(RES1)?);
    Ok(())
}

fn event_scenario(k: &mut Kernel) -> KernelResult<()> {
    log::info!("--- Events ---");
    k.set_event(EVENT1)?;
    if k.event_is_set(EVENT2)? {
        log::info!("Idle: clearing the unclaimed Event2 pulse");
        k.clear_event(EVENT2)?;
    }
    Ok(())
}

fn rma_scenario(k: &mut Kernel) -> KernelResult<()> {
    log::info!("--- RMA ---");
    for (decl, period) in RATE_TASKS {
        let priority = k.registry().task(decl)?.priority;
        let id = k.create_task(decl, priority)?;
        k.set_task_period(id, period)?;
        k.set_task_deadline(id, period)?;
        k.resume_task(id)?;
    }

    let mut misses = 0;
    for _ in 0..RMA_TICKS {
        misses += k.advance_tick()?.misses.len();
    }

    for task in k.tasks().filter(|t| t.period > 0) {
        log::info!(
            "{}: period {}, {} activations, {} misses",
            task.name,
            task.period,
            task.activations,
            task.deadline_misses
        );
    }
    log::info!("Idle: {} deadline misses over {} ticks", misses, RMA_TICKS);
    Ok(())
}

// ---------------------------------------------------------------------------
// Host entry point
// ---------------------------------------------------------------------------

#[cfg(not(target_os = "none"))]
mod console {
    /// Logger that prints kernel records to stdout.
    pub struct ConsoleLogger;

    impl log::Log for ConsoleLogger {
        fn enabled(&self, _metadata: &log::Metadata) -> bool {
            true
        }

        fn log(&self, record: &log::Record) {
            if self.enabled(record.metadata()) {
                std::println!("[{:5}] {}: {}", record.level(), record.target(), record.args());
            }
        }

        fn flush(&self) {}
    }

    static LOGGER: ConsoleLogger = ConsoleLogger;

    pub fn init_logger() {
        log::set_logger(&LOGGER).expect("logger already installed");
        log::set_max_level(log::LevelFilter::Debug);
    }
}

#[cfg(not(target_os = "none"))]
fn main() {
    console::init_logger();

    let mut kernel = Kernel::new(&REGISTRY).expect("invalid declarations");
    kernel.start_os(IDLE).expect("kernel start failed");

    for task in kernel.tasks() {
        log::info!(
            "{} ({}): {:?} at {}",
            task.id,
            task.name,
            task.state,
            task.effective_priority
        );
    }
    kernel.shutdown_os().expect("kernel shutdown failed");
}

// ---------------------------------------------------------------------------
// Cortex-M entry point
// ---------------------------------------------------------------------------

#[cfg(target_os = "none")]
mod firmware {
    use cortex_m::peripheral::syst::SystClkSource;
    use cortex_m_rt::{entry, exception};
    use panic_halt as _;

    use ceilos::config::{SYSTEM_CLOCK_HZ, TICK_HZ};
    use ceilos::kernel::Kernel;
    use ceilos::sync::TickLatch;

    /// Ticks raised by SysTick, drained in thread mode.
    static TICKS: TickLatch = TickLatch::new();

    /// Configure SysTick to fire at `TICK_HZ`.
    fn configure_systick(syst: &mut cortex_m::peripheral::SYST) {
        let reload = SYSTEM_CLOCK_HZ / TICK_HZ - 1;
        syst.set_reload(reload);
        syst.clear_current();
        syst.set_clock_source(SystClkSource::Core);
        syst.enable_counter();
        syst.enable_interrupt();
    }

    /// Firmware entry point. Runs the scenarios, then services ticks
    /// forever. Does not return.
    #[entry]
    fn main() -> ! {
        let mut cp = cortex_m::Peripherals::take().expect("core peripherals already taken");

        let mut kernel = Kernel::new(&super::REGISTRY).expect("invalid declarations");
        kernel.start_os(super::IDLE).expect("kernel start failed");

        configure_systick(&mut cp.SYST);

        loop {
            cortex_m::asm::wfi();
            if let Err(err) = kernel.service_ticks(&TICKS) {
                log::error!("tick service failed: {}", err);
            }
        }
    }

    #[exception]
    fn SysTick() {
        TICKS.signal();
    }
}
