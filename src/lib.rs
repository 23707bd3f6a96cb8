//! # CeilOS: Ceiling-Priority Operating System
//!
//! A small preemptive, fixed-priority RTOS kernel for single-core
//! microcontrollers (ARM Cortex-M4), with priority-ceiling resources,
//! binary events and rate-monotonic periodic tasks.
//!
//! ## Overview
//!
//! - **Preemptive fixed priorities**: the most urgent READY task always
//!   runs. A *lower* number is a *higher* priority.
//! - **Immediate priority ceiling**: locking a resource raises the holder
//!   to the resource's ceiling, which rules out unbounded priority
//!   inversion and resource deadlock.
//! - **Binary events**: level-triggered, single consumer, no lost wakeups.
//! - **Periodic tasks**: tick-driven releases with deadline monitoring.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │             Application Tasks (fn bodies)               │
//! ├────────────────────────────────────────────────────────┤
//! │                Kernel Context (kernel.rs)               │
//! │     Kernel::new() · start_os() · shutdown_os() · trace  │
//! ├──────────────┬──────────────┬─────────────┬────────────┤
//! │  Scheduler   │  Resources   │   Events    │  Deadlines │
//! │ scheduler.rs │ resource.rs  │  event.rs   │ deadline.rs│
//! │ ─ create     │ ─ get        │ ─ set       │ ─ period   │
//! │ ─ resume     │ ─ release    │ ─ wait      │ ─ check    │
//! │ ─ terminate  │ ─ ceilings   │ ─ clear     │ ─ ticks    │
//! ├──────────────┴──────────────┴─────────────┴────────────┤
//! │     Task Model (task.rs) · Ready/Wait Queues (queue.rs) │
//! │        TCB · Priority · TaskState · Blocker · Wait      │
//! ├────────────────────────────────────────────────────────┤
//! │   Declarations (registry.rs) · Tick Latch (sync.rs)     │
//! └────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Execution Model
//!
//! Task bodies are plain functions, `fn(&mut Kernel, TaskId)`. A task that
//! becomes eligible and outranks the running one runs *nested* inside the
//! kernel call that made it eligible; the preempted body continues when
//! that call returns. A blocking call returns [`Wait::Blocked`] and the
//! body must return; it is entered again from the top once woken.
//!
//! ## Memory Model
//!
//! - **No heap**: every table is a fixed-capacity `heapless` collection
//! - **No `alloc`**: pure `core`
//! - **Fixed-size TCB pool**: `[TaskControlBlock; MAX_TASKS]`
//! - **Interrupts**: only signal a [`sync::TickLatch`]; the kernel itself
//!   is owned and driven by thread mode

#![no_std]

pub mod config;
pub mod deadline;
pub mod error;
pub mod event;
pub mod kernel;
pub mod queue;
pub mod registry;
pub mod resource;
pub mod scheduler;
pub mod sync;
pub mod task;
pub mod trace;

pub use deadline::{DeadlineMiss, DeadlineReport};
pub use error::{KernelError, KernelResult};
pub use event::EventId;
pub use kernel::{Kernel, Phase, TaskSnapshot};
pub use registry::{DeclId, EventDecl, Registry, ResourceDecl, TaskDecl};
pub use resource::{ResourceId, ResourceSnapshot};
pub use task::{Priority, TaskId, TaskState, Wait};
pub use trace::{TraceEvent, TraceRecord};
