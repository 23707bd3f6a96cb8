//! # Kernel
//!
//! The kernel context object and its read-only observability surface.
//!
//! All kernel state (task pool, resource and event tables, ready queue,
//! tick counter) lives in one owned [`Kernel`] value that every operation
//! borrows mutably. There is no global scheduler: a
//! firmware image keeps one kernel in thread mode, and tests build as
//! many independent kernels as they like.
//!
//! The operations themselves are split by component:
//!
//! | Module | Operations |
//! |--------|------------|
//! | `scheduler.rs` | `create_task` · `resume_task` · `activate_task` · `terminate_task` · `start_os` · `shutdown_os` |
//! | `resource.rs`  | `get_resource` · `release_resource` |
//! | `event.rs`     | `set_event` · `wait_event` · `clear_event` |
//! | `deadline.rs`  | `set_task_period` · `set_task_deadline` · `check_deadlines` · tick servicing |
//!
//! ## Startup Sequence
//!
//! ```text
//! Kernel::new(&REGISTRY)      ← Build tables from the declarations
//!   ├─► create_task() / set_task_period()   (optional, before start)
//!   └─► start_os(initial)     ← Activate the initial task, run until idle
//!         └─► task bodies call back into the kernel; every
//!             eligibility change ends in a dispatch
//! ```

use heapless::Vec;

use crate::config::{MAX_EVENTS, MAX_RESOURCES, MAX_TASKS};
use crate::error::{KernelError, KernelResult};
use crate::event::EventControlBlock;
use crate::queue::TaskQueue;
use crate::registry::Registry;
use crate::resource::{ResourceControlBlock, ResourceId, ResourceSnapshot};
use crate::task::{Priority, TaskControlBlock, TaskId, TaskState};
use crate::trace::{Trace, TraceEvent};

/// Kernel lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Built, not yet started. Tasks may be created and queued.
    Configuring,
    /// `start_os` was called; dispatching is live.
    Running,
    /// `shutdown_os` was called; every scheduling call fails.
    Halted,
}

/// Read-only view of one task, for the task state table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskSnapshot {
    pub id: TaskId,
    pub name: &'static str,
    pub state: TaskState,
    pub base_priority: Priority,
    pub effective_priority: Priority,
    pub ceiling_priority: Option<Priority>,
    pub period: u32,
    pub deadline: u32,
    pub activations: u32,
    pub deadline_misses: u32,
}

impl From<&TaskControlBlock> for TaskSnapshot {
    fn from(tcb: &TaskControlBlock) -> Self {
        Self {
            id: tcb.id,
            name: tcb.name,
            state: tcb.state,
            base_priority: tcb.base_priority,
            effective_priority: tcb.effective_priority,
            ceiling_priority: tcb.ceiling_priority(),
            period: tcb.period,
            deadline: tcb.relative_deadline(),
            activations: tcb.activations,
            deadline_misses: tcb.deadline_misses,
        }
    }
}

/// The kernel context. Owns every kernel table.
pub struct Kernel {
    pub(crate) registry: &'static Registry,

    /// Fixed-size pool of control blocks, indexed by `TaskId`.
    pub(crate) tasks: [TaskControlBlock; MAX_TASKS],

    pub(crate) resources: Vec<ResourceControlBlock, MAX_RESOURCES>,

    pub(crate) events: Vec<EventControlBlock, MAX_EVENTS>,

    /// READY tasks that have not started their current run.
    pub(crate) ready: TaskQueue,

    /// READY tasks whose bodies were interrupted by a preemption, innermost
    /// last. They resume when the nested dispatch returns to them.
    pub(crate) preempted: Vec<TaskId, MAX_TASKS>,

    /// The RUNNING task, if any.
    pub(crate) running: Option<TaskId>,

    /// Monotonic system tick counter.
    pub(crate) tick: u64,

    /// Monotonic sequence for FIFO ordering within a priority band.
    pub(crate) seq: u64,

    pub(crate) phase: Phase,

    pub(crate) trace: Trace,
}

impl Kernel {
    /// Build a kernel from static declarations.
    ///
    /// # Errors
    /// `TooManyDeclarations` if a table exceeds the configured capacity.
    pub fn new(registry: &'static Registry) -> KernelResult<Self> {
        registry.validate()?;

        let mut resources = Vec::new();
        for (i, decl) in registry.resources.iter().enumerate() {
            resources
                .push(ResourceControlBlock::new(ResourceId(i), decl))
                .map_err(|_| KernelError::TooManyDeclarations)?;
        }

        let mut events = Vec::new();
        for (i, decl) in registry.events.iter().enumerate() {
            events
                .push(EventControlBlock::new(crate::event::EventId(i), decl))
                .map_err(|_| KernelError::TooManyDeclarations)?;
        }

        log::debug!(
            "kernel built: {} task decls, {} resources, {} events",
            registry.tasks.len(),
            resources.len(),
            events.len()
        );

        Ok(Self {
            registry,
            tasks: core::array::from_fn(|i| TaskControlBlock::empty(TaskId(i))),
            resources,
            events,
            ready: TaskQueue::new(),
            preempted: Vec::new(),
            running: None,
            tick: 0,
            seq: 0,
            phase: Phase::Configuring,
            trace: Trace::new(),
        })
    }

    // -----------------------------------------------------------------------
    // Observability
    // -----------------------------------------------------------------------

    pub fn registry(&self) -> &'static Registry {
        self.registry
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Current value of the monotonic tick counter.
    pub fn tick_count(&self) -> u64 {
        self.tick
    }

    /// The RUNNING task, if any.
    pub fn running_task(&self) -> Option<TaskId> {
        self.running
    }

    /// State of a pool slot. Free slots report `Dormant`.
    pub fn task_state(&self, id: TaskId) -> KernelResult<TaskState> {
        self.tasks
            .get(id.0)
            .map(|t| t.state)
            .ok_or(KernelError::InvalidTask)
    }

    pub fn effective_priority(&self, id: TaskId) -> KernelResult<Priority> {
        self.tcb(id).map(|t| t.effective_priority)
    }

    /// Snapshot of one bound task.
    pub fn task_info(&self, id: TaskId) -> KernelResult<TaskSnapshot> {
        self.tcb(id).map(TaskSnapshot::from)
    }

    /// Task state table: every bound slot, in slot order.
    pub fn tasks(&self) -> impl Iterator<Item = TaskSnapshot> + '_ {
        self.tasks
            .iter()
            .filter(|t| !t.is_free())
            .map(TaskSnapshot::from)
    }

    /// Owner of a resource, `None` when free.
    pub fn resource_owner(&self, res: ResourceId) -> KernelResult<Option<TaskId>> {
        self.rcb(res).map(|r| r.owner)
    }

    /// Resource ownership table.
    pub fn resources(&self) -> impl Iterator<Item = ResourceSnapshot> + '_ {
        self.resources.iter().map(ResourceSnapshot::from)
    }

    pub fn trace(&self) -> &Trace {
        &self.trace
    }

    // -----------------------------------------------------------------------
    // Internal helpers
    // -----------------------------------------------------------------------

    /// Bound control block for `id`.
    pub(crate) fn tcb(&self, id: TaskId) -> KernelResult<&TaskControlBlock> {
        match self.tasks.get(id.0) {
            Some(tcb) if !tcb.is_free() => Ok(tcb),
            _ => Err(KernelError::InvalidTask),
        }
    }

    pub(crate) fn tcb_mut(&mut self, id: TaskId) -> KernelResult<&mut TaskControlBlock> {
        match self.tasks.get_mut(id.0) {
            Some(tcb) if !tcb.is_free() => Ok(tcb),
            _ => Err(KernelError::InvalidTask),
        }
    }

    pub(crate) fn rcb(&self, res: ResourceId) -> KernelResult<&ResourceControlBlock> {
        self.resources.get(res.0).ok_or(KernelError::InvalidResource)
    }

    pub(crate) fn next_seq(&mut self) -> u64 {
        self.seq += 1;
        self.seq
    }

    pub(crate) fn record(&mut self, event: TraceEvent) {
        self.trace.record(self.tick, event);
    }

    /// Fails once the kernel is halted.
    pub(crate) fn ensure_not_halted(&self) -> KernelResult<()> {
        if self.phase == Phase::Halted {
            return Err(KernelError::KernelNotRunning);
        }
        Ok(())
    }

    /// Fails unless `start_os` has run and `shutdown_os` has not.
    pub(crate) fn ensure_running(&self) -> KernelResult<()> {
        if self.phase != Phase::Running {
            return Err(KernelError::KernelNotRunning);
        }
        Ok(())
    }

    /// Validate the caller of an operation that acts on the calling task.
    pub(crate) fn ensure_caller(&self, caller: TaskId) -> KernelResult<()> {
        self.ensure_running()?;
        self.tcb(caller)?;
        if self.running != Some(caller) {
            return Err(KernelError::CallerNotRunning);
        }
        Ok(())
    }
}
