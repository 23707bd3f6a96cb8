//! # Task Control Block
//!
//! Defines the task model for CeilOS. Control blocks live in a fixed-size
//! pool owned by the kernel and are addressed by slot index ([`TaskId`]),
//! never by pointer, so a stale id can only ever name a slot.
//!
//! ## Priorities
//!
//! A *lower* number is a *higher* priority: `Priority(1)` outranks
//! `Priority(5)`. Every comparison in the kernel goes through
//! [`Priority::outranks`] and [`Priority::most_urgent`] so that the numeric
//! direction is spelled out in one place.
//!
//! ## Effective priority
//!
//! A task runs at its *effective* priority: the most urgent of its base
//! priority and the ceilings of every resource it currently holds. The
//! control block caches the ceiling of each held resource alongside the id,
//! so the effective priority can be recomputed without touching the
//! resource table.

use core::fmt;

use heapless::Vec;

use crate::config::MAX_NESTED_RESOURCES;
use crate::error::KernelResult;
use crate::kernel::Kernel;
use crate::registry::DeclId;
use crate::resource::ResourceId;
use crate::event::EventId;

// ---------------------------------------------------------------------------
// Identifiers and priorities
// ---------------------------------------------------------------------------

/// Pool slot index of a task control block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId(pub usize);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "T{}", self.0)
    }
}

/// Scheduling priority. Lower numbers are more urgent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Priority(pub u8);

impl Priority {
    /// The most urgent priority.
    pub const HIGHEST: Priority = Priority(0);
    /// The least urgent priority, usually given to an idle task.
    pub const LOWEST: Priority = Priority(u8::MAX);

    /// Returns `true` if `self` is strictly more urgent than `other`.
    #[inline]
    pub const fn outranks(self, other: Priority) -> bool {
        self.0 < other.0
    }

    /// The more urgent of two priorities.
    #[inline]
    pub const fn most_urgent(self, other: Priority) -> Priority {
        if other.outranks(self) {
            other
        } else {
            self
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P{}", self.0)
    }
}

/// Entry point of a task body.
///
/// The kernel passes the task's own id, so bodies never consult a global
/// "current task". A body that returns while still running is terminated;
/// a body that returns `Err` is logged and terminated.
pub type TaskEntry = fn(&mut Kernel, TaskId) -> KernelResult<()>;

// ---------------------------------------------------------------------------
// Task state machine
// ---------------------------------------------------------------------------

/// Execution state of a task in the scheduler's state machine.
///
/// ```text
///                create()         resume()          dispatch()
///   ┌─────────┐ ───────► ┌───────────┐ ───────► ┌───────┐ ───────► ┌─────────┐
///   │ Dormant │          │ Suspended │          │ Ready │ ◄─────── │ Running │
///   └─────────┘          └───────────┘          └───────┘  preempt └─────────┘
///        ▲  ▲                                        ▲                │   │
///        │  │ resume() (periodic)                    │  set/release   │   │
///        │  └────────────────────────────────────────┘  ┌─────────┐  │   │
///        │                                               │ Waiting │◄─┘   │
///        │                  terminate()                  └─────────┘ wait │
///        └────────────────────────────────────────────────────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// No live activation. Either a free slot, or a terminated periodic
    /// task waiting for its next release.
    Dormant,
    /// Created but not yet resumed.
    Suspended,
    /// Eligible to run.
    Ready,
    /// Currently executing. At most one task is in this state.
    Running,
    /// Blocked on a resource or an event.
    Waiting,
}

/// What a waiting task is blocked on, or what a wake delivered to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Blocker {
    Resource(ResourceId),
    Event(EventId),
}

/// Outcome of an operation that may block the caller.
#[must_use = "a blocked task must return from its body"]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wait {
    /// The operation completed; the body may continue.
    Proceed,
    /// The caller is now waiting. The body must return; it is entered
    /// again from the top once the wait is satisfied.
    Blocked,
}

impl Wait {
    #[inline]
    pub fn is_blocked(self) -> bool {
        self == Wait::Blocked
    }
}

// ---------------------------------------------------------------------------
// Task Control Block
// ---------------------------------------------------------------------------

/// A resource currently held by a task, with its ceiling cached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeldResource {
    pub resource: ResourceId,
    pub ceiling: Priority,
}

/// Task Control Block (TCB): the per-slot state of one task.
///
/// A slot is *bound* to a declaration while `decl` is `Some`. Aperiodic
/// tasks give their slot back on termination; periodic tasks keep it bound
/// and dormant so the deadline monitor can release them again.
#[derive(Debug, Clone)]
pub struct TaskControlBlock {
    /// Slot index in the pool.
    pub id: TaskId,

    /// Declaration this slot is bound to, `None` for a free slot.
    pub decl: Option<DeclId>,

    /// Diagnostic name copied from the declaration.
    pub name: &'static str,

    /// Body entry point.
    pub entry: Option<TaskEntry>,

    pub state: TaskState,

    /// Static priority given at creation.
    pub base_priority: Priority,

    /// Operating priority, elevated while holding ceiling resources.
    pub effective_priority: Priority,

    /// Held resources in acquisition order (last = most recent).
    pub held: Vec<HeldResource, MAX_NESTED_RESOURCES>,

    /// Set while `state == Waiting`.
    pub blocked_on: Option<Blocker>,

    /// Delivered by the wake that readied this task; consumed by the
    /// repeated blocking call when the body is entered again.
    pub wake: Option<Blocker>,

    /// Release period in ticks, 0 for aperiodic tasks.
    pub period: u32,

    /// Relative deadline in ticks, 0 means "same as the period".
    pub deadline: u32,

    /// Ticks until the next periodic release.
    pub period_remaining: u32,

    /// Ticks until the current activation's deadline, `None` when no
    /// activation is outstanding.
    pub deadline_remaining: Option<u32>,

    /// A miss was already reported for the current activation.
    pub miss_reported: bool,

    /// Number of times this task has been resumed.
    pub activations: u32,

    /// Number of deadline misses recorded.
    pub deadline_misses: u32,
}

impl TaskControlBlock {
    /// Create an empty (unbound) TCB. Used to initialize the pool.
    pub const fn empty(id: TaskId) -> Self {
        Self {
            id,
            decl: None,
            name: "",
            entry: None,
            state: TaskState::Dormant,
            base_priority: Priority::LOWEST,
            effective_priority: Priority::LOWEST,
            held: Vec::new(),
            blocked_on: None,
            wake: None,
            period: 0,
            deadline: 0,
            period_remaining: 0,
            deadline_remaining: None,
            miss_reported: false,
            activations: 0,
            deadline_misses: 0,
        }
    }

    /// Bind this slot to a declaration. The task starts out suspended.
    pub fn bind(&mut self, decl: DeclId, name: &'static str, entry: TaskEntry, priority: Priority) {
        *self = Self::empty(self.id);
        self.decl = Some(decl);
        self.name = name;
        self.entry = Some(entry);
        self.state = TaskState::Suspended;
        self.base_priority = priority;
        self.effective_priority = priority;
    }

    /// Return the slot to the pool.
    pub fn unbind(&mut self) {
        *self = Self::empty(self.id);
    }

    /// Whether the slot is free for a new task.
    #[inline]
    pub fn is_free(&self) -> bool {
        self.decl.is_none()
    }

    /// Whether the task has an outstanding activation.
    #[inline]
    pub fn is_active(&self) -> bool {
        matches!(self.state, TaskState::Ready | TaskState::Running | TaskState::Waiting)
    }

    #[inline]
    pub fn is_periodic(&self) -> bool {
        self.period > 0
    }

    /// Relative deadline, defaulting to the period.
    #[inline]
    pub fn relative_deadline(&self) -> u32 {
        if self.deadline > 0 {
            self.deadline
        } else {
            self.period
        }
    }

    /// Whether `resource` is held by this task.
    pub fn holds(&self, resource: ResourceId) -> bool {
        self.held.iter().any(|h| h.resource == resource)
    }

    /// Highest ceiling among the held resources.
    pub fn ceiling_priority(&self) -> Option<Priority> {
        self.held
            .iter()
            .map(|h| h.ceiling)
            .reduce(Priority::most_urgent)
    }

    /// Recompute the effective priority from the base priority and the
    /// ceilings still held.
    pub fn recompute_priority(&mut self) {
        self.effective_priority = match self.ceiling_priority() {
            Some(ceiling) => self.base_priority.most_urgent(ceiling),
            None => self.base_priority,
        };
    }

    /// Record a newly acquired resource and raise the effective priority.
    /// Returns `false` if the nesting depth is exhausted.
    pub fn push_held(&mut self, resource: ResourceId, ceiling: Priority) -> bool {
        if self.held.push(HeldResource { resource, ceiling }).is_err() {
            return false;
        }
        self.effective_priority = self.effective_priority.most_urgent(ceiling);
        true
    }

    /// Most recently acquired resource still held.
    pub fn last_held(&self) -> Option<ResourceId> {
        self.held.last().map(|h| h.resource)
    }

    /// Drop the most recently acquired resource and recompute the
    /// effective priority.
    pub fn pop_held(&mut self) -> Option<ResourceId> {
        let held = self.held.pop()?;
        self.recompute_priority();
        Some(held.resource)
    }

    /// Prepare a fresh activation.
    pub fn start_activation(&mut self) {
        self.activations += 1;
        self.miss_reported = false;
        self.wake = None;
        self.deadline_remaining = if self.is_periodic() {
            Some(self.relative_deadline())
        } else {
            None
        };
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------
