//! # Event Manager
//!
//! Binary, level-triggered events with single-consumer semantics.
//!
//! - Setting an event with nobody waiting leaves it set; the next
//!   `wait_event` consumes it without blocking, so no wakeup is lost.
//! - Setting an event with waiters wakes exactly one of them (most urgent
//!   first, then in wait order) and leaves the event clear.

use core::fmt;

use crate::error::{KernelError, KernelResult};
use crate::kernel::Kernel;
use crate::queue::TaskQueue;
use crate::registry::EventDecl;
use crate::task::{Blocker, TaskId, Wait};
use crate::trace::TraceEvent;

/// Index of an event in [`Registry::events`](crate::registry::Registry).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventId(pub usize);

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "E{}", self.0)
    }
}

/// Runtime state of one event.
#[derive(Debug, Clone)]
pub struct EventControlBlock {
    pub id: EventId,
    pub name: &'static str,
    pub set: bool,
    pub waiters: TaskQueue,
}

impl EventControlBlock {
    pub fn new(id: EventId, decl: &EventDecl) -> Self {
        Self {
            id,
            name: decl.name,
            set: false,
            waiters: TaskQueue::new(),
        }
    }

    pub fn reset(&mut self) {
        self.set = false;
        self.waiters.clear();
    }
}

impl Kernel {
    /// Signal `ev`. Wakes one waiter, or leaves the event set for the next
    /// one. Callable from a task or from outside any task.
    pub fn set_event(&mut self, ev: EventId) -> KernelResult<()> {
        self.ensure_not_halted()?;
        self.ecb(ev)?;
        self.record(TraceEvent::EventSet(ev));

        let tasks = &self.tasks;
        let waiter = self.events[ev.0]
            .waiters
            .pop_highest(|id| tasks[id.0].effective_priority);
        match waiter {
            Some(waiter) => {
                log::debug!("{} ({}) wakes task {}", ev, self.events[ev.0].name, waiter);
                self.events[ev.0].set = false;
                self.wake(waiter, Blocker::Event(ev));
                self.dispatch();
            }
            None => {
                log::debug!("{} ({}) set with no waiter", ev, self.events[ev.0].name);
                self.events[ev.0].set = true;
            }
        }
        Ok(())
    }

    /// Wait for `ev` in the calling task.
    ///
    /// Returns `Wait::Proceed` if the event was already set (consuming it)
    /// or was delivered by the wake that readied the caller. Otherwise the
    /// caller blocks and must return from its body.
    pub fn wait_event(&mut self, caller: TaskId, ev: EventId) -> KernelResult<Wait> {
        self.ensure_caller(caller)?;
        self.ecb(ev)?;

        if self.tasks[caller.0].wake == Some(Blocker::Event(ev)) {
            self.tasks[caller.0].wake = None;
            return Ok(Wait::Proceed);
        }
        if self.events[ev.0].set {
            self.events[ev.0].set = false;
            return Ok(Wait::Proceed);
        }
        if !self.tasks[caller.0].held.is_empty() {
            return Err(KernelError::ResourceHeld);
        }

        let seq = self.next_seq();
        self.events[ev.0].waiters.push(caller, seq);
        self.park_running(caller, Blocker::Event(ev));
        Ok(Wait::Blocked)
    }

    /// Drop a pending set pulse without waking anyone.
    pub fn clear_event(&mut self, ev: EventId) -> KernelResult<()> {
        self.ensure_not_halted()?;
        self.ecb(ev)?;
        self.events[ev.0].set = false;
        Ok(())
    }

    pub fn event_is_set(&self, ev: EventId) -> KernelResult<bool> {
        self.ecb(ev).map(|e| e.set)
    }

    /// Number of tasks blocked on `ev`.
    pub fn event_waiters(&self, ev: EventId) -> KernelResult<usize> {
        self.ecb(ev).map(|e| e.waiters.len())
    }

    fn ecb(&self, ev: EventId) -> KernelResult<&EventControlBlock> {
        self.events.get(ev.0).ok_or(KernelError::InvalidEvent)
    }
}
