//! # Resource Manager
//!
//! Shared resources guarded by the immediate priority ceiling protocol.
//!
//! Each resource has a static ceiling: the most urgent priority of any task
//! that may lock it. A task that acquires a resource immediately runs at
//! the ceiling, so no other task that could contend for the resource can
//! preempt it. A medium-priority task therefore can never starve a
//! high-priority task through a low-priority holder.
//!
//! ## Rules
//!
//! | Situation | Result |
//! |-----------|--------|
//! | Caller already holds the resource | `DoubleLock` |
//! | Resource held by another task | caller WAITS (`Wait::Blocked`) |
//! | ... and the caller holds other resources | `ResourceHeld` |
//! | Release of a resource the caller does not hold | `NotOwner` |
//! | Release out of LIFO order | `LockOrderViolation` |
//!
//! With correctly computed ceilings the busy case cannot occur on a single
//! core; it is handled for tables whose ceilings are understated.

use core::fmt;

use crate::error::{KernelError, KernelResult};
use crate::kernel::Kernel;
use crate::queue::TaskQueue;
use crate::registry::ResourceDecl;
use crate::task::{Blocker, Priority, TaskId, Wait};
use crate::trace::TraceEvent;

/// Index of a resource in [`Registry::resources`](crate::registry::Registry).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourceId(pub usize);

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "R{}", self.0)
    }
}

/// Runtime state of one resource.
#[derive(Debug, Clone)]
pub struct ResourceControlBlock {
    pub id: ResourceId,
    pub name: &'static str,
    pub ceiling: Priority,
    pub owner: Option<TaskId>,
    /// Tasks blocked until the resource is released.
    pub waiters: TaskQueue,
}

impl ResourceControlBlock {
    pub fn new(id: ResourceId, decl: &ResourceDecl) -> Self {
        Self {
            id,
            name: decl.name,
            ceiling: decl.ceiling,
            owner: None,
            waiters: TaskQueue::new(),
        }
    }

    /// Locks are not reentrant: the depth is 0 or 1.
    #[inline]
    pub fn lock_depth(&self) -> u8 {
        u8::from(self.owner.is_some())
    }

    pub fn reset(&mut self) {
        self.owner = None;
        self.waiters.clear();
    }
}

/// Read-only view of one resource, for the ownership table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceSnapshot {
    pub id: ResourceId,
    pub name: &'static str,
    pub ceiling: Priority,
    pub owner: Option<TaskId>,
    pub lock_depth: u8,
    pub waiters: usize,
}

impl From<&ResourceControlBlock> for ResourceSnapshot {
    fn from(rcb: &ResourceControlBlock) -> Self {
        Self {
            id: rcb.id,
            name: rcb.name,
            ceiling: rcb.ceiling,
            owner: rcb.owner,
            lock_depth: rcb.lock_depth(),
            waiters: rcb.waiters.len(),
        }
    }
}

impl Kernel {
    /// Acquire `res` for the calling task.
    ///
    /// On success the caller's effective priority rises to the resource
    /// ceiling. If another task owns the resource the caller blocks; when
    /// ownership is handed to it, its body is entered again and the repeated
    /// call returns `Wait::Proceed` with the resource already held.
    pub fn get_resource(&mut self, caller: TaskId, res: ResourceId) -> KernelResult<Wait> {
        self.ensure_caller(caller)?;
        let owner = self.rcb(res)?.owner;

        if self.tasks[caller.0].wake == Some(Blocker::Resource(res)) {
            self.tasks[caller.0].wake = None;
            return Ok(Wait::Proceed);
        }

        match owner {
            Some(owner) if owner == caller => Err(KernelError::DoubleLock),
            Some(owner) => {
                if !self.tasks[caller.0].held.is_empty() {
                    return Err(KernelError::ResourceHeld);
                }
                log::debug!("task {} waits for {} held by {}", caller, res, owner);
                let seq = self.next_seq();
                self.resources[res.0].waiters.push(caller, seq);
                self.park_running(caller, Blocker::Resource(res));
                Ok(Wait::Blocked)
            }
            None => {
                self.grant(caller, res);
                Ok(Wait::Proceed)
            }
        }
    }

    /// Release `res`, which must be the caller's most recently acquired
    /// resource. The highest-priority waiter, if any, takes ownership and
    /// may preempt the caller.
    pub fn release_resource(&mut self, caller: TaskId, res: ResourceId) -> KernelResult<()> {
        self.ensure_caller(caller)?;
        if self.rcb(res)?.owner != Some(caller) {
            return Err(KernelError::NotOwner);
        }
        if self.tasks[caller.0].last_held() != Some(res) {
            return Err(KernelError::LockOrderViolation);
        }

        self.release_held(caller, res);
        self.dispatch();
        Ok(())
    }

    /// Give `res` to `task` and raise it to the ceiling.
    fn grant(&mut self, task: TaskId, res: ResourceId) {
        let rcb = &mut self.resources[res.0];
        rcb.owner = Some(task);
        let ceiling = rcb.ceiling;
        // Cannot fail: the nesting limit equals the number of resources.
        let pushed = self.tasks[task.0].push_held(res, ceiling);
        debug_assert!(pushed, "resource nesting deeper than the resource table");
        self.record(TraceEvent::ResourceAcquired(task, res));
        log::trace!(
            "task {} acquired {}, running at {}",
            task,
            res,
            self.tasks[task.0].effective_priority
        );
    }

    /// Drop `owner`'s hold on `res` (its most recent one) and hand the
    /// resource to the best waiter. Does not dispatch.
    pub(crate) fn release_held(&mut self, owner: TaskId, res: ResourceId) {
        self.tasks[owner.0].pop_held();
        self.resources[res.0].owner = None;
        self.record(TraceEvent::ResourceReleased(owner, res));
        log::trace!(
            "task {} released {}, back to {}",
            owner,
            res,
            self.tasks[owner.0].effective_priority
        );

        let tasks = &self.tasks;
        let next = self.resources[res.0]
            .waiters
            .pop_highest(|id| tasks[id.0].effective_priority);
        if let Some(next) = next {
            self.grant(next, res);
            self.wake(next, Blocker::Resource(res));
        }
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use std::cell::RefCell;
    use std::vec::Vec;

    use super::*;
    use crate::registry::{DeclId, Registry, ResourceDecl, TaskDecl};
    use crate::task::TaskState;

    const OUTER: ResourceId = ResourceId(0);
    const INNER: ResourceId = ResourceId(1);

    std::thread_local! {
        static SEEN: RefCell<Vec<(Priority, KernelResult<()>)>> = RefCell::new(Vec::new());
    }

    fn note(k: &Kernel, id: TaskId, result: KernelResult<()>) {
        let prio = k.effective_priority(id).unwrap_or(Priority::LOWEST);
        SEEN.with(|s| s.borrow_mut().push((prio, result)));
    }

    fn take_seen() -> Vec<(Priority, KernelResult<()>)> {
        SEEN.with(|s| core::mem::take(&mut *s.borrow_mut()))
    }

    /// Nested locking, then every misuse the protocol rejects.
    fn nesting(k: &mut Kernel, id: TaskId) -> KernelResult<()> {
        note(k, id, Ok(()));
        assert_eq!(k.get_resource(id, OUTER)?, Wait::Proceed);
        note(k, id, Ok(()));
        assert_eq!(k.get_resource(id, INNER)?, Wait::Proceed);
        note(k, id, Ok(()));

        let relock = k.get_resource(id, INNER).map(|_| ());
        note(k, id, relock);
        let out_of_order = k.release_resource(id, OUTER);
        note(k, id, out_of_order);
        let unknown = k.get_resource(id, ResourceId(7)).map(|_| ());
        note(k, id, unknown);

        k.release_resource(id, INNER)?;
        note(k, id, Ok(()));
        let twice = k.release_resource(id, INNER);
        note(k, id, twice);
        k.release_resource(id, OUTER)?;
        note(k, id, Ok(()));
        k.terminate_task(id)
    }

    /// Terminates while holding a resource.
    fn leaky(k: &mut Kernel, id: TaskId) -> KernelResult<()> {
        let _ = k.get_resource(id, OUTER)?;
        k.terminate_task(id)
    }

    static TASKS: [TaskDecl; 2] = [
        TaskDecl::new("Nesting", Priority(10), nesting),
        TaskDecl::new("Leaky", Priority(6), leaky),
    ];
    static RESOURCES: [ResourceDecl; 2] = [
        ResourceDecl::new("Outer", Priority(8)),
        ResourceDecl::new("Inner", Priority(2)),
    ];
    static REGISTRY: Registry = Registry::new(&TASKS, &RESOURCES, &[]);

    #[test]
    fn test_nested_ceilings_and_misuse() {
        take_seen();
        let mut k = Kernel::new(&REGISTRY).unwrap();
        k.start_os(DeclId(0)).unwrap();

        let seen = take_seen();
        assert_eq!(
            seen,
            [
                (Priority(10), Ok(())),
                (Priority(8), Ok(())),
                (Priority(2), Ok(())),
                (Priority(2), Err(KernelError::DoubleLock)),
                (Priority(2), Err(KernelError::LockOrderViolation)),
                (Priority(2), Err(KernelError::InvalidResource)),
                (Priority(8), Ok(())),
                (Priority(8), Err(KernelError::NotOwner)),
                (Priority(10), Ok(())),
            ]
        );
        assert!(k.resources().all(|r| r.owner.is_none() && r.lock_depth == 0));
    }

    #[test]
    fn test_terminate_force_releases() {
        let mut k = Kernel::new(&REGISTRY).unwrap();
        k.start_os(DeclId(1)).unwrap();

        assert_eq!(k.resource_owner(OUTER), Ok(None));
        assert_eq!(k.task_state(TaskId(0)), Ok(TaskState::Dormant));
        assert!(k
            .trace()
            .events()
            .any(|e| e == TraceEvent::ResourceReleased(TaskId(0), OUTER)));
    }

    #[test]
    fn test_resource_calls_need_running_caller() {
        let mut k = Kernel::new(&REGISTRY).unwrap();
        assert_eq!(k.get_resource(TaskId(0), OUTER), Err(KernelError::KernelNotRunning));
        assert_eq!(k.release_resource(TaskId(0), OUTER), Err(KernelError::KernelNotRunning));
    }
}
