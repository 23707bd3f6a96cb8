//! # Task Registry
//!
//! Static declaration tables for tasks, resources and events. Everything
//! the kernel schedules is declared here before [`Kernel::start_os`]; the
//! index of an entry in its table is its identity.
//!
//! ```ignore
//! static TASKS: [TaskDecl; 2] = [
//!     TaskDecl::new("Idle", Priority(16), idle),
//!     TaskDecl::new("Sampler", Priority(1), sampler),
//! ];
//! static RESOURCES: [ResourceDecl; 1] = [
//!     ResourceDecl::new("Bus", ceiling_of(&[Priority(16), Priority(1)])),
//! ];
//! static REGISTRY: Registry = Registry::new(&TASKS, &RESOURCES, &[]);
//! ```
//!
//! [`Kernel::start_os`]: crate::kernel::Kernel::start_os

use core::fmt;

use crate::config::{MAX_DECLARED_TASKS, MAX_EVENTS, MAX_RESOURCES};
use crate::error::{KernelError, KernelResult};
use crate::task::{Priority, TaskEntry};

/// Index of a task declaration in [`Registry::tasks`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeclId(pub usize);

impl fmt::Display for DeclId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "D{}", self.0)
    }
}

/// A declared task: name, default priority and body.
#[derive(Debug, Clone, Copy)]
pub struct TaskDecl {
    pub name: &'static str,
    pub priority: Priority,
    pub entry: TaskEntry,
}

impl TaskDecl {
    pub const fn new(name: &'static str, priority: Priority, entry: TaskEntry) -> Self {
        Self { name, priority, entry }
    }
}

/// A declared resource and its ceiling priority.
#[derive(Debug, Clone, Copy)]
pub struct ResourceDecl {
    pub name: &'static str,
    pub ceiling: Priority,
}

impl ResourceDecl {
    pub const fn new(name: &'static str, ceiling: Priority) -> Self {
        Self { name, ceiling }
    }
}

/// A declared binary event.
#[derive(Debug, Clone, Copy)]
pub struct EventDecl {
    pub name: &'static str,
}

impl EventDecl {
    pub const fn new(name: &'static str) -> Self {
        Self { name }
    }
}

/// Ceiling of a resource: the most urgent priority among the tasks that
/// may lock it. Usable in `static` declarations.
pub const fn ceiling_of(lockers: &[Priority]) -> Priority {
    let mut ceiling = Priority::LOWEST;
    let mut i = 0;
    while i < lockers.len() {
        ceiling = ceiling.most_urgent(lockers[i]);
        i += 1;
    }
    ceiling
}

/// The three declaration tables consumed by the kernel.
#[derive(Debug, Clone, Copy)]
pub struct Registry {
    pub tasks: &'static [TaskDecl],
    pub resources: &'static [ResourceDecl],
    pub events: &'static [EventDecl],
}

impl Registry {
    pub const fn new(
        tasks: &'static [TaskDecl],
        resources: &'static [ResourceDecl],
        events: &'static [EventDecl],
    ) -> Self {
        Self { tasks, resources, events }
    }

    /// Check that the tables fit the kernel's fixed capacities.
    pub fn validate(&self) -> KernelResult<()> {
        if self.tasks.is_empty()
            || self.tasks.len() > MAX_DECLARED_TASKS
            || self.resources.len() > MAX_RESOURCES
            || self.events.len() > MAX_EVENTS
        {
            return Err(KernelError::TooManyDeclarations);
        }
        Ok(())
    }

    pub fn task(&self, decl: DeclId) -> KernelResult<&'static TaskDecl> {
        self.tasks.get(decl.0).ok_or(KernelError::InvalidTask)
    }

    /// Look up a task declaration by name. Names are diagnostic; this is a
    /// convenience for tooling and demos, never used by the scheduler.
    pub fn find_task(&self, name: &str) -> Option<DeclId> {
        self.tasks.iter().position(|t| t.name == name).map(DeclId)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::Kernel;
    use crate::task::TaskId;

    fn body(_k: &mut Kernel, _id: TaskId) -> KernelResult<()> {
        Ok(())
    }

    static TASKS: [TaskDecl; 2] = [
        TaskDecl::new("A", Priority(3), body),
        TaskDecl::new("B", Priority(7), body),
    ];

    #[test]
    fn test_ceiling_of() {
        const C: Priority = ceiling_of(&[Priority(10), Priority(5), Priority(12)]);
        assert_eq!(C, Priority(5));
        assert_eq!(ceiling_of(&[]), Priority::LOWEST);
    }

    #[test]
    fn test_validate() {
        assert!(Registry::new(&TASKS, &[], &[]).validate().is_ok());
        assert_eq!(
            Registry::new(&[], &[], &[]).validate(),
            Err(KernelError::TooManyDeclarations)
        );

        static MANY_EVENTS: [EventDecl; MAX_EVENTS + 1] = [EventDecl::new("e"); MAX_EVENTS + 1];
        assert_eq!(
            Registry::new(&TASKS, &[], &MANY_EVENTS).validate(),
            Err(KernelError::TooManyDeclarations)
        );
    }

    #[test]
    fn test_lookup() {
        let registry = Registry::new(&TASKS, &[], &[]);
        assert_eq!(registry.find_task("B"), Some(DeclId(1)));
        assert_eq!(registry.find_task("C"), None);
        assert_eq!(registry.task(DeclId(0)).map(|t| t.priority), Ok(Priority(3)));
        assert!(registry.task(DeclId(2)).is_err());
    }
}
