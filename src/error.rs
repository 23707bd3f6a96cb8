//! # Kernel Errors
//!
//! Every fallible kernel operation returns [`KernelResult`]. A failing
//! operation is a no-op: the ready queue, resource owners and event flags
//! are left exactly as they were.
//!
//! Deadline misses are not errors. They are advisory records returned by
//! [`Kernel::check_deadlines`](crate::kernel::Kernel::check_deadlines).

use core::fmt;

/// Kernel result type
pub type KernelResult<T> = Result<T, KernelError>;

/// Kernel error types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelError {
    /// No free control block is left in the task pool.
    PoolExhausted,
    /// The task already has a live activation.
    AlreadyActive,
    /// Unknown task id, or a pool slot that holds no task.
    InvalidTask,
    /// Unknown resource id.
    InvalidResource,
    /// Unknown event id.
    InvalidEvent,
    /// The caller already holds this resource (locks are not reentrant).
    DoubleLock,
    /// The caller does not hold the resource it tried to release.
    NotOwner,
    /// Resources must be released in reverse order of acquisition.
    LockOrderViolation,
    /// The caller would block while still holding resources.
    ResourceHeld,
    /// Periods and deadlines must be at least one tick.
    InvalidPeriod,
    /// The operation acts on the calling task, which is not the running one.
    CallerNotRunning,
    /// `start_os` was already called on this kernel.
    AlreadyStarted,
    /// The kernel is not started, or has been shut down.
    KernelNotRunning,
    /// A declaration table exceeds the configured capacity, or is empty.
    TooManyDeclarations,
}

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            KernelError::PoolExhausted => "task pool exhausted",
            KernelError::AlreadyActive => "task is already active",
            KernelError::InvalidTask => "invalid task id",
            KernelError::InvalidResource => "invalid resource id",
            KernelError::InvalidEvent => "invalid event id",
            KernelError::DoubleLock => "resource already held by caller",
            KernelError::NotOwner => "caller does not own the resource",
            KernelError::LockOrderViolation => "resources released out of LIFO order",
            KernelError::ResourceHeld => "cannot block while holding resources",
            KernelError::InvalidPeriod => "period and deadline must be nonzero",
            KernelError::CallerNotRunning => "caller is not the running task",
            KernelError::AlreadyStarted => "kernel already started",
            KernelError::KernelNotRunning => "kernel is not running",
            KernelError::TooManyDeclarations => "declaration table does not fit the kernel",
        };
        f.write_str(msg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_is_human_readable() {
        extern crate std;
        use std::string::ToString;

        assert_eq!(KernelError::DoubleLock.to_string(), "resource already held by caller");
        assert_eq!(KernelError::KernelNotRunning.to_string(), "kernel is not running");
    }
}
