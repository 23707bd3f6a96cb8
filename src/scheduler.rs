//! # Scheduler
//!
//! Core scheduling logic for CeilOS: the task lifecycle operations and the
//! dispatch step that every eligibility change ends with. This is the only
//! module that moves tasks between READY and RUNNING; the resource and
//! event managers go through `make_ready`, `park_running` and `wake`.
//!
//! ## Scheduling Algorithm
//!
//! After every state-affecting operation:
//! 1. **Select**: the READY task with the most urgent effective priority,
//!    earliest-readied first among equals
//! 2. **Compare**: it must strictly outrank the RUNNING task's effective
//!    priority, otherwise nothing changes
//! 3. **Preempt**: the running task goes back to READY and its body stays
//!    suspended on the call stack
//! 4. **Run**: the selected body executes until it terminates, blocks or
//!    returns; steps 1–4 repeat while anything outranks the preempted task
//! 5. **Resume**: the preempted task becomes RUNNING again
//!
//! ## Single-stack execution
//!
//! Preempting bodies run nested inside the kernel call that made them
//! eligible, so a preempted body continues exactly where it called the
//! kernel. This is sound because a task that holds resources never blocks
//! (`ResourceHeld`): each task on the stack strictly outranks every task
//! below it, and only the innermost one can ever be the best candidate.
//!
//! A body that blocks must return. It is entered again from the top once
//! woken, and the repeated blocking call proceeds immediately.

use crate::error::{KernelError, KernelResult};
use crate::kernel::{Kernel, Phase};
use crate::registry::DeclId;
use crate::task::{Blocker, Priority, TaskId, TaskState};
use crate::trace::TraceEvent;

impl Kernel {
    // -----------------------------------------------------------------------
    // Task lifecycle
    // -----------------------------------------------------------------------

    /// Create a task from its declaration. The task stays suspended until
    /// [`resume_task`](Self::resume_task).
    ///
    /// # Returns
    /// - `Ok(task_id)`: the pool slot of the task
    /// - `Err(AlreadyActive)`: the declared task already has a live activation
    /// - `Err(PoolExhausted)`: no free slot is left
    pub fn create_task(&mut self, decl: DeclId, priority: Priority) -> KernelResult<TaskId> {
        self.ensure_not_halted()?;
        let task = self.registry.task(decl)?;

        // A dormant periodic task keeps its slot; creating it again reuses it.
        let bound = self.tasks.iter().position(|t| t.decl == Some(decl));
        let slot = match bound {
            Some(slot) if self.tasks[slot].state != TaskState::Dormant => {
                return Err(KernelError::AlreadyActive);
            }
            Some(slot) => slot,
            None => self
                .tasks
                .iter()
                .position(|t| t.is_free())
                .ok_or(KernelError::PoolExhausted)?,
        };

        self.tasks[slot].bind(decl, task.name, task.entry, priority);
        log::debug!("created task {} ({}) at {}", TaskId(slot), task.name, priority);
        Ok(TaskId(slot))
    }

    /// Move a created (or dormant periodic) task into the ready queue.
    /// Preempts the caller at once if the task outranks it.
    pub fn resume_task(&mut self, id: TaskId) -> KernelResult<()> {
        self.ensure_not_halted()?;
        let tcb = self.tcb_mut(id)?;
        match tcb.state {
            TaskState::Suspended | TaskState::Dormant => {}
            _ => return Err(KernelError::AlreadyActive),
        }
        tcb.start_activation();
        log::debug!("resumed task {} ({})", id, tcb.name);

        self.make_ready(id);
        self.dispatch();
        Ok(())
    }

    /// Create (if needed) and resume in one step.
    ///
    /// A declared task that already holds a slot, suspended or dormant, is
    /// resumed as it is: its priority, period and counters are kept and
    /// `priority` is ignored.
    pub fn activate_task(&mut self, decl: DeclId, priority: Priority) -> KernelResult<TaskId> {
        self.ensure_not_halted()?;
        let bound = self.tasks.iter().position(|t| t.decl == Some(decl));
        let id = match bound {
            Some(slot) => TaskId(slot),
            None => self.create_task(decl, priority)?,
        };
        self.resume_task(id)?;
        Ok(id)
    }

    /// Terminate the calling task.
    ///
    /// Resources still held are force-released (with a warning) and handed
    /// to their waiters. The body must return after this call; the CPU goes
    /// to the next eligible task when it does.
    pub fn terminate_task(&mut self, caller: TaskId) -> KernelResult<()> {
        self.ensure_caller(caller)?;
        self.finish_activation(caller);
        self.running = None;
        Ok(())
    }

    /// One-time kernel bootstrap.
    ///
    /// Activates `initial` at its declared priority and dispatches until no
    /// task is eligible or the kernel is shut down. Tasks resumed before the
    /// call are scheduled alongside it by priority.
    pub fn start_os(&mut self, initial: DeclId) -> KernelResult<()> {
        if self.phase != Phase::Configuring {
            return Err(KernelError::AlreadyStarted);
        }
        let priority = self.registry.task(initial)?.priority;
        let id = self.create_task(initial, priority)?;

        log::info!("starting kernel with task {}", id);
        self.phase = Phase::Running;
        self.resume_task(id)
    }

    /// Halt dispatching and tear down all scheduler state. Every task is
    /// forced dormant; later scheduling calls fail with `KernelNotRunning`.
    pub fn shutdown_os(&mut self) -> KernelResult<()> {
        self.ensure_running()?;

        for tcb in self.tasks.iter_mut() {
            tcb.unbind();
        }
        for rcb in self.resources.iter_mut() {
            rcb.reset();
        }
        for ecb in self.events.iter_mut() {
            ecb.reset();
        }
        self.ready.clear();
        self.preempted.clear();
        self.running = None;
        self.phase = Phase::Halted;

        log::info!("kernel shut down at tick {}", self.tick);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // State changes requested by the resource and event managers
    // -----------------------------------------------------------------------

    /// Put `id` in the ready queue behind every equal-priority task.
    pub(crate) fn make_ready(&mut self, id: TaskId) {
        let seq = self.next_seq();
        self.tasks[id.0].state = TaskState::Ready;
        self.ready.push(id, seq);
    }

    /// Move the running task `caller` to WAITING on `blocker`. The caller
    /// must already be registered in the blocker's wait queue.
    pub(crate) fn park_running(&mut self, caller: TaskId, blocker: Blocker) {
        let tcb = &mut self.tasks[caller.0];
        tcb.state = TaskState::Waiting;
        tcb.blocked_on = Some(blocker);
        self.running = None;
        self.record(TraceEvent::Blocked(caller));
        log::trace!("task {} blocked on {:?}", caller, blocker);
    }

    /// Ready a waiting task, delivering what it waited for.
    pub(crate) fn wake(&mut self, id: TaskId, delivered: Blocker) {
        let tcb = &mut self.tasks[id.0];
        tcb.blocked_on = None;
        tcb.wake = Some(delivered);
        self.make_ready(id);
        self.record(TraceEvent::Woken(id));
        log::trace!("task {} woken by {:?}", id, delivered);
    }

    // -----------------------------------------------------------------------
    // Dispatch
    // -----------------------------------------------------------------------

    /// Run every READY task that outranks the running one, then return to it.
    pub(crate) fn dispatch(&mut self) {
        if self.phase != Phase::Running {
            return;
        }
        let current = self.running;
        let floor = self.dispatch_floor();
        if !self.ready_outranks(floor) {
            return;
        }

        if let Some(cur) = current {
            self.tasks[cur.0].state = TaskState::Ready;
            self.running = None;
            // Cannot overflow: every stacked task is a distinct pool slot.
            let _ = self.preempted.push(cur);
            self.record(TraceEvent::Preempted(cur));
            log::trace!("task {} preempted", cur);
        }

        while self.phase == Phase::Running && self.ready_outranks(floor) {
            let tasks = &self.tasks;
            if let Some(next) = self.ready.pop_highest(|id| tasks[id.0].effective_priority) {
                self.execute(next);
            }
        }

        // A nested shutdown already tore everything down.
        if self.phase != Phase::Running {
            return;
        }
        if let Some(cur) = current {
            self.preempted.pop();
            self.tasks[cur.0].state = TaskState::Running;
            self.running = Some(cur);
            self.record(TraceEvent::Dispatched(cur));
            log::trace!("task {} resumes", cur);
        }
    }

    /// Priority a READY task must beat to run now: the running task's, or,
    /// when the running body has already terminated or blocked, that of the
    /// innermost preempted task still waiting on the stack.
    fn dispatch_floor(&self) -> Option<Priority> {
        self.running
            .or_else(|| self.preempted.last().copied())
            .map(|id| self.tasks[id.0].effective_priority)
    }

    /// Whether the best READY task strictly outranks `floor` (`None` means
    /// nothing is running, so any READY task qualifies).
    fn ready_outranks(&self, floor: Option<Priority>) -> bool {
        let tasks = &self.tasks;
        match self.ready.peek_highest(|id| tasks[id.0].effective_priority) {
            Some(next) => match floor {
                Some(floor) => tasks[next.0].effective_priority.outranks(floor),
                None => true,
            },
            None => false,
        }
    }

    /// Make `id` RUNNING and run its body.
    fn execute(&mut self, id: TaskId) {
        let Some(entry) = self.tasks[id.0].entry else {
            return;
        };
        self.tasks[id.0].state = TaskState::Running;
        self.running = Some(id);
        self.record(TraceEvent::Dispatched(id));
        log::trace!("dispatch {} ({})", id, self.tasks[id.0].name);

        let outcome = entry(self, id);

        if self.phase != Phase::Running {
            return;
        }
        if let Err(err) = outcome {
            log::error!("task {} ({}) failed: {}", id, self.tasks[id.0].name, err);
        }
        // Returning without terminate_task() ends the activation too.
        if self.running == Some(id) {
            log::debug!("task {} returned without terminating", id);
            self.finish_activation(id);
            self.running = None;
        }
    }

    /// End the current activation of `id`: release what it holds, drop
    /// its queue registrations and return it to DORMANT. Aperiodic tasks
    /// give their slot back to the pool.
    pub(crate) fn finish_activation(&mut self, id: TaskId) {
        while let Some(res) = self.tasks[id.0].last_held() {
            log::warn!(
                "task {} ({}) terminated holding resource {}; releasing",
                id,
                self.tasks[id.0].name,
                res
            );
            self.release_held(id, res);
        }

        match self.tasks[id.0].blocked_on {
            Some(Blocker::Resource(res)) => {
                self.resources[res.0].waiters.remove(id);
            }
            Some(Blocker::Event(ev)) => {
                self.events[ev.0].waiters.remove(id);
            }
            None => {}
        }
        self.ready.remove(id);

        let tcb = &mut self.tasks[id.0];
        tcb.state = TaskState::Dormant;
        tcb.blocked_on = None;
        tcb.wake = None;
        tcb.deadline_remaining = None;
        let periodic = tcb.is_periodic();
        log::debug!("task {} ({}) terminated", id, tcb.name);
        self.record(TraceEvent::Terminated(id));

        if !periodic {
            self.tasks[id.0].unbind();
        }
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    extern crate std;

    use std::vec::Vec;

    use super::*;
    use crate::config::MAX_TASKS;
    use crate::registry::{Registry, TaskDecl};

    const IDLE: DeclId = DeclId(0);
    const HIGH: DeclId = DeclId(1);
    const MEDIUM: DeclId = DeclId(2);
    const LOW: DeclId = DeclId(3);

    fn terminate(k: &mut Kernel, id: TaskId) -> KernelResult<()> {
        k.terminate_task(id)
    }

    fn just_return(_k: &mut Kernel, _id: TaskId) -> KernelResult<()> {
        Ok(())
    }

    fn fail(_k: &mut Kernel, _id: TaskId) -> KernelResult<()> {
        Err(KernelError::NotOwner)
    }

    fn idle(k: &mut Kernel, id: TaskId) -> KernelResult<()> {
        // Low and Medium are outranked by nothing but each other.
        let low = k.create_task(LOW, Priority(10))?;
        let medium = k.create_task(MEDIUM, Priority(5))?;
        k.resume_task(low)?;
        k.resume_task(medium)?;
        k.terminate_task(id)
    }

    static TASKS: [TaskDecl; 4] = [
        TaskDecl::new("Idle", Priority(16), idle),
        TaskDecl::new("High", Priority(1), terminate),
        TaskDecl::new("Medium", Priority(5), just_return),
        TaskDecl::new("Low", Priority(10), fail),
    ];
    static REGISTRY: Registry = Registry::new(&TASKS, &[], &[]);

    fn kernel() -> Kernel {
        Kernel::new(&REGISTRY).unwrap()
    }

    fn dispatched(k: &Kernel) -> Vec<TaskId> {
        k.trace()
            .events()
            .filter_map(|e| match e {
                TraceEvent::Dispatched(id) => Some(id),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_create_starts_suspended() {
        let mut k = kernel();
        let id = k.create_task(HIGH, Priority(1)).unwrap();
        assert_eq!(k.task_state(id), Ok(TaskState::Suspended));
        assert_eq!(k.create_task(HIGH, Priority(1)), Err(KernelError::AlreadyActive));
    }

    #[test]
    fn test_create_unknown_declaration() {
        let mut k = kernel();
        assert_eq!(k.create_task(DeclId(9), Priority(1)), Err(KernelError::InvalidTask));
    }

    #[test]
    fn test_resume_twice_is_rejected() {
        let mut k = kernel();
        let id = k.create_task(HIGH, Priority(1)).unwrap();
        k.resume_task(id).unwrap();
        // Not started yet: the task waits in the ready queue.
        assert_eq!(k.task_state(id), Ok(TaskState::Ready));
        assert_eq!(k.resume_task(id), Err(KernelError::AlreadyActive));
        assert_eq!(k.resume_task(TaskId(5)), Err(KernelError::InvalidTask));
    }

    #[test]
    fn test_start_runs_by_priority_until_idle() {
        let mut k = kernel();
        k.start_os(IDLE).unwrap();

        // Idle resumes Low, which preempts it and fails; Medium then
        // preempts Idle and returns; Idle terminates.
        let order = dispatched(&k);
        assert_eq!(order, [TaskId(0), TaskId(1), TaskId(0), TaskId(2), TaskId(0)]);
        assert_eq!(k.running_task(), None);
        assert_eq!(k.tasks().count(), 0);
    }

    #[test]
    fn test_activate_resumes_a_suspended_task() {
        let mut k = kernel();
        let id = k.create_task(HIGH, Priority(1)).unwrap();
        assert_eq!(k.activate_task(HIGH, Priority(1)), Ok(id));
        assert_eq!(k.task_state(id), Ok(TaskState::Ready));
        assert_eq!(k.activate_task(HIGH, Priority(1)), Err(KernelError::AlreadyActive));
    }

    #[test]
    fn test_activate_keeps_a_dormant_periodic_slot() {
        let mut k = kernel();
        let id = k.create_task(HIGH, Priority(1)).unwrap();
        k.set_task_period(id, 4).unwrap();
        k.resume_task(id).unwrap();
        k.start_os(MEDIUM).unwrap();
        assert_eq!(k.task_state(id), Ok(TaskState::Dormant));

        assert_eq!(k.activate_task(HIGH, Priority(7)), Ok(id));
        let info = k.task_info(id).unwrap();
        assert_eq!(info.state, TaskState::Dormant);
        assert_eq!(info.period, 4);
        assert_eq!(info.activations, 2);
        assert_eq!(info.base_priority, Priority(1));
    }

    #[test]
    fn test_start_twice() {
        let mut k = kernel();
        k.start_os(IDLE).unwrap();
        assert_eq!(k.start_os(IDLE), Err(KernelError::AlreadyStarted));
    }

    #[test]
    fn test_autostart_tasks_run_at_start() {
        let mut k = kernel();
        let high = k.create_task(HIGH, Priority(1)).unwrap();
        k.resume_task(high).unwrap();
        k.start_os(MEDIUM).unwrap();

        // High outranks the initial task and runs first.
        let order = dispatched(&k);
        assert_eq!(order, [high, TaskId(1)]);
    }

    #[test]
    fn test_terminate_requires_running_caller() {
        let mut k = kernel();
        let id = k.create_task(HIGH, Priority(1)).unwrap();
        assert_eq!(k.terminate_task(id), Err(KernelError::KernelNotRunning));

        k.start_os(MEDIUM).unwrap();
        // HIGH was never resumed, so it is still suspended in slot 0;
        // Medium ran and gave slot 1 back.
        assert_eq!(k.create_task(HIGH, Priority(1)), Err(KernelError::AlreadyActive));
        assert_eq!(k.terminate_task(id), Err(KernelError::CallerNotRunning));
        assert_eq!(k.terminate_task(TaskId(1)), Err(KernelError::InvalidTask));
    }

    #[test]
    fn test_pool_exhaustion_leaves_tasks_alone() {
        static MANY: [TaskDecl; MAX_TASKS + 1] =
            [TaskDecl::new("worker", Priority(3), just_return); MAX_TASKS + 1];
        static MANY_REGISTRY: Registry = Registry::new(&MANY, &[], &[]);

        let mut k = Kernel::new(&MANY_REGISTRY).unwrap();
        for i in 0..MAX_TASKS {
            assert_eq!(k.create_task(DeclId(i), Priority(3)), Ok(TaskId(i)));
        }
        assert_eq!(k.create_task(DeclId(MAX_TASKS), Priority(3)), Err(KernelError::PoolExhausted));
        assert_eq!(k.tasks().count(), MAX_TASKS);
        assert!(k.tasks().all(|t| t.state == TaskState::Suspended));
    }

    #[test]
    fn test_shutdown() {
        let mut k = kernel();
        assert_eq!(k.shutdown_os(), Err(KernelError::KernelNotRunning));
        k.start_os(MEDIUM).unwrap();
        k.shutdown_os().unwrap();

        assert_eq!(k.phase(), Phase::Halted);
        assert_eq!(k.create_task(HIGH, Priority(1)), Err(KernelError::KernelNotRunning));
        assert_eq!(k.start_os(IDLE), Err(KernelError::AlreadyStarted));
        assert_eq!(k.shutdown_os(), Err(KernelError::KernelNotRunning));
    }
}
