//! # Periodic / Deadline Monitor
//!
//! Tick-driven release of periodic tasks and deadline supervision.
//!
//! Every task with a nonzero period carries two countdowns:
//!
//! ```text
//!   period_remaining   ── reaches 0 ──► reset to period; DORMANT task released
//!   deadline_remaining ── reaches 0 ──► activation still live: DeadlineMiss
//! ```
//!
//! Misses are advisory: they are counted, traced, logged at `warn` and
//! returned in a [`DeadlineReport`]. The late task keeps running.
//!
//! Priorities are never derived from periods here. Rate-monotonic
//! assignment (shorter period, more urgent priority) is the declarer's job.

use heapless::Vec;

use crate::config::MAX_TASKS;
use crate::error::{KernelError, KernelResult};
use crate::kernel::Kernel;
use crate::sync::TickLatch;
use crate::task::{TaskId, TaskState};
use crate::trace::TraceEvent;

/// A periodic task that was still active when its deadline (or its next
/// period boundary) arrived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeadlineMiss {
    pub task: TaskId,
    pub tick: u64,
}

/// Outcome of one `check_deadlines` pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeadlineReport {
    pub misses: Vec<DeadlineMiss, MAX_TASKS>,
    pub reactivated: Vec<TaskId, MAX_TASKS>,
}

impl DeadlineReport {
    pub fn is_quiet(&self) -> bool {
        self.misses.is_empty() && self.reactivated.is_empty()
    }
}

impl Kernel {
    /// Make `id` periodic with a release every `ticks` ticks. The first
    /// release is `ticks` ticks from now.
    pub fn set_task_period(&mut self, id: TaskId, ticks: u32) -> KernelResult<()> {
        self.ensure_not_halted()?;
        let tcb = self.tcb_mut(id)?;
        if ticks == 0 {
            return Err(KernelError::InvalidPeriod);
        }
        tcb.period = ticks;
        tcb.period_remaining = ticks;
        if tcb.is_active() && tcb.deadline_remaining.is_none() {
            tcb.deadline_remaining = Some(tcb.relative_deadline());
        }
        log::debug!("task {} ({}) period {} ticks", id, tcb.name, ticks);
        Ok(())
    }

    /// Set the relative deadline of `id`. Applies from its next activation.
    pub fn set_task_deadline(&mut self, id: TaskId, ticks: u32) -> KernelResult<()> {
        self.ensure_not_halted()?;
        let tcb = self.tcb_mut(id)?;
        if ticks == 0 {
            return Err(KernelError::InvalidPeriod);
        }
        tcb.deadline = ticks;
        Ok(())
    }

    /// Advance the monotonic tick counter without checking deadlines.
    pub fn increment_tick(&mut self) -> u64 {
        self.tick = self.tick.wrapping_add(1);
        self.tick
    }

    /// One monitor pass. Call once per tick, after the counter moved.
    pub fn check_deadlines(&mut self) -> KernelResult<DeadlineReport> {
        self.ensure_running()?;
        let mut report = DeadlineReport::default();

        for slot in 0..MAX_TASKS {
            let id = TaskId(slot);
            let tcb = &self.tasks[slot];
            if tcb.is_free() || !tcb.is_periodic() {
                continue;
            }

            // Deadline of the outstanding activation.
            if let Some(remaining) = tcb.deadline_remaining {
                let remaining = remaining.saturating_sub(1);
                if remaining == 0 {
                    self.tasks[slot].deadline_remaining = None;
                    if self.tasks[slot].is_active() {
                        self.note_miss(id, &mut report);
                    }
                } else {
                    self.tasks[slot].deadline_remaining = Some(remaining);
                }
            }

            // Period boundary.
            let tcb = &mut self.tasks[slot];
            tcb.period_remaining = tcb.period_remaining.saturating_sub(1);
            if tcb.period_remaining > 0 {
                continue;
            }
            tcb.period_remaining = tcb.period;

            let state = tcb.state;
            match state {
                TaskState::Dormant => {
                    tcb.start_activation();
                    self.make_ready(id);
                    self.record(TraceEvent::Reactivated(id));
                    log::trace!("task {} released for its next period", id);
                    let _ = report.reactivated.push(id);
                }
                TaskState::Suspended => {}
                _ => {
                    if !tcb.miss_reported {
                        self.note_miss(id, &mut report);
                    }
                    let tcb = &mut self.tasks[slot];
                    tcb.miss_reported = false;
                    tcb.deadline_remaining = Some(tcb.relative_deadline());
                }
            }
        }

        if !report.reactivated.is_empty() {
            self.dispatch();
        }
        Ok(report)
    }

    /// `increment_tick` followed by `check_deadlines`.
    pub fn advance_tick(&mut self) -> KernelResult<DeadlineReport> {
        self.ensure_running()?;
        self.increment_tick();
        self.check_deadlines()
    }

    /// Drain ticks latched by the tick interrupt, advancing once per tick.
    /// Returns the number of deadline misses seen.
    pub fn service_ticks(&mut self, latch: &TickLatch) -> KernelResult<usize> {
        let pending = latch.take();
        let mut misses = 0;
        for _ in 0..pending {
            misses += self.advance_tick()?.misses.len();
        }
        Ok(misses)
    }

    fn note_miss(&mut self, id: TaskId, report: &mut DeadlineReport) {
        let tick = self.tick;
        let tcb = &mut self.tasks[id.0];
        tcb.deadline_misses += 1;
        tcb.miss_reported = true;
        log::warn!(
            "task {} ({}) missed its deadline at tick {}",
            id,
            tcb.name,
            tick
        );
        self.record(TraceEvent::DeadlineMissed(id));
        let _ = report.misses.push(DeadlineMiss { task: id, tick });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventId;
    use crate::registry::{DeclId, EventDecl, Registry, TaskDecl};
    use crate::task::Priority;

    const STUCK: EventId = EventId(0);

    fn quick(k: &mut Kernel, id: TaskId) -> KernelResult<()> {
        k.terminate_task(id)
    }

    /// Never completes until `STUCK` is set.
    fn slow(k: &mut Kernel, id: TaskId) -> KernelResult<()> {
        if k.wait_event(id, STUCK)?.is_blocked() {
            return Ok(());
        }
        k.terminate_task(id)
    }

    fn idle(_k: &mut Kernel, _id: TaskId) -> KernelResult<()> {
        Ok(())
    }

    static TASKS: [TaskDecl; 3] = [
        TaskDecl::new("Idle", Priority(16), idle),
        TaskDecl::new("Quick", Priority(1), quick),
        TaskDecl::new("Slow", Priority(5), slow),
    ];
    static EVENTS: [EventDecl; 1] = [EventDecl::new("Stuck")];
    static REGISTRY: Registry = Registry::new(&TASKS, &[], &EVENTS);

    #[test]
    fn test_period_validation() {
        let mut k = Kernel::new(&REGISTRY).unwrap();
        let id = k.create_task(DeclId(1), Priority(1)).unwrap();
        assert_eq!(k.set_task_period(id, 0), Err(KernelError::InvalidPeriod));
        assert_eq!(k.set_task_deadline(id, 0), Err(KernelError::InvalidPeriod));
        assert_eq!(k.set_task_period(TaskId(6), 3), Err(KernelError::InvalidTask));
        assert_eq!(k.check_deadlines(), Err(KernelError::KernelNotRunning));

        k.set_task_period(id, 4).unwrap();
        let info = k.task_info(id).unwrap();
        assert_eq!((info.period, info.deadline), (4, 4));
    }

    #[test]
    fn test_periodic_task_is_released_every_period() {
        let mut k = Kernel::new(&REGISTRY).unwrap();
        let id = k.create_task(DeclId(1), Priority(1)).unwrap();
        k.set_task_period(id, 3).unwrap();
        k.resume_task(id).unwrap();
        k.start_os(DeclId(0)).unwrap();

        // Terminated but still bound.
        assert_eq!(k.task_state(id), Ok(TaskState::Dormant));

        let mut released = 0;
        for _ in 0..9 {
            let report = k.advance_tick().unwrap();
            assert!(report.misses.is_empty());
            released += report.reactivated.len();
        }
        assert_eq!(released, 3);
        assert_eq!(k.task_info(id).unwrap().activations, 4);
        assert_eq!(k.tick_count(), 9);
    }

    #[test]
    fn test_overrun_is_reported_once_per_activation() {
        let mut k = Kernel::new(&REGISTRY).unwrap();
        let id = k.create_task(DeclId(2), Priority(5)).unwrap();
        k.set_task_period(id, 4).unwrap();
        k.set_task_deadline(id, 2).unwrap();
        k.resume_task(id).unwrap();
        k.start_os(DeclId(0)).unwrap();
        assert_eq!(k.task_state(id), Ok(TaskState::Waiting));

        // Deadline after 2 ticks; the period boundary at 4 does not count
        // the same activation again.
        let misses: heapless::Vec<usize, 4> = (0..4)
            .map(|_| k.advance_tick().unwrap().misses.len())
            .collect();
        assert_eq!(misses, [0, 1, 0, 0]);

        // The boundary re-armed the deadline for the next window.
        assert_eq!(k.advance_tick().unwrap().misses.len(), 0);
        let report = k.advance_tick().unwrap();
        assert_eq!(report.misses.as_slice(), [DeadlineMiss { task: id, tick: 6 }]);
        assert_eq!(k.task_info(id).unwrap().deadline_misses, 2);

        // Completing the activation stops the misses.
        k.set_event(STUCK).unwrap();
        assert_eq!(k.task_state(id), Ok(TaskState::Dormant));
        assert!(k.advance_tick().unwrap().misses.is_empty());
    }

    #[test]
    fn test_suspended_periodic_task_is_not_released() {
        let mut k = Kernel::new(&REGISTRY).unwrap();
        let id = k.create_task(DeclId(1), Priority(1)).unwrap();
        k.set_task_period(id, 1).unwrap();
        k.start_os(DeclId(0)).unwrap();

        for _ in 0..3 {
            assert!(k.advance_tick().unwrap().is_quiet());
        }
        assert_eq!(k.task_state(id), Ok(TaskState::Suspended));
    }

    #[test]
    fn test_service_ticks_drains_the_latch() {
        let mut k = Kernel::new(&REGISTRY).unwrap();
        k.start_os(DeclId(0)).unwrap();

        let latch = TickLatch::new();
        latch.signal();
        latch.signal();
        latch.signal();
        assert_eq!(k.service_ticks(&latch), Ok(0));
        assert_eq!(k.tick_count(), 3);
        assert_eq!(latch.pending(), 0);
    }
}
