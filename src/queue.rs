//! # Task Queues
//!
//! A fixed-capacity queue of task ids ordered by priority, FIFO within a
//! priority band. The same structure backs the ready queue and the wait
//! queues of resources and events.
//!
//! Priorities are not stored in the queue. The caller supplies a lookup
//! when selecting, so a task whose effective priority changed while queued
//! is still ordered correctly. Every entry carries a sequence number from
//! the kernel's monotonic counter; the lowest number wins a tie.

use heapless::Vec;

use crate::config::MAX_TASKS;
use crate::task::{Priority, TaskId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct QueueEntry {
    task: TaskId,
    seq: u64,
}

/// Priority-ordered queue of task ids. Capacity matches the pool, and a
/// task appears at most once, so it cannot overflow.
#[derive(Debug, Clone)]
pub struct TaskQueue {
    entries: Vec<QueueEntry, MAX_TASKS>,
}

impl TaskQueue {
    pub const fn new() -> Self {
        Self { entries: Vec::new() }
    }

    /// Append `task` with sequence number `seq`. A task already queued
    /// keeps its original position.
    pub fn push(&mut self, task: TaskId, seq: u64) {
        if self.contains(task) {
            return;
        }
        let pushed = self.entries.push(QueueEntry { task, seq }).is_ok();
        debug_assert!(pushed, "task queue is larger than the pool");
    }

    /// Remove `task`. Returns whether it was queued.
    pub fn remove(&mut self, task: TaskId) -> bool {
        match self.entries.iter().position(|e| e.task == task) {
            Some(pos) => {
                self.entries.remove(pos);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, task: TaskId) -> bool {
        self.entries.iter().any(|e| e.task == task)
    }

    /// The most urgent task, earliest-queued among equals.
    pub fn peek_highest<F>(&self, priority_of: F) -> Option<TaskId>
    where
        F: Fn(TaskId) -> Priority,
    {
        self.best_index(priority_of).map(|i| self.entries[i].task)
    }

    /// Remove and return the most urgent task.
    pub fn pop_highest<F>(&mut self, priority_of: F) -> Option<TaskId>
    where
        F: Fn(TaskId) -> Priority,
    {
        let index = self.best_index(priority_of)?;
        Some(self.entries.remove(index).task)
    }

    fn best_index<F>(&self, priority_of: F) -> Option<usize>
    where
        F: Fn(TaskId) -> Priority,
    {
        let mut best: Option<(usize, Priority, u64)> = None;
        for (i, entry) in self.entries.iter().enumerate() {
            let prio = priority_of(entry.task);
            let better = match best {
                None => true,
                Some((_, best_prio, best_seq)) => {
                    prio.outranks(best_prio) || (prio == best_prio && entry.seq < best_seq)
                }
            };
            if better {
                best = Some((i, prio, entry.seq));
            }
        }
        best.map(|(i, _, _)| i)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Queued task ids in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = TaskId> + '_ {
        self.entries.iter().map(|e| e.task)
    }
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::new()
    }
}
