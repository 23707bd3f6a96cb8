//! # Execution Trace
//!
//! A bounded ring of scheduling records kept by the kernel. External
//! tooling (and the tests) read it to reconstruct who ran when; the
//! kernel never reads it back.

use heapless::Deque;

use crate::config::TRACE_DEPTH;
use crate::event::EventId;
use crate::resource::ResourceId;
use crate::task::TaskId;

/// A scheduling event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceEvent {
    /// The task became RUNNING.
    Dispatched(TaskId),
    /// The running task was displaced by a more urgent one.
    Preempted(TaskId),
    /// The task moved to WAITING.
    Blocked(TaskId),
    /// A waiting task was made READY.
    Woken(TaskId),
    /// The task finished its activation.
    Terminated(TaskId),
    ResourceAcquired(TaskId, ResourceId),
    ResourceReleased(TaskId, ResourceId),
    EventSet(EventId),
    DeadlineMissed(TaskId),
    /// A dormant periodic task was released for its next period.
    Reactivated(TaskId),
}

/// One trace entry, stamped with the tick it happened on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraceRecord {
    pub tick: u64,
    pub event: TraceEvent,
}

/// Ring buffer of the last `TRACE_DEPTH` records.
#[derive(Debug, Clone)]
pub struct Trace {
    records: Deque<TraceRecord, TRACE_DEPTH>,
}

impl Trace {
    pub const fn new() -> Self {
        Self { records: Deque::new() }
    }

    pub fn record(&mut self, tick: u64, event: TraceEvent) {
        if self.records.is_full() {
            self.records.pop_front();
        }
        // Cannot fail: a slot was just freed.
        let _ = self.records.push_back(TraceRecord { tick, event });
    }

    /// Records, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &TraceRecord> + '_ {
        self.records.iter()
    }

    /// Events only, oldest first.
    pub fn events(&self) -> impl Iterator<Item = TraceEvent> + '_ {
        self.records.iter().map(|r| r.event)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }
}

impl Default for Trace {
    fn default() -> Self {
        Self::new()
    }
}
