//! # Synchronization Primitives
//!
//! Interrupt-safe critical sections and the tick latch that carries
//! SysTick interrupts into thread mode.
//!
//! The kernel itself is never touched from interrupt context. A tick
//! handler only bumps a [`TickLatch`]; thread-mode code drains it through
//! [`Kernel::service_ticks`](crate::kernel::Kernel::service_ticks).
//!
//! On Cortex-M the `critical-section` implementation comes from
//! `cortex-m` (single-core, interrupts masked); on the host it comes from
//! the `std` implementation, so the same code runs under `cargo test`.

use core::cell::Cell;

use ::critical_section::{CriticalSection, Mutex};

/// Execute a closure within a critical section (interrupts disabled).
///
/// # Usage
/// ```ignore
/// sync::critical_section(|cs| {
///     // Access shared state safely
/// });
/// ```
#[inline]
pub fn critical_section<F, R>(f: F) -> R
where
    F: FnOnce(CriticalSection<'_>) -> R,
{
    ::critical_section::with(f)
}

/// Tick counter shared between the tick interrupt and thread mode.
pub struct TickLatch {
    pending: Mutex<Cell<u32>>,
}

impl TickLatch {
    pub const fn new() -> Self {
        Self {
            pending: Mutex::new(Cell::new(0)),
        }
    }

    /// Record one tick. Called from the tick interrupt.
    pub fn signal(&self) {
        critical_section(|cs| {
            let pending = self.pending.borrow(cs);
            pending.set(pending.get().saturating_add(1));
        });
    }

    /// Take every latched tick, leaving the latch empty.
    pub fn take(&self) -> u32 {
        critical_section(|cs| self.pending.borrow(cs).replace(0))
    }

    pub fn pending(&self) -> u32 {
        critical_section(|cs| self.pending.borrow(cs).get())
    }
}

impl Default for TickLatch {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latch_accumulates_and_drains() {
        let latch = TickLatch::new();
        assert_eq!(latch.take(), 0);

        latch.signal();
        latch.signal();
        assert_eq!(latch.pending(), 2);
        assert_eq!(latch.take(), 2);
        assert_eq!(latch.pending(), 0);
    }

    #[test]
    fn test_static_latch() {
        static LATCH: TickLatch = TickLatch::new();
        LATCH.signal();
        assert_eq!(critical_section(|cs| LATCH.pending.borrow(cs).get()), 1);
        assert_eq!(LATCH.take(), 1);
    }
}
