//! # CeilOS Configuration
//!
//! Compile-time constants bounding the kernel tables.
//! All limits are fixed at compile time; nothing is allocated dynamically.

/// Capacity of the task control block pool. Creating more live tasks than
/// this fails with `PoolExhausted`.
pub const MAX_TASKS: usize = 8;

/// Maximum number of declared resources.
pub const MAX_RESOURCES: usize = 8;

/// Maximum number of declared events.
pub const MAX_EVENTS: usize = 8;

/// Maximum number of declared tasks in a registry. Declarations are cheap
/// metadata, so this may exceed the pool capacity.
pub const MAX_DECLARED_TASKS: usize = 16;

/// How many resources one task may hold at once (nesting depth). A task
/// can hold every declared resource, so acquisition never runs out of room.
pub const MAX_NESTED_RESOURCES: usize = MAX_RESOURCES;

/// Number of records kept in the execution trace ring. The oldest record
/// is dropped once the ring is full.
pub const TRACE_DEPTH: usize = 128;

/// SysTick frequency in Hz. One tick advances the periodic monitor by one.
pub const TICK_HZ: u32 = 1000;

/// System clock frequency in Hz (default for STM32F4 at 16 MHz HSI).
pub const SYSTEM_CLOCK_HZ: u32 = 16_000_000;
