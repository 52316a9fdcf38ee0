//! Debugger-facing state.
//!
//! Breakpoints are consulted by the run loop in [`crate::Session::run`] before every
//! instruction. Allocation traces are filled by the allocator hooks and by the engine's
//! memory-operand reports.

/// Allocation-site structure tracing.
pub mod allocations;
/// Breakpoint set.
pub mod breakpoints;

pub use allocations::{AllocationTracer, TracedBlock};
pub use breakpoints::BreakpointSet;
