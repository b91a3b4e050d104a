//! Scheduler error types.
//!
//! Out-of-range inputs from callers are errors; invariant violations
//! detected inside the scheduler are bugs and panic with a runqueue dump
//! instead of returning a recoverable error (see design notes).

use core::fmt;

/// Errors returned by the operations exposed in [`crate::sched::scheduler`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use = "scheduler errors must be handled, not silently discarded"]
pub enum SchedError {
    /// The referenced task is absent or already exited.
    NoSuchTask { id: u64 },
    /// Policy parameters out of range (nice outside [-20,19], RT priority
    /// out of range, or `runtime > deadline > period` violated).
    InvalidPolicy,
    /// Setting a deadline policy would exceed the configured total
    /// utilization bound.
    AdmissionDenied,
    /// The requested affinity set contains no online CPU.
    AffinityEmpty,
    /// Attempt to wake a task not in an allowed source state.
    WrongState,
    /// Non-blocking fast path lost a race; caller should retry.
    Busy,
}

pub type SchedResult<T> = Result<T, SchedError>;

impl fmt::Display for SchedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoSuchTask { id } => write!(f, "no such task: {}", id),
            Self::InvalidPolicy => write!(f, "invalid scheduling policy parameters"),
            Self::AdmissionDenied => write!(f, "deadline admission control denied"),
            Self::AffinityEmpty => write!(f, "requested affinity set has no online CPU"),
            Self::WrongState => write!(f, "task is not in an allowed source state"),
            Self::Busy => write!(f, "scheduler fast path is busy, retry"),
        }
    }
}
