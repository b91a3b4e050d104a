//! Collaborator contracts the scheduler consumes but does not implement
//! (§6). Boot, console, arch timer/interrupt plumbing and the actual
//! context-switch assembly are all out of scope (§1); this module gives
//! them a typed seam instead of a concrete implementation, the way the
//! design notes ask ("arch-specific code out of scope ... modeled as the
//! `Platform` trait family").
//!
//! No teacher module covers this directly (the kernel crate wires its
//! architecture code straight into `sched::scheduler` and `arch::*`
//! instead of behind a trait), so these traits are new, shaped to match
//! exactly the collaborator contracts spec §6 names.

use crate::sched::task::{CpuId, Task, TaskId};

/// Monotonic per-CPU clock. §6: "must be non-decreasing across calls on
/// the same CPU; may be skewed slightly across CPUs".
pub trait Clock {
    fn monotonic_ns(&self) -> u64;
}

/// Timer services used for the preemption tick, RT period resets, and
/// deadline period rollover arming.
pub trait Timer {
    fn set_tick_frequency(&self, hz: u32);
    /// Arm a one-shot callback `ns` nanoseconds from now on `cpu`. The
    /// scheduler core itself only polls for rollover on tick (design
    /// notes OQ2); this is exposed for embedders that want to arm a
    /// real one-shot instead.
    fn arm_oneshot(&self, cpu: CpuId, ns: u64, callback: fn(CpuId));
}

/// Non-blocking, best-effort inter-CPU reschedule signal. §6: "no
/// delivery ordering guarantee beyond eventual delivery".
pub trait RescheduleSignal {
    fn reschedule(&self, cpu: CpuId);
}

/// The architecture context-switch primitive. §6: atomic with respect to
/// the scheduler; returns only once `prev` is chosen again on some CPU.
pub trait ContextSwitch {
    /// # Safety
    /// `prev` and `next` must both be task identities this crate's
    /// `Scheduler` currently considers live; the implementor is
    /// responsible for the actual register/stack save and restore.
    unsafe fn switch_to(&self, prev: Option<TaskId>, next: TaskId);
}

/// Scoped interrupt control: disables local interrupts on construction
/// of the guard it returns, restores the prior state when the guard
/// drops. Grounded in the kernel crate's own
/// `arch::x86_64::disable_interrupts() -> impl Drop` pattern, generalized
/// to a trait so this crate does not depend on any one architecture.
pub trait InterruptControl {
    /// Disable local interrupts, returning whether they were enabled
    /// beforehand so the matching `restore` call can put things back.
    fn disable(&self) -> bool;
    fn restore(&self, was_enabled: bool);
}

/// Queries the external affinity provider for a task's constraints.
/// Kept separate from [`Task`] itself since the process/thread layer,
/// not the scheduler, owns the authoritative affinity/NUMA-preference
/// state; the scheduler's copy on [`Task`] is a cache refreshed through
/// this trait at `set_affinity` time.
pub trait AffinityProvider {
    fn affinity_of(&self, task: &Task) -> crate::sched::task::CpuSet;
    fn preferred_numa_of(&self, task: &Task) -> Option<crate::sched::task::NodeId>;
}
