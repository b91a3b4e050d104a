//! Per-CPU process/thread scheduler core.
//!
//! `no_std` (host `std` is pulled in only for the test harness's
//! allocator). The crate's surface is [`sched::Scheduler`] plus the
//! [`platform`] collaborator traits an embedder implements to supply a
//! clock, timer, interrupt control, and context-switch primitive.

#![no_std]

#[cfg(feature = "alloc")]
extern crate alloc;

// Host target (`cargo test`): delegate to the system allocator so test
// code using `Vec`/`BTreeMap`/etc. compiles and runs without a real
// kernel heap behind it.
#[cfg(not(target_os = "none"))]
extern crate std;
#[cfg(not(target_os = "none"))]
#[global_allocator]
static SYSTEM_ALLOCATOR: std::alloc::System = std::alloc::System;

pub mod error;
pub mod platform;
pub mod sched;
pub mod sync;

pub use error::{SchedError, SchedResult};
pub use sched::{Scheduler, TickResult};
