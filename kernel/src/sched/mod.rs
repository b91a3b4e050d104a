//! Per-CPU process/thread scheduler core: three scheduling classes
//! (deadline, real-time, fair) arranged in a strict priority ladder over
//! one runqueue per CPU, with topology-aware wakeup placement and load
//! balancing.
//!
//! [`Scheduler`] is the single entry point; everything else in this
//! module tree is either a building block it owns (`runqueue`, the three
//! class modules) or a free function it calls (`dispatcher`, `wakeup`,
//! `load_balance`, `tick`).

pub mod config;
pub mod deadline;
pub mod dispatcher;
pub mod fair;
pub mod load_balance;
pub mod metrics;
pub mod realtime;
pub mod runqueue;
pub mod scheduler;
pub mod task;
pub mod tick;
pub mod topology;
pub mod wakeup;

pub use config::SchedConfig;
pub use scheduler::{Scheduler, TickResult};
pub use task::{
    CpuId, CpuSet, DequeueFlags, EnqueueFlags, NodeId, Policy, RtPolicy, SchedClass, Task,
    TaskId, TaskState,
};
pub use topology::Topology;
