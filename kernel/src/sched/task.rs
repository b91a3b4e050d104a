//! Scheduling entity: the `Task` struct and its class/policy/state types.

use core::sync::atomic::{AtomicU64, Ordering};

use bitflags::bitflags;

use crate::error::{SchedError, SchedResult};

/// Dense, globally unique task identity.
pub type TaskId = u64;

/// NUMA node index; see [`crate::sched::topology`].
pub type NodeId = u32;

/// Dense CPU index, `0..N`.
pub type CpuId = u32;

static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(1);

/// Allocate a fresh, never-reused task id.
pub fn alloc_task_id() -> TaskId {
    NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed)
}

bitflags! {
    /// Flags passed to `activate_task`/class `enqueue`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct EnqueueFlags: u8 {
        const WAKEUP   = 0b0001;
        const WAKING   = 0b0010;
        const MIGRATED = 0b0100;
        const HEAD     = 0b1000;
    }
}

bitflags! {
    /// Flags passed to `deactivate_task`/class `dequeue`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DequeueFlags: u8 {
        const SLEEP   = 0b001;
        const MIGRATE = 0b010;
        const SAVE    = 0b100;
    }
}

/// CPU affinity mask. Dense bitset, capacity fixed at construction by the
/// topology's CPU count (see [`crate::sched::topology::Topology`]).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CpuSet {
    mask: u64,
}

impl CpuSet {
    /// Every CPU in `0..cpu_count` allowed.
    pub fn all(cpu_count: u32) -> Self {
        let mask = if cpu_count >= 64 {
            u64::MAX
        } else {
            (1u64 << cpu_count) - 1
        };
        Self { mask }
    }

    /// No CPUs allowed.
    pub fn empty() -> Self {
        Self { mask: 0 }
    }

    pub fn single(cpu: CpuId) -> Self {
        Self {
            mask: 1u64 << cpu,
        }
    }

    pub fn from_mask(mask: u64) -> Self {
        Self { mask }
    }

    pub fn contains(&self, cpu: CpuId) -> bool {
        (self.mask & (1u64 << cpu)) != 0
    }

    pub fn add(&mut self, cpu: CpuId) {
        self.mask |= 1u64 << cpu;
    }

    pub fn remove(&mut self, cpu: CpuId) {
        self.mask &= !(1u64 << cpu);
    }

    pub fn is_empty(&self) -> bool {
        self.mask == 0
    }

    /// Iterate the CPU ids present in the set, ascending.
    pub fn iter(&self) -> impl Iterator<Item = CpuId> + '_ {
        let mask = self.mask;
        (0..64).filter(move |cpu| (mask & (1u64 << cpu)) != 0)
    }
}

/// Scheduling class discriminant. Classes form the strict priority ladder
/// Deadline > RealTime > Fair on every runqueue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SchedClass {
    Deadline,
    RealTime,
    Fair,
}

/// Real-time scheduling policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RtPolicy {
    Fifo,
    RoundRobin { slice_ns: u64 },
}

/// The policy a caller requests via `set_policy`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Policy {
    Fair { nice: i8 },
    RtFifo { priority: u8 },
    RtRoundRobin { priority: u8, slice_ms: u32 },
    Deadline {
        runtime_ns: u64,
        deadline_ns: u64,
        period_ns: u64,
    },
}

impl Policy {
    /// Validate range constraints from the error design (§7): nice in
    /// [-20, 19], RT priority < MAX_RT_PRIO, and runtime <= deadline <= period.
    pub fn validate(&self) -> SchedResult<()> {
        match *self {
            Policy::Fair { nice } => {
                if !(-20..=19).contains(&nice) {
                    return Err(SchedError::InvalidPolicy);
                }
            }
            Policy::RtFifo { priority } | Policy::RtRoundRobin { priority, .. } => {
                if priority as usize >= super::realtime::MAX_RT_PRIO {
                    return Err(SchedError::InvalidPolicy);
                }
            }
            Policy::Deadline {
                runtime_ns,
                deadline_ns,
                period_ns,
            } => {
                if !(runtime_ns <= deadline_ns && deadline_ns <= period_ns) {
                    return Err(SchedError::InvalidPolicy);
                }
            }
        }
        Ok(())
    }
}

/// Externally observable task state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Running,
    Runnable,
    Blocked,
    Zombie,
}

/// Fair-class scheduling accounting, live only while `class == Fair`.
#[derive(Debug, Clone, Copy, Default)]
pub struct FairAccounting {
    pub vruntime: u64,
    pub sum_exec_runtime: u64,
    pub prev_sum_exec_runtime: u64,
    pub exec_start: u64,
    pub load_weight: u64,
    pub inv_weight: u64,
    /// Smoothed utilization, 0..=1024.
    pub util_avg: u32,
    /// Monotone counter stamped at insertion; breaks vruntime ties.
    pub insert_seq: u64,
}

/// Real-time scheduling accounting, live only while `class == RealTime`.
#[derive(Debug, Clone, Copy)]
pub struct RtAccounting {
    pub priority: u8,
    pub policy: RtPolicy,
    pub rr_slice_remaining_ns: u64,
}

/// Deadline scheduling accounting, live only while `class == Deadline`.
#[derive(Debug, Clone, Copy)]
pub struct DlAccounting {
    pub runtime_remaining_ns: u64,
    pub runtime_ns: u64,
    pub absolute_deadline_ns: u64,
    pub period_ns: u64,
    pub throttled: bool,
    /// Monotone counter stamped at insertion; breaks deadline ties.
    pub insert_seq: u64,
}

/// Per-class accounting payload, tagged by `SchedClass`.
#[derive(Debug, Clone, Copy)]
pub enum ClassState {
    Fair(FairAccounting),
    RealTime(RtAccounting),
    Deadline(DlAccounting),
}

/// A schedulable entity. Covers all three classes; `class_state`'s variant
/// always matches `class`.
#[derive(Debug, Clone)]
pub struct Task {
    pub id: TaskId,
    pub affinity: CpuSet,
    pub preferred_numa: Option<NodeId>,
    pub class: SchedClass,
    pub class_state: ClassState,
    pub state: TaskState,
    /// CPU this task's structures currently live on, if any.
    pub cpu_of: Option<CpuId>,
    pub last_cpu: Option<CpuId>,
    pub migrations: u64,
    pub voluntary_switches: u64,
    pub involuntary_switches: u64,
}

impl Task {
    /// Construct a new fair-class task at the given runqueue's current
    /// `min_vruntime`, per spec §3 lifecycle ("Create").
    pub fn new_fair(id: TaskId, nice: i8, min_vruntime: u64, cpu_count: u32) -> Self {
        let (weight, inv_weight) = super::fair::nice_to_weight(nice);
        Task {
            id,
            affinity: CpuSet::all(cpu_count),
            preferred_numa: None,
            class: SchedClass::Fair,
            class_state: ClassState::Fair(FairAccounting {
                vruntime: min_vruntime,
                load_weight: weight,
                inv_weight,
                ..Default::default()
            }),
            state: TaskState::Runnable,
            cpu_of: None,
            last_cpu: None,
            migrations: 0,
            voluntary_switches: 0,
            involuntary_switches: 0,
        }
    }

    pub fn new_rt(id: TaskId, priority: u8, policy: RtPolicy, cpu_count: u32) -> Self {
        Task {
            id,
            affinity: CpuSet::all(cpu_count),
            preferred_numa: None,
            class: SchedClass::RealTime,
            class_state: ClassState::RealTime(RtAccounting {
                priority,
                policy,
                rr_slice_remaining_ns: match policy {
                    RtPolicy::RoundRobin { slice_ns } => slice_ns,
                    RtPolicy::Fifo => 0,
                },
            }),
            state: TaskState::Runnable,
            cpu_of: None,
            last_cpu: None,
            migrations: 0,
            voluntary_switches: 0,
            involuntary_switches: 0,
        }
    }

    pub fn new_deadline(
        id: TaskId,
        runtime_ns: u64,
        deadline_ns: u64,
        period_ns: u64,
        now: u64,
        cpu_count: u32,
    ) -> Self {
        Task {
            id,
            affinity: CpuSet::all(cpu_count),
            preferred_numa: None,
            class: SchedClass::Deadline,
            class_state: ClassState::Deadline(DlAccounting {
                runtime_remaining_ns: runtime_ns,
                runtime_ns,
                absolute_deadline_ns: now + deadline_ns,
                period_ns,
                throttled: false,
                insert_seq: 0,
            }),
            state: TaskState::Runnable,
            cpu_of: None,
            last_cpu: None,
            migrations: 0,
            voluntary_switches: 0,
            involuntary_switches: 0,
        }
    }

    pub fn fair(&self) -> &FairAccounting {
        match &self.class_state {
            ClassState::Fair(f) => f,
            _ => panic!("task {} is not a fair task", self.id),
        }
    }

    pub fn fair_mut(&mut self) -> &mut FairAccounting {
        match &mut self.class_state {
            ClassState::Fair(f) => f,
            _ => panic!("task {} is not a fair task", self.id),
        }
    }

    pub fn rt(&self) -> &RtAccounting {
        match &self.class_state {
            ClassState::RealTime(r) => r,
            _ => panic!("task {} is not an RT task", self.id),
        }
    }

    pub fn rt_mut(&mut self) -> &mut RtAccounting {
        match &mut self.class_state {
            ClassState::RealTime(r) => r,
            _ => panic!("task {} is not an RT task", self.id),
        }
    }

    pub fn dl(&self) -> &DlAccounting {
        match &self.class_state {
            ClassState::Deadline(d) => d,
            _ => panic!("task {} is not a deadline task", self.id),
        }
    }

    pub fn dl_mut(&mut self) -> &mut DlAccounting {
        match &mut self.class_state {
            ClassState::Deadline(d) => d,
            _ => panic!("task {} is not a deadline task", self.id),
        }
    }

    pub fn can_run_on(&self, cpu: CpuId) -> bool {
        self.affinity.contains(cpu)
    }
}
