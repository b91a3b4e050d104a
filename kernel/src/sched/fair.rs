//! Fair scheduling class: a vruntime-ordered balanced tree with leftmost
//! caching (§4.C).
//!
//! The balancing scheme itself (red-black vs. weight-balanced vs. AA) is
//! left to the implementer by design notes OQ1; this uses `BTreeMap` keyed
//! by `(vruntime, insert_seq)`, which gives the required O(log n)
//! insert/delete and O(1) amortized leftmost access via `first_key_value`,
//! without any raw intrusive pointers.

use alloc::collections::BTreeMap;
use alloc::vec::Vec;

use super::config::SchedConfig;
use super::task::{CpuId, DequeueFlags, EnqueueFlags, Task, TaskId};

/// Nice -20..=19 mapped to the classical 40-entry load-weight table,
/// anchored so nice 0 -> 1024. Reproduced verbatim per the fair-class
/// contract (§4.C).
const PRIO_TO_WEIGHT: [u64; 40] = [
    88761, 71755, 56483, 46273, 36291, 29154, 23254, 18705, 14949, 11916, 9548, 7620, 6100, 4904,
    3906, 3121, 2501, 1991, 1586, 1277, 1024, 820, 655, 526, 423, 335, 272, 215, 172, 137, 110,
    87, 70, 56, 45, 36, 29, 23, 18, 15,
];

/// Reciprocal of [`PRIO_TO_WEIGHT`] scaled by `2^32`, for multiplication-based
/// division. Reproduced verbatim alongside the weight table.
const PRIO_TO_WMULT: [u64; 40] = [
    48388, 59856, 76040, 92818, 118348, 147320, 184698, 229616, 287308, 360437, 449829, 563644,
    704093, 875809, 1099582, 1376151, 1717300, 2157191, 2708050, 3363326, 4194304, 5237765,
    6557202, 8165337, 10153587, 12820798, 15790321, 19976592, 24970740, 31350126, 39045157,
    49367440, 61356676, 76695844, 95443717, 119304647, 148102320, 186737708, 238609294, 286331153,
];

/// Baseline load weight for nice 0 (§4.C constants).
pub const NICE0_LOAD: u64 = 1024;

/// Map a nice value in `[-20, 19]` to `(load_weight, inv_weight)`.
pub fn nice_to_weight(nice: i8) -> (u64, u64) {
    let idx = (nice.clamp(-20, 19) as i32 + 20) as usize;
    (PRIO_TO_WEIGHT[idx], PRIO_TO_WMULT[idx])
}

/// `period(n) = max(SCHED_LATENCY, n * MIN_GRANULARITY)`.
pub fn period(n: u32, config: &SchedConfig) -> u64 {
    core::cmp::max(config.sched_latency_ns, n as u64 * config.min_granularity_ns)
}

/// `sched_slice(T) = period(n) * T.load_weight / total_load`.
pub fn sched_slice(n: u32, task_weight: u64, total_load: u64, config: &SchedConfig) -> u64 {
    if total_load == 0 {
        return config.sched_latency_ns;
    }
    period(n, config) * task_weight / total_load
}

/// The fair class's runnable-task tree for one runqueue.
pub struct FairClass {
    tree: BTreeMap<(u64, u64), Task>,
    index: BTreeMap<TaskId, (u64, u64)>,
    nr: u32,
    load: u64,
    next_seq: u64,
}

impl FairClass {
    pub fn new() -> Self {
        Self {
            tree: BTreeMap::new(),
            index: BTreeMap::new(),
            nr: 0,
            load: 0,
            next_seq: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    pub fn nr(&self) -> u32 {
        self.nr
    }

    pub fn load(&self) -> u64 {
        self.load
    }

    pub fn leftmost_vruntime(&self) -> Option<u64> {
        self.tree.keys().next().map(|(v, _)| *v)
    }

    pub fn leftmost_id(&self) -> Option<TaskId> {
        self.tree.values().next().map(|t| t.id)
    }

    /// Enqueue per §4.C: restores the `min_vruntime` offset on wakeup,
    /// otherwise the task's vruntime was already initialized by the caller.
    pub fn enqueue(&mut self, mut task: Task, min_vruntime: u64, flags: EnqueueFlags) {
        let restoring = flags.contains(EnqueueFlags::WAKEUP) && !flags.contains(EnqueueFlags::WAKING);
        let seq = self.next_seq;
        self.next_seq += 1;
        let fa = task.fair_mut();
        if restoring {
            fa.vruntime = fa.vruntime.saturating_add(min_vruntime);
        }
        fa.insert_seq = seq;
        let key = (fa.vruntime, seq);
        self.load += fa.load_weight;
        self.nr += 1;
        self.index.insert(task.id, key);
        self.tree.insert(key, task);
    }

    /// Dequeue per §4.C: normalizes vruntime relative to `min_vruntime` when
    /// the task is going to sleep, so a later wake restores fairly.
    pub fn dequeue(&mut self, id: TaskId, min_vruntime: u64, flags: DequeueFlags) -> Option<Task> {
        let key = self.index.remove(&id)?;
        let mut task = self.tree.remove(&key)?;
        self.nr -= 1;
        self.load = self.load.saturating_sub(task.fair().load_weight);
        if flags.contains(DequeueFlags::SLEEP) {
            let fa = task.fair_mut();
            fa.vruntime = fa.vruntime.saturating_sub(min_vruntime);
        }
        Some(task)
    }

    /// Remove and return the leftmost task, becoming `curr`.
    pub fn pick_next(&mut self, now: u64) -> Option<Task> {
        let key = *self.tree.keys().next()?;
        let mut task = self.tree.remove(&key).expect("leftmost key must be present");
        self.index.remove(&task.id);
        self.nr -= 1;
        self.load = self.load.saturating_sub(task.fair().load_weight);
        let fa = task.fair_mut();
        fa.exec_start = now;
        fa.prev_sum_exec_runtime = fa.sum_exec_runtime;
        Some(task)
    }

    /// Identify up to `count` queued tasks eligible to move to `to` (the
    /// load balancer's job is only to decide which tasks, not to remove
    /// them; the caller dequeues each id under its own lock discipline).
    pub fn candidate_ids_for_migration(&self, to: CpuId, count: u32) -> Vec<TaskId> {
        self.tree
            .values()
            .filter(|t| t.can_run_on(to))
            .take(count as usize)
            .map(|t| t.id)
            .collect()
    }

    /// §4.C preemption check during tick: slice overrun or the leftmost
    /// task has drifted more than `WAKEUP_GRANULARITY` ahead of `curr`.
    pub fn check_preempt(&self, curr: &Task, config: &SchedConfig) -> bool {
        let fa = curr.fair();
        let n = self.nr + 1;
        let total_load = self.load + fa.load_weight;
        let ideal_slice = sched_slice(n, fa.load_weight, total_load, config);
        let delta = fa.sum_exec_runtime.saturating_sub(fa.prev_sum_exec_runtime);
        if delta > ideal_slice {
            return true;
        }
        if let Some(leftmost) = self.leftmost_vruntime() {
            if fa.vruntime.saturating_sub(leftmost) > config.wakeup_granularity_ns {
                return true;
            }
        }
        false
    }
}

impl Default for FairClass {
    fn default() -> Self {
        Self::new()
    }
}
