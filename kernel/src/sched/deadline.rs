//! Deadline scheduling class: earliest-deadline-first ordering with
//! utilization-based admission and period-rollover throttling (§4.E).
//!
//! No teacher module covers this class; it is modeled after
//! [`super::fair`]'s tree shape, reusing the same `(key, insert_seq)`
//! tie-break idea with the key swapped for absolute deadline.

use alloc::collections::BTreeMap;
use alloc::vec::Vec;

use super::config::SchedConfig;
use super::task::{DequeueFlags, EnqueueFlags, Task, TaskId};

/// The deadline class's EDF tree for one runqueue, plus the running sum of
/// admitted utilization used for admission control.
pub struct DlClass {
    tree: BTreeMap<(u64, u64), Task>,
    index: BTreeMap<TaskId, (u64, u64)>,
    nr: u32,
    total_utilization_milli: u64,
    next_seq: u64,
}

/// `runtime_ns * 1000 / period_ns`, parts per thousand.
pub fn utilization_milli(runtime_ns: u64, period_ns: u64) -> u64 {
    if period_ns == 0 {
        return 1000;
    }
    runtime_ns.saturating_mul(1000) / period_ns
}

impl DlClass {
    pub fn new() -> Self {
        Self {
            tree: BTreeMap::new(),
            index: BTreeMap::new(),
            nr: 0,
            total_utilization_milli: 0,
            next_seq: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    pub fn nr(&self) -> u32 {
        self.nr
    }

    pub fn total_utilization_milli(&self) -> u64 {
        self.total_utilization_milli
    }

    /// §4.E admission control: would adding a task with this runtime/period
    /// push the runqueue's total utilization over the configured bound.
    pub fn admits(&self, runtime_ns: u64, period_ns: u64, config: &SchedConfig) -> bool {
        let util = utilization_milli(runtime_ns, period_ns);
        self.total_utilization_milli + util <= config.dl_utilization_bound_milli as u64
    }

    pub fn earliest_deadline(&self) -> Option<u64> {
        self.tree.keys().next().map(|(d, _)| *d)
    }

    pub fn enqueue(&mut self, task: Task, flags: EnqueueFlags) {
        let _ = flags;
        let seq = self.next_seq;
        self.next_seq += 1;
        let dl = task.dl();
        let util = utilization_milli(dl.runtime_ns, dl.period_ns);
        let key = (dl.absolute_deadline_ns, seq);
        self.total_utilization_milli += util;
        self.nr += 1;
        self.index.insert(task.id, key);
        let mut task = task;
        task.dl_mut().insert_seq = seq;
        self.tree.insert(key, task);
    }

    pub fn dequeue(&mut self, id: TaskId, flags: DequeueFlags) -> Option<Task> {
        let _ = flags;
        let key = self.index.remove(&id)?;
        let task = self.tree.remove(&key)?;
        self.nr -= 1;
        let dl = task.dl();
        self.total_utilization_milli -= utilization_milli(dl.runtime_ns, dl.period_ns);
        Some(task)
    }

    /// Remove and return the earliest-deadline task that is not currently
    /// throttled. A task whose per-period runtime budget is exhausted stays
    /// queued (so it keeps its deadline ordering) but is skipped until its
    /// period rolls over in `account_runtime`.
    pub fn pick_next(&mut self) -> Option<Task> {
        let mut skipped: Vec<Task> = Vec::new();
        let mut picked = None;
        while let Some(key) = self.tree.keys().next().copied() {
            let task = self.tree.remove(&key).expect("key just observed");
            self.index.remove(&task.id);
            self.nr -= 1;
            if task.dl().throttled {
                skipped.push(task);
                continue;
            }
            picked = Some(task);
            break;
        }
        for task in skipped {
            let key = (task.dl().absolute_deadline_ns, task.dl().insert_seq);
            self.index.insert(task.id, key);
            self.nr += 1;
            self.tree.insert(key, task);
        }
        picked
    }

    /// EDF preempts `curr` whenever the tree holds a strictly earlier
    /// absolute deadline.
    pub fn check_preempt(&self, curr: &Task) -> bool {
        match self.earliest_deadline() {
            Some(earliest) => earliest < curr.dl().absolute_deadline_ns,
            None => false,
        }
    }

    /// Account `delta_ns` of execution and roll the period over once `now`
    /// passes the absolute deadline, per the poll-on-tick resolution
    /// recorded for the timer-callback open question.
    pub fn account_runtime(task: &mut Task, now: u64, delta_ns: u64) {
        let dl = task.dl_mut();
        dl.runtime_remaining_ns = dl.runtime_remaining_ns.saturating_sub(delta_ns);
        if dl.runtime_remaining_ns == 0 {
            dl.throttled = true;
        }
        if now >= dl.absolute_deadline_ns {
            dl.absolute_deadline_ns += dl.period_ns;
            dl.runtime_remaining_ns = dl.runtime_ns;
            dl.throttled = false;
        }
    }
}

impl Default for DlClass {
    fn default() -> Self {
        Self::new()
    }
}
