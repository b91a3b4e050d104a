//! Real-time scheduling class: 40 fixed priority levels, FIFO and
//! round-robin policies, and a per-runqueue bandwidth throttle (§4.D).

use alloc::collections::{BTreeMap, VecDeque};

use super::config::SchedConfig;
use super::task::{DequeueFlags, EnqueueFlags, RtPolicy, Task, TaskId};

/// Number of distinct RT priority levels. Priority `MAX_RT_PRIO - 1` is the
/// most important; `0` the least.
pub const MAX_RT_PRIO: usize = 40;

/// One FIFO/RR run queue per priority level, with a bitmap for O(1)
/// highest-priority lookup, plus a bandwidth throttle shared across all
/// levels on this runqueue.
pub struct RtClass {
    queues: [VecDeque<Task>; MAX_RT_PRIO],
    bitmap: u64,
    index: BTreeMap<TaskId, u8>,
    nr: u32,
    runtime_used_ns: u64,
    period_start_ns: u64,
    throttled: bool,
}

impl RtClass {
    pub fn new() -> Self {
        const EMPTY: VecDeque<Task> = VecDeque::new();
        Self {
            queues: [EMPTY; MAX_RT_PRIO],
            bitmap: 0,
            index: BTreeMap::new(),
            nr: 0,
            runtime_used_ns: 0,
            period_start_ns: 0,
            throttled: false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.nr == 0
    }

    pub fn nr(&self) -> u32 {
        self.nr
    }

    pub fn is_throttled(&self) -> bool {
        self.throttled
    }

    /// Priority `0` is most important (§4.D: "40 priority levels (0
    /// highest)"), so the most important non-empty level is the lowest
    /// set bit, not the highest.
    pub fn highest_priority(&self) -> Option<u8> {
        if self.bitmap == 0 {
            None
        } else {
            Some(self.bitmap.trailing_zeros() as u8)
        }
    }

    pub fn enqueue(&mut self, task: Task, flags: EnqueueFlags) {
        let prio = task.rt().priority as usize;
        self.bitmap |= 1u64 << prio;
        self.index.insert(task.id, prio as u8);
        self.nr += 1;
        if flags.contains(EnqueueFlags::HEAD) {
            self.queues[prio].push_front(task);
        } else {
            self.queues[prio].push_back(task);
        }
    }

    pub fn dequeue(&mut self, id: TaskId, _flags: DequeueFlags) -> Option<Task> {
        let prio = *self.index.get(&id)? as usize;
        let queue = &mut self.queues[prio];
        let pos = queue.iter().position(|t| t.id == id)?;
        let task = queue.remove(pos).expect("position just located");
        self.index.remove(&id);
        self.nr -= 1;
        if queue.is_empty() {
            self.bitmap &= !(1u64 << prio);
        }
        Some(task)
    }

    /// Remove and return the head of the highest-priority non-empty queue.
    /// Returns `None` if throttled even when runnable tasks are present —
    /// the caller falls through to the fair class, per §4.D.
    pub fn pick_next(&mut self) -> Option<Task> {
        if self.throttled {
            return None;
        }
        let prio = self.highest_priority()? as usize;
        let task = self.queues[prio].pop_front().expect("bitmap bit implies nonempty queue");
        self.index.remove(&task.id);
        self.nr -= 1;
        if self.queues[prio].is_empty() {
            self.bitmap &= !(1u64 << prio);
        }
        Some(task)
    }

    /// Re-enqueue `curr` at the tail of its priority level, for round-robin
    /// slice expiry or FIFO yield.
    pub fn requeue_tail(&mut self, task: Task) {
        let prio = task.rt().priority as usize;
        self.bitmap |= 1u64 << prio;
        self.index.insert(task.id, prio as u8);
        self.nr += 1;
        self.queues[prio].push_back(task);
    }

    /// Roll the bandwidth window over and clear the throttle once `now` has
    /// passed the period boundary. Resolves OQ3/OQ2-style polling: no timer
    /// callback is registered, the window is checked every tick regardless
    /// of whether an RT task is presently `curr` — otherwise a throttled
    /// FIFO task that lost the CPU to the fair class would never become
    /// eligible again, since nothing else re-examines its window.
    pub fn roll_window(&mut self, now: u64, config: &SchedConfig) {
        if now >= self.period_start_ns + config.rt_period_ns {
            self.period_start_ns = now;
            self.runtime_used_ns = 0;
            self.throttled = false;
        }
    }

    /// Charge `delta_ns` of actual RT execution against the current window,
    /// engaging the throttle once the runtime budget is exhausted.
    pub fn add_runtime(&mut self, delta_ns: u64, config: &SchedConfig) {
        self.runtime_used_ns = self.runtime_used_ns.saturating_add(delta_ns);
        if self.runtime_used_ns >= config.rt_runtime_ns {
            self.throttled = true;
        }
    }

    /// Convenience wrapper combining [`Self::roll_window`] and
    /// [`Self::add_runtime`], for callers that always have both the current
    /// time and an elapsed delta for a running RT task in hand.
    pub fn account_runtime(&mut self, now: u64, delta_ns: u64, config: &SchedConfig) {
        self.roll_window(now, config);
        self.add_runtime(delta_ns, config);
    }

    /// Decrement a round-robin task's remaining slice; returns `true` once
    /// it has been exhausted and the task should be requeued.
    pub fn tick_rr(task: &mut Task, delta_ns: u64) -> bool {
        let rt = task.rt_mut();
        match rt.policy {
            RtPolicy::Fifo => false,
            RtPolicy::RoundRobin { slice_ns } => {
                rt.rr_slice_remaining_ns = rt.rr_slice_remaining_ns.saturating_sub(delta_ns);
                if rt.rr_slice_remaining_ns == 0 {
                    rt.rr_slice_remaining_ns = slice_ns;
                    true
                } else {
                    false
                }
            }
        }
    }
}

impl Default for RtClass {
    fn default() -> Self {
        Self::new()
    }
}
