//! Per-CPU runqueue: the three class queues, the logical clock, and the
//! counters `schedule`/`tick` update every time they run (§3, §4.B).
//!
//! Grounded in the teacher's `sched::smp::PerCpuData` (one struct per CPU,
//! `#[repr(C)]` layout, `spin::Mutex` protecting it).

use super::config::SchedConfig;
use super::deadline::DlClass;
use super::fair::FairClass;
use super::realtime::RtClass;
use super::task::{CpuId, DequeueFlags, EnqueueFlags, SchedClass, Task, TaskId};

/// One CPU's private scheduling state. A `Scheduler` holds one of these per
/// online CPU behind a `spin::Mutex`; callers must hold that lock (and have
/// IRQs disabled, see [`crate::sync::irq`]) before calling any method here.
pub struct Runqueue {
    pub cpu: CpuId,
    pub clock_ns: u64,
    pub min_vruntime: u64,
    pub fair: FairClass,
    pub rt: RtClass,
    pub dl: DlClass,
    /// The task presently running on this CPU, if any.
    pub curr: Option<Task>,
    /// §3 `next_balance_at`: timestamp of the next periodic balance
    /// attempt, checked by the tick handler (§4.I step 3).
    pub next_balance_at: u64,
}

impl Runqueue {
    pub fn new(cpu: CpuId) -> Self {
        Self {
            cpu,
            clock_ns: 0,
            min_vruntime: 0,
            fair: FairClass::new(),
            rt: RtClass::new(),
            dl: DlClass::new(),
            curr: None,
            next_balance_at: 0,
        }
    }

    /// Total number of runnable tasks across all three classes, `curr`
    /// included.
    pub fn nr_running(&self) -> u32 {
        self.fair.nr() + self.rt.nr() + self.dl.nr() + self.curr.is_some() as u32
    }

    pub fn is_idle(&self) -> bool {
        self.nr_running() == 0
    }

    /// §4.B `update_clock`: advance the runqueue's logical clock.
    pub fn update_clock(&mut self, now_ns: u64) {
        self.clock_ns = now_ns;
    }

    /// §4.B `update_curr`: account the elapsed slice against whichever
    /// class `curr` belongs to, returning the elapsed delta so the caller
    /// can feed the RT bandwidth throttle and deadline rollover.
    pub fn update_curr(&mut self, config: &SchedConfig) -> u64 {
        // The RT bandwidth window must roll over on schedule even when no
        // RT task is presently running (otherwise a throttled FIFO task
        // sitting in the queue would never become eligible again).
        self.rt.roll_window(self.clock_ns, config);

        let Some(curr) = self.curr.as_mut() else {
            return 0;
        };
        let now = self.clock_ns;
        match curr.class {
            SchedClass::Fair => {
                let fa = curr.fair_mut();
                let delta = now.saturating_sub(fa.exec_start);
                fa.sum_exec_runtime += delta;
                fa.exec_start = now;
                let weighted = delta.saturating_mul(super::fair::NICE0_LOAD) / fa.load_weight.max(1);
                fa.vruntime = fa.vruntime.saturating_add(weighted);
                self.recompute_min_vruntime();
                delta
            }
            SchedClass::RealTime => {
                let delta = now.saturating_sub(self.last_update_for_curr());
                self.rt.add_runtime(delta, config);
                delta
            }
            SchedClass::Deadline => {
                let delta = now.saturating_sub(self.last_update_for_curr());
                DlClass::account_runtime(curr, now, delta);
                delta
            }
        }
    }

    /// `update_curr` needs a "time since last accounted" for RT/Deadline
    /// tasks, which don't carry `exec_start`/`sum_exec_runtime` the way fair
    /// tasks do; the runqueue clock advancing since the last tick call is
    /// an adequate proxy since `update_curr` is always called once per tick.
    fn last_update_for_curr(&self) -> u64 {
        self.clock_ns
    }

    /// §4.B `recompute_min_vruntime`: `min_vruntime` never regresses, and
    /// tracks the minimum of `curr`'s vruntime and the fair tree's leftmost.
    pub fn recompute_min_vruntime(&mut self) {
        let mut candidate = self.min_vruntime;
        if let Some(curr) = &self.curr {
            if curr.class == SchedClass::Fair {
                candidate = candidate.max(curr.fair().vruntime);
            }
        }
        if let Some(leftmost) = self.fair.leftmost_vruntime() {
            candidate = if self.curr.is_some() {
                core::cmp::min(candidate, leftmost)
            } else {
                leftmost
            };
        }
        self.min_vruntime = core::cmp::max(self.min_vruntime, candidate);
    }

    /// Insert a not-currently-running task into the queue matching its
    /// class.
    pub fn enqueue(&mut self, task: Task, flags: EnqueueFlags) {
        match task.class {
            SchedClass::Fair => self.fair.enqueue(task, self.min_vruntime, flags),
            SchedClass::RealTime => self.rt.enqueue(task, flags),
            SchedClass::Deadline => self.dl.enqueue(task, flags),
        }
    }

    /// Remove a queued (not running) task by id from whichever class queue
    /// holds it.
    pub fn dequeue(&mut self, id: TaskId, class: SchedClass, flags: DequeueFlags) -> Option<Task> {
        match class {
            SchedClass::Fair => self.fair.dequeue(id, self.min_vruntime, flags),
            SchedClass::RealTime => self.rt.dequeue(id, flags),
            SchedClass::Deadline => self.dl.dequeue(id, flags),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sched::task::Task;

    #[test]
    fn nr_running_counts_curr_and_all_classes() {
        let mut rq = Runqueue::new(0);
        assert_eq!(rq.nr_running(), 0);
        rq.enqueue(Task::new_fair(1, 0, 0, 4), EnqueueFlags::empty());
        rq.curr = Some(Task::new_fair(2, 0, 0, 4));
        assert_eq!(rq.nr_running(), 2);
    }

    #[test]
    fn update_curr_accumulates_fair_vruntime_by_weight() {
        let config = SchedConfig::default();
        let mut rq = Runqueue::new(0);
        let mut task = Task::new_fair(1, 0, 0, 4);
        task.fair_mut().exec_start = 0;
        rq.curr = Some(task);
        rq.update_clock(1_000_000);
        let delta = rq.update_curr(&config);
        assert_eq!(delta, 1_000_000);
        assert_eq!(rq.curr.as_ref().unwrap().fair().vruntime, 1_000_000);
    }

    #[test]
    fn min_vruntime_never_regresses() {
        let mut rq = Runqueue::new(0);
        rq.min_vruntime = 500;
        rq.enqueue(Task::new_fair(1, 0, 100, 4), EnqueueFlags::empty());
        rq.recompute_min_vruntime();
        assert_eq!(rq.min_vruntime, 500);
    }
}
