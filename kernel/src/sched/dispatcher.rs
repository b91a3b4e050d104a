//! The core dispatch loop: picking what should run next and switching to
//! it (§4.F). Grounded in the teacher's `sched::scheduler::Scheduler::schedule`,
//! generalized from its single ready-queue to the three-class priority
//! ladder.

use super::config::SchedConfig;
use super::runqueue::Runqueue;
use super::task::{DequeueFlags, EnqueueFlags, RtPolicy, SchedClass, Task, TaskId};

/// What the caller must do after `schedule` returns: nothing, or perform an
/// architecture context switch away from `from` and into `to`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchDecision {
    KeepRunning,
    SwitchTo { from: Option<TaskId>, to: TaskId },
    IdleCpu { from: Option<TaskId> },
}

/// §4.F `schedule(preempt)`. Caller must hold the runqueue lock and have
/// IRQs disabled for the whole call. `preempt` is `true` when called from
/// the tick handler or a wakeup that found a more important task than
/// `curr`; `false` for a voluntary yield or blocking call, where `curr` is
/// always moved off the CPU regardless of priority comparisons.
pub fn schedule(rq: &mut Runqueue, config: &SchedConfig, preempt: bool) -> SwitchDecision {
    // Step 1: advance the clock is the tick/wakeup caller's job; schedule()
    // only accounts the slice curr has already used against this clock.
    // Step 2: charge curr for time used since it was last accounted.
    rq.update_curr(config);

    // Step 3: does a higher-priority class (or the same class's own
    // preemption rule) want the CPU right now?
    let should_switch = match &rq.curr {
        None => true,
        Some(curr) => {
            if !preempt {
                true
            } else {
                match curr.class {
                    SchedClass::Deadline => curr.dl().throttled || rq.dl.check_preempt(curr),
                    SchedClass::RealTime => {
                        !rq.dl.is_empty()
                            || rq.rt.highest_priority().is_some_and(|p| p < curr.rt().priority)
                            || rq.rt.is_throttled()
                    }
                    SchedClass::Fair => {
                        !rq.dl.is_empty() || !rq.rt.is_empty() || rq.fair.check_preempt(curr, config)
                    }
                }
            }
        }
    };

    if !should_switch {
        return SwitchDecision::KeepRunning;
    }

    // Step 4: move curr back onto its class queue (or drop it if it exited
    // or blocked before this call — the caller is responsible for that via
    // `deactivate_task`, so by the time we get here curr is always still
    // runnable).
    let from_id = rq.curr.as_ref().map(|t| t.id);
    if let Some(mut curr) = rq.curr.take() {
        if preempt {
            curr.involuntary_switches += 1;
        } else {
            curr.voluntary_switches += 1;
        }
        requeue_after_run(rq, curr);
    }

    // Step 5: pick the next task off the highest-priority nonempty class,
    // Deadline > RealTime > Fair, falling through when a class is empty or
    // its RT bandwidth throttle is engaged.
    let next = rq
        .dl
        .pick_next()
        .or_else(|| rq.rt.pick_next())
        .or_else(|| rq.fair.pick_next(rq.clock_ns));

    match next {
        Some(mut task) => {
            stamp_dispatch(&mut task, rq.clock_ns);
            let to = task.id;
            rq.curr = Some(task);
            SwitchDecision::SwitchTo { from: from_id, to }
        }
        None => {
            rq.curr = None;
            SwitchDecision::IdleCpu { from: from_id }
        }
    }
}

/// Re-insert a task that just stopped running back onto its class queue,
/// normalizing whatever per-class bookkeeping a "ran, then was preempted or
/// yielded" transition implies.
fn requeue_after_run(rq: &mut Runqueue, task: Task) {
    match task.class {
        SchedClass::Fair => rq.fair.enqueue(task, rq.min_vruntime, EnqueueFlags::empty()),
        SchedClass::RealTime => {
            let mut task = task;
            if matches!(task.rt().policy, RtPolicy::RoundRobin { .. }) {
                let slice = match task.rt().policy {
                    RtPolicy::RoundRobin { slice_ns } => slice_ns,
                    RtPolicy::Fifo => 0,
                };
                task.rt_mut().rr_slice_remaining_ns = slice;
            }
            rq.rt.requeue_tail(task);
        }
        SchedClass::Deadline => rq.dl.enqueue(task, EnqueueFlags::empty()),
    }
}

fn stamp_dispatch(task: &mut Task, now: u64) {
    if task.class == SchedClass::Fair {
        let fa = task.fair_mut();
        fa.exec_start = now;
        fa.prev_sum_exec_runtime = fa.sum_exec_runtime;
    }
}

/// Remove a task from wherever it lives on this runqueue because it is
/// exiting or blocking, rather than merely yielding the CPU. Used by
/// `deactivate_task` before a voluntary `schedule(false)` call. `flags`
/// is forwarded to whichever class's `dequeue` ends up handling it, so a
/// `SLEEP` deactivation normalizes fair vruntime while a `MIGRATE`/`SAVE`
/// one does not.
pub fn remove_for_deactivate(rq: &mut Runqueue, id: TaskId, flags: DequeueFlags) -> Option<Task> {
    if rq.curr.as_ref().map(|t| t.id) == Some(id) {
        return rq.curr.take();
    }
    rq.dequeue(id, SchedClass::Deadline, flags)
        .or_else(|| rq.dequeue(id, SchedClass::RealTime, flags))
        .or_else(|| rq.dequeue(id, SchedClass::Fair, flags))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sched::task::Task;

    #[test]
    fn deadline_preempts_running_fair_task() {
        let config = SchedConfig::default();
        let mut rq = Runqueue::new(0);
        rq.curr = Some(Task::new_fair(1, 0, 0, 4));
        rq.dl.enqueue(Task::new_deadline(2, 10, 100, 200, 0, 4), EnqueueFlags::empty());

        let decision = schedule(&mut rq, &config, true);
        assert_eq!(decision, SwitchDecision::SwitchTo { from: Some(1), to: 2 });
        assert_eq!(rq.curr.as_ref().unwrap().id, 2);
        assert_eq!(rq.fair.nr(), 1);
    }

    #[test]
    fn running_deadline_task_is_never_preempted_by_lower_classes() {
        let config = SchedConfig::default();
        let mut rq = Runqueue::new(0);
        rq.curr = Some(Task::new_deadline(1, 10, 100, 200, 0, 4));
        rq.fair.enqueue(Task::new_fair(2, 0, 0, 4), 0, EnqueueFlags::empty());
        rq.rt.enqueue(Task::new_rt(3, 30, RtPolicy::Fifo, 4), EnqueueFlags::empty());

        let decision = schedule(&mut rq, &config, true);
        assert_eq!(decision, SwitchDecision::KeepRunning);
    }

    #[test]
    fn empty_runqueue_goes_idle() {
        let config = SchedConfig::default();
        let mut rq = Runqueue::new(0);
        let decision = schedule(&mut rq, &config, false);
        assert_eq!(decision, SwitchDecision::IdleCpu { from: None });
    }

    #[test]
    fn voluntary_yield_always_reselects_even_without_higher_priority_work() {
        let config = SchedConfig::default();
        let mut rq = Runqueue::new(0);
        rq.curr = Some(Task::new_fair(1, 0, 0, 4));
        rq.fair.enqueue(Task::new_fair(2, 0, 50, 4), 0, EnqueueFlags::empty());

        let decision = schedule(&mut rq, &config, false);
        assert_eq!(decision, SwitchDecision::SwitchTo { from: Some(1), to: 1 });
    }
}
