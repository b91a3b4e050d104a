//! Integration tests for the per-CPU scheduler's public surface: basic
//! dispatch across all three classes, policy/priority changes, EDF
//! admission, and the hot-plug path. `scenarios.rs` in this same directory
//! covers the literal end-to-end scenarios; this file exercises the
//! individual `Scheduler` operations more directly.

use ark_kernel::sched::task::alloc_task_id;
use ark_kernel::sched::{
    CpuSet, DequeueFlags, EnqueueFlags, Policy, RtPolicy, SchedConfig, Scheduler, Task, TaskState,
    Topology,
};
use ark_kernel::SchedError;

fn scheduler(cpus: u32) -> Scheduler {
    Scheduler::new(Topology::uniform(cpus), SchedConfig::default())
}

#[test]
fn deadline_outranks_realtime_outranks_fair_on_the_same_cpu() {
    let sched = scheduler(1);
    let fair_id = alloc_task_id();
    let rt_id = alloc_task_id();
    let dl_id = alloc_task_id();

    sched
        .activate_task(Task::new_fair(fair_id, 0, 0, 1), None, EnqueueFlags::empty())
        .unwrap();
    sched
        .activate_task(Task::new_rt(rt_id, 20, RtPolicy::Fifo, 1), None, EnqueueFlags::empty())
        .unwrap();
    sched
        .activate_task(
            Task::new_deadline(dl_id, 10_000_000, 50_000_000, 100_000_000, 0, 1),
            None,
            EnqueueFlags::empty(),
        )
        .unwrap();

    let decision = sched.schedule(0, 0, false).unwrap();
    assert_eq!(decision, ark_kernel::sched::dispatcher::SwitchDecision::SwitchTo { from: None, to: dl_id });
    assert_eq!(sched.snapshot_stats().per_cpu[0].curr_task, Some(dl_id));
}

#[test]
fn lower_rt_priority_number_always_wins_p6() {
    let sched = scheduler(1);
    let high = alloc_task_id();
    let low = alloc_task_id();
    sched
        .activate_task(Task::new_rt(high, 5, RtPolicy::Fifo, 1), None, EnqueueFlags::empty())
        .unwrap();
    sched.schedule(0, 0, false).unwrap();
    assert_eq!(sched.snapshot_stats().per_cpu[0].curr_task, Some(high));

    sched
        .activate_task(Task::new_rt(low, 30, RtPolicy::Fifo, 1), None, EnqueueFlags::empty())
        .unwrap();
    // A less urgent arrival must never force curr off the CPU.
    sched.schedule(0, 0, true).unwrap();
    assert_eq!(sched.snapshot_stats().per_cpu[0].curr_task, Some(high));
}

#[test]
fn deadline_admission_control_rejects_over_budget_tasks() {
    let sched = scheduler(1);
    let a = alloc_task_id();
    let b = alloc_task_id();
    sched
        .activate_task(
            Task::new_deadline(a, 600_000_000, 600_000_000, 1_000_000_000, 0, 1),
            None,
            EnqueueFlags::empty(),
        )
        .unwrap();

    let err = sched.set_policy(
        0,
        b,
        Policy::Deadline {
            runtime_ns: 500_000_000,
            deadline_ns: 500_000_000,
            period_ns: 1_000_000_000,
        },
    );
    // `b` was never activated, so this is rejected for a different reason
    // than admission; exercise admission denial against a task that exists.
    assert_eq!(err, Err(SchedError::NoSuchTask { id: b }));

    sched
        .activate_task(Task::new_fair(b, 0, 0, 1), None, EnqueueFlags::empty())
        .unwrap();
    let denied = sched.set_policy(
        0,
        b,
        Policy::Deadline {
            runtime_ns: 500_000_000,
            deadline_ns: 500_000_000,
            period_ns: 1_000_000_000,
        },
    );
    assert_eq!(denied, Err(SchedError::AdmissionDenied));
}

#[test]
fn set_priority_changes_fair_load_weight() {
    let sched = scheduler(1);
    let id = alloc_task_id();
    sched
        .activate_task(Task::new_fair(id, 0, 0, 1), None, EnqueueFlags::empty())
        .unwrap();

    sched.set_priority(0, id, -20).unwrap();
    let task = sched.deactivate_task(0, id, DequeueFlags::SLEEP).unwrap();
    assert_eq!(task.fair().load_weight, 88761);
}

#[test]
fn set_priority_rejects_deadline_tasks() {
    let sched = scheduler(1);
    let id = alloc_task_id();
    sched
        .activate_task(
            Task::new_deadline(id, 10_000_000, 50_000_000, 100_000_000, 0, 1),
            None,
            EnqueueFlags::empty(),
        )
        .unwrap();
    let err = sched.set_priority(0, id, 5);
    assert_eq!(err, Err(SchedError::InvalidPolicy));
}

#[test]
fn set_policy_switches_a_fair_task_to_round_robin_rt() {
    let sched = scheduler(1);
    let id = alloc_task_id();
    sched
        .activate_task(Task::new_fair(id, 0, 0, 1), None, EnqueueFlags::empty())
        .unwrap();

    sched
        .set_policy(0, id, Policy::RtRoundRobin { priority: 15, slice_ms: 10 })
        .unwrap();

    let task = sched.deactivate_task(0, id, DequeueFlags::SLEEP).unwrap();
    assert_eq!(task.class, ark_kernel::sched::SchedClass::RealTime);
    assert_eq!(task.rt().priority, 15);
}

#[test]
fn try_to_wake_up_succeeds_from_an_allowed_state() {
    let sched = scheduler(2);
    let mut task = Task::new_fair(alloc_task_id(), 0, 0, 2);
    task.state = TaskState::Blocked;
    let (cpu, _signal) = sched
        .try_to_wake_up(task, None, &[TaskState::Blocked], None, false)
        .unwrap();
    assert_eq!(sched.snapshot_stats().per_cpu[cpu as usize].nr_running, 1);
}

#[test]
fn try_to_wake_up_signals_when_placed_on_a_different_cpu() {
    let sched = scheduler(4);
    let mut task = Task::new_fair(alloc_task_id(), 0, 0, 4);
    task.affinity = CpuSet::single(3);
    task.state = TaskState::Blocked;
    let (cpu, needs_signal) = sched
        .try_to_wake_up(task, None, &[TaskState::Blocked], Some(0), false)
        .unwrap();
    assert_eq!(cpu, 3);
    assert!(needs_signal);
}

#[test]
fn sync_wake_up_prefers_wakers_cpu_over_idle_previous_cpu() {
    let sched = scheduler(4);
    let id = alloc_task_id();
    sched
        .activate_task(Task::new_fair(id, 0, 0, 4), None, EnqueueFlags::empty())
        .unwrap();
    let prev_cpu = sched
        .snapshot_stats()
        .per_cpu
        .iter()
        .find(|c| c.nr_fair == 1)
        .map(|c| c.cpu)
        .unwrap();
    let mut task = sched.deactivate_task(prev_cpu, id, DequeueFlags::SLEEP).unwrap();
    task.state = TaskState::Blocked;

    // The old CPU is idle, so a plain wakeup would land back there; a sync
    // wakeup from a different CPU must bypass that and land on the waker.
    let waker_cpu = sched.snapshot_stats().per_cpu.iter().map(|c| c.cpu).find(|&c| c != prev_cpu).unwrap();
    let (cpu, _signal) = sched
        .try_to_wake_up(task, Some(prev_cpu), &[TaskState::Blocked], Some(waker_cpu), true)
        .unwrap();
    assert_eq!(cpu, waker_cpu);
}

#[test]
fn idle_balance_finds_nothing_to_steal_when_affinity_forbids_it() {
    let sched = scheduler(2);
    for _ in 0..3 {
        let id = alloc_task_id();
        let mut task = Task::new_fair(id, 0, 0, 2);
        task.affinity = CpuSet::single(0);
        sched.activate_task(task, None, EnqueueFlags::empty()).unwrap();
    }
    assert_eq!(sched.snapshot_stats().per_cpu[0].nr_running, 3);

    // The steal candidate is chosen purely on CPU load, so a plan is still
    // proposed; but every CPU-0 task is pinned there, so nothing actually
    // crosses over once affinity is consulted in the migrate step.
    let plan = sched.idle_balance(1).unwrap();
    assert_eq!(
        plan,
        Some(ark_kernel::sched::load_balance::MigrationPlan { from: 0, to: 1, count: 1 })
    );
    assert_eq!(sched.snapshot_stats().per_cpu[1].nr_running, 0);
    assert_eq!(sched.snapshot_stats().per_cpu[0].nr_running, 3);
}

#[test]
fn idle_balance_steals_from_the_busiest_sibling_when_affinity_allows() {
    let sched = scheduler(2);
    let mut ids = Vec::new();
    for _ in 0..3 {
        let id = alloc_task_id();
        let mut task = Task::new_fair(id, 0, 0, 2);
        task.affinity = CpuSet::single(0);
        sched.activate_task(task, None, EnqueueFlags::empty()).unwrap();
        ids.push(id);
    }
    for id in &ids {
        sched.set_affinity(0, *id, CpuSet::all(2)).unwrap();
    }
    assert_eq!(sched.snapshot_stats().per_cpu[0].nr_running, 3);
    assert_eq!(sched.snapshot_stats().per_cpu[1].nr_running, 0);

    let plan = sched.idle_balance(1).unwrap();
    assert_eq!(
        plan,
        Some(ark_kernel::sched::load_balance::MigrationPlan { from: 0, to: 1, count: 1 })
    );
    assert_eq!(sched.snapshot_stats().per_cpu[1].nr_running, 1);
    assert_eq!(sched.snapshot_stats().per_cpu[0].nr_running, 2);
}

#[test]
fn cpu_down_then_cpu_up_round_trips() {
    let sched = scheduler(2);
    let id = alloc_task_id();
    sched
        .activate_task(Task::new_fair(id, 0, 0, 2), None, EnqueueFlags::empty())
        .unwrap();
    let placed_on = sched
        .snapshot_stats()
        .per_cpu
        .iter()
        .find(|c| c.nr_fair == 1)
        .map(|c| c.cpu)
        .unwrap();

    sched.cpu_down(placed_on).unwrap();
    assert_eq!(sched.snapshot_stats().per_cpu[placed_on as usize].nr_running, 0);

    sched.cpu_up(placed_on);
    // The CPU is back online and eligible for future placements; a fresh
    // wakeup may now land on it again.
    let new_id = alloc_task_id();
    let mut pinned = Task::new_fair(new_id, 0, 0, 2);
    pinned.affinity = CpuSet::single(placed_on);
    sched.activate_task(pinned, None, EnqueueFlags::empty()).unwrap();
    assert_eq!(sched.snapshot_stats().per_cpu[placed_on as usize].nr_fair, 1);
}

#[test]
fn report_power_hint_accepts_any_online_cpu_and_rejects_out_of_range() {
    let sched = scheduler(2);
    assert!(sched.report_power_hint(1, 700).is_ok());
    assert_eq!(
        sched.report_power_hint(5, 700),
        Err(SchedError::AffinityEmpty)
    );
}

#[test]
fn yield_current_always_reselects_among_equal_priority_peers() {
    let sched = scheduler(1);
    let a = alloc_task_id();
    let b = alloc_task_id();
    sched
        .activate_task(Task::new_fair(a, 0, 0, 1), None, EnqueueFlags::empty())
        .unwrap();
    sched
        .activate_task(Task::new_fair(b, 0, 100, 1), None, EnqueueFlags::empty())
        .unwrap();
    sched.schedule(0, 0, false).unwrap();
    let first = sched.snapshot_stats().per_cpu[0].curr_task;
    sched.yield_current(0, 0).unwrap();
    let second = sched.snapshot_stats().per_cpu[0].curr_task;
    assert_ne!(first, second);
}
