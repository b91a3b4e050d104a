//! The top-level `Scheduler`: owns every CPU's runqueue and metrics, and
//! exposes the operations named in §6 to the rest of the kernel.
//!
//! Grounded in the teacher's `sched::scheduler::Scheduler`, which plays
//! the same role (a single value owning per-CPU state, methods taking
//! `&self`) but over a single `NonNull<Task>`-linked ready queue instead
//! of the three-class, per-CPU structure built up across
//! `runqueue.rs`/`fair.rs`/`realtime.rs`/`deadline.rs`/`dispatcher.rs`/
//! `wakeup.rs`/`load_balance.rs`/`tick.rs`. Locking follows §5: each
//! runqueue is an independent `spin::Mutex`, acquired in ascending
//! CPU-id order whenever two are held at once (migration).

use alloc::vec::Vec;
use core::sync::atomic::{AtomicU32, Ordering};

use spin::Mutex;

use super::config::SchedConfig;
use super::dispatcher::{self, SwitchDecision};
use super::load_balance::{self, MigrationPlan};
use super::metrics::{snapshot_cpu, CpuStats, PerCpuMetrics, StatsSnapshot};
use super::runqueue::Runqueue;
use super::task::{
    CpuId, CpuSet, DequeueFlags, EnqueueFlags, Policy, SchedClass, Task, TaskId, TaskState,
};
use super::tick;
use super::topology::Topology;
use super::wakeup::{self, CpuLoadSnapshot};
use crate::error::{SchedError, SchedResult};

/// Outcome of a tick on one CPU: what the dispatcher decided, and which
/// migration (if any) the balance pass performed.
#[derive(Debug, Clone)]
pub struct TickResult {
    pub switch: SwitchDecision,
    pub migration: Option<MigrationPlan>,
}

/// Owns one [`Runqueue`] per online CPU plus the shared, read-mostly
/// [`Topology`] and [`SchedConfig`]. This is the only type embedders
/// construct; every §6 operation is a method here.
pub struct Scheduler {
    config: SchedConfig,
    topology: Mutex<Topology>,
    runqueues: Vec<Mutex<Runqueue>>,
    metrics: Vec<PerCpuMetrics>,
    /// §8 P4: sum over all CPUs of `nr_running`, maintained independently
    /// so the invariant can be checked without locking every runqueue.
    nr_running_total: AtomicU32,
}

impl Scheduler {
    pub fn new(topology: Topology, config: SchedConfig) -> Self {
        let n = topology.cpu_count() as usize;
        let mut runqueues = Vec::with_capacity(n);
        let mut metrics = Vec::with_capacity(n);
        for cpu in 0..n as u32 {
            runqueues.push(Mutex::new(Runqueue::new(cpu)));
            metrics.push(PerCpuMetrics::new());
        }
        Self {
            config,
            topology: Mutex::new(topology),
            runqueues,
            metrics,
            nr_running_total: AtomicU32::new(0),
        }
    }

    pub fn cpu_count(&self) -> u32 {
        self.runqueues.len() as u32
    }

    pub fn config(&self) -> &SchedConfig {
        &self.config
    }

    /// Total runnable tasks over all CPUs, for checking §8 P4 against the
    /// per-CPU `nr_running` figures a caller sums from [`Self::snapshot_stats`].
    pub fn nr_running_total(&self) -> u32 {
        self.nr_running_total.load(Ordering::Relaxed)
    }

    fn snapshot_loads(&self) -> Vec<CpuLoadSnapshot> {
        self.runqueues
            .iter()
            .map(|rq| {
                let g = rq.lock();
                CpuLoadSnapshot {
                    cpu: g.cpu,
                    nr_running: g.nr_running(),
                    fair_load: g.fair.load(),
                }
            })
            .collect()
    }

    /// §6 `activate_task`: wake or create-runnable. `prev_cpu` is the
    /// task's last-known CPU (`None` for a never-run task); the placement
    /// algorithm in [`wakeup::select_wakeup_cpu`] picks the target.
    pub fn activate_task(
        &self,
        task: Task,
        prev_cpu: Option<CpuId>,
        flags: EnqueueFlags,
    ) -> SchedResult<CpuId> {
        self.activate_task_with_wake_hint(task, prev_cpu, flags, None, false)
    }

    /// Same as [`Self::activate_task`], but additionally threading the
    /// waker's CPU and the `sync` hint into placement (§4.G's affine
    /// short-circuit). Used by [`Self::try_to_wake_up`]; plain
    /// create-runnable/migration callers have no waker and go through
    /// [`Self::activate_task`] instead.
    fn activate_task_with_wake_hint(
        &self,
        mut task: Task,
        prev_cpu: Option<CpuId>,
        flags: EnqueueFlags,
        waking_cpu: Option<CpuId>,
        sync: bool,
    ) -> SchedResult<CpuId> {
        let snapshots = self.snapshot_loads();
        let target = {
            let topology = self.topology.lock();
            wakeup::select_wakeup_cpu(&task, prev_cpu, waking_cpu, sync, &snapshots, &topology, &self.config)
                .ok_or(SchedError::AffinityEmpty)?
        };

        let mut flags = flags;
        let migrated = prev_cpu.is_some_and(|p| p != target);
        if migrated {
            flags.insert(EnqueueFlags::MIGRATED);
            load_balance::stamp_migrated(&mut task, prev_cpu.expect("checked by is_some_and"));
        }
        task.cpu_of = Some(target);
        task.state = TaskState::Runnable;

        {
            let mut rq = self.runqueues[target as usize].lock();
            rq.enqueue(task, flags);
        }
        self.nr_running_total.fetch_add(1, Ordering::Relaxed);
        if migrated {
            self.metrics[target as usize].record_migration_in();
            if let Some(src) = prev_cpu {
                self.metrics[src as usize].record_migration_out();
            }
        }
        Ok(target)
    }

    /// §6 `deactivate_task`: sleep or exit-prep. Removes `id` from
    /// wherever it lives on `cpu` (running or queued) and returns it to
    /// the caller, normalizing vruntime when `flags` includes `SLEEP`.
    pub fn deactivate_task(&self, cpu: CpuId, id: TaskId, flags: DequeueFlags) -> SchedResult<Task> {
        let mut rq = self.cpu_rq(cpu)?.lock();
        let task = dispatcher::remove_for_deactivate(&mut rq, id, flags)
            .ok_or(SchedError::NoSuchTask { id })?;
        drop(rq);
        self.nr_running_total.fetch_sub(1, Ordering::Relaxed);
        Ok(task)
    }

    /// §6 `try_to_wake_up`. `allowed_states` restricts which source
    /// states may be woken (§4.G step 2). `waking_cpu` is the CPU running
    /// the waker, and `sync` marks that the waker will block immediately
    /// after this call returns (e.g. a synchronous `send` that blocks on
    /// the receiver) — both feed the affine short-circuit placement rule
    /// in [`wakeup::select_fair_wakeup_cpu`]. On success, returns the CPU
    /// the task was placed on and whether that CPU needs an inter-CPU
    /// reschedule signal sent (§4.G step 5) — sending the signal itself
    /// is the embedder's job via [`crate::platform::RescheduleSignal`].
    pub fn try_to_wake_up(
        &self,
        mut task: Task,
        prev_cpu: Option<CpuId>,
        allowed_states: &[TaskState],
        waking_cpu: Option<CpuId>,
        sync: bool,
    ) -> SchedResult<(CpuId, bool)> {
        if !allowed_states.contains(&task.state) {
            return Err(SchedError::WrongState);
        }
        task.state = TaskState::Runnable;
        let target =
            self.activate_task_with_wake_hint(task, prev_cpu, EnqueueFlags::WAKEUP, waking_cpu, sync)?;
        let needs_signal = waking_cpu.is_some_and(|w| w != target);
        Ok((target, needs_signal))
    }

    /// §6 `schedule()`: dispatcher entry for one CPU. Caller is expected
    /// to hold IRQs disabled for the call (see [`crate::sync::irq`]);
    /// `now_ns` comes from [`crate::platform::Clock`].
    pub fn schedule(&self, cpu: CpuId, now_ns: u64, preempt: bool) -> SchedResult<SwitchDecision> {
        let mut rq = self.cpu_rq(cpu)?.lock();
        rq.update_clock(now_ns);
        let decision = dispatcher::schedule(&mut rq, &self.config, preempt);
        if let SwitchDecision::SwitchTo { .. } = decision {
            self.metrics[cpu as usize].record_switch(!preempt);
        }
        Ok(decision)
    }

    /// Voluntary yield (§6 `yield_current`): forces a reselect even when
    /// no class-priority rule demands one, since `schedule(cpu, now,
    /// false)` always re-evaluates regardless of preemption checks.
    pub fn yield_current(&self, cpu: CpuId, now_ns: u64) -> SchedResult<SwitchDecision> {
        self.schedule(cpu, now_ns, false)
    }

    /// §6 `tick_on_current_cpu`. Runs the per-CPU tick (§4.I) and, if the
    /// balance deadline has passed, plans and performs a migration
    /// against the busiest peer in the narrowest imbalanced domain
    /// (§4.H). Migration acquires both runqueue locks in ascending
    /// CPU-id order (§5).
    pub fn tick_on_current_cpu(&self, cpu: CpuId, now_ns: u64) -> SchedResult<TickResult> {
        let balance_interval = load_balance::balance_interval(1, &self.config);
        let outcome = {
            let mut rq = self.cpu_rq(cpu)?.lock();
            tick::tick_on_current_cpu(&mut rq, &self.config, now_ns, balance_interval)
        };
        if let SwitchDecision::SwitchTo { .. } = outcome.switch {
            self.metrics[cpu as usize].record_switch(false);
        }

        let migration = if outcome.balance_due {
            self.metrics[cpu as usize].record_load_balance();
            self.run_balance_pass(cpu)?
        } else {
            None
        };

        Ok(TickResult {
            switch: outcome.switch,
            migration,
        })
    }

    /// §4.H: plan a migration from `cpu`'s narrowest imbalanced domain
    /// and, if one is found, perform it under ascending-CPU-id lock
    /// order. Used by both the periodic tick path and the idle-balance
    /// path (`idle_balance`).
    fn run_balance_pass(&self, cpu: CpuId) -> SchedResult<Option<MigrationPlan>> {
        let snapshots = self.snapshot_loads();
        let plan = {
            let topology = self.topology.lock();
            load_balance::plan_rebalance(cpu, &topology, &snapshots, &self.config)
        };
        let Some(plan) = plan else {
            return Ok(None);
        };
        self.migrate(plan)?;
        Ok(Some(plan))
    }

    /// §4.H idle path: this CPU just went idle (pick-next returned
    /// nothing); try the cheap work-steal fast path before falling back
    /// to waiting for the next periodic balance.
    pub fn idle_balance(&self, cpu: CpuId) -> SchedResult<Option<MigrationPlan>> {
        let snapshots = self.snapshot_loads();
        let from = {
            let topology = self.topology.lock();
            load_balance::steal_candidate(cpu, &topology, &snapshots)
        };
        let Some(from) = from else {
            return self.run_balance_pass(cpu);
        };
        let plan = MigrationPlan { from, to: cpu, count: 1 };
        self.migrate(plan)?;
        Ok(Some(plan))
    }

    /// Perform a planned migration: lock source and destination runqueues
    /// in ascending CPU-id order (§5), move up to `plan.count` eligible
    /// fair-class tasks, and update metrics.
    fn migrate(&self, plan: MigrationPlan) -> SchedResult<()> {
        if plan.from == plan.to {
            return Ok(());
        }
        let (lo, hi) = if plan.from < plan.to {
            (plan.from, plan.to)
        } else {
            (plan.to, plan.from)
        };
        let rq_lo = self.cpu_rq(lo)?;
        let rq_hi = self.cpu_rq(hi)?;
        let mut guard_lo = rq_lo.lock();
        let mut guard_hi = rq_hi.lock();
        let (src, dst) = if plan.from == lo {
            (&mut guard_lo, &mut guard_hi)
        } else {
            (&mut guard_hi, &mut guard_lo)
        };

        let ids = src.fair.candidate_ids_for_migration(plan.to, plan.count);
        for id in ids {
            if let Some(mut task) = src.dequeue(id, SchedClass::Fair, DequeueFlags::MIGRATE) {
                load_balance::stamp_migrated(&mut task, plan.from);
                task.cpu_of = Some(plan.to);
                dst.enqueue(task, EnqueueFlags::MIGRATED);
            }
        }
        drop(guard_lo);
        drop(guard_hi);
        self.metrics[plan.from as usize].record_migration_out();
        self.metrics[plan.to as usize].record_migration_in();
        Ok(())
    }

    /// §6 `set_policy`: change class, validating parameters (§7) and
    /// running deadline admission control (§4.E) before committing.
    pub fn set_policy(&self, cpu: CpuId, id: TaskId, policy: Policy) -> SchedResult<()> {
        policy.validate()?;
        let mut rq = self.cpu_rq(cpu)?.lock();
        let cpu_count = self.cpu_count();
        let task = dispatcher::remove_for_deactivate(&mut rq, id, DequeueFlags::SAVE)
            .ok_or(SchedError::NoSuchTask { id })?;

        if let Policy::Deadline { runtime_ns, period_ns, .. } = policy {
            if !rq.dl.admits(runtime_ns, period_ns, &self.config) {
                // Put the task back exactly as found before rejecting.
                rq.enqueue(task, EnqueueFlags::empty());
                return Err(SchedError::AdmissionDenied);
            }
        }

        let new_task = rebuild_task(task, policy, rq.clock_ns, cpu_count);
        rq.enqueue(new_task, EnqueueFlags::empty());
        Ok(())
    }

    /// §6 `set_priority`: nice for fair tasks, `rt_priority` for RT
    /// tasks. Deadline tasks have no "priority" in this sense and are
    /// rejected with `InvalidPolicy`.
    pub fn set_priority(&self, cpu: CpuId, id: TaskId, priority: i16) -> SchedResult<()> {
        {
            let mut rq = self.cpu_rq(cpu)?.lock();
            if let Some(curr) = rq.curr.as_mut() {
                if curr.id == id {
                    return apply_priority(curr, priority);
                }
            }
        }

        // Not currently running: pull it off its class queue, mutate,
        // and put it back so the tree/list key stays consistent.
        let mut rq = self.cpu_rq(cpu)?.lock();
        let mut task = dispatcher::remove_for_deactivate(&mut rq, id, DequeueFlags::SAVE)
            .ok_or(SchedError::NoSuchTask { id })?;
        if let Err(e) = apply_priority(&mut task, priority) {
            rq.enqueue(task, EnqueueFlags::empty());
            return Err(e);
        }
        rq.enqueue(task, EnqueueFlags::empty());
        Ok(())
    }

    /// §6 `set_affinity`: narrow (or widen) a task's allowed CPU set.
    /// `AffinityEmpty` if the new mask excludes every online CPU. If the
    /// task's current CPU is no longer allowed, migrates it immediately
    /// (§8 B4: "migration to that CPU within one scheduling round").
    pub fn set_affinity(&self, cpu: CpuId, id: TaskId, affinity: CpuSet) -> SchedResult<()> {
        let has_online = {
            let topology = self.topology.lock();
            topology.online_cpus().any(|c| affinity.contains(c))
        };
        if !has_online || affinity.is_empty() {
            return Err(SchedError::AffinityEmpty);
        }

        let still_allowed = affinity.contains(cpu);
        {
            let mut rq = self.cpu_rq(cpu)?.lock();
            if let Some(curr) = rq.curr.as_mut() {
                if curr.id == id {
                    curr.affinity = affinity.clone();
                    if still_allowed {
                        return Ok(());
                    }
                }
            }
        }

        let mut task = match self.deactivate_task(cpu, id, DequeueFlags::MIGRATE) {
            Ok(t) => t,
            Err(SchedError::NoSuchTask { .. }) => return Err(SchedError::NoSuchTask { id }),
            Err(e) => return Err(e),
        };
        task.affinity = affinity;
        if still_allowed {
            // Still legal on the CPU it already occupied: put it straight
            // back there instead of re-running wakeup placement, which
            // could otherwise bounce a merely-widened task to a different
            // idle CPU for no reason.
            let mut rq = self.cpu_rq(cpu)?.lock();
            rq.enqueue(task, EnqueueFlags::empty());
            self.nr_running_total.fetch_add(1, Ordering::Relaxed);
            return Ok(());
        }
        self.activate_task(task, Some(cpu), EnqueueFlags::MIGRATED)?;
        Ok(())
    }

    /// §6 `report_power_hint`: record a CPU's updated effective capacity
    /// hint. Core-class placement keys off [`super::topology::CoreClass`]
    /// rather than a numeric capacity value, so this is currently only
    /// logged; a future energy model can key off it without changing the
    /// call's signature.
    pub fn report_power_hint(&self, cpu: CpuId, new_capacity_milli: u32) -> SchedResult<()> {
        let _ = self.cpu_rq(cpu)?;
        log::debug!("cpu {cpu}: capacity hint {new_capacity_milli}");
        Ok(())
    }

    /// §4.J / §6 `snapshot_stats`: walk every runqueue's lock briefly,
    /// one at a time, never two held simultaneously.
    pub fn snapshot_stats(&self) -> StatsSnapshot {
        let per_cpu: Vec<CpuStats> = self
            .runqueues
            .iter()
            .zip(self.metrics.iter())
            .map(|(rq, m)| {
                let g = rq.lock();
                snapshot_cpu(&g, m)
            })
            .collect();
        StatsSnapshot { per_cpu }
    }

    /// Supplemented (§B): mark a CPU offline and migrate every task it
    /// was running or holding onto its least-loaded online sibling.
    /// Grounded in the teacher's `sched::smp::cpu_down`.
    pub fn cpu_down(&self, cpu: CpuId) -> SchedResult<()> {
        {
            let mut topology = self.topology.lock();
            topology.mark_offline(cpu);
        }
        loop {
            let snapshots = self.snapshot_loads();
            let destination = {
                let topology = self.topology.lock();
                topology.online_cpus().filter(|&c| c != cpu).min_by_key(|&c| {
                    snapshots.iter().find(|s| s.cpu == c).map(|s| s.fair_load).unwrap_or(0)
                })
            };
            let Some(destination) = destination else {
                return Err(SchedError::AffinityEmpty);
            };
            let moved = {
                let mut rq = self.cpu_rq(cpu)?.lock();
                rq.curr
                    .take()
                    .or_else(|| rq.fair.pick_next(rq.clock_ns))
                    .or_else(|| rq.rt.pick_next())
                    .or_else(|| rq.dl.pick_next())
            };
            let Some(mut task) = moved else {
                return Ok(());
            };
            task.affinity.add(destination);
            load_balance::stamp_migrated(&mut task, cpu);
            task.cpu_of = Some(destination);
            let mut dst = self.cpu_rq(destination)?.lock();
            dst.enqueue(task, EnqueueFlags::MIGRATED);
        }
    }

    /// Supplemented (§B): bring a previously offlined CPU back online.
    pub fn cpu_up(&self, cpu: CpuId) {
        let mut topology = self.topology.lock();
        topology.mark_online(cpu);
    }

    fn cpu_rq(&self, cpu: CpuId) -> SchedResult<&Mutex<Runqueue>> {
        self.runqueues
            .get(cpu as usize)
            .ok_or(SchedError::AffinityEmpty)
    }
}

fn apply_priority(task: &mut Task, priority: i16) -> SchedResult<()> {
    match task.class {
        SchedClass::Fair => {
            let nice = i8::try_from(priority).map_err(|_| SchedError::InvalidPolicy)?;
            Policy::Fair { nice }.validate()?;
            let (weight, inv_weight) = super::fair::nice_to_weight(nice);
            let fa = task.fair_mut();
            fa.load_weight = weight;
            fa.inv_weight = inv_weight;
            Ok(())
        }
        SchedClass::RealTime => {
            let prio = u8::try_from(priority).map_err(|_| SchedError::InvalidPolicy)?;
            if prio as usize >= super::realtime::MAX_RT_PRIO {
                return Err(SchedError::InvalidPolicy);
            }
            task.rt_mut().priority = prio;
            Ok(())
        }
        SchedClass::Deadline => Err(SchedError::InvalidPolicy),
    }
}

/// Rebuild `task` under a new policy, preserving identity/affinity and
/// reinitializing class accounting the way `set_policy` must: a task
/// moving class starts fresh in its new class rather than carrying over
/// vruntime or RT slice state that has no meaning there.
fn rebuild_task(old: Task, policy: Policy, now_ns: u64, cpu_count: u32) -> Task {
    let mut t = match policy {
        Policy::Fair { nice } => Task::new_fair(old.id, nice, now_ns, cpu_count),
        Policy::RtFifo { priority } => {
            Task::new_rt(old.id, priority, super::task::RtPolicy::Fifo, cpu_count)
        }
        Policy::RtRoundRobin { priority, slice_ms } => Task::new_rt(
            old.id,
            priority,
            super::task::RtPolicy::RoundRobin { slice_ns: slice_ms as u64 * 1_000_000 },
            cpu_count,
        ),
        Policy::Deadline { runtime_ns, deadline_ns, period_ns } => {
            Task::new_deadline(old.id, runtime_ns, deadline_ns, period_ns, now_ns, cpu_count)
        }
    };
    t.affinity = old.affinity;
    t.preferred_numa = old.preferred_numa;
    t.cpu_of = old.cpu_of;
    t
}
