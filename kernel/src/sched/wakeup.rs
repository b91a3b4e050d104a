//! `try_to_wake_up` and wakeup-time CPU placement (§4.G). Grounded in the
//! teacher's `sched::smp::find_least_loaded_cpu_with_affinity` for the
//! least-loaded fallback and `sched::numa` for the node-preference step;
//! the energy-aware Performance/Efficiency split has no teacher
//! counterpart and follows the layered placement order from the design
//! notes directly. The `sync` affine short-circuit is §4.G's first fair
//! placement rule: a waker that is about to block hands the wakee its own
//! (soon-to-be-idle) CPU instead of paying a migration.

use alloc::vec::Vec;

use super::config::SchedConfig;
use super::task::{CpuId, SchedClass, Task};
use super::topology::{CoreClass, Topology};

/// A read-only snapshot of one runqueue's load, taken without holding its
/// lock across the whole placement decision — placement only needs an
/// approximate picture, the actual enqueue re-validates under the lock.
#[derive(Debug, Clone, Copy)]
pub struct CpuLoadSnapshot {
    pub cpu: CpuId,
    pub nr_running: u32,
    pub fair_load: u64,
}

fn is_idle(snapshots: &[CpuLoadSnapshot], cpu: CpuId) -> bool {
    snapshots
        .iter()
        .find(|s| s.cpu == cpu)
        .map(|s| s.nr_running == 0)
        .unwrap_or(false)
}

fn load_of(snapshots: &[CpuLoadSnapshot], cpu: CpuId) -> u64 {
    snapshots
        .iter()
        .find(|s| s.cpu == cpu)
        .map(|s| s.fair_load)
        .unwrap_or(u64::MAX)
}

fn allowed_online(task: &Task, topology: &Topology) -> Vec<CpuId> {
    topology
        .online_cpus()
        .filter(|&cpu| task.can_run_on(cpu))
        .collect()
}

/// Choose the CPU a woken task should run on. Returns `None` only when the
/// task's affinity mask has no online CPU (the `AffinityEmpty` case is
/// caught earlier by the caller via `Policy`/`set_affinity` validation, but
/// a CPU can also go offline after affinity was set, so this is re-checked
/// here).
pub fn select_wakeup_cpu(
    task: &Task,
    prev_cpu: Option<CpuId>,
    waking_cpu: Option<CpuId>,
    sync: bool,
    snapshots: &[CpuLoadSnapshot],
    topology: &Topology,
    config: &SchedConfig,
) -> Option<CpuId> {
    let allowed = allowed_online(task, topology);
    if allowed.is_empty() {
        return None;
    }

    // Trivial case, not a spec placement step: a single-CPU affinity mask
    // has only one legal answer regardless of class or load.
    if allowed.len() == 1 {
        return Some(allowed[0]);
    }

    match task.class {
        SchedClass::Deadline | SchedClass::RealTime => {
            // RT/DL placement only cares about getting the earliest chance
            // to run: prefer the previous CPU if it is idle, else the
            // least-loaded allowed CPU.
            if let Some(prev) = prev_cpu {
                if allowed.contains(&prev) && is_idle(snapshots, prev) {
                    return Some(prev);
                }
            }
            allowed
                .iter()
                .copied()
                .min_by_key(|&cpu| load_of(snapshots, cpu))
        }
        SchedClass::Fair => {
            select_fair_wakeup_cpu(task, prev_cpu, waking_cpu, sync, &allowed, snapshots, topology, config)
        }
    }
}

fn select_fair_wakeup_cpu(
    task: &Task,
    prev_cpu: Option<CpuId>,
    waking_cpu: Option<CpuId>,
    sync: bool,
    allowed: &[CpuId],
    snapshots: &[CpuLoadSnapshot],
    topology: &Topology,
    config: &SchedConfig,
) -> Option<CpuId> {
    // Step 1: affine short-circuit. The waker is about to sleep (`sync`),
    // so its CPU is about to go idle anyway; handing the wakee that CPU
    // directly avoids a cross-CPU migration the waker's own exit would
    // have made unnecessary a moment later.
    if sync {
        if let Some(waker) = waking_cpu {
            if allowed.contains(&waker) {
                return Some(waker);
            }
        }
    }

    // Step 2: the previous CPU is idle and allowed - cheapest possible
    // choice, no migration, cache still warm.
    if let Some(prev) = prev_cpu {
        if allowed.contains(&prev) && is_idle(snapshots, prev) {
            return Some(prev);
        }
    }

    // Step 3: NUMA preference. Narrow the candidate set to the preferred
    // node if that leaves anything to choose from.
    let numa_filtered: Vec<CpuId> = if let Some(node) = task.preferred_numa {
        let on_node: Vec<CpuId> = allowed
            .iter()
            .copied()
            .filter(|&cpu| topology.descriptor(cpu).map(|d| d.node) == Some(node))
            .collect();
        if on_node.is_empty() {
            allowed.to_vec()
        } else {
            on_node
        }
    } else {
        allowed.to_vec()
    };

    // Step 4: energy-aware class preference. A hot (high util_avg) task
    // wants a Performance core; a cool one is happy on Efficiency, leaving
    // Performance cores free for whoever needs them.
    let util = task.fair().util_avg;
    let prefer_class = if util >= config.high_util_threshold_milli {
        CoreClass::Performance
    } else {
        CoreClass::Efficiency
    };
    let class_filtered: Vec<CpuId> = numa_filtered
        .iter()
        .copied()
        .filter(|&cpu| topology.descriptor(cpu).map(|d| d.class) == Some(prefer_class))
        .collect();
    let candidates: &[CpuId] = if class_filtered.is_empty() {
        &numa_filtered
    } else {
        &class_filtered
    };

    // Step 5: idle-sibling - any idle CPU among the remaining candidates.
    if let Some(&idle_cpu) = candidates.iter().find(|&&cpu| is_idle(snapshots, cpu)) {
        return Some(idle_cpu);
    }

    // Step 6: fallback - least-loaded candidate, or least-loaded allowed
    // CPU at all if the narrowed set was somehow empty.
    candidates
        .iter()
        .copied()
        .min_by_key(|&cpu| load_of(snapshots, cpu))
        .or_else(|| allowed.iter().copied().min_by_key(|&cpu| load_of(snapshots, cpu)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sched::task::Task;

    fn snap(cpu: CpuId, nr_running: u32, fair_load: u64) -> CpuLoadSnapshot {
        CpuLoadSnapshot { cpu, nr_running, fair_load }
    }

    #[test]
    fn single_cpu_affinity_short_circuits() {
        let topo = Topology::uniform(4);
        let config = SchedConfig::default();
        let mut task = Task::new_fair(1, 0, 0, 4);
        task.affinity = crate::sched::task::CpuSet::single(2);
        let snaps = [snap(0, 0, 0), snap(1, 0, 0), snap(2, 3, 100), snap(3, 0, 0)];
        assert_eq!(select_wakeup_cpu(&task, None, None, false, &snaps, &topo, &config), Some(2));
    }

    #[test]
    fn idle_previous_cpu_is_preferred_over_migration() {
        let topo = Topology::uniform(4);
        let config = SchedConfig::default();
        let task = Task::new_fair(1, 0, 0, 4);
        let snaps = [snap(0, 0, 0), snap(1, 0, 0), snap(2, 2, 200), snap(3, 1, 50)];
        assert_eq!(select_wakeup_cpu(&task, Some(1), None, false, &snaps, &topo, &config), Some(1));
    }

    #[test]
    fn sync_wakeup_prefers_wakers_cpu_over_idle_previous_cpu() {
        let topo = Topology::uniform(4);
        let config = SchedConfig::default();
        let task = Task::new_fair(1, 0, 0, 4);
        // CPU 1 is idle and would normally win at Step 2, but a sync wakeup
        // from CPU 2 must short-circuit straight to the waker's CPU.
        let snaps = [snap(0, 0, 0), snap(1, 0, 0), snap(2, 1, 10), snap(3, 0, 0)];
        assert_eq!(
            select_wakeup_cpu(&task, Some(1), Some(2), true, &snaps, &topo, &config),
            Some(2)
        );
    }

    #[test]
    fn non_sync_wakeup_ignores_wakers_cpu() {
        let topo = Topology::uniform(4);
        let config = SchedConfig::default();
        let task = Task::new_fair(1, 0, 0, 4);
        let snaps = [snap(0, 0, 0), snap(1, 0, 0), snap(2, 1, 10), snap(3, 0, 0)];
        assert_eq!(
            select_wakeup_cpu(&task, Some(1), Some(2), false, &snaps, &topo, &config),
            Some(1)
        );
    }

    #[test]
    fn high_utilization_task_prefers_performance_core() {
        let mut cpus = Vec::new();
        for id in 0..2 {
            cpus.push(crate::sched::topology::CpuDescriptor {
                id,
                node: 0,
                core_id: id,
                package_id: 0,
                class: if id == 0 { CoreClass::Performance } else { CoreClass::Efficiency },
                online: true,
            });
        }
        let topo = Topology::new(cpus, alloc::vec![alloc::vec![10]]);
        let config = SchedConfig::default();
        let mut task = Task::new_fair(1, 0, 0, 2);
        task.fair_mut().util_avg = 850;
        let snaps = [snap(0, 0, 0), snap(1, 0, 0)];
        assert_eq!(select_wakeup_cpu(&task, None, None, false, &snaps, &topo, &config), Some(0));
    }

    #[test]
    fn low_utilization_task_prefers_efficiency_core() {
        let mut cpus = Vec::new();
        for id in 0..2 {
            cpus.push(crate::sched::topology::CpuDescriptor {
                id,
                node: 0,
                core_id: id,
                package_id: 0,
                class: if id == 0 { CoreClass::Performance } else { CoreClass::Efficiency },
                online: true,
            });
        }
        let topo = Topology::new(cpus, alloc::vec![alloc::vec![10]]);
        let config = SchedConfig::default();
        let mut task = Task::new_fair(1, 0, 0, 2);
        task.fair_mut().util_avg = 100;
        let snaps = [snap(0, 0, 0), snap(1, 0, 0)];
        assert_eq!(select_wakeup_cpu(&task, None, None, false, &snaps, &topo, &config), Some(1));
    }

    #[test]
    fn affinity_with_no_online_cpu_returns_none() {
        let mut topo = Topology::uniform(2);
        topo.mark_offline(0);
        topo.mark_offline(1);
        let config = SchedConfig::default();
        let task = Task::new_fair(1, 0, 0, 2);
        assert_eq!(select_wakeup_cpu(&task, None, None, false, &[], &topo, &config), None);
    }
}
