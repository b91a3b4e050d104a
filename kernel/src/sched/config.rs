//! Scheduler tunables, grouped into a value constructed once at
//! `Scheduler::new` rather than left as free-standing constants (§A.4:
//! a deliberate deviation from the teacher's scattered `const`s, recorded
//! in the design notes, so tests can exercise non-default parameters).

/// Tunable parameters for all three scheduling classes and the load
/// balancer. Defaults match the fair-class and RT-bandwidth constants
/// named in §4.C/§4.D.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedConfig {
    /// Target latency for one full fair-class scheduling period.
    pub sched_latency_ns: u64,
    /// Floor on a single task's slice regardless of how many tasks share
    /// the period.
    pub min_granularity_ns: u64,
    /// Minimum vruntime lead before a waking task preempts `curr`.
    pub wakeup_granularity_ns: u64,
    /// RT bandwidth window.
    pub rt_period_ns: u64,
    /// RT runtime allowed per window; the remainder is reserved for fair
    /// and deadline tasks.
    pub rt_runtime_ns: u64,
    /// Load-balance trigger: imbalance as a fraction of average domain
    /// load, expressed in parts-per-hundred.
    pub lb_imbalance_pct: u32,
    /// Shortest periodic load-balance interval, for the narrowest (SMT)
    /// domain; wider domains scale this up.
    pub lb_base_interval_ns: u64,
    /// Utilization above which a fair task prefers a Performance core
    /// during wakeup placement.
    pub high_util_threshold_milli: u32,
    /// Upper bound on summed `runtime/period` utilization (in parts per
    /// thousand) a runqueue's deadline class will admit.
    pub dl_utilization_bound_milli: u32,
}

impl SchedConfig {
    pub const NICE0_LOAD: u64 = super::fair::NICE0_LOAD;
    pub const MAX_RT_PRIO: usize = super::realtime::MAX_RT_PRIO;
}

impl Default for SchedConfig {
    fn default() -> Self {
        SchedConfig {
            sched_latency_ns: 6_000_000,
            min_granularity_ns: 750_000,
            wakeup_granularity_ns: 1_000_000,
            rt_period_ns: 1_000_000_000,
            rt_runtime_ns: 950_000_000,
            lb_imbalance_pct: 25,
            lb_base_interval_ns: 4_000_000,
            high_util_threshold_milli: 730,
            dl_utilization_bound_milli: 950,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_documented_constants() {
        let c = SchedConfig::default();
        assert_eq!(c.sched_latency_ns, 6_000_000);
        assert_eq!(c.min_granularity_ns, 750_000);
        assert_eq!(c.wakeup_granularity_ns, 1_000_000);
        assert_eq!(c.rt_runtime_ns, 950_000_000);
        assert_eq!(c.rt_period_ns, 1_000_000_000);
    }
}
