//! The periodic tick handler (§4.I): advances the clock, charges `curr`,
//! lets each class react to the elapsed time, then asks the dispatcher
//! whether a switch is warranted.
//!
//! Grounded in the teacher's `sched::scheduler::Scheduler` tick handling,
//! generalized to run the deadline/RT/fair per-class tick logic in
//! strict-priority order before falling into `schedule`.

use super::config::SchedConfig;
use super::dispatcher::{schedule, SwitchDecision};
use super::realtime::RtClass;
use super::runqueue::Runqueue;
use super::task::SchedClass;

/// What the tick handler decided: whether to switch, and whether the
/// load balancer is due (§4.I step 3: "if `now >= next_balance_at`,
/// trigger load balance"). Triggering the balance itself needs every
/// other runqueue's lock, which a single `Runqueue` cannot reach, so the
/// actual balance pass runs at the `Scheduler` level when `balance_due`
/// is set; this module only evaluates the local deadline and arms the
/// next one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickOutcome {
    pub switch: SwitchDecision,
    pub balance_due: bool,
}

/// §4.I, 4 steps: (1) advance the clock, (2) account `curr`'s elapsed
/// slice, (3) let `curr`'s class react (RR slice decrement, deadline
/// rollover) and check the balance deadline, (4) let the dispatcher
/// decide whether to switch.
pub fn tick_on_current_cpu(
    rq: &mut Runqueue,
    config: &SchedConfig,
    now_ns: u64,
    balance_interval_ns: u64,
) -> TickOutcome {
    // Step 1.
    let delta = now_ns.saturating_sub(rq.clock_ns);
    rq.update_clock(now_ns);

    // Step 2.
    rq.update_curr(config);

    // Step 3: class-specific tick reactions.
    let mut force_requeue = false;
    if let Some(curr) = rq.curr.as_mut() {
        match curr.class {
            SchedClass::RealTime => {
                force_requeue = RtClass::tick_rr(curr, delta);
            }
            SchedClass::Deadline => {
                // Rollover/throttle bookkeeping already happened inside
                // `update_curr` via `DlClass::account_runtime`.
            }
            SchedClass::Fair => {}
        }
    }

    let balance_due = now_ns >= rq.next_balance_at;
    if balance_due {
        rq.next_balance_at = now_ns + balance_interval_ns;
    }

    // Step 4: a round-robin task whose slice just ran out always yields,
    // even if nothing else on the runqueue outranks it (it rotates behind
    // same-priority peers); otherwise let the dispatcher apply the normal
    // preemption rules.
    let switch = schedule(rq, config, !force_requeue);
    TickOutcome { switch, balance_due }
}
