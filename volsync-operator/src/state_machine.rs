use std::time::Duration;

use chrono::{DateTime, Utc};
use operator_api::{MoverResult, Trigger};

/// Where a CR is within one synchronization cycle. Not persisted to
/// `status`; the reconciler derives it each reconcile from whether a mover
/// Job exists and its completion state, per the adapter's
/// [`operator_api::ReplicationMachine`] implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// No cycle in progress; waiting for the next trigger.
    Initial,
    /// The mover is running `synchronize`.
    Synchronizing,
    /// `synchronize` completed; the mover is tearing down its resources.
    CleaningUp,
}

/// Everything the state machine needs to decide the next action, gathered
/// by the reconciler from the CR, the selected mover's poll result, and the
/// wall clock.
#[derive(Debug, Clone)]
pub struct CycleInput {
    pub phase: Phase,
    pub trigger: Trigger,
    pub paused: bool,
    /// `Some` once this reconcile has polled the mover; `None` before the
    /// first poll of a freshly started step.
    pub mover_result: Option<MoverResult>,
    pub now: DateTime<Utc>,
    /// The next time a `Schedule` trigger is due. `None` when the trigger
    /// is not `Schedule`, or its cron string failed to parse.
    pub next_schedule: Option<DateTime<Utc>>,
}

/// What the reconciler should do this pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleAction {
    /// Nothing to do now; requeue after the given delay, or rely purely on
    /// watch events when `None`.
    Wait { requeue_after: Option<Duration> },
    /// Call `Mover::synchronize` for the first time this cycle.
    StartSynchronizing,
    /// Call `Mover::synchronize` again; the previous call returned
    /// `InProgress`.
    ContinueSynchronizing,
    /// `synchronize` completed; call `Mover::cleanup` for the first time.
    StartCleanup,
    /// Call `Mover::cleanup` again.
    ContinueCleanup,
    /// `cleanup` completed; the cycle is done, record completion and
    /// return to `Initial`.
    FinishCycle,
}

/// Decide the next action for one reconcile, given the CR's current phase
/// and trigger state.
#[must_use]
pub fn decide(input: &CycleInput) -> CycleAction {
    if input.paused && matches!(input.phase, Phase::Initial) {
        return CycleAction::Wait { requeue_after: None };
    }
    match input.phase {
        Phase::Initial => decide_initial(input),
        Phase::Synchronizing => match input.mover_result {
            Some(MoverResult::Complete) => CycleAction::StartCleanup,
            Some(MoverResult::InProgress) | None => CycleAction::ContinueSynchronizing,
        },
        Phase::CleaningUp => match input.mover_result {
            Some(MoverResult::Complete) => CycleAction::FinishCycle,
            Some(MoverResult::InProgress) | None => CycleAction::ContinueCleanup,
        },
    }
}

fn decide_initial(input: &CycleInput) -> CycleAction {
    let due = match input.trigger {
        Trigger::Continuous | Trigger::Manual => true,
        Trigger::Schedule => input.next_schedule.map_or(true, |next| input.now >= next),
    };
    if due {
        return CycleAction::StartSynchronizing;
    }
    let requeue_after = input.next_schedule.and_then(|next| {
        (next - input.now)
            .to_std()
            .ok()
            .filter(|d| *d > Duration::ZERO)
    });
    CycleAction::Wait { requeue_after }
}

/// Whether a `Schedule` trigger's due time was missed by more than `grace`
/// without a cycle starting. The reconciler surfaces this as a
/// `Synchronizing=False` condition with an error reason rather than
/// silently catching up or silently skipping the cycle.
#[must_use]
pub fn deadline_missed(
    next_schedule: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    grace: Duration,
) -> bool {
    let Some(next) = next_schedule else {
        return false;
    };
    let Ok(overdue) = (now - next).to_std() else {
        return false;
    };
    overdue > grace
}

#[cfg(test)]
mod test {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn continuous_trigger_is_always_due() {
        let input = CycleInput {
            phase: Phase::Initial,
            trigger: Trigger::Continuous,
            paused: false,
            mover_result: None,
            now: at(0),
            next_schedule: None,
        };
        assert_eq!(decide(&input), CycleAction::StartSynchronizing);
    }

    #[test]
    fn paused_cr_waits_forever_in_initial() {
        let input = CycleInput {
            phase: Phase::Initial,
            trigger: Trigger::Continuous,
            paused: true,
            mover_result: None,
            now: at(0),
            next_schedule: None,
        };
        assert_eq!(
            decide(&input),
            CycleAction::Wait {
                requeue_after: None
            }
        );
    }

    #[test]
    fn schedule_not_yet_due_waits_with_requeue() {
        let input = CycleInput {
            phase: Phase::Initial,
            trigger: Trigger::Schedule,
            paused: false,
            mover_result: None,
            now: at(0),
            next_schedule: Some(at(60)),
        };
        match decide(&input) {
            CycleAction::Wait { requeue_after } => {
                assert_eq!(requeue_after, Some(Duration::from_secs(60)));
            }
            other => panic!("expected Wait, got {other:?}"),
        }
    }

    #[test]
    fn schedule_due_starts_synchronizing() {
        let input = CycleInput {
            phase: Phase::Initial,
            trigger: Trigger::Schedule,
            paused: false,
            mover_result: None,
            now: at(60),
            next_schedule: Some(at(60)),
        };
        assert_eq!(decide(&input), CycleAction::StartSynchronizing);
    }

    #[test]
    fn synchronizing_in_progress_continues() {
        let input = CycleInput {
            phase: Phase::Synchronizing,
            trigger: Trigger::Continuous,
            paused: false,
            mover_result: Some(MoverResult::InProgress),
            now: at(0),
            next_schedule: None,
        };
        assert_eq!(decide(&input), CycleAction::ContinueSynchronizing);
    }

    #[test]
    fn synchronizing_complete_moves_to_cleanup() {
        let input = CycleInput {
            phase: Phase::Synchronizing,
            trigger: Trigger::Continuous,
            paused: false,
            mover_result: Some(MoverResult::Complete),
            now: at(0),
            next_schedule: None,
        };
        assert_eq!(decide(&input), CycleAction::StartCleanup);
    }

    #[test]
    fn cleanup_complete_finishes_cycle() {
        let input = CycleInput {
            phase: Phase::CleaningUp,
            trigger: Trigger::Continuous,
            paused: false,
            mover_result: Some(MoverResult::Complete),
            now: at(0),
            next_schedule: None,
        };
        assert_eq!(decide(&input), CycleAction::FinishCycle);
    }

    #[test]
    fn deadline_missed_respects_grace_period() {
        let next = at(0);
        assert!(!deadline_missed(Some(next), at(30), Duration::from_secs(60)));
        assert!(deadline_missed(Some(next), at(120), Duration::from_secs(60)));
        assert!(!deadline_missed(None, at(120), Duration::from_secs(60)));
    }
}
