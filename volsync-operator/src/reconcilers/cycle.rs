use std::time::Duration;

use chrono::{DateTime, Utc};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Condition;
use operator_api::{Mover, ReplicationMachine};

use crd_api::consts::reason;
use crd_api::consts::CONDITION_SYNCHRONIZING;

use crate::conditions;
use crate::metrics::CycleLabels;
use crate::schedule;
use crate::state_machine::{self, CycleAction, CycleInput, Phase};

/// What the caller (a CR-specific reconciler) must do after [`advance`]
/// runs one state-machine step: persist a status condition, and requeue
/// after the given delay (`None` means rely purely on watch events).
pub struct Outcome {
    pub condition: Condition,
    pub requeue_after: Option<Duration>,
    /// `true` the reconcile that issues `StartSynchronizing`: the caller
    /// should stamp `lastSyncStartTime` to `now` before persisting status.
    pub cycle_started: bool,
    /// `true` once `FinishCycle` ran: the caller should call
    /// [`ReplicationMachine::record_cycle_complete`] (and
    /// `record_manual_sync`, if the trigger was `Manual`) before persisting
    /// status.
    pub cycle_finished: bool,
}

/// Read the phase a CR is in from its last-recorded `Synchronizing`
/// condition. A CR with no condition yet, or whose condition's reason
/// isn't one of ours (e.g. a fresh `Error` from a previous bad cycle), is
/// treated as `Initial`.
#[must_use]
pub fn current_phase(conditions: &[Condition]) -> Phase {
    let Some(cond) = conditions.iter().find(|c| c.type_ == CONDITION_SYNCHRONIZING) else {
        return Phase::Initial;
    };
    match cond.reason.as_str() {
        reason::SYNC => Phase::Synchronizing,
        reason::CLEANUP => Phase::CleaningUp,
        _ => Phase::Initial,
    }
}

/// Drive one reconcile's worth of state-machine progress for `machine`,
/// calling into `mover`'s `synchronize`/`cleanup` as the decided action
/// requires.
pub async fn advance<M: ReplicationMachine>(
    machine: &mut M,
    mover: &M::Mover,
    conditions: &[Condition],
    now: DateTime<Utc>,
    labels: &CycleLabels<'_>,
) -> anyhow::Result<Outcome> {
    let phase = current_phase(conditions);
    let next_schedule = next_schedule(machine, now)?;
    let trigger = machine.current_trigger();

    if phase == Phase::Initial && machine.last_sync_time().is_none() {
        crate::metrics::set_volume_out_of_sync(labels, true);
    }

    let mover_result = match phase {
        Phase::Initial => None,
        Phase::Synchronizing => Some(mover.synchronize().await?),
        Phase::CleaningUp => Some(mover.cleanup().await?),
    };

    let input = CycleInput {
        phase,
        trigger,
        paused: machine.paused(),
        mover_result,
        now,
        next_schedule,
    };
    let action = state_machine::decide(&input);

    let outcome = match action {
        CycleAction::Wait { requeue_after } => Outcome {
            condition: conditions::synchronizing(
                false,
                wait_reason(trigger),
                "waiting for the next trigger",
            ),
            requeue_after,
            cycle_started: false,
            cycle_finished: false,
        },
        CycleAction::StartSynchronizing => {
            mover.synchronize().await?;
            Outcome {
                condition: conditions::synchronizing(
                    true,
                    reason::SYNC,
                    "synchronization cycle started",
                ),
                requeue_after: Some(Duration::from_secs(5)),
                cycle_started: true,
                cycle_finished: false,
            }
        }
        CycleAction::ContinueSynchronizing => Outcome {
            condition: conditions::synchronizing(
                true,
                reason::SYNC,
                "synchronization in progress",
            ),
            requeue_after: Some(Duration::from_secs(5)),
            cycle_started: false,
            cycle_finished: false,
        },
        CycleAction::StartCleanup => {
            mover.cleanup().await?;
            Outcome {
                condition: conditions::synchronizing(
                    true,
                    reason::CLEANUP,
                    "cleaning up mover resources",
                ),
                requeue_after: Some(Duration::from_secs(5)),
                cycle_started: false,
                cycle_finished: false,
            }
        }
        CycleAction::ContinueCleanup => Outcome {
            condition: conditions::synchronizing(
                true,
                reason::CLEANUP,
                "cleaning up mover resources",
            ),
            requeue_after: Some(Duration::from_secs(5)),
            cycle_started: false,
            cycle_finished: false,
        },
        CycleAction::FinishCycle => {
            if check_deadline(&input) {
                crate::metrics::inc_missed_interval(labels);
                crate::metrics::set_volume_out_of_sync(labels, true);
            }
            Outcome {
                condition: conditions::synchronizing(
                    false,
                    wait_reason(trigger),
                    "synchronization cycle complete",
                ),
                requeue_after: None,
                cycle_started: false,
                cycle_finished: true,
            }
        }
    };
    Ok(outcome)
}

fn wait_reason(trigger: operator_api::Trigger) -> &'static str {
    match trigger {
        operator_api::Trigger::Schedule => reason::SCHED,
        operator_api::Trigger::Manual | operator_api::Trigger::Continuous => reason::MANUAL,
    }
}

fn next_schedule<M: ReplicationMachine>(
    machine: &M,
    now: DateTime<Utc>,
) -> anyhow::Result<Option<DateTime<Utc>>> {
    let Some(spec) = machine.trigger_spec() else {
        return Ok(None);
    };
    let Some(cronspec) = &spec.schedule else {
        return Ok(None);
    };
    let after = machine.last_sync_time().unwrap_or(now);
    Ok(schedule::next_after(cronspec, after)?)
}

/// Whether a `Schedule` trigger's due time was missed by more than the
/// configured grace period. Logs a warning as a side effect; the cycle
/// still runs regardless of the result.
fn check_deadline(input: &CycleInput) -> bool {
    let missed = state_machine::deadline_missed(
        input.next_schedule,
        input.now,
        crate::consts::SCHEDULE_MISS_GRACE,
    );
    if missed {
        tracing::warn!(
            next_schedule = ?input.next_schedule,
            now = ?input.now,
            "scheduled synchronization deadline missed"
        );
    }
    missed
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn current_phase_defaults_to_initial() {
        assert_eq!(current_phase(&[]), Phase::Initial);
    }

    #[test]
    fn current_phase_reads_sync_reason() {
        let conditions = vec![Condition {
            type_: CONDITION_SYNCHRONIZING.to_owned(),
            status: "True".to_owned(),
            reason: reason::SYNC.to_owned(),
            message: String::new(),
            last_transition_time: k8s_openapi::apimachinery::pkg::apis::meta::v1::Time(
                Utc::now(),
            ),
            observed_generation: None,
        }];
        assert_eq!(current_phase(&conditions), Phase::Synchronizing);
    }

    #[test]
    fn current_phase_reads_cleanup_reason() {
        let conditions = vec![Condition {
            type_: CONDITION_SYNCHRONIZING.to_owned(),
            status: "True".to_owned(),
            reason: reason::CLEANUP.to_owned(),
            message: String::new(),
            last_transition_time: k8s_openapi::apimachinery::pkg::apis::meta::v1::Time(
                Utc::now(),
            ),
            observed_generation: None,
        }];
        assert_eq!(current_phase(&conditions), Phase::CleaningUp);
    }
}
