use chrono::{DateTime, Utc};
use crd_api::TriggerSpec;

use crate::mover::{Mover, MoverSelectionError};

/// What caused, or will cause, the next synchronization cycle to start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// `spec.trigger` is unset: start a new cycle as soon as the previous
    /// one's cleanup finishes.
    Continuous,
    /// `spec.trigger.schedule` is set and due.
    Schedule,
    /// `spec.trigger.manual` differs from the status tag already recorded.
    Manual,
}

impl Trigger {
    /// Classify a CR's trigger spec. `manual` takes priority over
    /// `schedule` when both happen to be set, since an operator explicitly
    /// asking for an out-of-band sync should not wait for the clock.
    #[must_use]
    pub fn classify(spec: Option<&TriggerSpec>, last_manual_sync: Option<&str>) -> Self {
        let Some(spec) = spec else {
            return Self::Continuous;
        };
        if let Some(manual) = spec.manual.as_deref() {
            if Some(manual) != last_manual_sync {
                return Self::Manual;
            }
        }
        if spec.schedule.is_some() {
            return Self::Schedule;
        }
        Self::Continuous
    }
}

/// The capability a `ReplicationSource` or `ReplicationDestination` adapter
/// must provide for the shared Initial/Synchronizing/CleaningUp state
/// machine to drive it. Everything CR-shape-specific (which status fields
/// exist, how `latestImage` is recorded) lives behind this trait so the
/// machine itself stays generic over the two kinds.
pub trait ReplicationMachine: Send + Sync {
    /// The mover type this CR selects between its populated sub-spec.
    type Mover: Mover;

    fn trigger_spec(&self) -> Option<&TriggerSpec>;
    fn paused(&self) -> bool;
    fn last_manual_sync(&self) -> Option<&str>;
    fn last_sync_time(&self) -> Option<DateTime<Utc>>;

    /// Construct the mover selected by whichever single sub-spec is
    /// populated on this CR, or the selection error if zero or more than
    /// one are.
    fn select_mover(&self) -> Result<Self::Mover, MoverSelectionError>;

    /// Record that a cycle begun at `started` finished at `finished`.
    /// Implementors update `lastSyncTime`/`lastSyncStartTime`/
    /// `lastSyncDuration` and, for a destination, `latestImage`.
    fn record_cycle_complete(&mut self, started: DateTime<Utc>, finished: DateTime<Utc>);

    /// Record that `spec.trigger.manual`'s current tag has been processed,
    /// so the same tag does not re-trigger a cycle.
    fn record_manual_sync(&mut self, tag: String);

    /// Current trigger classification, given the CR's own state.
    fn current_trigger(&self) -> Trigger {
        Trigger::classify(self.trigger_spec(), self.last_manual_sync())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn no_trigger_is_continuous() {
        assert_eq!(Trigger::classify(None, None), Trigger::Continuous);
    }

    #[test]
    fn unset_manual_and_schedule_is_continuous() {
        let spec = TriggerSpec {
            schedule: None,
            manual: None,
        };
        assert_eq!(Trigger::classify(Some(&spec), None), Trigger::Continuous);
    }

    #[test]
    fn schedule_only() {
        let spec = TriggerSpec {
            schedule: Some("0 * * * *".to_owned()),
            manual: None,
        };
        assert_eq!(Trigger::classify(Some(&spec), None), Trigger::Schedule);
    }

    #[test]
    fn new_manual_tag_fires_once() {
        let spec = TriggerSpec {
            schedule: None,
            manual: Some("resync-1".to_owned()),
        };
        assert_eq!(Trigger::classify(Some(&spec), None), Trigger::Manual);
        assert_eq!(
            Trigger::classify(Some(&spec), Some("resync-1")),
            Trigger::Continuous
        );
    }
}
