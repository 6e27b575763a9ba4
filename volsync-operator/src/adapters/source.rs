use chrono::{DateTime, Utc};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{OwnerReference, Time};
use kube::Client;
use operator_api::{MoverSelectionError, ReplicationMachine};

use crd_api::duration::DurationString;
use crd_api::v1alpha1::{ReplicationSourceSpec, ReplicationSourceStatus};

use crate::movers::{select_source_mover, GenericJobMover};

/// Adapts a `ReplicationSource`'s spec/status to the shared state machine.
/// Holds the PVC name the volume handler has already resolved for
/// `spec.sourcePVC`'s point-in-time image, so `select_mover` stays a plain
/// synchronous call.
pub struct SourceMachine {
    client: Client,
    namespace: String,
    owner: OwnerReference,
    spec: ReplicationSourceSpec,
    status: ReplicationSourceStatus,
    mountable_image_pvc: String,
}

impl SourceMachine {
    #[must_use]
    pub fn new(
        client: Client,
        namespace: impl Into<String>,
        owner: OwnerReference,
        spec: ReplicationSourceSpec,
        status: ReplicationSourceStatus,
        mountable_image_pvc: impl Into<String>,
    ) -> Self {
        Self {
            client,
            namespace: namespace.into(),
            owner,
            spec,
            status,
            mountable_image_pvc: mountable_image_pvc.into(),
        }
    }

    #[must_use]
    pub fn into_status(self) -> ReplicationSourceStatus {
        self.status
    }

    #[must_use]
    pub fn status(&self) -> &ReplicationSourceStatus {
        &self.status
    }

    /// Stamp `lastSyncStartTime` when a new cycle starts, so
    /// [`ReplicationMachine::record_cycle_complete`] has a start time to
    /// compute a duration from once the cycle finishes.
    pub fn mark_cycle_start(&mut self, now: DateTime<Utc>) {
        self.status.last_sync_start_time = Some(Time(now));
    }

    #[must_use]
    pub fn last_sync_start_time(&self) -> Option<DateTime<Utc>> {
        self.status.last_sync_start_time.as_ref().map(|t| t.0)
    }
}

impl ReplicationMachine for SourceMachine {
    type Mover = GenericJobMover;

    fn trigger_spec(&self) -> Option<&crd_api::TriggerSpec> {
        self.spec.trigger.as_ref()
    }

    fn paused(&self) -> bool {
        self.spec.paused.unwrap_or(false)
    }

    fn last_manual_sync(&self) -> Option<&str> {
        self.status.last_manual_sync.as_deref()
    }

    fn last_sync_time(&self) -> Option<DateTime<Utc>> {
        self.status.last_sync_time.as_ref().map(|t| t.0)
    }

    fn select_mover(&self) -> Result<GenericJobMover, MoverSelectionError> {
        select_source_mover(
            self.client.clone(),
            self.namespace.clone(),
            self.owner.clone(),
            &self.spec,
            &self.mountable_image_pvc,
        )
    }

    fn record_cycle_complete(&mut self, started: DateTime<Utc>, finished: DateTime<Utc>) {
        apply_cycle_complete(&mut self.status, started, finished);
    }

    fn record_manual_sync(&mut self, tag: String) {
        self.status.last_manual_sync = Some(tag);
    }
}

/// Stamp `lastSyncStartTime`/`lastSyncTime`/`lastSyncDuration` for a
/// completed cycle. Free function so it can be unit tested without a live
/// `kube::Client`.
fn apply_cycle_complete(
    status: &mut ReplicationSourceStatus,
    started: DateTime<Utc>,
    finished: DateTime<Utc>,
) {
    // lastSyncStartTime only holds a value while a cycle is in progress;
    // a completed cycle clears it back to None (see state machine phase
    // invariant: Synchronizing iff lastSyncStartTime is set).
    status.last_sync_start_time = None;
    status.last_sync_time = Some(Time(finished));
    if let Ok(elapsed) = (finished - started).to_std() {
        status.last_sync_duration = Some(DurationString::new(elapsed));
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn apply_cycle_complete_fills_in_timestamps_and_duration() {
        let mut status = ReplicationSourceStatus::default();
        let started = Utc.timestamp_opt(0, 0).unwrap();
        let finished = Utc.timestamp_opt(30, 0).unwrap();
        apply_cycle_complete(&mut status, started, finished);

        assert!(status.last_sync_start_time.is_none());
        assert_eq!(status.last_sync_time.unwrap().0, finished);
        assert_eq!(status.last_sync_duration.unwrap().to_string(), "30s");
    }
}
