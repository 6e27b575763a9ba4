use chrono::{DateTime, Utc};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{OwnerReference, Time};
use kube::Client;
use operator_api::{MoverSelectionError, ReplicationMachine};

use crd_api::duration::DurationString;
use crd_api::v1alpha1::{ReplicationDestinationSpec, ReplicationDestinationStatus};
use crd_api::TypedObjectReference;

use crate::movers::{select_destination_mover, GenericJobMover};

/// Adapts a `ReplicationDestination`'s spec/status to the shared state
/// machine. Holds the PVC name the volume handler has already resolved for
/// `spec.destinationPVC` (either the caller-provided one, or one freshly
/// provisioned), which the mover writes into directly.
pub struct DestinationMachine {
    client: Client,
    namespace: String,
    owner: OwnerReference,
    spec: ReplicationDestinationSpec,
    status: ReplicationDestinationStatus,
    working_pvc: String,
    /// The image captured from `working_pvc` once the cycle's mover
    /// completes, per the selected mover sub-spec's `copyMethod`. `None`
    /// until the reconciler has captured it for this cycle.
    captured_image: Option<TypedObjectReference>,
}

impl DestinationMachine {
    #[must_use]
    pub fn new(
        client: Client,
        namespace: impl Into<String>,
        owner: OwnerReference,
        spec: ReplicationDestinationSpec,
        status: ReplicationDestinationStatus,
        working_pvc: impl Into<String>,
    ) -> Self {
        Self {
            client,
            namespace: namespace.into(),
            owner,
            spec,
            status,
            working_pvc: working_pvc.into(),
            captured_image: None,
        }
    }

    #[must_use]
    pub fn into_status(self) -> ReplicationDestinationStatus {
        self.status
    }

    #[must_use]
    pub fn status(&self) -> &ReplicationDestinationStatus {
        &self.status
    }

    /// The PVC the mover writes into this cycle.
    #[must_use]
    pub fn working_pvc(&self) -> &str {
        &self.working_pvc
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

    /// Record the point-in-time image the volume handler captured from
    /// `working_pvc` after the mover's `cleanup` completed. Must be called
    /// before [`ReplicationMachine::record_cycle_complete`] so
    /// `status.latestImage` reflects this cycle.
    pub fn set_captured_image(&mut self, image: TypedObjectReference) {
        self.captured_image = Some(image);
    }
}

impl ReplicationMachine for DestinationMachine {
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
        select_destination_mover(
            self.client.clone(),
            self.namespace.clone(),
            self.owner.clone(),
            &self.spec,
            &self.working_pvc,
        )
    }

    fn record_cycle_complete(&mut self, started: DateTime<Utc>, finished: DateTime<Utc>) {
        apply_cycle_complete(
            &mut self.status,
            started,
            finished,
            self.captured_image.take(),
        );
    }

    fn record_manual_sync(&mut self, tag: String) {
        self.status.last_manual_sync = Some(tag);
    }
}

/// Stamp `lastSyncStartTime`/`lastSyncTime`/`lastSyncDuration`, and
/// `latestImage` when a fresh image was captured this cycle. `latestImage`
/// is preserved across cycles that don't produce one (e.g. a cycle whose
/// mover failed partway), so a `None` here leaves the previous value alone.
fn apply_cycle_complete(
    status: &mut ReplicationDestinationStatus,
    started: DateTime<Utc>,
    finished: DateTime<Utc>,
    captured_image: Option<TypedObjectReference>,
) {
    // lastSyncStartTime only holds a value while a cycle is in progress;
    // a completed cycle clears it back to None (see state machine phase
    // invariant: Synchronizing iff lastSyncStartTime is set).
    status.last_sync_start_time = None;
    status.last_sync_time = Some(Time(finished));
    if let Ok(elapsed) = (finished - started).to_std() {
        status.last_sync_duration = Some(DurationString::new(elapsed));
    }
    if let Some(image) = captured_image {
        status.latest_image = Some(image);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn apply_cycle_complete_preserves_latest_image_when_not_recaptured() {
        let mut status = ReplicationDestinationStatus {
            latest_image: Some(TypedObjectReference::pvc("data-old")),
            ..Default::default()
        };
        let started = Utc.timestamp_opt(0, 0).unwrap();
        let finished = Utc.timestamp_opt(10, 0).unwrap();
        apply_cycle_complete(&mut status, started, finished, None);

        assert_eq!(status.latest_image, Some(TypedObjectReference::pvc("data-old")));
    }

    #[test]
    fn apply_cycle_complete_updates_latest_image_when_recaptured() {
        let mut status = ReplicationDestinationStatus {
            latest_image: Some(TypedObjectReference::pvc("data-old")),
            ..Default::default()
        };
        let started = Utc.timestamp_opt(0, 0).unwrap();
        let finished = Utc.timestamp_opt(10, 0).unwrap();
        apply_cycle_complete(
            &mut status,
            started,
            finished,
            Some(TypedObjectReference::volume_snapshot("data-20260727")),
        );

        assert_eq!(
            status.latest_image,
            Some(TypedObjectReference::volume_snapshot("data-20260727"))
        );
    }
}
