/// Label marking an object as created and owned by this operator, so that
/// sibling controllers (e.g. the populator) can distinguish it from a
/// user-supplied look-alike.
pub const LABEL_CREATED_BY: &str = "app.kubernetes.io/created-by";
/// Value of [`LABEL_CREATED_BY`] this operator stamps on everything it
/// creates.
pub const CREATED_BY_VALUE: &str = "volsync";

/// Label by which a user or a sibling controller opts an object out of this
/// operator's garbage collection. When present, ownership of the object is
/// released instead of the object being deleted.
pub const LABEL_DO_NOT_DELETE: &str = "volsync.backube/do-not-delete";

/// Label marking a temporary per-cycle object (PVC, clone, snapshot) for
/// cleanup at the end of the cycle. The value is the owning CR's UID.
pub const LABEL_CLEANUP: &str = "volsync.backube/cleanup";

/// PVC annotation binding it to the name of its most recently preserved
/// snapshot.
pub const ANNOTATION_SNAPSHOT_NAME: &str = "volsync.backube/snapname";

/// PV annotation set by the populator once it has rebound the volume's
/// `claimRef` onto the user's PVC.
pub const ANNOTATION_POPULATED_FROM: &str = "volsync.backube/populated-from";

/// Label on the populator's prime PVC identifying which user PVC it was
/// created for.
pub const LABEL_POPULATOR_PVC_FOR: &str = "volsync.backube/populator-pvc-for";

/// Annotation read (never written) by the core: set by the Kubernetes
/// scheduler on a PVC once a node has been chosen, required before a
/// `WaitForFirstConsumer` StorageClass may provision.
pub const ANNOTATION_SELECTED_NODE: &str = "volume.kubernetes.io/selected-node";

/// The sole condition type the core reports.
pub const CONDITION_SYNCHRONIZING: &str = "Synchronizing";

/// `Synchronizing` condition reasons.
pub mod reason {
    /// A synchronization cycle is in progress.
    pub const SYNC: &str = "SyncInProgress";
    /// Waiting for the next manual trigger.
    pub const MANUAL: &str = "WaitingForManual";
    /// Waiting for the next scheduled time.
    pub const SCHED: &str = "WaitingForSchedule";
    /// Cleaning up per-cycle resources.
    pub const CLEANUP: &str = "CleaningUp";
    /// A terminal or transient error was encountered.
    pub const ERROR: &str = "Error";
}

/// Event reasons emitted by the populator and the volume handler.
pub mod event {
    /// Normal: the populator created its prime PVC.
    pub const POPULATOR_PVC_CREATED: &str = "VolSyncPopulatorPVCCreated";
    /// Normal: the populator completed the rebind handoff.
    pub const POPULATOR_FINISHED: &str = "VolSyncPopulatorFinished";
    /// Normal: a PVC was created by the volume handler.
    pub const PVC_CREATED: &str = "PVCCreated";
    /// Normal: a VolumeSnapshot was created by the volume handler.
    pub const SNAP_CREATED: &str = "SnapCreated";
    /// Warning: the populator failed to complete the handoff.
    pub const POPULATOR_ERROR: &str = "VolSyncPopulatorError";
    /// Warning: a PVC did not bind within its soft timeout.
    pub const PVC_NOT_BOUND: &str = "PVCNotBound";
    /// Warning: a VolumeSnapshot did not bind within its soft timeout.
    pub const SNAP_NOT_BOUND: &str = "SnapNotBound";
}
