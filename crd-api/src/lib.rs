/// Labels, annotations, and condition constants shared by the core and its
/// callers (the reconcilers, the populator, and any out-of-tree mover).
pub mod consts;

/// A Kubernetes-style duration string (e.g. `"1h2m3s"`), used for
/// `status.lastSyncDuration`.
pub mod duration;

/// `v1alpha1` CRDs: `ReplicationSource`, `ReplicationDestination`, and the
/// hand-declared `snapshot.storage.k8s.io` types the core depends on.
pub mod v1alpha1;

pub use v1alpha1::{
    CopyMethod, ExternalSpec, ReplicationDestination, ReplicationDestinationSpec,
    ReplicationDestinationStatus, ReplicationSource, ReplicationSourceSpec,
    ReplicationSourceStatus, TriggerSpec, TypedObjectReference, VolumeOptions, VolumeSnapshot,
    VolumeSnapshotContent,
};
