/// Fields shared between `ReplicationSource` and `ReplicationDestination`:
/// triggers, copy methods, volume options, and the typed object reference
/// used by `status.latestImage`.
mod common;
/// `ReplicationDestination`.
mod destination;
/// `ReplicationSource`.
mod source;
/// The `snapshot.storage.k8s.io` types. `k8s-openapi` does not vendor the
/// external-snapshotter API group, so the core declares the subset of
/// fields it reads and writes, the way `tembo-operator` declares its own
/// `VolumeSnapshot`/`VolumeSnapshotContent` CRDs.
pub(crate) mod snapshot;

pub use common::{CopyMethod, ExternalSpec, TriggerSpec, TypedObjectReference, VolumeOptions};
pub use destination::{
    ReplicationDestination, ReplicationDestinationRcloneSpec, ReplicationDestinationResticSpec,
    ReplicationDestinationRsyncSpec, ReplicationDestinationSpec, ReplicationDestinationStatus,
};
pub use source::{
    ReplicationSource, ReplicationSourceRcloneSpec, ReplicationSourceResticSpec,
    ReplicationSourceRsyncSpec, ReplicationSourceSpec, ReplicationSourceStatus,
};
pub use snapshot::{
    VolumeSnapshot, VolumeSnapshotContent, VolumeSnapshotContentSpec,
    VolumeSnapshotContentStatus, VolumeSnapshotSource, VolumeSnapshotSpec, VolumeSnapshotStatus,
};
