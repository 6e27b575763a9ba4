use std::collections::BTreeMap;

use garde::Validate;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// What triggers a synchronization cycle. At most one of `schedule` or
/// `manual` may be set; neither set means "continuous" (No-trigger).
///
/// Schedule validity (5-field cron or a named descriptor like `@hourly`) is
/// *not* enforced here: an invalid cron string is a legitimate, observable
/// state that the state machine must surface as a `Synchronizing=False`
/// condition rather than reject at admission (see spec §7/§8).
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq, JsonSchema, Validate)]
#[garde(allow_unvalidated)]
pub struct TriggerSpec {
    /// A cronspec (5-field, or `@hourly`/`@daily`/... descriptor), in UTC.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schedule: Option<String>,
    /// An opaque tag. A cycle runs whenever this differs from
    /// `status.lastManualSync`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manual: Option<String>,
}

/// How the mover's source/destination point-in-time image is derived.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, JsonSchema)]
pub enum CopyMethod {
    /// Use the PVC in place, no image is produced.
    #[default]
    None,
    /// Synonym for `None`: mount the PVC directly.
    Direct,
    /// Create a CSI volume clone of the PVC.
    Clone,
    /// Create a CSI snapshot of the PVC, then restore a PVC from it.
    Snapshot,
}

impl CopyMethod {
    /// `true` for the two copy methods that operate on the PVC in place.
    #[must_use]
    pub fn is_direct(self) -> bool {
        matches!(self, Self::None | Self::Direct)
    }

    /// Lowercase name, for the `method` metric label.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Direct => "direct",
            Self::Clone => "clone",
            Self::Snapshot => "snapshot",
        }
    }
}

/// Volume options shared by every mover sub-spec: how big a PVC to
/// allocate, which classes to use, and how to obtain a point-in-time image.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq, JsonSchema, Validate)]
#[garde(allow_unvalidated)]
pub struct VolumeOptions {
    /// The method used to create a point-in-time image.
    #[garde(skip)]
    #[serde(default)]
    pub copy_method: CopyMethod,
    /// Explicit capacity override. Defaults are resolved from the source
    /// PVC's status or spec per the copy method, see spec §4.2.
    #[garde(skip)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capacity: Option<Quantity>,
    /// Access modes for a created PVC. Defaults to the source's.
    #[garde(skip)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_modes: Option<Vec<String>>,
    /// StorageClass for a created PVC. Defaults to the source's.
    #[garde(skip)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_class_name: Option<String>,
    /// VolumeSnapshotClass used when `copy_method = Snapshot`.
    #[garde(skip)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume_snapshot_class_name: Option<String>,
}

/// A typed reference to either a `PersistentVolumeClaim` or a
/// `VolumeSnapshot`, used by `status.latestImage`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, JsonSchema)]
pub struct TypedObjectReference {
    /// The API group of the referenced kind (empty for the core group, used
    /// by `PersistentVolumeClaim`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_group: Option<String>,
    /// `PersistentVolumeClaim` or `VolumeSnapshot`.
    pub kind: String,
    /// Name of the referenced object, in the same namespace as the CR.
    pub name: String,
}

impl TypedObjectReference {
    /// `kind` used for a reference to a `PersistentVolumeClaim`.
    pub const KIND_PVC: &'static str = "PersistentVolumeClaim";
    /// `kind` used for a reference to a `VolumeSnapshot`.
    pub const KIND_VOLUME_SNAPSHOT: &'static str = "VolumeSnapshot";

    /// Build a reference to a `PersistentVolumeClaim` by name.
    #[must_use]
    pub fn pvc(name: impl Into<String>) -> Self {
        Self {
            api_group: None,
            kind: Self::KIND_PVC.to_owned(),
            name: name.into(),
        }
    }

    /// Build a reference to a `VolumeSnapshot` by name.
    #[must_use]
    pub fn volume_snapshot(name: impl Into<String>) -> Self {
        Self {
            api_group: Some(crate::v1alpha1::snapshot::GROUP.to_owned()),
            kind: Self::KIND_VOLUME_SNAPSHOT.to_owned(),
            name: name.into(),
        }
    }

    /// Whether this reference names a `PersistentVolumeClaim`.
    #[must_use]
    pub fn is_pvc(&self) -> bool {
        self.kind == Self::KIND_PVC
    }

    /// Whether this reference names a `VolumeSnapshot`.
    #[must_use]
    pub fn is_volume_snapshot(&self) -> bool {
        self.kind == Self::KIND_VOLUME_SNAPSHOT
    }
}

/// Marks a CR as owned by a controller outside the core: both
/// `ReplicationSource` and `ReplicationDestination` carry this field, and
/// its presence means the core must not select (or require) an internal
/// mover for that CR.
#[derive(Serialize, Deserialize, Clone, Debug, Default, JsonSchema)]
pub struct ExternalSpec {
    /// Identifies the external replication provisioner.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provisioner: Option<String>,
    /// Provisioner-specific parameters, opaque to the core.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: BTreeMap<String, String>,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn copy_method_is_direct() {
        assert!(CopyMethod::None.is_direct());
        assert!(CopyMethod::Direct.is_direct());
        assert!(!CopyMethod::Clone.is_direct());
        assert!(!CopyMethod::Snapshot.is_direct());
    }

    #[test]
    fn typed_reference_kind_checks() {
        let pvc = TypedObjectReference::pvc("data");
        assert!(pvc.is_pvc());
        assert!(!pvc.is_volume_snapshot());

        let snap = TypedObjectReference::volume_snapshot("data-20240101000000");
        assert!(snap.is_volume_snapshot());
    }
}
