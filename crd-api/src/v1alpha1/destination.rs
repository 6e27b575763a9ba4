#![allow(clippy::str_to_string)]
#![allow(clippy::missing_docs_in_private_items)]

use garde::Validate;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{Condition, Time};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::duration::DurationString;
use crate::v1alpha1::common::{ExternalSpec, TriggerSpec, TypedObjectReference, VolumeOptions};

/// `ReplicationDestination` receives data into `destinationPVC`, or into a
/// PVC it creates itself when that field is unset.
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, JsonSchema, Validate)]
#[kube(
    group = "volsync.backube",
    version = "v1alpha1",
    kind = "ReplicationDestination",
    singular = "replicationdestination",
    plural = "replicationdestinations",
    shortname = "rd",
    namespaced,
    status = "ReplicationDestinationStatus",
    printcolumn = r#"{"name":"Last sync", "type":"string", "jsonPath":".status.lastSyncTime"}"#,
    printcolumn = r#"{"name":"Latest image", "type":"string", "jsonPath":".status.latestImage.name"}"#
)]
#[schemars(rename_all = "camelCase")]
#[garde(allow_unvalidated)]
pub struct ReplicationDestinationSpec {
    /// An existing PVC to land data into. When unset, the core provisions
    /// one per `VolumeOptions` on the selected mover sub-spec.
    #[garde(skip)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination_pvc: Option<String>,
    #[garde(dive)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trigger: Option<TriggerSpec>,
    #[garde(skip)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paused: Option<bool>,
    #[garde(dive)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rsync: Option<ReplicationDestinationRsyncSpec>,
    #[garde(dive)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rclone: Option<ReplicationDestinationRcloneSpec>,
    #[garde(dive)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub restic: Option<ReplicationDestinationResticSpec>,
    /// Presence means "an external controller owns synchronization"; the
    /// core must not select an internal mover for this CR.
    #[garde(skip)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external: Option<ExternalSpec>,
}

impl ReplicationDestinationSpec {
    /// How many of the mutually-exclusive mover sub-specs are populated.
    #[must_use]
    pub fn populated_mover_count(&self) -> usize {
        [
            self.rsync.is_some(),
            self.rclone.is_some(),
            self.restic.is_some(),
        ]
        .into_iter()
        .filter(|set| *set)
        .count()
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, JsonSchema, Validate)]
#[garde(allow_unvalidated)]
pub struct ReplicationDestinationRsyncSpec {
    #[garde(dive)]
    #[serde(flatten)]
    pub volume_options: VolumeOptions,
    /// Secret holding the SSH keypair. Generated by the core if unset.
    #[garde(skip)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ssh_keys: Option<String>,
    #[garde(skip)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_type: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, JsonSchema, Validate)]
#[garde(allow_unvalidated)]
pub struct ReplicationDestinationRcloneSpec {
    #[garde(dive)]
    #[serde(flatten)]
    pub volume_options: VolumeOptions,
    #[garde(length(min = 1))]
    pub rclone_config: String,
    #[garde(length(min = 1))]
    pub rclone_dest_path: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, JsonSchema, Validate)]
#[garde(allow_unvalidated)]
pub struct ReplicationDestinationResticSpec {
    #[garde(dive)]
    #[serde(flatten)]
    pub volume_options: VolumeOptions,
    #[garde(length(min = 1))]
    pub repository: String,
}

/// Status fields maintained by the core for a `ReplicationDestination`.
#[derive(Serialize, Deserialize, Clone, Debug, Default, JsonSchema)]
pub struct ReplicationDestinationStatus {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_sync_time: Option<Time>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_sync_start_time: Option<Time>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_sync_duration: Option<DurationString>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_sync_time: Option<Time>,
    /// The most recent point-in-time image the mover produced. Preserved
    /// across reconciles even when a later cycle fails, per the "latest
    /// image" preservation invariant.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest_image: Option<TypedObjectReference>,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn populated_mover_count() {
        let mut spec = ReplicationDestinationSpec {
            destination_pvc: None,
            trigger: None,
            paused: None,
            rsync: None,
            rclone: None,
            restic: None,
            external: None,
        };
        assert_eq!(spec.populated_mover_count(), 0);
        spec.rsync = Some(ReplicationDestinationRsyncSpec::default());
        spec.rclone = Some(ReplicationDestinationRcloneSpec {
            rclone_config: "cfg".to_owned(),
            rclone_dest_path: "dest".to_owned(),
            ..Default::default()
        });
        assert_eq!(spec.populated_mover_count(), 2);
    }

    #[test]
    fn latest_image_round_trips_through_yaml() {
        let status = ReplicationDestinationStatus {
            latest_image: Some(TypedObjectReference::volume_snapshot("data-20240101000000")),
            ..Default::default()
        };
        let yaml = serde_yaml::to_string(&status).unwrap();
        let back: ReplicationDestinationStatus = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(back.latest_image, status.latest_image);
    }
}
