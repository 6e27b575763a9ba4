#![allow(clippy::str_to_string)]
#![allow(clippy::missing_docs_in_private_items)]

use std::collections::BTreeMap;

use garde::Validate;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{Condition, Time};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::duration::DurationString;
use crate::v1alpha1::common::{ExternalSpec, TriggerSpec, VolumeOptions};

/// `ReplicationSource` drives periodic replication out of `sourcePVC`.
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, JsonSchema, Validate)]
#[kube(
    group = "volsync.backube",
    version = "v1alpha1",
    kind = "ReplicationSource",
    singular = "replicationsource",
    plural = "replicationsources",
    shortname = "rs",
    namespaced,
    status = "ReplicationSourceStatus",
    printcolumn = r#"{"name":"Last sync", "type":"string", "jsonPath":".status.lastSyncTime"}"#,
    printcolumn = r#"{"name":"Next sync", "type":"string", "jsonPath":".status.nextSyncTime"}"#
)]
#[schemars(rename_all = "camelCase")]
#[garde(allow_unvalidated)]
pub struct ReplicationSourceSpec {
    /// The PVC to replicate data out of.
    #[garde(length(min = 1))]
    pub source_pvc: String,
    /// What triggers a cycle. `None` means continuous.
    #[garde(dive)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trigger: Option<TriggerSpec>,
    /// When `true`, the mover Job is kept at `parallelism=0`.
    #[garde(skip)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paused: Option<bool>,
    #[garde(dive)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rsync: Option<ReplicationSourceRsyncSpec>,
    #[garde(dive)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rclone: Option<ReplicationSourceRcloneSpec>,
    #[garde(dive)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub restic: Option<ReplicationSourceResticSpec>,
    /// Presence means "an external controller owns synchronization"; the
    /// core must not select an internal mover for this CR.
    #[garde(skip)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external: Option<ExternalSpec>,
}

impl ReplicationSourceSpec {
    /// How many of the mutually-exclusive mover sub-specs are populated.
    /// Used by the mover catalog to detect `NoMoverFound`/`MultipleMoversFound`.
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
pub struct ReplicationSourceRsyncSpec {
    #[garde(dive)]
    #[serde(flatten)]
    pub volume_options: VolumeOptions,
    /// Remote rsync address to connect to. If unset, the operator stands
    /// up a rendezvous `Service` and waits for a peer to connect instead.
    #[garde(skip)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[garde(skip)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<i32>,
    /// Secret holding the SSH keypair used to authenticate the transport.
    #[garde(skip)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ssh_keys: Option<String>,
    #[garde(skip)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_type: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, JsonSchema, Validate)]
#[garde(allow_unvalidated)]
pub struct ReplicationSourceRcloneSpec {
    #[garde(dive)]
    #[serde(flatten)]
    pub volume_options: VolumeOptions,
    /// Secret holding the rclone provider configuration.
    #[garde(length(min = 1))]
    pub rclone_config: String,
    #[garde(length(min = 1))]
    pub rclone_dest_path: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, JsonSchema, Validate)]
#[garde(allow_unvalidated)]
pub struct ReplicationSourceResticSpec {
    #[garde(dive)]
    #[serde(flatten)]
    pub volume_options: VolumeOptions,
    /// Secret holding the restic repository URL and its encryption key.
    #[garde(length(min = 1))]
    pub repository: String,
    #[garde(skip)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prune_interval_days: Option<i32>,
}

/// Status fields maintained by the core for a `ReplicationSource`.
#[derive(Serialize, Deserialize, Clone, Debug, Default, JsonSchema)]
pub struct ReplicationSourceStatus {
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
    /// Echo of `spec.trigger.manual` once that tag has been processed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_manual_sync: Option<String>,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn populated_mover_count() {
        let mut spec = ReplicationSourceSpec {
            source_pvc: "data".to_owned(),
            trigger: None,
            paused: None,
            rsync: None,
            rclone: None,
            restic: None,
            external: None,
        };
        assert_eq!(spec.populated_mover_count(), 0);
        spec.rsync = Some(ReplicationSourceRsyncSpec::default());
        assert_eq!(spec.populated_mover_count(), 1);
        spec.restic = Some(ReplicationSourceResticSpec {
            repository: "s".to_owned(),
            ..Default::default()
        });
        assert_eq!(spec.populated_mover_count(), 2);
    }

    #[test]
    fn validation_rejects_empty_source_pvc() {
        let spec = ReplicationSourceSpec {
            source_pvc: String::new(),
            trigger: None,
            paused: None,
            rsync: Some(ReplicationSourceRsyncSpec::default()),
            rclone: None,
            restic: None,
            external: None,
        };
        assert!(Validate::validate(&spec, &()).is_err());
    }
}
