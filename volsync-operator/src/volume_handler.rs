use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use k8s_openapi::api::core::v1::{
    ObjectReference, PersistentVolume, PersistentVolumeClaim, PersistentVolumeClaimSpec,
    TypedLocalObjectReference,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use kube::api::{Patch, PatchParams};
use kube::runtime::events::Recorder;
use kube::{Api, Client, ResourceExt};
use tracing::debug;

use crd_api::v1alpha1::{VolumeSnapshot, VolumeSnapshotSource, VolumeSnapshotSpec};
use crd_api::{consts, CopyMethod, TypedObjectReference, VolumeOptions};
use utils::time::snapshot_name;

use crate::consts::FIELD_MANAGER;
use crate::events;

/// Errors raised while realizing a `CopyMethod` against the Kubernetes API.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("kubernetes api error")]
    Kube(#[from] kube::Error),
    #[error("PVC {0:?} does not exist")]
    PvcNotFound(String),
    #[error("PVC {0:?} has no .spec.resources.requests.storage to copy a capacity from")]
    MissingSourceCapacity(String),
}

/// `Result` specialization for [`VolumeHandler`].
pub type Result<T> = std::result::Result<T, Error>;

/// Realizes a mover's requested [`CopyMethod`] as concrete PVCs and
/// `VolumeSnapshot`s. One instance is scoped to a single namespace, the way
/// a reconciler only ever touches the namespace of the CR it is driving.
pub struct VolumeHandler {
    client: Client,
    namespace: String,
    recorder: Recorder,
}

impl VolumeHandler {
    #[must_use]
    pub fn new(client: Client, namespace: impl Into<String>, recorder: Recorder) -> Self {
        Self {
            client,
            namespace: namespace.into(),
            recorder,
        }
    }

    /// The event recorder this handler publishes PVC/snapshot lifecycle
    /// events through, exposed so reconcilers can emit their own events
    /// (e.g. around the populator's prime-PVC handoff) against the same
    /// subject.
    pub(crate) fn recorder(&self) -> &Recorder {
        &self.recorder
    }

    fn pvc_api(&self) -> Api<PersistentVolumeClaim> {
        Api::namespaced(self.client.clone(), &self.namespace)
    }

    fn snapshot_api(&self) -> Api<VolumeSnapshot> {
        Api::namespaced(self.client.clone(), &self.namespace)
    }

    fn pv_api(&self) -> Api<PersistentVolume> {
        Api::all(self.client.clone())
    }

    /// Produce the point-in-time image a mover should read from or write
    /// to, per `options.copy_method`. `None`/`Direct` return a reference to
    /// `src_pvc_name` itself; `Clone` provisions a new PVC named
    /// `{src_pvc_name}-clone-{owner_name}`; `Snapshot` provisions (or
    /// re-checks) one named `{src_pvc_name}-<timestamp>`, returning `None`
    /// until the external-snapshotter reports it bound and ready.
    pub async fn ensure_image_from(
        &self,
        src_pvc_name: &str,
        owner: &OwnerReference,
        options: &VolumeOptions,
        now: DateTime<Utc>,
    ) -> Result<Option<TypedObjectReference>> {
        match options.copy_method {
            CopyMethod::None | CopyMethod::Direct => {
                Ok(Some(TypedObjectReference::pvc(src_pvc_name.to_owned())))
            }
            CopyMethod::Clone => {
                let name = format!("{src_pvc_name}-clone-{}", owner.name);
                self.ensure_clone(&name, src_pvc_name, owner, options)
                    .await?;
                Ok(Some(TypedObjectReference::pvc(name)))
            }
            CopyMethod::Snapshot => {
                let name = self.ensure_snapshot(src_pvc_name, owner, options, now).await?;
                Ok(name.map(TypedObjectReference::volume_snapshot))
            }
        }
    }

    /// Server-side-apply a PVC that clones `src_pvc_name` via
    /// `dataSource`, sized and classed per `options` (defaulting to the
    /// source's own capacity when unset).
    async fn ensure_clone(
        &self,
        name: &str,
        src_pvc_name: &str,
        owner: &OwnerReference,
        options: &VolumeOptions,
    ) -> Result<()> {
        let src = self
            .pvc_api()
            .get(src_pvc_name)
            .await
            .map_err(|err| match err {
                kube::Error::Api(e) if e.code == 404 => {
                    Error::PvcNotFound(src_pvc_name.to_owned())
                }
                other => Error::Kube(other),
            })?;
        let capacity = self.resolve_capacity(&src, options)?;
        let already_existed = self.pvc_exists(name).await?;

        let pvc = PersistentVolumeClaim {
            metadata: self.owned_metadata(name, owner, &labels_for(owner)),
            spec: Some(PersistentVolumeClaimSpec {
                access_modes: options
                    .access_modes
                    .clone()
                    .or_else(|| src.spec.as_ref().and_then(|s| s.access_modes.clone())),
                storage_class_name: options
                    .storage_class_name
                    .clone()
                    .or_else(|| src.spec.as_ref().and_then(|s| s.storage_class_name.clone())),
                data_source: Some(TypedLocalObjectReference {
                    kind: "PersistentVolumeClaim".to_owned(),
                    name: src_pvc_name.to_owned(),
                    api_group: None,
                }),
                resources: Some(capacity),
                ..PersistentVolumeClaimSpec::default()
            }),
            status: None,
        };
        let _pvc: PersistentVolumeClaim = self
            .pvc_api()
            .patch(name, &PatchParams::apply(FIELD_MANAGER), &Patch::Apply(pvc))
            .await?;
        if !already_existed {
            events::normal(
                &self.recorder,
                consts::event::PVC_CREATED,
                format!("created PVC {name} cloned from {src_pvc_name}"),
            )
            .await;
        }
        Ok(())
    }

    /// Server-side-apply a `VolumeSnapshot` of `src_pvc_name`, returning its
    /// name once the external-snapshotter reports it bound and ready, or
    /// `None` if it isn't yet.
    ///
    /// The candidate name is stamped onto `src_pvc_name` as
    /// [`consts::ANNOTATION_SNAPSHOT_NAME`] the first time it's picked, and
    /// read back from there on every later call for this cycle: without
    /// this, a snapshot that takes more than one reconcile to bind would
    /// get a fresh timestamped name (and a fresh, separate `VolumeSnapshot`
    /// object) on every poll instead of being re-checked.
    async fn ensure_snapshot(
        &self,
        src_pvc_name: &str,
        owner: &OwnerReference,
        options: &VolumeOptions,
        now: DateTime<Utc>,
    ) -> Result<Option<String>> {
        let src = self
            .pvc_api()
            .get(src_pvc_name)
            .await
            .map_err(|err| match err {
                kube::Error::Api(e) if e.code == 404 => {
                    Error::PvcNotFound(src_pvc_name.to_owned())
                }
                other => Error::Kube(other),
            })?;
        let stamped = src.annotations().get(consts::ANNOTATION_SNAPSHOT_NAME).cloned();
        let name = match &stamped {
            Some(name) => name.clone(),
            None => self.next_snapshot_name(src_pvc_name, now).await?,
        };

        let snapshot = VolumeSnapshot {
            metadata: self.owned_metadata(&name, owner, &labels_for(owner)),
            spec: VolumeSnapshotSpec {
                source: VolumeSnapshotSource {
                    persistent_volume_claim_name: Some(src_pvc_name.to_owned()),
                    volume_snapshot_content_name: None,
                },
                volume_snapshot_class_name: options.volume_snapshot_class_name.clone(),
            },
            status: None,
        };
        let applied: VolumeSnapshot = self
            .snapshot_api()
            .patch(
                &name,
                &PatchParams::apply(FIELD_MANAGER),
                &Patch::Apply(snapshot),
            )
            .await?;

        if stamped.as_deref() != Some(name.as_str()) {
            self.stamp_snapshot_annotation(src_pvc_name, &name).await?;
            events::normal(
                &self.recorder,
                consts::event::SNAP_CREATED,
                format!("created VolumeSnapshot {name}"),
            )
            .await;
        }

        let ready = applied.status.as_ref().map_or(false, |status| {
            status.bound_volume_snapshot_content_name.is_some()
                && status.ready_to_use.unwrap_or(true)
        });
        if ready {
            debug!(name, "VolumeSnapshot ready");
            Ok(Some(name))
        } else {
            events::warning(
                &self.recorder,
                consts::event::SNAP_NOT_BOUND,
                format!("VolumeSnapshot {name} not yet bound"),
            )
            .await;
            Ok(None)
        }
    }

    /// Pick a timestamped snapshot name for `src_pvc_name`, avoiding
    /// same-second collisions against snapshots already owned by this
    /// operator.
    async fn next_snapshot_name(&self, src_pvc_name: &str, now: DateTime<Utc>) -> Result<String> {
        let existing: std::collections::HashSet<String> = self
            .snapshot_api()
            .list(&kube::api::ListParams::default().labels(&format!(
                "{}={}",
                consts::LABEL_CREATED_BY,
                consts::CREATED_BY_VALUE
            )))
            .await?
            .items
            .into_iter()
            .map(|s| s.name_any())
            .collect();
        let mut candidate = now;
        Ok(loop {
            let candidate_name = snapshot_name(src_pvc_name, candidate);
            if !existing.contains(&candidate_name) {
                break candidate_name;
            }
            candidate += chrono::Duration::seconds(1);
        })
    }

    /// Stamp [`consts::ANNOTATION_SNAPSHOT_NAME`] on `pvc_name`, recording
    /// which `VolumeSnapshot` is currently in flight for it.
    async fn stamp_snapshot_annotation(&self, pvc_name: &str, snapshot_name: &str) -> Result<()> {
        let patch = serde_json::json!({
            "metadata": {
                "annotations": {
                    consts::ANNOTATION_SNAPSHOT_NAME: snapshot_name,
                }
            }
        });
        let _pvc: PersistentVolumeClaim = self
            .pvc_api()
            .patch(pvc_name, &PatchParams::default(), &Patch::Merge(patch))
            .await?;
        Ok(())
    }

    /// Delete a previous cycle's `VolumeSnapshot` once it has been
    /// superseded, unless a user or sibling controller opted it out via
    /// [`consts::LABEL_DO_NOT_DELETE`].
    pub async fn delete_snapshot_if_unlabeled(&self, name: &str) -> Result<()> {
        let snap = match self.snapshot_api().get_opt(name).await? {
            Some(snap) => snap,
            None => return Ok(()),
        };
        if snap.labels().contains_key(consts::LABEL_DO_NOT_DELETE) {
            debug!(name, "previous VolumeSnapshot opted out of cleanup, leaving in place");
            return Ok(());
        }
        match self
            .snapshot_api()
            .delete(name, &kube::api::DeleteParams::default())
            .await
        {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(e)) if e.code == 404 => Ok(()),
            Err(other) => Err(other.into()),
        }
    }

    /// Server-side-apply a fresh, empty PVC (no `dataSource`) for a
    /// destination that did not name `destinationPVC`.
    pub async fn ensure_new_pvc(
        &self,
        name: &str,
        owner: &OwnerReference,
        options: &VolumeOptions,
    ) -> Result<TypedObjectReference> {
        let capacity = options
            .capacity
            .clone()
            .ok_or_else(|| Error::MissingSourceCapacity(name.to_owned()))?;
        let already_existed = self.pvc_exists(name).await?;
        let pvc = PersistentVolumeClaim {
            metadata: self.owned_metadata(name, owner, &labels_for(owner)),
            spec: Some(PersistentVolumeClaimSpec {
                access_modes: options.access_modes.clone(),
                storage_class_name: options.storage_class_name.clone(),
                resources: Some(k8s_openapi::api::core::v1::ResourceRequirements {
                    requests: Some(BTreeMap::from([("storage".to_owned(), capacity)])),
                    ..Default::default()
                }),
                ..PersistentVolumeClaimSpec::default()
            }),
            status: None,
        };
        let _pvc: PersistentVolumeClaim = self
            .pvc_api()
            .patch(name, &PatchParams::apply(FIELD_MANAGER), &Patch::Apply(pvc))
            .await?;
        if !already_existed {
            events::normal(
                &self.recorder,
                consts::event::PVC_CREATED,
                format!("created PVC {name}"),
            )
            .await;
        }
        Ok(TypedObjectReference::pvc(name.to_owned()))
    }

    /// Whether a PVC by this name already exists, used to gate "created"
    /// events so re-applying an unchanged PVC on every reconcile doesn't
    /// re-emit them.
    pub(crate) async fn pvc_exists(&self, name: &str) -> Result<bool> {
        Ok(self.pvc_api().get_opt(name).await?.is_some())
    }

    /// Turn an image reference into a PVC name a mover can mount directly.
    /// A `PersistentVolumeClaim` reference already is one; a
    /// `VolumeSnapshot` reference is restored into a new PVC first, since no
    /// mover image knows how to read a `VolumeSnapshot` object itself.
    pub async fn ensure_mountable_pvc(
        &self,
        image: &TypedObjectReference,
        owner: &OwnerReference,
        options: &VolumeOptions,
    ) -> Result<String> {
        if image.is_pvc() {
            return Ok(image.name.clone());
        }
        let name = format!("{}-restored-{}", image.name, owner.name);
        self.ensure_restore_from_snapshot(&name, &image.name, owner, options)
            .await?;
        Ok(name)
    }

    /// Server-side-apply a PVC whose `dataSource` restores `snapshot_name`.
    async fn ensure_restore_from_snapshot(
        &self,
        name: &str,
        snapshot_name: &str,
        owner: &OwnerReference,
        options: &VolumeOptions,
    ) -> Result<()> {
        let capacity = options
            .capacity
            .clone()
            .ok_or_else(|| Error::MissingSourceCapacity(snapshot_name.to_owned()))?;
        let already_existed = self.pvc_exists(name).await?;
        let pvc = PersistentVolumeClaim {
            metadata: self.owned_metadata(name, owner, &labels_for(owner)),
            spec: Some(PersistentVolumeClaimSpec {
                access_modes: options.access_modes.clone(),
                storage_class_name: options.storage_class_name.clone(),
                data_source: Some(TypedLocalObjectReference {
                    kind: "VolumeSnapshot".to_owned(),
                    name: snapshot_name.to_owned(),
                    api_group: Some("snapshot.storage.k8s.io".to_owned()),
                }),
                resources: Some(k8s_openapi::api::core::v1::ResourceRequirements {
                    requests: Some(BTreeMap::from([("storage".to_owned(), capacity)])),
                    ..Default::default()
                }),
                ..PersistentVolumeClaimSpec::default()
            }),
            status: None,
        };
        let _pvc: PersistentVolumeClaim = self
            .pvc_api()
            .patch(name, &PatchParams::apply(FIELD_MANAGER), &Patch::Apply(pvc))
            .await?;
        if !already_existed {
            events::normal(
                &self.recorder,
                consts::event::PVC_CREATED,
                format!("created PVC {name} restored from {snapshot_name}"),
            )
            .await;
        }
        Ok(())
    }

    /// Confirm a caller-provided PVC (`spec.destinationPVC` /
    /// `spec.sourcePVC`) exists, for error reporting before a mover Job
    /// tries to mount it.
    pub async fn use_provided_pvc(&self, name: &str) -> Result<TypedObjectReference> {
        self.pvc_api()
            .get(name)
            .await
            .map_err(|err| match err {
                kube::Error::Api(e) if e.code == 404 => Error::PvcNotFound(name.to_owned()),
                other => Error::Kube(other),
            })?;
        Ok(TypedObjectReference::pvc(name.to_owned()))
    }

    /// Remove the `volsync.backube/snapname` annotation a populator leaves
    /// on a PVC once its prime PVC handoff has fully completed.
    pub async fn remove_snapshot_annotation_from_pvc(&self, pvc_name: &str) -> Result<()> {
        let patch = serde_json::json!({
            "metadata": {
                "annotations": {
                    consts::ANNOTATION_SNAPSHOT_NAME: serde_json::Value::Null,
                }
            }
        });
        let _pvc: PersistentVolumeClaim = self
            .pvc_api()
            .patch(pvc_name, &PatchParams::default(), &Patch::Merge(patch))
            .await?;
        Ok(())
    }

    /// Server-side-apply the populator's "prime" PVC: a PVC sized and
    /// classed exactly like the user's PVC (`for_pvc`), whose `dataSource`
    /// is `image` (a `ReplicationDestination`'s `latestImage`, either a PVC
    /// clone or a `VolumeSnapshot` restore), pinned to `selected_node` when
    /// the target StorageClass is `WaitForFirstConsumer`.
    pub async fn ensure_prime_pvc(
        &self,
        name: &str,
        for_pvc: &PersistentVolumeClaim,
        image: &TypedObjectReference,
        owner: &OwnerReference,
        selected_node: Option<&str>,
    ) -> Result<()> {
        let for_pvc_name = for_pvc.name_any();
        let for_pvc_spec = for_pvc
            .spec
            .as_ref()
            .ok_or_else(|| Error::PvcNotFound(for_pvc_name.clone()))?;
        let capacity = for_pvc_spec
            .resources
            .as_ref()
            .and_then(|r| r.requests.as_ref())
            .and_then(|r| r.get("storage"))
            .cloned()
            .ok_or_else(|| Error::MissingSourceCapacity(for_pvc_name.clone()))?;

        let mut labels = labels_for(owner);
        labels.insert(consts::LABEL_POPULATOR_PVC_FOR.to_owned(), for_pvc_name);
        let mut metadata = self.owned_metadata(name, owner, &labels);
        if let Some(node) = selected_node {
            metadata.annotations = Some(BTreeMap::from([(
                consts::ANNOTATION_SELECTED_NODE.to_owned(),
                node.to_owned(),
            )]));
        }

        let pvc = PersistentVolumeClaim {
            metadata,
            spec: Some(PersistentVolumeClaimSpec {
                access_modes: for_pvc_spec.access_modes.clone(),
                storage_class_name: for_pvc_spec.storage_class_name.clone(),
                data_source: Some(TypedLocalObjectReference {
                    kind: image.kind.clone(),
                    name: image.name.clone(),
                    api_group: image.api_group.clone(),
                }),
                resources: Some(k8s_openapi::api::core::v1::ResourceRequirements {
                    requests: Some(BTreeMap::from([("storage".to_owned(), capacity)])),
                    ..Default::default()
                }),
                ..PersistentVolumeClaimSpec::default()
            }),
            status: None,
        };
        let _pvc: PersistentVolumeClaim = self
            .pvc_api()
            .patch(name, &PatchParams::apply(FIELD_MANAGER), &Patch::Apply(pvc))
            .await?;
        Ok(())
    }

    /// Label `pvc_name` with [`consts::LABEL_DO_NOT_DELETE`], protecting the
    /// image it was restored from for the duration of the populator's
    /// prime-PVC handoff.
    pub async fn label_do_not_delete(&self, pvc_name: &str) -> Result<()> {
        let patch = serde_json::json!({
            "metadata": {
                "labels": {
                    consts::LABEL_DO_NOT_DELETE: "true",
                }
            }
        });
        let _pvc: PersistentVolumeClaim = self
            .pvc_api()
            .patch(pvc_name, &PatchParams::default(), &Patch::Merge(patch))
            .await?;
        Ok(())
    }

    /// Remove the [`consts::LABEL_DO_NOT_DELETE`] hand-off label once the
    /// populator's prime-PVC handoff has completed.
    pub async fn unlabel_do_not_delete(&self, pvc_name: &str) -> Result<()> {
        let patch = serde_json::json!({
            "metadata": {
                "labels": {
                    consts::LABEL_DO_NOT_DELETE: serde_json::Value::Null,
                }
            }
        });
        let _pvc: PersistentVolumeClaim = self
            .pvc_api()
            .patch(pvc_name, &PatchParams::default(), &Patch::Merge(patch))
            .await?;
        Ok(())
    }

    /// Fetch a PVC's phase (`"Bound"`, `"Pending"`, ...), or `None` if it
    /// has no status yet.
    pub async fn pvc_phase(&self, name: &str) -> Result<Option<String>> {
        let pvc = self.pvc_api().get(name).await?;
        Ok(pvc.status.and_then(|s| s.phase))
    }

    /// Read back the `PersistentVolume` name Kubernetes bound a PVC to,
    /// once bound.
    pub async fn get_pv_name_for_pvc(&self, pvc_name: &str) -> Result<Option<String>> {
        let pvc = self.pvc_api().get(pvc_name).await?;
        Ok(pvc.spec.and_then(|s| s.volume_name))
    }

    /// Point a `PersistentVolume`'s `claimRef` at `target_pvc`, completing
    /// the populator's handoff so the user's PVC (rather than the prime
    /// PVC) binds to the already-provisioned volume. Also stamps
    /// [`consts::ANNOTATION_POPULATED_FROM`] for observability.
    pub async fn rebind_pv_claim_ref(
        &self,
        pv_name: &str,
        target_pvc: &PersistentVolumeClaim,
    ) -> Result<()> {
        let target_uid = target_pvc.metadata.uid.clone();
        let target_name = target_pvc.name_any();
        let target_namespace = target_pvc
            .metadata
            .namespace
            .clone()
            .unwrap_or_else(|| self.namespace.clone());
        let claim_ref = ObjectReference {
            kind: Some("PersistentVolumeClaim".to_owned()),
            namespace: Some(target_namespace),
            name: Some(target_name.clone()),
            uid: target_uid,
            ..ObjectReference::default()
        };
        let patch = serde_json::json!({
            "metadata": {
                "annotations": {
                    consts::ANNOTATION_POPULATED_FROM: target_name,
                }
            },
            "spec": {
                "claimRef": claim_ref,
            }
        });
        let _pv: PersistentVolume = self
            .pv_api()
            .patch(pv_name, &PatchParams::default(), &Patch::Merge(patch))
            .await?;
        Ok(())
    }

    /// Set a `PersistentVolume`'s reclaim policy, used to switch a prime
    /// PVC's volume to `Retain` before the rebind so a premature delete of
    /// the prime PVC can't take the data with it.
    pub async fn set_pv_reclaim_policy(&self, pv_name: &str, policy: &str) -> Result<()> {
        let patch = serde_json::json!({
            "spec": {
                "persistentVolumeReclaimPolicy": policy,
            }
        });
        let _pv: PersistentVolume = self
            .pv_api()
            .patch(pv_name, &PatchParams::default(), &Patch::Merge(patch))
            .await?;
        Ok(())
    }

    /// Delete the populator's prime PVC once the rebind handoff has
    /// completed; it has no further purpose and its `claimRef` no longer
    /// points at it.
    pub async fn delete_prime_pvc(&self, name: &str) -> Result<()> {
        match self
            .pvc_api()
            .delete(name, &kube::api::DeleteParams::default())
            .await
        {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(e)) if e.code == 404 => Ok(()),
            Err(other) => Err(other.into()),
        }
    }

    fn resolve_capacity(
        &self,
        src: &PersistentVolumeClaim,
        options: &VolumeOptions,
    ) -> Result<k8s_openapi::api::core::v1::ResourceRequirements> {
        let storage = options.capacity.clone().or_else(|| {
            src.status
                .as_ref()
                .and_then(|s| s.capacity.as_ref())
                .and_then(|c| c.get("storage"))
                .cloned()
        });
        let storage = storage.ok_or_else(|| {
            Error::MissingSourceCapacity(src.name_any())
        })?;
        Ok(k8s_openapi::api::core::v1::ResourceRequirements {
            requests: Some(BTreeMap::from([("storage".to_owned(), storage)])),
            ..Default::default()
        })
    }

    fn owned_metadata(
        &self,
        name: &str,
        owner: &OwnerReference,
        labels: &BTreeMap<String, String>,
    ) -> ObjectMeta {
        ObjectMeta {
            name: Some(name.to_owned()),
            namespace: Some(self.namespace.clone()),
            owner_references: Some(vec![owner.clone()]),
            labels: Some(labels.clone()),
            ..ObjectMeta::default()
        }
    }
}

fn labels_for(owner: &OwnerReference) -> BTreeMap<String, String> {
    BTreeMap::from([
        (
            consts::LABEL_CREATED_BY.to_owned(),
            consts::CREATED_BY_VALUE.to_owned(),
        ),
        ("volsync.backube/owned-by".to_owned(), owner.name.clone()),
    ])
}
