use std::sync::Arc;
use std::time::Duration;

use k8s_openapi::api::core::v1::PersistentVolumeClaim;
use kube::api::Api;
use kube::runtime::controller::Action;
use kube::{Client, ResourceExt};
use tracing::{debug, info};

use crd_api::consts;
use crd_api::ReplicationDestination;

use crate::reconcilers::{Error, Result};
use crate::volume_handler::VolumeHandler;

/// Shared state every reconcile sees.
pub struct Context {
    pub client: Client,
}

const API_GROUP: &str = "volsync.backube";
const KIND: &str = "ReplicationDestination";

/// Reconcile one PVC whose `spec.dataSourceRef` names a `ReplicationDestination`:
/// stand up a "prime" PVC sourced from the destination's `latestImage`, and once
/// it binds, rebind the underlying `PersistentVolume`'s `claimRef` onto this PVC
/// so Kubernetes' own PV/PVC binder finishes the handoff.
pub async fn reconcile(obj: Arc<PersistentVolumeClaim>, ctx: Arc<Context>) -> Result<Action> {
    let namespace = obj.namespace().ok_or(Error::MissingName)?;
    let name = obj.name_any();

    let Some(data_source_ref) = obj
        .spec
        .as_ref()
        .and_then(|spec| spec.data_source_ref.as_ref())
    else {
        return Ok(Action::await_change());
    };
    if !references_replication_destination(data_source_ref) {
        return Ok(Action::await_change());
    }
    let Some(dest_name) = data_source_ref.name.as_deref() else {
        return Ok(Action::await_change());
    };

    // already rebound onto a real volume: the populator's work here is done.
    if obj
        .spec
        .as_ref()
        .and_then(|spec| spec.volume_name.as_ref())
        .is_some()
    {
        return Ok(Action::await_change());
    }

    let dest_api: Api<ReplicationDestination> = Api::namespaced(ctx.client.clone(), &namespace);
    let dest = dest_api.get(dest_name).await?;
    let Some(image) = dest.status.and_then(|status| status.latest_image) else {
        debug!(
            name,
            namespace, dest_name, "waiting for ReplicationDestination to produce a latestImage"
        );
        return Ok(Action::requeue(Duration::from_secs(10)));
    };

    let owner = obj
        .controller_owner_ref(&())
        .expect("PersistentVolumeClaim carries apiVersion/kind for its own owner reference");
    let selected_node = obj
        .annotations()
        .get(consts::ANNOTATION_SELECTED_NODE)
        .map(String::as_str);

    let recorder = crate::events::recorder_for(ctx.client.clone(), obj.as_ref());
    let volume_handler = VolumeHandler::new(ctx.client.clone(), namespace.clone(), recorder);
    let prime_name = format!("volsync-prime-{name}");

    let outcome = run_populator(
        &volume_handler,
        &name,
        &namespace,
        &prime_name,
        obj.as_ref(),
        &image,
        &owner,
        selected_node,
    )
    .await;

    if let Err(err) = &outcome {
        crate::events::warning(
            volume_handler.recorder(),
            consts::event::POPULATOR_ERROR,
            format!("populator handoff for {prime_name} failed: {err}"),
        )
        .await;
    }
    outcome
}

/// Carry the prime PVC through creation, bind, and rebind, as its own
/// function so a failure at any step can be reported through one
/// `POPULATOR_ERROR` event in the caller.
async fn run_populator(
    volume_handler: &VolumeHandler,
    name: &str,
    namespace: &str,
    prime_name: &str,
    target_pvc: &PersistentVolumeClaim,
    image: &crd_api::TypedObjectReference,
    owner: &k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference,
    selected_node: Option<&str>,
) -> Result<Action> {
    let prime_existed = volume_handler.pvc_exists(prime_name).await?;
    if image.is_volume_snapshot() {
        volume_handler.label_do_not_delete(&image.name).await?;
    }

    volume_handler
        .ensure_prime_pvc(prime_name, target_pvc, image, owner, selected_node)
        .await?;
    if !prime_existed {
        crate::events::normal(
            volume_handler.recorder(),
            consts::event::POPULATOR_PVC_CREATED,
            format!("created prime PVC {prime_name}"),
        )
        .await;
    }

    let Some(phase) = volume_handler.pvc_phase(prime_name).await? else {
        return Ok(Action::requeue(Duration::from_secs(5)));
    };
    if phase != "Bound" {
        debug!(name, namespace, prime_name, phase, "prime PVC not bound yet");
        crate::events::warning(
            volume_handler.recorder(),
            consts::event::PVC_NOT_BOUND,
            format!("prime PVC {prime_name} not yet bound (phase={phase})"),
        )
        .await;
        return Ok(Action::requeue(Duration::from_secs(5)));
    }

    let Some(pv_name) = volume_handler.get_pv_name_for_pvc(prime_name).await? else {
        return Ok(Action::requeue(Duration::from_secs(5)));
    };

    volume_handler
        .set_pv_reclaim_policy(&pv_name, "Retain")
        .await?;
    volume_handler
        .rebind_pv_claim_ref(&pv_name, target_pvc)
        .await?;
    volume_handler.delete_prime_pvc(prime_name).await?;
    if image.is_volume_snapshot() {
        volume_handler.unlabel_do_not_delete(&image.name).await?;
    }

    crate::events::normal(
        volume_handler.recorder(),
        consts::event::POPULATOR_FINISHED,
        format!("rebound PersistentVolume {pv_name} onto {name}"),
    )
    .await;
    info!(
        name,
        namespace, pv_name, "rebound PersistentVolume onto populator target PVC"
    );
    Ok(Action::await_change())
}

fn references_replication_destination(
    data_source_ref: &k8s_openapi::api::core::v1::TypedObjectReference,
) -> bool {
    data_source_ref.api_group.as_deref() == Some(API_GROUP)
        && data_source_ref.kind.as_deref() == Some(KIND)
}

/// `kube::runtime::Controller`'s error policy: log and retry with backoff.
pub fn error_policy(
    obj: Arc<PersistentVolumeClaim>,
    err: &Error,
    _ctx: Arc<Context>,
) -> Action {
    tracing::error!(
        name = obj.name_any(),
        error = %err,
        "populator reconcile failed"
    );
    Action::requeue(Duration::from_secs(30))
}

#[cfg(test)]
mod test {
    use super::*;
    use k8s_openapi::api::core::v1::TypedObjectReference;

    #[test]
    fn recognizes_replication_destination_data_source_ref() {
        let reference = TypedObjectReference {
            api_group: Some(API_GROUP.to_owned()),
            kind: Some(KIND.to_owned()),
            name: Some("my-dest".to_owned()),
            namespace: None,
        };
        assert!(references_replication_destination(&reference));
    }

    #[test]
    fn ignores_other_data_source_refs() {
        let reference = TypedObjectReference {
            api_group: Some("snapshot.storage.k8s.io".to_owned()),
            kind: Some("VolumeSnapshot".to_owned()),
            name: Some("my-snap".to_owned()),
            namespace: None,
        };
        assert!(!references_replication_destination(&reference));
    }
}
