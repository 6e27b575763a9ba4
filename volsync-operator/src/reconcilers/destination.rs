use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use kube::api::{Patch, PatchParams};
use kube::runtime::controller::Action;
use kube::{Api, Client, ResourceExt};
use tracing::{error, info};

use crd_api::consts::reason;
use crd_api::ReplicationDestination;
use operator_api::{ReplicationMachine, Trigger};

use crate::adapters::DestinationMachine;
use crate::consts::FIELD_MANAGER;
use crate::reconcilers::{cycle, resolve_mover_selection, Error, MoverSelection, Result};
use crate::volume_handler::VolumeHandler;

pub use crate::reconcilers::source::Context;

/// Reconcile one `ReplicationDestination`: provision or confirm the working
/// PVC the mover writes into, drive the shared cycle state machine, and
/// capture `status.latestImage` once the cycle completes.
pub async fn reconcile(obj: Arc<ReplicationDestination>, ctx: Arc<Context>) -> Result<Action> {
    let namespace = obj.namespace().ok_or(Error::MissingName)?;
    let name = obj.name_any();
    let owner = obj
        .controller_owner_ref(&())
        .expect("ReplicationDestination carries apiVersion/kind for its own owner reference");
    let spec = obj.spec.clone();
    let status = obj.status.clone().unwrap_or_default();
    let now = Utc::now();

    let api: Api<ReplicationDestination> = Api::namespaced(ctx.client.clone(), &namespace);
    let selection = resolve_mover_selection(spec.populated_mover_count(), spec.external.as_ref());
    let selection = match selection {
        Ok(selection) => selection,
        Err(err) => {
            let mut new_status = status.clone();
            crate::conditions::set(
                &mut new_status.conditions,
                crate::conditions::synchronizing(false, reason::ERROR, err.to_string()),
            );
            let patch = serde_json::json!({ "status": new_status });
            let params = PatchParams::apply(FIELD_MANAGER).force();
            api.patch_status(&name, &params, &Patch::Merge(patch))
                .await?;
            return Err(err.into());
        }
    };
    if matches!(selection, MoverSelection::External) {
        info!(
            name,
            namespace, "spec.external is set, deferring to the external controller"
        );
        return Ok(Action::await_change());
    }
    let options = selected_volume_options(&spec);

    let recorder = crate::events::recorder_for(ctx.client.clone(), obj.as_ref());
    let volume_handler = VolumeHandler::new(ctx.client.clone(), namespace.clone(), recorder);
    let working_pvc = match &spec.destination_pvc {
        Some(provided) => volume_handler.use_provided_pvc(provided).await?.name,
        None => {
            let name = format!("volsync-dst-{name}");
            volume_handler
                .ensure_new_pvc(&name, &owner, options)
                .await?
                .name
        }
    };

    let mut machine = DestinationMachine::new(
        ctx.client.clone(),
        namespace.clone(),
        owner.clone(),
        spec.clone(),
        status.clone(),
        working_pvc.clone(),
    );
    let mover = machine.select_mover()?;
    let labels = crate::metrics::CycleLabels {
        name: &name,
        namespace: &namespace,
        role: "destination",
        method: options.copy_method.as_str(),
    };
    let outcome = cycle::advance(&mut machine, &mover, &status.conditions, now, &labels).await?;

    if outcome.cycle_started {
        machine.mark_cycle_start(now);
    }
    if outcome.cycle_finished {
        let captured = volume_handler
            .ensure_image_from(&working_pvc, &owner, options, now)
            .await?;
        let captured = match captured {
            Some(captured) => captured,
            None => {
                let mut new_status = status.clone();
                crate::conditions::set(
                    &mut new_status.conditions,
                    crate::conditions::synchronizing(
                        true,
                        reason::SYNC,
                        "waiting for point-in-time image",
                    ),
                );
                let patch = serde_json::json!({ "status": new_status });
                let params = PatchParams::apply(FIELD_MANAGER).force();
                api.patch_status(&name, &params, &Patch::Merge(patch))
                    .await?;
                return Ok(Action::requeue(Duration::from_secs(5)));
            }
        };
        let previous_image = status.latest_image.clone();
        machine.set_captured_image(captured.clone());
        if let Some(previous) = previous_image {
            if previous.is_volume_snapshot() && previous.name != captured.name {
                volume_handler
                    .delete_snapshot_if_unlabeled(&previous.name)
                    .await?;
            }
        }
        if options.copy_method == crd_api::CopyMethod::Snapshot {
            // clear this cycle's pinned candidate name so the next cycle
            // mints a fresh snapshot instead of reusing this one.
            volume_handler
                .remove_snapshot_annotation_from_pvc(&working_pvc)
                .await?;
        }

        let trigger = machine.current_trigger();
        let started = machine.last_sync_start_time().unwrap_or(now);
        machine.record_cycle_complete(started, now);
        if trigger == Trigger::Manual {
            if let Some(tag) = spec.trigger.as_ref().and_then(|t| t.manual.clone()) {
                machine.record_manual_sync(tag);
            }
        }
        if let Ok(elapsed) = (now - started).to_std() {
            crate::metrics::observe_sync_duration(&labels, elapsed.as_secs_f64());
        }
        crate::metrics::set_volume_out_of_sync(&labels, false);
    }

    let mut new_status = machine.into_status();
    crate::conditions::set(&mut new_status.conditions, outcome.condition);

    let patch = serde_json::json!({ "status": new_status });
    let params = PatchParams::apply(FIELD_MANAGER).force();
    api.patch_status(&name, &params, &Patch::Merge(patch))
        .await?;

    info!(name, namespace, "reconciled ReplicationDestination");
    Ok(match outcome.requeue_after {
        Some(delay) => Action::requeue(delay),
        None => Action::await_change(),
    })
}

fn selected_volume_options(
    spec: &crd_api::ReplicationDestinationSpec,
) -> &crd_api::VolumeOptions {
    spec.rsync
        .as_ref()
        .map(|r| &r.volume_options)
        .or_else(|| spec.rclone.as_ref().map(|r| &r.volume_options))
        .or_else(|| spec.restic.as_ref().map(|r| &r.volume_options))
        .expect("caller already confirmed exactly one mover sub-spec is populated")
}

/// `kube::runtime::Controller`'s error policy: log and retry with backoff.
pub fn error_policy(obj: Arc<ReplicationDestination>, err: &Error, _ctx: Arc<Context>) -> Action {
    error!(name = obj.name_any(), error = %err, "ReplicationDestination reconcile failed");
    Action::requeue(Duration::from_secs(30))
}
