use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use kube::api::{Patch, PatchParams};
use kube::runtime::controller::Action;
use kube::{Api, Client, ResourceExt};
use tracing::{error, info};

use crd_api::consts::reason;
use crd_api::ReplicationSource;
use operator_api::{ReplicationMachine, Trigger};

use crate::adapters::SourceMachine;
use crate::consts::FIELD_MANAGER;
use crate::reconcilers::{cycle, resolve_mover_selection, Error, MoverSelection, Result};
use crate::volume_handler::VolumeHandler;

/// Shared state every reconcile sees. Cheap to clone; `kube::Client`
/// internally wraps its transport in an `Arc`.
pub struct Context {
    pub client: Client,
}

/// Reconcile one `ReplicationSource`: realize its selected mover's
/// point-in-time image, drive the shared cycle state machine, and persist
/// the resulting condition and timestamps.
pub async fn reconcile(obj: Arc<ReplicationSource>, ctx: Arc<Context>) -> Result<Action> {
    let namespace = obj.namespace().ok_or(Error::MissingName)?;
    let name = obj.name_any();
    let owner = obj
        .controller_owner_ref(&())
        .expect("ReplicationSource carries apiVersion/kind for its own owner reference");
    let spec = obj.spec.clone();
    let status = obj.status.clone().unwrap_or_default();
    let now = Utc::now();

    let api: Api<ReplicationSource> = Api::namespaced(ctx.client.clone(), &namespace);
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
    let image = volume_handler
        .ensure_image_from(&spec.source_pvc, &owner, options, now)
        .await?;
    let image = match image {
        Some(image) => image,
        None => {
            let mut new_status = status.clone();
            crate::conditions::set(
                &mut new_status.conditions,
                crate::conditions::synchronizing(true, reason::SYNC, "waiting for point-in-time image"),
            );
            let patch = serde_json::json!({ "status": new_status });
            let params = PatchParams::apply(FIELD_MANAGER).force();
            api.patch_status(&name, &params, &Patch::Merge(patch))
                .await?;
            return Ok(Action::requeue(Duration::from_secs(5)));
        }
    };
    let mountable_pvc = volume_handler
        .ensure_mountable_pvc(&image, &owner, options)
        .await?;

    let mut machine = SourceMachine::new(
        ctx.client.clone(),
        namespace.clone(),
        owner,
        spec.clone(),
        status.clone(),
        mountable_pvc,
    );
    let mover = machine.select_mover()?;
    let labels = crate::metrics::CycleLabels {
        name: &name,
        namespace: &namespace,
        role: "source",
        method: options.copy_method.as_str(),
    };
    let outcome = cycle::advance(&mut machine, &mover, &status.conditions, now, &labels).await?;

    if outcome.cycle_started {
        machine.mark_cycle_start(now);
    }
    if outcome.cycle_finished {
        let trigger = machine.current_trigger();
        let started = machine.last_sync_start_time().unwrap_or(now);
        machine.record_cycle_complete(started, now);
        if options.copy_method == crd_api::CopyMethod::Snapshot {
            // clear this cycle's pinned candidate name so the next cycle
            // mints a fresh snapshot instead of reusing this one.
            volume_handler
                .remove_snapshot_annotation_from_pvc(&spec.source_pvc)
                .await?;
        }
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

    info!(name, namespace, "reconciled ReplicationSource");
    Ok(match outcome.requeue_after {
        Some(delay) => Action::requeue(delay),
        None => Action::await_change(),
    })
}

/// `VolumeOptions` live on whichever single mover sub-spec is populated;
/// the caller has already confirmed exactly one is.
fn selected_volume_options(spec: &crd_api::ReplicationSourceSpec) -> &crd_api::VolumeOptions {
    spec.rsync
        .as_ref()
        .map(|r| &r.volume_options)
        .or_else(|| spec.rclone.as_ref().map(|r| &r.volume_options))
        .or_else(|| spec.restic.as_ref().map(|r| &r.volume_options))
        .expect("caller already confirmed exactly one mover sub-spec is populated")
}

/// `kube::runtime::Controller`'s error policy: log and retry with backoff.
/// No distinction is made between transient and terminal errors here; a
/// persistently failing reconcile surfaces through the `Synchronizing`
/// condition staying `False`/`Error` and the `reconcile_failed` metric.
pub fn error_policy(obj: Arc<ReplicationSource>, err: &Error, _ctx: Arc<Context>) -> Action {
    error!(name = obj.name_any(), error = %err, "ReplicationSource reconcile failed");
    Action::requeue(Duration::from_secs(30))
}
