use std::sync::Arc;

use anyhow::Result;
use axum::routing::get;
use axum::Router;
use futures::{FutureExt, StreamExt};
use k8s_openapi::api::core::v1::PersistentVolumeClaim;
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::api::{Api, ListParams, Patch, PatchParams, PostParams};
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::Controller;
use kube::{Client, CustomResourceExt};
use tracing::{debug, info, warn};

use crd_api::{ReplicationDestination, ReplicationSource};

use crate::config::{Config, Namespace};
use crate::consts::CRD_ESTABLISH_TIMEOUT;
use crate::reconcilers::{destination, populator, source};

/// Runs the `ReplicationSource`/`ReplicationDestination`/populator
/// controllers and the metrics web server side by side, shutting every one
/// of them down once the process receives a termination signal.
#[derive(Debug)]
pub struct Operator {
    config: Config,
}

impl Operator {
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Run the operator until a shutdown signal is received.
    pub async fn run(&self) -> Result<()> {
        crate::metrics::init();

        let client = Client::try_default().await?;
        self.prepare_crds(&client).await?;

        let ctx = Arc::new(source::Context {
            client: client.clone(),
        });

        let (source_api, destination_api, pvc_api) = match self.config.namespace {
            Namespace::Single(ref namespace) => (
                Api::<ReplicationSource>::namespaced(client.clone(), namespace),
                Api::<ReplicationDestination>::namespaced(client.clone(), namespace),
                Api::<PersistentVolumeClaim>::namespaced(client.clone(), namespace),
            ),
            Namespace::ClusterWide => (
                Api::<ReplicationSource>::all(client.clone()),
                Api::<ReplicationDestination>::all(client.clone()),
                Api::<PersistentVolumeClaim>::all(client.clone()),
            ),
        };

        let source_controller = Controller::new(source_api, WatcherConfig::default())
            .shutdown_on_signal()
            .run(source::reconcile, source::error_policy, ctx.clone())
            .for_each(|res| async move { log_reconcile_result("ReplicationSource", &res) });

        let destination_controller =
            Controller::new(destination_api, WatcherConfig::default())
                .shutdown_on_signal()
                .run(destination::reconcile, destination::error_policy, ctx.clone())
                .for_each(|res| async move {
                    log_reconcile_result("ReplicationDestination", &res);
                });

        let populator_ctx = Arc::new(populator::Context {
            client: client.clone(),
        });
        let populator_controller = Controller::new(pvc_api, WatcherConfig::default())
            .shutdown_on_signal()
            .run(populator::reconcile, populator::error_policy, populator_ctx)
            .for_each(|res| async move { log_reconcile_result("populator", &res) });

        let web_server = self.web_server();

        tokio::select! {
            () = source_controller => info!("ReplicationSource controller shut down"),
            () = destination_controller => info!("ReplicationDestination controller shut down"),
            () = populator_controller => info!("populator controller shut down"),
            res = web_server => {
                warn!("metrics web server exited unexpectedly");
                res?;
            }
        }
        Ok(())
    }

    /// Create the CRDs this core depends on if they do not already exist.
    /// Mirrors upstream behavior of trusting an already-installed CRD
    /// unless `--create-crd` forces a re-apply.
    async fn prepare_crds(&self, client: &Client) -> Result<()> {
        let crd_api: Api<CustomResourceDefinition> = Api::all(client.clone());
        let existing: std::collections::HashSet<String> = crd_api
            .list(&ListParams::default())
            .await?
            .items
            .into_iter()
            .filter_map(|crd| crd.metadata.name)
            .collect();

        self.ensure_crd::<ReplicationSource>(&crd_api, &existing)
            .await?;
        self.ensure_crd::<ReplicationDestination>(&crd_api, &existing)
            .await?;
        Ok(())
    }

    async fn ensure_crd<K>(
        &self,
        crd_api: &Api<CustomResourceDefinition>,
        existing: &std::collections::HashSet<String>,
    ) -> Result<()>
    where
        K: CustomResourceExt,
    {
        let definition = K::crd();
        let name = K::crd_name();
        if !existing.contains(name) {
            debug!(name, "CRD not found, creating it");
            let _crd = crd_api.create(&PostParams::default(), &definition).await?;
        } else if self.config.create_crd {
            debug!(name, "--create-crd set, force patching existing CRD");
            let _crd = crd_api
                .patch(name, &PatchParams::default(), &Patch::Merge(definition))
                .await?;
        }
        let establish = kube::runtime::wait::await_condition(
            crd_api.clone(),
            name,
            kube::runtime::wait::conditions::is_crd_established(),
        );
        let _crd = tokio::time::timeout(CRD_ESTABLISH_TIMEOUT, establish).await??;
        debug!(name, "CRD established");
        Ok(())
    }

    /// Serve `/metrics` until the process receives a termination signal.
    async fn web_server(&self) -> Result<()> {
        let app = Router::new().route("/metrics", get(crate::metrics::metrics));
        axum::Server::bind(&self.config.listen_addr.parse()?)
            .serve(app.into_make_service())
            .with_graceful_shutdown(tokio::signal::ctrl_c().map(|_| ()))
            .await?;
        Ok(())
    }
}

/// Log one controller's reconcile outcome and bump the failure counter;
/// the error type is whatever `kube::runtime::Controller::run` produces for
/// this core's reconcilers, left to inference rather than spelled out.
fn log_reconcile_result<T, E: std::fmt::Display>(controller: &str, res: &std::result::Result<T, E>) {
    match res {
        Ok(_) => debug!(controller, "reconciled"),
        Err(err) => {
            crate::metrics::RECONCILE_FAILED_COUNT
                .with_label_values(&[controller, "reconcile"])
                .inc();
            warn!(controller, error = %err, "reconcile failed");
        }
    }
}
