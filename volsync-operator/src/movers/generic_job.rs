use std::collections::BTreeMap;

use async_trait::async_trait;
use k8s_openapi::api::batch::v1::{Job, JobSpec};
use k8s_openapi::api::core::v1::{
    Container, EnvVar, PersistentVolumeClaimVolumeSource, PodSpec, PodTemplateSpec, SecretVolumeSource,
    Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use kube::api::{DeleteParams, Patch, PatchParams, PostParams};
use kube::{Api, Client};
use operator_api::{Mover, MoverResult};
use tracing::warn;

use crate::consts::FIELD_MANAGER;

/// Drives a single Kubernetes `Job` through one mover cycle. `rsync`,
/// `rclone`, and `restic` movers all boil down to "run this image, with
/// this data volume and this credentials secret mounted, to completion",
/// so one struct implements all three; [`crate::movers::catalog`] supplies
/// the image and command that make it behave like a given mover.
pub struct GenericJobMover {
    client: Client,
    namespace: String,
    job_name: String,
    image: String,
    command: Vec<String>,
    env: Vec<EnvVar>,
    data_pvc_name: String,
    data_mount_path: String,
    credentials_secret_name: Option<String>,
    credentials_mount_path: String,
    owner: OwnerReference,
    /// When `true`, the Job is held at `parallelism=0` instead of deleted;
    /// resuming flips it back to `1` without recreating the Job or losing
    /// whatever progress its pod already made.
    paused: bool,
}

impl GenericJobMover {
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        client: Client,
        namespace: impl Into<String>,
        job_name: impl Into<String>,
        image: impl Into<String>,
        command: Vec<String>,
        env: Vec<EnvVar>,
        data_pvc_name: impl Into<String>,
        data_mount_path: impl Into<String>,
        credentials_secret_name: Option<String>,
        credentials_mount_path: impl Into<String>,
        owner: OwnerReference,
        paused: bool,
    ) -> Self {
        Self {
            client,
            namespace: namespace.into(),
            job_name: job_name.into(),
            image: image.into(),
            command,
            env,
            data_pvc_name: data_pvc_name.into(),
            data_mount_path: data_mount_path.into(),
            credentials_secret_name,
            credentials_mount_path: credentials_mount_path.into(),
            owner,
            paused,
        }
    }

    fn api(&self) -> Api<Job> {
        Api::namespaced(self.client.clone(), &self.namespace)
    }

    /// `0` while paused, holding the Job's pod template fixed without
    /// deleting it; `1` otherwise.
    fn parallelism(&self) -> i32 {
        i32::from(!self.paused)
    }

    fn build_job(&self) -> Job {
        let mut volumes = vec![Volume {
            name: "data".to_owned(),
            persistent_volume_claim: Some(PersistentVolumeClaimVolumeSource {
                claim_name: self.data_pvc_name.clone(),
                read_only: Some(false),
            }),
            ..Volume::default()
        }];
        let mut mounts = vec![VolumeMount {
            name: "data".to_owned(),
            mount_path: self.data_mount_path.clone(),
            ..VolumeMount::default()
        }];
        if let Some(secret_name) = &self.credentials_secret_name {
            volumes.push(Volume {
                name: "credentials".to_owned(),
                secret: Some(SecretVolumeSource {
                    secret_name: Some(secret_name.clone()),
                    ..SecretVolumeSource::default()
                }),
                ..Volume::default()
            });
            mounts.push(VolumeMount {
                name: "credentials".to_owned(),
                mount_path: self.credentials_mount_path.clone(),
                read_only: Some(true),
                ..VolumeMount::default()
            });
        }

        let labels = BTreeMap::from([(
            "app.kubernetes.io/created-by".to_owned(),
            "volsync".to_owned(),
        )]);

        Job {
            metadata: ObjectMeta {
                name: Some(self.job_name.clone()),
                namespace: Some(self.namespace.clone()),
                owner_references: Some(vec![self.owner.clone()]),
                labels: Some(labels.clone()),
                ..ObjectMeta::default()
            },
            spec: Some(JobSpec {
                backoff_limit: Some(2),
                parallelism: Some(self.parallelism()),
                template: PodTemplateSpec {
                    metadata: Some(ObjectMeta {
                        labels: Some(labels),
                        ..ObjectMeta::default()
                    }),
                    spec: Some(PodSpec {
                        containers: vec![Container {
                            name: "mover".to_owned(),
                            image: Some(self.image.clone()),
                            command: Some(self.command.clone()),
                            env: Some(self.env.clone()),
                            volume_mounts: Some(mounts),
                            ..Container::default()
                        }],
                        volumes: Some(volumes),
                        restart_policy: Some("Never".to_owned()),
                        ..PodSpec::default()
                    }),
                },
                ..JobSpec::default()
            }),
            status: None,
        }
    }
}

#[async_trait]
impl Mover for GenericJobMover {
    async fn synchronize(&self) -> anyhow::Result<MoverResult> {
        let api = self.api();
        match api.get_opt(&self.job_name).await? {
            None => {
                let job = self.build_job();
                let post_params = PostParams {
                    field_manager: Some(FIELD_MANAGER.to_owned()),
                    ..PostParams::default()
                };
                let _job = api.create(&post_params, &job).await?;
                Ok(MoverResult::InProgress)
            }
            Some(job) => {
                let current_parallelism = job.spec.as_ref().and_then(|s| s.parallelism);
                if current_parallelism != Some(self.parallelism()) {
                    let patch = serde_json::json!({ "spec": { "parallelism": self.parallelism() } });
                    let _job: Job = api
                        .patch(&self.job_name, &PatchParams::default(), &Patch::Merge(patch))
                        .await?;
                }

                let status = job.status.unwrap_or_default();
                if status.succeeded.unwrap_or(0) > 0 {
                    Ok(MoverResult::Complete)
                } else if status.failed.unwrap_or(0) > 0 {
                    warn!(job_name = %self.job_name, "mover job has failed pods, deleting for a fresh retry");
                    match api.delete(&self.job_name, &DeleteParams::background()).await {
                        Ok(_) => Ok(MoverResult::InProgress),
                        Err(kube::Error::Api(e)) if e.code == 404 => Ok(MoverResult::InProgress),
                        Err(err) => Err(err.into()),
                    }
                } else {
                    Ok(MoverResult::InProgress)
                }
            }
        }
    }

    async fn cleanup(&self) -> anyhow::Result<MoverResult> {
        let api = self.api();
        match api.get_opt(&self.job_name).await? {
            None => Ok(MoverResult::Complete),
            Some(_) => {
                match api
                    .delete(&self.job_name, &DeleteParams::background())
                    .await
                {
                    Ok(_) => Ok(MoverResult::InProgress),
                    Err(kube::Error::Api(e)) if e.code == 404 => Ok(MoverResult::Complete),
                    Err(err) => Err(err.into()),
                }
            }
        }
    }
}
