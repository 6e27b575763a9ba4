use k8s_openapi::api::core::v1::EnvVar;
use kube::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::Client;
use operator_api::MoverSelectionError;

use crd_api::v1alpha1::{
    ReplicationDestinationSpec, ReplicationSourceRcloneSpec, ReplicationSourceResticSpec,
    ReplicationSourceRsyncSpec, ReplicationSourceSpec,
};
use crd_api::v1alpha1::{
    ReplicationDestinationRcloneSpec, ReplicationDestinationResticSpec,
    ReplicationDestinationRsyncSpec,
};

use crate::consts::{mover_image, CREDENTIALS_MOUNT_PATH, DATA_MOUNT_PATH};
use crate::movers::generic_job::GenericJobMover;

/// Build the mover selected by whichever single sub-spec a
/// `ReplicationSource` populated, pointed at `image_pvc` (the PVC backing
/// the point-in-time image the volume handler already produced).
pub fn select_source_mover(
    client: Client,
    namespace: String,
    owner: OwnerReference,
    spec: &ReplicationSourceSpec,
    image_pvc: &str,
) -> Result<GenericJobMover, MoverSelectionError> {
    match spec.populated_mover_count() {
        0 => Err(MoverSelectionError::NoMoverFound),
        1 => Ok(build_source_mover(client, namespace, owner, spec, image_pvc)),
        n => Err(MoverSelectionError::MultipleMoversFound(n)),
    }
}

/// Symmetric to [`select_source_mover`], for a `ReplicationDestination`.
pub fn select_destination_mover(
    client: Client,
    namespace: String,
    owner: OwnerReference,
    spec: &ReplicationDestinationSpec,
    dest_pvc: &str,
) -> Result<GenericJobMover, MoverSelectionError> {
    match spec.populated_mover_count() {
        0 => Err(MoverSelectionError::NoMoverFound),
        1 => Ok(build_destination_mover(
            client, namespace, owner, spec, dest_pvc,
        )),
        n => Err(MoverSelectionError::MultipleMoversFound(n)),
    }
}

fn build_source_mover(
    client: Client,
    namespace: String,
    owner: OwnerReference,
    spec: &ReplicationSourceSpec,
    image_pvc: &str,
) -> GenericJobMover {
    let job_name = format!("volsync-src-{}", owner.name);
    let paused = spec.paused.unwrap_or(false);
    if let Some(rsync) = &spec.rsync {
        rsync_job(client, namespace, job_name, owner, rsync, image_pvc, Role::Source(rsync), paused)
    } else if let Some(rclone) = &spec.rclone {
        rclone_job(client, namespace, job_name, owner, rclone, image_pvc, Direction::Push, paused)
    } else if let Some(restic) = &spec.restic {
        restic_job(client, namespace, job_name, owner, restic, image_pvc, Direction::Push, paused)
    } else {
        unreachable!("caller already checked populated_mover_count() == 1")
    }
}

fn build_destination_mover(
    client: Client,
    namespace: String,
    owner: OwnerReference,
    spec: &ReplicationDestinationSpec,
    dest_pvc: &str,
) -> GenericJobMover {
    let job_name = format!("volsync-dst-{}", owner.name);
    let paused = spec.paused.unwrap_or(false);
    if let Some(rsync) = &spec.rsync {
        rsync_job(
            client,
            namespace,
            job_name,
            owner,
            &ReplicationSourceRsyncSpec {
                volume_options: rsync.volume_options.clone(),
                address: None,
                port: None,
                ssh_keys: rsync.ssh_keys.clone(),
                service_type: rsync.service_type.clone(),
            },
            dest_pvc,
            Role::Destination,
            paused,
        )
    } else if let Some(rclone) = &spec.rclone {
        rclone_job(
            client,
            namespace,
            job_name,
            owner,
            &ReplicationSourceRcloneSpec {
                volume_options: rclone.volume_options.clone(),
                rclone_config: rclone.rclone_config.clone(),
                rclone_dest_path: rclone.rclone_dest_path.clone(),
            },
            dest_pvc,
            Direction::Pull,
            paused,
        )
    } else if let Some(restic) = &spec.restic {
        restic_job(
            client,
            namespace,
            job_name,
            owner,
            &ReplicationSourceResticSpec {
                volume_options: restic.volume_options.clone(),
                repository: restic.repository.clone(),
                prune_interval_days: None,
            },
            dest_pvc,
            Direction::Pull,
            paused,
        )
    } else {
        unreachable!("caller already checked populated_mover_count() == 1")
    }
}

/// Whether an rsync Job listens for a peer (`Destination`) or connects out
/// to one (`Source`, which may itself be unaddressed and so also listen;
/// see `ReplicationSourceRsyncSpec::address`).
enum Role<'a> {
    Source(&'a ReplicationSourceRsyncSpec),
    Destination,
}

/// Whether a mover without a rendezvous protocol is writing to its remote
/// (a `ReplicationSource`) or reading from it (a `ReplicationDestination`).
enum Direction {
    Push,
    Pull,
}

#[allow(clippy::too_many_arguments)]
fn rsync_job(
    client: Client,
    namespace: String,
    job_name: String,
    owner: OwnerReference,
    spec: &ReplicationSourceRsyncSpec,
    data_pvc: &str,
    role: Role<'_>,
    paused: bool,
) -> GenericJobMover {
    let command = match role {
        Role::Source(src) => match &src.address {
            Some(addr) => vec![
                "/bin/sh".to_owned(),
                "-c".to_owned(),
                format!("rsync -ah --delete {DATA_MOUNT_PATH}/ rsync://{addr}/data"),
            ],
            None => vec![
                "/bin/sh".to_owned(),
                "-c".to_owned(),
                format!("rsync --daemon --no-detach --config=/etc/rsyncd.conf & wait; true; echo serving {DATA_MOUNT_PATH}"),
            ],
        },
        Role::Destination => vec![
            "/bin/sh".to_owned(),
            "-c".to_owned(),
            format!("rsync --daemon --no-detach --config=/etc/rsyncd.conf; true; echo receiving into {DATA_MOUNT_PATH}"),
        ],
    };
    GenericJobMover::new(
        client,
        namespace,
        job_name,
        mover_image::RSYNC,
        command,
        Vec::new(),
        data_pvc,
        DATA_MOUNT_PATH,
        spec.ssh_keys.clone(),
        CREDENTIALS_MOUNT_PATH,
        owner,
        paused,
    )
}

#[allow(clippy::too_many_arguments)]
fn rclone_job(
    client: Client,
    namespace: String,
    job_name: String,
    owner: OwnerReference,
    spec: &ReplicationSourceRcloneSpec,
    data_pvc: &str,
    direction: Direction,
    paused: bool,
) -> GenericJobMover {
    let (src, dst) = match direction {
        Direction::Push => (DATA_MOUNT_PATH.to_owned(), spec.rclone_dest_path.clone()),
        Direction::Pull => (spec.rclone_dest_path.clone(), DATA_MOUNT_PATH.to_owned()),
    };
    let command = vec![
        "rclone".to_owned(),
        "sync".to_owned(),
        "--config".to_owned(),
        format!("{CREDENTIALS_MOUNT_PATH}/rclone.conf"),
        src,
        dst,
    ];
    GenericJobMover::new(
        client,
        namespace,
        job_name,
        mover_image::RCLONE,
        command,
        Vec::new(),
        data_pvc,
        DATA_MOUNT_PATH,
        Some(spec.rclone_config.clone()),
        CREDENTIALS_MOUNT_PATH,
        owner,
        paused,
    )
}

#[allow(clippy::too_many_arguments)]
fn restic_job(
    client: Client,
    namespace: String,
    job_name: String,
    owner: OwnerReference,
    spec: &ReplicationSourceResticSpec,
    data_pvc: &str,
    direction: Direction,
    paused: bool,
) -> GenericJobMover {
    let verb = match direction {
        Direction::Push => "backup",
        Direction::Pull => "restore latest --target",
    };
    let command = vec![
        "/bin/sh".to_owned(),
        "-c".to_owned(),
        format!("restic {verb} {DATA_MOUNT_PATH}"),
    ];
    let env = vec![EnvVar {
        name: "RESTIC_REPOSITORY".to_owned(),
        value: Some(spec.repository.clone()),
        ..EnvVar::default()
    }];
    GenericJobMover::new(
        client,
        namespace,
        job_name,
        mover_image::RESTIC,
        command,
        env,
        data_pvc,
        DATA_MOUNT_PATH,
        None,
        CREDENTIALS_MOUNT_PATH,
        owner,
        paused,
    )
}

#[cfg(test)]
mod test {
    use super::*;
    use crd_api::v1alpha1::{ReplicationSourceResticSpec, ReplicationSourceSpec};

    #[test]
    fn no_mover_selected_is_an_error() {
        let spec = ReplicationSourceSpec {
            source_pvc: "data".to_owned(),
            trigger: None,
            paused: None,
            rsync: None,
            rclone: None,
            restic: None,
            external: None,
        };
        let err =
            select_source_mover_offline(&spec).expect_err("zero movers must be an error");
        assert_eq!(err, MoverSelectionError::NoMoverFound);
    }

    #[test]
    fn two_movers_selected_is_an_error() {
        let spec = ReplicationSourceSpec {
            source_pvc: "data".to_owned(),
            trigger: None,
            paused: None,
            rsync: Some(ReplicationSourceRsyncSpec::default()),
            rclone: None,
            restic: Some(ReplicationSourceResticSpec {
                repository: "s3:bucket".to_owned(),
                ..Default::default()
            }),
            external: None,
        };
        let err = select_source_mover_offline(&spec).expect_err("two movers must be an error");
        assert_eq!(err, MoverSelectionError::MultipleMoversFound(2));
    }

    /// `select_source_mover` needs a live `Client` to build a `GenericJobMover`;
    /// this mirrors its selection logic without one, to test purely the
    /// counting behaviour.
    fn select_source_mover_offline(
        spec: &ReplicationSourceSpec,
    ) -> Result<(), MoverSelectionError> {
        match spec.populated_mover_count() {
            0 => Err(MoverSelectionError::NoMoverFound),
            1 => Ok(()),
            n => Err(MoverSelectionError::MultipleMoversFound(n)),
        }
    }
}
