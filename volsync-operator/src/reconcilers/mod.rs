/// The shared Initial/Synchronizing/CleaningUp state-machine driver, used
/// by both CR-specific reconcilers.
pub mod cycle;
/// `ReplicationDestination` reconciler.
pub mod destination;
/// Volume populator: rebinds PVCs created via `dataSourceRef` onto a
/// `ReplicationDestination`'s `latestImage`.
pub mod populator;
/// `ReplicationSource` reconciler.
pub mod source;

/// Errors surfaced to `kube::runtime::Controller`'s error policy. Both
/// reconcilers fold their CR-specific errors (volume handler, mover
/// selection) into this one type so `Controller::run`'s `reconciler_errors`
/// metric and `error_policy` stay CR-agnostic.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("kubernetes api error")]
    Kube(#[from] kube::Error),
    #[error("volume handler error")]
    VolumeHandler(#[from] crate::volume_handler::Error),
    #[error("no usable mover: {0}")]
    MoverSelection(#[from] operator_api::MoverSelectionError),
    #[error(transparent)]
    Mover(#[from] anyhow::Error),
    #[error("object has no name")]
    MissingName,
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Which mover path a CR-specific reconciler should take this reconcile,
/// given how many internal mover sub-specs are populated and whether
/// `spec.external` is set.
pub(crate) enum MoverSelection {
    /// Exactly one internal mover sub-spec is populated; run it.
    Internal,
    /// `external` is set and no internal sub-spec is populated: an
    /// out-of-tree controller owns synchronization, so the core has
    /// nothing to do.
    External,
}

/// Resolve [`MoverSelection`], folding `spec.external` into the same
/// selection logic that already rejects zero or multiple internal movers.
pub(crate) fn resolve_mover_selection(
    populated_mover_count: usize,
    external: Option<&crd_api::ExternalSpec>,
) -> std::result::Result<MoverSelection, operator_api::MoverSelectionError> {
    match (populated_mover_count, external.is_some()) {
        (0, true) => Ok(MoverSelection::External),
        (0, false) => Err(operator_api::MoverSelectionError::NoMoverFound),
        (1, false) => Ok(MoverSelection::Internal),
        (n, _) => Err(operator_api::MoverSelectionError::MultipleMoversFound(n.max(2))),
    }
}
