use async_trait::async_trait;

/// A data mover: the thing that actually copies bytes between a volume and
/// a remote (rsync, rclone, restic, or an out-of-tree implementation). The
/// state machine drives a mover without knowing which transport it wraps.
#[async_trait]
pub trait Mover: Send + Sync {
    /// Advance one synchronization cycle. May be called repeatedly; a
    /// [`MoverResult::InProgress`] means the caller should requeue and call
    /// again rather than treat the cycle as failed.
    async fn synchronize(&self) -> anyhow::Result<MoverResult>;

    /// Tear down whatever `synchronize` left behind for a completed cycle
    /// (the mover Job, its Pod, rendezvous Services). Also called when a
    /// cycle is cleaned up, so it must be idempotent.
    async fn cleanup(&self) -> anyhow::Result<MoverResult>;
}

/// Outcome of one [`Mover`] step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoverResult {
    /// The step has not finished; call again on the next reconcile.
    InProgress,
    /// The step finished.
    Complete,
}

impl MoverResult {
    #[must_use]
    pub fn is_complete(self) -> bool {
        matches!(self, Self::Complete)
    }
}

/// Raised by a mover catalog when a CR's set of mover sub-specs does not
/// select exactly one mover.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum MoverSelectionError {
    /// None of `rsync`, `rclone`, `restic`, ... is set.
    #[error("no mover sub-spec is set; a replication method must be specified")]
    NoMoverFound,
    /// More than one of `rsync`, `rclone`, `restic`, ... is set.
    #[error("{0} mover sub-specs are set; expected exactly one")]
    MultipleMoversFound(usize),
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn mover_result_is_complete() {
        assert!(!MoverResult::InProgress.is_complete());
        assert!(MoverResult::Complete.is_complete());
    }
}
