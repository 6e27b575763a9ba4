/// `FIELD_MANAGER` for every object the reconcilers server-side-apply.
pub const FIELD_MANAGER: &str = "volsync.backube/volsync-operator";

/// Container images backing the three built-in movers. Real deployments
/// override these via the container image set at build time; these
/// defaults match the upstream mover images by convention.
pub mod mover_image {
    pub const RSYNC: &str = "quay.io/backube/volsync:latest";
    pub const RCLONE: &str = "quay.io/backube/volsync:latest";
    pub const RESTIC: &str = "quay.io/backube/volsync:latest";
}

/// Mount path for the secret a mover consumes (SSH keys, rclone config, or
/// a restic repository/password pair).
pub const CREDENTIALS_MOUNT_PATH: &str = "/credentials";
/// Mount path for the data volume the mover reads from or writes to.
pub const DATA_MOUNT_PATH: &str = "/data";

/// Timeout waiting for the core's own CRDs to reach `Established` after
/// being created or patched at startup.
pub const CRD_ESTABLISH_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(20);

/// Grace period after a missed `Schedule` trigger before it is reported as
/// an error condition instead of silently caught up on the next tick.
pub const SCHEDULE_MISS_GRACE: std::time::Duration = std::time::Duration::from_secs(60);
