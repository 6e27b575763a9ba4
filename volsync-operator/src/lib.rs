/// CR-specific adapters bridging `ReplicationSource`/`ReplicationDestination`
/// to the shared [`operator_api::ReplicationMachine`].
pub mod adapters;
/// `Synchronizing` condition helpers, mirroring Go apimachinery's
/// `meta.SetStatusCondition`.
pub mod conditions;
/// Shared constants: field manager name, mount paths, default mover images.
pub mod consts;
/// `kube::runtime::events::Recorder` helpers for emitting `Normal`/`Warning`
/// events against a CR or PVC.
pub mod events;
/// CLI configuration, parsed with `clap`.
pub mod config;
/// Prometheus metrics registry and the `/metrics` handler.
pub mod metrics;
/// `Mover` selection and the shared `Job`-backed implementation.
pub mod movers;
/// Ties the `ReplicationSource`/`ReplicationDestination`/populator
/// controllers and the metrics web server into one graceful-shutdown run
/// loop.
pub mod operator;
/// CR-specific reconcile functions, built on the shared cycle state machine.
pub mod reconcilers;
/// `spec.trigger.schedule` cron parsing.
pub mod schedule;
/// The Initial/Synchronizing/CleaningUp cycle decision table, independent
/// of Kubernetes types.
pub mod state_machine;
/// Realizes a mover's requested `CopyMethod` as concrete PVCs and
/// `VolumeSnapshot`s, and the populator's PV rebind primitives.
pub mod volume_handler;
