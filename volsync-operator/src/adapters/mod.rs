/// Adapts `ReplicationDestination` to [`operator_api::ReplicationMachine`].
pub mod destination;
/// Adapts `ReplicationSource` to [`operator_api::ReplicationMachine`].
pub mod source;

pub use destination::DestinationMachine;
pub use source::SourceMachine;
