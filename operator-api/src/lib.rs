/// The generic state machine's contract with a `ReplicationSource`/
/// `ReplicationDestination` adapter, and trigger classification.
pub mod machine;

/// The data mover abstraction and mover-selection errors.
pub mod mover;

pub use machine::{ReplicationMachine, Trigger};
pub use mover::{Mover, MoverResult, MoverSelectionError};
