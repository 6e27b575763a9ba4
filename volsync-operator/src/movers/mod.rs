/// Mover selection: turns a CR's populated mover sub-spec into a concrete
/// [`Mover`](operator_api::Mover).
pub mod catalog;
/// The `Job`-backed `Mover` implementation shared by all three built-in
/// movers.
pub mod generic_job;

pub use catalog::{select_destination_mover, select_source_mover};
pub use generic_job::GenericJobMover;
