/// Incremental indexing pipeline (C1) and its update coordinator (P3):
/// diff → chunk → embed → upsert, with per-repository write serialisation.
pub mod coordinator;
pub mod update;

pub use coordinator::{CoordinatorError, CoordinatorResult, CoordinatorStatus, UpdateCoordinator};
pub use update::{process_changes, UpdateOptions, UpdateResult, UpdateStats};
