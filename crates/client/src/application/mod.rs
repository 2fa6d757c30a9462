//! Application layer - scene orchestration on top of the infrastructure

pub mod presentation;
pub mod scene_controller;
pub mod scene_merge;

pub use presentation::{ScenePresentation, SnapshotSection, SnapshotSource};
pub use scene_controller::{ActivationOutcome, SceneControllerDeps, SceneStateController};
pub use scene_merge::{apply_live_event, MergeOutcome};
