//! Snapshot building and graph-level domain logic for Autograph.
//!
//! This crate turns the assertions held in storage into immutable graph
//! builds (`build_snapshot`), records human corrections
//! (`record_intervention`), and loads finished builds for lookup
//! (`GraphIndex`).

pub mod builder;
pub mod index;
pub mod intervention;
pub mod provenance;
pub mod resolver;

pub use builder::{
    BuildContext, BuildRequest, BuildResult, BuildSettings, ProgressReporter, SilentProgress,
    build_snapshot,
};
pub use index::GraphIndex;
pub use intervention::{Intervention, InterventionPlan, Triple, record_intervention};
