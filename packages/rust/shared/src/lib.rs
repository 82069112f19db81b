//! Shared types, error model, and configuration for Autograph.
//!
//! This crate is the foundation depended on by all other Autograph crates.
//! It provides:
//! - [`AutographError`]: the unified error type
//! - Domain types ([`ExtractionSource`], [`EntityAssertion`], [`Node`], ids)
//! - Configuration ([`AppConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, BuildConfig, ExportConfig, StorageConfig, config_dir, config_file_path,
    expand_home, init_config, load_config, load_config_from, validate_config,
};
pub use error::{AutographError, Result};
pub use types::{
    AssertionId, AssertionKind, BuildId, BuildSnapshot, EdgeInfo, EntityAssertion,
    ExtractionSource, FileId, FileInfo, FileRecord, NODE_SCHEMA_VERSION, NewEntityAssertion,
    NewRelationAssertion, Node, NodeId, NodeOut, Provenance, RelationAssertion, SnapshotId,
    SourceId, SourceKind, SourceSnapshot, TextId,
};
