//! Core domain types: extraction sources, assertions, builds and the
//! per-build materialized [`Node`].

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AutographError, Result};

/// Schema version stamped on every persisted node row.
pub const NODE_SCHEMA_VERSION: u32 = 1;

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                std::fmt::Display::fmt(&self.0, f)
            }
        }

        impl std::str::FromStr for $name {
            type Err = std::num::ParseIntError;

            fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                Ok(Self(s.trim().parse()?))
            }
        }
    };
}

id_type!(
    /// Row id of an [`ExtractionSource`].
    SourceId
);
id_type!(
    /// Row id of an entity or relation assertion.
    AssertionId
);
id_type!(
    /// Row id of a text fragment.
    TextId
);
id_type!(
    /// Row id of an uploaded file.
    FileId
);
id_type!(
    /// Row id of a [`BuildSnapshot`]; doubles as the graph version number.
    BuildId
);
id_type!(
    /// Row id of a [`SourceSnapshot`].
    SnapshotId
);
id_type!(
    /// Row id of a materialized [`Node`].
    NodeId
);

// ---------------------------------------------------------------------------
// Kinds
// ---------------------------------------------------------------------------

/// Whether a source is an automated model or a human correction batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Model,
    HumanIntervention,
}

impl SourceKind {
    /// Integer code used in the database.
    pub fn code(self) -> i64 {
        match self {
            Self::Model => 1,
            Self::HumanIntervention => 2,
        }
    }

    /// Decode a stored integer code.
    pub fn from_code(code: i64) -> Result<Self> {
        match code {
            1 => Ok(Self::Model),
            2 => Ok(Self::HumanIntervention),
            other => Err(AutographError::data(format!("unknown source kind code {other}"))),
        }
    }
}

impl std::str::FromStr for SourceKind {
    type Err = AutographError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "model" => Ok(Self::Model),
            "human" | "human-intervention" | "human_intervention" => Ok(Self::HumanIntervention),
            other => Err(AutographError::validation(format!(
                "unknown source kind '{other}' (expected model or human)"
            ))),
        }
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Model => f.pad("model"),
            Self::HumanIntervention => f.pad("human-intervention"),
        }
    }
}

/// Whether an assertion adds or retracts a claim.
///
/// `Tmp` marks a placeholder entity that only exists to anchor a relation;
/// it never selects a node on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssertionKind {
    Add,
    Del,
    Tmp,
}

impl AssertionKind {
    /// Integer code used in the database.
    pub fn code(self) -> i64 {
        match self {
            Self::Add => 1,
            Self::Del => 2,
            Self::Tmp => 3,
        }
    }

    /// Decode a stored integer code.
    pub fn from_code(code: i64) -> Result<Self> {
        match code {
            1 => Ok(Self::Add),
            2 => Ok(Self::Del),
            3 => Ok(Self::Tmp),
            other => Err(AutographError::data(format!(
                "unknown assertion kind code {other}"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Registry and assertion records
// ---------------------------------------------------------------------------

/// A producer of assertions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionSource {
    pub id: SourceId,
    pub name: String,
    pub desc: String,
    pub kind: SourceKind,
}

/// A single entity claim from one source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityAssertion {
    pub id: AssertionId,
    pub name: String,
    pub kind: AssertionKind,
    pub source_id: SourceId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_id: Option<TextId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<i64>,
}

/// A single relation claim between two entity assertions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationAssertion {
    pub id: AssertionId,
    pub label: String,
    pub kind: AssertionKind,
    pub source_id: SourceId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_id: Option<TextId>,
    pub head_id: AssertionId,
    pub tail_id: AssertionId,
}

/// Input for inserting an [`EntityAssertion`].
#[derive(Debug, Clone)]
pub struct NewEntityAssertion {
    pub name: String,
    pub kind: AssertionKind,
    pub source_id: SourceId,
    pub text_id: Option<TextId>,
    pub task_id: Option<i64>,
}

/// Input for inserting a [`RelationAssertion`].
#[derive(Debug, Clone)]
pub struct NewRelationAssertion {
    pub label: String,
    pub kind: AssertionKind,
    pub source_id: SourceId,
    pub text_id: Option<TextId>,
    pub task_id: Option<i64>,
    pub head_id: AssertionId,
    pub tail_id: AssertionId,
}

/// Uploaded file metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: FileId,
    pub file_type: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

// ---------------------------------------------------------------------------
// Builds
// ---------------------------------------------------------------------------

/// One immutable, versioned materialization of the graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildSnapshot {
    pub id: BuildId,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

/// Per-build frozen copy of an [`ExtractionSource`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSnapshot {
    pub id: SnapshotId,
    pub build_id: BuildId,
    pub name: String,
    pub desc: String,
    pub kind: SourceKind,
}

// ---------------------------------------------------------------------------
// Persisted node shapes
// ---------------------------------------------------------------------------

/// A file backing a node or edge.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FileInfo {
    pub file_id: FileId,
    pub file_name: String,
    pub file_type: String,
}

/// Files and source snapshots behind a node or an edge.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    pub files: Vec<FileInfo>,
    #[serde(rename = "extractors")]
    pub sources: Vec<SnapshotId>,
}

/// The surviving relation towards one tail node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeInfo {
    #[serde(rename = "name")]
    pub label: String,
    pub files: Vec<FileInfo>,
    #[serde(rename = "extractors")]
    pub sources: Vec<SnapshotId>,
}

/// Persisted out-edge record of a node, keyed by tail name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeOut {
    pub next_nodes: HashMap<String, EdgeInfo>,
}

impl NodeOut {
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|e| AutographError::data(format!("encode node out-edges: {e}")))
    }

    pub fn from_json(s: &str) -> Result<Self> {
        serde_json::from_str(s)
            .map_err(|e| AutographError::data(format!("decode node out-edges: {e}")))
    }
}

impl Provenance {
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|e| AutographError::data(format!("encode node provenance: {e}")))
    }

    pub fn from_json(s: &str) -> Result<Self> {
        serde_json::from_str(s)
            .map_err(|e| AutographError::data(format!("decode node provenance: {e}")))
    }
}

/// A per-build materialized vertex.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub id: NodeId,
    pub build_id: BuildId,
    pub name: String,
    pub out_edges: HashMap<String, EdgeInfo>,
    pub provenance: Provenance,
}
