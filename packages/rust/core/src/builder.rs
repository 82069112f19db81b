//! Snapshot builder: materialize one immutable, versioned graph from the
//! assertions of a chosen set of sources.
//!
//! A build runs entirely inside one [`BuildTx`]:
//!
//! 1. Validate the requested sources
//! 2. Create the build row
//! 3. Freeze a snapshot of every source
//! 4. Collect names deleted by human-intervention sources
//! 5. Collect selected names (non-`Tmp`, minus deleted)
//! 6. Build and persist one node per selected name
//! 7. Commit
//!
//! Any failure or cancellation rolls the whole build back.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::time::Instant;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use futures::{FutureExt, StreamExt, stream};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use autograph_shared::{
    AppConfig, AssertionId, AutographError, BuildId, ExtractionSource, NodeOut, Provenance,
    RelationAssertion, Result, SnapshotId, SourceId, SourceKind, TextId,
};
use autograph_storage::{BuildTx, Storage};

use crate::provenance;
use crate::resolver;

const STEP_VALIDATE: &str = "validate sources";
const STEP_CREATE_BUILD: &str = "create build";
const STEP_SNAPSHOT: &str = "snapshot sources";
const STEP_DELETED: &str = "collect deleted entities";
const STEP_SELECTED: &str = "collect selected entities";
const STEP_NODES: &str = "create nodes";
const STEP_COMMIT: &str = "commit";

/// What to build.
#[derive(Debug, Clone)]
pub struct BuildRequest {
    /// Sources whose assertions are in scope. Duplicates are collapsed.
    pub source_ids: Vec<SourceId>,
    /// Free-form description stored on the build row.
    pub description: String,
}

/// Runtime tuning for a build.
#[derive(Debug, Clone)]
pub struct BuildSettings {
    /// Maximum number of node computations in flight.
    pub concurrency: usize,
}

impl Default for BuildSettings {
    fn default() -> Self {
        Self { concurrency: 8 }
    }
}

impl From<&AppConfig> for BuildSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            concurrency: config.build.concurrency.max(1) as usize,
        }
    }
}

/// Progress callback for reporting build status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called after each node is persisted.
    fn node_built(&self, name: &str, current: usize, total: usize);
    /// Called once the build has committed.
    fn done(&self, result: &BuildResult);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn node_built(&self, _name: &str, _current: usize, _total: usize) {}
    fn done(&self, _result: &BuildResult) {}
}

/// Everything a build needs besides the request itself.
pub struct BuildContext<'a> {
    pub storage: &'a Storage,
    pub settings: BuildSettings,
    pub cancel: CancellationToken,
    pub progress: &'a dyn ProgressReporter,
}

impl<'a> BuildContext<'a> {
    /// Default settings, a fresh token, and no progress output.
    pub fn new(storage: &'a Storage) -> Self {
        Self {
            storage,
            settings: BuildSettings::default(),
            cancel: CancellationToken::new(),
            progress: &SilentProgress,
        }
    }

    pub fn with_settings(mut self, settings: BuildSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_progress(mut self, progress: &'a dyn ProgressReporter) -> Self {
        self.progress = progress;
        self
    }
}

/// Outcome of a committed build.
#[derive(Debug, Clone, Serialize)]
pub struct BuildResult {
    pub build_id: BuildId,
    /// Source id → the snapshot frozen for it by this build.
    pub source_snapshot_map: BTreeMap<SourceId, SnapshotId>,
    pub deleted_names: BTreeSet<String>,
    pub selected_names: BTreeSet<String>,
    pub node_count: usize,
    pub start_time: DateTime<Utc>,
    pub finish_time: DateTime<Utc>,
}

/// Build-wide facts shared by every node computation.
struct Scope {
    sources: Vec<SourceId>,
    selected: BTreeSet<String>,
    snapshots: HashMap<SourceId, SnapshotId>,
}

struct Draft {
    build_id: BuildId,
    start_time: DateTime<Utc>,
    snapshots: BTreeMap<SourceId, SnapshotId>,
    deleted: BTreeSet<String>,
    selected: BTreeSet<String>,
    node_count: usize,
}

/// Run one snapshot build.
///
/// Returns [`AutographError::Cancelled`] if `ctx.cancel` fires before the
/// commit; every other failure comes back as [`AutographError::BuildStep`].
/// Either way nothing of the build is left in storage.
#[instrument(skip_all, fields(sources = request.source_ids.len(), desc = %request.description))]
pub async fn build_snapshot(ctx: &BuildContext<'_>, request: &BuildRequest) -> Result<BuildResult> {
    let started = Instant::now();

    if request.source_ids.is_empty() {
        return Err(AutographError::in_step(
            STEP_VALIDATE,
            AutographError::validation("a build needs at least one source id"),
        ));
    }

    let tx = ctx
        .storage
        .begin_build()
        .await
        .map_err(|e| AutographError::in_step(STEP_CREATE_BUILD, e))?;

    let outcome = tokio::select! {
        biased;
        _ = ctx.cancel.cancelled() => Err(AutographError::Cancelled),
        r = run_build(&tx, ctx, request) => r,
    };

    let draft = match outcome {
        Ok(draft) => draft,
        Err(e) => {
            if let Err(rb) = tx.rollback().await {
                warn!(error = %rb, "rollback failed");
            }
            match &e {
                AutographError::Cancelled => info!("build cancelled, rolled back"),
                other => warn!(error = %other, "build failed, rolled back"),
            }
            return Err(e);
        }
    };

    tx.commit()
        .await
        .map_err(|e| AutographError::in_step(STEP_COMMIT, e))?;

    let result = BuildResult {
        build_id: draft.build_id,
        source_snapshot_map: draft.snapshots,
        deleted_names: draft.deleted,
        selected_names: draft.selected,
        node_count: draft.node_count,
        start_time: draft.start_time,
        finish_time: Utc::now(),
    };

    info!(
        build_id = %result.build_id,
        nodes = result.node_count,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "build committed"
    );
    ctx.progress.done(&result);
    Ok(result)
}

async fn run_build(tx: &BuildTx, ctx: &BuildContext<'_>, request: &BuildRequest) -> Result<Draft> {
    // --- Step 1: Validate sources ---
    ctx.progress.phase("Validating sources");
    let source_ids: Vec<SourceId> = request
        .source_ids
        .iter()
        .copied()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let sources = validate_sources(tx, &source_ids)
        .await
        .map_err(step(STEP_VALIDATE))?;

    // --- Step 2: Build row ---
    ctx.progress.phase("Creating build");
    let build = tx
        .insert_build(&request.description)
        .await
        .map_err(step(STEP_CREATE_BUILD))?;

    // --- Step 3: Source snapshots ---
    ctx.progress.phase("Snapshotting sources");
    let mut snapshots = BTreeMap::new();
    for source in &sources {
        let snapshot_id = tx
            .insert_source_snapshot(build.id, source)
            .await
            .map_err(step(STEP_SNAPSHOT))?;
        snapshots.insert(source.id, snapshot_id);
    }

    // --- Step 4: Deleted names ---
    ctx.progress.phase("Collecting deleted entities");
    let human_ids: Vec<SourceId> = sources
        .iter()
        .filter(|s| s.kind == SourceKind::HumanIntervention)
        .map(|s| s.id)
        .collect();
    let deleted = tx
        .deleted_names(&human_ids)
        .await
        .map_err(step(STEP_DELETED))?;
    info!(deleted = ?deleted, "collected deleted entities");

    // --- Step 5: Selected names ---
    ctx.progress.phase("Collecting selected entities");
    let mut selected = tx
        .candidate_names(&source_ids)
        .await
        .map_err(step(STEP_SELECTED))?;
    selected.retain(|name| !deleted.contains(name));
    info!(selected = selected.len(), "collected selected entities");

    // --- Step 6: Nodes ---
    ctx.progress.phase("Creating nodes");
    let scope = Scope {
        sources: source_ids,
        selected,
        snapshots: snapshots.iter().map(|(s, snap)| (*s, *snap)).collect(),
    };
    let node_count = create_nodes(tx, ctx, build.id, &scope)
        .await
        .map_err(|e| match e {
            AutographError::Cancelled => e,
            other => AutographError::in_step(STEP_NODES, other),
        })?;

    Ok(Draft {
        build_id: build.id,
        start_time: build.created_at,
        snapshots,
        deleted,
        selected: scope.selected,
        node_count,
    })
}

fn step(name: &'static str) -> impl FnOnce(AutographError) -> AutographError {
    move |e| AutographError::in_step(name, e)
}

/// Reject a request naming unknown sources.
async fn validate_sources(
    tx: &BuildTx,
    source_ids: &[SourceId],
) -> Result<Vec<ExtractionSource>> {
    let sources = tx.load_sources(source_ids).await?;
    if sources.len() != source_ids.len() {
        let known: BTreeSet<SourceId> = sources.iter().map(|s| s.id).collect();
        let missing: Vec<String> = source_ids
            .iter()
            .filter(|id| !known.contains(id))
            .map(|id| id.to_string())
            .collect();
        return Err(AutographError::validation(format!(
            "unknown source id(s): {}",
            missing.join(", ")
        )));
    }
    Ok(sources)
}

/// Compute nodes through a bounded pool and persist them one at a time.
async fn create_nodes(
    tx: &BuildTx,
    ctx: &BuildContext<'_>,
    build_id: BuildId,
    scope: &Scope,
) -> Result<usize> {
    let total = scope.selected.len();
    let concurrency = ctx.settings.concurrency.max(1);

    let mut pending = stream::iter(scope.selected.iter())
        .map(|name| node_task(tx, scope, name))
        .buffer_unordered(concurrency);

    let mut done = 0;
    while let Some(computed) = pending.next().await {
        if ctx.cancel.is_cancelled() {
            return Err(AutographError::Cancelled);
        }
        let (name, out, prov) = computed?;
        tx.insert_node(build_id, name, &out, &prov).await?;
        done += 1;
        debug!(node = %name, edges = out.next_nodes.len(), "node created");
        ctx.progress.node_built(name, done, total);
    }
    Ok(done)
}

type NodeTask<'a> = BoxFuture<'a, Result<(&'a str, NodeOut, Provenance)>>;

// Boxed so the pool's future stays `Send` for callers that spawn builds.
fn node_task<'a>(tx: &'a BuildTx, scope: &'a Scope, name: &'a str) -> NodeTask<'a> {
    async move {
        let (out, prov) = compute_node(tx, scope, name).await?;
        Ok((name, out, prov))
    }
    .boxed()
}

/// Read everything known about `name` and fold it into one node.
async fn compute_node(tx: &BuildTx, scope: &Scope, name: &str) -> Result<(NodeOut, Provenance)> {
    let entities = tx.entity_assertions_named(name, &scope.sources).await?;
    let head_ids: Vec<AssertionId> = entities.iter().map(|e| e.id).collect();
    let relations = tx.relations_from(&head_ids, &scope.sources).await?;

    let mut by_tail: BTreeMap<&str, Vec<&RelationAssertion>> = BTreeMap::new();
    for (relation, tail_name) in &relations {
        if scope.selected.contains(tail_name) {
            by_tail.entry(tail_name.as_str()).or_default().push(relation);
        }
    }

    let text_ids: Vec<TextId> = entities
        .iter()
        .filter_map(|e| e.text_id)
        .chain(by_tail.values().flatten().filter_map(|r| r.text_id))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let files = tx.files_for_texts(&text_ids).await?;

    let mut out = NodeOut::default();
    for (tail, records) in &by_tail {
        if let Some(edge) = resolver::resolve_edge(records, &files, &scope.snapshots) {
            out.next_nodes.insert((*tail).to_string(), edge);
        }
    }
    let prov = provenance::aggregate(&entities, &files, &scope.snapshots);

    Ok((out, prov))
}
