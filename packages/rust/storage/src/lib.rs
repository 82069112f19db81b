//! libSQL storage layer for the Autograph metadata store.
//!
//! The [`Storage`] struct wraps a libSQL database holding files, texts,
//! extraction sources, assertions, and the write-once build tables.
//! Snapshot builds run through a [`BuildTx`] obtained from
//! [`Storage::begin_build`], which owns its own connection and transaction.
//!
//! **Access rules:**
//! - Builder / CLI: read-write via [`Storage::open`]
//! - Downstream readers (export, tagging): read-only via [`Storage::open_readonly`]

mod build_tx;
mod migrations;

use std::collections::HashMap;
use std::path::Path;

use autograph_shared::{
    AssertionId, AssertionKind, AutographError, BuildId, BuildSnapshot, EntityAssertion,
    ExtractionSource, FileId, FileRecord, NewEntityAssertion, NewRelationAssertion, Node, NodeId,
    NodeOut, Provenance, RelationAssertion, Result, SnapshotId, SourceId, SourceKind,
    SourceSnapshot, TextId,
};
use chrono::{DateTime, Utc};
use libsql::{Connection, Database, params};

pub use build_tx::BuildTx;

/// How long a connection waits on a locked database before giving up.
const BUSY_TIMEOUT_MS: u32 = 30_000;

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    db: Database,
    conn: Connection,
    readonly: bool,
}

/// One relation of a human-intervention batch, addressed by entity name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterventionRelation {
    pub subject: String,
    pub predicate: String,
    pub object: String,
    pub kind: AssertionKind,
}

impl Storage {
    /// Open or create a database at `path` in read-write mode.
    pub async fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| AutographError::io(parent, e))?;
            }
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(db_err)?;

        let conn = db.connect().map_err(db_err)?;
        configure_connection(&conn).await?;

        let storage = Self {
            db,
            conn,
            readonly: false,
        };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Open a database at `path` in read-only mode.
    pub async fn open_readonly(path: &Path) -> Result<Self> {
        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(db_err)?;

        let conn = db.connect().map_err(db_err)?;
        configure_connection(&conn).await?;

        Ok(Self {
            db,
            conn,
            readonly: true,
        })
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn
                    .execute_batch(migration.sql)
                    .await
                    .map_err(|e| {
                        AutographError::Storage(format!(
                            "migration v{} failed: {e}",
                            migration.version
                        ))
                    })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    /// Ensure we're in read-write mode before writing.
    fn check_writable(&self) -> Result<()> {
        if self.readonly {
            return Err(AutographError::Storage(
                "database is opened in read-only mode".into(),
            ));
        }
        Ok(())
    }

    /// Start a snapshot build on a dedicated connection.
    ///
    /// The transaction is `IMMEDIATE`, so concurrent builds queue on the
    /// database write lock instead of failing half-way through.
    pub async fn begin_build(&self) -> Result<BuildTx> {
        self.check_writable()?;
        let conn = self.db.connect().map_err(db_err)?;
        configure_connection(&conn).await?;
        BuildTx::begin(conn).await
    }

    // -----------------------------------------------------------------------
    // Source registry
    // -----------------------------------------------------------------------

    /// Register a new extraction source.
    pub async fn insert_source(
        &self,
        name: &str,
        desc: &str,
        kind: SourceKind,
    ) -> Result<ExtractionSource> {
        self.check_writable()?;
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO extraction_sources (name, description, kind, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![name, desc, kind.code(), now.as_str()],
            )
            .await
            .map_err(db_err)?;

        Ok(ExtractionSource {
            id: SourceId(self.conn.last_insert_rowid()),
            name: name.to_string(),
            desc: desc.to_string(),
            kind,
        })
    }

    /// Get a source by ID.
    pub async fn get_source(&self, id: SourceId) -> Result<Option<ExtractionSource>> {
        Ok(query_sources(&self.conn, &[id]).await?.into_iter().next())
    }

    /// List all registered sources, ascending by id.
    pub async fn list_sources(&self) -> Result<Vec<ExtractionSource>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, name, description, kind FROM extraction_sources ORDER BY id",
                params![],
            )
            .await
            .map_err(db_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            results.push(row_to_source(&row)?);
        }
        Ok(results)
    }

    // -----------------------------------------------------------------------
    // File / text metadata
    // -----------------------------------------------------------------------

    /// Insert file metadata. Returns the generated file ID.
    pub async fn insert_file(
        &self,
        name: &str,
        file_type: &str,
        url: Option<&str>,
    ) -> Result<FileId> {
        self.check_writable()?;
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO files (file_type, name, url, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![file_type, name, url, now.as_str()],
            )
            .await
            .map_err(db_err)?;
        Ok(FileId(self.conn.last_insert_rowid()))
    }

    /// Get file metadata by ID.
    pub async fn get_file(&self, id: FileId) -> Result<Option<FileRecord>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, file_type, name, url FROM files WHERE id = ?1",
                params![id.0],
            )
            .await
            .map_err(db_err)?;

        match rows.next().await.map_err(db_err)? {
            Some(row) => Ok(Some(FileRecord {
                id: FileId(row.get::<i64>(0).map_err(db_err)?),
                file_type: row.get::<String>(1).map_err(db_err)?,
                name: row.get::<String>(2).map_err(db_err)?,
                url: row.get::<String>(3).ok(),
            })),
            None => Ok(None),
        }
    }

    /// Insert a text fragment, optionally owned by a file.
    pub async fn insert_text(&self, file_id: Option<FileId>, content: &str) -> Result<TextId> {
        self.check_writable()?;
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO texts (file_id, content, created_at) VALUES (?1, ?2, ?3)",
                params![file_id.map(|f| f.0), content, now.as_str()],
            )
            .await
            .map_err(db_err)?;
        Ok(TextId(self.conn.last_insert_rowid()))
    }

    // -----------------------------------------------------------------------
    // Assertion ingestion
    // -----------------------------------------------------------------------

    /// Insert a batch of entity assertions in one transaction.
    /// Returns the assigned IDs in input order.
    pub async fn insert_entity_assertions(
        &self,
        batch: &[NewEntityAssertion],
    ) -> Result<Vec<AssertionId>> {
        self.check_writable()?;
        let now = Utc::now().to_rfc3339();
        let tx = self.conn.transaction().await.map_err(db_err)?;

        let mut ids = Vec::with_capacity(batch.len());
        for entity in batch {
            insert_entity_row(&tx, entity, &now).await?;
            ids.push(AssertionId(tx.last_insert_rowid()));
        }

        tx.commit().await.map_err(db_err)?;
        Ok(ids)
    }

    /// Insert a batch of relation assertions in one transaction.
    /// Returns the assigned IDs in input order.
    pub async fn insert_relation_assertions(
        &self,
        batch: &[NewRelationAssertion],
    ) -> Result<Vec<AssertionId>> {
        self.check_writable()?;
        if let Some(bad) = batch.iter().find(|r| r.kind == AssertionKind::Tmp) {
            return Err(AutographError::validation(format!(
                "relation '{}' cannot have kind Tmp",
                bad.label
            )));
        }

        let now = Utc::now().to_rfc3339();
        let tx = self.conn.transaction().await.map_err(db_err)?;

        let mut ids = Vec::with_capacity(batch.len());
        for relation in batch {
            insert_relation_row(&tx, relation, &now).await?;
            ids.push(AssertionId(tx.last_insert_rowid()));
        }

        tx.commit().await.map_err(db_err)?;
        Ok(ids)
    }

    /// Write one human-intervention batch atomically: a new
    /// `HumanIntervention` source, its entity assertions, and relations
    /// between them. Every relation endpoint must appear in `entities`.
    pub async fn insert_intervention(
        &self,
        source_name: &str,
        source_desc: &str,
        entities: &[(String, AssertionKind)],
        relations: &[InterventionRelation],
    ) -> Result<ExtractionSource> {
        self.check_writable()?;
        let now = Utc::now().to_rfc3339();
        let tx = self.conn.transaction().await.map_err(db_err)?;

        tx.execute(
            "INSERT INTO extraction_sources (name, description, kind, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                source_name,
                source_desc,
                SourceKind::HumanIntervention.code(),
                now.as_str()
            ],
        )
        .await
        .map_err(db_err)?;
        let source_id = SourceId(tx.last_insert_rowid());

        let mut ids: HashMap<&str, AssertionId> = HashMap::with_capacity(entities.len());
        for (name, kind) in entities {
            let entity = NewEntityAssertion {
                name: name.clone(),
                kind: *kind,
                source_id,
                text_id: None,
                task_id: None,
            };
            insert_entity_row(&tx, &entity, &now).await?;
            ids.insert(name.as_str(), AssertionId(tx.last_insert_rowid()));
        }

        for rel in relations {
            let (Some(head_id), Some(tail_id)) = (
                ids.get(rel.subject.as_str()).copied(),
                ids.get(rel.object.as_str()).copied(),
            ) else {
                // Dropping `tx` rolls the batch back.
                return Err(AutographError::validation(format!(
                    "relation <{}, {}, {}> references an entity outside the batch",
                    rel.subject, rel.predicate, rel.object
                )));
            };
            let relation = NewRelationAssertion {
                label: rel.predicate.clone(),
                kind: rel.kind,
                source_id,
                text_id: None,
                task_id: None,
                head_id,
                tail_id,
            };
            insert_relation_row(&tx, &relation, &now).await?;
        }

        tx.commit().await.map_err(db_err)?;

        Ok(ExtractionSource {
            id: source_id,
            name: source_name.to_string(),
            desc: source_desc.to_string(),
            kind: SourceKind::HumanIntervention,
        })
    }

    /// List the entity assertions of one source, ascending by id.
    pub async fn list_entity_assertions(&self, source_id: SourceId) -> Result<Vec<EntityAssertion>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, name, kind, source_id, text_id, task_id
                 FROM entity_assertions WHERE source_id = ?1 ORDER BY id",
                params![source_id.0],
            )
            .await
            .map_err(db_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            results.push(row_to_entity(&row)?);
        }
        Ok(results)
    }

    /// List the relation assertions of one source, ascending by id.
    pub async fn list_relation_assertions(
        &self,
        source_id: SourceId,
    ) -> Result<Vec<RelationAssertion>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, label, kind, source_id, text_id, head_id, tail_id
                 FROM relation_assertions WHERE source_id = ?1 ORDER BY id",
                params![source_id.0],
            )
            .await
            .map_err(db_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            results.push(row_to_relation(&row)?);
        }
        Ok(results)
    }

    // -----------------------------------------------------------------------
    // Build reads
    // -----------------------------------------------------------------------

    /// Get a committed build by ID.
    pub async fn get_build(&self, id: BuildId) -> Result<Option<BuildSnapshot>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, description, created_at FROM builds WHERE id = ?1",
                params![id.0],
            )
            .await
            .map_err(db_err)?;

        match rows.next().await.map_err(db_err)? {
            Some(row) => Ok(Some(row_to_build(&row)?)),
            None => Ok(None),
        }
    }

    /// List all committed builds, ascending by id.
    pub async fn list_builds(&self) -> Result<Vec<BuildSnapshot>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, description, created_at FROM builds ORDER BY id",
                params![],
            )
            .await
            .map_err(db_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            results.push(row_to_build(&row)?);
        }
        Ok(results)
    }

    /// List the source snapshots frozen by a build.
    pub async fn list_source_snapshots(&self, build_id: BuildId) -> Result<Vec<SourceSnapshot>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, build_id, name, description, kind
                 FROM source_snapshots WHERE build_id = ?1 ORDER BY id",
                params![build_id.0],
            )
            .await
            .map_err(db_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            results.push(SourceSnapshot {
                id: SnapshotId(row.get::<i64>(0).map_err(db_err)?),
                build_id: BuildId(row.get::<i64>(1).map_err(db_err)?),
                name: row.get::<String>(2).map_err(db_err)?,
                desc: row.get::<String>(3).map_err(db_err)?,
                kind: SourceKind::from_code(row.get::<i64>(4).map_err(db_err)?)?,
            });
        }
        Ok(results)
    }

    /// Get one node of a build by entity name.
    pub async fn get_node(&self, build_id: BuildId, name: &str) -> Result<Option<Node>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, build_id, name, out_json, source_json
                 FROM nodes WHERE build_id = ?1 AND name = ?2",
                params![build_id.0, name],
            )
            .await
            .map_err(db_err)?;

        match rows.next().await.map_err(db_err)? {
            Some(row) => Ok(Some(row_to_node(&row)?)),
            None => Ok(None),
        }
    }

    /// Read one page of a build's nodes in id order, starting after `after`.
    pub async fn list_nodes_page(
        &self,
        build_id: BuildId,
        after: Option<NodeId>,
        limit: u32,
    ) -> Result<Vec<Node>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, build_id, name, out_json, source_json
                 FROM nodes WHERE build_id = ?1 AND id > ?2
                 ORDER BY id LIMIT ?3",
                params![build_id.0, after.map(|n| n.0).unwrap_or(0), limit],
            )
            .await
            .map_err(db_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            results.push(row_to_node(&row)?);
        }
        Ok(results)
    }

    /// Number of nodes materialized by a build.
    pub async fn count_nodes(&self, build_id: BuildId) -> Result<u64> {
        let mut rows = self
            .conn
            .query(
                "SELECT COUNT(*) FROM nodes WHERE build_id = ?1",
                params![build_id.0],
            )
            .await
            .map_err(db_err)?;

        match rows.next().await.map_err(db_err)? {
            Some(row) => Ok(row.get::<i64>(0).map_err(db_err)?.max(0) as u64),
            None => Ok(0),
        }
    }
}

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

pub(crate) fn db_err(e: libsql::Error) -> AutographError {
    AutographError::Storage(e.to_string())
}

async fn configure_connection(conn: &Connection) -> Result<()> {
    // PRAGMA busy_timeout echoes the new value as a row.
    conn.query(&format!("PRAGMA busy_timeout = {BUSY_TIMEOUT_MS}"), params![])
        .await
        .map_err(db_err)?;
    Ok(())
}

/// Encode ids as a JSON array for `json_each(?)` membership tests.
pub(crate) fn id_list(ids: impl IntoIterator<Item = i64>) -> String {
    serde_json::Value::from(ids.into_iter().collect::<Vec<i64>>()).to_string()
}

pub(crate) fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| AutographError::data(format!("invalid timestamp '{s}': {e}")))
}

pub(crate) async fn query_sources(
    conn: &Connection,
    ids: &[SourceId],
) -> Result<Vec<ExtractionSource>> {
    let mut rows = conn
        .query(
            "SELECT id, name, description, kind FROM extraction_sources
             WHERE id IN (SELECT value FROM json_each(?1)) ORDER BY id",
            params![id_list(ids.iter().map(|id| id.0))],
        )
        .await
        .map_err(db_err)?;

    let mut results = Vec::new();
    while let Some(row) = rows.next().await.map_err(db_err)? {
        results.push(row_to_source(&row)?);
    }
    Ok(results)
}

async fn insert_entity_row(conn: &Connection, entity: &NewEntityAssertion, now: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO entity_assertions (name, kind, source_id, text_id, task_id, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            entity.name.as_str(),
            entity.kind.code(),
            entity.source_id.0,
            entity.text_id.map(|t| t.0),
            entity.task_id,
            now
        ],
    )
    .await
    .map_err(db_err)?;
    Ok(())
}

async fn insert_relation_row(
    conn: &Connection,
    relation: &NewRelationAssertion,
    now: &str,
) -> Result<()> {
    conn.execute(
        "INSERT INTO relation_assertions
           (label, kind, source_id, text_id, task_id, head_id, tail_id, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            relation.label.as_str(),
            relation.kind.code(),
            relation.source_id.0,
            relation.text_id.map(|t| t.0),
            relation.task_id,
            relation.head_id.0,
            relation.tail_id.0,
            now
        ],
    )
    .await
    .map_err(db_err)?;
    Ok(())
}

fn row_to_source(row: &libsql::Row) -> Result<ExtractionSource> {
    Ok(ExtractionSource {
        id: SourceId(row.get::<i64>(0).map_err(db_err)?),
        name: row.get::<String>(1).map_err(db_err)?,
        desc: row.get::<String>(2).map_err(db_err)?,
        kind: SourceKind::from_code(row.get::<i64>(3).map_err(db_err)?)?,
    })
}

/// Columns: id, name, kind, source_id, text_id, task_id.
pub(crate) fn row_to_entity(row: &libsql::Row) -> Result<EntityAssertion> {
    Ok(EntityAssertion {
        id: AssertionId(row.get::<i64>(0).map_err(db_err)?),
        name: row.get::<String>(1).map_err(db_err)?,
        kind: AssertionKind::from_code(row.get::<i64>(2).map_err(db_err)?)?,
        source_id: SourceId(row.get::<i64>(3).map_err(db_err)?),
        text_id: row.get::<i64>(4).ok().map(TextId),
        task_id: row.get::<i64>(5).ok(),
    })
}

/// Columns: id, label, kind, source_id, text_id, head_id, tail_id.
pub(crate) fn row_to_relation(row: &libsql::Row) -> Result<RelationAssertion> {
    Ok(RelationAssertion {
        id: AssertionId(row.get::<i64>(0).map_err(db_err)?),
        label: row.get::<String>(1).map_err(db_err)?,
        kind: AssertionKind::from_code(row.get::<i64>(2).map_err(db_err)?)?,
        source_id: SourceId(row.get::<i64>(3).map_err(db_err)?),
        text_id: row.get::<i64>(4).ok().map(TextId),
        head_id: AssertionId(row.get::<i64>(5).map_err(db_err)?),
        tail_id: AssertionId(row.get::<i64>(6).map_err(db_err)?),
    })
}

fn row_to_build(row: &libsql::Row) -> Result<BuildSnapshot> {
    let created_at: String = row.get(2).map_err(db_err)?;
    Ok(BuildSnapshot {
        id: BuildId(row.get::<i64>(0).map_err(db_err)?),
        description: row.get::<String>(1).map_err(db_err)?,
        created_at: parse_timestamp(&created_at)?,
    })
}

/// Convert a node row, decoding its typed out-edge and provenance records.
fn row_to_node(row: &libsql::Row) -> Result<Node> {
    let name: String = row.get(2).map_err(db_err)?;
    let out_json: String = row.get(3).map_err(db_err)?;
    let source_json: String = row.get(4).map_err(db_err)?;

    let out = NodeOut::from_json(&out_json)
        .map_err(|e| AutographError::data(format!("node '{name}': {e}")))?;
    let provenance = Provenance::from_json(&source_json)
        .map_err(|e| AutographError::data(format!("node '{name}': {e}")))?;

    Ok(Node {
        id: NodeId(row.get::<i64>(0).map_err(db_err)?),
        build_id: BuildId(row.get::<i64>(1).map_err(db_err)?),
        name,
        out_edges: out.next_nodes,
        provenance,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    /// Create a temp file storage for testing.
    async fn test_storage() -> Storage {
        let tmp = std::env::temp_dir().join(format!("ag_test_{}.db", Uuid::now_v7()));
        Storage::open(&tmp).await.expect("open test db")
    }

    #[tokio::test]
    async fn open_and_migrate() {
        let storage = test_storage().await;
        let version = storage.get_schema_version().await;
        assert_eq!(version, 1);
    }

    #[tokio::test]
    async fn idempotent_migration() {
        let tmp = std::env::temp_dir().join(format!("ag_test_{}.db", Uuid::now_v7()));
        let _s1 = Storage::open(&tmp).await.expect("first open");
        drop(_s1);
        let s2 = Storage::open(&tmp).await.expect("second open");
        assert_eq!(s2.get_schema_version().await, 1);
    }

    #[tokio::test]
    async fn source_registry() {
        let storage = test_storage().await;
        let model = storage
            .insert_source("ner-v1", "baseline NER", SourceKind::Model)
            .await
            .expect("insert source");
        let human = storage
            .insert_source("review", "curator fixes", SourceKind::HumanIntervention)
            .await
            .expect("insert source");

        let found = storage.get_source(human.id).await.expect("get source");
        assert_eq!(found, Some(human.clone()));
        assert!(storage.get_source(SourceId(999)).await.unwrap().is_none());

        let all = storage.list_sources().await.expect("list sources");
        assert_eq!(all, vec![model, human]);
    }

    #[tokio::test]
    async fn file_and_text_metadata() {
        let storage = test_storage().await;
        let file_id = storage
            .insert_file("report", "pdf", Some("/raw/report"))
            .await
            .expect("insert file");
        let file = storage.get_file(file_id).await.unwrap().expect("file");
        assert_eq!(file.name, "report");
        assert_eq!(file.file_type, "pdf");
        assert_eq!(file.url.as_deref(), Some("/raw/report"));

        let t1 = storage.insert_text(Some(file_id), "first").await.unwrap();
        let t2 = storage.insert_text(None, "orphan").await.unwrap();
        assert_ne!(t1, t2);
    }

    #[tokio::test]
    async fn assertion_batches_keep_input_order() {
        let storage = test_storage().await;
        let source = storage
            .insert_source("ner", "", SourceKind::Model)
            .await
            .unwrap();

        let entities: Vec<_> = ["A", "B", "C"]
            .iter()
            .map(|name| NewEntityAssertion {
                name: (*name).into(),
                kind: AssertionKind::Add,
                source_id: source.id,
                text_id: None,
                task_id: Some(7),
            })
            .collect();
        let ids = storage
            .insert_entity_assertions(&entities)
            .await
            .expect("insert entities");
        assert_eq!(ids.len(), 3);

        let rels = vec![NewRelationAssertion {
            label: "knows".into(),
            kind: AssertionKind::Add,
            source_id: source.id,
            text_id: None,
            task_id: None,
            head_id: ids[0],
            tail_id: ids[2],
        }];
        storage
            .insert_relation_assertions(&rels)
            .await
            .expect("insert relations");

        let stored = storage.list_entity_assertions(source.id).await.unwrap();
        let names: Vec<_> = stored.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["A", "B", "C"]);
        assert_eq!(stored[0].id, ids[0]);
        assert_eq!(stored[0].task_id, Some(7));

        let stored = storage.list_relation_assertions(source.id).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].head_id, ids[0]);
        assert_eq!(stored[0].tail_id, ids[2]);
    }

    #[tokio::test]
    async fn tmp_relations_are_rejected() {
        let storage = test_storage().await;
        let source = storage
            .insert_source("ner", "", SourceKind::Model)
            .await
            .unwrap();
        let rels = vec![NewRelationAssertion {
            label: "knows".into(),
            kind: AssertionKind::Tmp,
            source_id: source.id,
            text_id: None,
            task_id: None,
            head_id: AssertionId(1),
            tail_id: AssertionId(2),
        }];
        let err = storage.insert_relation_assertions(&rels).await.unwrap_err();
        assert!(matches!(err, AutographError::Validation { .. }));
    }

    #[tokio::test]
    async fn intervention_batch_is_atomic() {
        let storage = test_storage().await;
        let entities = vec![("A".to_string(), AssertionKind::Tmp)];
        let relations = vec![InterventionRelation {
            subject: "A".into(),
            predicate: "likes".into(),
            object: "Missing".into(),
            kind: AssertionKind::Add,
        }];

        let err = storage
            .insert_intervention("fix", "fix", &entities, &relations)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("outside the batch"));
        assert!(storage.list_sources().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn empty_build_reads() {
        let storage = test_storage().await;
        assert!(storage.list_builds().await.unwrap().is_empty());
        assert!(storage.get_build(BuildId(1)).await.unwrap().is_none());
        assert_eq!(storage.count_nodes(BuildId(1)).await.unwrap(), 0);
        assert!(
            storage
                .list_nodes_page(BuildId(1), None, 10)
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn readonly_rejects_writes() {
        let tmp = std::env::temp_dir().join(format!("ag_test_{}.db", Uuid::now_v7()));
        let rw = Storage::open(&tmp).await.unwrap();
        rw.insert_source("ner", "", SourceKind::Model).await.unwrap();
        drop(rw);

        let ro = Storage::open_readonly(&tmp).await.unwrap();
        let result = ro.insert_source("ner2", "", SourceKind::Model).await;
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("read-only"));
        assert!(ro.begin_build().await.is_err());
    }
}
