//! Transaction handle for one snapshot build.
//!
//! Everything a build reads and writes goes through the same transaction,
//! so a failed or cancelled build leaves no rows behind.

use std::collections::{BTreeSet, HashMap};

use autograph_shared::{
    AssertionId, AssertionKind, BuildId, BuildSnapshot, EntityAssertion, ExtractionSource, FileId,
    FileInfo, NODE_SCHEMA_VERSION, NodeId, NodeOut, Provenance, RelationAssertion, Result,
    SnapshotId, SourceId, TextId,
};
use chrono::Utc;
use libsql::{Connection, Transaction, TransactionBehavior, params};

use crate::{db_err, id_list, query_sources, row_to_entity, row_to_relation};

/// An open build transaction on a dedicated connection.
pub struct BuildTx {
    tx: Transaction,
}

impl BuildTx {
    pub(crate) async fn begin(conn: Connection) -> Result<Self> {
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .await
            .map_err(db_err)?;
        Ok(Self { tx })
    }

    /// Load the requested sources. Unknown ids are simply absent from the result.
    pub async fn load_sources(&self, ids: &[SourceId]) -> Result<Vec<ExtractionSource>> {
        query_sources(&self.tx, ids).await
    }

    /// Insert the build row.
    pub async fn insert_build(&self, description: &str) -> Result<BuildSnapshot> {
        let created_at = Utc::now();
        self.tx
            .execute(
                "INSERT INTO builds (description, created_at) VALUES (?1, ?2)",
                params![description, created_at.to_rfc3339()],
            )
            .await
            .map_err(db_err)?;

        Ok(BuildSnapshot {
            id: BuildId(self.tx.last_insert_rowid()),
            description: description.to_string(),
            created_at,
        })
    }

    /// Freeze a copy of `source` for this build.
    pub async fn insert_source_snapshot(
        &self,
        build_id: BuildId,
        source: &ExtractionSource,
    ) -> Result<SnapshotId> {
        self.tx
            .execute(
                "INSERT INTO source_snapshots (build_id, source_id, name, description, kind)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    build_id.0,
                    source.id.0,
                    source.name.as_str(),
                    source.desc.as_str(),
                    source.kind.code()
                ],
            )
            .await
            .map_err(db_err)?;
        Ok(SnapshotId(self.tx.last_insert_rowid()))
    }

    /// Distinct names carrying a `Del` assertion from any of `sources`.
    pub async fn deleted_names(&self, sources: &[SourceId]) -> Result<BTreeSet<String>> {
        self.distinct_names(
            "SELECT DISTINCT name FROM entity_assertions
             WHERE source_id IN (SELECT value FROM json_each(?1)) AND kind = ?2",
            sources,
            AssertionKind::Del,
        )
        .await
    }

    /// Distinct names carrying any non-`Tmp` assertion from `sources`.
    pub async fn candidate_names(&self, sources: &[SourceId]) -> Result<BTreeSet<String>> {
        self.distinct_names(
            "SELECT DISTINCT name FROM entity_assertions
             WHERE source_id IN (SELECT value FROM json_each(?1)) AND kind != ?2",
            sources,
            AssertionKind::Tmp,
        )
        .await
    }

    async fn distinct_names(
        &self,
        sql: &str,
        sources: &[SourceId],
        kind: AssertionKind,
    ) -> Result<BTreeSet<String>> {
        let mut rows = self
            .tx
            .query(sql, params![id_list(sources.iter().map(|s| s.0)), kind.code()])
            .await
            .map_err(db_err)?;

        let mut names = BTreeSet::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            names.insert(row.get::<String>(0).map_err(db_err)?);
        }
        Ok(names)
    }

    /// Every entity assertion named `name` from `sources`, of any kind.
    pub async fn entity_assertions_named(
        &self,
        name: &str,
        sources: &[SourceId],
    ) -> Result<Vec<EntityAssertion>> {
        let mut rows = self
            .tx
            .query(
                "SELECT id, name, kind, source_id, text_id, task_id
                 FROM entity_assertions
                 WHERE name = ?1 AND source_id IN (SELECT value FROM json_each(?2))
                 ORDER BY id",
                params![name, id_list(sources.iter().map(|s| s.0))],
            )
            .await
            .map_err(db_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            results.push(row_to_entity(&row)?);
        }
        Ok(results)
    }

    /// Relation assertions from `sources` whose head is one of `head_ids`,
    /// each paired with the name of its tail entity.
    ///
    /// Narrower than every relation headed by `head_ids`: a record from a
    /// source outside the build, `Del` included, never reaches the resolver.
    pub async fn relations_from(
        &self,
        head_ids: &[AssertionId],
        sources: &[SourceId],
    ) -> Result<Vec<(RelationAssertion, String)>> {
        let mut rows = self
            .tx
            .query(
                "SELECT r.id, r.label, r.kind, r.source_id, r.text_id, r.head_id, r.tail_id, t.name
                 FROM relation_assertions r
                 JOIN entity_assertions t ON t.id = r.tail_id
                 WHERE r.head_id IN (SELECT value FROM json_each(?1))
                   AND r.source_id IN (SELECT value FROM json_each(?2))
                 ORDER BY r.id",
                params![
                    id_list(head_ids.iter().map(|h| h.0)),
                    id_list(sources.iter().map(|s| s.0))
                ],
            )
            .await
            .map_err(db_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            let relation = row_to_relation(&row)?;
            let tail_name = row.get::<String>(7).map_err(db_err)?;
            results.push((relation, tail_name));
        }
        Ok(results)
    }

    /// Resolve the owning file of each text that has one.
    pub async fn files_for_texts(&self, text_ids: &[TextId]) -> Result<HashMap<TextId, FileInfo>> {
        let mut files = HashMap::new();
        if text_ids.is_empty() {
            return Ok(files);
        }

        let mut rows = self
            .tx
            .query(
                "SELECT t.id, f.id, f.name, f.file_type
                 FROM texts t JOIN files f ON f.id = t.file_id
                 WHERE t.id IN (SELECT value FROM json_each(?1))",
                params![id_list(text_ids.iter().map(|t| t.0))],
            )
            .await
            .map_err(db_err)?;

        while let Some(row) = rows.next().await.map_err(db_err)? {
            files.insert(
                TextId(row.get::<i64>(0).map_err(db_err)?),
                FileInfo {
                    file_id: FileId(row.get::<i64>(1).map_err(db_err)?),
                    file_name: row.get::<String>(2).map_err(db_err)?,
                    file_type: row.get::<String>(3).map_err(db_err)?,
                },
            );
        }
        Ok(files)
    }

    /// Persist one materialized node.
    pub async fn insert_node(
        &self,
        build_id: BuildId,
        name: &str,
        out: &NodeOut,
        provenance: &Provenance,
    ) -> Result<NodeId> {
        self.tx
            .execute(
                "INSERT INTO nodes (build_id, name, schema_version, out_json, source_json)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    build_id.0,
                    name,
                    NODE_SCHEMA_VERSION,
                    out.to_json()?,
                    provenance.to_json()?
                ],
            )
            .await
            .map_err(db_err)?;
        Ok(NodeId(self.tx.last_insert_rowid()))
    }

    pub async fn commit(self) -> Result<()> {
        self.tx.commit().await.map_err(db_err)
    }

    pub async fn rollback(self) -> Result<()> {
        self.tx.rollback().await.map_err(db_err)
    }
}
