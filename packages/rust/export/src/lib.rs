//! Export a committed build as two CSV tables.
//!
//! - entities: `version,name,source` with the node provenance as JSON
//! - relations: `version,head,rel,tail`, one row per out-edge
//!
//! Export only reads; a build can be exported any number of times.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::{debug, info, instrument};

use autograph_shared::{AutographError, BuildId, Result};
use autograph_storage::Storage;

/// Serialized tables of one build.
#[derive(Debug, Clone)]
pub struct ExportTables {
    pub build_id: BuildId,
    pub entities: Vec<u8>,
    pub relations: Vec<u8>,
    pub entity_rows: usize,
    pub relation_rows: usize,
}

/// Destination for exported tables.
pub trait ExportSink {
    fn write(&self, tables: &ExportTables) -> Result<()>;
}

/// Writes `build-<id>-entities.csv` and `build-<id>-relations.csv` into a directory.
#[derive(Debug, Clone)]
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn entities_path(&self, build_id: BuildId) -> PathBuf {
        self.dir.join(format!("build-{build_id}-entities.csv"))
    }

    pub fn relations_path(&self, build_id: BuildId) -> PathBuf {
        self.dir.join(format!("build-{build_id}-relations.csv"))
    }
}

impl ExportSink for DirectorySink {
    fn write(&self, tables: &ExportTables) -> Result<()> {
        std::fs::create_dir_all(&self.dir).map_err(|e| AutographError::io(&self.dir, e))?;
        write_file(&self.entities_path(tables.build_id), &tables.entities)?;
        write_file(&self.relations_path(tables.build_id), &tables.relations)?;
        info!(dir = %self.dir.display(), build_id = %tables.build_id, "export written");
        Ok(())
    }
}

fn write_file(path: &Path, bytes: &[u8]) -> Result<()> {
    std::fs::write(path, bytes).map_err(|e| AutographError::io(path, e))
}

/// Read every node of `build_id` and serialize both tables.
#[instrument(skip(storage))]
pub async fn export_build(
    storage: &Storage,
    build_id: BuildId,
    page_size: u32,
) -> Result<ExportTables> {
    if storage.get_build(build_id).await?.is_none() {
        return Err(AutographError::validation(format!(
            "build {build_id} does not exist"
        )));
    }

    let mut entities = csv::Writer::from_writer(vec![]);
    let mut relations = csv::Writer::from_writer(vec![]);
    entities
        .write_record(["version", "name", "source"])
        .map_err(csv_err)?;
    relations
        .write_record(["version", "head", "rel", "tail"])
        .map_err(csv_err)?;

    let version = build_id.to_string();
    let mut entity_rows = 0;
    let mut relation_rows = 0;
    let mut after = None;

    loop {
        let page = storage
            .list_nodes_page(build_id, after, page_size.max(1))
            .await?;
        let Some(last) = page.last() else { break };
        after = Some(last.id);
        debug!(nodes = page.len(), "exporting page");

        for node in &page {
            let source = node.provenance.to_json()?;
            entities
                .write_record([version.as_str(), node.name.as_str(), source.as_str()])
                .map_err(csv_err)?;
            entity_rows += 1;

            let sorted: BTreeMap<&str, &str> = node
                .out_edges
                .iter()
                .filter(|(tail, _)| **tail != node.name)
                .map(|(tail, edge)| (tail.as_str(), edge.label.as_str()))
                .collect();
            for (tail, label) in sorted {
                relations
                    .write_record([version.as_str(), node.name.as_str(), label, tail])
                    .map_err(csv_err)?;
                relation_rows += 1;
            }
        }
    }

    let tables = ExportTables {
        build_id,
        entities: entities
            .into_inner()
            .map_err(|e| AutographError::Export(e.to_string()))?,
        relations: relations
            .into_inner()
            .map_err(|e| AutographError::Export(e.to_string()))?,
        entity_rows,
        relation_rows,
    };
    info!(entity_rows, relation_rows, "build exported");
    Ok(tables)
}

fn csv_err(e: csv::Error) -> AutographError {
    AutographError::Export(e.to_string())
}
