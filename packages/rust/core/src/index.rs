//! In-memory view of one build for fast entity and relation lookups.

use std::collections::{BTreeSet, HashMap};

use tracing::{debug, instrument};

use autograph_shared::{AutographError, BuildId, Result};
use autograph_storage::Storage;

/// Entity vocabulary and `(head, tail) → label` map of one build.
#[derive(Debug, Clone, Default)]
pub struct GraphIndex {
    pub build_id: Option<BuildId>,
    entities: BTreeSet<String>,
    relations: HashMap<(String, String), String>,
}

impl GraphIndex {
    /// Read every node of `build_id`, `page_size` nodes at a time.
    #[instrument(skip(storage))]
    pub async fn load(storage: &Storage, build_id: BuildId, page_size: u32) -> Result<Self> {
        if storage.get_build(build_id).await?.is_none() {
            return Err(AutographError::validation(format!(
                "build {build_id} does not exist"
            )));
        }

        let mut index = Self {
            build_id: Some(build_id),
            ..Self::default()
        };
        let mut after = None;
        loop {
            let page = storage
                .list_nodes_page(build_id, after, page_size.max(1))
                .await?;
            let Some(last) = page.last() else { break };
            after = Some(last.id);

            for node in page {
                for (tail, edge) in node.out_edges {
                    index.relations.insert((node.name.clone(), tail), edge.label);
                }
                index.entities.insert(node.name);
            }
        }

        debug!(
            entities = index.entities.len(),
            relations = index.relations.len(),
            "graph index loaded"
        );
        Ok(index)
    }

    pub fn contains_entity(&self, name: &str) -> bool {
        self.entities.contains(name)
    }

    /// Label of the edge from `head` to `tail`, if the build has one.
    pub fn relation(&self, head: &str, tail: &str) -> Option<&str> {
        self.relations
            .get(&(head.to_string(), tail.to_string()))
            .map(String::as_str)
    }

    /// Entity names in ascending order.
    pub fn entities(&self) -> impl Iterator<Item = &str> {
        self.entities.iter().map(String::as_str)
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    pub fn relation_count(&self) -> usize {
        self.relations.len()
    }
}
