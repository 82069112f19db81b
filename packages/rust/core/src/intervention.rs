//! Human intervention: turn a batch of manual corrections into the
//! assertions of a new `HumanIntervention` source.

use std::collections::BTreeMap;

use chrono::Utc;
use serde::Deserialize;
use tracing::{info, instrument};

use autograph_shared::{AssertionKind, ExtractionSource, Result};
use autograph_storage::{InterventionRelation, Storage};

/// A `(subject, predicate, object)` relation addressed by entity names.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Deserialize)]
pub struct Triple {
    pub subject: String,
    pub predicate: String,
    pub object: String,
}

/// One batch of manual corrections.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Intervention {
    #[serde(default, rename = "add_entity")]
    pub add_entities: Vec<String>,
    #[serde(default, rename = "del_entity")]
    pub del_entities: Vec<String>,
    #[serde(default, rename = "add_relation")]
    pub add_relations: Vec<Triple>,
    #[serde(default, rename = "del_relation")]
    pub del_relations: Vec<Triple>,
}

/// The assertions an [`Intervention`] turns into.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct InterventionPlan {
    pub entities: Vec<(String, AssertionKind)>,
    pub relations: Vec<InterventionRelation>,
}

impl Intervention {
    pub fn is_empty(&self) -> bool {
        self.add_entities.is_empty()
            && self.del_entities.is_empty()
            && self.add_relations.is_empty()
            && self.del_relations.is_empty()
    }

    /// Resolve the batch into assertions.
    ///
    /// Relation endpoints become `Tmp` entities unless named explicitly.
    /// A deletion overrides an addition of the same entity or triple.
    pub fn plan(&self) -> InterventionPlan {
        let mut entities: BTreeMap<&str, AssertionKind> = BTreeMap::new();
        for triple in self.add_relations.iter().chain(&self.del_relations) {
            entities.entry(triple.subject.as_str()).or_insert(AssertionKind::Tmp);
            entities.entry(triple.object.as_str()).or_insert(AssertionKind::Tmp);
        }
        for name in &self.add_entities {
            entities.insert(name.as_str(), AssertionKind::Add);
        }
        for name in &self.del_entities {
            entities.insert(name.as_str(), AssertionKind::Del);
        }

        let mut relations: BTreeMap<&Triple, AssertionKind> = BTreeMap::new();
        for triple in &self.add_relations {
            relations.insert(triple, AssertionKind::Add);
        }
        for triple in &self.del_relations {
            relations.insert(triple, AssertionKind::Del);
        }

        InterventionPlan {
            entities: entities
                .into_iter()
                .map(|(name, kind)| (name.to_string(), kind))
                .collect(),
            relations: relations
                .into_iter()
                .map(|(t, kind)| InterventionRelation {
                    subject: t.subject.clone(),
                    predicate: t.predicate.clone(),
                    object: t.object.clone(),
                    kind,
                })
                .collect(),
        }
    }
}

/// Record `intervention` as a new source. Returns `None` for an empty batch.
#[instrument(skip_all)]
pub async fn record_intervention(
    storage: &Storage,
    intervention: &Intervention,
) -> Result<Option<ExtractionSource>> {
    if intervention.is_empty() {
        return Ok(None);
    }

    let plan = intervention.plan();
    let name = format!("human-intervention {}", Utc::now().to_rfc3339());
    let desc = format!(
        "{} entity and {} relation corrections",
        plan.entities.len(),
        plan.relations.len()
    );
    let source = storage
        .insert_intervention(&name, &desc, &plan.entities, &plan.relations)
        .await?;

    info!(
        source_id = %source.id,
        entities = plan.entities.len(),
        relations = plan.relations.len(),
        "recorded intervention"
    );
    Ok(Some(source))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{BuildContext, BuildRequest, build_snapshot};
    use autograph_shared::{NewEntityAssertion, NewRelationAssertion, SourceKind};
    use uuid::Uuid;

    fn triple(s: &str, p: &str, o: &str) -> Triple {
        Triple {
            subject: s.into(),
            predicate: p.into(),
            object: o.into(),
        }
    }

    #[test]
    fn parses_correction_file() {
        let json = r#"{
            "add_entity": ["A"],
            "del_relation": [{"subject": "A", "predicate": "likes", "object": "B"}]
        }"#;
        let parsed: Intervention = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.add_entities, ["A"]);
        assert!(parsed.del_entities.is_empty());
        assert_eq!(parsed.del_relations, [triple("A", "likes", "B")]);
    }

    #[test]
    fn endpoints_become_tmp_and_deletion_wins() {
        let intervention = Intervention {
            add_entities: vec!["A".into(), "C".into()],
            del_entities: vec!["C".into()],
            add_relations: vec![triple("A", "likes", "B"), triple("B", "likes", "A")],
            del_relations: vec![triple("A", "likes", "B")],
        };
        let plan = intervention.plan();

        assert_eq!(
            plan.entities,
            vec![
                ("A".to_string(), AssertionKind::Add),
                ("B".to_string(), AssertionKind::Tmp),
                ("C".to_string(), AssertionKind::Del),
            ]
        );
        let kinds: Vec<_> = plan
            .relations
            .iter()
            .map(|r| (r.subject.as_str(), r.object.as_str(), r.kind))
            .collect();
        assert_eq!(
            kinds,
            vec![("A", "B", AssertionKind::Del), ("B", "A", AssertionKind::Add)]
        );
    }

    #[tokio::test]
    async fn empty_batch_writes_nothing() {
        let tmp = std::env::temp_dir().join(format!("ag_iv_test_{}.db", Uuid::now_v7()));
        let storage = Storage::open(&tmp).await.unwrap();

        let recorded = record_intervention(&storage, &Intervention::default())
            .await
            .unwrap();
        assert!(recorded.is_none());
        assert!(storage.list_sources().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn deletions_take_effect_in_next_build() {
        let tmp = std::env::temp_dir().join(format!("ag_iv_test_{}.db", Uuid::now_v7()));
        let storage = Storage::open(&tmp).await.unwrap();

        let model = storage.insert_source("ner", "", SourceKind::Model).await.unwrap();
        let entity = |name: &str| NewEntityAssertion {
            name: name.into(),
            kind: AssertionKind::Add,
            source_id: model.id,
            text_id: None,
            task_id: None,
        };
        let e = storage
            .insert_entity_assertions(&[entity("A"), entity("B"), entity("C")])
            .await
            .unwrap();
        storage
            .insert_relation_assertions(&[NewRelationAssertion {
                label: "likes".into(),
                kind: AssertionKind::Add,
                source_id: model.id,
                text_id: None,
                task_id: None,
                head_id: e[0],
                tail_id: e[1],
            }])
            .await
            .unwrap();

        let intervention = Intervention {
            del_entities: vec!["C".into()],
            del_relations: vec![triple("A", "likes", "B")],
            ..Intervention::default()
        };
        let human = record_intervention(&storage, &intervention)
            .await
            .unwrap()
            .expect("source");
        assert_eq!(human.kind, SourceKind::HumanIntervention);
        assert!(human.name.starts_with("human-intervention "));

        let stored = storage.list_entity_assertions(human.id).await.unwrap();
        assert_eq!(stored.len(), 3);
        assert_eq!(storage.list_relation_assertions(human.id).await.unwrap().len(), 1);

        let ctx = BuildContext::new(&storage);
        let res = build_snapshot(
            &ctx,
            &BuildRequest {
                source_ids: vec![model.id, human.id],
                description: "corrected".into(),
            },
        )
        .await
        .unwrap();

        assert_eq!(res.deleted_names.iter().collect::<Vec<_>>(), ["C"]);
        let a = storage.get_node(res.build_id, "A").await.unwrap().unwrap();
        assert!(a.out_edges.is_empty());
        assert!(storage.get_node(res.build_id, "C").await.unwrap().is_none());
    }
}
