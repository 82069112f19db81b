//! Provenance aggregation: the files and source snapshots behind a set of
//! assertion records.

use std::collections::{BTreeSet, HashMap};

use autograph_shared::{
    EntityAssertion, FileInfo, Provenance, RelationAssertion, SnapshotId, SourceId, TextId,
};

/// An assertion record that can be traced to a text and a source.
pub trait Attributed {
    fn text_id(&self) -> Option<TextId>;
    fn source_id(&self) -> SourceId;
}

impl Attributed for EntityAssertion {
    fn text_id(&self) -> Option<TextId> {
        self.text_id
    }

    fn source_id(&self) -> SourceId {
        self.source_id
    }
}

impl Attributed for RelationAssertion {
    fn text_id(&self) -> Option<TextId> {
        self.text_id
    }

    fn source_id(&self) -> SourceId {
        self.source_id
    }
}

/// Collect the distinct files and source snapshots behind `records`.
///
/// Texts without an owning file contribute nothing to `files`. Both lists
/// come back sorted, so equal inputs always serialize identically.
pub fn aggregate<'a, A, I>(
    records: I,
    files: &HashMap<TextId, FileInfo>,
    snapshots: &HashMap<SourceId, SnapshotId>,
) -> Provenance
where
    A: Attributed + 'a,
    I: IntoIterator<Item = &'a A>,
{
    let mut file_set: BTreeSet<&FileInfo> = BTreeSet::new();
    let mut source_set: BTreeSet<SnapshotId> = BTreeSet::new();

    for record in records {
        if let Some(file) = record.text_id().and_then(|t| files.get(&t)) {
            file_set.insert(file);
        }
        if let Some(snapshot) = snapshots.get(&record.source_id()) {
            source_set.insert(*snapshot);
        }
    }

    Provenance {
        files: file_set.into_iter().cloned().collect(),
        sources: source_set.into_iter().collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use autograph_shared::{AssertionId, AssertionKind, FileId};

    fn entity(id: i64, source: i64, text: Option<i64>) -> EntityAssertion {
        EntityAssertion {
            id: AssertionId(id),
            name: "Node1".into(),
            kind: AssertionKind::Add,
            source_id: SourceId(source),
            text_id: text.map(TextId),
            task_id: None,
        }
    }

    fn file(id: i64, name: &str) -> FileInfo {
        FileInfo {
            file_id: FileId(id),
            file_name: name.into(),
            file_type: "txt".into(),
        }
    }

    #[test]
    fn deduplicates_files_and_sources() {
        let files = HashMap::from([
            (TextId(1), file(10, "File0")),
            (TextId(2), file(10, "File0")),
            (TextId(3), file(11, "File1")),
        ]);
        let snapshots = HashMap::from([(SourceId(1), SnapshotId(7)), (SourceId(2), SnapshotId(8))]);

        let records = vec![
            entity(1, 2, Some(3)),
            entity(2, 1, Some(1)),
            entity(3, 1, Some(2)),
            entity(4, 2, None),
        ];
        let prov = aggregate(&records, &files, &snapshots);

        assert_eq!(prov.files, vec![file(10, "File0"), file(11, "File1")]);
        assert_eq!(prov.sources, vec![SnapshotId(7), SnapshotId(8)]);
    }

    #[test]
    fn orphan_texts_add_no_files() {
        let snapshots = HashMap::from([(SourceId(1), SnapshotId(1))]);
        let records = vec![entity(1, 1, Some(99)), entity(2, 1, None)];

        let prov = aggregate(&records, &HashMap::new(), &snapshots);
        assert!(prov.files.is_empty());
        assert_eq!(prov.sources, vec![SnapshotId(1)]);
    }

    #[test]
    fn empty_input_gives_empty_provenance() {
        let records: Vec<EntityAssertion> = Vec::new();
        let prov = aggregate(&records, &HashMap::new(), &HashMap::new());
        assert_eq!(prov, Provenance::default());
    }
}
