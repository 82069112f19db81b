//! Relation resolution: pick the one label that survives for a
//! `(head, tail)` pair.
//!
//! Records are tallied per label. `Add` records count as votes; a single
//! `Del` record taints its label for good. The untainted label with the most
//! votes wins, ties going to the lexicographically smallest label. When every
//! label is tainted there is no edge.

use std::collections::{BTreeMap, HashMap};

use autograph_shared::{AssertionKind, EdgeInfo, FileInfo, RelationAssertion, SnapshotId, SourceId, TextId};

use crate::provenance;

#[derive(Default)]
struct LabelTally<'a> {
    votes: usize,
    tainted: bool,
    records: Vec<&'a RelationAssertion>,
}

/// Resolve the records between one head and one tail into a single edge.
pub fn resolve_edge(
    records: &[&RelationAssertion],
    files: &HashMap<TextId, FileInfo>,
    snapshots: &HashMap<SourceId, SnapshotId>,
) -> Option<EdgeInfo> {
    let mut tallies: BTreeMap<&str, LabelTally<'_>> = BTreeMap::new();

    for record in records.iter().copied() {
        let tally = tallies.entry(record.label.as_str()).or_default();
        match record.kind {
            AssertionKind::Add => {
                tally.votes += 1;
                tally.records.push(record);
            }
            AssertionKind::Del => tally.tainted = true,
            // Relations are never stored as Tmp.
            AssertionKind::Tmp => {}
        }
    }

    let mut winner: Option<(&str, &LabelTally<'_>)> = None;
    for (label, tally) in &tallies {
        if tally.tainted || tally.votes == 0 {
            continue;
        }
        // Strictly greater: the first (smallest) label keeps a tie.
        if winner.is_none_or(|(_, best)| tally.votes > best.votes) {
            winner = Some((label, tally));
        }
    }

    let (label, tally) = winner?;
    let prov = provenance::aggregate(tally.records.iter().copied(), files, snapshots);
    Some(EdgeInfo {
        label: label.to_string(),
        files: prov.files,
        sources: prov.sources,
    })
}
