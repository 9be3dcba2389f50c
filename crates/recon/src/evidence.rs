use std::collections::BTreeMap;

use serde::Serialize;

use crate::model::{Coverage, DataQualityWarning, ReconciledEntity, RefreshSummary, SignStatus};

/// Summarize a committed pass against the table it replaces.
pub fn compute_summary(
    previous: &[ReconciledEntity],
    current: &[ReconciledEntity],
    evicted: usize,
    warnings: Vec<DataQualityWarning>,
) -> RefreshSummary {
    let tally = tally(current);
    let count = |s: SignStatus| tally.by_status.get(s.label()).copied().unwrap_or(0);

    RefreshSummary {
        changed: previous != current,
        new_count: count(SignStatus::New),
        updated_count: count(SignStatus::Updated),
        conflict_count: count(SignStatus::Conflict),
        removed_count: count(SignStatus::Removed),
        evicted_count: evicted,
        entity_count: current.len(),
        warnings,
    }
}

/// Per-status and per-coverage counts over a set of entities.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Tally {
    pub total: usize,
    pub by_status: BTreeMap<String, usize>,
    pub authority_only: usize,
    pub commercial_only: usize,
    pub both: usize,
    pub flagged: usize,
}

pub fn tally<'a>(entities: impl IntoIterator<Item = &'a ReconciledEntity>) -> Tally {
    let mut t = Tally::default();
    for e in entities {
        t.total += 1;
        *t.by_status.entry(e.status.label().to_string()).or_insert(0) += 1;
        match e.coverage() {
            Coverage::Authority => t.authority_only += 1,
            Coverage::Commercial => t.commercial_only += 1,
            Coverage::Both => t.both += 1,
        }
        if e.flagged {
            t.flagged += 1;
        }
    }
    t
}
