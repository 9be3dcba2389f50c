//! Identity resolution: pair authority and commercial records that describe
//! the same physical sign.
//!
//! Every input record ends up in exactly one [`ResolvedPair`]. Linking runs
//! in two stages:
//! 1. Links carried from the previous pass are kept while both sides are
//!    still present.
//! 2. Remaining records are paired by proximity + name similarity, nearest
//!    first, so a record with several candidates takes the closest one.
//!
//! Records failing a data-quality check never take part in matching; they
//! surface alone and are reported as warnings. A repeated record key keeps
//! its first record; the n-th repeat is keyed `<key>#dup<n>` so it keeps
//! the same entity across passes.

use std::collections::HashMap;

use crate::config::MatchingConfig;
use crate::geo::{distance_m, names_similar};
use crate::model::{
    DataQualityWarning, Link, QualityIssue, Resolution, ResolvedPair, SourceId, SourceRecord,
    SourceSide,
};

struct Candidate<'a> {
    record: &'a SourceRecord,
    key: String,
    eligible: bool,
}

/// Resolve both record streams into pairs.
pub fn resolve(
    authority: &[SourceRecord],
    commercial: &[SourceRecord],
    previous_links: &[Link],
    matching: &MatchingConfig,
) -> Resolution {
    let mut warnings = Vec::new();
    let auth = screen(SourceId::Authority, authority, &mut warnings);
    let comm = screen(SourceId::Commercial, commercial, &mut warnings);

    // auth index -> comm index
    let mut partner: Vec<Option<usize>> = vec![None; auth.len()];
    let mut comm_taken = vec![false; comm.len()];

    // Stage 1: carried links
    let auth_by_key = eligible_index(&auth);
    let comm_by_key = eligible_index(&comm);

    for link in previous_links {
        let (Some(a_key), Some(c_key)) = (&link.authority, &link.commercial) else {
            continue;
        };
        let (Some(&ai), Some(&ci)) = (auth_by_key.get(a_key.as_str()), comm_by_key.get(c_key.as_str()))
        else {
            continue;
        };
        if partner[ai].is_none() && !comm_taken[ci] {
            partner[ai] = Some(ci);
            comm_taken[ci] = true;
        }
    }

    // Stage 2: proximity, nearest first
    let mut proposals: Vec<(f64, usize, usize)> = Vec::new();
    for (ai, a) in auth.iter().enumerate() {
        if !a.eligible || partner[ai].is_some() {
            continue;
        }
        for (ci, c) in comm.iter().enumerate() {
            if !c.eligible || comm_taken[ci] {
                continue;
            }
            let d = distance_m(a.record.position, c.record.position);
            if d < matching.link_distance_m
                && names_similar(&a.record.name, &c.record.name, matching.name_similarity)
            {
                proposals.push((d, ai, ci));
            }
        }
    }
    proposals.sort_by(|x, y| x.0.total_cmp(&y.0).then(x.1.cmp(&y.1)).then(x.2.cmp(&y.2)));

    for (d, ai, ci) in proposals {
        if partner[ai].is_none() && !comm_taken[ci] {
            log::debug!(
                "linked authority '{}' with commercial '{}' at {:.1} m",
                auth[ai].key,
                comm[ci].key,
                d
            );
            partner[ai] = Some(ci);
            comm_taken[ci] = true;
        }
    }

    // Assemble in input order: authority records (paired or alone), then
    // commercial leftovers.
    let mut pairs = Vec::with_capacity(auth.len() + comm.len());
    for (ai, a) in auth.iter().enumerate() {
        pairs.push(ResolvedPair {
            authority: Some(a.side()),
            commercial: partner[ai].map(|ci| comm[ci].side()),
            flagged: !a.eligible,
        });
    }
    for (ci, c) in comm.iter().enumerate() {
        if !comm_taken[ci] {
            pairs.push(ResolvedPair {
                authority: None,
                commercial: Some(c.side()),
                flagged: !c.eligible,
            });
        }
    }

    Resolution { pairs, warnings }
}

/// Check every record, collecting warnings for the ones kept out of matching.
fn screen<'a>(
    source: SourceId,
    records: &'a [SourceRecord],
    warnings: &mut Vec<DataQualityWarning>,
) -> Vec<Candidate<'a>> {
    let mut seen: HashMap<String, usize> = HashMap::new();

    records
        .iter()
        .map(|record| {
            let base = record.record_key();
            let repeats = seen.entry(base.clone()).or_insert(0);
            *repeats += 1;
            let repeat = *repeats - 1;
            let mut issues = Vec::new();

            if !record.position.is_valid() {
                issues.push(QualityIssue::InvalidPosition {
                    lat: Some(record.position.lat).filter(|v| v.is_finite()),
                    lon: Some(record.position.lon).filter(|v| v.is_finite()),
                });
            }
            if record.name.trim().is_empty() {
                issues.push(QualityIssue::EmptyName);
            }
            if repeat > 0 {
                issues.push(QualityIssue::DuplicateKey);
            }

            let eligible = issues.is_empty();
            for issue in issues {
                let warning = DataQualityWarning {
                    source,
                    record_key: base.clone(),
                    issue,
                };
                log::warn!("{warning}");
                warnings.push(warning);
            }

            let key = if repeat > 0 {
                format!("{base}#dup{repeat}")
            } else {
                base
            };
            Candidate {
                record,
                key,
                eligible,
            }
        })
        .collect()
}

impl Candidate<'_> {
    fn side(&self) -> SourceSide {
        SourceSide::keyed(self.record, self.key.clone())
    }
}

fn eligible_index<'c>(candidates: &'c [Candidate<'_>]) -> HashMap<&'c str, usize> {
    candidates
        .iter()
        .enumerate()
        .filter(|(_, c)| c.eligible)
        .map(|(i, c)| (c.key.as_str(), i))
        .collect()
}
