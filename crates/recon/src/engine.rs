use std::collections::{HashMap, HashSet};

use crate::classify::{derive_disposition, detect_conflict, LinkState};
use crate::config::ReconConfig;
use crate::evidence::compute_summary;
use crate::matcher::resolve;
use crate::model::{
    EntityId, RefreshSummary, ReconciledEntity, ResolvedPair, SignStatus, SourceId, SourceRecord,
};
use crate::state::PassState;

/// Output of one pure reconciliation pass.
#[derive(Debug, Clone)]
pub struct PassOutcome {
    pub state: PassState,
    pub summary: RefreshSummary,
}

/// Run identity resolution and reconciliation over freshly fetched records.
///
/// Pure: no IO, no clock. The caller decides whether to commit `state`.
pub fn run_pass(
    config: &ReconConfig,
    authority: &[SourceRecord],
    commercial: &[SourceRecord],
    previous: &PassState,
) -> PassOutcome {
    let resolution = resolve(authority, commercial, &previous.links, &config.matching);
    let (state, evicted) = reconcile(config, resolution.pairs, previous);

    log::debug!(
        "pass produced {} entities ({} evicted) from {} authority / {} commercial records",
        state.entities.len(),
        evicted,
        authority.len(),
        commercial.len()
    );

    let summary = compute_summary(
        &previous.entities,
        &state.entities,
        evicted,
        resolution.warnings,
    );
    PassOutcome { state, summary }
}

/// Turn resolved pairs into the next entity table.
///
/// Returns the new state and the number of tombstones evicted.
pub fn reconcile(
    config: &ReconConfig,
    pairs: Vec<ResolvedPair>,
    previous: &PassState,
) -> (PassState, usize) {
    let mut by_authority_key: HashMap<&str, EntityId> = HashMap::new();
    let mut by_commercial_key: HashMap<&str, EntityId> = HashMap::new();
    // A key shared by several previous entities maps to the first live one,
    // else the first tombstone, in id order.
    let (tombstones, live): (Vec<_>, Vec<_>) = previous
        .entities
        .iter()
        .partition(|e| e.status == SignStatus::Removed);
    for entity in live.into_iter().chain(tombstones) {
        if let Some(side) = &entity.authority {
            by_authority_key.entry(side.key.as_str()).or_insert(entity.id);
        }
        if let Some(side) = &entity.commercial {
            by_commercial_key.entry(side.key.as_str()).or_insert(entity.id);
        }
    }

    let mut next_id = previous.first_free_id();
    let mut claimed: HashSet<EntityId> = HashSet::new();
    let mut entities = Vec::with_capacity(pairs.len() + previous.entities.len());

    for pair in pairs {
        let ResolvedPair {
            authority,
            commercial,
            flagged,
        } = pair;

        let Some(primary) = authority.as_ref().or(commercial.as_ref()) else {
            continue;
        };
        let (name, position) = (primary.name.clone(), primary.position);

        // Reuse a previous id through either side; authority wins.
        let reused = authority
            .as_ref()
            .and_then(|s| by_authority_key.get(s.key.as_str()).copied())
            .filter(|id| !claimed.contains(id))
            .or_else(|| {
                commercial
                    .as_ref()
                    .and_then(|s| by_commercial_key.get(s.key.as_str()).copied())
                    .filter(|id| !claimed.contains(id))
            });
        let id = reused.unwrap_or_else(|| {
            let id = EntityId(next_id);
            next_id += 1;
            id
        });
        claimed.insert(id);

        let link = match (&authority, &commercial) {
            (Some(a), Some(c)) => LinkState::Both {
                authority: a,
                commercial: c,
            },
            (Some(a), None) => LinkState::Single {
                source: SourceId::Authority,
                side: a,
            },
            (None, Some(c)) => LinkState::Single {
                source: SourceId::Commercial,
                side: c,
            },
            (None, None) => LinkState::Unlinked,
        };
        if let LinkState::Both {
            authority,
            commercial,
        } = link
        {
            if let Some(reason) = detect_conflict(authority, commercial, config) {
                log::info!("entity {id} ('{name}') has conflicting sources: {reason}");
            }
        }
        let disposition = derive_disposition(link, previous.entity(id), config);

        entities.push(ReconciledEntity {
            id,
            name,
            position,
            authority,
            commercial,
            status: disposition.status(),
            flagged,
        });
    }

    // Previous entities with no renewed link: live ones become tombstones,
    // tombstones are evicted.
    let mut evicted = 0;
    for entity in &previous.entities {
        if claimed.contains(&entity.id) {
            continue;
        }
        if entity.status == SignStatus::Removed {
            log::debug!("evicting tombstone {}", entity.id);
            evicted += 1;
            continue;
        }
        let mut tombstone = entity.clone();
        tombstone.status = derive_disposition(LinkState::Unlinked, Some(entity), config).status();
        entities.push(tombstone);
    }

    entities.sort_by_key(|e| e.id);
    (PassState::new(entities, next_id), evicted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::GeoPoint;
    use chrono::{DateTime, TimeZone, Utc};

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 4, day, 0, 0, 0).unwrap()
    }

    fn rec(source: SourceId, id: &str, name: &str, lat: f64, lon: f64, day: u32) -> SourceRecord {
        SourceRecord {
            source,
            external_id: Some(id.into()),
            name: name.into(),
            position: GeoPoint::new(lat, lon),
            description: Some(format!("{source} view of {name}")),
            observed_at: at(day),
        }
    }

    fn auth(id: &str, name: &str, lat: f64, lon: f64) -> SourceRecord {
        rec(SourceId::Authority, id, name, lat, lon, 1)
    }

    fn comm(id: &str, name: &str, lat: f64, lon: f64) -> SourceRecord {
        rec(SourceId::Commercial, id, name, lat, lon, 1)
    }

    fn status_of(state: &PassState, id: u64) -> Option<SignStatus> {
        state.entity(EntityId(id)).map(|e| e.status)
    }

    #[test]
    fn linked_pair_prefers_authority_values() {
        let out = run_pass(
            &ReconConfig::default(),
            &[auth("G1", "Stop sign A", 55.7512, 37.6184)],
            &[comm("C1", "stop sign a", 55.7513, 37.6184)],
            &PassState::default(),
        );
        assert_eq!(out.state.entities.len(), 1);
        let e = &out.state.entities[0];
        assert_eq!(e.name, "Stop sign A");
        assert_eq!(e.position, GeoPoint::new(55.7512, 37.6184));
        assert_eq!(e.status, SignStatus::Updated);
        let c = e.commercial.as_ref().unwrap();
        assert_eq!(c.name, "stop sign a");
        assert_eq!(c.description.as_deref(), Some("commercial view of stop sign a"));
    }

    #[test]
    fn ids_allocated_in_order_and_monotonic() {
        let out = run_pass(
            &ReconConfig::default(),
            &[auth("G1", "A", 10.0, 10.0), auth("G2", "B", 20.0, 20.0)],
            &[comm("C9", "Z", 30.0, 30.0)],
            &PassState::default(),
        );
        let ids: Vec<u64> = out.state.entities.iter().map(|e| e.id.0).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(out.state.next_id, 4);
    }

    #[test]
    fn second_pass_keeps_ids_and_moves_new_to_updated() {
        let config = ReconConfig::default();
        let a = [auth("G1", "A", 10.0, 10.0), auth("G2", "B", 20.0, 20.0)];
        let c = [comm("C1", "A", 10.0, 10.0)];
        let first = run_pass(&config, &a, &c, &PassState::default());
        let second = run_pass(&config, &a, &c, &first.state);

        let ids = |s: &PassState| s.entities.iter().map(|e| e.id).collect::<Vec<_>>();
        assert_eq!(ids(&first.state), ids(&second.state));
        assert_eq!(status_of(&first.state, 2), Some(SignStatus::New));
        assert_eq!(status_of(&second.state, 2), Some(SignStatus::Updated));
        assert_eq!(status_of(&first.state, 1), Some(SignStatus::Updated));
        assert_eq!(status_of(&second.state, 1), Some(SignStatus::Updated));
    }

    #[test]
    fn missing_entity_becomes_tombstone_then_evicted() {
        let config = ReconConfig::default();
        let first = run_pass(&config, &[auth("G1", "A", 10.0, 10.0)], &[], &PassState::default());
        let second = run_pass(&config, &[], &[], &first.state);
        assert_eq!(status_of(&second.state, 1), Some(SignStatus::Removed));
        assert!(second.state.entities[0].authority.is_some());
        assert_eq!(second.summary.removed_count, 1);

        let third = run_pass(&config, &[], &[], &second.state);
        assert!(third.state.entities.is_empty());
        assert_eq!(third.summary.evicted_count, 1);
        assert_eq!(third.state.next_id, 2);
    }

    #[test]
    fn tombstone_revives_with_same_id() {
        let config = ReconConfig::default();
        let a = [auth("G1", "A", 10.0, 10.0)];
        let first = run_pass(&config, &a, &[], &PassState::default());
        let gone = run_pass(&config, &[], &[], &first.state);
        let back = run_pass(&config, &a, &[], &gone.state);
        assert_eq!(back.state.entities.len(), 1);
        assert_eq!(back.state.entities[0].id, EntityId(1));
        assert_eq!(back.state.entities[0].status, SignStatus::Updated);
    }

    #[test]
    fn evicted_ids_are_not_reused() {
        let config = ReconConfig::default();
        let first = run_pass(&config, &[auth("G1", "A", 10.0, 10.0)], &[], &PassState::default());
        let gone = run_pass(&config, &[], &[], &first.state);
        let evicted = run_pass(&config, &[], &[], &gone.state);
        let fresh = run_pass(&config, &[auth("G2", "B", 20.0, 20.0)], &[], &evicted.state);
        assert_eq!(fresh.state.entities[0].id, EntityId(2));
    }

    #[test]
    fn joining_two_single_source_entities_keeps_authority_id() {
        let config = ReconConfig::default();
        // Far apart first: two separate entities.
        let first = run_pass(
            &config,
            &[auth("G1", "Stop", 55.7512, 37.6184)],
            &[comm("C1", "Stop", 55.7600, 37.6184)],
            &PassState::default(),
        );
        assert_eq!(first.state.entities.len(), 2);

        // Commercial corrects its position; now they link.
        let second = run_pass(
            &config,
            &[auth("G1", "Stop", 55.7512, 37.6184)],
            &[comm("C1", "Stop", 55.7512, 37.6185)],
            &first.state,
        );
        assert_eq!(second.state.entities.len(), 2);
        let joined = second.state.entity(EntityId(1)).unwrap();
        assert!(joined.commercial.is_some());
        assert_eq!(joined.status, SignStatus::Updated);
        assert_eq!(status_of(&second.state, 2), Some(SignStatus::Removed));
    }

    #[test]
    fn drifted_previous_link_is_conflict_with_both_sides() {
        let config = ReconConfig::default();
        let first = run_pass(
            &config,
            &[auth("G1", "Stop sign A", 55.7512, 37.6184)],
            &[comm("C1", "Stop sign A", 55.7513, 37.6184)],
            &PassState::default(),
        );
        let second = run_pass(
            &config,
            &[auth("G1", "Stop sign A", 55.7512, 37.6184)],
            &[comm("C1", "Stop sign A", 55.770, 37.700)],
            &first.state,
        );
        assert_eq!(second.state.entities.len(), 1);
        let e = &second.state.entities[0];
        assert_eq!(e.status, SignStatus::Conflict);
        assert_eq!(e.position, GeoPoint::new(55.7512, 37.6184));
        assert_eq!(e.commercial.as_ref().unwrap().position, GeoPoint::new(55.770, 37.700));
        assert_eq!(second.summary.conflict_count, 1);
    }

    #[test]
    fn flagged_record_surfaces_alone() {
        let out = run_pass(
            &ReconConfig::default(),
            &[auth("G1", "Stop", f64::NAN, 37.0)],
            &[comm("C1", "Stop", 55.0, 37.0)],
            &PassState::default(),
        );
        assert_eq!(out.state.entities.len(), 2);
        assert!(out.state.entities[0].flagged);
        assert_eq!(out.state.entities[0].status, SignStatus::New);
        assert_eq!(out.summary.warnings.len(), 1);
    }

    #[test]
    fn repeated_external_id_keeps_both_ids_across_passes() {
        let config = ReconConfig::default();
        let a = [auth("G1", "Stop", 55.0, 37.0), auth("G1", "Stop", 56.0, 38.0)];
        let mut state = PassState::default();
        for pass in 0..4 {
            let out = run_pass(&config, &a, &[], &state);
            let ids: Vec<u64> = out.state.entities.iter().map(|e| e.id.0).collect();
            assert_eq!(ids, vec![1, 2], "pass {pass}");
            assert_eq!(out.summary.removed_count, 0, "pass {pass}");
            assert_eq!(out.state.next_id, 3, "pass {pass}");
            let first = out.state.entity(EntityId(1)).unwrap();
            assert_eq!(first.position, GeoPoint::new(55.0, 37.0));
            assert!(!first.flagged);
            assert!(out.state.entity(EntityId(2)).unwrap().flagged);
            state = out.state;
        }
    }

    #[test]
    fn shared_previous_key_resolves_to_lowest_live_id() {
        let config = ReconConfig::default();
        let first = run_pass(
            &config,
            &[auth("G1", "Stop", 55.0, 37.0), auth("G2", "Yield", 56.0, 38.0)],
            &[],
            &PassState::default(),
        );
        // A hand-edited table where both entities claim key G1.
        let mut entities = first.state.entities.clone();
        entities[1].authority.as_mut().unwrap().key = "G1".into();
        let edited = PassState::new(entities, first.state.next_id);

        let next = run_pass(&config, &[auth("G1", "Stop", 55.0, 37.0)], &[], &edited);
        assert_eq!(status_of(&next.state, 1), Some(SignStatus::Updated));
        assert_eq!(status_of(&next.state, 2), Some(SignStatus::Removed));
    }

    #[test]
    fn links_mirror_entities() {
        let out = run_pass(
            &ReconConfig::default(),
            &[auth("G1", "A", 10.0, 10.0)],
            &[comm("C1", "A", 10.0, 10.0)],
            &PassState::default(),
        );
        assert_eq!(out.state.links.len(), 1);
        assert_eq!(out.state.links[0].authority.as_deref(), Some("G1"));
        assert_eq!(out.state.links[0].commercial.as_deref(), Some("C1"));
    }
}
