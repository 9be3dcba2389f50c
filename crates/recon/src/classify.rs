//! Status derivation for reconciled entities.
//!
//! Precedence when several conditions hold: Conflict > Removed > New >
//! Updated > Stable. `Stable` never leaves the engine; it is published as
//! `Updated`.

use std::fmt;

use crate::config::ReconConfig;
use crate::geo::{distance_m, names_similar};
use crate::model::{ReconciledEntity, SignStatus, SourceId, SourceSide};

/// Internal outcome of status derivation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Conflict,
    Removed,
    New,
    Updated,
    /// Both sides linked before, nothing advanced.
    Stable,
}

impl Disposition {
    pub fn status(self) -> SignStatus {
        match self {
            Self::Conflict => SignStatus::Conflict,
            Self::Removed => SignStatus::Removed,
            Self::New => SignStatus::New,
            Self::Updated | Self::Stable => SignStatus::Updated,
        }
    }
}

/// Live links of an entity in the current pass.
#[derive(Debug, Clone, Copy)]
pub enum LinkState<'a> {
    Both {
        authority: &'a SourceSide,
        commercial: &'a SourceSide,
    },
    Single {
        source: SourceId,
        side: &'a SourceSide,
    },
    Unlinked,
}

/// Why two linked sides disagree.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConflictReason {
    Position { distance_m: f64 },
    Name,
    NameAndPosition { distance_m: f64 },
}

impl fmt::Display for ConflictReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Position { distance_m } => write!(f, "positions {distance_m:.1} m apart"),
            Self::Name => write!(f, "names differ"),
            Self::NameAndPosition { distance_m } => {
                write!(f, "names differ, positions {distance_m:.1} m apart")
            }
        }
    }
}

/// Compare authority and commercial sides of a linked entity.
///
/// Positions further apart than the configured tolerance, or names that
/// would not pass the linkage similarity check, are a conflict. An
/// unmeasurable distance (invalid coordinates) counts as a disagreement.
pub fn detect_conflict(
    authority: &SourceSide,
    commercial: &SourceSide,
    config: &ReconConfig,
) -> Option<ConflictReason> {
    let d = distance_m(authority.position, commercial.position);
    let position_off = d.is_nan() || d > config.conflict.position_tolerance_m;
    let name_off = !names_similar(
        &authority.name,
        &commercial.name,
        config.matching.name_similarity,
    );

    match (name_off, position_off) {
        (false, false) => None,
        (true, false) => Some(ConflictReason::Name),
        (false, true) => Some(ConflictReason::Position { distance_m: d }),
        (true, true) => Some(ConflictReason::NameAndPosition { distance_m: d }),
    }
}

/// Derive the disposition of one entity from its current links and the
/// entity it continues from the previous pass (same id), if any.
pub fn derive_disposition(
    link: LinkState<'_>,
    previous: Option<&ReconciledEntity>,
    config: &ReconConfig,
) -> Disposition {
    match link {
        LinkState::Both {
            authority,
            commercial,
        } => {
            if detect_conflict(authority, commercial, config).is_some() {
                return Disposition::Conflict;
            }
            match previous {
                None => Disposition::Updated,
                Some(prev) => {
                    if advanced(prev.authority.as_ref(), authority)
                        || advanced(prev.commercial.as_ref(), commercial)
                    {
                        Disposition::Updated
                    } else {
                        Disposition::Stable
                    }
                }
            }
        }
        LinkState::Unlinked => Disposition::Removed,
        LinkState::Single { source, side } => {
            let linked_before = previous
                .and_then(|prev| prev.side(source))
                .is_some_and(|prev_side| prev_side.key == side.key);
            if linked_before {
                Disposition::Updated
            } else {
                Disposition::New
            }
        }
    }
}

/// A side advanced when it is newly linked, linked to a different record,
/// or its source reports a later observation.
fn advanced(previous: Option<&SourceSide>, current: &SourceSide) -> bool {
    match previous {
        None => true,
        Some(prev) => prev.key != current.key || current.observed_at > prev.observed_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{EntityId, GeoPoint};
    use chrono::{DateTime, TimeZone, Utc};

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, day, 0, 0, 0).unwrap()
    }

    fn side(key: &str, name: &str, lat: f64, lon: f64, day: u32) -> SourceSide {
        SourceSide {
            key: key.into(),
            external_id: Some(key.into()),
            name: name.into(),
            position: GeoPoint::new(lat, lon),
            description: None,
            observed_at: at(day),
        }
    }

    fn entity(authority: Option<SourceSide>, commercial: Option<SourceSide>) -> ReconciledEntity {
        let primary = authority.clone().or_else(|| commercial.clone()).unwrap();
        ReconciledEntity {
            id: EntityId(1),
            name: primary.name,
            position: primary.position,
            authority,
            commercial,
            status: SignStatus::Updated,
            flagged: false,
        }
    }

    #[test]
    fn close_pair_with_same_name_is_not_a_conflict() {
        let a = side("G1", "Stop sign A", 55.7512, 37.6184, 1);
        let c = side("C1", "Stop sign A", 55.7513, 37.6184, 1);
        assert_eq!(detect_conflict(&a, &c, &ReconConfig::default()), None);
    }

    #[test]
    fn far_pair_is_a_position_conflict() {
        let a = side("G1", "Stop sign A", 55.7512, 37.6184, 1);
        let c = side("C1", "Stop sign A", 55.770, 37.700, 1);
        let reason = detect_conflict(&a, &c, &ReconConfig::default()).unwrap();
        assert!(matches!(reason, ConflictReason::Position { distance_m } if distance_m > 50.0));
        assert!(reason.to_string().starts_with("positions "));
    }

    #[test]
    fn renamed_side_is_a_name_conflict() {
        let a = side("G1", "Stop sign A", 55.7512, 37.6184, 1);
        let c = side("C1", "Pedestrian crossing", 55.7512, 37.6184, 1);
        assert_eq!(
            detect_conflict(&a, &c, &ReconConfig::default()),
            Some(ConflictReason::Name)
        );
    }

    #[test]
    fn invalid_coordinates_disagree() {
        let a = side("G1", "Stop sign A", f64::NAN, 37.6184, 1);
        let c = side("C1", "Stop sign A", 55.7512, 37.6184, 1);
        assert!(detect_conflict(&a, &c, &ReconConfig::default()).is_some());
    }

    #[test]
    fn first_seen_single_source_is_new() {
        let a = side("G1", "Stop", 55.0, 37.0, 1);
        let d = derive_disposition(
            LinkState::Single { source: SourceId::Authority, side: &a },
            None,
            &ReconConfig::default(),
        );
        assert_eq!(d, Disposition::New);
        assert_eq!(d.status(), SignStatus::New);
    }

    #[test]
    fn persisted_single_source_is_updated() {
        let a = side("G1", "Stop", 55.0, 37.0, 1);
        let prev = entity(Some(a.clone()), None);
        let d = derive_disposition(
            LinkState::Single { source: SourceId::Authority, side: &a },
            Some(&prev),
            &ReconConfig::default(),
        );
        assert_eq!(d, Disposition::Updated);
    }

    #[test]
    fn single_source_on_other_side_of_previous_is_new() {
        let a = side("G1", "Stop", 55.0, 37.0, 1);
        let c = side("C1", "Stop", 55.0, 37.0, 1);
        let prev = entity(Some(a), None);
        let d = derive_disposition(
            LinkState::Single { source: SourceId::Commercial, side: &c },
            Some(&prev),
            &ReconConfig::default(),
        );
        assert_eq!(d, Disposition::New);
    }

    #[test]
    fn both_sides_unchanged_is_stable_but_published_as_updated() {
        let a = side("G1", "Stop", 55.0, 37.0, 1);
        let c = side("C1", "Stop", 55.0, 37.0, 1);
        let prev = entity(Some(a.clone()), Some(c.clone()));
        let d = derive_disposition(
            LinkState::Both { authority: &a, commercial: &c },
            Some(&prev),
            &ReconConfig::default(),
        );
        assert_eq!(d, Disposition::Stable);
        assert_eq!(d.status(), SignStatus::Updated);
    }

    #[test]
    fn advanced_observation_is_updated() {
        let a = side("G1", "Stop", 55.0, 37.0, 1);
        let c_old = side("C1", "Stop", 55.0, 37.0, 1);
        let c_new = side("C1", "Stop", 55.0, 37.0, 9);
        let prev = entity(Some(a.clone()), Some(c_old));
        let d = derive_disposition(
            LinkState::Both { authority: &a, commercial: &c_new },
            Some(&prev),
            &ReconConfig::default(),
        );
        assert_eq!(d, Disposition::Updated);
    }

    #[test]
    fn conflict_outranks_everything() {
        let a = side("G1", "Stop", 55.0, 37.0, 1);
        let c = side("C1", "Stop", 55.1, 37.0, 1);
        let d = derive_disposition(
            LinkState::Both { authority: &a, commercial: &c },
            None,
            &ReconConfig::default(),
        );
        assert_eq!(d, Disposition::Conflict);
    }

    #[test]
    fn unlinked_is_removed() {
        let d = derive_disposition(LinkState::Unlinked, None, &ReconConfig::default());
        assert_eq!(d.status(), SignStatus::Removed);
    }
}
