use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::geo::normalize_name;

// ---------------------------------------------------------------------------
// Sources
// ---------------------------------------------------------------------------

/// The two registries a sign can be reported by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceId {
    /// Government traffic-authority feed.
    Authority,
    /// Commercial-provider feed.
    Commercial,
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Authority => write!(f, "authority"),
            Self::Commercial => write!(f, "commercial"),
        }
    }
}

/// Latitude/longitude in degrees.
///
/// Non-finite coordinates round-trip through JSON as `null` so that a
/// flagged record can still be persisted with the rest of the snapshot.
/// Two missing (NaN) coordinates compare equal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GeoPoint {
    #[serde(with = "coordinate")]
    pub lat: f64,
    #[serde(with = "coordinate")]
    pub lon: f64,
}

impl GeoPoint {
    pub const fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Finite and inside -90..90 / -180..180.
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lon.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lon)
    }
}

impl PartialEq for GeoPoint {
    fn eq(&self, other: &Self) -> bool {
        let same = |a: f64, b: f64| a == b || (a.is_nan() && b.is_nan());
        same(self.lat, other.lat) && same(self.lon, other.lon)
    }
}

mod coordinate {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if value.is_finite() {
            serializer.serialize_f64(*value)
        } else {
            serializer.serialize_none()
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::NAN))
    }
}

/// One sign as seen by one registry, already normalized by a source adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRecord {
    pub source: SourceId,
    pub external_id: Option<String>,
    pub name: String,
    pub position: GeoPoint,
    pub description: Option<String>,
    pub observed_at: DateTime<Utc>,
}

impl SourceRecord {
    /// Stable identity of the record within its source.
    ///
    /// The external id when the source provides one; otherwise a key derived
    /// from the normalized name and the position rounded to six decimals.
    pub fn record_key(&self) -> String {
        match self.external_id.as_deref().map(str::trim) {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => format!(
                "~{}@{:.6},{:.6}",
                normalize_name(&self.name),
                self.position.lat,
                self.position.lon
            ),
        }
    }
}

// ---------------------------------------------------------------------------
// Reconciled entities
// ---------------------------------------------------------------------------

/// Identifier assigned at first reconciliation. Never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub u64);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What one registry contributed to an entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceSide {
    /// Record key the side was linked through (see [`SourceRecord::record_key`]).
    pub key: String,
    pub external_id: Option<String>,
    pub name: String,
    pub position: GeoPoint,
    pub description: Option<String>,
    pub observed_at: DateTime<Utc>,
}

impl SourceSide {
    /// Side for `record` linked through `key`. The key differs from
    /// [`SourceRecord::record_key`] only for a repeated key.
    pub fn keyed(record: &SourceRecord, key: String) -> Self {
        Self {
            key,
            external_id: record.external_id.clone(),
            name: record.name.clone(),
            position: record.position,
            description: record.description.clone(),
            observed_at: record.observed_at,
        }
    }
}

/// Externally visible reconciliation status.
///
/// Declaration order is the ascending status-weight order used by the
/// query engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignStatus {
    Removed,
    Conflict,
    Updated,
    New,
}

impl SignStatus {
    pub const ALL: [SignStatus; 4] = [Self::New, Self::Updated, Self::Conflict, Self::Removed];

    pub fn weight(self) -> u8 {
        match self {
            Self::Removed => 1,
            Self::Conflict => 2,
            Self::Updated => 3,
            Self::New => 4,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Updated => "updated",
            Self::Conflict => "conflict",
            Self::Removed => "removed",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.label() == label)
    }
}

impl fmt::Display for SignStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.label())
    }
}

/// Which registries back an entity. There is no "neither" case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Coverage {
    Authority,
    Commercial,
    Both,
}

impl Coverage {
    pub fn label(self) -> &'static str {
        match self {
            Self::Authority => "authority",
            Self::Commercial => "commercial",
            Self::Both => "both",
        }
    }

    /// Number of sources contributing.
    pub fn richness(self) -> u8 {
        match self {
            Self::Both => 2,
            Self::Authority | Self::Commercial => 1,
        }
    }
}

impl fmt::Display for Coverage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.label())
    }
}

/// The unified per-sign record produced by a reconciliation pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciledEntity {
    pub id: EntityId,
    pub name: String,
    pub position: GeoPoint,
    pub authority: Option<SourceSide>,
    pub commercial: Option<SourceSide>,
    pub status: SignStatus,
    /// Set when a contributing record failed a data-quality check and was
    /// kept out of identity matching.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub flagged: bool,
}

impl ReconciledEntity {
    pub fn coverage(&self) -> Coverage {
        match (&self.authority, &self.commercial) {
            (Some(_), Some(_)) => Coverage::Both,
            (None, Some(_)) => Coverage::Commercial,
            // Entities are never emitted without a side; treat the
            // impossible case as authority so the match stays total.
            (Some(_), None) | (None, None) => Coverage::Authority,
        }
    }

    pub fn side(&self, source: SourceId) -> Option<&SourceSide> {
        match source {
            SourceId::Authority => self.authority.as_ref(),
            SourceId::Commercial => self.commercial.as_ref(),
        }
    }

    pub fn link(&self) -> Link {
        Link {
            id: self.id,
            authority: self.authority.as_ref().map(|s| s.key.clone()),
            commercial: self.commercial.as_ref().map(|s| s.key.clone()),
        }
    }
}

/// Record keys an entity was linked through in a pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub id: EntityId,
    pub authority: Option<String>,
    pub commercial: Option<String>,
}

// ---------------------------------------------------------------------------
// Identity resolution
// ---------------------------------------------------------------------------

/// At most one record per source, describing one physical sign.
#[derive(Debug, Clone)]
pub struct ResolvedPair {
    pub authority: Option<SourceSide>,
    pub commercial: Option<SourceSide>,
    pub flagged: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QualityIssue {
    InvalidPosition { lat: Option<f64>, lon: Option<f64> },
    EmptyName,
    DuplicateKey,
}

impl fmt::Display for QualityIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidPosition { lat, lon } => {
                let show = |v: &Option<f64>| v.map_or_else(|| "NaN".to_string(), |v| v.to_string());
                write!(f, "invalid position ({}, {})", show(lat), show(lon))
            }
            Self::EmptyName => write!(f, "empty name"),
            Self::DuplicateKey => write!(f, "duplicate record key"),
        }
    }
}

/// Non-fatal problem with one input record. Collected, never thrown.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataQualityWarning {
    pub source: SourceId,
    pub record_key: String,
    pub issue: QualityIssue,
}

impl fmt::Display for DataQualityWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} record '{}': {}", self.source, self.record_key, self.issue)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Resolution {
    pub pairs: Vec<ResolvedPair>,
    pub warnings: Vec<DataQualityWarning>,
}

// ---------------------------------------------------------------------------
// Pass summary
// ---------------------------------------------------------------------------

/// Result of a successful `refresh()`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RefreshSummary {
    /// The committed entity table differs from the previous one.
    pub changed: bool,
    pub new_count: usize,
    pub updated_count: usize,
    pub conflict_count: usize,
    pub removed_count: usize,
    /// Tombstones dropped by this pass.
    pub evicted_count: usize,
    pub entity_count: usize,
    pub warnings: Vec<DataQualityWarning>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record(external_id: Option<&str>, name: &str) -> SourceRecord {
        SourceRecord {
            source: SourceId::Authority,
            external_id: external_id.map(String::from),
            name: name.into(),
            position: GeoPoint::new(55.751244, 37.618423),
            description: None,
            observed_at: Utc.with_ymd_and_hms(2024, 3, 15, 0, 0, 0).unwrap(),
        }
    }

    #[test]
    fn record_key_prefers_external_id() {
        assert_eq!(record(Some(" G12345 "), "Stop").record_key(), "G12345");
    }

    #[test]
    fn record_key_falls_back_to_name_and_position() {
        let key = record(None, "  Stop   Sign ").record_key();
        assert_eq!(key, "~stop sign@55.751244,37.618423");
        assert_eq!(record(Some(""), "Stop Sign").record_key(), key);
    }

    #[test]
    fn geo_point_bounds() {
        assert!(GeoPoint::new(90.0, -180.0).is_valid());
        assert!(!GeoPoint::new(90.5, 0.0).is_valid());
        assert!(!GeoPoint::new(0.0, 181.0).is_valid());
        assert!(!GeoPoint::new(f64::NAN, 0.0).is_valid());
        assert!(!GeoPoint::new(0.0, f64::INFINITY).is_valid());
    }

    #[test]
    fn non_finite_coordinates_round_trip_as_null() {
        let json = serde_json::to_string(&GeoPoint::new(f64::NAN, 37.5)).unwrap();
        assert_eq!(json, r#"{"lat":null,"lon":37.5}"#);
        let back: GeoPoint = serde_json::from_str(&json).unwrap();
        assert!(back.lat.is_nan());
        assert_eq!(back.lon, 37.5);
        assert_eq!(back, GeoPoint::new(f64::NAN, 37.5));
    }

    #[test]
    fn status_labels_and_weights() {
        assert_eq!(SignStatus::from_label("conflict"), Some(SignStatus::Conflict));
        assert_eq!(SignStatus::from_label("stable"), None);
        assert!(SignStatus::Removed.weight() < SignStatus::Conflict.weight());
        assert!(SignStatus::Conflict < SignStatus::Updated);
        assert_eq!(SignStatus::New.to_string(), "new");
    }
}
