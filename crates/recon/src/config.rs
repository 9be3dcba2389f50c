use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ReconError;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Tunable thresholds for linkage, conflict detection and fetching.
///
/// Every field has a default, so an empty document is a valid config.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReconConfig {
    pub matching: MatchingConfig,
    pub conflict: ConflictConfig,
    pub fetch: FetchConfig,
}

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

/// Identity linkage between an authority and a commercial record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MatchingConfig {
    /// Records closer than this (great-circle, metres) may be linked.
    pub link_distance_m: f64,
    /// Minimum normalized edit-distance similarity for names to match.
    pub name_similarity: f64,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            link_distance_m: 25.0,
            name_similarity: 0.8,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConflictConfig {
    /// Linked sides further apart than this are a conflict.
    pub position_tolerance_m: f64,
}

impl Default for ConflictConfig {
    fn default() -> Self {
        Self {
            position_tolerance_m: 50.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FetchConfig {
    /// Per-source fetch timeout. Either source exceeding it aborts the pass.
    pub timeout_secs: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self { timeout_secs: 10 }
    }
}

impl FetchConfig {
    /// Upper bound on `timeout_secs`: one day.
    pub const MAX_TIMEOUT_SECS: u64 = 86_400;

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

// ---------------------------------------------------------------------------
// Parse + Validate
// ---------------------------------------------------------------------------

impl ReconConfig {
    pub fn from_toml(input: &str) -> Result<Self, ReconError> {
        let config: ReconConfig =
            toml::from_str(input).map_err(|e| ReconError::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ReconError> {
        let link = self.matching.link_distance_m;
        if !link.is_finite() || link <= 0.0 {
            return Err(ReconError::ConfigValidation(format!(
                "matching.link_distance_m must be a positive number, got {link}"
            )));
        }

        let similarity = self.matching.name_similarity;
        if !(similarity > 0.0 && similarity <= 1.0) {
            return Err(ReconError::ConfigValidation(format!(
                "matching.name_similarity must be in (0, 1], got {similarity}"
            )));
        }

        let tolerance = self.conflict.position_tolerance_m;
        if !tolerance.is_finite() || tolerance <= 0.0 {
            return Err(ReconError::ConfigValidation(format!(
                "conflict.position_tolerance_m must be a positive number, got {tolerance}"
            )));
        }

        let timeout = self.fetch.timeout_secs;
        if timeout == 0 || timeout > FetchConfig::MAX_TIMEOUT_SECS {
            return Err(ReconError::ConfigValidation(format!(
                "fetch.timeout_secs must be between 1 and {}, got {timeout}",
                FetchConfig::MAX_TIMEOUT_SECS
            )));
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
