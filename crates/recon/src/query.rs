//! Filtering, sorting and pagination over a committed snapshot.
//!
//! Queries never fail: an empty filter result or a page past the end is just
//! an empty page.

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::num::NonZeroUsize;

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

use crate::model::{ReconciledEntity, SignStatus};

// ---------------------------------------------------------------------------
// Filter
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceFilter {
    #[default]
    All,
    /// Authority side present, regardless of the commercial side.
    AuthorityOnly,
    /// Commercial side present, regardless of the authority side.
    CommercialOnly,
    Both,
}

impl SourceFilter {
    pub fn matches(self, entity: &ReconciledEntity) -> bool {
        match self {
            Self::All => true,
            Self::AuthorityOnly => entity.authority.is_some(),
            Self::CommercialOnly => entity.commercial.is_some(),
            Self::Both => entity.authority.is_some() && entity.commercial.is_some(),
        }
    }
}

/// Predicates are ANDed. Empty `statuses` and empty `search_query` match
/// everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterSpec {
    pub source: SourceFilter,
    pub statuses: BTreeSet<SignStatus>,
    pub search_query: String,
}

impl FilterSpec {
    pub fn matches(&self, entity: &ReconciledEntity) -> bool {
        if !self.source.matches(entity) {
            return false;
        }
        if !self.statuses.is_empty() && !self.statuses.contains(&entity.status) {
            return false;
        }
        self.search_query.is_empty()
            || entity
                .name
                .to_lowercase()
                .contains(&self.search_query.to_lowercase())
    }
}

// ---------------------------------------------------------------------------
// Sort
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    #[default]
    Name,
    SourceRichness,
    StatusWeight,
    Position,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SortSpec {
    pub key: SortKey,
    pub direction: SortDirection,
}

impl SortSpec {
    pub fn new(key: SortKey, direction: SortDirection) -> Self {
        Self { key, direction }
    }

    fn compare(&self, a: &ReconciledEntity, b: &ReconciledEntity) -> Ordering {
        let ord = match self.key {
            SortKey::Name => a
                .name
                .to_lowercase()
                .cmp(&b.name.to_lowercase())
                .then_with(|| a.name.cmp(&b.name)),
            SortKey::SourceRichness => a.coverage().richness().cmp(&b.coverage().richness()),
            SortKey::StatusWeight => a.status.weight().cmp(&b.status.weight()),
            SortKey::Position => (OrderedFloat(a.position.lat), OrderedFloat(a.position.lon))
                .cmp(&(OrderedFloat(b.position.lat), OrderedFloat(b.position.lon))),
        };
        match self.direction {
            SortDirection::Ascending => ord,
            SortDirection::Descending => ord.reverse(),
        }
    }
}

// ---------------------------------------------------------------------------
// Page
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageSpec {
    pub index: usize,
    pub size: NonZeroUsize,
}

impl PageSpec {
    pub const DEFAULT_SIZE: NonZeroUsize = match NonZeroUsize::new(50) {
        Some(n) => n,
        None => unreachable!(),
    };

    pub fn new(index: usize, size: NonZeroUsize) -> Self {
        Self { index, size }
    }

    /// A single page large enough to hold `len` items.
    pub fn everything(len: usize) -> Self {
        Self {
            index: 0,
            size: NonZeroUsize::new(len).unwrap_or(NonZeroUsize::MIN),
        }
    }

    fn range(&self, len: usize) -> std::ops::Range<usize> {
        let start = self.index.saturating_mul(self.size.get()).min(len);
        let end = start.saturating_add(self.size.get()).min(len);
        start..end
    }
}

impl Default for PageSpec {
    fn default() -> Self {
        Self::new(0, Self::DEFAULT_SIZE)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResult {
    pub items: Vec<ReconciledEntity>,
    /// Size of the filtered set before pagination.
    pub total_count: usize,
}

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

/// Filtered entities in sort order. Input is expected in id order; equal
/// keys keep that order.
pub fn filter_sorted<'a>(
    entities: &'a [ReconciledEntity],
    filter: &FilterSpec,
    sort: &SortSpec,
) -> Vec<&'a ReconciledEntity> {
    let mut hits: Vec<&ReconciledEntity> = entities.iter().filter(|e| filter.matches(e)).collect();
    hits.sort_by(|a, b| sort.compare(a, b));
    hits
}

pub fn get_entities(
    entities: &[ReconciledEntity],
    filter: &FilterSpec,
    sort: &SortSpec,
    page: PageSpec,
) -> QueryResult {
    let hits = filter_sorted(entities, filter, sort);
    let total_count = hits.len();
    let items = hits[page.range(total_count)]
        .iter()
        .map(|e| (*e).clone())
        .collect();
    QueryResult { items, total_count }
}
