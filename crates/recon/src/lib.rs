//! `roadsigns-recon`: two-registry road-sign reconciliation engine.
//!
//! Links authority and commercial sign records into one entity table,
//! classifies every entity (new / updated / conflict / removed) and serves
//! filtered, sorted, paginated views over the last committed pass.
//!
//! The pass itself ([`engine::run_pass`]) is pure. Fetching, persistence and
//! snapshot management live in [`service::ReconService`] behind the
//! [`SourceAdapter`] and [`StateStore`] traits.

pub mod adapter;
pub mod classify;
pub mod config;
pub mod engine;
pub mod error;
pub mod evidence;
pub mod export;
pub mod geo;
pub mod matcher;
pub mod model;
pub mod query;
pub mod service;
pub mod state;

pub use adapter::{FixtureAdapter, SourceAdapter};
pub use config::ReconConfig;
pub use engine::{run_pass, PassOutcome};
pub use error::{FetchError, ReconError};
pub use model::{
    Coverage, DataQualityWarning, EntityId, GeoPoint, ReconciledEntity, RefreshSummary,
    SignStatus, SourceId, SourceRecord,
};
pub use query::{FilterSpec, PageSpec, QueryResult, SortDirection, SortKey, SortSpec, SourceFilter};
pub use service::{ReconService, Snapshot};
pub use state::{MemoryStateStore, PassState, StateStore};
