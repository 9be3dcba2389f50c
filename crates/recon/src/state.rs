//! Previous-pass state and the store it is persisted through.

use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ReconError;
use crate::model::{EntityId, Link, ReconciledEntity};

pub const STATE_VERSION: u32 = 1;

/// Everything a pass needs from the one before it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PassState {
    pub version: u32,
    /// Next id to allocate. Monotonic; evicted ids are never handed out again.
    pub next_id: u64,
    pub links: Vec<Link>,
    /// Ordered by id.
    pub entities: Vec<ReconciledEntity>,
    pub committed_at: Option<DateTime<Utc>>,
}

impl Default for PassState {
    fn default() -> Self {
        Self {
            version: STATE_VERSION,
            next_id: 1,
            links: Vec::new(),
            entities: Vec::new(),
            committed_at: None,
        }
    }
}

impl PassState {
    pub fn new(entities: Vec<ReconciledEntity>, next_id: u64) -> Self {
        let links = entities.iter().map(ReconciledEntity::link).collect();
        Self {
            version: STATE_VERSION,
            next_id,
            links,
            entities,
            committed_at: None,
        }
    }

    pub fn entity(&self, id: EntityId) -> Option<&ReconciledEntity> {
        self.entities
            .binary_search_by_key(&id, |e| e.id)
            .ok()
            .map(|i| &self.entities[i])
    }

    /// Order entities by id and rebuild links from them, for state that did
    /// not come out of a pass (a file on disk). Repeated ids are an error.
    pub fn into_checked(mut self) -> Result<Self, ReconError> {
        self.entities.sort_by_key(|e| e.id);
        if let Some(pair) = self.entities.windows(2).find(|w| w[0].id == w[1].id) {
            return Err(ReconError::State(format!(
                "entity id {} appears more than once",
                pair[0].id
            )));
        }
        self.links = self.entities.iter().map(ReconciledEntity::link).collect();
        Ok(self)
    }

    /// Smallest id that is safe to allocate, even if `next_id` was lost or
    /// hand-edited.
    pub fn first_free_id(&self) -> u64 {
        let max_seen = self.entities.iter().map(|e| e.id.0).max().unwrap_or(0);
        self.next_id.max(max_seen + 1)
    }
}

/// Where previous-pass links and entities live between passes.
pub trait StateStore: Send + Sync {
    /// Empty state when nothing was saved yet.
    fn load_previous_state(&self) -> Result<PassState, ReconError>;

    fn save_pass_state(&self, state: &PassState) -> Result<(), ReconError>;
}

/// In-memory store, for tests and embedders that persist elsewhere.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    state: Mutex<PassState>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(state: PassState) -> Self {
        Self {
            state: Mutex::new(state),
        }
    }

    pub fn snapshot(&self) -> PassState {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl StateStore for MemoryStateStore {
    fn load_previous_state(&self) -> Result<PassState, ReconError> {
        Ok(self.snapshot())
    }

    fn save_pass_state(&self, state: &PassState) -> Result<(), ReconError> {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state.clone();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{GeoPoint, SignStatus, SourceSide};
    use chrono::TimeZone;

    fn entity(id: u64) -> ReconciledEntity {
        let side = SourceSide {
            key: format!("G{id}"),
            external_id: Some(format!("G{id}")),
            name: "Stop".into(),
            position: GeoPoint::new(55.0, 37.0),
            description: None,
            observed_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        };
        ReconciledEntity {
            id: EntityId(id),
            name: "Stop".into(),
            position: side.position,
            authority: Some(side),
            commercial: None,
            status: SignStatus::New,
            flagged: false,
        }
    }

    #[test]
    fn new_derives_links() {
        let state = PassState::new(vec![entity(1), entity(4)], 5);
        assert_eq!(state.links.len(), 2);
        assert_eq!(state.links[1].authority.as_deref(), Some("G4"));
        assert_eq!(state.links[1].commercial, None);
        assert_eq!(state.entity(EntityId(4)).map(|e| e.id), Some(EntityId(4)));
        assert!(state.entity(EntityId(2)).is_none());
    }

    #[test]
    fn checked_state_is_ordered_with_fresh_links() {
        let mut state = PassState::new(vec![entity(1), entity(4)], 5);
        state.entities.reverse();
        state.links.clear();
        let state = state.into_checked().unwrap();
        assert_eq!(state.entity(EntityId(1)).map(|e| e.id), Some(EntityId(1)));
        assert_eq!(state.links.len(), 2);

        let twice = PassState::new(vec![entity(2), entity(2)], 3);
        assert!(matches!(twice.into_checked(), Err(ReconError::State(_))));
    }

    #[test]
    fn first_free_id_never_collides() {
        let mut state = PassState::new(vec![entity(1), entity(9)], 3);
        assert_eq!(state.first_free_id(), 10);
        state.next_id = 12;
        assert_eq!(state.first_free_id(), 12);
        assert_eq!(PassState::default().first_free_id(), 1);
    }

    #[test]
    fn memory_store_round_trip() {
        let store = MemoryStateStore::new();
        assert_eq!(store.load_previous_state().unwrap(), PassState::default());
        let state = PassState::new(vec![entity(1)], 2);
        store.save_pass_state(&state).unwrap();
        assert_eq!(store.load_previous_state().unwrap(), state);
    }

    #[test]
    fn state_survives_json() {
        let state = PassState::new(vec![entity(1)], 2);
        let json = serde_json::to_string(&state).unwrap();
        let back: PassState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, state);
    }
}
