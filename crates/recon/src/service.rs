//! The reconciliation service: owns the committed snapshot and runs passes.
//!
//! Readers clone an `Arc<Snapshot>` and never wait on a pass. At most one
//! pass runs at a time; a `refresh()` arriving while one is in flight waits
//! for it and returns its result.

use std::io::Write;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Condvar, Mutex, PoisonError, RwLock};
use std::thread;
use std::time::Instant;

use chrono::{DateTime, Utc};

use crate::adapter::SourceAdapter;
use crate::config::ReconConfig;
use crate::engine::run_pass;
use crate::error::{FetchError, ReconError};
use crate::evidence::{tally, Tally};
use crate::export::write_csv;
use crate::model::{DataQualityWarning, ReconciledEntity, RefreshSummary, SourceId, SourceRecord};
use crate::query::{filter_sorted, get_entities, FilterSpec, PageSpec, QueryResult, SortSpec};
use crate::state::{PassState, StateStore};

/// An immutable committed entity table.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    /// Ordered by id.
    pub entities: Vec<ReconciledEntity>,
    pub committed_at: Option<DateTime<Utc>>,
    /// Data-quality warnings of the pass that produced this snapshot.
    pub warnings: Vec<DataQualityWarning>,
}

impl Snapshot {
    fn from_state(state: PassState, warnings: Vec<DataQualityWarning>) -> Self {
        Self {
            entities: state.entities,
            committed_at: state.committed_at,
            warnings,
        }
    }
}

type PassResult = Result<RefreshSummary, ReconError>;

#[derive(Default)]
struct PassGate {
    running: bool,
    /// Bumped every time a pass finishes.
    generation: u64,
    last: Option<PassResult>,
}

pub struct ReconService {
    config: ReconConfig,
    authority: Arc<dyn SourceAdapter>,
    commercial: Arc<dyn SourceAdapter>,
    store: Arc<dyn StateStore>,
    snapshot: RwLock<Arc<Snapshot>>,
    gate: Mutex<PassGate>,
    pass_done: Condvar,
}

impl ReconService {
    /// Validate the config and serve whatever the store last committed.
    pub fn new(
        config: ReconConfig,
        authority: Arc<dyn SourceAdapter>,
        commercial: Arc<dyn SourceAdapter>,
        store: Arc<dyn StateStore>,
    ) -> Result<Self, ReconError> {
        config.validate()?;
        for (adapter, expected) in [
            (&authority, SourceId::Authority),
            (&commercial, SourceId::Commercial),
        ] {
            if adapter.source() != expected {
                return Err(ReconError::ConfigValidation(format!(
                    "{expected} feed slot given a {} adapter",
                    adapter.source()
                )));
            }
        }

        let previous = store.load_previous_state()?;
        log::debug!(
            "loaded previous state: {} entities, next id {}",
            previous.entities.len(),
            previous.next_id
        );

        Ok(Self {
            config,
            authority,
            commercial,
            store,
            snapshot: RwLock::new(Arc::new(Snapshot::from_state(previous, Vec::new()))),
            gate: Mutex::new(PassGate::default()),
            pass_done: Condvar::new(),
        })
    }

    pub fn config(&self) -> &ReconConfig {
        &self.config
    }

    /// The last committed snapshot.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        let current = self.snapshot.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&*current)
    }

    pub fn current_entities(&self) -> Vec<ReconciledEntity> {
        self.snapshot().entities.clone()
    }

    pub fn get_entities(&self, filter: &FilterSpec, sort: &SortSpec, page: PageSpec) -> QueryResult {
        get_entities(&self.snapshot().entities, filter, sort, page)
    }

    /// Counts over the filtered snapshot.
    pub fn tally(&self, filter: &FilterSpec) -> Tally {
        let snapshot = self.snapshot();
        tally(snapshot.entities.iter().filter(|e| filter.matches(e)))
    }

    /// Write the filtered and sorted snapshot as CSV.
    pub fn export_csv<W: Write>(
        &self,
        filter: &FilterSpec,
        sort: &SortSpec,
        out: W,
    ) -> Result<usize, ReconError> {
        let snapshot = self.snapshot();
        let rows = filter_sorted(&snapshot.entities, filter, sort);
        write_csv(out, rows.iter().copied())?;
        Ok(rows.len())
    }

    /// Run a pass, or join the one already in flight.
    pub fn refresh(&self) -> Result<RefreshSummary, ReconError> {
        let mut gate = self.gate.lock().unwrap_or_else(PoisonError::into_inner);
        if gate.running {
            let joined = gate.generation;
            log::debug!("refresh joined in-flight pass");
            while gate.running && gate.generation == joined {
                gate = self
                    .pass_done
                    .wait(gate)
                    .unwrap_or_else(PoisonError::into_inner);
            }
            return gate.last.clone().unwrap_or(Err(ReconError::PassAborted));
        }
        gate.running = true;
        drop(gate);

        let in_flight = InFlight {
            service: self,
            result: None,
        };
        let result = self.run_pass();
        in_flight.finish(result)
    }

    fn run_pass(&self) -> PassResult {
        let started = Instant::now();
        log::info!("reconciliation pass started");

        let previous = self.store.load_previous_state()?;
        let (authority, commercial) = self.fetch_both()?;

        let outcome = run_pass(&self.config, &authority, &commercial, &previous);
        let mut state = outcome.state;
        state.committed_at = Some(Utc::now());
        self.store.save_pass_state(&state)?;

        let summary = outcome.summary;
        let snapshot = Arc::new(Snapshot::from_state(state, summary.warnings.clone()));
        *self.snapshot.write().unwrap_or_else(PoisonError::into_inner) = snapshot;

        log::info!(
            "pass committed in {:?}: {} entities ({} new, {} updated, {} conflict, {} removed, {} evicted), {} warnings",
            started.elapsed(),
            summary.entity_count,
            summary.new_count,
            summary.updated_count,
            summary.conflict_count,
            summary.removed_count,
            summary.evicted_count,
            summary.warnings.len()
        );
        Ok(summary)
    }

    /// Fetch both feeds concurrently under one shared deadline.
    ///
    /// A worker still running at the deadline is left detached; its result
    /// is dropped.
    fn fetch_both(&self) -> Result<(Vec<SourceRecord>, Vec<SourceRecord>), ReconError> {
        let timeout = self.config.fetch.timeout();
        // No representable deadline means wait for the workers.
        let deadline = Instant::now().checked_add(timeout);
        let (tx, rx) = mpsc::channel::<(SourceId, Result<Vec<SourceRecord>, FetchError>)>();

        for adapter in [&self.authority, &self.commercial] {
            let adapter = Arc::clone(adapter);
            let feed = adapter.source();
            let tx = tx.clone();
            thread::Builder::new()
                .name(format!("fetch-{feed}"))
                .spawn(move || {
                    let _ = tx.send((feed, adapter.fetch_records()));
                })
                .map_err(|e| ReconError::Worker(e.to_string()))?;
        }
        drop(tx);

        let mut authority = None;
        let mut commercial = None;
        for _ in 0..2 {
            let pending = if authority.is_none() {
                SourceId::Authority
            } else {
                SourceId::Commercial
            };
            let received = match deadline {
                Some(deadline) => {
                    rx.recv_timeout(deadline.saturating_duration_since(Instant::now()))
                }
                None => rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
            };
            match received {
                Ok((feed, Ok(mut records))) => {
                    for record in &mut records {
                        record.source = feed;
                    }
                    log::info!("{feed} feed returned {} records", records.len());
                    match feed {
                        SourceId::Authority => authority = Some(records),
                        SourceId::Commercial => commercial = Some(records),
                    }
                }
                Ok((feed, Err(error))) => {
                    log::warn!("{feed} feed failed: {error}");
                    return Err(ReconError::Fetch { feed, error });
                }
                Err(RecvTimeoutError::Timeout) => {
                    log::warn!("{pending} feed timed out after {timeout:?}");
                    return Err(ReconError::Fetch {
                        feed: pending,
                        error: FetchError::Timeout {
                            after_secs: self.config.fetch.timeout_secs,
                        },
                    });
                }
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(ReconError::Fetch {
                        feed: pending,
                        error: FetchError::Unreachable(
                            "fetch worker exited without a result".into(),
                        ),
                    });
                }
            }
        }

        match (authority, commercial) {
            (Some(a), Some(c)) => Ok((a, c)),
            _ => Err(ReconError::PassAborted),
        }
    }
}

/// Clears the pass gate when the pass ends, including by panic, and wakes
/// joined callers.
struct InFlight<'a> {
    service: &'a ReconService,
    result: Option<PassResult>,
}

impl InFlight<'_> {
    fn finish(mut self, result: PassResult) -> PassResult {
        self.result = Some(result.clone());
        result
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let mut gate = self
            .service
            .gate
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        gate.running = false;
        gate.generation += 1;
        gate.last = self.result.take();
        drop(gate);
        self.service.pass_done.notify_all();
    }
}
