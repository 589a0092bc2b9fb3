//! In-memory [`StandingStore`] with the same observable semantics as the
//! Postgres store: versioned per-ladder commits, wholesale failure on a
//! stale version, and no partial application. Scenario tests can script
//! commit failures to exercise the service's retry and abort paths.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use rlk_schemas::{LadderMeta, PlayerStanding, TournamentPlacing};
use rlk_store::{RosterSnapshot, StandingStore, StoreError};

#[derive(Default)]
struct Inner {
    ladders: BTreeMap<String, LadderState>,
    players: HashMap<Uuid, PlayerStanding>,
    tournaments: HashMap<Uuid, TournamentState>,
    /// Scripted commit outcomes, consumed front-first. An entry makes the
    /// next commit fail with that error *without* applying any write.
    fail_script: VecDeque<StoreError>,
    commits: u64,
}

struct LadderState {
    meta: LadderMeta,
    version: i64,
}

struct TournamentState {
    placings: Vec<TournamentPlacing>,
    completed: bool,
    completed_at: Option<DateTime<Utc>>,
}

/// Shared in-memory store for tests.
#[derive(Default)]
pub struct MemoryStandingStore {
    inner: Mutex<Inner>,
}

impl MemoryStandingStore {
    pub fn new() -> Self {
        Self::default()
    }

    // -- setup ------------------------------------------------------------

    pub fn add_ladder(&self, name: &str, tier: i32, places_to_pay: i32) {
        let mut inner = self.inner.lock().unwrap();
        inner.ladders.insert(
            name.to_string(),
            LadderState {
                meta: LadderMeta { name: name.to_string(), tier, places_to_pay },
                version: 0,
            },
        );
    }

    /// Seed `n` fresh players at positions 1..=n; returns their ids in
    /// position order.
    pub fn seed_roster(&self, ladder: &str, n: i32) -> Vec<Uuid> {
        let mut inner = self.inner.lock().unwrap();
        let mut ids = Vec::with_capacity(n as usize);
        for pos in 1..=n {
            let id = Uuid::new_v4();
            inner
                .players
                .insert(id, PlayerStanding::new_active(id, ladder, pos));
            ids.push(id);
        }
        ids
    }

    /// Overwrite one standing row directly (fixture adjustment, bypassing
    /// version checks — setup only).
    pub fn put_standing(&self, row: PlayerStanding) {
        self.inner.lock().unwrap().players.insert(row.player_id, row);
    }

    pub fn add_tournament(&self, tournament_id: Uuid, placings: Vec<(Uuid, i32)>) {
        let mut inner = self.inner.lock().unwrap();
        inner.tournaments.insert(
            tournament_id,
            TournamentState {
                placings: placings
                    .into_iter()
                    .map(|(player_id, final_rank)| TournamentPlacing {
                        tournament_id,
                        player_id,
                        final_rank,
                    })
                    .collect(),
                completed: false,
                completed_at: None,
            },
        );
    }

    // -- failure injection ------------------------------------------------

    /// Make the next commit fail with `err` without applying anything.
    pub fn push_commit_failure(&self, err: StoreError) {
        self.inner.lock().unwrap().fail_script.push_back(err);
    }

    /// Convenience: script `n` consecutive version conflicts on `ladder`.
    pub fn push_conflicts(&self, ladder: &str, n: usize) {
        let mut inner = self.inner.lock().unwrap();
        for _ in 0..n {
            inner.fail_script.push_back(StoreError::Conflict {
                ladder: ladder.to_string(),
                expected_version: -1,
            });
        }
    }

    // -- inspection --------------------------------------------------------

    pub fn commit_count(&self) -> u64 {
        self.inner.lock().unwrap().commits
    }

    pub fn standing(&self, player_id: Uuid) -> Option<PlayerStanding> {
        self.inner.lock().unwrap().players.get(&player_id).cloned()
    }

    pub fn version_of(&self, ladder: &str) -> Option<i64> {
        self.inner.lock().unwrap().ladders.get(ladder).map(|l| l.version)
    }

    pub fn tournament_completed(&self, tournament_id: Uuid) -> Option<bool> {
        self.inner
            .lock()
            .unwrap()
            .tournaments
            .get(&tournament_id)
            .map(|t| t.completed)
    }

    /// Active positions on a ladder in position order — the assertion
    /// helper every contiguity check uses.
    pub fn active_positions(&self, ladder: &str) -> Vec<(Uuid, i32)> {
        let inner = self.inner.lock().unwrap();
        let mut rows: Vec<(Uuid, i32)> = inner
            .players
            .values()
            .filter(|s| s.ladder == ladder && s.active)
            .filter_map(|s| s.position.map(|p| (s.player_id, p)))
            .collect();
        rows.sort_by_key(|(_, p)| *p);
        rows
    }
}

#[async_trait]
impl StandingStore for MemoryStandingStore {
    async fn ladder_meta(&self, ladder: &str) -> Result<LadderMeta, StoreError> {
        let inner = self.inner.lock().unwrap();
        inner
            .ladders
            .get(ladder)
            .map(|l| l.meta.clone())
            .ok_or(StoreError::NotFound { what: "ladder", key: ladder.to_string() })
    }

    async fn ladder_by_tier(&self, tier: i32) -> Result<Option<LadderMeta>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .ladders
            .values()
            .find(|l| l.meta.tier == tier)
            .map(|l| l.meta.clone()))
    }

    async fn roster(&self, ladder: &str) -> Result<RosterSnapshot, StoreError> {
        let inner = self.inner.lock().unwrap();
        let state = inner
            .ladders
            .get(ladder)
            .ok_or(StoreError::NotFound { what: "ladder", key: ladder.to_string() })?;

        let mut standings: Vec<PlayerStanding> = inner
            .players
            .values()
            .filter(|s| s.ladder == ladder && s.active)
            .cloned()
            .collect();
        standings.sort_by_key(|s| s.position.unwrap_or(i32::MAX));

        Ok(RosterSnapshot {
            meta: state.meta.clone(),
            version: state.version,
            standings,
        })
    }

    async fn find_standing(&self, player_id: Uuid) -> Result<Option<PlayerStanding>, StoreError> {
        Ok(self.inner.lock().unwrap().players.get(&player_id).cloned())
    }

    async fn commit(
        &self,
        ladder: &str,
        expected_version: i64,
        rows: &[PlayerStanding],
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        inner.commits += 1;

        if let Some(err) = inner.fail_script.pop_front() {
            return Err(err);
        }

        let state = inner
            .ladders
            .get_mut(ladder)
            .ok_or(StoreError::NotFound { what: "ladder", key: ladder.to_string() })?;
        if state.version != expected_version {
            return Err(StoreError::Conflict {
                ladder: ladder.to_string(),
                expected_version,
            });
        }
        state.version += 1;

        for row in rows {
            inner.players.insert(row.player_id, row.clone());
        }
        Ok(())
    }

    async fn tournament_placings(
        &self,
        tournament_id: Uuid,
    ) -> Result<Vec<TournamentPlacing>, StoreError> {
        let inner = self.inner.lock().unwrap();
        let t = inner.tournaments.get(&tournament_id).ok_or(StoreError::NotFound {
            what: "tournament",
            key: tournament_id.to_string(),
        })?;
        let mut placings = t.placings.clone();
        placings.sort_by_key(|p| p.final_rank);
        Ok(placings)
    }

    async fn mark_tournament_complete(
        &self,
        tournament_id: Uuid,
        completed_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let t = inner
            .tournaments
            .get_mut(&tournament_id)
            .ok_or(StoreError::NotFound { what: "tournament", key: tournament_id.to_string() })?;
        t.completed = true;
        t.completed_at = Some(completed_at);
        Ok(())
    }
}
