//! Store boundary for player standings.
//!
//! This crate defines **only** the snapshot types, the error taxonomy, and
//! the [`StandingStore`] trait. No SQL, no pooling, no retry policy — the
//! Postgres implementation lives in `rlk-db`, the in-memory one in
//! `rlk-testkit`, and retries belong to the service layer.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use rlk_schemas::{LadderMeta, PlayerStanding, TournamentPlacing};

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// A versioned read of one ladder's active roster.
///
/// `version` is the ladder's roster_version at read time; a [`StandingStore::commit`]
/// carrying a stale version fails wholesale with [`StoreError::Conflict`].
/// Standings are ordered by ascending position.
#[derive(Debug, Clone, PartialEq)]
pub struct RosterSnapshot {
    pub meta: LadderMeta,
    pub version: i64,
    pub standings: Vec<PlayerStanding>,
}

impl RosterSnapshot {
    pub fn len(&self) -> usize {
        self.standings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.standings.is_empty()
    }

    pub fn standing_of(&self, player_id: Uuid) -> Option<&PlayerStanding> {
        self.standings.iter().find(|s| s.player_id == player_id)
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors a [`StandingStore`] implementation may return.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The commit's expected roster version was stale. Retryable with a
    /// fresh snapshot; the only error the service retries automatically.
    Conflict { ladder: String, expected_version: i64 },
    /// The referenced ladder or tournament does not exist.
    NotFound { what: &'static str, key: String },
    /// Network / database transport failure. Transient; caller may retry.
    Transport(String),
    /// A stored row could not be decoded into its schema type.
    Decode(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Conflict { ladder, expected_version } => write!(
                f,
                "roster version conflict on ladder {ladder} (expected {expected_version})"
            ),
            Self::NotFound { what, key } => write!(f, "{what} not found: {key}"),
            Self::Transport(msg) => write!(f, "store transport error: {msg}"),
            Self::Decode(msg) => write!(f, "store decode error: {msg}"),
        }
    }
}

impl std::error::Error for StoreError {}

// ---------------------------------------------------------------------------
// Store trait
// ---------------------------------------------------------------------------

/// Durable storage contract for ladders, standings and tournament results.
///
/// Implementations must be object-safe (`Arc<dyn StandingStore>`) and
/// `Send + Sync` so one handle serves every request handler.
///
/// The write surface is deliberately one call: [`commit`](Self::commit)
/// applies a batch of full standing rows and bumps the roster version in a
/// single atomic unit, or fails without writing anything. Position changes,
/// stat increments and eligibility timers always travel together — there is
/// no partial-write path to misuse.
#[async_trait]
pub trait StandingStore: Send + Sync {
    /// Ladder metadata by name.
    async fn ladder_meta(&self, ladder: &str) -> Result<LadderMeta, StoreError>;

    /// Ladder metadata by tier (used by fast-track tier transfer).
    async fn ladder_by_tier(&self, tier: i32) -> Result<Option<LadderMeta>, StoreError>;

    /// Versioned snapshot of one ladder's active roster, ordered by position.
    async fn roster(&self, ladder: &str) -> Result<RosterSnapshot, StoreError>;

    /// A player's standing on any ladder, active or not. Players hold at
    /// most one standing; `None` means the player is unknown to the league.
    async fn find_standing(&self, player_id: Uuid) -> Result<Option<PlayerStanding>, StoreError>;

    /// Atomically upsert `rows` and advance the ladder's roster version from
    /// `expected_version`. Fails wholesale on a stale version; on success the
    /// version becomes `expected_version + 1`.
    async fn commit(
        &self,
        ladder: &str,
        expected_version: i64,
        rows: &[PlayerStanding],
    ) -> Result<(), StoreError>;

    /// Final standings of a tournament, ordered by rank.
    async fn tournament_placings(
        &self,
        tournament_id: Uuid,
    ) -> Result<Vec<TournamentPlacing>, StoreError>;

    /// Mark a tournament completed. Called only after its seed committed.
    async fn mark_tournament_complete(
        &self,
        tournament_id: Uuid,
        completed_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Minimal in-process store proving the trait is object-safe and that
    /// the conflict contract reads the way callers expect.
    struct FixedStore {
        snapshot: Mutex<RosterSnapshot>,
    }

    #[async_trait]
    impl StandingStore for FixedStore {
        async fn ladder_meta(&self, _ladder: &str) -> Result<LadderMeta, StoreError> {
            Ok(self.snapshot.lock().unwrap().meta.clone())
        }

        async fn ladder_by_tier(&self, tier: i32) -> Result<Option<LadderMeta>, StoreError> {
            let meta = self.snapshot.lock().unwrap().meta.clone();
            Ok((meta.tier == tier).then_some(meta))
        }

        async fn roster(&self, _ladder: &str) -> Result<RosterSnapshot, StoreError> {
            Ok(self.snapshot.lock().unwrap().clone())
        }

        async fn find_standing(
            &self,
            player_id: Uuid,
        ) -> Result<Option<PlayerStanding>, StoreError> {
            Ok(self.snapshot.lock().unwrap().standing_of(player_id).cloned())
        }

        async fn commit(
            &self,
            ladder: &str,
            expected_version: i64,
            _rows: &[PlayerStanding],
        ) -> Result<(), StoreError> {
            let mut snap = self.snapshot.lock().unwrap();
            if snap.version != expected_version {
                return Err(StoreError::Conflict {
                    ladder: ladder.to_string(),
                    expected_version,
                });
            }
            snap.version += 1;
            Ok(())
        }

        async fn tournament_placings(
            &self,
            _tournament_id: Uuid,
        ) -> Result<Vec<TournamentPlacing>, StoreError> {
            Ok(Vec::new())
        }

        async fn mark_tournament_complete(
            &self,
            _tournament_id: Uuid,
            _completed_at: DateTime<Utc>,
        ) -> Result<(), StoreError> {
            Ok(())
        }
    }

    fn fixed() -> FixedStore {
        FixedStore {
            snapshot: Mutex::new(RosterSnapshot {
                meta: LadderMeta { name: "main".into(), tier: 0, places_to_pay: 4 },
                version: 7,
                standings: vec![PlayerStanding::new_active(Uuid::new_v4(), "main", 1)],
            }),
        }
    }

    #[tokio::test]
    async fn store_is_object_safe() {
        let store: std::sync::Arc<dyn StandingStore> = std::sync::Arc::new(fixed());
        let snap = store.roster("main").await.unwrap();
        assert_eq!(snap.version, 7);
    }

    #[tokio::test]
    async fn stale_version_conflicts() {
        let store = fixed();
        let err = store.commit("main", 3, &[]).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict { expected_version: 3, .. }));
        store.commit("main", 7, &[]).await.unwrap();
        assert_eq!(store.roster("main").await.unwrap().version, 8);
    }

    #[test]
    fn error_display_is_operator_friendly() {
        let err = StoreError::Conflict { ladder: "main".into(), expected_version: 4 };
        assert_eq!(
            err.to_string(),
            "roster version conflict on ladder main (expected 4)"
        );
    }
}
