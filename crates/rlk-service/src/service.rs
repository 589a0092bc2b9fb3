use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, warn};
use uuid::Uuid;

use rlk_ranking::{climber, eligibility, plan_match, plan_reindex, plan_seeding};
use rlk_ranking::{PositionOverride, PositionWrite};
use rlk_schemas::{ClimberSummary, LeagueRules, MatchType, PlayerStanding};
use rlk_store::{RosterSnapshot, StandingStore, StoreError};

use crate::types::{
    FastTrackChoice, FastTrackSummary, MatchApplied, SeedReport, ServiceError,
};

/// Conflict is the only error retried automatically; everything else
/// propagates on the first occurrence.
const MAX_COMMIT_ATTEMPTS: u32 = 3;

/// Stateless orchestrator over a shared [`StandingStore`].
///
/// The only in-process state is a per-ladder mutex map serializing local
/// writers; cross-process races are caught by the store's versioned commit.
/// Every mutating flow is: lock ladder → fresh snapshot → pure plan →
/// single commit. Failures leave the store exactly as it was.
pub struct LadderService {
    store: Arc<dyn StandingStore>,
    rules: LeagueRules,
    tz: Tz,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl LadderService {
    pub fn new(store: Arc<dyn StandingStore>, rules: LeagueRules) -> Result<Self, ServiceError> {
        let tz: Tz = rules
            .timezone
            .parse()
            .map_err(|_| ServiceError::Config(format!("unknown league timezone: {}", rules.timezone)))?;
        Ok(Self {
            store,
            rules,
            tz,
            locks: Mutex::new(HashMap::new()),
        })
    }

    pub fn rules(&self) -> &LeagueRules {
        &self.rules
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// Versioned active roster, ordered by position.
    pub async fn roster(&self, ladder: &str) -> Result<RosterSnapshot, ServiceError> {
        self.store.roster(ladder).await.map_err(ServiceError::Store)
    }

    /// Current most-improved player. `places_to_pay` defaults to the
    /// ladder's configured paid bracket.
    pub async fn get_current_climber(
        &self,
        ladder: &str,
        places_to_pay: Option<i32>,
    ) -> Result<Option<ClimberSummary>, ServiceError> {
        let snap = self.roster(ladder).await?;
        let places = places_to_pay.unwrap_or(snap.meta.places_to_pay);
        Ok(climber::current_climber(&snap.standings, places))
    }

    /// Immunity predicate. Whether an immune player can be challenged at all
    /// is the challenge-creation flow's decision, not the engine's.
    pub async fn has_immunity(&self, player_id: Uuid) -> Result<bool, ServiceError> {
        let s = self.require_standing(player_id).await?;
        Ok(eligibility::has_immunity(&s, Utc::now()))
    }

    /// Whether the player may decline another challenge this month.
    pub async fn can_decline(&self, player_id: Uuid) -> Result<bool, ServiceError> {
        let s = self.require_standing(player_id).await?;
        Ok(eligibility::can_decline(&self.rules, &s, self.tz, Utc::now()))
    }

    // -----------------------------------------------------------------------
    // Match results
    // -----------------------------------------------------------------------

    /// Apply one match result: stats, eligibility effects, and the
    /// match-type-specific reorder, committed as one unit.
    pub async fn apply_match_result(
        &self,
        match_type: MatchType,
        winner_id: Uuid,
        loser_id: Uuid,
        ladder: &str,
    ) -> Result<MatchApplied, ServiceError> {
        // Classify missing/cross-ladder players before taking the lock, so a
        // doomed call never contends with real writers.
        self.require_on_ladder(winner_id, ladder).await?;
        self.require_on_ladder(loser_id, ladder).await?;

        let _guard = self.lock_ladder(ladder).await;
        let rules = &self.rules;
        let tz = self.tz;

        self.mutate_roster(ladder, |snap, now| {
            let winner = snap
                .standing_of(winner_id)
                .ok_or(ServiceError::StandingNotFound { player_id: winner_id })?
                .clone();
            let loser = snap
                .standing_of(loser_id)
                .ok_or(ServiceError::StandingNotFound { player_id: loser_id })?
                .clone();

            // Smackback precondition, before any mutation is planned.
            if match_type == MatchType::Smackback
                && !eligibility::smackback_allowed(&winner, now)
            {
                return Err(ServiceError::NotEligible {
                    player_id: winner_id,
                    reason: "smackback window is not open".to_string(),
                });
            }

            let plan = plan_match(rules, match_type, &winner, &loser, now)?;

            // Reindex over the roster with the winner/loser rows replaced,
            // so committed rows carry stats and final positions together.
            let mut rows: Vec<PlayerStanding> = snap.standings.clone();
            for r in rows.iter_mut() {
                if r.player_id == winner_id {
                    *r = plan.winner.clone();
                } else if r.player_id == loser_id {
                    *r = plan.loser.clone();
                }
            }

            let reindex = plan_reindex(&rows, &plan.overrides)?;

            for r in rows.iter_mut() {
                if let Some(w) = reindex.writes.iter().find(|w| w.player_id == r.player_id) {
                    r.position = Some(w.position);
                    climber::roll_baseline(r, w.position, tz, now);
                }
            }

            // Commit the movers plus the two stat rows, nothing else.
            let commit: Vec<PlayerStanding> = rows
                .into_iter()
                .filter(|r| {
                    r.player_id == winner_id
                        || r.player_id == loser_id
                        || reindex.writes.iter().any(|w| w.player_id == r.player_id)
                })
                .collect();

            Ok((
                commit,
                MatchApplied {
                    ladder: ladder.to_string(),
                    match_type,
                    winner_id,
                    loser_id,
                    new_positions: reindex.writes.clone(),
                },
            ))
        })
        .await
    }

    // -----------------------------------------------------------------------
    // Seeding
    // -----------------------------------------------------------------------

    /// Seed the ladder from final tournament standings in one reindex pass.
    pub async fn seed_from_tournament(
        &self,
        tournament_id: Uuid,
        ladder: &str,
    ) -> Result<SeedReport, ServiceError> {
        let placings = self
            .store
            .tournament_placings(tournament_id)
            .await
            .map_err(ServiceError::Store)?;

        let _guard = self.lock_ladder(ladder).await;
        self.mutate_roster(ladder, |snap, _now| {
            let seed = plan_seeding(&placings, &snap.standings);
            let reindex = plan_reindex(&snap.standings, &seed.overrides)?;

            let mut rows = snap.standings.clone();
            let mut commit = Vec::new();
            for r in rows.iter_mut() {
                if let Some(w) = reindex.writes.iter().find(|w| w.player_id == r.player_id) {
                    r.position = Some(w.position);
                    commit.push(r.clone());
                }
            }

            Ok((
                commit,
                SeedReport {
                    ladder: ladder.to_string(),
                    tournament_id,
                    seeded_count: seed.seeded_count,
                    shifted_count: seed.shifted_count,
                    needs_manual_add: seed.needs_manual_add.clone(),
                },
            ))
        })
        .await
    }

    /// Rebase every active player's climber baseline onto the current
    /// positions — used at quarter rollover and right after a seed.
    pub async fn initialize_new_period(&self, ladder: &str) -> Result<(), ServiceError> {
        let _guard = self.lock_ladder(ladder).await;
        let tz = self.tz;
        self.mutate_roster(ladder, |snap, now| {
            let mut rows = snap.standings.clone();
            climber::reset_for_new_period(&mut rows, tz, now);
            Ok((rows, ()))
        })
        .await
    }

    /// Seed → new climber period → mark the tournament completed. Any
    /// failure leaves the tournament incomplete; there is no
    /// partially-completed state to clean up.
    pub async fn complete_tournament_and_seed_ladder(
        &self,
        tournament_id: Uuid,
        ladder: &str,
    ) -> Result<SeedReport, ServiceError> {
        let report = self.seed_from_tournament(tournament_id, ladder).await?;
        self.initialize_new_period(ladder).await?;
        self.store
            .mark_tournament_complete(tournament_id, Utc::now())
            .await
            .map_err(ServiceError::Store)?;
        Ok(report)
    }

    // -----------------------------------------------------------------------
    // Fast track / declines
    // -----------------------------------------------------------------------

    /// Resolve a fast-track tier-down offer.
    ///
    /// "stay" changes nothing. "move_down" deactivates the standing on the
    /// current ladder (compacting the slots below), appends the player to
    /// the bottom of the adjacent lower ladder, opens the fast-track window,
    /// and carries win/loss totals on the same row.
    pub async fn submit_fast_track_choice(
        &self,
        player_id: Uuid,
        choice: FastTrackChoice,
    ) -> Result<FastTrackSummary, ServiceError> {
        let standing = self.require_standing(player_id).await?;

        if choice == FastTrackChoice::Stay {
            return Ok(FastTrackSummary {
                player_id,
                choice,
                ladder: standing.ladder,
                position: standing.position,
                fast_track_challenges_remaining: standing.fast_track_challenges_remaining,
            });
        }

        let source = self
            .store
            .ladder_meta(&standing.ladder)
            .await
            .map_err(ServiceError::Store)?;
        let target = self
            .store
            .ladder_by_tier(source.tier + 1)
            .await
            .map_err(ServiceError::Store)?
            .ok_or_else(|| ServiceError::NotEligible {
                player_id,
                reason: format!("no ladder below {}", source.name),
            })?;

        // Both locks, tier order, so two concurrent transfers cannot
        // deadlock each other.
        let _guard_src = self.lock_ladder(&source.name).await;
        let _guard_dst = self.lock_ladder(&target.name).await;

        let tz = self.tz;

        // 1) Leave the source ladder; everyone below compacts up.
        let moved = self
            .mutate_roster(&source.name, |snap, now| {
                let row = snap
                    .standing_of(player_id)
                    .ok_or(ServiceError::StandingNotFound { player_id })?
                    .clone();

                let mut remaining: Vec<PlayerStanding> = snap
                    .standings
                    .iter()
                    .filter(|s| s.player_id != player_id)
                    .cloned()
                    .collect();
                let plan = plan_reindex(&remaining, &[])?;

                let mut off = row.clone();
                off.active = false;
                off.position = None;

                let mut commit = vec![off];
                for r in remaining.iter_mut() {
                    if let Some(w) = plan.writes.iter().find(|w| w.player_id == r.player_id) {
                        r.position = Some(w.position);
                        climber::roll_baseline(r, w.position, tz, now);
                        commit.push(r.clone());
                    }
                }

                Ok((commit, row))
            })
            .await?;

        // 2) Join the bottom of the lower ladder with a fresh window and a
        //    fresh climb baseline. Stats ride along on the row.
        let rules = &self.rules;
        let target_name = target.name.clone();
        self.mutate_roster(&target.name, move |snap, now| {
            let mut row = moved.clone();
            let pos = snap.len() as i32 + 1;
            row.ladder = target_name.clone();
            row.active = true;
            row.position = Some(pos);
            eligibility::grant_fast_track(rules, &mut row, now);
            row.period_start_position = Some(pos);
            row.period_start_date = Some(climber::quarter_start(tz, now));
            row.positions_climbed = 0;
            Ok((
                vec![row.clone()],
                FastTrackSummary {
                    player_id,
                    choice,
                    ladder: target_name.clone(),
                    position: Some(pos),
                    fast_track_challenges_remaining: row.fast_track_challenges_remaining,
                },
            ))
        })
        .await
    }

    /// Start the 14-day fast-track grace timer. Timer only; nobody moves.
    pub async fn start_fast_track_grace(&self, player_id: Uuid) -> Result<(), ServiceError> {
        let standing = self.require_standing(player_id).await?;
        let ladder = standing.ladder.clone();
        let _guard = self.lock_ladder(&ladder).await;
        let rules = &self.rules;
        self.mutate_roster(&ladder, |snap, now| {
            let mut row = snap
                .standing_of(player_id)
                .ok_or(ServiceError::StandingNotFound { player_id })?
                .clone();
            eligibility::start_grace_period(rules, &mut row, now);
            Ok((vec![row], ()))
        })
        .await
    }

    /// Spend one monthly decline.
    pub async fn record_decline(&self, player_id: Uuid) -> Result<(), ServiceError> {
        let standing = self.require_standing(player_id).await?;
        let ladder = standing.ladder.clone();
        let _guard = self.lock_ladder(&ladder).await;
        let rules = &self.rules;
        let tz = self.tz;
        self.mutate_roster(&ladder, |snap, now| {
            let mut row = snap
                .standing_of(player_id)
                .ok_or(ServiceError::StandingNotFound { player_id })?
                .clone();
            eligibility::record_decline(rules, &mut row, tz, now).map_err(|e| {
                ServiceError::NotEligible { player_id, reason: e.to_string() }
            })?;
            Ok((vec![row], ()))
        })
        .await
    }

    // -----------------------------------------------------------------------
    // Roster lifecycle
    // -----------------------------------------------------------------------

    /// Add a player, at the tail by default or at an admin-chosen slot
    /// (shifting everyone at and after that slot down by one).
    pub async fn add_player(
        &self,
        ladder: &str,
        player_id: Uuid,
        slot: Option<i32>,
    ) -> Result<Vec<PositionWrite>, ServiceError> {
        if let Some(existing) = self
            .store
            .find_standing(player_id)
            .await
            .map_err(ServiceError::Store)?
        {
            return Err(ServiceError::AlreadyOnLadder {
                player_id,
                ladder: existing.ladder,
            });
        }

        let _guard = self.lock_ladder(ladder).await;
        let tz = self.tz;
        self.mutate_roster(ladder, |snap, now| {
            let tail = snap.len() as i32 + 1;
            let mut row = PlayerStanding::new_active(player_id, ladder, tail);
            row.period_start_date = Some(climber::quarter_start(tz, now));
            row.period_start_position = Some(tail);

            let mut roster = snap.standings.clone();
            roster.push(row);

            let overrides = match slot {
                Some(target) => vec![PositionOverride { player_id, target }],
                None => Vec::new(),
            };
            let plan = plan_reindex(&roster, &overrides)?;

            let mut commit = Vec::new();
            for r in roster.iter_mut() {
                if let Some(w) = plan.writes.iter().find(|w| w.player_id == r.player_id) {
                    r.position = Some(w.position);
                    if r.player_id == player_id {
                        r.period_start_position = Some(w.position);
                    } else {
                        climber::roll_baseline(r, w.position, tz, now);
                    }
                    commit.push(r.clone());
                } else if r.player_id == player_id {
                    commit.push(r.clone());
                }
            }

            Ok((commit, plan.writes.clone()))
        })
        .await
    }

    /// Deactivate a player's standing and compact the slots below it.
    pub async fn remove_player(&self, player_id: Uuid) -> Result<Vec<PositionWrite>, ServiceError> {
        let standing = self.require_standing(player_id).await?;
        let ladder = standing.ladder.clone();
        let _guard = self.lock_ladder(&ladder).await;
        let tz = self.tz;
        self.mutate_roster(&ladder, |snap, now| {
            let row = snap
                .standing_of(player_id)
                .ok_or(ServiceError::StandingNotFound { player_id })?
                .clone();

            let mut remaining: Vec<PlayerStanding> = snap
                .standings
                .iter()
                .filter(|s| s.player_id != player_id)
                .cloned()
                .collect();
            let plan = plan_reindex(&remaining, &[])?;

            let mut off = row;
            off.active = false;
            off.position = None;

            let mut commit = vec![off];
            for r in remaining.iter_mut() {
                if let Some(w) = plan.writes.iter().find(|w| w.player_id == r.player_id) {
                    r.position = Some(w.position);
                    climber::roll_baseline(r, w.position, tz, now);
                    commit.push(r.clone());
                }
            }

            Ok((commit, plan.writes.clone()))
        })
        .await
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    /// Read-plan-commit with the bounded Conflict retry. The caller holds
    /// the ladder lock; `plan_fn` must be pure over the snapshot it is
    /// given. An empty commit set skips the store write entirely.
    async fn mutate_roster<T>(
        &self,
        ladder: &str,
        mut plan_fn: impl FnMut(
            &RosterSnapshot,
            DateTime<Utc>,
        ) -> Result<(Vec<PlayerStanding>, T), ServiceError>,
    ) -> Result<T, ServiceError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let now = Utc::now();
            let snap = self.store.roster(ladder).await.map_err(ServiceError::Store)?;
            let (rows, out) = plan_fn(&snap, now)?;

            if rows.is_empty() {
                debug!(ladder, "plan issued zero writes; skipping commit");
                return Ok(out);
            }

            match self.store.commit(ladder, snap.version, &rows).await {
                Ok(()) => {
                    debug!(ladder, rows = rows.len(), version = snap.version, "committed");
                    return Ok(out);
                }
                Err(StoreError::Conflict { .. }) if attempt < MAX_COMMIT_ATTEMPTS => {
                    warn!(ladder, attempt, "stale roster snapshot; retrying with a fresh read");
                    continue;
                }
                Err(StoreError::Conflict { .. }) => {
                    return Err(ServiceError::Conflict {
                        ladder: ladder.to_string(),
                        attempts: attempt,
                    });
                }
                Err(e) => return Err(ServiceError::Store(e)),
            }
        }
    }

    async fn require_standing(&self, player_id: Uuid) -> Result<PlayerStanding, ServiceError> {
        self.store
            .find_standing(player_id)
            .await
            .map_err(ServiceError::Store)?
            .ok_or(ServiceError::StandingNotFound { player_id })
    }

    async fn require_on_ladder(&self, player_id: Uuid, ladder: &str) -> Result<(), ServiceError> {
        let s = self.require_standing(player_id).await?;
        if s.ladder != ladder {
            return Err(ServiceError::CrossLadderMismatch {
                player_id,
                expected: ladder.to_string(),
                actual: s.ladder,
            });
        }
        if !s.active {
            return Err(ServiceError::NotEligible {
                player_id,
                reason: "player is inactive on this ladder".to_string(),
            });
        }
        Ok(())
    }

    async fn lock_ladder(&self, ladder: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.locks.lock().await;
            map.entry(ladder.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }
}
