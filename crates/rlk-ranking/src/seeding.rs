//! Tournament seeding plan.
//!
//! Pure translation of final tournament standings into one override set for
//! the reindex engine. The plan is always applied in a single reindex pass —
//! never as sequential per-player writes — so no transient duplicate
//! position is ever observable.

use uuid::Uuid;

use rlk_schemas::{PlayerStanding, TournamentPlacing};

use crate::reindex::PositionOverride;

/// Outcome of planning a seed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeedPlan {
    /// One override per player already on the ladder — participants at their
    /// tournament rank, non-participants appended after the tournament block.
    pub overrides: Vec<PositionOverride>,
    /// Ranked players with no standing on the ladder. Their correct relative
    /// slot is ambiguous, so they are reported for manual add, never
    /// auto-inserted.
    pub needs_manual_add: Vec<Uuid>,
    /// Participants whose ladder position was seeded from their rank.
    pub seeded_count: usize,
    /// Active non-participants shifted below the tournament block.
    pub shifted_count: usize,
}

/// Build the override set that seeds `roster` from `placings`.
///
/// Participants on the ladder take their tournament rank directly. Active
/// players who did not play are appended after the last tournament rank in
/// their current relative order (`tournament_size + i + 1`).
pub fn plan_seeding(placings: &[TournamentPlacing], roster: &[PlayerStanding]) -> SeedPlan {
    let mut ranked = placings.to_vec();
    ranked.sort_by_key(|p| p.final_rank);
    let tournament_size = ranked.len() as i32;

    let mut overrides = Vec::new();
    let mut needs_manual_add = Vec::new();
    let mut seeded_count = 0;

    for placing in &ranked {
        let on_ladder = roster
            .iter()
            .any(|s| s.active && s.player_id == placing.player_id);
        if on_ladder {
            overrides.push(PositionOverride {
                player_id: placing.player_id,
                target: placing.final_rank,
            });
            seeded_count += 1;
        } else {
            needs_manual_add.push(placing.player_id);
        }
    }

    // Non-participants keep their relative order below the tournament block.
    let mut bystanders: Vec<&PlayerStanding> = roster
        .iter()
        .filter(|s| s.active && !ranked.iter().any(|p| p.player_id == s.player_id))
        .collect();
    bystanders.sort_by_key(|s| s.position.unwrap_or(i32::MAX));

    let shifted_count = bystanders.len();
    for (i, s) in bystanders.iter().enumerate() {
        overrides.push(PositionOverride {
            player_id: s.player_id,
            target: tournament_size + i as i32 + 1,
        });
    }

    SeedPlan { overrides, needs_manual_add, seeded_count, shifted_count }
}
