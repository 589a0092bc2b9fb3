//! Full-roster reindexing — the one place positions are ever recomputed.
//!
//! # Algorithm
//! Every active player gets a sort key. A player with an override gets the
//! override target as its key; a player without one gets its current
//! position plus half a step, so a mover targeting an occupied slot always
//! sorts immediately *before* the static occupant of that slot. Stable-sort
//! by key, and the 1-based rank in the sorted order is the final position.
//! This yields "insert at slot K, shift everyone after by the true net
//! displacement" semantics in a single pass, for any mix of movers and
//! static players.
//!
//! Keys are doubled integers rather than floats (`2*target` for movers,
//! `2*current + 1` for statics) so the engine stays exact. An override
//! target past the end of the roster clamps to a key beyond every static
//! entry and simply sorts last.
//!
//! # Tie-break
//! Two overrides targeting the same integer slot both sort before the
//! static occupant; between themselves, input override order wins (the
//! mover list is emitted ahead of the statics, and the sort is stable).

use uuid::Uuid;

use rlk_schemas::PlayerStanding;

// ---------------------------------------------------------------------------
// Inputs / outputs
// ---------------------------------------------------------------------------

/// Request to place one player at a target slot during the next reindex.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionOverride {
    pub player_id: Uuid,
    pub target: i32,
}

/// Final `(player, position)` assignment produced by a reindex plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionWrite {
    pub player_id: Uuid,
    pub position: i32,
}

/// Output of [`plan_reindex`]: the complete mapping plus the changed subset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReindexPlan {
    /// Final 1..=N assignment for every active player, in rank order.
    pub assignments: Vec<PositionWrite>,
    /// Subset of `assignments` whose position differs from the current one.
    /// Only these rows need a write.
    pub writes: Vec<PositionWrite>,
}

impl ReindexPlan {
    /// True when the plan would not move anyone.
    pub fn is_noop(&self) -> bool {
        self.writes.is_empty()
    }

    /// Final position of a player, if they are on the roster.
    pub fn position_of(&self, player_id: Uuid) -> Option<i32> {
        self.assignments
            .iter()
            .find(|w| w.player_id == player_id)
            .map(|w| w.position)
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Reindex rejections. Any error rejects the whole plan; partial application
/// is never an option.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReindexError {
    /// Override target below 1. Rejected loudly instead of clamped so caller
    /// bugs surface.
    InvalidTarget { player_id: Uuid, target: i32 },
    /// Two overrides name the same player.
    DuplicateOverride { player_id: Uuid },
    /// An override references a player that is not on the active roster.
    UnknownPlayer { player_id: Uuid },
    /// An active roster row arrived without a position.
    MissingPosition { player_id: Uuid },
}

impl std::fmt::Display for ReindexError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidTarget { player_id, target } => {
                write!(f, "reindex: invalid target {target} for player {player_id}")
            }
            Self::DuplicateOverride { player_id } => {
                write!(f, "reindex: duplicate override for player {player_id}")
            }
            Self::UnknownPlayer { player_id } => {
                write!(f, "reindex: override for player {player_id} not on roster")
            }
            Self::MissingPosition { player_id } => {
                write!(f, "reindex: active player {player_id} has no position")
            }
        }
    }
}

impl std::error::Error for ReindexError {}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Compute a contiguous 1..=N assignment for `roster` with `overrides`
/// applied. Pure: the caller commits `plan.writes` as one transaction.
///
/// `roster` is the full active roster of one ladder, in any order. An empty
/// roster yields an empty plan.
pub fn plan_reindex(
    roster: &[PlayerStanding],
    overrides: &[PositionOverride],
) -> Result<ReindexPlan, ReindexError> {
    let n = roster.len() as i64;

    let mut current = Vec::with_capacity(roster.len());
    for s in roster {
        let pos = s
            .position
            .ok_or(ReindexError::MissingPosition { player_id: s.player_id })?;
        current.push((s.player_id, pos));
    }

    let mut overridden: Vec<Uuid> = Vec::with_capacity(overrides.len());
    for o in overrides {
        if o.target < 1 {
            return Err(ReindexError::InvalidTarget {
                player_id: o.player_id,
                target: o.target,
            });
        }
        if overridden.contains(&o.player_id) {
            return Err(ReindexError::DuplicateOverride { player_id: o.player_id });
        }
        if !current.iter().any(|(id, _)| *id == o.player_id) {
            return Err(ReindexError::UnknownPlayer { player_id: o.player_id });
        }
        overridden.push(o.player_id);
    }

    // key, player, current position. Movers first so equal-key overrides keep
    // input order under the stable sort; mover and static keys never collide
    // (even vs odd).
    let mut keyed: Vec<(i64, Uuid, i32)> = Vec::with_capacity(roster.len());
    for o in overrides {
        let cur = current
            .iter()
            .find(|(id, _)| *id == o.player_id)
            .map(|(_, p)| *p)
            .unwrap_or(0);
        let key = if i64::from(o.target) > n {
            // Past the end of the roster: sorts after every static entry.
            2 * n + 2
        } else {
            2 * i64::from(o.target)
        };
        keyed.push((key, o.player_id, cur));
    }
    for (id, pos) in &current {
        if overridden.contains(id) {
            continue;
        }
        keyed.push((2 * i64::from(*pos) + 1, *id, *pos));
    }

    keyed.sort_by_key(|(key, _, _)| *key);

    let mut assignments = Vec::with_capacity(keyed.len());
    let mut writes = Vec::new();
    for (rank, (_, player_id, cur)) in keyed.into_iter().enumerate() {
        let position = rank as i32 + 1;
        assignments.push(PositionWrite { player_id, position });
        if position != cur {
            writes.push(PositionWrite { player_id, position });
        }
    }

    Ok(ReindexPlan { assignments, writes })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
