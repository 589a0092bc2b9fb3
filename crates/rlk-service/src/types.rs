//! Result and error types for the service surface. No business logic here.

use uuid::Uuid;

use rlk_ranking::{PolicyError, PositionWrite, ReindexError};
use rlk_schemas::MatchType;
use rlk_store::StoreError;

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// Outcome of a successfully applied match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchApplied {
    pub ladder: String,
    pub match_type: MatchType,
    pub winner_id: Uuid,
    pub loser_id: Uuid,
    /// Positions that actually changed, in final-rank order. Empty when the
    /// match moved nobody (defender win).
    pub new_positions: Vec<PositionWrite>,
}

/// Outcome of seeding a ladder from tournament results.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeedReport {
    pub ladder: String,
    pub tournament_id: Uuid,
    /// Participants whose position was seeded from their final rank.
    pub seeded_count: usize,
    /// Non-participants appended after the tournament block.
    pub shifted_count: usize,
    /// Ranked players with no standing on the ladder; never auto-inserted.
    pub needs_manual_add: Vec<Uuid>,
}

/// The player's answer to a fast-track tier-down offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FastTrackChoice {
    Stay,
    MoveDown,
}

impl FastTrackChoice {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stay => "stay",
            Self::MoveDown => "move_down",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stay" => Some(Self::Stay),
            "move_down" | "move-down" => Some(Self::MoveDown),
            _ => None,
        }
    }
}

/// Status summary returned by `submit_fast_track_choice`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FastTrackSummary {
    pub player_id: Uuid,
    pub choice: FastTrackChoice,
    /// Ladder the player ended up on.
    pub ladder: String,
    /// Position on that ladder after the choice.
    pub position: Option<i32>,
    pub fast_track_challenges_remaining: i32,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Service error taxonomy. Every mutating operation is all-or-nothing: any
/// of these leaves both players' visible positions and stats exactly as
/// before the call.
#[derive(Debug, Clone, PartialEq)]
pub enum ServiceError {
    /// A referenced player has no standing anywhere in the league.
    StandingNotFound { player_id: Uuid },
    /// The players hold standings on different ladders.
    CrossLadderMismatch { player_id: Uuid, expected: String, actual: String },
    /// A precondition (smackback window, decline quota, tier transfer
    /// target) is unmet. Rejected before any mutation.
    NotEligible { player_id: Uuid, reason: String },
    /// The player already holds a standing and cannot be added again.
    AlreadyOnLadder { player_id: Uuid, ladder: String },
    /// A reindex plan was rejected (target < 1, duplicate override, …).
    InvalidTarget(String),
    /// Snapshot went stale on every commit attempt.
    Conflict { ladder: String, attempts: u32 },
    /// Bad service configuration (unknown league timezone).
    Config(String),
    /// Store failure passthrough (transport, decode, missing ladder).
    Store(StoreError),
}

impl std::fmt::Display for ServiceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::StandingNotFound { player_id } => {
                write!(f, "no standing for player {player_id}")
            }
            Self::CrossLadderMismatch { player_id, expected, actual } => write!(
                f,
                "player {player_id} is on ladder {actual}, not {expected}"
            ),
            Self::NotEligible { player_id, reason } => {
                write!(f, "player {player_id} not eligible: {reason}")
            }
            Self::AlreadyOnLadder { player_id, ladder } => {
                write!(f, "player {player_id} already holds a standing on {ladder}")
            }
            Self::InvalidTarget(msg) => write!(f, "invalid reindex request: {msg}"),
            Self::Conflict { ladder, attempts } => write!(
                f,
                "ladder {ladder} kept changing underneath us ({attempts} attempts)"
            ),
            Self::Config(msg) => write!(f, "service configuration error: {msg}"),
            Self::Store(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for ServiceError {}

impl From<ReindexError> for ServiceError {
    fn from(e: ReindexError) -> Self {
        ServiceError::InvalidTarget(e.to_string())
    }
}

impl From<PolicyError> for ServiceError {
    fn from(e: PolicyError) -> Self {
        match e {
            PolicyError::NotEligible { player_id } => ServiceError::NotEligible {
                player_id,
                reason: "smackback window is not open".to_string(),
            },
            PolicyError::LadderMismatch { winner_ladder, loser_ladder } => {
                // The service pre-checks ladders with player identity in
                // hand; reaching this arm means a caller bypassed it.
                ServiceError::InvalidTarget(format!(
                    "match spans ladders {winner_ladder} and {loser_ladder}"
                ))
            }
            PolicyError::MissingPosition { player_id } => ServiceError::NotEligible {
                player_id,
                reason: "player holds no active position".to_string(),
            },
        }
    }
}
