//! Request and response types for all rlk-daemon HTTP endpoints.
//!
//! These types are `Serialize + Deserialize` so they can be JSON-encoded by
//! Axum and decoded by tests. No business logic lives here.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use rlk_schemas::{ClimberSummary, PlayerStanding};

// ---------------------------------------------------------------------------
// /v1/health
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub service: &'static str,
    pub version: &'static str,
}

// ---------------------------------------------------------------------------
// Error envelope
// ---------------------------------------------------------------------------

/// Uniform error body. `kind` is the machine-readable taxonomy tag:
/// "standing_not_found" | "cross_ladder_mismatch" | "not_eligible" |
/// "already_on_ladder" | "invalid_target" | "conflict" | "store" | "config"
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub kind: String,
}

// ---------------------------------------------------------------------------
// GET /v1/ladder/:name/standings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StandingsResponse {
    pub ladder: String,
    pub roster_version: i64,
    pub standings: Vec<PlayerStanding>,
}

// ---------------------------------------------------------------------------
// GET /v1/ladder/:name/climber
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClimberResponse {
    pub ladder: String,
    pub climber: Option<ClimberSummary>,
}

// ---------------------------------------------------------------------------
// POST /v1/match/apply
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplyMatchRequest {
    pub ladder: String,
    pub winner_id: Uuid,
    pub loser_id: Uuid,
    /// Wire string; unrecognized values fall back to challenge semantics.
    pub match_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionChange {
    pub player_id: Uuid,
    pub position: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplyMatchResponse {
    pub ladder: String,
    pub match_type: String,
    pub winner_id: Uuid,
    pub loser_id: Uuid,
    pub new_positions: Vec<PositionChange>,
}

// ---------------------------------------------------------------------------
// POST /v1/tournament/seed
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedRequest {
    pub tournament_id: Uuid,
    pub ladder: String,
    /// When true, runs the full orchestration: seed, reset the climber
    /// period, and mark the tournament completed.
    #[serde(default)]
    pub complete: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedResponse {
    pub ladder: String,
    pub tournament_id: Uuid,
    pub seeded_count: usize,
    pub shifted_count: usize,
    pub needs_manual_add: Vec<Uuid>,
    pub completed: bool,
}

// ---------------------------------------------------------------------------
// POST /v1/fast-track/choice   POST /v1/fast-track/grace
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FastTrackChoiceRequest {
    pub player_id: Uuid,
    /// "stay" | "move_down"
    pub choice: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FastTrackChoiceResponse {
    pub player_id: Uuid,
    pub choice: String,
    pub ladder: String,
    pub position: Option<i32>,
    pub fast_track_challenges_remaining: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FastTrackGraceRequest {
    pub player_id: Uuid,
}

// ---------------------------------------------------------------------------
// POST /v1/decline
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeclineRequest {
    pub player_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeclineResponse {
    pub player_id: Uuid,
    pub recorded: bool,
}
