use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One player's row on one ladder.
///
/// `position` is `Some(p)` with `p >= 1` for active players and `None` once
/// the player leaves the ladder. Active positions on a ladder are always a
/// contiguous `1..=N` block; that invariant is owned by the reindex engine
/// and the versioned commit protocol, never by ad-hoc row writes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerStanding {
    pub player_id: Uuid,
    pub ladder: String,
    pub position: Option<i32>,
    pub wins: i32,
    pub losses: i32,
    pub total_matches: i32,
    pub fast_track_challenges_remaining: i32,
    pub fast_track_until: Option<DateTime<Utc>>,
    pub fast_track_grace_until: Option<DateTime<Utc>>,
    pub smackback_eligible_until: Option<DateTime<Utc>>,
    pub immunity_until: Option<DateTime<Utc>>,
    pub period_start_position: Option<i32>,
    pub period_start_date: Option<DateTime<Utc>>,
    pub positions_climbed: i32,
    pub decline_count: i32,
    pub last_decline_date: Option<DateTime<Utc>>,
    pub active: bool,
}

impl PlayerStanding {
    /// A fresh, zeroed standing for a player joining `ladder` at `position`.
    pub fn new_active(player_id: Uuid, ladder: &str, position: i32) -> Self {
        Self {
            player_id,
            ladder: ladder.to_string(),
            position: Some(position),
            wins: 0,
            losses: 0,
            total_matches: 0,
            fast_track_challenges_remaining: 0,
            fast_track_until: None,
            fast_track_grace_until: None,
            smackback_eligible_until: None,
            immunity_until: None,
            period_start_position: None,
            period_start_date: None,
            positions_climbed: 0,
            decline_count: 0,
            last_decline_date: None,
            active: true,
        }
    }
}

/// Match types understood by the position-update policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MatchType {
    Challenge,
    FastTrack,
    ReverseFastTrack,
    Smackdown,
    Smackback,
}

impl MatchType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchType::Challenge => "challenge",
            MatchType::FastTrack => "fast-track",
            MatchType::ReverseFastTrack => "reverse-fast-track",
            MatchType::Smackdown => "smackdown",
            MatchType::Smackback => "smackback",
        }
    }

    /// Parse a wire string. Unrecognized values fall back to challenge
    /// semantics rather than failing the whole request.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "fast-track" | "fast_track" => MatchType::FastTrack,
            "reverse-fast-track" | "reverse_fast_track" => MatchType::ReverseFastTrack,
            "smackdown" => MatchType::Smackdown,
            "smackback" => MatchType::Smackback,
            _ => MatchType::Challenge,
        }
    }
}

/// A finished match as reported by the application layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchOutcome {
    pub winner_id: Uuid,
    pub loser_id: Uuid,
    pub match_type: MatchType,
    pub ladder: String,
    pub ts_utc: DateTime<Utc>,
}

/// Ladder identity + the knobs that live on the ladder rather than the
/// standing. `tier` orders ladders top (0) to bottom; the fast-track
/// transfer target is the ladder at `tier + 1`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LadderMeta {
    pub name: String,
    pub tier: i32,
    pub places_to_pay: i32,
}

/// One row of final tournament standings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TournamentPlacing {
    pub tournament_id: Uuid,
    pub player_id: Uuid,
    pub final_rank: i32,
}

/// Current "most improved" summary for a ladder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClimberSummary {
    pub player_id: Uuid,
    pub position: i32,
    pub period_start_position: i32,
    pub positions_climbed: i32,
}

/// League-wide rule constants, config-carried. Defaults match the league
/// rulebook; the config layer overrides individual keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeagueRules {
    pub immunity_days: i64,
    pub smackback_days: i64,
    pub fast_track_days: i64,
    pub fast_track_challenges: i32,
    pub fast_track_grace_days: i64,
    pub max_declines_per_month: i32,
    pub smackdown_rise: i32,
    pub smackdown_drop: i32,
    /// Lowest position a smackdown winner can rise to (the top slots are
    /// earned through direct challenges only).
    pub smackdown_floor: i32,
    /// IANA timezone the league operates in. Month and quarter boundaries
    /// (decline quota, climber baseline) are evaluated in this zone.
    pub timezone: String,
}

impl Default for LeagueRules {
    fn default() -> Self {
        Self {
            immunity_days: 7,
            smackback_days: 7,
            fast_track_days: 28,
            fast_track_challenges: 2,
            fast_track_grace_days: 14,
            max_declines_per_month: 2,
            smackdown_rise: 2,
            smackdown_drop: 3,
            smackdown_floor: 2,
            timezone: "America/New_York".to_string(),
        }
    }
}
