//! Time-boxed eligibility windows: immunity, decline quota, fast-track,
//! smackback.
//!
//! All timers are evaluated lazily against "now" — a past timestamp simply
//! means "not active", and nothing here eagerly clears stored values.
//! Immunity is exposed as a predicate only; whether an immune player can be
//! challenged at all is a call-site decision in the application layer.

use chrono::{DateTime, Datelike, Duration, Utc};
use chrono_tz::Tz;
use uuid::Uuid;

use rlk_schemas::{LeagueRules, PlayerStanding};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EligibilityError {
    /// Monthly decline quota already spent.
    DeclineQuotaExhausted { player_id: Uuid, max_per_month: i32 },
}

impl std::fmt::Display for EligibilityError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DeclineQuotaExhausted { player_id, max_per_month } => write!(
                f,
                "player {player_id} already used {max_per_month} declines this month"
            ),
        }
    }
}

impl std::error::Error for EligibilityError {}

// ---------------------------------------------------------------------------
// Predicates
// ---------------------------------------------------------------------------

/// Winner-protection window granted on every win.
pub fn has_immunity(standing: &PlayerStanding, now: DateTime<Utc>) -> bool {
    live(standing.immunity_until, now)
}

/// Smackback precondition — checked by the service before the match policy
/// runs, so an ineligible attempt is rejected before any mutation.
pub fn smackback_allowed(standing: &PlayerStanding, now: DateTime<Utc>) -> bool {
    live(standing.smackback_eligible_until, now)
}

/// Whether the player's fast-track window is open and has challenges left.
pub fn fast_track_active(standing: &PlayerStanding, now: DateTime<Utc>) -> bool {
    live(standing.fast_track_until, now) && standing.fast_track_challenges_remaining > 0
}

/// Whether the player may decline another challenge this month. The counter
/// resets lazily: a `last_decline_date` in an older league-local month means
/// the stored count no longer applies.
pub fn can_decline(
    rules: &LeagueRules,
    standing: &PlayerStanding,
    tz: Tz,
    now: DateTime<Utc>,
) -> bool {
    match standing.last_decline_date {
        None => true,
        Some(last) if !same_month(tz, last, now) => true,
        Some(_) => standing.decline_count < rules.max_declines_per_month,
    }
}

fn live(until: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    until.map(|t| t > now).unwrap_or(false)
}

fn same_month(tz: Tz, a: DateTime<Utc>, b: DateTime<Utc>) -> bool {
    let (a, b) = (a.with_timezone(&tz), b.with_timezone(&tz));
    a.year() == b.year() && a.month() == b.month()
}

// ---------------------------------------------------------------------------
// Mutators (pure: operate on a row copy the caller commits)
// ---------------------------------------------------------------------------

/// Spend one decline. Rolls the counter over on a month boundary, then
/// enforces the quota.
pub fn record_decline(
    rules: &LeagueRules,
    standing: &mut PlayerStanding,
    tz: Tz,
    now: DateTime<Utc>,
) -> Result<(), EligibilityError> {
    let stale = standing
        .last_decline_date
        .map(|last| !same_month(tz, last, now))
        .unwrap_or(true);
    if stale {
        standing.decline_count = 0;
    }

    if standing.decline_count >= rules.max_declines_per_month {
        return Err(EligibilityError::DeclineQuotaExhausted {
            player_id: standing.player_id,
            max_per_month: rules.max_declines_per_month,
        });
    }

    standing.decline_count += 1;
    standing.last_decline_date = Some(now);
    Ok(())
}

/// Open a fast-track window: banked challenges + expiry.
pub fn grant_fast_track(rules: &LeagueRules, standing: &mut PlayerStanding, now: DateTime<Utc>) {
    standing.fast_track_challenges_remaining = rules.fast_track_challenges;
    standing.fast_track_until = Some(now + Duration::days(rules.fast_track_days));
}

/// Start the fast-track grace timer on the current standing. Purely a timer;
/// no position effect.
pub fn start_grace_period(rules: &LeagueRules, standing: &mut PlayerStanding, now: DateTime<Utc>) {
    standing.fast_track_grace_until = Some(now + Duration::days(rules.fast_track_grace_days));
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
