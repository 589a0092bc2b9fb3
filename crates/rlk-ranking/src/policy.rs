//! Match-type reordering rules and the stat/eligibility effects that ride
//! along with them.
//!
//! [`plan_match`] is pure: it takes the two standings as they were read from
//! the snapshot and returns mutated copies (stats incremented, eligibility
//! timers set) plus the override set for the reindex engine. Nothing is
//! written here; the service commits the winner/loser rows and the reindex
//! writes in one transaction, or none of them.
//!
//! Convention: for challenge and fast-track matches the "challenger" is the
//! lower-ranked player (the higher position number); for a smackdown the
//! challenger is the higher-ranked player calling out someone below.

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use rlk_schemas::{LeagueRules, MatchType, PlayerStanding};

use crate::reindex::PositionOverride;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyError {
    /// Winner and loser are not on the same ladder. The service checks this
    /// first; the policy re-checks because it is the invariant boundary.
    LadderMismatch { winner_ladder: String, loser_ladder: String },
    /// A standing arrived without an active position.
    MissingPosition { player_id: Uuid },
    /// Smackback attempted without a live eligibility window.
    NotEligible { player_id: Uuid },
}

impl std::fmt::Display for PolicyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LadderMismatch { winner_ladder, loser_ladder } => write!(
                f,
                "match spans ladders: winner on {winner_ladder}, loser on {loser_ladder}"
            ),
            Self::MissingPosition { player_id } => {
                write!(f, "player {player_id} has no active position")
            }
            Self::NotEligible { player_id } => {
                write!(f, "player {player_id} is not smackback-eligible")
            }
        }
    }
}

impl std::error::Error for PolicyError {}

// ---------------------------------------------------------------------------
// Plan
// ---------------------------------------------------------------------------

/// Everything a match result changes, short of the reindex itself.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchPlan {
    /// Winner row with stats and eligibility effects applied.
    pub winner: PlayerStanding,
    /// Loser row with stats applied.
    pub loser: PlayerStanding,
    /// Override set for [`crate::reindex::plan_reindex`]. Empty when the
    /// match changes no positions.
    pub overrides: Vec<PositionOverride>,
}

/// Derive the position overrides and row effects for one match result.
///
/// Cross-cutting effects, independent of match type:
/// - the winner gains `immunity_until = now + rules.immunity_days`
/// - wins / losses / total_matches increment unconditionally for both rows
pub fn plan_match(
    rules: &LeagueRules,
    match_type: MatchType,
    winner: &PlayerStanding,
    loser: &PlayerStanding,
    now: DateTime<Utc>,
) -> Result<MatchPlan, PolicyError> {
    if winner.ladder != loser.ladder {
        return Err(PolicyError::LadderMismatch {
            winner_ladder: winner.ladder.clone(),
            loser_ladder: loser.ladder.clone(),
        });
    }

    // Smackback precondition is checked before any mutation.
    if match_type == MatchType::Smackback && !live(winner.smackback_eligible_until, now) {
        return Err(PolicyError::NotEligible { player_id: winner.player_id });
    }

    let wp = winner
        .position
        .ok_or(PolicyError::MissingPosition { player_id: winner.player_id })?;
    let lp = loser
        .position
        .ok_or(PolicyError::MissingPosition { player_id: loser.player_id })?;

    let mut w = winner.clone();
    let mut l = loser.clone();

    w.wins += 1;
    w.total_matches += 1;
    l.losses += 1;
    l.total_matches += 1;
    w.immunity_until = Some(now + Duration::days(rules.immunity_days));

    let mut overrides = Vec::new();

    match match_type {
        MatchType::Challenge => {
            if wp > lp {
                // Challenger won: straight swap.
                overrides.push(PositionOverride { player_id: w.player_id, target: lp });
                overrides.push(PositionOverride { player_id: l.player_id, target: wp });
            }
        }

        MatchType::FastTrack | MatchType::ReverseFastTrack => {
            // The instigating side spends one of its banked challenges
            // whether or not it wins; fast-track comes from below,
            // reverse-fast-track from above.
            let spender = if match_type == MatchType::FastTrack {
                if wp > lp { &mut w } else { &mut l }
            } else if wp < lp {
                &mut w
            } else {
                &mut l
            };
            spender.fast_track_challenges_remaining =
                (spender.fast_track_challenges_remaining - 1).max(0);

            if wp > lp {
                // Winner takes the loser's slot; the loser is displaced by
                // exactly one, not to the winner's vacated slot.
                overrides.push(PositionOverride { player_id: w.player_id, target: lp });
                overrides.push(PositionOverride { player_id: l.player_id, target: lp + 1 });
            }
        }

        MatchType::Smackdown => {
            if wp < lp {
                // Challenger won: rises two slots (never above the floor),
                // loser drops three (reindex clamps past the roster end).
                let rise = (wp - rules.smackdown_rise).max(rules.smackdown_floor);
                overrides.push(PositionOverride { player_id: w.player_id, target: rise });
                overrides.push(PositionOverride {
                    player_id: l.player_id,
                    target: lp + rules.smackdown_drop,
                });
            } else {
                // Defender held: swap, and the defense earns a smackback.
                overrides.push(PositionOverride { player_id: w.player_id, target: lp });
                overrides.push(PositionOverride { player_id: l.player_id, target: wp });
                w.smackback_eligible_until = Some(now + Duration::days(rules.smackback_days));
            }
        }

        MatchType::Smackback => {
            // Eligibility is consumed by the attempt, not the outcome.
            w.smackback_eligible_until = None;
            if wp > 1 {
                overrides.push(PositionOverride { player_id: w.player_id, target: 1 });
            }
        }
    }

    Ok(MatchPlan { winner: w, loser: l, overrides })
}

fn live(until: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    until.map(|t| t > now).unwrap_or(false)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn standing(pos: i32) -> PlayerStanding {
        PlayerStanding::new_active(Uuid::new_v4(), "main", pos)
    }

    fn now() -> DateTime<Utc> {
        "2026-05-12T20:00:00Z".parse().unwrap()
    }

    fn rules() -> LeagueRules {
        LeagueRules::default()
    }

    #[test]
    fn challenge_win_from_below_swaps() {
        let (w, l) = (standing(3), standing(1));
        let plan = plan_match(&rules(), MatchType::Challenge, &w, &l, now()).unwrap();
        assert_eq!(
            plan.overrides,
            vec![
                PositionOverride { player_id: w.player_id, target: 1 },
                PositionOverride { player_id: l.player_id, target: 3 },
            ]
        );
    }

    #[test]
    fn challenge_defender_win_moves_nobody() {
        let (w, l) = (standing(1), standing(3));
        let plan = plan_match(&rules(), MatchType::Challenge, &w, &l, now()).unwrap();
        assert!(plan.overrides.is_empty());
    }

    #[test]
    fn every_win_grants_immunity_and_stats() {
        let (w, l) = (standing(1), standing(3));
        let plan = plan_match(&rules(), MatchType::Challenge, &w, &l, now()).unwrap();
        assert_eq!(plan.winner.wins, 1);
        assert_eq!(plan.winner.total_matches, 1);
        assert_eq!(plan.loser.losses, 1);
        assert_eq!(plan.loser.total_matches, 1);
        assert_eq!(
            plan.winner.immunity_until,
            Some(now() + Duration::days(7))
        );
    }

    #[test]
    fn fast_track_win_displaces_loser_by_one() {
        let (w, l) = (standing(4), standing(2));
        let plan = plan_match(&rules(), MatchType::FastTrack, &w, &l, now()).unwrap();
        assert_eq!(
            plan.overrides,
            vec![
                PositionOverride { player_id: w.player_id, target: 2 },
                PositionOverride { player_id: l.player_id, target: 3 },
            ]
        );
    }

    #[test]
    fn fast_track_spends_a_challenge_even_on_loss() {
        let mut challenger = standing(4);
        challenger.fast_track_challenges_remaining = 2;
        let defender = standing(2);
        // Defender wins; challenger (loser, below) still spends.
        let plan =
            plan_match(&rules(), MatchType::FastTrack, &defender, &challenger, now()).unwrap();
        assert!(plan.overrides.is_empty());
        assert_eq!(plan.loser.fast_track_challenges_remaining, 1);
    }

    #[test]
    fn fast_track_spend_saturates_at_zero() {
        let (w, l) = (standing(4), standing(2));
        let plan = plan_match(&rules(), MatchType::FastTrack, &w, &l, now()).unwrap();
        assert_eq!(plan.winner.fast_track_challenges_remaining, 0);
    }

    #[test]
    fn smackdown_challenger_win_rises_two_drops_three() {
        let (w, l) = (standing(5), standing(8));
        let plan = plan_match(&rules(), MatchType::Smackdown, &w, &l, now()).unwrap();
        assert_eq!(
            plan.overrides,
            vec![
                PositionOverride { player_id: w.player_id, target: 3 },
                PositionOverride { player_id: l.player_id, target: 11 },
            ]
        );
    }

    #[test]
    fn smackdown_rise_floors_at_two() {
        let (w, l) = (standing(3), standing(6));
        let plan = plan_match(&rules(), MatchType::Smackdown, &w, &l, now()).unwrap();
        assert_eq!(plan.overrides[0].target, 2);
    }

    #[test]
    fn smackdown_defender_win_swaps_and_grants_smackback() {
        let (w, l) = (standing(8), standing(5));
        let plan = plan_match(&rules(), MatchType::Smackdown, &w, &l, now()).unwrap();
        assert_eq!(
            plan.overrides,
            vec![
                PositionOverride { player_id: w.player_id, target: 5 },
                PositionOverride { player_id: l.player_id, target: 8 },
            ]
        );
        assert_eq!(
            plan.winner.smackback_eligible_until,
            Some(now() + Duration::days(7))
        );
    }

    #[test]
    fn smackback_requires_live_window() {
        let (w, l) = (standing(6), standing(1));
        let err = plan_match(&rules(), MatchType::Smackback, &w, &l, now()).unwrap_err();
        assert!(matches!(err, PolicyError::NotEligible { .. }));
    }

    #[test]
    fn smackback_expired_window_rejected() {
        let mut w = standing(6);
        w.smackback_eligible_until = Some(now() - Duration::hours(1));
        let l = standing(1);
        let err = plan_match(&rules(), MatchType::Smackback, &w, &l, now()).unwrap_err();
        assert!(matches!(err, PolicyError::NotEligible { .. }));
    }

    #[test]
    fn smackback_win_targets_top_and_clears_window() {
        let mut w = standing(6);
        w.smackback_eligible_until = Some(now() + Duration::days(3));
        let l = standing(1);
        let plan = plan_match(&rules(), MatchType::Smackback, &w, &l, now()).unwrap();
        assert_eq!(
            plan.overrides,
            vec![PositionOverride { player_id: w.player_id, target: 1 }]
        );
        assert_eq!(plan.winner.smackback_eligible_until, None);
    }

    #[test]
    fn smackback_from_top_still_clears_window() {
        let mut w = standing(1);
        w.smackback_eligible_until = Some(now() + Duration::days(3));
        let l = standing(4);
        let plan = plan_match(&rules(), MatchType::Smackback, &w, &l, now()).unwrap();
        assert!(plan.overrides.is_empty());
        assert_eq!(plan.winner.smackback_eligible_until, None);
    }

    #[test]
    fn cross_ladder_match_rejected() {
        let w = standing(2);
        let mut l = standing(5);
        l.ladder = "lower".to_string();
        let err = plan_match(&rules(), MatchType::Challenge, &w, &l, now()).unwrap_err();
        assert!(matches!(err, PolicyError::LadderMismatch { .. }));
    }

    #[test]
    fn inactive_player_rejected() {
        let w = standing(2);
        let mut l = standing(5);
        l.position = None;
        let err = plan_match(&rules(), MatchType::Challenge, &w, &l, now()).unwrap_err();
        assert!(matches!(err, PolicyError::MissingPosition { .. }));
    }
}
