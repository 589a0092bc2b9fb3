//! Quarterly "most improved" tracking.
//!
//! Each standing carries a per-quarter baseline (`period_start_position`,
//! `period_start_date`) and a derived `positions_climbed` counter. The
//! counter is always recomputed from the fixed baseline, never accumulated
//! match-over-match, so replayed or out-of-order updates cannot drift it.
//!
//! Quarter boundaries are calendar quarters of the league-local date
//! (Jan–Mar, Apr–Jun, Jul–Sep, Oct–Dec), evaluated in the league's
//! configured timezone so a late-night match near a boundary lands in the
//! correct period.

use chrono::{DateTime, Datelike, TimeZone, Utc};
use chrono_tz::Tz;

use rlk_schemas::{ClimberSummary, PlayerStanding};

// ---------------------------------------------------------------------------
// Quarter arithmetic
// ---------------------------------------------------------------------------

/// Start of the calendar quarter containing `now`, as a UTC instant
/// (midnight league-local on the first day of the quarter).
pub fn quarter_start(tz: Tz, now: DateTime<Utc>) -> DateTime<Utc> {
    let local = now.with_timezone(&tz);
    let month = (local.month0() / 3) * 3 + 1;
    // Midnight can be skipped by a DST jump in exotic zones; take the
    // earliest valid instant of the day in that case.
    let start = tz
        .with_ymd_and_hms(local.year(), month, 1, 0, 0, 0)
        .earliest()
        .unwrap_or_else(|| {
            tz.with_ymd_and_hms(local.year(), month, 1, 1, 0, 0)
                .earliest()
                .expect("01:00 on the first of a quarter is always a valid local time")
        });
    start.with_timezone(&Utc)
}

/// True when `a` and `b` fall in the same league-local calendar quarter.
pub fn same_quarter(tz: Tz, a: DateTime<Utc>, b: DateTime<Utc>) -> bool {
    let (a, b) = (a.with_timezone(&tz), b.with_timezone(&tz));
    a.year() == b.year() && a.month0() / 3 == b.month0() / 3
}

// ---------------------------------------------------------------------------
// Baseline maintenance
// ---------------------------------------------------------------------------

/// Fold a new position into the standing's quarter baseline.
///
/// First update in a new quarter (or a standing with no baseline at all)
/// resets the baseline to the new position with zero climb, regardless of
/// the prior quarter's value. Within the quarter the climb is re-derived:
/// `max(baseline - new_position, 0)`.
pub fn roll_baseline(standing: &mut PlayerStanding, new_position: i32, tz: Tz, now: DateTime<Utc>) {
    let baseline_current = standing
        .period_start_date
        .map(|d| same_quarter(tz, d, now))
        .unwrap_or(false);

    match (baseline_current, standing.period_start_position) {
        (true, Some(base)) => {
            standing.positions_climbed = (base - new_position).max(0);
        }
        _ => {
            standing.period_start_position = Some(new_position);
            standing.period_start_date = Some(quarter_start(tz, now));
            standing.positions_climbed = 0;
        }
    }
}

/// Force every active standing's baseline to its current position — used at
/// an explicit quarter rollover or right after a tournament seeding, so the
/// fresh ranks become the next period's baseline.
pub fn reset_for_new_period(roster: &mut [PlayerStanding], tz: Tz, now: DateTime<Utc>) {
    let start = quarter_start(tz, now);
    for s in roster.iter_mut().filter(|s| s.active) {
        if let Some(pos) = s.position {
            s.period_start_position = Some(pos);
            s.period_start_date = Some(start);
            s.positions_climbed = 0;
        }
    }
}

// ---------------------------------------------------------------------------
// Selection
// ---------------------------------------------------------------------------

/// The current most-improved player: largest `positions_climbed` among
/// active players sitting *below* the paid bracket, ties broken by the best
/// (smallest) current position. `None` when nobody qualifies.
pub fn current_climber(roster: &[PlayerStanding], places_to_pay: i32) -> Option<ClimberSummary> {
    let mut best: Option<&PlayerStanding> = None;
    for s in roster.iter().filter(|s| s.active) {
        let Some(pos) = s.position else { continue };
        if s.positions_climbed <= 0 || pos <= places_to_pay {
            continue;
        }
        let better = match best {
            None => true,
            Some(b) => {
                s.positions_climbed > b.positions_climbed
                    || (s.positions_climbed == b.positions_climbed
                        && pos < b.position.unwrap_or(i32::MAX))
            }
        };
        if better {
            best = Some(s);
        }
    }

    best.map(|s| ClimberSummary {
        player_id: s.player_id,
        position: s.position.unwrap_or(0),
        period_start_position: s.period_start_position.unwrap_or(0),
        positions_climbed: s.positions_climbed,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    const TZ: Tz = chrono_tz::America::New_York;

    fn at(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    fn standing(pos: i32) -> PlayerStanding {
        PlayerStanding::new_active(Uuid::new_v4(), "main", pos)
    }

    #[test]
    fn quarter_start_is_local_midnight() {
        // 2026-05-12 UTC afternoon -> Q2 starts April 1, midnight Eastern.
        let start = quarter_start(TZ, at("2026-05-12T18:00:00Z"));
        assert_eq!(start, at("2026-04-01T04:00:00Z"));
    }

    #[test]
    fn quarter_boundary_respects_league_timezone() {
        // 2026-04-01T02:00Z is still March 31 evening in New York: Q1.
        assert!(same_quarter(
            TZ,
            at("2026-03-15T12:00:00Z"),
            at("2026-04-01T02:00:00Z")
        ));
        assert!(!same_quarter(
            TZ,
            at("2026-03-15T12:00:00Z"),
            at("2026-04-01T12:00:00Z")
        ));
    }

    #[test]
    fn first_update_in_quarter_resets_baseline() {
        let mut s = standing(9);
        s.period_start_position = Some(20);
        s.period_start_date = Some(at("2026-01-10T12:00:00Z"));
        s.positions_climbed = 11;

        roll_baseline(&mut s, 9, TZ, at("2026-05-12T18:00:00Z"));
        assert_eq!(s.period_start_position, Some(9));
        assert_eq!(s.positions_climbed, 0);
        assert_eq!(s.period_start_date, Some(quarter_start(TZ, at("2026-05-12T18:00:00Z"))));
    }

    #[test]
    fn climb_is_rederived_not_accumulated() {
        let now = at("2026-05-12T18:00:00Z");
        let mut s = standing(9);
        roll_baseline(&mut s, 9, TZ, now);

        roll_baseline(&mut s, 5, TZ, now);
        assert_eq!(s.positions_climbed, 4);

        // Dropping back down re-derives from the fixed baseline.
        roll_baseline(&mut s, 7, TZ, now);
        assert_eq!(s.positions_climbed, 2);

        // At or below the baseline the climb is zero, never negative.
        roll_baseline(&mut s, 12, TZ, now);
        assert_eq!(s.positions_climbed, 0);
    }

    #[test]
    fn missing_baseline_position_resets() {
        let now = at("2026-05-12T18:00:00Z");
        let mut s = standing(4);
        s.period_start_date = Some(now);
        s.period_start_position = None;
        roll_baseline(&mut s, 4, TZ, now);
        assert_eq!(s.period_start_position, Some(4));
    }

    #[test]
    fn climber_excludes_paid_bracket() {
        let mut a = standing(3);
        a.positions_climbed = 10;
        let mut b = standing(6);
        b.positions_climbed = 2;
        let got = current_climber(&[a, b.clone()], 4).unwrap();
        assert_eq!(got.player_id, b.player_id);
    }

    #[test]
    fn climber_requires_positive_climb() {
        let a = standing(6);
        assert!(current_climber(&[a], 4).is_none());
    }

    #[test]
    fn climber_tie_breaks_to_best_position() {
        let mut a = standing(8);
        a.positions_climbed = 5;
        let mut b = standing(6);
        b.positions_climbed = 5;
        let got = current_climber(&[a, b.clone()], 4).unwrap();
        assert_eq!(got.player_id, b.player_id);
    }

    #[test]
    fn climber_ignores_inactive_rows() {
        let mut a = standing(6);
        a.positions_climbed = 5;
        a.active = false;
        assert!(current_climber(&[a], 4).is_none());
    }

    #[test]
    fn reset_for_new_period_rebases_everyone() {
        let now = at("2026-07-02T18:00:00Z");
        let mut roster = vec![standing(1), standing(2)];
        roster[0].positions_climbed = 7;
        roster[0].period_start_position = Some(8);
        reset_for_new_period(&mut roster, TZ, now);
        for s in &roster {
            assert_eq!(s.period_start_position, s.position);
            assert_eq!(s.positions_climbed, 0);
            assert_eq!(s.period_start_date, Some(quarter_start(TZ, now)));
        }
    }
}
