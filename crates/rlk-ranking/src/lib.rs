//! Pure ranking engines for RackLadder.
//!
//! Everything in this crate is deterministic and IO-free: functions take
//! roster snapshots and timestamps, return plans and mutated row copies, and
//! never touch the store. The service layer owns reading snapshots, holding
//! the per-ladder lock, and committing the resulting rows atomically.

pub mod climber;
pub mod eligibility;
pub mod policy;
pub mod reindex;
pub mod seeding;

pub use climber::{current_climber, quarter_start, reset_for_new_period, roll_baseline};
pub use eligibility::{
    can_decline, fast_track_active, grant_fast_track, has_immunity, record_decline,
    smackback_allowed, start_grace_period, EligibilityError,
};
pub use policy::{plan_match, MatchPlan, PolicyError};
pub use reindex::{plan_reindex, PositionOverride, PositionWrite, ReindexError, ReindexPlan};
pub use seeding::{plan_seeding, SeedPlan};
