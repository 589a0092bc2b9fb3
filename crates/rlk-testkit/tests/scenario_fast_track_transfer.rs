use std::sync::Arc;

use chrono::Utc;
use rlk_schemas::LeagueRules;
use rlk_service::{FastTrackChoice, LadderService, ServiceError};
use rlk_testkit::MemoryStandingStore;

fn service(store: &Arc<MemoryStandingStore>) -> LadderService {
    LadderService::new(store.clone(), LeagueRules::default()).unwrap()
}

#[tokio::test]
async fn move_down_transfers_to_the_bottom_of_the_lower_ladder() {
    let store = Arc::new(MemoryStandingStore::new());
    store.add_ladder("premier", 0, 4);
    store.add_ladder("challengers", 1, 4);
    let premier = store.seed_roster("premier", 4);
    let lower = store.seed_roster("challengers", 3);

    // Give the mover a record worth carrying.
    let mut mover = store.standing(premier[1]).unwrap();
    mover.wins = 9;
    mover.losses = 4;
    mover.total_matches = 13;
    store.put_standing(mover);

    let svc = service(&store);
    let summary = svc
        .submit_fast_track_choice(premier[1], FastTrackChoice::MoveDown)
        .await
        .unwrap();

    assert_eq!(summary.ladder, "challengers");
    assert_eq!(summary.position, Some(4));
    assert_eq!(summary.fast_track_challenges_remaining, 2);

    // Vacated slot compacts on the source ladder.
    assert_eq!(store.standing(premier[0]).unwrap().position, Some(1));
    assert_eq!(store.standing(premier[2]).unwrap().position, Some(2));
    assert_eq!(store.standing(premier[3]).unwrap().position, Some(3));

    // The moved row carries its totals and opens a fast-track window.
    let moved = store.standing(premier[1]).unwrap();
    assert_eq!(moved.ladder, "challengers");
    assert!(moved.active);
    assert_eq!((moved.wins, moved.losses, moved.total_matches), (9, 4, 13));
    assert_eq!(moved.fast_track_challenges_remaining, 2);
    assert!(moved.fast_track_until.unwrap() > Utc::now());

    // Lower ladder is untouched above the appended slot.
    assert_eq!(store.standing(lower[0]).unwrap().position, Some(1));
    assert_eq!(store.standing(lower[2]).unwrap().position, Some(3));
}

#[tokio::test]
async fn stay_changes_nothing() {
    let store = Arc::new(MemoryStandingStore::new());
    store.add_ladder("premier", 0, 4);
    store.add_ladder("challengers", 1, 4);
    let premier = store.seed_roster("premier", 4);

    let svc = service(&store);
    let summary = svc
        .submit_fast_track_choice(premier[1], FastTrackChoice::Stay)
        .await
        .unwrap();

    assert_eq!(summary.ladder, "premier");
    assert_eq!(summary.position, Some(2));
    assert_eq!(store.version_of("premier"), Some(0));
    assert_eq!(store.version_of("challengers"), Some(0));
}

#[tokio::test]
async fn move_down_from_the_bottom_tier_is_rejected() {
    let store = Arc::new(MemoryStandingStore::new());
    store.add_ladder("challengers", 1, 4);
    let ids = store.seed_roster("challengers", 3);

    let svc = service(&store);
    let err = svc
        .submit_fast_track_choice(ids[0], FastTrackChoice::MoveDown)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::NotEligible { .. }));
    assert_eq!(store.standing(ids[0]).unwrap().ladder, "challengers");
}

#[tokio::test]
async fn grace_period_starts_a_timer_and_nothing_else() {
    let store = Arc::new(MemoryStandingStore::new());
    store.add_ladder("premier", 0, 4);
    let ids = store.seed_roster("premier", 3);

    let svc = service(&store);
    svc.start_fast_track_grace(ids[1]).await.unwrap();

    let s = store.standing(ids[1]).unwrap();
    assert!(s.fast_track_grace_until.unwrap() > Utc::now());
    assert_eq!(s.position, Some(2));
    assert_eq!(s.fast_track_challenges_remaining, 0);
}
