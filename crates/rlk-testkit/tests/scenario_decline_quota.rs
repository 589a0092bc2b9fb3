use std::sync::Arc;

use rlk_schemas::LeagueRules;
use rlk_service::{LadderService, ServiceError};
use rlk_testkit::MemoryStandingStore;

fn service(store: &Arc<MemoryStandingStore>) -> LadderService {
    LadderService::new(store.clone(), LeagueRules::default()).unwrap()
}

#[tokio::test]
async fn two_declines_a_month_then_the_door_closes() {
    let store = Arc::new(MemoryStandingStore::new());
    store.add_ladder("main", 0, 4);
    let ids = store.seed_roster("main", 3);

    let svc = service(&store);
    assert!(svc.can_decline(ids[1]).await.unwrap());

    svc.record_decline(ids[1]).await.unwrap();
    svc.record_decline(ids[1]).await.unwrap();
    assert!(!svc.can_decline(ids[1]).await.unwrap());

    let err = svc.record_decline(ids[1]).await.unwrap_err();
    assert!(matches!(err, ServiceError::NotEligible { .. }));
    assert_eq!(store.standing(ids[1]).unwrap().decline_count, 2);
}

#[tokio::test]
async fn a_stale_decline_month_resets_the_counter() {
    let store = Arc::new(MemoryStandingStore::new());
    store.add_ladder("main", 0, 4);
    let ids = store.seed_roster("main", 3);

    // Counter maxed out months ago.
    let mut s = store.standing(ids[1]).unwrap();
    s.decline_count = 2;
    s.last_decline_date = Some(chrono::Utc::now() - chrono::Duration::days(90));
    store.put_standing(s);

    let svc = service(&store);
    assert!(svc.can_decline(ids[1]).await.unwrap());
    svc.record_decline(ids[1]).await.unwrap();
    assert_eq!(store.standing(ids[1]).unwrap().decline_count, 1);
}

#[tokio::test]
async fn immunity_is_reported_not_enforced() {
    let store = Arc::new(MemoryStandingStore::new());
    store.add_ladder("main", 0, 4);
    let ids = store.seed_roster("main", 3);

    let svc = service(&store);
    assert!(!svc.has_immunity(ids[0]).await.unwrap());

    // A win grants the window; the predicate reports it. Whether a
    // challenge against an immune player is allowed stays a caller call.
    svc.apply_match_result(rlk_schemas::MatchType::Challenge, ids[0], ids[2], "main")
        .await
        .unwrap();
    assert!(svc.has_immunity(ids[0]).await.unwrap());

    // The engine itself will still happily run a match against them.
    svc.apply_match_result(rlk_schemas::MatchType::Challenge, ids[2], ids[0], "main")
        .await
        .unwrap();
}
