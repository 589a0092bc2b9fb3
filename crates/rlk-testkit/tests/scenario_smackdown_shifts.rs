use std::sync::Arc;

use chrono::Utc;
use rlk_schemas::{LeagueRules, MatchType};
use rlk_service::LadderService;
use rlk_testkit::MemoryStandingStore;

fn service(store: &Arc<MemoryStandingStore>) -> LadderService {
    LadderService::new(store.clone(), LeagueRules::default()).unwrap()
}

#[tokio::test]
async fn smackdown_challenger_win_rises_two_and_drops_loser_three() {
    let store = Arc::new(MemoryStandingStore::new());
    store.add_ladder("main", 0, 4);
    let ids = store.seed_roster("main", 10);
    let svc = service(&store);

    // Challenger@5 calls out and beats defender@8.
    svc.apply_match_result(MatchType::Smackdown, ids[4], ids[7], "main")
        .await
        .unwrap();

    assert_eq!(store.standing(ids[4]).unwrap().position, Some(3));
    // 8 + 3 = 11 clamps to the end of a 10-player roster.
    assert_eq!(store.standing(ids[7]).unwrap().position, Some(10));

    let positions: Vec<i32> = store
        .active_positions("main")
        .into_iter()
        .map(|(_, p)| p)
        .collect();
    assert_eq!(positions, (1..=10).collect::<Vec<_>>());
}

#[tokio::test]
async fn smackdown_rise_never_enters_the_top_slot() {
    let store = Arc::new(MemoryStandingStore::new());
    store.add_ladder("main", 0, 4);
    let ids = store.seed_roster("main", 6);
    let svc = service(&store);

    // Challenger@3 would rise to 1; the floor holds them at 2.
    svc.apply_match_result(MatchType::Smackdown, ids[2], ids[5], "main")
        .await
        .unwrap();
    assert_eq!(store.standing(ids[2]).unwrap().position, Some(2));
    assert_eq!(store.standing(ids[0]).unwrap().position, Some(1));
}

#[tokio::test]
async fn smackdown_defense_swaps_and_earns_smackback() {
    let store = Arc::new(MemoryStandingStore::new());
    store.add_ladder("main", 0, 4);
    let ids = store.seed_roster("main", 10);
    let svc = service(&store);

    // Defender@8 beats the caller@5: they swap, defender earns a smackback.
    svc.apply_match_result(MatchType::Smackdown, ids[7], ids[4], "main")
        .await
        .unwrap();

    assert_eq!(store.standing(ids[7]).unwrap().position, Some(5));
    assert_eq!(store.standing(ids[4]).unwrap().position, Some(8));

    let until = store.standing(ids[7]).unwrap().smackback_eligible_until;
    assert!(until.is_some());
    assert!(until.unwrap() > Utc::now());
}
