use std::sync::Arc;

use rlk_schemas::{LeagueRules, MatchType};
use rlk_service::LadderService;
use rlk_testkit::MemoryStandingStore;

fn service(store: &Arc<MemoryStandingStore>) -> LadderService {
    LadderService::new(store.clone(), LeagueRules::default()).unwrap()
}

#[tokio::test]
async fn fast_track_win_takes_slot_and_displaces_by_one() {
    let store = Arc::new(MemoryStandingStore::new());
    store.add_ladder("main", 0, 4);
    let ids = store.seed_roster("main", 4); // A@1, B@2, C@3, D@4
    let svc = service(&store);

    // D beats B on a fast-track: D takes slot 2, B slides to 3, C to 4.
    svc.apply_match_result(MatchType::FastTrack, ids[3], ids[1], "main")
        .await
        .unwrap();

    assert_eq!(store.standing(ids[0]).unwrap().position, Some(1));
    assert_eq!(store.standing(ids[3]).unwrap().position, Some(2));
    assert_eq!(store.standing(ids[1]).unwrap().position, Some(3));
    assert_eq!(store.standing(ids[2]).unwrap().position, Some(4));
}

#[tokio::test]
async fn fast_track_defender_win_moves_nobody() {
    let store = Arc::new(MemoryStandingStore::new());
    store.add_ladder("main", 0, 4);
    let ids = store.seed_roster("main", 4);
    let svc = service(&store);

    svc.apply_match_result(MatchType::FastTrack, ids[1], ids[3], "main")
        .await
        .unwrap();

    let positions: Vec<i32> = store
        .active_positions("main")
        .into_iter()
        .map(|(_, p)| p)
        .collect();
    assert_eq!(positions, vec![1, 2, 3, 4]);
    assert_eq!(store.standing(ids[1]).unwrap().position, Some(2));
}

#[tokio::test]
async fn fast_track_attempt_spends_a_banked_challenge() {
    let store = Arc::new(MemoryStandingStore::new());
    store.add_ladder("main", 0, 4);
    let ids = store.seed_roster("main", 4);
    let mut challenger = store.standing(ids[3]).unwrap();
    challenger.fast_track_challenges_remaining = 2;
    store.put_standing(challenger);
    let svc = service(&store);

    svc.apply_match_result(MatchType::FastTrack, ids[3], ids[1], "main")
        .await
        .unwrap();
    assert_eq!(
        store.standing(ids[3]).unwrap().fast_track_challenges_remaining,
        1
    );
}
