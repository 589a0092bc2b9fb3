use std::sync::Arc;

use rlk_schemas::{LeagueRules, MatchType};
use rlk_service::LadderService;
use rlk_testkit::MemoryStandingStore;

fn service(store: &Arc<MemoryStandingStore>) -> LadderService {
    LadderService::new(store.clone(), LeagueRules::default()).unwrap()
}

#[tokio::test]
async fn challenger_win_swaps_and_leaves_middle_untouched() {
    let store = Arc::new(MemoryStandingStore::new());
    store.add_ladder("main", 0, 4);
    let ids = store.seed_roster("main", 3); // A@1, B@2, C@3
    let svc = service(&store);

    let applied = svc
        .apply_match_result(MatchType::Challenge, ids[2], ids[0], "main")
        .await
        .unwrap();

    assert_eq!(store.standing(ids[2]).unwrap().position, Some(1));
    assert_eq!(store.standing(ids[1]).unwrap().position, Some(2));
    assert_eq!(store.standing(ids[0]).unwrap().position, Some(3));
    // Only the two swapped players moved.
    assert_eq!(applied.new_positions.len(), 2);

    let positions: Vec<i32> = store
        .active_positions("main")
        .into_iter()
        .map(|(_, p)| p)
        .collect();
    assert_eq!(positions, vec![1, 2, 3]);
}

#[tokio::test]
async fn defender_win_changes_no_positions_but_counts_stats() {
    let store = Arc::new(MemoryStandingStore::new());
    store.add_ladder("main", 0, 4);
    let ids = store.seed_roster("main", 3);
    let svc = service(&store);

    let applied = svc
        .apply_match_result(MatchType::Challenge, ids[0], ids[2], "main")
        .await
        .unwrap();

    assert!(applied.new_positions.is_empty());
    assert_eq!(store.standing(ids[0]).unwrap().position, Some(1));
    assert_eq!(store.standing(ids[2]).unwrap().position, Some(3));

    let winner = store.standing(ids[0]).unwrap();
    let loser = store.standing(ids[2]).unwrap();
    assert_eq!((winner.wins, winner.total_matches), (1, 1));
    assert_eq!((loser.losses, loser.total_matches), (1, 1));
    assert!(winner.immunity_until.is_some());
}

#[tokio::test]
async fn unknown_match_type_string_behaves_like_challenge() {
    let store = Arc::new(MemoryStandingStore::new());
    store.add_ladder("main", 0, 4);
    let ids = store.seed_roster("main", 2);
    let svc = service(&store);

    let mt = rlk_schemas::MatchType::parse("bar-room-rules");
    svc.apply_match_result(mt, ids[1], ids[0], "main").await.unwrap();

    assert_eq!(store.standing(ids[1]).unwrap().position, Some(1));
    assert_eq!(store.standing(ids[0]).unwrap().position, Some(2));
}

#[tokio::test]
async fn missing_player_aborts_without_stat_writes() {
    let store = Arc::new(MemoryStandingStore::new());
    store.add_ladder("main", 0, 4);
    let ids = store.seed_roster("main", 2);
    let svc = service(&store);

    let ghost = uuid::Uuid::new_v4();
    let err = svc
        .apply_match_result(MatchType::Challenge, ghost, ids[0], "main")
        .await
        .unwrap_err();
    assert!(matches!(err, rlk_service::ServiceError::StandingNotFound { .. }));

    // The named loser saw no stat write.
    let loser = store.standing(ids[0]).unwrap();
    assert_eq!(loser.total_matches, 0);
    assert_eq!(store.version_of("main"), Some(0));
}

#[tokio::test]
async fn cross_ladder_match_aborts_reordering() {
    let store = Arc::new(MemoryStandingStore::new());
    store.add_ladder("main", 0, 4);
    store.add_ladder("lower", 1, 4);
    let main_ids = store.seed_roster("main", 2);
    let lower_ids = store.seed_roster("lower", 2);
    let svc = service(&store);

    let err = svc
        .apply_match_result(MatchType::Challenge, lower_ids[0], main_ids[0], "main")
        .await
        .unwrap_err();
    assert!(matches!(err, rlk_service::ServiceError::CrossLadderMismatch { .. }));
    assert_eq!(store.version_of("main"), Some(0));
    assert_eq!(store.version_of("lower"), Some(0));
}
