//! Axum router and all HTTP handlers for rlk-daemon.
//!
//! `build_router` is the single entry point; `main.rs` calls it and attaches
//! middleware layers. All handlers are `pub(crate)` so the scenario tests in
//! `tests/` can compose the router directly.

use std::{convert::Infallible, sync::Arc};

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use futures_util::{Stream, StreamExt};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{info, warn};

use rlk_audit::LadderEventKind;
use rlk_service::{FastTrackChoice, ServiceError};
use rlk_schemas::MatchType;
use rlk_store::StoreError;

use crate::{
    api_types::{
        ApplyMatchRequest, ApplyMatchResponse, ClimberResponse, DeclineRequest, DeclineResponse,
        ErrorResponse, FastTrackChoiceRequest, FastTrackChoiceResponse, FastTrackGraceRequest,
        HealthResponse, PositionChange, SeedRequest, SeedResponse, StandingsResponse,
    },
    state::{AppState, StreamEvent, PositionMsg},
};

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Build the complete application router wired to the given shared state.
///
/// Middleware layers (CORS, tracing) are **not** applied here; `main.rs`
/// attaches them after this call so tests can use the bare router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/health", get(health))
        .route("/v1/ladder/:name/standings", get(standings))
        .route("/v1/ladder/:name/climber", get(climber))
        .route("/v1/match/apply", post(match_apply))
        .route("/v1/tournament/seed", post(tournament_seed))
        .route("/v1/fast-track/choice", post(fast_track_choice))
        .route("/v1/fast-track/grace", post(fast_track_grace))
        .route("/v1/decline", post(decline))
        .route("/v1/stream", get(stream))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

fn error_response(err: ServiceError) -> Response {
    let (status, kind) = match &err {
        ServiceError::StandingNotFound { .. } => (StatusCode::NOT_FOUND, "standing_not_found"),
        ServiceError::Store(StoreError::NotFound { .. }) => (StatusCode::NOT_FOUND, "not_found"),
        ServiceError::CrossLadderMismatch { .. } => {
            (StatusCode::UNPROCESSABLE_ENTITY, "cross_ladder_mismatch")
        }
        ServiceError::NotEligible { .. } => (StatusCode::UNPROCESSABLE_ENTITY, "not_eligible"),
        ServiceError::AlreadyOnLadder { .. } => (StatusCode::CONFLICT, "already_on_ladder"),
        ServiceError::InvalidTarget(_) => (StatusCode::UNPROCESSABLE_ENTITY, "invalid_target"),
        ServiceError::Conflict { .. } => (StatusCode::CONFLICT, "conflict"),
        ServiceError::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "config"),
        ServiceError::Store(_) => (StatusCode::INTERNAL_SERVER_ERROR, "store"),
    };

    (
        status,
        Json(ErrorResponse { error: err.to_string(), kind: kind.to_string() }),
    )
        .into_response()
}

// ---------------------------------------------------------------------------
// GET /v1/health
// ---------------------------------------------------------------------------

pub(crate) async fn health(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            ok: true,
            service: st.build.service,
            version: st.build.version,
        }),
    )
}

// ---------------------------------------------------------------------------
// GET /v1/ladder/:name/standings
// ---------------------------------------------------------------------------

pub(crate) async fn standings(
    State(st): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Response {
    match st.service.roster(&name).await {
        Ok(snap) => (
            StatusCode::OK,
            Json(StandingsResponse {
                ladder: name,
                roster_version: snap.version,
                standings: snap.standings,
            }),
        )
            .into_response(),
        Err(e) => error_response(e),
    }
}

// ---------------------------------------------------------------------------
// GET /v1/ladder/:name/climber
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub(crate) struct ClimberQuery {
    places_to_pay: Option<i32>,
}

pub(crate) async fn climber(
    State(st): State<Arc<AppState>>,
    Path(name): Path<String>,
    Query(q): Query<ClimberQuery>,
) -> Response {
    match st.service.get_current_climber(&name, q.places_to_pay).await {
        Ok(summary) => (
            StatusCode::OK,
            Json(ClimberResponse { ladder: name, climber: summary }),
        )
            .into_response(),
        Err(e) => error_response(e),
    }
}

// ---------------------------------------------------------------------------
// POST /v1/match/apply
// ---------------------------------------------------------------------------

pub(crate) async fn match_apply(
    State(st): State<Arc<AppState>>,
    Json(req): Json<ApplyMatchRequest>,
) -> Response {
    let match_type = MatchType::parse(&req.match_type);

    let applied = match st
        .service
        .apply_match_result(match_type, req.winner_id, req.loser_id, &req.ladder)
        .await
    {
        Ok(a) => a,
        Err(e) => return error_response(e),
    };

    info!(
        ladder = %applied.ladder,
        match_type = match_type.as_str(),
        winner = %applied.winner_id,
        moved = applied.new_positions.len(),
        "match applied"
    );

    record_event(
        &st,
        &applied.ladder,
        LadderEventKind::MatchApplied,
        json!({
            "match_type": match_type.as_str(),
            "winner_id": applied.winner_id,
            "loser_id": applied.loser_id,
            "new_positions": applied
                .new_positions
                .iter()
                .map(|w| json!({"player_id": w.player_id, "position": w.position}))
                .collect::<Vec<_>>(),
        }),
    )
    .await;

    let changed: Vec<PositionMsg> = applied
        .new_positions
        .iter()
        .map(|w| PositionMsg { player_id: w.player_id, position: w.position })
        .collect();
    let _ = st.bus.send(StreamEvent::LadderChanged {
        ladder: applied.ladder.clone(),
        changed,
    });

    (
        StatusCode::OK,
        Json(ApplyMatchResponse {
            ladder: applied.ladder,
            match_type: match_type.as_str().to_string(),
            winner_id: applied.winner_id,
            loser_id: applied.loser_id,
            new_positions: applied
                .new_positions
                .into_iter()
                .map(|w| PositionChange { player_id: w.player_id, position: w.position })
                .collect(),
        }),
    )
        .into_response()
}

// ---------------------------------------------------------------------------
// POST /v1/tournament/seed
// ---------------------------------------------------------------------------

pub(crate) async fn tournament_seed(
    State(st): State<Arc<AppState>>,
    Json(req): Json<SeedRequest>,
) -> Response {
    let result = if req.complete {
        st.service
            .complete_tournament_and_seed_ladder(req.tournament_id, &req.ladder)
            .await
    } else {
        st.service.seed_from_tournament(req.tournament_id, &req.ladder).await
    };

    let report = match result {
        Ok(r) => r,
        Err(e) => return error_response(e),
    };

    info!(
        ladder = %report.ladder,
        tournament = %report.tournament_id,
        seeded = report.seeded_count,
        shifted = report.shifted_count,
        "ladder seeded"
    );

    record_event(
        &st,
        &report.ladder,
        LadderEventKind::Seeded,
        json!({
            "tournament_id": report.tournament_id,
            "seeded_count": report.seeded_count,
            "shifted_count": report.shifted_count,
            "needs_manual_add": report.needs_manual_add,
            "completed": req.complete,
        }),
    )
    .await;

    let _ = st.bus.send(StreamEvent::LadderChanged {
        ladder: report.ladder.clone(),
        changed: Vec::new(),
    });

    (
        StatusCode::OK,
        Json(SeedResponse {
            ladder: report.ladder,
            tournament_id: report.tournament_id,
            seeded_count: report.seeded_count,
            shifted_count: report.shifted_count,
            needs_manual_add: report.needs_manual_add,
            completed: req.complete,
        }),
    )
        .into_response()
}

// ---------------------------------------------------------------------------
// POST /v1/fast-track/choice
// ---------------------------------------------------------------------------

pub(crate) async fn fast_track_choice(
    State(st): State<Arc<AppState>>,
    Json(req): Json<FastTrackChoiceRequest>,
) -> Response {
    let Some(choice) = FastTrackChoice::parse(&req.choice) else {
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(ErrorResponse {
                error: format!("choice must be \"stay\" or \"move_down\", got {:?}", req.choice),
                kind: "invalid_choice".to_string(),
            }),
        )
            .into_response();
    };

    let summary = match st.service.submit_fast_track_choice(req.player_id, choice).await {
        Ok(s) => s,
        Err(e) => return error_response(e),
    };

    record_event(
        &st,
        &summary.ladder,
        LadderEventKind::FastTrackChoice,
        json!({
            "player_id": summary.player_id,
            "choice": choice.as_str(),
            "position": summary.position,
        }),
    )
    .await;

    (
        StatusCode::OK,
        Json(FastTrackChoiceResponse {
            player_id: summary.player_id,
            choice: choice.as_str().to_string(),
            ladder: summary.ladder,
            position: summary.position,
            fast_track_challenges_remaining: summary.fast_track_challenges_remaining,
        }),
    )
        .into_response()
}

// ---------------------------------------------------------------------------
// POST /v1/fast-track/grace
// ---------------------------------------------------------------------------

pub(crate) async fn fast_track_grace(
    State(st): State<Arc<AppState>>,
    Json(req): Json<FastTrackGraceRequest>,
) -> Response {
    match st.service.start_fast_track_grace(req.player_id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => error_response(e),
    }
}

// ---------------------------------------------------------------------------
// POST /v1/decline
// ---------------------------------------------------------------------------

pub(crate) async fn decline(
    State(st): State<Arc<AppState>>,
    Json(req): Json<DeclineRequest>,
) -> Response {
    match st.service.record_decline(req.player_id).await {
        Ok(()) => (
            StatusCode::OK,
            Json(DeclineResponse { player_id: req.player_id, recorded: true }),
        )
            .into_response(),
        Err(e) => error_response(e),
    }
}

// ---------------------------------------------------------------------------
// GET /v1/stream  (SSE)
// ---------------------------------------------------------------------------

pub(crate) async fn stream(State(st): State<Arc<AppState>>) -> Response {
    let mut headers = HeaderMap::new();
    headers.insert("Cache-Control", HeaderValue::from_static("no-cache"));
    headers.insert("Connection", HeaderValue::from_static("keep-alive"));

    let rx = st.bus.subscribe();
    let events = broadcast_to_sse(rx);

    (headers, Sse::new(events).keep_alive(KeepAlive::new())).into_response()
}

fn broadcast_to_sse(
    rx: broadcast::Receiver<StreamEvent>,
) -> impl Stream<Item = Result<Event, Infallible>> {
    BroadcastStream::new(rx).filter_map(|msg| async move {
        match msg {
            Ok(m) => {
                let event_name = match &m {
                    StreamEvent::Heartbeat { .. } => "heartbeat",
                    StreamEvent::LadderChanged { .. } => "ladder",
                    StreamEvent::LogLine { .. } => "log",
                };
                let data = serde_json::to_string(&m).ok()?;
                Some(Ok(Event::default().event(event_name).data(data)))
            }
            Err(_) => None, // lagged / closed
        }
    })
}

// ---------------------------------------------------------------------------
// Audit wiring
// ---------------------------------------------------------------------------

/// Append to the JSONL audit trail and mirror to the DB when wired. Audit
/// failures are logged, never turned into request failures: the position
/// commit already happened.
async fn record_event(
    st: &AppState,
    ladder: &str,
    kind: LadderEventKind,
    payload: serde_json::Value,
) {
    let Some(audit) = &st.audit else { return };

    let ev = {
        let mut log = audit.lock().await;
        log.append(ladder, kind, payload)
    };

    let ev = match ev {
        Ok(ev) => ev,
        Err(e) => {
            warn!("audit append failed: {e:#}");
            return;
        }
    };

    if let Some(pool) = &st.pool {
        let db_ev = rlk_db::NewLadderEvent {
            event_id: ev.event_id,
            ladder_name: ev.ladder,
            ts_utc: ev.ts_utc,
            event_type: ev.event_type,
            payload: ev.payload,
            hash_prev: ev.prev_digest,
            hash_self: ev.digest,
        };
        if let Err(e) = rlk_db::insert_ladder_event(pool, &db_ev).await {
            warn!("ladder_events mirror insert failed: {e:#}");
        }
    }
}
