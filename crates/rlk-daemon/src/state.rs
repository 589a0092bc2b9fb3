//! Shared runtime state for rlk-daemon.
//!
//! Handlers receive `State<Arc<AppState>>` from Axum; nothing in this module
//! is async beyond the broadcast bus itself.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tokio::sync::{broadcast, Mutex};
use uuid::Uuid;

use rlk_audit::LadderLog;
use rlk_service::LadderService;

// ---------------------------------------------------------------------------
// StreamEvent — SSE bus payload
// ---------------------------------------------------------------------------

/// Messages broadcast over the internal event bus and surfaced as SSE
/// events to connected league UIs.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    Heartbeat {
        ts_millis: i64,
    },
    /// Positions changed on a ladder; clients should refetch standings.
    LadderChanged {
        ladder: String,
        changed: Vec<PositionMsg>,
    },
    LogLine {
        level: String,
        msg: String,
    },
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PositionMsg {
    pub player_id: Uuid,
    pub position: i32,
}

// ---------------------------------------------------------------------------
// AppState
// ---------------------------------------------------------------------------

/// Static build metadata included in health responses.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct BuildInfo {
    pub service: &'static str,
    pub version: &'static str,
}

/// Cloneable (Arc) handle shared across all Axum handlers.
pub struct AppState {
    /// Broadcast bus for SSE.
    pub bus: broadcast::Sender<StreamEvent>,
    /// Static build metadata.
    pub build: BuildInfo,
    /// The ranking engine surface.
    pub service: Arc<LadderService>,
    /// JSONL audit log. `None` in bare-router tests.
    pub audit: Option<Mutex<LadderLog>>,
    /// DB pool for the ladder_events mirror. `None` when the store is not
    /// Postgres (bare-router tests over the in-memory store).
    pub pool: Option<PgPool>,
}

impl AppState {
    /// State for tests and embedders: no audit file, no DB mirror.
    pub fn bare(service: Arc<LadderService>) -> Self {
        Self {
            bus: broadcast::channel(1024).0,
            build: BuildInfo {
                service: "rlk-daemon",
                version: env!("CARGO_PKG_VERSION"),
            },
            service,
            audit: None,
            pool: None,
        }
    }

    /// Fully wired state for the production binary.
    pub fn new(service: Arc<LadderService>, audit: LadderLog, pool: PgPool) -> Self {
        Self {
            audit: Some(Mutex::new(audit)),
            pool: Some(pool),
            ..Self::bare(service)
        }
    }
}

// ---------------------------------------------------------------------------
// Background tasks
// ---------------------------------------------------------------------------

/// Emit a heartbeat on the bus every `interval` so SSE clients can tell a
/// quiet league from a dead daemon.
pub fn spawn_heartbeat(bus: broadcast::Sender<StreamEvent>, interval: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let _ = bus.send(StreamEvent::Heartbeat {
                ts_millis: chrono::Utc::now().timestamp_millis(),
            });
        }
    });
}
