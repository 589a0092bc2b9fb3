//! rlk-daemon entry point.
//!
//! This file is intentionally thin: it sets up tracing, connects the store,
//! builds the shared state, wires middleware, and starts the HTTP server.
//! All route handlers live in `routes.rs`; all shared state types live in
//! `state.rs`.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context;
use axum::http::{HeaderValue, Method};
use rlk_daemon::{routes, state};
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::{info, Level};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env.local if present (dev convenience). Silent if the file does
    // not exist — production injects env vars directly.
    let _ = dotenvy::from_filename(".env.local");

    init_tracing();

    let pool = rlk_db::connect_from_env().await?;
    let store = Arc::new(rlk_db::PgStandingStore::new(pool.clone()));

    let rules = load_rules_from_env()?;
    let service = Arc::new(
        rlk_service::LadderService::new(store, rules)
            .map_err(|e| anyhow::anyhow!("service init failed: {e}"))?,
    );

    let audit_path =
        std::env::var("RLK_AUDIT_LOG").unwrap_or_else(|_| "exports/ladder-audit.jsonl".to_string());
    // Continue an existing chain across restarts rather than forking it.
    let (tip, seq) = rlk_audit::chain_tip(&audit_path)?;
    let mut audit = rlk_audit::LadderLog::open(&audit_path)?;
    audit.resume_at(tip, seq);

    let shared = Arc::new(state::AppState::new(service, audit, pool));

    state::spawn_heartbeat(shared.bus.clone(), Duration::from_secs(1));

    let app = routes::build_router(Arc::clone(&shared))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors_localhost_only());

    let addr = bind_addr_from_env().unwrap_or_else(|| SocketAddr::from(([127, 0, 0, 1], 8711)));
    info!("rlk-daemon listening on http://{}", addr);

    axum::serve(tokio::net::TcpListener::bind(addr).await?, app)
        .await
        .context("server crashed")?;

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}

fn bind_addr_from_env() -> Option<SocketAddr> {
    std::env::var("RLK_DAEMON_ADDR").ok()?.parse().ok()
}

/// League rules come from layered YAML named in RLK_CONFIG (comma-separated,
/// base first). Unset means rulebook defaults.
fn load_rules_from_env() -> anyhow::Result<rlk_schemas::LeagueRules> {
    let Ok(paths) = std::env::var("RLK_CONFIG") else {
        return Ok(rlk_schemas::LeagueRules::default());
    };
    let parts: Vec<&str> = paths.split(',').map(str::trim).filter(|s| !s.is_empty()).collect();
    let loaded = rlk_config::load_layered_yaml(&parts)?;
    info!(config_hash = %loaded.config_hash, "loaded league config");
    rlk_config::league_rules(&loaded.config_json)
}

/// CORS: allow only localhost origins.
fn cors_localhost_only() -> CorsLayer {
    let allowed_origins = [
        "http://localhost",
        "http://127.0.0.1",
        "http://localhost:3000",
        "http://127.0.0.1:3000",
        "http://localhost:5173",
        "http://127.0.0.1:5173",
    ];

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|o| HeaderValue::from_str(o).ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(tower_http::cors::Any)
}
