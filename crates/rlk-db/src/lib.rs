//! Postgres implementation of the standing store.
//!
//! All writes that touch positions go through [`PgStandingStore::commit`]:
//! one transaction that conditionally bumps the ladder's roster_version and
//! upserts every affected row. A stale version bumps zero rows and the whole
//! commit fails with `StoreError::Conflict` — the service retries with a
//! fresh snapshot. The schema backs this up with a deferred unique
//! constraint on (ladder_name, position), so even a buggy caller cannot
//! commit a duplicate slot.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{postgres::PgPoolOptions, PgPool, Postgres, Row, Transaction};
use uuid::Uuid;

use rlk_schemas::{LadderMeta, PlayerStanding, TournamentPlacing};
use rlk_store::{RosterSnapshot, StandingStore, StoreError};

pub const ENV_DB_URL: &str = "RLK_DATABASE_URL";

/// Connect to Postgres using RLK_DATABASE_URL.
pub async fn connect_from_env() -> Result<PgPool> {
    let url = std::env::var(ENV_DB_URL)
        .with_context(|| format!("missing env var {ENV_DB_URL}"))?;

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&url)
        .await
        .context("failed to connect to Postgres")?;

    Ok(pool)
}

/// Run embedded SQLx migrations.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("db migrate failed")?;
    Ok(())
}

/// Simple status query (connectivity + schema presence).
pub async fn status(pool: &PgPool) -> Result<DbStatus> {
    let (one,): (i32,) = sqlx::query_as::<_, (i32,)>("select 1")
        .fetch_one(pool)
        .await
        .context("status connectivity query failed")?;
    let ok = one == 1;

    let (exists,): (bool,) = sqlx::query_as::<_, (bool,)>(
        r#"
        select exists (
            select 1
            from information_schema.tables
            where table_schema='public' and table_name='standings'
        )
        "#,
    )
    .fetch_one(pool)
    .await
    .context("status table-exists query failed")?;

    Ok(DbStatus { ok, has_standings_table: exists })
}

#[derive(Debug, Clone)]
pub struct DbStatus {
    pub ok: bool,
    pub has_standings_table: bool,
}

/// Count standings rows. CLI guardrail: `rlk db migrate` refuses to run
/// against a populated league DB without an explicit acknowledgement.
pub async fn count_standings(pool: &PgPool) -> Result<i64> {
    let st = status(pool).await?;
    if !st.has_standings_table {
        // Schema not created yet: safe to migrate.
        return Ok(0);
    }

    let (n,): (i64,) = sqlx::query_as::<_, (i64,)>("select count(*)::bigint from standings")
        .fetch_one(pool)
        .await
        .context("count_standings failed")?;

    Ok(n)
}

/// Create a ladder row. Fails on duplicate name or tier.
pub async fn create_ladder(
    pool: &PgPool,
    name: &str,
    tier: i32,
    places_to_pay: i32,
) -> Result<()> {
    sqlx::query(
        r#"
        insert into ladders (name, tier, places_to_pay)
        values ($1, $2, $3)
        "#,
    )
    .bind(name)
    .bind(tier)
    .bind(places_to_pay)
    .execute(pool)
    .await
    .context("create_ladder failed")?;

    Ok(())
}

/// Record one tournament plus its final standings in a single transaction.
/// Used by admin tooling and fixtures; the engine itself only reads these.
pub async fn record_tournament(
    pool: &PgPool,
    tournament_id: Uuid,
    name: &str,
    placings: &[(Uuid, i32)],
) -> Result<()> {
    let mut tx = pool.begin().await.context("begin record_tournament")?;

    sqlx::query(
        r#"
        insert into tournaments (tournament_id, name)
        values ($1, $2)
        "#,
    )
    .bind(tournament_id)
    .bind(name)
    .execute(&mut *tx)
    .await
    .context("insert tournament failed")?;

    for (player_id, final_rank) in placings {
        sqlx::query(
            r#"
            insert into tournament_results (tournament_id, player_id, final_rank)
            values ($1, $2, $3)
            "#,
        )
        .bind(tournament_id)
        .bind(player_id)
        .bind(final_rank)
        .execute(&mut *tx)
        .await
        .context("insert tournament result failed")?;
    }

    tx.commit().await.context("commit record_tournament")?;
    Ok(())
}

/// Insert one ladder event row (append-only semantics enforced at app layer).
pub async fn insert_ladder_event(pool: &PgPool, ev: &NewLadderEvent) -> Result<()> {
    sqlx::query(
        r#"
        insert into ladder_events (
          event_id, ladder_name, ts_utc, event_type, payload, hash_prev, hash_self
        ) values (
          $1, $2, $3, $4, $5, $6, $7
        )
        "#,
    )
    .bind(ev.event_id)
    .bind(&ev.ladder_name)
    .bind(ev.ts_utc)
    .bind(&ev.event_type)
    .bind(&ev.payload)
    .bind(&ev.hash_prev)
    .bind(&ev.hash_self)
    .execute(pool)
    .await
    .context("insert_ladder_event failed")?;
    Ok(())
}

#[derive(Debug, Clone)]
pub struct NewLadderEvent {
    pub event_id: Uuid,
    pub ladder_name: String,
    pub ts_utc: DateTime<Utc>,
    pub event_type: String,
    pub payload: Value,
    pub hash_prev: Option<String>,
    pub hash_self: Option<String>,
}

// ---------------------------------------------------------------------------
// StandingStore implementation
// ---------------------------------------------------------------------------

/// Postgres-backed [`StandingStore`].
#[derive(Clone)]
pub struct PgStandingStore {
    pool: PgPool,
}

impl PgStandingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn transport(e: sqlx::Error) -> StoreError {
    StoreError::Transport(e.to_string())
}

fn decode(e: sqlx::Error) -> StoreError {
    StoreError::Decode(e.to_string())
}

fn standing_from_row(row: &sqlx::postgres::PgRow) -> Result<PlayerStanding, StoreError> {
    Ok(PlayerStanding {
        player_id: row.try_get("player_id").map_err(decode)?,
        ladder: row.try_get("ladder_name").map_err(decode)?,
        position: row.try_get("position").map_err(decode)?,
        wins: row.try_get("wins").map_err(decode)?,
        losses: row.try_get("losses").map_err(decode)?,
        total_matches: row.try_get("total_matches").map_err(decode)?,
        fast_track_challenges_remaining: row
            .try_get("fast_track_challenges_remaining")
            .map_err(decode)?,
        fast_track_until: row.try_get("fast_track_until").map_err(decode)?,
        fast_track_grace_until: row.try_get("fast_track_grace_until").map_err(decode)?,
        smackback_eligible_until: row.try_get("smackback_eligible_until").map_err(decode)?,
        immunity_until: row.try_get("immunity_until").map_err(decode)?,
        period_start_position: row.try_get("period_start_position").map_err(decode)?,
        period_start_date: row.try_get("period_start_date").map_err(decode)?,
        positions_climbed: row.try_get("positions_climbed").map_err(decode)?,
        decline_count: row.try_get("decline_count").map_err(decode)?,
        last_decline_date: row.try_get("last_decline_date").map_err(decode)?,
        active: row.try_get("active").map_err(decode)?,
    })
}

const STANDING_COLUMNS: &str = r#"
    player_id, ladder_name, position, wins, losses, total_matches,
    fast_track_challenges_remaining, fast_track_until, fast_track_grace_until,
    smackback_eligible_until, immunity_until,
    period_start_position, period_start_date, positions_climbed,
    decline_count, last_decline_date, active
"#;

async fn upsert_standing(
    tx: &mut Transaction<'_, Postgres>,
    s: &PlayerStanding,
) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        insert into standings (
          player_id, ladder_name, position, wins, losses, total_matches,
          fast_track_challenges_remaining, fast_track_until, fast_track_grace_until,
          smackback_eligible_until, immunity_until,
          period_start_position, period_start_date, positions_climbed,
          decline_count, last_decline_date, active
        ) values (
          $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17
        )
        on conflict (player_id) do update set
          ladder_name = excluded.ladder_name,
          position = excluded.position,
          wins = excluded.wins,
          losses = excluded.losses,
          total_matches = excluded.total_matches,
          fast_track_challenges_remaining = excluded.fast_track_challenges_remaining,
          fast_track_until = excluded.fast_track_until,
          fast_track_grace_until = excluded.fast_track_grace_until,
          smackback_eligible_until = excluded.smackback_eligible_until,
          immunity_until = excluded.immunity_until,
          period_start_position = excluded.period_start_position,
          period_start_date = excluded.period_start_date,
          positions_climbed = excluded.positions_climbed,
          decline_count = excluded.decline_count,
          last_decline_date = excluded.last_decline_date,
          active = excluded.active
        "#,
    )
    .bind(s.player_id)
    .bind(&s.ladder)
    .bind(s.position)
    .bind(s.wins)
    .bind(s.losses)
    .bind(s.total_matches)
    .bind(s.fast_track_challenges_remaining)
    .bind(s.fast_track_until)
    .bind(s.fast_track_grace_until)
    .bind(s.smackback_eligible_until)
    .bind(s.immunity_until)
    .bind(s.period_start_position)
    .bind(s.period_start_date)
    .bind(s.positions_climbed)
    .bind(s.decline_count)
    .bind(s.last_decline_date)
    .bind(s.active)
    .execute(&mut **tx)
    .await
    .map_err(transport)?;

    Ok(())
}

fn ladder_meta_from_row(row: &sqlx::postgres::PgRow) -> Result<LadderMeta, StoreError> {
    Ok(LadderMeta {
        name: row.try_get("name").map_err(decode)?,
        tier: row.try_get("tier").map_err(decode)?,
        places_to_pay: row.try_get("places_to_pay").map_err(decode)?,
    })
}

#[async_trait]
impl StandingStore for PgStandingStore {
    async fn ladder_meta(&self, ladder: &str) -> Result<LadderMeta, StoreError> {
        let row = sqlx::query("select name, tier, places_to_pay from ladders where name = $1")
            .bind(ladder)
            .fetch_optional(&self.pool)
            .await
            .map_err(transport)?
            .ok_or(StoreError::NotFound { what: "ladder", key: ladder.to_string() })?;
        ladder_meta_from_row(&row)
    }

    async fn ladder_by_tier(&self, tier: i32) -> Result<Option<LadderMeta>, StoreError> {
        let row = sqlx::query("select name, tier, places_to_pay from ladders where tier = $1")
            .bind(tier)
            .fetch_optional(&self.pool)
            .await
            .map_err(transport)?;
        row.as_ref().map(ladder_meta_from_row).transpose()
    }

    async fn roster(&self, ladder: &str) -> Result<RosterSnapshot, StoreError> {
        let ladder_row = sqlx::query(
            "select name, tier, places_to_pay, roster_version from ladders where name = $1",
        )
        .bind(ladder)
        .fetch_optional(&self.pool)
        .await
        .map_err(transport)?
        .ok_or(StoreError::NotFound { what: "ladder", key: ladder.to_string() })?;

        let meta = ladder_meta_from_row(&ladder_row)?;
        let version: i64 = ladder_row.try_get("roster_version").map_err(decode)?;

        let rows = sqlx::query(&format!(
            "select {STANDING_COLUMNS} from standings \
             where ladder_name = $1 and active \
             order by position asc"
        ))
        .bind(ladder)
        .fetch_all(&self.pool)
        .await
        .map_err(transport)?;

        let mut standings = Vec::with_capacity(rows.len());
        for row in &rows {
            standings.push(standing_from_row(row)?);
        }

        Ok(RosterSnapshot { meta, version, standings })
    }

    async fn find_standing(&self, player_id: Uuid) -> Result<Option<PlayerStanding>, StoreError> {
        let row = sqlx::query(&format!(
            "select {STANDING_COLUMNS} from standings where player_id = $1"
        ))
        .bind(player_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(transport)?;

        row.as_ref().map(standing_from_row).transpose()
    }

    async fn commit(
        &self,
        ladder: &str,
        expected_version: i64,
        rows: &[PlayerStanding],
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(transport)?;

        let bumped = sqlx::query(
            r#"
            update ladders
            set roster_version = roster_version + 1
            where name = $1 and roster_version = $2
            "#,
        )
        .bind(ladder)
        .bind(expected_version)
        .execute(&mut *tx)
        .await
        .map_err(transport)?;

        if bumped.rows_affected() == 0 {
            // Distinguish an unknown ladder from a stale snapshot.
            let exists = sqlx::query("select 1 from ladders where name = $1")
                .bind(ladder)
                .fetch_optional(&mut *tx)
                .await
                .map_err(transport)?
                .is_some();
            return Err(if exists {
                StoreError::Conflict { ladder: ladder.to_string(), expected_version }
            } else {
                StoreError::NotFound { what: "ladder", key: ladder.to_string() }
            });
        }

        for s in rows {
            upsert_standing(&mut tx, s).await?;
        }

        tx.commit().await.map_err(transport)?;
        Ok(())
    }

    async fn tournament_placings(
        &self,
        tournament_id: Uuid,
    ) -> Result<Vec<TournamentPlacing>, StoreError> {
        let exists = sqlx::query("select 1 from tournaments where tournament_id = $1")
            .bind(tournament_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(transport)?
            .is_some();
        if !exists {
            return Err(StoreError::NotFound {
                what: "tournament",
                key: tournament_id.to_string(),
            });
        }

        let rows = sqlx::query(
            r#"
            select tournament_id, player_id, final_rank
            from tournament_results
            where tournament_id = $1
            order by final_rank asc
            "#,
        )
        .bind(tournament_id)
        .fetch_all(&self.pool)
        .await
        .map_err(transport)?;

        let mut placings = Vec::with_capacity(rows.len());
        for row in &rows {
            placings.push(TournamentPlacing {
                tournament_id: row.try_get("tournament_id").map_err(decode)?,
                player_id: row.try_get("player_id").map_err(decode)?,
                final_rank: row.try_get("final_rank").map_err(decode)?,
            });
        }
        Ok(placings)
    }

    async fn mark_tournament_complete(
        &self,
        tournament_id: Uuid,
        completed_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let res = sqlx::query(
            r#"
            update tournaments
            set completed = true,
                completed_at_utc = $2
            where tournament_id = $1
            "#,
        )
        .bind(tournament_id)
        .bind(completed_at)
        .execute(&self.pool)
        .await
        .map_err(transport)?;

        if res.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                what: "tournament",
                key: tournament_id.to_string(),
            });
        }
        Ok(())
    }
}

/// Detect a Postgres unique constraint violation by name. Used by callers
/// that want the true reason (e.g. duplicate tournament rank) instead of a
/// generic failure.
pub fn is_unique_constraint_violation(err: &anyhow::Error, constraint: &str) -> bool {
    match err.downcast_ref::<sqlx::Error>() {
        Some(sqlx::Error::Database(db_err)) => db_err.constraint() == Some(constraint),
        _ => false,
    }
}

/// Fetch ladder metadata or fail with a uniform message. Convenience for
/// CLI paths that do not go through the trait object.
pub async fn fetch_ladder_meta(pool: &PgPool, ladder: &str) -> Result<LadderMeta> {
    let row = sqlx::query("select name, tier, places_to_pay from ladders where name = $1")
        .bind(ladder)
        .fetch_optional(pool)
        .await
        .context("fetch_ladder_meta failed")?
        .ok_or_else(|| anyhow!("ladder not found: {ladder}"))?;

    ladder_meta_from_row(&row).map_err(|e| anyhow!("{e}"))
}
