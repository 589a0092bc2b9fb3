use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::fs;
use std::sync::Arc;
use uuid::Uuid;

use rlk_service::{FastTrackChoice, LadderService};

#[derive(Parser)]
#[command(name = "rlk")]
#[command(about = "RackLadder league CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Database commands
    Db {
        #[command(subcommand)]
        cmd: DbCmd,
    },

    /// Compute layered config hash + print canonical JSON
    ConfigHash {
        /// Paths in merge order (base -> venue -> season)
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// Ladder administration
    Ladder {
        #[command(subcommand)]
        cmd: LadderCmd,
    },

    /// Record a finished match
    Match {
        #[command(subcommand)]
        cmd: MatchCmd,
    },

    /// Tournament intake and seeding
    Tournament {
        #[command(subcommand)]
        cmd: TournamentCmd,
    },

    /// Fast-track tier transfer
    FastTrack {
        #[command(subcommand)]
        cmd: FastTrackCmd,
    },

    /// Audit trail utilities
    Audit {
        #[command(subcommand)]
        cmd: AuditCmd,
    },
}

#[derive(Subcommand)]
enum DbCmd {
    Status,

    /// Apply SQL migrations. Guardrail: refuses when the standings table is
    /// populated unless --yes is provided.
    Migrate {
        /// Acknowledge you are migrating a DB that holds live league data.
        #[arg(long, default_value_t = false)]
        yes: bool,
    },
}

#[derive(Subcommand)]
enum LadderCmd {
    /// Create a ladder
    Create {
        #[arg(long)]
        name: String,

        /// Tier, top ladder = 0; tier + 1 is the fast-track target.
        #[arg(long)]
        tier: i32,

        /// Paid placement bracket size (climber exclusion)
        #[arg(long, default_value_t = 4)]
        places_to_pay: i32,
    },

    /// Print the active roster in position order
    Standings {
        #[arg(long)]
        ladder: String,
    },

    /// Print the current most-improved player
    Climber {
        #[arg(long)]
        ladder: String,

        /// Override the ladder's configured paid bracket
        #[arg(long)]
        places_to_pay: Option<i32>,
    },

    /// Add a player, at the tail or at an admin-chosen slot
    AddPlayer {
        #[arg(long)]
        ladder: String,

        #[arg(long)]
        player_id: String,

        #[arg(long)]
        slot: Option<i32>,
    },

    /// Deactivate a player's standing and compact the ladder
    RemovePlayer {
        #[arg(long)]
        player_id: String,
    },

    /// Rebase the climber baseline onto the current positions
    ResetPeriod {
        #[arg(long)]
        ladder: String,
    },
}

#[derive(Subcommand)]
enum MatchCmd {
    /// Apply a match result (stats + reorder, atomically)
    Apply {
        #[arg(long)]
        ladder: String,

        #[arg(long)]
        winner: String,

        #[arg(long)]
        loser: String,

        /// challenge | fast-track | reverse-fast-track | smackdown | smackback
        #[arg(long = "type", default_value = "challenge")]
        match_type: String,
    },

    /// Record a challenge decline (quota-checked)
    Decline {
        #[arg(long)]
        player_id: String,
    },
}

#[derive(Subcommand)]
enum TournamentCmd {
    /// Record final tournament standings from a JSON file:
    /// [["<player uuid>", rank], ...]
    Record {
        #[arg(long)]
        tournament_id: String,

        #[arg(long)]
        name: String,

        #[arg(long = "placings-file")]
        placings_file: String,
    },

    /// Seed a ladder from recorded tournament standings
    Seed {
        #[arg(long)]
        tournament_id: String,

        #[arg(long)]
        ladder: String,

        /// Also reset the climber period and mark the tournament completed
        #[arg(long, default_value_t = false)]
        complete: bool,
    },
}

#[derive(Subcommand)]
enum FastTrackCmd {
    /// Submit the player's answer to a tier-down offer
    Choice {
        #[arg(long)]
        player_id: String,

        /// stay | move_down
        #[arg(long)]
        choice: String,
    },

    /// Start the 14-day grace timer on the current standing
    Grace {
        #[arg(long)]
        player_id: String,
    },
}

#[derive(Subcommand)]
enum AuditCmd {
    /// Verify the hash chain of a JSONL audit log
    Verify {
        #[arg(long)]
        path: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Dev convenience; production injects env vars directly.
    let _ = dotenvy::from_filename(".env.local");

    let cli = Cli::parse();

    match cli.cmd {
        Commands::Db { cmd } => {
            let pool = rlk_db::connect_from_env().await?;
            match cmd {
                DbCmd::Status => {
                    let s = rlk_db::status(&pool).await?;
                    println!("db_ok={} has_standings_table={}", s.ok, s.has_standings_table);
                }
                DbCmd::Migrate { yes } => {
                    let n = rlk_db::count_standings(&pool).await?;
                    if n > 0 && !yes {
                        anyhow::bail!(
                            "REFUSING MIGRATE: standings table holds {} row(s) of live league data. Re-run with: `rlk db migrate --yes`",
                            n
                        );
                    }

                    rlk_db::migrate(&pool).await?;
                    println!("migrations_applied=true");
                }
            }
        }

        Commands::ConfigHash { paths } => {
            let path_refs: Vec<&str> = paths.iter().map(|s| s.as_str()).collect();
            let loaded = rlk_config::load_layered_yaml(&path_refs)?;
            println!("config_hash={}", loaded.config_hash);
            println!("{}", loaded.canonical_json);
        }

        Commands::Ladder { cmd } => match cmd {
            LadderCmd::Create { name, tier, places_to_pay } => {
                let pool = rlk_db::connect_from_env().await?;
                rlk_db::create_ladder(&pool, &name, tier, places_to_pay).await?;
                println!("created=true ladder={name} tier={tier} places_to_pay={places_to_pay}");
            }

            LadderCmd::Standings { ladder } => {
                let svc = build_service().await?;
                let snap = svc.roster(&ladder).await?;
                println!("ladder={} roster_version={}", ladder, snap.version);
                for s in &snap.standings {
                    println!(
                        "position={} player_id={} wins={} losses={} climbed={}",
                        s.position.unwrap_or(0),
                        s.player_id,
                        s.wins,
                        s.losses,
                        s.positions_climbed
                    );
                }
            }

            LadderCmd::Climber { ladder, places_to_pay } => {
                let svc = build_service().await?;
                match svc.get_current_climber(&ladder, places_to_pay).await? {
                    Some(c) => println!(
                        "climber={} position={} from={} climbed={}",
                        c.player_id, c.position, c.period_start_position, c.positions_climbed
                    ),
                    None => println!("climber=none"),
                }
            }

            LadderCmd::AddPlayer { ladder, player_id, slot } => {
                let svc = build_service().await?;
                let id = parse_uuid(&player_id)?;
                let writes = svc.add_player(&ladder, id, slot).await?;
                println!("added=true player_id={id} ladder={ladder} shifted={}", writes.len());
            }

            LadderCmd::RemovePlayer { player_id } => {
                let svc = build_service().await?;
                let id = parse_uuid(&player_id)?;
                let writes = svc.remove_player(id).await?;
                println!("removed=true player_id={id} compacted={}", writes.len());
            }

            LadderCmd::ResetPeriod { ladder } => {
                let svc = build_service().await?;
                svc.initialize_new_period(&ladder).await?;
                println!("period_reset=true ladder={ladder}");
            }
        },

        Commands::Match { cmd } => match cmd {
            MatchCmd::Apply { ladder, winner, loser, match_type } => {
                let svc = build_service().await?;
                let winner = parse_uuid(&winner)?;
                let loser = parse_uuid(&loser)?;
                let mt = rlk_schemas::MatchType::parse(&match_type);

                let applied = svc.apply_match_result(mt, winner, loser, &ladder).await?;
                println!(
                    "applied=true ladder={} type={} winner={} loser={}",
                    applied.ladder,
                    mt.as_str(),
                    applied.winner_id,
                    applied.loser_id
                );
                for w in &applied.new_positions {
                    println!("moved player_id={} position={}", w.player_id, w.position);
                }
            }

            MatchCmd::Decline { player_id } => {
                let svc = build_service().await?;
                let id = parse_uuid(&player_id)?;
                svc.record_decline(id).await?;
                println!("decline_recorded=true player_id={id}");
            }
        },

        Commands::Tournament { cmd } => match cmd {
            TournamentCmd::Record { tournament_id, name, placings_file } => {
                let pool = rlk_db::connect_from_env().await?;
                let tid = parse_uuid(&tournament_id)?;
                let placings = load_placings_json(&placings_file)?;
                rlk_db::record_tournament(&pool, tid, &name, &placings).await?;
                println!("recorded=true tournament_id={tid} placings={}", placings.len());
            }

            TournamentCmd::Seed { tournament_id, ladder, complete } => {
                let svc = build_service().await?;
                let tid = parse_uuid(&tournament_id)?;

                let report = if complete {
                    svc.complete_tournament_and_seed_ladder(tid, &ladder).await?
                } else {
                    svc.seed_from_tournament(tid, &ladder).await?
                };

                println!(
                    "seeded=true ladder={} tournament_id={} seeded_count={} shifted_count={} completed={}",
                    report.ladder, report.tournament_id, report.seeded_count, report.shifted_count, complete
                );
                for p in &report.needs_manual_add {
                    println!("needs_manual_add player_id={p}");
                }
            }
        },

        Commands::FastTrack { cmd } => match cmd {
            FastTrackCmd::Choice { player_id, choice } => {
                let svc = build_service().await?;
                let id = parse_uuid(&player_id)?;
                let parsed = FastTrackChoice::parse(&choice)
                    .with_context(|| format!("choice must be stay|move_down, got {choice:?}"))?;

                let summary = svc.submit_fast_track_choice(id, parsed).await?;
                println!(
                    "choice={} player_id={} ladder={} position={} challenges_remaining={}",
                    parsed.as_str(),
                    summary.player_id,
                    summary.ladder,
                    summary.position.unwrap_or(0),
                    summary.fast_track_challenges_remaining
                );
            }

            FastTrackCmd::Grace { player_id } => {
                let svc = build_service().await?;
                let id = parse_uuid(&player_id)?;
                svc.start_fast_track_grace(id).await?;
                println!("grace_started=true player_id={id}");
            }
        },

        Commands::Audit { cmd } => match cmd {
            AuditCmd::Verify { path } => match rlk_audit::verify_log(&path)? {
                rlk_audit::ChainReport::Intact { events } => {
                    println!("chain_intact=true events={events}");
                }
                rlk_audit::ChainReport::Broken { line, reason } => {
                    println!("chain_intact=false line={line}");
                    anyhow::bail!("audit chain broken at line {line}: {reason}");
                }
            },
        },
    }

    Ok(())
}

/// Connect the Postgres store and build the service with rules from the
/// RLK_CONFIG layered YAML paths (comma-separated), or rulebook defaults.
async fn build_service() -> Result<LadderService> {
    let pool = rlk_db::connect_from_env().await?;
    let store = Arc::new(rlk_db::PgStandingStore::new(pool));

    let rules = match std::env::var("RLK_CONFIG") {
        Ok(paths) => {
            let parts: Vec<&str> =
                paths.split(',').map(str::trim).filter(|s| !s.is_empty()).collect();
            let loaded = rlk_config::load_layered_yaml(&parts)?;
            rlk_config::league_rules(&loaded.config_json)?
        }
        Err(_) => rlk_schemas::LeagueRules::default(),
    };

    LadderService::new(store, rules).map_err(|e| anyhow::anyhow!("service init failed: {e}"))
}

fn parse_uuid(s: &str) -> Result<Uuid> {
    Uuid::parse_str(s.trim()).with_context(|| format!("invalid uuid: {s}"))
}

/// Placings file format: JSON array of [player uuid, rank] pairs.
fn load_placings_json(path: &str) -> Result<Vec<(Uuid, i32)>> {
    let raw = fs::read_to_string(path).with_context(|| format!("read placings file: {path}"))?;
    let rows: Vec<(Uuid, i32)> =
        serde_json::from_str(&raw).context("placings file must be a JSON array of [uuid, rank]")?;
    if rows.is_empty() {
        anyhow::bail!("placings file is empty");
    }
    Ok(rows)
}
