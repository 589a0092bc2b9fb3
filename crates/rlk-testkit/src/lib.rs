//! Test tooling shared by the scenario suite: the in-memory standing store
//! (conflict-faithful, with scripted failure injection), roster fixtures,
//! and a CSV loader for tournament placing fixtures.

use anyhow::{Context, Result};
use uuid::Uuid;

use rlk_schemas::TournamentPlacing;

mod memory_store;

pub use memory_store::MemoryStandingStore;

/// Load tournament placings from a CSV fixture: `player_id,final_rank`
/// with a header row.
pub fn load_placings_csv(path: &str, tournament_id: Uuid) -> Result<Vec<TournamentPlacing>> {
    let mut rdr =
        csv::Reader::from_path(path).with_context(|| format!("open placings csv: {path}"))?;
    let mut out = Vec::new();

    for rec in rdr.records() {
        let rec = rec?;
        let player_id: Uuid = rec[0].parse().context("parse player_id")?;
        let final_rank: i32 = rec[1].parse().context("parse final_rank")?;
        out.push(TournamentPlacing { tournament_id, player_id, final_rank });
    }

    // Minimal structural checks: ranks must be unique and positive.
    for p in &out {
        if p.final_rank < 1 {
            anyhow::bail!("final_rank must be >= 1, got {}", p.final_rank);
        }
    }
    let mut ranks: Vec<i32> = out.iter().map(|p| p.final_rank).collect();
    ranks.sort_unstable();
    ranks.dedup();
    if ranks.len() != out.len() {
        anyhow::bail!("duplicate final_rank in placings fixture");
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn placings_csv_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("placings.csv");
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "player_id,final_rank").unwrap();
        writeln!(f, "{a},1").unwrap();
        writeln!(f, "{b},2").unwrap();

        let tid = Uuid::new_v4();
        let placings = load_placings_csv(path.to_str().unwrap(), tid).unwrap();
        assert_eq!(placings.len(), 2);
        assert_eq!(placings[0].player_id, a);
        assert_eq!(placings[1].final_rank, 2);
    }

    #[test]
    fn duplicate_rank_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.csv");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "player_id,final_rank").unwrap();
        writeln!(f, "{},1", Uuid::new_v4()).unwrap();
        writeln!(f, "{},1", Uuid::new_v4()).unwrap();

        assert!(load_placings_csv(path.to_str().unwrap(), Uuid::new_v4()).is_err());
    }
}
