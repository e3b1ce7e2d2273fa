//! Season ingestion: bulk fetch, normalization, per-game writes, boxscore merge, derivation.

use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use rayon::prelude::*;
use rusqlite::Connection;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::config::PipelineConfig;
use crate::derive;
use crate::model::{PlayerGameStat, StatSource};
use crate::normalize::{
    GameUnit, Reject, RosterIndex, bulk_zero_line, normalize, resolve_boxscore,
};
use crate::source::{BoxscoreSource, BulkSource, Supplement};
use crate::store;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunReport {
    pub run_id: i64,
    pub season: u16,
    pub games_total: usize,
    pub games_written: usize,
    pub games_failed: usize,
    pub boxscores_merged: usize,
    pub boxscores_absent: usize,
    /// Games without a boxscore reference; the scraper was never called for them.
    pub boxscores_skipped: usize,
    /// Pages that were fetched but could not be merged.
    pub boxscores_failed: usize,
    pub players_derived: usize,
    pub derive_failed: usize,
    pub rejects: usize,
    pub errors: Vec<String>,
}

impl RunReport {
    /// Counts one game's outcome and hands back its rejects.
    fn tally(&mut self, outcome: GameOutcome) -> Vec<Reject> {
        if outcome.written {
            self.games_written += 1;
        } else {
            self.games_failed += 1;
        }
        match outcome.boxscore {
            BoxscoreOutcome::Merged => self.boxscores_merged += 1,
            BoxscoreOutcome::Absent => self.boxscores_absent += 1,
            BoxscoreOutcome::Skipped => self.boxscores_skipped += 1,
            BoxscoreOutcome::Failed => self.boxscores_failed += 1,
        }
        if let Some(err) = outcome.error {
            self.errors.push(err);
        }
        outcome.rejects
    }
}

/// Runs `action` on a pool of `threads` workers, or inline if the pool cannot be built.
pub fn with_worker_pool<T>(threads: usize, action: impl FnOnce() -> T + Send) -> T
where
    T: Send,
{
    match rayon::ThreadPoolBuilder::new()
        .num_threads(threads.max(1))
        .build()
    {
        Ok(pool) => pool.install(action),
        Err(err) => {
            warn!(error = %err, "worker pool unavailable, running inline");
            action()
        }
    }
}

#[derive(Debug, Default)]
struct GameOutcome {
    written: bool,
    boxscore: BoxscoreOutcome,
    rejects: Vec<Reject>,
    error: Option<String>,
}

#[derive(Debug, Default, PartialEq)]
enum BoxscoreOutcome {
    #[default]
    Skipped,
    Merged,
    Absent,
    Failed,
}

/// Ingests one season end to end. Bulk or roster failure aborts the run with an error after
/// the run row is closed; every other failure is confined to its unit and reported.
pub fn ingest_season(
    config: &PipelineConfig,
    bulk: &dyn BulkSource,
    boxscores: &dyn BoxscoreSource,
    season: u16,
) -> Result<RunReport> {
    let db_path = config.db_path.as_path();
    let mut conn = store::open_db(db_path)?;
    let run_id = store::begin_run(&conn, season)?;
    let mut report = RunReport {
        run_id,
        season,
        ..Default::default()
    };
    info!(season, run_id, db = %db_path.display(), "ingest started");

    let fetched = fetch_primary(bulk, season);
    let (pbp, roster_rows) = match fetched {
        Ok(v) => v,
        Err(err) => {
            error!(season, error = %format!("{err:#}"), "bulk source failed");
            report.errors.push(format!("{err:#}"));
            store::finish_run(&conn, run_id, &report)?;
            return Err(err);
        }
    };
    let schedule = match bulk.fetch_schedule(season) {
        Ok(rows) => rows,
        Err(err) => {
            warn!(season, error = %format!("{err:#}"), "schedule unavailable, boxscores skipped");
            report.errors.push(format!("schedule: {err:#}"));
            Vec::new()
        }
    };

    let (roster, mut rejects) = RosterIndex::from_records(&roster_rows);
    if roster.is_empty() {
        let err = anyhow!("roster for {season} has no identifiable players");
        report.errors.push(err.to_string());
        store::finish_run(&conn, run_id, &report)?;
        return Err(err);
    }

    let normalized = normalize(season, &pbp, &roster, &schedule, &config.pfr_boxscore_base);
    rejects.extend(normalized.rejects.iter().cloned());
    let players = normalized.players.clone();
    store::write_unit(&mut conn, "players", config.store_write_retries, |tx| {
        store::upsert_players(tx, &players)
    })?;

    let units = normalized.into_units();
    report.games_total = units.len();
    info!(season, games = units.len(), plays = pbp.len(), "normalized season");

    let outcomes = with_worker_pool(config.parallelism, || {
        units
            .par_iter()
            .map_init(
                || store::open_db(db_path),
                |conn, unit| match conn {
                    Ok(conn) => ingest_game(conn, unit, boxscores, &roster, config.store_write_retries),
                    Err(err) => GameOutcome {
                        error: Some(format!("{}: worker connection unavailable: {err:#}", unit.game.game_id)),
                        ..Default::default()
                    },
                },
            )
            .collect::<Vec<_>>()
    });

    for outcome in outcomes {
        rejects.extend(report.tally(outcome));
    }

    let derived = derive::derive_all(db_path, season, config.parallelism, config.store_write_retries)?;
    report.players_derived = derived.derived;
    report.derive_failed = derived.failed;
    report.errors.extend(derived.errors);

    report.rejects = rejects.len();
    store::record_rejects(&mut conn, run_id, &rejects)?;
    store::finish_run(&conn, run_id, &report)?;
    info!(
        season,
        run_id,
        games_written = report.games_written,
        games_failed = report.games_failed,
        boxscores_merged = report.boxscores_merged,
        boxscores_absent = report.boxscores_absent,
        boxscores_failed = report.boxscores_failed,
        rejects = report.rejects,
        "ingest finished"
    );
    Ok(report)
}

type PrimaryRows = (Vec<crate::raw::RawRecord>, Vec<crate::raw::RawRecord>);

fn fetch_primary(bulk: &dyn BulkSource, season: u16) -> Result<PrimaryRows> {
    let pbp = bulk
        .fetch_play_by_play(season)
        .with_context(|| format!("play-by-play {season}"))?;
    let roster = bulk
        .fetch_roster(season)
        .with_context(|| format!("roster {season}"))?;
    Ok((pbp, roster))
}

fn ingest_game(
    conn: &mut Connection,
    unit: &GameUnit,
    boxscores: &dyn BoxscoreSource,
    roster: &RosterIndex,
    attempts: u32,
) -> GameOutcome {
    let game_id = unit.game.game_id.as_str();
    let mut outcome = GameOutcome::default();

    if let Err(err) = store::write_unit(conn, game_id, attempts, |tx| store::write_game_unit(tx, unit)) {
        outcome.error = Some(format!("{game_id}: {err:#}"));
        return outcome;
    }
    outcome.written = true;
    debug!(game_id, plays = unit.plays.len(), stats = unit.stats.len(), "game written");

    let Some(url) = unit.game.boxscore_url() else {
        return outcome;
    };
    let rows = match boxscores.fetch_boxscore(url) {
        Supplement::Present(rows) => rows,
        Supplement::Absent { reason } => {
            debug!(game_id, %reason, "boxscore absent");
            outcome.boxscore = BoxscoreOutcome::Absent;
            return outcome;
        }
    };

    let (lines, rejects) = resolve_boxscore(&unit.game, &rows, roster);
    outcome.rejects = rejects;
    let fed = unit
        .stats
        .iter()
        .map(|s| s.player_id.as_str())
        .collect::<HashSet<_>>();
    let merged = store::write_unit(conn, &format!("{game_id} boxscore"), attempts, |tx| {
        for line in &lines {
            // On the page but in no play: the feed covers the game, so the bulk count is zero.
            if !fed.contains(line.player_id.as_str()) {
                let zero = PlayerGameStat {
                    stats: bulk_zero_line(),
                    ..line.clone()
                };
                store::upsert_player_game_stat(tx, &zero, StatSource::Bulk)?;
            }
            store::upsert_player_game_stat(tx, line, StatSource::Scrape)?;
        }
        Ok(lines.len())
    });
    match merged {
        Ok(n) => {
            debug!(game_id, lines = n, "boxscore merged");
            outcome.boxscore = BoxscoreOutcome::Merged;
        }
        Err(err) => {
            outcome.boxscore = BoxscoreOutcome::Failed;
            outcome.error = Some(format!("{game_id} boxscore: {err:#}"));
        }
    }
    outcome
}

/// Re-runs derivation for a season already in the store.
pub fn rederive_season(config: &PipelineConfig, season: u16) -> Result<derive::DeriveReport> {
    let path: &Path = config.db_path.as_path();
    derive::derive_all(path, season, config.parallelism, config.store_write_retries)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tally_counts_each_boxscore_outcome() {
        let mut report = RunReport::default();
        let merged = GameOutcome {
            written: true,
            boxscore: BoxscoreOutcome::Merged,
            ..Default::default()
        };
        let failed = GameOutcome {
            written: true,
            boxscore: BoxscoreOutcome::Failed,
            error: Some("2024_05_KC_NO boxscore: disk I/O error".into()),
            ..Default::default()
        };
        let unwritten = GameOutcome {
            error: Some("2024_06_NO_KC: locked".into()),
            ..Default::default()
        };
        for outcome in [merged, failed, unwritten] {
            assert!(report.tally(outcome).is_empty());
        }
        assert_eq!(report.games_written, 2);
        assert_eq!(report.games_failed, 1);
        assert_eq!(report.boxscores_merged, 1);
        assert_eq!(report.boxscores_failed, 1);
        // An unwritten game never reaches the scraper.
        assert_eq!(report.boxscores_skipped, 1);
        assert_eq!(report.errors.len(), 2);
    }
}
