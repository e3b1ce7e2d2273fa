//! SQLite persistence: schema migrations, per-unit write transactions and read helpers.

use std::collections::HashSet;
use std::path::Path;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use chrono::Utc;
use rusqlite::{
    Connection, OpenFlags, OptionalExtension, Row, Transaction, TransactionBehavior, params,
};
use tracing::{debug, info, warn};

use crate::model::{
    DerivedMetric, Game, Play, Player, PlayerGameStat, SEASON_TOTAL_PERIOD, SeasonType, StatField,
    StatLine, StatSource,
};
use crate::normalize::{GameUnit, Reject, merge_stat};
use crate::pipeline::RunReport;

const BUSY_TIMEOUT: Duration = Duration::from_secs(10);

const MIGRATIONS: &[(i64, &str, &str)] = &[
    (
        1,
        "canonical_schema",
        r#"
        CREATE TABLE teams (
            team_id TEXT PRIMARY KEY
        );
        CREATE TABLE players (
            player_id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            merge_name TEXT NOT NULL,
            position TEXT NULL,
            team_id TEXT NULL,
            headshot_url TEXT NULL
        );
        CREATE INDEX idx_players_merge_name ON players(merge_name);

        CREATE TABLE games (
            game_id TEXT PRIMARY KEY,
            season INTEGER NOT NULL,
            week INTEGER NOT NULL,
            season_type TEXT NOT NULL,
            home_team TEXT NOT NULL REFERENCES teams(team_id),
            away_team TEXT NOT NULL REFERENCES teams(team_id),
            game_date TEXT NULL,
            home_score INTEGER NULL,
            away_score INTEGER NULL,
            boxscore_url TEXT NULL
        );
        CREATE INDEX idx_games_season_week ON games(season, week);

        CREATE TABLE plays (
            game_id TEXT NOT NULL REFERENCES games(game_id),
            play_index INTEGER NOT NULL,
            play_id INTEGER NOT NULL,
            drive INTEGER NULL,
            quarter INTEGER NULL,
            down INTEGER NULL,
            yards_to_go INTEGER NULL,
            yardline_100 INTEGER NULL,
            play_type TEXT NULL,
            posteam TEXT NULL,
            defteam TEXT NULL,
            yards_gained INTEGER NULL,
            air_yards INTEGER NULL,
            yards_after_catch INTEGER NULL,
            passer_id TEXT NULL,
            receiver_id TEXT NULL,
            rusher_id TEXT NULL,
            fumbler_id TEXT NULL,
            pass_attempt INTEGER NOT NULL,
            complete_pass INTEGER NOT NULL,
            interception INTEGER NOT NULL,
            sack INTEGER NOT NULL,
            rush_attempt INTEGER NOT NULL,
            pass_touchdown INTEGER NOT NULL,
            rush_touchdown INTEGER NOT NULL,
            fumble_lost INTEGER NOT NULL,
            two_point_attempt INTEGER NOT NULL,
            description TEXT NULL,
            PRIMARY KEY (game_id, play_index)
        );
        CREATE INDEX idx_plays_game_posteam ON plays(game_id, posteam);

        CREATE TABLE player_game_stats (
            player_id TEXT NOT NULL,
            game_id TEXT NOT NULL REFERENCES games(game_id),
            season INTEGER NOT NULL,
            week INTEGER NOT NULL,
            team_id TEXT NULL,
            targets INTEGER NULL,
            receptions INTEGER NULL,
            receiving_yards INTEGER NULL,
            receiving_tds INTEGER NULL,
            air_yards INTEGER NULL,
            yards_after_catch INTEGER NULL,
            rush_attempts INTEGER NULL,
            rushing_yards INTEGER NULL,
            rushing_tds INTEGER NULL,
            pass_attempts INTEGER NULL,
            completions INTEGER NULL,
            passing_yards INTEGER NULL,
            passing_tds INTEGER NULL,
            interceptions INTEGER NULL,
            sacks INTEGER NULL,
            fumbles_lost INTEGER NULL,
            offense_snaps INTEGER NULL,
            offense_snap_pct INTEGER NULL,
            routes_run INTEGER NULL,
            PRIMARY KEY (player_id, game_id)
        );
        CREATE INDEX idx_pgs_season_week ON player_game_stats(season, week);

        CREATE TABLE derived_metrics (
            player_id TEXT NOT NULL,
            season INTEGER NOT NULL,
            period INTEGER NOT NULL,
            metric TEXT NOT NULL,
            value REAL NULL,
            inputs TEXT NOT NULL,
            input_hash TEXT NOT NULL,
            PRIMARY KEY (player_id, season, period, metric)
        );
        CREATE INDEX idx_derived_season_metric ON derived_metrics(season, period, metric);
        "#,
    ),
    (
        2,
        "run_bookkeeping",
        r#"
        CREATE TABLE ingest_runs (
            run_id INTEGER PRIMARY KEY AUTOINCREMENT,
            season INTEGER NOT NULL,
            started_at TEXT NOT NULL,
            finished_at TEXT NULL,
            games_total INTEGER NOT NULL DEFAULT 0,
            games_written INTEGER NOT NULL DEFAULT 0,
            games_failed INTEGER NOT NULL DEFAULT 0,
            boxscores_merged INTEGER NOT NULL DEFAULT 0,
            boxscores_absent INTEGER NOT NULL DEFAULT 0,
            players_derived INTEGER NOT NULL DEFAULT 0,
            rejects INTEGER NOT NULL DEFAULT 0,
            errors_json TEXT NOT NULL DEFAULT '[]'
        );
        CREATE TABLE run_rejects (
            run_id INTEGER NOT NULL REFERENCES ingest_runs(run_id),
            stage TEXT NOT NULL,
            record_key TEXT NOT NULL,
            reason TEXT NOT NULL
        );
        CREATE INDEX idx_run_rejects_run ON run_rejects(run_id);
        "#,
    ),
    (
        3,
        "run_boxscores_failed",
        "ALTER TABLE ingest_runs ADD COLUMN boxscores_failed INTEGER NOT NULL DEFAULT 0;",
    ),
];

pub fn open_db(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create db directory {}", parent.display()))?;
    }
    let conn =
        Connection::open(path).with_context(|| format!("open sqlite db {}", path.display()))?;
    conn.busy_timeout(BUSY_TIMEOUT).context("set busy timeout")?;
    conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA foreign_keys = ON;")
        .context("set sqlite pragmas")?;
    migrate(&conn)?;
    Ok(conn)
}

/// Read-only handle for the query layer. The database must already exist.
pub fn open_reader(path: &Path) -> Result<Connection> {
    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .with_context(|| format!("open sqlite db {} read-only", path.display()))?;
    conn.busy_timeout(BUSY_TIMEOUT).context("set busy timeout")?;
    Ok(conn)
}

pub fn migrate(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL
        );",
    )
    .context("create schema_migrations")?;
    let current: i64 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            [],
            |row| row.get(0),
        )
        .context("read schema version")?;

    for (version, name, sql) in MIGRATIONS.iter().filter(|(v, _, _)| *v > current) {
        let tx = conn
            .unchecked_transaction()
            .context("begin migration transaction")?;
        tx.execute_batch(sql)
            .with_context(|| format!("apply migration {version} {name}"))?;
        tx.execute(
            "INSERT INTO schema_migrations(version, name, applied_at) VALUES (?1, ?2, ?3)",
            params![version, name, Utc::now().to_rfc3339()],
        )
        .context("record migration")?;
        tx.commit().context("commit migration")?;
        info!(version, name, "applied schema migration");
    }
    Ok(())
}

/// Runs `unit` inside an IMMEDIATE transaction, retrying the whole unit on failure.
/// Nothing of a failed attempt survives: the transaction rolls back on drop.
pub fn write_unit<T>(
    conn: &mut Connection,
    label: &str,
    attempts: u32,
    mut unit: impl FnMut(&Transaction<'_>) -> Result<T>,
) -> Result<T> {
    let attempts = attempts.max(1);
    let mut last_err = None;
    for attempt in 1..=attempts {
        let result = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .context("begin write transaction")
            .and_then(|tx| {
                let value = unit(&tx)?;
                tx.commit().context("commit write transaction")?;
                Ok(value)
            });
        match result {
            Ok(value) => return Ok(value),
            Err(err) => {
                warn!(unit = label, attempt, error = %format!("{err:#}"), "store write failed");
                last_err = Some(err);
                if attempt < attempts {
                    thread::sleep(Duration::from_millis(100 * attempt as u64));
                }
            }
        }
    }
    Err(last_err
        .unwrap_or_else(|| anyhow!("no attempts made"))
        .context(format!("{label}: giving up after {attempts} attempts")))
}

pub fn upsert_team(conn: &Connection, team_id: &str) -> Result<()> {
    conn.prepare_cached("INSERT OR IGNORE INTO teams(team_id) VALUES (?1)")?
        .execute(params![team_id])
        .with_context(|| format!("upsert team {team_id}"))?;
    Ok(())
}

pub fn upsert_players(conn: &Connection, players: &[Player]) -> Result<()> {
    let mut stmt = conn.prepare_cached(
        "INSERT INTO players(player_id, name, merge_name, position, team_id, headshot_url)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT(player_id) DO UPDATE SET
            name = excluded.name,
            merge_name = excluded.merge_name,
            position = COALESCE(excluded.position, players.position),
            team_id = COALESCE(excluded.team_id, players.team_id),
            headshot_url = COALESCE(excluded.headshot_url, players.headshot_url)",
    )?;
    for p in players {
        stmt.execute(params![
            p.player_id,
            p.name,
            p.merge_name,
            p.position,
            p.team_id,
            p.headshot_url
        ])
        .with_context(|| format!("upsert player {}", p.player_id))?;
    }
    Ok(())
}

pub fn upsert_game(conn: &Connection, game: &Game) -> Result<()> {
    upsert_team(conn, &game.home_team)?;
    upsert_team(conn, &game.away_team)?;
    conn.prepare_cached(
        "INSERT INTO games(game_id, season, week, season_type, home_team, away_team,
                           game_date, home_score, away_score, boxscore_url)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
         ON CONFLICT(game_id) DO UPDATE SET
            season = excluded.season,
            week = excluded.week,
            season_type = excluded.season_type,
            home_team = excluded.home_team,
            away_team = excluded.away_team,
            game_date = excluded.game_date,
            home_score = excluded.home_score,
            away_score = excluded.away_score,
            boxscore_url = COALESCE(excluded.boxscore_url, games.boxscore_url)",
    )?
    .execute(params![
        game.game_id,
        game.season,
        game.week,
        game.season_type.as_str(),
        game.home_team,
        game.away_team,
        game.game_date,
        game.home_score,
        game.away_score,
        game.boxscore_url,
    ])
    .with_context(|| format!("upsert game {}", game.game_id))?;
    Ok(())
}

/// Deletes the game's plays and writes the new set; callers hold the unit transaction.
pub fn replace_plays_for_game(conn: &Connection, game_id: &str, plays: &[Play]) -> Result<()> {
    conn.execute("DELETE FROM plays WHERE game_id = ?1", params![game_id])
        .with_context(|| format!("clear plays for {game_id}"))?;
    let mut stmt = conn.prepare_cached(
        "INSERT INTO plays(game_id, play_index, play_id, drive, quarter, down, yards_to_go,
                           yardline_100, play_type, posteam, defteam, yards_gained, air_yards,
                           yards_after_catch, passer_id, receiver_id, rusher_id, fumbler_id,
                           pass_attempt, complete_pass, interception, sack, rush_attempt,
                           pass_touchdown, rush_touchdown, fumble_lost, two_point_attempt,
                           description)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17,
                 ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26, ?27, ?28)",
    )?;
    for p in plays {
        stmt.execute(params![
            game_id,
            p.play_index,
            p.play_id,
            p.drive,
            p.quarter,
            p.down,
            p.yards_to_go,
            p.yardline_100,
            p.play_type,
            p.posteam,
            p.defteam,
            p.yards_gained,
            p.air_yards,
            p.yards_after_catch,
            p.passer_id,
            p.receiver_id,
            p.rusher_id,
            p.fumbler_id,
            p.pass_attempt,
            p.complete_pass,
            p.interception,
            p.sack,
            p.rush_attempt,
            p.pass_touchdown,
            p.rush_touchdown,
            p.fumble_lost,
            p.two_point_attempt,
            p.description,
        ])
        .with_context(|| format!("insert play {game_id}#{}", p.play_id))?;
    }
    Ok(())
}

const STAT_COLUMNS: &str = "targets, receptions, receiving_yards, receiving_tds, air_yards, \
    yards_after_catch, rush_attempts, rushing_yards, rushing_tds, pass_attempts, completions, \
    passing_yards, passing_tds, interceptions, sacks, fumbles_lost, offense_snaps, \
    offense_snap_pct, routes_run";

/// Merges `incoming` into whatever row already exists and writes the result.
pub fn upsert_player_game_stat(
    conn: &Connection,
    incoming: &PlayerGameStat,
    source: StatSource,
) -> Result<PlayerGameStat> {
    let existing = load_player_game_stat(conn, &incoming.player_id, &incoming.game_id)?;
    let merged = merge_stat(existing.as_ref(), incoming, source);
    write_stat_row(conn, &merged)?;
    Ok(merged)
}

fn write_stat_row(conn: &Connection, stat: &PlayerGameStat) -> Result<()> {
    let values: Vec<Option<i64>> = StatField::ALL.iter().map(|f| stat.stats.get(*f)).collect();
    let mut stmt = conn.prepare_cached(&format!(
        "INSERT OR REPLACE INTO player_game_stats(player_id, game_id, season, week, team_id, {STAT_COLUMNS})
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18,
                 ?19, ?20, ?21, ?22, ?23, ?24)"
    ))?;
    let mut bind: Vec<&dyn rusqlite::ToSql> = vec![
        &stat.player_id,
        &stat.game_id,
        &stat.season,
        &stat.week,
        &stat.team_id,
    ];
    bind.extend(values.iter().map(|v| v as &dyn rusqlite::ToSql));
    stmt.execute(bind.as_slice())
        .with_context(|| format!("upsert stat {}@{}", stat.player_id, stat.game_id))?;
    Ok(())
}

/// One game's bulk unit: game row, its full play set and bulk stat lines.
pub fn write_game_unit(tx: &Transaction<'_>, unit: &GameUnit) -> Result<()> {
    upsert_game(tx, &unit.game)?;
    replace_plays_for_game(tx, &unit.game.game_id, &unit.plays)?;
    retire_stale_stats(tx, unit)?;
    for stat in &unit.stats {
        upsert_player_game_stat(tx, stat, StatSource::Bulk)?;
    }
    Ok(())
}

/// Rows left by an earlier ingest of the game for players the feed no longer lists. Their
/// bulk fields drop to zero; a row with nothing else on it is deleted.
fn retire_stale_stats(tx: &Transaction<'_>, unit: &GameUnit) -> Result<usize> {
    let listed = unit
        .stats
        .iter()
        .map(|s| s.player_id.as_str())
        .collect::<HashSet<_>>();
    let stale = load_game_stats(tx, &unit.game.game_id)?
        .into_iter()
        .filter(|s| !listed.contains(s.player_id.as_str()))
        .collect::<Vec<_>>();
    for mut stat in stale.iter().cloned() {
        let scraped = StatField::ALL
            .into_iter()
            .any(|f| !f.bulk_covered() && stat.stats.get(f).is_some());
        if scraped {
            for field in StatField::ALL.into_iter().filter(|f| f.bulk_covered()) {
                stat.stats.set(field, Some(0));
            }
            write_stat_row(tx, &stat)?;
        } else {
            tx.execute(
                "DELETE FROM player_game_stats WHERE player_id = ?1 AND game_id = ?2",
                params![stat.player_id, stat.game_id],
            )
            .with_context(|| format!("delete stale stat {}@{}", stat.player_id, stat.game_id))?;
        }
    }
    if !stale.is_empty() {
        debug!(game_id = %unit.game.game_id, retired = stale.len(), "retired stale stat rows");
    }
    Ok(stale.len())
}

pub fn replace_derived_metrics_for_player_season(
    conn: &mut Connection,
    player_id: &str,
    season: u16,
    metrics: &[DerivedMetric],
) -> Result<()> {
    replace_derived_with_fault(conn, player_id, season, metrics, None)
}

/// `fail_after` aborts the transaction after that many inserts.
fn replace_derived_with_fault(
    conn: &mut Connection,
    player_id: &str,
    season: u16,
    metrics: &[DerivedMetric],
    fail_after: Option<usize>,
) -> Result<()> {
    let tx = conn
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .context("begin derived transaction")?;
    write_derived_metrics(&tx, player_id, season, metrics, fail_after)?;
    tx.commit().context("commit derived metrics")?;
    Ok(())
}

pub(crate) fn write_derived_metrics(
    tx: &Transaction<'_>,
    player_id: &str,
    season: u16,
    metrics: &[DerivedMetric],
    fail_after: Option<usize>,
) -> Result<()> {
    tx.execute(
        "DELETE FROM derived_metrics WHERE player_id = ?1 AND season = ?2",
        params![player_id, season],
    )
    .with_context(|| format!("clear derived metrics for {player_id} {season}"))?;
    let mut stmt = tx.prepare_cached(
        "INSERT INTO derived_metrics(player_id, season, period, metric, value, inputs, input_hash)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
    )?;
    for (written, m) in metrics.iter().enumerate() {
        if fail_after == Some(written) {
            return Err(anyhow!("injected failure after {written} metric writes"));
        }
        if m.player_id != player_id || m.season != season {
            return Err(anyhow!(
                "metric {} belongs to {} {}, not {player_id} {season}",
                m.metric,
                m.player_id,
                m.season
            ));
        }
        stmt.execute(params![
            m.player_id,
            m.season,
            m.period(),
            m.metric,
            m.value,
            m.inputs,
            m.input_hash
        ])
        .with_context(|| format!("insert metric {} for {player_id}", m.metric))?;
    }
    Ok(())
}

pub fn begin_run(conn: &Connection, season: u16) -> Result<i64> {
    conn.execute(
        "INSERT INTO ingest_runs(season, started_at) VALUES (?1, ?2)",
        params![season, Utc::now().to_rfc3339()],
    )
    .context("insert ingest run")?;
    Ok(conn.last_insert_rowid())
}

pub fn finish_run(conn: &Connection, run_id: i64, report: &RunReport) -> Result<()> {
    let errors_json = serde_json::to_string(&report.errors).unwrap_or_else(|_| "[]".to_string());
    conn.execute(
        "UPDATE ingest_runs
         SET finished_at = ?1, games_total = ?2, games_written = ?3, games_failed = ?4,
             boxscores_merged = ?5, boxscores_absent = ?6, boxscores_failed = ?7,
             players_derived = ?8, rejects = ?9, errors_json = ?10
         WHERE run_id = ?11",
        params![
            Utc::now().to_rfc3339(),
            report.games_total as i64,
            report.games_written as i64,
            report.games_failed as i64,
            report.boxscores_merged as i64,
            report.boxscores_absent as i64,
            report.boxscores_failed as i64,
            report.players_derived as i64,
            report.rejects as i64,
            errors_json,
            run_id
        ],
    )
    .context("update ingest run")?;
    Ok(())
}

pub fn record_rejects(conn: &mut Connection, run_id: i64, rejects: &[Reject]) -> Result<()> {
    if rejects.is_empty() {
        return Ok(());
    }
    let tx = conn.transaction().context("begin reject transaction")?;
    {
        let mut stmt = tx.prepare_cached(
            "INSERT INTO run_rejects(run_id, stage, record_key, reason) VALUES (?1, ?2, ?3, ?4)",
        )?;
        for r in rejects {
            stmt.execute(params![run_id, r.stage.as_str(), r.key, r.reason])
                .context("insert reject")?;
        }
    }
    tx.commit().context("commit rejects")?;
    debug!(run_id, count = rejects.len(), "recorded rejects");
    Ok(())
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredRun {
    pub run_id: i64,
    pub season: u16,
    pub finished: bool,
    pub games_written: i64,
    pub games_failed: i64,
    pub boxscores_failed: i64,
    pub rejects: i64,
    pub errors: Vec<String>,
}

pub fn load_run(conn: &Connection, run_id: i64) -> Result<Option<StoredRun>> {
    conn.query_row(
        "SELECT run_id, season, finished_at, games_written, games_failed, boxscores_failed,
                rejects, errors_json
         FROM ingest_runs WHERE run_id = ?1",
        params![run_id],
        |row| {
            let errors_json: String = row.get(7)?;
            Ok(StoredRun {
                run_id: row.get(0)?,
                season: row.get(1)?,
                finished: row.get::<_, Option<String>>(2)?.is_some(),
                games_written: row.get(3)?,
                games_failed: row.get(4)?,
                boxscores_failed: row.get(5)?,
                rejects: row.get(6)?,
                errors: serde_json::from_str(&errors_json).unwrap_or_default(),
            })
        },
    )
    .optional()
    .context("load ingest run")
}

pub fn count_run_rejects(conn: &Connection, run_id: i64) -> Result<usize> {
    let n: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM run_rejects WHERE run_id = ?1",
            params![run_id],
            |row| row.get(0),
        )
        .context("count run rejects")?;
    Ok(n as usize)
}

fn game_from_row(row: &Row<'_>) -> rusqlite::Result<Game> {
    let season_type: String = row.get(3)?;
    Ok(Game {
        game_id: row.get(0)?,
        season: row.get(1)?,
        week: row.get(2)?,
        season_type: SeasonType::parse(&season_type).unwrap_or(SeasonType::Regular),
        home_team: row.get(4)?,
        away_team: row.get(5)?,
        game_date: row.get(6)?,
        home_score: row.get(7)?,
        away_score: row.get(8)?,
        boxscore_url: row.get(9)?,
    })
}

const GAME_COLUMNS: &str = "game_id, season, week, season_type, home_team, away_team, game_date, \
    home_score, away_score, boxscore_url";

pub fn load_game(conn: &Connection, game_id: &str) -> Result<Option<Game>> {
    conn.query_row(
        &format!("SELECT {GAME_COLUMNS} FROM games WHERE game_id = ?1"),
        params![game_id],
        game_from_row,
    )
    .optional()
    .with_context(|| format!("load game {game_id}"))
}

pub fn load_games(conn: &Connection, season: u16) -> Result<Vec<Game>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {GAME_COLUMNS} FROM games WHERE season = ?1 ORDER BY week, game_id"
    ))?;
    let rows = stmt
        .query_map(params![season], game_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()
        .context("load games")?;
    Ok(rows)
}

pub fn load_plays(conn: &Connection, game_id: &str) -> Result<Vec<Play>> {
    let mut stmt = conn.prepare(
        "SELECT game_id, play_index, play_id, drive, quarter, down, yards_to_go, yardline_100,
                play_type, posteam, defteam, yards_gained, air_yards, yards_after_catch,
                passer_id, receiver_id, rusher_id, fumbler_id, pass_attempt, complete_pass,
                interception, sack, rush_attempt, pass_touchdown, rush_touchdown, fumble_lost,
                two_point_attempt, description
         FROM plays WHERE game_id = ?1 ORDER BY play_index",
    )?;
    let rows = stmt
        .query_map(params![game_id], |row| {
            Ok(Play {
                game_id: row.get(0)?,
                play_index: row.get(1)?,
                play_id: row.get(2)?,
                drive: row.get(3)?,
                quarter: row.get(4)?,
                down: row.get(5)?,
                yards_to_go: row.get(6)?,
                yardline_100: row.get(7)?,
                play_type: row.get(8)?,
                posteam: row.get(9)?,
                defteam: row.get(10)?,
                yards_gained: row.get(11)?,
                air_yards: row.get(12)?,
                yards_after_catch: row.get(13)?,
                passer_id: row.get(14)?,
                receiver_id: row.get(15)?,
                rusher_id: row.get(16)?,
                fumbler_id: row.get(17)?,
                pass_attempt: row.get(18)?,
                complete_pass: row.get(19)?,
                interception: row.get(20)?,
                sack: row.get(21)?,
                rush_attempt: row.get(22)?,
                pass_touchdown: row.get(23)?,
                rush_touchdown: row.get(24)?,
                fumble_lost: row.get(25)?,
                two_point_attempt: row.get(26)?,
                description: row.get(27)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()
        .with_context(|| format!("load plays for {game_id}"))?;
    Ok(rows)
}

fn stat_from_row(row: &Row<'_>) -> rusqlite::Result<PlayerGameStat> {
    let mut stats = StatLine::default();
    for (idx, field) in StatField::ALL.iter().enumerate() {
        stats.set(*field, row.get(5 + idx)?);
    }
    Ok(PlayerGameStat {
        player_id: row.get(0)?,
        game_id: row.get(1)?,
        season: row.get(2)?,
        week: row.get(3)?,
        team_id: row.get(4)?,
        stats,
    })
}

pub fn load_player_game_stat(
    conn: &Connection,
    player_id: &str,
    game_id: &str,
) -> Result<Option<PlayerGameStat>> {
    conn.prepare_cached(&format!(
        "SELECT player_id, game_id, season, week, team_id, {STAT_COLUMNS}
         FROM player_game_stats WHERE player_id = ?1 AND game_id = ?2"
    ))?
    .query_row(params![player_id, game_id], stat_from_row)
    .optional()
    .with_context(|| format!("load stat {player_id}@{game_id}"))
}

pub fn load_game_stats(conn: &Connection, game_id: &str) -> Result<Vec<PlayerGameStat>> {
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT player_id, game_id, season, week, team_id, {STAT_COLUMNS}
         FROM player_game_stats WHERE game_id = ?1 ORDER BY player_id"
    ))?;
    let rows = stmt
        .query_map(params![game_id], stat_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()
        .with_context(|| format!("load stats for {game_id}"))?;
    Ok(rows)
}

/// Week-ordered stat lines for one player-season, postseason included.
pub fn load_player_season_stats(
    conn: &Connection,
    player_id: &str,
    season: u16,
) -> Result<Vec<PlayerGameStat>> {
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT player_id, game_id, season, week, team_id, {STAT_COLUMNS}
         FROM player_game_stats WHERE player_id = ?1 AND season = ?2 ORDER BY week, game_id"
    ))?;
    let rows = stmt
        .query_map(params![player_id, season], stat_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()
        .with_context(|| format!("load stats for {player_id} {season}"))?;
    Ok(rows)
}

/// Player ids with a stat row or a derived row in the season. Players whose stats are gone
/// stay listed until their derived rows are cleared.
pub fn players_to_derive(conn: &Connection, season: u16) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT player_id FROM player_game_stats WHERE season = ?1
         UNION
         SELECT player_id FROM derived_metrics WHERE season = ?1
         ORDER BY player_id",
    )?;
    let rows = stmt
        .query_map(params![season], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<String>>>()
        .context("list players to derive")?;
    Ok(rows)
}

/// Team-side counts for one game, computed from canonical plays.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TeamGameTotals {
    pub targets: i64,
    /// `None` when any counted target has no air yards recorded.
    pub air_yards: Option<i64>,
    pub rush_attempts: i64,
}

pub fn team_game_totals(conn: &Connection, game_id: &str, team_id: &str) -> Result<TeamGameTotals> {
    conn.prepare_cached(
        "SELECT
            COALESCE(SUM(CASE WHEN pass_attempt = 1 AND sack = 0 AND two_point_attempt = 0
                               AND receiver_id IS NOT NULL THEN 1 ELSE 0 END), 0),
            CASE WHEN COALESCE(SUM(CASE WHEN pass_attempt = 1 AND sack = 0 AND two_point_attempt = 0
                                         AND receiver_id IS NOT NULL AND air_yards IS NULL
                                        THEN 1 ELSE 0 END), 0) > 0
                 THEN NULL
                 ELSE COALESCE(SUM(CASE WHEN pass_attempt = 1 AND sack = 0 AND two_point_attempt = 0
                                         AND receiver_id IS NOT NULL THEN air_yards END), 0)
            END,
            COALESCE(SUM(CASE WHEN rush_attempt = 1 AND two_point_attempt = 0
                               AND rusher_id IS NOT NULL THEN 1 ELSE 0 END), 0)
         FROM plays WHERE game_id = ?1 AND posteam = ?2",
    )?
    .query_row(params![game_id, team_id], |row| {
        Ok(TeamGameTotals {
            targets: row.get(0)?,
            air_yards: row.get(1)?,
            rush_attempts: row.get(2)?,
        })
    })
    .with_context(|| format!("team totals for {team_id} in {game_id}"))
}

pub fn load_derived_metrics(
    conn: &Connection,
    player_id: &str,
    season: u16,
) -> Result<Vec<DerivedMetric>> {
    let mut stmt = conn.prepare_cached(
        "SELECT player_id, season, period, metric, value, inputs, input_hash
         FROM derived_metrics WHERE player_id = ?1 AND season = ?2 ORDER BY period, metric",
    )?;
    let rows = stmt
        .query_map(params![player_id, season], |row| {
            let period: u8 = row.get(2)?;
            Ok(DerivedMetric {
                player_id: row.get(0)?,
                season: row.get(1)?,
                week: (period != SEASON_TOTAL_PERIOD).then_some(period),
                metric: row.get(3)?,
                value: row.get(4)?,
                inputs: row.get(5)?,
                input_hash: row.get(6)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()
        .with_context(|| format!("load derived metrics for {player_id} {season}"))?;
    Ok(rows)
}
