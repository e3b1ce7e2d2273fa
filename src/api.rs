//! Read-only query layer behind the JSON API. Every response is assembled inside one read
//! transaction; derived values come from `derived_metrics` only.

use std::collections::HashMap;
use std::str::FromStr;

use rusqlite::{Connection, OptionalExtension, params};
use serde::Serialize;
use serde_json::{Value, json};
use thiserror::Error;

use crate::model::{MAX_WEEK, POSITIONS, SEASON_TOTAL_PERIOD, SeasonType, merge_name};
use crate::normalize::canonical_team;
use crate::store;

pub const PLAYERS_DEFAULT_LIMIT: usize = 50;
pub const PLAYERS_MAX_LIMIT: usize = 300;
pub const DASHBOARD_DEFAULT_LIMIT: usize = 50;
pub const DASHBOARD_MAX_LIMIT: usize = 200;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid parameter {param}: {reason}")]
    BadParam { param: &'static str, reason: String },
    #[error("{0} not found")]
    NotFound(String),
    #[error("store error: {0:#}")]
    Store(#[from] anyhow::Error),
}

impl From<rusqlite::Error> for ApiError {
    fn from(err: rusqlite::Error) -> Self {
        ApiError::Store(err.into())
    }
}

impl ApiError {
    pub fn status(&self) -> u16 {
        match self {
            ApiError::BadParam { .. } => 400,
            ApiError::NotFound(_) => 404,
            ApiError::Store(_) => 500,
        }
    }

    /// Client-facing body. Store errors never leak details.
    pub fn body(&self) -> Value {
        match self {
            ApiError::BadParam { param, reason } => json!({ "error": reason, "param": param }),
            ApiError::NotFound(what) => json!({ "error": format!("{what} not found") }),
            ApiError::Store(_) => json!({ "error": "internal error" }),
        }
    }
}

pub type Params = HashMap<String, String>;

pub fn parse_query(raw: &str) -> Result<Params, ApiError> {
    serde_urlencoded::from_str::<Vec<(String, String)>>(raw)
        .map(|pairs| pairs.into_iter().collect())
        .map_err(|e| ApiError::BadParam {
            param: "query",
            reason: e.to_string(),
        })
}

fn param<'a>(q: &'a Params, name: &str) -> Option<&'a str> {
    q.get(name).map(|s| s.trim()).filter(|s| !s.is_empty())
}

fn parse_num<T: FromStr>(q: &Params, name: &'static str) -> Result<Option<T>, ApiError> {
    param(q, name)
        .map(|raw| {
            raw.parse::<T>().map_err(|_| ApiError::BadParam {
                param: name,
                reason: format!("'{raw}' is not a valid {name}"),
            })
        })
        .transpose()
}

fn limit_param(q: &Params, default: usize, max: usize) -> Result<usize, ApiError> {
    Ok(parse_num::<usize>(q, "limit")?
        .unwrap_or(default)
        .clamp(1, max))
}

fn flag_param(q: &Params, name: &'static str) -> Result<bool, ApiError> {
    match param(q, name).map(str::to_ascii_lowercase).as_deref() {
        None => Ok(false),
        Some("1" | "true" | "yes") => Ok(true),
        Some("0" | "false" | "no") => Ok(false),
        Some(other) => Err(ApiError::BadParam {
            param: name,
            reason: format!("'{other}' is not a boolean"),
        }),
    }
}

fn team_param(q: &Params) -> Result<Option<&'static str>, ApiError> {
    param(q, "team")
        .map(|raw| {
            canonical_team(raw).ok_or_else(|| ApiError::BadParam {
                param: "team",
                reason: format!("unknown team '{raw}'"),
            })
        })
        .transpose()
}

fn position_param(q: &Params) -> Result<Option<&'static str>, ApiError> {
    param(q, "position")
        .map(|raw| {
            let upper = raw.to_ascii_uppercase();
            POSITIONS
                .iter()
                .find(|p| **p == upper)
                .copied()
                .ok_or_else(|| ApiError::BadParam {
                    param: "position",
                    reason: format!("position must be one of {}", POSITIONS.join(", ")),
                })
        })
        .transpose()
}

fn week_param(q: &Params) -> Result<Option<u8>, ApiError> {
    let week = parse_num::<u8>(q, "week")?;
    if let Some(w) = week
        && !(1..=MAX_WEEK).contains(&w)
    {
        return Err(ApiError::BadParam {
            param: "week",
            reason: format!("week must be between 1 and {MAX_WEEK}"),
        });
    }
    Ok(week)
}

fn latest_season(conn: &Connection) -> Result<Option<u16>, ApiError> {
    Ok(conn.query_row("SELECT MAX(season) FROM games", [], |row| row.get(0))?)
}

fn season_param(conn: &Connection, q: &Params) -> Result<Option<u16>, ApiError> {
    match parse_num::<u16>(q, "season")? {
        Some(season) => Ok(Some(season)),
        None => latest_season(conn),
    }
}

fn latest_week(conn: &Connection, season: u16) -> Result<Option<u8>, ApiError> {
    Ok(conn.query_row(
        "SELECT MAX(week) FROM player_game_stats WHERE season = ?1",
        params![season],
        |row| row.get(0),
    )?)
}

/// Dispatches one API request inside a single read transaction.
pub fn handle(conn: &mut Connection, path: &str, raw_query: &str) -> Result<Value, ApiError> {
    let q = parse_query(raw_query)?;
    let tx = conn.transaction()?;
    let path = path.trim_end_matches('/');
    let value = match path {
        "/api/options" => options(&tx)?,
        "/api/summary" => summary(&tx)?,
        "/api/players" => players(&tx, &q)?,
        "/api/receiving_dashboard" => receiving_dashboard(&tx, &q)?,
        "/api/rushing_dashboard" => rushing_dashboard(&tx, &q)?,
        "/api/receiving_season" => receiving_season(&tx, &q)?,
        "/api/rushing_season" => rushing_season(&tx, &q)?,
        _ => match path.strip_prefix("/api/player/") {
            Some(id) if !id.is_empty() && !id.contains('/') => player(&tx, id, &q)?,
            _ => return Err(ApiError::NotFound(format!("route {path}"))),
        },
    };
    tx.commit()?;
    Ok(value)
}

pub fn options(conn: &Connection) -> Result<Value, ApiError> {
    let seasons = column::<u16>(conn, "SELECT DISTINCT season FROM games ORDER BY season DESC")?;
    let weeks = column::<u8>(conn, "SELECT DISTINCT week FROM games ORDER BY week ASC")?;
    let teams = column::<String>(conn, "SELECT team_id FROM teams ORDER BY team_id ASC")?;
    Ok(json!({
        "seasons": seasons,
        "weeks": weeks,
        "teams": teams,
        "positions": POSITIONS,
    }))
}

pub fn summary(conn: &Connection) -> Result<Value, ApiError> {
    let seasons = column::<u16>(conn, "SELECT DISTINCT season FROM games ORDER BY season ASC")?;
    let count = |table: &str| -> Result<i64, ApiError> {
        Ok(conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))?)
    };
    Ok(json!({
        "seasons": seasons,
        "games": count("games")?,
        "players": count("players")?,
        "teams": count("teams")?,
    }))
}

fn column<T: rusqlite::types::FromSql>(conn: &Connection, sql: &str) -> Result<Vec<T>, ApiError> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map([], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<T>>>()?;
    Ok(rows)
}

fn as_count(v: Option<f64>) -> Option<i64> {
    v.map(|x| x.round() as i64)
}

/// Season-total derived rows pivoted per player, with display fields attached.
#[derive(Debug, Clone)]
struct SeasonRow {
    player_id: String,
    name: String,
    merge_name: String,
    position: Option<String>,
    team: Option<String>,
    headshot_url: Option<String>,
    metrics: HashMap<String, Option<f64>>,
}

impl SeasonRow {
    fn metric(&self, name: &str) -> Option<f64> {
        self.metrics.get(name).copied().flatten()
    }

    fn count(&self, name: &str) -> Option<i64> {
        as_count(self.metric(name))
    }

    /// At least one offensive touch, attempt or target in the season.
    fn has_any_stats(&self) -> bool {
        ["pass_attempts", "completions", "rush_attempts", "receptions", "targets"]
            .iter()
            .any(|m| self.count(m).is_some_and(|v| v > 0))
    }
}

fn load_season_rows(conn: &Connection, season: u16) -> Result<Vec<SeasonRow>, ApiError> {
    let mut stmt = conn.prepare_cached(
        "SELECT p.player_id, p.name, p.merge_name, p.position, p.headshot_url,
                (SELECT s.team_id FROM player_game_stats s
                  WHERE s.player_id = p.player_id AND s.season = ?1 AND s.team_id IS NOT NULL
                  ORDER BY s.week DESC LIMIT 1) AS season_team,
                d.metric, d.value
         FROM derived_metrics d
         JOIN players p ON p.player_id = d.player_id
         WHERE d.season = ?1 AND d.period = ?2
         ORDER BY p.player_id",
    )?;
    let mut rows: Vec<SeasonRow> = Vec::new();
    let mut iter = stmt.query(params![season, SEASON_TOTAL_PERIOD])?;
    while let Some(row) = iter.next()? {
        let player_id: String = row.get(0)?;
        if rows.last().is_none_or(|r| r.player_id != player_id) {
            rows.push(SeasonRow {
                player_id,
                name: row.get(1)?,
                merge_name: row.get(2)?,
                position: row.get(3)?,
                headshot_url: row.get(4)?,
                team: row.get(5)?,
                metrics: HashMap::new(),
            });
        }
        if let Some(current) = rows.last_mut() {
            current.metrics.insert(row.get(6)?, row.get(7)?);
        }
    }
    Ok(rows)
}

fn desc_nulls_last(a: Option<i64>, b: Option<i64>) -> std::cmp::Ordering {
    b.unwrap_or(i64::MIN).cmp(&a.unwrap_or(i64::MIN))
}

#[derive(Debug, Serialize)]
pub struct PlayerListRow {
    pub player_id: String,
    pub player_name: String,
    pub team: Option<String>,
    pub position: Option<String>,
    pub season: u16,
    pub games: Option<i64>,
    pub targets: Option<i64>,
    pub receptions: Option<i64>,
    #[serde(rename = "receivingYards")]
    pub receiving_yards: Option<i64>,
    #[serde(rename = "receivingTouchdowns")]
    pub receiving_tds: Option<i64>,
    #[serde(rename = "avgYardsPerCatch")]
    pub avg_yards_per_catch: Option<f64>,
    #[serde(rename = "rushAttempts")]
    pub rush_attempts: Option<i64>,
    #[serde(rename = "rushingYards")]
    pub rushing_yards: Option<i64>,
    #[serde(rename = "rushingTouchdowns")]
    pub rushing_tds: Option<i64>,
    #[serde(rename = "avgYardsPerRush")]
    pub avg_yards_per_rush: Option<f64>,
    #[serde(rename = "passingAttempts")]
    pub pass_attempts: Option<i64>,
    #[serde(rename = "passingCompletions")]
    pub completions: Option<i64>,
    #[serde(rename = "passingYards")]
    pub passing_yards: Option<i64>,
    #[serde(rename = "passingTouchdowns")]
    pub passing_tds: Option<i64>,
    #[serde(rename = "passingInterceptions")]
    pub interceptions: Option<i64>,
    #[serde(rename = "qbRating")]
    pub qb_rating: Option<f64>,
    #[serde(rename = "targetShare")]
    pub target_share: Option<f64>,
    #[serde(rename = "fantasyPointsPpr")]
    pub fantasy_points_ppr: Option<f64>,
    #[serde(rename = "photoUrl")]
    pub photo_url: Option<String>,
}

impl PlayerListRow {
    fn from_season(row: &SeasonRow, season: u16) -> Self {
        Self {
            player_id: row.player_id.clone(),
            player_name: row.name.clone(),
            team: row.team.clone(),
            position: row.position.clone(),
            season,
            games: row.count("games"),
            targets: row.count("targets"),
            receptions: row.count("receptions"),
            receiving_yards: row.count("receiving_yards"),
            receiving_tds: row.count("receiving_tds"),
            avg_yards_per_catch: row.metric("yards_per_reception"),
            rush_attempts: row.count("rush_attempts"),
            rushing_yards: row.count("rushing_yards"),
            rushing_tds: row.count("rushing_tds"),
            avg_yards_per_rush: row.metric("yards_per_carry"),
            pass_attempts: row.count("pass_attempts"),
            completions: row.count("completions"),
            passing_yards: row.count("passing_yards"),
            passing_tds: row.count("passing_tds"),
            interceptions: row.count("interceptions"),
            qb_rating: row.metric("passer_rating"),
            target_share: row.metric("target_share"),
            fantasy_points_ppr: row.metric("fantasy_points_ppr"),
            photo_url: row.headshot_url.clone(),
        }
    }
}

pub fn players(conn: &Connection, q: &Params) -> Result<Value, ApiError> {
    let position = position_param(q)?;
    let team = team_param(q)?;
    let limit = limit_param(q, PLAYERS_DEFAULT_LIMIT, PLAYERS_MAX_LIMIT)?;
    let offset = parse_num::<usize>(q, "offset")?.unwrap_or(0);
    let needle = param(q, "q").map(merge_name).filter(|n| !n.is_empty());
    let Some(season) = season_param(conn, q)? else {
        return Ok(json!({ "rows": [] }));
    };

    let mut rows = load_season_rows(conn, season)?
        .into_iter()
        .filter(SeasonRow::has_any_stats)
        .filter(|r| position.is_none_or(|p| r.position.as_deref() == Some(p)))
        .filter(|r| team.is_none_or(|t| r.team.as_deref() == Some(t)))
        .filter(|r| {
            needle
                .as_deref()
                .is_none_or(|n| r.merge_name.contains(n))
        })
        .collect::<Vec<_>>();

    let sort_key = |r: &SeasonRow| match r.position.as_deref() {
        Some("WR" | "TE") => r.count("receiving_yards"),
        _ => r.count("rushing_yards"),
    };
    rows.sort_by(|a, b| {
        desc_nulls_last(sort_key(a), sort_key(b)).then_with(|| a.player_id.cmp(&b.player_id))
    });

    let out = rows
        .iter()
        .skip(offset)
        .take(limit)
        .map(|r| PlayerListRow::from_season(r, season))
        .collect::<Vec<_>>();
    Ok(json!({ "rows": out }))
}

#[derive(Debug, Serialize)]
pub struct GameLogRow {
    pub season: u16,
    pub week: u8,
    pub game_id: String,
    pub team: Option<String>,
    pub opponent: Option<String>,
    pub home_team: String,
    pub away_team: String,
    pub location: Option<&'static str>,
    pub is_postseason: bool,
    pub targets: Option<i64>,
    pub receptions: Option<i64>,
    pub rec_yards: Option<i64>,
    pub rec_tds: Option<i64>,
    pub air_yards: Option<i64>,
    pub yac: Option<i64>,
    pub rush_attempts: Option<i64>,
    pub rush_yards: Option<i64>,
    pub rush_tds: Option<i64>,
    pub passing_attempts: Option<i64>,
    pub passing_completions: Option<i64>,
    pub passing_yards: Option<i64>,
    pub passing_tds: Option<i64>,
    pub interceptions: Option<i64>,
    pub qb_rating: Option<f64>,
    pub fumbles_lost: Option<i64>,
    pub offense_snaps: Option<i64>,
    pub snap_share: Option<f64>,
    pub target_share: Option<f64>,
    pub air_yards_share: Option<f64>,
    pub rush_share: Option<f64>,
    pub wopr: Option<f64>,
    pub fantasy_points_ppr: Option<f64>,
}

pub fn player(conn: &Connection, player_id: &str, q: &Params) -> Result<Value, ApiError> {
    let include_postseason = flag_param(q, "include_postseason")?;
    let season = season_param(conn, q)?;

    let info = conn
        .query_row(
            "SELECT player_id, name, position, team_id, headshot_url FROM players WHERE player_id = ?1",
            params![player_id],
            |row| {
                Ok(json!({
                    "player_id": row.get::<_, String>(0)?,
                    "player_name": row.get::<_, String>(1)?,
                    "position": row.get::<_, Option<String>>(2)?,
                    "team": row.get::<_, Option<String>>(3)?,
                    "photoUrl": row.get::<_, Option<String>>(4)?,
                }))
            },
        )
        .optional()?
        .ok_or_else(|| ApiError::NotFound(format!("player {player_id}")))?;

    let Some(season) = season else {
        return Ok(json!({ "player": info, "season": Value::Null, "rows": [] }));
    };

    let derived = store::load_derived_metrics(conn, player_id, season)?;
    let weekly: HashMap<(u8, String), Option<f64>> = derived
        .into_iter()
        .filter_map(|m| m.week.map(|w| ((w, m.metric), m.value)))
        .collect();
    let metric = |week: u8, name: &str| weekly.get(&(week, name.to_string())).copied().flatten();

    let stats = store::load_player_season_stats(conn, player_id, season)?;
    let mut rows = Vec::with_capacity(stats.len());
    for stat in stats {
        let Some(game) = store::load_game(conn, &stat.game_id)? else {
            continue;
        };
        let is_postseason = game.season_type == SeasonType::Post;
        if is_postseason && !include_postseason {
            continue;
        }
        let team = stat.team_id.clone();
        let opponent = team
            .as_deref()
            .and_then(|t| game.opponent_of(t))
            .map(str::to_string);
        let location = match team.as_deref() {
            Some(t) if t == game.home_team => Some("home"),
            Some(t) if t == game.away_team => Some("away"),
            _ => None,
        };
        let s = &stat.stats;
        rows.push(GameLogRow {
            season: stat.season,
            week: stat.week,
            game_id: stat.game_id.clone(),
            team,
            opponent,
            home_team: game.home_team.clone(),
            away_team: game.away_team.clone(),
            location,
            is_postseason,
            targets: s.targets,
            receptions: s.receptions,
            rec_yards: s.receiving_yards,
            rec_tds: s.receiving_tds,
            air_yards: s.air_yards,
            yac: s.yards_after_catch,
            rush_attempts: s.rush_attempts,
            rush_yards: s.rushing_yards,
            rush_tds: s.rushing_tds,
            passing_attempts: s.pass_attempts,
            passing_completions: s.completions,
            passing_yards: s.passing_yards,
            passing_tds: s.passing_tds,
            interceptions: s.interceptions,
            qb_rating: metric(stat.week, "passer_rating"),
            fumbles_lost: s.fumbles_lost,
            offense_snaps: s.offense_snaps,
            snap_share: metric(stat.week, "snap_share"),
            target_share: metric(stat.week, "target_share"),
            air_yards_share: metric(stat.week, "air_yards_share"),
            rush_share: metric(stat.week, "rush_share"),
            wopr: metric(stat.week, "wopr"),
            fantasy_points_ppr: metric(stat.week, "fantasy_points_ppr"),
        });
    }
    Ok(json!({ "player": info, "season": season, "rows": rows }))
}

/// One player's line in one week, with the week's shares from `derived_metrics`.
#[derive(Debug, Clone)]
struct WeekRow {
    player_id: String,
    name: String,
    position: Option<String>,
    team: Option<String>,
    headshot_url: Option<String>,
    targets: Option<i64>,
    receptions: Option<i64>,
    receiving_yards: Option<i64>,
    receiving_tds: Option<i64>,
    air_yards: Option<i64>,
    yards_after_catch: Option<i64>,
    rush_attempts: Option<i64>,
    rushing_yards: Option<i64>,
    rushing_tds: Option<i64>,
    target_share: Option<f64>,
    rush_share: Option<f64>,
}

fn load_week_rows(
    conn: &Connection,
    season: u16,
    week: u8,
    team: Option<&str>,
) -> Result<Vec<WeekRow>, ApiError> {
    let mut stmt = conn.prepare_cached(
        "SELECT s.player_id, p.name, p.position, s.team_id, p.headshot_url,
                s.targets, s.receptions, s.receiving_yards, s.receiving_tds, s.air_yards,
                s.yards_after_catch, s.rush_attempts, s.rushing_yards, s.rushing_tds,
                (SELECT value FROM derived_metrics d WHERE d.player_id = s.player_id
                   AND d.season = s.season AND d.period = s.week AND d.metric = 'target_share'),
                (SELECT value FROM derived_metrics d WHERE d.player_id = s.player_id
                   AND d.season = s.season AND d.period = s.week AND d.metric = 'rush_share')
         FROM player_game_stats s
         JOIN players p ON p.player_id = s.player_id
         WHERE s.season = ?1 AND s.week = ?2 AND (?3 IS NULL OR s.team_id = ?3)",
    )?;
    let rows = stmt
        .query_map(params![season, week, team], |row| {
            Ok(WeekRow {
                player_id: row.get(0)?,
                name: row.get(1)?,
                position: row.get(2)?,
                team: row.get(3)?,
                headshot_url: row.get(4)?,
                targets: row.get(5)?,
                receptions: row.get(6)?,
                receiving_yards: row.get(7)?,
                receiving_tds: row.get(8)?,
                air_yards: row.get(9)?,
                yards_after_catch: row.get(10)?,
                rush_attempts: row.get(11)?,
                rushing_yards: row.get(12)?,
                rushing_tds: row.get(13)?,
                target_share: row.get(14)?,
                rush_share: row.get(15)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

/// Resolves season/week/team/limit for the weekly dashboards.
fn dashboard_scope(
    conn: &Connection,
    q: &Params,
) -> Result<Option<(u16, u8, Option<&'static str>, usize)>, ApiError> {
    let team = team_param(q)?;
    let limit = limit_param(q, DASHBOARD_DEFAULT_LIMIT, DASHBOARD_MAX_LIMIT)?;
    let week = week_param(q)?;
    let Some(season) = season_param(conn, q)? else {
        return Ok(None);
    };
    let week = match week {
        Some(w) => w,
        None => match latest_week(conn, season)? {
            Some(w) => w,
            None => return Ok(None),
        },
    };
    Ok(Some((season, week, team, limit)))
}

pub fn receiving_dashboard(conn: &Connection, q: &Params) -> Result<Value, ApiError> {
    let Some((season, week, team, limit)) = dashboard_scope(conn, q)? else {
        return Ok(json!({ "rows": [] }));
    };
    let mut rows = load_week_rows(conn, season, week, team)?;
    rows.retain(|r| r.targets.is_some_and(|t| t > 0));
    rows.sort_by(|a, b| desc_nulls_last(a.targets, b.targets).then_with(|| a.player_id.cmp(&b.player_id)));
    let out = rows
        .iter()
        .take(limit)
        .map(|r| {
            json!({
                "season": season,
                "week": week,
                "team": r.team,
                "player_id": r.player_id,
                "player_name": r.name,
                "position": r.position,
                "targets": r.targets,
                "receptions": r.receptions,
                "rec_yards": r.receiving_yards,
                "rec_tds": r.receiving_tds,
                "air_yards": r.air_yards,
                "yac": r.yards_after_catch,
                "target_share": r.target_share,
                "photoUrl": r.headshot_url,
            })
        })
        .collect::<Vec<_>>();
    Ok(json!({ "season": season, "week": week, "rows": out }))
}

pub fn rushing_dashboard(conn: &Connection, q: &Params) -> Result<Value, ApiError> {
    let Some((season, week, team, limit)) = dashboard_scope(conn, q)? else {
        return Ok(json!({ "rows": [] }));
    };
    let mut rows = load_week_rows(conn, season, week, team)?;
    rows.retain(|r| r.rush_attempts.is_some_and(|a| a > 0));
    rows.sort_by(|a, b| {
        desc_nulls_last(a.rushing_yards, b.rushing_yards).then_with(|| a.player_id.cmp(&b.player_id))
    });
    let out = rows
        .iter()
        .take(limit)
        .map(|r| {
            json!({
                "season": season,
                "week": week,
                "team": r.team,
                "player_id": r.player_id,
                "player_name": r.name,
                "position": r.position,
                "rush_attempts": r.rush_attempts,
                "rush_yards": r.rushing_yards,
                "rush_tds": r.rushing_tds,
                "receptions": r.receptions,
                "rec_yards": r.receiving_yards,
                "rush_share": r.rush_share,
                "photoUrl": r.headshot_url,
            })
        })
        .collect::<Vec<_>>();
    Ok(json!({ "season": season, "week": week, "rows": out }))
}

fn season_board_rows(
    conn: &Connection,
    q: &Params,
    positions: &[&str],
) -> Result<Option<(u16, usize, Vec<SeasonRow>)>, ApiError> {
    let team = team_param(q)?;
    let limit = limit_param(q, DASHBOARD_DEFAULT_LIMIT, DASHBOARD_MAX_LIMIT)?;
    let Some(season) = season_param(conn, q)? else {
        return Ok(None);
    };
    let rows = load_season_rows(conn, season)?
        .into_iter()
        .filter(SeasonRow::has_any_stats)
        .filter(|r| r.position.as_deref().is_some_and(|p| positions.contains(&p)))
        .filter(|r| team.is_none_or(|t| r.team.as_deref() == Some(t)))
        .collect();
    Ok(Some((season, limit, rows)))
}

pub fn receiving_season(conn: &Connection, q: &Params) -> Result<Value, ApiError> {
    let Some((season, limit, mut rows)) = season_board_rows(conn, q, &["WR", "TE", "RB"])? else {
        return Ok(json!({ "rows": [] }));
    };
    rows.sort_by(|a, b| {
        desc_nulls_last(a.count("targets"), b.count("targets"))
            .then_with(|| a.player_id.cmp(&b.player_id))
    });
    let out = rows
        .iter()
        .take(limit)
        .map(|r| {
            json!({
                "season": season,
                "team": r.team,
                "player_id": r.player_id,
                "player_name": r.name,
                "position": r.position,
                "games": r.count("games"),
                "targets": r.count("targets"),
                "receptions": r.count("receptions"),
                "rec_yards": r.count("receiving_yards"),
                "air_yards": r.count("air_yards"),
                "rec_tds": r.count("receiving_tds"),
                "team_target_share": r.metric("target_share"),
                "wopr": r.metric("wopr"),
                "photoUrl": r.headshot_url,
            })
        })
        .collect::<Vec<_>>();
    Ok(json!({ "season": season, "rows": out }))
}

pub fn rushing_season(conn: &Connection, q: &Params) -> Result<Value, ApiError> {
    let Some((season, limit, mut rows)) = season_board_rows(conn, q, &["RB", "QB", "WR", "TE"])?
    else {
        return Ok(json!({ "rows": [] }));
    };
    rows.sort_by(|a, b| {
        desc_nulls_last(a.count("rushing_yards"), b.count("rushing_yards"))
            .then_with(|| a.player_id.cmp(&b.player_id))
    });
    let out = rows
        .iter()
        .take(limit)
        .map(|r| {
            json!({
                "season": season,
                "team": r.team,
                "player_id": r.player_id,
                "player_name": r.name,
                "position": r.position,
                "games": r.count("games"),
                "rush_attempts": r.count("rush_attempts"),
                "rush_yards": r.count("rushing_yards"),
                "rush_tds": r.count("rushing_tds"),
                "team_rush_share": r.metric("rush_share"),
                "yards_per_carry": r.metric("yards_per_carry"),
                "photoUrl": r.headshot_url,
            })
        })
        .collect::<Vec<_>>();
    Ok(json!({ "season": season, "rows": out }))
}
