//! Efficiency and usage metrics derived from canonical stat lines and play totals.
//!
//! `derive` is a pure function of [`PlayerSeasonInputs`]: the same inputs always produce the
//! same metric rows, hashes included. A metric whose inputs are missing, or whose denominator
//! is zero, is still emitted with a null value so consumers can tell "not computable" apart
//! from "not derived yet".

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use rayon::prelude::*;
use rusqlite::Connection;
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::model::{DerivedMetric, StatField, StatLine, is_postseason_week};
use crate::store::{self, TeamGameTotals};

#[derive(Debug, Clone, PartialEq)]
pub struct GameInputs {
    pub game_id: String,
    pub week: u8,
    pub team_id: Option<String>,
    pub stats: StatLine,
    /// `None` when the player's team for the game is unknown.
    pub team: Option<TeamGameTotals>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlayerSeasonInputs {
    pub player_id: String,
    pub season: u16,
    pub games: Vec<GameInputs>,
}

pub fn load_inputs(conn: &Connection, player_id: &str, season: u16) -> Result<PlayerSeasonInputs> {
    let stats = store::load_player_season_stats(conn, player_id, season)?;
    let mut games = Vec::with_capacity(stats.len());
    for stat in stats {
        let team = match stat.team_id.as_deref() {
            Some(team_id) => Some(store::team_game_totals(conn, &stat.game_id, team_id)?),
            None => None,
        };
        games.push(GameInputs {
            game_id: stat.game_id,
            week: stat.week,
            team_id: stat.team_id,
            stats: stat.stats,
            team,
        });
    }
    Ok(PlayerSeasonInputs {
        player_id: player_id.to_string(),
        season,
        games,
    })
}

/// Named input values for one period (a week, or the regular-season total).
#[derive(Debug, Clone, Default)]
struct Sample {
    values: BTreeMap<&'static str, Option<f64>>,
}

impl Sample {
    fn get(&self, name: &str) -> Option<f64> {
        self.values.get(name).copied().flatten()
    }

    fn for_game(game: &GameInputs) -> Self {
        let mut values = BTreeMap::new();
        for field in StatField::ALL {
            values.insert(field.column(), game.stats.get(field).map(|v| v as f64));
        }
        values.insert("team_targets", game.team.map(|t| t.targets as f64));
        values.insert(
            "team_air_yards",
            game.team.and_then(|t| t.air_yards).map(|v| v as f64),
        );
        values.insert("team_rush_attempts", game.team.map(|t| t.rush_attempts as f64));
        values.insert("games", Some(1.0));
        Self { values }
    }

    /// Sums counts across games. A total is null as soon as any contributing game lacks the
    /// value, so a partial sum never poses as a season figure. Snap percentage is the mean of
    /// the weekly percentages under the same rule.
    fn season_total(games: &[&GameInputs]) -> Self {
        let weekly = games.iter().map(|g| Sample::for_game(g)).collect::<Vec<_>>();
        let mut values = BTreeMap::new();
        let names = weekly
            .first()
            .map(|s| s.values.keys().copied().collect::<Vec<_>>())
            .unwrap_or_default();
        for name in names {
            let present = weekly.iter().map(|s| s.get(name)).collect::<Option<Vec<_>>>();
            let value = match present {
                Some(vals) if name == StatField::OffenseSnapPct.column() => {
                    Some(vals.iter().sum::<f64>() / vals.len() as f64)
                }
                Some(vals) => Some(vals.iter().sum()),
                None => None,
            };
            values.insert(name, value);
        }
        values.insert("games", Some(games.len() as f64));
        Self { values }
    }
}

struct MetricDef {
    name: &'static str,
    inputs: &'static [&'static str],
    decimals: i32,
    eval: fn(&Sample) -> Option<f64>,
}

fn ratio(num: Option<f64>, den: Option<f64>) -> Option<f64> {
    match (num, den) {
        (Some(n), Some(d)) if d != 0.0 => Some(n / d),
        _ => None,
    }
}

fn div(s: &Sample, num: &str, den: &str) -> Option<f64> {
    ratio(s.get(num), s.get(den))
}

fn wopr(s: &Sample) -> Option<f64> {
    let target_share = div(s, "targets", "team_targets")?;
    let air_share = div(s, "air_yards", "team_air_yards")?;
    Some(1.5 * target_share + 0.7 * air_share)
}

fn fantasy_points_ppr(s: &Sample) -> Option<f64> {
    Some(
        0.04 * s.get("passing_yards")?
            + 4.0 * s.get("passing_tds")?
            - 2.0 * s.get("interceptions")?
            + 0.1 * (s.get("rushing_yards")? + s.get("receiving_yards")?)
            + 6.0 * (s.get("rushing_tds")? + s.get("receiving_tds")?)
            + s.get("receptions")?
            - 2.0 * s.get("fumbles_lost")?,
    )
}

/// NFL passer rating: four components each clamped to 0..=2.375.
fn passer_rating(s: &Sample) -> Option<f64> {
    let att = s.get("pass_attempts").filter(|a| *a > 0.0)?;
    let clamp = |v: f64| v.clamp(0.0, 2.375);
    let a = clamp((s.get("completions")? / att - 0.3) * 5.0);
    let b = clamp((s.get("passing_yards")? / att - 3.0) * 0.25);
    let c = clamp(s.get("passing_tds")? / att * 20.0);
    let d = clamp(2.375 - s.get("interceptions")? / att * 25.0);
    Some((a + b + c + d) / 6.0 * 100.0)
}

const METRICS: &[MetricDef] = &[
    MetricDef {
        name: "target_share",
        inputs: &["targets", "team_targets"],
        decimals: 4,
        eval: |s| div(s, "targets", "team_targets"),
    },
    MetricDef {
        name: "air_yards_share",
        inputs: &["air_yards", "team_air_yards"],
        decimals: 4,
        eval: |s| div(s, "air_yards", "team_air_yards"),
    },
    MetricDef {
        name: "wopr",
        inputs: &["targets", "team_targets", "air_yards", "team_air_yards"],
        decimals: 4,
        eval: wopr,
    },
    MetricDef {
        name: "rush_share",
        inputs: &["rush_attempts", "team_rush_attempts"],
        decimals: 4,
        eval: |s| div(s, "rush_attempts", "team_rush_attempts"),
    },
    MetricDef {
        name: "catch_rate",
        inputs: &["receptions", "targets"],
        decimals: 4,
        eval: |s| div(s, "receptions", "targets"),
    },
    MetricDef {
        name: "yards_per_target",
        inputs: &["receiving_yards", "targets"],
        decimals: 2,
        eval: |s| div(s, "receiving_yards", "targets"),
    },
    MetricDef {
        name: "yards_per_reception",
        inputs: &["receiving_yards", "receptions"],
        decimals: 2,
        eval: |s| div(s, "receiving_yards", "receptions"),
    },
    MetricDef {
        name: "adot",
        inputs: &["air_yards", "targets"],
        decimals: 2,
        eval: |s| div(s, "air_yards", "targets"),
    },
    MetricDef {
        name: "yac_per_reception",
        inputs: &["yards_after_catch", "receptions"],
        decimals: 2,
        eval: |s| div(s, "yards_after_catch", "receptions"),
    },
    MetricDef {
        name: "yards_per_route_run",
        inputs: &["receiving_yards", "routes_run"],
        decimals: 2,
        eval: |s| div(s, "receiving_yards", "routes_run"),
    },
    MetricDef {
        name: "yards_per_carry",
        inputs: &["rushing_yards", "rush_attempts"],
        decimals: 2,
        eval: |s| div(s, "rushing_yards", "rush_attempts"),
    },
    MetricDef {
        name: "snap_share",
        inputs: &["offense_snap_pct"],
        decimals: 4,
        eval: |s| s.get("offense_snap_pct").map(|pct| pct / 100.0),
    },
    MetricDef {
        name: "passer_rating",
        inputs: &[
            "completions",
            "pass_attempts",
            "passing_yards",
            "passing_tds",
            "interceptions",
        ],
        decimals: 1,
        eval: passer_rating,
    },
    MetricDef {
        name: "fantasy_points_ppr",
        inputs: &[
            "passing_yards",
            "passing_tds",
            "interceptions",
            "rushing_yards",
            "receiving_yards",
            "rushing_tds",
            "receiving_tds",
            "receptions",
            "fumbles_lost",
        ],
        decimals: 2,
        eval: fantasy_points_ppr,
    },
];

/// Counts carried on season-total rows alongside the ratios.
const SEASON_COUNTS: &[&str] = &[
    "games",
    "targets",
    "receptions",
    "receiving_yards",
    "receiving_tds",
    "air_yards",
    "yards_after_catch",
    "rush_attempts",
    "rushing_yards",
    "rushing_tds",
    "pass_attempts",
    "completions",
    "passing_yards",
    "passing_tds",
    "interceptions",
];

/// Round half away from zero.
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let scale = 10f64.powi(decimals);
    (value * scale).round() / scale
}

fn fingerprint(sample: &Sample, inputs: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for name in inputs {
        let rendered = match sample.get(name) {
            Some(v) => format!("{v:?}"),
            None => "null".to_string(),
        };
        hasher.update(name.as_bytes());
        hasher.update(b"=");
        hasher.update(rendered.as_bytes());
        hasher.update(b";");
    }
    BASE64.encode(hasher.finalize())
}

fn emit(
    out: &mut Vec<DerivedMetric>,
    inputs: &PlayerSeasonInputs,
    week: Option<u8>,
    sample: &Sample,
    name: &str,
    input_names: &[&str],
    value: Option<f64>,
    decimals: i32,
) {
    out.push(DerivedMetric {
        player_id: inputs.player_id.clone(),
        season: inputs.season,
        week,
        metric: name.to_string(),
        value: value.filter(|v| v.is_finite()).map(|v| round_to(v, decimals)),
        inputs: input_names.join(","),
        input_hash: fingerprint(sample, input_names),
    });
}

/// Weekly rows for every game played plus regular-season total rows.
pub fn derive(inputs: &PlayerSeasonInputs) -> Vec<DerivedMetric> {
    let mut out = Vec::new();
    let mut games = inputs.games.iter().collect::<Vec<_>>();
    games.sort_by(|a, b| a.week.cmp(&b.week).then_with(|| a.game_id.cmp(&b.game_id)));

    for game in &games {
        let sample = Sample::for_game(game);
        for def in METRICS {
            let value = (def.eval)(&sample);
            emit(&mut out, inputs, Some(game.week), &sample, def.name, def.inputs, value, def.decimals);
        }
    }

    let regular = games
        .iter()
        .copied()
        .filter(|g| !is_postseason_week(g.week))
        .collect::<Vec<_>>();
    if regular.is_empty() {
        return out;
    }
    let season = Sample::season_total(&regular);
    for def in METRICS {
        let value = (def.eval)(&season);
        emit(&mut out, inputs, None, &season, def.name, def.inputs, value, def.decimals);
    }
    for name in SEASON_COUNTS {
        emit(&mut out, inputs, None, &season, name, &[name], season.get(name), 0);
    }
    out
}

/// Loads, derives and atomically replaces one player-season. Returns the rows written.
pub fn derive_player_season(
    conn: &mut Connection,
    player_id: &str,
    season: u16,
    attempts: u32,
) -> Result<usize> {
    let metrics = {
        let inputs = load_inputs(conn, player_id, season)?;
        derive(&inputs)
    };
    store::write_unit(conn, &format!("derive {player_id}"), attempts, |tx| {
        store::write_derived_metrics(tx, player_id, season, &metrics, None)
    })?;
    Ok(metrics.len())
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeriveReport {
    pub players: usize,
    pub derived: usize,
    pub failed: usize,
    pub errors: Vec<String>,
}

/// Re-derives every player with stats or stale derived rows in `season`, one connection per
/// worker.
pub fn derive_all(db_path: &Path, season: u16, threads: usize, attempts: u32) -> Result<DeriveReport> {
    let players = {
        let conn = store::open_db(db_path)?;
        store::players_to_derive(&conn, season)?
    };
    let results = crate::pipeline::with_worker_pool(threads, || {
        players
            .par_iter()
            .map_init(
                || store::open_db(db_path),
                |conn, player_id| match conn {
                    Ok(conn) => derive_player_season(conn, player_id, season, attempts)
                        .with_context(|| format!("derive {player_id} {season}")),
                    Err(err) => Err(anyhow::anyhow!("worker connection unavailable: {err:#}")),
                },
            )
            .collect::<Vec<_>>()
    });

    let mut report = DeriveReport {
        players: players.len(),
        ..Default::default()
    };
    for result in results {
        match result {
            Ok(_) => report.derived += 1,
            Err(err) => {
                warn!(error = %format!("{err:#}"), "derivation failed");
                report.failed += 1;
                report.errors.push(format!("{err:#}"));
            }
        }
    }
    info!(season, derived = report.derived, failed = report.failed, "derivation finished");
    Ok(report)
}
