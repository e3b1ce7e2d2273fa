use std::path::Path;

use anyhow::{Context, Result, anyhow};
use rust_xlsxwriter::{Workbook, Worksheet};
use serde_json::Value;

use crate::api::{self, Params};
use crate::store;

pub struct ExportReport {
    pub season: Option<u16>,
    pub players: usize,
    pub receiving: usize,
    pub rushing: usize,
}

const PLAYER_COLUMNS: &[&str] = &[
    "player_id",
    "player_name",
    "team",
    "position",
    "games",
    "targets",
    "receptions",
    "receivingYards",
    "receivingTouchdowns",
    "avgYardsPerCatch",
    "rushAttempts",
    "rushingYards",
    "rushingTouchdowns",
    "avgYardsPerRush",
    "passingAttempts",
    "passingCompletions",
    "passingYards",
    "passingTouchdowns",
    "passingInterceptions",
    "targetShare",
    "fantasyPointsPpr",
];

const RECEIVING_COLUMNS: &[&str] = &[
    "player_id",
    "player_name",
    "team",
    "position",
    "games",
    "targets",
    "receptions",
    "rec_yards",
    "air_yards",
    "rec_tds",
    "team_target_share",
    "wopr",
];

const RUSHING_COLUMNS: &[&str] = &[
    "player_id",
    "player_name",
    "team",
    "position",
    "games",
    "rush_attempts",
    "rush_yards",
    "rush_tds",
    "team_rush_share",
    "yards_per_carry",
];

/// Writes the season boards (players, receiving, rushing) to one workbook. Rows are read
/// through the same query functions the API serves.
pub fn export_season_boards(db_path: &Path, season: Option<u16>, path: &Path) -> Result<ExportReport> {
    let mut conn = store::open_reader(db_path)?;
    let tx = conn.transaction().context("begin export read")?;

    let mut params = Params::new();
    if let Some(season) = season {
        params.insert("season".to_string(), season.to_string());
    }
    params.insert("limit".to_string(), api::PLAYERS_MAX_LIMIT.to_string());
    let players = api::players(&tx, &params).map_err(|e| anyhow!("players board: {e}"))?;
    params.insert("limit".to_string(), api::DASHBOARD_MAX_LIMIT.to_string());
    let receiving =
        api::receiving_season(&tx, &params).map_err(|e| anyhow!("receiving board: {e}"))?;
    let rushing = api::rushing_season(&tx, &params).map_err(|e| anyhow!("rushing board: {e}"))?;
    tx.commit().context("end export read")?;

    let players_rows = board_rows(&players, PLAYER_COLUMNS);
    let receiving_rows = board_rows(&receiving, RECEIVING_COLUMNS);
    let rushing_rows = board_rows(&rushing, RUSHING_COLUMNS);

    let mut workbook = Workbook::new();
    {
        let sheet = workbook.add_worksheet();
        sheet.set_name("Players")?;
        write_rows(sheet, &players_rows)?;
    }
    {
        let sheet = workbook.add_worksheet();
        sheet.set_name("Receiving")?;
        write_rows(sheet, &receiving_rows)?;
    }
    {
        let sheet = workbook.add_worksheet();
        sheet.set_name("Rushing")?;
        write_rows(sheet, &rushing_rows)?;
    }
    workbook
        .save(path)
        .with_context(|| format!("failed writing workbook to {}", path.display()))?;

    Ok(ExportReport {
        season: receiving
            .get("season")
            .and_then(Value::as_u64)
            .and_then(|s| u16::try_from(s).ok())
            .or(season),
        players: players_rows.len().saturating_sub(1),
        receiving: receiving_rows.len().saturating_sub(1),
        rushing: rushing_rows.len().saturating_sub(1),
    })
}

/// Header row plus one row per JSON object; nulls become empty cells.
fn board_rows(body: &Value, columns: &[&str]) -> Vec<Vec<String>> {
    let mut out = vec![columns.iter().map(|c| c.to_string()).collect::<Vec<_>>()];
    let rows = body.get("rows").and_then(Value::as_array);
    for row in rows.into_iter().flatten() {
        out.push(columns.iter().map(|c| cell(row.get(*c))).collect());
    }
    out
}

fn cell(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

fn write_rows(worksheet: &mut Worksheet, rows: &[Vec<String>]) -> Result<()> {
    for (row_idx, row) in rows.iter().enumerate() {
        for (col_idx, value) in row.iter().enumerate() {
            worksheet
                .write_string(row_idx as u32, col_idx as u16, value)
                .with_context(|| format!("write cell ({row_idx},{col_idx})"))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn null_metrics_export_as_blank_cells() {
        let body = json!({ "rows": [
            { "player_id": "00-1", "player_name": "A", "targets": 7, "team_target_share": null }
        ]});
        let rows = board_rows(&body, &["player_id", "targets", "team_target_share"]);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1], vec!["00-1".to_string(), "7".to_string(), String::new()]);
    }
}
