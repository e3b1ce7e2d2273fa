//! Canonical, provider-independent records held by the store.

use serde::Serialize;

pub const POSITIONS: [&str; 4] = ["QB", "RB", "WR", "TE"];
pub const LAST_REGULAR_WEEK: u8 = 18;
pub const MAX_WEEK: u8 = 22;
/// `derived_metrics.period` value for season-total rows.
pub const SEASON_TOTAL_PERIOD: u8 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SeasonType {
    #[serde(rename = "REG")]
    Regular,
    #[serde(rename = "POST")]
    Post,
}

impl SeasonType {
    pub fn as_str(self) -> &'static str {
        match self {
            SeasonType::Regular => "REG",
            SeasonType::Post => "POST",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "REG" => Some(SeasonType::Regular),
            "POST" => Some(SeasonType::Post),
            _ => None,
        }
    }
}

pub fn is_postseason_week(week: u8) -> bool {
    week > LAST_REGULAR_WEEK
}

#[derive(Debug, Clone, PartialEq)]
pub struct Player {
    pub player_id: String,
    pub name: String,
    pub merge_name: String,
    pub position: Option<String>,
    pub team_id: Option<String>,
    pub headshot_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Game {
    pub game_id: String,
    pub season: u16,
    pub week: u8,
    pub season_type: SeasonType,
    pub home_team: String,
    pub away_team: String,
    pub game_date: Option<String>,
    pub home_score: Option<i64>,
    pub away_score: Option<i64>,
    pub boxscore_url: Option<String>,
}

impl Game {
    pub fn boxscore_url(&self) -> Option<&str> {
        self.boxscore_url.as_deref().filter(|u| !u.trim().is_empty())
    }

    pub fn opponent_of(&self, team: &str) -> Option<&str> {
        if team == self.home_team {
            Some(&self.away_team)
        } else if team == self.away_team {
            Some(&self.home_team)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Play {
    pub game_id: String,
    pub play_index: u32,
    pub play_id: i64,
    pub drive: Option<i64>,
    pub quarter: Option<i64>,
    pub down: Option<i64>,
    pub yards_to_go: Option<i64>,
    pub yardline_100: Option<i64>,
    pub play_type: Option<String>,
    pub posteam: Option<String>,
    pub defteam: Option<String>,
    pub yards_gained: Option<i64>,
    pub air_yards: Option<i64>,
    pub yards_after_catch: Option<i64>,
    pub passer_id: Option<String>,
    pub receiver_id: Option<String>,
    pub rusher_id: Option<String>,
    pub fumbler_id: Option<String>,
    pub pass_attempt: bool,
    pub complete_pass: bool,
    pub interception: bool,
    pub sack: bool,
    pub rush_attempt: bool,
    pub pass_touchdown: bool,
    pub rush_touchdown: bool,
    pub fumble_lost: bool,
    pub two_point_attempt: bool,
    pub description: Option<String>,
}

impl Play {
    /// A pass play that counts toward team targets.
    pub fn is_target(&self) -> bool {
        self.pass_attempt && !self.sack && !self.two_point_attempt && self.receiver_id.is_some()
    }

    pub fn is_designed_rush(&self) -> bool {
        self.rush_attempt && !self.two_point_attempt && self.rusher_id.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatSource {
    Bulk,
    Scrape,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatField {
    Targets,
    Receptions,
    ReceivingYards,
    ReceivingTds,
    AirYards,
    YardsAfterCatch,
    RushAttempts,
    RushingYards,
    RushingTds,
    PassAttempts,
    Completions,
    PassingYards,
    PassingTds,
    Interceptions,
    Sacks,
    FumblesLost,
    OffenseSnaps,
    OffenseSnapPct,
    RoutesRun,
}

impl StatField {
    pub const ALL: [StatField; 19] = [
        StatField::Targets,
        StatField::Receptions,
        StatField::ReceivingYards,
        StatField::ReceivingTds,
        StatField::AirYards,
        StatField::YardsAfterCatch,
        StatField::RushAttempts,
        StatField::RushingYards,
        StatField::RushingTds,
        StatField::PassAttempts,
        StatField::Completions,
        StatField::PassingYards,
        StatField::PassingTds,
        StatField::Interceptions,
        StatField::Sacks,
        StatField::FumblesLost,
        StatField::OffenseSnaps,
        StatField::OffenseSnapPct,
        StatField::RoutesRun,
    ];

    pub fn column(self) -> &'static str {
        match self {
            StatField::Targets => "targets",
            StatField::Receptions => "receptions",
            StatField::ReceivingYards => "receiving_yards",
            StatField::ReceivingTds => "receiving_tds",
            StatField::AirYards => "air_yards",
            StatField::YardsAfterCatch => "yards_after_catch",
            StatField::RushAttempts => "rush_attempts",
            StatField::RushingYards => "rushing_yards",
            StatField::RushingTds => "rushing_tds",
            StatField::PassAttempts => "pass_attempts",
            StatField::Completions => "completions",
            StatField::PassingYards => "passing_yards",
            StatField::PassingTds => "passing_tds",
            StatField::Interceptions => "interceptions",
            StatField::Sacks => "sacks",
            StatField::FumblesLost => "fumbles_lost",
            StatField::OffenseSnaps => "offense_snaps",
            StatField::OffenseSnapPct => "offense_snap_pct",
            StatField::RoutesRun => "routes_run",
        }
    }

    /// Fields the play-by-play feed owns. A bulk write replaces them outright, nulls included.
    pub fn bulk_covered(self) -> bool {
        !matches!(
            self,
            StatField::OffenseSnaps | StatField::OffenseSnapPct | StatField::RoutesRun
        )
    }

    /// Fields the boxscore scrape overrides even when already populated.
    pub fn scrape_authoritative(self) -> bool {
        matches!(self, StatField::OffenseSnaps | StatField::OffenseSnapPct)
    }
}

/// Per-game counting stats. Every field is independently nullable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatLine {
    pub targets: Option<i64>,
    pub receptions: Option<i64>,
    pub receiving_yards: Option<i64>,
    pub receiving_tds: Option<i64>,
    pub air_yards: Option<i64>,
    pub yards_after_catch: Option<i64>,
    pub rush_attempts: Option<i64>,
    pub rushing_yards: Option<i64>,
    pub rushing_tds: Option<i64>,
    pub pass_attempts: Option<i64>,
    pub completions: Option<i64>,
    pub passing_yards: Option<i64>,
    pub passing_tds: Option<i64>,
    pub interceptions: Option<i64>,
    pub sacks: Option<i64>,
    pub fumbles_lost: Option<i64>,
    pub offense_snaps: Option<i64>,
    /// Whole percent, 0..=100.
    pub offense_snap_pct: Option<i64>,
    pub routes_run: Option<i64>,
}

impl StatLine {
    pub fn get(&self, field: StatField) -> Option<i64> {
        *self.slot_ref(field)
    }

    pub fn set(&mut self, field: StatField, value: Option<i64>) {
        *self.slot(field) = value;
    }

    pub fn is_empty(&self) -> bool {
        StatField::ALL.iter().all(|f| self.get(*f).is_none())
    }

    fn slot_ref(&self, field: StatField) -> &Option<i64> {
        match field {
            StatField::Targets => &self.targets,
            StatField::Receptions => &self.receptions,
            StatField::ReceivingYards => &self.receiving_yards,
            StatField::ReceivingTds => &self.receiving_tds,
            StatField::AirYards => &self.air_yards,
            StatField::YardsAfterCatch => &self.yards_after_catch,
            StatField::RushAttempts => &self.rush_attempts,
            StatField::RushingYards => &self.rushing_yards,
            StatField::RushingTds => &self.rushing_tds,
            StatField::PassAttempts => &self.pass_attempts,
            StatField::Completions => &self.completions,
            StatField::PassingYards => &self.passing_yards,
            StatField::PassingTds => &self.passing_tds,
            StatField::Interceptions => &self.interceptions,
            StatField::Sacks => &self.sacks,
            StatField::FumblesLost => &self.fumbles_lost,
            StatField::OffenseSnaps => &self.offense_snaps,
            StatField::OffenseSnapPct => &self.offense_snap_pct,
            StatField::RoutesRun => &self.routes_run,
        }
    }

    fn slot(&mut self, field: StatField) -> &mut Option<i64> {
        match field {
            StatField::Targets => &mut self.targets,
            StatField::Receptions => &mut self.receptions,
            StatField::ReceivingYards => &mut self.receiving_yards,
            StatField::ReceivingTds => &mut self.receiving_tds,
            StatField::AirYards => &mut self.air_yards,
            StatField::YardsAfterCatch => &mut self.yards_after_catch,
            StatField::RushAttempts => &mut self.rush_attempts,
            StatField::RushingYards => &mut self.rushing_yards,
            StatField::RushingTds => &mut self.rushing_tds,
            StatField::PassAttempts => &mut self.pass_attempts,
            StatField::Completions => &mut self.completions,
            StatField::PassingYards => &mut self.passing_yards,
            StatField::PassingTds => &mut self.passing_tds,
            StatField::Interceptions => &mut self.interceptions,
            StatField::Sacks => &mut self.sacks,
            StatField::FumblesLost => &mut self.fumbles_lost,
            StatField::OffenseSnaps => &mut self.offense_snaps,
            StatField::OffenseSnapPct => &mut self.offense_snap_pct,
            StatField::RoutesRun => &mut self.routes_run,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlayerGameStat {
    pub player_id: String,
    pub game_id: String,
    pub season: u16,
    pub week: u8,
    pub team_id: Option<String>,
    pub stats: StatLine,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DerivedMetric {
    pub player_id: String,
    pub season: u16,
    /// `None` for the season total.
    pub week: Option<u8>,
    pub metric: String,
    pub value: Option<f64>,
    /// Comma-separated canonical input names.
    pub inputs: String,
    /// Base64 SHA-256 of the input values.
    pub input_hash: String,
}

impl DerivedMetric {
    pub fn period(&self) -> u8 {
        self.week.unwrap_or(SEASON_TOTAL_PERIOD)
    }
}

/// Lowercased, punctuation-free, suffix-free name used to match players across sources.
pub fn merge_name(name: &str) -> String {
    let cleaned: String = name
        .to_lowercase()
        .chars()
        .filter(|ch| ch.is_ascii_alphanumeric() || ch.is_whitespace())
        .collect();
    let mut parts = cleaned.split_whitespace().collect::<Vec<_>>();
    while parts.len() > 2
        && let Some(last) = parts.last()
        && matches!(*last, "jr" | "sr" | "ii" | "iii" | "iv" | "v")
    {
        parts.pop();
    }
    parts.join(" ")
}
