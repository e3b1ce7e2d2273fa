//! Maps nflverse and PFR records onto the canonical Game / Play / PlayerGameStat shapes.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;

use crate::boxscore::{AWAY_SNAPS_TABLE, HOME_SNAPS_TABLE, OFFENSE_TABLE, TABLE_KEY};
use crate::model::{
    Game, LAST_REGULAR_WEEK, MAX_WEEK, Play, Player, PlayerGameStat, SeasonType, StatField,
    StatLine, StatSource, merge_name,
};
use crate::raw::RawRecord;

/// nflverse play-by-play columns read by [`normalize`]; connectors drop everything else.
pub const PBP_COLUMNS: &[&str] = &[
    "game_id",
    "season",
    "week",
    "season_type",
    "home_team",
    "away_team",
    "game_date",
    "home_score",
    "away_score",
    "play_id",
    "drive",
    "qtr",
    "down",
    "ydstogo",
    "yardline_100",
    "play_type",
    "posteam",
    "defteam",
    "yards_gained",
    "air_yards",
    "yards_after_catch",
    "pass_attempt",
    "complete_pass",
    "interception",
    "sack",
    "rush_attempt",
    "pass_touchdown",
    "rush_touchdown",
    "fumble_lost",
    "two_point_attempt",
    "passer_player_id",
    "passer_player_name",
    "receiver_player_id",
    "receiver_player_name",
    "rusher_player_id",
    "rusher_player_name",
    "fumbled_1_player_id",
    "fumbled_1_player_name",
    "desc",
];

const TEAMS: [&str; 32] = [
    "ARI", "ATL", "BAL", "BUF", "CAR", "CHI", "CIN", "CLE", "DAL", "DEN", "DET", "GB", "HOU",
    "IND", "JAX", "KC", "LAC", "LAR", "LV", "MIA", "MIN", "NE", "NO", "NYG", "NYJ", "PHI", "PIT",
    "SEA", "SF", "TB", "TEN", "WAS",
];

/// Provider abbreviations (nflverse legacy codes, PFR display and franchise codes).
const TEAM_ALIASES: &[(&str, &str)] = &[
    ("LA", "LAR"),
    ("STL", "LAR"),
    ("RAM", "LAR"),
    ("SD", "LAC"),
    ("SDG", "LAC"),
    ("OAK", "LV"),
    ("LVR", "LV"),
    ("RAI", "LV"),
    ("JAC", "JAX"),
    ("WSH", "WAS"),
    ("GNB", "GB"),
    ("KAN", "KC"),
    ("NWE", "NE"),
    ("NOR", "NO"),
    ("SFO", "SF"),
    ("TAM", "TB"),
    ("CRD", "ARI"),
    ("HTX", "HOU"),
    ("CLT", "IND"),
    ("OTI", "TEN"),
    ("RAV", "BAL"),
];

pub fn canonical_team(raw: &str) -> Option<&'static str> {
    let upper = raw.trim().to_ascii_uppercase();
    if let Some(team) = TEAMS.iter().find(|t| **t == upper) {
        return Some(*team);
    }
    TEAM_ALIASES
        .iter()
        .find(|(alias, _)| *alias == upper)
        .map(|(_, team)| *team)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectStage {
    PlayByPlay,
    Roster,
    Boxscore,
}

impl RejectStage {
    pub fn as_str(self) -> &'static str {
        match self {
            RejectStage::PlayByPlay => "play_by_play",
            RejectStage::Roster => "roster",
            RejectStage::Boxscore => "boxscore",
        }
    }
}

/// A record that could not be attributed to a known game, team or player.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reject {
    pub stage: RejectStage,
    pub key: String,
    pub reason: String,
}

/// Season roster keyed by GSIS id, with name lookups for scraped rows.
#[derive(Debug, Clone, Default)]
pub struct RosterIndex {
    by_id: HashMap<String, Player>,
    by_name: HashMap<String, Vec<String>>,
}

impl RosterIndex {
    pub fn from_records(records: &[RawRecord]) -> (Self, Vec<Reject>) {
        let mut index = RosterIndex::default();
        let mut rejects = Vec::new();
        for (idx, rec) in records.iter().enumerate() {
            let Some(player_id) = rec.text("gsis_id").filter(|id| is_gsis_id(id)) else {
                // Practice-squad and futures rows routinely lack a GSIS id.
                if rec.text("gsis_id").is_some() {
                    rejects.push(Reject {
                        stage: RejectStage::Roster,
                        key: format!("roster#{idx}"),
                        reason: "malformed gsis_id".to_string(),
                    });
                }
                continue;
            };
            let name = rec.text("full_name").or_else(|| {
                let first = rec.text("first_name")?;
                let last = rec.text("last_name")?;
                Some(format!("{first} {last}"))
            });
            let Some(name) = name else {
                rejects.push(Reject {
                    stage: RejectStage::Roster,
                    key: player_id,
                    reason: "roster row without a name".to_string(),
                });
                continue;
            };
            let team_id = rec
                .text("team")
                .and_then(|t| canonical_team(&t))
                .map(str::to_string);
            let player = Player {
                merge_name: merge_name(&name),
                player_id: player_id.clone(),
                name,
                position: rec.text("position").map(|p| p.to_ascii_uppercase()),
                team_id,
                headshot_url: rec.text("headshot_url"),
            };
            index.insert(player);
        }
        (index, rejects)
    }

    pub fn insert(&mut self, player: Player) {
        if let Some(prev) = self.by_id.get(&player.player_id)
            && let Some(ids) = self.by_name.get_mut(&prev.merge_name)
        {
            ids.retain(|id| id != &player.player_id);
        }
        self.by_name
            .entry(player.merge_name.clone())
            .or_default()
            .push(player.player_id.clone());
        self.by_id.insert(player.player_id.clone(), player);
    }

    pub fn get(&self, player_id: &str) -> Option<&Player> {
        self.by_id.get(player_id)
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Sorted by id so writes are deterministic.
    pub fn players(&self) -> Vec<Player> {
        let mut out = self.by_id.values().cloned().collect::<Vec<_>>();
        out.sort_by(|a, b| a.player_id.cmp(&b.player_id));
        out
    }

    /// Resolves a display name to one id, preferring a match on the given team.
    pub fn resolve_name(&self, name: &str, team: Option<&str>) -> Result<&str, String> {
        let key = merge_name(name);
        let ids = self.by_name.get(&key).map(Vec::as_slice).unwrap_or(&[]);
        if ids.is_empty() {
            return Err(format!("no roster player named '{name}'"));
        }
        if let Some(team) = team {
            let on_team = ids
                .iter()
                .filter(|id| {
                    self.by_id
                        .get(id.as_str())
                        .is_some_and(|p| p.team_id.as_deref() == Some(team))
                })
                .collect::<Vec<_>>();
            if on_team.len() == 1 {
                return Ok(on_team[0].as_str());
            }
            if on_team.len() > 1 {
                return Err(format!("'{name}' is ambiguous on {team}"));
            }
        }
        match ids {
            [only] => Ok(only.as_str()),
            _ => Err(format!("'{name}' matches {} roster players", ids.len())),
        }
    }
}

/// nflverse GSIS ids look like `00-0033873`.
pub fn is_gsis_id(raw: &str) -> bool {
    let b = raw.as_bytes();
    b.len() == 10
        && b[2] == b'-'
        && b[..2].iter().all(u8::is_ascii_digit)
        && b[3..].iter().all(u8::is_ascii_digit)
}

#[derive(Debug, Clone, Default)]
pub struct NormalizedSeason {
    pub season: u16,
    pub games: Vec<Game>,
    /// Keyed by game id, ordered by `play_index`.
    pub plays: BTreeMap<String, Vec<Play>>,
    pub player_game_stats: Vec<PlayerGameStat>,
    pub players: Vec<Player>,
    pub rejects: Vec<Reject>,
}

/// Everything written for one game in one transaction.
#[derive(Debug, Clone)]
pub struct GameUnit {
    pub game: Game,
    pub plays: Vec<Play>,
    pub stats: Vec<PlayerGameStat>,
}

impl NormalizedSeason {
    pub fn into_units(self) -> Vec<GameUnit> {
        let mut plays = self.plays;
        let mut stats: HashMap<String, Vec<PlayerGameStat>> = HashMap::new();
        for stat in self.player_game_stats {
            stats.entry(stat.game_id.clone()).or_default().push(stat);
        }
        self.games
            .into_iter()
            .map(|game| GameUnit {
                plays: plays.remove(&game.game_id).unwrap_or_default(),
                stats: stats.remove(&game.game_id).unwrap_or_default(),
                game,
            })
            .collect()
    }
}

struct GameKey {
    season: u16,
    week: u8,
    away: &'static str,
    home: &'static str,
}

/// `2024_05_KC_NO` → season 2024, provider week 5, away KC, home NO.
fn parse_game_id(game_id: &str) -> Result<GameKey, String> {
    let parts = game_id.split('_').collect::<Vec<_>>();
    let [season, week, away, home] = parts.as_slice() else {
        return Err(format!("malformed game_id '{game_id}'"));
    };
    let season = season
        .parse::<u16>()
        .map_err(|_| format!("bad season in game_id '{game_id}'"))?;
    let week = week
        .parse::<u8>()
        .map_err(|_| format!("bad week in game_id '{game_id}'"))?;
    let away = canonical_team(away).ok_or_else(|| format!("unknown away team '{away}'"))?;
    let home = canonical_team(home).ok_or_else(|| format!("unknown home team '{home}'"))?;
    Ok(GameKey {
        season,
        week,
        away,
        home,
    })
}

/// Regular-season weeks pass through; postseason rounds become 19..=22.
pub fn canonical_week(
    provider_week: u8,
    season_type: SeasonType,
    last_regular_week: u8,
) -> Option<u8> {
    let week = match season_type {
        SeasonType::Regular => provider_week,
        SeasonType::Post => {
            let round = provider_week.checked_sub(last_regular_week)?;
            LAST_REGULAR_WEEK.checked_add(round)?
        }
    };
    match season_type {
        SeasonType::Regular if (1..=LAST_REGULAR_WEEK).contains(&week) => Some(week),
        SeasonType::Post if (LAST_REGULAR_WEEK + 1..=MAX_WEEK).contains(&week) => Some(week),
        _ => None,
    }
}

fn default_last_regular_week(season: u16) -> u8 {
    if season >= 2021 { 18 } else { 17 }
}

/// Splits a season of flat play-by-play rows into games, ordered plays and per-player
/// bulk stat lines. Unattributable rows are rejected individually; the rest of the game
/// is kept.
pub fn normalize(
    season: u16,
    pbp: &[RawRecord],
    roster: &RosterIndex,
    schedule: &[RawRecord],
    boxscore_base: &str,
) -> NormalizedSeason {
    let mut out = NormalizedSeason {
        season,
        ..Default::default()
    };

    let pfr_ids = schedule
        .iter()
        .filter_map(|r| Some((r.text("game_id")?, r.text("pfr")?)))
        .collect::<HashMap<_, _>>();

    let last_regular_week = pbp
        .iter()
        .filter(|r| {
            r.text("season_type")
                .and_then(|s| SeasonType::parse(&s))
                .is_some_and(|t| t == SeasonType::Regular)
        })
        .filter_map(|r| r.int("week"))
        .filter_map(|w| u8::try_from(w).ok())
        .max()
        .unwrap_or_else(|| default_last_regular_week(season));

    let mut games: BTreeMap<String, Game> = BTreeMap::new();
    let mut plays: BTreeMap<String, Vec<Play>> = BTreeMap::new();

    for rec in pbp {
        let key = record_key(rec);
        let reject = |reason: String| Reject {
            stage: RejectStage::PlayByPlay,
            key: key.clone(),
            reason,
        };

        let (game, play) =
            match attribute_play(rec, season, last_regular_week, roster, &pfr_ids, boxscore_base)
            {
                Ok(v) => v,
                Err(reason) => {
                    out.rejects.push(reject(reason));
                    continue;
                }
            };
        games.entry(game.game_id.clone()).or_insert(game);
        plays.entry(play.game_id.clone()).or_default().push(play);
    }

    for (game_id, game_plays) in plays.iter_mut() {
        game_plays.sort_by_key(|p| p.play_id);
        let before = game_plays.len();
        game_plays.dedup_by_key(|p| p.play_id);
        if game_plays.len() != before {
            out.rejects.push(Reject {
                stage: RejectStage::PlayByPlay,
                key: game_id.clone(),
                reason: format!("{} duplicate play_id rows dropped", before - game_plays.len()),
            });
        }
        for (idx, play) in game_plays.iter_mut().enumerate() {
            play.play_index = idx as u32;
        }
    }

    for game in games.values() {
        let game_plays = plays.get(&game.game_id).map(Vec::as_slice).unwrap_or(&[]);
        out.player_game_stats
            .extend(aggregate_game_stats(game, game_plays, roster));
    }

    out.games = games.into_values().collect();
    out.plays = plays;
    out.players = roster.players();
    out
}

fn record_key(rec: &RawRecord) -> String {
    format!(
        "{}#{}",
        rec.text("game_id").unwrap_or_else(|| "?".to_string()),
        rec.int("play_id").map(|p| p.to_string()).unwrap_or_else(|| "?".to_string())
    )
}

fn attribute_play(
    rec: &RawRecord,
    season: u16,
    last_regular_week: u8,
    roster: &RosterIndex,
    pfr_ids: &HashMap<String, String>,
    boxscore_base: &str,
) -> Result<(Game, Play), String> {
    let game_id = rec.text("game_id").ok_or("missing game_id")?;
    let key = parse_game_id(&game_id)?;
    if key.season != season {
        return Err(format!("game {game_id} is not in season {season}"));
    }
    if let Some(rec_season) = rec.int("season")
        && rec_season != season as i64
    {
        return Err(format!("season column {rec_season} disagrees with {season}"));
    }
    for (column, expected) in [("home_team", key.home), ("away_team", key.away)] {
        if let Some(raw) = rec.text(column) {
            let team = canonical_team(&raw).ok_or_else(|| format!("unknown {column} '{raw}'"))?;
            if team != expected {
                return Err(format!("{column} {team} disagrees with game_id {game_id}"));
            }
        }
    }

    let season_type = match rec.text("season_type") {
        Some(raw) => SeasonType::parse(&raw).ok_or_else(|| format!("bad season_type '{raw}'"))?,
        None if key.week > last_regular_week => SeasonType::Post,
        None => SeasonType::Regular,
    };
    let week = canonical_week(key.week, season_type, last_regular_week)
        .ok_or_else(|| format!("week {} out of range for {}", key.week, season_type.as_str()))?;

    let play_id = rec.int("play_id").ok_or("missing play_id")?;

    let posteam = team_column(rec, "posteam")?;
    let defteam = team_column(rec, "defteam")?;
    for team in [posteam, defteam].into_iter().flatten() {
        if team != key.home && team != key.away {
            return Err(format!("team {team} did not play in {game_id}"));
        }
    }

    let passer_id = participant(rec, "passer", roster)?;
    let receiver_id = participant(rec, "receiver", roster)?;
    let rusher_id = participant(rec, "rusher", roster)?;
    let fumbler_id = participant(rec, "fumbled_1", roster)?;

    let flag = |k: &str| rec.flag(k).unwrap_or(false);
    let play = Play {
        game_id: game_id.clone(),
        play_index: 0,
        play_id,
        drive: rec.int("drive"),
        quarter: rec.int("qtr"),
        down: rec.int("down"),
        yards_to_go: rec.int("ydstogo"),
        yardline_100: rec.int("yardline_100"),
        play_type: rec.text("play_type"),
        posteam: posteam.map(str::to_string),
        defteam: defteam.map(str::to_string),
        yards_gained: rec.int("yards_gained"),
        air_yards: rec.int("air_yards"),
        yards_after_catch: rec.int("yards_after_catch"),
        passer_id,
        receiver_id,
        rusher_id,
        fumbler_id,
        pass_attempt: flag("pass_attempt"),
        complete_pass: flag("complete_pass"),
        interception: flag("interception"),
        sack: flag("sack"),
        rush_attempt: flag("rush_attempt"),
        pass_touchdown: flag("pass_touchdown"),
        rush_touchdown: flag("rush_touchdown"),
        fumble_lost: flag("fumble_lost"),
        two_point_attempt: flag("two_point_attempt"),
        description: rec.text("desc"),
    };

    let boxscore_url = pfr_ids
        .get(&game_id)
        .map(|pfr| format!("{}/{pfr}.htm", boxscore_base.trim_end_matches('/')));
    let game = Game {
        game_id,
        season,
        week,
        season_type,
        home_team: key.home.to_string(),
        away_team: key.away.to_string(),
        game_date: rec.text("game_date"),
        home_score: rec.int("home_score"),
        away_score: rec.int("away_score"),
        boxscore_url,
    };
    Ok((game, play))
}

fn team_column(rec: &RawRecord, column: &str) -> Result<Option<&'static str>, String> {
    match rec.text(column) {
        None => Ok(None),
        Some(raw) => canonical_team(&raw)
            .map(Some)
            .ok_or_else(|| format!("unknown {column} '{raw}'")),
    }
}

/// A participant is either absent, or a GSIS id present on the season roster.
fn participant(rec: &RawRecord, role: &str, roster: &RosterIndex) -> Result<Option<String>, String> {
    let id = rec.text(&format!("{role}_player_id"));
    let name = rec.text(&format!("{role}_player_name"));
    match (id, name) {
        (None, None) => Ok(None),
        (None, Some(name)) => Err(format!("{role} '{name}' has no player id")),
        (Some(id), _) if !is_gsis_id(&id) => Err(format!("malformed {role} id '{id}'")),
        (Some(id), _) if roster.get(&id).is_none() => {
            Err(format!("{role} id {id} is not on the season roster"))
        }
        (Some(id), _) => Ok(Some(id)),
    }
}

/// Every player seen in a game starts at zero for the fields play-by-play covers.
pub fn bulk_zero_line() -> StatLine {
    let mut line = StatLine::default();
    for field in StatField::ALL.into_iter().filter(|f| f.bulk_covered()) {
        line.set(field, Some(0));
    }
    line
}

/// Adds `v` to a running sum; a missing input poisons the sum to null for good.
fn add(slot: &mut Option<i64>, v: Option<i64>) {
    *slot = match (*slot, v) {
        (Some(acc), Some(v)) => Some(acc + v),
        _ => None,
    };
}

fn bump(slot: &mut Option<i64>) {
    add(slot, Some(1));
}

pub fn aggregate_game_stats(
    game: &Game,
    plays: &[Play],
    roster: &RosterIndex,
) -> Vec<PlayerGameStat> {
    let mut lines: BTreeMap<String, (Option<String>, StatLine)> = BTreeMap::new();

    for play in plays {
        if play.two_point_attempt {
            continue;
        }
        let team = play.posteam.as_ref();

        if play.pass_attempt
            && let Some(passer) = play.passer_id.as_deref()
        {
            let line = line_for(&mut lines, passer, team);
            if play.sack {
                bump(&mut line.sacks);
            } else {
                bump(&mut line.pass_attempts);
                if play.complete_pass {
                    bump(&mut line.completions);
                    add(&mut line.passing_yards, play.yards_gained);
                }
                if play.pass_touchdown {
                    bump(&mut line.passing_tds);
                }
                if play.interception {
                    bump(&mut line.interceptions);
                }
            }
        }

        if play.is_target()
            && let Some(receiver) = play.receiver_id.as_deref()
        {
            let line = line_for(&mut lines, receiver, team);
            bump(&mut line.targets);
            add(&mut line.air_yards, play.air_yards);
            if play.complete_pass {
                bump(&mut line.receptions);
                add(&mut line.receiving_yards, play.yards_gained);
                add(&mut line.yards_after_catch, play.yards_after_catch);
            }
            if play.pass_touchdown {
                bump(&mut line.receiving_tds);
            }
        }

        if play.is_designed_rush()
            && let Some(rusher) = play.rusher_id.as_deref()
        {
            let line = line_for(&mut lines, rusher, team);
            bump(&mut line.rush_attempts);
            add(&mut line.rushing_yards, play.yards_gained);
            if play.rush_touchdown {
                bump(&mut line.rushing_tds);
            }
        }

        if play.fumble_lost
            && let Some(fumbler) = play.fumbler_id.as_deref()
        {
            let roster_team = roster.get(fumbler).and_then(|p| p.team_id.as_ref());
            let line = line_for(&mut lines, fumbler, roster_team.or(team));
            bump(&mut line.fumbles_lost);
        }
    }

    lines
        .into_iter()
        .map(|(player_id, (team_id, stats))| PlayerGameStat {
            team_id: team_id.or_else(|| roster.get(&player_id).and_then(|p| p.team_id.clone())),
            player_id,
            game_id: game.game_id.clone(),
            season: game.season,
            week: game.week,
            stats,
        })
        .collect()
}

fn line_for<'a>(
    lines: &'a mut BTreeMap<String, (Option<String>, StatLine)>,
    player_id: &str,
    team: Option<&String>,
) -> &'a mut StatLine {
    let slot = lines
        .entry(player_id.to_string())
        .or_insert_with(|| (None, bulk_zero_line()));
    if slot.0.is_none() {
        slot.0 = team.cloned();
    }
    &mut slot.1
}

/// PFR `data-stat` → canonical field, per table.
const OFFENSE_COLUMNS: &[(&str, StatField)] = &[
    ("targets", StatField::Targets),
    ("rec", StatField::Receptions),
    ("rec_yds", StatField::ReceivingYards),
    ("rec_td", StatField::ReceivingTds),
    ("rush_att", StatField::RushAttempts),
    ("rush_yds", StatField::RushingYards),
    ("rush_td", StatField::RushingTds),
    ("pass_att", StatField::PassAttempts),
    ("pass_cmp", StatField::Completions),
    ("pass_yds", StatField::PassingYards),
    ("pass_td", StatField::PassingTds),
    ("pass_int", StatField::Interceptions),
    ("pass_sacked", StatField::Sacks),
    ("fumbles_lost", StatField::FumblesLost),
];

const SNAP_COLUMNS: &[(&str, StatField)] = &[
    ("offense", StatField::OffenseSnaps),
    ("off_pct", StatField::OffenseSnapPct),
];

/// Attributes scraped boxscore rows to canonical players of `game`. Rows are merged per
/// player; a row that cannot be pinned to exactly one roster player is rejected.
pub fn resolve_boxscore(
    game: &Game,
    rows: &[RawRecord],
    roster: &RosterIndex,
) -> (Vec<PlayerGameStat>, Vec<Reject>) {
    let mut lines: BTreeMap<String, PlayerGameStat> = BTreeMap::new();
    let mut rejects = Vec::new();

    for row in rows {
        let table = row.text(TABLE_KEY).unwrap_or_default();
        let name = row.text("player").unwrap_or_default();
        let reject = |reason: String| Reject {
            stage: RejectStage::Boxscore,
            key: format!("{}#{table}#{name}", game.game_id),
            reason,
        };

        let (team, columns) = match table.as_str() {
            OFFENSE_TABLE => {
                let Some(raw_team) = row.text("team") else {
                    rejects.push(reject("offense row without team".to_string()));
                    continue;
                };
                let Some(team) = canonical_team(&raw_team) else {
                    rejects.push(reject(format!("unknown team '{raw_team}'")));
                    continue;
                };
                (team.to_string(), OFFENSE_COLUMNS)
            }
            HOME_SNAPS_TABLE => (game.home_team.clone(), SNAP_COLUMNS),
            AWAY_SNAPS_TABLE => (game.away_team.clone(), SNAP_COLUMNS),
            other => {
                rejects.push(reject(format!("unexpected table '{other}'")));
                continue;
            }
        };
        if game.opponent_of(&team).is_none() {
            rejects.push(reject(format!("team {team} did not play in this game")));
            continue;
        }

        let player_id = match roster.resolve_name(&name, Some(&team)) {
            Ok(id) => id.to_string(),
            Err(reason) => {
                rejects.push(reject(reason));
                continue;
            }
        };

        let line = lines
            .entry(player_id.clone())
            .or_insert_with(|| PlayerGameStat {
                player_id,
                game_id: game.game_id.clone(),
                season: game.season,
                week: game.week,
                team_id: Some(team.clone()),
                stats: StatLine::default(),
            });
        for (column, field) in columns {
            if let Some(v) = row.int(column).or_else(|| row.float(column).map(|f| f.round() as i64))
                && line.stats.get(*field).is_none()
            {
                line.stats.set(*field, Some(v));
            }
        }
    }

    (lines.into_values().collect(), rejects)
}

/// Field-level merge. Bulk wins on conflict; a scrape only fills fields bulk left null,
/// except the snap fields where the scrape is the authority.
pub fn merge_stat(
    existing: Option<&PlayerGameStat>,
    incoming: &PlayerGameStat,
    source: StatSource,
) -> PlayerGameStat {
    let Some(existing) = existing else {
        return incoming.clone();
    };
    let mut merged = existing.clone();
    merged.team_id = match source {
        StatSource::Bulk => incoming.team_id.clone().or(merged.team_id),
        StatSource::Scrape => merged.team_id.or_else(|| incoming.team_id.clone()),
    };
    for field in StatField::ALL {
        let current = existing.stats.get(field);
        let offered = incoming.stats.get(field);
        let value = match source {
            StatSource::Bulk if field.bulk_covered() => offered,
            StatSource::Bulk => offered.or(current),
            StatSource::Scrape if field.scrape_authoritative() => offered.or(current),
            StatSource::Scrape => current.or(offered),
        };
        merged.stats.set(field, value);
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raw::RawValue;

    fn text(v: &str) -> RawValue {
        RawValue::Text(v.to_string())
    }

    fn roster() -> RosterIndex {
        let rows = vec![
            RawRecord::new()
                .with("gsis_id", text("00-0000001"))
                .with("full_name", text("Pat Passer"))
                .with("position", text("QB"))
                .with("team", text("KC")),
            RawRecord::new()
                .with("gsis_id", text("00-0000002"))
                .with("full_name", text("Wes Wideout"))
                .with("position", text("WR"))
                .with("team", text("KC")),
        ];
        RosterIndex::from_records(&rows).0
    }

    fn pass_play(play_id: i64, complete: bool) -> RawRecord {
        RawRecord::new()
            .with("game_id", text("2024_05_KC_NO"))
            .with("season", RawValue::Int(2024))
            .with("week", RawValue::Int(5))
            .with("season_type", text("REG"))
            .with("play_id", RawValue::Int(play_id))
            .with("posteam", text("KC"))
            .with("defteam", text("NO"))
            .with("pass_attempt", RawValue::Float(1.0))
            .with("complete_pass", RawValue::Float(if complete { 1.0 } else { 0.0 }))
            .with("yards_gained", RawValue::Int(if complete { 12 } else { 0 }))
            .with("air_yards", RawValue::Int(8))
            .with("yards_after_catch", if complete { RawValue::Int(4) } else { RawValue::Null })
            .with("passer_player_id", text("00-0000001"))
            .with("passer_player_name", text("P.Passer"))
            .with("receiver_player_id", text("00-0000002"))
            .with("receiver_player_name", text("W.Wideout"))
    }

    #[test]
    fn postseason_weeks_are_rebased() {
        assert_eq!(canonical_week(5, SeasonType::Regular, 18), Some(5));
        assert_eq!(canonical_week(19, SeasonType::Post, 18), Some(19));
        assert_eq!(canonical_week(22, SeasonType::Post, 18), Some(22));
        assert_eq!(canonical_week(18, SeasonType::Post, 17), Some(19));
        assert_eq!(canonical_week(21, SeasonType::Post, 17), Some(22));
        assert_eq!(canonical_week(23, SeasonType::Post, 18), None);
        assert_eq!(canonical_week(0, SeasonType::Regular, 18), None);
    }

    #[test]
    fn team_aliases_resolve() {
        assert_eq!(canonical_team("kan"), Some("KC"));
        assert_eq!(canonical_team("LA"), Some("LAR"));
        assert_eq!(canonical_team("OAK"), Some("LV"));
        assert_eq!(canonical_team("XYZ"), None);
    }

    #[test]
    fn gsis_ids_are_validated() {
        assert!(is_gsis_id("00-0033873"));
        assert!(!is_gsis_id("0033873"));
        assert!(!is_gsis_id("00-00338AB"));
    }

    #[test]
    fn plays_aggregate_into_bulk_lines() {
        let roster = roster();
        let pbp = vec![pass_play(20, true), pass_play(10, false)];
        let season = normalize(2024, &pbp, &roster, &[], "https://pfr.test/boxscores");
        assert!(season.rejects.is_empty(), "{:?}", season.rejects);
        assert_eq!(season.games.len(), 1);
        assert_eq!(season.games[0].home_team, "NO");
        assert_eq!(season.games[0].boxscore_url, None);

        let plays = &season.plays["2024_05_KC_NO"];
        assert_eq!(plays.iter().map(|p| p.play_id).collect::<Vec<_>>(), vec![10, 20]);
        assert_eq!(plays[1].play_index, 1);

        let wr = season
            .player_game_stats
            .iter()
            .find(|s| s.player_id == "00-0000002")
            .unwrap();
        assert_eq!(wr.stats.targets, Some(2));
        assert_eq!(wr.stats.receptions, Some(1));
        assert_eq!(wr.stats.receiving_yards, Some(12));
        assert_eq!(wr.stats.air_yards, Some(16));
        assert_eq!(wr.stats.yards_after_catch, Some(4));
        assert_eq!(wr.stats.rush_attempts, Some(0));
        assert_eq!(wr.stats.offense_snaps, None);
        assert_eq!(wr.stats.routes_run, None);
        assert_eq!(wr.team_id.as_deref(), Some("KC"));

        let qb = season
            .player_game_stats
            .iter()
            .find(|s| s.player_id == "00-0000001")
            .unwrap();
        assert_eq!(qb.stats.pass_attempts, Some(2));
        assert_eq!(qb.stats.completions, Some(1));
        assert_eq!(qb.stats.passing_yards, Some(12));
    }

    #[test]
    fn missing_air_yards_poisons_the_sum() {
        let roster = roster();
        let mut play = pass_play(10, false);
        play.insert("air_yards", RawValue::Null);
        let season = normalize(2024, &[pass_play(5, false), play], &roster, &[], "");
        let wr = season
            .player_game_stats
            .iter()
            .find(|s| s.player_id == "00-0000002")
            .unwrap();
        assert_eq!(wr.stats.targets, Some(2));
        assert_eq!(wr.stats.air_yards, None);
    }

    #[test]
    fn unattributable_rows_are_rejected_not_dropped() {
        let roster = roster();
        let mut unknown_player = pass_play(30, true);
        unknown_player.insert("receiver_player_id", text("00-0099999"));
        let mut nameless = pass_play(31, true);
        nameless.insert("receiver_player_id", RawValue::Null);
        let mut bad_game = pass_play(32, true);
        bad_game.insert("game_id", text("2024_05_KC"));
        let mut wrong_team = pass_play(33, true);
        wrong_team.insert("posteam", text("DAL"));

        let season = normalize(
            2024,
            &[pass_play(1, true), unknown_player, nameless, bad_game, wrong_team],
            &roster,
            &[],
            "",
        );
        assert_eq!(season.rejects.len(), 4);
        assert!(season.rejects.iter().all(|r| r.stage == RejectStage::PlayByPlay));
        assert!(season.rejects[0].reason.contains("not on the season roster"));
        assert!(season.rejects[1].reason.contains("has no player id"));
        assert!(season.rejects[2].reason.contains("malformed game_id"));
        assert!(season.rejects[3].reason.contains("did not play"));
        assert_eq!(season.plays["2024_05_KC_NO"].len(), 1);
    }

    #[test]
    fn schedule_supplies_boxscore_urls() {
        let roster = roster();
        let schedule = vec![
            RawRecord::new()
                .with("game_id", text("2024_05_KC_NO"))
                .with("pfr", text("202410070nor")),
        ];
        let season = normalize(2024, &[pass_play(1, true)], &roster, &schedule, "https://pfr.test/boxscores/");
        assert_eq!(
            season.games[0].boxscore_url.as_deref(),
            Some("https://pfr.test/boxscores/202410070nor.htm")
        );
    }

    fn stat(targets: Option<i64>, snaps: Option<i64>) -> PlayerGameStat {
        PlayerGameStat {
            player_id: "00-0000002".into(),
            game_id: "2024_05_KC_NO".into(),
            season: 2024,
            week: 5,
            team_id: Some("KC".into()),
            stats: StatLine {
                targets,
                offense_snaps: snaps,
                ..Default::default()
            },
        }
    }

    #[test]
    fn bulk_wins_and_scrape_fills_gaps() {
        let bulk = stat(Some(5), None);
        let scraped = stat(Some(7), Some(51));
        let merged = merge_stat(Some(&bulk), &scraped, StatSource::Scrape);
        assert_eq!(merged.stats.targets, Some(5));
        assert_eq!(merged.stats.offense_snaps, Some(51));

        let bulk_null = stat(None, None);
        let merged = merge_stat(Some(&bulk_null), &scraped, StatSource::Scrape);
        assert_eq!(merged.stats.targets, Some(7));

        // Bulk re-ingestion overwrites its own fields but keeps scraped snaps.
        let merged_again = merge_stat(Some(&merged), &stat(Some(6), None), StatSource::Bulk);
        assert_eq!(merged_again.stats.targets, Some(6));
        assert_eq!(merged_again.stats.offense_snaps, Some(51));

        // A bulk null is the feed's current answer, not a gap to fill from the old row.
        let merged_null = merge_stat(Some(&merged_again), &stat(None, None), StatSource::Bulk);
        assert_eq!(merged_null.stats.targets, None);
        assert_eq!(merged_null.stats.offense_snaps, Some(51));
    }

    #[test]
    fn scrape_is_authoritative_for_snaps() {
        let existing = stat(Some(5), Some(40));
        let merged = merge_stat(Some(&existing), &stat(None, Some(44)), StatSource::Scrape);
        assert_eq!(merged.stats.offense_snaps, Some(44));
        assert_eq!(merged.stats.targets, Some(5));
    }

    #[test]
    fn boxscore_rows_resolve_by_name_and_team() {
        let roster = roster();
        let game = Game {
            game_id: "2024_05_KC_NO".into(),
            season: 2024,
            week: 5,
            season_type: SeasonType::Regular,
            home_team: "NO".into(),
            away_team: "KC".into(),
            game_date: None,
            home_score: None,
            away_score: None,
            boxscore_url: None,
        };
        let rows = vec![
            RawRecord::new()
                .with(TABLE_KEY, text(OFFENSE_TABLE))
                .with("player", text("Wes Wideout"))
                .with("team", text("KAN"))
                .with("targets", text("7")),
            RawRecord::new()
                .with(TABLE_KEY, text(AWAY_SNAPS_TABLE))
                .with("player", text("Wes Wideout"))
                .with("offense", text("51"))
                .with("off_pct", text("88%")),
            RawRecord::new()
                .with(TABLE_KEY, text(OFFENSE_TABLE))
                .with("player", text("Nobody Known"))
                .with("team", text("KAN")),
        ];
        let (lines, rejects) = resolve_boxscore(&game, &rows, &roster);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].stats.targets, Some(7));
        assert_eq!(lines[0].stats.offense_snaps, Some(51));
        assert_eq!(lines[0].stats.offense_snap_pct, Some(88));
        assert_eq!(rejects.len(), 1);
        assert_eq!(rejects[0].stage, RejectStage::Boxscore);
    }
}
