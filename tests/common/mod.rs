#![allow(dead_code)]

use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::{Result, anyhow};

use gridiron_data::boxscore::parse_boxscore_html;
use gridiron_data::config::PipelineConfig;
use gridiron_data::raw::{RawRecord, RawValue};
use gridiron_data::source::{BoxscoreSource, BulkSource, Supplement};

pub const SEASON: u16 = 2024;
pub const WEEK5_GAME: &str = "2024_05_KC_NO";
pub const WEEK6_GAME: &str = "2024_06_NO_KC";
/// Provider week 7 of a six-week fixture season: the first postseason round.
pub const POST_GAME: &str = "2024_07_NO_KC";
pub const WEEK5_PFR: &str = "202410070nor";

pub const MAHOMES: &str = "00-0000001";
pub const KELCE: &str = "00-0000002";
pub const PACHECO: &str = "00-0000003";
pub const CARR: &str = "00-0000004";
pub const OLAVE: &str = "00-0000005";
pub const KAMARA: &str = "00-0000006";
pub const RICE: &str = "00-0000007";

pub const BOXSCORE_HTML: &str = include_str!("../fixtures/pfr_boxscore.html");

pub fn text(v: &str) -> RawValue {
    RawValue::Text(v.to_string())
}

fn one() -> RawValue {
    RawValue::Float(1.0)
}

pub fn config(db_path: &Path) -> PipelineConfig {
    PipelineConfig {
        db_path: db_path.to_path_buf(),
        parallelism: 2,
        ..PipelineConfig::default()
    }
}

pub fn roster() -> Vec<RawRecord> {
    [
        (MAHOMES, "Patrick Mahomes", "QB", "KC"),
        (KELCE, "Travis Kelce", "TE", "KC"),
        (PACHECO, "Isiah Pacheco", "RB", "KC"),
        (CARR, "Derek Carr", "QB", "NO"),
        (OLAVE, "Chris Olave", "WR", "NO"),
        (KAMARA, "Alvin Kamara", "RB", "NO"),
        (RICE, "Rashee Rice", "WR", "KC"),
    ]
    .into_iter()
    .map(|(id, name, pos, team)| {
        RawRecord::new()
            .with("gsis_id", text(id))
            .with("full_name", text(name))
            .with("position", text(pos))
            .with("team", text(team))
    })
    .chain([
        // Futures signing without an id: skipped quietly.
        RawRecord::new()
            .with("full_name", text("Practice Squad"))
            .with("team", text("KC")),
    ])
    .collect()
}

fn play(game_id: &str, play_id: i64, posteam: &str) -> RawRecord {
    let parts = game_id.split('_').collect::<Vec<_>>();
    let (week, away, home) = (parts[1], parts[2], parts[3]);
    let defteam = if posteam == home { away } else { home };
    RawRecord::new()
        .with("game_id", text(game_id))
        .with("season", RawValue::Int(SEASON as i64))
        .with("week", RawValue::Int(week.parse().unwrap()))
        .with("season_type", text("REG"))
        .with("home_team", text(home))
        .with("away_team", text(away))
        .with("play_id", RawValue::Int(play_id))
        .with("posteam", text(posteam))
        .with("defteam", text(defteam))
}

fn pass(
    game_id: &str,
    play_id: i64,
    posteam: &str,
    passer: (&str, &str),
    receiver: (&str, &str),
    air_yards: i64,
    caught: Option<(i64, i64)>,
) -> RawRecord {
    let mut rec = play(game_id, play_id, posteam)
        .with("play_type", text("pass"))
        .with("pass_attempt", one())
        .with("air_yards", RawValue::Int(air_yards))
        .with("passer_player_id", text(passer.0))
        .with("passer_player_name", text(passer.1))
        .with("receiver_player_id", text(receiver.0))
        .with("receiver_player_name", text(receiver.1));
    match caught {
        Some((yards, yac)) => {
            rec.insert("complete_pass", one());
            rec.insert("yards_gained", RawValue::Int(yards));
            rec.insert("yards_after_catch", RawValue::Int(yac));
        }
        None => {
            rec.insert("complete_pass", RawValue::Float(0.0));
            rec.insert("yards_gained", RawValue::Int(0));
        }
    }
    rec
}

fn run(game_id: &str, play_id: i64, posteam: &str, rusher: (&str, &str), yards: i64) -> RawRecord {
    play(game_id, play_id, posteam)
        .with("play_type", text("run"))
        .with("rush_attempt", one())
        .with("yards_gained", RawValue::Int(yards))
        .with("rusher_player_id", text(rusher.0))
        .with("rusher_player_name", text(rusher.1))
}

/// Two regular-season games and one playoff game. New Orleans throws no targets in week 5.
pub fn play_by_play() -> Vec<RawRecord> {
    let mahomes = (MAHOMES, "P.Mahomes");
    vec![
        pass(WEEK5_GAME, 40, "KC", mahomes, (KELCE, "T.Kelce"), 8, Some((12, 4))),
        pass(WEEK5_GAME, 61, "KC", mahomes, (RICE, "R.Rice"), 15, None),
        run(WEEK5_GAME, 85, "KC", (PACHECO, "I.Pacheco"), 5),
        run(WEEK5_GAME, 110, "NO", (KAMARA, "A.Kamara"), 3),
        run(WEEK5_GAME, 132, "NO", (KAMARA, "A.Kamara"), 7).with("rush_touchdown", one()),
        play(WEEK5_GAME, 150, "NO")
            .with("play_type", text("pass"))
            .with("pass_attempt", one())
            .with("sack", one())
            .with("yards_gained", RawValue::Int(-6))
            .with("passer_player_id", text(CARR))
            .with("passer_player_name", text("D.Carr")),
        // Week 6, fed out of order with one duplicated row and one unknown rusher.
        run(WEEK6_GAME, 95, "KC", (PACHECO, "I.Pacheco"), 4),
        pass(WEEK6_GAME, 55, "NO", (CARR, "D.Carr"), (OLAVE, "C.Olave"), 10, Some((20, 10))),
        pass(WEEK6_GAME, 77, "KC", mahomes, (KELCE, "T.Kelce"), 6, Some((6, 0)))
            .with("pass_touchdown", one()),
        run(WEEK6_GAME, 95, "KC", (PACHECO, "I.Pacheco"), 4),
        run(WEEK6_GAME, 120, "NO", ("00-9999999", "X.Unknown"), 2),
        pass(POST_GAME, 30, "KC", mahomes, (KELCE, "T.Kelce"), 20, Some((30, 10)))
            .with("season_type", text("POST")),
        run(POST_GAME, 52, "KC", (PACHECO, "I.Pacheco"), 8).with("season_type", text("POST")),
    ]
}

/// The fixture feed without Rice's week-5 target.
pub fn play_by_play_without_rice() -> Vec<RawRecord> {
    play_by_play()
        .into_iter()
        .filter(|r| {
            r.text("game_id").as_deref() != Some(WEEK5_GAME) || r.int("play_id") != Some(61)
        })
        .collect()
}

pub fn schedule() -> Vec<RawRecord> {
    vec![
        RawRecord::new()
            .with("game_id", text(WEEK5_GAME))
            .with("pfr", text(WEEK5_PFR)),
        RawRecord::new()
            .with("game_id", text(WEEK6_GAME))
            .with("pfr", text("")),
    ]
}

/// In-memory bulk provider.
pub struct FakeBulk {
    pub pbp: Vec<RawRecord>,
    pub roster: Vec<RawRecord>,
    pub schedule: Vec<RawRecord>,
    pub fail_pbp: bool,
}

impl FakeBulk {
    pub fn fixture() -> Self {
        Self {
            pbp: play_by_play(),
            roster: roster(),
            schedule: schedule(),
            fail_pbp: false,
        }
    }
}

impl BulkSource for FakeBulk {
    fn fetch_play_by_play(&self, season: u16) -> Result<Vec<RawRecord>> {
        if self.fail_pbp {
            return Err(anyhow!("play_by_play_{season}.parquet: connection reset"));
        }
        Ok(self.pbp.clone())
    }

    fn fetch_roster(&self, _season: u16) -> Result<Vec<RawRecord>> {
        Ok(self.roster.clone())
    }

    fn fetch_schedule(&self, _season: u16) -> Result<Vec<RawRecord>> {
        Ok(self.schedule.clone())
    }
}

/// Serves the fixture page for the week-5 game and records every call.
#[derive(Default)]
pub struct CountingBoxscores {
    pub calls: AtomicUsize,
    pub urls: Mutex<Vec<String>>,
}

impl CountingBoxscores {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl BoxscoreSource for CountingBoxscores {
    fn fetch_boxscore(&self, url: &str) -> Supplement<Vec<RawRecord>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut urls) = self.urls.lock() {
            urls.push(url.to_string());
        }
        if !url.ends_with(&format!("{WEEK5_PFR}.htm")) {
            return Supplement::absent("http 404");
        }
        match parse_boxscore_html(BOXSCORE_HTML) {
            Ok(rows) => Supplement::Present(rows),
            Err(err) => Supplement::absent(err.to_string()),
        }
    }
}
