use criterion::{Criterion, criterion_group, criterion_main};
use std::hint::black_box;

use gridiron_data::boxscore::parse_boxscore_html;
use gridiron_data::derive::{GameInputs, PlayerSeasonInputs, derive};
use gridiron_data::model::StatLine;
use gridiron_data::normalize::{RosterIndex, normalize};
use gridiron_data::raw::{RawRecord, RawValue};
use gridiron_data::store::TeamGameTotals;

const BOXSCORE_HTML: &str = include_str!("../tests/fixtures/pfr_boxscore.html");

fn text(v: &str) -> RawValue {
    RawValue::Text(v.to_string())
}

fn roster() -> Vec<RawRecord> {
    (0..40)
        .map(|idx| {
            let team = if idx % 2 == 0 { "KC" } else { "BUF" };
            RawRecord::new()
                .with("gsis_id", text(&format!("00-{:07}", idx + 1)))
                .with("full_name", text(&format!("Player {}", idx + 1)))
                .with("position", text(["QB", "RB", "WR", "TE"][idx % 4]))
                .with("team", text(team))
        })
        .collect()
}

/// 17 games of 140 plays, alternating possession, passes and runs.
fn season_pbp() -> Vec<RawRecord> {
    let mut out = Vec::new();
    for week in 1..=17u8 {
        let game_id = format!("2024_{week:02}_KC_BUF");
        for play_id in 0..140i64 {
            let offense_kc = play_id % 2 == 0;
            let (posteam, defteam) = if offense_kc { ("KC", "BUF") } else { ("BUF", "KC") };
            let base = if offense_kc { 1 } else { 2 };
            let player = |slot: i64| format!("00-{:07}", base + 2 * (slot % 20));
            let mut rec = RawRecord::new()
                .with("game_id", text(&game_id))
                .with("season", RawValue::Int(2024))
                .with("week", RawValue::Int(week as i64))
                .with("season_type", text("REG"))
                .with("home_team", text("BUF"))
                .with("away_team", text("KC"))
                .with("play_id", RawValue::Int(play_id * 25 + 1))
                .with("posteam", text(posteam))
                .with("defteam", text(defteam))
                .with("yards_gained", RawValue::Int(play_id % 11));
            if play_id % 3 == 0 {
                rec.insert("rush_attempt", RawValue::Float(1.0));
                rec.insert("rusher_player_id", text(&player(play_id + 1)));
            } else {
                rec.insert("pass_attempt", RawValue::Float(1.0));
                rec.insert("complete_pass", RawValue::Float((play_id % 4 != 0) as u8 as f64));
                rec.insert("air_yards", RawValue::Int(play_id % 17));
                rec.insert("passer_player_id", text(&player(0)));
                rec.insert("receiver_player_id", text(&player(play_id + 2)));
            }
            out.push(rec);
        }
    }
    out
}

fn bench_normalize_season(c: &mut Criterion) {
    let pbp = season_pbp();
    let (roster, _) = RosterIndex::from_records(&roster());
    c.bench_function("normalize_season", |b| {
        b.iter(|| {
            let season = normalize(2024, black_box(&pbp), &roster, &[], "https://example.test");
            black_box(season.player_game_stats.len());
        })
    });
}

fn bench_derive_player_season(c: &mut Criterion) {
    let games = (1..=20u8)
        .map(|week| {
            let stats = StatLine {
                targets: Some(8),
                receptions: Some(6),
                receiving_yards: Some(74),
                receiving_tds: Some(i64::from(week % 3 == 0)),
                air_yards: Some(91),
                yards_after_catch: Some(30),
                rush_attempts: Some(1),
                rushing_yards: Some(4),
                rushing_tds: Some(0),
                pass_attempts: Some(0),
                completions: Some(0),
                passing_yards: Some(0),
                passing_tds: Some(0),
                interceptions: Some(0),
                sacks: Some(0),
                fumbles_lost: Some(0),
                offense_snaps: Some(55),
                offense_snap_pct: Some(88),
                routes_run: Some(34),
            };
            GameInputs {
                game_id: format!("2024_{week:02}_KC_BUF"),
                week,
                team_id: Some("KC".to_string()),
                stats,
                team: Some(TeamGameTotals {
                    targets: 36,
                    air_yards: Some(310),
                    rush_attempts: 24,
                }),
            }
        })
        .collect();
    let inputs = PlayerSeasonInputs {
        player_id: "00-0000002".to_string(),
        season: 2024,
        games,
    };
    c.bench_function("derive_player_season", |b| {
        b.iter(|| black_box(derive(black_box(&inputs))).len())
    });
}

fn bench_boxscore_parse(c: &mut Criterion) {
    c.bench_function("boxscore_parse", |b| {
        b.iter(|| {
            let rows = parse_boxscore_html(black_box(BOXSCORE_HTML)).unwrap();
            black_box(rows.len());
        })
    });
}

criterion_group!(
    benches,
    bench_normalize_season,
    bench_derive_player_season,
    bench_boxscore_parse
);
criterion_main!(benches);
