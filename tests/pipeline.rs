mod common;

use common::*;
use gridiron_data::model::SeasonType;
use gridiron_data::pipeline::ingest_season;
use gridiron_data::source::NoBoxscores;
use gridiron_data::store;

#[test]
fn ingest_writes_games_and_only_scrapes_referenced_boxscores() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(&dir.path().join("store.sqlite"));
    let boxscores = CountingBoxscores::default();

    let report = ingest_season(&config, &FakeBulk::fixture(), &boxscores, SEASON).unwrap();

    assert_eq!(report.games_total, 3);
    assert_eq!(report.games_written, 3);
    assert_eq!(report.games_failed, 0);
    assert_eq!(report.boxscores_merged, 1);
    assert_eq!(report.boxscores_skipped, 2);
    assert_eq!(report.boxscores_failed, 0);
    // Week 6 has an empty PFR id and the playoff game no schedule row, so the scraper is
    // never asked about either.
    assert_eq!(boxscores.calls(), 1);
    let urls = boxscores.urls.lock().unwrap().clone();
    assert_eq!(urls.len(), 1);
    assert!(urls[0].ends_with("/boxscores/202410070nor.htm"));

    let conn = store::open_db(&config.db_path).unwrap();
    let week5 = store::load_game(&conn, WEEK5_GAME).unwrap().unwrap();
    assert_eq!(week5.week, 5);
    assert_eq!(week5.home_team, "NO");
    assert_eq!(week5.away_team, "KC");
    assert!(week5.boxscore_url.is_some());
    let week6 = store::load_game(&conn, WEEK6_GAME).unwrap().unwrap();
    assert_eq!(week6.boxscore_url, None);

    let plays = store::load_plays(&conn, WEEK6_GAME).unwrap();
    assert_eq!(plays.iter().map(|p| p.play_id).collect::<Vec<_>>(), vec![55, 77, 95]);
    assert_eq!(plays.iter().map(|p| p.play_index).collect::<Vec<_>>(), vec![0, 1, 2]);
}

#[test]
fn bulk_values_win_and_scrape_fills_snaps() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(&dir.path().join("store.sqlite"));
    ingest_season(&config, &FakeBulk::fixture(), &CountingBoxscores::default(), SEASON).unwrap();

    let conn = store::open_db(&config.db_path).unwrap();
    let kelce = store::load_player_game_stat(&conn, KELCE, WEEK5_GAME).unwrap().unwrap();
    // Play-by-play says 1 reception, the page claims 7.
    assert_eq!(kelce.stats.receptions, Some(1));
    assert_eq!(kelce.stats.receiving_yards, Some(12));
    assert_eq!(kelce.stats.offense_snaps, Some(58));
    assert_eq!(kelce.stats.offense_snap_pct, Some(87));
    assert_eq!(kelce.team_id.as_deref(), Some("KC"));

    // Olave touched nothing in week 5: the page gives his snaps, the feed his zeros.
    let olave = store::load_player_game_stat(&conn, OLAVE, WEEK5_GAME).unwrap().unwrap();
    assert_eq!(olave.stats.offense_snaps, Some(55));
    assert_eq!(olave.stats.targets, Some(0));
    assert_eq!(olave.stats.receiving_yards, Some(0));
    assert_eq!(olave.team_id.as_deref(), Some("NO"));

    // No page for week 6: snap fields stay unknown rather than zero.
    let kelce6 = store::load_player_game_stat(&conn, KELCE, WEEK6_GAME).unwrap().unwrap();
    assert_eq!(kelce6.stats.receiving_tds, Some(1));
    assert_eq!(kelce6.stats.offense_snaps, None);
}

#[test]
fn zero_team_targets_yield_null_share() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(&dir.path().join("store.sqlite"));
    ingest_season(&config, &FakeBulk::fixture(), &NoBoxscores, SEASON).unwrap();

    let conn = store::open_db(&config.db_path).unwrap();
    let metrics = store::load_derived_metrics(&conn, KAMARA, SEASON).unwrap();
    let week5 = |name: &str| {
        metrics
            .iter()
            .find(|m| m.week == Some(5) && m.metric == name)
            .unwrap_or_else(|| panic!("missing week-5 {name}"))
    };
    assert_eq!(week5("target_share").value, None);
    assert_eq!(week5("rush_share").value, Some(1.0));
    assert_eq!(week5("yards_per_carry").value, Some(5.0));

    let kelce = store::load_derived_metrics(&conn, KELCE, SEASON).unwrap();
    let share = kelce
        .iter()
        .find(|m| m.week == Some(5) && m.metric == "target_share")
        .unwrap();
    assert_eq!(share.value, Some(0.5));
    assert_eq!(share.inputs, "targets,team_targets");
    assert!(!share.input_hash.is_empty());
}

#[test]
fn reingest_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(&dir.path().join("store.sqlite"));
    let bulk = FakeBulk::fixture();

    let first = ingest_season(&config, &bulk, &CountingBoxscores::default(), SEASON).unwrap();
    let conn = store::open_db(&config.db_path).unwrap();
    let plays_before = store::load_plays(&conn, WEEK5_GAME).unwrap();
    let stats_before = store::load_player_season_stats(&conn, KELCE, SEASON).unwrap();
    let derived_before = store::load_derived_metrics(&conn, KELCE, SEASON).unwrap();

    let second = ingest_season(&config, &bulk, &CountingBoxscores::default(), SEASON).unwrap();
    assert_ne!(first.run_id, second.run_id);
    assert_eq!(store::load_plays(&conn, WEEK5_GAME).unwrap(), plays_before);
    assert_eq!(store::load_player_season_stats(&conn, KELCE, SEASON).unwrap(), stats_before);
    assert_eq!(store::load_derived_metrics(&conn, KELCE, SEASON).unwrap(), derived_before);
}

#[test]
fn run_row_and_rejects_are_recorded() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(&dir.path().join("store.sqlite"));
    let report = ingest_season(&config, &FakeBulk::fixture(), &CountingBoxscores::default(), SEASON)
        .unwrap();

    // Unknown rusher, duplicated play_id, unresolvable boxscore name.
    assert_eq!(report.rejects, 3);

    let conn = store::open_db(&config.db_path).unwrap();
    let run = store::load_run(&conn, report.run_id).unwrap().unwrap();
    assert!(run.finished);
    assert_eq!(run.season, SEASON);
    assert_eq!(run.games_written, 3);
    assert_eq!(run.boxscores_failed, 0);
    assert_eq!(run.rejects, 3);
    assert_eq!(store::count_run_rejects(&conn, report.run_id).unwrap(), 3);
}

#[test]
fn bulk_failure_aborts_the_season() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(&dir.path().join("store.sqlite"));
    let bulk = FakeBulk {
        fail_pbp: true,
        ..FakeBulk::fixture()
    };
    let boxscores = CountingBoxscores::default();

    let err = ingest_season(&config, &bulk, &boxscores, SEASON).unwrap_err();
    assert!(format!("{err:#}").contains("connection reset"));
    assert_eq!(boxscores.calls(), 0);

    let conn = store::open_db(&config.db_path).unwrap();
    assert!(store::load_games(&conn, SEASON).unwrap().is_empty());
    let run = store::load_run(&conn, 1).unwrap().unwrap();
    assert!(run.finished);
    assert!(!run.errors.is_empty());
}

#[test]
fn empty_roster_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(&dir.path().join("store.sqlite"));
    let bulk = FakeBulk {
        roster: Vec::new(),
        ..FakeBulk::fixture()
    };
    assert!(ingest_season(&config, &bulk, &NoBoxscores, SEASON).is_err());
}

#[test]
fn postseason_game_is_rebased_and_kept_out_of_season_totals() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(&dir.path().join("store.sqlite"));
    ingest_season(&config, &FakeBulk::fixture(), &NoBoxscores, SEASON).unwrap();

    let conn = store::open_db(&config.db_path).unwrap();
    let game = store::load_game(&conn, POST_GAME).unwrap().unwrap();
    assert_eq!(game.week, 19);
    assert_eq!(game.season_type, SeasonType::Post);

    let kelce = store::load_player_game_stat(&conn, KELCE, POST_GAME).unwrap().unwrap();
    assert_eq!(kelce.week, 19);
    assert_eq!(kelce.stats.receiving_yards, Some(30));

    let metrics = store::load_derived_metrics(&conn, KELCE, SEASON).unwrap();
    let find = |week: Option<u8>, name: &str| {
        metrics
            .iter()
            .find(|m| m.week == week && m.metric == name)
            .unwrap_or_else(|| panic!("missing {name} for {week:?}"))
            .value
    };
    assert_eq!(find(Some(19), "target_share"), Some(1.0));
    assert_eq!(find(Some(19), "adot"), Some(20.0));
    // Weeks 5 and 6 only.
    assert_eq!(find(None, "targets"), Some(2.0));
    assert_eq!(find(None, "receiving_yards"), Some(18.0));
    assert_eq!(find(None, "games"), Some(2.0));
}

#[test]
fn reingest_drops_lines_the_feed_no_longer_has() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(&dir.path().join("store.sqlite"));
    ingest_season(&config, &FakeBulk::fixture(), &NoBoxscores, SEASON).unwrap();

    let conn = store::open_db(&config.db_path).unwrap();
    assert!(store::load_player_game_stat(&conn, RICE, WEEK5_GAME).unwrap().is_some());

    let trimmed = FakeBulk {
        pbp: play_by_play_without_rice(),
        ..FakeBulk::fixture()
    };
    ingest_season(&config, &trimmed, &NoBoxscores, SEASON).unwrap();

    assert_eq!(store::load_player_game_stat(&conn, RICE, WEEK5_GAME).unwrap(), None);
    let rice = store::load_derived_metrics(&conn, RICE, SEASON).unwrap();
    assert!(rice.is_empty(), "stale derived rows: {rice:?}");

    let kelce = store::load_derived_metrics(&conn, KELCE, SEASON).unwrap();
    let share = kelce
        .iter()
        .find(|m| m.week == Some(5) && m.metric == "target_share")
        .unwrap();
    assert_eq!(share.value, Some(1.0));
}

#[test]
fn unknown_air_yards_on_a_team_target_null_the_air_share() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(&dir.path().join("store.sqlite"));
    let mut pbp = play_by_play();
    for rec in pbp.iter_mut() {
        if rec.text("game_id").as_deref() == Some(WEEK5_GAME) && rec.int("play_id") == Some(61) {
            rec.insert("air_yards", gridiron_data::raw::RawValue::Null);
        }
    }
    let bulk = FakeBulk {
        pbp,
        ..FakeBulk::fixture()
    };
    ingest_season(&config, &bulk, &NoBoxscores, SEASON).unwrap();

    let conn = store::open_db(&config.db_path).unwrap();
    let totals = store::team_game_totals(&conn, WEEK5_GAME, "KC").unwrap();
    assert_eq!(totals.targets, 2);
    assert_eq!(totals.air_yards, None);

    let kelce = store::load_derived_metrics(&conn, KELCE, SEASON).unwrap();
    let week5 = |name: &str| {
        kelce
            .iter()
            .find(|m| m.week == Some(5) && m.metric == name)
            .unwrap_or_else(|| panic!("missing week-5 {name}"))
            .value
    };
    assert_eq!(week5("air_yards_share"), None);
    assert_eq!(week5("adot"), Some(8.0));
    assert_eq!(week5("target_share"), Some(0.5));
}
