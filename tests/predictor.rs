use std::collections::BTreeMap;

use chrono::{DateTime, Duration, TimeZone, Utc};

use trendy_props::params::{Adjustment, ParamSet, PredictorParams};
use trendy_props::predictor::{PredictError, PredictWarning, Predictor, recency_weights};
use trendy_props::records::{GameRecord, PlayerGameRecord, PropLine, Recommendation};
use trendy_props::sources::MemorySink;
use trendy_props::store::ProjectionDb;
use trendy_props::win_pct::enrich;

fn day(n: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 2, 1, 0, 30, 0).unwrap() + Duration::days(n)
}

fn game(id: &str, n: i64, home: &str, away: &str, score: Option<(i32, i32)>) -> GameRecord {
    GameRecord {
        game_id: id.to_string(),
        start_date: day(n),
        home_team_id: home.to_string(),
        away_team_id: away.to_string(),
        home_score_total: score.map(|s| s.0),
        away_score_total: score.map(|s| s.1),
    }
}

fn box_score(player: &str, game_id: &str, team: &str, n: i64, points: f64) -> PlayerGameRecord {
    PlayerGameRecord {
        player_id: player.to_string(),
        game_id: game_id.to_string(),
        team_id: team.to_string(),
        start_date: day(n),
        stats: BTreeMap::from([("points".to_string(), points)]),
        is_home: false,
        opponent_win_pct_before: None,
    }
}

/// LAL visits a fresh opponent every night, so every opponent sits at 0.5.
fn road_trip() -> (Vec<GameRecord>, Vec<PlayerGameRecord>) {
    let games = vec![
        game("g1", 0, "A1", "LAL", Some((100, 90))),
        game("g2", 1, "A2", "LAL", Some((95, 101))),
        game("g3", 2, "A3", "LAL", Some((99, 98))),
        game("g4", 3, "A4", "LAL", None),
    ];
    let players = vec![
        box_score("lbj", "g1", "LAL", 0, 10.0),
        box_score("lbj", "g2", "LAL", 1, 20.0),
        box_score("lbj", "g3", "LAL", 2, 30.0),
    ];
    (games, players)
}

fn params(n: usize, decay: f64, home: f64) -> ParamSet {
    ParamSet::from([(
        "points".to_string(),
        PredictorParams::new(n, decay, home, 1.0),
    )])
}

fn predictor(set: ParamSet) -> Predictor {
    let (games, players) = road_trip();
    Predictor::new(enrich(&games, &players), set)
}

#[test]
fn three_game_road_scenario() {
    let out = predictor(params(3, 0.8, 0.1))
        .predict("lbj", "g4", "points")
        .unwrap();
    let weighted: f64 = (10.0 * 0.64 + 20.0 * 0.8 + 30.0) / (0.64 + 0.8 + 1.0);
    assert!((weighted - 21.475).abs() < 1e-3);
    assert!((out.value - weighted * 0.9).abs() < 1e-9, "got {}", out.value);
    assert_eq!(out.games_used, 3);
    assert!(!out.target_is_home);
    assert_eq!(out.warning, None);
}

#[test]
fn no_prior_games_is_no_history() {
    let err = predictor(params(3, 0.8, 0.1))
        .predict("lbj", "g1", "points")
        .unwrap_err();
    assert!(matches!(err, PredictError::NoHistory { .. }));
    assert_eq!(err.category(), "no_history");
}

#[test]
fn zero_decay_over_several_games_is_indeterminate() {
    let err = predictor(params(3, 0.0, 0.1))
        .predict("lbj", "g4", "points")
        .unwrap_err();
    assert!(matches!(err, PredictError::IndeterminateResult { .. }));

    // A single game needs no decay at all.
    let one = predictor(params(1, 0.0, 0.0))
        .predict("lbj", "g4", "points")
        .unwrap();
    assert_eq!(one.value, 30.0);
}

#[test]
fn window_is_bounded_by_n_and_by_available_games() {
    let wide = predictor(params(5, 0.8, 0.0))
        .predict("lbj", "g4", "points")
        .unwrap();
    assert_eq!(wide.games_used, 3);
    assert_eq!(
        wide.warning,
        Some(PredictWarning::InsufficientSample {
            available: 3,
            requested: 5
        })
    );

    let narrow = predictor(params(2, 0.5, 0.0))
        .predict("lbj", "g4", "points")
        .unwrap();
    assert_eq!(narrow.games_used, 2);
    // (20 * 0.5 + 30) / 1.5
    assert!((narrow.value - 80.0 / 3.0).abs() < 1e-9);
}

#[test]
fn recency_weight_strictly_grows_toward_newest() {
    for decay in [0.5, 0.8, 0.95, 0.999] {
        let w = recency_weights(8, decay).unwrap();
        assert!(w.windows(2).all(|pair| pair[0] < pair[1]), "decay {decay}: {w:?}");
        assert_eq!(w[7], 1.0);
    }
}

#[test]
fn unit_decay_weighs_every_game_equally() {
    let w = recency_weights(8, 1.0).unwrap();
    assert!(w.iter().all(|&x| x == 1.0));
}

#[test]
fn future_games_do_not_leak_into_predictions() {
    let (mut games, mut players) = road_trip();
    let before = Predictor::new(enrich(&games, &players), params(3, 0.8, 0.1))
        .predict("lbj", "g4", "points")
        .unwrap();

    games[3].home_score_total = Some(80);
    games[3].away_score_total = Some(130);
    games.push(game("g5", 4, "LAL", "A1", Some((120, 80))));
    players.push(box_score("lbj", "g4", "LAL", 3, 55.0));
    players.push(box_score("lbj", "g5", "LAL", 4, 60.0));
    let after = Predictor::new(enrich(&games, &players), params(3, 0.8, 0.1))
        .predict("lbj", "g4", "points")
        .unwrap();
    assert_eq!(before, after);
}

#[test]
fn identical_inputs_give_identical_outputs() {
    let (games, mut players) = road_trip();
    let a = Predictor::new(enrich(&games, &players), params(3, 0.85, 0.05))
        .predict("lbj", "g4", "points")
        .unwrap();
    players.reverse();
    let b = Predictor::new(enrich(&games, &players), params(3, 0.85, 0.05))
        .predict("lbj", "g4", "points")
        .unwrap();
    assert_eq!(a.value.to_bits(), b.value.to_bits());
}

#[test]
fn error_taxonomy() {
    let mut set = params(3, 0.8, 0.1);
    set.insert("steals".to_string(), PredictorParams::new(3, 0.8, 0.1, 1.0));
    let p = predictor(set);

    assert!(matches!(
        p.predict("lbj", "g4", "assists"),
        Err(PredictError::MissingParameters { .. })
    ));
    assert!(matches!(
        p.predict("lbj", "g404", "points"),
        Err(PredictError::UnknownGame { .. })
    ));
    assert!(matches!(
        p.predict("nobody", "g4", "points"),
        Err(PredictError::NoHistory { .. })
    ));
    assert!(matches!(
        p.predict("lbj", "g4", "steals"),
        Err(PredictError::UnsupportedStat { .. })
    ));
}

#[test]
fn out_of_domain_parameters_count_as_missing() {
    let mut set = params(0, 0.8, 0.1);
    set.insert("assists".to_string(), PredictorParams::new(3, 1.5, 0.1, 1.0));
    let p = predictor(set);

    assert!(p.params().is_empty());
    assert!(matches!(
        p.predict("lbj", "g4", "points"),
        Err(PredictError::MissingParameters { .. })
    ));
    assert!(matches!(
        p.predict("lbj", "g4", "assists"),
        Err(PredictError::MissingParameters { .. })
    ));
}

#[test]
fn opponent_scaled_adjustment_uses_target_opponent() {
    let home_only = predictor(params(3, 0.8, 0.1))
        .predict("lbj", "g4", "points")
        .unwrap();
    let scaled = predictor(params(3, 0.8, 0.1))
        .with_adjustment(Adjustment::OpponentScaled)
        .predict("lbj", "g4", "points")
        .unwrap();
    // A4 has no completed games, so the factor is 0.5 / 0.5.
    assert_eq!(home_only.value, scaled.value);
}

fn line(player: &str, stat: &str, value: f64) -> PropLine {
    PropLine {
        player_id: player.to_string(),
        player_name: Some("LeBron James".to_string()),
        stat_type: stat.to_string(),
        line: value,
    }
}

#[test]
fn slate_resolves_ids_and_counts_failures() {
    let p = predictor(params(3, 0.8, 0.1)).with_confidence(80);
    let lines = vec![
        line("LBJ", "points", 18.5),
        line("lbj", "assists", 7.5),
        line("nobody", "points", 10.5),
    ];
    let report = p.predict_slate("g4", &lines);

    assert_eq!(report.predictions.len(), 1);
    let pick = &report.predictions[0];
    assert_eq!(pick.player_id, "lbj");
    assert_eq!(pick.recommendation, Recommendation::Over);
    assert_eq!(pick.confidence, 80);
    assert!((pick.edge.unwrap() - (pick.predicted_value - 18.5)).abs() < 1e-12);

    let counts = report.error_counts();
    assert_eq!(counts.get("missing_parameters"), Some(&1));
    assert_eq!(counts.get("no_history"), Some(&1));

    let mut sink = MemorySink::default();
    let summary = report.publish(&mut sink);
    assert_eq!((summary.written, summary.failed), (1, 0));
}

#[test]
fn published_slate_round_trips_through_sqlite() {
    let (games, players) = road_trip();
    let mut db = ProjectionDb::open_in_memory().unwrap();
    db.upsert_games(&games).unwrap();
    db.upsert_player_games(&players).unwrap();

    let p = Predictor::from_sources(&db, &db, params(3, 0.8, 0.1)).unwrap();
    let report = p.predict_slate("g4", &[line("lbj", "points", 21.0)]);
    report.publish(&mut db);

    let stored = db.load_projections("g4").unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].predicted_value, 19.3);
    assert_eq!(stored[0].recommendation, Recommendation::Under);
    assert_eq!(stored[0].games_used, 3);
}
