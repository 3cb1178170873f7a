// Integration tests for the matchweek service and console protocol.
//
// These exercise the library crate's public API end-to-end: a seeded service
// is driven through the same command lines the binary reads from stdin, and
// the JSON envelopes it produces are checked.

use std::time::Duration;

use matchweek_app::protocol::{self, Command, Response};
use matchweek_app::service::{self, LeagueHandle, ServiceError, ServiceSettings};
use matchweek_core::{CancelToken, LeagueError, PredictionEngine, Roster, SeasonPhase};
use serde_json::Value;

// ===========================================================================
// Test helpers
// ===========================================================================

fn settings() -> ServiceSettings {
    ServiceSettings {
        engine: PredictionEngine::new(800, 2),
        prediction_timeout: Duration::from_secs(30),
        seed: Some(2024),
        ..ServiceSettings::default()
    }
}

fn start() -> LeagueHandle {
    let (handle, _task) = service::spawn(Roster::with_default_teams(), settings());
    handle
}

/// Run a line and decode the envelope it would print.
async fn run_line(handle: &LeagueHandle, line: &str) -> Value {
    let response = protocol::handle_line(handle, line).await;
    serde_json::from_str(&response.to_json_line()).expect("response is valid JSON")
}

fn assert_success(v: &Value) -> &Value {
    assert_eq!(v["success"], Value::Bool(true), "expected success: {v}");
    &v["data"]
}

fn assert_error(v: &Value) -> &str {
    assert_eq!(v["error"], Value::Bool(true), "expected error: {v}");
    v["message"].as_str().unwrap()
}

// ===========================================================================
// Console round trips
// ===========================================================================

#[tokio::test]
async fn full_season_over_console() {
    let handle = start();

    let err = run_line(&handle, "play-all").await;
    assert_eq!(assert_error(&err), "fixtures not generated yet");

    let fixtures = run_line(&handle, "generate").await;
    assert_eq!(assert_success(&fixtures).as_array().unwrap().len(), 12);

    let again = run_line(&handle, "generate").await;
    assert!(assert_error(&again).contains("already been generated"));

    let week = run_line(&handle, "play-week").await;
    let week = assert_success(&week).as_array().unwrap().clone();
    assert_eq!(week.len(), 2);
    assert!(week.iter().all(|f| f["week"] == 1 && f["homeScore"].is_u64()));

    let rest = run_line(&handle, "play-all").await;
    let rest = assert_success(&rest).as_object().unwrap().clone();
    assert_eq!(rest.len(), 5);
    assert!(rest.contains_key("6"));

    let state = handle.state();
    assert_eq!(state.current_week, 6);
    assert!(state.completed);
    assert_eq!(state.phase(), SeasonPhase::Completed);

    let done = run_line(&handle, "play-week").await;
    assert!(assert_error(&done).contains("season already completed"));
    assert_eq!(handle.state().current_week, 6);

    let table = run_line(&handle, "standings").await;
    let rows = assert_success(&table).as_array().unwrap().clone();
    assert_eq!(rows.len(), 4);
    let points: u64 = rows.iter().map(|r| r["points"].as_u64().unwrap()).sum();
    let draws = handle
        .fixtures(None)
        .iter()
        .filter(|f| f.home_score == f.away_score)
        .count() as u64;
    assert_eq!(points, 3 * (12 - draws) + 2 * draws);
    assert_eq!(rows[0]["position"], 1);
}

#[tokio::test]
async fn state_view_bundles_everything() {
    let handle = start();
    run_line(&handle, "generate").await;
    run_line(&handle, "play-week").await;

    let state = run_line(&handle, "state").await;
    let data = assert_success(&state);
    assert_eq!(data["leagueState"]["currentWeek"], 1);
    assert_eq!(data["leagueState"]["started"], true);
    assert_eq!(data["standings"].as_array().unwrap().len(), 4);
    assert_eq!(data["currentWeekResults"].as_array().unwrap().len(), 2);
    assert_eq!(data["allMatches"].as_object().unwrap().len(), 6);

    let total: f64 = data["predictions"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["percentage"].as_f64().unwrap())
        .sum();
    assert!((total - 100.0).abs() < 1e-6);
}

#[tokio::test]
async fn override_then_reset() {
    let handle = start();
    run_line(&handle, "generate").await;

    let first = handle.fixtures(Some(1))[0].clone();
    let set = run_line(&handle, &format!("set-result {} 4 4", first.id)).await;
    assert_eq!(assert_success(&set)["homeScore"], 4);
    assert_eq!(handle.state().current_week, 0);

    let missing = run_line(&handle, "set-result 999 1 0").await;
    assert_eq!(assert_error(&missing), "no fixture with id 999");

    let reset = run_line(&handle, "reset").await;
    assert_eq!(assert_success(&reset)["fixturesCreated"], false);
    assert!(handle.fixtures(None).is_empty());

    // Reset twice is fine.
    assert!(protocol::handle_line(&handle, "reset").await.is_success());
}

#[tokio::test]
async fn oversized_scores_are_rejected_and_service_survives() {
    let handle = start();
    run_line(&handle, "generate").await;

    // Two fixtures with the same home side.
    let fixtures = handle.fixtures(None);
    let first = &fixtures[0];
    let second = fixtures
        .iter()
        .find(|f| f.id != first.id && f.home_team == first.home_team)
        .unwrap();

    for id in [first.id, second.id] {
        let v = run_line(&handle, &format!("set-result {id} 4294967295 0")).await;
        assert!(assert_error(&v).contains("out of range"));
    }
    let v = run_line(&handle, &format!("set-result {} 100 0", first.id)).await;
    assert!(assert_error(&v).contains("at most 99"));
    assert!(handle.fixtures(None).iter().all(|f| !f.played()));

    let v = run_line(&handle, &format!("set-result {} 99 0", first.id)).await;
    assert_eq!(assert_success(&v)["homeScore"], 99);
    let v = run_line(&handle, &format!("set-result {} 99 0", second.id)).await;
    assert_success(&v);

    let table = run_line(&handle, "standings").await;
    let rows = assert_success(&table).as_array().unwrap().clone();
    assert_eq!(rows[0]["teamId"], first.home_team);
    assert_eq!(rows[0]["goalsFor"], 198);

    let week = run_line(&handle, "play-week").await;
    assert_success(&week);
    assert_eq!(handle.state().current_week, 1);
}

#[tokio::test]
async fn roster_commands_respect_schedule_lock() {
    let handle = start();

    let added = run_line(&handle, "add-team 77 Aston Villa").await;
    assert_eq!(assert_success(&added)["name"], "Aston Villa");

    let dupe = run_line(&handle, "add-team 60 aston villa").await;
    assert!(assert_error(&dupe).contains("already exists"));

    let weak = run_line(&handle, "add-team 0 Nobody").await;
    assert!(assert_error(&weak).contains("power"));

    run_line(&handle, "generate").await;
    let locked = run_line(&handle, "remove-team 1").await;
    assert!(assert_error(&locked).contains("reset the season"));

    // Five teams: ten weeks with one bye per team per leg.
    assert_eq!(handle.state().total_weeks, 10);
    assert_eq!(handle.fixtures(Some(1)).len(), 2);
    assert!(handle.fixtures(Some(11)).is_empty());
}

#[tokio::test]
async fn bad_input_keeps_service_alive() {
    let handle = start();
    let v = run_line(&handle, "fly-to-the-moon").await;
    assert!(assert_error(&v).contains("unknown command"));
    let v = run_line(&handle, "set-result 1 -2 0").await;
    assert!(assert_error(&v).contains("non-negative"));
    let v = run_line(&handle, "teams").await;
    assert_eq!(assert_success(&v).as_array().unwrap().len(), 4);
    assert_eq!(
        "help".parse::<Command>().unwrap(),
        Command::Help
    );
    assert!(matches!(
        protocol::execute(&handle, Command::Help).await,
        Response::Success(_)
    ));
}

// ===========================================================================
// Concurrency
// ===========================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn readers_see_whole_weeks() {
    let handle = start();
    handle.generate_fixtures().await.unwrap();

    let mut watcher = handle.clone();
    let reader = tokio::spawn(async move {
        let mut seen = Vec::new();
        while let Ok(snapshot) = watcher.changed().await {
            let played = snapshot.fixtures.iter().filter(|f| f.played()).count();
            // Every snapshot holds complete weeks only.
            assert_eq!(played as u32, snapshot.state.current_week * 2);
            seen.push(snapshot.state.current_week);
            if snapshot.state.completed {
                break;
            }
        }
        seen
    });

    for _ in 0..6 {
        handle.play_week().await.unwrap();
    }
    let seen = reader.await.unwrap();
    assert_eq!(seen.last(), Some(&6));
    assert!(seen.windows(2).all(|w| w[0] < w[1]));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_play_week_calls_are_serialized() {
    let handle = start();
    handle.generate_fixtures().await.unwrap();

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let h = handle.clone();
        tasks.push(tokio::spawn(async move { h.play_week().await }));
    }

    let mut ok = 0;
    let mut complete = 0;
    for t in tasks {
        match t.await.unwrap() {
            Ok(_) => ok += 1,
            Err(ServiceError::League(LeagueError::SeasonComplete { .. })) => complete += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(ok, 6);
    assert_eq!(complete, 2);
    assert_eq!(handle.state().current_week, 6);
}

#[tokio::test]
async fn predictions_run_alongside_mutations() {
    let handle = start();
    handle.generate_fixtures().await.unwrap();

    let odds = handle.clone();
    let (predictions, week) = tokio::join!(odds.predictions(), handle.play_week());
    assert_eq!(predictions.unwrap().len(), 4);
    assert_eq!(week.unwrap().len(), 2);
}

#[tokio::test]
async fn cancelled_play_all_plays_nothing() {
    let handle = start();
    handle.generate_fixtures().await.unwrap();
    let token = CancelToken::new();
    token.cancel();
    let played = handle.play_all_until(Some(token)).await.unwrap();
    assert!(played.is_empty());
    assert_eq!(handle.state().current_week, 0);
}
