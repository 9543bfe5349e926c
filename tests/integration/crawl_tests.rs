//! Integration tests for the crawler
//!
//! These tests use wiremock to stand in for the statistics API and run the
//! full crawl cycle end-to-end against in-memory and SQLite sinks.

use rivals_crawl::config::{ApiConfig, Config, CrawlerConfig, OutputConfig, UserAgentConfig};
use rivals_crawl::crawler::{run_crawl, Coordinator, RecordingSleeper, SharedSink};
use rivals_crawl::storage::{MemorySink, RecordSink, RunStatus, SqliteSink};
use rivals_crawl::{CrawlError, CrawlLedger, EntityKind};
use serde_json::{json, Value};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Creates a test configuration pointing at the mock server
fn create_test_config(base_url: &str, db_path: &str) -> Config {
    Config {
        api: ApiConfig {
            base_url: base_url.to_string(),
            leaderboard_path: "leaderboard".to_string(),
            player_path: "player/{id}".to_string(),
            match_path: "match/{id}".to_string(),
            request_timeout_secs: 5,
        },
        user_agent: UserAgentConfig {
            crawler_name: "TestCrawler".to_string(),
            crawler_version: "1.0.0".to_string(),
            contact_url: "https://example.com/about".to_string(),
        },
        crawler: CrawlerConfig {
            max_concurrent_requests: 4,
            requests_per_minute: 10_000,
            ..CrawlerConfig::default()
        },
        output: OutputConfig {
            database_path: db_path.to_string(),
        },
    }
}

fn leaderboard_entry(rank: u32, name: &str, id: &str) -> Value {
    json!({
        "rank": rank,
        "player_name": name,
        "rank_name": "Grandmaster",
        "score": 5000 - rank * 100,
        "matches": 120,
        "player_id": id
    })
}

fn public_player(name: &str, score: f64, teammates: &[&str], matches: &[&str]) -> Value {
    json!({
        "player_name": name,
        "is_profile_private": false,
        "stats": {
            "rank": {"score": score},
            "total_matches": 120,
            "total_wins": 70
        },
        "teammates": teammates.iter().map(|t| json!({"player_uid": t})).collect::<Vec<_>>(),
        "match_history": matches.iter().map(|m| json!({"match_uid": m})).collect::<Vec<_>>()
    })
}

fn match_detail(match_uid: &str, players: &[(&str, &str)]) -> Value {
    json!({
        "match_details": {
            "match_uid": match_uid,
            "replay_id": format!("replay-{}", match_uid),
            "game_mode_id": 2,
            "match_players": players.iter().map(|(uid, name)| json!({
                "player_uid": uid,
                "nick_name": name,
                "cur_hero_id": 1011,
                "is_win": 1,
                "kills": 10,
                "deaths": 4,
                "assists": 6,
                "total_hero_damage": 12000.0,
                "total_hero_heal": 0,
                "total_damage_taken": 8000,
                "player_heroes": [
                    {"hero_id": 1011, "play_time": 600.0, "kills": 10, "deaths": 4, "assists": 6}
                ]
            })).collect::<Vec<_>>()
        }
    })
}

async fn mount_json(server: &MockServer, route: &str, body: Value) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

/// Mounts the standard two-player world: public A with one teammate and one
/// match, private B
async fn mount_two_player_world(server: &MockServer) {
    mount_json(
        server,
        "/leaderboard",
        json!([
            leaderboard_entry(1, "Alpha", "100"),
            leaderboard_entry(2, "Bravo", "200")
        ]),
    )
    .await;
    mount_json(
        server,
        "/player/100",
        public_player("Alpha", 4200.0, &["300"], &["m-1"]),
    )
    .await;
    mount_json(server, "/player/200", json!({"is_profile_private": true})).await;
    // The teammate lists further players and matches; none may be followed
    mount_json(
        server,
        "/player/300",
        public_player("Charlie", 3900.0, &["400"], &["m-2"]),
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/player/400"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(0)
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/match/m-2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(0)
        .mount(server)
        .await;
}

fn memory_coordinator(
    server: &MockServer,
    memory: &Arc<Mutex<MemorySink>>,
    ledger: Arc<CrawlLedger>,
    sleeper: Arc<RecordingSleeper>,
) -> Coordinator {
    let sink: SharedSink = memory.clone();
    Coordinator::new(create_test_config(&server.uri(), ":memory:"), ledger, sink)
        .expect("Failed to build coordinator")
        .with_sleeper(sleeper)
        .with_config_hash("integration")
}

#[tokio::test]
async fn test_two_player_crawl() {
    let server = MockServer::start().await;
    mount_two_player_world(&server).await;
    Mock::given(method("GET"))
        .and(path("/match/m-1"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(match_detail("m-1", &[("100", "Alpha"), ("300", "Charlie")])),
        )
        .expect(1)
        .mount(&server)
        .await;

    let memory = Arc::new(Mutex::new(MemorySink::new()));
    let summary = memory_coordinator(
        &server,
        &memory,
        Arc::new(CrawlLedger::new()),
        Arc::new(RecordingSleeper::new()),
    )
    .run()
    .await
    .expect("Crawl failed");

    assert_eq!(summary.status, RunStatus::Completed);
    assert_eq!(summary.counts.seeds, 2);
    assert_eq!(summary.counts.players_resolved, 2);
    assert_eq!(summary.counts.private_players, 1);
    assert_eq!(summary.counts.matches_resolved, 1);
    assert_eq!(summary.counts.entities_failed, 0);
    // leaderboard + 3 players + 1 match
    assert_eq!(summary.requests, 5);

    let sink = memory.lock().unwrap();

    let rows = sink.leaderboard_rows();
    assert_eq!(rows.len(), 2);
    let alpha = rows.iter().find(|r| r.entry.player_id == "100").unwrap();
    let bravo = rows.iter().find(|r| r.entry.player_id == "200").unwrap();
    assert_eq!(alpha.rank_score, Some(4200.0));
    assert_eq!(bravo.rank_score, None);
    assert_eq!(bravo.rank_score_display(), "N/A");

    let encountered = sink.encountered_players();
    assert_eq!(encountered.len(), 1);
    assert_eq!(encountered[0].player_uid, "300");
    assert_eq!(encountered[0].highest_score, 3900.0);

    assert_eq!(sink.match_summaries().len(), 1);
    assert_eq!(sink.match_summaries()[0].match_uid, "m-1");
    assert_eq!(sink.match_player_records().len(), 2);
    assert_eq!(sink.match_player_records()[0].heroes.len(), 1);

    assert_eq!(sink.runs().len(), 1);
    assert_eq!(sink.runs()[0].status, RunStatus::Completed);
}

#[tokio::test]
async fn test_teammate_match_expansion_flag() {
    let server = MockServer::start().await;
    mount_json(
        &server,
        "/leaderboard",
        json!([leaderboard_entry(1, "Alpha", "100")]),
    )
    .await;
    mount_json(
        &server,
        "/player/100",
        public_player("Alpha", 4200.0, &["300"], &["m-1"]),
    )
    .await;
    mount_json(
        &server,
        "/player/300",
        public_player("Charlie", 3900.0, &["100"], &["m-1", "m-2"]),
    )
    .await;
    mount_json(&server, "/match/m-1", match_detail("m-1", &[("100", "Alpha")])).await;
    Mock::given(method("GET"))
        .and(path("/match/m-2"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(match_detail("m-2", &[("300", "Charlie")])),
        )
        .expect(1)
        .mount(&server)
        .await;

    let mut config = create_test_config(&server.uri(), ":memory:");
    config.crawler.expand_teammate_matches = true;

    let memory = Arc::new(Mutex::new(MemorySink::new()));
    let sink: SharedSink = memory.clone();
    let summary = Coordinator::new(config, Arc::new(CrawlLedger::new()), sink)
        .unwrap()
        .with_sleeper(Arc::new(RecordingSleeper::new()))
        .run()
        .await
        .unwrap();

    assert_eq!(summary.counts.matches_resolved, 2);
    let sink = memory.lock().unwrap();
    let mut uids: Vec<_> = sink
        .match_summaries()
        .iter()
        .map(|m| m.match_uid.as_str())
        .collect();
    uids.sort();
    assert_eq!(uids, vec!["m-1", "m-2"]);
}

#[tokio::test]
async fn test_player_500_treated_as_private_without_retry() {
    let server = MockServer::start().await;
    mount_json(
        &server,
        "/leaderboard",
        json!([leaderboard_entry(1, "Alpha", "100")]),
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/player/100"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let memory = Arc::new(Mutex::new(MemorySink::new()));
    let sleeper = Arc::new(RecordingSleeper::new());
    let summary = memory_coordinator(
        &server,
        &memory,
        Arc::new(CrawlLedger::new()),
        sleeper.clone(),
    )
    .run()
    .await
    .unwrap();

    assert_eq!(summary.status, RunStatus::Completed);
    assert_eq!(summary.counts.private_players, 1);
    assert_eq!(summary.counts.entities_failed, 0);
    assert_eq!(summary.retries, 0);
    assert!(sleeper.recorded().is_empty());

    let sink = memory.lock().unwrap();
    assert_eq!(sink.leaderboard_rows().len(), 1);
    assert!(sink.leaderboard_rows()[0].rank_score.is_none());
}

#[tokio::test]
async fn test_rate_limited_player_retried_beyond_budget() {
    let server = MockServer::start().await;
    mount_json(
        &server,
        "/leaderboard",
        json!([leaderboard_entry(1, "Alpha", "100")]),
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/player/100"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "3"))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    mount_json(
        &server,
        "/player/100",
        public_player("Alpha", 4200.0, &[], &[]),
    )
    .await;

    let mut config = create_test_config(&server.uri(), ":memory:");
    config.crawler.max_attempts = 1;

    let memory = Arc::new(Mutex::new(MemorySink::new()));
    let sink: SharedSink = memory.clone();
    let sleeper = Arc::new(RecordingSleeper::new());
    let summary = Coordinator::new(config, Arc::new(CrawlLedger::new()), sink)
        .unwrap()
        .with_sleeper(sleeper.clone())
        .run()
        .await
        .unwrap();

    assert_eq!(summary.counts.players_resolved, 1);
    assert_eq!(summary.rate_limited_waits, 2);
    assert_eq!(
        sleeper.recorded(),
        vec![Duration::from_secs(3), Duration::from_secs(3)]
    );

    let sink = memory.lock().unwrap();
    assert_eq!(sink.leaderboard_rows()[0].rank_score, Some(4200.0));
}

#[tokio::test]
async fn test_rerun_against_seeded_history_fetches_no_known_matches() {
    let server = MockServer::start().await;
    mount_two_player_world(&server).await;
    Mock::given(method("GET"))
        .and(path("/match/m-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(0)
        .mount(&server)
        .await;

    let memory = Arc::new(Mutex::new(MemorySink::with_matches(["m-1"])));
    let ledger = Arc::new(CrawlLedger::new());
    let seen = memory.lock().unwrap().seen_match_ids().unwrap();
    assert_eq!(ledger.seed(EntityKind::Match, seen), 1);

    let summary = memory_coordinator(
        &server,
        &memory,
        ledger.clone(),
        Arc::new(RecordingSleeper::new()),
    )
    .run()
    .await
    .unwrap();

    assert_eq!(summary.counts.matches_resolved, 0);
    assert_eq!(summary.counts.match_player_rows, 0);
    assert!(summary.counts.duplicates_skipped >= 1);
    assert!(ledger.is_claimed(EntityKind::Player, "300"));

    let sink = memory.lock().unwrap();
    assert!(sink.match_player_records().is_empty());
    assert_eq!(sink.match_summaries().len(), 1);
}

#[tokio::test]
async fn test_leaderboard_failure_is_root_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/leaderboard"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .mount(&server)
        .await;

    let memory = Arc::new(Mutex::new(MemorySink::new()));
    let result = memory_coordinator(
        &server,
        &memory,
        Arc::new(CrawlLedger::new()),
        Arc::new(RecordingSleeper::new()),
    )
    .run()
    .await;

    match result {
        Err(CrawlError::RootFailure { url, .. }) => assert!(url.ends_with("/leaderboard")),
        other => panic!("Expected RootFailure, got {:?}", other.map(|s| s.status)),
    }

    let sink = memory.lock().unwrap();
    assert_eq!(sink.runs()[0].status, RunStatus::Failed);
    assert!(sink.leaderboard_rows().is_empty());
    assert!(sink.match_summaries().is_empty());
}

#[tokio::test]
async fn test_deadline_abandons_rate_limited_player() {
    let server = MockServer::start().await;
    mount_json(
        &server,
        "/leaderboard",
        json!([
            leaderboard_entry(1, "Alpha", "100"),
            leaderboard_entry(2, "Bravo", "200")
        ]),
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/player/100"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "30"))
        .expect(1)
        .mount(&server)
        .await;
    mount_json(&server, "/player/200", json!({"is_profile_private": true})).await;

    let mut config = create_test_config(&server.uri(), ":memory:");
    config.crawler.run_timeout_secs = 1;
    config.crawler.max_concurrent_requests = 1;

    let memory = Arc::new(Mutex::new(MemorySink::new()));
    let sink: SharedSink = memory.clone();
    let sleeper = Arc::new(RecordingSleeper::new());
    let summary = Coordinator::new(config, Arc::new(CrawlLedger::new()), sink)
        .unwrap()
        .with_sleeper(sleeper.clone())
        .run()
        .await
        .expect("A run that hits its deadline still completes");

    assert_eq!(summary.status, RunStatus::Interrupted);
    assert_eq!(summary.counts.entities_abandoned, 1);
    assert_eq!(summary.counts.private_players, 1);
    assert_eq!(summary.counts.entities_failed, 0);
    // The 30s wait would outlast the deadline, so it is never slept
    assert!(sleeper.recorded().is_empty());

    let sink = memory.lock().unwrap();
    assert_eq!(sink.leaderboard_rows().len(), 2);
    assert_eq!(sink.runs()[0].status, RunStatus::Interrupted);
}

#[tokio::test]
async fn test_deadline_abandons_queued_seeds() {
    let server = MockServer::start().await;
    mount_json(
        &server,
        "/leaderboard",
        json!([
            leaderboard_entry(1, "Alpha", "100"),
            leaderboard_entry(2, "Bravo", "200")
        ]),
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/player/100"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"is_profile_private": true}))
                .set_delay(Duration::from_millis(1500)),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/player/200"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(0)
        .mount(&server)
        .await;

    let mut config = create_test_config(&server.uri(), ":memory:");
    config.crawler.run_timeout_secs = 1;
    config.crawler.max_concurrent_requests = 1;

    let memory = Arc::new(Mutex::new(MemorySink::new()));
    let sink: SharedSink = memory.clone();
    let summary = Coordinator::new(config, Arc::new(CrawlLedger::new()), sink)
        .unwrap()
        .with_sleeper(Arc::new(RecordingSleeper::new()))
        .run()
        .await
        .unwrap();

    assert_eq!(summary.status, RunStatus::Interrupted);
    assert_eq!(summary.counts.private_players, 1);
    assert_eq!(summary.counts.entities_abandoned, 1);

    let sink = memory.lock().unwrap();
    assert_eq!(sink.leaderboard_rows().len(), 1);
    assert_eq!(sink.leaderboard_rows()[0].entry.player_id, "100");
}

#[tokio::test]
async fn test_sqlite_history_across_runs() {
    let server = MockServer::start().await;
    mount_two_player_world(&server).await;
    Mock::given(method("GET"))
        .and(path("/match/m-1"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(match_detail("m-1", &[("100", "Alpha"), ("300", "Charlie")])),
        )
        .expect(1)
        .mount(&server)
        .await;

    let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let db_path = temp_dir.path().join("history").join("history.db");
    let config = create_test_config(&server.uri(), db_path.to_str().unwrap());

    let first = run_crawl(config.clone(), "hash-1", false)
        .await
        .expect("First crawl failed");
    assert_eq!(first.status, RunStatus::Completed);
    assert_eq!(first.counts.matches_recorded, 1);

    let second = run_crawl(config, "hash-1", false)
        .await
        .expect("Second crawl failed");
    assert_eq!(second.status, RunStatus::Completed);
    assert_eq!(second.counts.matches_resolved, 0);
    assert_eq!(second.counts.leaderboard_rows, 2);

    let history = SqliteSink::new(Path::new(&db_path)).unwrap();
    let counts = history.history_counts().unwrap();
    assert_eq!(counts.runs, 2);
    assert_eq!(counts.leaderboard_rows, 4);
    assert_eq!(counts.encountered_players, 1);
    assert_eq!(counts.matches, 1);
    assert_eq!(counts.match_players, 2);
    assert_eq!(counts.match_player_heroes, 2);
    assert_eq!(history.captures().unwrap().len(), 2);

    let charlie = history.encountered_player("300").unwrap().unwrap();
    assert_eq!(charlie.observations, 2);
    assert_eq!(charlie.highest_score, 3900.0);

    let latest = history.latest_run().unwrap().unwrap();
    assert_eq!(latest.status, RunStatus::Completed);
    assert_eq!(latest.config_hash, "hash-1");
}

#[tokio::test]
async fn test_sqlite_root_failure_records_failed_run() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/leaderboard"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let temp_dir = tempfile::tempdir().unwrap();
    let db_path = temp_dir.path().join("history.db");
    let config = create_test_config(&server.uri(), db_path.to_str().unwrap());

    let result = run_crawl(config, "hash", false).await;
    assert!(matches!(result, Err(CrawlError::RootFailure { .. })));

    let history = SqliteSink::new(&db_path).unwrap();
    let latest = history.latest_run().unwrap().unwrap();
    assert_eq!(latest.status, RunStatus::Failed);
    assert_eq!(history.history_counts().unwrap().leaderboard_rows, 0);
}
