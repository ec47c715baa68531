//! Integration tests for the extractor
//!
//! These tests use wiremock to stand in for a Canvas instance and exercise
//! requests, pagination, hierarchical collection and full runs end-to-end.

use canvas_extract::api::{execute, RetryPolicy, Session};
use canvas_extract::config::Config;
use canvas_extract::extract::Collector;
use canvas_extract::output::FailureStage;
use canvas_extract::storage::{LoadMode, LoadStatus, RunStatus, SqliteStorage, Storage};
use canvas_extract::{run_extraction, Coordinator, Endpoint, ExtractError, FetchError};
use rusqlite::Connection;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Creates a test configuration pointing at the mock server
fn create_test_config(server_uri: &str, db_path: &str) -> Config {
    toml::from_str(&format!(
        r#"
[canvas]
host = "{}"
account-id = "1"
bearer-token = "test-token"
per-page = 2

[retry]
max-attempts = 3
delay-ms = 10
transport-retries = 0
transport-backoff-ms = 1

[extraction]
endpoint-retries = 0
endpoint-retry-delay-ms = 10

[output]
database-path = "{}"
"#,
        server_uri, db_path
    ))
    .expect("valid test config")
}

fn db_path(dir: &TempDir) -> String {
    dir.path().join("canvas.db").to_string_lossy().into_owned()
}

fn session_for(server: &MockServer) -> Arc<Session> {
    let config = create_test_config(&server.uri(), "unused.db");
    Arc::new(Session::new(&config.canvas, &config.retry).expect("session"))
}

fn fast_policy() -> RetryPolicy {
    RetryPolicy::new(3, Duration::from_millis(10))
}

async fn mount_json(server: &MockServer, at: &str, body: Value) {
    Mock::given(method("GET"))
        .and(path(at))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

fn ids(records: &[serde_json::Map<String, Value>]) -> Vec<Value> {
    records.iter().map(|r| r["id"].clone()).collect()
}

#[tokio::test]
async fn test_transient_status_is_retried() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/accounts/1/users"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/accounts/1/users"))
        .and(header("authorization", "Bearer test-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": 1}])))
        .mount(&server)
        .await;

    let session = session_for(&server);
    let url = format!("{}/api/v1/accounts/1/users", server.uri());
    let response = execute(&session, &url, &fast_policy()).await.unwrap();

    assert_eq!(response.status, 200);
    assert_eq!(response.attempts, 3);
    assert_eq!(response.body, json!([{"id": 1}]));
}

#[tokio::test]
async fn test_retries_are_bounded() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&server)
        .await;

    let session = session_for(&server);
    let url = format!("{}/api/v1/accounts/1/users", server.uri());
    let result = execute(&session, &url, &fast_policy()).await;

    assert!(matches!(
        result,
        Err(FetchError::Exhausted { attempts: 3, .. })
    ));
}

#[tokio::test]
async fn test_non_retryable_status_fails_immediately() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let session = session_for(&server);
    let url = format!("{}/api/v1/courses/9/quizzes", server.uri());
    let result = execute(&session, &url, &fast_policy()).await;

    assert!(matches!(result, Err(FetchError::Status { status: 404, .. })));
}

#[tokio::test]
async fn test_pages_are_followed_in_order() {
    let server = MockServer::start().await;
    let base = format!("{}/api/v1/accounts/1/users", server.uri());

    Mock::given(method("GET"))
        .and(path("/api/v1/accounts/1/users"))
        .and(query_param("page", "2"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([{"id": 3}, {"id": 4}]))
                .insert_header(
                    "Link",
                    format!(
                        "<{}?page=3&per_page=2>; rel=\"next\", <{}?page=1&per_page=2>; rel=\"first\"",
                        base, base
                    )
                    .as_str(),
                ),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/accounts/1/users"))
        .and(query_param("page", "3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": 5}])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/accounts/1/users"))
        .and(query_param("per_page", "2"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([
                    {"id": 1, "sis_import_id": 77.0},
                    {"id": 2, "sis_import_id": null}
                ]))
                .insert_header(
                    "Link",
                    format!("<{}?page=2&per_page=2>; rel=\"next\"", base).as_str(),
                ),
        )
        .mount(&server)
        .await;

    let collector = Collector::new(session_for(&server), fast_policy(), 2);
    let users = collector.collect(Endpoint::Users).await.unwrap();

    assert_eq!(
        ids(&users),
        vec![json!("1"), json!("2"), json!("3"), json!("4"), json!("5")]
    );
    assert_eq!(users[0]["sis_import_id"], json!("77"));
    assert_eq!(users[1]["sis_import_id"], Value::Null);
}

#[tokio::test]
async fn test_pagination_cycle_is_an_error() {
    let server = MockServer::start().await;
    let base = format!("{}/api/v1/accounts/1/courses", server.uri());

    Mock::given(method("GET"))
        .and(path("/api/v1/accounts/1/courses"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([{"id": 1}]))
                .insert_header(
                    "Link",
                    format!("<{}?per_page=2&state=available>; rel=\"next\"", base).as_str(),
                ),
        )
        .mount(&server)
        .await;

    let collector = Collector::new(session_for(&server), fast_policy(), 2);
    let result = collector.collect(Endpoint::Courses).await;

    assert!(matches!(
        result,
        Err(ExtractError::Fetch(FetchError::PaginationCycle { .. }))
    ));
}

#[tokio::test]
async fn test_per_course_records_are_stamped() {
    let server = MockServer::start().await;

    mount_json(
        &server,
        "/api/v1/accounts/1/courses",
        json!([{"id": 1, "name": "Biology"}, {"id": 2, "name": "Chemistry"}]),
    )
    .await;
    mount_json(
        &server,
        "/api/v1/courses/1/quizzes",
        json!([{"id": 10.0, "title": "Cells"}, {"id": 11, "title": "Genes"}]),
    )
    .await;
    mount_json(
        &server,
        "/api/v1/courses/2/quizzes",
        json!([{"id": 20, "title": "Atoms", "course_id": 999}]),
    )
    .await;

    let collector = Collector::new(session_for(&server), fast_policy(), 2);
    let quizzes = collector.collect(Endpoint::Quizzes).await.unwrap();

    assert_eq!(ids(&quizzes), vec![json!("10"), json!("11"), json!("20")]);
    let courses: Vec<_> = quizzes.iter().map(|q| q["course_id"].clone()).collect();
    assert_eq!(courses, vec![json!("1"), json!("1"), json!("2")]);
}

#[tokio::test]
async fn test_two_level_records_carry_both_ids() {
    let server = MockServer::start().await;

    mount_json(&server, "/api/v1/accounts/1/courses", json!([{"id": 1}, {"id": 2}])).await;
    mount_json(&server, "/api/v1/courses/1/quizzes", json!([{"id": 10}])).await;
    mount_json(&server, "/api/v1/courses/2/quizzes", json!([{"id": 20}, {"id": 21}])).await;
    mount_json(
        &server,
        "/api/v1/courses/1/quizzes/10/submissions",
        json!({"quiz_submissions": [{"id": 100, "score": 4.5}], "quizzes": []}),
    )
    .await;
    mount_json(
        &server,
        "/api/v1/courses/2/quizzes/20/submissions",
        json!({"quiz_submissions": [{"id": 200}, {"id": 201}]}),
    )
    .await;
    mount_json(
        &server,
        "/api/v1/courses/2/quizzes/21/submissions",
        json!({"quiz_submissions": []}),
    )
    .await;

    let collector = Collector::new(session_for(&server), fast_policy(), 2);
    let submissions = collector.collect(Endpoint::QuizSubmissions).await.unwrap();

    assert_eq!(ids(&submissions), vec![json!("100"), json!("200"), json!("201")]);
    let stamps: Vec<_> = submissions
        .iter()
        .map(|s| (s["course_id"].clone(), s["quiz_id"].clone()))
        .collect();
    assert_eq!(
        stamps,
        vec![
            (json!("1"), json!("10")),
            (json!("2"), json!("20")),
            (json!("2"), json!("20")),
        ]
    );
    assert_eq!(submissions[0]["score"], json!(4.5));
}

#[tokio::test]
async fn test_wrapped_submissions_follow_next_page() {
    let server = MockServer::start().await;
    let base = format!("{}/api/v1/courses/1/quizzes/10/submissions", server.uri());

    mount_json(&server, "/api/v1/accounts/1/courses", json!([{"id": 1}])).await;
    mount_json(&server, "/api/v1/courses/1/quizzes", json!([{"id": 10}])).await;
    Mock::given(method("GET"))
        .and(path("/api/v1/courses/1/quizzes/10/submissions"))
        .and(query_param("page", "2"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"quiz_submissions": [{"id": 102}]})),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/courses/1/quizzes/10/submissions"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({
                    "quiz_submissions": [{"id": 100}, {"id": 101}],
                    "quizzes": [{"id": 10}]
                }))
                .insert_header(
                    "Link",
                    format!("<{}?page=2&per_page=2>; rel=\"next\"", base).as_str(),
                ),
        )
        .mount(&server)
        .await;

    let collector = Collector::new(session_for(&server), fast_policy(), 2);
    let submissions = collector.collect(Endpoint::QuizSubmissions).await.unwrap();

    assert_eq!(ids(&submissions), vec![json!("100"), json!("101"), json!("102")]);
    assert!(submissions
        .iter()
        .all(|s| s["course_id"] == json!("1") && s["quiz_id"] == json!("10")));
}

#[tokio::test]
async fn test_discussion_entries_are_flattened() {
    let server = MockServer::start().await;

    mount_json(&server, "/api/v1/accounts/1/courses", json!([{"id": 5}])).await;
    mount_json(
        &server,
        "/api/v1/courses/5/discussion_topics",
        json!([{"id": 7.0, "title": "Intro"}]),
    )
    .await;
    mount_json(
        &server,
        "/api/v1/courses/5/discussion_topics/7/view",
        json!({
            "participants": [{"id": 1}],
            "view": [
                {"id": 1, "message": "<p>hello</p>", "replies": [
                    {"id": 2, "message": "<b>hi</b>", "replies": [
                        {"id": 3, "message": "deep"}
                    ]}
                ]},
                {"id": 4, "message": "second"}
            ]
        }),
    )
    .await;

    let collector = Collector::new(session_for(&server), fast_policy(), 2);
    let entries = collector.collect(Endpoint::DiscussionEntries).await.unwrap();

    assert_eq!(ids(&entries), vec![json!("1"), json!("2"), json!("3"), json!("4")]);
    assert_eq!(entries[0]["message"], json!("hello"));
    assert_eq!(entries[1]["message"], json!("hi"));
    assert!(entries.iter().all(|e| !e.contains_key("replies")));
    assert!(entries
        .iter()
        .all(|e| e["course_id"] == json!("5") && e["topic_id"] == json!("7")));
}

#[tokio::test]
async fn test_failed_endpoint_does_not_abort_run() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    mount_json(
        &server,
        "/api/v1/accounts/1/users",
        json!([{"id": 1, "name": "Ada"}, {"id": 2, "name": "Grace"}]),
    )
    .await;
    mount_json(
        &server,
        "/api/v1/accounts/1/courses",
        json!([{"id": 1, "name": "Biology", "term": {"id": 3, "name": "Fall"}}]),
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/courses/1/quizzes"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let config = create_test_config(&server.uri(), &db_path(&dir));
    let storage = SqliteStorage::new(&dir.path().join("canvas.db")).unwrap();
    let mut coordinator = Coordinator::new(config, storage)
        .unwrap()
        .with_config_hash("test-hash")
        .with_endpoints(&[Endpoint::Users, Endpoint::Courses, Endpoint::Quizzes]);

    let report = coordinator.run(LoadMode::Replace).await.unwrap();

    assert_eq!(report.endpoints_processed(), 2);
    assert_eq!(report.endpoints_attempted(), 3);
    assert_eq!(report.total_records(), 3);
    assert!(!report.is_complete());

    let users = report.result_for(Endpoint::Users).unwrap();
    assert_eq!(users.status, LoadStatus::Saved);
    assert_eq!(users.record_count, 2);

    let failure = report.failure_for(Endpoint::Quizzes).unwrap();
    assert_eq!(failure.stage, FailureStage::Fetch);
    assert!(failure.error.contains("404"));

    let storage = coordinator.storage();
    assert_eq!(storage.count_rows("canvas_users").unwrap(), 2);
    assert_eq!(storage.count_rows("canvas_courses").unwrap(), 1);
    assert!(!storage.table_exists("canvas_quizzes").unwrap());

    let run = storage.get_run(report.run_id).unwrap();
    assert_eq!(run.status, RunStatus::Partial);
    assert_eq!(run.config_hash, "test-hash");
    assert_eq!(storage.get_endpoint_records(report.run_id).unwrap().len(), 3);
}

#[tokio::test]
async fn test_empty_endpoint_writes_nothing() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    mount_json(&server, "/api/v1/accounts/1/users", json!([])).await;

    let config = create_test_config(&server.uri(), &db_path(&dir));
    let storage = SqliteStorage::new(&dir.path().join("canvas.db")).unwrap();
    let mut coordinator = Coordinator::new(config, storage)
        .unwrap()
        .with_endpoints(&[Endpoint::Users]);

    let report = coordinator.run(LoadMode::Replace).await.unwrap();

    assert!(report.is_complete());
    let users = report.result_for(Endpoint::Users).unwrap();
    assert_eq!(users.status, LoadStatus::NoData);
    assert_eq!(users.record_count, 0);
    assert!(!coordinator.storage().table_exists("canvas_users").unwrap());
}

#[tokio::test]
async fn test_fail_mode_reports_load_failure() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    mount_json(&server, "/api/v1/accounts/1/users", json!([{"id": 1}])).await;

    let config = create_test_config(&server.uri(), &db_path(&dir));
    let storage = SqliteStorage::new(&dir.path().join("canvas.db")).unwrap();
    let mut coordinator = Coordinator::new(config, storage)
        .unwrap()
        .with_endpoints(&[Endpoint::Users]);

    let first = coordinator.run(LoadMode::Fail).await.unwrap();
    assert!(first.is_complete());

    let second = coordinator.run(LoadMode::Fail).await.unwrap();
    let failure = second.failure_for(Endpoint::Users).unwrap();
    assert_eq!(failure.stage, FailureStage::Load);
    assert_eq!(coordinator.storage().count_rows("canvas_users").unwrap(), 1);
    assert_eq!(
        coordinator.storage().get_run(second.run_id).unwrap().status,
        RunStatus::Failed
    );
}

#[tokio::test]
async fn test_deadline_aborts_pending_endpoints() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/api/v1/accounts/1/users"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([{"id": 1}]))
                .set_delay(Duration::from_secs(10)),
        )
        .mount(&server)
        .await;

    let mut config = create_test_config(&server.uri(), &db_path(&dir));
    config.extraction.deadline_secs = Some(1);
    let storage = SqliteStorage::new(&dir.path().join("canvas.db")).unwrap();
    let mut coordinator = Coordinator::new(config, storage)
        .unwrap()
        .with_endpoints(&[Endpoint::Users]);

    let report = coordinator.run(LoadMode::Append).await.unwrap();

    let failure = report.failure_for(Endpoint::Users).unwrap();
    assert_eq!(failure.error, "deadline exceeded");
    assert!(report.elapsed < Duration::from_secs(10));
}

#[tokio::test]
async fn test_unreachable_store_fails_before_fetching() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let missing = dir.path().join("no-such-dir").join("canvas.db");
    let config = create_test_config(&server.uri(), &missing.to_string_lossy());

    let result = run_extraction(config, LoadMode::Append).await;

    assert!(matches!(result, Err(ExtractError::StoreUnreachable(_))));
    let received = server.received_requests().await.unwrap_or_default();
    assert!(received.is_empty());
}

#[tokio::test]
async fn test_endpoint_retry_refetches_after_exhaustion() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/api/v1/accounts/1/users"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount_json(&server, "/api/v1/accounts/1/users", json!([{"id": 1}, {"id": 2}])).await;

    let mut config = create_test_config(&server.uri(), &db_path(&dir));
    config.retry.max_attempts = 1;
    config.extraction.endpoint_retries = 1;
    let storage = SqliteStorage::new(&dir.path().join("canvas.db")).unwrap();
    let mut coordinator = Coordinator::new(config, storage)
        .unwrap()
        .with_endpoints(&[Endpoint::Users]);

    let report = coordinator.run(LoadMode::Replace).await.unwrap();

    assert!(report.is_complete());
    assert_eq!(report.result_for(Endpoint::Users).unwrap().record_count, 2);
    let received = server.received_requests().await.unwrap_or_default();
    assert_eq!(received.len(), 2);
}

#[tokio::test]
async fn test_full_run_with_one_failing_endpoint() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/api/v1/accounts/1/users"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    mount_json(
        &server,
        "/api/v1/accounts/1/courses",
        json!([{"id": 1.0, "name": "Biology", "account_id": 1.0, "enrollment_term_id": 3}]),
    )
    .await;
    mount_json(&server, "/api/v1/courses/1/users", json!([{"id": 42, "name": "Ada"}])).await;
    mount_json(&server, "/api/v1/courses/1/quizzes", json!([{"id": 10, "title": "Cells"}])).await;
    mount_json(
        &server,
        "/api/v1/courses/1/quizzes/10/submissions",
        json!({"quiz_submissions": [{"id": 100, "user_id": 42.0}]}),
    )
    .await;
    mount_json(
        &server,
        "/api/v1/courses/1/assignments",
        json!([{"id": 20, "description": "<p>Write an <b>essay</b></p>"}]),
    )
    .await;
    mount_json(
        &server,
        "/api/v1/courses/1/assignments/20/submissions",
        json!([{"id": 200, "user_id": 42.0, "score": 9.5}]),
    )
    .await;
    mount_json(
        &server,
        "/api/v1/courses/1/discussion_topics",
        json!([{"id": 30, "title": "Intro"}]),
    )
    .await;
    mount_json(
        &server,
        "/api/v1/courses/1/discussion_topics/30/view",
        json!({"participants": [], "view": []}),
    )
    .await;

    let config = create_test_config(&server.uri(), &db_path(&dir));
    let storage = SqliteStorage::new(&dir.path().join("canvas.db")).unwrap();
    let mut coordinator = Coordinator::new(config, storage)
        .unwrap()
        .with_config_hash("full-run");

    let report = coordinator.run(LoadMode::Replace).await.unwrap();

    assert_eq!(report.endpoints_attempted(), 9);
    assert_eq!(report.endpoints_processed(), 8);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failure_for(Endpoint::Users).unwrap().stage, FailureStage::Fetch);
    assert_eq!(report.total_records(), 7);
    assert_eq!(
        report.result_for(Endpoint::DiscussionEntries).unwrap().status,
        LoadStatus::NoData
    );
    for endpoint in [
        Endpoint::Courses,
        Endpoint::CourseEnrollment,
        Endpoint::Quizzes,
        Endpoint::QuizSubmissions,
        Endpoint::Assignments,
        Endpoint::AssignmentSubmissions,
        Endpoint::Discussions,
    ] {
        let loaded = report.result_for(endpoint).unwrap();
        assert_eq!((loaded.status, loaded.record_count), (LoadStatus::Saved, 1));
    }

    let storage = coordinator.storage();
    assert_eq!(storage.get_run(report.run_id).unwrap().status, RunStatus::Partial);
    assert_eq!(storage.get_endpoint_records(report.run_id).unwrap().len(), 9);

    let conn = Connection::open(dir.path().join("canvas.db")).unwrap();
    let description: String = conn
        .query_row("SELECT description FROM canvas_assignments", [], |row| row.get(0))
        .unwrap();
    assert_eq!(description, "Write an essay");

    let (kind, user_id): (String, String) = conn
        .query_row(
            "SELECT typeof(user_id), user_id FROM canvas_assignment_submissions",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .unwrap();
    assert_eq!((kind.as_str(), user_id.as_str()), ("text", "42"));

    let (course_id, account_id): (String, String) = conn
        .query_row("SELECT id, account_id FROM canvas_courses", [], |row| {
            Ok((row.get(0)?, row.get(1)?))
        })
        .unwrap();
    assert_eq!((course_id.as_str(), account_id.as_str()), ("1", "1"));

    let stamps: (String, String, String) = conn
        .query_row(
            "SELECT course_id, quiz_id, user_id FROM canvas_quiz_submissions",
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .unwrap();
    assert_eq!(stamps, ("1".to_string(), "10".to_string(), "42".to_string()));
}
