//! The Google store against a mocked Calendar API.

use std::time::Duration;

use calsync_core::{CalSyncError, EventTime, RetryPolicy, SyncWindow, TargetStore};
use calsync_provider_google::{GoogleCalendarStore, ServiceAccountKey, TokenSource};
use chrono::{NaiveDate, NaiveDateTime};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const EVENTS_PATH: &str = "/calendars/team%40example.com/events";

fn at(day: u32, h: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 1, day)
        .unwrap()
        .and_hms_opt(h, 0, 0)
        .unwrap()
}

fn window() -> SyncWindow {
    SyncWindow::new(at(1, 7), at(12, 18))
}

fn fast_retry() -> RetryPolicy {
    RetryPolicy::new(3, Duration::from_millis(1), Duration::from_millis(5))
        .unwrap()
        .with_jitter_factor(0.0)
        .unwrap()
}

fn store(server: &MockServer, tokens: TokenSource) -> GoogleCalendarStore {
    GoogleCalendarStore::new(
        reqwest::Client::new(),
        "team@example.com",
        chrono_tz::America::Sao_Paulo,
        tokens,
    )
    .with_api_base(server.uri())
    .with_retry(fast_retry())
}

fn timed(id: &str, summary: &str, start: &str, end: &str) -> serde_json::Value {
    json!({
        "id": id,
        "summary": summary,
        "status": "confirmed",
        "start": { "dateTime": start },
        "end": { "dateTime": end },
    })
}

#[tokio::test]
async fn list_follows_page_tokens_and_skips_cancelled() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(EVENTS_PATH))
        .and(query_param("pageToken", "p2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [timed("b", "Review", "2024-01-03T14:00:00-03:00", "2024-01-03T15:00:00-03:00")],
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path(EVENTS_PATH))
        .and(query_param("singleEvents", "true"))
        .and(query_param("timeMin", "2024-01-01T10:00:00+00:00"))
        .and(header("authorization", "Bearer test-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [
                timed("a", "Standup", "2024-01-01T09:00:00-03:00", "2024-01-01T09:30:00-03:00"),
                { "id": "gone", "status": "cancelled" },
            ],
            "nextPageToken": "p2",
        })))
        .up_to_n_times(1)
        .mount(&server)
        .await;

    let events = store(&server, TokenSource::fixed("test-token"))
        .list_events(&window())
        .await
        .unwrap();

    let ids: Vec<_> = events.iter().filter_map(|e| e.source_id.clone()).collect();
    assert_eq!(ids, vec!["a", "b"]);
    assert!(matches!(events[0].start, EventTime::Absolute(_)));
}

#[tokio::test]
async fn rate_limited_listing_is_retried() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(EVENTS_PATH))
        .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
        .up_to_n_times(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path(EVENTS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "items": [] })))
        .expect(1)
        .mount(&server)
        .await;

    let events = store(&server, TokenSource::fixed("t"))
        .list_events(&window())
        .await
        .unwrap();
    assert!(events.is_empty());
}

#[tokio::test]
async fn forbidden_listing_is_not_retried() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(EVENTS_PATH))
        .respond_with(ResponseTemplate::new(403).set_body_string("forbidden"))
        .expect(1)
        .mount(&server)
        .await;

    let result = store(&server, TokenSource::fixed("t"))
        .list_events(&window())
        .await;
    assert!(matches!(result, Err(CalSyncError::Api { status: 403, .. })));
}

#[tokio::test]
async fn create_sends_local_time_and_returns_the_new_id() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(EVENTS_PATH))
        .and(query_param("sendUpdates", "none"))
        .and(body_partial_json(json!({
            "summary": "Standup",
            "start": { "dateTime": "2024-01-01T09:00:00", "timeZone": "America/Sao_Paulo" },
            "end": { "dateTime": "2024-01-01T10:00:00", "timeZone": "America/Sao_Paulo" },
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "new-1" })))
        .expect(1)
        .mount(&server)
        .await;

    let id = store(&server, TokenSource::fixed("t"))
        .create_event("Standup", at(1, 9), at(1, 10))
        .await
        .unwrap();
    assert_eq!(id, "new-1");
}

#[tokio::test]
async fn deleting_a_missing_event_succeeds() {
    let server = MockServer::start().await;

    Mock::given(method("DELETE"))
        .and(path(format!("{}/gone", EVENTS_PATH)))
        .respond_with(ResponseTemplate::new(410))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path(format!("{}/missing", EVENTS_PATH)))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path(format!("{}/abc", EVENTS_PATH)))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let store = store(&server, TokenSource::fixed("t"));
    store.delete_event("gone").await.unwrap();
    store.delete_event("missing").await.unwrap();
    store.delete_event("abc").await.unwrap();
}

#[tokio::test]
async fn service_account_token_is_fetched_once_and_reused() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "sa-token",
            "expires_in": 3600,
            "token_type": "Bearer",
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path(EVENTS_PATH))
        .and(header("authorization", "Bearer sa-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "items": [] })))
        .expect(2)
        .mount(&server)
        .await;

    let key = ServiceAccountKey::from_json(
        &json!({
            "type": "service_account",
            "client_email": "sync@project.iam.gserviceaccount.com",
            "private_key": include_str!("fixtures/test_service_account.pem"),
            "token_uri": format!("{}/token", server.uri()),
        })
        .to_string(),
    )
    .unwrap();
    let store = store(
        &server,
        TokenSource::service_account(key, reqwest::Client::new()),
    );

    store.list_events(&window()).await.unwrap();
    store.list_events(&window()).await.unwrap();
}

#[tokio::test]
async fn rejected_token_exchange_is_an_auth_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(400).set_body_string("invalid_grant"))
        .mount(&server)
        .await;

    let key = ServiceAccountKey {
        client_email: "sync@project.iam.gserviceaccount.com".into(),
        private_key: include_str!("fixtures/test_service_account.pem").into(),
        token_uri: format!("{}/token", server.uri()),
    };
    let result = store(
        &server,
        TokenSource::service_account(key, reqwest::Client::new()),
    )
    .list_events(&window())
    .await;

    assert!(matches!(result, Err(CalSyncError::Auth(_))));
}

#[tokio::test]
async fn malformed_event_is_skipped_and_the_rest_are_kept() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(EVENTS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [
                timed("bad", "Broken", "not-a-time", "2024-01-01T10:00:00-03:00"),
                timed("ok", "Standup", "2024-01-02T09:00:00-03:00", "2024-01-02T09:30:00-03:00"),
            ],
        })))
        .mount(&server)
        .await;

    let events = store(&server, TokenSource::fixed("t"))
        .list_events(&window())
        .await
        .unwrap();

    let ids: Vec<_> = events.iter().filter_map(|e| e.source_id.clone()).collect();
    assert_eq!(ids, vec!["ok"]);
}

#[tokio::test]
async fn rejected_access_token_is_refreshed_once() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "stale",
            "expires_in": 3600,
        })))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "fresh",
            "expires_in": 3600,
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path(EVENTS_PATH))
        .and(header("authorization", "Bearer stale"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(EVENTS_PATH))
        .and(header("authorization", "Bearer fresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [timed("a", "Standup", "2024-01-01T09:00:00-03:00", "2024-01-01T09:30:00-03:00")],
        })))
        .expect(1)
        .mount(&server)
        .await;

    let key = ServiceAccountKey {
        client_email: "sync@project.iam.gserviceaccount.com".into(),
        private_key: include_str!("fixtures/test_service_account.pem").into(),
        token_uri: format!("{}/token", server.uri()),
    };
    let events = store(
        &server,
        TokenSource::service_account(key, reqwest::Client::new()),
    )
    .list_events(&window())
    .await
    .unwrap();

    assert_eq!(events.len(), 1);
}
