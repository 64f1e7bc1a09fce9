use std::path::PathBuf;
use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::Request;
use shopdir_core::{parse_regions, AppConfig, Environment, ProgressKey, ProgressStore};
use shopdir_scraper::{MemoryStores, NoopNotifier};
use tower::ServiceExt;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::*;

fn test_config() -> AppConfig {
    AppConfig {
        database_url: None,
        env: Environment::Test,
        bind_addr: "127.0.0.1:0".parse().expect("addr"),
        log_level: "info".to_string(),
        regions_path: PathBuf::from("./config/regions.yaml"),
        target_regions: Vec::new(),
        db_max_connections: 1,
        db_min_connections: 1,
        db_acquire_timeout_secs: 1,
        scraper_request_timeout_secs: 5,
        scraper_user_agent: "shopdir-test".to_string(),
        scraper_max_retries: 0,
        scraper_retry_backoff_base_ms: 0,
        batch_size: 100,
        run_timeout_secs: None,
        geocoding_enabled: false,
        google_maps_api_key: None,
        geocoding_rate_limit: 10,
        geocode_not_found_ttl_hours: 24,
        geocode_found_ttl_days: None,
        slack_webhook_url: None,
        slack_channel: None,
        api_keys: Vec::new(),
        scrape_schedule: Vec::new(),
    }
}

fn regions_yaml(uri: &str) -> String {
    format!(
        r#"
regions:
  - code: "08"
    name: Ibaraki
    base_url: {uri}
    list_url: "{uri}/list?page={{page}}"
    detail_link_pattern: 'href="(/shop/\d+)"'
    source_id_pattern: '/shop/(\d+)'
    pagination:
      mode: fixed
      start_page: 1
      end_page: 2
    rate_limit:
      min_wait_ms: 0
      max_wait_ms: 0
    parser:
      kind: pattern
      pattern: '<h1>(?P<name>[^<]+)</h1>.*?<p class="addr">(?P<address>[^<]+)</p>'
"#
    )
}

struct Harness {
    app: Router,
    memory: MemoryStores,
}

fn harness(server: &MockServer, auth: AuthState) -> Harness {
    let regions = parse_regions(&regions_yaml(&server.uri())).expect("regions");
    let memory = MemoryStores::new(100);
    let runner = ScrapeRunner::new(
        Arc::new(test_config()),
        Arc::new(regions),
        memory.stores(),
        Arc::new(NoopNotifier),
    );
    let state = AppState {
        pool: None,
        runner: Arc::new(runner),
    };
    Harness {
        app: build_app(state, auth),
        memory,
    }
}

async fn mount_list(server: &MockServer, page: u32, body: String, status: u16) {
    Mock::given(method("GET"))
        .and(path("/list"))
        .and(query_param("page", page.to_string()))
        .respond_with(ResponseTemplate::new(status).set_body_string(body))
        .mount(server)
        .await;
}

async fn mount_shop(server: &MockServer, id: u32, name: &str) {
    Mock::given(method("GET"))
        .and(path(format!("/shop/{id}")))
        .respond_with(ResponseTemplate::new(200).set_body_string(format!(
            "<h1>{name}</h1><p class=\"addr\">茨城県水戸市{id}</p>"
        )))
        .mount(server)
        .await;
}

async fn send(app: &Router, method: &str, uri: &str) -> (StatusCode, serde_json::Value) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method(method)
                .uri(uri)
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body bytes");
    let json = serde_json::from_slice(&body).expect("json parse");
    (status, json)
}

#[test]
fn normalize_limit_applies_defaults_and_bounds() {
    assert_eq!(normalize_limit(None), 20);
    assert_eq!(normalize_limit(Some(0)), 1);
    assert_eq!(normalize_limit(Some(1_000)), 200);
    assert_eq!(normalize_limit(Some(25)), 25);
}

#[test]
fn api_error_conflict_maps_to_409() {
    let response = ApiError::new("req-1", "conflict", "busy").into_response();
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn health_without_database_reports_disabled() {
    let server = MockServer::start().await;
    let h = harness(&server, AuthState::disabled());

    let (status, json) = send(&h.app, "GET", "/api/v1/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["database"], "disabled");
    assert!(json["meta"]["request_id"].as_str().is_some());
}

#[tokio::test]
async fn protected_routes_require_a_bearer_token() {
    let server = MockServer::start().await;
    let auth = AuthState::from_keys(&["secret".to_string()], false).expect("auth");
    let h = harness(&server, auth);

    let (status, json) = send(&h.app, "GET", "/api/v1/regions").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["error"]["code"], "unauthorized");

    let response = h
        .app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/v1/regions")
                .header("authorization", "Bearer secret")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn lists_configured_regions() {
    let server = MockServer::start().await;
    let h = harness(&server, AuthState::disabled());

    let (status, json) = send(&h.app, "GET", "/api/v1/regions").await;

    assert_eq!(status, StatusCode::OK);
    let regions = json["data"].as_array().expect("data array");
    assert_eq!(regions.len(), 1);
    assert_eq!(regions[0]["code"], "08");
    assert_eq!(regions[0]["pagination"], "fixed");
    assert_eq!(regions[0]["parser"], "pattern");
    assert_eq!(regions[0]["running"], false);
}

#[tokio::test]
async fn scraping_an_unknown_region_is_not_found() {
    let server = MockServer::start().await;
    let h = harness(&server, AuthState::disabled());

    let (status, json) = send(&h.app, "POST", "/api/v1/scrape/99").await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["error"]["code"], "not_found");
}

#[tokio::test]
async fn zero_page_budget_is_rejected() {
    let server = MockServer::start().await;
    let h = harness(&server, AuthState::disabled());

    let (status, json) = send(&h.app, "POST", "/api/v1/scrape/08?max_pages=0").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"]["code"], "validation_error");
}

#[tokio::test]
async fn successful_scrape_returns_summary_and_records_history() {
    let server = MockServer::start().await;
    mount_list(&server, 1, r#"<a href="/shop/1">a</a><a href="/shop/2">b</a>"#.to_string(), 200).await;
    mount_list(&server, 2, String::new(), 200).await;
    mount_shop(&server, 1, "水戸ベーカリー").await;
    mount_shop(&server, 2, "つくば書店").await;
    let h = harness(&server, AuthState::disabled());

    let (status, json) = send(&h.app, "POST", "/api/v1/scrape/08").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["run"]["status"], "success");
    assert_eq!(json["data"]["run"]["trigger"], "api");
    assert_eq!(json["data"]["run"]["counts"]["records_written"], 2);
    assert!(json["data"]["warnings"].as_array().expect("warnings").is_empty());
    assert_eq!(h.memory.records.len(), 2);

    let (status, json) = send(&h.app, "GET", "/api/v1/runs?region=08").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"].as_array().expect("runs").len(), 1);
}

#[tokio::test]
async fn failed_detail_page_is_a_partial_failure_with_warnings() {
    let server = MockServer::start().await;
    mount_list(&server, 1, r#"<a href="/shop/1">a</a><a href="/shop/2">b</a>"#.to_string(), 200).await;
    mount_list(&server, 2, String::new(), 200).await;
    mount_shop(&server, 1, "水戸ベーカリー").await;
    Mock::given(method("GET"))
        .and(path("/shop/2"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    let h = harness(&server, AuthState::disabled());

    let (status, json) = send(&h.app, "POST", "/api/v1/scrape/08").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["run"]["status"], "partial_failure");
    let warnings = json["data"]["warnings"].as_array().expect("warnings");
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].as_str().expect("warning").contains("/shop/2"));

    let (_, json) = send(&h.app, "GET", "/api/v1/progress/08").await;
    assert!(json["data"]["progress"].is_object());
}

#[tokio::test]
async fn failed_run_returns_500_with_summary() {
    let server = MockServer::start().await;
    mount_list(&server, 1, String::new(), 500).await;
    let h = harness(&server, AuthState::disabled());

    let (status, json) = send(&h.app, "POST", "/api/v1/scrape/08").await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["data"]["run"]["status"], "failed");
    assert!(json["data"]["run"]["fatal_error"]
        .as_str()
        .expect("fatal error")
        .contains("list page 1"));
}

#[tokio::test]
async fn progress_can_be_read_and_cleared() {
    let server = MockServer::start().await;
    let h = harness(&server, AuthState::disabled());

    let (status, json) = send(&h.app, "GET", "/api/v1/progress/08").await;
    assert_eq!(status, StatusCode::OK);
    assert!(json["data"]["progress"].is_null());

    let progress = shopdir_core::Progress {
        last_completed_page: 4,
        empty_page_streak: 0,
        pending: Vec::new(),
        records_written: 12,
        revision: 0,
        updated_at: chrono::Utc::now(),
    };
    h.memory
        .progress
        .save(&ProgressKey::scrape("08"), &progress, None)
        .await
        .expect("seed progress");

    let (_, json) = send(&h.app, "GET", "/api/v1/progress/08").await;
    assert_eq!(json["data"]["progress"]["last_completed_page"], 4);

    let (status, json) = send(&h.app, "DELETE", "/api/v1/progress/08").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["cleared"], true);
    assert!(h.memory.progress.snapshot(&ProgressKey::scrape("08")).is_none());

    let (status, _) = send(&h.app, "DELETE", "/api/v1/progress/99").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
