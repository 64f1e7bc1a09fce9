//! Integration tests for `RateLimitedFetcher` using wiremock HTTP mocks.

use shopdir_scraper::{FetchError, FetchRequest, FetcherConfig, RateLimitedFetcher, RequestPacer};
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config(max_retries: u32, allowed_statuses: Vec<u16>) -> FetcherConfig {
    FetcherConfig {
        timeout_secs: 5,
        user_agent: "shopdir-test".to_string(),
        max_retries,
        backoff_base_ms: 0,
        allowed_statuses,
        encoding: None,
    }
}

fn fetcher(max_retries: u32, allowed_statuses: Vec<u16>) -> RateLimitedFetcher {
    RateLimitedFetcher::new(&config(max_retries, allowed_statuses), RequestPacer::unpaced())
        .expect("fetcher construction should not fail")
}

/// `<meta charset="Shift_JIS"><h1>茨城県水戸市</h1>` with no charset in the
/// `Content-Type` header.
async fn shift_jis_page(server: &MockServer) {
    let mut body = br#"<html><meta charset="Shift_JIS"><h1>"#.to_vec();
    body.extend_from_slice(&[136, 239, 143, 233, 140, 167, 144, 133, 140, 203, 142, 115]);
    body.extend_from_slice(b"</h1></html>");
    Mock::given(method("GET"))
        .and(path("/sjis"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/html"))
        .mount(server)
        .await;
}

#[tokio::test]
async fn returns_body_and_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/list"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>ok</html>"))
        .mount(&server)
        .await;

    let url = format!("{}/list", server.uri());
    let response = fetcher(0, Vec::new())
        .fetch(&FetchRequest::get(&url))
        .await
        .unwrap();
    assert_eq!(response.status, 200);
    assert_eq!(response.body, "<html>ok</html>");
    assert_eq!(response.final_url, url);
}

#[tokio::test]
async fn retries_server_errors_until_success() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(200).set_body_string("recovered"))
        .expect(1)
        .mount(&server)
        .await;

    let response = fetcher(3, Vec::new())
        .fetch(&FetchRequest::get(format!("{}/flaky", server.uri())))
        .await
        .unwrap();
    assert_eq!(response.body, "recovered");
}

#[tokio::test]
async fn server_error_surfaces_after_retries() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/down"))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&server)
        .await;

    let err = fetcher(2, Vec::new())
        .fetch(&FetchRequest::get(format!("{}/down", server.uri())))
        .await
        .unwrap_err();
    assert!(matches!(err, FetchError::ServerError { status: 500, .. }));
}

#[tokio::test]
async fn client_error_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let err = fetcher(3, Vec::new())
        .fetch(&FetchRequest::get(format!("{}/missing", server.uri())))
        .await
        .unwrap_err();
    assert!(matches!(err, FetchError::ClientError { status: 404, .. }));
}

#[tokio::test]
async fn allow_listed_status_is_returned() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/expired"))
        .respond_with(ResponseTemplate::new(403).set_body_string("session expired"))
        .expect(1)
        .mount(&server)
        .await;

    let response = fetcher(3, vec![403])
        .fetch(&FetchRequest::get(format!("{}/expired", server.uri())))
        .await
        .unwrap();
    assert_eq!(response.status, 403);
    assert_eq!(response.body, "session expired");
}

#[tokio::test]
async fn posts_form_fields() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/search"))
        .and(body_string_contains("pref=08"))
        .respond_with(ResponseTemplate::new(200).set_body_string("results"))
        .expect(1)
        .mount(&server)
        .await;

    let request = FetchRequest::post_form(
        format!("{}/search", server.uri()),
        vec![("pref".to_string(), "08".to_string())],
    );
    let response = fetcher(0, Vec::new()).fetch(&request).await.unwrap();
    assert_eq!(response.body, "results");
}

#[tokio::test]
async fn configured_encoding_decodes_meta_declared_shift_jis() {
    let server = MockServer::start().await;
    shift_jis_page(&server).await;

    let mut sjis = config(0, Vec::new());
    sjis.encoding = Some(encoding_rs::SHIFT_JIS);
    let fetcher = RateLimitedFetcher::new(&sjis, RequestPacer::unpaced()).unwrap();

    let response = fetcher
        .fetch(&FetchRequest::get(format!("{}/sjis", server.uri())))
        .await
        .unwrap();
    assert!(response.body.contains("<h1>茨城県水戸市</h1>"), "body: {}", response.body);
}

#[tokio::test]
async fn without_configured_encoding_header_charset_rules() {
    let server = MockServer::start().await;
    shift_jis_page(&server).await;

    let response = fetcher(0, Vec::new())
        .fetch(&FetchRequest::get(format!("{}/sjis", server.uri())))
        .await
        .unwrap();
    assert!(!response.body.contains("茨城"));
}
