//! Integration tests for the Slack run notifier.

use shopdir_core::{Notifier, RunEvent};
use shopdir_scraper::SlackNotifier;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn slack_notifier_posts_run_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/hook"))
        .and(body_string_contains("Ibaraki (08)"))
        .and(body_string_contains("\"channel\":\"#scrapes\""))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .expect(1)
        .mount(&server)
        .await;

    let notifier = SlackNotifier::new(
        &format!("{}/hook", server.uri()),
        Some("#scrapes".to_string()),
    )
    .unwrap();
    notifier
        .notify(&RunEvent::Started {
            region_code: "08".to_string(),
            region_name: "Ibaraki".to_string(),
            resume_page: 1,
        })
        .await
        .unwrap();
}

#[tokio::test]
async fn slack_notifier_reports_webhook_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/hook"))
        .respond_with(ResponseTemplate::new(404).set_body_string("no_service"))
        .mount(&server)
        .await;

    let notifier = SlackNotifier::new(&format!("{}/hook", server.uri()), None).unwrap();
    let result = notifier
        .notify(&RunEvent::Started {
            region_code: "08".to_string(),
            region_name: "Ibaraki".to_string(),
            resume_page: 1,
        })
        .await;
    assert!(result.is_err());
}
