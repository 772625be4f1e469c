//! Wire-level tests for the portal client against a mock portal.

use portalkeeper_core::portal::{
    Authenticator, ConfigSource, ConnectivityProber, Deauthenticator, SpeedTester,
};
use portalkeeper_core::{
    Credential, EventBus, LoginOutcome, MemoryStore, Orchestrator, PortalClient, PortalConfig,
    SpeedResult, StateStore,
};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SIGNED_IN: &str = r#"<?xml version="1.0" encoding="UTF-8"?><requestresponse><status><![CDATA[LIVE]]></status><message><![CDATA[You are signed in as {username}]]></message></requestresponse>"#;
const REJECTED: &str = r#"<?xml version="1.0" encoding="UTF-8"?><requestresponse><status><![CDATA[LOGIN]]></status><message><![CDATA[Login failed. Invalid user name/password. Please contact the administrator.]]></message></requestresponse>"#;

/// Nothing listens here; connections are refused immediately
const DEAD_URL: &str = "http://127.0.0.1:1";

fn client_for(server: &MockServer) -> PortalClient {
    let mut config = PortalConfig::for_portal(&server.uri(), ConfigSource::Default);
    config.probe_url = format!("{}/generate_204", server.uri());
    config.speed_test_url = format!("{}/10MB.bin", server.uri());
    PortalClient::new(config).unwrap()
}

#[tokio::test]
async fn test_login_success_submits_form() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/httpclient.html"))
        .and(body_string_contains("mode=191"))
        .and(body_string_contains("username=alice"))
        .and(body_string_contains("password=s3cret"))
        .respond_with(ResponseTemplate::new(200).set_body_string(SIGNED_IN))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let outcome = client.login(&Credential::new("alice", "s3cret")).await;
    assert_eq!(outcome, LoginOutcome::Success);

    let requests = server.received_requests().await.unwrap();
    let body = String::from_utf8(requests[0].body.clone()).unwrap();
    let stamp = body
        .split('&')
        .find_map(|pair| pair.strip_prefix("a="))
        .expect("timestamp field");
    assert!(stamp.len() >= 13 && stamp.chars().all(|c| c.is_ascii_digit()));
    assert_eq!(
        requests[0].headers.get("content-type").unwrap(),
        "application/x-www-form-urlencoded"
    );
}

#[tokio::test]
async fn test_login_rejected_message_is_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/httpclient.html"))
        .respond_with(ResponseTemplate::new(200).set_body_string(REJECTED))
        .mount(&server)
        .await;

    let outcome = client_for(&server).login(&Credential::new("bob", "nope")).await;
    assert_eq!(outcome, LoginOutcome::Failure);
}

#[tokio::test]
async fn test_login_http_error_is_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/httpclient.html"))
        .respond_with(ResponseTemplate::new(500).set_body_string(SIGNED_IN))
        .mount(&server)
        .await;

    let outcome = client_for(&server).login(&Credential::new("bob", "pw")).await;
    assert_eq!(outcome, LoginOutcome::Failure);
}

#[tokio::test]
async fn test_login_transport_error_is_failure() {
    let client = PortalClient::new(PortalConfig::for_portal(DEAD_URL, ConfigSource::Default)).unwrap();
    let outcome = client.login(&Credential::new("bob", "pw")).await;
    assert_eq!(outcome, LoginOutcome::Failure);
}

#[tokio::test]
async fn test_logout_submits_form() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/logout.xml"))
        .and(body_string_contains("mode=193"))
        .and(body_string_contains("username=alice"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<requestresponse/>"))
        .expect(1)
        .mount(&server)
        .await;

    client_for(&server).logout("alice").await.unwrap();
}

#[tokio::test]
async fn test_logout_transport_error_is_reported() {
    let client = PortalClient::new(PortalConfig::for_portal(DEAD_URL, ConfigSource::Default)).unwrap();
    assert!(client.logout("alice").await.is_err());
}

#[tokio::test]
async fn test_probe_reachable_regardless_of_content() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/generate_204"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    assert!(client_for(&server).is_reachable().await);
}

#[tokio::test]
async fn test_probe_unreachable_on_refused_connection() {
    let mut config = PortalConfig::default();
    config.probe_url = format!("{}/generate_204", DEAD_URL);
    assert!(!PortalClient::new(config).unwrap().is_reachable().await);
}

#[tokio::test]
async fn test_probe_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/generate_204"))
        .respond_with(ResponseTemplate::new(204).set_delay(Duration::from_secs(5)))
        .mount(&server)
        .await;

    assert!(!client_for(&server).is_reachable().await);
}

#[tokio::test]
async fn test_speed_test_measures_slow_transfer() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/10MB.bin"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(vec![0u8; 1024])
                .set_delay(Duration::from_millis(250)),
        )
        .mount(&server)
        .await;

    let result = client_for(&server).measure_speed().await;
    assert!(matches!(result, SpeedResult::Measured { mbps } if mbps > 0.0));
    assert!(result.to_string().ends_with(" Mbps"));
}

#[tokio::test]
async fn test_speed_test_http_error_fails() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/10MB.bin"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    assert_eq!(client_for(&server).measure_speed().await, SpeedResult::Failed);
}

#[tokio::test]
async fn test_cycle_logs_in_against_portal() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/httpclient.html"))
        .and(body_string_contains("username=bob"))
        .respond_with(ResponseTemplate::new(200).set_body_string(SIGNED_IN))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/httpclient.html"))
        .respond_with(ResponseTemplate::new(200).set_body_string(REJECTED))
        .mount(&server)
        .await;

    let mut config = PortalConfig::for_portal(&server.uri(), ConfigSource::Default);
    config.probe_url = format!("{}/generate_204", DEAD_URL);
    let client = Arc::new(PortalClient::new(config).unwrap());

    let store = Arc::new(MemoryStore::with_credentials(vec![
        Credential::new("alice", "1"),
        Credential::new("bob", "2"),
    ]));
    let orchestrator = Orchestrator::with_portal(store.clone(), client, EventBus::new());
    orchestrator.start().await.unwrap();

    let state = store.get_session_state().unwrap();
    assert!(state.running);
    assert_eq!(state.status, "Connected with ID 2 (bob)");
    assert_eq!(state.last_good_index, Some(1));

    // Still behind the portal: the next tick resumes from bob, who is accepted straight away.
    let before = server.received_requests().await.unwrap().len();
    orchestrator.run_cycle().await;
    assert_eq!(server.received_requests().await.unwrap().len(), before + 1);
}
