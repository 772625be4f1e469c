use super::config::PortalConfig;
use super::speed::{classify_transfer, SpeedResult, SPEED_TEST_BYTES};
use super::{Authenticator, ConnectivityProber, Deauthenticator, LoginOutcome, SpeedTester};
use crate::auth::Credential;
use anyhow::{Context, Result};
use async_trait::async_trait;
use quick_xml::events::Event as XmlEvent;
use quick_xml::Reader;
use std::time::{Duration, Instant};

const PROBE_TIMEOUT: Duration = Duration::from_secs(3);
const LOGIN_TIMEOUT: Duration = Duration::from_secs(5);
const LOGOUT_TIMEOUT: Duration = Duration::from_secs(5);
const SPEED_TEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Portal form `mode` for a login submission
const MODE_LOGIN: &str = "191";
/// Portal form `mode` for a logout submission
const MODE_LOGOUT: &str = "193";

const SUCCESS_PHRASES: [&str; 2] = ["You are signed in as", "You have successfully logged in"];
const MESSAGE_ELEMENT: &[u8] = b"message";

#[derive(Debug, Clone)]
pub struct PortalClient {
    config: PortalConfig,
    http: reqwest::Client,
}

impl PortalClient {
    pub fn new(config: PortalConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { config, http })
    }

    pub fn config(&self) -> &PortalConfig {
        &self.config
    }

    async fn submit_login(&self, credential: &Credential) -> Result<LoginOutcome> {
        let timestamp = unix_millis();
        let resp = self
            .http
            .post(&self.config.login_url)
            .form(&[
                ("mode", MODE_LOGIN),
                ("username", credential.username.as_str()),
                ("password", credential.password.as_str()),
                ("a", timestamp.as_str()),
            ])
            .timeout(LOGIN_TIMEOUT)
            .send()
            .await
            .context("Login request failed")?;

        if !resp.status().is_success() {
            tracing::debug!("Portal answered login with status {}", resp.status());
            return Ok(LoginOutcome::Failure);
        }

        let body = resp.text().await.context("Failed to read login response")?;
        Ok(classify_login_response(&body))
    }

    async fn download_reference(&self) -> reqwest::Result<u64> {
        let resp = self
            .http
            .get(&self.config.speed_test_url)
            .header(reqwest::header::CACHE_CONTROL, "no-store")
            .timeout(SPEED_TEST_TIMEOUT)
            .send()
            .await?
            .error_for_status()?;
        let body = resp.bytes().await?;
        Ok(body.len() as u64)
    }
}

/// Classify a portal login response document.
///
/// The portal replies with XML whose first `<message>` element carries the
/// outcome. A reply without one, or one that is not well-formed, is a failure.
pub fn classify_login_response(body: &str) -> LoginOutcome {
    let message = message_text(body).unwrap_or_default();
    if SUCCESS_PHRASES.iter().any(|p| message.contains(p)) {
        LoginOutcome::Success
    } else {
        LoginOutcome::Failure
    }
}

/// Text content of the first `<message>` element, entities decoded and
/// CDATA sections included.
fn message_text(body: &str) -> Option<String> {
    let mut reader = Reader::from_str(body);
    let mut depth = 0usize;
    let mut text = String::new();

    loop {
        let event = match reader.read_event() {
            Ok(event) => event,
            Err(e) => {
                tracing::debug!("Unreadable login response: {}", e);
                return None;
            }
        };
        match event {
            XmlEvent::Start(e) if depth > 0 || e.local_name().as_ref() == MESSAGE_ELEMENT => {
                depth += 1;
            }
            XmlEvent::Empty(e) if depth == 0 && e.local_name().as_ref() == MESSAGE_ELEMENT => {
                return Some(text);
            }
            XmlEvent::End(_) if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    return Some(text);
                }
            }
            XmlEvent::Text(t) if depth > 0 => text.push_str(&t.unescape().ok()?),
            XmlEvent::CData(c) if depth > 0 => text.push_str(&String::from_utf8_lossy(&c)),
            XmlEvent::Eof => return None,
            _ => {}
        }
    }
}

fn unix_millis() -> String {
    chrono::Utc::now().timestamp_millis().to_string()
}

#[async_trait]
impl ConnectivityProber for PortalClient {
    async fn is_reachable(&self) -> bool {
        match self
            .http
            .get(&self.config.probe_url)
            .timeout(PROBE_TIMEOUT)
            .send()
            .await
        {
            Ok(_) => true,
            Err(e) => {
                tracing::debug!("Connectivity probe failed: {}", e);
                false
            }
        }
    }
}

#[async_trait]
impl Authenticator for PortalClient {
    async fn login(&self, credential: &Credential) -> LoginOutcome {
        match self.submit_login(credential).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!("Login for '{}' failed: {:#}", credential.username, e);
                LoginOutcome::Failure
            }
        }
    }
}

#[async_trait]
impl Deauthenticator for PortalClient {
    async fn logout(&self, username: &str) -> Result<()> {
        let timestamp = unix_millis();
        self.http
            .post(&self.config.logout_url)
            .form(&[
                ("mode", MODE_LOGOUT),
                ("username", username),
                ("a", timestamp.as_str()),
            ])
            .timeout(LOGOUT_TIMEOUT)
            .send()
            .await
            .context("Logout request failed")?;
        tracing::info!("Logged out '{}' from portal", username);
        Ok(())
    }
}

#[async_trait]
impl SpeedTester for PortalClient {
    async fn measure_speed(&self) -> SpeedResult {
        let start = Instant::now();
        match self.download_reference().await {
            Ok(received) => {
                let elapsed = start.elapsed();
                tracing::debug!(
                    "Speed test downloaded {} bytes in {:.3}s",
                    received,
                    elapsed.as_secs_f64()
                );
                classify_transfer(SPEED_TEST_BYTES, elapsed)
            }
            Err(e) if e.is_timeout() => {
                tracing::warn!("Speed test timed out: {}", e);
                SpeedResult::TimedOut
            }
            Err(e) => {
                tracing::warn!("Speed test failed: {}", e);
                SpeedResult::Failed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_signed_in() {
        let body = r#"<?xml version="1.0"?><requestresponse><status>LIVE</status><message><![CDATA[You are signed in as {username}]]></message></requestresponse>"#;
        assert_eq!(classify_login_response(body), LoginOutcome::Success);
    }

    #[test]
    fn test_classify_logged_in() {
        let body = "<requestresponse><message>You have successfully logged in</message></requestresponse>";
        assert_eq!(classify_login_response(body), LoginOutcome::Success);
    }

    #[test]
    fn test_classify_rejected() {
        let body = "<requestresponse><status>LOGIN</status><message><![CDATA[Login failed. Invalid user name/password.]]></message></requestresponse>";
        assert_eq!(classify_login_response(body), LoginOutcome::Failure);
    }

    #[test]
    fn test_message_element_takes_precedence() {
        let body = "<r><note>You are signed in as</note><message>Maximum login limit reached</message></r>";
        assert_eq!(classify_login_response(body), LoginOutcome::Failure);
    }

    #[test]
    fn test_classify_without_message_element() {
        assert_eq!(classify_login_response(""), LoginOutcome::Failure);
        assert_eq!(
            classify_login_response("<r><status>You have successfully logged in</status></r>"),
            LoginOutcome::Failure
        );
        assert_eq!(classify_login_response("<r><message/></r>"), LoginOutcome::Failure);
    }

    #[test]
    fn test_message_entities_are_decoded() {
        let body = "<r><message>You are signed in as a&amp;b</message></r>";
        assert_eq!(message_text(body).as_deref(), Some("You are signed in as a&b"));
        assert_eq!(classify_login_response(body), LoginOutcome::Success);

        let escaped = "<r><message>You have successfully&#32;logged in</message></r>";
        assert_eq!(classify_login_response(escaped), LoginOutcome::Success);
    }

    #[test]
    fn test_message_text_spans_nested_markup() {
        let body = "<r><message>You are <b>signed in</b> as x</message></r>";
        assert_eq!(message_text(body).as_deref(), Some("You are signed in as x"));
    }

    #[test]
    fn test_malformed_reply_is_failure() {
        let body = "<r><message>You are signed in as x</wrong></r>";
        assert_eq!(classify_login_response(body), LoginOutcome::Failure);
    }

    #[test]
    fn test_timestamp_is_decimal_millis() {
        let ts = unix_millis();
        assert!(ts.chars().all(|c| c.is_ascii_digit()));
        assert!(ts.len() >= 13);
    }
}
