//! SMS gateway client

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use sb_core::GatewayConfig;

use crate::error::{Result, SmsError};

/// Attempt limits for one delivery
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Fixed pause between attempts
    pub delay: Duration,
    /// Per-attempt request timeout
    pub timeout: Duration,
    /// Keep retrying after a 4xx response
    pub retry_client_errors: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(5),
            timeout: Duration::from_secs(30),
            retry_client_errors: true,
        }
    }
}

impl From<&GatewayConfig> for RetryPolicy {
    fn from(config: &GatewayConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            delay: Duration::from_secs(config.retry_delay_secs),
            timeout: Duration::from_secs(config.timeout_secs),
            retry_client_errors: config.retry_client_errors,
        }
    }
}

/// A delivery in flight
#[derive(Debug, Clone)]
pub struct OutboundMessage {
    pub destination: String,
    pub body: String,
    pub attempt: u32,
}

/// Outgoing request payload
#[derive(Debug, Serialize)]
struct SendSmsPayload<'a> {
    to_number: &'a str,
    content: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    phone_id: Option<&'a str>,
}

/// SMS gateway client
#[derive(Debug, Clone)]
pub struct GatewayClient {
    client: Client,
    url: String,
    username: String,
    password: String,
    phone_id: Option<String>,
    policy: RetryPolicy,
}

impl GatewayClient {
    /// Create a client from configuration
    pub fn new(config: &GatewayConfig) -> Result<Self> {
        let url = config
            .base_url
            .as_deref()
            .filter(|u| !u.trim().is_empty())
            .ok_or(SmsError::GatewayNotConfigured)?;

        Self::with_policy(
            url,
            &config.username,
            &config.password,
            config.phone_id.clone(),
            RetryPolicy::from(config),
        )
    }

    pub fn with_policy(
        url: &str,
        username: &str,
        password: &str,
        phone_id: Option<String>,
        policy: RetryPolicy,
    ) -> Result<Self> {
        let client = Client::builder().timeout(policy.timeout).build()?;

        Ok(Self {
            client,
            url: url.trim().to_string(),
            username: username.to_string(),
            password: password.to_string(),
            phone_id,
            policy,
        })
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Deliver one SMS, retrying up to the policy's attempt limit.
    pub async fn send(&self, to: &str, body: &str) -> Result<()> {
        let mut msg = OutboundMessage {
            destination: to.to_string(),
            body: body.to_string(),
            attempt: 0,
        };
        let max = self.policy.max_attempts;

        while msg.attempt < max {
            msg.attempt += 1;

            match self.send_once(&msg).await {
                Ok(()) => {
                    info!(to = %msg.destination, attempt = msg.attempt, "SMS delivered");
                    return Ok(());
                }
                Err(SmsError::Status { status, body })
                    if status.is_client_error() && !self.policy.retry_client_errors =>
                {
                    error!(
                        to = %msg.destination,
                        attempt = msg.attempt,
                        "SMS gateway rejected message with {}: {}",
                        status,
                        body
                    );
                    return Err(SmsError::Status { status, body });
                }
                Err(e) => {
                    warn!(
                        to = %msg.destination,
                        attempt = msg.attempt,
                        max_attempts = max,
                        "SMS attempt failed: {}",
                        e
                    );
                }
            }

            if msg.attempt < max {
                tokio::time::sleep(self.policy.delay).await;
            }
        }

        error!(to = %msg.destination, "Giving up on SMS after {} attempts", msg.attempt);
        Err(SmsError::Exhausted {
            attempts: msg.attempt,
        })
    }

    async fn send_once(&self, msg: &OutboundMessage) -> Result<()> {
        debug!(to = %msg.destination, attempt = msg.attempt, "Posting SMS to gateway");

        let payload = SendSmsPayload {
            to_number: &msg.destination,
            content: &msg.body,
            phone_id: self.phone_id.as_deref(),
        };

        let response = self
            .client
            .post(&self.url)
            .basic_auth(&self.username, Some(&self.password))
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SmsError::Status { status, body });
        }

        Ok(())
    }
}

#[async_trait]
impl sb_core::SmsSender for GatewayClient {
    async fn deliver(&self, to: &str, body: &str) -> sb_core::Result<()> {
        self.send(to, body).await.map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use serde_json::json;
    use wiremock::matchers::{basic_auth, body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn policy(delay_ms: u64) -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            delay: Duration::from_millis(delay_ms),
            timeout: Duration::from_secs(2),
            retry_client_errors: true,
        }
    }

    fn client(server: &MockServer, policy: RetryPolicy) -> GatewayClient {
        GatewayClient::with_policy(
            &format!("{}/send", server.uri()),
            "user",
            "pass",
            Some("phone-1".to_string()),
            policy,
        )
        .unwrap()
    }

    #[test]
    fn test_new_requires_url() {
        let config = GatewayConfig::default();
        assert!(matches!(
            GatewayClient::new(&config),
            Err(SmsError::GatewayNotConfigured)
        ));
    }

    #[test]
    fn test_policy_from_config() {
        let config = GatewayConfig {
            base_url: Some("http://localhost/send".to_string()),
            ..GatewayConfig::default()
        };
        let client = GatewayClient::new(&config).unwrap();
        assert_eq!(client.policy().max_attempts, 3);
        assert_eq!(client.policy().delay, Duration::from_secs(5));
        assert_eq!(client.policy().timeout, Duration::from_secs(30));
    }

    #[tokio::test]
    async fn test_successful_delivery() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/send"))
            .and(basic_auth("user", "pass"))
            .and(body_json(json!({
                "to_number": "+15550001111",
                "content": "alice: hi",
                "phone_id": "phone-1"
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        client(&server, policy(10))
            .send("+15550001111", "alice: hi")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_permanent_failure_uses_exact_attempts_and_delay() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .expect(3)
            .mount(&server)
            .await;

        let started = Instant::now();
        let err = client(&server, policy(300))
            .send("+15550001111", "hi")
            .await
            .unwrap_err();
        let elapsed = started.elapsed();

        assert!(matches!(err, SmsError::Exhausted { attempts: 3 }));
        // two pauses between three attempts, none after the last
        assert!(elapsed >= Duration::from_millis(600), "too fast: {:?}", elapsed);
        assert!(elapsed < Duration::from_millis(850), "too slow: {:?}", elapsed);
    }

    #[tokio::test]
    async fn test_retries_until_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .up_to_n_times(2)
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        client(&server, policy(10)).send("+1000", "hi").await.unwrap();
    }

    #[tokio::test]
    async fn test_client_error_retried_by_default() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad number"))
            .expect(3)
            .mount(&server)
            .await;

        let err = client(&server, policy(10)).send("nope", "hi").await.unwrap_err();
        assert!(matches!(err, SmsError::Exhausted { attempts: 3 }));
    }

    #[tokio::test]
    async fn test_client_error_terminal_when_configured() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad number"))
            .expect(1)
            .mount(&server)
            .await;

        let mut policy = policy(10);
        policy.retry_client_errors = false;
        let err = client(&server, policy).send("nope", "hi").await.unwrap_err();

        match err {
            SmsError::Status { status, body } => {
                assert_eq!(status.as_u16(), 400);
                assert_eq!(body, "bad number");
            }
            other => panic!("expected Status, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_timeout_counts_as_failed_attempt() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
            .expect(2)
            .mount(&server)
            .await;

        let policy = RetryPolicy {
            max_attempts: 2,
            delay: Duration::from_millis(10),
            timeout: Duration::from_millis(50),
            retry_client_errors: true,
        };
        let err = client(&server, policy).send("+1000", "hi").await.unwrap_err();
        assert!(matches!(err, SmsError::Exhausted { attempts: 2 }));
    }

    #[tokio::test]
    async fn test_sms_sender_maps_errors() {
        use sb_core::SmsSender;

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let err = client(&server, policy(1)).deliver("+1000", "hi").await.unwrap_err();
        assert!(matches!(err, sb_core::Error::DeliveryExhausted { attempts: 3 }));
    }
}
