//! HTTP transport abstraction and retry policy.
//!
//! The production transport uses reqwest with a per-request timeout. The
//! retry loop lives outside the transport so the timeout bounds each attempt
//! on its own.

use std::time::Duration;

use async_trait::async_trait;
use wakeprompt_core::config::ProviderConfig;
use wakeprompt_core::error::ProviderError;

// ============================================================================
// Transport Trait
// ============================================================================

/// A JSON POST with bearer authentication.
#[derive(Clone)]
pub struct HttpRequest {
    pub url: String,
    pub bearer: String,
    pub body: serde_json::Value,
}

impl std::fmt::Debug for HttpRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpRequest")
            .field("url", &self.url)
            .field("bearer", &"<redacted>")
            .field("body", &self.body)
            .finish()
    }
}

/// Status code and raw body of a completed exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

/// The request never produced a response.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,
    #[error("network error: {0}")]
    Network(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TransportError::Timeout
        } else {
            TransportError::Network(err.to_string())
        }
    }
}

/// Sends one request. Implementations do not retry.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn post_json(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError>;
}

// ============================================================================
// Reqwest Transport
// ============================================================================

/// Production transport backed by a shared reqwest client.
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::Transport(format!("failed to create HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    pub fn from_config(config: &ProviderConfig) -> Result<Self, ProviderError> {
        Self::new(Duration::from_secs(config.request_timeout_secs))
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn post_json(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        let response = self
            .client
            .post(&request.url)
            .bearer_auth(&request.bearer)
            .json(&request.body)
            .send()
            .await?;
        let status = response.status().as_u16();
        let body = response.bytes().await?.to_vec();
        Ok(HttpResponse { status, body })
    }
}

// ============================================================================
// Retry Policy
// ============================================================================

/// Bounded retry with linear back-off.
///
/// After a failed attempt `n` (zero-based) the loop waits
/// `(n + 1) * status_backoff` for 429/5xx and `(n + 1) * transport_backoff`
/// for transport errors. No wait follows the last attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub status_backoff: Duration,
    pub transport_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            status_backoff: Duration::from_secs(2),
            transport_backoff: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &ProviderConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            ..Self::default()
        }
    }

    pub fn status_delay(&self, attempt: u32) -> Duration {
        self.status_backoff * (attempt + 1)
    }

    pub fn transport_delay(&self, attempt: u32) -> Duration {
        self.transport_backoff * (attempt + 1)
    }
}

/// Map a response status onto the provider error taxonomy.
pub fn classify_status(status: u16) -> Result<(), ProviderError> {
    match status {
        200..=299 => Ok(()),
        401 => Err(ProviderError::InvalidCredential),
        429 => Err(ProviderError::RateLimited),
        500..=599 => Err(ProviderError::Server(status)),
        _ => Err(ProviderError::Http(status)),
    }
}

/// Send `request`, retrying transient failures according to `policy`.
///
/// Returns the body of the first 2xx response, or the last error observed.
pub async fn send_with_retry(
    transport: &dyn HttpTransport,
    policy: &RetryPolicy,
    request: &HttpRequest,
) -> Result<Vec<u8>, ProviderError> {
    let attempts = policy.max_attempts.max(1);
    let mut last_error = ProviderError::Transport("no attempt made".to_string());

    for attempt in 0..attempts {
        let is_last = attempt + 1 == attempts;

        let delay = match transport.post_json(request).await {
            Ok(response) => {
                let error = match classify_status(response.status) {
                    Ok(()) => return Ok(response.body),
                    Err(e) => e,
                };
                if !error.is_retryable() || is_last {
                    return Err(error);
                }
                tracing::warn!(
                    url = %request.url,
                    status = response.status,
                    attempt = attempt + 1,
                    "Provider request failed, retrying"
                );
                last_error = error;
                policy.status_delay(attempt)
            }
            Err(e) => {
                tracing::warn!(
                    url = %request.url,
                    error = %e,
                    attempt = attempt + 1,
                    "Provider transport error"
                );
                last_error = ProviderError::Transport(e.to_string());
                if is_last {
                    break;
                }
                policy.transport_delay(attempt)
            }
        };

        tokio::time::sleep(delay).await;
    }

    Err(last_error)
}

// ============================================================================
// Scripted Transport for Testing
// ============================================================================


#[cfg(test)]
mod tests {
    use super::testing::ScriptedTransport;
    use super::*;
    use tokio::time::Instant;

    fn request() -> HttpRequest {
        HttpRequest {
            url: "https://api.example.test/v1/chat/completions".to_string(),
            bearer: "sk-test".to_string(),
            body: serde_json::json!({"model": "m"}),
        }
    }

    #[test]
    fn test_classify_status() {
        assert!(classify_status(200).is_ok());
        assert!(classify_status(204).is_ok());
        assert_eq!(classify_status(401), Err(ProviderError::InvalidCredential));
        assert_eq!(classify_status(429), Err(ProviderError::RateLimited));
        assert_eq!(classify_status(503), Err(ProviderError::Server(503)));
        assert_eq!(classify_status(404), Err(ProviderError::Http(404)));
        assert_eq!(classify_status(302), Err(ProviderError::Http(302)));
    }

    #[test]
    fn test_policy_delays() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.status_delay(0), Duration::from_secs(2));
        assert_eq!(policy.status_delay(1), Duration::from_secs(4));
        assert_eq!(policy.transport_delay(0), Duration::from_secs(1));
        assert_eq!(policy.transport_delay(1), Duration::from_secs(2));
    }

    #[test]
    fn test_debug_redacts_bearer() {
        let rendered = format!("{:?}", request());
        assert!(!rendered.contains("sk-test"));
        assert!(rendered.contains("<redacted>"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limited_twice_then_success() {
        let transport = ScriptedTransport::statuses(&[429, 429, 200], b"ok");
        let started = Instant::now();

        let body = send_with_retry(&transport, &RetryPolicy::default(), &request())
            .await
            .unwrap();

        assert_eq!(body, b"ok");
        assert_eq!(transport.calls(), 3);
        assert!(started.elapsed() >= Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_credential_fails_after_one_attempt() {
        let transport = ScriptedTransport::statuses(&[401, 200], b"");
        let started = Instant::now();

        let err = send_with_retry(&transport, &RetryPolicy::default(), &request())
            .await
            .unwrap_err();

        assert_eq!(err, ProviderError::InvalidCredential);
        assert_eq!(transport.calls(), 1);
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_other_client_error_not_retried() {
        let transport = ScriptedTransport::statuses(&[400], b"");
        let err = send_with_retry(&transport, &RetryPolicy::default(), &request())
            .await
            .unwrap_err();
        assert_eq!(err, ProviderError::Http(400));
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_server_error_exhausts_attempts() {
        let transport = ScriptedTransport::statuses(&[500], b"");
        let started = Instant::now();

        let err = send_with_retry(&transport, &RetryPolicy::default(), &request())
            .await
            .unwrap_err();

        assert_eq!(err, ProviderError::Server(500));
        assert_eq!(transport.calls(), 3);
        // 2s + 4s, no wait after the final attempt.
        let waited = started.elapsed();
        assert!(waited >= Duration::from_secs(6));
        assert!(waited < Duration::from_secs(7));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_errors_use_shorter_backoff() {
        let transport = ScriptedTransport::new(vec![
            Err(TransportError::Timeout),
            Err(TransportError::Network("reset".to_string())),
            Ok(HttpResponse {
                status: 200,
                body: b"done".to_vec(),
            }),
        ]);
        let started = Instant::now();

        let body = send_with_retry(&transport, &RetryPolicy::default(), &request())
            .await
            .unwrap();

        assert_eq!(body, b"done");
        let waited = started.elapsed();
        assert!(waited >= Duration::from_secs(3));
        assert!(waited < Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_errors_surface_last_error() {
        let transport = ScriptedTransport::new(vec![Err(TransportError::Timeout)]);
        let err = send_with_retry(&transport, &RetryPolicy::default(), &request())
            .await
            .unwrap_err();
        assert_eq!(err, ProviderError::Transport("request timed out".to_string()));
        assert_eq!(transport.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_attempt_policy() {
        let transport = ScriptedTransport::statuses(&[503], b"");
        let policy = RetryPolicy {
            max_attempts: 1,
            ..RetryPolicy::default()
        };
        let err = send_with_retry(&transport, &policy, &request())
            .await
            .unwrap_err();
        assert_eq!(err, ProviderError::Server(503));
        assert_eq!(transport.calls(), 1);
    }

    #[test]
    fn test_policy_from_config() {
        let mut config = ProviderConfig::default();
        config.max_attempts = 0;
        assert_eq!(RetryPolicy::from_config(&config).max_attempts, 1);
        config.max_attempts = 5;
        assert_eq!(RetryPolicy::from_config(&config).max_attempts, 5);
    }

    #[test]
    fn test_reqwest_transport_builds() {
        assert!(ReqwestTransport::from_config(&ProviderConfig::default()).is_ok());
    }
}
