//! Rate-limit handling for HTTP model providers.

use std::future::Future;
use std::time::Duration;

use reqwest::StatusCode;

use crate::error::LlmError;

/// How often and how long to wait when a provider answers `429`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    /// Upper bound for both backoff and a server-sent `Retry-After`.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    fn backoff(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(1_u32 << attempt.min(16))
            .min(self.max_delay)
    }

    /// `Retry-After` seconds when the server sends them, backoff otherwise.
    fn delay_for(&self, response: &reqwest::Response, attempt: u32) -> Duration {
        response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.trim().parse::<u64>().ok())
            .map_or_else(
                || self.backoff(attempt),
                |secs| Duration::from_secs(secs).min(self.max_delay),
            )
    }
}

/// Run `send` until the response is anything but `429` or retries run out.
///
/// # Errors
///
/// Returns [`LlmError::RateLimited`] once every attempt was rate limited, or
/// [`LlmError::Http`] if the request itself fails.
pub(crate) async fn send_with_retry<F, Fut>(
    provider: &str,
    policy: &RetryPolicy,
    mut send: F,
) -> Result<reqwest::Response, LlmError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<reqwest::Response, reqwest::Error>>,
{
    let mut attempt = 0;
    loop {
        let response = send().await.map_err(LlmError::Http)?;
        if response.status() != StatusCode::TOO_MANY_REQUESTS {
            return Ok(response);
        }
        if attempt >= policy.max_retries {
            tracing::error!(provider, attempts = attempt + 1, "rate limited, giving up");
            return Err(LlmError::RateLimited);
        }
        let delay = policy.delay_for(&response, attempt);
        attempt += 1;
        tracing::warn!(
            provider,
            retry = attempt,
            max_retries = policy.max_retries,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            "rate limited, backing off"
        );
        tokio::time::sleep(delay).await;
    }
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn fast_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
        }
    }

    async fn post(
        client: &reqwest::Client,
        server: &MockServer,
    ) -> Result<reqwest::Response, reqwest::Error> {
        client.post(server.uri()).send().await
    }

    #[test]
    fn backoff_doubles_up_to_the_cap() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(0), Duration::from_secs(1));
        assert_eq!(policy.backoff(1), Duration::from_secs(2));
        assert_eq!(policy.backoff(2), Duration::from_secs(4));
        assert_eq!(policy.backoff(10), Duration::from_secs(30));
        assert_eq!(policy.backoff(u32::MAX), Duration::from_secs(30));
    }

    #[tokio::test]
    async fn retries_after_rate_limit_then_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "0"))
            .up_to_n_times(2)
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .expect(1)
            .mount(&server)
            .await;

        let client = reqwest::Client::new();
        let response = send_with_retry("test", &fast_policy(3), || post(&client, &server))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn gives_up_after_max_retries() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429))
            .expect(3)
            .mount(&server)
            .await;

        let client = reqwest::Client::new();
        let err = send_with_retry("test", &fast_policy(2), || post(&client, &server))
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::RateLimited));
    }

    #[tokio::test]
    async fn other_errors_are_returned_without_retry() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .expect(1)
            .mount(&server)
            .await;

        let client = reqwest::Client::new();
        let response = send_with_retry("test", &fast_policy(3), || post(&client, &server))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn large_retry_after_is_capped() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "3600"))
            .mount(&server)
            .await;

        let response = reqwest::Client::new().post(server.uri()).send().await.unwrap();
        assert_eq!(
            fast_policy(1).delay_for(&response, 0),
            Duration::from_millis(5)
        );
        assert_eq!(
            RetryPolicy::default().delay_for(&response, 0),
            Duration::from_secs(30)
        );
    }
}
