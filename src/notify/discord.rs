use super::{WebhookPayload, WebhookTransport};
use anyhow::{anyhow, Context, Result};
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client, StatusCode};
use std::time::Duration;

/// Discord webhook poster with per-request timeout and bounded retry.
#[derive(Clone)]
pub struct DiscordWebhook {
    client: Client,
    timeout: Duration,
    max_retries: u8,
    base_backoff: Duration,
    max_retry_after: Duration,
}

impl DiscordWebhook {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("spc-notifier/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("building webhook http client")?;
        Ok(Self {
            client,
            timeout: Duration::from_secs(30),
            max_retries: 3,
            base_backoff: Duration::from_millis(500),
            max_retry_after: Duration::from_secs(30),
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retries(mut self, retries: u8) -> Self {
        self.max_retries = retries.max(1);
        self
    }

    pub fn with_backoff(mut self, base: Duration) -> Self {
        self.base_backoff = base;
        self
    }

    /// Upper bound on a server-requested `Retry-After` wait.
    pub fn with_max_retry_after(mut self, max: Duration) -> Self {
        self.max_retry_after = max;
        self
    }

    fn backoff(&self, attempt: u8) -> Duration {
        self.base_backoff * (1u32 << (attempt.saturating_sub(1)).min(16))
    }
}

/// 429 and 5xx are worth another attempt; other 4xx will not get better.
pub fn is_retryable_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// `Retry-After` in seconds. Discord may send fractional values.
pub fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    let secs: f64 = headers.get(RETRY_AFTER)?.to_str().ok()?.trim().parse().ok()?;
    Duration::try_from_secs_f64(secs).ok()
}

#[async_trait::async_trait]
impl WebhookTransport for DiscordWebhook {
    async fn post(&self, url: &str, payload: &WebhookPayload) -> Result<()> {
        let mut attempt: u8 = 0;
        loop {
            attempt += 1;
            let res = self
                .client
                .post(url)
                .timeout(self.timeout)
                .json(payload)
                .send()
                .await;

            let mut requested_wait = None;
            let err = match res {
                Ok(rsp) => {
                    let status = rsp.status();
                    if status.is_success() {
                        return Ok(());
                    }
                    if !is_retryable_status(status) {
                        return Err(anyhow!("Discord webhook HTTP error: {status}"));
                    }
                    if status == StatusCode::TOO_MANY_REQUESTS {
                        requested_wait = retry_after(rsp.headers());
                    }
                    anyhow!("Discord webhook HTTP error: {status}")
                }
                Err(e) => anyhow!("Discord webhook request failed: {e}"),
            };

            if attempt >= self.max_retries {
                return Err(err.context(format!("gave up after {attempt} attempts")));
            }
            let delay = match requested_wait {
                Some(wait) => wait.min(self.max_retry_after),
                None => self.backoff(attempt),
            };
            tracing::debug!(attempt, error = %err, retry_in_ms = delay.as_millis() as u64, "webhook post failed, retrying");
            tokio::time::sleep(delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_statuses() {
        assert!(is_retryable_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(is_retryable_status(StatusCode::BAD_GATEWAY));
        assert!(!is_retryable_status(StatusCode::BAD_REQUEST));
        assert!(!is_retryable_status(StatusCode::NOT_FOUND));
    }

    #[test]
    fn backoff_doubles() {
        let d = DiscordWebhook::new().unwrap();
        assert_eq!(d.backoff(1), Duration::from_millis(500));
        assert_eq!(d.backoff(2), Duration::from_millis(1000));
        assert_eq!(d.backoff(3), Duration::from_millis(2000));
    }

    #[test]
    fn retry_after_parses_seconds() {
        let mut h = HeaderMap::new();
        assert_eq!(retry_after(&h), None);
        h.insert(RETRY_AFTER, "2".parse().unwrap());
        assert_eq!(retry_after(&h), Some(Duration::from_secs(2)));
        h.insert(RETRY_AFTER, "0.25".parse().unwrap());
        assert_eq!(retry_after(&h), Some(Duration::from_millis(250)));
        h.insert(RETRY_AFTER, "Wed, 21 Oct 2015 07:28:00 GMT".parse().unwrap());
        assert_eq!(retry_after(&h), None);
        h.insert(RETRY_AFTER, "-1".parse().unwrap());
        assert_eq!(retry_after(&h), None);
        h.insert(RETRY_AFTER, "1e300".parse().unwrap());
        assert_eq!(retry_after(&h), None);
    }

    #[tokio::test]
    async fn unreachable_host_fails_after_retries() {
        // Port 9 on localhost refuses connections on any sane test box.
        let d = DiscordWebhook::new()
            .unwrap()
            .with_backoff(Duration::from_millis(1))
            .with_timeout(Duration::from_secs(2));
        let payload = WebhookPayload {
            content: "x".into(),
            embeds: vec![],
        };
        let err = d.post("http://127.0.0.1:9/webhook", &payload).await.unwrap_err();
        assert!(format!("{err:#}").contains("gave up after 3 attempts"));

        let err = d
            .with_retries(1)
            .post("http://127.0.0.1:9/webhook", &payload)
            .await
            .unwrap_err();
        assert!(format!("{err:#}").contains("gave up after 1 attempts"));
    }
}
