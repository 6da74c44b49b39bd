// src/web/fetch.rs

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tokio::sync::Mutex;
use tokio::time::{Instant, sleep};
use tracing::{debug, warn};

use crate::config::Config;

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected status {0}")]
    Status(u16),

    #[error("gave up after {0} attempts")]
    RetriesExhausted(u32),
}

/// Fetch a URL's body as text.
#[async_trait]
pub trait WebFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String, FetchError>;
}

/// HTTP fetcher with a per-request timeout, bounded retries, and a fixed
/// delay between consecutive requests. The delay is a rate-limit courtesy
/// toward the sites being scraped, not an implementation accident.
pub struct HttpFetcher {
    client: Client,
    max_retries: u32,
    delay: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl HttpFetcher {
    pub fn new(config: &Config) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.fetch_timeout))
            .user_agent("provider-research/2.0")
            .build()?;

        Ok(Self {
            client,
            max_retries: config.fetch_max_retries,
            delay: Duration::from_millis(config.fetch_delay_ms),
            last_request: Mutex::new(None),
        })
    }

    async fn pace(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < self.delay {
                sleep(self.delay - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }

    fn retryable(status: u16) -> bool {
        status == 429 || status >= 500
    }
}

#[async_trait]
impl WebFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        let attempts = self.max_retries + 1;

        for attempt in 1..=attempts {
            self.pace().await;
            debug!(url, attempt, "fetching");

            match self.client.get(url).send().await {
                Ok(response) => {
                    let status = response.status().as_u16();
                    if (200..300).contains(&status) {
                        return Ok(response.text().await?);
                    }
                    if !Self::retryable(status) || attempt == attempts {
                        return Err(FetchError::Status(status));
                    }
                    warn!(url, status, attempt, "retryable fetch status");
                }
                Err(e) => {
                    if attempt == attempts {
                        return Err(FetchError::Http(e));
                    }
                    warn!(url, attempt, error = %e, "fetch error, retrying");
                }
            }
        }

        Err(FetchError::RetriesExhausted(attempts))
    }
}
