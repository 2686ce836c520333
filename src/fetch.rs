//! Page fetching capability with bounded retry.
//!
//! The scraper never talks to a browser directly. It asks a [`PageFetcher`]
//! for the rendered HTML of a URL, which keeps the pipeline testable with an
//! in-memory fake.
//!
//! # Implementations
//!
//! - [`HttpFetcher`]: plain GET of the page
//! - [`RenderServiceFetcher`]: asks a headless-browser render service
//!   (browserless-style `POST /content`) for the rendered DOM
//! - [`RetryFetch`]: decorator that retries any fetcher a bounded number of times
//!
//! # Retry Strategy
//!
//! - Attempts are bounded (3 by default); the next scheduled run is the real retry
//! - Exponential backoff starting at 1 second, capped at 30 seconds
//! - Random jitter (0-250ms) added to each delay

use crate::config::BrowserKind;
use crate::errors::FetchError;
use rand::{Rng, rng};
use reqwest::Client;
use serde::Serialize;
use std::fmt;
use std::time::{Duration as StdDuration, Instant};
use tokio::time::sleep;
use tracing::{debug, error, instrument, warn};
use url::Url;

/// Upper bound on configured page-load attempts.
pub const MAX_PAGE_ATTEMPTS: usize = 10;

/// Largest backoff exponent; `base_delay * 2^16` is far past any sane cap.
const MAX_BACKOFF_SHIFT: u32 = 16;

/// Fetch the rendered HTML of a page.
pub trait PageFetcher {
    async fn fetch_page(&self, url: &Url) -> Result<String, FetchError>;
}

/// Wrapper that retries any [`PageFetcher`] with exponential backoff.
///
/// ```text
/// delay = min(base_delay * 2^(attempt-1), max_delay) + random_jitter(0..250ms)
/// ```
pub struct RetryFetch<T> {
    inner: T,
    /// Total page-load attempts, including the first one.
    max_attempts: usize,
    base_delay: StdDuration,
    max_delay: StdDuration,
}

impl<T> RetryFetch<T>
where
    T: PageFetcher,
{
    pub fn new(inner: T, max_attempts: usize, base_delay: StdDuration) -> Self {
        Self {
            inner,
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay: StdDuration::from_secs(30),
        }
    }

    /// Backoff before the retry that follows failed attempt number `attempt`
    /// (1-based), without jitter.
    fn backoff_delay(&self, attempt: usize) -> StdDuration {
        let shift = (attempt.saturating_sub(1) as u32).min(MAX_BACKOFF_SHIFT);
        self.base_delay.saturating_mul(1u32 << shift).min(self.max_delay)
    }
}

impl<T> fmt::Debug for RetryFetch<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryFetch")
            .field("max_attempts", &self.max_attempts)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .finish()
    }
}

impl<T> PageFetcher for RetryFetch<T>
where
    T: PageFetcher,
{
    #[instrument(level = "debug", skip_all, fields(%url))]
    async fn fetch_page(&self, url: &Url) -> Result<String, FetchError> {
        let total_t0 = Instant::now();
        let mut attempt = 0usize;

        loop {
            match self.inner.fetch_page(url).await {
                Ok(html) => return Ok(html),
                Err(e) => {
                    attempt += 1;
                    let total_dt = total_t0.elapsed();

                    if attempt >= self.max_attempts {
                        error!(
                            attempt,
                            max = self.max_attempts,
                            elapsed_ms_total = total_dt.as_millis(),
                            error = %e,
                            "Page load exhausted attempts"
                        );
                        return Err(e);
                    }

                    let jitter_ms: u64 = rng().random_range(0..=250);
                    let delay = self.backoff_delay(attempt) + StdDuration::from_millis(jitter_ms);

                    warn!(
                        attempt,
                        max = self.max_attempts,
                        ?delay,
                        error = %e,
                        "Page load failed; backing off"
                    );
                    sleep(delay).await;
                }
            }
        }
    }
}

/// Direct HTTP fetch of the page source.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(user_agent: &str) -> Result<Self, reqwest::Error> {
        let client = Client::builder().user_agent(user_agent).build()?;
        Ok(Self { client })
    }
}

impl PageFetcher for HttpFetcher {
    #[instrument(level = "debug", skip_all, fields(%url))]
    async fn fetch_page(&self, url: &Url) -> Result<String, FetchError> {
        let request_err = |source| FetchError::Request {
            url: url.to_string(),
            source,
        };

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(request_err)?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.text().await.map_err(request_err)?;
        debug!(bytes = body.len(), "Fetched page");
        Ok(body)
    }
}

/// Fetch through a headless-browser render service that returns the DOM
/// after scripts have run.
#[derive(Debug, Clone)]
pub struct RenderServiceFetcher {
    client: Client,
    endpoint: Url,
    user_agent: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RenderRequest<'a> {
    url: &'a str,
    user_agent: &'a str,
}

impl RenderServiceFetcher {
    pub fn new(endpoint: Url, user_agent: &str) -> Result<Self, reqwest::Error> {
        let client = Client::builder().build()?;
        Ok(Self {
            client,
            endpoint,
            user_agent: user_agent.to_string(),
        })
    }
}

impl PageFetcher for RenderServiceFetcher {
    #[instrument(level = "debug", skip_all, fields(%url, endpoint = %self.endpoint))]
    async fn fetch_page(&self, url: &Url) -> Result<String, FetchError> {
        let body = RenderRequest {
            url: url.as_str(),
            user_agent: &self.user_agent,
        };

        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&body)
            .send()
            .await
            .map_err(|source| FetchError::Request {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            let reason = response.text().await.unwrap_or_default();
            return Err(FetchError::Render {
                url: url.to_string(),
                reason: format!("HTTP {}: {}", status.as_u16(), reason.trim()),
            });
        }

        let html = response.text().await.map_err(|source| FetchError::Request {
            url: url.to_string(),
            source,
        })?;
        debug!(bytes = html.len(), "Rendered page");
        Ok(html)
    }
}

/// The fetcher selected by configuration.
#[derive(Debug, Clone)]
pub enum ConfiguredFetcher {
    Http(HttpFetcher),
    RenderService(RenderServiceFetcher),
}

impl ConfiguredFetcher {
    pub fn from_kind(
        kind: &BrowserKind,
        user_agent: &str,
    ) -> Result<Self, reqwest::Error> {
        Ok(match kind {
            BrowserKind::Http => Self::Http(HttpFetcher::new(user_agent)?),
            BrowserKind::RenderService { endpoint } => {
                Self::RenderService(RenderServiceFetcher::new(endpoint.clone(), user_agent)?)
            }
        })
    }
}

impl PageFetcher for ConfiguredFetcher {
    async fn fetch_page(&self, url: &Url) -> Result<String, FetchError> {
        match self {
            Self::Http(f) => f.fetch_page(url).await,
            Self::RenderService(f) => f.fetch_page(url).await,
        }
    }
}
