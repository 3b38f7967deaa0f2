use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, LAST_MODIFIED, RETRY_AFTER};
use tokio::time::Instant;
use tracing::warn;

use crate::error::FetchError;
use crate::throttle::Throttle;

const MAX_RETRIES: u32 = 3;
const BASE_BACKOFF_MS: u64 = 2000;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/133.0.0.0 Safari/537.36";

/// One successfully fetched page. `final_url` is the URL after redirects,
/// which is what identity resolution keys on.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub final_url: String,
    pub status: u16,
    pub lastmod: Option<String>,
    pub body: String,
}

/// Seam between the crawl and the network. Tests substitute a scripted
/// implementation; production uses [`HttpFetcher`].
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchedPage, FetchError>;
}

/// HTTP fetcher with retry, exponential backoff and adaptive politeness.
/// Transient failures (network errors, 429, 5xx) are retried up to
/// `MAX_RETRIES`; other 4xx statuses are terminal and surfaced immediately.
pub struct HttpFetcher {
    client: reqwest::Client,
    throttle: Throttle,
}

impl HttpFetcher {
    pub fn new(base_delay: Duration) -> Result<HttpFetcher> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            ),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en"));
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(HttpFetcher {
            client,
            throttle: Throttle::new(base_delay),
        })
    }

    async fn try_fetch(
        &self,
        url: &str,
    ) -> Result<(FetchedPage, Option<Duration>), reqwest::Error> {
        let response = self.client.get(url).send().await?;
        let status = response.status().as_u16();
        let lastmod = header_value(response.headers(), &LAST_MODIFIED);
        let retry_after = header_value(response.headers(), &RETRY_AFTER)
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs);
        let final_url = response.url().to_string();
        let body = response.text().await?;
        Ok((
            FetchedPage {
                final_url,
                status,
                lastmod,
                body,
            },
            retry_after,
        ))
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedPage, FetchError> {
        let mut reason = String::from("no response");
        for attempt in 0..=MAX_RETRIES {
            self.throttle.acquire().await;
            let started = Instant::now();
            let mut retry_after = None;

            match self.try_fetch(url).await {
                Ok((page, after)) if is_distress(page.status) => {
                    self.throttle.record_distress();
                    reason = format!("status {}", page.status);
                    retry_after = after;
                }
                Ok((page, _)) if page.status >= 400 => {
                    // The host answered normally; only this page is a dead end.
                    self.throttle.record_success(started.elapsed());
                    return Err(FetchError::Terminal {
                        url: url.to_string(),
                        status: page.status,
                    });
                }
                Ok((page, _)) => {
                    self.throttle.record_success(started.elapsed());
                    return Ok(page);
                }
                Err(e) => {
                    self.throttle.record_distress();
                    reason = e.to_string();
                }
            }

            if attempt < MAX_RETRIES {
                let backoff = backoff_for(attempt, retry_after);
                warn!(
                    "{} failed ({}), attempt {}/{}, backing off {:.1}s",
                    url,
                    reason,
                    attempt + 1,
                    MAX_RETRIES + 1,
                    backoff.as_secs_f64()
                );
                tokio::time::sleep(backoff).await;
            }
        }
        Err(FetchError::Transient {
            url: url.to_string(),
            reason,
        })
    }
}

fn header_value(headers: &HeaderMap, name: &reqwest::header::HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string())
}

fn is_distress(status: u16) -> bool {
    status == 429 || (500..=599).contains(&status)
}

/// Exponential backoff for the given attempt, stretched to honor a larger
/// server-requested Retry-After.
fn backoff_for(attempt: u32, retry_after: Option<Duration>) -> Duration {
    let backoff = Duration::from_millis(BASE_BACKOFF_MS * 2u64.pow(attempt));
    match retry_after {
        Some(after) if after > backoff => after,
        _ => backoff,
    }
}

// ── Tests ──
