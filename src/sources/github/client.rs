use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, warn};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, LINK, RETRY_AFTER};
use reqwest::{Client, Response, StatusCode};
use url::Url;

use super::types::PageBody;
use crate::auth::Token;
use crate::error::{DashboardError, Result};
use crate::sources::Category;

const PER_PAGE: &str = "100";

#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub request_timeout: Duration,
    /// Retries after the first attempt for rate limits, 5xx and transport errors.
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub max_pages: usize,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            max_pages: 10,
        }
    }
}

impl ClientOptions {
    fn backoff(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        let exponential = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)));
        retry_after
            .map_or(exponential, |hint| hint.max(exponential))
            .min(self.max_delay)
    }
}

#[derive(Debug)]
pub struct GitHubClient {
    client: Client,
    api_url: Url,
    token: Option<Token>,
    options: ClientOptions,
}

impl GitHubClient {
    pub fn new(base_url: &str, token: Option<Token>, options: ClientOptions) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));
        headers.insert(
            "x-github-api-version",
            HeaderValue::from_static("2022-11-28"),
        );

        let client = Client::builder()
            .user_agent(concat!("devops-dashboard/", env!("CARGO_PKG_VERSION")))
            .default_headers(headers)
            .timeout(options.request_timeout)
            .build()?;

        // Url::join drops the last path segment unless it ends with a slash
        let api_url = Url::parse(&format!("{}/", base_url.trim_end_matches('/')))
            .map_err(|e| DashboardError::Config(format!("Invalid API base URL: {e}")))?;

        Ok(Self {
            client,
            api_url,
            token,
            options,
        })
    }

    fn auth_request(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if let Some(token) = &self.token {
            request.bearer_auth(token.as_str())
        } else {
            request
        }
    }

    pub fn repo_url(&self, repo: &str, endpoint: &str) -> Result<Url> {
        Ok(self.api_url.join(&format!("repos/{repo}/{endpoint}"))?)
    }

    /// Walks `rel="next"` links starting at `url` until the listing is
    /// exhausted or `stop_after` returns true for the page just fetched.
    ///
    /// A listing that still has a next page after `max_pages` pages is an
    /// error rather than a silently shortened result.
    pub async fn fetch_paginated<P: PageBody>(
        &self,
        category: Category,
        mut url: Url,
        query: &[(&str, String)],
        stop_after: impl Fn(&[P::Item]) -> bool + Send,
    ) -> Result<Vec<P::Item>> {
        url.query_pairs_mut()
            .extend_pairs(query.iter().map(|(k, v)| (*k, v.as_str())))
            .append_pair("per_page", PER_PAGE)
            .append_pair("page", "1");

        let mut items = Vec::new();
        let mut next = Some(url);
        let mut pages = 0;

        while let Some(url) = next.take() {
            if pages == self.options.max_pages {
                return Err(DashboardError::Truncated { category, pages });
            }

            let response = self.get_with_retry(category, &url).await?;
            next = next_link(response.headers());

            let body = response.text().await.map_err(|e| DashboardError::Api {
                category,
                message: format!("failed to read response body: {e}"),
            })?;
            let batch = serde_json::from_str::<P>(&body)
                .map_err(|e| DashboardError::DataShape {
                    category,
                    message: e.to_string(),
                })?
                .into_items();
            pages += 1;

            debug!("Page {pages}: fetched {} {category}", batch.len());

            let done = batch.is_empty() || stop_after(&batch);
            items.extend(batch);
            if done {
                break;
            }
        }

        Ok(items)
    }

    async fn get_with_retry(&self, category: Category, url: &Url) -> Result<Response> {
        let mut attempt = 0;

        loop {
            attempt += 1;
            let exhausted = attempt > self.options.max_retries;
            let request = self.auth_request(self.client.get(url.clone()));

            let retry_after = match request.send().await {
                Ok(response) if response.status().is_success() => return Ok(response),
                Ok(response) if is_rate_limited(&response) => {
                    if exhausted {
                        return Err(DashboardError::RateLimited {
                            category,
                            attempts: attempt,
                        });
                    }
                    retry_after_hint(response.headers(), Utc::now())
                }
                Ok(response) if response.status().is_server_error() && !exhausted => None,
                Ok(response) => {
                    let status = response.status();
                    let body = response.text().await.unwrap_or_default();
                    return Err(DashboardError::Api {
                        category,
                        message: format!("{status} - {body}"),
                    });
                }
                Err(e) if is_transient(&e) && !exhausted => None,
                Err(e) => {
                    return Err(DashboardError::Api {
                        category,
                        message: e.to_string(),
                    })
                }
            };

            let delay = self.options.backoff(attempt, retry_after);
            warn!(
                "Request for {category} failed (attempt {attempt}/{}), retrying in {delay:?}",
                self.options.max_retries + 1
            );
            tokio::time::sleep(delay).await;
        }
    }
}

fn is_rate_limited(response: &Response) -> bool {
    match response.status() {
        StatusCode::TOO_MANY_REQUESTS => true,
        StatusCode::FORBIDDEN => {
            let headers = response.headers();
            headers
                .get("x-ratelimit-remaining")
                .is_some_and(|v| v.as_bytes() == b"0")
                || headers.contains_key(RETRY_AFTER)
        }
        _ => false,
    }
}

fn is_transient(error: &reqwest::Error) -> bool {
    error.is_timeout() || error.is_connect() || error.is_request()
}

/// Server-suggested wait: `retry-after` when present, otherwise the time
/// left until `x-ratelimit-reset` once the primary quota is spent.
fn retry_after_hint(headers: &HeaderMap, now: DateTime<Utc>) -> Option<Duration> {
    if let Some(seconds) = header_u64(headers, RETRY_AFTER.as_str()) {
        return Some(Duration::from_secs(seconds));
    }

    let exhausted = headers
        .get("x-ratelimit-remaining")
        .is_some_and(|v| v.as_bytes() == b"0");
    if !exhausted {
        return None;
    }

    // Reset is an epoch timestamp in seconds
    let reset = i64::try_from(header_u64(headers, "x-ratelimit-reset")?).ok()?;
    let wait = reset.saturating_sub(now.timestamp()).max(0);
    Some(Duration::from_secs(wait.unsigned_abs()))
}

fn header_u64(headers: &HeaderMap, name: &str) -> Option<u64> {
    headers.get(name)?.to_str().ok()?.trim().parse().ok()
}

fn next_link(headers: &HeaderMap) -> Option<Url> {
    let link = headers.get(LINK)?.to_str().ok()?;

    link.split(',').find_map(|entry| {
        let mut parts = entry.split(';');
        let target = parts
            .next()?
            .trim()
            .strip_prefix('<')?
            .strip_suffix('>')?;
        parts
            .any(|p| p.trim() == r#"rel="next""#)
            .then(|| Url::parse(target).ok())
            .flatten()
    })
}
