//! Retrying Graph API client.
//!
//! Every call goes through [`GraphClient::fetch_json`]:
//!
//! 1. issue the GET through the [`GraphTransport`]
//! 2. non-2xx: classify with [`classify_failure`]; credential and permanent
//!    failures return at once, retryable ones back off and loop
//! 3. 2xx: the body must be JSON, otherwise `Malformed` without retry
//!
//! Transport failures are retried like retryable statuses. When the attempts
//! run out the last classified error is returned as-is.

use serde::de::DeserializeOwned;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use evsync_sdk::objects::Page;

use super::config::GraphClientConfig;
use super::error::GraphError;
use super::retry::{RetryPolicy, classify_failure};
use super::transport::{GraphTransport, ReqwestTransport};
use crate::logger::{Logger, default_logger};

/// Query parameters attached to a request.
pub type Query<'a> = [(&'a str, &'a str)];

pub struct GraphClient {
    transport: Arc<dyn GraphTransport>,
    base_url: Url,
    policy: RetryPolicy,
    config: GraphClientConfig,
    logger: Arc<dyn Logger>,
}

impl GraphClient {
    /// Create a client backed by `reqwest`.
    pub fn new(config: GraphClientConfig) -> Result<Self, GraphError> {
        let transport = Arc::new(ReqwestTransport::new(config.request_timeout()));
        Self::with_transport(config, transport)
    }

    /// Create a client over an arbitrary transport.
    pub fn with_transport(
        config: GraphClientConfig,
        transport: Arc<dyn GraphTransport>,
    ) -> Result<Self, GraphError> {
        let mut base = config.base_url.clone();
        if !base.ends_with('/') {
            base.push('/');
        }
        let base_url = Url::parse(&base)?;
        if base_url.cannot_be_a_base() {
            return Err(GraphError::InvalidUrl(base));
        }
        let policy = RetryPolicy::new(
            config.max_retries,
            Duration::from_millis(config.base_delay_ms),
        );
        Ok(Self {
            transport,
            base_url,
            policy,
            config,
            logger: default_logger(),
        })
    }

    /// Replace the default `tracing` logger.
    pub fn with_logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = logger;
        self
    }

    pub fn config(&self) -> &GraphClientConfig {
        &self.config
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.policy
    }

    pub(crate) fn logger(&self) -> &dyn Logger {
        self.logger.as_ref()
    }

    /// Build `{base_url}/{segments...}?{query}`. Segments are percent-encoded.
    pub fn endpoint(&self, segments: &[&str], query: &Query<'_>) -> Result<Url, GraphError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| GraphError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url)
    }

    /// GET `url` with classification and retry, returning the JSON body.
    pub async fn fetch_json(&self, url: &Url) -> Result<serde_json::Value, GraphError> {
        let endpoint = url.path();
        let mut attempt = 1u32;

        loop {
            match self.attempt(url).await {
                Ok(value) => {
                    if attempt > 1 {
                        self.logger.debug(
                            "Graph API call succeeded after retry",
                            &[("endpoint", &endpoint), ("attempt", &attempt)],
                        );
                    }
                    return Ok(value);
                }
                Err(err) if self.policy.should_retry(&err, attempt) => {
                    let delay = self.policy.backoff_delay(attempt);
                    let delay_ms = delay.as_millis();
                    let status = display_status(&err);
                    self.logger.warn(
                        "Graph API call failed, retrying",
                        &[
                            ("endpoint", &endpoint),
                            ("attempt", &attempt),
                            ("max_attempts", &self.policy.max_attempts),
                            ("status", &status),
                            ("kind", &err.kind()),
                            ("delay_ms", &delay_ms),
                        ],
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => {
                    let message = if err.is_retryable() {
                        "Graph API retry attempts exhausted"
                    } else {
                        "Graph API call failed"
                    };
                    self.logger.error(
                        message,
                        Some(&err),
                        &[
                            ("endpoint", &endpoint),
                            ("attempt", &attempt),
                            ("kind", &err.kind()),
                        ],
                    );
                    return Err(err);
                }
            }
        }
    }

    async fn attempt(&self, url: &Url) -> Result<serde_json::Value, GraphError> {
        let response = self.transport.get(url).await?;
        if !response.is_success() {
            return Err(classify_failure(response.status, &response.body));
        }
        let value: serde_json::Value =
            serde_json::from_slice(&response.body).map_err(GraphError::malformed)?;
        // An error envelope is a failure even under a 2xx status.
        if value.get("error").is_some_and(serde_json::Value::is_object) {
            return Err(classify_failure(response.status, &response.body));
        }
        Ok(value)
    }

    /// Fetch one page of a list endpoint. A body that is not an object reads
    /// as an empty page.
    pub async fn fetch_page<T: DeserializeOwned>(&self, url: &Url) -> Result<Page<T>, GraphError> {
        let value = self.fetch_json(url).await?;
        if !value.is_object() {
            return Ok(Page::default());
        }
        serde_json::from_value(value).map_err(GraphError::malformed)
    }

    /// Walk `paging.next` cursors from `initial` until a page has none.
    ///
    /// `query` is appended to cursors that come without a query string of
    /// their own. A cursor pointing back at a page already fetched fails the
    /// walk as [`GraphError::Malformed`].
    pub async fn fetch_all_pages<T: DeserializeOwned>(
        &self,
        initial: Url,
        query: &Query<'_>,
    ) -> Result<Vec<T>, GraphError> {
        let endpoint = initial.path().to_owned();
        let mut url = initial;
        let mut items = Vec::new();
        let mut pages = 0u32;
        let mut visited = HashSet::new();

        loop {
            let page: Page<T> = self.fetch_page(&url).await?;
            pages += 1;
            let next = page.next_url().map(str::to_owned);
            items.extend(page.data);
            visited.insert(url);
            let Some(next) = next else { break };
            url = self.resolve_cursor(&next, query)?;
            if visited.contains(&url) {
                self.logger.warn(
                    "Pagination cursor repeats an earlier page",
                    &[("endpoint", &endpoint), ("pages", &pages)],
                );
                return Err(GraphError::Malformed {
                    message: format!("paging.next repeats an earlier page after {pages} pages"),
                });
            }
        }

        let count = items.len();
        self.logger.info(
            "Fetched all pages",
            &[("endpoint", &endpoint), ("pages", &pages), ("items", &count)],
        );
        Ok(items)
    }

    /// Turn a `paging.next` value into the next request URL.
    pub fn resolve_cursor(&self, next: &str, query: &Query<'_>) -> Result<Url, GraphError> {
        let mut url = match Url::parse(next) {
            Ok(url) => url,
            Err(url::ParseError::RelativeUrlWithoutBase) => self.base_url.join(next)?,
            Err(e) => return Err(e.into()),
        };
        let has_query = url.query().is_some_and(|q| !q.is_empty());
        if !has_query && !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url)
    }
}

fn display_status(err: &GraphError) -> String {
    match err.status() {
        Some(status) => status.to_string(),
        None => "none".to_string(),
    }
}
