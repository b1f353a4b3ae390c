//! TokenRefresher processor.
//!
//! Exchanges every stored page token for a long-lived one and writes the new
//! token back to the [`CredentialStore`]. Like the event refresh, failures
//! are collected per page instead of aborting the pass.

use kanau::processor::Processor;
use serde::Serialize;
use std::convert::Infallible;
use std::sync::Arc;
use tracing::{info, warn};

use super::credentials::{CredentialStore, PageCredential};
use super::event_refresher::PageFailure;
use crate::graph::GraphClient;

/// Trigger for one token exchange pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenRefreshTick;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenRefreshed {
    pub page_id: String,
    /// Seconds until the new token expires, when the API says.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TokenRefreshReport {
    pub results: Vec<TokenRefreshed>,
    pub errors: Vec<PageFailure>,
}

pub struct TokenRefresher {
    graph: Arc<GraphClient>,
    credentials: Arc<CredentialStore>,
    app_id: String,
    app_secret: String,
}

impl TokenRefresher {
    pub fn new(
        graph: Arc<GraphClient>,
        credentials: Arc<CredentialStore>,
        app_id: impl Into<String>,
        app_secret: impl Into<String>,
    ) -> Self {
        Self {
            graph,
            credentials,
            app_id: app_id.into(),
            app_secret: app_secret.into(),
        }
    }
}

impl Processor<TokenRefreshTick> for TokenRefresher {
    type Output = TokenRefreshReport;
    type Error = Infallible;

    async fn process(&self, _tick: TokenRefreshTick) -> Result<TokenRefreshReport, Infallible> {
        let mut report = TokenRefreshReport::default();

        for credential in self.credentials.all() {
            let exchanged = self
                .graph
                .exchange_token(&self.app_id, &self.app_secret, &credential.access_token)
                .await;
            match exchanged {
                Ok(token) => {
                    self.credentials.upsert(PageCredential {
                        page_id: credential.page_id.clone(),
                        access_token: token.access_token,
                    });
                    report.results.push(TokenRefreshed {
                        page_id: credential.page_id,
                        expires_in: token.expires_in,
                    });
                }
                Err(e) => {
                    warn!(
                        page_id = %credential.page_id,
                        kind = %e.kind(),
                        error = %e,
                        "Failed to exchange page token"
                    );
                    report.errors.push(PageFailure {
                        page_id: credential.page_id,
                        kind: Some(e.kind()),
                        message: e.to_string(),
                    });
                }
            }
        }

        info!(
            refreshed = report.results.len(),
            failed = report.errors.len(),
            "Token refresh pass complete"
        );
        Ok(report)
    }
}
