//! Page access tokens known to the service.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

/// A page id and the page access token used to read its events.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageCredential {
    pub page_id: String,
    #[serde(skip_serializing)]
    pub access_token: String,
}

impl std::fmt::Debug for PageCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageCredential")
            .field("page_id", &self.page_id)
            .field("access_token", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Default)]
pub struct CredentialStore {
    tokens: RwLock<HashMap<String, String>>,
}

impl CredentialStore {
    pub fn new(credentials: impl IntoIterator<Item = PageCredential>) -> Self {
        let tokens = credentials
            .into_iter()
            .map(|c| (c.page_id, c.access_token))
            .collect();
        Self {
            tokens: RwLock::new(tokens),
        }
    }

    pub fn token_for(&self, page_id: &str) -> Option<String> {
        self.tokens
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(page_id)
            .cloned()
    }

    /// Insert or replace the token for a page.
    pub fn upsert(&self, credential: PageCredential) {
        self.tokens
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(credential.page_id, credential.access_token);
    }

    /// Swap the whole set, e.g. after a configuration reload.
    pub fn replace(&self, credentials: impl IntoIterator<Item = PageCredential>) {
        let tokens = credentials
            .into_iter()
            .map(|c| (c.page_id, c.access_token))
            .collect();
        *self.tokens.write().unwrap_or_else(PoisonError::into_inner) = tokens;
    }

    pub fn remove(&self, page_id: &str) -> bool {
        self.tokens
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(page_id)
            .is_some()
    }

    /// Snapshot of every credential, ordered by page id.
    pub fn all(&self) -> Vec<PageCredential> {
        let mut all: Vec<PageCredential> = self
            .tokens
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(page_id, access_token)| PageCredential {
                page_id: page_id.clone(),
                access_token: access_token.clone(),
            })
            .collect();
        all.sort_by(|a, b| a.page_id.cmp(&b.page_id));
        all
    }

    pub fn len(&self) -> usize {
        self.tokens.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
