//! TOML file configuration structures.
//!
//! These structs directly map to the `evsync.toml` file format.

use evsync_core::graph::GraphClientConfig;
use evsync_core::processors::{PageCredential, RefreshConfig};
use evsync_core::rate_limit::{SlidingWindowConfig, TokenBucketConfig};
use serde::Deserialize;
use std::net::SocketAddr;

/// Root configuration structure as read from the TOML file.
#[derive(Clone, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub graph: GraphClientConfig,
    pub app: AppConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub refresh: RefreshConfig,
    #[serde(default)]
    pub pages: Vec<PageCredential>,
}

/// Server configuration section.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// The address and port to listen on (e.g., "0.0.0.0:8080").
    #[serde(default = "default_listen_addr")]
    pub listen: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen_addr(),
        }
    }
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

/// Graph app credentials and the secrets derived from them.
#[derive(Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub app_id: String,
    /// Signs webhook deliveries. May be left out and supplied through
    /// `EVSYNC_APP_SECRET`.
    #[serde(default)]
    pub app_secret: String,
    /// Echoed back by the subscription handshake.
    pub verify_token: String,
    /// Required in the `Evsync-Admin-Authorization` header on `/api` routes.
    /// Either plaintext or an argon2 hash (`$argon2id$...`).
    #[serde(default)]
    pub admin_secret: String,
    /// Key for OAuth state tokens. Falls back to `app_secret`.
    #[serde(default)]
    pub state_secret: Option<String>,
    /// How long an issued state token stays valid.
    #[serde(default = "default_state_ttl_secs")]
    pub state_ttl_secs: u64,
}

fn default_state_ttl_secs() -> u64 {
    600
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LimitsConfig {
    /// Inbound deliveries per page.
    #[serde(default)]
    pub webhook: SlidingWindowConfig,
    /// Outbound refresh calls per page.
    #[serde(default)]
    pub refresh: TokenBucketConfig,
}
