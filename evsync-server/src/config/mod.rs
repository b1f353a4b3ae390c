//! Configuration module for evsync-server.
//!
//! Handles loading configuration from the TOML file, CLI arguments,
//! and environment variables.

pub mod file;

use crate::config::file::{AppConfig, FileConfig, LimitsConfig, ServerConfig};
use evsync_core::graph::GraphClientConfig;
use evsync_core::processors::{PageCredential, RefreshConfig};
use evsync_sdk::signature::constant_time_eq;
use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Environment variable that may carry the app secret.
pub const APP_SECRET_ENV: &str = "EVSYNC_APP_SECRET";

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("validation error: {0}")]
    ValidationError(String),
}

/// The admin secret as configured: plaintext, or an argon2 PHC string
/// (`$argon2id$...`).
#[derive(Clone)]
pub enum AdminSecret {
    Plain(Box<[u8]>),
    Argon2(String),
}

impl AdminSecret {
    fn parse(configured: String) -> Result<Self, ConfigError> {
        if configured.starts_with("$argon2") {
            argon2::PasswordHash::new(&configured).map_err(|e| {
                ConfigError::ValidationError(format!("app.admin_secret is not a valid hash: {e}"))
            })?;
            Ok(AdminSecret::Argon2(configured))
        } else {
            Ok(AdminSecret::Plain(configured.into_bytes().into_boxed_slice()))
        }
    }

    pub fn verify(&self, provided: &[u8]) -> bool {
        match self {
            AdminSecret::Plain(secret) => constant_time_eq(provided, secret),
            AdminSecret::Argon2(hash) => {
                use argon2::{Argon2, PasswordHash, PasswordVerifier};
                PasswordHash::new(hash).is_ok_and(|parsed| {
                    Argon2::default().verify_password(provided, &parsed).is_ok()
                })
            }
        }
    }
}

/// Secrets and app identity, ready for use.
#[derive(Clone)]
pub struct AppSecrets {
    pub app_id: String,
    pub app_secret: Box<[u8]>,
    pub verify_token: String,
    pub state_secret: Box<[u8]>,
    pub state_ttl: Duration,
    pub admin_secret: AdminSecret,
}

impl std::fmt::Debug for AppSecrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppSecrets")
            .field("app_id", &self.app_id)
            .field("state_ttl", &self.state_ttl)
            .finish_non_exhaustive()
    }
}

/// Loaded configuration result containing all parts.
pub struct LoadedConfig {
    pub server: ServerConfig,
    pub graph: GraphClientConfig,
    pub app: AppSecrets,
    pub limits: LimitsConfig,
    pub refresh: RefreshConfig,
    pub pages: Vec<PageCredential>,
}

/// Configuration loader that handles the complete loading process.
pub struct ConfigLoader {
    config_path: PathBuf,
    listen_override: Option<SocketAddr>,
    app_secret_override: Option<String>,
}

impl ConfigLoader {
    /// Create a new config loader.
    pub fn new(
        config_path: impl AsRef<Path>,
        listen_override: Option<SocketAddr>,
        app_secret_override: Option<String>,
    ) -> Self {
        Self {
            config_path: config_path.as_ref().to_path_buf(),
            listen_override,
            app_secret_override,
        }
    }

    pub fn path(&self) -> &Path {
        &self.config_path
    }

    /// Read, override, and validate the configuration file.
    pub fn load(&self) -> Result<LoadedConfig, ConfigError> {
        let config_content = std::fs::read_to_string(&self.config_path)?;
        self.parse(&config_content)
    }

    /// Same as [`load`](Self::load), used on SIGHUP.
    pub fn reload(&self) -> Result<LoadedConfig, ConfigError> {
        self.load()
    }

    fn parse(&self, content: &str) -> Result<LoadedConfig, ConfigError> {
        let mut file_config: FileConfig = toml::from_str(content)?;

        // CLI and environment take precedence over the file.
        if let Some(listen) = self.listen_override {
            file_config.server.listen = listen;
        }
        if let Some(secret) = self.app_secret_override.as_ref().filter(|s| !s.is_empty()) {
            file_config.app.app_secret = secret.clone();
        }

        validate(&file_config)?;
        build_loaded_config(file_config)
    }
}

fn validate(config: &FileConfig) -> Result<(), ConfigError> {
    if config.app.app_secret.is_empty() {
        return Err(ConfigError::ValidationError(format!(
            "app.app_secret is empty and {APP_SECRET_ENV} is not set"
        )));
    }
    if config.app.verify_token.is_empty() {
        return Err(ConfigError::ValidationError(
            "app.verify_token must not be empty".to_string(),
        ));
    }
    if config.app.admin_secret.is_empty() {
        return Err(ConfigError::ValidationError(
            "app.admin_secret must not be empty".to_string(),
        ));
    }
    if config.app.state_ttl_secs == 0 {
        return Err(ConfigError::ValidationError(
            "app.state_ttl_secs must be positive".to_string(),
        ));
    }
    if config.graph.max_retries == 0 {
        return Err(ConfigError::ValidationError(
            "graph.max_retries must be at least 1".to_string(),
        ));
    }
    if config.limits.webhook.window_ms == 0 {
        return Err(ConfigError::ValidationError(
            "limits.webhook.window_ms must be positive".to_string(),
        ));
    }
    let refresh = &config.limits.refresh;
    if !(refresh.capacity.is_finite() && refresh.capacity >= 1.0) {
        return Err(ConfigError::ValidationError(
            "limits.refresh.capacity must be at least 1".to_string(),
        ));
    }
    if !(refresh.refill_rate_per_second.is_finite() && refresh.refill_rate_per_second >= 0.0) {
        return Err(ConfigError::ValidationError(
            "limits.refresh.refill_rate_per_second must not be negative".to_string(),
        ));
    }

    let mut seen = HashSet::new();
    for page in &config.pages {
        if page.page_id.is_empty() || page.access_token.is_empty() {
            return Err(ConfigError::ValidationError(
                "every [[pages]] entry needs page_id and access_token".to_string(),
            ));
        }
        if !seen.insert(page.page_id.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "page {} is configured twice",
                page.page_id
            )));
        }
    }
    Ok(())
}

fn build_loaded_config(file_config: FileConfig) -> Result<LoadedConfig, ConfigError> {
    Ok(LoadedConfig {
        server: file_config.server,
        graph: file_config.graph,
        app: convert_app(file_config.app)?,
        limits: file_config.limits,
        refresh: file_config.refresh,
        pages: file_config.pages,
    })
}

fn convert_app(app: AppConfig) -> Result<AppSecrets, ConfigError> {
    let state_secret = app
        .state_secret
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| app.app_secret.clone());
    Ok(AppSecrets {
        app_id: app.app_id,
        app_secret: app.app_secret.into_bytes().into_boxed_slice(),
        verify_token: app.verify_token,
        state_secret: state_secret.into_bytes().into_boxed_slice(),
        state_ttl: Duration::from_secs(app.state_ttl_secs),
        admin_secret: AdminSecret::parse(app.admin_secret)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = r#"
[app]
app_id = "1234"
app_secret = "from-file"
verify_token = "handshake"
admin_secret = "operator"
"#;

    fn loader(listen: Option<SocketAddr>, secret: Option<&str>) -> ConfigLoader {
        ConfigLoader::new("unused.toml", listen, secret.map(str::to_owned))
    }

    fn validation_message(result: Result<LoadedConfig, ConfigError>) -> String {
        match result {
            Err(ConfigError::ValidationError(message)) => message,
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("expected a validation error"),
        }
    }

    #[test]
    fn test_overrides_take_precedence() {
        let listen: SocketAddr = "127.0.0.1:9000".parse().unwrap();
        let loaded = loader(Some(listen), Some("from-env")).parse(BASE).unwrap();
        assert_eq!(loaded.server.listen, listen);
        assert_eq!(&*loaded.app.app_secret, b"from-env");
        // The state key follows the effective app secret.
        assert_eq!(&*loaded.app.state_secret, b"from-env");
    }

    #[test]
    fn test_empty_override_is_ignored() {
        let loaded = loader(None, Some("")).parse(BASE).unwrap();
        assert_eq!(&*loaded.app.app_secret, b"from-file");
    }

    #[test]
    fn test_separate_state_secret() {
        let content = format!("{BASE}state_secret = \"state-key\"\n");
        let loaded = loader(None, None).parse(&content).unwrap();
        assert_eq!(&*loaded.app.state_secret, b"state-key");
        assert_eq!(loaded.app.state_ttl, Duration::from_secs(600));
    }

    #[test]
    fn test_missing_secret_is_rejected() {
        let content = "[app]\nverify_token = \"v\"\n";
        let message = validation_message(loader(None, None).parse(content));
        assert!(message.contains(APP_SECRET_ENV));
    }

    #[test]
    fn test_missing_admin_secret_is_rejected() {
        let content = "[app]\napp_secret = \"s\"\nverify_token = \"v\"\n";
        let message = validation_message(loader(None, None).parse(content));
        assert!(message.contains("admin_secret"));
    }

    #[test]
    fn test_admin_secret_plain_and_hashed() {
        use argon2::{Argon2, PasswordHasher, password_hash::SaltString};

        let loaded = loader(None, None).parse(BASE).unwrap();
        assert!(loaded.app.admin_secret.verify(b"operator"));
        assert!(!loaded.app.admin_secret.verify(b"operatoR"));

        let salt = SaltString::encode_b64(b"evsync-test-salt").unwrap();
        let hash = Argon2::default()
            .hash_password(b"operator", &salt)
            .unwrap()
            .to_string();
        let content = BASE.replace("\"operator\"", &format!("\"{hash}\""));
        let loaded = loader(None, None).parse(&content).unwrap();
        assert!(matches!(loaded.app.admin_secret, AdminSecret::Argon2(_)));
        assert!(loaded.app.admin_secret.verify(b"operator"));
        assert!(!loaded.app.admin_secret.verify(b"other"));

        let broken = BASE.replace("\"operator\"", "\"$argon2id$v=19$m=19456,t=2,p=1$!!!$###\"");
        let message = validation_message(loader(None, None).parse(&broken));
        assert!(message.contains("not a valid hash"));
    }

    #[test]
    fn test_duplicate_pages_are_rejected() {
        let content = format!(
            "{BASE}\n[[pages]]\npage_id = \"1\"\naccess_token = \"a\"\n\n[[pages]]\npage_id = \"1\"\naccess_token = \"b\"\n"
        );
        let message = validation_message(loader(None, None).parse(&content));
        assert!(message.contains("configured twice"));
    }

    #[test]
    fn test_zero_window_is_rejected() {
        let content = format!("{BASE}\n[limits.webhook]\nmax_requests = 1\nwindow_ms = 0\n");
        let message = validation_message(loader(None, None).parse(&content));
        assert!(message.contains("window_ms"));
    }

    #[test]
    fn test_debug_hides_secrets() {
        let loaded = loader(None, None).parse(BASE).unwrap();
        let debug = format!("{:?}", loaded.app);
        assert!(!debug.contains("from-file"));
        assert!(!debug.contains("operator"));
    }

    #[test]
    fn test_missing_file() {
        let result = ConfigLoader::new("/nonexistent/evsync.toml", None, None).load();
        assert!(matches!(result, Err(ConfigError::IoError(_))));
    }
}
