//! Configuration management for IAMGuard
//!
//! This module handles loading, parsing, validating, and managing
//! configuration from files, environment variables, and CLI overrides.

use crate::error::{IamGuardError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure for IAMGuard
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Identity provider settings
    #[serde(default)]
    pub auth: AuthConfig,
    /// Backend API settings
    #[serde(default)]
    pub api: ApiConfig,
    /// Chat store and typing animation settings
    #[serde(default)]
    pub chat: ChatConfig,
}

/// OAuth identity provider configuration
///
/// The provider base URL is derived from `domain` and `region` using the
/// Cognito hosted UI format, unless `provider_url` is set explicitly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// OAuth client identifier
    #[serde(default)]
    pub client_id: String,

    /// Optional client secret; enables HTTP Basic client authentication
    #[serde(default)]
    pub client_secret: Option<String>,

    /// Redirect URI registered with the provider
    #[serde(default = "default_redirect_uri")]
    pub redirect_uri: String,

    /// Hosted UI domain prefix
    #[serde(default)]
    pub domain: Option<String>,

    /// Region of the hosted UI domain
    #[serde(default = "default_region")]
    pub region: String,

    /// Explicit provider base URL (useful for tests and non-Cognito providers)
    #[serde(default)]
    pub provider_url: Option<String>,

    /// Space-separated scopes requested at login
    #[serde(default = "default_scope")]
    pub scope: String,

    /// Provider tag sent to the backend verification endpoint
    #[serde(default = "default_provider_tag")]
    pub provider_tag: String,
}

fn default_redirect_uri() -> String {
    "http://localhost:5173/redirect".to_string()
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_scope() -> String {
    "openid profile email".to_string()
}

fn default_provider_tag() -> String {
    "cognito".to_string()
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: None,
            redirect_uri: default_redirect_uri(),
            domain: None,
            region: default_region(),
            provider_url: None,
            scope: default_scope(),
            provider_tag: default_provider_tag(),
        }
    }
}

impl AuthConfig {
    /// Returns the identity provider base URL without a trailing slash
    ///
    /// `None` means the provider is unconfigured.
    ///
    /// # Examples
    ///
    /// ```
    /// use iamguard::config::AuthConfig;
    ///
    /// let mut auth = AuthConfig::default();
    /// assert!(auth.provider_base_url().is_none());
    ///
    /// auth.domain = Some("acme".to_string());
    /// assert_eq!(
    ///     auth.provider_base_url().as_deref(),
    ///     Some("https://acme.auth.us-east-1.amazoncognito.com")
    /// );
    /// ```
    pub fn provider_base_url(&self) -> Option<String> {
        if let Some(url) = self.provider_url.as_deref().filter(|u| !u.trim().is_empty()) {
            return Some(url.trim().trim_end_matches('/').to_string());
        }

        self.domain
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .map(|domain| format!("https://{}.auth.{}.amazoncognito.com", domain, self.region))
    }
}

/// Backend API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL of the backend
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Path prefix of the chat session resources
    #[serde(default = "default_chat_prefix")]
    pub chat_prefix: String,

    /// Per-request timeout (seconds)
    #[serde(default = "default_api_timeout")]
    pub timeout_seconds: u64,

    /// Extra attempts for read requests that fail at the transport level
    #[serde(default = "default_read_retries")]
    pub read_retries: u32,
}

fn default_base_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_chat_prefix() -> String {
    "/chat".to_string()
}

fn default_api_timeout() -> u64 {
    30
}

fn default_read_retries() -> u32 {
    2
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            chat_prefix: default_chat_prefix(),
            timeout_seconds: default_api_timeout(),
            read_retries: default_read_retries(),
        }
    }
}

impl ApiConfig {
    /// Base URL without a trailing slash
    pub fn base(&self) -> String {
        self.base_url.trim_end_matches('/').to_string()
    }

    /// Request timeout as a [`Duration`]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    /// Builds the shared HTTP client used by every backend collaborator
    ///
    /// # Errors
    ///
    /// Returns error if the TLS backend cannot be initialized
    pub fn http_client(&self) -> Result<reqwest::Client> {
        reqwest::Client::builder()
            .timeout(self.timeout())
            .build()
            .map_err(|e| IamGuardError::Config(format!("Failed to build HTTP client: {}", e)).into())
    }
}

/// Chat store and typing animation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Maximum sessions requested from the backend
    #[serde(default = "default_session_list_limit")]
    pub session_list_limit: usize,

    /// Typing delay per character (milliseconds)
    #[serde(default = "default_typing_speed_ms")]
    pub typing_speed_ms: u64,

    /// Upper bound on the whole typing animation (milliseconds)
    #[serde(default = "default_max_typing_ms")]
    pub max_typing_ms: u64,

    /// Push the revealed text to the backend every this many characters
    #[serde(default = "default_sync_stride")]
    pub sync_stride: usize,

    /// Whether the typing animation pushes progress to the backend
    #[serde(default = "default_persist_typing")]
    pub persist_typing: bool,

    /// Characters kept when deriving a title from the first message
    #[serde(default = "default_title_max_chars")]
    pub title_max_chars: usize,

    /// Seed illustrative sessions when the backend is unreachable
    #[serde(default)]
    pub dev_fallback: bool,
}

fn default_session_list_limit() -> usize {
    20
}

fn default_typing_speed_ms() -> u64 {
    10
}

fn default_max_typing_ms() -> u64 {
    2000
}

fn default_sync_stride() -> usize {
    10
}

fn default_persist_typing() -> bool {
    true
}

fn default_title_max_chars() -> usize {
    30
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            session_list_limit: default_session_list_limit(),
            typing_speed_ms: default_typing_speed_ms(),
            max_typing_ms: default_max_typing_ms(),
            sync_stride: default_sync_stride(),
            persist_typing: default_persist_typing(),
            title_max_chars: default_title_max_chars(),
            dev_fallback: false,
        }
    }
}

impl Config {
    /// Load configuration from file, environment, and CLI
    ///
    /// # Arguments
    ///
    /// * `path` - Path to configuration file
    /// * `cli` - CLI arguments for overrides
    ///
    /// # Returns
    ///
    /// Returns the loaded and merged configuration
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read or parsed
    pub fn load(path: &str, cli: &crate::cli::Cli) -> Result<Self> {
        let mut config = if Path::new(path).exists() {
            Self::from_file(path)?
        } else {
            tracing::warn!("Config file not found at {}, using defaults", path);
            Self::default()
        };

        config.apply_env_vars();
        config.apply_cli_overrides(cli);

        Ok(config)
    }

    /// Default configuration file location
    ///
    /// Prefers `config/config.yaml` in the working directory and falls back
    /// to the per-user configuration directory.
    pub fn default_path() -> PathBuf {
        let local = PathBuf::from("config/config.yaml");
        if local.exists() {
            return local;
        }

        directories::ProjectDirs::from("com", "iamguard", "iamguard")
            .map(|dirs| dirs.config_dir().join("config.yaml"))
            .unwrap_or(local)
    }

    fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| IamGuardError::Config(format!("Failed to read config file: {}", e)))?;
        serde_yaml::from_str(&contents)
            .map_err(|e| IamGuardError::Config(format!("Failed to parse config: {}", e)).into())
    }

    fn apply_env_vars(&mut self) {
        if let Ok(client_id) = std::env::var("COGNITO_CLIENT_ID") {
            self.auth.client_id = client_id;
        }

        if let Ok(secret) = std::env::var("COGNITO_CLIENT_SECRET") {
            self.auth.client_secret = Some(secret).filter(|s| !s.is_empty());
        }

        if let Ok(redirect_uri) = std::env::var("COGNITO_REDIRECT_URI") {
            self.auth.redirect_uri = redirect_uri;
        }

        if let Ok(domain) = std::env::var("COGNITO_DOMAIN") {
            self.auth.domain = Some(domain).filter(|d| !d.is_empty());
        }

        if let Ok(region) = std::env::var("COGNITO_REGION") {
            self.auth.region = region;
        }

        if let Ok(provider_url) = std::env::var("IAMGUARD_PROVIDER_URL") {
            tracing::debug!(provider_url = %provider_url, "Env override: IAMGUARD_PROVIDER_URL");
            self.auth.provider_url = Some(provider_url).filter(|u| !u.is_empty());
        }

        if let Ok(api_url) = std::env::var("API_URL") {
            self.api.base_url = api_url;
        }

        if let Ok(timeout) = std::env::var("IAMGUARD_API_TIMEOUT_SECONDS") {
            if let Ok(value) = timeout.parse() {
                self.api.timeout_seconds = value;
            } else {
                tracing::warn!("Invalid IAMGUARD_API_TIMEOUT_SECONDS: {}", timeout);
            }
        }

        if let Ok(fallback) = std::env::var("IAMGUARD_DEV_FALLBACK") {
            match fallback.to_lowercase().parse::<bool>() {
                Ok(v) => self.chat.dev_fallback = v,
                Err(_) => tracing::warn!("Invalid value for IAMGUARD_DEV_FALLBACK: {}", fallback),
            }
        }
    }

    fn apply_cli_overrides(&mut self, cli: &crate::cli::Cli) {
        if cli.verbose {
            tracing::debug!("Verbose mode enabled");
        }

        if let Some(api_url) = &cli.api_url {
            self.api.base_url = api_url.clone();
        }

        if cli.dev_fallback {
            self.chat.dev_fallback = true;
        }
    }

    /// Validate the configuration
    ///
    /// A missing identity provider domain is not a validation error; it is
    /// reported when a login is attempted.
    ///
    /// # Errors
    ///
    /// Returns error if any validation check fails
    pub fn validate(&self) -> Result<()> {
        if self.api.base_url.trim().is_empty() {
            return Err(IamGuardError::Config("api.base_url cannot be empty".to_string()).into());
        }

        if let Err(e) = url::Url::parse(&self.api.base_url) {
            return Err(IamGuardError::Config(format!(
                "api.base_url is not a valid URL ({}): {}",
                self.api.base_url, e
            ))
            .into());
        }

        if self.api.timeout_seconds == 0 {
            return Err(IamGuardError::Config(
                "api.timeout_seconds must be greater than 0".to_string(),
            )
            .into());
        }

        if self.chat.session_list_limit == 0 {
            return Err(IamGuardError::Config(
                "chat.session_list_limit must be greater than 0".to_string(),
            )
            .into());
        }

        if self.chat.typing_speed_ms == 0 || self.chat.max_typing_ms == 0 {
            return Err(IamGuardError::Config(
                "chat.typing_speed_ms and chat.max_typing_ms must be greater than 0".to_string(),
            )
            .into());
        }

        if self.chat.sync_stride == 0 {
            return Err(
                IamGuardError::Config("chat.sync_stride must be greater than 0".to_string()).into(),
            );
        }

        if self.chat.title_max_chars == 0 {
            return Err(IamGuardError::Config(
                "chat.title_max_chars must be greater than 0".to_string(),
            )
            .into());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.api.base_url, "http://localhost:8000");
        assert_eq!(config.api.chat_prefix, "/chat");
        assert_eq!(config.chat.session_list_limit, 20);
        assert_eq!(config.chat.typing_speed_ms, 10);
        assert_eq!(config.chat.max_typing_ms, 2000);
        assert_eq!(config.chat.sync_stride, 10);
        assert!(!config.chat.dev_fallback);
    }

    #[test]
    fn test_config_validation_success() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_config_validation_empty_base_url() {
        let mut config = Config::default();
        config.api.base_url = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_invalid_base_url() {
        let mut config = Config::default();
        config.api.base_url = "not a url".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_zero_timeout() {
        let mut config = Config::default();
        config.api.timeout_seconds = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_zero_stride() {
        let mut config = Config::default();
        config.chat.sync_stride = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_missing_domain_is_allowed() {
        let config = Config::default();
        assert!(config.auth.provider_base_url().is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_provider_url_override_wins_over_domain() {
        let auth = AuthConfig {
            domain: Some("acme".to_string()),
            provider_url: Some("http://127.0.0.1:9999/".to_string()),
            ..AuthConfig::default()
        };
        assert_eq!(
            auth.provider_base_url().as_deref(),
            Some("http://127.0.0.1:9999")
        );
    }

    #[test]
    fn test_provider_url_uses_region() {
        let auth = AuthConfig {
            domain: Some("acme".to_string()),
            region: "eu-west-1".to_string(),
            ..AuthConfig::default()
        };
        assert_eq!(
            auth.provider_base_url().as_deref(),
            Some("https://acme.auth.eu-west-1.amazoncognito.com")
        );
    }

    #[test]
    fn test_config_from_yaml() {
        let yaml = r#"
auth:
  client_id: abc123
  domain: acme
api:
  base_url: https://api.example.com
chat:
  typing_speed_ms: 5
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.auth.client_id, "abc123");
        assert_eq!(config.auth.region, "us-east-1");
        assert_eq!(config.api.base_url, "https://api.example.com");
        assert_eq!(config.api.timeout_seconds, 30);
        assert_eq!(config.chat.typing_speed_ms, 5);
        assert_eq!(config.chat.max_typing_ms, 2000);
    }

    #[test]
    #[serial]
    fn test_load_nonexistent_file_uses_defaults() {
        let cli = crate::cli::Cli::default();
        let config = Config::load("/nonexistent/iamguard.yaml", &cli).unwrap();
        assert_eq!(config.chat.session_list_limit, 20);
    }

    #[test]
    #[serial]
    fn test_load_from_file_applies_cli_overrides() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "api:\n  base_url: http://file.example\n").unwrap();

        let cli = crate::cli::Cli {
            api_url: Some("http://cli.example".to_string()),
            dev_fallback: true,
            ..Default::default()
        };
        let config = Config::load(path.to_str().unwrap(), &cli).unwrap();
        assert_eq!(config.api.base_url, "http://cli.example");
        assert!(config.chat.dev_fallback);
    }

    #[test]
    fn test_load_malformed_file_is_config_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "api: [unclosed").unwrap();

        let err = Config::load(path.to_str().unwrap(), &crate::cli::Cli::default()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<IamGuardError>(),
            Some(IamGuardError::Config(_))
        ));
    }

    #[test]
    #[serial]
    fn test_apply_env_vars_overrides_auth_and_api() {
        std::env::set_var("COGNITO_CLIENT_ID", "env-client");
        std::env::set_var("COGNITO_DOMAIN", "env-domain");
        std::env::set_var("COGNITO_CLIENT_SECRET", "");
        std::env::set_var("API_URL", "http://env.example");
        std::env::set_var("IAMGUARD_API_TIMEOUT_SECONDS", "not-a-number");

        let mut config = Config::default();
        config.apply_env_vars();

        std::env::remove_var("COGNITO_CLIENT_ID");
        std::env::remove_var("COGNITO_DOMAIN");
        std::env::remove_var("COGNITO_CLIENT_SECRET");
        std::env::remove_var("API_URL");
        std::env::remove_var("IAMGUARD_API_TIMEOUT_SECONDS");

        assert_eq!(config.auth.client_id, "env-client");
        assert_eq!(config.auth.domain.as_deref(), Some("env-domain"));
        assert!(config.auth.client_secret.is_none());
        assert_eq!(config.api.base_url, "http://env.example");
        assert_eq!(config.api.timeout_seconds, 30);
    }
}
