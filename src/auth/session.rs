//! Authentication session: OAuth authorization-code login and logout
//!
//! [`AuthSession`] owns the token set and decoded user claims for the
//! lifetime of the process. It drives the hosted-UI login redirect, the
//! authorization-code exchange at the provider's token endpoint, advisory
//! verification against the backend, and logout.
//!
//! # State machine
//!
//! ```text
//! Anonymous --exchange--> Exchanging --ok--> Authenticated --logout--> Anonymous
//!                                   \--err--> Anonymous (+ error)
//! ```

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::Deserialize;
use url::Url;

use crate::auth::claims::{decode_jwt_claims, UserClaims};
use crate::auth::navigator::Navigator;
use crate::auth::tokens::{AuthTokenSet, TokenResponse};
use crate::auth::CredentialProvider;
use crate::config::{AuthConfig, Config};
use crate::error::{IamGuardError, Result};

/// Lifecycle stage of the authentication session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthStatus {
    /// No tokens held
    #[default]
    Anonymous,
    /// Authorization code exchange in flight
    Exchanging,
    /// Tokens held and claims decoded
    Authenticated,
}

#[derive(Debug, Default)]
struct AuthState {
    status: AuthStatus,
    user: Option<UserClaims>,
    tokens: Option<AuthTokenSet>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VerifyResponse {
    #[serde(default)]
    status: Option<String>,
}

/// Process-wide authentication session.
///
/// Construct once at start-up and share through an `Arc`; all methods take
/// `&self`. The internal lock is never held across an `.await`.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use iamguard::auth::navigator::RecordingNavigator;
/// use iamguard::auth::session::{AuthSession, AuthStatus};
/// use iamguard::config::Config;
///
/// let mut config = Config::default();
/// config.auth.client_id = "client".to_string();
/// config.auth.domain = Some("acme".to_string());
///
/// let nav = Arc::new(RecordingNavigator::new());
/// let auth = AuthSession::new(reqwest::Client::new(), &config, nav.clone());
///
/// auth.initiate_login().unwrap();
/// assert!(nav.last().unwrap().starts_with("https://acme.auth.us-east-1.amazoncognito.com/login?"));
/// assert_eq!(auth.status(), AuthStatus::Anonymous);
/// ```
pub struct AuthSession {
    http: reqwest::Client,
    config: AuthConfig,
    api_base: String,
    navigator: Arc<dyn Navigator>,
    state: RwLock<AuthState>,
}

impl AuthSession {
    /// Creates an anonymous session.
    ///
    /// # Arguments
    ///
    /// * `http` - Shared HTTP client
    /// * `config` - Full configuration; the auth section and API base URL are used
    /// * `navigator` - Receives the login and logout redirects
    pub fn new(http: reqwest::Client, config: &Config, navigator: Arc<dyn Navigator>) -> Self {
        Self {
            http,
            config: config.auth.clone(),
            api_base: config.api.base(),
            navigator,
            state: RwLock::new(AuthState::default()),
        }
    }

    fn read_state(&self) -> RwLockReadGuard<'_, AuthState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, AuthState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current lifecycle stage.
    pub fn status(&self) -> AuthStatus {
        self.read_state().status
    }

    /// `true` once a code exchange succeeded and until logout.
    pub fn is_authenticated(&self) -> bool {
        self.status() == AuthStatus::Authenticated
    }

    /// `true` while a code exchange is in flight.
    pub fn is_loading(&self) -> bool {
        self.status() == AuthStatus::Exchanging
    }

    /// Decoded identity token claims.
    pub fn user(&self) -> Option<UserClaims> {
        self.read_state().user.clone()
    }

    /// Tokens held for this session.
    pub fn tokens(&self) -> Option<AuthTokenSet> {
        self.read_state().tokens.clone()
    }

    /// Last error message, cleared by the next login or exchange.
    pub fn error(&self) -> Option<String> {
        self.read_state().error.clone()
    }

    fn record_error(&self, message: String) {
        self.write_state().error = Some(message);
    }

    fn require_provider(&self) -> Result<String> {
        let base = self.config.provider_base_url().ok_or_else(|| {
            IamGuardError::Config(
                "identity provider domain is not configured; set COGNITO_DOMAIN".to_string(),
            )
        })?;

        if self.config.client_id.trim().is_empty() {
            return Err(IamGuardError::Config(
                "OAuth client id is not configured; set COGNITO_CLIENT_ID".to_string(),
            )
            .into());
        }

        Ok(base)
    }

    /// Builds the hosted-UI authorization URL.
    ///
    /// # Errors
    ///
    /// Returns [`IamGuardError::Config`] when the provider domain or client
    /// id is missing.
    pub fn authorization_url(&self) -> Result<Url> {
        let base = self.require_provider()?;
        let mut url = Url::parse(&format!("{}/login", base))
            .map_err(|e| IamGuardError::Config(format!("invalid provider URL: {e}")))?;

        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.config.client_id)
            .append_pair("redirect_uri", &self.config.redirect_uri)
            .append_pair("scope", &self.config.scope);

        Ok(url)
    }

    /// Starts the login flow by redirecting to the provider's hosted UI.
    ///
    /// Fails fast, recording the error and performing no redirect, when the
    /// provider is unconfigured.
    ///
    /// # Errors
    ///
    /// Returns [`IamGuardError::Config`] when the provider domain or client
    /// id is missing.
    pub fn initiate_login(&self) -> Result<()> {
        self.write_state().error = None;

        match self.authorization_url() {
            Ok(url) => {
                tracing::debug!(url = %url, "Redirecting to identity provider login");
                self.navigator.redirect(url.as_str());
                Ok(())
            }
            Err(e) => {
                tracing::error!("Login initiation error: {}", e);
                self.record_error(e.to_string());
                Err(e)
            }
        }
    }

    /// Exchanges an authorization code for tokens.
    ///
    /// On success the identity token claims are decoded, the session
    /// becomes authenticated, and the tokens are verified with the backend.
    /// Verification is advisory: a failure is logged and the session stays
    /// authenticated.
    ///
    /// Never returns an error. Failures are recorded in [`error`](Self::error)
    /// and reported as `false`.
    pub async fn exchange_code_for_tokens(&self, code: &str) -> bool {
        let previous = {
            let mut state = self.write_state();
            let previous = state.status;
            state.status = AuthStatus::Exchanging;
            state.error = None;
            previous
        };

        match self.request_tokens(code).await {
            Ok(tokens) => {
                let user = decode_jwt_claims(&tokens.id_token);
                if user.is_none() {
                    tracing::warn!("Identity token payload could not be decoded");
                }

                {
                    let mut state = self.write_state();
                    state.tokens = Some(tokens);
                    state.user = user;
                    state.status = AuthStatus::Authenticated;
                }
                tracing::info!("Authorization code exchanged; session authenticated");

                if !self.verify_with_backend().await {
                    tracing::warn!("Backend token verification did not succeed; keeping session");
                }
                true
            }
            Err(e) => {
                tracing::error!("Token exchange error: {}", e);
                let mut state = self.write_state();
                state.status = if previous == AuthStatus::Authenticated {
                    AuthStatus::Authenticated
                } else {
                    AuthStatus::Anonymous
                };
                state.error = Some(e.to_string());
                false
            }
        }
    }

    async fn request_tokens(&self, code: &str) -> Result<AuthTokenSet> {
        let code = code.trim();
        if code.is_empty() {
            return Err(IamGuardError::Authentication("authorization code is empty".to_string()).into());
        }

        let base = self.require_provider()?;
        let token_endpoint = format!("{}/oauth2/token", base);

        let mut params: HashMap<&str, &str> = HashMap::new();
        params.insert("grant_type", "authorization_code");
        params.insert("client_id", &self.config.client_id);
        params.insert("code", code);
        params.insert("redirect_uri", &self.config.redirect_uri);

        let mut request = self.http.post(&token_endpoint).form(&params);
        if let Some(secret) = self.config.client_secret.as_deref().filter(|s| !s.is_empty()) {
            request = request.basic_auth(&self.config.client_id, Some(secret));
        }

        tracing::debug!(endpoint = %token_endpoint, "Token exchange request");
        let resp = request.send().await.map_err(|e| {
            IamGuardError::Authentication(format!("token exchange request failed: {e}"))
        })?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(IamGuardError::Authentication(format!(
                "token endpoint returned {status}: {body}"
            ))
            .into());
        }

        let raw: TokenResponse = resp.json().await.map_err(|e| {
            IamGuardError::Authentication(format!("failed to parse token response: {e}"))
        })?;

        Ok(raw.into())
    }

    /// Sends the held tokens to the backend verification endpoint.
    ///
    /// Returns `true` only when the backend answers `{"status": "success"}`.
    /// Errors are logged and reported as `false`; authentication state is
    /// never changed here.
    pub async fn verify_with_backend(&self) -> bool {
        let Some(tokens) = self.tokens() else {
            tracing::debug!("No tokens to verify");
            return false;
        };

        let url = format!("{}/auth/verify-token", self.api_base);
        let body = serde_json::json!({
            "id_token": tokens.id_token,
            "access_token": tokens.access_token,
            "refresh_token": tokens.refresh_token,
            "provider": self.config.provider_tag,
        });

        let resp = match self.http.post(&url).json(&body).send().await {
            Ok(resp) => resp,
            Err(e) => {
                tracing::error!("Backend token verification error: {}", e);
                return false;
            }
        };

        if !resp.status().is_success() {
            tracing::error!("Backend token verification returned {}", resp.status());
            return false;
        }

        match resp.json::<VerifyResponse>().await {
            Ok(verify) => {
                tracing::debug!(status = ?verify.status, "Token verification response");
                verify.status.as_deref() == Some("success")
            }
            Err(e) => {
                tracing::error!("Failed to parse token verification response: {}", e);
                false
            }
        }
    }

    /// The provider logout URL, or `None` when the provider is unconfigured.
    pub fn logout_url(&self) -> Option<String> {
        let base = self.config.provider_base_url()?;
        let mut url = Url::parse(&format!("{}/logout", base)).ok()?;
        url.query_pairs_mut()
            .append_pair("client_id", &self.config.client_id)
            .append_pair("logout_uri", &self.config.redirect_uri);
        Some(url.to_string())
    }

    /// Clears tokens and claims, then redirects to the provider logout page.
    ///
    /// Without a configured provider only the local state is cleared and the
    /// redirect goes to the local redirect URI.
    pub fn logout(&self) {
        {
            let mut state = self.write_state();
            state.user = None;
            state.tokens = None;
            state.status = AuthStatus::Anonymous;
        }
        tracing::info!("Signed out");

        match self.logout_url() {
            Some(url) => self.navigator.redirect(&url),
            None => {
                tracing::error!("Identity provider domain is not configured; local logout only");
                self.navigator.redirect(&self.config.redirect_uri);
            }
        }
    }
}

impl CredentialProvider for AuthSession {
    fn user_id(&self) -> Option<String> {
        let state = self.read_state();
        if state.status != AuthStatus::Authenticated {
            return None;
        }
        state.user.as_ref().and_then(UserClaims::user_id)
    }

    fn access_token(&self) -> Option<String> {
        self.read_state()
            .tokens
            .as_ref()
            .map(|t| t.access_token.clone())
            .filter(|t| !t.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::navigator::RecordingNavigator;

    fn session_with(auth: AuthConfig) -> (AuthSession, Arc<RecordingNavigator>) {
        let config = Config {
            auth,
            ..Config::default()
        };
        let nav = Arc::new(RecordingNavigator::new());
        let session = AuthSession::new(reqwest::Client::new(), &config, nav.clone());
        (session, nav)
    }

    fn configured() -> AuthConfig {
        AuthConfig {
            client_id: "client-1".to_string(),
            domain: Some("acme".to_string()),
            redirect_uri: "http://localhost:5173/redirect".to_string(),
            ..AuthConfig::default()
        }
    }

    #[test]
    fn test_authorization_url_contains_required_params() {
        let (session, _) = session_with(configured());
        let url = session.authorization_url().unwrap();
        let pairs: HashMap<String, String> = url.query_pairs().into_owned().collect();

        assert_eq!(url.path(), "/login");
        assert_eq!(pairs.get("response_type").map(String::as_str), Some("code"));
        assert_eq!(pairs.get("client_id").map(String::as_str), Some("client-1"));
        assert_eq!(
            pairs.get("redirect_uri").map(String::as_str),
            Some("http://localhost:5173/redirect")
        );
        assert_eq!(
            pairs.get("scope").map(String::as_str),
            Some("openid profile email")
        );
    }

    #[test]
    fn test_initiate_login_without_domain_records_error() {
        let (session, nav) = session_with(AuthConfig {
            client_id: "client-1".to_string(),
            ..AuthConfig::default()
        });

        assert!(session.initiate_login().is_err());
        assert!(nav.visited().is_empty());
        assert!(session.error().unwrap().contains("COGNITO_DOMAIN"));
        assert_eq!(session.status(), AuthStatus::Anonymous);
    }

    #[test]
    fn test_initiate_login_without_client_id_records_error() {
        let (session, nav) = session_with(AuthConfig {
            domain: Some("acme".to_string()),
            ..AuthConfig::default()
        });

        assert!(session.initiate_login().is_err());
        assert!(nav.visited().is_empty());
        assert!(session.error().unwrap().contains("client id"));
    }

    #[test]
    fn test_initiate_login_redirects() {
        let (session, nav) = session_with(configured());
        session.initiate_login().unwrap();
        assert_eq!(nav.visited().len(), 1);
        assert!(session.error().is_none());
    }

    #[test]
    fn test_logout_without_domain_redirects_locally() {
        let (session, nav) = session_with(AuthConfig::default());
        session.logout();
        assert_eq!(nav.last().as_deref(), Some("http://localhost:5173/redirect"));
        assert_eq!(session.status(), AuthStatus::Anonymous);
    }

    #[test]
    fn test_logout_url_targets_provider() {
        let (session, _) = session_with(configured());
        let url = session.logout_url().unwrap();
        assert!(url.starts_with("https://acme.auth.us-east-1.amazoncognito.com/logout?"));
        assert!(url.contains("client_id=client-1"));
        assert!(url.contains("logout_uri="));
    }

    #[test]
    fn test_anonymous_session_has_no_credentials() {
        let (session, _) = session_with(configured());
        assert!(session.user_id().is_none());
        assert!(session.access_token().is_none());
    }

    #[tokio::test]
    async fn test_exchange_with_empty_code_fails_without_network() {
        let (session, _) = session_with(configured());
        assert!(!session.exchange_code_for_tokens("   ").await);
        assert_eq!(session.status(), AuthStatus::Anonymous);
        assert!(session.error().unwrap().contains("empty"));
    }

    #[tokio::test]
    async fn test_exchange_without_provider_fails() {
        let (session, _) = session_with(AuthConfig::default());
        assert!(!session.exchange_code_for_tokens("code").await);
        assert!(!session.is_authenticated());
        assert!(!session.is_loading());
        assert!(session.error().is_some());
    }
}
