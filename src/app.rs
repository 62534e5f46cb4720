//! Application service container
//!
//! Every service is built once from the configuration and handed out by
//! reference. Nothing is looked up globally.

use crate::api::{ChatApiClient, ChatBackend, RetryPolicy};
use crate::auth::{AuthSession, CredentialProvider, Navigator};
use crate::chat::{ChatStore, InferenceClient};
use crate::config::Config;
use crate::error::Result;
use crate::policy::{PermissionsStore, PolicyClient};

use std::sync::Arc;

/// The wired-up services of one console run
///
/// Must be created inside a tokio runtime.
pub struct App {
    config: Config,
    auth: Arc<AuthSession>,
    chat: ChatStore,
    permissions: PermissionsStore,
    policy: Arc<PolicyClient>,
}

impl App {
    /// Validates `config` and builds every service
    ///
    /// # Errors
    ///
    /// Returns a configuration error when validation fails or the HTTP
    /// client cannot be built.
    pub fn new(config: Config, navigator: Arc<dyn Navigator>) -> Result<Self> {
        config.validate()?;
        let http = config.api.http_client()?;

        let auth = Arc::new(AuthSession::new(http.clone(), &config, navigator));
        let credentials: Arc<dyn CredentialProvider> = auth.clone();

        let backend: Arc<dyn ChatBackend> = Arc::new(ChatApiClient::new(
            http.clone(),
            &config.api,
            credentials.clone(),
        ));
        let responder = Arc::new(InferenceClient::new(
            http.clone(),
            &config.api,
            credentials.clone(),
        ));
        let chat = ChatStore::new(
            backend,
            responder,
            &config.chat,
            RetryPolicy::from_api_config(&config.api),
        );

        let policy = Arc::new(PolicyClient::new(http, &config.api).with_credentials(credentials));
        let permissions = PermissionsStore::new(policy.clone());

        tracing::debug!("Services built for {}", config.api.base());
        Ok(Self {
            config,
            auth,
            chat,
            permissions,
            policy,
        })
    }

    /// Effective configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The authentication session.
    pub fn auth(&self) -> &AuthSession {
        &self.auth
    }

    /// The chat store.
    pub fn chat(&self) -> &ChatStore {
        &self.chat
    }

    /// The permissions store.
    pub fn permissions(&self) -> &PermissionsStore {
        &self.permissions
    }

    /// The policy service client, for ad-hoc analyses.
    pub fn policy(&self) -> &PolicyClient {
        &self.policy
    }

    /// Loads sessions and policy analyses once signed in
    ///
    /// Returns `false` when not authenticated or the session list could not
    /// be loaded. Analysis failures are recorded on the permissions store.
    pub async fn initialize(&self) -> bool {
        if !self.auth.is_authenticated() {
            tracing::debug!("Not signed in; skipping initial load");
            return false;
        }

        let (sessions, analyses) = futures::future::join(
            self.chat.fetch_sessions(),
            self.permissions.fetch_analysis_results(),
        )
        .await;

        if let Err(e) = analyses {
            tracing::warn!("Policy analyses unavailable: {}", e);
        }
        match sessions {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("Chat sessions unavailable: {}", e);
                false
            }
        }
    }

    /// Drops all per-user state.
    pub fn clear(&self) {
        self.chat.reset_state();
        self.permissions.reset_state();
    }

    /// Clears local state and signs out at the provider.
    pub fn logout(&self) {
        self.clear();
        self.auth.logout();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::RecordingNavigator;

    #[tokio::test]
    async fn test_initialize_requires_authentication() {
        let app = App::new(Config::default(), Arc::new(RecordingNavigator::new())).unwrap();
        assert!(!app.initialize().await);
        assert!(!app.chat().has_sessions());
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected() {
        let mut config = Config::default();
        config.api.timeout_seconds = 0;
        assert!(App::new(config, Arc::new(RecordingNavigator::new())).is_err());
    }

    #[tokio::test]
    async fn test_logout_redirects_and_clears() {
        let navigator = Arc::new(RecordingNavigator::new());
        let app = App::new(Config::default(), navigator.clone()).unwrap();
        app.logout();
        assert_eq!(navigator.visited().len(), 1);
        assert!(app.chat().current_session().is_none());
        assert!(app.permissions().user_arns().is_empty());
    }
}
