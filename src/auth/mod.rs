//! OAuth authorization-code login for the identity provider
//!
//! # Module Layout
//!
//! - [`claims`]    -- JWT payload decoding and user id resolution
//! - [`navigator`] -- Redirect side effects for login and logout
//! - [`session`]   -- The authentication session state machine
//! - [`tokens`]    -- The in-memory token set

pub mod claims;
pub mod navigator;
pub mod session;
pub mod tokens;

pub use claims::{decode_jwt_claims, UserClaims};
pub use navigator::{BrowserNavigator, Navigator, RecordingNavigator};
pub use session::{AuthSession, AuthStatus};
pub use tokens::AuthTokenSet;

/// Supplies the identity and bearer token attached to backend requests.
///
/// Implemented by [`AuthSession`]; backend clients depend on this trait
/// rather than on the session itself.
pub trait CredentialProvider: Send + Sync {
    /// The resolved user identifier, or `None` when not signed in.
    fn user_id(&self) -> Option<String>;

    /// The bearer access token, when one is held.
    fn access_token(&self) -> Option<String>;
}

/// Fixed credentials, for tools and tests that already hold a token.
#[derive(Debug, Clone, Default)]
pub struct StaticCredentials {
    /// User identifier sent as `userId`
    pub user_id: Option<String>,
    /// Bearer token
    pub access_token: Option<String>,
}

impl StaticCredentials {
    /// Credentials for `user_id` with an optional bearer token.
    pub fn new(user_id: impl Into<String>, access_token: Option<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            access_token,
        }
    }
}

impl CredentialProvider for StaticCredentials {
    fn user_id(&self) -> Option<String> {
        self.user_id.clone().filter(|id| !id.is_empty())
    }

    fn access_token(&self) -> Option<String> {
        self.access_token.clone()
    }
}
