//! Token set held for the authenticated browsing session

use serde::{Deserialize, Serialize};
use std::fmt;

/// The three tokens returned by the identity provider.
///
/// Lives only in memory inside [`AuthSession`](super::session::AuthSession);
/// it is populated on a successful code exchange and dropped on logout.
/// `Debug` output redacts the token values.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthTokenSet {
    /// OpenID Connect identity token (JWT)
    pub id_token: String,
    /// OAuth access token, sent as the bearer credential
    pub access_token: String,
    /// Refresh token, when the provider issued one
    pub refresh_token: Option<String>,
}

impl fmt::Debug for AuthTokenSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthTokenSet")
            .field("id_token", &"<redacted>")
            .field("access_token", &"<redacted>")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

/// Raw JSON response from the provider's token endpoint.
#[derive(Debug, Deserialize)]
pub(crate) struct TokenResponse {
    pub id_token: String,
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

impl From<TokenResponse> for AuthTokenSet {
    fn from(raw: TokenResponse) -> Self {
        Self {
            id_token: raw.id_token,
            access_token: raw.access_token,
            refresh_token: raw.refresh_token.filter(|t| !t.is_empty()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_redacts_tokens() {
        let tokens = AuthTokenSet {
            id_token: "secret-id".to_string(),
            access_token: "secret-access".to_string(),
            refresh_token: Some("secret-refresh".to_string()),
        };
        let rendered = format!("{:?}", tokens);
        assert!(!rendered.contains("secret"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn test_token_response_without_refresh_token() {
        let raw: TokenResponse =
            serde_json::from_str(r#"{"id_token":"i","access_token":"a","token_type":"Bearer"}"#)
                .unwrap();
        let tokens = AuthTokenSet::from(raw);
        assert_eq!(tokens.access_token, "a");
        assert!(tokens.refresh_token.is_none());
    }

    #[test]
    fn test_empty_refresh_token_becomes_none() {
        let raw: TokenResponse =
            serde_json::from_str(r#"{"id_token":"i","access_token":"a","refresh_token":""}"#)
                .unwrap();
        assert!(AuthTokenSet::from(raw).refresh_token.is_none());
    }
}
