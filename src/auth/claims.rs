//! Identity token claims
//!
//! The identity provider returns a signed JWT as `id_token`. The client only
//! needs its payload (the user's claims); signature verification is the
//! backend's job via `/auth/verify-token`.

use base64::Engine as _;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Claims the user id is resolved from, in priority order.
const USER_ID_CLAIMS: [&str; 4] = ["sub", "cognito:username", "username", "email"];

/// Decoded identity token claims.
///
/// A thin wrapper around the JSON object in the token payload.
///
/// # Examples
///
/// ```
/// use iamguard::auth::claims::UserClaims;
///
/// let claims: UserClaims = serde_json::from_str(r#"{"sub":"abc","email":"a@b.c"}"#).unwrap();
/// assert_eq!(claims.user_id().as_deref(), Some("abc"));
/// assert_eq!(claims.email(), Some("a@b.c"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserClaims(Map<String, Value>);

impl UserClaims {
    /// Returns the string value of `claim`, if present and a string.
    pub fn get_str(&self, claim: &str) -> Option<&str> {
        self.0.get(claim).and_then(Value::as_str)
    }

    /// Resolves the identifier the backend keys user data on.
    ///
    /// Tries `sub`, `cognito:username`, `username` and `email` in that
    /// order; the first non-empty value wins.
    pub fn user_id(&self) -> Option<String> {
        USER_ID_CLAIMS
            .iter()
            .filter_map(|claim| self.get_str(claim))
            .find(|value| !value.is_empty())
            .map(str::to_string)
    }

    /// The `email` claim, if any.
    pub fn email(&self) -> Option<&str> {
        self.get_str("email")
    }

    /// Human-friendly name for display: username, then email, then subject.
    pub fn display_name(&self) -> Option<&str> {
        ["cognito:username", "username", "email", "sub"]
            .iter()
            .filter_map(|claim| self.get_str(claim))
            .find(|value| !value.is_empty())
    }

    /// Raw claim map.
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }
}

impl From<Map<String, Value>> for UserClaims {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// Decodes the payload segment of a JWT into [`UserClaims`].
///
/// The payload is base64url JSON. Standard-alphabet input and `=` padding are
/// tolerated. Any malformed input (wrong segment count, bad base64, non-JSON
/// or non-object payload) yields `None`.
///
/// # Examples
///
/// ```
/// use iamguard::auth::claims::decode_jwt_claims;
///
/// // {"sub":"abc"}
/// let token = "eyJhbGciOiJub25lIn0.eyJzdWIiOiJhYmMifQ.sig";
/// let claims = decode_jwt_claims(token).unwrap();
/// assert_eq!(claims.get_str("sub"), Some("abc"));
///
/// assert!(decode_jwt_claims("not-a-jwt").is_none());
/// ```
pub fn decode_jwt_claims(token: &str) -> Option<UserClaims> {
    let payload = token.split('.').nth(1)?;

    let normalized: String = payload
        .trim_end_matches('=')
        .chars()
        .map(|c| match c {
            '-' => '+',
            '_' => '/',
            other => other,
        })
        .collect();

    let bytes = match base64::engine::general_purpose::STANDARD_NO_PAD.decode(normalized) {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!("JWT parsing error: invalid base64 payload: {}", e);
            return None;
        }
    };

    match serde_json::from_slice::<Value>(&bytes) {
        Ok(Value::Object(map)) => Some(UserClaims(map)),
        Ok(_) => {
            tracing::warn!("JWT parsing error: payload is not a JSON object");
            None
        }
        Err(e) => {
            tracing::warn!("JWT parsing error: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_payload(json: &str) -> String {
        base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(json)
    }

    fn token_with_payload(json: &str) -> String {
        format!("header.{}.signature", encode_payload(json))
    }

    #[test]
    fn test_decode_sub_claim() {
        let claims = decode_jwt_claims(&token_with_payload(r#"{"sub":"abc"}"#)).unwrap();
        assert_eq!(claims.get_str("sub"), Some("abc"));
        assert_eq!(claims.as_map().len(), 1);
    }

    #[test]
    fn test_decode_tolerates_url_safe_characters() {
        let json = r#"{"name":"??>>","sub":"x"}"#;
        let token = token_with_payload(json);
        assert!(token.contains('-'));
        let claims = decode_jwt_claims(&token).unwrap();
        assert_eq!(claims.get_str("name"), Some("??>>"));
    }

    #[test]
    fn test_decode_tolerates_padding() {
        let padded = base64::engine::general_purpose::URL_SAFE.encode(r#"{"sub":"ab"}"#);
        assert!(padded.ends_with('='));
        let claims = decode_jwt_claims(&format!("h.{}.s", padded)).unwrap();
        assert_eq!(claims.get_str("sub"), Some("ab"));
    }

    #[test]
    fn test_decode_utf8_claims() {
        let claims = decode_jwt_claims(&token_with_payload(r#"{"name":"홍길동"}"#)).unwrap();
        assert_eq!(claims.get_str("name"), Some("홍길동"));
    }

    #[test]
    fn test_decode_malformed_inputs_return_none() {
        assert!(decode_jwt_claims("").is_none());
        assert!(decode_jwt_claims("onlyonesegment").is_none());
        assert!(decode_jwt_claims("a.!!!notbase64!!!.c").is_none());
        assert!(decode_jwt_claims(&token_with_payload("not json")).is_none());
        assert!(decode_jwt_claims(&token_with_payload("[1,2,3]")).is_none());
    }

    #[test]
    fn test_user_id_priority_order() {
        let claims: UserClaims = serde_json::from_str(
            r#"{"email":"e@x.io","username":"u","cognito:username":"cu","sub":"s"}"#,
        )
        .unwrap();
        assert_eq!(claims.user_id().as_deref(), Some("s"));

        let claims: UserClaims =
            serde_json::from_str(r#"{"email":"e@x.io","cognito:username":"cu"}"#).unwrap();
        assert_eq!(claims.user_id().as_deref(), Some("cu"));
    }

    #[test]
    fn test_user_id_skips_empty_values() {
        let claims: UserClaims =
            serde_json::from_str(r#"{"sub":"","username":"","email":"e@x.io"}"#).unwrap();
        assert_eq!(claims.user_id().as_deref(), Some("e@x.io"));
    }

    #[test]
    fn test_user_id_none_when_no_identity_claims() {
        let claims: UserClaims = serde_json::from_str(r#"{"aud":"client"}"#).unwrap();
        assert!(claims.user_id().is_none());
    }

    #[test]
    fn test_display_name_prefers_username() {
        let claims: UserClaims =
            serde_json::from_str(r#"{"sub":"s","cognito:username":"alice"}"#).unwrap();
        assert_eq!(claims.display_name(), Some("alice"));
    }
}
