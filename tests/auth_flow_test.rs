//! Authorization-code exchange and backend verification against a mock provider
//!
//! - Tokens are exchanged at `/oauth2/token` and the identity token's claims
//!   become the session user.
//! - HTTP Basic client authentication is sent only when a secret is set.
//! - A failed backend verification leaves the session authenticated.
//! - A failed exchange records an error and stays anonymous.

mod common;

use std::sync::Arc;

use base64::Engine;
use serde_json::json;
use wiremock::matchers::{body_string_contains, header, header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use iamguard::auth::{AuthSession, AuthStatus, CredentialProvider, RecordingNavigator};

fn token_body() -> serde_json::Value {
    json!({
        "id_token": common::make_jwt(json!({"sub": "user-123", "email": "dev@example.com"})),
        "access_token": "access-abc",
        "refresh_token": "refresh-xyz",
        "token_type": "Bearer",
        "expires_in": 3600
    })
}

async fn mount_verify(server: &MockServer, status: u16) {
    Mock::given(method("POST"))
        .and(path("/auth/verify-token"))
        .respond_with(ResponseTemplate::new(status).set_body_json(json!({"status": "success"})))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_exchange_authenticates_and_decodes_claims() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth2/token"))
        .and(body_string_contains("grant_type=authorization_code"))
        .and(body_string_contains("code=the-code"))
        .and(body_string_contains("client_id=test-client"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body()))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/verify-token"))
        .and(body_string_contains("\"provider\":\"cognito\""))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "success"})))
        .expect(1)
        .mount(&server)
        .await;

    let config = common::config_for(&server.uri());
    let auth = AuthSession::new(
        reqwest::Client::new(),
        &config,
        Arc::new(RecordingNavigator::new()),
    );

    assert!(auth.exchange_code_for_tokens("the-code").await);
    assert_eq!(auth.status(), AuthStatus::Authenticated);
    assert_eq!(auth.user_id().as_deref(), Some("user-123"));
    assert_eq!(auth.access_token().as_deref(), Some("access-abc"));
    assert_eq!(
        auth.tokens().and_then(|t| t.refresh_token).as_deref(),
        Some("refresh-xyz")
    );
    assert!(auth.error().is_none());
}

#[tokio::test]
async fn test_basic_auth_sent_when_secret_configured() {
    let server = MockServer::start().await;
    let expected = format!(
        "Basic {}",
        base64::engine::general_purpose::STANDARD.encode("test-client:s3cret")
    );
    Mock::given(method("POST"))
        .and(path("/oauth2/token"))
        .and(header("authorization", expected.as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body()))
        .expect(1)
        .mount(&server)
        .await;
    mount_verify(&server, 200).await;

    let mut config = common::config_for(&server.uri());
    config.auth.client_secret = Some("s3cret".to_string());
    let auth = AuthSession::new(
        reqwest::Client::new(),
        &config,
        Arc::new(RecordingNavigator::new()),
    );

    assert!(auth.exchange_code_for_tokens("code").await);
}

#[tokio::test]
async fn test_no_basic_auth_without_secret() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth2/token"))
        .and(header_exists("authorization"))
        .respond_with(ResponseTemplate::new(401))
        .with_priority(1)
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/oauth2/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body()))
        .expect(1)
        .mount(&server)
        .await;
    mount_verify(&server, 200).await;

    let config = common::config_for(&server.uri());
    let auth = AuthSession::new(
        reqwest::Client::new(),
        &config,
        Arc::new(RecordingNavigator::new()),
    );

    assert!(auth.exchange_code_for_tokens("code").await);
}

#[tokio::test]
async fn test_verification_failure_keeps_session() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth2/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body()))
        .mount(&server)
        .await;
    mount_verify(&server, 500).await;

    let config = common::config_for(&server.uri());
    let auth = AuthSession::new(
        reqwest::Client::new(),
        &config,
        Arc::new(RecordingNavigator::new()),
    );

    assert!(auth.exchange_code_for_tokens("code").await);
    assert!(auth.is_authenticated());
    assert!(!auth.verify_with_backend().await);
    assert!(auth.is_authenticated());
    assert!(auth.error().is_none(), "verification failures are only logged");
}

#[tokio::test]
async fn test_failed_exchange_records_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth2/token"))
        .respond_with(ResponseTemplate::new(400).set_body_string("invalid_grant"))
        .mount(&server)
        .await;

    let config = common::config_for(&server.uri());
    let auth = AuthSession::new(
        reqwest::Client::new(),
        &config,
        Arc::new(RecordingNavigator::new()),
    );

    assert!(!auth.exchange_code_for_tokens("stale").await);
    assert_eq!(auth.status(), AuthStatus::Anonymous);
    assert!(auth.user_id().is_none());
    let error = auth.error().unwrap();
    assert!(error.contains("400"));
    assert!(error.contains("invalid_grant"));
}

#[tokio::test]
async fn test_logout_clears_and_redirects_to_provider() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth2/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body()))
        .mount(&server)
        .await;
    mount_verify(&server, 200).await;

    let config = common::config_for(&server.uri());
    let navigator = Arc::new(RecordingNavigator::new());
    let auth = AuthSession::new(reqwest::Client::new(), &config, navigator.clone());

    assert!(auth.exchange_code_for_tokens("code").await);
    auth.logout();

    assert!(!auth.is_authenticated());
    assert!(auth.tokens().is_none());
    let target = navigator.last().unwrap();
    assert!(target.starts_with(&format!("{}/logout?", server.uri())));
    assert!(target.contains("client_id=test-client"));
}
