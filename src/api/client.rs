//! REST implementation of [`ChatBackend`]

use crate::api::ChatBackend;
use crate::auth::CredentialProvider;
use crate::chat::types::{Message, MessageUpdate, NewMessage, Session};
use crate::config::ApiConfig;
use crate::error::{IamGuardError, Result};

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// HTTP client for the chat session service
///
/// Every request carries the resolved `userId` (query string for reads and
/// deletes, JSON body for writes) and a bearer header when an access token
/// is held. Calls fail with [`IamGuardError::AuthenticationRequired`]
/// before touching the network when no user id can be resolved.
///
/// # Examples
///
/// ```no_run
/// use iamguard::api::{ChatApiClient, ChatBackend};
/// use iamguard::auth::StaticCredentials;
/// use iamguard::config::ApiConfig;
/// use std::sync::Arc;
///
/// # async fn example() -> iamguard::error::Result<()> {
/// let config = ApiConfig::default();
/// let credentials = Arc::new(StaticCredentials::new("user-1", None));
/// let client = ChatApiClient::new(config.http_client()?, &config, credentials);
/// let sessions = client.list_sessions(20).await?;
/// # Ok(())
/// # }
/// ```
pub struct ChatApiClient {
    http: Client,
    base: String,
    credentials: Arc<dyn CredentialProvider>,
}

// ---------------------------------------------------------------------------
// Wire envelopes
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct SessionsEnvelope {
    #[serde(default)]
    sessions: Vec<Session>,
}

#[derive(Debug, Deserialize)]
struct SessionEnvelope {
    session: Session,
}

#[derive(Debug, Deserialize)]
struct MessagesEnvelope {
    #[serde(default)]
    messages: Vec<Message>,
}

#[derive(Debug, Deserialize)]
struct MessageEnvelope {
    message: Message,
}

/// Request body with the user id merged into the payload.
#[derive(Serialize)]
struct UserScoped<'a, T: Serialize> {
    #[serde(rename = "userId")]
    user_id: &'a str,
    #[serde(flatten)]
    body: &'a T,
}

#[derive(Serialize)]
struct TitleBody<'a> {
    title: &'a str,
}

impl ChatApiClient {
    /// Creates a client rooted at `{base_url}{chat_prefix}`.
    pub fn new(http: Client, config: &ApiConfig, credentials: Arc<dyn CredentialProvider>) -> Self {
        let prefix = config.chat_prefix.trim_end_matches('/');
        Self {
            http,
            base: format!("{}{}", config.base(), prefix),
            credentials,
        }
    }

    /// The resolved root of all chat endpoints.
    pub fn base_url(&self) -> &str {
        &self.base
    }

    fn user_id(&self) -> Result<String> {
        self.credentials
            .user_id()
            .ok_or_else(|| IamGuardError::AuthenticationRequired.into())
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match self.credentials.access_token() {
            Some(token) if !token.is_empty() => request.bearer_auth(token),
            _ => request,
        }
    }

    async fn execute(&self, request: RequestBuilder) -> Result<reqwest::Response> {
        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(IamGuardError::Http)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(IamGuardError::Api {
                status: status.as_u16(),
                body,
            }
            .into());
        }
        Ok(response)
    }

    async fn execute_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let response = self.execute(request).await?;
        let parsed = response.json::<T>().await.map_err(IamGuardError::Http)?;
        Ok(parsed)
    }

    fn sessions_url(&self) -> String {
        format!("{}/sessions", self.base)
    }

    fn session_url(&self, session_id: &str) -> String {
        format!("{}/sessions/{}", self.base, session_id)
    }

    fn messages_url(&self, session_id: &str) -> String {
        format!("{}/sessions/{}/messages", self.base, session_id)
    }

    fn message_url(&self, session_id: &str, message_id: &str) -> String {
        format!("{}/sessions/{}/messages/{}", self.base, session_id, message_id)
    }
}

/// Logs a failed call with its context and hands the error back untouched.
fn logged<T>(result: Result<T>, context: &str) -> Result<T> {
    if let Err(e) = &result {
        tracing::error!("Chat backend {} failed: {:#}", context, e);
    }
    result
}

#[async_trait]
impl ChatBackend for ChatApiClient {
    async fn list_sessions(&self, limit: usize) -> Result<Vec<Session>> {
        let result: Result<Vec<Session>> = async {
            let user_id = self.user_id()?;
            tracing::debug!("Listing up to {} sessions", limit);
            let limit = limit.to_string();
            let request = self
                .http
                .get(self.sessions_url())
                .query(&[("userId", user_id.as_str()), ("limit", limit.as_str())]);
            let envelope: SessionsEnvelope = self.execute_json(request).await?;
            Ok(envelope.sessions)
        }
        .await;
        logged(result, "list sessions")
    }

    async fn create_session(&self, title: &str) -> Result<Session> {
        let result: Result<Session> = async {
            let user_id = self.user_id()?;
            let request = self.http.post(self.sessions_url()).json(&UserScoped {
                user_id: &user_id,
                body: &TitleBody { title },
            });
            let envelope: SessionEnvelope = self.execute_json(request).await?;
            tracing::debug!("Created session {}", envelope.session.session_id);
            Ok(envelope.session)
        }
        .await;
        logged(result, "create session")
    }

    async fn get_session(&self, session_id: &str) -> Result<Session> {
        let result: Result<Session> = async {
            let user_id = self.user_id()?;
            let request = self
                .http
                .get(self.session_url(session_id))
                .query(&[("userId", user_id.as_str())]);
            let envelope: SessionEnvelope = self.execute_json(request).await?;
            Ok(envelope.session)
        }
        .await;
        logged(result, "get session")
    }

    async fn update_session(&self, session_id: &str, title: &str) -> Result<()> {
        let result: Result<()> = async {
            let user_id = self.user_id()?;
            let request = self.http.put(self.session_url(session_id)).json(&UserScoped {
                user_id: &user_id,
                body: &TitleBody { title },
            });
            self.execute(request).await?;
            Ok(())
        }
        .await;
        logged(result, "update session")
    }

    async fn delete_session(&self, session_id: &str) -> Result<()> {
        let result: Result<()> = async {
            let user_id = self.user_id()?;
            let request = self
                .http
                .delete(self.session_url(session_id))
                .query(&[("userId", user_id.as_str())]);
            self.execute(request).await?;
            tracing::debug!("Deleted session {}", session_id);
            Ok(())
        }
        .await;
        logged(result, "delete session")
    }

    async fn list_messages(&self, session_id: &str) -> Result<Vec<Message>> {
        let result: Result<Vec<Message>> = async {
            let user_id = self.user_id()?;
            let request = self
                .http
                .get(self.messages_url(session_id))
                .query(&[("userId", user_id.as_str())]);
            let envelope: MessagesEnvelope = self.execute_json(request).await?;
            Ok(envelope.messages)
        }
        .await;
        logged(result, "list messages")
    }

    async fn add_message(&self, session_id: &str, message: &NewMessage) -> Result<Message> {
        let result: Result<Message> = async {
            let user_id = self.user_id()?;
            let request = self.http.post(self.messages_url(session_id)).json(&UserScoped {
                user_id: &user_id,
                body: message,
            });
            let envelope: MessageEnvelope = self.execute_json(request).await?;
            Ok(envelope.message)
        }
        .await;
        logged(result, "add message")
    }

    async fn update_message(
        &self,
        session_id: &str,
        message_id: &str,
        update: &MessageUpdate,
    ) -> Result<()> {
        let result: Result<()> = async {
            let user_id = self.user_id()?;
            let request = self
                .http
                .put(self.message_url(session_id, message_id))
                .json(&UserScoped {
                    user_id: &user_id,
                    body: update,
                });
            self.execute(request).await?;
            Ok(())
        }
        .await;
        logged(result, "update message")
    }

    async fn delete_message(&self, session_id: &str, message_id: &str) -> Result<()> {
        let result: Result<()> = async {
            let user_id = self.user_id()?;
            let request = self
                .http
                .delete(self.message_url(session_id, message_id))
                .query(&[("userId", user_id.as_str())]);
            self.execute(request).await?;
            Ok(())
        }
        .await;
        logged(result, "delete message")
    }
}
