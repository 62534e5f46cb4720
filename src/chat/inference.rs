//! Bot replies from the inference endpoint

use crate::auth::CredentialProvider;
use crate::config::ApiConfig;
use crate::error::{IamGuardError, Result};

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// Produces the bot's reply to a user message.
#[async_trait]
pub trait BotResponder: Send + Sync {
    /// Returns the reply text for `text` sent in `session_id`.
    async fn respond(&self, session_id: &str, text: &str) -> Result<String>;
}

/// Client for `POST {api}/llm1`
pub struct InferenceClient {
    http: Client,
    endpoint: String,
    credentials: Arc<dyn CredentialProvider>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InferenceRequest<'a> {
    text: &'a str,
    session_id: &'a str,
    user_id: Option<String>,
}

/// One retrieved passage in a ranked answer.
#[derive(Debug, Deserialize)]
struct RankedPassage {
    #[serde(default)]
    context: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
    rank_order: f64,
}

impl InferenceClient {
    /// Creates a client for the inference endpoint under `config.base_url`.
    pub fn new(http: Client, config: &ApiConfig, credentials: Arc<dyn CredentialProvider>) -> Self {
        Self {
            http,
            endpoint: format!("{}/llm1", config.base()),
            credentials,
        }
    }
}

#[async_trait]
impl BotResponder for InferenceClient {
    async fn respond(&self, session_id: &str, text: &str) -> Result<String> {
        let body = InferenceRequest {
            text,
            session_id,
            user_id: self.credentials.user_id(),
        };
        tracing::debug!("Requesting inference for session {}", session_id);

        let mut request = self.http.post(&self.endpoint).json(&body);
        if let Some(token) = self.credentials.access_token().filter(|t| !t.is_empty()) {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| {
            tracing::error!("Inference request failed: {}", e);
            IamGuardError::Http(e)
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!("Inference returned error {}: {}", status, body);
            return Err(IamGuardError::Api {
                status: status.as_u16(),
                body,
            }
            .into());
        }

        let parsed: Value = response.json().await.map_err(|e| {
            tracing::error!("Failed to parse inference response: {}", e);
            IamGuardError::Http(e)
        })?;

        Ok(format_answer(answer_field(&parsed)?))
    }
}

/// The `answer` of a response body. A present `null` is still an answer.
fn answer_field(body: &Value) -> Result<&Value> {
    body.get("answer")
        .ok_or_else(|| IamGuardError::Inference("response carried no answer".to_string()).into())
}

/// Renders an inference answer as display text
///
/// Ranked passage lists are sorted by `rank_order` and rendered as
/// `context`, `title` and `url` lines, one blank line between passages.
/// Strings are returned as is; any other JSON value is serialized.
///
/// # Examples
///
/// ```
/// use iamguard::chat::inference::format_answer;
/// use serde_json::json;
///
/// assert_eq!(format_answer(&json!("hi")), "hi");
/// assert_eq!(
///     format_answer(&json!([{"context": "c", "title": "t", "url": "u", "rank_order": 1}])),
///     "c\nt\nu"
/// );
/// assert_eq!(format_answer(&json!({"k": 1})), r#"{"k":1}"#);
/// ```
pub fn format_answer(answer: &Value) -> String {
    match answer {
        Value::String(text) => text.clone(),
        Value::Array(_) => match serde_json::from_value::<Vec<RankedPassage>>(answer.clone()) {
            Ok(mut passages) => {
                passages.sort_by(|a, b| a.rank_order.total_cmp(&b.rank_order));
                passages
                    .iter()
                    .map(|p| format!("{}\n{}\n{}", p.context, p.title, p.url))
                    .collect::<Vec<_>>()
                    .join("\n\n")
            }
            Err(e) => {
                tracing::warn!("Unexpected answer list shape: {}", e);
                answer.to_string()
            }
        },
        other => other.to_string(),
    }
}
