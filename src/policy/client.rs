//! Policy recommendation service client

use crate::auth::CredentialProvider;
use crate::config::ApiConfig;
use crate::error::{IamGuardError, Result};
use crate::policy::types::{AnalysisResult, PolicyRecommendation, PolicyUpdate};

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Operations the permissions store needs from the policy service.
#[async_trait]
pub trait PolicyBackend: Send + Sync {
    /// Fetches the latest analysis rows for all identities.
    async fn fetch_analyses(&self) -> Result<Vec<AnalysisResult>>;

    /// Applies one identity's changes.
    async fn apply_policy_changes(
        &self,
        user_arn: &str,
        recommendation: &PolicyRecommendation,
    ) -> Result<()>;

    /// Applies several identities' changes in one request.
    async fn apply_bulk_policy_changes(&self, updates: &[PolicyUpdate]) -> Result<()>;
}

/// HTTP client for the policy recommendation service
///
/// Error responses carrying a `detail` field become
/// [`IamGuardError::Policy`] with that text.
pub struct PolicyClient {
    http: Client,
    base: String,
    credentials: Option<Arc<dyn CredentialProvider>>,
}

/// Analyses come back either bare or wrapped in `results`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum AnalysesBody {
    Wrapped { results: Vec<AnalysisResult> },
    Bare(Vec<AnalysisResult>),
}

impl From<AnalysesBody> for Vec<AnalysisResult> {
    fn from(body: AnalysesBody) -> Self {
        match body {
            AnalysesBody::Wrapped { results } => results,
            AnalysesBody::Bare(results) => results,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    detail: String,
}

#[derive(Debug, Deserialize)]
struct SavedAnalysis {
    id: String,
}

#[derive(Serialize)]
struct ApplyBody<'a> {
    user_arn: &'a str,
    policy_recommendation: &'a PolicyRecommendation,
}

#[derive(Serialize)]
struct BulkBody<'a> {
    updates: &'a [PolicyUpdate],
}

#[derive(Serialize)]
struct UserFilter<'a> {
    username: &'a str,
}

#[derive(Serialize)]
struct DateRange<'a> {
    start_date: &'a str,
    end_date: &'a str,
}

impl PolicyClient {
    /// Creates a client for the service under `config.base_url`.
    pub fn new(http: Client, config: &ApiConfig) -> Self {
        Self {
            http,
            base: config.base(),
            credentials: None,
        }
    }

    /// Attaches a bearer token to every request when one is held.
    pub fn with_credentials(mut self, credentials: Arc<dyn CredentialProvider>) -> Self {
        self.credentials = Some(credentials);
        self
    }

    fn analyses_url(&self) -> String {
        format!(
            "{}/policy-recommendation/process-multiple-analyses",
            self.base
        )
    }

    async fn execute<T: DeserializeOwned>(&self, request: RequestBuilder, context: &str) -> Result<T> {
        let request = match self.credentials.as_ref().and_then(|c| c.access_token()) {
            Some(token) if !token.is_empty() => request.bearer_auth(token),
            _ => request,
        };

        let response = request.send().await.map_err(|e| {
            tracing::error!("Policy service {} failed: {}", context, e);
            IamGuardError::Http(e)
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!("Policy service {} returned {}: {}", context, status, body);
            return Err(match serde_json::from_str::<ErrorDetail>(&body) {
                Ok(detail) => IamGuardError::Policy(detail.detail),
                Err(_) => IamGuardError::Api {
                    status: status.as_u16(),
                    body,
                },
            }
            .into());
        }

        let bytes = response.bytes().await.map_err(IamGuardError::Http)?;
        if bytes.is_empty() {
            // Apply endpoints may answer with an empty body.
            return Ok(serde_json::from_value(serde_json::Value::Null)
                .map_err(IamGuardError::Serialization)?);
        }
        Ok(serde_json::from_slice(&bytes).map_err(IamGuardError::Serialization)?)
    }

    /// Runs a fresh analysis for one identity.
    pub async fn analyze_user_logs(&self, username: &str) -> Result<Vec<AnalysisResult>> {
        let request = self
            .http
            .post(self.analyses_url())
            .json(&UserFilter { username });
        let body: AnalysesBody = self.execute(request, "user analysis").await?;
        Ok(body.into())
    }

    /// Runs a fresh analysis over a date range (`YYYY-MM-DD`).
    pub async fn analyze_by_date_range(
        &self,
        start_date: &str,
        end_date: &str,
    ) -> Result<Vec<AnalysisResult>> {
        let request = self.http.post(self.analyses_url()).json(&DateRange {
            start_date,
            end_date,
        });
        let body: AnalysesBody = self.execute(request, "date range analysis").await?;
        Ok(body.into())
    }

    /// Stores an analysis row and returns its id.
    pub async fn save_analysis(&self, result: &AnalysisResult) -> Result<String> {
        let request = self
            .http
            .post(format!("{}/policy-recommendation/save-analysis", self.base))
            .json(result);
        let saved: SavedAnalysis = self.execute(request, "save analysis").await?;
        Ok(saved.id)
    }
}

#[async_trait]
impl PolicyBackend for PolicyClient {
    async fn fetch_analyses(&self) -> Result<Vec<AnalysisResult>> {
        tracing::debug!("Fetching policy analyses");
        let request = self.http.get(self.analyses_url());
        let body: AnalysesBody = self.execute(request, "fetch analyses").await?;
        Ok(body.into())
    }

    async fn apply_policy_changes(
        &self,
        user_arn: &str,
        recommendation: &PolicyRecommendation,
    ) -> Result<()> {
        tracing::info!("Applying policy changes for {}", user_arn);
        let request = self
            .http
            .post(format!(
                "{}/policy_recommendation/apply-policy-changes",
                self.base
            ))
            .json(&ApplyBody {
                user_arn,
                policy_recommendation: recommendation,
            });
        let _: serde_json::Value = self.execute(request, "apply changes").await?;
        Ok(())
    }

    async fn apply_bulk_policy_changes(&self, updates: &[PolicyUpdate]) -> Result<()> {
        tracing::info!("Applying policy changes for {} users", updates.len());
        let request = self
            .http
            .post(format!(
                "{}/policy_recommendation/apply-policy-changes/bulk",
                self.base
            ))
            .json(&BulkBody { updates });
        let _: serde_json::Value = self.execute(request, "bulk apply").await?;
        Ok(())
    }
}
