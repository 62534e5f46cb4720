//! Permission recommendation aggregation
//!
//! Analysis rows are grouped by identity into deduplicated change lists.
//! One or several identities can be selected; the displayed lists are the
//! selected identity's own lists or, with several selected, their union by
//! action. Submission always keeps each identity's own picks.

use crate::error::Result;
use crate::metrics::record_policy_apply;
use crate::policy::client::PolicyBackend;
use crate::policy::types::{
    AnalysisResult, ApplyOutcome, ChangeKind, PermissionChange, PolicyUpdate, UserChanges,
    USER_SELECTED_REASON,
};

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

// ---------------------------------------------------------------------------
// Extraction
// ---------------------------------------------------------------------------

/// Distinct identity ARNs in first-seen order; blank ones are skipped.
pub fn extract_user_arns(results: &[AnalysisResult]) -> Vec<String> {
    let mut arns: Vec<String> = Vec::new();
    for result in results {
        if !result.user.is_empty() && !arns.contains(&result.user) {
            arns.push(result.user.clone());
        }
    }
    arns
}

fn push_unique(list: &mut Vec<PermissionChange>, action: &str, reason: &str) {
    if !list.iter().any(|c| c.action == action) {
        list.push(PermissionChange {
            action: action.to_string(),
            apply: false,
            reason: reason.to_string(),
        });
    }
}

/// Changes recommended for `user_arn`
///
/// Rows are matched on the exact ARN. An action named by several rows
/// keeps the reason of the first one.
pub fn extract_user_permissions(results: &[AnalysisResult], user_arn: &str) -> UserChanges {
    let mut changes = UserChanges::default();
    for result in results.iter().filter(|r| r.user == user_arn) {
        let Some(rec) = result.policy_recommendation.as_ref() else {
            continue;
        };
        for action in &rec.add {
            push_unique(&mut changes.add, action, &rec.reason);
        }
        for action in &rec.remove {
            push_unique(&mut changes.remove, action, &rec.reason);
        }
    }
    changes
}

/// Changes for every identity present in `results`.
pub fn extract_all_user_permissions(results: &[AnalysisResult]) -> HashMap<String, UserChanges> {
    extract_user_arns(results)
        .into_iter()
        .map(|arn| {
            let changes = extract_user_permissions(results, &arn);
            (arn, changes)
        })
        .collect()
}

/// Union of several identities' lists keyed by action
///
/// The first list naming an action supplies its reason. An action counts
/// as picked when any identity picked it.
pub fn merge_changes<'a>(all: impl IntoIterator<Item = &'a UserChanges>) -> UserChanges {
    let mut merged = UserChanges::default();
    for changes in all {
        for kind in [ChangeKind::Add, ChangeKind::Remove] {
            for change in changes.list(kind) {
                let target = merged.list_mut(kind);
                match target.iter_mut().find(|c| c.action == change.action) {
                    Some(existing) => existing.apply |= change.apply,
                    None => target.push(change.clone()),
                }
            }
        }
    }
    merged
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

#[derive(Default)]
struct PermissionsState {
    loading: bool,
    submitting: bool,
    error: Option<String>,
    success_message: Option<String>,
    results: Vec<AnalysisResult>,
    user_arns: Vec<String>,
    changes: HashMap<String, UserChanges>,
    selected: Vec<String>,
}

impl PermissionsState {
    fn rebuild(&mut self, results: Vec<AnalysisResult>) {
        self.user_arns = extract_user_arns(&results);
        self.changes = extract_all_user_permissions(&results);
        self.results = results;
        let known = &self.user_arns;
        self.selected.retain(|arn| known.contains(arn));
    }
}

/// The permissions store
///
/// # Examples
///
/// ```
/// use iamguard::policy::{PermissionsStore, PolicyBackend};
/// use iamguard::policy::types::{AnalysisResult, PolicyRecommendation, PolicyUpdate};
/// use std::sync::Arc;
///
/// struct Offline;
///
/// #[async_trait::async_trait]
/// impl PolicyBackend for Offline {
///     async fn fetch_analyses(&self) -> iamguard::error::Result<Vec<AnalysisResult>> {
///         Ok(Vec::new())
///     }
///     async fn apply_policy_changes(&self, _: &str, _: &PolicyRecommendation) -> iamguard::error::Result<()> {
///         Ok(())
///     }
///     async fn apply_bulk_policy_changes(&self, _: &[PolicyUpdate]) -> iamguard::error::Result<()> {
///         Ok(())
///     }
/// }
///
/// let store = PermissionsStore::new(Arc::new(Offline));
/// store.load_results(vec![AnalysisResult {
///     user: "arn:aws:iam::1:user/alice".to_string(),
///     policy_recommendation: Some(PolicyRecommendation {
///         add: vec!["s3:GetObject".to_string()],
///         remove: vec![],
///         reason: "used daily".to_string(),
///     }),
///     ..AnalysisResult::default()
/// }]);
/// store.select_user_arn("arn:aws:iam::1:user/alice");
/// assert_eq!(store.add_permissions().len(), 1);
/// ```
pub struct PermissionsStore {
    backend: Arc<dyn PolicyBackend>,
    state: Mutex<PermissionsState>,
}

impl PermissionsStore {
    /// Creates an empty store.
    pub fn new(backend: Arc<dyn PolicyBackend>) -> Self {
        Self {
            backend,
            state: Mutex::new(PermissionsState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, PermissionsState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Loads analysis rows from the policy service
    ///
    /// On failure the rows are cleared and the error recorded.
    pub async fn fetch_analysis_results(&self) -> Result<()> {
        {
            let mut state = self.lock();
            state.loading = true;
            state.error = None;
        }

        let result = self.backend.fetch_analyses().await;
        let mut state = self.lock();
        state.loading = false;
        match result {
            Ok(results) => {
                tracing::info!("Loaded {} analysis results", results.len());
                state.rebuild(results);
                Ok(())
            }
            Err(e) => {
                tracing::error!("Failed to load analysis results: {}", e);
                state.error = Some(e.to_string());
                state.rebuild(Vec::new());
                Err(e)
            }
        }
    }

    /// Replaces the rows with `results` without calling the service.
    pub fn load_results(&self, results: Vec<AnalysisResult>) {
        self.lock().rebuild(results);
    }

    /// Every known identity ARN.
    pub fn user_arns(&self) -> Vec<String> {
        self.lock().user_arns.clone()
    }

    /// The raw analysis rows.
    pub fn analysis_results(&self) -> Vec<AnalysisResult> {
        self.lock().results.clone()
    }

    /// Selects exactly one identity. A blank ARN is ignored.
    pub fn select_user_arn(&self, user_arn: &str) {
        if user_arn.is_empty() {
            return;
        }
        self.lock().selected = vec![user_arn.to_string()];
    }

    /// Selects several identities; unknown ARNs are dropped.
    pub fn select_user_arns(&self, user_arns: &[String]) {
        let mut state = self.lock();
        let mut selected: Vec<String> = Vec::new();
        for arn in user_arns {
            if state.user_arns.contains(arn) && !selected.contains(arn) {
                selected.push(arn.clone());
            }
        }
        state.selected = selected;
    }

    /// The selected identities.
    pub fn selected_user_arns(&self) -> Vec<String> {
        self.lock().selected.clone()
    }

    /// One identity's changes.
    pub fn user_changes(&self, user_arn: &str) -> UserChanges {
        self.lock().changes.get(user_arn).cloned().unwrap_or_default()
    }

    fn displayed(&self) -> UserChanges {
        let state = self.lock();
        match state.selected.as_slice() {
            [] => UserChanges::default(),
            [single] => state.changes.get(single).cloned().unwrap_or_default(),
            many => merge_changes(many.iter().filter_map(|arn| state.changes.get(arn))),
        }
    }

    /// Grant list for the current selection.
    pub fn add_permissions(&self) -> Vec<PermissionChange> {
        self.displayed().add
    }

    /// Revoke list for the current selection.
    pub fn remove_permissions(&self) -> Vec<PermissionChange> {
        self.displayed().remove
    }

    /// Picks or unpicks one identity's change. Returns `false` when the
    /// identity or action is unknown.
    pub fn set_apply(&self, user_arn: &str, kind: ChangeKind, action: &str, apply: bool) -> bool {
        let mut state = self.lock();
        let Some(changes) = state.changes.get_mut(user_arn) else {
            return false;
        };
        match changes.list_mut(kind).iter_mut().find(|c| c.action == action) {
            Some(change) => {
                change.apply = apply;
                true
            }
            None => false,
        }
    }

    /// Picks or unpicks `action` for every selected identity that has it.
    /// Returns how many identities were updated.
    pub fn set_apply_for_selection(&self, kind: ChangeKind, action: &str, apply: bool) -> usize {
        let mut state = self.lock();
        let selected = state.selected.clone();
        let mut updated = 0;
        for arn in &selected {
            if let Some(changes) = state.changes.get_mut(arn) {
                if let Some(change) = changes.list_mut(kind).iter_mut().find(|c| c.action == action)
                {
                    change.apply = apply;
                    updated += 1;
                }
            }
        }
        updated
    }

    /// `true` when any selected identity has a picked change.
    pub fn has_changes_to_apply(&self) -> bool {
        let state = self.lock();
        state
            .selected
            .iter()
            .filter_map(|arn| state.changes.get(arn))
            .any(UserChanges::has_selected)
    }

    /// Per-identity updates for the selection, skipping empty ones.
    pub fn pending_updates(&self) -> Vec<PolicyUpdate> {
        let state = self.lock();
        state
            .selected
            .iter()
            .filter_map(|arn| {
                let changes = state.changes.get(arn)?;
                let update = PolicyUpdate::from_selection(arn, changes);
                (!update.is_empty()).then_some(update)
            })
            .collect()
    }

    /// Submits the picked changes of the selected identities
    ///
    /// One identity goes to the single-user endpoint, several to the bulk
    /// endpoint. Nothing is sent when nothing is picked. Picks are cleared
    /// after a successful submission.
    pub async fn apply_policy_changes(&self) -> Result<ApplyOutcome> {
        let updates = self.pending_updates();
        if updates.is_empty() {
            tracing::debug!("No policy changes picked");
            return Ok(ApplyOutcome::NothingSelected);
        }

        {
            let mut state = self.lock();
            state.submitting = true;
            state.error = None;
            state.success_message = None;
        }

        let result = match updates.as_slice() {
            [single] => {
                self.backend
                    .apply_policy_changes(
                        &single.user_arn,
                        &single.recommendation(USER_SELECTED_REASON),
                    )
                    .await
            }
            many => self.backend.apply_bulk_policy_changes(many).await,
        };

        let mut state = self.lock();
        state.submitting = false;
        match result {
            Ok(()) => {
                let users = updates.len();
                record_policy_apply(users);
                for update in &updates {
                    if let Some(changes) = state.changes.get_mut(&update.user_arn) {
                        changes.clear_selection();
                    }
                }
                state.success_message =
                    Some(format!("Policy changes applied to {} user(s)", users));
                tracing::info!("Policy changes applied to {} user(s)", users);
                Ok(ApplyOutcome::Applied { users })
            }
            Err(e) => {
                state.error = Some(e.to_string());
                Err(e)
            }
        }
    }

    /// `true` while analyses are loading.
    pub fn is_loading(&self) -> bool {
        self.lock().loading
    }

    /// `true` while changes are being submitted.
    pub fn is_submitting(&self) -> bool {
        self.lock().submitting
    }

    /// The last recorded error.
    pub fn error(&self) -> Option<String> {
        self.lock().error.clone()
    }

    /// Message of the last successful submission.
    pub fn success_message(&self) -> Option<String> {
        self.lock().success_message.clone()
    }

    /// Drops all rows, selections and messages.
    pub fn reset_state(&self) {
        *self.lock() = PermissionsState::default();
    }
}
