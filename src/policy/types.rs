//! Policy recommendation data

use serde::{Deserialize, Serialize};

/// Reason attached to changes submitted from the console.
pub const USER_SELECTED_REASON: &str = "Permission changes selected by the user";

/// Actions to grant and revoke for one identity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyRecommendation {
    /// Actions to grant
    #[serde(rename = "ADD", default)]
    pub add: Vec<String>,
    /// Actions to revoke
    #[serde(rename = "REMOVE", default)]
    pub remove: Vec<String>,
    /// Why the change is recommended
    #[serde(rename = "Reason", default, deserialize_with = "null_as_empty")]
    pub reason: String,
}

fn null_as_empty<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// One analysis row produced from an identity's activity logs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    /// Day the logs cover
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    /// Identity ARN
    #[serde(default, deserialize_with = "null_as_empty")]
    pub user: String,
    /// Number of log entries analyzed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_count: Option<u64>,
    /// When the analysis ran
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis_timestamp: Option<String>,
    /// Free-form summary
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis_comment: Option<String>,
    /// The recommendation, when the analysis produced one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy_recommendation: Option<PolicyRecommendation>,
}

/// Whether a change grants or revokes an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    /// Grant
    Add,
    /// Revoke
    Remove,
}

/// One recommended action and whether it was picked for submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionChange {
    /// IAM action, e.g. `s3:GetObject`
    pub action: String,
    /// Picked for submission
    pub apply: bool,
    /// Reason of the first recommendation that named the action
    pub reason: String,
}

/// All changes recommended for one identity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserChanges {
    /// Actions to grant
    pub add: Vec<PermissionChange>,
    /// Actions to revoke
    pub remove: Vec<PermissionChange>,
}

impl UserChanges {
    /// The list for `kind`.
    pub fn list(&self, kind: ChangeKind) -> &[PermissionChange] {
        match kind {
            ChangeKind::Add => &self.add,
            ChangeKind::Remove => &self.remove,
        }
    }

    /// The mutable list for `kind`.
    pub fn list_mut(&mut self, kind: ChangeKind) -> &mut Vec<PermissionChange> {
        match kind {
            ChangeKind::Add => &mut self.add,
            ChangeKind::Remove => &mut self.remove,
        }
    }

    /// `true` when any change is picked.
    pub fn has_selected(&self) -> bool {
        self.add.iter().chain(self.remove.iter()).any(|c| c.apply)
    }

    /// Picked actions as a recommendation with `reason`.
    pub fn selected(&self, reason: &str) -> PolicyRecommendation {
        let picked = |list: &[PermissionChange]| {
            list.iter()
                .filter(|c| c.apply)
                .map(|c| c.action.clone())
                .collect::<Vec<_>>()
        };
        PolicyRecommendation {
            add: picked(&self.add),
            remove: picked(&self.remove),
            reason: reason.to_string(),
        }
    }

    /// Unpicks every change.
    pub fn clear_selection(&mut self) {
        for change in self.add.iter_mut().chain(self.remove.iter_mut()) {
            change.apply = false;
        }
    }
}

/// One identity's picked changes, as submitted in a bulk apply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyUpdate {
    /// Identity ARN
    pub user_arn: String,
    /// Picked actions to grant
    pub add_permissions: Vec<String>,
    /// Picked actions to revoke
    pub remove_permissions: Vec<String>,
}

impl PolicyUpdate {
    /// Builds the update for `user_arn` from its picked changes.
    pub fn from_selection(user_arn: &str, changes: &UserChanges) -> Self {
        let picked = changes.selected("");
        Self {
            user_arn: user_arn.to_string(),
            add_permissions: picked.add,
            remove_permissions: picked.remove,
        }
    }

    /// `true` when neither list has an action.
    pub fn is_empty(&self) -> bool {
        self.add_permissions.is_empty() && self.remove_permissions.is_empty()
    }

    /// The update as a recommendation carrying `reason`.
    pub fn recommendation(&self, reason: &str) -> PolicyRecommendation {
        PolicyRecommendation {
            add: self.add_permissions.clone(),
            remove: self.remove_permissions.clone(),
            reason: reason.to_string(),
        }
    }
}

/// Result of an apply request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// Changes were submitted for this many identities
    Applied {
        /// Identities with at least one submitted change
        users: usize,
    },
    /// No change was picked; the backend was not called
    NothingSelected,
}
