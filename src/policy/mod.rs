//! IAM policy recommendations
//!
//! # Module Layout
//!
//! - [`types`]      -- Analysis rows, change lists and apply outcomes
//! - [`client`]     -- The policy recommendation service client
//! - [`aggregator`] -- Per-identity aggregation and the permissions store

pub mod aggregator;
pub mod client;
pub mod types;

pub use aggregator::{
    extract_all_user_permissions, extract_user_arns, extract_user_permissions, merge_changes,
    PermissionsStore,
};
pub use client::{PolicyBackend, PolicyClient};
pub use types::{
    AnalysisResult, ApplyOutcome, ChangeKind, PermissionChange, PolicyRecommendation,
    PolicyUpdate, UserChanges,
};
