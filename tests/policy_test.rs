//! Permission recommendations end to end against a mock policy service
//!
//! - Overlapping rows for one identity collapse to distinct actions with the
//!   first row's reason.
//! - Nothing is sent when no change is picked.
//! - One identity uses the single endpoint; several use the bulk endpoint.

mod common;

use std::sync::Arc;

use serde_json::json;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use iamguard::auth::StaticCredentials;
use iamguard::error::IamGuardError;
use iamguard::policy::{
    extract_all_user_permissions, AnalysisResult, ApplyOutcome, ChangeKind, PermissionsStore,
    PolicyClient,
};

const ALICE: &str = "arn:aws:iam::123456789012:user/alice";
const BOB: &str = "arn:aws:iam::123456789012:user/bob";

fn analyses() -> serde_json::Value {
    json!([
        {
            "date": "2024-05-01",
            "user": ALICE,
            "log_count": 120,
            "policy_recommendation": {
                "ADD": ["s3:GetObject", "s3:ListBucket"],
                "REMOVE": ["iam:PassRole"],
                "Reason": "seen in CloudTrail on 2024-05-01"
            }
        },
        {
            "date": "2024-05-02",
            "user": ALICE,
            "policy_recommendation": {
                "ADD": ["s3:GetObject", "s3:PutObject"],
                "REMOVE": [],
                "Reason": "seen in CloudTrail on 2024-05-02"
            }
        },
        {
            "date": "2024-05-02",
            "user": BOB,
            "policy_recommendation": {
                "ADD": ["ec2:DescribeInstances"],
                "REMOVE": ["s3:DeleteObject"],
                "Reason": null
            }
        },
        {
            "date": "2024-05-02",
            "user": "arn:aws:iam::123456789012:user/carol",
            "policy_recommendation": null
        }
    ])
}

async fn mount_analyses(server: &MockServer, body: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path("/policy-recommendation/process-multiple-analyses"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

fn client(server: &MockServer) -> Arc<PolicyClient> {
    let config = common::config_for(&server.uri());
    Arc::new(
        PolicyClient::new(reqwest::Client::new(), &config.api)
            .with_credentials(Arc::new(StaticCredentials::new("u1", Some("tok".into())))),
    )
}

#[test]
fn test_overlapping_rows_yield_distinct_actions_with_first_reason() {
    let rows: Vec<AnalysisResult> = serde_json::from_value(analyses()).unwrap();
    let all = extract_all_user_permissions(&rows);

    let alice = &all[ALICE];
    let actions: Vec<&str> = alice.add.iter().map(|c| c.action.as_str()).collect();
    assert_eq!(actions, vec!["s3:GetObject", "s3:ListBucket", "s3:PutObject"]);
    let get = alice.add.iter().find(|c| c.action == "s3:GetObject").unwrap();
    assert_eq!(get.reason, "seen in CloudTrail on 2024-05-01");
    assert!(alice.add.iter().all(|c| !c.apply));

    assert_eq!(all[BOB].remove[0].reason, "");
}

#[tokio::test]
async fn test_fetch_accepts_wrapped_results() {
    let server = MockServer::start().await;
    mount_analyses(&server, json!({ "results": analyses() })).await;

    let store = PermissionsStore::new(client(&server));
    store.fetch_analysis_results().await.unwrap();

    let arns = store.user_arns();
    assert!(arns.contains(&ALICE.to_string()));
    assert!(arns.contains(&BOB.to_string()));
    assert!(!store.is_loading());
}

#[tokio::test]
async fn test_fetch_failure_clears_rows_and_records_detail() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/policy-recommendation/process-multiple-analyses"))
        .respond_with(
            ResponseTemplate::new(503).set_body_json(json!({"detail": "analysis backlog"})),
        )
        .mount(&server)
        .await;

    let store = PermissionsStore::new(client(&server));
    let rows: Vec<AnalysisResult> = serde_json::from_value(analyses()).unwrap();
    store.load_results(rows);

    let err = store.fetch_analysis_results().await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<IamGuardError>(),
        Some(IamGuardError::Policy(detail)) if detail == "analysis backlog"
    ));
    assert!(store.user_arns().is_empty());
    assert!(store.error().unwrap().contains("analysis backlog"));
}

#[tokio::test]
async fn test_nothing_picked_sends_nothing() {
    let server = MockServer::start().await;
    mount_analyses(&server, analyses()).await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let store = PermissionsStore::new(client(&server));
    store.fetch_analysis_results().await.unwrap();
    store.select_user_arns(&[ALICE.to_string(), BOB.to_string()]);

    assert!(!store.has_changes_to_apply());
    assert_eq!(
        store.apply_policy_changes().await.unwrap(),
        ApplyOutcome::NothingSelected
    );
}

#[tokio::test]
async fn test_single_identity_uses_single_endpoint() {
    let server = MockServer::start().await;
    mount_analyses(&server, analyses()).await;
    Mock::given(method("POST"))
        .and(path("/policy_recommendation/apply-policy-changes"))
        .and(header("authorization", "Bearer tok"))
        .and(body_json(json!({
            "user_arn": ALICE,
            "policy_recommendation": {
                "ADD": ["s3:PutObject"],
                "REMOVE": ["iam:PassRole"],
                "Reason": "Permission changes selected by the user"
            }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "ok"})))
        .expect(1)
        .mount(&server)
        .await;

    let store = PermissionsStore::new(client(&server));
    store.fetch_analysis_results().await.unwrap();
    store.select_user_arn(ALICE);
    assert!(store.set_apply(ALICE, ChangeKind::Add, "s3:PutObject", true));
    assert!(store.set_apply(ALICE, ChangeKind::Remove, "iam:PassRole", true));
    assert!(!store.set_apply(ALICE, ChangeKind::Add, "s3:Nope", true));

    let outcome = store.apply_policy_changes().await.unwrap();

    assert_eq!(outcome, ApplyOutcome::Applied { users: 1 });
    assert!(!store.has_changes_to_apply(), "picks are cleared");
    assert!(store.success_message().is_some());
}

#[tokio::test]
async fn test_several_identities_use_bulk_endpoint() {
    let server = MockServer::start().await;
    mount_analyses(&server, analyses()).await;
    Mock::given(method("POST"))
        .and(path("/policy_recommendation/apply-policy-changes/bulk"))
        .and(body_json(json!({
            "updates": [
                {
                    "user_arn": ALICE,
                    "add_permissions": ["s3:GetObject"],
                    "remove_permissions": []
                },
                {
                    "user_arn": BOB,
                    "add_permissions": [],
                    "remove_permissions": ["s3:DeleteObject"]
                }
            ]
        })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let store = PermissionsStore::new(client(&server));
    store.fetch_analysis_results().await.unwrap();
    store.select_user_arns(&[ALICE.to_string(), BOB.to_string()]);

    assert_eq!(
        store.set_apply_for_selection(ChangeKind::Add, "s3:GetObject", true),
        1
    );
    assert_eq!(
        store.set_apply_for_selection(ChangeKind::Remove, "s3:DeleteObject", true),
        1
    );
    let merged = store.add_permissions();
    assert!(merged.iter().any(|c| c.action == "ec2:DescribeInstances"));

    let outcome = store.apply_policy_changes().await.unwrap();
    assert_eq!(outcome, ApplyOutcome::Applied { users: 2 });
}

#[tokio::test]
async fn test_apply_failure_keeps_picks() {
    let server = MockServer::start().await;
    mount_analyses(&server, analyses()).await;
    Mock::given(method("POST"))
        .and(path("/policy_recommendation/apply-policy-changes"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({"detail": "denied"})))
        .mount(&server)
        .await;

    let store = PermissionsStore::new(client(&server));
    store.fetch_analysis_results().await.unwrap();
    store.select_user_arn(BOB);
    store.set_apply(BOB, ChangeKind::Remove, "s3:DeleteObject", true);

    assert!(store.apply_policy_changes().await.is_err());
    assert!(store.has_changes_to_apply());
    assert_eq!(store.error().as_deref(), Some("Policy error: denied"));
    assert!(!store.is_submitting());
}

#[tokio::test]
async fn test_analyze_user_posts_username() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/policy-recommendation/process-multiple-analyses"))
        .and(body_json(json!({"username": "alice"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "results": analyses() })))
        .expect(1)
        .mount(&server)
        .await;

    let rows = client(&server).analyze_user_logs("alice").await.unwrap();
    assert_eq!(rows.len(), 4);
}
