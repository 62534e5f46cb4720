//! Illustrative sessions for offline development
//!
//! Seeded only when `chat.dev_fallback` is on, the backend could not be
//! reached at all, and the local list is empty. Ids carry the `local-`
//! prefix so nothing is ever written back to a real backend for them.

use crate::chat::types::{AnimationState, Message, Sender, Session};

use chrono::{Duration, Utc};

fn message(
    session_id: &str,
    id: &str,
    sender: Sender,
    text: &str,
    at: chrono::DateTime<Utc>,
) -> Message {
    Message {
        session_id: session_id.to_string(),
        message_id: format!("local-{}", id),
        sender,
        text: text.to_string(),
        display_text: None,
        timestamp: at,
        is_typing: false,
        animation_state: Some(AnimationState::Appear),
    }
}

/// Two sample sessions with their messages, newest first.
pub fn seed_sessions(user_id: &str) -> Vec<(Session, Vec<Message>)> {
    let now = Utc::now();
    let yesterday = now - Duration::days(1);

    let log_tools = Session {
        session_id: "local-session-2".to_string(),
        user_id: user_id.to_string(),
        title: "Log analysis tooling".to_string(),
        created_at: now,
        updated_at: now,
        message_count: 2,
    };
    let log_messages = vec![
        message(
            &log_tools.session_id,
            "msg-3",
            Sender::User,
            "Which tools work well for analyzing AWS logs?",
            now,
        ),
        message(
            &log_tools.session_id,
            "msg-4",
            Sender::Bot,
            "AWS offers CloudWatch Logs Insights, Amazon Athena and Amazon OpenSearch Service. \
             Popular third-party options include Splunk, the ELK stack and Datadog.",
            now,
        ),
    ];

    let s3_access = Session {
        session_id: "local-session-1".to_string(),
        user_id: user_id.to_string(),
        title: "S3 bucket permissions".to_string(),
        created_at: yesterday,
        updated_at: yesterday,
        message_count: 2,
    };
    let s3_messages = vec![
        message(
            &s3_access.session_id,
            "msg-1",
            Sender::User,
            "How do I configure access to an S3 bucket?",
            yesterday,
        ),
        message(
            &s3_access.session_id,
            "msg-2",
            Sender::Bot,
            "Bucket access is controlled by bucket policies and IAM policies. A bucket policy \
             is a JSON document attached to the bucket; IAM policies attach to users, groups \
             or roles and grant access to AWS resources.",
            yesterday,
        ),
    ];

    vec![(log_tools, log_messages), (s3_access, s3_messages)]
}
