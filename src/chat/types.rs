//! Chat sessions and messages as exchanged with the backend
//!
//! Field names follow the backend's camelCase JSON.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Shown in place of a bot reply when any step of a send fails.
pub const APOLOGY_TEXT: &str =
    "Sorry, something went wrong while processing the response. Please try again.";

/// Text of the transient loading placeholder.
pub const PLACEHOLDER_TEXT: &str = "...";

/// Prefix of ids for messages that exist only in the local store.
const LOCAL_ID_PREFIX: &str = "local-";

/// One conversation thread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// Unique key
    pub session_id: String,
    /// Owner
    #[serde(default)]
    pub user_id: String,
    /// Display title
    #[serde(default)]
    pub title: String,
    /// Creation time
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    /// Last modification time, maintained by the backend
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
    /// Number of stored messages
    #[serde(default)]
    pub message_count: usize,
}

/// Author of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    /// The signed-in user
    User,
    /// The assistant
    Bot,
}

/// Reveal progress of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnimationState {
    /// Shown at once
    Appear,
    /// Being revealed character by character
    Typing,
    /// Fully revealed
    Complete,
}

/// One message inside a session.
///
/// `text` is the authoritative content. During a typing animation
/// `display_text` holds the revealed prefix; once `animation_state` is
/// [`AnimationState::Complete`] the two are equal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Owning session
    pub session_id: String,
    /// Unique key within the session
    pub message_id: String,
    /// Author
    pub sender: Sender,
    /// Full content
    #[serde(default)]
    pub text: String,
    /// Revealed prefix during animation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_text: Option<String>,
    /// Creation time
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    /// Marks the loading placeholder
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_typing: bool,
    /// Reveal progress
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub animation_state: Option<AnimationState>,
}

impl Message {
    /// A bot message that only exists locally.
    pub fn local_bot(session_id: &str, text: &str) -> Self {
        Self {
            session_id: session_id.to_string(),
            message_id: format!("{}{}", LOCAL_ID_PREFIX, uuid::Uuid::new_v4()),
            sender: Sender::Bot,
            text: text.to_string(),
            display_text: None,
            timestamp: Utc::now(),
            is_typing: false,
            animation_state: Some(AnimationState::Appear),
        }
    }

    /// `true` for messages never stored on the backend.
    pub fn is_local(&self) -> bool {
        self.message_id.starts_with(LOCAL_ID_PREFIX)
    }

    /// The text a viewer should see right now.
    pub fn visible_text(&self) -> &str {
        match (self.animation_state, self.display_text.as_deref()) {
            (Some(AnimationState::Typing), Some(shown)) => shown,
            _ => &self.text,
        }
    }

    /// `true` once the full text is visible.
    pub fn is_fully_revealed(&self) -> bool {
        self.animation_state != Some(AnimationState::Typing)
    }
}

/// Body of an add-message request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMessage {
    /// Full content
    pub text: String,
    /// Author
    pub sender: Sender,
    /// Initial revealed prefix
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_text: Option<String>,
    /// Marks the loading placeholder
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_typing: bool,
    /// Initial reveal progress
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub animation_state: Option<AnimationState>,
}

impl NewMessage {
    /// A message typed by the user.
    pub fn user(text: &str) -> Self {
        Self {
            text: text.to_string(),
            sender: Sender::User,
            display_text: None,
            is_typing: false,
            animation_state: Some(AnimationState::Appear),
        }
    }

    /// The loading placeholder shown while a reply is pending.
    pub fn placeholder() -> Self {
        Self {
            text: PLACEHOLDER_TEXT.to_string(),
            sender: Sender::Bot,
            display_text: None,
            is_typing: true,
            animation_state: None,
        }
    }

    /// A bot reply about to be revealed by the typing animation.
    pub fn bot_typing(text: &str) -> Self {
        Self {
            text: text.to_string(),
            sender: Sender::Bot,
            display_text: Some(String::new()),
            is_typing: false,
            animation_state: Some(AnimationState::Typing),
        }
    }
}

/// Body of an update-message request, used to sync animation progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageUpdate {
    /// Full content
    pub text: String,
    /// Revealed prefix
    pub display_text: String,
    /// Reveal progress
    pub animation_state: AnimationState,
}

/// Derives a session title from the first message.
///
/// Keeps at most `max_chars` characters and appends `...` when the text was
/// longer.
///
/// # Examples
///
/// ```
/// use iamguard::chat::types::truncate_title;
///
/// assert_eq!(truncate_title("short", 30), "short");
/// assert_eq!(truncate_title("abcdef", 3), "abc...");
/// ```
pub fn truncate_title(text: &str, max_chars: usize) -> String {
    if text.chars().count() > max_chars {
        let head: String = text.chars().take(max_chars).collect();
        format!("{}...", head)
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_title_boundaries() {
        let exactly_30 = "a".repeat(30);
        assert_eq!(truncate_title(&exactly_30, 30), exactly_30);

        let thirty_one = "b".repeat(31);
        assert_eq!(truncate_title(&thirty_one, 30), format!("{}...", "b".repeat(30)));
    }

    #[test]
    fn test_truncate_title_counts_chars_not_bytes() {
        let korean = "가".repeat(31);
        let title = truncate_title(&korean, 30);
        assert_eq!(title.chars().count(), 33);
        assert!(title.ends_with("..."));
    }

    #[test]
    fn test_session_deserializes_camel_case() {
        let json = r#"{
            "sessionId": "s1",
            "userId": "u1",
            "title": "Hello",
            "createdAt": "2024-05-01T10:00:00Z",
            "updatedAt": "2024-05-01T11:00:00Z",
            "messageCount": 4,
            "ttl": 123
        }"#;
        let session: Session = serde_json::from_str(json).unwrap();
        assert_eq!(session.session_id, "s1");
        assert_eq!(session.message_count, 4);
        assert!(session.updated_at > session.created_at);
    }

    #[test]
    fn test_message_deserializes_optional_fields() {
        let json = r#"{"sessionId":"s1","messageId":"m1","sender":"bot","text":"hi",
                       "timestamp":"2024-05-01T10:00:00Z","isTyping":true}"#;
        let message: Message = serde_json::from_str(json).unwrap();
        assert_eq!(message.sender, Sender::Bot);
        assert!(message.is_typing);
        assert!(message.display_text.is_none());
        assert!(message.animation_state.is_none());
    }

    #[test]
    fn test_new_message_omits_defaults() {
        let value = serde_json::to_value(NewMessage::user("hi")).unwrap();
        assert_eq!(value["sender"], "user");
        assert_eq!(value["animationState"], "appear");
        assert!(value.get("isTyping").is_none());
        assert!(value.get("displayText").is_none());

        let value = serde_json::to_value(NewMessage::placeholder()).unwrap();
        assert_eq!(value["isTyping"], true);
    }

    #[test]
    fn test_visible_text_follows_animation() {
        let mut message = Message::local_bot("s1", "hello");
        assert_eq!(message.visible_text(), "hello");

        message.animation_state = Some(AnimationState::Typing);
        message.display_text = Some("he".to_string());
        assert_eq!(message.visible_text(), "he");
        assert!(!message.is_fully_revealed());
    }

    #[test]
    fn test_local_messages_are_marked() {
        let message = Message::local_bot("s1", APOLOGY_TEXT);
        assert!(message.is_local());
        assert_eq!(message.animation_state, Some(AnimationState::Appear));
    }
}
