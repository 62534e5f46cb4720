//! In-process chat backend
//!
//! Keeps sessions and messages in memory. Used by tests and by the console
//! when no backend is reachable. Individual operations can be made to fail
//! and every call is recorded, so store behavior can be asserted without a
//! server.

use crate::api::ChatBackend;
use crate::chat::types::{Message, MessageUpdate, NewMessage, Session};
use crate::error::{IamGuardError, Result};

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Names one [`ChatBackend`] operation, for failure injection and call logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendOp {
    /// `list_sessions`
    ListSessions,
    /// `create_session`
    CreateSession,
    /// `get_session`
    GetSession,
    /// `update_session`
    UpdateSession,
    /// `delete_session`
    DeleteSession,
    /// `list_messages`
    ListMessages,
    /// `add_message`
    AddMessage,
    /// `update_message`
    UpdateMessage,
    /// `delete_message`
    DeleteMessage,
}

impl fmt::Display for BackendOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BackendOp::ListSessions => "list_sessions",
            BackendOp::CreateSession => "create_session",
            BackendOp::GetSession => "get_session",
            BackendOp::UpdateSession => "update_session",
            BackendOp::DeleteSession => "delete_session",
            BackendOp::ListMessages => "list_messages",
            BackendOp::AddMessage => "add_message",
            BackendOp::UpdateMessage => "update_message",
            BackendOp::DeleteMessage => "delete_message",
        };
        write!(f, "{}", name)
    }
}

#[derive(Default)]
struct FakeState {
    sessions: Vec<Session>,
    messages: HashMap<String, Vec<Message>>,
    failing: HashSet<BackendOp>,
    calls: Vec<String>,
}

/// [`ChatBackend`] holding everything in memory
///
/// # Examples
///
/// ```
/// use iamguard::api::{BackendOp, ChatBackend, InMemoryBackend};
///
/// # tokio_test::block_on(async {
/// let backend = InMemoryBackend::new("user-1");
/// let session = backend.create_session("Hello").await.unwrap();
/// assert_eq!(backend.list_sessions(20).await.unwrap().len(), 1);
///
/// backend.fail_on(BackendOp::GetSession);
/// assert!(backend.get_session(&session.session_id).await.is_err());
/// # });
/// ```
pub struct InMemoryBackend {
    user_id: String,
    state: Mutex<FakeState>,
}

impl InMemoryBackend {
    /// Creates an empty backend owned by `user_id`.
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            state: Mutex::new(FakeState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Makes every later call of `op` fail with a 500 response.
    pub fn fail_on(&self, op: BackendOp) {
        self.lock().failing.insert(op);
    }

    /// Stops failing `op`.
    pub fn recover(&self, op: BackendOp) {
        self.lock().failing.remove(&op);
    }

    /// Calls made so far, formatted as `op:arg[:arg]`.
    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    /// Number of recorded calls of `op`.
    pub fn call_count(&self, op: BackendOp) -> usize {
        let prefix = format!("{}:", op);
        self.lock()
            .calls
            .iter()
            .filter(|c| c.starts_with(&prefix) || **c == op.to_string())
            .count()
    }

    /// Stored messages of a session, bypassing failure injection.
    pub fn stored_messages(&self, session_id: &str) -> Vec<Message> {
        self.lock()
            .messages
            .get(session_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Stored sessions, bypassing failure injection.
    pub fn stored_sessions(&self) -> Vec<Session> {
        self.lock().sessions.clone()
    }

    /// Records the call and applies failure injection.
    fn enter(&self, op: BackendOp, args: &[&str]) -> Result<MutexGuard<'_, FakeState>> {
        let mut state = self.lock();
        let mut entry = op.to_string();
        for arg in args {
            entry.push(':');
            entry.push_str(arg);
        }
        state.calls.push(entry);

        if state.failing.contains(&op) {
            tracing::debug!("Injected failure for {}", op);
            return Err(IamGuardError::Api {
                status: 500,
                body: format!("injected failure: {}", op),
            }
            .into());
        }
        Ok(state)
    }
}

fn not_found(what: &str, id: &str) -> anyhow::Error {
    IamGuardError::Api {
        status: 404,
        body: format!("{} {} not found", what, id),
    }
    .into()
}

fn session_mut<'a>(state: &'a mut FakeState, session_id: &str) -> Result<&'a mut Session> {
    state
        .sessions
        .iter_mut()
        .find(|s| s.session_id == session_id)
        .ok_or_else(|| not_found("session", session_id))
}

#[async_trait]
impl ChatBackend for InMemoryBackend {
    async fn list_sessions(&self, limit: usize) -> Result<Vec<Session>> {
        let state = self.enter(BackendOp::ListSessions, &[])?;
        let mut sessions = state.sessions.clone();
        sessions.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        sessions.truncate(limit);
        Ok(sessions)
    }

    async fn create_session(&self, title: &str) -> Result<Session> {
        let mut state = self.enter(BackendOp::CreateSession, &[title])?;
        let now = Utc::now();
        let session = Session {
            session_id: uuid::Uuid::new_v4().to_string(),
            user_id: self.user_id.clone(),
            title: title.to_string(),
            created_at: now,
            updated_at: now,
            message_count: 0,
        };
        state.sessions.push(session.clone());
        state.messages.insert(session.session_id.clone(), Vec::new());
        Ok(session)
    }

    async fn get_session(&self, session_id: &str) -> Result<Session> {
        let mut state = self.enter(BackendOp::GetSession, &[session_id])?;
        session_mut(&mut state, session_id).map(|s| s.clone())
    }

    async fn update_session(&self, session_id: &str, title: &str) -> Result<()> {
        let mut state = self.enter(BackendOp::UpdateSession, &[session_id, title])?;
        let session = session_mut(&mut state, session_id)?;
        session.title = title.to_string();
        session.updated_at = Utc::now();
        Ok(())
    }

    async fn delete_session(&self, session_id: &str) -> Result<()> {
        let mut state = self.enter(BackendOp::DeleteSession, &[session_id])?;
        session_mut(&mut state, session_id)?;
        state.sessions.retain(|s| s.session_id != session_id);
        state.messages.remove(session_id);
        Ok(())
    }

    async fn list_messages(&self, session_id: &str) -> Result<Vec<Message>> {
        let mut state = self.enter(BackendOp::ListMessages, &[session_id])?;
        session_mut(&mut state, session_id)?;
        Ok(state.messages.get(session_id).cloned().unwrap_or_default())
    }

    async fn add_message(&self, session_id: &str, message: &NewMessage) -> Result<Message> {
        let mut state = self.enter(BackendOp::AddMessage, &[session_id])?;
        let session = session_mut(&mut state, session_id)?;
        let now = Utc::now();
        session.message_count += 1;
        session.updated_at = now;

        let stored = Message {
            session_id: session_id.to_string(),
            message_id: uuid::Uuid::new_v4().to_string(),
            sender: message.sender,
            text: message.text.clone(),
            display_text: message.display_text.clone(),
            timestamp: now,
            is_typing: message.is_typing,
            animation_state: message.animation_state,
        };
        state
            .messages
            .entry(session_id.to_string())
            .or_default()
            .push(stored.clone());
        Ok(stored)
    }

    async fn update_message(
        &self,
        session_id: &str,
        message_id: &str,
        update: &MessageUpdate,
    ) -> Result<()> {
        let mut state = self.enter(BackendOp::UpdateMessage, &[session_id, message_id])?;
        let message = state
            .messages
            .get_mut(session_id)
            .and_then(|list| list.iter_mut().find(|m| m.message_id == message_id))
            .ok_or_else(|| not_found("message", message_id))?;
        message.text = update.text.clone();
        message.display_text = Some(update.display_text.clone());
        message.animation_state = Some(update.animation_state);
        Ok(())
    }

    async fn delete_message(&self, session_id: &str, message_id: &str) -> Result<()> {
        let mut state = self.enter(BackendOp::DeleteMessage, &[session_id, message_id])?;
        let list = state
            .messages
            .get_mut(session_id)
            .ok_or_else(|| not_found("session", session_id))?;
        let before = list.len();
        list.retain(|m| m.message_id != message_id);
        if list.len() == before {
            return Err(not_found("message", message_id));
        }
        if let Ok(session) = session_mut(&mut state, session_id) {
            session.message_count = session.message_count.saturating_sub(1);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_message_lifecycle_updates_count() {
        let backend = InMemoryBackend::new("u1");
        let session = backend.create_session("t").await.unwrap();
        let message = backend
            .add_message(&session.session_id, &NewMessage::user("hi"))
            .await
            .unwrap();

        let fetched = backend.get_session(&session.session_id).await.unwrap();
        assert_eq!(fetched.message_count, 1);

        backend
            .delete_message(&session.session_id, &message.message_id)
            .await
            .unwrap();
        let fetched = backend.get_session(&session.session_id).await.unwrap();
        assert_eq!(fetched.message_count, 0);
    }

    #[tokio::test]
    async fn test_injected_failure_is_api_error() {
        let backend = InMemoryBackend::new("u1");
        backend.fail_on(BackendOp::ListSessions);
        let err = backend.list_sessions(20).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<IamGuardError>(),
            Some(IamGuardError::Api { status: 500, .. })
        ));

        backend.recover(BackendOp::ListSessions);
        assert!(backend.list_sessions(20).await.is_ok());
        assert_eq!(backend.call_count(BackendOp::ListSessions), 2);
    }

    #[tokio::test]
    async fn test_unknown_session_is_not_found() {
        let backend = InMemoryBackend::new("u1");
        let err = backend.get_session("missing").await.unwrap_err();
        assert!(err.to_string().contains("404"));
    }

    #[tokio::test]
    async fn test_update_message_overwrites_reveal_state() {
        let backend = InMemoryBackend::new("u1");
        let session = backend.create_session("t").await.unwrap();
        let message = backend
            .add_message(&session.session_id, &NewMessage::bot_typing("hello"))
            .await
            .unwrap();
        backend
            .update_message(
                &session.session_id,
                &message.message_id,
                &MessageUpdate {
                    text: "hello".to_string(),
                    display_text: "he".to_string(),
                    animation_state: crate::chat::types::AnimationState::Typing,
                },
            )
            .await
            .unwrap();
        let stored = backend.stored_messages(&session.session_id);
        assert_eq!(stored[0].display_text.as_deref(), Some("he"));
    }
}
