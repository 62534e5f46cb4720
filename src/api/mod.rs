//! Chat backend access
//!
//! [`ChatBackend`] is the seam between the chat store and the session
//! persistence service. [`ChatApiClient`] talks to the real REST backend;
//! [`InMemoryBackend`] keeps everything in process for tests and offline
//! development.

pub mod client;
pub mod fake;
pub mod retry;

pub use client::ChatApiClient;
pub use fake::{BackendOp, InMemoryBackend};
pub use retry::RetryPolicy;

use crate::chat::types::{Message, MessageUpdate, NewMessage, Session};
use crate::error::Result;

use async_trait::async_trait;

/// Session and message persistence operations
///
/// Every operation is scoped to the signed-in user. Implementations report
/// failures unchanged; retry and fallback decisions belong to the caller.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Lists the user's sessions, newest first, at most `limit` of them.
    async fn list_sessions(&self, limit: usize) -> Result<Vec<Session>>;

    /// Creates a session with `title`.
    async fn create_session(&self, title: &str) -> Result<Session>;

    /// Fetches one session.
    async fn get_session(&self, session_id: &str) -> Result<Session>;

    /// Renames a session.
    async fn update_session(&self, session_id: &str, title: &str) -> Result<()>;

    /// Deletes a session and its messages.
    async fn delete_session(&self, session_id: &str) -> Result<()>;

    /// Lists the messages of a session in chronological order.
    async fn list_messages(&self, session_id: &str) -> Result<Vec<Message>>;

    /// Appends a message and returns it as stored.
    async fn add_message(&self, session_id: &str, message: &NewMessage) -> Result<Message>;

    /// Overwrites the reveal state of a stored message.
    async fn update_message(
        &self,
        session_id: &str,
        message_id: &str,
        update: &MessageUpdate,
    ) -> Result<()>;

    /// Removes one message.
    async fn delete_message(&self, session_id: &str, message_id: &str) -> Result<()>;
}
