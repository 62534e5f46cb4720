//! Chat session store
//!
//! Holds the session list, the current session and its messages, and
//! drives the send-message exchange: persist the user message, show a
//! loading placeholder, ask the bot, replace the placeholder with the reply
//! and reveal it with the typing animation.
//!
//! State sits behind a `std::sync::Mutex` that is only ever locked between
//! awaits. Callers read it through cloning getters.

use crate::api::{ChatBackend, RetryPolicy};
use crate::chat::fallback::seed_sessions;
use crate::chat::inference::BotResponder;
use crate::chat::sync::{SyncFailure, SyncJob, SyncQueue};
use crate::chat::types::{
    truncate_title, AnimationState, Message, MessageUpdate, NewMessage, Session, APOLOGY_TEXT,
};
use crate::chat::typing::{AnimationJob, AnimationOutcome, RevealTarget, TypingAnimator};
use crate::config::ChatConfig;
use crate::error::{is_transport_failure, IamGuardError, Result};
use crate::metrics::ReplyMetrics;

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

#[derive(Default)]
struct ChatState {
    loading: bool,
    error: Option<String>,
    sessions: Vec<Session>,
    current: Option<Session>,
    messages: Vec<Message>,
    /// Sessions with a send in flight
    busy: HashSet<String>,
    /// Sessions between placeholder creation and the end of the reveal
    awaiting: HashSet<String>,
    /// Running animations by message id
    animations: HashMap<String, CancellationToken>,
    /// Messages of locally seeded sessions
    offline: HashMap<String, Vec<Message>>,
}

impl ChatState {
    fn current_id(&self) -> Option<&str> {
        self.current.as_ref().map(|s| s.session_id.as_str())
    }

    fn is_current(&self, session_id: &str) -> bool {
        self.current_id() == Some(session_id)
    }

    fn push_if_current(&mut self, message: Message) {
        if self.is_current(&message.session_id) {
            self.messages.push(message);
        }
    }

    fn remove_message(&mut self, message_id: &str) {
        self.messages.retain(|m| m.message_id != message_id);
    }

    fn cancel_animations(&mut self) {
        for (_, token) in self.animations.drain() {
            token.cancel();
        }
    }

    /// Replaces the list entry and, when current, the current record.
    fn replace_session(&mut self, session: Session) {
        if let Some(entry) = self
            .sessions
            .iter_mut()
            .find(|s| s.session_id == session.session_id)
        {
            *entry = session.clone();
        }
        if self.is_current(&session.session_id) {
            self.current = Some(session);
        }
    }
}

struct SharedState {
    inner: Mutex<ChatState>,
}

impl SharedState {
    fn lock(&self) -> MutexGuard<'_, ChatState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl RevealTarget for SharedState {
    fn reveal(&self, message_id: &str, shown: &str) -> bool {
        let mut state = self.lock();
        match state.messages.iter_mut().find(|m| m.message_id == message_id) {
            Some(message) => {
                message.display_text = Some(shown.to_string());
                true
            }
            None => false,
        }
    }

    fn complete(&self, message_id: &str) -> bool {
        let mut state = self.lock();
        match state.messages.iter_mut().find(|m| m.message_id == message_id) {
            Some(message) => {
                message.display_text = Some(message.text.clone());
                message.animation_state = Some(AnimationState::Complete);
                true
            }
            None => false,
        }
    }
}

/// Releases the busy flag and the waiting flag of one session.
struct SendGuard {
    state: Arc<SharedState>,
    session_id: String,
}

impl Drop for SendGuard {
    fn drop(&mut self) {
        let mut state = self.state.lock();
        state.busy.remove(&self.session_id);
        state.awaiting.remove(&self.session_id);
    }
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// The chat session store
///
/// Construct inside a tokio runtime; the background sync worker is spawned
/// on creation.
///
/// # Examples
///
/// ```no_run
/// use iamguard::api::{InMemoryBackend, RetryPolicy};
/// use iamguard::chat::{BotResponder, ChatStore};
/// use iamguard::config::ChatConfig;
/// use std::sync::Arc;
///
/// struct Echo;
///
/// #[async_trait::async_trait]
/// impl BotResponder for Echo {
///     async fn respond(&self, _session_id: &str, text: &str) -> iamguard::error::Result<String> {
///         Ok(format!("you said: {}", text))
///     }
/// }
///
/// # async fn example() -> iamguard::error::Result<()> {
/// let store = ChatStore::new(
///     Arc::new(InMemoryBackend::new("user-1")),
///     Arc::new(Echo),
///     &ChatConfig::default(),
///     RetryPolicy::none(),
/// );
/// store.send_message("hello").await?;
/// assert_eq!(store.current_messages().len(), 2);
/// # Ok(())
/// # }
/// ```
pub struct ChatStore {
    backend: Arc<dyn ChatBackend>,
    responder: Arc<dyn BotResponder>,
    animator: TypingAnimator,
    sync: SyncQueue,
    reads: RetryPolicy,
    config: ChatConfig,
    state: Arc<SharedState>,
}

/// Title given to sessions created without one.
pub fn default_session_title() -> String {
    format!("New conversation {}", chrono::Local::now().format("%Y-%m-%d"))
}

impl ChatStore {
    /// Creates an empty store and spawns its sync worker.
    pub fn new(
        backend: Arc<dyn ChatBackend>,
        responder: Arc<dyn BotResponder>,
        config: &ChatConfig,
        reads: RetryPolicy,
    ) -> Self {
        Self {
            sync: SyncQueue::spawn(backend.clone()),
            backend,
            responder,
            animator: TypingAnimator::from_chat_config(config),
            reads,
            config: config.clone(),
            state: Arc::new(SharedState {
                inner: Mutex::new(ChatState::default()),
            }),
        }
    }

    /// Replaces the typing animator.
    pub fn with_animator(mut self, animator: TypingAnimator) -> Self {
        self.animator = animator;
        self
    }

    /// Stores the error text and hands the error back.
    fn fail(&self, err: anyhow::Error) -> anyhow::Error {
        self.state.lock().error = Some(err.to_string());
        err
    }

    // -----------------------------------------------------------------------
    // Getters
    // -----------------------------------------------------------------------

    /// All known sessions, newest first.
    pub fn sessions(&self) -> Vec<Session> {
        self.state.lock().sessions.clone()
    }

    /// The selected session.
    pub fn current_session(&self) -> Option<Session> {
        self.state.lock().current.clone()
    }

    /// Id of the selected session.
    pub fn current_session_id(&self) -> Option<String> {
        self.state.lock().current_id().map(str::to_string)
    }

    /// Messages of the selected session, oldest first.
    pub fn current_messages(&self) -> Vec<Message> {
        self.state.lock().messages.clone()
    }

    /// `true` while any session is waiting for a bot reply.
    pub fn waiting_for_response(&self) -> bool {
        !self.state.lock().awaiting.is_empty()
    }

    /// `true` while the session list or a session is loading.
    pub fn is_loading(&self) -> bool {
        self.state.lock().loading
    }

    /// The last recorded error.
    pub fn error(&self) -> Option<String> {
        self.state.lock().error.clone()
    }

    /// `true` when at least one session is known.
    pub fn has_sessions(&self) -> bool {
        !self.state.lock().sessions.is_empty()
    }

    /// `true` while a send is in flight for `session_id`.
    pub fn is_session_busy(&self, session_id: &str) -> bool {
        self.state.lock().busy.contains(session_id)
    }

    /// Receives failures of background sync jobs.
    pub fn subscribe_sync_errors(&self) -> broadcast::Receiver<SyncFailure> {
        self.sync.subscribe_errors()
    }

    /// Waits for queued background syncs to be applied.
    pub async fn flush_sync(&self) {
        self.sync.flush().await;
    }

    // -----------------------------------------------------------------------
    // Sessions
    // -----------------------------------------------------------------------

    /// Loads the session list and selects the newest session when none is
    /// selected
    ///
    /// With `chat.dev_fallback` on, a transport failure on an empty list
    /// seeds sample sessions. The error is recorded and returned either way.
    pub async fn fetch_sessions(&self) -> Result<()> {
        {
            let mut state = self.state.lock();
            state.loading = true;
            state.error = None;
        }

        let backend = &self.backend;
        let limit = self.config.session_list_limit;
        let result = self
            .reads
            .run("list sessions", || backend.list_sessions(limit))
            .await;
        self.state.lock().loading = false;

        match result {
            Ok(sessions) => {
                tracing::info!("Loaded {} sessions", sessions.len());
                let first = {
                    let mut state = self.state.lock();
                    state.sessions = sessions;
                    state.offline.clear();
                    match state.current {
                        Some(_) => None,
                        None => state.sessions.first().map(|s| s.session_id.clone()),
                    }
                };
                if let Some(session_id) = first {
                    if let Err(e) = self.select_session(&session_id).await {
                        tracing::warn!("Could not open session {}: {}", session_id, e);
                    }
                }
                Ok(())
            }
            Err(e) => {
                if self.config.dev_fallback && is_transport_failure(&e) {
                    self.seed_fallback();
                }
                Err(self.fail(e))
            }
        }
    }

    fn seed_fallback(&self) {
        let mut state = self.state.lock();
        if !state.sessions.is_empty() {
            return;
        }
        let seed = seed_sessions("developer");
        tracing::warn!("Backend unreachable; showing {} sample sessions", seed.len());
        for (session, messages) in seed {
            state.offline.insert(session.session_id.clone(), messages);
            state.sessions.push(session);
        }
        if state.current.is_none() {
            if let Some(first) = state.sessions.first().cloned() {
                state.messages = state
                    .offline
                    .get(&first.session_id)
                    .cloned()
                    .unwrap_or_default();
                state.current = Some(first);
            }
        }
    }

    /// Creates a session and makes it current
    ///
    /// A blank or missing title becomes `New conversation {date}`.
    pub async fn create_new_session(&self, title: Option<&str>) -> Result<Session> {
        let title = match title.map(str::trim).filter(|t| !t.is_empty()) {
            Some(t) => t.to_string(),
            None => default_session_title(),
        };

        let session = self
            .backend
            .create_session(&title)
            .await
            .map_err(|e| self.fail(e))?;

        tracing::info!("Created session {}", session.session_id);
        let mut state = self.state.lock();
        state.cancel_animations();
        state.sessions.insert(0, session.clone());
        state.current = Some(session.clone());
        state.messages.clear();
        state.error = None;
        Ok(session)
    }

    /// Makes `session_id` current, refreshing it and its messages
    ///
    /// # Errors
    ///
    /// Returns [`IamGuardError::SessionNotFound`] when the id is not in the
    /// local list, or the backend error.
    pub async fn select_session(&self, session_id: &str) -> Result<()> {
        let offline = {
            let state = self.state.lock();
            if !state.sessions.iter().any(|s| s.session_id == session_id) {
                None
            } else {
                Some(state.offline.get(session_id).cloned())
            }
        };
        let offline = match offline {
            Some(offline) => offline,
            None => {
                return Err(self.fail(IamGuardError::SessionNotFound(session_id.to_string()).into()))
            }
        };

        if let Some(messages) = offline {
            let mut state = self.state.lock();
            state.cancel_animations();
            state.current = state
                .sessions
                .iter()
                .find(|s| s.session_id == session_id)
                .cloned();
            state.messages = messages;
            return Ok(());
        }

        {
            let mut state = self.state.lock();
            state.loading = true;
            state.error = None;
        }

        let backend = &self.backend;
        let result: Result<(Session, Vec<Message>)> = async {
            let session = self
                .reads
                .run("get session", || backend.get_session(session_id))
                .await?;
            let messages = self
                .reads
                .run("list messages", || backend.list_messages(session_id))
                .await?;
            Ok((session, messages))
        }
        .await;
        self.state.lock().loading = false;

        let (session, messages) = result.map_err(|e| self.fail(e))?;
        tracing::debug!(
            "Selected session {} with {} messages",
            session_id,
            messages.len()
        );
        let mut state = self.state.lock();
        state.cancel_animations();
        state.current = Some(session.clone());
        state.replace_session(session);
        state.messages = messages;
        Ok(())
    }

    async fn rename(&self, session_id: &str, title: &str) -> Result<()> {
        let is_offline = self.state.lock().offline.contains_key(session_id);
        if !is_offline {
            self.backend.update_session(session_id, title).await?;
        }
        let mut state = self.state.lock();
        for session in state.sessions.iter_mut() {
            if session.session_id == session_id {
                session.title = title.to_string();
            }
        }
        if let Some(current) = state.current.as_mut() {
            if current.session_id == session_id {
                current.title = title.to_string();
            }
        }
        Ok(())
    }

    /// Renames a session locally and on the backend.
    pub async fn update_session_title(&self, session_id: &str, title: &str) -> Result<()> {
        self.rename(session_id, title).await.map_err(|e| self.fail(e))
    }

    /// Deletes a session, remote first
    ///
    /// When it was current, the next remaining session is selected, or
    /// none if the list is now empty.
    pub async fn delete_session(&self, session_id: &str) -> Result<()> {
        let is_offline = self.state.lock().offline.contains_key(session_id);
        if !is_offline {
            self.backend
                .delete_session(session_id)
                .await
                .map_err(|e| self.fail(e))?;
        }

        let next = {
            let mut state = self.state.lock();
            state.sessions.retain(|s| s.session_id != session_id);
            state.offline.remove(session_id);
            if state.is_current(session_id) {
                state.cancel_animations();
                state.messages.clear();
                state.current = state.sessions.first().cloned();
                state.current_id().map(str::to_string)
            } else {
                None
            }
        };
        tracing::info!("Deleted session {}", session_id);

        if let Some(next) = next {
            self.select_session(&next).await?;
        }
        Ok(())
    }

    /// Deletes every message of the current session, remote first.
    pub async fn clear_messages(&self) -> Result<()> {
        let (session_id, targets, is_offline) = {
            let mut state = self.state.lock();
            let session_id = match state.current_id() {
                Some(id) => id.to_string(),
                None => return Ok(()),
            };
            state.cancel_animations();
            let targets: Vec<String> = state
                .messages
                .iter()
                .filter(|m| !m.is_local())
                .map(|m| m.message_id.clone())
                .collect();
            let is_offline = state.offline.contains_key(&session_id);
            (session_id, targets, is_offline)
        };

        for message_id in &targets {
            self.backend
                .delete_message(&session_id, message_id)
                .await
                .map_err(|e| self.fail(e))?;
            self.state.lock().remove_message(message_id);
        }
        {
            let mut state = self.state.lock();
            if state.is_current(&session_id) {
                state.messages.clear();
            }
            if let Some(messages) = state.offline.get_mut(&session_id) {
                messages.clear();
            }
        }

        if !is_offline {
            let backend = &self.backend;
            let session = self
                .reads
                .run("get session", || backend.get_session(&session_id))
                .await
                .map_err(|e| self.fail(e))?;
            self.state.lock().replace_session(session);
        }
        Ok(())
    }

    /// Drops all state and stops running animations.
    pub fn reset_state(&self) {
        let mut state = self.state.lock();
        state.cancel_animations();
        *state = ChatState::default();
        tracing::debug!("Chat state reset");
    }

    // -----------------------------------------------------------------------
    // Messages
    // -----------------------------------------------------------------------

    /// Sends `text` and reveals the bot's reply
    ///
    /// Blank input is ignored. Without a current session one is created,
    /// titled after the message. A failure after the send was accepted is
    /// recorded and shown as a local apology message; the loading
    /// placeholder never outlives the call.
    ///
    /// # Errors
    ///
    /// Returns [`IamGuardError::SessionBusy`] when a send is already in
    /// flight for the session, or the error of creating a missing session.
    pub async fn send_message(&self, text: &str) -> Result<()> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(());
        }

        let session_id = match self.current_session_id() {
            Some(id) => id,
            None => {
                let title = truncate_title(text, self.config.title_max_chars);
                self.create_new_session(Some(&title)).await?.session_id
            }
        };

        let _guard = self.begin_send(&session_id)?;
        let metrics = ReplyMetrics::start(&session_id);
        let mut placeholder = None;

        match self.exchange(&session_id, text, &mut placeholder).await {
            Ok(()) => metrics.record_outcome("success"),
            Err(e) => {
                metrics.record_outcome("error");
                tracing::error!("Message exchange in session {} failed: {:#}", session_id, e);
                self.state.lock().error = Some(e.to_string());
                if let Some(message_id) = placeholder.take() {
                    self.discard_placeholder(&session_id, &message_id).await;
                }
                self.state
                    .lock()
                    .push_if_current(Message::local_bot(&session_id, APOLOGY_TEXT));
            }
        }
        Ok(())
    }

    fn begin_send(&self, session_id: &str) -> Result<SendGuard> {
        let accepted = self.state.lock().busy.insert(session_id.to_string());
        if !accepted {
            tracing::warn!("Rejected concurrent send in session {}", session_id);
            return Err(IamGuardError::SessionBusy(session_id.to_string()).into());
        }
        Ok(SendGuard {
            state: self.state.clone(),
            session_id: session_id.to_string(),
        })
    }

    async fn exchange(
        &self,
        session_id: &str,
        text: &str,
        placeholder: &mut Option<String>,
    ) -> Result<()> {
        let is_offline = self.state.lock().offline.contains_key(session_id);
        if is_offline {
            return Err(IamGuardError::Config(
                "sample sessions are read-only; the backend is unreachable".to_string(),
            )
            .into());
        }

        let saved = self
            .backend
            .add_message(session_id, &NewMessage::user(text))
            .await?;
        let is_first = {
            let mut state = self.state.lock();
            state.push_if_current(saved);
            state.is_current(session_id) && state.messages.len() == 1
        };

        if is_first {
            let title = truncate_title(text, self.config.title_max_chars);
            if let Err(e) = self.rename(session_id, &title).await {
                tracing::warn!("Could not retitle session {}: {}", session_id, e);
            }
        }

        self.state.lock().awaiting.insert(session_id.to_string());
        let loading = self
            .backend
            .add_message(session_id, &NewMessage::placeholder())
            .await?;
        *placeholder = Some(loading.message_id.clone());
        self.state.lock().push_if_current(loading);

        let reply = self.responder.respond(session_id, text).await?;

        if let Some(message_id) = placeholder.take() {
            self.state.lock().remove_message(&message_id);
            self.backend.delete_message(session_id, &message_id).await?;
        }

        let mut bot = self
            .backend
            .add_message(session_id, &NewMessage::bot_typing(&reply))
            .await?;
        bot.is_typing = false;
        bot.display_text = Some(String::new());
        bot.animation_state = Some(AnimationState::Typing);

        let token = CancellationToken::new();
        {
            let mut state = self.state.lock();
            state
                .animations
                .insert(bot.message_id.clone(), token.clone());
            state.push_if_current(bot.clone());
        }

        let job = AnimationJob {
            session_id: session_id.to_string(),
            message_id: bot.message_id.clone(),
            text: bot.text.clone(),
        };
        let progress = self.config.persist_typing.then_some(&self.sync);
        let outcome = self
            .animator
            .animate(self.state.as_ref(), &job, &token, progress)
            .await;
        self.state.lock().animations.remove(&bot.message_id);

        if outcome != AnimationOutcome::Completed || progress.is_none() {
            self.sync.push(SyncJob::UpdateMessage {
                session_id: session_id.to_string(),
                message_id: bot.message_id.clone(),
                update: MessageUpdate {
                    text: bot.text.clone(),
                    display_text: bot.text.clone(),
                    animation_state: AnimationState::Complete,
                },
            });
        }
        self.state.lock().awaiting.remove(session_id);

        let backend = &self.backend;
        let refreshed = self
            .reads
            .run("get session", || backend.get_session(session_id))
            .await?;
        self.state.lock().replace_session(refreshed);
        Ok(())
    }

    async fn discard_placeholder(&self, session_id: &str, message_id: &str) {
        self.state.lock().remove_message(message_id);
        if let Err(e) = self.backend.delete_message(session_id, message_id).await {
            tracing::warn!("Could not delete placeholder {}: {}", message_id, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{BackendOp, InMemoryBackend};
    use crate::chat::types::Sender;
    use async_trait::async_trait;

    struct Echo;

    #[async_trait]
    impl BotResponder for Echo {
        async fn respond(&self, _session_id: &str, text: &str) -> Result<String> {
            Ok(format!("echo: {}", text))
        }
    }

    fn store(backend: Arc<InMemoryBackend>) -> ChatStore {
        ChatStore::new(backend, Arc::new(Echo), &ChatConfig::default(), RetryPolicy::none())
    }

    #[tokio::test(start_paused = true)]
    async fn test_blank_message_is_ignored() {
        let backend = Arc::new(InMemoryBackend::new("u1"));
        let store = store(backend.clone());
        store.send_message("   ").await.unwrap();
        assert!(backend.calls().is_empty());
        assert!(store.current_session().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_message_creates_titled_session() {
        let backend = Arc::new(InMemoryBackend::new("u1"));
        let store = store(backend.clone());
        let text = "How should I scope the S3 policy for my build role?";
        store.send_message(text).await.unwrap();

        let session = store.current_session().unwrap();
        assert_eq!(session.title, truncate_title(text, 30));
        let messages = store.current_messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].sender, Sender::User);
        assert_eq!(messages[1].text, format!("echo: {}", text));
        assert_eq!(messages[1].visible_text(), messages[1].text);
        assert!(!store.waiting_for_response());
        assert!(!store.is_session_busy(&session.session_id));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reveal_target_reports_missing_messages() {
        let backend = Arc::new(InMemoryBackend::new("u1"));
        let store = store(backend);
        assert!(!store.state.reveal("nope", "x"));
        assert!(!store.state.complete("nope"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_failure_is_recorded() {
        let backend = Arc::new(InMemoryBackend::new("u1"));
        backend.fail_on(BackendOp::CreateSession);
        let store = store(backend);
        assert!(store.create_new_session(None).await.is_err());
        assert!(store.error().unwrap().contains("500"));
        assert!(!store.has_sessions());
    }

    #[tokio::test(start_paused = true)]
    async fn test_blank_title_gets_dated_default() {
        let backend = Arc::new(InMemoryBackend::new("u1"));
        let store = store(backend);
        let session = store.create_new_session(Some("  ")).await.unwrap();
        assert!(session.title.starts_with("New conversation "));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_state_clears_everything() {
        let backend = Arc::new(InMemoryBackend::new("u1"));
        let store = store(backend);
        store.send_message("hi").await.unwrap();
        store.reset_state();
        assert!(store.sessions().is_empty());
        assert!(store.current_session().is_none());
        assert!(store.current_messages().is_empty());
        assert!(store.error().is_none());
    }
}
