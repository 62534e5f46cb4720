//! Chat sessions with a bot
//!
//! # Module Layout
//!
//! - [`types`]     -- Sessions, messages and request bodies
//! - [`store`]     -- Session list, current session and the send exchange
//! - [`typing`]    -- Character-by-character reveal of replies
//! - [`sync`]      -- Background persistence of reveal progress
//! - [`inference`] -- Bot replies from the inference endpoint
//! - [`fallback`]  -- Sample sessions for offline development

pub mod fallback;
pub mod inference;
pub mod store;
pub mod sync;
pub mod types;
pub mod typing;

pub use inference::{format_answer, BotResponder, InferenceClient};
pub use store::ChatStore;
pub use sync::{SyncFailure, SyncJob, SyncQueue};
pub use types::{AnimationState, Message, NewMessage, Sender, Session};
pub use typing::{AnimationOutcome, TypingAnimator};
