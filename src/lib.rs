//! IAMGuard - chat and IAM policy recommendation client library
//!
//! This library signs a user in through an OAuth identity provider, keeps
//! chat sessions with an assistant backend, reveals bot replies character
//! by character, and aggregates IAM policy recommendations per identity.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//!
//! - `auth`: Authorization-code login, token set and user claims
//! - `api`: Chat persistence backend client, retries and an in-memory backend
//! - `chat`: Chat session store, typing animation and background sync
//! - `policy`: Policy recommendation client and permissions store
//! - `app`: Service container wiring everything from the configuration
//! - `config`: Configuration management and validation
//! - `error`: Error types and result aliases
//! - `cli`: Command-line interface definition
//!
//! # Example
//!
//! ```no_run
//! use iamguard::{App, Config};
//! use iamguard::auth::BrowserNavigator;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config/config.yaml", &Default::default())?;
//!     let app = App::new(config, Arc::new(BrowserNavigator))?;
//!     app.auth().initiate_login()?;
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod app;
pub mod auth;
pub mod chat;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod metrics;
pub mod policy;

// Re-export commonly used types
pub use app::App;
pub use auth::AuthSession;
pub use chat::ChatStore;
pub use config::Config;
pub use error::{IamGuardError, Result};
pub use policy::PermissionsStore;
