//! Redirect side effects
//!
//! Login and logout end with a full-page redirect. The console cannot
//! navigate a browser tab, so the redirect goes through a [`Navigator`]:
//! the default implementation prints the URL and tries to open it in the
//! system browser.

use std::sync::Mutex;

/// Performs the redirect at the end of login and logout.
pub trait Navigator: Send + Sync {
    /// Sends the user to `url`.
    fn redirect(&self, url: &str);
}

/// Prints the URL to stderr and attempts to open it in the default browser.
#[derive(Debug, Default, Clone, Copy)]
pub struct BrowserNavigator;

impl Navigator for BrowserNavigator {
    fn redirect(&self, url: &str) {
        eprintln!("Open this URL in your browser:\n\n  {}\n", url);
        try_open_browser(url);
    }
}

/// Remembers every redirect instead of performing it.
///
/// Used by the `login-url` command and by tests.
#[derive(Debug, Default)]
pub struct RecordingNavigator {
    visited: Mutex<Vec<String>>,
}

impl RecordingNavigator {
    /// Creates an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// All redirect targets, oldest first.
    pub fn visited(&self) -> Vec<String> {
        self.visited
            .lock()
            .map(|v| v.clone())
            .unwrap_or_default()
    }

    /// The most recent redirect target.
    pub fn last(&self) -> Option<String> {
        self.visited().pop()
    }
}

impl Navigator for RecordingNavigator {
    fn redirect(&self, url: &str) {
        if let Ok(mut visited) = self.visited.lock() {
            visited.push(url.to_string());
        }
    }
}

/// Errors are ignored; the URL is already on stderr.
fn try_open_browser(url: &str) {
    #[cfg(target_os = "macos")]
    {
        let _ = std::process::Command::new("open").arg(url).spawn();
    }
    #[cfg(target_os = "linux")]
    {
        let _ = std::process::Command::new("xdg-open").arg(url).spawn();
    }
    #[cfg(not(any(target_os = "macos", target_os = "linux")))]
    {
        let _ = url;
    }
}
