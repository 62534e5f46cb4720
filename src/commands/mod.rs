/*!
Command handlers for the CLI

This module provides the handlers invoked by the CLI entrypoint:

- `console::run_console` -- Sign in, then chat and review policy recommendations
- `print_login_url` -- Print the identity provider login URL
- `print_config` -- Print the effective configuration

Slash commands typed into the console are parsed by [`special_commands`]
and tables are drawn by [`render`].
*/

use crate::app::App;
use crate::auth::{AuthSession, BrowserNavigator, RecordingNavigator};
use crate::config::Config;
use crate::error::{IamGuardError, Result};
use std::sync::Arc;

// Slash command parser
pub mod special_commands;

// Tables and message printing
pub mod render;

/// Pulls the authorization code out of pasted input
///
/// Accepts either the bare code or the whole redirect URL.
///
/// # Examples
///
/// ```
/// use iamguard::commands::extract_code;
///
/// assert_eq!(extract_code("  abc123 "), Some("abc123".to_string()));
/// assert_eq!(
///     extract_code("http://localhost:5173/callback?code=xyz&state=1"),
///     Some("xyz".to_string())
/// );
/// assert_eq!(extract_code(""), None);
/// ```
pub fn extract_code(input: &str) -> Option<String> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }
    match url::Url::parse(input) {
        Ok(url) => url
            .query_pairs()
            .find(|(key, _)| key == "code")
            .map(|(_, value)| value.into_owned())
            .filter(|code| !code.is_empty()),
        Err(_) => Some(input.to_string()),
    }
}

// Interactive console
pub mod console {
    //! Interactive console handler.
    //!
    //! Signs in with an authorization code, loads sessions and policy
    //! analyses, then runs a readline loop. Plain input is sent to the bot
    //! and the reply is printed as it is revealed.

    use super::render::{
        print_changes, print_messages, print_sessions, print_user_arns, sender_label,
    };
    use super::special_commands::{
        parse_console_command, print_help, ConsoleCommand, PolicyCommand,
    };
    use super::*;
    use crate::chat::{AnimationState, ChatStore, Message, Sender, SyncFailure};
    use crate::policy::{ApplyOutcome, ChangeKind};
    use colored::Colorize;
    use rustyline::error::ReadlineError;
    use rustyline::DefaultEditor;
    use std::io::Write;
    use std::time::Duration;
    use tokio::sync::broadcast;

    const REVEAL_POLL: Duration = Duration::from_millis(15);

    /// Start the interactive console
    ///
    /// # Arguments
    ///
    /// * `config` - Effective configuration
    /// * `code` - Authorization code; prompted for when `None`
    ///
    /// # Errors
    ///
    /// Returns an error if sign-in fails or the terminal cannot be read.
    pub async fn run_console(config: Config, code: Option<String>) -> Result<()> {
        tracing::info!("Starting interactive console");

        let app = App::new(config, Arc::new(BrowserNavigator))?;
        let mut rl = DefaultEditor::new()?;

        let code = match code.as_deref().and_then(extract_code) {
            Some(code) => code,
            None => {
                app.auth().initiate_login()?;
                let pasted = rl.readline("Authorization code (or redirect URL): ")?;
                extract_code(&pasted).ok_or_else(|| {
                    IamGuardError::Authentication("no authorization code given".to_string())
                })?
            }
        };

        if !app.auth().exchange_code_for_tokens(&code).await {
            let reason = app
                .auth()
                .error()
                .unwrap_or_else(|| "token exchange failed".to_string());
            return Err(IamGuardError::Authentication(reason).into());
        }

        if !app.initialize().await {
            if let Some(e) = app.chat().error() {
                println!("{} {}", "Could not load sessions:".yellow(), e);
            }
        }
        if let Some(e) = app.permissions().error() {
            println!("{} {}", "Could not load policy analyses:".yellow(), e);
        }

        print_welcome_banner(&app);
        let mut sync_failures = app.chat().subscribe_sync_errors();

        loop {
            let prompt = format_prompt(&app);
            match rl.readline(&prompt) {
                Ok(line) => {
                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        continue;
                    }
                    let _ = rl.add_history_entry(trimmed);

                    let command = match parse_console_command(trimmed) {
                        Ok(command) => command,
                        Err(e) => {
                            eprintln!("{}", e);
                            continue;
                        }
                    };

                    match command {
                        ConsoleCommand::Exit => break,
                        ConsoleCommand::Logout => {
                            app.chat().flush_sync().await;
                            app.logout();
                            println!("Signed out.");
                            return Ok(());
                        }
                        ConsoleCommand::None => {
                            if let Err(e) = send_and_reveal(app.chat(), trimmed).await {
                                eprintln!("{} {}", "Error:".red(), e);
                            }
                            report_sync_failures(&mut sync_failures);
                        }
                        other => {
                            if let Err(e) = handle_command(&app, other).await {
                                eprintln!("{} {}", "Error:".red(), e);
                            }
                        }
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    println!("CTRL-C");
                    continue;
                }
                Err(ReadlineError::Eof) => {
                    println!("CTRL-D");
                    break;
                }
                Err(err) => {
                    eprintln!("Error: {:?}", err);
                    break;
                }
            }
        }

        app.chat().flush_sync().await;
        println!("Goodbye!");
        Ok(())
    }

    fn format_prompt(app: &App) -> String {
        match app.chat().current_session() {
            Some(session) => format!("[{}] >> ", session.title.cyan()),
            None => ">> ".to_string(),
        }
    }

    fn print_welcome_banner(app: &App) {
        let who = app
            .auth()
            .user()
            .and_then(|u| u.display_name().map(str::to_string))
            .unwrap_or_else(|| "unknown user".to_string());
        println!();
        println!("{}", "IAMGuard console".bold());
        println!("Signed in as {}", who.green());
        println!(
            "{} sessions, {} identities with recommendations",
            app.chat().sessions().len(),
            app.permissions().user_arns().len()
        );
        println!("Type {} for commands.\n", "/help".cyan());
    }

    /// Tracks how much of the reply being revealed has been printed.
    #[derive(Debug, Default)]
    struct RevealPrinter {
        message_id: Option<String>,
        printed: usize,
    }

    impl RevealPrinter {
        fn print_progress(&mut self, messages: &[Message]) {
            let Some(message) = messages
                .iter()
                .rev()
                .find(|m| m.animation_state == Some(AnimationState::Typing))
            else {
                return;
            };
            self.print_delta(message, message.visible_text());
        }

        fn print_delta(&mut self, message: &Message, shown: &str) {
            if self.message_id.as_deref() != Some(message.message_id.as_str()) {
                if self.message_id.is_some() {
                    println!();
                }
                print!("{} ", sender_label(Sender::Bot));
                self.message_id = Some(message.message_id.clone());
                self.printed = 0;
            }
            let delta: String = shown.chars().skip(self.printed).collect();
            if !delta.is_empty() {
                self.printed += delta.chars().count();
                print!("{}", delta);
                let _ = std::io::stdout().flush();
            }
        }

        fn finish(&mut self, messages: &[Message]) {
            if let Some(last) = messages.last().filter(|m| m.sender == Sender::Bot) {
                self.print_delta(last, &last.text);
            }
            if self.message_id.is_some() {
                println!("\n");
            }
        }
    }

    async fn send_and_reveal(chat: &ChatStore, text: &str) -> Result<()> {
        let mut printer = RevealPrinter::default();
        let mut ticker = tokio::time::interval(REVEAL_POLL);
        let send = chat.send_message(text);
        tokio::pin!(send);

        let result = loop {
            tokio::select! {
                result = &mut send => break result,
                _ = ticker.tick() => printer.print_progress(&chat.current_messages()),
            }
        };
        printer.finish(&chat.current_messages());
        result
    }

    fn report_sync_failures(failures: &mut broadcast::Receiver<SyncFailure>) {
        while let Ok(failure) = failures.try_recv() {
            println!(
                "{} {} ({})",
                "Background save failed:".yellow(),
                failure.error,
                failure.job.kind()
            );
        }
    }

    /// Resolves a 1-based list number or a literal value
    fn resolve_pick(pick: &str, items: &[String]) -> Option<String> {
        match pick.parse::<usize>() {
            Ok(n) if n >= 1 => items.get(n - 1).cloned(),
            _ => items.iter().find(|item| item.as_str() == pick).cloned(),
        }
    }

    fn session_ids(chat: &ChatStore) -> Vec<String> {
        chat.sessions().into_iter().map(|s| s.session_id).collect()
    }

    async fn handle_command(app: &App, command: ConsoleCommand) -> Result<()> {
        let chat = app.chat();
        match command {
            ConsoleCommand::Help => print_help(),
            ConsoleCommand::ListSessions => {
                chat.fetch_sessions().await?;
                print_sessions(&chat.sessions(), chat.current_session_id().as_deref());
            }
            ConsoleCommand::NewSession(title) => {
                let session = chat.create_new_session(title.as_deref()).await?;
                println!("Started {}", session.title.green());
            }
            ConsoleCommand::SelectSession(pick) => {
                let id = resolve_pick(&pick, &session_ids(chat))
                    .ok_or(IamGuardError::SessionNotFound(pick))?;
                chat.select_session(&id).await?;
                print_messages(&chat.current_messages());
            }
            ConsoleCommand::RenameSession(title) => {
                let id = chat.current_session_id().ok_or_else(|| {
                    IamGuardError::SessionNotFound("no current session".to_string())
                })?;
                chat.update_session_title(&id, &title).await?;
                println!("Renamed to {}", title.green());
            }
            ConsoleCommand::DeleteSession(pick) => {
                let id = match pick {
                    Some(pick) => resolve_pick(&pick, &session_ids(chat))
                        .ok_or(IamGuardError::SessionNotFound(pick))?,
                    None => chat.current_session_id().ok_or_else(|| {
                        IamGuardError::SessionNotFound("no current session".to_string())
                    })?,
                };
                chat.delete_session(&id).await?;
                println!("{}", format!("Deleted session {}", id).green());
            }
            ConsoleCommand::ClearMessages => {
                chat.clear_messages().await?;
                println!("{}", "Conversation cleared.".green());
            }
            ConsoleCommand::History => print_messages(&chat.current_messages()),
            ConsoleCommand::WhoAmI => match app.auth().user() {
                Some(user) => {
                    println!(
                        "{} {}",
                        "User:".bold(),
                        user.display_name().unwrap_or("-")
                    );
                    println!("{} {}", "Email:".bold(), user.email().unwrap_or("-"));
                    println!(
                        "{} {}",
                        "User id:".bold(),
                        user.user_id().unwrap_or_else(|| "-".to_string())
                    );
                }
                None => println!("{}", "Not signed in.".yellow()),
            },
            ConsoleCommand::Policy(policy) => handle_policy(app, policy).await?,
            ConsoleCommand::Exit | ConsoleCommand::Logout | ConsoleCommand::None => {}
        }
        Ok(())
    }

    async fn handle_policy(app: &App, command: PolicyCommand) -> Result<()> {
        let store = app.permissions();
        match command {
            PolicyCommand::Users => {
                print_user_arns(&store.user_arns(), &store.selected_user_arns());
            }
            PolicyCommand::Select(picks) => {
                let arns = store.user_arns();
                let mut chosen = Vec::new();
                for pick in picks {
                    match resolve_pick(&pick, &arns) {
                        Some(arn) => chosen.push(arn),
                        None => println!("{} {}", "Unknown identity:".yellow(), pick),
                    }
                }
                store.select_user_arns(&chosen);
                print_changes(&store.add_permissions(), &store.remove_permissions());
            }
            PolicyCommand::Show => {
                if store.selected_user_arns().is_empty() {
                    println!("{}", "No identity selected.".yellow());
                } else {
                    print_changes(&store.add_permissions(), &store.remove_permissions());
                }
            }
            PolicyCommand::Toggle { kind, action } => {
                let current = match kind {
                    ChangeKind::Add => store.add_permissions(),
                    ChangeKind::Remove => store.remove_permissions(),
                };
                let Some(change) = current.iter().find(|c| c.action == action) else {
                    println!("{} {}", "Action not recommended:".yellow(), action);
                    return Ok(());
                };
                let changed = store.set_apply_for_selection(kind, &action, !change.apply);
                println!(
                    "{} {} for {} identities",
                    if change.apply { "Unpicked" } else { "Picked" },
                    action.cyan(),
                    changed
                );
            }
            PolicyCommand::Apply => match store.apply_policy_changes().await? {
                ApplyOutcome::Applied { users } => {
                    let message = store
                        .success_message()
                        .unwrap_or_else(|| format!("Applied changes for {} users", users));
                    println!("{}", message.green());
                }
                ApplyOutcome::NothingSelected => {
                    println!("{}", "No changes picked.".yellow());
                }
            },
            PolicyCommand::Refresh => {
                store.fetch_analysis_results().await?;
                print_user_arns(&store.user_arns(), &store.selected_user_arns());
            }
            PolicyCommand::AnalyzeUser(username) => {
                let results = app.policy().analyze_user_logs(&username).await?;
                println!("Analysis returned {} rows", results.len());
                store.load_results(results);
                print_user_arns(&store.user_arns(), &store.selected_user_arns());
            }
            PolicyCommand::AnalyzeRange { start, end } => {
                let results = app.policy().analyze_by_date_range(&start, &end).await?;
                println!("Analysis returned {} rows", results.len());
                store.load_results(results);
                print_user_arns(&store.user_arns(), &store.selected_user_arns());
            }
        }
        Ok(())
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use chrono::Utc;

        fn bot(id: &str, text: &str, shown: &str) -> Message {
            Message {
                session_id: "s1".to_string(),
                message_id: id.to_string(),
                sender: Sender::Bot,
                text: text.to_string(),
                display_text: Some(shown.to_string()),
                timestamp: Utc::now(),
                is_typing: false,
                animation_state: Some(AnimationState::Typing),
            }
        }

        #[test]
        fn test_resolve_pick_by_number_or_value() {
            let items = vec!["a".to_string(), "b".to_string()];
            assert_eq!(resolve_pick("2", &items).as_deref(), Some("b"));
            assert_eq!(resolve_pick("a", &items).as_deref(), Some("a"));
            assert_eq!(resolve_pick("0", &items), None);
            assert_eq!(resolve_pick("3", &items), None);
        }

        #[test]
        fn test_reveal_printer_tracks_progress() {
            let mut printer = RevealPrinter::default();
            printer.print_progress(&[bot("m1", "hello", "he")]);
            assert_eq!(printer.printed, 2);
            printer.print_progress(&[bot("m1", "hello", "hell")]);
            assert_eq!(printer.printed, 4);
            printer.finish(&[bot("m1", "hello", "hell")]);
            assert_eq!(printer.printed, 5);
        }

        #[test]
        fn test_reveal_printer_ignores_settled_messages() {
            let mut printer = RevealPrinter::default();
            let mut done = bot("m1", "hi", "hi");
            done.animation_state = Some(AnimationState::Complete);
            printer.print_progress(&[done]);
            assert!(printer.message_id.is_none());
        }
    }
}

/// Prints the identity provider login URL without opening a browser
///
/// # Errors
///
/// Returns a configuration error when the provider URL cannot be built.
pub fn print_login_url(config: &Config) -> Result<()> {
    config.validate()?;
    let navigator = Arc::new(RecordingNavigator::new());
    let auth = AuthSession::new(config.api.http_client()?, config, navigator);
    let url = auth.authorization_url()?;
    println!("{}", url);
    Ok(())
}

/// Prints the effective configuration as YAML, with the client secret masked
///
/// # Errors
///
/// Returns an error if the configuration cannot be serialized.
pub fn print_config(config: &Config) -> Result<()> {
    let mut shown = config.clone();
    if shown.auth.client_secret.is_some() {
        shown.auth.client_secret = Some("********".to_string());
    }
    let yaml = serde_yaml::to_string(&shown).map_err(IamGuardError::Yaml)?;
    print!("{}", yaml);
    Ok(())
}
