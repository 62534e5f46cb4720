//! Slash commands for the interactive console
//!
//! Input that starts with `/` manages sessions, policy recommendations or
//! the sign-in state instead of being sent to the bot. Command names are
//! case-insensitive; arguments (titles, ARNs) are kept as typed.

use crate::policy::ChangeKind;
use thiserror::Error;

/// Errors that can occur when parsing console commands
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// Unknown command was entered
    #[error("Unknown command: {0}\n\nType '/help' to see available commands")]
    UnknownCommand(String),

    /// Command was given an unsupported argument
    #[error("Unsupported argument for {command}: {arg}\n\nType '/help' to see valid usage")]
    UnsupportedArgument { command: String, arg: String },

    /// Command requires an argument but none was provided
    #[error("Command {command} requires an argument\n\nUsage: {usage}")]
    MissingArgument { command: String, usage: String },
}

/// Policy recommendation subcommands
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyCommand {
    /// List identities with recommendations
    Users,
    /// Select identities by list number or ARN
    Select(Vec<String>),
    /// Show the change lists of the selection
    Show,
    /// Flip the pick state of an action across the selection
    Toggle {
        /// Grant or revoke list
        kind: ChangeKind,
        /// IAM action
        action: String,
    },
    /// Submit the picked changes
    Apply,
    /// Reload analyses from the service
    Refresh,
    /// Run a fresh analysis for one identity
    AnalyzeUser(String),
    /// Run a fresh analysis over a date range
    AnalyzeRange {
        /// First day, `YYYY-MM-DD`
        start: String,
        /// Last day, `YYYY-MM-DD`
        end: String,
    },
}

/// Commands understood by the console
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    /// Show help
    Help,
    /// List sessions
    ListSessions,
    /// Create a session, optionally titled
    NewSession(Option<String>),
    /// Switch to a session by list number or id
    SelectSession(String),
    /// Rename the current session
    RenameSession(String),
    /// Delete a session by list number or id; the current one when omitted
    DeleteSession(Option<String>),
    /// Delete every message of the current session
    ClearMessages,
    /// Reprint the current session's messages
    History,
    /// Show the signed-in identity
    WhoAmI,
    /// Policy recommendation subcommand
    Policy(PolicyCommand),
    /// Sign out
    Logout,
    /// Leave the console
    Exit,
    /// Not a command; send to the bot
    None,
}

fn missing(command: &str, usage: &str) -> CommandError {
    CommandError::MissingArgument {
        command: command.to_string(),
        usage: usage.to_string(),
    }
}

/// Parse console input into a command
///
/// # Errors
///
/// Returns [`CommandError`] for unknown commands and bad arguments.
///
/// # Examples
///
/// ```
/// use iamguard::commands::special_commands::{parse_console_command, ConsoleCommand};
///
/// assert_eq!(parse_console_command("/sessions").unwrap(), ConsoleCommand::ListSessions);
/// assert_eq!(
///     parse_console_command("/rename Quarterly Review").unwrap(),
///     ConsoleCommand::RenameSession("Quarterly Review".to_string())
/// );
/// assert_eq!(parse_console_command("hello bot").unwrap(), ConsoleCommand::None);
/// assert!(parse_console_command("/foo").is_err());
/// ```
pub fn parse_console_command(input: &str) -> Result<ConsoleCommand, CommandError> {
    let trimmed = input.trim();
    let lower = trimmed.to_lowercase();

    if !trimmed.starts_with('/') {
        return Ok(match lower.as_str() {
            "exit" | "quit" => ConsoleCommand::Exit,
            _ => ConsoleCommand::None,
        });
    }

    let (head, rest) = match trimmed.split_once(char::is_whitespace) {
        Some((head, rest)) => (head.to_lowercase(), rest.trim()),
        None => (lower.clone(), ""),
    };

    match head.as_str() {
        "/help" | "/?" => Ok(ConsoleCommand::Help),
        "/sessions" | "/ls" => Ok(ConsoleCommand::ListSessions),
        "/new" => Ok(ConsoleCommand::NewSession(
            (!rest.is_empty()).then(|| rest.to_string()),
        )),
        "/select" | "/open" => {
            if rest.is_empty() {
                Err(missing("/select", "/select <number|session-id>"))
            } else {
                Ok(ConsoleCommand::SelectSession(rest.to_string()))
            }
        }
        "/rename" => {
            if rest.is_empty() {
                Err(missing("/rename", "/rename <title>"))
            } else {
                Ok(ConsoleCommand::RenameSession(rest.to_string()))
            }
        }
        "/delete" => Ok(ConsoleCommand::DeleteSession(
            (!rest.is_empty()).then(|| rest.to_string()),
        )),
        "/clear" => Ok(ConsoleCommand::ClearMessages),
        "/history" => Ok(ConsoleCommand::History),
        "/whoami" => Ok(ConsoleCommand::WhoAmI),
        "/logout" => Ok(ConsoleCommand::Logout),
        "/quit" | "/exit" => Ok(ConsoleCommand::Exit),
        "/policy" => parse_policy_command(rest).map(ConsoleCommand::Policy),
        other => Err(CommandError::UnknownCommand(other.to_string())),
    }
}

fn parse_policy_command(rest: &str) -> Result<PolicyCommand, CommandError> {
    let mut parts = rest.split_whitespace();
    let sub = parts.next().map(str::to_lowercase);
    let args: Vec<String> = parts.map(str::to_string).collect();

    match sub.as_deref() {
        None | Some("users") => Ok(PolicyCommand::Users),
        Some("show") => Ok(PolicyCommand::Show),
        Some("apply") => Ok(PolicyCommand::Apply),
        Some("refresh") => Ok(PolicyCommand::Refresh),
        Some("select") => {
            if args.is_empty() {
                Err(missing("/policy select", "/policy select <number|arn>..."))
            } else {
                Ok(PolicyCommand::Select(args))
            }
        }
        Some("toggle") => {
            let usage = "/policy toggle <add|remove> <action>";
            let kind = match args.first().map(|k| k.to_lowercase()).as_deref() {
                Some("add") => ChangeKind::Add,
                Some("remove") => ChangeKind::Remove,
                Some(other) => {
                    return Err(CommandError::UnsupportedArgument {
                        command: "/policy toggle".to_string(),
                        arg: other.to_string(),
                    })
                }
                None => return Err(missing("/policy toggle", usage)),
            };
            match args.get(1) {
                Some(action) => Ok(PolicyCommand::Toggle {
                    kind,
                    action: action.clone(),
                }),
                None => Err(missing("/policy toggle", usage)),
            }
        }
        Some("analyze") => match args.as_slice() {
            [user] => Ok(PolicyCommand::AnalyzeUser(user.clone())),
            [start, end] => Ok(PolicyCommand::AnalyzeRange {
                start: start.clone(),
                end: end.clone(),
            }),
            _ => Err(missing(
                "/policy analyze",
                "/policy analyze <username> | /policy analyze <start> <end>",
            )),
        },
        Some(other) => Err(CommandError::UnsupportedArgument {
            command: "/policy".to_string(),
            arg: other.to_string(),
        }),
    }
}

/// Print help information for console commands
pub fn print_help() {
    println!(
        r#"
Console Commands
================

SESSIONS:
  /sessions            - List your sessions (alias /ls)
  /new [title]         - Start a new session
  /select <n|id>       - Switch to a session by list number or id
  /rename <title>      - Rename the current session
  /delete [n|id]       - Delete a session (the current one by default)
  /clear               - Delete every message in the current session
  /history             - Reprint the current conversation

POLICY RECOMMENDATIONS:
  /policy              - List identities with recommendations
  /policy select <n|arn>...        - Select one or more identities
  /policy show                     - Show grant and revoke lists
  /policy toggle <add|remove> <action> - Pick or unpick an action
  /policy apply                    - Submit picked changes
  /policy refresh                  - Reload analyses
  /policy analyze <user>           - Analyze one identity's logs
  /policy analyze <start> <end>    - Analyze a date range (YYYY-MM-DD)

ACCOUNT:
  /whoami              - Show the signed-in identity
  /logout              - Sign out and leave

SESSION CONTROL:
  /help, /?            - Show this help message
  exit, quit, /quit    - Leave the console

NOTES:
  - Command names are case-insensitive
  - Any other text is sent to the assistant
"#
    );
}
