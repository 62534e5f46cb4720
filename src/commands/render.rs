//! Terminal rendering for sessions, messages and policy changes

use crate::chat::{Message, Sender, Session};
use crate::policy::{ChangeKind, PermissionChange};
use colored::Colorize;
use prettytable::{format, Table};

const TITLE_WIDTH: usize = 40;

fn shorten(text: &str, width: usize) -> String {
    if text.chars().count() > width {
        let head: String = text.chars().take(width.saturating_sub(3)).collect();
        format!("{}...", head)
    } else {
        text.to_string()
    }
}

/// Prints the session list, marking the current session
pub fn print_sessions(sessions: &[Session], current: Option<&str>) {
    if sessions.is_empty() {
        println!("{}", "No sessions found.".yellow());
        return;
    }

    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_BORDERS_ONLY);
    table.add_row(prettytable::row![
        "#".bold(),
        "Title".bold(),
        "Messages".bold(),
        "Last Updated".bold(),
        "ID".bold()
    ]);

    for (index, session) in sessions.iter().enumerate() {
        let marker = if current == Some(session.session_id.as_str()) {
            format!("*{}", index + 1).green().bold()
        } else {
            format!(" {}", index + 1).normal()
        };
        table.add_row(prettytable::row![
            marker,
            shorten(&session.title, TITLE_WIDTH),
            session.message_count,
            session.updated_at.format("%Y-%m-%d %H:%M").to_string(),
            session.session_id.cyan()
        ]);
    }

    println!("\nSessions:");
    table.printstd();
    println!();
}

/// Label printed before a message of `sender`.
pub fn sender_label(sender: Sender) -> colored::ColoredString {
    match sender {
        Sender::User => "you".cyan().bold(),
        Sender::Bot => "bot".magenta().bold(),
    }
}

/// Prints messages in order, fully revealed
pub fn print_messages(messages: &[Message]) {
    if messages.is_empty() {
        println!("{}", "No messages yet.".yellow());
        return;
    }
    for message in messages {
        println!("{} {}", sender_label(message.sender), message.text);
        println!();
    }
}

/// Prints identities with recommendations, marking the selected ones
pub fn print_user_arns(user_arns: &[String], selected: &[String]) {
    if user_arns.is_empty() {
        println!("{}", "No policy recommendations found.".yellow());
        return;
    }

    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_BORDERS_ONLY);
    table.add_row(prettytable::row!["#".bold(), "User ARN".bold()]);
    for (index, arn) in user_arns.iter().enumerate() {
        let marker = if selected.contains(arn) {
            format!("*{}", index + 1).green().bold()
        } else {
            format!(" {}", index + 1).normal()
        };
        table.add_row(prettytable::row![marker, arn.cyan()]);
    }

    println!("\nIdentities:");
    table.printstd();
    println!();
}

/// Prints the grant and revoke lists of the selection
pub fn print_changes(add: &[PermissionChange], remove: &[PermissionChange]) {
    if add.is_empty() && remove.is_empty() {
        println!("{}", "No changes recommended for the selection.".yellow());
        return;
    }

    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_BORDERS_ONLY);
    table.add_row(prettytable::row![
        "Change".bold(),
        "Action".bold(),
        "Picked".bold(),
        "Reason".bold()
    ]);

    let rows = add
        .iter()
        .map(|c| (ChangeKind::Add, c))
        .chain(remove.iter().map(|c| (ChangeKind::Remove, c)));
    for (kind, change) in rows {
        let label = match kind {
            ChangeKind::Add => "ADD".green(),
            ChangeKind::Remove => "REMOVE".red(),
        };
        let picked = if change.apply { "[x]" } else { "[ ]" };
        table.add_row(prettytable::row![
            label,
            change.action,
            picked,
            shorten(&change.reason, 60)
        ]);
    }

    table.printstd();
    println!();
}
