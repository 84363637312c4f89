mod registry;

pub use registry::{all_commands, CommandInvocation};

use std::path::PathBuf;

use crate::core::app::{apply_action, App, AppAction};

/// What the front end should do after a line of input.
#[derive(Debug, PartialEq)]
pub enum CommandResult {
    Continue,
    ProcessAsMessage(String),
    /// Text to show the user without adding it to the conversation.
    Print(String),
    ListConversations,
    OpenConversation(i64),
    RenameConversation(String),
    /// `None` means the active conversation.
    DeleteConversation(Option<i64>),
    Attach(PathBuf),
    Detach,
    Quit,
}

pub fn process_input(app: &mut App, input: &str) -> CommandResult {
    let trimmed = input.trim();

    if !trimmed.starts_with('/') {
        return CommandResult::ProcessAsMessage(input.to_string());
    }

    let mut parts = trimmed[1..].splitn(2, ' ');
    let command_name = match parts.next() {
        Some(name) if !name.is_empty() => name,
        _ => return CommandResult::ProcessAsMessage(input.to_string()),
    };
    let args = parts.next().unwrap_or("").trim();

    if let Some(command) = registry::find_command(command_name) {
        let invocation = CommandInvocation {
            input: trimmed,
            args,
        };
        (command.handler)(app, invocation)
    } else {
        let suggestions: Vec<String> = registry::matching_commands(command_name)
            .iter()
            .map(|command| format!("/{}", command.name))
            .collect();
        if suggestions.is_empty() {
            app.set_status(format!("Unknown command: /{command_name}. Try /help"));
        } else {
            app.set_status(format!(
                "Unknown command: /{command_name}. Did you mean {}?",
                suggestions.join(", ")
            ));
        }
        CommandResult::Continue
    }
}

pub fn help_text() -> String {
    let width = all_commands()
        .iter()
        .map(|command| command.usage.len())
        .max()
        .unwrap_or(0);
    let mut text = String::from("Commands:\n");
    for command in all_commands() {
        text.push_str(&format!("  {:width$}  {}\n", command.usage, command.help));
    }
    text.push_str("\nAnything else is sent to the assistant.");
    text
}

pub(super) fn handle_help(_app: &mut App, _invocation: CommandInvocation<'_>) -> CommandResult {
    CommandResult::Print(help_text())
}

pub(super) fn handle_new(app: &mut App, _invocation: CommandInvocation<'_>) -> CommandResult {
    apply_action(app, AppAction::NewConversation);
    app.set_status("Started a new conversation");
    CommandResult::Continue
}

pub(super) fn handle_list(_app: &mut App, _invocation: CommandInvocation<'_>) -> CommandResult {
    CommandResult::ListConversations
}

pub(super) fn handle_open(app: &mut App, invocation: CommandInvocation<'_>) -> CommandResult {
    match invocation.args.parse::<i64>() {
        Ok(id) => CommandResult::OpenConversation(id),
        Err(_) => {
            app.set_status("Usage: /open <id>");
            CommandResult::Continue
        }
    }
}

pub(super) fn handle_rename(app: &mut App, invocation: CommandInvocation<'_>) -> CommandResult {
    if invocation.args.is_empty() {
        app.set_status("Usage: /rename <title>");
        return CommandResult::Continue;
    }
    if app.active_conversation.is_none() {
        app.set_status("No conversation to rename yet");
        return CommandResult::Continue;
    }
    CommandResult::RenameConversation(invocation.args.to_string())
}

pub(super) fn handle_delete(app: &mut App, invocation: CommandInvocation<'_>) -> CommandResult {
    if invocation.args.is_empty() {
        if app.active_conversation.is_none() {
            app.set_status("No conversation to delete");
            return CommandResult::Continue;
        }
        return CommandResult::DeleteConversation(None);
    }
    match invocation.args.parse::<i64>() {
        Ok(id) => CommandResult::DeleteConversation(Some(id)),
        Err(_) => {
            app.set_status("Usage: /delete [id]");
            CommandResult::Continue
        }
    }
}

pub(super) fn handle_attach(app: &mut App, invocation: CommandInvocation<'_>) -> CommandResult {
    if invocation.args.is_empty() {
        app.set_status("Usage: /attach <path>");
        return CommandResult::Continue;
    }
    CommandResult::Attach(PathBuf::from(invocation.args))
}

pub(super) fn handle_detach(_app: &mut App, _invocation: CommandInvocation<'_>) -> CommandResult {
    CommandResult::Detach
}

pub(super) fn handle_clear(app: &mut App, _invocation: CommandInvocation<'_>) -> CommandResult {
    apply_action(app, AppAction::ClearMessages);
    app.set_status("Messages cleared");
    CommandResult::Continue
}

pub(super) fn handle_status(app: &mut App, _invocation: CommandInvocation<'_>) -> CommandResult {
    let backend = if app.online { "online" } else { "offline" };
    let conversation = app
        .active_conversation
        .map(|id| format!("#{id}"))
        .unwrap_or_else(|| "none (created on first message)".to_string());
    let state = if app.is_typing {
        "waiting for response"
    } else {
        "idle"
    };
    CommandResult::Print(format!(
        "Backend: {backend} ({url})\nConversation: {conversation}\nMessages: {count}\nState: {state}\nTranscript: {transcript}",
        url = app.session.backend_url,
        count = app.messages.len(),
        transcript = app.session.logging.status_string(),
    ))
}

pub(super) fn handle_log(app: &mut App, invocation: CommandInvocation<'_>) -> CommandResult {
    let parts: Vec<&str> = invocation.input.split_whitespace().collect();

    match parts.len() {
        1 => match app.session.logging.toggle() {
            Ok(message) => app.set_status(message),
            Err(e) => app.set_status(format!("Log error: {}", e)),
        },
        2 => match app.session.logging.set_log_file(parts[1].to_string()) {
            Ok(message) => app.set_status(message),
            Err(e) => app.set_status(format!("Logfile error: {}", e)),
        },
        _ => app.set_status("Usage: /log [file]"),
    }
    CommandResult::Continue
}

pub(super) fn handle_quit(_app: &mut App, _invocation: CommandInvocation<'_>) -> CommandResult {
    CommandResult::Quit
}

#[cfg(test)]
mod tests;
