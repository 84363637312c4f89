use super::CommandResult;
use crate::core::app::App;

pub type CommandHandler = fn(&mut App, CommandInvocation<'_>) -> CommandResult;

pub struct Command {
    pub name: &'static str,
    pub usage: &'static str,
    pub help: &'static str,
    pub handler: CommandHandler,
}

#[derive(Clone, Copy)]
pub struct CommandInvocation<'a> {
    pub input: &'a str,
    pub args: &'a str,
}

pub fn all_commands() -> &'static [Command] {
    COMMANDS
}

pub fn find_command(name: &str) -> Option<&'static Command> {
    all_commands()
        .iter()
        .find(|command| command.name.eq_ignore_ascii_case(name))
}

/// Commands whose name starts with `prefix`, for completion hints.
pub fn matching_commands(prefix: &str) -> Vec<&'static Command> {
    let prefix = prefix.to_ascii_lowercase();
    all_commands()
        .iter()
        .filter(|command| command.name.starts_with(&prefix))
        .collect()
}

const COMMANDS: &[Command] = &[
    Command {
        name: "help",
        usage: "/help",
        help: "Show available commands.",
        handler: super::handle_help,
    },
    Command {
        name: "new",
        usage: "/new",
        help: "Start a new conversation.",
        handler: super::handle_new,
    },
    Command {
        name: "list",
        usage: "/list",
        help: "List your conversations grouped by recency.",
        handler: super::handle_list,
    },
    Command {
        name: "open",
        usage: "/open <id>",
        help: "Load a stored conversation.",
        handler: super::handle_open,
    },
    Command {
        name: "rename",
        usage: "/rename <title>",
        help: "Rename the current conversation.",
        handler: super::handle_rename,
    },
    Command {
        name: "delete",
        usage: "/delete [id]",
        help: "Delete a conversation (the current one by default).",
        handler: super::handle_delete,
    },
    Command {
        name: "attach",
        usage: "/attach <path>",
        help: "Attach a file to the next message.",
        handler: super::handle_attach,
    },
    Command {
        name: "detach",
        usage: "/detach",
        help: "Drop the pending attachment.",
        handler: super::handle_detach,
    },
    Command {
        name: "clear",
        usage: "/clear",
        help: "Clear the messages on screen.",
        handler: super::handle_clear,
    },
    Command {
        name: "status",
        usage: "/status",
        help: "Show backend, conversation and transcript status.",
        handler: super::handle_status,
    },
    Command {
        name: "log",
        usage: "/log [file]",
        help: "Toggle the transcript or set its file.",
        handler: super::handle_log,
    },
    Command {
        name: "quit",
        usage: "/quit",
        help: "Leave the chat.",
        handler: super::handle_quit,
    },
];
