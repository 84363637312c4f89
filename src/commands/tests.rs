use super::*;
use crate::core::app::AppCommand;
use crate::utils::test_utils::create_test_app;
use std::fs;
use tempfile::tempdir;

#[test]
fn plain_text_is_sent_as_message() {
    let mut app = create_test_app();
    assert_eq!(
        process_input(&mut app, "como usar tokio"),
        CommandResult::ProcessAsMessage("como usar tokio".into())
    );
    // A bare slash is not a command.
    assert_eq!(
        process_input(&mut app, "/"),
        CommandResult::ProcessAsMessage("/".into())
    );
}

#[test]
fn unknown_command_sets_status() {
    let mut app = create_test_app();
    assert_eq!(process_input(&mut app, "/frobnicate"), CommandResult::Continue);
    assert_eq!(
        app.status.as_deref(),
        Some("Unknown command: /frobnicate. Try /help")
    );
}

#[test]
fn unknown_prefix_suggests_matching_commands() {
    let mut app = create_test_app();
    assert_eq!(process_input(&mut app, "/de"), CommandResult::Continue);
    assert_eq!(
        app.status.as_deref(),
        Some("Unknown command: /de. Did you mean /delete, /detach?")
    );
}

#[test]
fn command_names_are_case_insensitive() {
    let mut app = create_test_app();
    assert_eq!(process_input(&mut app, "/QUIT"), CommandResult::Quit);
}

#[test]
fn help_lists_every_command() {
    let mut app = create_test_app();
    let CommandResult::Print(text) = process_input(&mut app, "/help") else {
        panic!("expected help text");
    };
    for command in all_commands() {
        assert!(text.contains(command.usage), "missing {}", command.usage);
    }
}

#[test]
fn open_requires_numeric_id() {
    let mut app = create_test_app();
    assert_eq!(
        process_input(&mut app, "/open 42"),
        CommandResult::OpenConversation(42)
    );
    assert_eq!(process_input(&mut app, "/open abc"), CommandResult::Continue);
    assert_eq!(app.status.as_deref(), Some("Usage: /open <id>"));
}

#[test]
fn rename_needs_active_conversation_and_title() {
    let mut app = create_test_app();
    assert_eq!(process_input(&mut app, "/rename Nova"), CommandResult::Continue);
    assert_eq!(app.status.as_deref(), Some("No conversation to rename yet"));

    app.active_conversation = Some(3);
    assert_eq!(process_input(&mut app, "/rename"), CommandResult::Continue);
    assert_eq!(
        process_input(&mut app, "/rename  Título com espaços "),
        CommandResult::RenameConversation("Título com espaços".into())
    );
}

#[test]
fn delete_defaults_to_active_conversation() {
    let mut app = create_test_app();
    assert_eq!(process_input(&mut app, "/delete"), CommandResult::Continue);
    app.active_conversation = Some(8);
    assert_eq!(
        process_input(&mut app, "/delete"),
        CommandResult::DeleteConversation(None)
    );
    assert_eq!(
        process_input(&mut app, "/delete 2"),
        CommandResult::DeleteConversation(Some(2))
    );
}

#[test]
fn attach_and_detach() {
    let mut app = create_test_app();
    assert_eq!(
        process_input(&mut app, "/attach notes/a b.txt"),
        CommandResult::Attach(PathBuf::from("notes/a b.txt"))
    );
    assert_eq!(process_input(&mut app, "/attach"), CommandResult::Continue);
    assert_eq!(process_input(&mut app, "/detach"), CommandResult::Detach);
}

#[test]
fn new_cancels_turn_and_forgets_conversation() {
    let mut app = create_test_app();
    app.active_conversation = Some(5);
    let command = apply_action(
        &mut app,
        AppAction::SubmitMessage {
            content: "oi".into(),
            attachment: None,
        },
    );
    let Some(AppCommand::StartTurn { stream, .. }) = command else {
        panic!("expected a turn");
    };

    assert_eq!(process_input(&mut app, "/new"), CommandResult::Continue);
    assert!(stream.cancel_token.is_cancelled());
    assert!(app.messages.is_empty());
    assert!(app.active_conversation.is_none());
    assert!(!app.is_typing);
}

#[test]
fn clear_keeps_conversation() {
    let mut app = create_test_app();
    app.active_conversation = Some(5);
    app.push_assistant_notice("old");
    assert_eq!(process_input(&mut app, "/clear"), CommandResult::Continue);
    assert!(app.messages.is_empty());
    assert_eq!(app.active_conversation, Some(5));
    assert_eq!(app.status.as_deref(), Some("Messages cleared"));
}

#[test]
fn status_reports_backend_and_transcript() {
    let mut app = create_test_app();
    app.online = false;
    let CommandResult::Print(text) = process_input(&mut app, "/status") else {
        panic!("expected status text");
    };
    assert!(text.contains("Backend: offline"));
    assert!(text.contains("Transcript: disabled"));
}

#[test]
fn log_command_enables_then_pauses_transcript() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("chat.log");
    let mut app = create_test_app();

    assert_eq!(process_input(&mut app, "/log"), CommandResult::Continue);
    assert!(app.status.as_deref().unwrap().starts_with("Log error"));

    process_input(&mut app, &format!("/log {}", path.display()));
    assert!(app.session.logging.is_active());

    process_input(&mut app, "/log");
    assert!(!app.session.logging.is_active());
    let contents = fs::read_to_string(&path).unwrap();
    assert!(contents.contains("Logging paused"));
}

#[test]
fn matching_commands_filters_by_prefix() {
    let names: Vec<_> = registry::matching_commands("d")
        .into_iter()
        .map(|command| command.name)
        .collect();
    assert_eq!(names, vec!["delete", "detach"]);
}
