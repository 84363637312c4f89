use tracing::{debug, warn};

use super::App;
use crate::api::MessageRecord;
use crate::core::chat_stream::{StreamMessage, StreamParams};
use crate::core::message::{FileAttachment, LocalMessageId, Message, Role};

pub enum AppAction {
    SubmitMessage {
        content: String,
        attachment: Option<FileAttachment>,
    },
    AppendResponseChunk {
        content: String,
        stream_id: u64,
    },
    /// The stream finished, with or without an explicit `done` payload.
    StreamCompleted {
        stream_id: u64,
        explicit_done: bool,
    },
    /// The backend reported an error inside the stream.
    StreamServerError {
        message: String,
        stream_id: u64,
    },
    /// The request failed or the connection broke.
    StreamFailed {
        message: String,
        stream_id: u64,
    },
    CancelStreaming,
    ConversationCreated {
        conversation_id: i64,
    },
    MessagePersisted {
        local_id: LocalMessageId,
        remote_id: i64,
    },
    LoadConversation {
        conversation_id: i64,
        records: Vec<MessageRecord>,
    },
    NewConversation,
    ClearMessages,
    BackendStatusChanged {
        online: bool,
    },
    SetStatus {
        message: String,
    },
    ClearStatus,
}

impl AppAction {
    pub fn from_stream_message(message: StreamMessage, stream_id: u64) -> Self {
        match message {
            StreamMessage::Token(content) => AppAction::AppendResponseChunk { content, stream_id },
            StreamMessage::Done => AppAction::StreamCompleted {
                stream_id,
                explicit_done: true,
            },
            StreamMessage::End => AppAction::StreamCompleted {
                stream_id,
                explicit_done: false,
            },
            StreamMessage::ServerError(message) => AppAction::StreamServerError { message, stream_id },
            StreamMessage::Failed(message) => AppAction::StreamFailed { message, stream_id },
        }
    }
}

pub enum AppCommand {
    /// Spawn the stream, then persist `user_message` (creating the
    /// conversation first when there is none).
    StartTurn {
        stream: StreamParams,
        user_message: Message,
    },
    /// Persist a finished assistant reply.
    PersistMessage(Message),
}

pub fn apply_actions(app: &mut App, actions: impl IntoIterator<Item = AppAction>) -> Vec<AppCommand> {
    let mut commands = Vec::new();
    for action in actions {
        if let Some(cmd) = apply_action(app, action) {
            commands.push(cmd);
        }
    }
    commands
}

pub fn apply_action(app: &mut App, action: AppAction) -> Option<AppCommand> {
    match action {
        AppAction::SubmitMessage {
            content,
            attachment,
        } => submit_message(app, content, attachment),
        AppAction::AppendResponseChunk { content, stream_id } => {
            if !app.is_current_stream(stream_id) {
                return None;
            }
            app.append_token(&content);
            None
        }
        AppAction::StreamCompleted {
            stream_id,
            explicit_done,
        } => {
            if !app.is_current_stream(stream_id) {
                return None;
            }
            if !explicit_done {
                debug!(stream_id, "Stream closed without done; committing what arrived");
            }
            app.finish_turn().map(AppCommand::PersistMessage)
        }
        AppAction::StreamServerError { message, stream_id } => {
            if !app.is_current_stream(stream_id) {
                return None;
            }
            app.fail_turn(message, true);
            None
        }
        AppAction::StreamFailed { message, stream_id } => {
            if !app.is_current_stream(stream_id) {
                return None;
            }
            app.fail_turn(message, false);
            None
        }
        AppAction::CancelStreaming => {
            if app.in_flight().is_some() {
                app.cancel_current_stream();
                app.set_status("Response cancelled");
            }
            None
        }
        AppAction::ConversationCreated { conversation_id } => {
            app.assign_conversation(conversation_id);
            None
        }
        AppAction::MessagePersisted {
            local_id,
            remote_id,
        } => {
            if let Some(message) = app.message_mut(local_id) {
                message.remote_id = Some(remote_id);
            }
            None
        }
        AppAction::LoadConversation {
            conversation_id,
            records,
        } => {
            load_conversation(app, conversation_id, records);
            None
        }
        AppAction::NewConversation => {
            app.cancel_current_stream();
            app.messages.clear();
            app.active_conversation = None;
            None
        }
        AppAction::ClearMessages => {
            app.cancel_current_stream();
            app.messages.clear();
            None
        }
        AppAction::BackendStatusChanged { online } => {
            app.online = online;
            None
        }
        AppAction::SetStatus { message } => {
            app.set_status(message);
            None
        }
        AppAction::ClearStatus => {
            app.clear_status();
            None
        }
    }
}

fn submit_message(
    app: &mut App,
    content: String,
    attachment: Option<FileAttachment>,
) -> Option<AppCommand> {
    let content = content.trim().to_string();
    if content.is_empty() && attachment.is_none() {
        return None;
    }
    if !app.online {
        app.set_status("Backend offline; message not sent");
        return None;
    }
    if app.is_typing {
        app.set_status("Wait for the current response to finish");
        return None;
    }

    let file_content = attachment
        .as_ref()
        .and_then(|attachment| attachment.text_content.clone());
    let content = match (&attachment, content.is_empty()) {
        (Some(attachment), true) => format!("Arquivo anexado: {}", attachment.filename),
        _ => content,
    };

    let id = app.next_message_id();
    let user_message = Message::new(id, Role::User, content)
        .with_conversation(app.active_conversation)
        .with_attachment(attachment);
    if let Err(err) = app.session.logging.log_message(&user_message) {
        warn!(error = %err, "Failed to write transcript");
    }
    app.clear_status();

    let stream = app.begin_turn(user_message.clone(), file_content);
    Some(AppCommand::StartTurn {
        stream,
        user_message,
    })
}

fn load_conversation(app: &mut App, conversation_id: i64, records: Vec<MessageRecord>) {
    app.cancel_current_stream();
    app.messages.clear();
    app.active_conversation = Some(conversation_id);

    for record in records {
        let id = app.next_message_id();
        match Message::from_record(id, record) {
            Ok(message) => app.push_message(message),
            Err(err) => warn!(conversation_id, error = %err, "Skipping stored message"),
        }
    }
    rewrite_transcript(app);
}

fn rewrite_transcript(app: &App) {
    if let Err(err) = app.session.logging.rewrite(&app.messages) {
        warn!(error = %err, "Failed to rewrite transcript");
    }
}
