//! The chat state container. All mutation goes through
//! [`apply_action`]; network work is returned as [`AppCommand`]s for the
//! caller to execute.

pub mod actions;
pub mod session;


pub use actions::{apply_action, apply_actions, AppAction, AppCommand};
pub use session::{build_http_client, SessionContext};

use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::api::ChatRequest;
use crate::core::chat_stream::StreamParams;
use crate::core::message::{LocalMessageId, Message, Role};

/// The assistant reply currently being streamed.
#[derive(Debug, Clone, PartialEq)]
pub struct InFlightTurn {
    pub stream_id: u64,
    pub message_id: LocalMessageId,
    pub conversation_id: Option<i64>,
    pub accumulated: String,
}

pub struct App {
    pub messages: Vec<Message>,
    pub is_typing: bool,
    pub online: bool,
    pub status: Option<String>,
    pub active_conversation: Option<i64>,
    pub max_history_messages: usize,
    pub session: SessionContext,
    in_flight: Option<InFlightTurn>,
    next_message_id: LocalMessageId,
}

impl App {
    pub fn new(session: SessionContext, max_history_messages: usize) -> Self {
        Self {
            messages: Vec::new(),
            is_typing: false,
            online: false,
            status: None,
            active_conversation: None,
            max_history_messages,
            session,
            in_flight: None,
            next_message_id: 1,
        }
    }

    /// Sending requires a reachable backend and no turn in flight.
    pub fn can_send(&self) -> bool {
        self.online && !self.is_typing
    }

    pub fn in_flight(&self) -> Option<&InFlightTurn> {
        self.in_flight.as_ref()
    }

    pub fn is_current_stream(&self, stream_id: u64) -> bool {
        self.in_flight
            .as_ref()
            .is_some_and(|turn| turn.stream_id == stream_id)
    }

    pub fn next_message_id(&mut self) -> LocalMessageId {
        let id = self.next_message_id;
        self.next_message_id += 1;
        id
    }

    pub fn message(&self, id: LocalMessageId) -> Option<&Message> {
        self.messages.iter().find(|message| message.id == id)
    }

    pub fn message_mut(&mut self, id: LocalMessageId) -> Option<&mut Message> {
        self.messages.iter_mut().find(|message| message.id == id)
    }

    pub fn remove_message(&mut self, id: LocalMessageId) -> Option<Message> {
        let index = self.messages.iter().position(|message| message.id == id)?;
        Some(self.messages.remove(index))
    }

    pub fn push_message(&mut self, message: Message) {
        self.messages.push(message);
        self.enforce_history_limit();
    }

    /// Append a message not produced by a stream, e.g. a transport error.
    pub fn push_assistant_notice(&mut self, content: impl Into<String>) -> LocalMessageId {
        let id = self.next_message_id();
        let message =
            Message::new(id, Role::Assistant, content).with_conversation(self.active_conversation);
        self.push_message(message);
        id
    }

    /// Drop the oldest messages beyond the configured limit. The in-flight
    /// placeholder is never dropped.
    fn enforce_history_limit(&mut self) {
        if self.max_history_messages == 0 {
            return;
        }
        let protected = self.in_flight.as_ref().map(|turn| turn.message_id);
        while self.messages.len() > self.max_history_messages {
            match self
                .messages
                .iter()
                .position(|message| Some(message.id) != protected)
            {
                Some(index) => {
                    self.messages.remove(index);
                }
                None => break,
            }
        }
    }

    pub fn set_status<S: Into<String>>(&mut self, status: S) {
        self.status = Some(status.into());
    }

    pub fn clear_status(&mut self) {
        self.status = None;
    }

    /// Cancel the in-flight stream, if any, and forget its turn. An empty
    /// placeholder is removed.
    pub fn cancel_current_stream(&mut self) {
        if let Some(token) = self.session.stream_cancel_token.take() {
            token.cancel();
        }
        if let Some(turn) = self.in_flight.take() {
            let empty = self
                .message(turn.message_id)
                .is_some_and(|message| message.content.is_empty());
            if empty {
                self.remove_message(turn.message_id);
            }
        }
        self.is_typing = false;
    }

    fn start_new_stream(&mut self) -> (CancellationToken, u64) {
        self.cancel_current_stream();
        self.session.current_stream_id += 1;
        let token = CancellationToken::new();
        self.session.stream_cancel_token = Some(token.clone());
        self.is_typing = true;
        (token, self.session.current_stream_id)
    }

    /// Insert the user message and an empty assistant placeholder, then
    /// return the parameters for the stream that fills it.
    fn begin_turn(&mut self, user_message: Message, file_content: Option<String>) -> StreamParams {
        let pergunta = user_message.content.clone();
        self.push_message(user_message);

        let (cancel_token, stream_id) = self.start_new_stream();
        let placeholder_id = self.next_message_id();
        self.in_flight = Some(InFlightTurn {
            stream_id,
            message_id: placeholder_id,
            conversation_id: self.active_conversation,
            accumulated: String::new(),
        });
        self.push_message(
            Message::new(placeholder_id, Role::Assistant, "")
                .with_conversation(self.active_conversation),
        );

        StreamParams {
            client: self.session.client.clone(),
            base_url: self.session.backend_url.clone(),
            request: ChatRequest {
                pergunta,
                file_content,
            },
            cancel_token,
            stream_id,
        }
    }

    fn append_token(&mut self, token: &str) {
        if token.is_empty() {
            return;
        }
        let Some(turn) = self.in_flight.as_mut() else {
            return;
        };
        turn.accumulated.push_str(token);
        let message_id = turn.message_id;
        if let Some(message) = self.message_mut(message_id) {
            message.content.push_str(token);
        }
    }

    /// End the turn. Returns the finished assistant message when it has
    /// content worth keeping.
    fn finish_turn(&mut self) -> Option<Message> {
        self.session.stream_cancel_token = None;
        self.is_typing = false;
        let turn = self.in_flight.take()?;

        if turn.accumulated.is_empty() {
            self.remove_message(turn.message_id);
            return None;
        }

        let message = self.message(turn.message_id).cloned()?;
        if let Err(err) = self.session.logging.log_message(&message) {
            warn!(error = %err, "Failed to write transcript");
        }
        Some(message)
    }

    fn fail_turn(&mut self, content: String, replace_in_place: bool) {
        self.session.stream_cancel_token = None;
        self.is_typing = false;
        let Some(turn) = self.in_flight.take() else {
            return;
        };

        if replace_in_place {
            if let Some(message) = self.message_mut(turn.message_id) {
                message.content = content;
                return;
            }
        }

        if turn.accumulated.is_empty() {
            self.remove_message(turn.message_id);
        }
        self.push_assistant_notice(content);
    }

    /// Attach a conversation id to the messages and turn that started before
    /// the conversation existed.
    fn assign_conversation(&mut self, conversation_id: i64) {
        self.active_conversation = Some(conversation_id);
        for message in self
            .messages
            .iter_mut()
            .filter(|message| message.conversation_id.is_none())
        {
            message.conversation_id = Some(conversation_id);
        }
        if let Some(turn) = self.in_flight.as_mut() {
            turn.conversation_id.get_or_insert(conversation_id);
        }
    }
}
