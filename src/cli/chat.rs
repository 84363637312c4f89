//! The interactive chat REPL.
//!
//! One task owns the [`App`]. Input lines, stream messages and health
//! transitions are multiplexed with `tokio::select!` and fed in as actions;
//! the commands that come back are executed here against the store.

use std::error::Error;
use std::io::{self, Write};

use chrono::{Duration, Local, Utc};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tracing::{debug, warn};

use super::auth::{remember, require_session};
use super::conversations::{format_grouped, format_message};
use super::CliContext;
use crate::commands::{process_input, CommandResult};
use crate::core::app::{apply_action, App, AppAction, AppCommand, SessionContext};
use crate::core::attachment::{format_file_size, PendingAttachment};
use crate::core::chat_stream::{ChatStreamService, StreamMessage, StreamReceiver};
use crate::core::conversation::derive_title;
use crate::core::health::BackendMonitor;
use crate::core::message::Message;
use crate::core::session::{AuthState, Session};
use crate::store::auth::AuthClient;
use crate::store::{ConversationStore, RestStore};
use crate::utils::logging::TranscriptLog;

const REFRESH_MARGIN_SECS: i64 = 60;

pub async fn run_chat(ctx: &CliContext, conversation: Option<i64>) -> Result<(), Box<dyn Error>> {
    let store = ctx.store()?;
    let auth = AuthClient::for_store(&store);
    let (auth_state, session) = require_session(ctx, &auth).await?;

    let backend_url = ctx.backend_url();
    let logging = TranscriptLog::new(ctx.transcript.clone(), ctx.settings.username.clone());
    let app = App::new(
        SessionContext::new(ctx.client.clone(), &backend_url, logging),
        ctx.settings.max_history_messages,
    );
    let monitor = BackendMonitor::spawn(
        ctx.client.clone(),
        backend_url.clone(),
        ctx.config.health_interval(),
        ctx.settings.request_timeout(),
    );
    let (stream_service, rx) = ChatStreamService::new();

    println!("OllamaCode: signed in as {}", session.display_name());
    println!("Backend: {backend_url}. Type /help for commands.\n");

    let mut repl = ChatRepl {
        ctx,
        app,
        store,
        auth,
        auth_state,
        stream_service,
        pending: None,
        reply_started: false,
    };
    if let Some(id) = conversation {
        repl.open_conversation(id).await;
    }

    let result = repl.run(rx, monitor.subscribe()).await;
    repl.app.cancel_current_stream();
    monitor.shutdown().await;
    result
}

struct ChatRepl<'a> {
    ctx: &'a CliContext,
    app: App,
    store: RestStore,
    auth: AuthClient,
    auth_state: AuthState,
    stream_service: ChatStreamService,
    pending: Option<PendingAttachment>,
    /// Whether the assistant prefix for the current reply is printed.
    reply_started: bool,
}

impl ChatRepl<'_> {
    async fn run(
        &mut self,
        mut rx: StreamReceiver,
        mut health: watch::Receiver<bool>,
    ) -> Result<(), Box<dyn Error>> {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        self.prompt()?;

        loop {
            tokio::select! {
                line = lines.next_line() => {
                    let Some(line) = line? else { break };
                    if !self.handle_line(&line).await? {
                        break;
                    }
                    if self.app.in_flight().is_none() {
                        self.prompt()?;
                    }
                }
                Some((message, stream_id)) = rx.recv() => {
                    if self.handle_stream_message(message, stream_id).await? {
                        self.prompt()?;
                    }
                }
                Ok(()) = health.changed() => {
                    let online = *health.borrow_and_update();
                    apply_action(&mut self.app, AppAction::BackendStatusChanged { online });
                    if online {
                        println!("\r🟢 Backend online");
                    } else {
                        println!("\r🔴 Backend offline; sending is disabled");
                    }
                }
            }
        }
        Ok(())
    }

    fn prompt(&mut self) -> io::Result<()> {
        self.flush_status();
        match &self.pending {
            Some(pending) => print!("[📎 {}] > ", pending.filename),
            None => print!("> "),
        }
        io::stdout().flush()
    }

    fn flush_status(&mut self) {
        if let Some(status) = self.app.status.take() {
            println!("{status}");
        }
    }

    /// Returns `false` when the user asked to leave.
    async fn handle_line(&mut self, line: &str) -> Result<bool, Box<dyn Error>> {
        if line.trim().is_empty() && self.pending.is_none() {
            return Ok(true);
        }

        match process_input(&mut self.app, line) {
            CommandResult::Continue => {}
            CommandResult::Quit => return Ok(false),
            CommandResult::Print(text) => println!("{text}"),
            CommandResult::ProcessAsMessage(text) => self.submit(text).await?,
            CommandResult::ListConversations => self.list_conversations().await,
            CommandResult::OpenConversation(id) => self.open_conversation(id).await,
            CommandResult::RenameConversation(title) => self.rename_conversation(&title).await,
            CommandResult::DeleteConversation(id) => self.delete_conversation(id).await,
            CommandResult::Attach(path) => {
                match PendingAttachment::load(&path, &self.ctx.settings) {
                    Ok(pending) => {
                        self.app.set_status(format!(
                            "📎 Attached {} ({})",
                            pending.filename,
                            format_file_size(pending.size)
                        ));
                        self.pending = Some(pending);
                    }
                    Err(err) => self.app.set_status(format!("❌ {err}")),
                }
            }
            CommandResult::Detach => {
                if self.pending.take().is_some() {
                    self.app.set_status("Attachment removed");
                }
            }
        }
        Ok(true)
    }

    async fn submit(&mut self, text: String) -> Result<(), Box<dyn Error>> {
        let attachment = self.pending.as_ref().map(PendingAttachment::to_attachment);
        let command = apply_action(
            &mut self.app,
            AppAction::SubmitMessage {
                content: text,
                attachment,
            },
        );
        let Some(AppCommand::StartTurn {
            stream,
            user_message,
        }) = command
        else {
            return Ok(());
        };

        self.reply_started = false;
        self.stream_service.spawn_stream(stream);
        let pending = self.pending.take();
        self.persist_user_message(user_message, pending).await;
        Ok(())
    }

    /// Save the user message, creating the conversation first when this is
    /// its opening message. Store failures are reported and the chat goes on.
    async fn persist_user_message(&mut self, message: Message, pending: Option<PendingAttachment>) {
        let Some(session) = self.session().await else {
            return;
        };

        let conversation_id = match self.app.active_conversation {
            Some(id) => id,
            None => {
                let title = self
                    .ctx
                    .settings
                    .auto_rename_conversations
                    .then(|| derive_title(&message.content));
                match self.store.create_conversation(&session, title.as_deref()).await {
                    Ok(conversation) => {
                        debug!(id = conversation.id, title = %conversation.title, "Created conversation");
                        apply_action(
                            &mut self.app,
                            AppAction::ConversationCreated {
                                conversation_id: conversation.id,
                            },
                        );
                        conversation.id
                    }
                    Err(err) => {
                        warn!(error = %err, "Could not create conversation");
                        println!("⚠️  Could not save this conversation: {err}");
                        return;
                    }
                }
            }
        };

        let Some(remote_id) = self.save_message(&session, &message, conversation_id).await else {
            return;
        };
        if let Some(pending) = pending {
            if let Err(err) = self.store.save_file(&session, remote_id, &pending).await {
                warn!(error = %err, filename = %pending.filename, "Could not upload attachment");
                println!("⚠️  Could not upload {}: {err}", pending.filename);
            }
        }
    }

    async fn save_message(
        &mut self,
        session: &Session,
        message: &Message,
        conversation_id: i64,
    ) -> Option<i64> {
        match self
            .store
            .save_message(session, message.to_record(conversation_id))
            .await
        {
            Ok(saved) => {
                let remote_id = saved.id?;
                apply_action(
                    &mut self.app,
                    AppAction::MessagePersisted {
                        local_id: message.id,
                        remote_id,
                    },
                );
                Some(remote_id)
            }
            Err(err) => {
                warn!(error = %err, "Could not save message");
                println!("⚠️  Could not save message: {err}");
                None
            }
        }
    }

    /// Apply one stream message and echo it. Returns `true` when the turn
    /// just ended.
    async fn handle_stream_message(
        &mut self,
        message: StreamMessage,
        stream_id: u64,
    ) -> Result<bool, Box<dyn Error>> {
        if !self.app.is_current_stream(stream_id) {
            return Ok(false);
        }

        match &message {
            StreamMessage::Token(content) if !content.is_empty() => {
                if !self.reply_started {
                    print!("\nAssistant: ");
                    self.reply_started = true;
                }
                print!("{content}");
                io::stdout().flush()?;
            }
            StreamMessage::ServerError(err) | StreamMessage::Failed(err) => {
                println!("\n❌ {err}");
            }
            _ => {}
        }

        let command = apply_action(
            &mut self.app,
            AppAction::from_stream_message(message, stream_id),
        );
        if let Some(AppCommand::PersistMessage(reply)) = command {
            match reply.conversation_id {
                Some(conversation_id) => {
                    if let Some(session) = self.session().await {
                        self.save_message(&session, &reply, conversation_id).await;
                    }
                }
                None => debug!("Reply has no conversation; not saved"),
            }
        }

        let finished = self.app.in_flight().is_none();
        if finished {
            println!("\n");
        }
        Ok(finished)
    }

    async fn list_conversations(&mut self) {
        let Some(session) = self.session().await else {
            return;
        };
        match self.store.list_conversations(&session).await {
            Ok(conversations) if conversations.is_empty() => println!("No conversations yet."),
            Ok(conversations) => {
                for line in format_grouped(&conversations, &Local::now()) {
                    println!("{line}");
                }
            }
            Err(err) => println!("❌ Could not list conversations: {err}"),
        }
    }

    async fn open_conversation(&mut self, id: i64) {
        let Some(session) = self.session().await else {
            return;
        };
        let title = match self.store.get_conversation(&session, id).await {
            Ok(Some(conversation)) => conversation.title,
            Ok(None) => {
                self.app.set_status(format!("Conversation {id} not found"));
                return;
            }
            Err(err) => {
                self.app.set_status(format!("❌ {err}"));
                return;
            }
        };
        match self.store.list_messages(&session, id).await {
            Ok(records) => {
                println!("# {title}\n");
                for record in &records {
                    println!("{}\n", format_message(record));
                }
                apply_action(
                    &mut self.app,
                    AppAction::LoadConversation {
                        conversation_id: id,
                        records,
                    },
                );
                self.app.set_status(format!("Opened #{id}"));
            }
            Err(err) => self.app.set_status(format!("❌ {err}")),
        }
    }

    async fn rename_conversation(&mut self, title: &str) {
        let Some(id) = self.app.active_conversation else {
            return;
        };
        let Some(session) = self.session().await else {
            return;
        };
        match self.store.rename_conversation(&session, id, title).await {
            Ok(()) => self.app.set_status(format!("✅ Renamed to: {title}")),
            Err(err) => self.app.set_status(format!("❌ {err}")),
        }
    }

    async fn delete_conversation(&mut self, id: Option<i64>) {
        let Some(id) = id.or(self.app.active_conversation) else {
            return;
        };
        let Some(session) = self.session().await else {
            return;
        };
        match self.store.delete_conversation(&session, id).await {
            Ok(()) => {
                if self.app.active_conversation == Some(id) {
                    apply_action(&mut self.app, AppAction::NewConversation);
                }
                self.app.set_status(format!("🗑️  Deleted #{id}"));
            }
            Err(err) => self.app.set_status(format!("❌ {err}")),
        }
    }

    /// The live session, refreshed when the access token is about to
    /// expire. `None` after reporting a refresh failure.
    async fn session(&mut self) -> Option<Session> {
        let session = match self.auth_state.session() {
            Ok(session) => session.clone(),
            Err(err) => {
                println!("❌ {err}");
                return None;
            }
        };
        if !session.expires_within(Utc::now(), Duration::seconds(REFRESH_MARGIN_SECS)) {
            return Some(session);
        }

        match self
            .auth
            .refresh(&mut self.auth_state, &session.refresh_token)
            .await
        {
            Ok(refreshed) => {
                remember(self.ctx, &refreshed);
                Some(refreshed)
            }
            Err(err) => {
                warn!(error = %err, "Session refresh failed");
                println!("❌ Session expired: {err}. Run `ollamacode login` again.");
                None
            }
        }
    }
}
