//! One-shot question without the REPL or the store.

use std::error::Error;
use std::io::{self, Write};
use std::path::PathBuf;

use super::CliContext;
use crate::core::app::{apply_action, App, AppAction, AppCommand, SessionContext};
use crate::core::attachment::PendingAttachment;
use crate::core::chat_stream::{ChatStreamService, StreamMessage};
use crate::utils::logging::TranscriptLog;

pub async fn run_ask(
    ctx: &CliContext,
    prompt: Vec<String>,
    attach: Option<PathBuf>,
) -> Result<(), Box<dyn Error>> {
    let prompt = prompt.join(" ");
    let attachment = match attach {
        Some(path) => Some(PendingAttachment::load(&path, &ctx.settings)?),
        None => None,
    };
    if prompt.trim().is_empty() && attachment.is_none() {
        eprintln!("Usage: ollamacode ask <prompt> [--attach FILE]");
        std::process::exit(1);
    }

    let session = SessionContext::new(
        ctx.client.clone(),
        &ctx.backend_url(),
        TranscriptLog::new(ctx.transcript.clone(), ctx.settings.username.clone()),
    );
    let mut app = App::new(session, ctx.settings.max_history_messages);
    // Connection problems surface as a stream failure below.
    app.online = true;

    let Some(AppCommand::StartTurn { stream, .. }) = apply_action(
        &mut app,
        AppAction::SubmitMessage {
            content: prompt,
            attachment: attachment.as_ref().map(PendingAttachment::to_attachment),
        },
    ) else {
        return Err("Nothing to send".into());
    };

    let (stream_service, mut rx) = ChatStreamService::new();
    stream_service.spawn_stream(stream);

    while let Some((message, stream_id)) = rx.recv().await {
        match &message {
            StreamMessage::Token(content) => {
                print!("{content}");
                io::stdout().flush()?;
            }
            StreamMessage::ServerError(err) | StreamMessage::Failed(err) => {
                eprintln!("\n❌ {err}");
                std::process::exit(1);
            }
            StreamMessage::Done | StreamMessage::End => {}
        }
        apply_action(&mut app, AppAction::from_stream_message(message, stream_id));
        if app.in_flight().is_none() {
            break;
        }
    }
    println!();
    Ok(())
}
