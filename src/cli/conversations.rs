use std::error::Error;

use chrono::{DateTime, Local};

use super::auth::require_session;
use super::{CliContext, ConversationCommands};
use crate::api::{FileRecord, MessageRecord};
use crate::core::attachment::format_file_size;
use crate::core::conversation::{group_by_recency, Conversation};
use crate::store::auth::AuthClient;
use crate::store::ConversationStore;

/// Render conversations under their recency headings, newest first.
pub fn format_grouped<Tz: chrono::TimeZone>(
    conversations: &[Conversation],
    now: &DateTime<Tz>,
) -> Vec<String> {
    let mut lines = Vec::new();
    for group in group_by_recency(conversations, now) {
        if !lines.is_empty() {
            lines.push(String::new());
        }
        lines.push(format!("{}:", group.bucket.label()));
        for conversation in group.conversations {
            lines.push(format!("  #{:<6} {}", conversation.id, conversation.title));
        }
    }
    lines
}

fn attachment_label(file: &FileRecord) -> String {
    let mut label = format!("{} ({})", file.filename, format_file_size(file.file_size));
    if let Some(id) = file.id {
        label.push_str(&format!(" [file #{id}]"));
    }
    label
}

pub fn format_message(record: &MessageRecord) -> String {
    let speaker = if record.role == "user" { "You" } else { "Assistant" };
    let mut text = format!("{speaker}: {}", record.content);
    if let Some(id) = record.id {
        text.push_str(&format!(" [message #{id}]"));
    }
    for file in record.files.iter().flatten() {
        text.push_str(&format!("\n  📎 {}", attachment_label(file)));
    }
    text
}

pub fn format_file(file: &FileRecord) -> String {
    let mut line = format!("📎 {} {}", attachment_label(file), file.file_type);
    if let Some(url) = file.file_url.as_deref() {
        line.push_str(&format!("\n   {url}"));
    }
    line
}

pub async fn run(ctx: &CliContext, command: ConversationCommands) -> Result<(), Box<dyn Error>> {
    let store = ctx.store()?;
    let auth = AuthClient::for_store(&store);
    let (_, session) = require_session(ctx, &auth).await?;

    match command {
        ConversationCommands::List => {
            let conversations = store.list_conversations(&session).await?;
            if conversations.is_empty() {
                println!("No conversations yet.");
            }
            for line in format_grouped(&conversations, &Local::now()) {
                println!("{line}");
            }
        }
        ConversationCommands::Show { id } => {
            let Some(conversation) = store.get_conversation(&session, id).await? else {
                return Err(format!("Conversation {id} not found").into());
            };
            println!("# {}\n", conversation.title);
            for record in store.list_messages(&session, id).await? {
                println!("{}\n", format_message(&record));
            }
        }
        ConversationCommands::New { title } => {
            let conversation = store.create_conversation(&session, title.as_deref()).await?;
            println!("✅ Created #{}: {}", conversation.id, conversation.title);
        }
        ConversationCommands::Rename { id, title } => {
            let title = title.join(" ");
            store.rename_conversation(&session, id, &title).await?;
            println!("✅ Renamed #{id} to: {title}");
        }
        ConversationCommands::Delete { id } => {
            store.delete_conversation(&session, id).await?;
            println!("🗑️  Deleted #{id}");
        }
        ConversationCommands::Files { message_id } => {
            let files = store.files_for_message(&session, message_id).await?;
            if files.is_empty() {
                println!("No files on message #{message_id}.");
            }
            for file in &files {
                println!("{}", format_file(file));
            }
        }
        ConversationCommands::DeleteFile { id } => {
            store.delete_file(&session, id).await?;
            println!("🗑️  Deleted file #{id}");
        }
    }
    Ok(())
}
