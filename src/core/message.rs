use serde::{Deserialize, Serialize};

use crate::api::{FileRecord, MessageRecord};

pub const ROLE_USER: &str = "user";
pub const ROLE_ASSISTANT: &str = "assistant";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => ROLE_USER,
            Role::Assistant => ROLE_ASSISTANT,
        }
    }
}

impl AsRef<str> for Role {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl PartialEq<&str> for Role {
    fn eq(&self, other: &&str) -> bool {
        self.as_str() == *other
    }
}

impl TryFrom<&str> for Role {
    type Error = String;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            ROLE_USER => Ok(Role::User),
            ROLE_ASSISTANT => Ok(Role::Assistant),
            _ => Err(format!("invalid message role: {value}")),
        }
    }
}

impl TryFrom<String> for Role {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::try_from(value.as_str())
    }
}

impl From<Role> for String {
    fn from(value: Role) -> Self {
        value.as_str().to_string()
    }
}

/// Client-side identifier, stable for the lifetime of a view. Persisted
/// messages additionally carry the store's id in [`Message::remote_id`].
pub type LocalMessageId = u64;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileAttachment {
    pub id: Option<i64>,
    pub message_id: Option<i64>,
    pub filename: String,
    pub mime_type: String,
    pub size: u64,
    pub text_content: Option<String>,
    pub url: Option<String>,
}

impl From<FileRecord> for FileAttachment {
    fn from(record: FileRecord) -> Self {
        Self {
            id: record.id,
            message_id: Some(record.message_id),
            filename: record.filename,
            mime_type: record.file_type,
            size: record.file_size,
            text_content: record.file_content,
            url: record.file_url,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: LocalMessageId,
    pub remote_id: Option<i64>,
    pub conversation_id: Option<i64>,
    pub role: Role,
    pub content: String,
    pub attachment: Option<FileAttachment>,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
}

impl Message {
    pub fn new(id: LocalMessageId, role: Role, content: impl Into<String>) -> Self {
        Self {
            id,
            remote_id: None,
            conversation_id: None,
            role,
            content: content.into(),
            attachment: None,
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }

    pub fn with_conversation(mut self, conversation_id: Option<i64>) -> Self {
        self.conversation_id = conversation_id;
        self
    }

    pub fn with_attachment(mut self, attachment: Option<FileAttachment>) -> Self {
        self.attachment = attachment;
        self
    }

    /// Rebuild a message loaded from the store. Rows with an unknown role are
    /// dropped by the caller.
    pub fn from_record(id: LocalMessageId, record: MessageRecord) -> Result<Self, String> {
        let role = Role::try_from(record.role.as_str())?;
        let attachment = record
            .files
            .and_then(|files| files.into_iter().next())
            .map(FileAttachment::from);
        Ok(Self {
            id,
            remote_id: record.id,
            conversation_id: Some(record.conversation_id),
            role,
            content: record.content,
            attachment,
            timestamp: record.timestamp,
        })
    }

    /// The row to insert for this message. The store fills in the owner.
    pub fn to_record(&self, conversation_id: i64) -> MessageRecord {
        MessageRecord {
            id: None,
            conversation_id,
            user_id: None,
            role: self.role.as_str().to_string(),
            content: self.content.clone(),
            timestamp: self.timestamp,
            created_at: None,
            files: None,
        }
    }
}
