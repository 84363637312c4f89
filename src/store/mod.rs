//! Clients for the hosted store: PostgREST tables, object storage and the
//! identity service. Every data call takes the caller's [`Session`].

pub mod auth;
pub mod files;
pub mod profiles;
pub mod rest;

use async_trait::async_trait;
use std::error::Error;
use std::fmt;

use crate::api::MessageRecord;
use crate::core::conversation::Conversation;
use crate::core::session::Session;

pub use rest::RestStore;

#[derive(Debug)]
pub enum StoreError {
    /// The store URL or anon key is missing from config and environment.
    NotConfigured,
    Http(reqwest::Error),
    /// The store answered with a non-2xx status.
    Status { status: u16, message: String },
    Decode(serde_json::Error),
    /// The row does not exist or belongs to another user.
    NotFound(String),
    /// The store answered 2xx without the row it should have returned.
    MissingRow(&'static str),
    /// The configured store URL cannot carry endpoint paths.
    InvalidUrl(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::NotConfigured => write!(
                f,
                "Store is not configured. Set [store] url and anon_key in config.toml or OLLAMACODE_STORE_URL / OLLAMACODE_STORE_KEY"
            ),
            StoreError::Http(err) => write!(f, "Store request failed: {err}"),
            StoreError::Status { status, message } => {
                write!(f, "Store returned HTTP {status}: {message}")
            }
            StoreError::Decode(err) => write!(f, "Unexpected store response: {err}"),
            StoreError::NotFound(what) => write!(f, "{what} not found"),
            StoreError::MissingRow(what) => write!(f, "Store did not return the {what}"),
            StoreError::InvalidUrl(detail) => write!(f, "Invalid store URL: {detail}"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            StoreError::Http(err) => Some(err),
            StoreError::Decode(err) => Some(err),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for StoreError {
    fn from(err: reqwest::Error) -> Self {
        StoreError::Http(err)
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Decode(err)
    }
}

/// Pull a human-readable message out of a PostgREST, storage or auth error
/// body, falling back to the raw text.
pub(crate) fn extract_error_message(body: &str) -> String {
    let trimmed = body.trim();
    if let Ok(serde_json::Value::Object(map)) = serde_json::from_str::<serde_json::Value>(trimmed) {
        for key in ["message", "msg", "error_description", "error", "hint"] {
            if let Some(text) = map.get(key).and_then(|value| value.as_str()) {
                if !text.trim().is_empty() {
                    return text.trim().to_string();
                }
            }
        }
    }
    if trimmed.is_empty() {
        "<no body>".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Conversation persistence, scoped to the session's user.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Conversations owned by the user, most recently updated first. Rows
    /// missing required columns are skipped.
    async fn list_conversations(&self, session: &Session) -> Result<Vec<Conversation>, StoreError>;

    async fn get_conversation(
        &self,
        session: &Session,
        id: i64,
    ) -> Result<Option<Conversation>, StoreError>;

    /// `None` uses the default title.
    async fn create_conversation(
        &self,
        session: &Session,
        title: Option<&str>,
    ) -> Result<Conversation, StoreError>;

    /// Sets the title and bumps `updated_at`.
    async fn rename_conversation(
        &self,
        session: &Session,
        id: i64,
        title: &str,
    ) -> Result<(), StoreError>;

    async fn delete_conversation(&self, session: &Session, id: i64) -> Result<(), StoreError>;

    /// Insert a message owned by the session user and bump its
    /// conversation's `updated_at`.
    async fn save_message(
        &self,
        session: &Session,
        message: MessageRecord,
    ) -> Result<MessageRecord, StoreError>;

    /// Messages with their files, oldest first. Fails with `NotFound` when
    /// the conversation is not the user's.
    async fn list_messages(
        &self,
        session: &Session,
        conversation_id: i64,
    ) -> Result<Vec<MessageRecord>, StoreError>;
}
