//! Wire payloads exchanged with the chat backend and the hosted store.

use serde::{Deserialize, Serialize};

/// Body of `POST /chat`.
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct ChatRequest {
    pub pergunta: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_content: Option<String>,
}

/// One decoded stream line. `resposta`/`erro` are the field names the older
/// non-streaming backend used for the same information.
#[derive(Debug, Deserialize, Default, Clone, PartialEq)]
pub struct StreamPayload {
    #[serde(default, alias = "resposta")]
    pub token: Option<String>,
    #[serde(default)]
    pub done: Option<bool>,
    #[serde(default, alias = "erro")]
    pub error: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PingResponse {
    pub status: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ConversationRecord {
    pub id: Option<i64>,
    pub title: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct NewConversationRecord<'a> {
    pub title: &'a str,
    pub user_id: &'a str,
}

#[derive(Debug, Serialize)]
pub struct ConversationPatch<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<&'a str>,
    pub updated_at: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct MessageRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub conversation_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub role: String,
    pub content: String,
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing)]
    pub files: Option<Vec<FileRecord>>,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct FileRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub message_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub filename: String,
    pub file_type: String,
    pub file_size: u64,
    #[serde(default)]
    pub file_content: Option<String>,
    #[serde(default)]
    pub file_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ProfileRecord {
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PasswordGrant<'a> {
    pub email: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Serialize)]
pub struct RefreshGrant<'a> {
    pub refresh_token: &'a str,
}

#[derive(Debug, Serialize)]
pub struct SignUpRequest<'a> {
    pub email: &'a str,
    pub password: &'a str,
    pub data: SignUpMetadata,
}

#[derive(Debug, Serialize)]
pub struct SignUpMetadata {
    pub username: String,
    pub full_name: String,
}

#[derive(Debug, Serialize)]
pub struct RecoverRequest<'a> {
    pub email: &'a str,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct AuthUserRecord {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub expires_at: Option<i64>,
    pub user: AuthUserRecord,
}
