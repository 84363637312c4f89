//! Attachment storage: objects in the `chat-files` bucket plus `files` rows.

use chrono::Utc;
use percent_encoding::percent_decode_str;
use reqwest::Url;
use serde::Deserialize;
use tracing::{debug, warn};

use super::rest::{eq, RestStore};
use super::StoreError;
use crate::api::FileRecord;
use crate::core::attachment::{storage_path, PendingAttachment};
use crate::core::session::Session;

pub const BUCKET: &str = "chat-files";

#[derive(Debug, Deserialize)]
struct FileUrlRow {
    #[serde(default)]
    file_url: Option<String>,
}

impl RestStore {
    fn object_url(&self, path: &str) -> Result<Url, StoreError> {
        let mut segments = vec!["storage", "v1", "object", BUCKET];
        segments.extend(path.split('/'));
        self.endpoint_url(&segments)
    }

    /// Public URL of an object in the attachment bucket.
    pub fn public_url(&self, path: &str) -> Result<Url, StoreError> {
        let mut segments = vec!["storage", "v1", "object", "public", BUCKET];
        segments.extend(path.split('/'));
        self.endpoint_url(&segments)
    }

    /// Upload raw bytes to `path` without overwriting an existing object.
    pub async fn upload_object(
        &self,
        session: &Session,
        path: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> Result<String, StoreError> {
        let request = self
            .authed(self.client().post(self.object_url(path)?), session)
            .header("content-type", content_type)
            .header("cache-control", "3600")
            .header("x-upsert", "false")
            .body(bytes);
        Self::send_empty(request).await?;
        debug!(path, "Uploaded object");
        Ok(self.public_url(path)?.to_string())
    }

    /// Upload the attachment and record it against `message_id`.
    pub async fn save_file(
        &self,
        session: &Session,
        message_id: i64,
        attachment: &PendingAttachment,
    ) -> Result<FileRecord, StoreError> {
        let path = storage_path(
            &session.user_id,
            Utc::now().timestamp_millis(),
            &attachment.filename,
        );
        let file_url = self
            .upload_object(session, &path, &attachment.mime_type, attachment.bytes.clone())
            .await?;

        let record = FileRecord {
            id: None,
            message_id,
            user_id: Some(session.user_id.clone()),
            filename: attachment.filename.clone(),
            file_type: attachment.mime_type.clone(),
            file_size: attachment.size,
            file_content: attachment.text_content.clone(),
            file_url: Some(file_url),
            created_at: None,
        };
        let request = self
            .authed(self.client().post(self.table_url("files", &[])?), session)
            .header("Prefer", "return=representation")
            .json(&record);
        let rows: Vec<FileRecord> = Self::send_json(request).await?;
        rows.into_iter()
            .next()
            .ok_or(StoreError::MissingRow("saved file"))
    }

    pub async fn files_for_message(
        &self,
        session: &Session,
        message_id: i64,
    ) -> Result<Vec<FileRecord>, StoreError> {
        let url = self.table_url(
            "files",
            &[
                ("select", "*".to_string()),
                ("message_id", eq(message_id)),
                ("user_id", eq(&session.user_id)),
            ],
        )?;
        Self::send_json(self.authed(self.client().get(url), session)).await
    }

    /// Remove the stored object, then the row. A failed object delete is
    /// logged and the row is still removed.
    pub async fn delete_file(&self, session: &Session, file_id: i64) -> Result<(), StoreError> {
        let filters = [("id", eq(file_id)), ("user_id", eq(&session.user_id))];
        let mut lookup = vec![("select", "file_url".to_string())];
        lookup.extend(filters.iter().cloned());
        let rows: Vec<FileUrlRow> = Self::send_json(
            self.authed(self.client().get(self.table_url("files", &lookup)?), session),
        )
        .await?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::NotFound(format!("File {file_id}")))?;

        if let Some(path) = row.file_url.as_deref().and_then(object_path) {
            let request = self.authed(self.client().delete(self.object_url(&path)?), session);
            if let Err(err) = Self::send_empty(request).await {
                warn!(file_id, error = %err, "Failed to delete stored object");
            }
        }

        let url = self.table_url("files", &filters)?;
        Self::send_empty(self.authed(self.client().delete(url), session)).await
    }
}

/// Recover the decoded object path from a public attachment URL.
fn object_path(public_url: &str) -> Option<String> {
    let url = Url::parse(public_url).ok()?;
    let segments: Vec<&str> = url.path_segments()?.collect();
    let prefix = ["storage", "v1", "object", "public", BUCKET];
    let start = segments
        .windows(prefix.len())
        .position(|window| window == prefix)?
        + prefix.len();
    let decoded: Vec<String> = segments[start..]
        .iter()
        .map(|segment| percent_decode_str(segment).decode_utf8_lossy().into_owned())
        .collect();
    if decoded.iter().all(String::is_empty) {
        return None;
    }
    Some(decoded.join("/"))
}
