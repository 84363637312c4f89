use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use reqwest::{Client, RequestBuilder, Response, Url};
use serde::de::DeserializeOwned;
use tracing::debug;

use super::{extract_error_message, ConversationStore, StoreError};
use crate::api::{ConversationPatch, ConversationRecord, MessageRecord, NewConversationRecord};
use crate::core::config::data::StoreConfig;
use crate::core::conversation::{Conversation, DEFAULT_CONVERSATION_TITLE};
use crate::core::session::Session;
use crate::utils::url::normalize_base_url;

const CONVERSATION_COLUMNS: &str = "id,title,user_id,created_at,updated_at";

pub(crate) fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub(crate) fn eq(value: impl ToString) -> String {
    format!("eq.{}", value.to_string())
}

/// [`ConversationStore`] over the hosted PostgREST API.
#[derive(Clone)]
pub struct RestStore {
    client: Client,
    base_url: String,
    anon_key: String,
}

impl RestStore {
    pub fn new(client: Client, base_url: &str, anon_key: impl Into<String>) -> Self {
        Self {
            client,
            base_url: normalize_base_url(base_url),
            anon_key: anon_key.into(),
        }
    }

    pub fn from_config(client: Client, config: &StoreConfig) -> Result<Self, StoreError> {
        match (&config.url, &config.anon_key) {
            (Some(url), Some(key)) if !url.trim().is_empty() && !key.trim().is_empty() => {
                Ok(Self::new(client, url, key.trim()))
            }
            _ => Err(StoreError::NotConfigured),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub(crate) fn client(&self) -> &Client {
        &self.client
    }

    pub(crate) fn anon_key(&self) -> &str {
        &self.anon_key
    }

    /// `{base}/{segments..}`, each segment percent-encoded.
    pub(crate) fn endpoint_url(&self, segments: &[&str]) -> Result<Url, StoreError> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|err| StoreError::InvalidUrl(format!("{}: {err}", self.base_url)))?;
        url.path_segments_mut()
            .map_err(|()| StoreError::InvalidUrl(self.base_url.clone()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    pub(crate) fn table_url(
        &self,
        table: &str,
        query: &[(&str, String)],
    ) -> Result<Url, StoreError> {
        let mut url = self.endpoint_url(&["rest", "v1", table])?;
        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in query {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }

    /// Attach the project key and the user's bearer token.
    pub(crate) fn authed(&self, builder: RequestBuilder, session: &Session) -> RequestBuilder {
        builder
            .header("apikey", &self.anon_key)
            .bearer_auth(&session.access_token)
    }

    pub(crate) async fn check(response: Response) -> Result<Response, StoreError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(StoreError::Status {
            status: status.as_u16(),
            message: extract_error_message(&body),
        })
    }

    pub(crate) async fn send_json<T: DeserializeOwned>(
        builder: RequestBuilder,
    ) -> Result<T, StoreError> {
        let response = Self::check(builder.send().await?).await?;
        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }

    pub(crate) async fn send_empty(builder: RequestBuilder) -> Result<(), StoreError> {
        Self::check(builder.send().await?).await?;
        Ok(())
    }

    /// Verify the store answers with the configured key.
    pub async fn test_connection(&self) -> Result<(), StoreError> {
        let url = self.table_url(
            "conversations",
            &[("select", "id".to_string()), ("limit", "1".to_string())],
        )?;
        let request = self
            .client
            .get(url)
            .header("apikey", &self.anon_key)
            .bearer_auth(&self.anon_key);
        Self::send_empty(request).await
    }

    async fn touch_conversation(&self, session: &Session, id: i64) -> Result<(), StoreError> {
        let url = self.table_url(
            "conversations",
            &[("id", eq(id)), ("user_id", eq(&session.user_id))],
        )?;
        let patch = ConversationPatch {
            title: None,
            updated_at: now_rfc3339(),
        };
        Self::send_empty(self.authed(self.client.patch(url), session).json(&patch)).await
    }
}

#[async_trait]
impl ConversationStore for RestStore {
    async fn list_conversations(&self, session: &Session) -> Result<Vec<Conversation>, StoreError> {
        let url = self.table_url(
            "conversations",
            &[
                ("select", CONVERSATION_COLUMNS.to_string()),
                ("user_id", eq(&session.user_id)),
                ("order", "updated_at.desc".to_string()),
            ],
        )?;
        let records: Vec<ConversationRecord> =
            Self::send_json(self.authed(self.client.get(url), session)).await?;
        let total = records.len();
        let conversations: Vec<Conversation> = records
            .into_iter()
            .filter_map(Conversation::from_record)
            .collect();
        debug!(total, valid = conversations.len(), "Listed conversations");
        Ok(conversations)
    }

    async fn get_conversation(
        &self,
        session: &Session,
        id: i64,
    ) -> Result<Option<Conversation>, StoreError> {
        let url = self.table_url(
            "conversations",
            &[
                ("select", CONVERSATION_COLUMNS.to_string()),
                ("id", eq(id)),
                ("user_id", eq(&session.user_id)),
            ],
        )?;
        let records: Vec<ConversationRecord> =
            Self::send_json(self.authed(self.client.get(url), session)).await?;
        Ok(records.into_iter().find_map(Conversation::from_record))
    }

    async fn create_conversation(
        &self,
        session: &Session,
        title: Option<&str>,
    ) -> Result<Conversation, StoreError> {
        let url = self.table_url("conversations", &[("select", CONVERSATION_COLUMNS.to_string())])?;
        let title = title
            .map(str::trim)
            .filter(|title| !title.is_empty())
            .unwrap_or(DEFAULT_CONVERSATION_TITLE);
        let body = NewConversationRecord {
            title,
            user_id: &session.user_id,
        };
        let request = self
            .authed(self.client.post(url), session)
            .header("Prefer", "return=representation")
            .json(&body);
        let records: Vec<ConversationRecord> = Self::send_json(request).await?;
        let conversation = records
            .into_iter()
            .find_map(Conversation::from_record)
            .ok_or(StoreError::MissingRow("created conversation"))?;
        debug!(id = conversation.id, "Created conversation");
        Ok(conversation)
    }

    async fn rename_conversation(
        &self,
        session: &Session,
        id: i64,
        title: &str,
    ) -> Result<(), StoreError> {
        let url = self.table_url(
            "conversations",
            &[("id", eq(id)), ("user_id", eq(&session.user_id))],
        )?;
        let patch = ConversationPatch {
            title: Some(title),
            updated_at: now_rfc3339(),
        };
        Self::send_empty(self.authed(self.client.patch(url), session).json(&patch)).await
    }

    async fn delete_conversation(&self, session: &Session, id: i64) -> Result<(), StoreError> {
        let url = self.table_url(
            "conversations",
            &[("id", eq(id)), ("user_id", eq(&session.user_id))],
        )?;
        Self::send_empty(self.authed(self.client.delete(url), session)).await
    }

    async fn save_message(
        &self,
        session: &Session,
        mut message: MessageRecord,
    ) -> Result<MessageRecord, StoreError> {
        message.user_id = Some(session.user_id.clone());
        let url = self.table_url("messages", &[])?;
        let request = self
            .authed(self.client.post(url), session)
            .header("Prefer", "return=representation")
            .json(&message);
        let saved: Vec<MessageRecord> = Self::send_json(request).await?;
        let saved = saved
            .into_iter()
            .next()
            .ok_or(StoreError::MissingRow("saved message"))?;

        self.touch_conversation(session, message.conversation_id)
            .await?;
        Ok(saved)
    }

    async fn list_messages(
        &self,
        session: &Session,
        conversation_id: i64,
    ) -> Result<Vec<MessageRecord>, StoreError> {
        if self.get_conversation(session, conversation_id).await?.is_none() {
            return Err(StoreError::NotFound(format!("Conversation {conversation_id}")));
        }

        let url = self.table_url(
            "messages",
            &[
                ("select", "*,files(*)".to_string()),
                ("conversation_id", eq(conversation_id)),
                ("order", "timestamp.asc".to_string()),
            ],
        )?;
        Self::send_json(self.authed(self.client.get(url), session)).await
    }
}
