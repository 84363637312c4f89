use serde::Serialize;
use tracing::debug;

use super::rest::{eq, now_rfc3339, RestStore};
use super::StoreError;
use crate::api::ProfileRecord;
use crate::core::session::Session;

#[derive(Debug, Serialize)]
struct NewProfile<'a> {
    id: &'a str,
    email: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    username: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    full_name: Option<&'a str>,
}

/// Columns a user may change on their own profile.
#[derive(Debug, Default, Serialize)]
pub struct ProfilePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

impl RestStore {
    pub async fn get_profile(&self, session: &Session) -> Result<Option<ProfileRecord>, StoreError> {
        let url = self.table_url(
            "profiles",
            &[("select", "*".to_string()), ("id", eq(&session.user_id))],
        )?;
        let rows: Vec<ProfileRecord> =
            Self::send_json(self.authed(self.client().get(url), session)).await?;
        Ok(rows.into_iter().next())
    }

    /// Create the profile row if it does not exist yet, then read it back.
    /// Calling this repeatedly is safe: an existing row is left unchanged.
    pub async fn ensure_profile(
        &self,
        session: &Session,
        username: Option<&str>,
        full_name: Option<&str>,
    ) -> Result<ProfileRecord, StoreError> {
        let email = session.email.as_deref().unwrap_or_default();
        let url = self.table_url("profiles", &[("on_conflict", "id".to_string())])?;
        let body = NewProfile {
            id: &session.user_id,
            email,
            username,
            full_name,
        };
        let request = self
            .authed(self.client().post(url), session)
            .header("Prefer", "resolution=ignore-duplicates,return=minimal")
            .json(&body);
        Self::send_empty(request).await?;
        debug!(user_id = %session.user_id, "Profile ensured");

        self.get_profile(session)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("Profile {}", session.user_id)))
    }

    pub async fn update_profile(
        &self,
        session: &Session,
        patch: &ProfilePatch,
    ) -> Result<ProfileRecord, StoreError> {
        let url = self.table_url("profiles", &[("id", eq(&session.user_id))])?;
        let mut body = serde_json::to_value(patch)?;
        if let Some(map) = body.as_object_mut() {
            map.insert("updated_at".into(), serde_json::Value::String(now_rfc3339()));
        }
        let request = self
            .authed(self.client().patch(url), session)
            .header("Prefer", "return=representation")
            .json(&body);
        let rows: Vec<ProfileRecord> = Self::send_json(request).await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| StoreError::NotFound(format!("Profile {}", session.user_id)))
    }
}
