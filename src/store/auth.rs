//! Identity service client. Every call that changes who is signed in takes
//! the caller's [`AuthState`] and drives its transitions.

use std::error::Error;
use std::fmt;

use chrono::Utc;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use super::{extract_error_message, RestStore};
use crate::api::{
    AuthUserRecord, PasswordGrant, RecoverRequest, RefreshGrant, SignUpMetadata, SignUpRequest,
    TokenResponse,
};
use crate::core::session::{AuthState, Session, SessionError};
use crate::utils::url::{construct_api_url, normalize_base_url};

#[derive(Debug)]
pub enum AuthError {
    Http(reqwest::Error),
    /// The identity service refused the request.
    Rejected { status: u16, message: String },
    Decode(serde_json::Error),
    InvalidInput(&'static str),
    Session(SessionError),
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthError::Http(err) => write!(f, "Auth request failed: {err}"),
            AuthError::Rejected { status, message } => {
                write!(f, "Auth service returned HTTP {status}: {message}")
            }
            AuthError::Decode(err) => write!(f, "Unexpected auth response: {err}"),
            AuthError::InvalidInput(what) => write!(f, "{what}"),
            AuthError::Session(err) => write!(f, "{err}"),
        }
    }
}

impl Error for AuthError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            AuthError::Http(err) => Some(err),
            AuthError::Decode(err) => Some(err),
            AuthError::Session(err) => Some(err),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for AuthError {
    fn from(err: reqwest::Error) -> Self {
        AuthError::Http(err)
    }
}

impl From<serde_json::Error> for AuthError {
    fn from(err: serde_json::Error) -> Self {
        AuthError::Decode(err)
    }
}

impl From<SessionError> for AuthError {
    fn from(err: SessionError) -> Self {
        AuthError::Session(err)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SignUpOutcome {
    /// The account is usable right away.
    SignedIn(Session),
    /// The service sent a confirmation email; sign in after confirming.
    ConfirmationRequired { email: String },
}

/// Lowercase and trim an email, rejecting obviously malformed input.
pub fn normalize_email(email: &str) -> Result<String, AuthError> {
    let email = email.trim().to_lowercase();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() => Ok(email),
        _ => Err(AuthError::InvalidInput("Enter a valid email address")),
    }
}

fn email_local_part(email: &str) -> &str {
    email.split('@').next().unwrap_or(email)
}

#[derive(Clone)]
pub struct AuthClient {
    client: Client,
    base_url: String,
    anon_key: String,
}

impl AuthClient {
    pub fn new(client: Client, base_url: &str, anon_key: impl Into<String>) -> Self {
        Self {
            client,
            base_url: normalize_base_url(base_url),
            anon_key: anon_key.into(),
        }
    }

    pub fn for_store(store: &RestStore) -> Self {
        Self::new(store.client().clone(), store.base_url(), store.anon_key())
    }

    fn url(&self, endpoint: &str) -> String {
        construct_api_url(&self.base_url, &format!("auth/v1/{endpoint}"))
    }

    fn post(&self, endpoint: &str) -> RequestBuilder {
        self.client
            .post(self.url(endpoint))
            .header("apikey", &self.anon_key)
    }

    async fn check(response: Response) -> Result<Response, AuthError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(AuthError::Rejected {
            status: status.as_u16(),
            message: extract_error_message(&body),
        })
    }

    async fn send_json<T: DeserializeOwned>(builder: RequestBuilder) -> Result<T, AuthError> {
        let response = Self::check(builder.send().await?).await?;
        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }

    /// Register a new account. `username` defaults to the email's local
    /// part and `full_name` to an empty string.
    pub async fn sign_up(
        &self,
        state: &mut AuthState,
        email: &str,
        password: &str,
        username: Option<&str>,
        full_name: Option<&str>,
    ) -> Result<SignUpOutcome, AuthError> {
        let email = normalize_email(email)?;
        if password.is_empty() {
            return Err(AuthError::InvalidInput("Password must not be empty"));
        }
        let username = username
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| email_local_part(&email))
            .to_string();
        let body = SignUpRequest {
            email: &email,
            password,
            data: SignUpMetadata {
                username,
                full_name: full_name.unwrap_or_default().trim().to_string(),
            },
        };

        state.begin()?;
        let value: Result<serde_json::Value, AuthError> =
            Self::send_json(self.post("signup").json(&body)).await;
        let value = match value {
            Ok(value) => value,
            Err(err) => {
                state.fail()?;
                return Err(err);
            }
        };

        // With email confirmation on, the service answers with the user only.
        if value.get("access_token").is_none() {
            state.fail()?;
            info!(email = %email, "Sign-up awaiting email confirmation");
            return Ok(SignUpOutcome::ConfirmationRequired { email });
        }
        match serde_json::from_value::<TokenResponse>(value) {
            Ok(tokens) => {
                let session = Session::from_token_response(tokens, Utc::now());
                state.complete(session.clone())?;
                info!(user_id = %session.user_id, "Signed up");
                Ok(SignUpOutcome::SignedIn(session))
            }
            Err(err) => {
                state.fail()?;
                Err(err.into())
            }
        }
    }

    pub async fn sign_in(
        &self,
        state: &mut AuthState,
        email: &str,
        password: &str,
    ) -> Result<Session, AuthError> {
        let email = normalize_email(email)?;
        if password.is_empty() {
            return Err(AuthError::InvalidInput("Password must not be empty"));
        }
        state.begin()?;
        let request = self
            .post("token?grant_type=password")
            .json(&PasswordGrant {
                email: &email,
                password,
            });
        self.finish_grant(state, request).await
    }

    /// Exchange a refresh token for a new session. Works both for restoring a
    /// signed-out state and for renewing a live session.
    pub async fn refresh(
        &self,
        state: &mut AuthState,
        refresh_token: &str,
    ) -> Result<Session, AuthError> {
        if !state.is_authenticated() {
            state.begin()?;
        }
        let request = self
            .post("token?grant_type=refresh_token")
            .json(&RefreshGrant { refresh_token });
        self.finish_grant(state, request).await
    }

    async fn finish_grant(
        &self,
        state: &mut AuthState,
        request: RequestBuilder,
    ) -> Result<Session, AuthError> {
        match Self::send_json::<TokenResponse>(request).await {
            Ok(tokens) => {
                let session = Session::from_token_response(tokens, Utc::now());
                state.complete(session.clone())?;
                debug!(user_id = %session.user_id, "Token grant accepted");
                Ok(session)
            }
            Err(err) => {
                if matches!(state, AuthState::Authenticating) {
                    state.fail()?;
                }
                Err(err)
            }
        }
    }

    /// Revoke the session server-side, then drop it locally. The local
    /// session is dropped even when the server call fails.
    pub async fn sign_out(&self, state: &mut AuthState) -> Result<Session, AuthError> {
        let access_token = state.session()?.access_token.clone();
        let request = self.post("logout").bearer_auth(&access_token);
        match request.send().await {
            Ok(response) => {
                if let Err(err) = Self::check(response).await {
                    warn!(error = %err, "Server sign-out failed; signing out locally");
                }
            }
            Err(err) => warn!(error = %err, "Server sign-out failed; signing out locally"),
        }
        Ok(state.invalidate()?)
    }

    pub async fn reset_password(&self, email: &str) -> Result<(), AuthError> {
        let email = normalize_email(email)?;
        let request = self.post("recover").json(&RecoverRequest { email: &email });
        Self::check(request.send().await?).await?;
        info!(email = %email, "Password reset requested");
        Ok(())
    }

    pub async fn current_user(&self, session: &Session) -> Result<AuthUserRecord, AuthError> {
        let request = self
            .client
            .get(self.url("user"))
            .header("apikey", &self.anon_key)
            .bearer_auth(&session.access_token);
        Self::send_json(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::test_utils::{spawn_mock_server, test_client, test_session, MockResponse};

    const TOKENS: &str = r#"{
        "access_token": "jwt-new",
        "refresh_token": "refresh-new",
        "expires_in": 3600,
        "user": { "id": "user-1", "email": "ana@example.com" }
    }"#;

    #[test]
    fn normalizes_email() {
        assert_eq!(normalize_email("  Ana@Example.COM ").unwrap(), "ana@example.com");
        assert!(matches!(normalize_email("ana"), Err(AuthError::InvalidInput(_))));
        assert!(matches!(normalize_email("@example.com"), Err(AuthError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn sign_in_completes_state_with_session() {
        let server = spawn_mock_server(vec![MockResponse::json(200, TOKENS)]).await;
        let auth = AuthClient::new(test_client(), &server.base_url, "anon");
        let mut state = AuthState::default();

        let session = auth
            .sign_in(&mut state, " Ana@Example.com", "secret")
            .await
            .unwrap();
        assert_eq!(session.access_token, "jwt-new");
        assert!(session.expires_at.is_some());
        assert_eq!(state.session().unwrap(), &session);

        let requests = server.requests().await;
        assert_eq!(
            requests[0].request_line,
            "POST /auth/v1/token?grant_type=password HTTP/1.1"
        );
        assert_eq!(requests[0].header("apikey"), Some("anon"));
        assert_eq!(
            requests[0].json(),
            serde_json::json!({ "email": "ana@example.com", "password": "secret" })
        );
    }

    #[tokio::test]
    async fn rejected_sign_in_returns_to_signed_out() {
        let server = spawn_mock_server(vec![MockResponse::json(
            400,
            r#"{"error":"invalid_grant","error_description":"Invalid login credentials"}"#,
        )])
        .await;
        let auth = AuthClient::new(test_client(), &server.base_url, "anon");
        let mut state = AuthState::default();

        let err = auth.sign_in(&mut state, "ana@example.com", "bad").await.unwrap_err();
        match err {
            AuthError::Rejected { status, message } => {
                assert_eq!(status, 400);
                assert_eq!(message, "Invalid login credentials");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(state, AuthState::Unauthenticated);
    }

    #[tokio::test]
    async fn sign_up_defaults_username_to_email_local_part() {
        let server = spawn_mock_server(vec![MockResponse::json(
            200,
            r#"{"id":"user-9","email":"novo@example.com"}"#,
        )])
        .await;
        let auth = AuthClient::new(test_client(), &server.base_url, "anon");
        let mut state = AuthState::default();

        let outcome = auth
            .sign_up(&mut state, "Novo@Example.com ", "secret", None, None)
            .await
            .unwrap();
        assert_eq!(
            outcome,
            SignUpOutcome::ConfirmationRequired {
                email: "novo@example.com".into()
            }
        );
        assert_eq!(state, AuthState::Unauthenticated);

        let body = server.requests().await[0].json();
        assert_eq!(body["email"], "novo@example.com");
        assert_eq!(body["data"]["username"], "novo");
        assert_eq!(body["data"]["full_name"], "");
    }

    #[tokio::test]
    async fn sign_up_with_immediate_session_signs_in() {
        let server = spawn_mock_server(vec![MockResponse::json(200, TOKENS)]).await;
        let auth = AuthClient::new(test_client(), &server.base_url, "anon");
        let mut state = AuthState::default();

        let outcome = auth
            .sign_up(&mut state, "ana@example.com", "secret", Some("ana_s"), Some("Ana"))
            .await
            .unwrap();
        assert!(matches!(outcome, SignUpOutcome::SignedIn(_)));
        assert!(state.is_authenticated());
    }

    #[tokio::test]
    async fn refresh_replaces_live_session() {
        let server = spawn_mock_server(vec![MockResponse::json(200, TOKENS)]).await;
        let auth = AuthClient::new(test_client(), &server.base_url, "anon");
        let mut state = AuthState::Authenticated(test_session());

        let session = auth.refresh(&mut state, "refresh").await.unwrap();
        assert_eq!(session.refresh_token, "refresh-new");
        assert_eq!(state.session().unwrap().access_token, "jwt-new");

        let requests = server.requests().await;
        assert_eq!(
            requests[0].request_line,
            "POST /auth/v1/token?grant_type=refresh_token HTTP/1.1"
        );
        assert_eq!(requests[0].json()["refresh_token"], "refresh");
    }

    #[tokio::test]
    async fn sign_out_invalidates_even_when_server_fails() {
        let server = spawn_mock_server(vec![MockResponse::json(500, r#"{"msg":"down"}"#)]).await;
        let auth = AuthClient::new(test_client(), &server.base_url, "anon");
        let mut state = AuthState::Authenticated(test_session());

        let dropped = auth.sign_out(&mut state).await.unwrap();
        assert_eq!(dropped.user_id, "user-1");
        assert_eq!(state, AuthState::Unauthenticated);

        let requests = server.requests().await;
        assert_eq!(requests[0].request_line, "POST /auth/v1/logout HTTP/1.1");
        assert_eq!(requests[0].header("authorization"), Some("Bearer jwt-token"));
    }

    #[tokio::test]
    async fn sign_out_requires_a_session() {
        let auth = AuthClient::new(test_client(), "http://127.0.0.1:9", "anon");
        let mut state = AuthState::default();
        let err = auth.sign_out(&mut state).await.unwrap_err();
        assert!(matches!(err, AuthError::Session(SessionError::NotAuthenticated)));
    }

    #[tokio::test]
    async fn current_user_sends_bearer_token() {
        let server = spawn_mock_server(vec![MockResponse::json(
            200,
            r#"{"id":"user-1","email":"ana@example.com","role":"authenticated"}"#,
        )])
        .await;
        let auth = AuthClient::new(test_client(), &server.base_url, "anon");
        let user = auth.current_user(&test_session()).await.unwrap();
        assert_eq!(user.email.as_deref(), Some("ana@example.com"));

        let requests = server.requests().await;
        assert_eq!(requests[0].request_line, "GET /auth/v1/user HTTP/1.1");
        assert_eq!(requests[0].header("authorization"), Some("Bearer jwt-token"));
    }

    #[tokio::test]
    async fn reset_password_posts_recover() {
        let server = spawn_mock_server(vec![MockResponse::json(200, "{}")]).await;
        let auth = AuthClient::new(test_client(), &server.base_url, "anon");
        auth.reset_password("ana@example.com").await.unwrap();
        let requests = server.requests().await;
        assert_eq!(requests[0].request_line, "POST /auth/v1/recover HTTP/1.1");
    }
}
