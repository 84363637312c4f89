//! Authentication state as an explicit value passed to every store call.

use std::error::Error;
use std::fmt;

use chrono::{DateTime, Duration, Utc};

use crate::api::TokenResponse;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub user_id: String,
    pub email: Option<String>,
}

impl Session {
    /// Build a session from a token grant received at `now`.
    pub fn from_token_response(response: TokenResponse, now: DateTime<Utc>) -> Self {
        let expires_at = response
            .expires_at
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .or_else(|| {
                response
                    .expires_in
                    .map(|secs| now + Duration::seconds(secs))
            });
        Self {
            access_token: response.access_token,
            refresh_token: response.refresh_token,
            expires_at,
            user_id: response.user.id,
            email: response.user.email,
        }
    }

    /// True if the access token expires within `margin` of `now`.
    pub fn expires_within(&self, now: DateTime<Utc>, margin: Duration) -> bool {
        self.expires_at
            .map(|expires_at| expires_at - margin <= now)
            .unwrap_or(false)
    }

    pub fn display_name(&self) -> &str {
        self.email.as_deref().unwrap_or(&self.user_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum AuthState {
    #[default]
    Unauthenticated,
    Authenticating,
    Authenticated(Session),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// A transition was requested from a state that does not allow it.
    IllegalTransition {
        from: &'static str,
        action: &'static str,
    },
    NotAuthenticated,
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::IllegalTransition { from, action } => {
                write!(f, "cannot {action} while {from}")
            }
            SessionError::NotAuthenticated => write!(f, "not signed in"),
        }
    }
}

impl Error for SessionError {}

impl AuthState {
    pub fn name(&self) -> &'static str {
        match self {
            AuthState::Unauthenticated => "signed out",
            AuthState::Authenticating => "signing in",
            AuthState::Authenticated(_) => "signed in",
        }
    }

    /// Unauthenticated → Authenticating.
    pub fn begin(&mut self) -> Result<(), SessionError> {
        match self {
            AuthState::Unauthenticated => {
                *self = AuthState::Authenticating;
                Ok(())
            }
            other => Err(SessionError::IllegalTransition {
                from: other.name(),
                action: "begin sign-in",
            }),
        }
    }

    /// Authenticating → Authenticated. Also accepted while already
    /// authenticated, which is how refreshed tokens replace the old ones.
    pub fn complete(&mut self, session: Session) -> Result<(), SessionError> {
        match self {
            AuthState::Authenticating | AuthState::Authenticated(_) => {
                *self = AuthState::Authenticated(session);
                Ok(())
            }
            AuthState::Unauthenticated => Err(SessionError::IllegalTransition {
                from: "signed out",
                action: "complete sign-in",
            }),
        }
    }

    /// Authenticating → Unauthenticated.
    pub fn fail(&mut self) -> Result<(), SessionError> {
        match self {
            AuthState::Authenticating => {
                *self = AuthState::Unauthenticated;
                Ok(())
            }
            other => Err(SessionError::IllegalTransition {
                from: other.name(),
                action: "fail sign-in",
            }),
        }
    }

    /// Authenticated → Unauthenticated. Returns the session that was dropped.
    pub fn invalidate(&mut self) -> Result<Session, SessionError> {
        match std::mem::take(self) {
            AuthState::Authenticated(session) => Ok(session),
            other => {
                let from = other.name();
                *self = other;
                Err(SessionError::IllegalTransition {
                    from,
                    action: "sign out",
                })
            }
        }
    }

    pub fn session(&self) -> Result<&Session, SessionError> {
        match self {
            AuthState::Authenticated(session) => Ok(session),
            _ => Err(SessionError::NotAuthenticated),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, AuthState::Authenticated(_))
    }
}
