//! Account subcommands and session restore for the rest of the CLI.

use std::error::Error;
use std::io::IsTerminal;

use tracing::warn;

use super::CliContext;
use crate::core::keyring::KeyringAccessError;
use crate::core::session::{AuthState, Session};
use crate::store::auth::{AuthClient, SignUpOutcome};
use crate::store::profiles::ProfilePatch;
use crate::store::RestStore;
use crate::utils::prompt::{prompt_line, prompt_secret};

fn prompt_email(email: Option<String>) -> Result<String, Box<dyn Error>> {
    match email {
        Some(email) if !email.trim().is_empty() => Ok(email),
        _ => Ok(prompt_line("Email: ")?),
    }
}

pub(super) fn remember(ctx: &CliContext, session: &Session) {
    if let Err(err) = ctx.vault().store_refresh_token(&session.refresh_token) {
        warn!(error = %err, "Could not store the session; you will need to sign in again");
    }
}

/// Create the profile row on first sign-in. Failure is not fatal.
async fn ensure_profile(
    store: &RestStore,
    session: &Session,
    username: Option<&str>,
    full_name: Option<&str>,
) {
    if let Err(err) = store.ensure_profile(session, username, full_name).await {
        warn!(error = %err, "Could not create profile");
    }
}

/// A locked or unreachable keyring counts as nothing stored, so the caller
/// falls back to signing in.
pub(super) fn stored_refresh_token(
    lookup: Result<Option<String>, KeyringAccessError>,
) -> Result<Option<String>, KeyringAccessError> {
    match lookup {
        Err(err) if err.is_recoverable() => {
            warn!(error = %err, "Could not read the stored session");
            Ok(None)
        }
        other => other,
    }
}

/// Restore the last session from the keyring, refreshing its tokens.
/// Returns `Ok(None)` when nothing is stored.
pub async fn restore_session(
    ctx: &CliContext,
    auth: &AuthClient,
) -> Result<Option<(AuthState, Session)>, Box<dyn Error>> {
    let vault = ctx.vault();
    let Some(refresh_token) = stored_refresh_token(vault.refresh_token())? else {
        return Ok(None);
    };

    let mut state = AuthState::default();
    match auth.refresh(&mut state, &refresh_token).await {
        Ok(session) => {
            remember(ctx, &session);
            Ok(Some((state, session)))
        }
        Err(err) => {
            warn!(error = %err, "Stored session is no longer valid");
            if let Err(err) = vault.clear() {
                warn!(error = %err, "Could not clear stored session");
            }
            Ok(None)
        }
    }
}

/// A live session: restored from the keyring, or by signing in
/// interactively when a terminal is attached.
pub async fn require_session(
    ctx: &CliContext,
    auth: &AuthClient,
) -> Result<(AuthState, Session), Box<dyn Error>> {
    if let Some(restored) = restore_session(ctx, auth).await? {
        return Ok(restored);
    }
    if !std::io::stdin().is_terminal() {
        return Err("Not signed in. Run `ollamacode login` first.".into());
    }

    println!("Sign in to continue.");
    let email = prompt_email(None)?;
    let password = prompt_secret("Password: ")?;
    let mut state = AuthState::default();
    let session = auth.sign_in(&mut state, &email, &password).await?;
    remember(ctx, &session);
    Ok((state, session))
}

pub async fn run_signup(
    ctx: &CliContext,
    email: Option<String>,
    username: Option<String>,
    full_name: Option<String>,
) -> Result<(), Box<dyn Error>> {
    let store = ctx.store()?;
    let auth = AuthClient::for_store(&store);
    let email = prompt_email(email)?;
    let password = prompt_secret("Password: ")?;
    let confirm = prompt_secret("Confirm password: ")?;
    if password != confirm {
        return Err("Passwords do not match".into());
    }

    let mut state = AuthState::default();
    match auth
        .sign_up(
            &mut state,
            &email,
            &password,
            username.as_deref(),
            full_name.as_deref(),
        )
        .await?
    {
        SignUpOutcome::SignedIn(session) => {
            remember(ctx, &session);
            ensure_profile(&store, &session, username.as_deref(), full_name.as_deref()).await;
            println!("✅ Account created. Signed in as {}", session.display_name());
        }
        SignUpOutcome::ConfirmationRequired { email } => {
            println!("📧 Check {email} for a confirmation link, then run `ollamacode login`.");
        }
    }
    Ok(())
}

pub async fn run_login(ctx: &CliContext, email: Option<String>) -> Result<(), Box<dyn Error>> {
    let store = ctx.store()?;
    let auth = AuthClient::for_store(&store);
    let email = prompt_email(email)?;
    let password = prompt_secret("Password: ")?;

    let mut state = AuthState::default();
    let session = auth.sign_in(&mut state, &email, &password).await?;
    remember(ctx, &session);
    ensure_profile(&store, &session, None, None).await;

    println!("✅ Signed in as {}", session.display_name());
    if !ctx.vault().is_enabled() {
        println!("Keyring disabled; this session will not be remembered.");
    }
    Ok(())
}

pub async fn run_logout(ctx: &CliContext) -> Result<(), Box<dyn Error>> {
    let auth = ctx.auth_client()?;
    match restore_session(ctx, &auth).await? {
        Some((mut state, _)) => {
            let session = auth.sign_out(&mut state).await?;
            println!("👋 Signed out {}", session.display_name());
        }
        None => println!("Not signed in."),
    }
    ctx.vault().clear()?;
    Ok(())
}

pub async fn run_reset_password(
    ctx: &CliContext,
    email: Option<String>,
) -> Result<(), Box<dyn Error>> {
    let auth = ctx.auth_client()?;
    let email = prompt_email(email)?;
    auth.reset_password(&email).await?;
    println!("📧 If an account exists for {email}, a reset link is on its way.");
    Ok(())
}

pub async fn run_whoami(ctx: &CliContext) -> Result<(), Box<dyn Error>> {
    let store = ctx.store()?;
    let auth = AuthClient::for_store(&store);
    let Some((_, session)) = restore_session(ctx, &auth).await? else {
        println!("Not signed in.");
        return Ok(());
    };

    let user = auth.current_user(&session).await?;
    println!("User:  {}", user.id);
    if let Some(email) = &user.email {
        println!("Email: {email}");
    }
    match store.get_profile(&session).await {
        Ok(Some(profile)) => {
            if let Some(username) = profile.username.as_deref() {
                println!("Username: {username}");
            }
            if let Some(full_name) = profile.full_name.as_deref().filter(|s| !s.is_empty()) {
                println!("Name:  {full_name}");
            }
        }
        Ok(None) => println!("No profile yet."),
        Err(err) => warn!(error = %err, "Could not load profile"),
    }
    if let Some(expires_at) = session.expires_at {
        println!("Session expires: {}", expires_at.to_rfc3339());
    }
    Ok(())
}

pub async fn run_profile(ctx: &CliContext, patch: ProfilePatch) -> Result<(), Box<dyn Error>> {
    if patch.username.is_none() && patch.full_name.is_none() && patch.avatar_url.is_none() {
        return Err("Nothing to update. Pass --username, --full-name or --avatar-url.".into());
    }
    let store = ctx.store()?;
    let auth = AuthClient::for_store(&store);
    let (_, session) = require_session(ctx, &auth).await?;
    ensure_profile(&store, &session, None, None).await;

    let profile = store.update_profile(&session, &patch).await?;
    println!(
        "✅ Profile updated: {}",
        profile.username.as_deref().unwrap_or(session.display_name())
    );
    Ok(())
}
