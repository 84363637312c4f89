//! Command-line interface parsing and dispatch.

pub mod ask;
pub mod auth;
pub mod chat;
pub mod conversations;
pub mod settings;

#[cfg(test)]
mod tests;

use std::error::Error;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use reqwest::Client;

use crate::core::app::build_http_client;
use crate::core::config::data::{path_display, Config};
use crate::core::config::settings::UserSettings;
use crate::core::config::store::SettingsStore;
use crate::core::health::check_backend;
use crate::core::keyring::SessionVault;
use crate::store::auth::AuthClient;
use crate::store::profiles::ProfilePatch;
use crate::store::{RestStore, StoreError};
use crate::utils::diagnostics;
use crate::utils::url::normalize_base_url;

const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    "\ncommit: ",
    env!("VERGEN_GIT_SHA"),
    " (",
    env!("VERGEN_GIT_DESCRIBE"),
    ")\nrustc: ",
    env!("VERGEN_RUSTC_SEMVER"),
);

#[derive(Parser)]
#[command(name = "ollamacode")]
#[command(version, long_version = LONG_VERSION)]
#[command(about = "Chat with a locally hosted LLM backend, with conversations kept in your hosted store")]
#[command(
    long_about = "OllamaCode streams answers from a local chat backend (POST /chat) and keeps \
your conversations, messages and attachments in a hosted store.\n\n\
Configuration:\n\
  config.toml          Store URL, anon key, health interval, settings path\n\
  settings.json        User preferences (see `ollamacode settings show`)\n\n\
Environment Variables:\n\
  OLLAMACODE_STORE_URL     Store project URL\n\
  OLLAMACODE_STORE_KEY     Store anon key\n\
  OLLAMACODE_BACKEND_URL   Chat backend URL (overrides backendUrl)\n\
  OLLAMACODE_NO_KEYRING    Set to 1 to keep sessions out of the OS keyring\n\
  OLLAMACODE_LOG           tracing filter, e.g. ollamacode=debug\n\n\
Commands inside chat:\n\
  /help                Show every slash command\n\
  /log <filename>      Write a transcript to the file\n\
  /quit                Leave"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Read config from this file instead of the platform config path
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Do not read or store the session in the OS keyring
    #[arg(long, global = true)]
    pub no_keyring: bool,

    /// Write diagnostics to this file instead of stderr
    #[arg(long, global = true, value_name = "FILE")]
    pub log_file: Option<PathBuf>,

    /// Append the conversation transcript to this file
    #[arg(short = 't', long, global = true, value_name = "FILE")]
    pub transcript: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the interactive chat (default)
    Chat {
        /// Open a stored conversation instead of starting a new one
        #[arg(long, value_name = "ID")]
        conversation: Option<i64>,
    },
    /// Ask one question and print the streamed answer
    Ask {
        /// Attach a file to the question
        #[arg(short = 'a', long, value_name = "FILE")]
        attach: Option<PathBuf>,
        /// Prompt text
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        prompt: Vec<String>,
    },
    /// Check whether the chat backend is reachable
    Ping,
    /// Create an account
    Signup {
        email: Option<String>,
        #[arg(long)]
        username: Option<String>,
        #[arg(long)]
        full_name: Option<String>,
    },
    /// Sign in with email and password
    Login { email: Option<String> },
    /// Sign out and forget the stored session
    Logout,
    /// Send a password reset email
    ResetPassword { email: Option<String> },
    /// Show the signed-in user and profile
    Whoami,
    /// Update profile fields
    Profile {
        #[arg(long)]
        username: Option<String>,
        #[arg(long)]
        full_name: Option<String>,
        #[arg(long, value_name = "URL")]
        avatar_url: Option<String>,
    },
    /// Manage stored conversations
    Conversations {
        #[command(subcommand)]
        command: ConversationCommands,
    },
    /// Show or change user settings
    Settings {
        #[command(subcommand)]
        command: Option<SettingsCommands>,
    },
}

#[derive(Subcommand)]
pub enum ConversationCommands {
    /// List conversations grouped by recency
    List,
    /// Print a conversation's messages
    Show { id: i64 },
    /// Create an empty conversation
    New { title: Option<String> },
    Rename {
        id: i64,
        #[arg(trailing_var_arg = true, required = true)]
        title: Vec<String>,
    },
    Delete { id: i64 },
    /// List the files attached to a message
    Files { message_id: i64 },
    /// Delete an attachment and its stored object
    DeleteFile { id: i64 },
}

#[derive(Subcommand)]
pub enum SettingsCommands {
    /// Print every setting (default)
    Show,
    Get { key: String },
    /// Set one key; values are parsed as JSON, falling back to a string
    Set {
        key: String,
        #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
        value: Vec<String>,
    },
    /// Restore every setting to its default
    Reset,
    /// Write the settings to a dated JSON file
    Export {
        #[arg(value_name = "DIR")]
        dir: Option<PathBuf>,
    },
    /// Merge settings from a JSON file over the defaults
    Import { file: PathBuf },
    /// Print the theme classes and CSS custom properties
    Appearance,
    /// Print the settings file location
    Path,
}

/// Everything a subcommand needs, resolved once from flags, config and
/// settings.
pub struct CliContext {
    pub config: Config,
    pub settings_store: SettingsStore,
    pub settings: UserSettings,
    pub client: Client,
    pub transcript: Option<String>,
}

impl CliContext {
    pub fn load(args: &Args) -> Result<Self, Box<dyn Error>> {
        let mut config = Config::load(args.config.as_deref())?;
        if args.no_keyring {
            config.use_keyring = Some(false);
        }
        let settings_store = SettingsStore::new(config.settings_file_path()?);
        // Installed before the settings are parsed so load warnings are kept.
        diagnostics::init(settings_store.peek_debug_mode(), args.log_file.as_deref())?;
        let settings = settings_store.load();
        let client = build_http_client(&settings)?;
        Ok(Self {
            config,
            settings_store,
            settings,
            client,
            transcript: args.transcript.clone(),
        })
    }

    /// `backend_url` from config or the environment wins over the user setting.
    pub fn backend_url(&self) -> String {
        normalize_base_url(
            self.config
                .backend_url
                .as_deref()
                .unwrap_or(&self.settings.backend_url),
        )
    }

    pub fn store(&self) -> Result<RestStore, StoreError> {
        RestStore::from_config(self.client.clone(), &self.config.store)
    }

    pub fn auth_client(&self) -> Result<AuthClient, StoreError> {
        Ok(AuthClient::for_store(&self.store()?))
    }

    pub fn vault(&self) -> SessionVault {
        let url = self.config.store.url.as_deref().unwrap_or_default();
        SessionVault::for_store(self.config.keyring_enabled(), url)
    }
}

pub fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async_main(args))
}

async fn async_main(args: Args) -> Result<(), Box<dyn Error>> {
    let ctx = CliContext::load(&args)?;

    match args.command.unwrap_or(Commands::Chat { conversation: None }) {
        Commands::Chat { conversation } => chat::run_chat(&ctx, conversation).await,
        Commands::Ask { attach, prompt } => ask::run_ask(&ctx, prompt, attach).await,
        Commands::Ping => run_ping(&ctx).await,
        Commands::Signup {
            email,
            username,
            full_name,
        } => auth::run_signup(&ctx, email, username, full_name).await,
        Commands::Login { email } => auth::run_login(&ctx, email).await,
        Commands::Logout => auth::run_logout(&ctx).await,
        Commands::ResetPassword { email } => auth::run_reset_password(&ctx, email).await,
        Commands::Whoami => auth::run_whoami(&ctx).await,
        Commands::Profile {
            username,
            full_name,
            avatar_url,
        } => {
            let patch = ProfilePatch {
                username,
                full_name,
                avatar_url,
            };
            auth::run_profile(&ctx, patch).await
        }
        Commands::Conversations { command } => conversations::run(&ctx, command).await,
        Commands::Settings { command } => {
            settings::run(&ctx, command.unwrap_or(SettingsCommands::Show))
        }
    }
}

async fn run_ping(ctx: &CliContext) -> Result<(), Box<dyn Error>> {
    match ctx.store() {
        Ok(store) => match store.test_connection().await {
            Ok(()) => println!("✅ Store reachable: {}", store.base_url()),
            Err(err) => eprintln!("⚠️  Store unreachable: {err}"),
        },
        Err(err) => eprintln!("⚠️  {err}"),
    }

    let url = ctx.backend_url();
    if check_backend(&ctx.client, &url, ctx.settings.request_timeout()).await {
        println!("✅ Backend online: {url}");
        Ok(())
    } else {
        eprintln!("❌ Backend offline: {url}");
        eprintln!(
            "Check backendUrl in {} or set OLLAMACODE_BACKEND_URL.",
            path_display(ctx.settings_store.path())
        );
        std::process::exit(1);
    }
}
