//! OllamaCode is a terminal chat client for a locally hosted LLM backend,
//! with conversations, messages and attachments kept in a hosted store.
//!
//! The crate is organized around a small set of collaborating layers:
//! - [`core`] owns the chat state container, stream decoding, settings,
//!   health monitoring, attachments and the session lifecycle.
//! - [`store`] talks to the hosted store: conversation and message tables,
//!   file storage, profiles and the identity endpoints.
//! - [`commands`] implements the slash commands used by the chat REPL.
//! - [`api`] defines the wire payloads for the backend and the store.
//!
//! Runtime entrypoints live in the binary crate (`src/main.rs`) and route
//! through [`crate::cli::main`], which resolves configuration and dispatches
//! into the REPL or the one-shot subcommands.

pub mod api;
pub mod cli;
pub mod commands;
pub mod core;
pub mod store;
pub mod utils;
