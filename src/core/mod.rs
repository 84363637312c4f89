pub mod app;
pub mod attachment;
pub mod chat_stream;
pub mod config;
pub mod conversation;
pub mod health;
pub mod keyring;
pub mod message;
pub mod session;
