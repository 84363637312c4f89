use std::time::Duration;

use reqwest::Client;
use tokio_util::sync::CancellationToken;

use crate::core::config::settings::UserSettings;
use crate::utils::logging::TranscriptLog;
use crate::utils::url::normalize_base_url;

/// Connection and stream bookkeeping owned by the [`App`](super::App).
pub struct SessionContext {
    pub client: Client,
    pub backend_url: String,
    pub logging: TranscriptLog,
    pub stream_cancel_token: Option<CancellationToken>,
    pub current_stream_id: u64,
}

impl SessionContext {
    pub fn new(client: Client, backend_url: &str, logging: TranscriptLog) -> Self {
        Self {
            client,
            backend_url: normalize_base_url(backend_url),
            logging,
            stream_cancel_token: None,
            current_stream_id: 0,
        }
    }
}

/// Build the HTTP client shared by the chat stream, the health check and the
/// store. `requestTimeout` bounds connection setup; streams themselves may
/// run longer.
pub fn build_http_client(settings: &UserSettings) -> Result<Client, reqwest::Error> {
    Client::builder()
        .connect_timeout(settings.request_timeout())
        .pool_idle_timeout(Duration::from_secs(90))
        .user_agent(concat!("ollamacode/", env!("CARGO_PKG_VERSION")))
        .build()
}
