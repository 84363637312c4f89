//! Backend reachability check and the periodic monitor that gates sending.

use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::api::PingResponse;
use crate::utils::url::construct_api_url;

const PING_ENDPOINT: &str = "ping";

/// One check: online iff the backend answers 2xx with `{"status":"ok"}`.
pub async fn check_backend(client: &reqwest::Client, base_url: &str, timeout: Duration) -> bool {
    let url = construct_api_url(base_url, PING_ENDPOINT);
    let response = match client.get(&url).timeout(timeout).send().await {
        Ok(response) => response,
        Err(err) => {
            debug!(url = %url, error = %err, "Backend ping failed");
            return false;
        }
    };

    if !response.status().is_success() {
        debug!(url = %url, status = %response.status(), "Backend ping returned an error status");
        return false;
    }

    match response.json::<PingResponse>().await {
        Ok(body) => body.status.as_deref() == Some("ok"),
        Err(err) => {
            debug!(url = %url, error = %err, "Backend ping body was not recognized");
            false
        }
    }
}

/// Periodic health check publishing the online flag on a watch channel.
/// The flag starts offline so nothing is sent before the first check lands.
pub struct BackendMonitor {
    status: watch::Receiver<bool>,
    cancel_token: CancellationToken,
    handle: JoinHandle<()>,
}

impl BackendMonitor {
    pub fn spawn(
        client: reqwest::Client,
        base_url: String,
        interval: Duration,
        timeout: Duration,
    ) -> Self {
        let (tx, rx) = watch::channel(false);
        let cancel_token = CancellationToken::new();
        let token = cancel_token.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                let online = tokio::select! {
                    _ = token.cancelled() => break,
                    online = check_backend(&client, &base_url, timeout) => online,
                };

                let changed = tx.send_if_modified(|current| {
                    if *current != online {
                        *current = online;
                        true
                    } else {
                        false
                    }
                });
                if changed {
                    info!(online, url = %base_url, "Backend status changed");
                }
                if tx.is_closed() {
                    break;
                }
            }
        });

        Self {
            status: rx,
            cancel_token,
            handle,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.status.clone()
    }

    pub async fn shutdown(self) {
        self.cancel_token.cancel();
        let _ = self.handle.await;
    }
}
