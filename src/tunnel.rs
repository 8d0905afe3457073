//! ngrok tunnel used when no public base URL is configured
//!
//! The agent runs as a child process; its local API is polled until the
//! public HTTPS URL of the tunnel shows up.

use crate::config::{
    get_tunnel_poll_max_retries, NGROK_API_URL, NGROK_PROGRAM, TUNNEL_POLL_INITIAL_BACKOFF_MS,
    TUNNEL_POLL_MAX_BACKOFF_MS,
};
use reqwest::Client as HttpClient;
use serde::Deserialize;
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::process::{Child, Command};
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::Retry;
use tracing::{debug, info};

/// Errors while provisioning a tunnel
#[derive(Debug, Error)]
pub enum TunnelError {
    /// The agent could not be started
    #[error("Failed to launch ngrok: {0}")]
    Spawn(#[source] std::io::Error),
    /// The agent API did not report a usable tunnel
    #[error("No public tunnel URL: {0}")]
    NoPublicUrl(String),
}

#[derive(Debug, Deserialize)]
struct TunnelList {
    tunnels: Vec<TunnelInfo>,
}

#[derive(Debug, Deserialize)]
struct TunnelInfo {
    public_url: String,
    #[serde(default)]
    proto: String,
}

/// A running ngrok agent forwarding to a local port
pub struct NgrokTunnel {
    // Killed when the tunnel is dropped
    _child: Child,
    public_url: String,
}

impl NgrokTunnel {
    /// Start the agent for `port` and wait for its public URL
    ///
    /// # Errors
    ///
    /// Returns `TunnelError::Spawn` if the agent cannot start and
    /// `TunnelError::NoPublicUrl` if no tunnel appears in time.
    pub async fn connect(port: u16, authtoken: Option<&str>) -> Result<Self, TunnelError> {
        let mut command = Command::new(NGROK_PROGRAM);
        command
            .args(["http", &port.to_string(), "--log", "stdout"])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        if let Some(authtoken) = authtoken.filter(|token| !token.is_empty()) {
            command.env("NGROK_AUTHTOKEN", authtoken);
        }

        let child = command.spawn().map_err(TunnelError::Spawn)?;
        info!(port, "ngrok agent started, waiting for tunnel");

        let http = HttpClient::new();
        let retry_strategy = ExponentialBackoff::from_millis(2)
            .factor(TUNNEL_POLL_INITIAL_BACKOFF_MS / 2)
            .max_delay(Duration::from_millis(TUNNEL_POLL_MAX_BACKOFF_MS))
            .map(jitter)
            .take(get_tunnel_poll_max_retries());

        let public_url = Retry::spawn(retry_strategy, || poll_public_url(&http)).await?;

        Ok(Self {
            _child: child,
            public_url,
        })
    }

    /// Public URL of the tunnel, without a trailing slash
    #[must_use]
    pub fn public_url(&self) -> &str {
        &self.public_url
    }
}

async fn poll_public_url(http: &HttpClient) -> Result<String, TunnelError> {
    let list: TunnelList = http
        .get(NGROK_API_URL)
        .send()
        .await
        .map_err(|e| TunnelError::NoPublicUrl(e.to_string()))?
        .json()
        .await
        .map_err(|e| TunnelError::NoPublicUrl(e.to_string()))?;

    debug!(tunnels = list.tunnels.len(), "Polled ngrok agent");
    pick_public_url(&list)
        .ok_or_else(|| TunnelError::NoPublicUrl("agent reports no https tunnel yet".to_string()))
}

fn pick_public_url(list: &TunnelList) -> Option<String> {
    list.tunnels
        .iter()
        .find(|tunnel| tunnel.proto == "https")
        .or_else(|| {
            list.tunnels
                .iter()
                .find(|tunnel| tunnel.public_url.starts_with("https://"))
        })
        .map(|tunnel| tunnel.public_url.trim_end_matches('/').to_string())
}
