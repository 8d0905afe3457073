//! Configuration and settings management
//!
//! Loads settings from config files and environment variables and defines
//! the fixed constants of the LINE bridge.

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Application settings loaded from environment variables
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    /// LINE channel access token (bearer token for the Messaging API)
    pub channel_access_token: String,
    /// LINE channel secret (webhook signature key)
    pub channel_secret: String,
    /// `OpenAI` API key for the completion service
    pub openai_api_key: String,

    /// Port the webhook server listens on
    #[serde(default = "default_port")]
    pub port: u16,
    /// Externally reachable base URL; a tunnel is provisioned when absent
    pub base_url: Option<String>,
    /// ngrok auth token used when provisioning a tunnel
    pub authtoken: Option<String>,

    /// Completion model identifier
    #[serde(default = "default_openai_model")]
    pub openai_model: String,
    /// Override for the completion API base URL
    pub openai_api_base: Option<String>,
    /// Upper bound on completion output tokens
    #[serde(default = "default_completion_max_tokens")]
    pub completion_max_tokens: u32,

    /// Timezone the cleanup sweep schedule is evaluated in
    #[serde(default = "default_sweep_timezone")]
    pub sweep_timezone: String,
    /// Cron expression of the cleanup sweep (5 or 7 fields)
    #[serde(default = "default_sweep_cron")]
    pub sweep_cron: String,

    /// Directory for downloaded artifacts, served under `/downloaded`
    #[serde(default = "default_downloaded_dir")]
    pub downloaded_dir: PathBuf,
    /// Directory for static assets, served under `/static`
    #[serde(default = "default_static_dir")]
    pub static_dir: PathBuf,
}

const fn default_port() -> u16 {
    3000
}

fn default_openai_model() -> String {
    DEFAULT_OPENAI_MODEL.to_string()
}

const fn default_completion_max_tokens() -> u32 {
    DEFAULT_COMPLETION_MAX_TOKENS
}

fn default_sweep_timezone() -> String {
    DEFAULT_SWEEP_TIMEZONE.to_string()
}

fn default_sweep_cron() -> String {
    DEFAULT_SWEEP_CRON.to_string()
}

fn default_downloaded_dir() -> PathBuf {
    PathBuf::from("downloaded")
}

fn default_static_dir() -> PathBuf {
    PathBuf::from("static")
}

/// Build the layered configuration source.
///
/// Order: `config/default`, `config/{RUN_MODE}`, `config/local`, then
/// `APP__`-prefixed and bare environment variables (empty values ignored).
///
/// # Errors
///
/// Returns a `ConfigError` if a present source cannot be read.
pub fn build_config() -> Result<Config, ConfigError> {
    let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

    Config::builder()
        .add_source(File::with_name("config/default").required(false))
        .add_source(File::with_name(&format!("config/{run_mode}")).required(false))
        // Local overrides, not checked into git
        .add_source(File::with_name("config/local").required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .add_source(Environment::default().ignore_empty(true))
        .build()
}

impl Settings {
    /// Create new settings by loading from environment and files
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use oxide_line_bot::config::Settings;
    ///
    /// let settings = Settings::new().expect("Failed to load configuration");
    /// ```
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if loading fails or a required key is missing.
    pub fn new() -> Result<Self, ConfigError> {
        let mut settings: Self = build_config()?.try_deserialize()?;

        // The ngrok agent's own variable name is accepted as well
        if settings.authtoken.is_none() {
            if let Ok(val) = std::env::var("NGROK_AUTHTOKEN") {
                if !val.is_empty() {
                    settings.authtoken = Some(val);
                }
            }
        }

        Ok(settings)
    }

    /// Configured base URL without a trailing slash, if one is set
    #[must_use]
    pub fn base_url(&self) -> Option<String> {
        self.base_url
            .as_deref()
            .map(|url| url.trim().trim_end_matches('/'))
            .filter(|url| !url.is_empty())
            .map(ToString::to_string)
    }

    /// Every configured secret, for log redaction
    #[must_use]
    pub fn secrets(&self) -> Vec<&str> {
        [
            Some(self.channel_access_token.as_str()),
            Some(self.channel_secret.as_str()),
            Some(self.openai_api_key.as_str()),
            self.authtoken.as_deref(),
        ]
        .into_iter()
        .flatten()
        .filter(|secret| !secret.is_empty())
        .collect()
    }
}

/// Default completion model
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";
/// Default upper bound on completion output tokens
pub const DEFAULT_COMPLETION_MAX_TOKENS: u32 = 500;
/// Default cleanup schedule: every day at midnight
pub const DEFAULT_SWEEP_CRON: &str = "0 0 * * *";
/// Default timezone for the cleanup schedule
pub const DEFAULT_SWEEP_TIMEZONE: &str = "Asia/Taipei";

/// LINE Messaging API base URL
pub const LINE_API_BASE: &str = "https://api.line.me";
/// LINE content API base URL (message content downloads)
pub const LINE_DATA_API_BASE: &str = "https://api-data.line.me";
/// Header carrying the webhook body signature
pub const LINE_SIGNATURE_HEADER: &str = "x-line-signature";

/// Public prefix for static assets
pub const STATIC_PREFIX: &str = "/static";
/// Public prefix for downloaded artifacts
pub const DOWNLOADED_PREFIX: &str = "/downloaded";
/// Artifact that survives every cleanup sweep
pub const SWEEP_SENTINEL: &str = ".gitkeep";
/// Width in pixels of generated image previews
pub const PREVIEW_WIDTH: u32 = 240;
/// ImageMagick binary used for previews
pub const TRANSCODER_PROGRAM: &str = "convert";

/// ngrok agent binary
pub const NGROK_PROGRAM: &str = "ngrok";
/// Local ngrok agent API listing active tunnels
pub const NGROK_API_URL: &str = "http://127.0.0.1:4040/api/tunnels";
/// Initial backoff between tunnel polls
pub const TUNNEL_POLL_INITIAL_BACKOFF_MS: u64 = 250;
/// Maximum backoff between tunnel polls
pub const TUNNEL_POLL_MAX_BACKOFF_MS: u64 = 2000;
/// Default number of tunnel polls before giving up
pub const TUNNEL_POLL_MAX_RETRIES: usize = 15;

/// Get the number of tunnel polls from env or default.
///
/// Environment variable: `TUNNEL_POLL_MAX_RETRIES`.
#[must_use]
pub fn get_tunnel_poll_max_retries() -> usize {
    std::env::var("TUNNEL_POLL_MAX_RETRIES")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(TUNNEL_POLL_MAX_RETRIES)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    fn settings() -> Settings {
        Settings {
            channel_access_token: "access".to_string(),
            channel_secret: "secret".to_string(),
            openai_api_key: "sk-test".to_string(),
            port: 3000,
            base_url: None,
            authtoken: None,
            openai_model: DEFAULT_OPENAI_MODEL.to_string(),
            openai_api_base: None,
            completion_max_tokens: DEFAULT_COMPLETION_MAX_TOKENS,
            sweep_timezone: DEFAULT_SWEEP_TIMEZONE.to_string(),
            sweep_cron: DEFAULT_SWEEP_CRON.to_string(),
            downloaded_dir: PathBuf::from("downloaded"),
            static_dir: PathBuf::from("static"),
        }
    }

    // Single test touching the environment to avoid races between tests
    #[test]
    fn test_config_env_loading() -> Result<(), Box<dyn std::error::Error>> {
        env::set_var("CHANNEL_ACCESS_TOKEN", "token-from-env");
        // Digits-only secrets must survive as strings, leading zeros included
        env::set_var("CHANNEL_SECRET", "0012345678");
        env::set_var("OPENAI_API_KEY", "sk-from-env");
        env::set_var("PORT", "8080");
        env::set_var("BASE_URL", "");

        let settings = Settings::new()?;
        assert_eq!(settings.channel_access_token, "token-from-env");
        assert_eq!(settings.channel_secret, "0012345678");
        assert_eq!(settings.port, 8080);
        assert_eq!(settings.base_url(), None);
        assert_eq!(settings.completion_max_tokens, DEFAULT_COMPLETION_MAX_TOKENS);
        assert_eq!(settings.sweep_timezone, DEFAULT_SWEEP_TIMEZONE);

        for key in [
            "CHANNEL_ACCESS_TOKEN",
            "CHANNEL_SECRET",
            "OPENAI_API_KEY",
            "PORT",
            "BASE_URL",
        ] {
            env::remove_var(key);
        }
        Ok(())
    }

    #[test]
    fn test_base_url_normalization() {
        let mut settings = settings();

        settings.base_url = Some("https://bot.example.com/".to_string());
        assert_eq!(
            settings.base_url().as_deref(),
            Some("https://bot.example.com")
        );

        settings.base_url = Some("   ".to_string());
        assert_eq!(settings.base_url(), None);
    }

    #[test]
    fn test_secrets_skip_empty_values() {
        let mut settings = settings();
        settings.authtoken = Some(String::new());

        assert_eq!(settings.secrets(), vec!["access", "secret", "sk-test"]);
    }
}
