use anyhow::Context;
use dotenvy::dotenv;
use oxide_line_bot::bot::artifacts::ArtifactStore;
use oxide_line_bot::bot::sweep::{CleanupSweep, SweepSchedule};
use oxide_line_bot::bot::transcode::ImageMagickTranscoder;
use oxide_line_bot::bot::{BotContext, Dispatcher};
use oxide_line_bot::config::Settings;
use oxide_line_bot::line::LineClient;
use oxide_line_bot::llm::OpenAiProvider;
use oxide_line_bot::server::{create_router, AppState};
use oxide_line_bot::tunnel::NgrokTunnel;
use regex::Regex;
use std::io::{self, Write};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{prelude::*, EnvFilter};

/// Regex patterns for redacting sensitive data
struct RedactionPatterns {
    bearer: Regex,
    secrets: Vec<Regex>,
}

impl RedactionPatterns {
    /// Compile the bearer pattern plus one literal pattern per configured secret
    ///
    /// # Errors
    ///
    /// Returns an error if any regex pattern is invalid
    fn new(secrets: &[&str]) -> Result<Self, regex::Error> {
        Ok(Self {
            bearer: Regex::new(r"(Bearer\s+)[A-Za-z0-9._~+/=-]+")?,
            secrets: secrets
                .iter()
                .map(|secret| Regex::new(&regex::escape(secret)))
                .collect::<Result<_, _>>()?,
        })
    }

    fn redact(&self, input: &str) -> String {
        let mut output = self.bearer.replace_all(input, "$1[MASKED]").to_string();
        for secret in &self.secrets {
            output = secret.replace_all(&output, "[MASKED]").to_string();
        }
        output
    }
}

struct RedactingWriter<W: Write> {
    inner: W,
    patterns: Arc<RedactionPatterns>,
}

impl<W: Write> RedactingWriter<W> {
    const fn new(inner: W, patterns: Arc<RedactionPatterns>) -> Self {
        Self { inner, patterns }
    }
}

impl<W: Write> Write for RedactingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let s = String::from_utf8_lossy(buf);
        let redacted = self.patterns.redact(&s);
        self.inner.write_all(redacted.as_bytes())?;
        // Masking changes the byte count; the caller only tracks its own input
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

struct RedactingMakeWriter<F> {
    make_inner: F,
    patterns: Arc<RedactionPatterns>,
}

impl<F> RedactingMakeWriter<F> {
    const fn new(make_inner: F, patterns: Arc<RedactionPatterns>) -> Self {
        Self {
            make_inner,
            patterns,
        }
    }
}

impl<'a, F, W> tracing_subscriber::fmt::MakeWriter<'a> for RedactingMakeWriter<F>
where
    F: Fn() -> W + 'static,
    W: Write,
{
    type Writer = RedactingWriter<W>;

    fn make_writer(&'a self) -> Self::Writer {
        RedactingWriter::new((self.make_inner)(), self.patterns.clone())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file
    dotenv().ok();

    // Settings come first: their secrets feed the redaction patterns
    let settings = init_settings();

    let patterns = Arc::new(RedactionPatterns::new(&settings.secrets()).map_err(|e| {
        eprintln!("Failed to compile regex patterns: {e}");
        e
    })?);
    init_logging(patterns);

    info!("Starting Oxide LINE bot...");

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", settings.port))
        .await
        .with_context(|| format!("Failed to bind port {}", settings.port))?;

    // The tunnel must outlive the server; dropping it kills the agent
    let (base_url, _tunnel) = match settings.base_url() {
        Some(base_url) => (base_url, None),
        None => {
            info!("BASE_URL not set, starting ngrok tunnel");
            let tunnel = NgrokTunnel::connect(settings.port, settings.authtoken.as_deref())
                .await
                .context("Failed to provision a public URL")?;
            (tunnel.public_url().to_string(), Some(tunnel))
        }
    };
    info!(base_url = %base_url, "Public base URL resolved");

    tokio::fs::create_dir_all(&settings.downloaded_dir)
        .await
        .with_context(|| {
            format!(
                "Failed to create {}",
                settings.downloaded_dir.display()
            )
        })?;

    let dispatcher = init_dispatcher(&settings, &base_url);

    let schedule = SweepSchedule::parse(&settings.sweep_cron, &settings.sweep_timezone)?;
    let sweep = CleanupSweep::new(&settings.downloaded_dir, schedule).start();

    let router = create_router(
        AppState::new(dispatcher, &settings.channel_secret),
        &settings.static_dir,
        &settings.downloaded_dir,
    );

    info!(port = settings.port, "Bot is running...");
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    sweep.stop().await;
    info!("Shutdown complete");
    Ok(())
}

fn init_logging(patterns: Arc<RedactionPatterns>) {
    let make_writer = RedactingMakeWriter::new(io::stderr, patterns);

    let debug_mode = std::env::var("DEBUG_MODE")
        .map(|v| v == "true" || v == "1")
        .unwrap_or(false);

    let filter = if debug_mode {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(
                "oxide_line_bot=info,tower_http=info,hyper=warn,h2=error,reqwest=warn,tokio=warn,tower=warn,async_openai=warn",
            )
        })
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(make_writer))
        .init();
}

fn init_settings() -> Settings {
    match Settings::new() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    }
}

fn init_dispatcher(settings: &Settings, base_url: &str) -> Dispatcher {
    let platform = Arc::new(LineClient::new(settings.channel_access_token.clone()));
    let completion = Arc::new(OpenAiProvider::new(
        settings.openai_api_key.clone(),
        settings.openai_model.clone(),
        settings.openai_api_base.clone(),
    ));
    info!(model = %settings.openai_model, "Completion provider initialized.");

    let ctx = BotContext::new(
        platform,
        completion,
        Arc::new(ImageMagickTranscoder::default()),
        ArtifactStore::new(&settings.downloaded_dir, base_url),
        settings.completion_max_tokens,
    );
    Dispatcher::new(ctx)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
