use std::io::{self, Write};
use std::sync::Arc;
use std::time::Duration;

use dotenvy::dotenv;
use gpts_relay_bot::bot::outbound::{Responder, TelegramResponder};
use gpts_relay_bot::config::{get_keep_alive_interval_secs, Settings};
use gpts_relay_bot::llm::openai::OpenAiProvider;
use gpts_relay_bot::llm::{CompletionClient, RetryPolicy};
use gpts_relay_bot::metrics::Metrics;
use gpts_relay_bot::web::AppState;
use gpts_relay_bot::{keepalive, web};
use regex::Regex;
use teloxide::prelude::*;
use reqwest::Url;
use tracing::{error, info};
use tracing_subscriber::{prelude::*, EnvFilter};

/// Regex patterns for redacting the bot token from log output.
///
/// The token appears in the webhook path and in Bot API URLs, so any log
/// line that echoes a request target could leak it.
struct RedactionPatterns {
    api_url: Regex,
    bare_token: Regex,
}

impl RedactionPatterns {
    /// Initialize all regex patterns
    ///
    /// # Errors
    ///
    /// Returns an error if any regex pattern is invalid
    fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            api_url: Regex::new(r"(bot|webhook/)[0-9]{8,10}:[A-Za-z0-9_-]+")?,
            bare_token: Regex::new(r"[0-9]{8,10}:[A-Za-z0-9_-]{35}")?,
        })
    }

    fn redact(&self, input: &str) -> String {
        let output = self
            .api_url
            .replace_all(input, "$1[TELEGRAM_TOKEN]")
            .to_string();
        self.bare_token
            .replace_all(&output, "[TELEGRAM_TOKEN]")
            .to_string()
    }
}

struct RedactingWriter<W: Write> {
    inner: W,
    patterns: Arc<RedactionPatterns>,
}

impl<W: Write> Write for RedactingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let s = String::from_utf8_lossy(buf);
        let redacted = self.patterns.redact(&s);
        self.inner.write_all(redacted.as_bytes())?;
        // We return the original buffer length to satisfy the contract,
        // even if the redacted string length differs.
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

impl<'a, F, W> tracing_subscriber::fmt::MakeWriter<'a> for RedactingMakeWriter<F>
where
    F: Fn() -> W + 'static,
    W: Write,
{
    type Writer = RedactingWriter<W>;

    fn make_writer(&'a self) -> Self::Writer {
        RedactingWriter {
            inner: (self.make_inner)(),
            patterns: self.patterns.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file
    dotenv().ok();

    // Initialize redaction patterns early (before logging)
    let patterns = Arc::new(RedactionPatterns::new().map_err(|e| {
        eprintln!("Failed to compile regex patterns: {e}");
        e
    })?);

    init_logging(patterns);

    info!("Starting GPTS relay bot...");

    let settings = init_settings();
    let metrics = Arc::new(Metrics::new());

    let provider = Arc::new(OpenAiProvider::new(&settings));
    let completions = CompletionClient::new(provider, Arc::clone(&metrics), RetryPolicy::from_env());
    info!("Completion client initialized.");

    let bot = Bot::new(settings.telegram_token.clone());
    register_webhook(&bot, &settings).await;

    keepalive::spawn(
        settings.webhook_url.clone(),
        Duration::from_secs(get_keep_alive_interval_secs()),
    );

    let responder: Arc<dyn Responder> = Arc::new(TelegramResponder::new(bot));
    let state = Arc::new(AppState {
        settings,
        metrics,
        completions,
        responder,
    });

    web::run(state).await
}

fn init_logging(patterns: Arc<RedactionPatterns>) {
    let make_writer = RedactingMakeWriter {
        make_inner: io::stderr,
        patterns,
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(make_writer))
        .init();
}

fn init_settings() -> Arc<Settings> {
    match Settings::new() {
        Ok(s) => {
            info!("Configuration loaded successfully.");
            Arc::new(s)
        }
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    }
}

/// Register this service's endpoint with Telegram so updates arrive over
/// the webhook instead of long polling.
async fn register_webhook(bot: &Bot, settings: &Settings) {
    let endpoint = settings.webhook_endpoint();
    let url = match Url::parse(&endpoint) {
        Ok(url) => url,
        Err(e) => {
            error!("Invalid webhook URL {}: {}", settings.webhook_url, e);
            std::process::exit(1);
        }
    };

    match bot.set_webhook(url).await {
        Ok(_) => info!("Webhook registered."),
        Err(e) => {
            error!("Failed to register webhook: {}", e);
            std::process::exit(1);
        }
    }
}
