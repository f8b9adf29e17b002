use dotenvy::dotenv;
use oxide_relay::bot;
use oxide_relay::config::Settings;
use oxide_relay::relay::orchestrator::Orchestrator;
use bot::handlers::Command;
use regex::Regex;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::sync::{Arc, Mutex};
use teloxide::dispatching::UpdateHandler;
use teloxide::prelude::*;
use tokio::sync::Semaphore;
use tracing::{error, info};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::{prelude::*, EnvFilter};

/// Append-only diagnostic log, unless `LOG_FILE` overrides it
const DEFAULT_LOG_FILE: &str = "bot.log";

/// Regex patterns for redacting the bot token from logs
struct RedactionPatterns {
    token1: Regex,
    token2: Regex,
    token3: Regex,
}

impl RedactionPatterns {
    /// Initialize all regex patterns
    ///
    /// # Errors
    ///
    /// Returns an error if any regex pattern is invalid
    fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            token1: Regex::new(r"(https?://[^/]+/bot)([0-9]+:[A-Za-z0-9_-]+)(/['\s]*)")?,
            token2: Regex::new(r"([0-9]{8,10}:[A-Za-z0-9_-]{35})")?,
            token3: Regex::new(r"(bot[0-9]{8,10}:)[A-Za-z0-9_-]+")?,
        })
    }

    fn redact(&self, input: &str) -> String {
        let mut output = input.to_string();
        output = self
            .token1
            .replace_all(&output, "$1[TELEGRAM_TOKEN]$3")
            .to_string();
        output = self
            .token2
            .replace_all(&output, "[TELEGRAM_TOKEN]")
            .to_string();
        output = self
            .token3
            .replace_all(&output, "$1[TELEGRAM_TOKEN]")
            .to_string();
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
        // Report the original length; the redacted text may differ in size
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

struct RedactingMakeWriter<M> {
    inner: M,
    patterns: Arc<RedactionPatterns>,
}

impl<M> RedactingMakeWriter<M> {
    const fn new(inner: M, patterns: Arc<RedactionPatterns>) -> Self {
        Self { inner, patterns }
    }
}

impl<'a, M> MakeWriter<'a> for RedactingMakeWriter<M>
where
    M: MakeWriter<'a>,
{
    type Writer = RedactingWriter<M::Writer>;

    fn make_writer(&'a self) -> Self::Writer {
        RedactingWriter::new(self.inner.make_writer(), self.patterns.clone())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file
    dotenv().ok();

    // Initialize redaction patterns early (before logging)
    let patterns = Arc::new(RedactionPatterns::new().map_err(|e| {
        eprintln!("Failed to compile regex patterns: {e}");
        e
    })?);

    init_logging(patterns);

    info!("Starting Oxide Relay bot...");

    let settings = init_settings();
    let orchestrator = init_orchestrator(&settings);
    let limiter = Arc::new(Semaphore::new(settings.max_concurrent_requests.max(1)));
    info!(
        "Relay initialized (staging: {}, concurrency: {}, renderer: {}, size cap: {} bytes)",
        settings.staging_dir.display(),
        settings.max_concurrent_requests,
        settings.renderer_url.as_deref().unwrap_or("disabled"),
        settings.max_file_size()
    );

    let bot = init_bot(&settings);
    let handler = setup_handler();

    info!("Bot is running...");

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![settings, orchestrator, limiter])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    Ok(())
}

fn init_logging(patterns: Arc<RedactionPatterns>) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(RedactingMakeWriter::new(io::stderr, patterns.clone()));

    // An empty LOG_FILE disables the file log
    let log_path = std::env::var("LOG_FILE").unwrap_or_else(|_| DEFAULT_LOG_FILE.to_string());
    let file_layer = if log_path.is_empty() {
        None
    } else {
        match OpenOptions::new().create(true).append(true).open(&log_path) {
            Ok(file) => Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(RedactingMakeWriter::new(Mutex::new(file), patterns)),
            ),
            Err(e) => {
                eprintln!("Failed to open log file {log_path}: {e}");
                None
            }
        }
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
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

fn init_orchestrator(settings: &Settings) -> Arc<Orchestrator> {
    match Orchestrator::from_settings(settings) {
        Ok(o) => Arc::new(o),
        Err(e) => {
            error!("Failed to initialize relay pipeline: {}", e);
            std::process::exit(1);
        }
    }
}

fn init_bot(settings: &Settings) -> Bot {
    let bot = Bot::new(settings.telegram_token.clone());
    let Some(api_url) = &settings.telegram_api_url else {
        return bot;
    };
    match reqwest::Url::parse(api_url) {
        Ok(url) => {
            info!("Using Bot API server at {url}");
            bot.set_api_url(url)
        }
        Err(e) => {
            error!("Invalid TELEGRAM_API_URL: {}", e);
            std::process::exit(1);
        }
    }
}

fn setup_handler() -> UpdateHandler<teloxide::RequestError> {
    Update::filter_message()
        .branch(
            dptree::entry()
                .filter_command::<Command>()
                .endpoint(handle_command),
        )
        .branch(
            dptree::filter(|msg: Message| msg.text().is_some()).endpoint(handle_text),
        )
}

async fn handle_command(
    bot: Bot,
    msg: Message,
    cmd: Command,
) -> Result<(), teloxide::RequestError> {
    let res = match cmd {
        Command::Start => bot::handlers::start(bot, msg).await,
        Command::Help => bot::handlers::help(bot, msg).await,
    };
    if let Err(e) = res {
        error!("Command error: {}", e);
    }
    respond(())
}

async fn handle_text(
    bot: Bot,
    msg: Message,
    orchestrator: Arc<Orchestrator>,
    limiter: Arc<Semaphore>,
) -> Result<(), teloxide::RequestError> {
    if let Err(e) = Box::pin(bot::handlers::handle_text(bot, msg, orchestrator, limiter)).await {
        error!("Text handler error: {}", e);
    }
    respond(())
}
