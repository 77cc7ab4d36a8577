//! # warden
//!
//! Gateway binary: loads settings, wires the stores, completion backend and
//! summarization worker together, and serves the HTTP API.

#![deny(unsafe_code)]

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing::{info, warn};
use warden_core::{Clock, SystemClock};
use warden_guardrails::{MessageVerdict, ScreeningDecision, ScreeningPolicy, Validator};
use warden_llm::{CompletionOptions, OpenAiCompatClient, OpenAiCompatConfig};
use warden_memory::{ConversationStore, MemoryConversationStore, SqliteConversationStore};
use warden_ratelimit::{
    AdmissionController, MemoryRateStore, RateLimits, RateStore, SqliteRateStore,
};
use warden_runtime::{
    ChannelSummaryQueue, ChatGateway, GatewayConfig, GatewayDeps, SummarizationWorker,
};
use warden_server::{ShutdownCoordinator, WardenServer};
use warden_settings::WardenSettings;
use warden_store::ConnectionConfig;

/// Abuse-resistant streaming chat gateway.
#[derive(Parser, Debug)]
#[command(name = "warden", version, about = "Abuse-resistant streaming chat gateway")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP server.
    Serve {
        /// Settings file (defaults to `~/.warden/settings.json`).
        #[arg(long)]
        config: Option<PathBuf>,

        /// Port to bind (overrides settings).
        #[arg(long)]
        port: Option<u16>,

        /// Keep all state in memory even if a database path is configured.
        #[arg(long)]
        memory: bool,
    },
    /// Validate and score a message, printing the verdict as JSON.
    CheckMessage {
        /// Message text.
        text: String,

        /// Settings file (defaults to `~/.warden/settings.json`).
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn load(config: Option<&Path>) -> Result<WardenSettings> {
    match config {
        Some(path) => warden_settings::load_settings_from_path(path)
            .with_context(|| format!("Failed to load settings from {}", path.display())),
        None => warden_settings::load_settings().context("Failed to load settings"),
    }
}

fn screening_policy(settings: &WardenSettings) -> ScreeningPolicy {
    ScreeningPolicy {
        reject_above: settings.screening.reject_above,
        flag_above: settings.screening.flag_above,
        reject_encoding_attacks: settings.screening.reject_encoding_attacks,
    }
}

fn check_message(settings: &WardenSettings, text: String) -> Result<()> {
    let validator = Validator::new(settings.screening.max_message_chars);
    let verdict = validator.validate_message(&Value::String(text));
    let mut json = verdict.to_json();
    if let MessageVerdict::Accepted(message) = &verdict {
        let decision = match screening_policy(settings).evaluate(message) {
            ScreeningDecision::Allow => "allow",
            ScreeningDecision::Flag(_) => "flag",
            ScreeningDecision::Reject(_) => "reject",
        };
        json["decision"] = Value::from(decision);
    }
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}

fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    Ok(())
}

type Stores = (Arc<dyn RateStore>, Arc<dyn ConversationStore>);

fn open_stores(settings: &WardenSettings, memory: bool) -> Result<Stores> {
    let max_turns = settings.conversation.max_turns;
    let path = settings.storage.database_path.as_deref().filter(|_| !memory);
    let Some(path) = path else {
        info!("using in-memory stores");
        return Ok((
            Arc::new(MemoryRateStore::new()),
            Arc::new(MemoryConversationStore::new(max_turns)),
        ));
    };

    let path = Path::new(path);
    ensure_parent_dir(path)?;
    let pool = warden_store::open_pool(Some(path), &ConnectionConfig::default())
        .context("Failed to open database")?;
    info!(path = %path.display(), "using sqlite stores");
    Ok((
        Arc::new(SqliteRateStore::new(pool.clone())),
        Arc::new(SqliteConversationStore::with_max_turns(pool, max_turns)),
    ))
}

async fn serve(mut settings: WardenSettings, port: Option<u16>, memory: bool) -> Result<()> {
    if let Some(port) = port {
        settings.server.port = port;
    }

    let metrics = match warden_server::metrics::install_recorder() {
        Ok(handle) => Some(handle),
        Err(e) => {
            warn!(error = %e, "metrics recorder not installed");
            None
        }
    };

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let (rate_store, conversations) = open_stores(&settings, memory)?;

    let limits = RateLimits {
        minute: settings.rate_limit.per_minute,
        hour: settings.rate_limit.per_hour,
        day: settings.rate_limit.per_day,
    };
    let admission = Arc::new(AdmissionController::new(rate_store, limits, clock.clone()));

    let completion = Arc::new(
        OpenAiCompatClient::new(OpenAiCompatConfig {
            base_url: settings.completion.base_url.clone(),
            model: settings.completion.model.clone(),
            api_key: settings.completion.api_key.clone(),
            temperature: Some(settings.completion.temperature),
            connect_timeout: Duration::from_millis(settings.completion.connect_timeout_ms),
        })
        .context("Failed to build completion client")?,
    );
    info!(model = %completion.model(), base_url = %settings.completion.base_url, "completion backend");

    let shutdown = ShutdownCoordinator::new();

    let (queue, rx) = ChannelSummaryQueue::bounded(settings.conversation.summary_queue_capacity);
    let worker = SummarizationWorker::new(completion.clone(), conversations.clone())
        .with_options(CompletionOptions {
            max_tokens: Some(settings.completion.summary_max_tokens),
            temperature: Some(settings.completion.temperature),
        })
        .spawn(rx, shutdown.token());

    let gateway = ChatGateway::new(
        GatewayDeps {
            admission,
            store: conversations,
            completion,
            summaries: Arc::new(queue),
            clock,
        },
        GatewayConfig {
            max_message_chars: settings.screening.max_message_chars,
            screening: screening_policy(&settings),
            completion: CompletionOptions {
                max_tokens: Some(settings.completion.max_tokens),
                temperature: Some(settings.completion.temperature),
            },
            summarize_threshold: settings.conversation.summarize_threshold,
        },
    );

    let addr: SocketAddr = format!("{}:{}", settings.server.host, settings.server.port)
        .parse()
        .context("Invalid bind address")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    let server = WardenServer::new(settings.server.clone(), Arc::new(gateway), metrics);
    let token = shutdown.token();
    let server_task = tokio::spawn(async move {
        if let Err(e) = server.serve(listener, token).await {
            warn!(error = %e, "server exited with error");
        }
    });

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("shutdown requested");
    shutdown.graceful_shutdown(vec![server_task, worker], None).await;
    info!("warden stopped");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Serve {
            config,
            port,
            memory,
        } => {
            let settings = load(config.as_deref())?;
            warden_core::logging::init_subscriber(&settings.logging.level, settings.logging.json);
            serve(settings, port, memory).await
        }
        Command::CheckMessage { text, config } => {
            let settings = load(config.as_deref())?;
            check_message(&settings, text)
        }
    }
}
