use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use shoebox_core::chat::signature::SignatureVerifier;
use shoebox_core::chat::slack::SlackMessenger;
use shoebox_core::config::{load_dotenv, Secrets, ShoeboxConfig};
use shoebox_core::core::digest::{run_digest, DigestPeriod};
use shoebox_core::core::{ContextStore, Filer};
use shoebox_core::llm::{OpenAiOracle, Transcriber};
use shoebox_core::server::{serve, AppState};
use shoebox_core::store::notion::NotionStore;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "shoebox", version, about = "Capture bot: classify chat notes with an LLM and file them into structured collections")]
struct Cli {
    /// Path to the config file; defaults to ./shoebox.toml
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the webhook server with digest and sweep tickers
    Serve,
    /// Post a digest of recent captures once, then exit
    Digest {
        #[arg(value_enum)]
        period: Period,
    },
    /// Evict idle thread contexts once, then exit
    Sweep,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Period {
    Daily,
    Weekly,
}

impl From<Period> for DigestPeriod {
    fn from(period: Period) -> Self {
        match period {
            Period::Daily => DigestPeriod::Daily,
            Period::Weekly => DigestPeriod::Weekly,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    load_dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Cli::parse();
    let config = ShoeboxConfig::load(args.config.as_deref())?;
    let secrets = Secrets::from_env()?;

    let oracle = Arc::new(OpenAiOracle::with_model(
        secrets.openai_api_key.clone(),
        config.llm.model.clone(),
    )?);
    let store = Arc::new(NotionStore::new(
        secrets.notion_api_key.clone(),
        config.store.clone(),
    )?);
    let messenger = Arc::new(SlackMessenger::new(secrets.slack_bot_token.clone())?);
    let contexts = Arc::new(
        ContextStore::open(&config.context.snapshot_path)
            .context("cannot open context snapshot")?,
    );
    let filer = Arc::new(Filer::new(
        oracle,
        store.clone(),
        messenger.clone(),
        contexts.clone(),
    ));

    match args.command {
        Commands::Serve => {
            let transcriber = Arc::new(Transcriber::new(secrets.openai_api_key.clone())?);
            let state = Arc::new(AppState::new(
                filer,
                SignatureVerifier::new(secrets.slack_signing_secret.clone()),
                Some(transcriber),
                secrets.slack_bot_token.clone(),
            )?);

            spawn_sweep_ticker(contexts.clone(), config.context.sweep_max_age_days);
            if let Some(channel) = config.digest.channel.clone() {
                spawn_digest_tickers(store, messenger, channel);
            }

            serve(state, &config.server.host, config.server.port).await
        }
        Commands::Digest { period } => {
            let channel = config
                .digest
                .channel
                .context("digest.channel is not configured")?;
            run_digest(store.as_ref(), messenger.as_ref(), &channel, period.into()).await;
            Ok(())
        }
        Commands::Sweep => {
            let evicted = contexts.sweep(
                chrono::Duration::days(config.context.sweep_max_age_days),
                Utc::now(),
            );
            info!(evicted, "context sweep complete");
            Ok(())
        }
    }
}

fn spawn_sweep_ticker(contexts: Arc<ContextStore>, max_age_days: i64) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(24 * 60 * 60));
        ticker.tick().await; // first tick fires immediately
        loop {
            ticker.tick().await;
            let evicted = contexts.sweep(chrono::Duration::days(max_age_days), Utc::now());
            if evicted > 0 {
                info!(evicted, "swept idle thread contexts");
            }
        }
    });
}

fn spawn_digest_tickers(
    store: Arc<NotionStore>,
    messenger: Arc<SlackMessenger>,
    channel: String,
) {
    {
        let store = store.clone();
        let messenger = messenger.clone();
        let channel = channel.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(24 * 60 * 60));
            ticker.tick().await;
            loop {
                ticker.tick().await;
                run_digest(store.as_ref(), messenger.as_ref(), &channel, DigestPeriod::Daily)
                    .await;
            }
        });
    }
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(7 * 24 * 60 * 60));
        ticker.tick().await;
        loop {
            ticker.tick().await;
            run_digest(store.as_ref(), messenger.as_ref(), &channel, DigestPeriod::Weekly)
                .await;
        }
    });
}
