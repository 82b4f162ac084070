//! bondlink: conversation sync client for a multi-agent backend.
//! Owns the sync engine, the conversation store, the REST client and the
//! real-time channel in one process.

use anyhow::Context;
use clap::Parser;

use bondlink_engine::SyncEngine;
use bondlink_store::{ConversationStore, MemoryStore, SqliteStore};

mod backend;
mod cli;
mod cmd_agents;
mod cmd_control;
mod cmd_history;
mod cmd_watch;
mod config;
mod connection;
mod display;
mod session;
mod socketio;

use backend::BackendClient;
use config::RuntimeConfig;
use connection::ConnectionManager;
use session::Session;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = cli::Cli::parse();

    let filter = std::env::var("BONDLINK_LOG")
        .or_else(|_| std::env::var("RUST_LOG"))
        .unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
        .with_writer(std::io::stderr)
        .init();

    let config = load_config(&args)?;
    let engine = SyncEngine::new(open_store(&config, args.ephemeral)?, config.engine_config()?);
    let backend = BackendClient::new(config.base_url())?;
    tracing::debug!(backend = backend.base_url(), "backend client ready");
    let session = Session::new(backend, engine);

    match args.command {
        cli::Command::Watch(opts) => {
            cmd_watch::cmd_watch(&session, &config.socket_url(), &config.reconnect, opts.json)
                .await?;
        }
        cli::Command::Agents(opts) => {
            cmd_agents::cmd_agents(&session, opts.agent().as_ref(), opts.json).await?;
        }
        cli::Command::Create(opts) => cmd_agents::cmd_create(&session, opts.json).await?,
        cli::Command::Start(opts) => {
            cmd_control::cmd_start(&session, &opts.agent(), &opts.request()).await?;
        }
        cli::Command::Stop(arg) => cmd_control::cmd_stop(&session, &arg.agent()).await?,
        cli::Command::Send(opts) => {
            let mut manager = ConnectionManager::new(config.socket_url());
            let send = cmd_control::SendOptions {
                force: opts.force,
                wait: opts.wait.map(std::time::Duration::from_secs),
            };
            cmd_control::cmd_send(&session, &mut manager, &opts.agent(), &opts.message, &send)
                .await?;
        }
        cli::Command::History(opts) => {
            let mut engine = session.engine().lock().await;
            cmd_history::cmd_history(&mut engine, &opts.agent(), opts.json)?;
        }
        cli::Command::Clear(arg) => cmd_control::cmd_clear(&session, &arg.agent()).await?,
    }

    Ok(())
}

/// Config file, then CLI/env overrides, then validation.
fn load_config(args: &cli::Cli) -> anyhow::Result<RuntimeConfig> {
    let mut config = RuntimeConfig::load(args.config.as_deref())?;
    if let Some(url) = &args.backend_url {
        config.backend_url = url.clone();
    }
    if let Some(dir) = &args.data_dir {
        config.data_dir = dir.clone();
    }
    config.validate()?;
    Ok(config)
}

fn open_store(config: &RuntimeConfig, ephemeral: bool) -> anyhow::Result<Box<dyn ConversationStore>> {
    if ephemeral {
        tracing::debug!("using in-memory conversation store");
        return Ok(Box::new(MemoryStore::new()));
    }
    let path = config.store_path();
    let store = SqliteStore::open(&path)
        .with_context(|| format!("opening conversation store {}", path.display()))?;
    tracing::debug!(path = %path.display(), "conversation store open");
    Ok(Box::new(store))
}
