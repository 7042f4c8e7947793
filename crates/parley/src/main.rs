//! `Parley` - terminal chat client with offline delivery.
//!
//! Messages are written through the durable API first, fall back to the
//! live channel, and wait in a local queue while the device is offline.

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod cli;
mod config;
mod render;
mod repl;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use parley_core::probe::spawn_reachability_probe;
use parley_core::{
    CacheRepository, CurrentUser, Engine, EngineConfig, Participant, QueueRepository,
    SessionRepository, credentials,
};
use parley_net::api::HttpBackend;
use parley_net::channel::{ConnectionManager, DefaultConnector};
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cli::{Cli, Commands};
use config::ClientConfig;

/// Buffer between the connection manager and the engine.
const CHANNEL_EVENT_CAPACITY: usize = 256;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    let config_path = cli.config.clone().unwrap_or_else(config::default_path);
    let mut client_config = config::load(&config_path).await?;
    if let Some(api_url) = cli.api_url {
        client_config.api_url = api_url;
    }
    if let Some(channel_url) = cli.channel_url {
        client_config.channel_url = channel_url;
    }

    match cli.command.unwrap_or(Commands::Chat) {
        Commands::Chat => chat(client_config, !cli.offline).await,
        Commands::Login { id, name, token } => login(Participant::new(id, name), &token).await,
        Commands::Logout => logout().await,
        Commands::SaveConfig => config::save(&config_path, &client_config).await,
    }
}

/// Logs go to stderr so the conversation on stdout stays readable.
fn setup_logging(verbose: bool) {
    let default_filter = if verbose {
        "parley=debug,parley_core=debug,parley_net=debug"
    } else {
        "parley=info,parley_core=info,parley_net=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

struct Storage {
    sessions: SessionRepository,
    queue: QueueRepository,
    cache: CacheRepository,
}

impl Storage {
    async fn open() -> Result<Self> {
        let db_path = config::database_path()?;
        let db = db_path.to_str().unwrap_or("parley.db");

        Ok(Self {
            sessions: SessionRepository::new(db).await?,
            queue: QueueRepository::new(db).await?,
            cache: CacheRepository::new(db).await?,
        })
    }

    /// Drops everything tied to `user`.
    async fn forget(&self, user: &CurrentUser) -> Result<()> {
        credentials::delete_token(user.id())?;
        self.sessions.clear().await?;
        self.cache.clear().await?;
        let dropped = self.queue.clear().await?;
        info!(participant = %user.id(), dropped, "Signed out");
        Ok(())
    }
}

async fn login(participant: Participant, token: &str) -> Result<()> {
    let storage = Storage::open().await?;
    if let Some(previous) = storage.sessions.load().await?
        && previous.id() != &participant.id
    {
        storage.forget(&previous).await?;
    }

    credentials::store_token(&participant.id, token)?;
    let user = CurrentUser::new(participant);
    storage.sessions.save(&user).await?;

    println!("Signed in as {} ({})", user.participant.name, user.id());
    Ok(())
}

async fn logout() -> Result<()> {
    let storage = Storage::open().await?;
    match storage.sessions.load().await? {
        Some(user) => {
            storage.forget(&user).await?;
            println!("Signed out {}", user.id());
        }
        None => println!("Not signed in"),
    }
    Ok(())
}

async fn chat(config: ClientConfig, online: bool) -> Result<()> {
    let storage = Storage::open().await?;
    let user = storage
        .sessions
        .load()
        .await?
        .context("Not signed in; run `parley login` first")?;
    let token = credentials::get_token(user.id())?
        .context("No token in the keyring; run `parley login` again")?;
    let me = user.id().clone();

    info!(participant = %me, api = %config.api_url, "Starting Parley");

    let backend = Arc::new(HttpBackend::new(config.api(token)?)?);
    let (channel_tx, channel_rx) = mpsc::channel(CHANNEL_EVENT_CAPACITY);
    let (channel, channel_task) = ConnectionManager::spawn(
        config.channel(me.as_str())?,
        DefaultConnector::new()?,
        channel_tx,
    );

    let engine_config = EngineConfig::new(user.participant).initially_online(online);
    let (engine, handle) = Engine::new(
        engine_config,
        backend,
        channel.clone(),
        channel_rx,
        storage.queue,
    );
    let engine = engine.with_cache(storage.cache);

    let renderer = tokio::spawn(render::run(
        handle.subscribe(),
        me.clone(),
        config.desktop_notifications,
    ));
    let engine_task = tokio::spawn(engine.run());

    // A forced offline start ignores reachability.
    let probe = match config.probe_interval_secs {
        Some(secs) if online => Some(spawn_reachability_probe(
            handle.clone(),
            config.probe_target()?,
            Duration::from_secs(secs),
        )),
        _ => None,
    };

    let result = repl::run(&handle, &me).await;

    if let Some(probe) = probe {
        probe.abort();
    }
    handle.shutdown().await;
    channel.shutdown();
    if let Err(e) = engine_task.await {
        tracing::error!(?e, "Engine task failed");
    }
    if let Err(e) = channel_task.await {
        tracing::error!(?e, "Channel task failed");
    }
    renderer.abort();

    info!("Parley exited");
    result
}
