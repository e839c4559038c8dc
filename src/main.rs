use anyhow::Result;
use serenity::{model::gateway::GatewayIntents, Client};
use songbird::{SerenityInit, Songbird};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info};

mod audio;
mod bot;
mod config;
mod error;
mod sources;

use crate::audio::player::MusicPlayer;
use crate::audio::voice::{Extractor, SongbirdBackend};
use crate::bot::{HttpAnnouncer, QueueBot};
use crate::config::Config;
use crate::sources::{SearchRouter, YtDlpSearch};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("queue_bot=debug".parse()?)
                .add_directive("serenity=info".parse()?)
                .add_directive("songbird=info".parse()?),
        )
        .init();

    info!("🎵 Starting queue-bot v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::load()?;

    if std::env::args().any(|arg| arg == "--health-check") {
        return health_check(&config).await;
    }

    info!("{}", config.summary());
    let config = Arc::new(config);

    let intents = GatewayIntents::GUILDS
        | GatewayIntents::GUILD_VOICE_STATES
        | GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT
        | GatewayIntents::DIRECT_MESSAGES;

    // Player events flow from songbird callbacks to a single consumer task.
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let songbird = Songbird::serenity();
    let backend = SongbirdBackend::new(songbird.clone(), events_tx, Extractor::from_config(&config));
    let announcer = Arc::new(HttpAnnouncer::new());
    let player = Arc::new(MusicPlayer::new(
        Arc::new(backend),
        announcer.clone(),
        config.max_queue_size,
    ));
    tokio::spawn(player.clone().run_events(events_rx));

    let resolver = SearchRouter::from_config(&config)?;
    let handler = QueueBot::new(config.clone(), player, resolver);

    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler(handler)
        .register_songbird_with(songbird)
        .await?;
    announcer.attach(client.http.clone());

    let shard_manager = client.shard_manager.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Could not listen for Ctrl+C: {:?}", e);
            return;
        }
        info!("⚠️ Shutdown signal received, closing...");
        shard_manager.shutdown_all().await;
    });

    info!("🚀 Bot started");
    if let Err(why) = client.start().await {
        error!("Client error: {:?}", why);
    }

    Ok(())
}

async fn health_check(config: &Config) -> Result<()> {
    let version = YtDlpSearch::new(config.ytdlp_path.clone()).verify().await?;
    println!("OK (yt-dlp {version})");
    Ok(())
}
