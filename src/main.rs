mod config;
mod demux;
mod handler;
mod sound;
mod voice;

use std::error::Error;
use std::sync::Arc;

use config::Config;
use handler::{Handler, PipelineKey, SoundStoreKey};
use serenity::client::Client;
use serenity::prelude::*;
use songbird::{SerenityInit, Songbird};
use sound::SoundStore;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use voice::{Pipeline, SongbirdTransport};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env()?;

    let intents = GatewayIntents::GUILDS
        | GatewayIntents::GUILD_VOICE_STATES
        | GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT;

    let manager = Songbird::serenity();
    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler(Handler)
        .register_songbird_with(Arc::clone(&manager))
        .await?;

    let pipeline = Arc::new(Pipeline::new(Arc::new(SongbirdTransport::new(manager))));
    {
        let mut data = client.data.write().await;
        data.insert::<PipelineKey>(Arc::clone(&pipeline));
        data.insert::<SoundStoreKey>(Arc::new(SoundStore::bundled()));
    }

    // Ctrl-c / SIGTERM: close every open voice connection, then bring the
    // gateway down so `client.start` returns.
    let shard_manager = client.shard_manager.clone();
    tokio::spawn(async move {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!("failed to listen for shutdown signal: {err}");
            return;
        }
        info!("shutting down");
        pipeline.shutdown().await;
        shard_manager.shutdown_all().await;
    });

    client.start().await?;

    Ok(())
}
