use std::sync::Arc;

use serenity::all::{Context, EventHandler, Message, Ready};
use serenity::async_trait;
use serenity::prelude::TypeMapKey;
use tracing::{error, info};

use crate::sound::SoundStore;
use crate::voice::{CacheMembership, Pipeline};

pub struct PipelineKey;

impl TypeMapKey for PipelineKey {
    type Value = Arc<Pipeline>;
}

pub struct SoundStoreKey;

impl TypeMapKey for SoundStoreKey {
    type Value = Arc<SoundStore>;
}

/// Maps recognized message prefixes onto bundled sound keys. Closed set.
fn sound_key_for(content: &str) -> Option<&'static str> {
    if content.starts_with("/yey") {
        Some("yey")
    } else if content.starts_with("/boo") {
        Some("boo")
    } else {
        None
    }
}

pub struct Handler;

#[async_trait]
impl EventHandler for Handler {
    async fn ready(&self, _ctx: Context, ready: Ready) {
        info!("{} is now running, press ctrl-c to exit", ready.user.name);
    }

    async fn message(&self, ctx: Context, msg: Message) {
        if msg.author.bot {
            return;
        }
        let Some(guild_id) = msg.guild_id else {
            return;
        };
        let Some(key) = sound_key_for(&msg.content) else {
            return;
        };

        let (pipeline, sounds) = {
            let data = ctx.data.read().await;
            match (
                data.get::<PipelineKey>().cloned(),
                data.get::<SoundStoreKey>().cloned(),
            ) {
                (Some(pipeline), Some(sounds)) => (pipeline, sounds),
                _ => {
                    error!("pipeline state was not initialised at startup");
                    return;
                }
            }
        };

        let Some(sound) = sounds.get(key) else {
            error!(sound = key, "no bundled sound for recognized command");
            return;
        };

        let membership = CacheMembership::new(ctx.cache.clone());
        let user_id = msg.author.id;

        // One supervised task per trigger: whatever goes wrong in there,
        // including a panic, is logged at this boundary and never reaches the
        // event loop or sibling triggers.
        let task = tokio::spawn(async move {
            pipeline
                .play_sound(&membership, guild_id, user_id, sound)
                .await
        });
        match task.await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => error!(%guild_id, sound = key, "failed to play sound: {err}"),
            Err(err) => error!(%guild_id, sound = key, "sound task panicked: {err}"),
        }
    }
}
