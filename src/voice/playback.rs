use std::sync::Arc;

use serenity::model::id::GuildId;
use thiserror::Error;
use tracing::{debug, warn};

use super::registry::SessionRegistry;
use super::transport::TransportError;
use crate::demux::Frame;

#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error("no active voice connection for guild {guild}")]
    NoConnection { guild: GuildId },
    #[error("voice connection for guild {guild} stopped accepting frames")]
    FrameSend {
        guild: GuildId,
        #[source]
        source: TransportError,
    },
}

/// Streams demuxed frames into the guild's active connection, wrapping the
/// transmission in speaking-state toggles.
pub struct Streamer {
    registry: Arc<SessionRegistry>,
}

impl Streamer {
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self { registry }
    }

    /// Delivers each frame, in decode order, to the connection's outbound
    /// sink. The sink is the pipeline's only backpressure point: delivery
    /// paces itself to the transport's consumption rate instead of racing
    /// ahead.
    pub async fn play(&self, guild_id: GuildId, frames: Vec<Frame>) -> Result<(), PlaybackError> {
        let conn = self
            .registry
            .lookup(guild_id)
            .ok_or(PlaybackError::NoConnection { guild: guild_id })?;

        // Speaking toggles are best-effort signaling; the frames are still
        // valid to send without them.
        if let Err(err) = conn.set_speaking(true).await {
            warn!(%guild_id, "failed to raise speaking flag: {err}");
        }

        let total = frames.len();
        let mut outcome = Ok(());
        for frame in frames {
            if let Err(source) = conn.send_frame(frame).await {
                outcome = Err(PlaybackError::FrameSend {
                    guild: guild_id,
                    source,
                });
                break;
            }
        }

        if let Err(err) = conn.set_speaking(false).await {
            warn!(%guild_id, "failed to clear speaking flag: {err}");
        }

        if outcome.is_ok() {
            debug!(%guild_id, frames = total, "finished streaming sound");
        }
        outcome
    }
}
