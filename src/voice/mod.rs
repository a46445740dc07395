mod driver;
mod lifecycle;
mod playback;
mod registry;
#[cfg(test)]
pub(crate) mod testutil;
mod transport;

pub use driver::{CacheMembership, SongbirdTransport};
pub use lifecycle::{LifecycleError, LifecycleManager};
pub use playback::{PlaybackError, Streamer};
pub use registry::SessionRegistry;
pub use transport::{MembershipView, TransportError, VoiceConn, VoiceTransport};

use std::sync::Arc;

use serenity::model::id::{GuildId, UserId};
use thiserror::Error;
use tracing::{error, warn};

use crate::demux;

#[derive(Debug, Error)]
pub enum PlayError {
    #[error(transparent)]
    Decode(#[from] demux::DecodeError),
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
    #[error(transparent)]
    Playback(#[from] PlaybackError),
}

/// The audio delivery pipeline: demux, join, stream, leave.
pub struct Pipeline {
    registry: Arc<SessionRegistry>,
    lifecycle: LifecycleManager,
    streamer: Streamer,
}

impl Pipeline {
    pub fn new(transport: Arc<dyn VoiceTransport>) -> Self {
        let registry = Arc::new(SessionRegistry::new());
        Self {
            lifecycle: LifecycleManager::new(Arc::clone(&registry), transport),
            streamer: Streamer::new(Arc::clone(&registry)),
            registry,
        }
    }

    /// Runs one trigger end to end.
    ///
    /// The container is demuxed before the join, so a malformed asset never
    /// touches the transport. Once the join has succeeded the connection is
    /// torn down on every exit path, success or not.
    pub async fn play_sound(
        &self,
        membership: &dyn MembershipView,
        guild_id: GuildId,
        user_id: UserId,
        sound: &[u8],
    ) -> Result<(), PlayError> {
        let frames = demux::decode(sound)?;

        self.lifecycle.join(membership, guild_id, user_id).await?;
        let played = self.streamer.play(guild_id, frames).await;
        if let Err(err) = self.lifecycle.leave(guild_id).await {
            error!(%guild_id, "cleanup after playback failed: {err}");
        }
        played?;
        Ok(())
    }

    /// Closes every live connection. Shutdown path.
    pub async fn shutdown(&self) {
        for (guild_id, conn) in self.registry.drain() {
            if let Err(err) = conn.disconnect().await {
                warn!(%guild_id, "failed to disconnect during shutdown: {err}");
            }
        }
    }
}
