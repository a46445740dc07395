use std::sync::Arc;
use std::time::Duration;

use serenity::model::id::{ChannelId, GuildId, UserId};
use thiserror::Error;
use tracing::{info, warn};

use super::registry::SessionRegistry;
use super::transport::{MembershipView, TransportError, VoiceConn, VoiceTransport};

/// Upper bound on the voice handshake, so a hung join cannot hold the
/// guild's registry slot indefinitely.
const JOIN_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("user {user} is not in a voice channel of guild {guild}")]
    UserNotInVoice { guild: GuildId, user: UserId },
    #[error("already connected to voice channel {channel} of guild {guild}")]
    AlreadyConnected { guild: GuildId, channel: ChannelId },
    #[error("failed to join voice channel {channel} of guild {guild}")]
    JoinFailed {
        guild: GuildId,
        channel: ChannelId,
        #[source]
        source: TransportError,
    },
    #[error("no active voice connection for guild {guild}")]
    NotConnected { guild: GuildId },
}

/// Opens and tears down voice connections, keeping the registry honest.
///
/// Join and leave are deliberately asymmetric: join refuses to reuse an
/// existing session (two overlapping sounds would corrupt each other's
/// speaking toggles), while leave is best-effort on the transport but strict
/// about removing the registry entry.
pub struct LifecycleManager {
    registry: Arc<SessionRegistry>,
    transport: Arc<dyn VoiceTransport>,
}

impl LifecycleManager {
    pub fn new(registry: Arc<SessionRegistry>, transport: Arc<dyn VoiceTransport>) -> Self {
        Self { registry, transport }
    }

    /// Resolves the user's current voice channel, connects to it and
    /// registers the connection under its guild.
    ///
    /// The registry slot is claimed before the transport is dialled. The
    /// transport keys its calls per guild, so a second concurrent dial would
    /// tear into the first one's connection; a losing racer must fail here
    /// without ever reaching the transport.
    pub async fn join(
        &self,
        membership: &dyn MembershipView,
        guild_id: GuildId,
        user_id: UserId,
    ) -> Result<Arc<dyn VoiceConn>, LifecycleError> {
        let channel_id = membership
            .voice_channel_of(guild_id, user_id)
            .ok_or(LifecycleError::UserNotInVoice {
                guild: guild_id,
                user: user_id,
            })?;

        if let Some(existing) = self.registry.lookup(guild_id) {
            if existing.channel_id() == channel_id {
                return Err(LifecycleError::AlreadyConnected {
                    guild: guild_id,
                    channel: channel_id,
                });
            }
            // A session lingering on another channel: drop it before
            // reconnecting, keeping one connection per guild.
            if let Some(stale) = self.registry.deregister(guild_id) {
                if let Err(err) = stale.disconnect().await {
                    warn!(%guild_id, "failed to disconnect stale voice connection: {err}");
                }
            }
        }

        let Some(claim) = self.registry.claim(guild_id) else {
            return Err(LifecycleError::AlreadyConnected {
                guild: guild_id,
                channel: channel_id,
            });
        };

        // On any failure below the claim drops and releases the slot.
        let conn = tokio::time::timeout(
            JOIN_TIMEOUT,
            self.transport.connect(guild_id, channel_id),
        )
        .await
        .map_err(|elapsed| LifecycleError::JoinFailed {
            guild: guild_id,
            channel: channel_id,
            source: Box::new(elapsed),
        })?
        .map_err(|source| LifecycleError::JoinFailed {
            guild: guild_id,
            channel: channel_id,
            source,
        })?;

        claim.fulfill(Arc::clone(&conn));
        info!(%guild_id, %channel_id, "joined voice channel");
        Ok(conn)
    }

    /// Disconnects and deregisters the guild's connection. The entry is
    /// removed even when the transport refuses to disconnect; a stale mapping
    /// would wedge every later join for the guild.
    pub async fn leave(&self, guild_id: GuildId) -> Result<(), LifecycleError> {
        let conn = self
            .registry
            .deregister(guild_id)
            .ok_or(LifecycleError::NotConnected { guild: guild_id })?;

        if let Err(err) = conn.disconnect().await {
            warn!(%guild_id, "failed to disconnect from voice channel: {err}");
        }
        info!(%guild_id, "left voice channel");
        Ok(())
    }
}
