use std::sync::Arc;

use serenity::async_trait;
use serenity::model::id::{ChannelId, GuildId, UserId};

use crate::demux::Frame;

/// Errors bubbling out of a transport backend; callers fold them into their
/// own error taxonomy.
pub type TransportError = Box<dyn std::error::Error + Send + Sync>;

/// One live voice connection to a (guild, channel) pair.
///
/// The connection is exclusively owned by the playback session that created
/// it; the registry only detects, never shares, a live connection.
#[async_trait]
pub trait VoiceConn: Send + Sync {
    fn channel_id(&self) -> ChannelId;

    /// Toggles the speaking flag. Best-effort: failures are the caller's to
    /// log, never to escalate.
    async fn set_speaking(&self, speaking: bool) -> Result<(), TransportError>;

    /// Hands one frame to the outbound sink, awaiting while the sink is full.
    /// Acceptance means local handoff, not remote delivery.
    async fn send_frame(&self, frame: Frame) -> Result<(), TransportError>;

    async fn disconnect(&self) -> Result<(), TransportError>;
}

impl std::fmt::Debug for dyn VoiceConn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VoiceConn")
            .field("channel_id", &self.channel_id())
            .finish()
    }
}

/// Opens voice connections. Production is songbird; tests swap in a fake.
#[async_trait]
pub trait VoiceTransport: Send + Sync {
    async fn connect(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> Result<Arc<dyn VoiceConn>, TransportError>;
}

/// Read-only view of who currently occupies which voice channel. Maintained
/// by the platform client; this system only queries it.
pub trait MembershipView: Send + Sync {
    fn voice_channel_of(&self, guild_id: GuildId, user_id: UserId) -> Option<ChannelId>;
}
