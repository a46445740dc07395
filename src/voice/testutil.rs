//! In-memory transport fakes shared by the voice tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use serenity::async_trait;
use serenity::model::id::{ChannelId, GuildId, UserId};

use super::transport::{MembershipView, TransportError, VoiceConn, VoiceTransport};
use crate::demux::Frame;

/// Everything a fake connection observed, in call order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnEvent {
    Speaking(bool),
    Frame(Frame),
    Disconnect,
}

pub struct FakeConn {
    channel_id: ChannelId,
    events: Mutex<Vec<ConnEvent>>,
    pub fail_speaking: AtomicBool,
    pub fail_send: AtomicBool,
    pub fail_disconnect: AtomicBool,
}

impl FakeConn {
    pub fn new(channel_id: ChannelId) -> Self {
        Self {
            channel_id,
            events: Mutex::new(Vec::new()),
            fail_speaking: AtomicBool::new(false),
            fail_send: AtomicBool::new(false),
            fail_disconnect: AtomicBool::new(false),
        }
    }

    pub fn events(&self) -> Vec<ConnEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl VoiceConn for FakeConn {
    fn channel_id(&self) -> ChannelId {
        self.channel_id
    }

    async fn set_speaking(&self, speaking: bool) -> Result<(), TransportError> {
        if self.fail_speaking.load(Ordering::SeqCst) {
            return Err("speaking refused".into());
        }
        self.events.lock().unwrap().push(ConnEvent::Speaking(speaking));
        tokio::task::yield_now().await;
        Ok(())
    }

    async fn send_frame(&self, frame: Frame) -> Result<(), TransportError> {
        if self.fail_send.load(Ordering::SeqCst) {
            return Err("frame sink closed".into());
        }
        self.events.lock().unwrap().push(ConnEvent::Frame(frame));
        // Yield like a backpressured sink would, so concurrent-trigger tests
        // get a real interleaving point mid-playback.
        tokio::task::yield_now().await;
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        if self.fail_disconnect.load(Ordering::SeqCst) {
            return Err("disconnect refused".into());
        }
        self.events.lock().unwrap().push(ConnEvent::Disconnect);
        Ok(())
    }
}

/// Hands out [`FakeConn`]s and remembers every one it created.
#[derive(Default)]
pub struct FakeTransport {
    pub conns: Mutex<Vec<Arc<FakeConn>>>,
    pub fail_connect: AtomicBool,
}

impl FakeTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn created(&self) -> Vec<Arc<FakeConn>> {
        self.conns.lock().unwrap().clone()
    }
}

#[async_trait]
impl VoiceTransport for FakeTransport {
    async fn connect(
        &self,
        _guild_id: GuildId,
        channel_id: ChannelId,
    ) -> Result<Arc<dyn VoiceConn>, TransportError> {
        if self.fail_connect.load(Ordering::SeqCst) {
            return Err("connect refused".into());
        }
        // Suspend mid-dial so racing joins can observe the in-flight state.
        tokio::task::yield_now().await;
        let conn = Arc::new(FakeConn::new(channel_id));
        self.conns.lock().unwrap().push(Arc::clone(&conn));
        Ok(conn)
    }
}

/// Scriptable voice-state snapshot.
#[derive(Default)]
pub struct FakeMembership {
    states: Mutex<HashMap<(GuildId, UserId), ChannelId>>,
}

impl FakeMembership {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, guild_id: GuildId, user_id: UserId, channel_id: ChannelId) {
        self.states
            .lock()
            .unwrap()
            .insert((guild_id, user_id), channel_id);
    }
}

impl MembershipView for FakeMembership {
    fn voice_channel_of(&self, guild_id: GuildId, user_id: UserId) -> Option<ChannelId> {
        self.states.lock().unwrap().get(&(guild_id, user_id)).copied()
    }
}
