//! Production transport: songbird for the voice connection, the serenity
//! cache for the voice-state membership view.

use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use ogg::writing::{PacketWriteEndInfo, PacketWriter};
use serenity::async_trait;
use serenity::cache::Cache;
use serenity::model::id::{ChannelId, GuildId, UserId};
use songbird::input::{AudioStream, Input, LiveInput};
use songbird::{Call, Event, EventContext, Songbird, TrackEvent};
use symphonia::core::io::MediaSource;
use symphonia::core::probe::Hint;
use tokio::sync::{mpsc, Notify};
use tracing::warn;

use super::transport::{MembershipView, TransportError, VoiceConn, VoiceTransport};
use crate::demux::Frame;

/// Frames buffered between the streamer and the driver's read side. Small on
/// purpose: the channel, not the streamer, is the backpressure point.
const SINK_DEPTH: usize = 16;

/// Samples per packet at 48 kHz, the 20 ms cadence the voice gateway expects.
const FRAME_GRANULE: u64 = 960;

const STREAM_SERIAL: u32 = 0;

/// How long disconnect waits for the driver to finish playing out the frames
/// still buffered in the sink before tearing the call down.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Opens voice connections through a shared songbird manager.
pub struct SongbirdTransport {
    manager: Arc<Songbird>,
}

impl SongbirdTransport {
    pub fn new(manager: Arc<Songbird>) -> Self {
        Self { manager }
    }
}

#[async_trait]
impl VoiceTransport for SongbirdTransport {
    async fn connect(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> Result<Arc<dyn VoiceConn>, TransportError> {
        let call = self
            .manager
            .join(guild_id, channel_id)
            .await
            .map_err(|err| Box::new(err) as TransportError)?;
        let conn =
            SongbirdConn::start(Arc::clone(&self.manager), call, guild_id, channel_id).await;
        Ok(Arc::new(conn))
    }
}

struct SongbirdConn {
    manager: Arc<Songbird>,
    guild_id: GuildId,
    channel_id: ChannelId,
    // Taken (and thereby closed) by disconnect, so the frame stream sees
    // end-of-stream and the track can run to completion.
    tx: Mutex<Option<mpsc::Sender<Frame>>>,
    finished: Arc<Notify>,
}

impl SongbirdConn {
    async fn start(
        manager: Arc<Songbird>,
        call: Arc<tokio::sync::Mutex<Call>>,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> Self {
        let (tx, rx) = mpsc::channel(SINK_DEPTH);
        let finished = Arc::new(Notify::new());

        let mut hint = Hint::new();
        hint.with_extension("ogg");
        let stream = AudioStream {
            input: Box::new(FrameStream::new(rx)) as Box<dyn MediaSource>,
            hint: Some(hint),
        };
        let handle = call
            .lock()
            .await
            .play_only_input(Input::Live(LiveInput::Raw(stream), None));
        for event in [TrackEvent::End, TrackEvent::Error] {
            let notify = TrackEndNotify {
                finished: Arc::clone(&finished),
            };
            if let Err(err) = handle.add_event(Event::Track(event), notify) {
                warn!(%guild_id, "failed to watch for track end: {err}");
            }
        }

        Self {
            manager,
            guild_id,
            channel_id,
            tx: Mutex::new(Some(tx)),
            finished,
        }
    }
}

#[async_trait]
impl VoiceConn for SongbirdConn {
    fn channel_id(&self) -> ChannelId {
        self.channel_id
    }

    async fn set_speaking(&self, _speaking: bool) -> Result<(), TransportError> {
        // The driver raises and clears the protocol's speaking flag itself as
        // audio starts and stops flowing; there is nothing to forward.
        Ok(())
    }

    async fn send_frame(&self, frame: Frame) -> Result<(), TransportError> {
        let tx = self
            .tx
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| TransportError::from("voice frame sink closed"))?;
        tx.send(frame)
            .await
            .map_err(|_| TransportError::from("voice frame sink closed"))
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        // Close the sink first: the frame stream then finishes its ogg stream
        // and the driver plays out whatever is still buffered. Tearing the
        // call down immediately would clip the tail of the sound.
        self.tx.lock().unwrap().take();
        if tokio::time::timeout(DRAIN_TIMEOUT, self.finished.notified())
            .await
            .is_err()
        {
            warn!(guild_id = %self.guild_id, "track did not finish draining; disconnecting anyway");
        }
        self.manager
            .remove(self.guild_id)
            .await
            .map_err(|err| Box::new(err) as TransportError)
    }
}

/// Fires the connection's drain signal when the track ends or errors.
struct TrackEndNotify {
    finished: Arc<Notify>,
}

#[async_trait]
impl songbird::EventHandler for TrackEndNotify {
    async fn act(&self, _ctx: &EventContext<'_>) -> Option<Event> {
        self.finished.notify_one();
        None
    }
}

/// Bridges the per-frame sink onto a symphonia media source.
///
/// Frames arrive over the bounded channel and leave as a freshly paged ogg
/// stream, so the driver's own read pace is what throttles the streamer. One
/// packet of lookahead is held back to mark the final packet end-of-stream.
struct FrameStream {
    rx: mpsc::Receiver<Frame>,
    writer: PacketWriter<'static, SharedBuf>,
    buf: SharedBuf,
    pending: Option<Frame>,
    packets_written: u64,
    granule: u64,
    closed: bool,
}

impl FrameStream {
    fn new(rx: mpsc::Receiver<Frame>) -> Self {
        let buf = SharedBuf::default();
        Self {
            rx,
            writer: PacketWriter::new(buf.clone()),
            buf,
            pending: None,
            packets_written: 0,
            granule: 0,
            closed: false,
        }
    }

    /// Pages out one more packet, or marks the stream closed when the sender
    /// side is gone.
    ///
    /// Every packet closes its page. Holding audio packets on an open page
    /// would leave them unreadable until the stream ends, and the driver can
    /// only pace playback on bytes it can actually read.
    fn refill(&mut self) -> io::Result<()> {
        let current = match self.pending.take() {
            Some(frame) => frame,
            None => match self.rx.blocking_recv() {
                Some(frame) => frame,
                None => {
                    self.closed = true;
                    return Ok(());
                }
            },
        };
        self.pending = self.rx.blocking_recv();

        if self.packets_written >= 2 {
            self.granule += FRAME_GRANULE;
        }
        let info = if self.pending.is_none() {
            self.closed = true;
            PacketWriteEndInfo::EndStream
        } else {
            PacketWriteEndInfo::EndPage
        };

        self.writer
            .write_packet(current, STREAM_SERIAL, info, self.granule)?;
        self.packets_written += 1;
        Ok(())
    }
}

impl io::Read for FrameStream {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        loop {
            {
                let mut buf = self.buf.0.lock().unwrap();
                if !buf.is_empty() {
                    let n = out.len().min(buf.len());
                    out[..n].copy_from_slice(&buf[..n]);
                    buf.drain(..n);
                    return Ok(n);
                }
            }
            if self.closed {
                return Ok(0);
            }
            self.refill()?;
        }
    }
}

impl io::Seek for FrameStream {
    fn seek(&mut self, _pos: io::SeekFrom) -> io::Result<u64> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "frame stream is not seekable",
        ))
    }
}

impl MediaSource for FrameStream {
    fn is_seekable(&self) -> bool {
        false
    }

    fn byte_len(&self) -> Option<u64> {
        None
    }
}

/// `Vec<u8>` behind a lock, so the packet writer and the read side can share
/// one buffer.
#[derive(Clone, Default)]
struct SharedBuf(Arc<Mutex<Vec<u8>>>);

impl io::Write for SharedBuf {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Voice-state snapshot backed by the serenity gateway cache.
pub struct CacheMembership {
    cache: Arc<Cache>,
}

impl CacheMembership {
    pub fn new(cache: Arc<Cache>) -> Self {
        Self { cache }
    }
}

impl MembershipView for CacheMembership {
    fn voice_channel_of(&self, guild_id: GuildId, user_id: UserId) -> Option<ChannelId> {
        self.cache.guild(guild_id).and_then(|guild| {
            guild
                .voice_states
                .get(&user_id)
                .and_then(|voice_state| voice_state.channel_id)
        })
    }
}
