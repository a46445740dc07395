use std::io::Cursor;

use ogg::{OggReadError, PacketReader};
use thiserror::Error;

/// One opus packet, exactly as it sat inside the container.
pub type Frame = Vec<u8>;

#[derive(Debug, Error)]
#[error("malformed ogg container: {0}")]
pub struct DecodeError(#[from] OggReadError);

/// Pulls every codec packet out of an in-memory ogg container, in container
/// order. A clean end-of-stream terminates extraction and returns what was
/// accumulated; any structural failure aborts with the underlying cause.
pub fn decode(bytes: &[u8]) -> Result<Vec<Frame>, DecodeError> {
    let mut reader = PacketReader::new(Cursor::new(bytes));
    let mut frames = Vec::new();
    while let Some(packet) = reader.read_packet()? {
        frames.push(packet.data);
    }
    Ok(frames)
}

/// Test-side inverse of [`decode`]: wraps a packet sequence back into a
/// single-stream ogg container.
#[cfg(test)]
pub(crate) fn mux(packets: &[Vec<u8>]) -> Vec<u8> {
    use ogg::writing::{PacketWriteEndInfo, PacketWriter};

    let mut out = Vec::new();
    let mut writer = PacketWriter::new(&mut out);
    let last = packets.len().saturating_sub(1);
    for (idx, packet) in packets.iter().enumerate() {
        let info = if idx == last {
            PacketWriteEndInfo::EndStream
        } else if idx < 2 {
            // Header packets sit on their own pages, like every opus muxer
            // emits them.
            PacketWriteEndInfo::EndPage
        } else {
            PacketWriteEndInfo::NormalPacket
        };
        // Header packets carry granule zero; audio granules count 48 kHz
        // samples from the first audio packet onward.
        let granule = if idx < 2 { 0 } else { (idx as u64 - 1) * 960 };
        writer
            .write_packet(packet.clone(), 0, info, granule)
            .expect("writing to a Vec cannot fail");
    }
    drop(writer);
    out
}
