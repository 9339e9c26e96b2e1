//! Length-prefix framing for stream transports.
//!
//! Frames are a 4-byte big-endian payload length followed by the payload.
//! Stream transports accumulate reads into a buffer and pop complete
//! frames off it with [`split_frame`].

use bytes::{Buf, BytesMut};

use crate::Error;

/// Maximum payload size (16 MB). Bounds per-connection memory; traversal
/// result batches can be large but not unbounded.
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Size of the length prefix in bytes.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Encode a payload with a length prefix.
///
/// Returns a new buffer containing `[length (4 bytes BE)][payload]`.
pub fn encode_frame(payload: &[u8]) -> Result<Vec<u8>, Error> {
    if payload.len() > MAX_FRAME_SIZE {
        return Err(Error::FrameTooLarge {
            size: payload.len(),
            max: MAX_FRAME_SIZE,
        });
    }

    let len = payload.len() as u32;
    let mut frame = Vec::with_capacity(LENGTH_PREFIX_SIZE + payload.len());
    frame.extend_from_slice(&len.to_be_bytes());
    frame.extend_from_slice(payload);
    Ok(frame)
}

/// Decode the payload length from a 4-byte header.
pub fn decode_frame_length(header: &[u8; LENGTH_PREFIX_SIZE]) -> Result<usize, Error> {
    let len = u32::from_be_bytes(*header) as usize;
    if len > MAX_FRAME_SIZE {
        return Err(Error::FrameTooLarge {
            size: len,
            max: MAX_FRAME_SIZE,
        });
    }
    Ok(len)
}

/// Pop one complete frame's payload off an accumulation buffer.
///
/// Returns `Ok(None)` while the buffer holds less than a full frame;
/// callers read more bytes and try again. On success the frame's bytes
/// are consumed from `buf`. An oversized length header fails immediately,
/// before any payload arrives.
pub fn split_frame(buf: &mut BytesMut) -> Result<Option<Vec<u8>>, Error> {
    if buf.len() < LENGTH_PREFIX_SIZE {
        return Ok(None);
    }

    let mut header = [0u8; LENGTH_PREFIX_SIZE];
    header.copy_from_slice(&buf[..LENGTH_PREFIX_SIZE]);
    let len = decode_frame_length(&header)?;

    if buf.len() < LENGTH_PREFIX_SIZE + len {
        return Ok(None);
    }

    buf.advance(LENGTH_PREFIX_SIZE);
    let payload = buf.split_to(len);
    Ok(Some(payload.to_vec()))
}
