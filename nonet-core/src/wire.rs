//! Link framing: a 4-byte little-endian body length, then the bincode body. Datagrams carry
//! exactly one frame; streams read the header, then [`frame_len`] bytes of body.

use crate::protocol::LinkMessage;

pub const HEADER_LEN: usize = 4;
const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The buffer ends inside a frame.
    #[error("incomplete frame")]
    NeedMore,
    #[error("frame body of {0} bytes exceeds the limit")]
    TooLarge(usize),
    #[error("bincode: {0}")]
    Codec(#[from] bincode::Error),
}

pub fn encode_frame(msg: &LinkMessage) -> Result<Vec<u8>, FrameError> {
    let body_len = bincode::serialized_size(msg)? as usize;
    let len = checked_len(body_len)?;
    let mut out = Vec::with_capacity(HEADER_LEN + body_len);
    out.extend_from_slice(&len.to_le_bytes());
    bincode::serialize_into(&mut out, msg)?;
    Ok(out)
}

fn checked_len(len: usize) -> Result<u32, FrameError> {
    u32::try_from(len)
        .ok()
        .filter(|_| len <= MAX_FRAME_LEN)
        .ok_or(FrameError::TooLarge(len))
}

/// Body length announced by a header.
pub fn frame_len(header: [u8; HEADER_LEN]) -> Result<usize, FrameError> {
    let len = u32::from_le_bytes(header) as usize;
    checked_len(len)?;
    Ok(len)
}

/// Decode a body whose length was taken from [`frame_len`].
pub fn decode_body(body: &[u8]) -> Result<LinkMessage, FrameError> {
    Ok(bincode::deserialize(body)?)
}

/// Decode the frame at the front of `bytes`; returns it with the bytes consumed.
pub fn decode_frame(bytes: &[u8]) -> Result<(LinkMessage, usize), FrameError> {
    let header: [u8; HEADER_LEN] = bytes
        .get(..HEADER_LEN)
        .and_then(|h| h.try_into().ok())
        .ok_or(FrameError::NeedMore)?;
    let len = frame_len(header)?;
    let body = bytes[HEADER_LEN..]
        .get(..len)
        .ok_or(FrameError::NeedMore)?;
    Ok((decode_body(body)?, HEADER_LEN + len))
}
