//! Message framing over the raw socket.

use scribe_types::CodecError;

/// Bytes of the length prefix preceding every frame.
pub const FRAME_HEADER_SIZE: usize = 4;

/// Frame payload kind. The ABI document is the only text frame a session
/// ever carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Text,
    Binary,
}

impl FrameKind {
    fn to_byte(self) -> u8 {
        match self {
            FrameKind::Text => 0,
            FrameKind::Binary => 1,
        }
    }

    fn from_byte(byte: u8) -> Result<Self, CodecError> {
        match byte {
            0 => Ok(FrameKind::Text),
            1 => Ok(FrameKind::Binary),
            other => Err(CodecError::UnknownTag(other)),
        }
    }
}

/// Encode a complete frame: length prefix, kind byte, body.
pub fn encode_frame(kind: FrameKind, body: &[u8]) -> Vec<u8> {
    let payload_len = 1 + body.len();
    let mut out = Vec::with_capacity(FRAME_HEADER_SIZE + payload_len);
    out.extend_from_slice(&(payload_len as u32).to_le_bytes());
    out.push(kind.to_byte());
    out.extend_from_slice(body);
    out
}

/// Parse a frame payload (the bytes after the length prefix) into its
/// kind and body.
pub fn parse_frame(payload: &[u8]) -> Result<(FrameKind, &[u8]), CodecError> {
    let (&kind_byte, body) = payload.split_first().ok_or(CodecError::UnexpectedEnd)?;
    Ok((FrameKind::from_byte(kind_byte)?, body))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_roundtrip() {
        let frame = encode_frame(FrameKind::Binary, b"body bytes");
        assert_eq!(&frame[..4], &(11u32).to_le_bytes());
        let (kind, body) = parse_frame(&frame[4..]).unwrap();
        assert_eq!(kind, FrameKind::Binary);
        assert_eq!(body, b"body bytes");
    }

    #[test]
    fn test_text_frame() {
        let frame = encode_frame(FrameKind::Text, b"{}");
        let (kind, body) = parse_frame(&frame[4..]).unwrap();
        assert_eq!(kind, FrameKind::Text);
        assert_eq!(body, b"{}");
    }

    #[test]
    fn test_empty_payload_rejected() {
        assert_eq!(parse_frame(&[]), Err(CodecError::UnexpectedEnd));
    }

    #[test]
    fn test_unknown_kind_rejected() {
        assert_eq!(parse_frame(&[7, 1, 2]), Err(CodecError::UnknownTag(7)));
    }
}
