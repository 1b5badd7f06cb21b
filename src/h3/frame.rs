use std::fmt;

use bytes::{Buf, Bytes};

use super::{CodecError, VarInt};

/// An HTTP/3 frame type.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameType(pub VarInt);

impl FrameType {
    pub const DATA: Self = Self(VarInt::from_u32(0x00));
    pub const HEADERS: Self = Self(VarInt::from_u32(0x01));
    pub const CANCEL_PUSH: Self = Self(VarInt::from_u32(0x03));
    pub const SETTINGS: Self = Self(VarInt::from_u32(0x04));
    pub const PUSH_PROMISE: Self = Self(VarInt::from_u32(0x05));
    pub const GOAWAY: Self = Self(VarInt::from_u32(0x07));
    pub const MAX_PUSH_ID: Self = Self(VarInt::from_u32(0x0d));
    pub const WEBTRANSPORT_STREAM: Self = Self(VarInt::from_u32(0x41));

    pub const fn into_inner(self) -> u64 {
        self.0.into_inner()
    }
}

impl fmt::Debug for FrameType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::DATA => write!(f, "DATA"),
            Self::HEADERS => write!(f, "HEADERS"),
            Self::CANCEL_PUSH => write!(f, "CANCEL_PUSH"),
            Self::SETTINGS => write!(f, "SETTINGS"),
            Self::PUSH_PROMISE => write!(f, "PUSH_PROMISE"),
            Self::GOAWAY => write!(f, "GOAWAY"),
            Self::MAX_PUSH_ID => write!(f, "MAX_PUSH_ID"),
            Self::WEBTRANSPORT_STREAM => write!(f, "WEBTRANSPORT_STREAM"),
            other => write!(f, "FrameType({:#x})", other.into_inner()),
        }
    }
}

/// One element read off an HTTP/3 stream.
///
/// Almost every frame is `type | length | payload`. The one exception is
/// `WEBTRANSPORT_STREAM`, where the second varint is a session id rather than
/// a length and nothing after it is framed: the remainder of the stream
/// belongs to the application. The two cases are kept as distinct variants so
/// a caller cannot confuse a session id with a payload length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// An ordinary frame, payload read in full.
    Payload { ty: FrameType, data: Bytes },
    /// The stream switched to WebTransport for the given session.
    WebTransport { session_id: VarInt },
}

impl Frame {
    pub fn payload(ty: FrameType, data: impl Into<Bytes>) -> Self {
        Self::Payload {
            ty,
            data: data.into(),
        }
    }

    pub fn ty(&self) -> FrameType {
        match self {
            Self::Payload { ty, .. } => *ty,
            Self::WebTransport { .. } => FrameType::WEBTRANSPORT_STREAM,
        }
    }

    /// Decode one frame from the front of `buf`. For `WEBTRANSPORT_STREAM`
    /// the buffer is left positioned at the first application byte.
    pub fn decode<B: Buf>(buf: &mut B) -> Result<Self, CodecError> {
        let ty = FrameType(VarInt::decode(buf)?);
        let second = VarInt::decode(buf)?;
        if ty == FrameType::WEBTRANSPORT_STREAM {
            return Ok(Self::WebTransport { session_id: second });
        }
        let len = second.into_inner() as usize;
        if buf.remaining() < len {
            return Err(CodecError::IncompleteInput);
        }
        Ok(Self::Payload {
            ty,
            data: buf.copy_to_bytes(len),
        })
    }

    /// Read one frame from a QUIC stream. The payload is read to completion;
    /// a stream that ends early fails with [`CodecError::IncompleteInput`].
    pub async fn read(recv: &mut quinn::RecvStream) -> Result<Self, CodecError> {
        let ty = FrameType(VarInt::read(recv).await?);
        let second = VarInt::read(recv).await?;
        if ty == FrameType::WEBTRANSPORT_STREAM {
            return Ok(Self::WebTransport { session_id: second });
        }
        let mut data = vec![0u8; second.into_inner() as usize];
        recv.read_exact(&mut data).await?;
        Ok(Self::Payload {
            ty,
            data: data.into(),
        })
    }

    /// Append the wire encoding of this frame to `buf`.
    pub fn encode(&self, buf: &mut Vec<u8>) {
        match self {
            Self::Payload { ty, data } => {
                ty.0.encode(buf);
                VarInt::try_from(data.len() as u64)
                    .expect("frame payload exceeds the varint range")
                    .encode(buf);
                buf.extend_from_slice(data);
            }
            Self::WebTransport { session_id } => {
                FrameType::WEBTRANSPORT_STREAM.0.encode(buf);
                session_id.encode(buf);
            }
        }
    }

    /// Write this frame to a QUIC stream, returning the bytes written.
    pub async fn write(&self, send: &mut quinn::SendStream) -> Result<usize, CodecError> {
        let mut buf = Vec::new();
        self.encode(&mut buf);
        send.write_all(&buf).await?;
        Ok(buf.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_round_trip() {
        let frame = Frame::payload(FrameType::DATA, &b"hello"[..]);
        let mut buf = Vec::new();
        frame.encode(&mut buf);
        assert_eq!(buf, b"\x00\x05hello");

        let mut slice = &buf[..];
        assert_eq!(Frame::decode(&mut slice).unwrap(), frame);
        assert!(slice.is_empty());
    }

    #[test]
    fn headers_round_trip() {
        let frame = Frame::payload(FrameType::HEADERS, vec![0x00, 0x00, 0xd1]);
        let mut buf = Vec::new();
        frame.encode(&mut buf);
        assert_eq!(Frame::decode(&mut &buf[..]).unwrap(), frame);
    }

    #[test]
    fn webtransport_switch_is_two_varints() {
        let frame = Frame::WebTransport {
            session_id: VarInt::from_u32(0),
        };
        let mut buf = Vec::new();
        frame.encode(&mut buf);
        // 0x41 needs the two-byte form; session id 0 takes one byte.
        assert_eq!(buf, [0x40, 0x41, 0x00]);
    }

    #[test]
    fn webtransport_switch_leaves_application_bytes() {
        let mut buf = Vec::new();
        Frame::WebTransport {
            session_id: VarInt::from_u32(4),
        }
        .encode(&mut buf);
        buf.extend_from_slice(b"app bytes");

        let mut slice = &buf[..];
        let frame = Frame::decode(&mut slice).unwrap();
        assert_eq!(
            frame,
            Frame::WebTransport {
                session_id: VarInt::from_u32(4)
            }
        );
        assert_eq!(slice, b"app bytes");
    }

    #[test]
    fn truncated_payload_rejected() {
        // DATA frame promising five bytes, carrying two.
        let buf = [0x00u8, 0x05, b'h', b'e'];
        assert!(matches!(
            Frame::decode(&mut &buf[..]),
            Err(CodecError::IncompleteInput)
        ));
    }

    #[test]
    fn unknown_frame_type_passes_through() {
        let frame = Frame::payload(FrameType(VarInt::from_u32(0x21)), &b"x"[..]);
        let mut buf = Vec::new();
        frame.encode(&mut buf);
        assert_eq!(Frame::decode(&mut &buf[..]).unwrap(), frame);
    }
}
