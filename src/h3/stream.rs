use std::fmt;

use bytes::Buf;

use super::{CodecError, VarInt};

/// The type carried in the first varint of a unidirectional stream.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct StreamType(pub VarInt);

impl StreamType {
    pub const CONTROL: Self = Self(VarInt::from_u32(0x00));
    pub const PUSH: Self = Self(VarInt::from_u32(0x01));
    pub const QPACK_ENCODER: Self = Self(VarInt::from_u32(0x02));
    pub const QPACK_DECODER: Self = Self(VarInt::from_u32(0x03));
    pub const WEBTRANSPORT_UNI: Self = Self(VarInt::from_u32(0x54));

    pub const fn into_inner(self) -> u64 {
        self.0.into_inner()
    }
}

impl fmt::Debug for StreamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::CONTROL => write!(f, "CONTROL"),
            Self::PUSH => write!(f, "PUSH"),
            Self::QPACK_ENCODER => write!(f, "QPACK_ENCODER"),
            Self::QPACK_DECODER => write!(f, "QPACK_DECODER"),
            Self::WEBTRANSPORT_UNI => write!(f, "WEBTRANSPORT_UNI"),
            other => write!(f, "StreamType({:#x})", other.into_inner()),
        }
    }
}

/// The header at the start of a unidirectional stream: a type, plus an
/// associated id for the types that carry one (`PUSH` and
/// `WEBTRANSPORT_UNI`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamHeader {
    pub ty: StreamType,
    pub id: Option<VarInt>,
}

impl StreamHeader {
    /// A bare `CONTROL` header.
    pub const fn control() -> Self {
        Self {
            ty: StreamType::CONTROL,
            id: None,
        }
    }

    /// A `WEBTRANSPORT_UNI` header carrying the owning session's id.
    pub const fn webtransport(session_id: VarInt) -> Self {
        Self {
            ty: StreamType::WEBTRANSPORT_UNI,
            id: Some(session_id),
        }
    }

    /// Decode a stream header from the front of `buf`.
    pub fn decode<B: Buf>(buf: &mut B) -> Result<Self, CodecError> {
        let ty = StreamType(VarInt::decode(buf)?);
        match ty {
            StreamType::CONTROL | StreamType::QPACK_ENCODER | StreamType::QPACK_DECODER => {
                Ok(Self { ty, id: None })
            }
            StreamType::PUSH | StreamType::WEBTRANSPORT_UNI => Ok(Self {
                ty,
                id: Some(VarInt::decode(buf)?),
            }),
            other => Err(CodecError::UnknownStreamType(other.into_inner())),
        }
    }

    /// Read a stream header from a QUIC stream.
    pub async fn read(recv: &mut quinn::RecvStream) -> Result<Self, CodecError> {
        let ty = StreamType(VarInt::read(recv).await?);
        match ty {
            StreamType::CONTROL | StreamType::QPACK_ENCODER | StreamType::QPACK_DECODER => {
                Ok(Self { ty, id: None })
            }
            StreamType::PUSH | StreamType::WEBTRANSPORT_UNI => Ok(Self {
                ty,
                id: Some(VarInt::read(recv).await?),
            }),
            other => Err(CodecError::UnknownStreamType(other.into_inner())),
        }
    }

    /// Append the wire encoding to `buf`. Types that carry an id emit it;
    /// bare types emit the type varint alone.
    pub fn encode(&self, buf: &mut Vec<u8>) -> Result<(), CodecError> {
        match self.ty {
            StreamType::CONTROL | StreamType::QPACK_ENCODER | StreamType::QPACK_DECODER => {
                self.ty.0.encode(buf);
                Ok(())
            }
            StreamType::PUSH | StreamType::WEBTRANSPORT_UNI => {
                self.ty.0.encode(buf);
                self.id.unwrap_or_default().encode(buf);
                Ok(())
            }
            other => Err(CodecError::UnknownStreamType(other.into_inner())),
        }
    }

    /// Write this header to a QUIC stream, returning the bytes written.
    pub async fn write(&self, send: &mut quinn::SendStream) -> Result<usize, CodecError> {
        let mut buf = Vec::new();
        self.encode(&mut buf)?;
        send.write_all(&buf).await?;
        Ok(buf.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn control_is_a_single_byte() {
        let mut buf = Vec::new();
        StreamHeader::control().encode(&mut buf).unwrap();
        assert_eq!(buf, [0x00]);
    }

    #[test]
    fn bare_types_consume_exactly_one_varint() {
        let buf = [0x02u8, 0xaa];
        let mut slice = &buf[..];
        let header = StreamHeader::decode(&mut slice).unwrap();
        assert_eq!(header.ty, StreamType::QPACK_ENCODER);
        assert_eq!(header.id, None);
        assert_eq!(slice, [0xaa]);
    }

    #[test]
    fn webtransport_uni_round_trip() {
        let header = StreamHeader::webtransport(VarInt::from_u32(8));
        let mut buf = Vec::new();
        header.encode(&mut buf).unwrap();
        assert_eq!(buf, [0x40, 0x54, 0x08]);
        assert_eq!(StreamHeader::decode(&mut &buf[..]).unwrap(), header);
    }

    #[test]
    fn push_round_trip() {
        let header = StreamHeader {
            ty: StreamType::PUSH,
            id: Some(VarInt::from_u32(3)),
        };
        let mut buf = Vec::new();
        header.encode(&mut buf).unwrap();
        assert_eq!(StreamHeader::decode(&mut &buf[..]).unwrap(), header);
    }

    #[test]
    fn unknown_type_rejected_both_ways() {
        let buf = [0x05u8];
        assert!(matches!(
            StreamHeader::decode(&mut &buf[..]),
            Err(CodecError::UnknownStreamType(0x05))
        ));

        let header = StreamHeader {
            ty: StreamType(VarInt::from_u32(0x05)),
            id: None,
        };
        let mut out = Vec::new();
        assert!(matches!(
            header.encode(&mut out),
            Err(CodecError::UnknownStreamType(0x05))
        ));
    }

    #[test]
    fn truncated_id_rejected() {
        // WEBTRANSPORT_UNI promises an id varint that never arrives.
        let buf = [0x40u8, 0x54];
        assert!(matches!(
            StreamHeader::decode(&mut &buf[..]),
            Err(CodecError::IncompleteInput)
        ));
    }
}
