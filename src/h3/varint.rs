use std::fmt;

use bytes::Buf;
use thiserror::Error;

use super::CodecError;

/// A QUIC variable-length integer: an unsigned value below `2^62`, encoded in
/// 1, 2, 4 or 8 bytes. The top two bits of the first byte carry the length.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VarInt(u64);

/// The value does not fit in 62 bits.
#[derive(Debug, Clone, Copy, Error)]
#[error("value too large for a varint")]
pub struct VarIntBoundsExceeded;

impl VarInt {
    /// The largest representable value, `2^62 - 1`.
    pub const MAX: Self = Self((1 << 62) - 1);

    pub const fn from_u32(value: u32) -> Self {
        Self(value as u64)
    }

    pub const fn into_inner(self) -> u64 {
        self.0
    }

    /// The number of bytes the shortest encoding occupies.
    pub const fn size(self) -> usize {
        if self.0 < (1 << 6) {
            1
        } else if self.0 < (1 << 14) {
            2
        } else if self.0 < (1 << 30) {
            4
        } else {
            8
        }
    }

    /// Append the shortest encoding of this value to `buf`.
    pub fn encode(self, buf: &mut Vec<u8>) {
        match self.size() {
            1 => buf.push(self.0 as u8),
            2 => buf.extend_from_slice(&(self.0 as u16 | 0x4000).to_be_bytes()),
            4 => buf.extend_from_slice(&(self.0 as u32 | 0x8000_0000).to_be_bytes()),
            _ => buf.extend_from_slice(&(self.0 | 0xc000_0000_0000_0000).to_be_bytes()),
        }
    }

    /// Decode one varint from the front of `buf`. Any of the four encoded
    /// lengths is accepted, not just the shortest.
    pub fn decode<B: Buf>(buf: &mut B) -> Result<Self, CodecError> {
        if !buf.has_remaining() {
            return Err(CodecError::IncompleteInput);
        }
        let first = buf.get_u8();
        let len = 1usize << (first >> 6);
        if buf.remaining() < len - 1 {
            return Err(CodecError::IncompleteInput);
        }
        let mut value = u64::from(first & 0x3f);
        for _ in 1..len {
            value = (value << 8) | u64::from(buf.get_u8());
        }
        Ok(Self(value))
    }

    /// Read one varint from a QUIC stream. A stream that ends mid-integer
    /// fails with [`CodecError::IncompleteInput`].
    pub async fn read(recv: &mut quinn::RecvStream) -> Result<Self, CodecError> {
        let mut first = [0u8; 1];
        recv.read_exact(&mut first).await?;
        let len = 1usize << (first[0] >> 6);
        let mut rest = [0u8; 7];
        recv.read_exact(&mut rest[..len - 1]).await?;
        let mut value = u64::from(first[0] & 0x3f);
        for byte in &rest[..len - 1] {
            value = (value << 8) | u64::from(*byte);
        }
        Ok(Self(value))
    }
}

impl TryFrom<u64> for VarInt {
    type Error = VarIntBoundsExceeded;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        if value <= Self::MAX.0 {
            Ok(Self(value))
        } else {
            Err(VarIntBoundsExceeded)
        }
    }
}

impl From<u32> for VarInt {
    fn from(value: u32) -> Self {
        Self(value.into())
    }
}

impl From<VarInt> for u64 {
    fn from(value: VarInt) -> Self {
        value.0
    }
}

impl From<quinn::StreamId> for VarInt {
    fn from(id: quinn::StreamId) -> Self {
        Self(quinn::VarInt::from(id).into_inner())
    }
}

impl fmt::Display for VarInt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let values = [
            0u64,
            1,
            63,
            64,
            16383,
            16384,
            (1 << 30) - 1,
            1 << 30,
            (1 << 62) - 1,
        ];
        for &value in &values {
            let v = VarInt::try_from(value).unwrap();
            let mut buf = Vec::new();
            v.encode(&mut buf);
            assert_eq!(buf.len(), v.size(), "size mismatch for {value}");
            let mut slice = &buf[..];
            assert_eq!(VarInt::decode(&mut slice).unwrap(), v);
            assert!(slice.is_empty());
        }
    }

    #[test]
    fn shortest_form_sizes() {
        assert_eq!(VarInt::from_u32(0).size(), 1);
        assert_eq!(VarInt::from_u32(63).size(), 1);
        assert_eq!(VarInt::from_u32(64).size(), 2);
        assert_eq!(VarInt::from_u32(16383).size(), 2);
        assert_eq!(VarInt::from_u32(16384).size(), 4);
        assert_eq!(VarInt::try_from((1u64 << 30) - 1).unwrap().size(), 4);
        assert_eq!(VarInt::try_from(1u64 << 30).unwrap().size(), 8);
    }

    #[test]
    fn accepts_longer_than_shortest_form() {
        // 5 encoded in two bytes instead of one.
        let mut slice = &[0x40u8, 0x05][..];
        assert_eq!(
            VarInt::decode(&mut slice).unwrap(),
            VarInt::from_u32(5)
        );
    }

    #[test]
    fn truncated_input_rejected() {
        // Empty buffer.
        assert!(matches!(
            VarInt::decode(&mut &[][..]),
            Err(CodecError::IncompleteInput)
        ));
        // First byte promises four bytes, only two present.
        assert!(matches!(
            VarInt::decode(&mut &[0x80u8, 0x01][..]),
            Err(CodecError::IncompleteInput)
        ));
    }

    #[test]
    fn out_of_range_rejected() {
        assert!(VarInt::try_from(1u64 << 62).is_err());
        assert!(VarInt::try_from(u64::MAX).is_err());
    }
}
