use std::collections::BTreeMap;
use std::fmt;

use bytes::Buf;
use thiserror::Error;

use super::{Frame, FrameType, VarInt};

/// An HTTP/3 SETTINGS identifier.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct SettingId(pub VarInt);

impl SettingId {
    pub const QPACK_MAX_TABLE_CAPACITY: Self = Self(VarInt::from_u32(0x1));
    pub const MAX_FIELD_SECTION_SIZE: Self = Self(VarInt::from_u32(0x6));
    pub const QPACK_BLOCKED_STREAMS: Self = Self(VarInt::from_u32(0x7));
    /// draft-ietf-masque-h3-datagram-05
    pub const H3_DATAGRAM_05: Self = Self(VarInt::from_u32(0x00ff_d277));
    /// draft-ietf-webtrans-http3-02
    pub const ENABLE_WEBTRANSPORT: Self = Self(VarInt::from_u32(0x2b60_3742));

    pub const fn into_inner(self) -> u64 {
        self.0.into_inner()
    }
}

impl fmt::Debug for SettingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::QPACK_MAX_TABLE_CAPACITY => write!(f, "QPACK_MAX_TABLE_CAPACITY"),
            Self::MAX_FIELD_SECTION_SIZE => write!(f, "MAX_FIELD_SECTION_SIZE"),
            Self::QPACK_BLOCKED_STREAMS => write!(f, "QPACK_BLOCKED_STREAMS"),
            Self::H3_DATAGRAM_05 => write!(f, "H3_DATAGRAM_05"),
            Self::ENABLE_WEBTRANSPORT => write!(f, "ENABLE_WEBTRANSPORT"),
            other => write!(f, "SettingId({:#x})", other.into_inner()),
        }
    }
}

/// A SETTINGS frame payload must not exceed this many bytes.
const MAX_SETTINGS_PAYLOAD: usize = 8 * 1024;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("SETTINGS payload of {0} bytes exceeds the 8 KiB cap")]
    TooLarge(usize),

    #[error("duplicate setting {0:#x}")]
    Duplicate(u64),

    #[error("malformed SETTINGS payload")]
    Malformed,
}

/// The id-to-value map carried by a SETTINGS frame. Keys are unique.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SettingsMap {
    entries: BTreeMap<VarInt, VarInt>,
}

impl SettingsMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a setting, returning the previous value if there was one.
    pub fn insert(&mut self, id: SettingId, value: VarInt) -> Option<VarInt> {
        self.entries.insert(id.0, value)
    }

    pub fn get(&self, id: SettingId) -> Option<VarInt> {
        self.entries.get(&id.0).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether the peer advertised `ENABLE_WEBTRANSPORT = 1`.
    pub fn supports_webtransport(&self) -> bool {
        self.get(SettingId::ENABLE_WEBTRANSPORT) == Some(VarInt::from_u32(1))
    }

    /// Parse a SETTINGS frame payload into a map.
    pub fn from_frame(frame: &Frame) -> Result<Self, SettingsError> {
        let Frame::Payload { data, .. } = frame else {
            return Err(SettingsError::Malformed);
        };
        if data.len() > MAX_SETTINGS_PAYLOAD {
            return Err(SettingsError::TooLarge(data.len()));
        }

        let mut entries = BTreeMap::new();
        let mut buf = &data[..];
        while buf.has_remaining() {
            let id = VarInt::decode(&mut buf).map_err(|_| SettingsError::Malformed)?;
            let value = VarInt::decode(&mut buf).map_err(|_| SettingsError::Malformed)?;
            if entries.insert(id, value).is_some() {
                return Err(SettingsError::Duplicate(id.into_inner()));
            }
        }
        Ok(Self { entries })
    }

    /// Serialize the map into a SETTINGS frame. Entries are emitted in id
    /// order, though no order is promised to the peer.
    pub fn to_frame(&self) -> Frame {
        let len: usize = self
            .entries
            .iter()
            .map(|(id, value)| id.size() + value.size())
            .sum();
        let mut payload = Vec::with_capacity(len);
        for (id, value) in &self.entries {
            id.encode(&mut payload);
            value.encode(&mut payload);
        }
        Frame::payload(FrameType::SETTINGS, payload)
    }
}
