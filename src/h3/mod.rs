//! The HTTP/3 wire layer underneath a WebTransport session.
//!
//! This module owns everything that has an exact byte format: QUIC varints,
//! HTTP/3 frames (including the `WEBTRANSPORT_STREAM` switch), unidirectional
//! stream headers, the SETTINGS map, a static-table QPACK codec, and the
//! request/response halves of the extended CONNECT exchange.

mod frame;
pub mod qpack;
mod request;
mod response;
mod settings;
mod stream;
mod varint;

pub use frame::{Frame, FrameType};
pub use qpack::{HeaderField, QpackError};
pub use request::{Request, RequestError};
pub use response::{ResponseError, ResponseWriter};
pub use settings::{SettingId, SettingsError, SettingsMap};
pub use stream::{StreamHeader, StreamType};
pub use varint::{VarInt, VarIntBoundsExceeded};

use thiserror::Error;

/// An error reading or writing one of the wire elements in this module.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The stream or buffer ended in the middle of an element.
    #[error("input ended mid-element")]
    IncompleteInput,

    /// A unidirectional stream opened with a type this layer does not know.
    #[error("unknown stream type {0:#x}")]
    UnknownStreamType(u64),

    #[error("read error")]
    Read(#[from] quinn::ReadError),

    #[error("write error")]
    Write(#[from] quinn::WriteError),
}

impl From<quinn::ReadExactError> for CodecError {
    fn from(err: quinn::ReadExactError) -> Self {
        match err {
            quinn::ReadExactError::FinishedEarly(_) => Self::IncompleteInput,
            quinn::ReadExactError::ReadError(err) => Self::Read(err),
        }
    }
}
