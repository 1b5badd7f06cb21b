use thiserror::Error;

use crate::h3::{
    CodecError, FrameType, QpackError, RequestError, ResponseError, SettingsError, StreamType,
    VarInt,
};

/// An error returned by [`crate::Session`] operations.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The session's scope was cancelled: the handler closed it, the peer
    /// ended the request stream, or the connection went away.
    #[error("webtransport session closed")]
    SessionClosed,

    #[error("connection error")]
    Connection(#[from] quinn::ConnectionError),

    #[error("framing error")]
    Codec(#[from] CodecError),

    /// A peer stream announced a session id other than ours.
    #[error("webtransport stream for session {actual}, expected {expected}")]
    SessionMismatch { expected: VarInt, actual: VarInt },

    /// A peer bidirectional stream opened with an ordinary frame instead of
    /// the WEBTRANSPORT_STREAM switch.
    #[error("unexpected {0:?} frame at the start of a peer stream")]
    UnexpectedFrame(FrameType),

    #[error("send datagram error")]
    SendDatagram(#[from] quinn::SendDatagramError),

    #[error("write error")]
    Write(#[from] quinn::WriteError),
}

/// An error reading from or writing to a wrapped unidirectional stream.
#[derive(Debug, Error)]
pub enum StreamError {
    /// The stream did not open with a `WEBTRANSPORT_UNI` header.
    #[error("unidirectional stream received with the wrong stream type {0:#x}")]
    WrongStreamType(u64),

    #[error("framing error")]
    Codec(#[from] CodecError),

    #[error("read error")]
    Read(#[from] quinn::ReadError),

    #[error("write error")]
    Write(#[from] quinn::WriteError),

    /// The stream was longer than the limit given to `read_to_end`.
    #[error("stream exceeded the read limit")]
    TooLong,
}

impl From<quinn::ReadExactError> for StreamError {
    fn from(err: quinn::ReadExactError) -> Self {
        Self::Codec(err.into())
    }
}

impl From<quinn::ReadToEndError> for StreamError {
    fn from(err: quinn::ReadToEndError) -> Self {
        match err {
            quinn::ReadToEndError::TooLong => Self::TooLong,
            quinn::ReadToEndError::Read(err) => Self::Read(err),
        }
    }
}

/// An error binding the server or setting up a connection.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("io error")]
    Io(#[from] std::io::Error),

    #[error("tls error")]
    Tls(#[from] rustls::Error),

    #[error("no private key found in the key material")]
    MissingPrivateKey,

    #[error("tls configuration is not usable for quic")]
    Crypto(#[from] quinn::crypto::rustls::NoInitialCipherSuite),

    #[error("connection error")]
    Connection(#[from] quinn::ConnectionError),

    #[error("write error")]
    Write(#[from] quinn::WriteError),

    #[error("framing error")]
    Codec(#[from] CodecError),

    #[error("settings exchange failed")]
    Settings(#[from] SettingsError),

    #[error("header block decode failed")]
    Qpack(#[from] QpackError),

    #[error("bad CONNECT request")]
    Request(#[from] RequestError),

    #[error("response error")]
    Response(#[from] ResponseError),

    /// The peer's first unidirectional stream was not a control stream.
    #[error("peer opened its control stream as {0:?}")]
    NotAControlStream(StreamType),

    /// The request stream began with something other than HEADERS.
    #[error("request stream did not start with a HEADERS frame")]
    MissingHeaders,
}
