use crate::h3::{StreamHeader, StreamType, VarInt};
use crate::StreamError;

/// An outbound unidirectional WebTransport stream.
///
/// The `WEBTRANSPORT_UNI | session_id` header is written immediately before
/// the first data write. If the header write fails the stream is reset and
/// the error surfaced; nothing else is framed afterwards.
#[derive(Debug)]
pub struct SendStream {
    inner: quinn::SendStream,
    pending_header: Option<Vec<u8>>,
}

impl SendStream {
    pub(crate) fn outgoing(inner: quinn::SendStream, session_id: VarInt) -> Self {
        let mut header = Vec::with_capacity(StreamType::WEBTRANSPORT_UNI.0.size() + session_id.size());
        StreamHeader::webtransport(session_id)
            .encode(&mut header)
            .expect("webtransport header is a known stream type");
        Self {
            inner,
            pending_header: Some(header),
        }
    }

    async fn send_header_first(&mut self) -> Result<(), StreamError> {
        if let Some(header) = self.pending_header.take() {
            if let Err(err) = self.inner.write_all(&header).await {
                let _ = self.inner.reset(quinn::VarInt::from_u32(0));
                return Err(err.into());
            }
        }
        Ok(())
    }

    /// Write some of `data`, returning how much was accepted.
    pub async fn write(&mut self, data: &[u8]) -> Result<usize, StreamError> {
        self.send_header_first().await?;
        Ok(self.inner.write(data).await?)
    }

    /// Write all of `data`.
    pub async fn write_all(&mut self, data: &[u8]) -> Result<(), StreamError> {
        self.send_header_first().await?;
        Ok(self.inner.write_all(data).await?)
    }

    /// Signal that no more data will be written.
    pub fn finish(&mut self) -> Result<(), quinn::ClosedStream> {
        self.inner.finish()
    }

    /// Abandon the stream with an application error code.
    pub fn reset(&mut self, code: u32) -> Result<(), quinn::ClosedStream> {
        self.inner.reset(quinn::VarInt::from_u32(code))
    }

    pub fn id(&self) -> quinn::StreamId {
        self.inner.id()
    }
}

/// An inbound unidirectional WebTransport stream.
///
/// The first read consumes the stream header, requires it to be
/// `WEBTRANSPORT_UNI` and records the announced session id; after that reads
/// pass straight through.
#[derive(Debug)]
pub struct RecvStream {
    inner: quinn::RecvStream,
    header_read: bool,
    session_id: Option<VarInt>,
}

impl RecvStream {
    pub(crate) fn incoming(inner: quinn::RecvStream) -> Self {
        Self {
            inner,
            header_read: false,
            session_id: None,
        }
    }

    async fn read_header_first(&mut self) -> Result<(), StreamError> {
        if self.header_read {
            return Ok(());
        }
        let header = StreamHeader::read(&mut self.inner).await?;
        if header.ty != StreamType::WEBTRANSPORT_UNI {
            return Err(StreamError::WrongStreamType(header.ty.into_inner()));
        }
        self.session_id = header.id;
        self.header_read = true;
        Ok(())
    }

    /// Read into `buf`, returning the bytes read or `None` at end of stream.
    pub async fn read(&mut self, buf: &mut [u8]) -> Result<Option<usize>, StreamError> {
        self.read_header_first().await?;
        Ok(self.inner.read(buf).await?)
    }

    /// Fill `buf` completely.
    pub async fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), StreamError> {
        self.read_header_first().await?;
        Ok(self.inner.read_exact(buf).await?)
    }

    /// Read the rest of the stream, up to `size_limit` bytes.
    pub async fn read_to_end(&mut self, size_limit: usize) -> Result<Vec<u8>, StreamError> {
        self.read_header_first().await?;
        Ok(self.inner.read_to_end(size_limit).await?)
    }

    /// The session id announced in the stream header, once it has been read.
    pub fn session_id(&self) -> Option<VarInt> {
        self.session_id
    }

    /// Tell the peer to stop sending with an application error code.
    pub fn stop(&mut self, code: u32) -> Result<(), quinn::ClosedStream> {
        self.inner.stop(quinn::VarInt::from_u32(code))
    }

    pub fn id(&self) -> quinn::StreamId {
        self.inner.id()
    }
}
