use http::{HeaderMap, StatusCode};
use thiserror::Error;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use super::qpack::{self, HeaderField};
use super::{Frame, FrameType};

#[derive(Debug, Error)]
pub enum ResponseError {
    #[error("response body not allowed for status {0}")]
    BodyNotAllowed(u16),

    #[error("response stream was taken over")]
    StreamTaken,

    #[error("write error")]
    Io(#[from] std::io::Error),
}

/// Writes an HTTP/3 response onto the request stream: one HEADERS frame,
/// then the body as DATA frames. Everything is buffered until
/// [`flush`](Self::flush).
///
/// The first non-informational status latches the response; later calls to
/// [`write_header`](Self::write_header) are no-ops. 1xx statuses are sent
/// immediately without latching.
pub struct ResponseWriter<S = quinn::SendStream> {
    stream: S,
    buf: Vec<u8>,
    headers: HeaderMap,
    status: Option<StatusCode>,
    header_written: bool,
}

impl<S: AsyncWrite + Unpin> ResponseWriter<S> {
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            buf: Vec::new(),
            headers: HeaderMap::new(),
            status: None,
            header_written: false,
        }
    }

    /// The response headers. Mutations after the header frame has been
    /// written have no effect.
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    /// Emit a HEADERS frame with the given status and the current headers.
    pub async fn write_header(&mut self, status: StatusCode) -> Result<(), ResponseError> {
        if self.header_written {
            return Ok(());
        }
        if !status.is_informational() {
            self.header_written = true;
        }
        self.status = Some(status);

        let mut fields = Vec::with_capacity(self.headers.len() + 1);
        fields.push(HeaderField::new(":status", status.as_str()));
        for (name, value) in &self.headers {
            fields.push(HeaderField::new(name.as_str(), value.as_bytes()));
        }
        let mut block = Vec::new();
        qpack::encode(&fields, &mut block);
        Frame::payload(FrameType::HEADERS, block).encode(&mut self.buf);

        // Informational responses go out right away; the final response
        // waits for an explicit flush.
        if status.is_informational() {
            self.flush().await?;
        }
        Ok(())
    }

    /// Append `data` to the response body as a single DATA frame.
    /// Writes before a status default it to 200.
    pub async fn write(&mut self, data: &[u8]) -> Result<usize, ResponseError> {
        if !self.header_written {
            self.write_header(StatusCode::OK).await?;
        }
        let status = self.status.unwrap_or(StatusCode::OK);
        if !body_allowed(status) {
            return Err(ResponseError::BodyNotAllowed(status.as_u16()));
        }
        Frame::payload(FrameType::DATA, data.to_vec()).encode(&mut self.buf);
        Ok(data.len())
    }

    /// Drain the buffer to the stream.
    pub async fn flush(&mut self) -> Result<(), ResponseError> {
        if !self.buf.is_empty() {
            self.stream.write_all(&self.buf).await?;
            self.buf.clear();
        }
        self.stream.flush().await?;
        Ok(())
    }

    /// Flush and hand the raw stream to the caller. The response writer is
    /// consumed; all further framing is the caller's business.
    pub async fn into_stream(mut self) -> Result<S, ResponseError> {
        self.flush().await?;
        Ok(self.stream)
    }

    /// Flush what is buffered and finish the stream.
    pub(crate) async fn shutdown(&mut self) -> Result<(), ResponseError> {
        self.flush().await?;
        self.stream.shutdown().await?;
        Ok(())
    }
}

// RFC 9110: 1xx, 204 and 304 responses never carry a body.
fn body_allowed(status: StatusCode) -> bool {
    !(status.is_informational()
        || status == StatusCode::NO_CONTENT
        || status == StatusCode::NOT_MODIFIED)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Buf;
    use tokio::io::{AsyncReadExt, DuplexStream};

    fn writer() -> (ResponseWriter<DuplexStream>, DuplexStream) {
        let (ours, theirs) = tokio::io::duplex(16 * 1024);
        (ResponseWriter::new(ours), theirs)
    }

    async fn written(mut peer: DuplexStream) -> Vec<u8> {
        let mut bytes = Vec::new();
        peer.read_to_end(&mut bytes).await.unwrap();
        bytes
    }

    fn decode_headers(frame: &Frame) -> Vec<HeaderField> {
        match frame {
            Frame::Payload { ty, data } if *ty == FrameType::HEADERS => {
                qpack::decode(data).unwrap()
            }
            other => panic!("expected HEADERS, got {other:?}"),
        }
    }

    fn status_of(fields: &[HeaderField]) -> String {
        fields
            .iter()
            .find(|field| field.name == b":status")
            .map(|field| String::from_utf8(field.value.clone()).unwrap())
            .expect("no :status field")
    }

    #[tokio::test]
    async fn headers_then_data() {
        let (mut writer, peer) = writer();
        writer
            .headers_mut()
            .insert("sec-webtransport-http3-draft", "draft02".parse().unwrap());
        writer.write_header(StatusCode::OK).await.unwrap();
        writer.write(b"ok").await.unwrap();
        writer.flush().await.unwrap();
        drop(writer);

        let bytes = written(peer).await;
        let mut buf = &bytes[..];
        let fields = decode_headers(&Frame::decode(&mut buf).unwrap());
        assert_eq!(status_of(&fields), "200");
        assert!(fields
            .iter()
            .any(|f| f.name == b"sec-webtransport-http3-draft" && f.value == b"draft02"));

        let data = Frame::decode(&mut buf).unwrap();
        assert_eq!(data, Frame::payload(FrameType::DATA, &b"ok"[..]));
        assert!(!buf.has_remaining());
    }

    #[tokio::test]
    async fn body_write_defaults_to_200() {
        let (mut writer, peer) = writer();
        writer.write(b"hello").await.unwrap();
        writer.flush().await.unwrap();
        drop(writer);

        let bytes = written(peer).await;
        let mut buf = &bytes[..];
        let fields = decode_headers(&Frame::decode(&mut buf).unwrap());
        assert_eq!(status_of(&fields), "200");
    }

    #[tokio::test]
    async fn final_status_latches() {
        let (mut writer, peer) = writer();
        writer.write_header(StatusCode::BAD_REQUEST).await.unwrap();
        writer.write_header(StatusCode::OK).await.unwrap();
        writer.flush().await.unwrap();
        drop(writer);

        let bytes = written(peer).await;
        let mut buf = &bytes[..];
        let fields = decode_headers(&Frame::decode(&mut buf).unwrap());
        assert_eq!(status_of(&fields), "400");
        assert!(!buf.has_remaining());
    }

    #[tokio::test]
    async fn informational_does_not_latch() {
        let (mut writer, peer) = writer();
        writer.write_header(StatusCode::CONTINUE).await.unwrap();
        writer.write_header(StatusCode::OK).await.unwrap();
        writer.flush().await.unwrap();
        drop(writer);

        let bytes = written(peer).await;
        let mut buf = &bytes[..];
        let first = decode_headers(&Frame::decode(&mut buf).unwrap());
        assert_eq!(status_of(&first), "100");
        let second = decode_headers(&Frame::decode(&mut buf).unwrap());
        assert_eq!(status_of(&second), "200");
    }

    #[tokio::test]
    async fn body_rejected_for_no_content() {
        let (mut writer, _peer) = writer();
        writer.write_header(StatusCode::NO_CONTENT).await.unwrap();
        assert!(matches!(
            writer.write(b"nope").await,
            Err(ResponseError::BodyNotAllowed(204))
        ));
    }

    #[tokio::test]
    async fn into_stream_flushes_first() {
        let (mut writer, peer) = writer();
        writer.write_header(StatusCode::OK).await.unwrap();
        let stream = writer.into_stream().await.unwrap();
        drop(stream);

        let bytes = written(peer).await;
        assert!(!bytes.is_empty());
    }
}
