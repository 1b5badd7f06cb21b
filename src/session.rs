use std::future::Future;
use std::io::Cursor;
use std::net::SocketAddr;

use bytes::{Bytes, BytesMut};
use http::{HeaderName, HeaderValue, StatusCode};
use tokio::sync::{watch, Mutex};

use crate::h3::{Frame, ResponseError, ResponseWriter, VarInt};
use crate::{RecvStream, SendStream, SessionError};

/// An accepted WebTransport session.
///
/// A session is created by the server for each CONNECT request it accepts
/// and handed to the request handler. The handler decides its fate with
/// [`accept_session`](Self::accept_session) or
/// [`reject_session`](Self::reject_session), then multiplexes WebTransport
/// streams and datagrams over the parent QUIC connection.
///
/// The id of the request stream is the *session id*: it prefixes every
/// stream either side opens, and its quarter-stream form prefixes every
/// datagram. Closing the session cancels all blocked calls on it.
pub struct Session {
    conn: quinn::Connection,
    session_id: VarInt,
    /// Encoded quarter stream id, kept ready to prepend to datagrams.
    datagram_header: Vec<u8>,
    writer: Mutex<Option<ResponseWriter>>,
    cancel: watch::Sender<bool>,
    // Held so the HTTP/3 control plumbing stays open as long as the session.
    _server_ctrl: quinn::SendStream,
    _client_ctrl: quinn::RecvStream,
}

impl Session {
    pub(crate) fn new(
        conn: quinn::Connection,
        session_id: VarInt,
        writer: ResponseWriter,
        server_ctrl: quinn::SendStream,
        client_ctrl: quinn::RecvStream,
    ) -> Self {
        let quarter_id = VarInt::try_from(session_id.into_inner() / 4)
            .expect("quarter stream id fits a varint");
        let mut datagram_header = Vec::with_capacity(quarter_id.size());
        quarter_id.encode(&mut datagram_header);

        let (cancel, _) = watch::channel(false);
        Self {
            conn,
            session_id,
            datagram_header,
            writer: Mutex::new(Some(writer)),
            cancel,
            _server_ctrl: server_ctrl,
            _client_ctrl: client_ctrl,
        }
    }

    /// The id of the CONNECT request stream.
    pub fn session_id(&self) -> VarInt {
        self.session_id
    }

    pub fn conn(&self) -> &quinn::Connection {
        &self.conn
    }

    pub fn remote_address(&self) -> SocketAddr {
        self.conn.remote_address()
    }

    /// Largest datagram payload that fits after the quarter-stream-id
    /// prefix, or `None` when the peer disabled datagrams.
    pub fn max_datagram_size(&self) -> Option<usize> {
        self.conn
            .max_datagram_size()
            .map(|mtu| mtu.saturating_sub(self.datagram_header.len()))
    }

    /// Accept the session by responding `200 OK`.
    pub async fn accept_session(&self) -> Result<(), ResponseError> {
        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or(ResponseError::StreamTaken)?;
        writer.write_header(StatusCode::OK).await?;
        writer.flush().await
    }

    /// Reject the session with the given status and close it.
    pub async fn reject_session(&self, status: StatusCode) -> Result<(), ResponseError> {
        {
            let mut guard = self.writer.lock().await;
            let writer = guard.as_mut().ok_or(ResponseError::StreamTaken)?;
            writer.write_header(status).await?;
            writer.flush().await?;
        }
        self.close_session().await;
        Ok(())
    }

    /// Add a header to the response before it is written.
    pub async fn set_response_header(
        &self,
        name: HeaderName,
        value: HeaderValue,
    ) -> Result<(), ResponseError> {
        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or(ResponseError::StreamTaken)?;
        writer.headers_mut().insert(name, value);
        Ok(())
    }

    /// Emit the response HEADERS frame with the given status.
    pub async fn write_header(&self, status: StatusCode) -> Result<(), ResponseError> {
        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or(ResponseError::StreamTaken)?;
        writer.write_header(status).await
    }

    /// Append response body bytes as a DATA frame.
    pub async fn write(&self, data: &[u8]) -> Result<usize, ResponseError> {
        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or(ResponseError::StreamTaken)?;
        writer.write(data).await
    }

    /// Flush buffered response bytes to the request stream.
    pub async fn flush(&self) -> Result<(), ResponseError> {
        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or(ResponseError::StreamTaken)?;
        writer.flush().await
    }

    /// Take over the raw request stream. The response writer is gone after
    /// this; the caller owns all further framing and the stream's lifetime.
    pub async fn take_stream(&self) -> Result<quinn::SendStream, ResponseError> {
        let writer = self
            .writer
            .lock()
            .await
            .take()
            .ok_or(ResponseError::StreamTaken)?;
        writer.into_stream().await
    }

    /// Accept a peer-initiated bidirectional stream.
    ///
    /// Blocks until one arrives or the session closes. The stream must open
    /// with `WEBTRANSPORT_STREAM | session_id`; the returned halves are
    /// positioned at the first application byte.
    pub async fn accept_bi(
        &self,
    ) -> Result<(quinn::SendStream, quinn::RecvStream), SessionError> {
        self.scoped(async {
            let (send, mut recv) = self.conn.accept_bi().await?;
            match Frame::read(&mut recv).await? {
                Frame::WebTransport { session_id } if session_id == self.session_id => {
                    Ok((send, recv))
                }
                Frame::WebTransport { session_id } => Err(SessionError::SessionMismatch {
                    expected: self.session_id,
                    actual: session_id,
                }),
                Frame::Payload { ty, .. } => Err(SessionError::UnexpectedFrame(ty)),
            }
        })
        .await?
    }

    /// Accept a peer-initiated unidirectional stream.
    ///
    /// Blocks until one arrives or the session closes. The first read on the
    /// returned stream consumes its header and fails with
    /// [`crate::StreamError::WrongStreamType`] if it is not a WebTransport
    /// stream.
    pub async fn accept_uni(&self) -> Result<RecvStream, SessionError> {
        let recv = self.scoped(self.conn.accept_uni()).await??;
        Ok(RecvStream::incoming(recv))
    }

    /// Open a bidirectional stream and stamp it with
    /// `WEBTRANSPORT_STREAM | session_id`.
    ///
    /// Waits for stream credit if the peer's limit is exhausted. A failed
    /// header write resets the stream and surfaces the error.
    pub async fn open_bi(&self) -> Result<(quinn::SendStream, quinn::RecvStream), SessionError> {
        let (mut send, recv) = self.scoped(self.conn.open_bi()).await??;

        let mut header = Vec::with_capacity(2 + self.session_id.size());
        Frame::WebTransport {
            session_id: self.session_id,
        }
        .encode(&mut header);
        if let Err(err) = send.write_all(&header).await {
            let _ = send.reset(quinn::VarInt::from_u32(0));
            return Err(err.into());
        }
        Ok((send, recv))
    }

    /// Open a unidirectional stream. Its header goes out in front of the
    /// first data write.
    pub async fn open_uni(&self) -> Result<SendStream, SessionError> {
        let send = self.scoped(self.conn.open_uni()).await??;
        Ok(SendStream::outgoing(send, self.session_id))
    }

    /// Send an unreliable datagram, prefixed with the quarter stream id.
    pub fn send_datagram(&self, data: &[u8]) -> Result<(), SessionError> {
        let mut buf = BytesMut::with_capacity(self.datagram_header.len() + data.len());
        buf.extend_from_slice(&self.datagram_header);
        buf.extend_from_slice(data);
        self.conn.send_datagram(buf.freeze())?;
        Ok(())
    }

    /// Receive a datagram, with the quarter-stream-id prefix stripped.
    /// Returns [`SessionError::SessionClosed`] once the session is closed.
    pub async fn read_datagram(&self) -> Result<Bytes, SessionError> {
        let mut datagram = self.scoped(self.conn.read_datagram()).await??;

        let mut cursor = Cursor::new(&datagram[..]);
        VarInt::decode(&mut cursor)?;
        let prefix_len = cursor.position() as usize;
        Ok(datagram.split_off(prefix_len))
    }

    /// Close the session: cancel its scope, then finish the request stream.
    /// Every blocked call on this session returns
    /// [`SessionError::SessionClosed`].
    pub async fn close_session(&self) {
        self.cancel.send_replace(true);
        let mut guard = self.writer.lock().await;
        if let Some(writer) = guard.as_mut() {
            let _ = writer.shutdown().await;
        }
    }

    /// Close the whole QUIC connection with an application error.
    pub fn close_with_error(&self, code: u32, reason: &[u8]) {
        self.cancel.send_replace(true);
        self.conn.close(quinn::VarInt::from_u32(code), reason);
    }

    /// Completes once the session has been closed.
    pub async fn closed(&self) {
        let mut rx = self.cancel.subscribe();
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }

    pub fn is_closed(&self) -> bool {
        *self.cancel.borrow()
    }

    /// Race `fut` against the session scope.
    async fn scoped<T>(&self, fut: impl Future<Output = T>) -> Result<T, SessionError> {
        if self.is_closed() {
            return Err(SessionError::SessionClosed);
        }
        tokio::select! {
            res = fut => Ok(res),
            _ = self.closed() => Err(SessionError::SessionClosed),
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("session_id", &self.session_id)
            .field("remote", &self.conn.remote_address())
            .field("closed", &self.is_closed())
            .finish()
    }
}
