use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use http::header::ORIGIN;
use http::{HeaderValue, StatusCode};
use tracing::{debug, info, warn};
use url::Url;

use crate::h3::{
    Frame, FrameType, qpack, Request, ResponseWriter, SettingId, SettingsMap, StreamHeader,
    StreamType, VarInt,
};
use crate::{tls, CertFile, Handler, ServerError, Session};

/// Configuration for a [`Server`].
pub struct ServerConfig {
    /// Address to bind the QUIC endpoint to, e.g. `"[::]:4433"`.
    pub listen_addr: SocketAddr,
    /// TLS certificate chain (PEM).
    pub cert: CertFile,
    /// TLS private key (PEM).
    pub key: CertFile,
    /// Origins allowed to connect. Empty allows every origin.
    pub allowed_origins: Vec<String>,
    /// QUIC transport tuning, passed through to quinn. Datagram support is
    /// forced on regardless of what this carries.
    pub transport: Option<quinn::TransportConfig>,
}

/// A WebTransport server.
///
/// Binds a QUIC endpoint, performs the HTTP/3 SETTINGS exchange and the
/// extended CONNECT handshake on every connection, and hands established
/// requests to the [`Handler`].
pub struct Server {
    endpoint: quinn::Endpoint,
    handler: Arc<dyn Handler>,
    allowed_origins: Arc<[String]>,
}

impl Server {
    /// Bind the endpoint described by `config`.
    pub fn bind(config: ServerConfig, handler: impl Handler + 'static) -> Result<Self, ServerError> {
        let tls = tls::tls_config(&config.cert, &config.key)?;
        let crypto = quinn::crypto::rustls::QuicServerConfig::try_from(tls)?;
        let mut server_config = quinn::ServerConfig::with_crypto(Arc::new(crypto));

        // WebTransport is unusable without QUIC datagram frames, so they are
        // enabled whatever the caller's transport config says.
        let mut transport = config.transport.unwrap_or_default();
        transport.datagram_receive_buffer_size(Some(65536));
        server_config.transport_config(Arc::new(transport));

        let endpoint = quinn::Endpoint::server(server_config, config.listen_addr)?;
        info!("webtransport server listening on {}", endpoint.local_addr()?);

        Ok(Self {
            endpoint,
            handler: Arc::new(handler),
            allowed_origins: config.allowed_origins.into(),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.endpoint.local_addr()
    }

    /// Accept connections until the endpoint is closed, spawning one task
    /// per connection.
    pub async fn serve(&self) {
        while let Some(incoming) = self.endpoint.accept().await {
            let handler = self.handler.clone();
            let allowed_origins = self.allowed_origins.clone();
            tokio::spawn(async move {
                let conn = match incoming.await {
                    Ok(conn) => conn,
                    Err(err) => {
                        debug!("connection handshake failed: {err}");
                        return;
                    }
                };
                let remote = conn.remote_address();
                if let Err(err) = handle_connection(conn, handler, allowed_origins).await {
                    debug!(%remote, "connection setup failed: {err}");
                }
            });
        }
    }

    /// Close the endpoint. Pending and future [`serve`](Self::serve) calls
    /// return, and every open connection is torn down.
    pub fn close(&self) {
        self.endpoint.close(quinn::VarInt::from_u32(0), b"server shutdown");
    }
}

/// The settings this server advertises on its control stream.
fn server_settings() -> SettingsMap {
    let mut settings = SettingsMap::new();
    settings.insert(SettingId::H3_DATAGRAM_05, VarInt::from_u32(1));
    settings.insert(SettingId::ENABLE_WEBTRANSPORT, VarInt::from_u32(1));
    settings
}

/// Drive one QUIC connection from accept to handler dispatch.
async fn handle_connection(
    conn: quinn::Connection,
    handler: Arc<dyn Handler>,
    allowed_origins: Arc<[String]>,
) -> Result<(), ServerError> {
    // The server control stream goes out first, before anything is read
    // from the peer.
    let mut server_ctrl = conn.open_uni().await?;
    let mut buf = Vec::new();
    StreamHeader::control().encode(&mut buf)?;
    server_settings().to_frame().encode(&mut buf);
    server_ctrl.write_all(&buf).await?;

    // The peer's first unidirectional stream must be its control stream,
    // and a SETTINGS frame must arrive on it before anything else matters.
    let mut client_ctrl = conn.accept_uni().await?;
    let header = StreamHeader::read(&mut client_ctrl).await?;
    if header.ty != StreamType::CONTROL {
        return Err(ServerError::NotAControlStream(header.ty));
    }
    let client_settings = loop {
        let frame = Frame::read(&mut client_ctrl).await?;
        if frame.ty() == FrameType::SETTINGS {
            break SettingsMap::from_frame(&frame)?;
        }
        debug!(ty = ?frame.ty(), "ignoring control frame before SETTINGS");
    };
    debug!(
        webtransport = client_settings.supports_webtransport(),
        "received client SETTINGS"
    );

    // The first bidirectional stream carries the CONNECT request. Its id is
    // the session id.
    let (send, mut recv) = conn.accept_bi().await?;
    let frame = Frame::read(&mut recv).await?;
    let Frame::Payload { ty: FrameType::HEADERS, data } = frame else {
        return Err(ServerError::MissingHeaders);
    };
    let fields = qpack::decode(&data)?;
    let mut request = Request::from_header_fields(&fields)?;
    request.remote_addr = Some(conn.remote_address());
    debug!(method = %request.method, url = %request.url, protocol = %request.protocol, "decoded request");

    let mut writer = ResponseWriter::new(send);
    writer
        .headers_mut()
        .insert("sec-webtransport-http3-draft", HeaderValue::from_static("draft02"));

    let session_id = VarInt::from(recv.id());
    let session = Arc::new(Session::new(
        conn.clone(),
        session_id,
        writer,
        server_ctrl,
        client_ctrl,
    ));

    if request.protocol != "webtransport"
        || request.scheme != "https"
        || !origin_allowed(&allowed_origins, request.headers.get(ORIGIN))
    {
        warn!(
            protocol = %request.protocol,
            origin = ?request.headers.get(ORIGIN),
            "rejecting session"
        );
        session.reject_session(StatusCode::BAD_REQUEST).await?;
        return Ok(());
    }

    // Drain the request stream in the background. Its end, however it ends,
    // is how a peer-initiated session close reaches everything blocked on
    // this session.
    let watcher = session.clone();
    tokio::spawn(async move {
        let mut buf = [0u8; 1024];
        loop {
            tokio::select! {
                res = recv.read(&mut buf) => match res {
                    Ok(Some(_)) => {}
                    Ok(None) | Err(_) => break,
                },
                _ = watcher.closed() => break,
            }
        }
        watcher.close_session().await;
    });

    handler.serve(request, session).await;
    Ok(())
}

/// Whether the request's `Origin` header passes the allow-list. An empty
/// list allows everything; an unparseable origin passes nothing.
fn origin_allowed(allowed: &[String], origin: Option<&HeaderValue>) -> bool {
    if allowed.is_empty() {
        return true;
    }
    let Some(origin) = origin.and_then(|value| value.to_str().ok()) else {
        return false;
    };
    let Ok(url) = Url::parse(origin) else {
        return false;
    };
    let Some(host) = url.host_str() else {
        return false;
    };
    let host = match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_owned(),
    };
    allowed.iter().any(|entry| *entry == host)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn value(origin: &str) -> HeaderValue {
        HeaderValue::from_str(origin).unwrap()
    }

    #[test]
    fn empty_allow_list_allows_all() {
        assert!(origin_allowed(&[], Some(&value("https://anywhere.example"))));
        assert!(origin_allowed(&[], None));
    }

    #[test]
    fn host_must_match() {
        let allowed = ["example.com".to_owned()];
        assert!(origin_allowed(&allowed, Some(&value("https://example.com"))));
        assert!(!origin_allowed(&allowed, Some(&value("https://evil.example"))));
        assert!(!origin_allowed(&allowed, None));
    }

    #[test]
    fn port_is_part_of_the_host() {
        let allowed = ["example.com:4433".to_owned()];
        assert!(origin_allowed(
            &allowed,
            Some(&value("https://example.com:4433"))
        ));
        assert!(!origin_allowed(&allowed, Some(&value("https://example.com"))));
    }

    #[test]
    fn garbage_origin_is_rejected() {
        let allowed = ["example.com".to_owned()];
        assert!(!origin_allowed(&allowed, Some(&value("not a url"))));
    }

    #[test]
    fn advertised_settings() {
        let settings = server_settings();
        assert_eq!(
            settings.get(SettingId::H3_DATAGRAM_05),
            Some(VarInt::from_u32(1))
        );
        assert!(settings.supports_webtransport());
    }
}
