//! A WebTransport-over-HTTP/3 server on top of [quinn].
//!
//! WebTransport gives browsers a bidirectional, multi-stream, datagram-capable
//! transport. It is established by an HTTP/3 extended CONNECT request whose
//! `:protocol` pseudo-header is `webtransport`, carried on a QUIC connection
//! negotiated with an HTTP/3 ALPN.
//!
//! This crate owns the layer between the QUIC endpoint and the application:
//! the HTTP/3 framing and SETTINGS exchange, the CONNECT handshake, and the
//! per-session multiplexing of WebTransport streams and datagrams. QUIC
//! itself (handshake, flow control, TLS) is quinn's business.
//!
//! ```no_run
//! use std::sync::Arc;
//! use webtransport_server::{
//!     handler_fn, CertFile, Request, Router, Server, ServerConfig, Session,
//! };
//!
//! # async fn run() {
//! let mut router = Router::new();
//! router.handle(
//!     "/chat",
//!     handler_fn(|_request: Request, session: Arc<Session>| async move {
//!         session.accept_session().await.unwrap();
//!         let mut stream = session.open_uni().await.unwrap();
//!         stream.write_all(b"hello").await.unwrap();
//!     }),
//! );
//!
//! let server = Server::bind(
//!     ServerConfig {
//!         listen_addr: "[::]:4433".parse().unwrap(),
//!         cert: CertFile::Path("cert.pem".into()),
//!         key: CertFile::Path("key.pem".into()),
//!         allowed_origins: Vec::new(),
//!         transport: None,
//!     },
//!     router,
//! )
//! .unwrap();
//! server.serve().await;
//! # }
//! ```

mod error;
pub mod h3;
mod handler;
mod server;
mod session;
mod stream;
mod tls;

pub use error::{ServerError, SessionError, StreamError};
pub use h3::{Request, ResponseWriter};
pub use handler::{handler_fn, Handler, HandlerFn, Router};
pub use server::{Server, ServerConfig};
pub use session::Session;
pub use stream::{RecvStream, SendStream};
pub use tls::CertFile;

/// The ALPN identifiers offered on the TLS listener, newest draft first.
pub const ALPN: [&str; 5] = ["h3", "h3-32", "h3-31", "h3-30", "h3-29"];

/// Re-export the http crate; status codes and headers appear in the API.
pub use http;
/// Re-export quinn; raw streams and the connection appear in the API.
pub use quinn;
