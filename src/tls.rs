use std::io;
use std::path::PathBuf;

use crate::ServerError;

/// TLS certificate or key material, given either as a path to a PEM file or
/// as PEM bytes held in memory.
#[derive(Debug, Clone)]
pub enum CertFile {
    Path(PathBuf),
    Bytes(Vec<u8>),
}

impl CertFile {
    fn load(&self) -> io::Result<Vec<u8>> {
        match self {
            Self::Path(path) => std::fs::read(path),
            Self::Bytes(bytes) => Ok(bytes.clone()),
        }
    }
}

/// Build the rustls config for the listener: the given certificate chain and
/// key, offering every HTTP/3 draft ALPN this server speaks.
pub(crate) fn tls_config(cert: &CertFile, key: &CertFile) -> Result<rustls::ServerConfig, ServerError> {
    let cert_pem = cert.load()?;
    let key_pem = key.load()?;

    let certs = rustls_pemfile::certs(&mut cert_pem.as_slice()).collect::<Result<Vec<_>, _>>()?;
    let key = rustls_pemfile::private_key(&mut key_pem.as_slice())?
        .ok_or(ServerError::MissingPrivateKey)?;

    let mut config = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)?;
    config.alpn_protocols = crate::ALPN.iter().map(|proto| proto.as_bytes().to_vec()).collect();
    Ok(config)
}
