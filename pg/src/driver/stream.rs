//! Byte transports under a connection: plain TCP, TLS over TCP, Unix socket.

use std::io;
use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadBuf};
use tokio::net::TcpStream;
#[cfg(unix)]
use tokio::net::UnixStream;
use tokio_rustls::TlsConnector;
use tokio_rustls::client::TlsStream;
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::rustls::{ClientConfig, RootCertStore};
use tracing::debug;

use super::{PgError, PgResult};
use crate::protocol::SSL_REQUEST;

/// The socket a connection talks over.
#[allow(clippy::large_enum_variant)]
pub enum PgStream {
    Tcp(TcpStream),
    Tls(TlsStream<TcpStream>),
    #[cfg(unix)]
    Unix(UnixStream),
}

impl PgStream {
    /// Non-blocking best-effort write, for use where awaiting is impossible.
    /// TLS streams cannot be written synchronously and report 0.
    pub(crate) fn try_write(&self, bytes: &[u8]) -> usize {
        match self {
            PgStream::Tcp(tcp) => tcp.try_write(bytes).unwrap_or(0),
            PgStream::Tls(_) => 0,
            #[cfg(unix)]
            PgStream::Unix(unix) => unix.try_write(bytes).unwrap_or(0),
        }
    }
}

pub(crate) async fn connect_tcp(host: &str, port: u16) -> io::Result<TcpStream> {
    let stream = TcpStream::connect((host, port)).await?;
    stream.set_nodelay(true)?;
    Ok(stream)
}

#[cfg(unix)]
pub(crate) async fn connect_unix(path: &Path) -> io::Result<PgStream> {
    Ok(PgStream::Unix(UnixStream::connect(path).await?))
}

#[cfg(not(unix))]
pub(crate) async fn connect_unix(path: &Path) -> io::Result<PgStream> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        format!("Unix sockets are unavailable: {}", path.display()),
    ))
}

/// Send SSLRequest. `true` when the server agrees to TLS.
pub(crate) async fn request_tls(tcp: &mut TcpStream) -> io::Result<bool> {
    tcp.write_all(&SSL_REQUEST).await?;
    tcp.flush().await?;

    let mut response = [0u8; 1];
    tcp.read_exact(&mut response).await?;
    match response[0] {
        b'S' => Ok(true),
        b'N' => Ok(false),
        other => Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("Unexpected SSLRequest response: {:?}", other as char),
        )),
    }
}

/// TLS handshake over an accepted SSLRequest.
pub(crate) async fn upgrade_tls(
    tcp: TcpStream,
    host: &str,
    root_cert: Option<&Path>,
) -> PgResult<TlsStream<TcpStream>> {
    let mut roots = RootCertStore::empty();
    let certs: Vec<_> = match root_cert {
        Some(path) => {
            let pem = std::fs::read(path)
                .map_err(|e| PgError::Connection(format!("Cannot read {}: {}", path.display(), e)))?;
            rustls_pemfile::certs(&mut pem.as_slice()).filter_map(Result::ok).collect()
        }
        None => rustls_native_certs::load_native_certs().certs,
    };
    let (added, ignored) = roots.add_parsable_certificates(certs);
    debug!(added, ignored, "loaded TLS root certificates");

    let config = ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();
    let server_name = ServerName::try_from(host.to_string())
        .map_err(|_| PgError::Connection(format!("'{}' is not a valid TLS server name", host)))?;
    let connector = TlsConnector::from(Arc::new(config));

    connector
        .connect(server_name, tcp)
        .await
        .map_err(|e| PgError::Connection(format!("TLS handshake failed: {}", e)))
}

/// Forward a poll call to whichever transport is inside.
macro_rules! each_transport {
    ($self:ident, $method:ident($($arg:expr),*)) => {
        match $self.get_mut() {
            PgStream::Tcp(s) => Pin::new(s).$method($($arg),*),
            PgStream::Tls(s) => Pin::new(s).$method($($arg),*),
            #[cfg(unix)]
            PgStream::Unix(s) => Pin::new(s).$method($($arg),*),
        }
    };
}

impl AsyncRead for PgStream {
    fn poll_read(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        each_transport!(self, poll_read(cx, buf))
    }
}

impl AsyncWrite for PgStream {
    fn poll_write(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        each_transport!(self, poll_write(cx, buf))
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        each_transport!(self, poll_flush(cx))
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        each_transport!(self, poll_shutdown(cx))
    }
}
