//! Raw byte stream to the hub: TCP, optionally wrapped in TLS.
//!
//! Nothing here knows about HTTP or WebSocket framing.

use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;

use rustls::pki_types::ServerName;
use rustls::{ClientConfig, ClientConnection, RootCertStore, StreamOwned};

use crate::config::{Endpoint, Timeouts};
use crate::error::Error;

/// A blocking duplex byte stream that can be shut down.
pub trait Transport: Read + Write {
    /// Close the write side and release the socket.
    fn shutdown(&mut self) -> io::Result<()>;
}

/// Plain TCP or TLS-over-TCP, chosen by [`Endpoint::secure`].
pub enum MaybeTlsStream {
    Plain(TcpStream),
    Tls(Box<StreamOwned<ClientConnection, TcpStream>>),
}

impl Read for MaybeTlsStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::Plain(stream) => stream.read(buf),
            Self::Tls(stream) => stream.read(buf),
        }
    }
}

impl Write for MaybeTlsStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::Plain(stream) => stream.write(buf),
            Self::Tls(stream) => stream.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::Plain(stream) => stream.flush(),
            Self::Tls(stream) => stream.flush(),
        }
    }
}

impl Transport for MaybeTlsStream {
    fn shutdown(&mut self) -> io::Result<()> {
        match self {
            Self::Plain(stream) => stream.shutdown(Shutdown::Both),
            Self::Tls(stream) => {
                stream.conn.send_close_notify();
                stream.flush()?;
                stream.sock.shutdown(Shutdown::Both)
            }
        }
    }
}

/// Open the byte stream for `endpoint`.
///
/// TLS uses the bundled web PKI roots and validates the certificate against
/// `endpoint.host`. The TLS handshake is completed here so certificate
/// failures surface as connect errors.
///
/// # Errors
///
/// [`Error::Connect`] for resolution, timeout, refusal, or TLS handshake
/// failure; [`Error::InvalidUrl`] when the host is not a valid server name;
/// [`Error::Tls`] when the TLS client cannot be configured.
pub fn connect(endpoint: &Endpoint, timeouts: &Timeouts) -> Result<MaybeTlsStream, Error> {
    let addr = endpoint.authority();
    let tcp = connect_tcp(endpoint, timeouts.connect)?;

    let configure = |tcp: &TcpStream| -> io::Result<()> {
        tcp.set_nodelay(true)?;
        tcp.set_read_timeout(timeouts.read)
    };
    configure(&tcp).map_err(|source| Error::Connect {
        addr: addr.clone(),
        source,
    })?;

    if !endpoint.secure {
        return Ok(MaybeTlsStream::Plain(tcp));
    }

    let server_name = ServerName::try_from(endpoint.host.clone())
        .map_err(|error| Error::InvalidUrl(format!("{}: {error}", endpoint.host)))?;
    let conn = ClientConnection::new(tls_config()?, server_name)?;
    let mut stream = StreamOwned::new(conn, tcp);

    while stream.conn.is_handshaking() {
        stream
            .conn
            .complete_io(&mut stream.sock)
            .map_err(|source| Error::Connect {
                addr: addr.clone(),
                source,
            })?;
    }
    tracing::debug!(%addr, "tls established");

    Ok(MaybeTlsStream::Tls(Box::new(stream)))
}

/// Try each resolved address once, in order.
fn connect_tcp(endpoint: &Endpoint, timeout: Duration) -> Result<TcpStream, Error> {
    let addr = endpoint.authority();
    let candidates = (endpoint.host.as_str(), endpoint.port)
        .to_socket_addrs()
        .map_err(|source| Error::Connect {
            addr: addr.clone(),
            source,
        })?;

    let mut last_error = None;
    for candidate in candidates {
        match TcpStream::connect_timeout(&candidate, timeout) {
            Ok(stream) => {
                tracing::debug!(%candidate, "tcp connected");
                return Ok(stream);
            }
            Err(error) => {
                tracing::debug!(%candidate, %error, "tcp connect attempt failed");
                last_error = Some(error);
            }
        }
    }

    Err(Error::Connect {
        addr,
        source: last_error.unwrap_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, "host resolved to no addresses")
        }),
    })
}

fn tls_config() -> Result<Arc<ClientConfig>, Error> {
    let roots = RootCertStore {
        roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
    };
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let config = ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()?
        .with_root_certificates(roots)
        .with_no_client_auth();
    Ok(Arc::new(config))
}

#[cfg(test)]
#[path = "transport_helpers_test.rs"]
pub mod test_helpers;

#[cfg(test)]
#[path = "transport_test.rs"]
mod tests;
