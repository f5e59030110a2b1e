//! Connection-accepting transports.
//!
//! The supervisor only talks to the [`Transport`], [`Listener`] and
//! [`Connection`] traits. [`TcpTransport`] is the production implementation
//! over `std::net`, optionally wrapping accepted streams in TLS.
//!
//! # Example
//!
//! ```rust,no_run
//! use harbor_server::{Listener, TcpTransport, Transport};
//!
//! let transport = TcpTransport::new("127.0.0.1");
//! let listener = transport.bind(8080, None).unwrap();
//!
//! while let Some(conn) = listener.accept().unwrap() {
//!     println!("connection from {}", conn.peer_addr());
//! }
//! ```

use std::fmt;
use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use harbor_tasks::Signal;
use rustls::pki_types::pem::PemObject;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::{ServerConfig, ServerConnection, StreamOwned};
use tracing::{debug, trace};

use crate::error::{ServerError, ServerResult};

/// Default bind host.
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Default interval between non-blocking accept polls.
pub const DEFAULT_ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// An accepted connection.
///
/// Dropping a connection also releases it; `close` exists so the release
/// point can be made explicit.
pub trait Connection: Send + 'static {
    /// Releases the underlying resource.
    fn close(&mut self) {}
}

/// A bound listener producing connections.
pub trait Listener: Send + Sync + 'static {
    /// Connection type produced by `accept`.
    type Connection: Connection;

    /// Blocks until the next connection arrives.
    ///
    /// Returns `Ok(None)` once the listener has been stopped.
    fn accept(&self) -> io::Result<Option<Self::Connection>>;

    /// Stops listening. A blocked `accept` returns `Ok(None)`.
    fn stop(&self);

    /// Returns `false` once the listener has stopped.
    fn is_listening(&self) -> bool;
}

/// Something that can bind listeners.
pub trait Transport: Send + Sync + 'static {
    /// Listener type produced by `bind`.
    type Listener: Listener;

    /// Binds a listener on `port`, with TLS if a credential is given.
    fn bind(&self, port: u16, tls: Option<&TlsCredential>) -> io::Result<Self::Listener>;
}

/// Server-side TLS certificate and key.
#[derive(Clone)]
pub struct TlsCredential {
    config: Arc<ServerConfig>,
}

impl TlsCredential {
    /// Wraps a prepared rustls configuration.
    pub fn new(config: Arc<ServerConfig>) -> Self {
        Self { config }
    }

    /// Loads a PEM certificate chain and PEM private key.
    pub fn from_pem_files(cert: impl AsRef<Path>, key: impl AsRef<Path>) -> ServerResult<Self> {
        let cert = cert.as_ref();
        let key = key.as_ref();

        let certs = CertificateDer::pem_file_iter(cert)
            .map_err(|e| ServerError::tls(format!("cannot read {}: {e}", cert.display())))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| ServerError::tls(format!("invalid certificate in {}: {e}", cert.display())))?;
        if certs.is_empty() {
            return Err(ServerError::tls(format!(
                "no certificates found in {}",
                cert.display()
            )));
        }

        let private_key = PrivateKeyDer::from_pem_file(key)
            .map_err(|e| ServerError::tls(format!("cannot read key {}: {e}", key.display())))?;

        let config = ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(certs, private_key)
            .map_err(|e| ServerError::tls(e.to_string()))?;

        Ok(Self::new(Arc::new(config)))
    }

    /// The underlying rustls configuration.
    pub fn server_config(&self) -> &Arc<ServerConfig> {
        &self.config
    }
}

impl fmt::Debug for TlsCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsCredential").finish_non_exhaustive()
    }
}

/// TCP transport over `std::net`.
#[derive(Debug, Clone)]
pub struct TcpTransport {
    host: String,
    accept_poll_interval: Duration,
}

impl TcpTransport {
    /// Creates a transport binding on `host`.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            accept_poll_interval: DEFAULT_ACCEPT_POLL_INTERVAL,
        }
    }

    /// Sets how often a stopped listener is noticed while idle.
    pub fn with_accept_poll_interval(mut self, interval: Duration) -> Self {
        self.accept_poll_interval = interval;
        self
    }

    /// The bind host.
    pub fn host(&self) -> &str {
        &self.host
    }
}

impl Default for TcpTransport {
    fn default() -> Self {
        Self::new(DEFAULT_HOST)
    }
}

impl Transport for TcpTransport {
    type Listener = TcpAcceptor;

    fn bind(&self, port: u16, tls: Option<&TlsCredential>) -> io::Result<TcpAcceptor> {
        let listener = TcpListener::bind((self.host.as_str(), port))?;
        listener.set_nonblocking(true)?;
        debug!(host = %self.host, port, tls = tls.is_some(), "listener bound");

        Ok(TcpAcceptor {
            listener,
            tls: tls.cloned(),
            poll_interval: self.accept_poll_interval,
            stopped: Signal::new(),
        })
    }
}

/// Listener returned by [`TcpTransport::bind`].
///
/// The socket is non-blocking and polled, so `stop` takes effect within one
/// poll interval even while `accept` is waiting.
pub struct TcpAcceptor {
    listener: TcpListener,
    tls: Option<TlsCredential>,
    poll_interval: Duration,
    stopped: Signal,
}

impl TcpAcceptor {
    /// The address actually bound; useful after binding port 0.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    fn wrap(&self, stream: TcpStream, peer: SocketAddr) -> io::Result<TcpConnection> {
        stream.set_nonblocking(false)?;
        let stream = match &self.tls {
            Some(credential) => {
                let conn = ServerConnection::new(Arc::clone(credential.server_config()))
                    .map_err(io::Error::other)?;
                Stream::Tls(Box::new(StreamOwned::new(conn, stream)))
            }
            None => Stream::Plain(stream),
        };
        Ok(TcpConnection {
            peer,
            stream,
            closed: false,
        })
    }
}

impl Listener for TcpAcceptor {
    type Connection = TcpConnection;

    fn accept(&self) -> io::Result<Option<TcpConnection>> {
        loop {
            if self.stopped.is_set() {
                return Ok(None);
            }
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    trace!(peer = %peer, "connection accepted");
                    return self.wrap(stream, peer).map(Some);
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    self.stopped.wait_timeout(self.poll_interval);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
    }

    fn stop(&self) {
        self.stopped.set();
    }

    fn is_listening(&self) -> bool {
        !self.stopped.is_set()
    }
}

impl fmt::Debug for TcpAcceptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TcpAcceptor")
            .field("local_addr", &self.listener.local_addr().ok())
            .field("tls", &self.tls.is_some())
            .field("listening", &self.is_listening())
            .finish()
    }
}

enum Stream {
    Plain(TcpStream),
    Tls(Box<StreamOwned<ServerConnection, TcpStream>>),
}

/// A TCP connection, plain or TLS.
///
/// With TLS the handshake runs lazily on the first read or write, so it
/// happens on the worker thread rather than the accept thread.
pub struct TcpConnection {
    peer: SocketAddr,
    stream: Stream,
    closed: bool,
}

impl TcpConnection {
    /// Remote address.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Whether the connection is wrapped in TLS.
    pub fn is_tls(&self) -> bool {
        matches!(self.stream, Stream::Tls(_))
    }

    /// Sets the read timeout on the underlying socket.
    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        self.socket().set_read_timeout(timeout)
    }

    /// Sets the write timeout on the underlying socket.
    pub fn set_write_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        self.socket().set_write_timeout(timeout)
    }

    fn socket(&self) -> &TcpStream {
        match &self.stream {
            Stream::Plain(s) => s,
            Stream::Tls(s) => &s.sock,
        }
    }
}

impl Read for TcpConnection {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match &mut self.stream {
            Stream::Plain(s) => s.read(buf),
            Stream::Tls(s) => s.read(buf),
        }
    }
}

impl Write for TcpConnection {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match &mut self.stream {
            Stream::Plain(s) => s.write(buf),
            Stream::Tls(s) => s.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match &mut self.stream {
            Stream::Plain(s) => s.flush(),
            Stream::Tls(s) => s.flush(),
        }
    }
}

impl Connection for TcpConnection {
    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        if let Stream::Tls(tls) = &mut self.stream {
            let tls = &mut **tls;
            tls.conn.send_close_notify();
            while tls.conn.wants_write() {
                match tls.conn.write_tls(&mut tls.sock) {
                    Ok(0) | Err(_) => break,
                    Ok(_) => {}
                }
            }
        }
        // Peer may already be gone.
        let _ = self.socket().shutdown(Shutdown::Both);
        trace!(peer = %self.peer, "connection closed");
    }
}

impl fmt::Debug for TcpConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TcpConnection")
            .field("peer", &self.peer)
            .field("tls", &self.is_tls())
            .field("closed", &self.closed)
            .finish()
    }
}
