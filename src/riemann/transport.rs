//! Connection primitives for the Riemann transport.
//!
//! A [`Connection`] pairs the duplex stream the actor talks through with a
//! handle on the underlying socket, so shutdown can release each one
//! independently. Both halves are trait objects: tests install their own
//! [`ConnectionFactory`] and never touch a real socket.

use std::{
    fmt,
    io::{self, Read, Write},
    net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs},
    sync::Arc,
    time::Duration,
};

use native_tls::{TlsConnector, TlsStream};

/// Host and port of the Riemann server.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

/// Riemann's standard TCP port.
pub const DEFAULT_PORT: u16 = 5555;

impl Default for Endpoint {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: DEFAULT_PORT,
        }
    }
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    fn socket_addrs(&self) -> io::Result<Vec<SocketAddr>> {
        (self.host.as_str(), self.port)
            .to_socket_addrs()
            .map(|iter| iter.collect())
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Whether the platform trust store would have accepted the peer.
///
/// Platform verification is disabled once a validator is installed, so the
/// only condition that can be observed is a missing certificate.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PolicyErrors {
    None,
    NoCertificate,
}

/// Peer certificate material handed to a [`CertificateValidator`].
#[derive(Debug)]
pub struct PeerCertificate<'a> {
    /// DER encoding of the leaf certificate.
    pub certificate: Option<&'a [u8]>,
    /// DER encodings of the presented chain, leaf first.
    pub chain: &'a [Vec<u8>],
    pub policy_errors: PolicyErrors,
}

/// Sole trust decision for TLS connections.
pub trait CertificateValidator: Send + Sync {
    fn validate(&self, peer: &PeerCertificate<'_>) -> bool;
}

impl<F> CertificateValidator for F
where
    F: Fn(&PeerCertificate<'_>) -> bool + Send + Sync,
{
    fn validate(&self, peer: &PeerCertificate<'_>) -> bool {
        self(peer)
    }
}

/// Box a closure as a shareable [`CertificateValidator`].
pub fn validator_fn<F>(f: F) -> Arc<dyn CertificateValidator>
where
    F: Fn(&PeerCertificate<'_>) -> bool + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Readable and writable stream the actor exchanges frames over.
pub trait Duplex: Read + Write + Send {
    /// Release the stream, terminating any session layered on the socket.
    fn close(&mut self) -> io::Result<()>;
}

/// Handle on the raw socket beneath a [`Duplex`].
pub trait SocketHandle: Send {
    fn close(&mut self) -> io::Result<()>;
}

/// Live connection exclusively owned by one actor.
pub struct Connection {
    pub stream: Box<dyn Duplex>,
    pub socket: Box<dyn SocketHandle>,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection").finish_non_exhaustive()
    }
}

/// Parameters a [`ConnectionFactory`] receives.
#[derive(Clone)]
pub struct ConnectOptions {
    pub endpoint: Endpoint,
    pub connect_timeout: Duration,
    /// Read and write timeout for the socket; `None` blocks indefinitely.
    pub io_timeout: Option<Duration>,
    pub validator: Option<Arc<dyn CertificateValidator>>,
    /// Name presented during the TLS handshake.
    pub tls_domain: Option<String>,
}

impl fmt::Debug for ConnectOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectOptions")
            .field("endpoint", &self.endpoint)
            .field("connect_timeout", &self.connect_timeout)
            .field("io_timeout", &self.io_timeout)
            .field("tls", &self.validator.is_some())
            .field("tls_domain", &self.tls_domain)
            .finish()
    }
}

/// Opens connections for the actor.
pub type ConnectionFactory = Arc<dyn Fn(&ConnectOptions) -> io::Result<Connection> + Send + Sync>;

/// The standard factory: [`connect`].
pub fn default_factory() -> ConnectionFactory {
    Arc::new(connect)
}

struct PlainStream(TcpStream);

impl Read for PlainStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.0.read(buf)
    }
}

impl Write for PlainStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.flush()
    }
}

impl Duplex for PlainStream {
    fn close(&mut self) -> io::Result<()> {
        self.0.flush()?;
        self.0.shutdown(Shutdown::Write)
    }
}

struct SecureStream(TlsStream<TcpStream>);

impl Read for SecureStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.0.read(buf)
    }
}

impl Write for SecureStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.flush()
    }
}

impl Duplex for SecureStream {
    fn close(&mut self) -> io::Result<()> {
        self.0.shutdown()
    }
}

struct TcpSocket(TcpStream);

impl SocketHandle for TcpSocket {
    fn close(&mut self) -> io::Result<()> {
        match self.0.shutdown(Shutdown::Both) {
            Err(err) if err.kind() == io::ErrorKind::NotConnected => Ok(()),
            other => other,
        }
    }
}

/// Open a TCP socket to `endpoint` with Nagle's algorithm disabled.
///
/// Every resolved address is tried in turn with `connect_timeout`.
pub fn open_tcp(
    endpoint: &Endpoint,
    connect_timeout: Duration,
    io_timeout: Option<Duration>,
) -> io::Result<TcpStream> {
    let mut last_err = None;
    for addr in endpoint.socket_addrs()? {
        match TcpStream::connect_timeout(&addr, connect_timeout) {
            Ok(stream) => {
                stream.set_nodelay(true)?;
                stream.set_read_timeout(io_timeout)?;
                stream.set_write_timeout(io_timeout)?;
                return Ok(stream);
            }
            Err(err) => last_err = Some(err),
        }
    }
    Err(last_err.unwrap_or_else(|| {
        io::Error::new(
            io::ErrorKind::NotFound,
            format!("{endpoint} did not resolve to any address"),
        )
    }))
}

/// Wrap a connected socket, negotiating TLS when a validator is supplied.
///
/// Without a validator the socket is used as-is. The handshake is bounded by
/// `handshake_timeout`; `io_timeout` is applied to the socket once it
/// completes.
pub fn wrap(
    socket: TcpStream,
    domain: &str,
    validator: Option<&dyn CertificateValidator>,
    handshake_timeout: Duration,
    io_timeout: Option<Duration>,
) -> io::Result<Connection> {
    let handle = TcpSocket(socket.try_clone()?);
    let Some(validator) = validator else {
        return Ok(Connection {
            stream: Box::new(PlainStream(socket)),
            socket: Box::new(handle),
        });
    };

    let connector = TlsConnector::builder()
        .danger_accept_invalid_certs(true)
        .danger_accept_invalid_hostnames(true)
        .build()
        .map_err(io::Error::other)?;
    socket.set_read_timeout(Some(handshake_timeout))?;
    socket.set_write_timeout(Some(handshake_timeout))?;
    let stream = connector.connect(domain, socket).map_err(io::Error::other)?;
    stream.get_ref().set_read_timeout(io_timeout)?;
    stream.get_ref().set_write_timeout(io_timeout)?;

    let leaf = stream
        .peer_certificate()
        .map_err(io::Error::other)?
        .map(|cert| cert.to_der())
        .transpose()
        .map_err(io::Error::other)?;
    let chain: Vec<Vec<u8>> = leaf.iter().cloned().collect();
    let peer = PeerCertificate {
        certificate: leaf.as_deref(),
        chain: &chain,
        policy_errors: if leaf.is_some() {
            PolicyErrors::None
        } else {
            PolicyErrors::NoCertificate
        },
    };
    if !validator.validate(&peer) {
        return Err(io::Error::new(
            io::ErrorKind::PermissionDenied,
            "server certificate rejected by validator",
        ));
    }

    Ok(Connection {
        stream: Box::new(SecureStream(stream)),
        socket: Box::new(handle),
    })
}

/// Open and, when configured, secure a connection to the server.
pub fn connect(options: &ConnectOptions) -> io::Result<Connection> {
    let socket = open_tcp(&options.endpoint, options.connect_timeout, options.io_timeout)?;
    let domain = options
        .tls_domain
        .as_deref()
        .filter(|d| !d.trim().is_empty())
        .unwrap_or(&options.endpoint.host);
    wrap(
        socket,
        domain,
        options.validator.as_deref(),
        options.connect_timeout,
        options.io_timeout,
    )
}

#[cfg(test)]
mod tests {
    use std::{net::TcpListener, sync::mpsc, thread, time::Instant};

    use super::*;
    use native_tls::{Certificate, Identity, TlsAcceptor};
    use rstest::{fixture, rstest};

    const TEST_CERT: &[u8] = include_bytes!("../../tests/fixtures/riemann-test.crt");
    const TEST_KEY: &[u8] = include_bytes!("../../tests/fixtures/riemann-test.key");

    /// Serve a single TLS handshake with the self-signed test identity.
    fn spawn_tls_server(listener: TcpListener) -> thread::JoinHandle<()> {
        let identity = Identity::from_pkcs8(TEST_CERT, TEST_KEY).expect("load test identity");
        let acceptor = TlsAcceptor::new(identity).expect("build acceptor");
        thread::spawn(move || {
            let (stream, _) = listener.accept().expect("accept connection");
            // The client may hang up right after the handshake.
            if let Ok(mut tls) = acceptor.accept(stream) {
                let mut buf = [0u8; 1];
                let _ = tls.read(&mut buf);
            }
        })
    }

    fn tls_options(addr: SocketAddr, validator: Arc<dyn CertificateValidator>) -> ConnectOptions {
        let mut options = options_for(addr);
        options.validator = Some(validator);
        options.tls_domain = Some("localhost".into());
        options
    }

    #[fixture]
    fn tcp_listener() -> TcpListener {
        TcpListener::bind(("127.0.0.1", 0)).expect("bind ephemeral listener")
    }

    fn options_for(addr: SocketAddr) -> ConnectOptions {
        ConnectOptions {
            endpoint: Endpoint::new(addr.ip().to_string(), addr.port()),
            connect_timeout: Duration::from_millis(500),
            io_timeout: Some(Duration::from_millis(250)),
            validator: None,
            tls_domain: None,
        }
    }

    #[rstest]
    fn default_endpoint_is_local_riemann() {
        assert_eq!(Endpoint::default().to_string(), "127.0.0.1:5555");
    }

    #[rstest]
    fn open_tcp_disables_nagle(tcp_listener: TcpListener) {
        let addr = tcp_listener.local_addr().unwrap();
        let stream = open_tcp(
            &Endpoint::new("127.0.0.1", addr.port()),
            Duration::from_millis(500),
            Some(Duration::from_millis(100)),
        )
        .expect("connect");
        assert!(stream.nodelay().expect("query nodelay"));
        assert_eq!(
            stream.read_timeout().expect("query timeout"),
            Some(Duration::from_millis(100))
        );
    }

    #[rstest]
    fn plaintext_connection_round_trips_bytes(tcp_listener: TcpListener) {
        let addr = tcp_listener.local_addr().unwrap();
        thread::spawn(move || {
            let (mut stream, _) = tcp_listener.accept().expect("accept");
            let mut buf = [0u8; 4];
            stream.read_exact(&mut buf).expect("read");
            stream.write_all(&buf).expect("echo");
        });

        let mut conn = connect(&options_for(addr)).expect("connect");
        conn.stream.write_all(b"ping").expect("write");
        let mut buf = [0u8; 4];
        conn.stream.read_exact(&mut buf).expect("read echo");
        assert_eq!(&buf, b"ping");
        conn.stream.close().expect("close stream");
        conn.socket.close().expect("close socket");
    }

    #[rstest]
    fn refused_connection_reports_error() {
        let port = {
            let listener = TcpListener::bind(("127.0.0.1", 0)).unwrap();
            listener.local_addr().unwrap().port()
        };
        let result = open_tcp(
            &Endpoint::new("127.0.0.1", port),
            Duration::from_millis(250),
            None,
        );
        assert!(result.is_err());
    }

    #[rstest]
    fn tls_handshake_is_bounded_by_connect_timeout(tcp_listener: TcpListener) {
        let addr = tcp_listener.local_addr().unwrap();
        let (accepted_tx, accepted_rx) = mpsc::channel();
        thread::spawn(move || {
            let (stream, _) = tcp_listener.accept().expect("accept connection");
            accepted_tx.send(()).expect("signal accepted");
            // Hold the socket open without speaking TLS.
            thread::sleep(Duration::from_secs(2));
            drop(stream);
        });

        let (result_tx, result_rx) = mpsc::channel();
        thread::spawn(move || {
            let mut options = options_for(addr);
            options.io_timeout = None;
            options.validator = Some(validator_fn(|_| true));
            let start = Instant::now();
            let ok = connect(&options).is_ok();
            result_tx
                .send((ok, start.elapsed()))
                .expect("handshake result should send");
        });

        accepted_rx
            .recv_timeout(Duration::from_secs(1))
            .expect("connection must be accepted");
        let (ok, elapsed) = result_rx
            .recv_timeout(Duration::from_secs(2))
            .expect("handshake result should arrive");
        assert!(!ok, "handshake should fail for stalled peer");
        assert!(elapsed < Duration::from_secs(2), "elapsed {elapsed:?}");
    }

    #[rstest]
    fn rejecting_validator_refuses_the_connection(tcp_listener: TcpListener) {
        let addr = tcp_listener.local_addr().unwrap();
        let server = spawn_tls_server(tcp_listener);

        let err = connect(&tls_options(addr, validator_fn(|_| false)))
            .expect_err("validator rejects every peer");
        assert_eq!(err.kind(), io::ErrorKind::PermissionDenied);
        server.join().expect("server thread");
    }

    #[rstest]
    fn accepting_validator_sees_the_leaf_certificate(tcp_listener: TcpListener) {
        let addr = tcp_listener.local_addr().unwrap();
        let server = spawn_tls_server(tcp_listener);
        let (seen_tx, seen_rx) = mpsc::sync_channel(1);
        let validator = validator_fn(move |peer| {
            let _ = seen_tx.try_send((
                peer.certificate.map(<[u8]>::to_vec),
                peer.chain.to_vec(),
                peer.policy_errors,
            ));
            true
        });

        let mut conn = connect(&tls_options(addr, validator)).expect("validator accepts");
        let (leaf, chain, policy_errors) = seen_rx
            .recv_timeout(Duration::from_secs(1))
            .expect("validator was consulted");
        let expected = Certificate::from_pem(TEST_CERT)
            .and_then(|cert| cert.to_der())
            .expect("decode test certificate");
        assert_eq!(leaf.as_deref(), Some(expected.as_slice()));
        assert_eq!(chain, vec![expected]);
        assert_eq!(policy_errors, PolicyErrors::None);

        conn.stream.write_all(b"x").expect("write over tls");
        let _ = conn.stream.close();
        let _ = conn.socket.close();
        server.join().expect("server thread");
    }

    #[rstest]
    fn rejected_peer_surfaces_as_connect_error(tcp_listener: TcpListener) {
        use crate::riemann::{RiemannConfig, RiemannTarget, TransportError};

        let addr = tcp_listener.local_addr().unwrap();
        let server = spawn_tls_server(tcp_listener);
        let mut config = RiemannConfig::default();
        config.connect = tls_options(addr, validator_fn(|_| false));

        let err = RiemannTarget::with_config(config).expect_err("peer is rejected");
        assert!(matches!(
            err,
            TransportError::Connect(ref e) if e.kind() == io::ErrorKind::PermissionDenied
        ));
        server.join().expect("server thread");
    }
}
