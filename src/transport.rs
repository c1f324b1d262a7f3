//! # Transport
//!
//! Socket clients delivering serialized documents to the CloudWatch agent

use super::error::Error;
use std::io::{self, Write};
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, TcpStream, ToSocketAddrs, UdpSocket};
use std::sync::{Mutex, PoisonError};
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

pub const DEFAULT_AGENT_HOST: &str = "0.0.0.0";
pub const DEFAULT_AGENT_PORT: u16 = 25888;

/// Connection attempts before a send gives up
pub const MAX_CONNECT_ATTEMPTS: u32 = 10;
pub const CONNECT_RETRY_DELAY: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Tcp,
    Udp,
}

/// Where the agent listens
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
    pub protocol: Protocol,
}

impl Default for Endpoint {
    fn default() -> Self {
        Self {
            host: DEFAULT_AGENT_HOST.to_owned(),
            port: DEFAULT_AGENT_PORT,
            protocol: Protocol::Tcp,
        }
    }
}

impl Endpoint {
    /// Parse an endpoint such as `tcp://127.0.0.1:25888` or `udp://agent:25888`
    ///
    /// Anything unparsable, missing a host or port, or using another scheme falls back to
    /// the default TCP endpoint
    pub fn parse(endpoint: &str) -> Endpoint {
        if endpoint.is_empty() {
            return Endpoint::default();
        }

        let url = match url::Url::parse(endpoint) {
            Ok(url) => url,
            Err(error) => {
                warn!(endpoint, %error, "Failed to parse the agent endpoint, falling back to the default TCP endpoint");
                return Endpoint::default();
            }
        };

        let protocol = match url.scheme() {
            "tcp" => Protocol::Tcp,
            "udp" => Protocol::Udp,
            scheme => {
                warn!(
                    endpoint,
                    scheme,
                    "Unsupported agent endpoint protocol, use tcp or udp. Falling back to the default TCP endpoint"
                );
                return Endpoint::default();
            }
        };

        match (url.host_str(), url.port()) {
            (Some(host), Some(port)) if !host.is_empty() => Endpoint {
                host: host.to_owned(),
                port,
                protocol,
            },
            _ => {
                warn!(endpoint, "Agent endpoint needs a host and port, falling back to the default TCP endpoint");
                Endpoint::default()
            }
        }
    }

    /// `host:port`, IPv6 hosts keep their brackets
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Persistent TCP connection, established lazily and re-established after a failed write
///
/// The mutex serializes concurrent senders so documents never interleave on the wire
pub struct TcpClient {
    endpoint: Endpoint,
    connection: Mutex<Option<TcpStream>>,
    max_attempts: u32,
    retry_delay: Duration,
}

impl TcpClient {
    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            connection: Mutex::new(None),
            max_attempts: MAX_CONNECT_ATTEMPTS,
            retry_delay: CONNECT_RETRY_DELAY,
        }
    }

    pub fn with_retry_policy(mut self, max_attempts: u32, retry_delay: Duration) -> Self {
        self.max_attempts = max_attempts.max(1);
        self.retry_delay = retry_delay;
        self
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Write the whole message, connecting first if needed
    ///
    /// A failed write drops the connection without retrying, the next send reconnects
    pub fn send_message(&self, message: &[u8]) -> Result<(), Error> {
        let mut connection = self.connection.lock().unwrap_or_else(PoisonError::into_inner);

        let mut stream = match connection.take() {
            Some(stream) => stream,
            None => self.connect()?,
        };

        if let Err(error) = stream.write_all(message) {
            warn!(address = %self.endpoint.address(), %error, "Failed to send message, dropping connection");
            return Err(error.into());
        }

        *connection = Some(stream);
        Ok(())
    }

    fn connect(&self) -> Result<TcpStream, Error> {
        let addr = self.endpoint.address();
        let mut last_error = None;

        for attempt in 1..=self.max_attempts {
            match TcpStream::connect(&addr) {
                Ok(stream) => {
                    debug!(%addr, attempt, "TcpClient connected");
                    return Ok(stream);
                }
                Err(error) => {
                    let max_attempts = self.max_attempts;
                    warn!(%addr, %error, "Waiting for CloudWatch Agent to be reachable... ({attempt}/{max_attempts})");
                    last_error = Some(error);
                }
            }
            if attempt < self.max_attempts {
                thread::sleep(self.retry_delay);
            }
        }

        Err(Error::Connect {
            addr,
            attempts: self.max_attempts,
            source: last_error.unwrap_or_else(|| io::Error::other("no connection attempt was made")),
        })
    }
}

/// Connectionless client, every message resolves the address and uses a fresh socket
pub struct UdpClient {
    endpoint: Endpoint,
}

impl UdpClient {
    pub fn new(endpoint: Endpoint) -> Self {
        Self { endpoint }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn send_message(&self, message: &[u8]) -> Result<(), Error> {
        let addr = self.endpoint.address();
        let target = addr
            .to_socket_addrs()
            .map_err(|source| Error::Resolve {
                addr: addr.clone(),
                source,
            })?
            .next()
            .ok_or_else(|| Error::NoAddress(addr.clone()))?;

        let local: SocketAddr = if target.is_ipv4() {
            (Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (Ipv6Addr::UNSPECIFIED, 0).into()
        };

        let socket = UdpSocket::bind(local)?;
        socket.connect(target)?;
        socket.send(message)?;
        debug!(%addr, bytes = message.len(), "Message sent via UDP");
        Ok(())
    }
}

pub enum SocketClient {
    Tcp(TcpClient),
    Udp(UdpClient),
}

impl SocketClient {
    pub fn for_endpoint(endpoint: Endpoint) -> Self {
        debug!(?endpoint, "Getting socket client for connection");
        match endpoint.protocol {
            Protocol::Tcp => SocketClient::Tcp(TcpClient::new(endpoint)),
            Protocol::Udp => SocketClient::Udp(UdpClient::new(endpoint)),
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        match self {
            SocketClient::Tcp(client) => client.endpoint(),
            SocketClient::Udp(client) => client.endpoint(),
        }
    }

    pub fn send_message(&self, message: &[u8]) -> Result<(), Error> {
        match self {
            SocketClient::Tcp(client) => client.send_message(message),
            SocketClient::Udp(client) => client.send_message(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader};
    use std::net::TcpListener;
    use std::time::Instant;

    #[test]
    fn parse_endpoints() {
        assert_eq!(
            Endpoint::parse("tcp://127.0.0.1:4000"),
            Endpoint {
                host: "127.0.0.1".into(),
                port: 4000,
                protocol: Protocol::Tcp
            }
        );
        assert_eq!(
            Endpoint::parse("udp://agent.local:25888"),
            Endpoint {
                host: "agent.local".into(),
                port: 25888,
                protocol: Protocol::Udp
            }
        );
        assert_eq!(Endpoint::parse("tcp://[::1]:25888").address(), "[::1]:25888");
    }

    #[test]
    fn bad_endpoints_fall_back_to_default() {
        for endpoint in ["", "not a url", "http://127.0.0.1:25888", "tcp://127.0.0.1", "udp://:25888"] {
            assert_eq!(Endpoint::parse(endpoint), Endpoint::default(), "{endpoint}");
        }
        assert_eq!(Endpoint::default().address(), "0.0.0.0:25888");
    }

    #[test]
    fn tcp_client_reuses_one_connection() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            BufReader::new(stream)
                .lines()
                .take(2)
                .collect::<Result<Vec<_>, _>>()
                .unwrap()
        });

        let client = SocketClient::for_endpoint(Endpoint::parse(&format!("tcp://127.0.0.1:{port}")));
        client.send_message(b"{\"first\":1}\n").unwrap();
        client.send_message(b"{\"second\":2}\n").unwrap();

        assert_eq!(server.join().unwrap(), vec!["{\"first\":1}", "{\"second\":2}"]);
    }

    #[test]
    fn tcp_client_reconnects_after_write_failure() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = thread::spawn(move || {
            // The agent restarts: the first connection is closed right away
            drop(listener.accept().unwrap());
            let (stream, _) = listener.accept().unwrap();
            let mut line = String::new();
            BufReader::new(stream).read_line(&mut line).unwrap();
            line
        });

        let client = TcpClient::new(Endpoint::parse(&format!("tcp://127.0.0.1:{port}")))
            .with_retry_policy(3, Duration::from_millis(20));

        let mut failed = false;
        for _ in 0..100 {
            match client.send_message(b"{\"before\":1}\n") {
                Ok(()) => thread::sleep(Duration::from_millis(10)),
                Err(error) => {
                    assert!(matches!(error, Error::Io(_)), "{error}");
                    failed = true;
                    break;
                }
            }
        }
        assert!(failed, "writes to a closed peer never failed");

        client.send_message(b"{\"after\":1}\n").unwrap();
        assert_eq!(server.join().unwrap(), "{\"after\":1}\n");
    }

    #[test]
    fn tcp_client_exhausts_retries() {
        // Grab a free port and release it so nothing listens there
        let port = TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap().port();

        let client = TcpClient::new(Endpoint::parse(&format!("tcp://127.0.0.1:{port}")))
            .with_retry_policy(3, Duration::from_millis(20));

        let started = Instant::now();
        let result = client.send_message(b"lost\n");
        assert!(matches!(result, Err(Error::Connect { attempts: 3, .. })));
        assert!(started.elapsed() >= Duration::from_millis(40));
    }

    #[test]
    fn udp_client_sends_datagram() {
        let receiver = UdpSocket::bind("127.0.0.1:0").unwrap();
        receiver.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
        let port = receiver.local_addr().unwrap().port();

        let client = SocketClient::for_endpoint(Endpoint::parse(&format!("udp://127.0.0.1:{port}")));
        client.send_message(b"{\"udp\":true}\n").unwrap();

        let mut buf = [0u8; 64];
        let len = receiver.recv(&mut buf).unwrap();
        assert_eq!(&buf[..len], b"{\"udp\":true}\n");
    }

    #[test]
    fn udp_client_fails_without_retry() {
        let client = UdpClient::new(Endpoint {
            host: "agent.invalid".into(),
            port: 25888,
            protocol: Protocol::Udp,
        });

        let started = Instant::now();
        assert!(client.send_message(b"lost\n").is_err());
        assert!(started.elapsed() < CONNECT_RETRY_DELAY);
    }
}
