//! Upstream DNS lookups.
//!
//! Provides abstraction over the last resolution tier to enable:
//! - Testing the dispatcher with a mock upstream
//! - UDP, TCP and DNS-over-TLS forwarding through [`UpstreamClient`]

use std::fmt;
use std::future::Future;
use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use hickory_proto::op::{Message, MessageType, OpCode, Query, ResponseCode};
use hickory_proto::rr::{Name, RData};
use hickory_proto::serialize::binary::{BinDecodable, BinEncodable};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpStream, UdpSocket};
use tokio_rustls::TlsConnector;
use tokio_rustls::rustls::ClientConfig;
use tokio_rustls::rustls::pki_types::ServerName;
use tracing::{debug, warn};

use crate::config::UpstreamSettings;
use crate::error::{ConfigError, Result, UpstreamError, ValidationError};
use crate::hosts::QueryType;
use crate::network::{client_config, read_frame, write_frame};

/// Port used when an upstream address does not carry one.
pub const DEFAULT_DNS_PORT: u16 = 53;

/// Default port of `tls://` upstream servers.
pub const DEFAULT_DOT_PORT: u16 = 853;

/// Receive buffer for UDP responses.
pub const MAX_UDP_DNS_SIZE: usize = 4096;

/// Trait for the upstream resolution tier.
///
/// `Ok(vec![])` means the upstream has no record of the requested type.
pub trait UpstreamLookup: Send + Sync + Clone + 'static {
    /// Resolve `domain` to the addresses of `query_type`.
    fn lookup(
        &self,
        domain: &str,
        query_type: QueryType,
    ) -> impl Future<Output = Result<Vec<String>>> + Send;
}

/// Transport used to reach an upstream server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Udp,
    Tcp,
    /// DNS-over-TLS.
    Tls,
}

impl Transport {
    pub const fn scheme(self) -> &'static str {
        match self {
            Self::Udp => "udp",
            Self::Tcp => "tcp",
            Self::Tls => "tls",
        }
    }

    pub const fn default_port(self) -> u16 {
        match self {
            Self::Udp | Self::Tcp => DEFAULT_DNS_PORT,
            Self::Tls => DEFAULT_DOT_PORT,
        }
    }
}

/// A parsed upstream server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamServer {
    pub transport: Transport,
    /// `host:port`, with IPv6 hosts in brackets.
    pub address: String,
}

impl UpstreamServer {
    /// Parse `udp://`, `tcp://` or `tls://host:port`, or a bare `host[:port]`.
    ///
    /// Bare addresses use UDP. A missing port defaults to 53, or 853 for
    /// `tls://`.
    pub fn parse(raw: &str) -> std::result::Result<Self, ValidationError> {
        let raw = raw.trim();
        let invalid = || ValidationError::InvalidUpstream {
            server: raw.to_string(),
        };

        let (transport, address) = match raw.split_once("://") {
            Some((scheme, rest)) => {
                let transport = match scheme.to_ascii_lowercase().as_str() {
                    "udp" => Transport::Udp,
                    "tcp" => Transport::Tcp,
                    "tls" => Transport::Tls,
                    _ => {
                        return Err(ValidationError::UnsupportedUpstreamScheme {
                            server: raw.to_string(),
                            scheme: scheme.to_string(),
                        });
                    }
                };
                (transport, with_default_port(rest, transport.default_port()))
            }
            None => (Transport::Udp, with_default_port(raw, DEFAULT_DNS_PORT)),
        };

        let (host, port) = split_host_port(&address).ok_or_else(invalid)?;
        if host.is_empty() || host.contains(char::is_whitespace) || port.parse::<u16>().is_err()
        {
            return Err(invalid());
        }

        Ok(Self { transport, address })
    }

    /// Host part of the address, without IPv6 brackets.
    pub fn host(&self) -> &str {
        split_host_port(&self.address).map_or(self.address.as_str(), |(host, _)| host)
    }
}

impl fmt::Display for UpstreamServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.transport.scheme(), self.address)
    }
}

impl FromStr for UpstreamServer {
    type Err = ValidationError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Split `host:port` or `[v6]:port`.
///
/// Fails when the port is missing or an unbracketed host has several colons.
fn split_host_port(address: &str) -> Option<(&str, &str)> {
    if let Some(rest) = address.strip_prefix('[') {
        let (host, tail) = rest.split_once(']')?;
        let port = tail.strip_prefix(':')?;
        return Some((host, port));
    }

    let (host, port) = address.split_once(':')?;
    (!port.contains(':')).then_some((host, port))
}

/// Add the default DNS port to a server address when it has none.
///
/// - `"127.0.0.1:5553"` is unchanged
/// - `"127.0.0.1"` becomes `"127.0.0.1:53"`
/// - `"2001:db8::1"` becomes `"[2001:db8::1]:53"`
/// - scheme-prefixed addresses such as `"tls://1.1.1.1"` are unchanged
pub fn normalize_server_address(server: &str) -> String {
    if server.contains("://") {
        return server.to_string();
    }
    with_default_port(server, DEFAULT_DNS_PORT)
}

fn with_default_port(server: &str, port: u16) -> String {
    if split_host_port(server).is_some() {
        server.to_string()
    } else if server.starts_with('[') && server.ends_with(']') {
        format!("{server}:{port}")
    } else if server.contains(':') {
        format!("[{server}]:{port}")
    } else {
        format!("{server}:{port}")
    }
}

/// Upstream client over UDP, TCP or DNS-over-TLS.
///
/// Servers are tried in order, each with its own timeout. A truncated UDP
/// answer is retried over TCP on the same server.
#[derive(Debug, Clone)]
pub struct UpstreamClient {
    servers: Arc<[UpstreamServer]>,
    timeout: Duration,
    tls: Arc<ClientConfig>,
}

impl UpstreamClient {
    pub fn new(servers: Vec<UpstreamServer>, timeout: Duration) -> Self {
        Self {
            servers: servers.into(),
            timeout,
            tls: client_config(),
        }
    }

    /// Verify `tls://` servers with `config` instead of the webpki roots.
    #[must_use]
    pub fn with_tls_config(mut self, config: Arc<ClientConfig>) -> Self {
        self.tls = config;
        self
    }

    /// Build the client from the `upstream` configuration section.
    pub fn from_settings(
        settings: &UpstreamSettings,
    ) -> std::result::Result<Self, ValidationError> {
        Ok(Self::new(settings.parsed_servers()?, settings.timeout))
    }

    pub fn servers(&self) -> &[UpstreamServer] {
        &self.servers
    }

    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Send `query` to one server and return its response.
    pub async fn exchange(
        &self,
        server: &UpstreamServer,
        query: &Message,
    ) -> std::result::Result<Message, UpstreamError> {
        let bytes = query.to_vec().map_err(|source| UpstreamError::Protocol {
            server: server.to_string(),
            source,
        })?;

        match server.transport {
            Transport::Udp => {}
            Transport::Tcp => {
                return self.attempt(server, exchange_tcp(&server.address, &bytes)).await;
            }
            Transport::Tls => {
                let connector = TlsConnector::from(Arc::clone(&self.tls));
                return self
                    .attempt(server, exchange_tls(connector, server, &bytes))
                    .await;
            }
        }

        let response = self
            .attempt(server, exchange_udp(&server.address, &bytes))
            .await?;
        if response.truncated() {
            debug!(server = %server, "truncated UDP response, retrying over TCP");
            return self.attempt(server, exchange_tcp(&server.address, &bytes)).await;
        }
        Ok(response)
    }

    async fn attempt<F>(
        &self,
        server: &UpstreamServer,
        exchange: F,
    ) -> std::result::Result<Message, UpstreamError>
    where
        F: Future<Output = io::Result<Vec<u8>>>,
    {
        let bytes = tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| UpstreamError::Timeout {
                server: server.to_string(),
                timeout: self.timeout,
            })?
            .map_err(|source| UpstreamError::Io {
                server: server.to_string(),
                source,
            })?;

        Message::from_bytes(&bytes).map_err(|source| UpstreamError::Protocol {
            server: server.to_string(),
            source,
        })
    }
}

impl UpstreamLookup for UpstreamClient {
    async fn lookup(&self, domain: &str, query_type: QueryType) -> Result<Vec<String>> {
        let query = build_query(domain, query_type)?;

        let mut last = None;
        for server in self.servers.iter() {
            let result = self
                .exchange(server, &query)
                .await
                .and_then(|response| extract_addresses(server, &response, query_type));
            match result {
                Ok(addresses) => {
                    debug!(server = %server, domain, %query_type, count = addresses.len(), "upstream answered");
                    return Ok(addresses);
                }
                Err(err) => {
                    warn!(server = %server, domain, %query_type, error = %err, "upstream query failed");
                    last = Some(err);
                }
            }
        }

        match last {
            Some(last) => Err(UpstreamError::Exhausted {
                attempts: self.servers.len(),
                last: Box::new(last),
            }
            .into()),
            None => Err(ConfigError::Validation(ValidationError::EmptyUpstreams).into()),
        }
    }
}

/// Build a recursive query for `domain`.
pub fn build_query(domain: &str, query_type: QueryType) -> Result<Message> {
    let mut name = Name::from_str(domain.trim())?;
    name.set_fqdn(true);

    let mut message = Message::new();
    message
        .set_id(rand::random())
        .set_message_type(MessageType::Query)
        .set_op_code(OpCode::Query)
        .set_recursion_desired(true);
    message.add_query(Query::query(name, query_type.into()));
    Ok(message)
}

/// Collect the answer addresses of `query_type`.
///
/// NXDOMAIN is an empty answer; any other error code fails the server.
fn extract_addresses(
    server: &UpstreamServer,
    response: &Message,
    query_type: QueryType,
) -> std::result::Result<Vec<String>, UpstreamError> {
    match response.response_code() {
        ResponseCode::NoError => {}
        ResponseCode::NXDomain => return Ok(Vec::new()),
        code => {
            return Err(UpstreamError::ResponseCode {
                server: server.to_string(),
                code,
            });
        }
    }

    Ok(response
        .answers()
        .iter()
        .filter_map(|record| match (query_type, record.data()) {
            (QueryType::A, RData::A(a)) => Some(a.0.to_string()),
            (QueryType::AAAA, RData::AAAA(aaaa)) => Some(aaaa.0.to_string()),
            _ => None,
        })
        .collect())
}

async fn resolve_address(address: &str) -> io::Result<SocketAddr> {
    tokio::net::lookup_host(address).await?.next().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::NotFound,
            format!("no socket address for {address}"),
        )
    })
}

async fn exchange_udp(address: &str, query: &[u8]) -> io::Result<Vec<u8>> {
    let target = resolve_address(address).await?;
    let local: SocketAddr = if target.is_ipv4() {
        (Ipv4Addr::UNSPECIFIED, 0).into()
    } else {
        (Ipv6Addr::UNSPECIFIED, 0).into()
    };

    let socket = UdpSocket::bind(local).await?;
    socket.connect(target).await?;
    socket.send(query).await?;

    let mut buf = vec![0u8; MAX_UDP_DNS_SIZE];
    loop {
        let len = socket.recv(&mut buf).await?;
        // Ignore stray datagrams that do not carry our query id
        if len >= 2 && buf[..2] == query[..2] {
            buf.truncate(len);
            return Ok(buf);
        }
    }
}

async fn exchange_tcp(address: &str, query: &[u8]) -> io::Result<Vec<u8>> {
    let target = resolve_address(address).await?;
    let stream = TcpStream::connect(target).await?;
    exchange_stream(stream, query).await
}

async fn exchange_tls(
    connector: TlsConnector,
    server: &UpstreamServer,
    query: &[u8],
) -> io::Result<Vec<u8>> {
    let name = ServerName::try_from(server.host().to_string())
        .map_err(|err| io::Error::new(io::ErrorKind::InvalidInput, err))?;
    let target = resolve_address(&server.address).await?;
    let tcp = TcpStream::connect(target).await?;
    let stream = connector.connect(name, tcp).await?;
    exchange_stream(stream, query).await
}

/// Send one framed query and read the framed response.
async fn exchange_stream<S>(mut stream: S, query: &[u8]) -> io::Result<Vec<u8>>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    write_frame(&mut stream, query).await?;

    read_frame(&mut stream).await?.ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "connection closed before response",
        )
    })
}
