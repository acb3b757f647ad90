//! DNS responder.
//!
//! [`QueryHandler`] turns a request into a response through the
//! [`Dispatcher`]; [`Server`] runs the UDP, TCP and optional DNS-over-TLS
//! listeners around it.

use std::future::Future;
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use hickory_proto::op::{Message, MessageType, OpCode, ResponseCode};
use hickory_proto::rr::rdata::{A, AAAA};
use hickory_proto::rr::{RData, Record};
use hickory_proto::serialize::binary::{BinDecodable, BinEncodable};
use metrics::counter;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, UdpSocket};
use tokio::time::timeout;
use tokio_rustls::TlsAcceptor;
use tracing::{debug, error, info, instrument, warn};

use crate::config::Config;
use crate::dns::{Dispatcher, UpstreamLookup};
use crate::error::{ConfigError, Result, ValidationError};
use crate::hosts::QueryType;
use crate::network::{load_acceptor, read_frame, write_frame};

/// Largest UDP response when the client does not advertise EDNS.
pub const MAX_UDP_RESPONSE_SIZE: usize = 512;

/// Receive buffer for UDP queries.
const UDP_RECV_BUFFER: usize = 4096;

/// Idle timeout between two queries on a stream connection.
const STREAM_IDLE_TIMEOUT: Duration = Duration::from_secs(10);

/// Pause before retrying a listener after an accept or receive error.
const LISTENER_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Timeout for the TLS handshake of a DoT connection.
const TLS_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// DNS query handler answering A and AAAA questions from the dispatcher.
pub struct QueryHandler<U> {
    dispatcher: Arc<Dispatcher<U>>,
    ttl: u32,
}

impl<U> Clone for QueryHandler<U> {
    fn clone(&self) -> Self {
        Self {
            dispatcher: Arc::clone(&self.dispatcher),
            ttl: self.ttl,
        }
    }
}

impl<U> QueryHandler<U>
where
    U: UpstreamLookup,
{
    /// Create a new query handler answering with `ttl` seconds.
    pub const fn new(dispatcher: Arc<Dispatcher<U>>, ttl: u32) -> Self {
        Self { dispatcher, ttl }
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher<U>> {
        &self.dispatcher
    }

    /// Handle a DNS query and return the response.
    ///
    /// - no question: `FORMERR`
    /// - a question other than A or AAAA: `NOTIMP`
    /// - upstream failure: `SERVFAIL`
    /// - otherwise `NOERROR`, possibly without answers
    #[instrument(skip(self, query), fields(id = query.id(), domain, record_type))]
    pub async fn handle_query(&self, query: &Message) -> Message {
        let Some(question) = query.queries().first() else {
            warn!("query has no questions");
            return response_for(query, ResponseCode::FormErr);
        };

        let name = question.name();
        let record_type = question.query_type();
        let span = tracing::Span::current();
        span.record("domain", tracing::field::display(name));
        span.record("record_type", tracing::field::display(record_type));
        counter!("hostgate_queries_total", "record_type" => record_type.to_string()).increment(1);

        let Ok(query_type) = QueryType::try_from(record_type) else {
            debug!("unsupported query type");
            return response_for(query, ResponseCode::NotImp);
        };

        let answer = match self.dispatcher.answer(&name.to_string(), query_type).await {
            Ok(answer) => answer,
            Err(err) => {
                warn!(error = %err, "resolution failed");
                return response_for(query, ResponseCode::ServFail);
            }
        };

        let mut response = response_for(query, ResponseCode::NoError);
        for address in &answer.addresses {
            let rdata = match (query_type, address.parse::<IpAddr>()) {
                (QueryType::A, Ok(IpAddr::V4(ip))) => RData::A(A(ip)),
                (QueryType::AAAA, Ok(IpAddr::V6(ip))) => RData::AAAA(AAAA(ip)),
                _ => {
                    warn!(%address, "skipping address that does not match the query type");
                    continue;
                }
            };
            response.add_answer(Record::from_rdata(name.clone(), self.ttl, rdata));
        }
        response
    }

    /// Decode, handle and encode a wire-format query.
    ///
    /// A query that cannot be decoded but carries a header id gets a
    /// `FORMERR`; anything shorter is dropped.
    pub async fn handle_bytes(&self, bytes: &[u8]) -> Option<Vec<u8>> {
        let response = match Message::from_bytes(bytes) {
            Ok(query) => self.handle_query(&query).await,
            Err(err) => {
                debug!(error = %err, "failed to parse DNS message");
                let id = bytes.get(..2)?;
                let mut response = Message::new();
                response
                    .set_id(u16::from_be_bytes([id[0], id[1]]))
                    .set_message_type(MessageType::Response)
                    .set_response_code(ResponseCode::FormErr);
                response
            }
        };

        match response.to_vec() {
            Ok(bytes) => Some(bytes),
            Err(err) => {
                error!(error = %err, "failed to encode DNS response");
                None
            }
        }
    }
}

/// Build an empty response echoing the query header and questions.
fn response_for(query: &Message, code: ResponseCode) -> Message {
    let mut response = Message::new();
    response
        .set_id(query.id())
        .set_message_type(MessageType::Response)
        .set_op_code(OpCode::Query)
        .set_recursion_desired(query.recursion_desired())
        .set_recursion_available(true)
        .set_response_code(code);
    response.add_queries(query.queries().iter().cloned());
    response
}

/// Fit a response in a UDP datagram, truncating it when too large.
fn fit_udp(query: &[u8], response: Vec<u8>) -> Vec<u8> {
    let limit = Message::from_bytes(query)
        .ok()
        .and_then(|q| q.extensions().as_ref().map(|edns| usize::from(edns.max_payload())))
        .map_or(MAX_UDP_RESPONSE_SIZE, |payload| payload.max(MAX_UDP_RESPONSE_SIZE));
    if response.len() <= limit {
        return response;
    }

    let Ok(mut message) = Message::from_bytes(&response) else {
        return response;
    };
    drop(message.take_answers());
    message.set_truncated(true);
    message.to_vec().unwrap_or(response)
}

/// DNS server bound to its listeners.
pub struct Server<U> {
    handler: QueryHandler<U>,
    udp: UdpSocket,
    tcp: TcpListener,
    dot: Option<(TcpListener, TlsAcceptor)>,
}

impl<U> Server<U>
where
    U: UpstreamLookup,
{
    /// Bind the listeners described by `config`.
    pub async fn bind(config: &Config, dispatcher: Arc<Dispatcher<U>>) -> Result<Self> {
        let ip = config.server.ip().map_err(ConfigError::Validation)?;
        let addr = SocketAddr::new(ip, config.server.port);

        let udp = UdpSocket::bind(addr).await?;
        let tcp = TcpListener::bind(addr).await?;

        let dot = if config.dot.enabled {
            let (Some(cert), Some(key)) = (&config.dot.tls.cert, &config.dot.tls.key) else {
                return Err(ConfigError::Validation(ValidationError::MissingTlsMaterial).into());
            };
            let acceptor = load_acceptor(cert, key)?;
            let listener = TcpListener::bind(SocketAddr::new(ip, config.dot.port)).await?;
            Some((listener, acceptor))
        } else {
            None
        };

        Ok(Self::with_listeners(
            QueryHandler::new(dispatcher, config.server.ttl),
            udp,
            tcp,
            dot,
        ))
    }

    /// Build a server around already bound listeners.
    pub const fn with_listeners(
        handler: QueryHandler<U>,
        udp: UdpSocket,
        tcp: TcpListener,
        dot: Option<(TcpListener, TlsAcceptor)>,
    ) -> Self {
        Self {
            handler,
            udp,
            tcp,
            dot,
        }
    }

    pub fn udp_addr(&self) -> io::Result<SocketAddr> {
        self.udp.local_addr()
    }

    pub fn tcp_addr(&self) -> io::Result<SocketAddr> {
        self.tcp.local_addr()
    }

    pub fn dot_addr(&self) -> Option<io::Result<SocketAddr>> {
        self.dot.as_ref().map(|(listener, _)| listener.local_addr())
    }

    /// Serve queries until `shutdown` resolves.
    pub async fn run<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        info!(
            udp = ?self.udp.local_addr().ok(),
            tcp = ?self.tcp.local_addr().ok(),
            dot = ?self.dot_addr().and_then(|addr| addr.ok()),
            "DNS server listening"
        );

        let Self {
            handler,
            udp,
            tcp,
            dot,
        } = self;

        tokio::select! {
            () = serve_udp(udp, handler.clone()) => {}
            () = serve_tcp(tcp, handler.clone()) => {}
            () = serve_dot(dot, handler) => {}
            () = shutdown => info!("shutting down DNS server"),
        }
        Ok(())
    }
}

async fn serve_udp<U>(socket: UdpSocket, handler: QueryHandler<U>)
where
    U: UpstreamLookup,
{
    let socket = Arc::new(socket);
    let mut buf = vec![0u8; UDP_RECV_BUFFER];

    loop {
        let (len, peer) = match socket.recv_from(&mut buf).await {
            Ok(received) => received,
            Err(err) => {
                warn!(error = %err, "failed to receive UDP query");
                tokio::time::sleep(LISTENER_ERROR_BACKOFF).await;
                continue;
            }
        };
        let query = buf[..len].to_vec();
        let socket = Arc::clone(&socket);
        let handler = handler.clone();

        tokio::spawn(async move {
            let Some(response) = handler.handle_bytes(&query).await else {
                return;
            };
            let response = fit_udp(&query, response);
            if let Err(err) = socket.send_to(&response, peer).await {
                warn!(%peer, error = %err, "failed to send UDP response");
            }
        });
    }
}

/// Hand every accepted connection to `on_connection`, forever.
///
/// Accept failures (e.g. out of file descriptors) are logged and retried
/// after [`LISTENER_ERROR_BACKOFF`].
async fn accept_loop<S, A, F, C>(listener: &'static str, mut accept: A, mut on_connection: C)
where
    A: FnMut() -> F,
    F: Future<Output = io::Result<(S, SocketAddr)>>,
    C: FnMut(S, SocketAddr),
{
    loop {
        match accept().await {
            Ok((stream, peer)) => on_connection(stream, peer),
            Err(err) => {
                warn!(listener, error = %err, "failed to accept connection");
                tokio::time::sleep(LISTENER_ERROR_BACKOFF).await;
            }
        }
    }
}

async fn serve_tcp<U>(listener: TcpListener, handler: QueryHandler<U>)
where
    U: UpstreamLookup,
{
    accept_loop("tcp", || listener.accept(), |stream, peer| {
        let handler = handler.clone();
        tokio::spawn(async move {
            if let Err(err) = serve_stream(stream, &handler).await {
                debug!(%peer, error = %err, "TCP connection error");
            }
        });
    })
    .await;
}

async fn serve_dot<U>(dot: Option<(TcpListener, TlsAcceptor)>, handler: QueryHandler<U>)
where
    U: UpstreamLookup,
{
    let Some((listener, acceptor)) = dot else {
        return std::future::pending().await;
    };

    accept_loop("dot", || listener.accept(), |stream, peer| {
        let acceptor = acceptor.clone();
        let handler = handler.clone();
        tokio::spawn(async move {
            let stream = match timeout(TLS_HANDSHAKE_TIMEOUT, acceptor.accept(stream)).await {
                Ok(Ok(stream)) => stream,
                Ok(Err(err)) => {
                    debug!(%peer, error = %err, "TLS handshake failed");
                    return;
                }
                Err(_) => {
                    debug!(%peer, "TLS handshake timed out");
                    return;
                }
            };
            if let Err(err) = serve_stream(stream, &handler).await {
                debug!(%peer, error = %err, "DoT connection error");
            }
        });
    })
    .await;
}

/// Answer framed queries on one connection until it closes or idles out.
async fn serve_stream<S, U>(mut stream: S, handler: &QueryHandler<U>) -> io::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
    U: UpstreamLookup,
{
    loop {
        let Ok(frame) = timeout(STREAM_IDLE_TIMEOUT, read_frame(&mut stream)).await else {
            return Ok(());
        };
        let Some(query) = frame? else {
            return Ok(());
        };
        if let Some(response) = handler.handle_bytes(&query).await {
            write_frame(&mut stream, &response).await?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns::ResolverContext;
    use crate::dns::upstream::tests::MockUpstream;
    use crate::hosts::HostTable;
    use hickory_proto::op::Query;
    use hickory_proto::rr::{Name, RecordType};
    use std::str::FromStr;

    fn create_query(domain: &str, record_type: RecordType, id: u16) -> Message {
        let mut query = Query::new();
        query.set_name(Name::from_str(domain).unwrap());
        query.set_query_type(record_type);

        let mut message = Message::new();
        message.set_id(id).set_recursion_desired(true);
        message.add_query(query);
        message
    }

    fn handler(hosts: &[(&str, Vec<String>, Vec<String>)]) -> (QueryHandler<MockUpstream>, MockUpstream) {
        let table = HostTable::from_pairs(
            hosts
                .iter()
                .map(|(key, v4, v6)| (*key, v4.clone(), v6.clone())),
        );
        let upstream = MockUpstream::new();
        let dispatcher = Dispatcher::new(
            ResolverContext::new(Some(table), None),
            upstream.clone(),
        );
        (QueryHandler::new(Arc::new(dispatcher), 500), upstream)
    }

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_query_handler_answers_from_hosts() {
        let (handler, upstream) = handler(&[(
            "api.test.com",
            strings(&["10.0.0.1", "10.0.0.2"]),
            vec![],
        )]);

        let query = create_query("api.test.com.", RecordType::A, 42);
        let response = handler.handle_query(&query).await;

        assert_eq!(response.id(), 42);
        assert_eq!(response.message_type(), MessageType::Response);
        assert_eq!(response.response_code(), ResponseCode::NoError);
        assert!(response.recursion_desired());
        assert_eq!(response.queries().len(), 1);
        assert_eq!(response.answers().len(), 2);
        assert_eq!(response.answers()[0].ttl(), 500);
        assert_eq!(
            response.answers()[0].data(),
            &RData::A(A("10.0.0.1".parse().unwrap()))
        );
        assert_eq!(upstream.lookup_count(), 0);
    }

    #[tokio::test]
    async fn test_query_handler_answers_aaaa() {
        let (handler, _) = handler(&[("v6.lan", vec![], strings(&["fd00::1"]))]);

        let query = create_query("v6.lan.", RecordType::AAAA, 7);
        let response = handler.handle_query(&query).await;

        assert_eq!(response.answers().len(), 1);
        assert_eq!(
            response.answers()[0].data(),
            &RData::AAAA(AAAA("fd00::1".parse().unwrap()))
        );
    }

    #[tokio::test]
    async fn test_query_handler_skips_malformed_addresses() {
        let (handler, _) = handler(&[("bad.lan", strings(&["not-an-ip", "10.0.0.3"]), vec![])]);

        let query = create_query("bad.lan.", RecordType::A, 8);
        let response = handler.handle_query(&query).await;

        assert_eq!(response.response_code(), ResponseCode::NoError);
        assert_eq!(response.answers().len(), 1);
    }

    #[tokio::test]
    async fn test_query_handler_empty_answer() {
        let (handler, upstream) = handler(&[]);

        let query = create_query("unknown.lan.", RecordType::A, 9);
        let response = handler.handle_query(&query).await;

        assert_eq!(response.response_code(), ResponseCode::NoError);
        assert!(response.answers().is_empty());
        assert_eq!(upstream.lookup_count(), 1);
    }

    #[tokio::test]
    async fn test_query_handler_upstream_error() {
        let (handler, upstream) = handler(&[]);
        upstream.set_error("connection refused").await;

        let query = create_query("example.com.", RecordType::A, 10);
        let response = handler.handle_query(&query).await;

        assert_eq!(response.id(), 10);
        assert_eq!(response.response_code(), ResponseCode::ServFail);
    }

    #[tokio::test]
    async fn test_query_handler_unsupported_type() {
        let (handler, upstream) = handler(&[]);

        let query = create_query("example.com.", RecordType::MX, 11);
        let response = handler.handle_query(&query).await;

        assert_eq!(response.response_code(), ResponseCode::NotImp);
        assert_eq!(upstream.lookup_count(), 0);
    }

    #[tokio::test]
    async fn test_query_handler_no_question() {
        let (handler, _) = handler(&[]);

        let mut query = Message::new();
        query.set_id(12);
        let response = handler.handle_query(&query).await;

        assert_eq!(response.id(), 12);
        assert_eq!(response.response_code(), ResponseCode::FormErr);
    }

    #[tokio::test]
    async fn test_handle_bytes_malformed() {
        let (handler, _) = handler(&[]);

        let response = handler.handle_bytes(&[0x12, 0x34, 0xFF]).await.unwrap();
        let response = Message::from_bytes(&response).unwrap();
        assert_eq!(response.id(), 0x1234);
        assert_eq!(response.response_code(), ResponseCode::FormErr);

        assert!(handler.handle_bytes(&[0x12]).await.is_none());
    }

    #[tokio::test]
    async fn test_fit_udp_truncates_large_response() {
        let addresses: Vec<String> = (0..64).map(|i| format!("10.0.0.{i}")).collect();
        let (handler, _) = handler(&[("many.lan", addresses, vec![])]);

        let query = create_query("many.lan.", RecordType::A, 13).to_vec().unwrap();
        let response = handler.handle_bytes(&query).await.unwrap();
        assert!(response.len() > MAX_UDP_RESPONSE_SIZE);

        let fitted = Message::from_bytes(&fit_udp(&query, response)).unwrap();
        assert!(fitted.truncated());
        assert!(fitted.answers().is_empty());
        assert_eq!(fitted.id(), 13);
    }

    #[tokio::test]
    async fn test_query_handler_clone_shares_dispatcher() {
        let (handler1, _) = handler(&[]);
        let handler2 = handler1.clone();

        handler1.dispatcher().reload(ResolverContext::new(
            Some(HostTable::from_pairs([("*.lan", strings(&["10.0.0.5"]), vec![])])),
            None,
        ));

        let query = create_query("web.lan.", RecordType::A, 14);
        let response = handler2.handle_query(&query).await;
        assert_eq!(response.answers().len(), 1);
    }

    #[tokio::test]
    async fn test_accept_loop_survives_accept_errors() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let attempts = Arc::new(AtomicUsize::new(0));
        let peer: SocketAddr = "127.0.0.1:5300".parse().unwrap();
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

        let counter = Arc::clone(&attempts);
        let accept = move || {
            let attempt = counter.fetch_add(1, Ordering::SeqCst);
            async move {
                match attempt {
                    0 | 1 => Err(io::Error::other("too many open files")),
                    2 => Ok((attempt, peer)),
                    _ => std::future::pending().await,
                }
            }
        };
        let task = tokio::spawn(accept_loop("test", accept, move |conn, from| {
            let _ = tx.send((conn, from));
        }));

        let (conn, from) = timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(conn, 2);
        assert_eq!(from, peer);
        assert!(attempts.load(Ordering::SeqCst) >= 3);

        task.abort();
    }
}
