//! Error types for the hostgate DNS server.

use std::io;
use std::time::Duration;

use hickory_proto::op::ResponseCode;
use thiserror::Error;

/// Main error type for hostgate operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("upstream error: {0}")]
    Upstream(#[from] UpstreamError),

    #[error("DNS protocol error: {0}")]
    Protocol(#[from] hickory_proto::ProtoError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("metrics error: {0}")]
    Metrics(String),
}

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    ReadFile(#[source] io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[source] serde_yaml::Error),

    #[error("failed to parse config: {0}")]
    ParseToml(#[source] toml::de::Error),

    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),
}

/// Validation errors for configuration values.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("server.ttl must be greater than 0")]
    ZeroTtl,

    #[error("invalid listen host (must be an IP address): {host:?}")]
    InvalidHost { host: String },

    #[error("invalid upstream timeout: {value:?}")]
    InvalidTimeout { value: String },

    #[error("at least one upstream server is required")]
    EmptyUpstreams,

    #[error("invalid upstream server address: {server:?}")]
    InvalidUpstream { server: String },

    #[error("unsupported upstream scheme {scheme:?} in {server:?} (supported: udp, tcp, tls)")]
    UnsupportedUpstreamScheme { server: String, scheme: String },

    #[error("TLS certificate and key are required when DoT is enabled")]
    MissingTlsMaterial,
}

/// Errors raised while querying upstream resolvers.
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("query to {server} timed out after {timeout:?}")]
    Timeout { server: String, timeout: Duration },

    #[error("{server} answered with {code}")]
    ResponseCode { server: String, code: ResponseCode },

    #[error("I/O error talking to {server}: {source}")]
    Io {
        server: String,
        #[source]
        source: io::Error,
    },

    #[error("malformed response from {server}: {source}")]
    Protocol {
        server: String,
        #[source]
        source: hickory_proto::ProtoError,
    },

    #[error("all {attempts} upstream servers failed, last error: {last}")]
    Exhausted {
        attempts: usize,
        #[source]
        last: Box<UpstreamError>,
    },
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;
