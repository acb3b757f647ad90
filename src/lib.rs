//! Hostgate - a DNS responder with host pattern overrides.
//!
//! Every A or AAAA query is answered by the first of three ordered sources
//! holding an address of the requested type:
//!
//! 1. the `hosts` section of the configuration (exact, wildcard or regex keys)
//! 2. the system hosts file (`/etc/hosts`)
//! 3. the upstream DNS servers
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`config`]: Configuration loading and validation
//! - [`hosts`]: Pattern classification, host tables and hosts file parsing
//! - [`dns`]: The resolution dispatcher and the upstream client
//! - [`network`]: Stream framing and TLS setup
//! - [`server`]: UDP, TCP and DNS-over-TLS listeners
//! - [`metrics`]: Prometheus exporter
//! - [`error`]: Error types
//!
//! # Testing
//!
//! The upstream tier sits behind the [`dns::UpstreamLookup`] trait, so the
//! dispatcher and the responder can be tested without network access:
//!
//! ```rust
//! use hostgate::hosts::{HostTable, QueryType, classify, PatternKind};
//!
//! assert_eq!(classify("*.ex(ample).com"), PatternKind::Wildcard);
//!
//! let table = HostTable::from_pairs([("*.lan", vec!["10.0.0.1".to_string()], vec![])]);
//! assert!(table.lookup("db.lan", QueryType::A).is_some());
//! ```

pub mod config;
pub mod dns;
pub mod error;
pub mod hosts;
pub mod metrics;
pub mod network;
pub mod server;

pub use config::Config;
pub use error::{Error, Result};
