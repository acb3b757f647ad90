//! Host pattern tables.
//!
//! Two independent tables answer queries before the upstream resolvers:
//!
//! - [`HostTable`]: built from the `hosts` section of the configuration
//! - [`SystemHosts`]: built from the system hosts file (`/etc/hosts`)
//!
//! Both share the same [`HostEntry`] shape and the same lookup priority:
//! exact keys first, then wildcard and regex keys in insertion order.
//!
//! # Example
//!
//! ```
//! use hostgate::hosts::{HostTable, QueryType};
//!
//! let table = HostTable::from_pairs([
//!     ("api.test.com", vec!["10.0.0.1".to_string()], vec![]),
//!     ("*.test.com", vec!["10.0.0.9".to_string()], vec![]),
//! ]);
//!
//! assert_eq!(table.lookup("api.test.com.", QueryType::A), Some(&["10.0.0.1".to_string()][..]));
//! assert_eq!(table.lookup("web.test.com", QueryType::A), Some(&["10.0.0.9".to_string()][..]));
//! assert_eq!(table.lookup("api.test.com", QueryType::AAAA), None);
//! ```

pub mod loader;
pub mod parser;
pub mod pattern;
pub mod system;
pub mod table;

use std::fmt;
use std::str::FromStr;

use hickory_proto::rr::RecordType;

pub use loader::HostsLoader;
pub use parser::HostsFileParser;
pub use pattern::{Pattern, PatternKind, classify, match_wildcard};
pub use system::SystemHosts;
pub use table::HostTable;

/// The address record types hostgate answers from its tables.
///
/// The discriminants follow the IP version, so `4` is `A` and `6` is `AAAA`.
#[allow(clippy::upper_case_acronyms)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryType {
    A = 4,
    AAAA = 6,
}

impl QueryType {
    /// Metric and log label.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::A => "A",
            Self::AAAA => "AAAA",
        }
    }

    /// Whether `address` belongs to this record type.
    ///
    /// Addresses containing a colon are IPv6, everything else is IPv4.
    #[inline]
    pub fn accepts(self, address: &str) -> bool {
        is_ipv6(address) == (self == Self::AAAA)
    }
}

impl fmt::Display for QueryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<QueryType> for RecordType {
    fn from(value: QueryType) -> Self {
        match value {
            QueryType::A => Self::A,
            QueryType::AAAA => Self::AAAA,
        }
    }
}

impl TryFrom<RecordType> for QueryType {
    type Error = RecordType;

    fn try_from(value: RecordType) -> Result<Self, Self::Error> {
        match value {
            RecordType::A => Ok(Self::A),
            RecordType::AAAA => Ok(Self::AAAA),
            other => Err(other),
        }
    }
}

impl TryFrom<u8> for QueryType {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            4 => Ok(Self::A),
            6 => Ok(Self::AAAA),
            other => Err(other),
        }
    }
}

impl FromStr for QueryType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "A" | "4" => Ok(Self::A),
            "AAAA" | "6" => Ok(Self::AAAA),
            _ => Err(format!("unsupported query type: {s} (supported: A, AAAA)")),
        }
    }
}

/// Check whether an address string is IPv6.
#[inline]
pub fn is_ipv6(address: &str) -> bool {
    address.contains(':')
}

/// A normalized host record.
///
/// `domain` is the lower-cased key the entry was built from; for wildcard and
/// regex entries it is the pattern source.
#[derive(Debug, Clone)]
pub struct HostEntry {
    pub domain: String,
    pub addresses_v4: Vec<String>,
    pub addresses_v6: Vec<String>,
    pub pattern: Pattern,
}

impl HostEntry {
    /// Build an entry from a raw key, classifying it.
    ///
    /// Returns `None` when the key is empty or both address lists are empty.
    pub fn new(
        key: &str,
        addresses_v4: Vec<String>,
        addresses_v6: Vec<String>,
    ) -> Result<Option<Self>, regex::Error> {
        let source = key.trim();
        let domain = source.to_lowercase();
        if domain.is_empty() || (addresses_v4.is_empty() && addresses_v6.is_empty()) {
            return Ok(None);
        }

        let pattern = Pattern::for_key(source, &domain)?;
        Ok(Some(Self {
            domain,
            addresses_v4,
            addresses_v6,
            pattern,
        }))
    }

    /// The addresses serving `query_type`.
    #[inline]
    pub fn addresses(&self, query_type: QueryType) -> &[String] {
        match query_type {
            QueryType::A => &self.addresses_v4,
            QueryType::AAAA => &self.addresses_v6,
        }
    }

    #[inline]
    pub const fn kind(&self) -> PatternKind {
        self.pattern.kind()
    }
}
