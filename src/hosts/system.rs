//! System hosts file adapter.
//!
//! Turns the keyed mapping produced by [`HostsFileParser`](super::HostsFileParser)
//! (`"domain:4" -> "10.0.0.1"`) into a pattern-aware table holding a single
//! address per domain.

use tracing::{debug, warn};

use super::{HostEntry, HostTable, QueryType, is_ipv6};

/// Host entries loaded from the system hosts file.
#[derive(Debug, Clone, Default)]
pub struct SystemHosts {
    table: HostTable,
}

/// Strip the `:4` / `:6` record type suffix from a mapping key.
///
/// The split happens on the last colon, unless that colon starts the key.
fn key_domain(key: &str) -> &str {
    match key.rfind(':') {
        Some(idx) if idx > 0 => &key[..idx],
        _ => key,
    }
}

impl SystemHosts {
    /// Build the table from `(key, address)` pairs.
    ///
    /// Keys are `"domain"` or `"domain:typeDigit"`. Only the first address
    /// seen for a domain is kept. Keys that look like regexes but fail to
    /// compile are logged and skipped.
    pub fn from_mapping<I, K, V>(mapping: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut table = HostTable::new();
        let mut total = 0usize;

        for (key, address) in mapping {
            total += 1;
            let domain = key_domain(key.as_ref()).trim();
            let address = address.as_ref().trim();
            if domain.is_empty() || address.is_empty() {
                continue;
            }

            let (v4, v6) = if is_ipv6(address) {
                (Vec::new(), vec![address.to_string()])
            } else {
                (vec![address.to_string()], Vec::new())
            };

            match HostEntry::new(domain, v4, v6) {
                Ok(Some(entry)) => {
                    table.insert(entry);
                }
                Ok(None) => {}
                Err(err) => {
                    warn!(domain, error = %err, "failed to compile regex pattern in hosts file");
                }
            }
        }

        debug!(
            mappings = total,
            entries = table.len(),
            "parsed system hosts entries"
        );
        Self { table }
    }

    /// Look up the address of `query_type` for `domain`.
    ///
    /// Exact entries are tried before wildcard and regex entries. The family
    /// of the stored address decides whether it answers `A` or `AAAA`.
    pub fn lookup(&self, domain: &str, query_type: QueryType) -> Option<&str> {
        self.table
            .lookup(domain, query_type)
            .and_then(<[String]>::first)
            .map(String::as_str)
    }

    /// Iterate over entries in load order.
    pub fn entries(&self) -> impl Iterator<Item = &HostEntry> {
        self.table.entries()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.table.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}
