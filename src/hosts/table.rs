//! Host table with exact and pattern lookups.
//!
//! The table is compiled once from its source and then only read, so it can
//! be shared between tasks behind an `Arc` without locking.

use std::collections::{HashMap, HashSet};

use tracing::{debug, warn};

use super::pattern::{PatternKind, QueryName};
use super::{HostEntry, QueryType};
use crate::config::HostsConfig;

/// A compiled set of host entries.
#[derive(Debug, Clone, Default)]
pub struct HostTable {
    /// All entries in insertion order.
    entries: Vec<HostEntry>,
    /// Exact keys to their index in `entries`.
    exact: HashMap<String, usize>,
    /// Indices of wildcard and regex entries, in insertion order.
    patterns: Vec<usize>,
    /// Keys of the entries in `patterns`.
    pattern_keys: HashSet<String>,
}

impl HostTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the table from the `hosts` configuration section.
    ///
    /// Entries with no usable address are dropped; keys that fail to compile
    /// are logged and skipped.
    pub fn from_config(hosts: &HostsConfig) -> Self {
        let table = Self::from_pairs(hosts.iter().map(|(key, value)| {
            let (v4, v6) = value.split_addresses();
            (key, v4, v6)
        }));

        debug!(
            configured = hosts.len(),
            loaded = table.len(),
            patterns = table.patterns.len(),
            "compiled config hosts table"
        );
        table
    }

    /// Build a table from `(key, ipv4, ipv6)` triples.
    pub fn from_pairs<'a, I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, Vec<String>, Vec<String>)>,
    {
        let mut table = Self::new();
        for (key, v4, v6) in pairs {
            match HostEntry::new(key, v4, v6) {
                Ok(Some(entry)) => {
                    table.insert(entry);
                }
                Ok(None) => {}
                Err(err) => warn!(key, error = %err, "skipping host pattern that does not compile"),
            }
        }
        table
    }

    /// Insert an entry unless its key is already present.
    ///
    /// Returns `false` when the key was already taken; the first entry wins.
    pub fn insert(&mut self, entry: HostEntry) -> bool {
        let taken = match entry.kind() {
            PatternKind::Exact => self.exact.contains_key(&entry.domain),
            PatternKind::Wildcard | PatternKind::Regex => {
                !self.pattern_keys.insert(entry.domain.clone())
            }
        };
        if taken {
            return false;
        }

        let index = self.entries.len();
        match entry.kind() {
            PatternKind::Exact => {
                self.exact.insert(entry.domain.clone(), index);
            }
            PatternKind::Wildcard | PatternKind::Regex => self.patterns.push(index),
        }
        self.entries.push(entry);
        true
    }

    /// Look up the addresses of `query_type` for `domain`.
    ///
    /// Exact keys are tried first (as queried, then without the trailing
    /// dot). Otherwise the first wildcard or regex entry that matches and
    /// holds addresses of the requested type wins. Addresses never fall back
    /// between IPv4 and IPv6.
    pub fn lookup(&self, domain: &str, query_type: QueryType) -> Option<&[String]> {
        self.find(domain, query_type)
            .map(|entry| entry.addresses(query_type))
    }

    /// Like [`lookup`](Self::lookup) but returns the matching entry.
    pub fn find(&self, domain: &str, query_type: QueryType) -> Option<&HostEntry> {
        let query = QueryName::new(domain);
        let has_addresses = |entry: &&HostEntry| !entry.addresses(query_type).is_empty();

        let exact = [query.dotted(), query.undotted()]
            .into_iter()
            .filter_map(|name| self.exact.get(name))
            .map(|&i| &self.entries[i])
            .find(has_addresses);
        if exact.is_some() {
            return exact;
        }

        self.patterns
            .iter()
            .map(|&i| &self.entries[i])
            .filter(has_addresses)
            .find(|entry| entry.pattern.matches(&entry.domain, &query))
    }

    /// Iterate over entries in insertion order.
    pub fn entries(&self) -> impl Iterator<Item = &HostEntry> {
        self.entries.iter()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
