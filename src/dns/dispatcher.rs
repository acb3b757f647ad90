//! Three-tier resolution dispatcher.
//!
//! Every query tries, in order:
//!
//! 1. the `hosts` section of the configuration ([`HostTable`])
//! 2. the system hosts file ([`SystemHosts`])
//! 3. the upstream resolvers ([`UpstreamLookup`])
//!
//! The first tier holding addresses of the requested type answers. Local
//! tiers never fail; only the upstream error is returned to the caller.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use metrics::{counter, histogram};
use parking_lot::RwLock;
use tracing::{debug, info, instrument, warn};

use super::upstream::UpstreamLookup;
use crate::config::Config;
use crate::error::Result;
use crate::hosts::{HostTable, HostsLoader, QueryType, SystemHosts};

/// The tables consulted before the upstream tier.
///
/// A context is immutable once built; reloading swaps in a new one.
#[derive(Debug, Clone, Default)]
pub struct ResolverContext {
    pub hosts: Option<HostTable>,
    pub system_hosts: Option<SystemHosts>,
}

impl ResolverContext {
    pub const fn new(hosts: Option<HostTable>, system_hosts: Option<SystemHosts>) -> Self {
        Self {
            hosts,
            system_hosts,
        }
    }

    /// Build the context for `config`, loading the system hosts file.
    ///
    /// A hosts file that cannot be loaded is logged and the system hosts tier
    /// is disabled.
    pub async fn load(config: &Config) -> Self {
        let hosts = (!config.hosts.is_empty()).then(|| HostTable::from_config(&config.hosts));

        let system_hosts = match config.system_hosts.path() {
            Some(path) => match HostsLoader::load(path).await {
                Ok(system_hosts) => {
                    info!(path = ?path, entries = system_hosts.len(), "loaded system hosts file");
                    Some(system_hosts)
                }
                Err(err) => {
                    warn!(path = ?path, error = %err, "failed to load system hosts file, system hosts disabled");
                    None
                }
            },
            None => None,
        };

        Self::new(hosts, system_hosts)
    }

    fn lookup_config(&self, domain: &str, query_type: QueryType) -> Option<Vec<String>> {
        self.hosts
            .as_ref()?
            .lookup(domain, query_type)
            .filter(|addresses| !addresses.is_empty())
            .map(<[String]>::to_vec)
    }

    fn lookup_system(&self, domain: &str, query_type: QueryType) -> Option<Vec<String>> {
        let system_hosts = self.system_hosts.as_ref().filter(|s| !s.is_empty())?;
        system_hosts
            .lookup(domain, query_type)
            .map(|address| vec![address.to_string()])
    }
}

/// The tier that produced an answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Source {
    ConfigHosts,
    SystemHosts,
    Upstream,
}

impl Source {
    /// Log and metric label.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ConfigHosts => "config.hosts",
            Self::SystemHosts => "system.hosts",
            Self::Upstream => "upstream",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Addresses resolved for a query and the tier they came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Answer {
    pub source: Source,
    pub addresses: Vec<String>,
}

/// Runs the three-tier lookup policy.
///
/// Share it between tasks behind an `Arc`; [`reload`](Self::reload) replaces
/// the local tables for every holder at once.
pub struct Dispatcher<U> {
    context: RwLock<Arc<ResolverContext>>,
    upstream: U,
}

impl<U> Dispatcher<U>
where
    U: UpstreamLookup,
{
    pub fn new(context: ResolverContext, upstream: U) -> Self {
        Self {
            context: RwLock::new(Arc::new(context)),
            upstream,
        }
    }

    /// Snapshot of the current context.
    pub fn context(&self) -> Arc<ResolverContext> {
        Arc::clone(&self.context.read())
    }

    pub const fn upstream(&self) -> &U {
        &self.upstream
    }

    /// Replace the local tables.
    ///
    /// Queries already running finish against the context they started with.
    pub fn reload(&self, context: ResolverContext) {
        *self.context.write() = Arc::new(context);
        info!("resolver context reloaded");
    }

    /// Resolve `hostname` to the addresses of `query_type`.
    ///
    /// `Ok(vec![])` means no tier has a record of that type.
    pub async fn resolve(&self, hostname: &str, query_type: QueryType) -> Result<Vec<String>> {
        self.answer(hostname, query_type)
            .await
            .map(|answer| answer.addresses)
    }

    /// Like [`resolve`](Self::resolve), also reporting which tier answered.
    #[instrument(skip(self))]
    pub async fn answer(&self, hostname: &str, query_type: QueryType) -> Result<Answer> {
        let context = self.context();

        if let Some(addresses) = context.lookup_config(hostname, query_type) {
            return Ok(resolved(Source::ConfigHosts, addresses));
        }
        debug!(source = Source::ConfigHosts.as_str(), "no match");

        if let Some(addresses) = context.lookup_system(hostname, query_type) {
            return Ok(resolved(Source::SystemHosts, addresses));
        }
        debug!(source = Source::SystemHosts.as_str(), "no match");

        let started = Instant::now();
        let result = self.upstream.lookup(hostname, query_type).await;
        histogram!("hostgate_upstream_duration_seconds").record(started.elapsed().as_secs_f64());

        match result {
            Ok(addresses) => Ok(resolved(Source::Upstream, addresses)),
            Err(err) => {
                counter!("hostgate_upstream_errors_total").increment(1);
                Err(err)
            }
        }
    }
}

fn resolved(source: Source, addresses: Vec<String>) -> Answer {
    info!(source = source.as_str(), ?addresses, "resolved");
    counter!("hostgate_resolutions_total", "source" => source.as_str()).increment(1);
    Answer { source, addresses }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns::upstream::tests::MockUpstream;
    use crate::error::Error;

    fn config_hosts(pairs: &[(&str, &str)]) -> HostTable {
        HostTable::from_pairs(pairs.iter().map(|(key, address)| {
            let address = address.to_string();
            if address.contains(':') {
                (*key, vec![], vec![address])
            } else {
                (*key, vec![address], vec![])
            }
        }))
    }

    fn dispatcher(
        hosts: Option<HostTable>,
        system_hosts: Option<SystemHosts>,
    ) -> (Dispatcher<MockUpstream>, MockUpstream) {
        let upstream = MockUpstream::new();
        let dispatcher = Dispatcher::new(
            ResolverContext::new(hosts, system_hosts),
            upstream.clone(),
        );
        (dispatcher, upstream)
    }

    #[tokio::test]
    async fn should_answer_from_config_hosts_first() {
        let hosts = config_hosts(&[("api.test.com", "10.0.0.1")]);
        let system = SystemHosts::from_mapping([("api.test.com:4", "10.9.9.9")]);
        let (dispatcher, upstream) = dispatcher(Some(hosts), Some(system));

        let answer = dispatcher.answer("api.test.com.", QueryType::A).await.unwrap();

        assert_eq!(answer.source, Source::ConfigHosts);
        assert_eq!(answer.addresses, vec!["10.0.0.1"]);
        assert_eq!(upstream.lookup_count(), 0);
    }

    #[tokio::test]
    async fn should_fall_through_to_system_hosts() {
        let hosts = config_hosts(&[("api.test.com", "10.0.0.1")]);
        let system = SystemHosts::from_mapping([("db.lan:4", "10.1.0.2")]);
        let (dispatcher, upstream) = dispatcher(Some(hosts), Some(system));

        let answer = dispatcher.answer("db.lan", QueryType::A).await.unwrap();

        assert_eq!(answer.source, Source::SystemHosts);
        assert_eq!(answer.addresses, vec!["10.1.0.2"]);
        assert_eq!(upstream.lookup_count(), 0);
    }

    #[tokio::test]
    async fn should_fall_through_when_type_is_missing() {
        let hosts = config_hosts(&[("api.test.com", "10.0.0.1")]);
        let (dispatcher, upstream) = dispatcher(Some(hosts), None);
        upstream
            .add_answer("api.test.com", QueryType::AAAA, &["2001:db8::1"])
            .await;

        let answer = dispatcher
            .answer("api.test.com", QueryType::AAAA)
            .await
            .unwrap();

        assert_eq!(answer.source, Source::Upstream);
        assert_eq!(answer.addresses, vec!["2001:db8::1"]);
        assert_eq!(upstream.lookup_count(), 1);
    }

    #[tokio::test]
    async fn should_return_empty_upstream_answer() {
        let (dispatcher, upstream) = dispatcher(None, None);

        let addresses = dispatcher.resolve("nothing.lan", QueryType::A).await.unwrap();

        assert!(addresses.is_empty());
        assert_eq!(upstream.lookup_count(), 1);
    }

    #[tokio::test]
    async fn should_propagate_upstream_error() {
        let (dispatcher, upstream) = dispatcher(None, Some(SystemHosts::default()));
        upstream.set_error("connection refused").await;

        let result = dispatcher.resolve("example.com", QueryType::A).await;

        assert!(matches!(result, Err(Error::Upstream(_))));
    }

    #[tokio::test]
    async fn should_not_fall_back_to_local_tiers_after_upstream_error() {
        let system = SystemHosts::from_mapping([("svc:6", "fd00::1")]);
        let (dispatcher, upstream) = dispatcher(None, Some(system));
        upstream.set_error("timeout").await;

        assert!(dispatcher.resolve("svc", QueryType::A).await.is_err());
        assert_eq!(
            dispatcher.resolve("svc", QueryType::AAAA).await.unwrap(),
            vec!["fd00::1"]
        );
    }

    #[tokio::test]
    async fn should_swap_context_on_reload() {
        let (dispatcher, upstream) = dispatcher(None, None);
        upstream
            .add_answer("web.lan", QueryType::A, &["203.0.113.1"])
            .await;

        let before = dispatcher.answer("web.lan", QueryType::A).await.unwrap();
        assert_eq!(before.source, Source::Upstream);

        let snapshot = dispatcher.context();
        dispatcher.reload(ResolverContext::new(
            Some(config_hosts(&[("*.lan", "10.0.0.7")])),
            None,
        ));

        let after = dispatcher.answer("web.lan", QueryType::A).await.unwrap();
        assert_eq!(after.source, Source::ConfigHosts);
        assert_eq!(after.addresses, vec!["10.0.0.7"]);
        assert!(snapshot.hosts.is_none());
    }

    #[tokio::test]
    async fn should_skip_disabled_system_hosts() {
        let (dispatcher, upstream) = dispatcher(None, None);
        upstream
            .add_answer("localhost", QueryType::A, &["127.0.0.2"])
            .await;

        let answer = dispatcher.answer("localhost", QueryType::A).await.unwrap();

        assert_eq!(answer.source, Source::Upstream);
    }

    #[test]
    fn should_label_sources() {
        assert_eq!(Source::ConfigHosts.to_string(), "config.hosts");
        assert_eq!(Source::SystemHosts.to_string(), "system.hosts");
        assert_eq!(Source::Upstream.to_string(), "upstream");
    }
}
